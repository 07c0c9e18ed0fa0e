//! Kernel initialization phases

use bootloader_api::BootInfo;
use spin::{Mutex, Once};

use crate::config::{FIRST_TICK_BUDGET, HARDWARE_INTERRUPT_OFFSET, SYSCALL_VECTOR, TIMER_HZ};
use crate::interrupts::exceptions::{ExceptionHandler, EXCEPTION_VECTORS};
use crate::interrupts::gdt::SegmentTable;
use crate::interrupts::manager::InterruptManager;
use crate::interrupts::pic::Pic8259;
use crate::interrupts::syscall::SyscallHandler;
use crate::interrupts::{stubs, timer};
use crate::memory;
use crate::task::{Task, TaskEntry, TaskScheduler};
use crate::time::{poll_until, spin_clock, PollTimeout};

pub static SEGMENTS: SegmentTable = SegmentTable::new();
pub static SCHEDULER: Mutex<TaskScheduler> = Mutex::new(TaskScheduler::new());

static INTERRUPTS: Once<InterruptManager<'static>> = Once::new();
static EXCEPTIONS: ExceptionHandler = ExceptionHandler;
static SYSCALLS: SyscallHandler = SyscallHandler;

const PHASES: usize = 6;

/// Brings the kernel up in dependency order and enables interrupts.
///
/// `tasks` are registered before activation; once the first timer tick
/// arrives the boot stack is abandoned in favour of task 0.
pub fn init_kernel(
    boot_info: &'static BootInfo,
    tasks: &[TaskEntry],
) -> Result<&'static InterruptManager<'static>, &'static str> {
    println!("╔════════════════════════════════════════╗");
    println!("║        basalt Kernel Initialization    ║");
    println!("╚════════════════════════════════════════╝\n");

    init_phase(1, "Segment Table", || {
        unsafe { SEGMENTS.load() };
        Ok(())
    })?;

    init_phase(2, "Kernel Heap", || {
        let region = unsafe { memory::init_heap(boot_info) }?;
        println!("    heap at {:#x}, {} KiB", region.start, region.size / 1024);
        Ok(())
    })?;

    init_phase(3, "Tasks", || {
        let mut scheduler = SCHEDULER.lock();
        for &entry in tasks {
            let task = Task::new(&SEGMENTS, entry).map_err(|_| "Out of memory for task stack")?;
            scheduler.add_task(task).map_err(|_| "Task table is full")?;
        }
        println!("    {} tasks registered", scheduler.task_count());
        Ok(())
    })?;

    let manager = init_phase(4, "Interrupt Manager", || {
        let manager = INTERRUPTS.call_once(|| {
            InterruptManager::new(
                &SEGMENTS,
                stubs::entry_points(),
                HARDWARE_INTERRUPT_OFFSET,
                &SCHEDULER,
                unsafe { Pic8259::new(HARDWARE_INTERRUPT_OFFSET) },
            )
        });
        for vector in EXCEPTION_VECTORS {
            manager.register_handler(vector, &EXCEPTIONS);
        }
        manager.register_handler(SYSCALL_VECTOR, &SYSCALLS);
        Ok(manager)
    })?;

    init_phase(5, "Timer", || {
        timer::init(TIMER_HZ);
        Ok(())
    })?;

    init_phase(6, "Interrupt Activation", || {
        manager.activate();
        Ok(())
    })?;

    println!("\n✅ Kernel initialization complete!\n");
    Ok(manager)
}

/// Waits a bounded time for the first timer tick. With tasks registered this
/// only returns if the timer is silent.
pub fn wait_first_tick(manager: &InterruptManager<'static>) -> Result<u64, PollTimeout> {
    poll_until(spin_clock(), FIRST_TICK_BUDGET, || manager.ticks() > 0)
}

fn init_phase<T>(
    step: usize,
    name: &'static str,
    init_fn: impl FnOnce() -> Result<T, &'static str>,
) -> Result<T, &'static str> {
    println!("[{}/{}] Initializing {}...", step, PHASES, name);

    match init_fn() {
        Ok(value) => {
            println!("    ✓ {} initialized successfully\n", name);
            Ok(value)
        }
        Err(e) => {
            println!("    ✗ {} failed: {}\n", name, e);
            Err(e)
        }
    }
}
