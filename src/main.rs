#![no_std]
#![no_main]

extern crate rlibc;

use bootloader_api::{entry_point, BootInfo};
use core::panic::PanicInfo;

use basalt::config::BOOTLOADER_CONFIG;
use basalt::interrupts::syscall;
use basalt::kernel::{init_kernel, wait_first_tick};
use basalt::memory::{self, allocators::ActiveHeap, ACTIVE_HEAP};
use basalt::println;
use basalt::task::TaskEntry;

#[global_allocator]
static ALLOCATOR: ActiveHeap = ActiveHeap::new(&ACTIVE_HEAP);

entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

const DEMO_TASKS: [TaskEntry; 2] = [task_a, task_b];

pub fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
    basalt::serial::init();
    let boot_info: &'static BootInfo = boot_info;

    let manager = match init_kernel(boot_info, &DEMO_TASKS) {
        Ok(manager) => manager,
        Err(e) => {
            println!("Kernel initialization failed: {}", e);
            loop_arch_mm();
        }
    };
    memory::memory_stats();

    // Normally the first tick switches to task 0 and this never returns.
    if let Err(timeout) = wait_first_tick(manager) {
        println!("warning: timer is silent, {}", timeout);
    }
    idle()
}

extern "C" fn task_a() -> ! {
    task_loop(c"A")
}

extern "C" fn task_b() -> ! {
    task_loop(c"B")
}

fn task_loop(name: &core::ffi::CStr) -> ! {
    loop {
        syscall::write(name);
        for _ in 0..1_000_000 {
            core::hint::spin_loop();
        }
    }
}

fn idle() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

fn loop_arch_mm() -> ! {
    x86_64::instructions::interrupts::disable();
    loop {
        unsafe {
            core::arch::x86_64::_mm_pause();
        }
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    let msg = info.message();
    let loc = info.location();
    println!("PANIC : {} | {:?}", msg, loc);

    loop_arch_mm()
}
