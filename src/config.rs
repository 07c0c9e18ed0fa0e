//! Compile-time kernel configuration.

use bootloader_api::config::{BootloaderConfig, Mapping};

/// First vector used by the remapped 8259 pair. IRQ 0..=7 land on
/// `offset..offset+8`, IRQ 8..=15 on the next eight vectors.
pub const HARDWARE_INTERRUPT_OFFSET: u8 = 0x20;

/// Number of hardware lines behind the chained controllers.
pub const HARDWARE_INTERRUPT_LINES: u8 = 16;

/// Software interrupt used by the syscall gate.
pub const SYSCALL_VECTOR: u8 = 0x80;

/// Fixed capacity of the task table.
pub const MAX_TASKS: usize = 256;

/// Private stack of every task, saved state included.
pub const TASK_STACK_SIZE: usize = 16 * 1024;

/// PIT channel 0 frequency in Hz.
pub const TIMER_HZ: u32 = 100;

/// The heap only lives above this physical address.
pub const LOW_MEMORY_LIMIT: u64 = 1024 * 1024;

/// Bytes left untouched at the end of the heap region.
pub const HEAP_TAIL_RESERVE: usize = 10 * 1024;

/// Spin iterations allowed for the first timer tick after activation.
pub const FIRST_TICK_BUDGET: u64 = 50_000_000;

const KERNEL_STACK_SIZE: u64 = 128 * 1024;

pub static BOOTLOADER_CONFIG: BootloaderConfig = {
    let mut config = BootloaderConfig::new_default();
    config.mappings.physical_memory = Some(Mapping::Dynamic);
    config.kernel_stack_size = KERNEL_STACK_SIZE;
    config
};
