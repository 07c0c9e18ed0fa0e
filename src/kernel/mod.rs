/// Kernel initialization and bootstrap module
#[cfg(target_os = "none")]
pub mod init;

#[cfg(target_os = "none")]
pub use init::{init_kernel, wait_first_tick, SCHEDULER, SEGMENTS};
