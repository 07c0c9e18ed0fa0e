pub mod exceptions;
pub mod frame;
pub mod gdt;
pub mod idt;
pub mod manager;
pub mod pic;
#[cfg(target_os = "none")]
pub mod stubs;
pub mod syscall;
pub mod timer;

pub use frame::{CpuState, StatePtr};
pub use gdt::{SegmentDescriptor, SegmentTable};
pub use idt::{GateDescriptor, InterruptDispatchTable};
pub use manager::{HandlerHandle, InterruptHandler, InterruptManager, ManagerState, ACTIVE_MANAGER};
pub use pic::{InterruptController, Pic8259};
