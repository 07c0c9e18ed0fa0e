use core::ptr::NonNull;

/// Register state saved by the interrupt entry path, lowest address first.
///
/// The tail (`vector` onward) is what the stub and the CPU push; everything
/// above it is pushed by the common entry code in reverse field order. The
/// stub resumes from whatever `CpuState` the dispatcher returns, so a task
/// switch is just returning a different pointer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct CpuState {
    pub es: u64,
    pub ds: u64,

    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,

    pub vector: u64,
    pub error_code: u64,

    // Pushed by the CPU.
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

/// Size of the frame the entry stub builds.
pub const CPU_STATE_SIZE: usize = core::mem::size_of::<CpuState>();

const _: () = assert!(CPU_STATE_SIZE == 24 * 8);

/// Pointer to a saved state. Handlers receive one and return the state to
/// resume, which may live on another stack.
pub type StatePtr = NonNull<CpuState>;

/// RFLAGS for freshly started code: IF set plus the always-one bit 1.
pub const RFLAGS_INTERRUPTS_ENABLED: u64 = 0x202;
