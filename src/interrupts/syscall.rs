//! `int 0x80` system call gate.
//!
//! The call number goes in `rax`, arguments in `rbx`; the result comes back
//! in `rax`.
//!
//! | rax | Call  | rbx                         | Result        |
//! |-----|-------|-----------------------------|---------------|
//! | 4   | write | NUL-terminated UTF-8 string | bytes written |

use core::ffi::{c_char, CStr};

use crate::interrupts::frame::StatePtr;
use crate::interrupts::manager::InterruptHandler;

pub const SYS_WRITE: u64 = 4;

/// Returned in `rax` for unknown calls and bad arguments.
pub const SYSCALL_ERROR: u64 = u64::MAX;

pub struct SyscallHandler;

impl InterruptHandler for SyscallHandler {
    fn handle(&self, mut state: StatePtr) -> StatePtr {
        let cpu = unsafe { state.as_mut() };
        cpu.rax = match cpu.rax {
            SYS_WRITE => sys_write(cpu.rbx),
            other => {
                println!("unknown syscall {}", other);
                SYSCALL_ERROR
            }
        };
        state
    }
}

fn sys_write(address: u64) -> u64 {
    if address == 0 {
        return SYSCALL_ERROR;
    }
    let message = unsafe { CStr::from_ptr(address as *const c_char) };
    match message.to_str() {
        Ok(text) => {
            print!("{}", text);
            text.len() as u64
        }
        Err(_) => SYSCALL_ERROR,
    }
}

/// Writes `message` through the gate. Returns the byte count or
/// [`SYSCALL_ERROR`].
pub fn write(message: &CStr) -> u64 {
    let result: u64;
    // rbx is reserved by the compiler, so it is swapped in around the trap.
    unsafe {
        core::arch::asm!(
            "xchg {message}, rbx",
            "int 0x80",
            "xchg {message}, rbx",
            message = inout(reg) message.as_ptr() => _,
            inlateout("rax") SYS_WRITE => result,
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupts::frame::CpuState;
    use core::ptr::NonNull;

    fn call(rax: u64, rbx: u64) -> u64 {
        let mut cpu = CpuState {
            rax,
            rbx,
            ..CpuState::default()
        };
        let state = NonNull::from(&mut cpu);
        assert_eq!(SyscallHandler.handle(state), state);
        cpu.rax
    }

    #[test]
    fn test_write_returns_length() {
        let message = c"hello from a task\n";
        assert_eq!(call(SYS_WRITE, message.as_ptr() as u64), 18);
    }

    #[test]
    fn test_bad_arguments() {
        assert_eq!(call(SYS_WRITE, 0), SYSCALL_ERROR);
        let invalid = b"\xFF\xFE\0";
        assert_eq!(call(SYS_WRITE, invalid.as_ptr() as u64), SYSCALL_ERROR);
        assert_eq!(call(99, 0), SYSCALL_ERROR);
    }
}
