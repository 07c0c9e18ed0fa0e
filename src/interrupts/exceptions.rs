use crate::interrupts::frame::{CpuState, StatePtr};
use crate::interrupts::manager::InterruptHandler;

pub const EXCEPTION_VECTORS: core::ops::Range<u8> = 0..32;

pub const BREAKPOINT: u8 = 3;
pub const PAGE_FAULT: u8 = 14;

pub fn exception_name(vector: u8) -> &'static str {
    match vector {
        0 => "DIVIDE BY ZERO",
        1 => "DEBUG",
        2 => "NON-MASKABLE INTERRUPT",
        3 => "BREAKPOINT",
        4 => "OVERFLOW",
        5 => "BOUND RANGE EXCEEDED",
        6 => "INVALID OPCODE",
        7 => "DEVICE NOT AVAILABLE",
        8 => "DOUBLE FAULT",
        10 => "INVALID TSS",
        11 => "SEGMENT NOT PRESENT",
        12 => "STACK SEGMENT FAULT",
        13 => "GENERAL PROTECTION FAULT",
        14 => "PAGE FAULT",
        16 => "X87 FLOATING POINT",
        17 => "ALIGNMENT CHECK",
        18 => "MACHINE CHECK",
        19 => "SIMD FLOATING POINT",
        20 => "VIRTUALIZATION",
        21 => "CONTROL PROTECTION",
        28 => "HYPERVISOR INJECTION",
        29 => "VMM COMMUNICATION",
        30 => "SECURITY",
        _ => "RESERVED",
    }
}

/// Default handler for CPU exceptions: breakpoints are reported and resumed,
/// everything else is fatal.
pub struct ExceptionHandler;

impl InterruptHandler for ExceptionHandler {
    fn handle(&self, state: StatePtr) -> StatePtr {
        let cpu: &CpuState = unsafe { state.as_ref() };
        let vector = cpu.vector as u8;

        if vector == BREAKPOINT {
            println!("EXCEPTION: BREAKPOINT at {:#x}", cpu.rip);
            return state;
        }

        if vector == PAGE_FAULT {
            println!("Accessed Address: {:#x}", fault_address());
        }
        panic!(
            "EXCEPTION: {} (error code: {:#x})\n{:#x?}",
            exception_name(vector),
            cpu.error_code,
            cpu
        );
    }
}

#[cfg(not(test))]
fn fault_address() -> u64 {
    x86_64::registers::control::Cr2::read_raw()
}

#[cfg(test)]
fn fault_address() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::ptr::NonNull;

    fn raise(vector: u8) -> StatePtr {
        let cpu = Box::leak(Box::new(CpuState {
            vector: vector as u64,
            rip: 0x1000,
            ..CpuState::default()
        }));
        ExceptionHandler.handle(NonNull::from(cpu))
    }

    #[test]
    fn test_breakpoint_resumes() {
        let state = raise(BREAKPOINT);
        assert_eq!(unsafe { state.as_ref().rip }, 0x1000);
    }

    #[test]
    #[should_panic(expected = "GENERAL PROTECTION FAULT")]
    fn test_fault_panics() {
        raise(13);
    }

    #[test]
    fn test_names() {
        assert_eq!(exception_name(0), "DIVIDE BY ZERO");
        assert_eq!(exception_name(14), "PAGE FAULT");
        assert_eq!(exception_name(15), "RESERVED");
    }
}
