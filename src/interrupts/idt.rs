use core::mem::size_of;

use x86_64::instructions::tables::lidt;
use x86_64::structures::DescriptorTablePointer;
use x86_64::VirtAddr;

pub const VECTOR_COUNT: usize = 256;

/// Gate type for an interrupt gate (IF cleared on entry).
pub const INTERRUPT_GATE: u8 = 0xE;

const PRESENT: u8 = 0x80;

/// Long-mode gate. The first eight bytes keep the legacy layout
/// `{handler 0..16, selector, reserved, access, handler 16..32}`; the upper
/// handler half and a reserved dword follow.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct GateDescriptor {
    handler_low: u16,
    selector: u16,
    reserved: u8,
    access: u8,
    handler_mid: u16,
    handler_high: u32,
    reserved_high: u32,
}

const _: () = assert!(size_of::<GateDescriptor>() == 16);

impl GateDescriptor {
    pub const MISSING: Self = Self {
        handler_low: 0,
        selector: 0,
        reserved: 0,
        access: 0,
        handler_mid: 0,
        handler_high: 0,
        reserved_high: 0,
    };

    pub const fn new(handler: u64, selector: u16, privilege: u8, gate_type: u8) -> Self {
        Self {
            handler_low: handler as u16,
            selector,
            reserved: 0,
            access: PRESENT | ((privilege & 0x3) << 5) | gate_type,
            handler_mid: (handler >> 16) as u16,
            handler_high: (handler >> 32) as u32,
            reserved_high: 0,
        }
    }

    pub const fn handler_address(&self) -> u64 {
        self.handler_low as u64 | (self.handler_mid as u64) << 16 | (self.handler_high as u64) << 32
    }

    pub const fn selector(&self) -> u16 {
        self.selector
    }

    pub const fn access(&self) -> u8 {
        self.access
    }

    pub const fn is_present(&self) -> bool {
        self.access & PRESENT != 0
    }
}

impl core::fmt::Debug for GateDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GateDescriptor")
            .field("handler", &format_args!("{:#x}", self.handler_address()))
            .field("selector", &format_args!("{:#x}", self.selector))
            .field("access", &format_args!("{:#04x}", self.access))
            .finish()
    }
}

/// 256 gates, one per vector, all pointing at entry stubs in the kernel
/// code segment.
#[derive(Debug)]
#[repr(C, align(16))]
pub struct InterruptDispatchTable {
    gates: [GateDescriptor; VECTOR_COUNT],
}

impl InterruptDispatchTable {
    pub fn new(code_selector: u16, entry_points: &[u64; VECTOR_COUNT]) -> Self {
        let mut gates = [GateDescriptor::MISSING; VECTOR_COUNT];
        for (gate, &entry) in gates.iter_mut().zip(entry_points.iter()) {
            *gate = GateDescriptor::new(entry, code_selector, 0, INTERRUPT_GATE);
        }
        Self { gates }
    }

    pub fn gate(&self, vector: u8) -> &GateDescriptor {
        &self.gates[vector as usize]
    }

    /// # Safety
    /// Every gate must point at a valid entry stub.
    pub unsafe fn load(&'static self) {
        let pointer = DescriptorTablePointer {
            limit: (size_of::<Self>() - 1) as u16,
            base: VirtAddr::new(self as *const Self as u64),
        };
        lidt(&pointer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_layout() {
        let gate = GateDescriptor::new(0xFFFF_8000_1234_5678, 0x10, 0, INTERRUPT_GATE);
        assert_eq!(gate.handler_address(), 0xFFFF_8000_1234_5678);
        assert_eq!(gate.selector(), 0x10);
        assert_eq!(gate.access(), 0x8E);

        let raw: [u8; 16] = unsafe { core::mem::transmute(gate) };
        assert_eq!(&raw[..8], &[0x78, 0x56, 0x10, 0x00, 0x00, 0x8E, 0x34, 0x12]);
        assert_eq!(&raw[8..12], &[0x00, 0x80, 0xFF, 0xFF]);
    }

    #[test]
    fn test_privilege_in_access_byte() {
        let gate = GateDescriptor::new(0, 0x10, 3, INTERRUPT_GATE);
        assert_eq!(gate.access(), 0xEE);
        assert!(gate.is_present());
        assert!(!GateDescriptor::MISSING.is_present());
    }

    #[test]
    fn test_table_covers_every_vector() {
        let mut entries = [0u64; VECTOR_COUNT];
        for (vector, entry) in entries.iter_mut().enumerate() {
            *entry = 0x1000 + vector as u64 * 16;
        }
        let table = InterruptDispatchTable::new(0x10, &entries);

        assert_eq!(size_of::<InterruptDispatchTable>(), 4096);
        for vector in 0..=255u8 {
            let gate = table.gate(vector);
            assert_eq!(gate.handler_address(), entries[vector as usize]);
            assert_eq!(gate.selector(), 0x10);
        }
    }
}
