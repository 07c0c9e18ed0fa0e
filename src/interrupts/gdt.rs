// gdt.rs
use core::mem::{offset_of, size_of};

use x86_64::instructions::segmentation::{Segment, CS, DS, ES, SS};
use x86_64::instructions::tables::lgdt;
use x86_64::structures::gdt::SegmentSelector;
use x86_64::structures::DescriptorTablePointer;
use x86_64::VirtAddr;

/// Flat segments span the first 64 MiB.
pub const FLAT_LIMIT: u32 = 64 * 1024 * 1024;

const PRESENT: u8 = 1 << 7;
const CODE_OR_DATA: u8 = 1 << 4;
const EXECUTABLE: u8 = 1 << 3;
const READ_WRITE: u8 = 1 << 1;
const ACCESSED: u8 = 1 << 0;

/// Present, ring 0, executable and readable (0x9A).
pub const KERNEL_CODE_ACCESS: u8 = PRESENT | CODE_OR_DATA | EXECUTABLE | READ_WRITE;
/// Present, ring 0, writable (0x92).
pub const KERNEL_DATA_ACCESS: u8 = PRESENT | CODE_OR_DATA | READ_WRITE;

const FLAG_GRANULARITY: u8 = 0x8;
const FLAG_DEFAULT_SIZE: u8 = 0x4;
const FLAG_LONG_MODE: u8 = 0x2;

/// One legacy 8-byte segment descriptor, stored in its hardware byte order:
///
/// ```text
/// [0..2] limit 0..16   [2..4] base 0..16   [4] base 16..24
/// [5]    access        [6] flags<<4 | limit 16..20   [7] base 24..32
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct SegmentDescriptor([u8; 8]);

impl SegmentDescriptor {
    pub const NULL: Self = Self([0; 8]);

    /// Encodes `[base, base + limit]`. Limits above 0xFFFF switch to 4 KiB
    /// granularity and are stored in pages.
    pub const fn new(base: u32, limit: u32, access: u8) -> Self {
        let (limit, flags) = if limit <= 0xFFFF {
            (limit, FLAG_DEFAULT_SIZE)
        } else if limit & 0xFFF != 0xFFF {
            ((limit >> 12) - 1, FLAG_GRANULARITY | FLAG_DEFAULT_SIZE)
        } else {
            (limit >> 12, FLAG_GRANULARITY | FLAG_DEFAULT_SIZE)
        };

        Self([
            limit as u8,
            (limit >> 8) as u8,
            base as u8,
            (base >> 8) as u8,
            (base >> 16) as u8,
            access,
            (flags << 4) | ((limit >> 16) as u8 & 0xF),
            (base >> 24) as u8,
        ])
    }

    /// Marks a code descriptor as 64-bit (L set, D/B clear). Base and limit
    /// are left as encoded.
    pub const fn with_long_mode(self) -> Self {
        let mut bytes = self.0;
        let flags = (bytes[6] >> 4) & !FLAG_DEFAULT_SIZE | FLAG_LONG_MODE;
        bytes[6] = (flags << 4) | (bytes[6] & 0xF);
        Self(bytes)
    }

    /// Pre-sets the accessed bit so loading the selector never writes the
    /// descriptor back.
    pub const fn accessed(self) -> Self {
        let mut bytes = self.0;
        bytes[5] |= ACCESSED;
        Self(bytes)
    }

    pub const fn base(&self) -> u32 {
        u32::from_le_bytes([self.0[2], self.0[3], self.0[4], self.0[7]])
    }

    pub const fn limit(&self) -> u32 {
        let raw = u32::from_le_bytes([self.0[0], self.0[1], self.0[6] & 0xF, 0]);
        if self.flags() & FLAG_GRANULARITY != 0 {
            (raw << 12) | 0xFFF
        } else {
            raw
        }
    }

    pub const fn access(&self) -> u8 {
        self.0[5]
    }

    pub const fn flags(&self) -> u8 {
        self.0[6] >> 4
    }

    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl core::fmt::Debug for SegmentDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SegmentDescriptor")
            .field("base", &format_args!("{:#x}", self.base()))
            .field("limit", &format_args!("{:#x}", self.limit()))
            .field("access", &format_args!("{:#04x}", self.access()))
            .field("flags", &format_args!("{:#x}", self.flags()))
            .finish()
    }
}

/// The kernel's four descriptors, laid out back to back so the table's own
/// address is what gets handed to `lgdt`.
#[derive(Debug)]
#[repr(C, align(8))]
pub struct SegmentTable {
    null: SegmentDescriptor,
    unused: SegmentDescriptor,
    code: SegmentDescriptor,
    data: SegmentDescriptor,
}

impl SegmentTable {
    pub const fn new() -> Self {
        Self {
            null: SegmentDescriptor::NULL,
            unused: SegmentDescriptor::NULL,
            code: SegmentDescriptor::new(0, FLAT_LIMIT, KERNEL_CODE_ACCESS)
                .with_long_mode()
                .accessed(),
            data: SegmentDescriptor::new(0, FLAT_LIMIT, KERNEL_DATA_ACCESS).accessed(),
        }
    }

    /// Byte offset of the code descriptor, which is its selector.
    pub const fn code_segment_selector(&self) -> u16 {
        offset_of!(SegmentTable, code) as u16
    }

    pub const fn data_segment_selector(&self) -> u16 {
        offset_of!(SegmentTable, data) as u16
    }

    pub const fn code(&self) -> &SegmentDescriptor {
        &self.code
    }

    pub const fn data(&self) -> &SegmentDescriptor {
        &self.data
    }

    /// Loads the table and reloads every segment register from it.
    ///
    /// # Safety
    /// Must run in ring 0; the caller's code must remain reachable through
    /// the new code selector.
    pub unsafe fn load(&'static self) {
        let pointer = DescriptorTablePointer {
            limit: (size_of::<Self>() - 1) as u16,
            base: VirtAddr::new(self as *const Self as u64),
        };
        lgdt(&pointer);

        let code = SegmentSelector(self.code_segment_selector());
        let data = SegmentSelector(self.data_segment_selector());
        CS::set_reg(code);
        DS::set_reg(data);
        ES::set_reg(data);
        SS::set_reg(data);
    }
}

impl Default for SegmentTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_granular_limit_round_trips() {
        let descriptor = SegmentDescriptor::new(0x1234_5678, 0xABCD, KERNEL_DATA_ACCESS);
        assert_eq!(descriptor.base(), 0x1234_5678);
        assert_eq!(descriptor.limit(), 0xABCD);
        assert_eq!(descriptor.access(), 0x92);
        assert_eq!(descriptor.flags() & FLAG_GRANULARITY, 0);
    }

    #[test]
    fn test_hardware_byte_order() {
        let descriptor = SegmentDescriptor::new(0xAABB_CCDD, 0x1FFFF, 0x9A);
        assert_eq!(
            descriptor.as_bytes(),
            &[0x1F, 0x00, 0xDD, 0xCC, 0xBB, 0x9A, 0xC0, 0xAA]
        );
    }

    #[test]
    fn test_page_granular_limit() {
        // Low 12 bits all ones: stored as limit >> 12.
        let descriptor = SegmentDescriptor::new(0, 0x00FF_FFFF, KERNEL_CODE_ACCESS);
        assert_eq!(descriptor.limit(), ((0x00FF_FFFF >> 12) << 12) | 0xFFF);
        assert_eq!(descriptor.flags() & FLAG_GRANULARITY, FLAG_GRANULARITY);

        // Otherwise one page less is stored.
        let descriptor = SegmentDescriptor::new(0, FLAT_LIMIT, KERNEL_CODE_ACCESS);
        assert_eq!(descriptor.limit(), FLAT_LIMIT - 1);
        assert_eq!(descriptor.base(), 0);
    }

    #[test]
    fn test_limit_boundary() {
        assert_eq!(SegmentDescriptor::new(0, 0xFFFF, 0x92).limit(), 0xFFFF);
        assert_eq!(SegmentDescriptor::new(0, 0x1_0000, 0x92).limit(), 0xFFFF);
        assert_ne!(SegmentDescriptor::new(0, 0x1_0000, 0x92).flags() & FLAG_GRANULARITY, 0);
    }

    #[test]
    fn test_long_mode_keeps_range() {
        let table = SegmentTable::new();
        let code = table.code();
        assert_eq!(code.flags(), FLAG_GRANULARITY | FLAG_LONG_MODE);
        assert_eq!(code.base(), 0);
        assert_eq!(code.limit(), FLAT_LIMIT - 1);
        assert_eq!(code.access(), KERNEL_CODE_ACCESS | ACCESSED);
        assert_eq!(table.data().access(), KERNEL_DATA_ACCESS | ACCESSED);
    }

    #[test]
    fn test_selectors_are_byte_offsets() {
        let table = SegmentTable::new();
        let base = &table as *const SegmentTable as usize;
        let code = table.code() as *const SegmentDescriptor as usize;
        let data = table.data() as *const SegmentDescriptor as usize;

        assert_eq!(table.code_segment_selector() as usize, code - base);
        assert_eq!(table.data_segment_selector() as usize, data - base);
        assert_eq!(table.code_segment_selector(), 0x10);
        assert_eq!(table.data_segment_selector(), 0x18);
        assert_eq!(table.code_segment_selector(), table.code_segment_selector());
        assert_eq!(size_of::<SegmentTable>(), 32);
    }
}
