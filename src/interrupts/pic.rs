//! # Programmable Interrupt Controller (8259 PIC)
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐
//! │   PIC 1     │     │   PIC 2     │
//! │  (Master)   │◀────│  (Slave)    │
//! │ IRQ 0-7     │     │ IRQ 8-15    │
//! └─────────────┘     └─────────────┘
//!       │
//!       ▼
//!     CPU
//! ```
//!
//! ## Vector Remapping
//!
//! IRQ 0-15 collide with CPU exception vectors until remapped. With the
//! default offset of 0x20:
//!
//! | IRQ  | Vector    | Device    |
//! |------|-----------|-----------|
//! | 0    | 0x20      | Timer     |
//! | 1    | 0x21      | Keyboard  |
//! | 8-15 | 0x28-0x2F | Slave     |
//!
//! An IRQ that is never acknowledged blocks every later IRQ of equal or
//! lower priority, so the dispatcher acknowledges on every exit path.

use pic8259::ChainedPics;

/// Seam between the dispatcher and the interrupt controller hardware.
pub trait InterruptController: Send {
    /// Remaps and unmasks the controller.
    fn initialize(&mut self);

    /// Acknowledges hardware line `irq` (0..16).
    fn end_of_interrupt(&mut self, irq: u8);
}

/// The chained 8259 pair.
pub struct Pic8259 {
    pics: ChainedPics,
    offset: u8,
}

impl Pic8259 {
    /// # Safety
    /// `offset..offset+16` must not overlap CPU exception vectors.
    pub const unsafe fn new(offset: u8) -> Self {
        Self {
            pics: ChainedPics::new(offset, offset + 8),
            offset,
        }
    }
}

impl InterruptController for Pic8259 {
    fn initialize(&mut self) {
        unsafe {
            self.pics.initialize();
            self.pics.write_masks(0, 0);
        }
    }

    fn end_of_interrupt(&mut self, irq: u8) {
        // Lines 8..16 also acknowledge the master.
        unsafe { self.pics.notify_end_of_interrupt(self.offset + irq) };
    }
}
