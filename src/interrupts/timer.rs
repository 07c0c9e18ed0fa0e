//! 8253/8254 PIT channel 0, the source of the scheduling tick (IRQ 0).

use x86_64::instructions::port::Port;

const CH0_DATA: u16 = 0x40;
const CMD: u16 = 0x43;

/// PIT input clock in Hz.
pub const PIT_BASE_HZ: u32 = 1_193_182;

/// Channel 0, lo/hi bytes, mode 3 (square wave), binary.
const CMD_CH0_SQUARE: u8 = 0x36;

/// Reload value for `hz`, clamped to what the 16-bit counter can hold.
pub fn divisor(hz: u32) -> u16 {
    let divisor = PIT_BASE_HZ / hz.max(1);
    divisor.clamp(1, u16::MAX as u32) as u16
}

/// Programs channel 0 to fire IRQ 0 at `hz`. Call before the interrupt
/// manager is activated.
pub fn init(hz: u32) {
    let divisor = divisor(hz);
    let mut command = Port::<u8>::new(CMD);
    let mut data = Port::<u8>::new(CH0_DATA);
    unsafe {
        command.write(CMD_CH0_SQUARE);
        data.write(divisor as u8);
        data.write((divisor >> 8) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divisor() {
        assert_eq!(divisor(100), 11_931);
        assert_eq!(divisor(1), u16::MAX);
        assert_eq!(divisor(10_000_000), 1);
    }
}
