//! COM1 diagnostics.
//!
//! Everything the kernel has to say goes out over the first UART; there is no
//! other output channel this early. Under host tests the macros print to the
//! harness instead.

use core::fmt;
use spin::Mutex;
use uart_16550::SerialPort;

pub const COM1: u16 = 0x3F8;

pub static SERIAL: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(COM1) });

/// Programs the UART. Must run before the first `println!`.
pub fn init() {
    SERIAL.lock().init();
}

#[doc(hidden)]
#[cfg(not(test))]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;

    // A handler that logs must not spin on a lock held by the code it preempted.
    x86_64::instructions::interrupts::without_interrupts(|| {
        let _ = SERIAL.lock().write_fmt(args);
    });
}

#[doc(hidden)]
#[cfg(test)]
pub fn _print(args: fmt::Arguments) {
    std::print!("{}", args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!("{}\n", format_args!($($arg)*)))
    };
}
