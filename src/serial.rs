//! COM1 log backend for bare-metal x86_64 builds.

use core::fmt;
use spin::Mutex;
use uart_16550::SerialPort;

const COM1_BASE: u16 = 0x3F8;

struct LogPort {
    port: Option<SerialPort>,
}

impl LogPort {
    const fn new() -> Self {
        Self { port: None }
    }

    fn ensure_init(&mut self) {
        if self.port.is_none() {
            let mut port = unsafe { SerialPort::new(COM1_BASE) };
            port.init();
            self.port = Some(port);
        }
    }

    fn write_fmt(&mut self, args: fmt::Arguments<'_>) {
        self.ensure_init();
        if let Some(ref mut port) = self.port {
            use core::fmt::Write;
            port.write_fmt(args).ok();
        }
    }
}

static COM1: Mutex<LogPort> = Mutex::new(LogPort::new());

pub(crate) fn _print(args: fmt::Arguments<'_>) {
    // Log lines are emitted from the timer path; never spin on the port with
    // interrupts enabled or a nested tick could deadlock on COM1.
    crate::arch::x86_64::without_interrupts(|| COM1.lock().write_fmt(args));
}
