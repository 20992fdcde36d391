//! Console write primitive

use std::io::{self, Write};

/// The platform console (serial port on a device, stdout on a host build)
#[derive(Debug, Default, Clone, Copy)]
pub struct Console;

impl Console {
    pub fn new() -> Self {
        Self
    }
}

impl Write for Console {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().lock().write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        io::stdout().lock().write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().lock().flush()
    }
}
