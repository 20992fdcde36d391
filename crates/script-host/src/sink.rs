//! Output sink for engine-originated text

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use picojs_platform::Console;

/// Write target for `print` output and diagnostic dumps
///
/// Every [`emit`](OutputSink::emit) is followed by a flush, so nothing sits
/// in a buffer if the device halts right after.
pub struct OutputSink {
    writer: Box<dyn Write>,
}

impl OutputSink {
    pub fn new(writer: impl Write + 'static) -> Self {
        Self {
            writer: Box::new(writer),
        }
    }

    /// Sink writing to the platform console
    pub fn console() -> Self {
        Self::new(Console::new())
    }

    /// Write `bytes` verbatim and flush
    pub fn emit(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink").finish_non_exhaustive()
    }
}

/// Sink handle shared between the context and its host functions
pub(crate) type SharedSink = Rc<RefCell<OutputSink>>;

/// In-memory writer; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    bytes: Rc<RefCell<Vec<u8>>>,
    flushes: Rc<RefCell<usize>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.borrow()).into_owned()
    }

    /// Drain the buffer, returning what it held
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.bytes.borrow_mut());
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn flush_count(&self) -> usize {
        *self.flushes.borrow()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        *self.flushes.borrow_mut() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_flushes_every_write() {
        let capture = CaptureBuffer::new();
        let mut sink = OutputSink::new(capture.clone());

        sink.emit(b"hello ").unwrap();
        sink.emit(b"world\n").unwrap();

        assert_eq!(capture.contents(), "hello world\n");
        assert_eq!(capture.flush_count(), 2);
        assert_eq!(capture.take(), "hello world\n");
        assert_eq!(capture.contents(), "");
    }
}
