//! Log capture for asserting on emitted warnings.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let logs = LogCapture::new();
//! let _guard = logs.install();
//! // ... code that logs ...
//! assert!(logs.contains("related model data missing"));
//! ```

use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tracing::subscriber::DefaultGuard;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

/// Collects formatted log lines of level `WARN` and above.
///
/// The subscriber is installed for the current thread only, so tests using
/// it should run on a current-thread runtime.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Creates an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes this thread's logs into the capture until the guard drops.
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(Level::WARN)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Returns everything captured so far.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Returns true if any captured line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }
}

/// Writer handed out per log event.
pub struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter(Arc::clone(&self.buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_warnings_but_not_debug() {
        let logs = LogCapture::new();
        {
            let _guard = logs.install();
            tracing::warn!(key = "note", "something is off");
            tracing::debug!("chatter");
        }
        tracing::warn!("after the guard");

        assert!(logs.contains("something is off"));
        assert!(logs.contains("note"));
        assert!(!logs.contains("chatter"));
        assert!(!logs.contains("after the guard"));
    }
}
