/// In-memory rolling buffer with a hard byte cap, spec.md §4.1 capture.
/// Exceeding the cap is the supervisor's cue to SIGKILL the child; the
/// buffer itself just reports whether the push would overflow.
#[derive(Debug, Default)]
pub struct RollingBuffer {
    cap: usize,
    data: Vec<u8>,
}

/// Returned when a push would exceed the configured cap; the buffer is
/// left unmodified so the caller can still read whatever was captured
/// before reporting the terminal error.
#[derive(Debug, Clone, Copy)]
pub struct CaptureCapExceeded {
    pub cap: usize,
}

impl RollingBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            data: Vec::new(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<(), CaptureCapExceeded> {
        if self.data.len() + chunk.len() > self.cap {
            return Err(CaptureCapExceeded { cap: self.cap });
        }
        self.data.extend_from_slice(chunk);
        Ok(())
    }

    /// Drains the buffer, as `readUntil` does once its predicate matches.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_lossy_str(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}
