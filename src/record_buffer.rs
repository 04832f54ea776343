//! Fixed-capacity byte buffer for trace records
//!
//! The serializer accumulates complete lines here and hands the filled prefix
//! to a transport when the next line would not fit. The buffer never grows:
//! its capacity is chosen once from configuration.
//!
//! Integers are rendered with [`encode_int`], which writes decimal digits
//! right-to-left into a 20-byte scratch array (enough for `i64::MIN`) and
//! returns the used tail. It avoids `fmt` machinery on the hot path.

/// Default buffer capacity in bytes
pub const DEFAULT_CAPACITY: usize = 2048;

/// Smallest capacity accepted from configuration
pub const MIN_CAPACITY: usize = 256;

/// Largest capacity accepted from configuration (4 MiB)
pub const MAX_CAPACITY: usize = 4 * 1024 * 1024;

/// Scratch size for one decimal i64 including sign
pub const INT_SCRATCH_LEN: usize = 20;

/// Append-only byte buffer with a fixed capacity
#[derive(Debug)]
pub struct RecordBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl RecordBuffer {
    /// Create a buffer holding at most `capacity` bytes
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Record buffer capacity must be > 0");
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes still available before a flush is required
    pub fn remaining(&self) -> usize {
        self.data.len() - self.len
    }

    /// Whether `n` more bytes fit without flushing
    pub fn fits(&self, n: usize) -> bool {
        n <= self.remaining()
    }

    /// Copy `bytes` in if they fit; returns false and leaves the buffer
    /// untouched otherwise
    pub fn try_push(&mut self, bytes: &[u8]) -> bool {
        if !self.fits(bytes.len()) {
            return false;
        }
        let end = self.len + bytes.len();
        self.data[self.len..end].copy_from_slice(bytes);
        self.len = end;
        true
    }

    /// Filled prefix
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Reset the write cursor
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// Render `value` as decimal ASCII into `scratch`, returning the digits
pub fn encode_int(value: i64, scratch: &mut [u8; INT_SCRATCH_LEN]) -> &[u8] {
    let mut magnitude = value.unsigned_abs();
    let mut pos = INT_SCRATCH_LEN;
    loop {
        pos -= 1;
        scratch[pos] = b'0' + (magnitude % 10) as u8;
        magnitude /= 10;
        if magnitude == 0 {
            break;
        }
    }
    if value < 0 {
        pos -= 1;
        scratch[pos] = b'-';
    }
    &scratch[pos..]
}

/// Append `value` in decimal to `out`
pub fn push_int(out: &mut Vec<u8>, value: i64) {
    let mut scratch = [0u8; INT_SCRATCH_LEN];
    out.extend_from_slice(encode_int(value, &mut scratch));
}

/// Append a text field, replacing record separators with spaces
///
/// Tabs and line breaks inside names or paths would change the field count
/// of the line.
pub fn push_text(out: &mut Vec<u8>, text: &str) {
    out.extend(text.bytes().map(|b| match b {
        b'\t' | b'\n' | b'\r' => b' ',
        other => other,
    }));
}
