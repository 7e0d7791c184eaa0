//! Batched capture-record demultiplexing
//!
//! BPF-style capture devices coalesce several link-layer frames into one
//! read: the buffer is a sequence of records, each a fixed header followed
//! by the captured payload, padded to a platform alignment boundary. The
//! cursor here walks one read and yields each payload span.
//!
//! The walk is bounds-checked: a record whose declared lengths do not fit
//! the buffer, whose header length is shorter than the fixed header, or
//! which fails to advance the cursor stops processing of the whole buffer.
//! Once one length field is wrong the next record boundary cannot be
//! trusted, so the rest of the read is dropped rather than skipped over.

/// Where the capture header keeps its length fields, and how records are
/// padded. Offsets are into the start of each record; both fields are read
/// in native byte order, as the records are produced by the local kernel.
#[derive(Debug, Clone, Copy)]
pub struct RecordLayout {
    /// Offset of the 32-bit captured-payload length.
    pub caplen_offset: usize,
    /// Offset of the 16-bit header length (payload starts there).
    pub hdrlen_offset: usize,
    /// Records are padded so the next one starts on this boundary.
    pub alignment: usize,
}

impl RecordLayout {
    /// Smallest prefix of a record that contains both length fields.
    pub fn fixed_header_len(&self) -> usize {
        (self.caplen_offset + 4).max(self.hdrlen_offset + 2)
    }
}

/// Record layout of this platform's capture device.
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub const OS_RECORD_LAYOUT: RecordLayout = RecordLayout {
    // bh_tstamp is a two-u32 timeval, then caplen, datalen, hdrlen.
    caplen_offset: 8,
    hdrlen_offset: 16,
    alignment: 4,
};

#[cfg(any(
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub const OS_RECORD_LAYOUT: RecordLayout = RecordLayout {
    caplen_offset: std::mem::size_of::<libc::timeval>(),
    hdrlen_offset: std::mem::size_of::<libc::timeval>() + 8,
    alignment: std::mem::size_of::<libc::c_long>(),
};

/// Bounds-checked cursor over one batched read.
///
/// Iteration yields the payload span of each well-formed record and ends at
/// the first malformed one.
pub struct RecordCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    layout: RecordLayout,
    halted: bool,
}

impl<'a> RecordCursor<'a> {
    pub fn new(buf: &'a [u8], layout: RecordLayout) -> Self {
        RecordCursor {
            buf,
            pos: 0,
            layout,
            halted: layout.alignment == 0,
        }
    }

    fn halt(&mut self) -> Option<&'a [u8]> {
        self.halted = true;
        None
    }
}

impl<'a> Iterator for RecordCursor<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.halted {
            return None;
        }
        let record = &self.buf[self.pos.min(self.buf.len())..];
        let fixed = self.layout.fixed_header_len();
        if record.len() < fixed {
            // End of buffer, or a truncated trailing header.
            return self.halt();
        }

        let caplen_at = self.layout.caplen_offset;
        let hdrlen_at = self.layout.hdrlen_offset;
        let caplen =
            u32::from_ne_bytes([record[caplen_at], record[caplen_at + 1], record[caplen_at + 2], record[caplen_at + 3]]) as usize;
        let hdrlen = u16::from_ne_bytes([record[hdrlen_at], record[hdrlen_at + 1]]) as usize;

        if hdrlen < fixed {
            return self.halt();
        }
        let end = match hdrlen.checked_add(caplen) {
            Some(end) if end <= record.len() => end,
            _ => return self.halt(),
        };

        let payload = &record[hdrlen..end];
        let advance = match end.checked_add(self.layout.alignment - 1) {
            Some(padded) => padded / self.layout.alignment * self.layout.alignment,
            None => return self.halt(),
        };
        self.pos += advance;
        Some(payload)
    }
}
