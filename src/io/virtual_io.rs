//! Pull-style read/seek view over the chunk store.
//! This is the file the demuxer believes it is reading from.

use std::os::raw::c_int;

use ffmpeg_next::ffi;
use tracing::trace;

use crate::core::ChunkStore;

/// Error type for virtual I/O operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IoError {
    #[error("No data available yet, retry later")]
    WouldBlock,
    #[error("End of stream")]
    EndOfStream,
    #[error("Invalid read capacity: {0}")]
    InvalidCapacity(i32),
    #[error("Negative seek offset: {0}")]
    NegativeOffset(i64),
    #[error("Seek target {target} is beyond the known size {size}")]
    OutOfRange { target: u64, size: u64 },
    #[error("Unknown seek mode: {0}")]
    UnknownWhence(i32),
}

impl IoError {
    /// Whether the caller may retry once more data has been ingested
    pub fn is_transient(&self) -> bool {
        matches!(self, IoError::WouldBlock)
    }

    /// FFmpeg status code reported back through the I/O callbacks
    pub fn to_averror(self) -> c_int {
        match self {
            IoError::WouldBlock => ffi::AVERROR(libc::EAGAIN),
            IoError::EndOfStream => ffi::AVERROR_EOF,
            _ => ffi::AVERROR_EXIT,
        }
    }
}

/// Reference point of a seek request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Absolute offset from the start of the stream
    Start,
    /// Relative to the current cursor
    Current,
    /// Relative to the end of the known data
    End,
    /// Query the total known size without moving
    Size,
}

impl Whence {
    /// Decode the `whence` argument of an FFmpeg seek callback.
    ///
    /// `AVSEEK_SIZE` takes precedence; the `AVSEEK_FORCE` hint is ignored.
    pub fn from_raw(whence: c_int) -> Option<Self> {
        if whence & ffi::AVSEEK_SIZE as c_int != 0 {
            return Some(Whence::Size);
        }

        match whence & !(ffi::AVSEEK_FORCE as c_int) {
            libc::SEEK_SET => Some(Whence::Start),
            libc::SEEK_CUR => Some(Whence::Current),
            libc::SEEK_END => Some(Whence::End),
            _ => None,
        }
    }
}

/// Randomly seekable file view over a forward-growing chunk store.
///
/// Never blocks and never fabricates bytes: when the requested range has not
/// arrived yet, reads report [`IoError::WouldBlock`].
///
/// While probing, the end of the buffered data reads as end of stream
/// instead. Parts of libavformat's probing retry `EAGAIN` in a loop without
/// returning, so they must see a hard end.
#[derive(Debug, Default)]
pub struct VirtualIo {
    store: ChunkStore,
    probing: bool,
}

impl VirtualIo {
    /// Create an adapter over an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the backing store
    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Get the backing store mutably
    pub fn store_mut(&mut self) -> &mut ChunkStore {
        &mut self.store
    }

    /// Treat the end of the buffered data as end of stream while `probing`
    pub fn set_probing(&mut self, probing: bool) {
        self.probing = probing;
    }

    pub fn is_probing(&self) -> bool {
        self.probing
    }

    /// Copy the next bytes at the cursor into `dest` and advance past them.
    ///
    /// Copies at most up to the end of the chunk holding the cursor.
    pub fn read_next(&mut self, dest: &mut [u8]) -> Result<usize, IoError> {
        if dest.is_empty() {
            return Err(IoError::InvalidCapacity(0));
        }

        let position = self.store.position();
        let copied = {
            let available = self.store.read_at(position, dest.len());
            dest[..available.len()].copy_from_slice(available);
            available.len()
        };

        if copied == 0 {
            let err = if (self.store.is_sealed() || self.probing) && self.store.at_end() {
                IoError::EndOfStream
            } else {
                IoError::WouldBlock
            };
            trace!(position, capacity = dest.len(), %err, "read unavailable");
            return Err(err);
        }

        self.store.advance(copied);
        trace!(position, copied, "read");
        Ok(copied)
    }

    /// Move the cursor, or query the size with [`Whence::Size`].
    ///
    /// Negative offsets are rejected for every `whence`, and so is any
    /// target past the known size.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64, IoError> {
        if offset < 0 {
            return Err(IoError::NegativeOffset(offset));
        }

        let size = self.store.size();
        let base = match whence {
            Whence::Size => return Ok(size),
            Whence::Start => 0,
            Whence::Current => self.store.position(),
            Whence::End => size,
        };

        let target = base.saturating_add(offset as u64);
        let position = self
            .store
            .set_position(target)
            .ok_or(IoError::OutOfRange { target, size })?;

        trace!(offset, ?whence, position, "seek");
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_with(chunks: &[&[u8]]) -> VirtualIo {
        let mut io = VirtualIo::new();
        for chunk in chunks {
            io.store_mut().append(*chunk);
        }
        io
    }

    #[test]
    fn test_read_advances_cursor() {
        let mut io = io_with(&[b"abcd", b"ef"]);
        let mut buf = [0u8; 3];

        assert_eq!(io.read_next(&mut buf), Ok(3));
        assert_eq!(&buf, b"abc");
        assert_eq!(io.read_next(&mut buf), Ok(1));
        assert_eq!(buf[0], b'd');
        assert_eq!(io.read_next(&mut buf), Ok(2));
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(io.store().position(), 6);
    }

    #[test]
    fn test_read_at_end_would_block() {
        let mut io = io_with(&[b"ab"]);
        let mut buf = [0u8; 8];
        io.read_next(&mut buf).unwrap();

        let err = io.read_next(&mut buf).unwrap_err();
        assert_eq!(err, IoError::WouldBlock);
        assert!(err.is_transient());
        assert_eq!(err.to_averror(), ffi::AVERROR(libc::EAGAIN));

        // More data arrives and the same read succeeds
        io.store_mut().append(&b"cd"[..]);
        assert_eq!(io.read_next(&mut buf), Ok(2));
    }

    #[test]
    fn test_read_before_any_data() {
        let mut io = VirtualIo::new();
        let mut buf = [0u8; 8];
        assert_eq!(io.read_next(&mut buf), Err(IoError::WouldBlock));
    }

    #[test]
    fn test_read_at_end_of_sealed_stream() {
        let mut io = io_with(&[b"ab"]);
        io.store_mut().seal();
        let mut buf = [0u8; 8];

        assert_eq!(io.read_next(&mut buf), Ok(2));
        let err = io.read_next(&mut buf).unwrap_err();
        assert_eq!(err, IoError::EndOfStream);
        assert_eq!(err.to_averror(), ffi::AVERROR_EOF);
    }

    #[test]
    fn test_probing_ends_at_buffered_data() {
        let mut io = io_with(&[b"ab"]);
        io.set_probing(true);
        let mut buf = [0u8; 8];

        assert_eq!(io.read_next(&mut buf), Ok(2));
        assert_eq!(io.read_next(&mut buf), Err(IoError::EndOfStream));

        // Once probing is over, the same position is only starved
        io.set_probing(false);
        assert_eq!(io.read_next(&mut buf), Err(IoError::WouldBlock));
        io.store_mut().append(&b"c"[..]);
        assert_eq!(io.read_next(&mut buf), Ok(1));
    }

    #[test]
    fn test_zero_capacity_is_fatal() {
        let mut io = io_with(&[b"ab"]);
        let err = io.read_next(&mut []).unwrap_err();
        assert_eq!(err, IoError::InvalidCapacity(0));
        assert!(!err.is_transient());
        assert_eq!(err.to_averror(), ffi::AVERROR_EXIT);
    }

    #[test]
    fn test_seek_bounds() {
        let mut io = io_with(&[b"abc", b"defg"]);

        assert_eq!(io.seek(7, Whence::Start), Ok(7));
        assert_eq!(
            io.seek(8, Whence::Start),
            Err(IoError::OutOfRange { target: 8, size: 7 })
        );
        assert_eq!(io.seek(-1, Whence::Start), Err(IoError::NegativeOffset(-1)));
        // Failed seeks leave the cursor alone
        assert_eq!(io.store().position(), 7);
    }

    #[test]
    fn test_seek_relative() {
        let mut io = io_with(&[b"abc", b"defg"]);

        assert_eq!(io.seek(2, Whence::Start), Ok(2));
        assert_eq!(io.seek(3, Whence::Current), Ok(5));
        assert!(io.seek(3, Whence::Current).is_err());
        assert_eq!(io.seek(0, Whence::End), Ok(7));
        assert!(io.seek(1, Whence::End).is_err());
        assert!(io.seek(-2, Whence::Current).is_err());
    }

    #[test]
    fn test_size_query_keeps_cursor() {
        let mut io = io_with(&[b"abc", b"defg"]);
        io.seek(4, Whence::Start).unwrap();

        assert_eq!(io.seek(0, Whence::Size), Ok(7));
        assert_eq!(io.store().position(), 4);
        assert_eq!(io.seek(-1, Whence::Size), Err(IoError::NegativeOffset(-1)));
    }

    #[test]
    fn test_read_after_seek() {
        let mut io = io_with(&[b"abc", b"defg"]);
        let mut buf = [0u8; 8];

        io.seek(4, Whence::Start).unwrap();
        assert_eq!(io.read_next(&mut buf), Ok(3));
        assert_eq!(&buf[..3], b"efg");
    }

    #[test]
    fn test_whence_from_raw() {
        assert_eq!(Whence::from_raw(libc::SEEK_SET), Some(Whence::Start));
        assert_eq!(Whence::from_raw(libc::SEEK_CUR), Some(Whence::Current));
        assert_eq!(Whence::from_raw(libc::SEEK_END), Some(Whence::End));
        assert_eq!(Whence::from_raw(ffi::AVSEEK_SIZE as c_int), Some(Whence::Size));
        assert_eq!(
            Whence::from_raw(libc::SEEK_SET | ffi::AVSEEK_FORCE as c_int),
            Some(Whence::Start)
        );
        assert_eq!(Whence::from_raw(42), None);
    }
}
