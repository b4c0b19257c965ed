//! FFmpeg custom I/O bridge.
//! All unsafe AVIOContext code is isolated in this module.
//!
//! FFmpeg pulls bytes through two C callbacks that receive an opaque user
//! pointer. That pointer is the heap address of a [`VirtualIo`] owned by a
//! [`SourceCell`]; the callbacks recover it and delegate immediately.

use std::os::raw::{c_int, c_void};
use std::ptr::NonNull;
use std::slice;

use ffmpeg_next::ffi;
use tracing::debug;

use crate::io::virtual_io::{IoError, VirtualIo, Whence};

/// Heap-pinned [`VirtualIo`] whose address is handed to FFmpeg.
///
/// All access goes through the raw pointer so that FFmpeg's copy of it stays
/// valid across calls; FFmpeg only dereferences it while the owner is inside
/// a demux call.
pub struct SourceCell {
    ptr: NonNull<VirtualIo>,
}

impl SourceCell {
    /// Move `io` to the heap
    pub fn new(io: VirtualIo) -> Self {
        let ptr = NonNull::from(Box::leak(Box::new(io)));
        Self { ptr }
    }

    /// Get the adapter
    pub fn get(&self) -> &VirtualIo {
        // SAFETY: the pointer comes from a live Box owned by self
        unsafe { self.ptr.as_ref() }
    }

    /// Get the adapter mutably
    pub fn get_mut(&mut self) -> &mut VirtualIo {
        // SAFETY: as above; &mut self rules out a concurrent FFmpeg callback
        unsafe { self.ptr.as_mut() }
    }

    /// Opaque user pointer for `avio_alloc_context`
    pub fn as_opaque(&self) -> *mut c_void {
        self.ptr.as_ptr().cast()
    }
}

impl Drop for SourceCell {
    fn drop(&mut self) {
        // SAFETY: reclaims the Box leaked in new()
        unsafe { drop(Box::from_raw(self.ptr.as_ptr())) };
    }
}

/// Owned `AVIOContext` reading through a [`SourceCell`].
///
/// Must be dropped after the format context using it, and before the
/// `SourceCell` it points at.
pub struct AvioContext {
    ptr: NonNull<ffi::AVIOContext>,
}

impl AvioContext {
    /// Allocate an I/O context with a `buffer_size` byte internal buffer.
    ///
    /// With `fixed_block_size`, the context also caps its packet size to
    /// the buffer size.
    ///
    /// # Safety
    ///
    /// `opaque` must come from [`SourceCell::as_opaque`] and that cell must
    /// outlive the returned context.
    pub unsafe fn new(opaque: *mut c_void, buffer_size: usize, fixed_block_size: bool) -> Option<Self> {
        let buffer_len = c_int::try_from(buffer_size).ok()?;

        let buffer = ffi::av_malloc(buffer_size).cast::<u8>();
        if buffer.is_null() {
            return None;
        }

        let ctx = ffi::avio_alloc_context(
            buffer,
            buffer_len,
            0,
            opaque,
            Some(read_packet),
            None,
            Some(seek),
        );

        let Some(ptr) = NonNull::new(ctx) else {
            ffi::av_free(buffer.cast());
            return None;
        };

        if fixed_block_size {
            (*ptr.as_ptr()).max_packet_size = buffer_len;
        }

        Some(Self { ptr })
    }

    /// Raw pointer for `AVFormatContext::pb`
    pub fn as_mut_ptr(&self) -> *mut ffi::AVIOContext {
        self.ptr.as_ptr()
    }

    /// Sticky error recorded by the last failed read, 0 if none
    pub fn error(&self) -> c_int {
        // SAFETY: ptr is a live context owned by self
        unsafe { (*self.ptr.as_ptr()).error }
    }

    /// Forget a sticky error/EOF so the next read calls back into the adapter
    pub fn clear_error(&mut self) {
        // SAFETY: ptr is a live context owned by self
        unsafe {
            let ctx = self.ptr.as_ptr();
            (*ctx).error = 0;
            (*ctx).eof_reached = 0;
        }
    }
}

impl Drop for AvioContext {
    fn drop(&mut self) {
        unsafe {
            let mut ctx = self.ptr.as_ptr();
            // FFmpeg may have swapped the buffer, free whatever it holds now
            ffi::av_freep(std::ptr::addr_of_mut!((*ctx).buffer).cast());
            ffi::avio_context_free(&mut ctx);
        }
    }
}

/// Read callback invoked by FFmpeg
unsafe extern "C" fn read_packet(opaque: *mut c_void, buf: *mut u8, buf_size: c_int) -> c_int {
    let Some(io) = opaque.cast::<VirtualIo>().as_mut() else {
        return ffi::AVERROR_EXIT;
    };

    if buf.is_null() || buf_size <= 0 {
        return IoError::InvalidCapacity(buf_size).to_averror();
    }

    let dest = slice::from_raw_parts_mut(buf, buf_size as usize);
    match io.read_next(dest) {
        Ok(copied) => copied as c_int,
        Err(err) => {
            if !err.is_transient() {
                debug!(position = io.store().position(), probing = io.is_probing(), %err, "read stopped");
            }
            err.to_averror()
        }
    }
}

/// Seek callback invoked by FFmpeg
unsafe extern "C" fn seek(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    let Some(io) = opaque.cast::<VirtualIo>().as_mut() else {
        return ffi::AVERROR_EXIT as i64;
    };

    let result = Whence::from_raw(whence)
        .ok_or(IoError::UnknownWhence(whence))
        .and_then(|whence| io.seek(offset, whence));

    match result {
        Ok(position) => position as i64,
        Err(err) => {
            debug!(offset, whence, %err, "seek rejected");
            err.to_averror() as i64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell_with(chunks: &[&[u8]]) -> SourceCell {
        let mut cell = SourceCell::new(VirtualIo::new());
        for chunk in chunks {
            cell.get_mut().store_mut().append(*chunk);
        }
        cell
    }

    #[test]
    fn test_read_callback() {
        let cell = cell_with(&[b"abc", b"de"]);
        let mut buf = [0u8; 8];

        let n = unsafe { read_packet(cell.as_opaque(), buf.as_mut_ptr(), buf.len() as c_int) };
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(cell.get().store().position(), 3);
    }

    #[test]
    fn test_read_callback_status_codes() {
        let mut cell = cell_with(&[]);
        let mut buf = [0u8; 8];

        let n = unsafe { read_packet(cell.as_opaque(), buf.as_mut_ptr(), buf.len() as c_int) };
        assert_eq!(n, ffi::AVERROR(libc::EAGAIN));

        cell.get_mut().set_probing(true);
        let n = unsafe { read_packet(cell.as_opaque(), buf.as_mut_ptr(), buf.len() as c_int) };
        assert_eq!(n, ffi::AVERROR_EOF);

        let n = unsafe { read_packet(cell.as_opaque(), buf.as_mut_ptr(), 0) };
        assert_eq!(n, ffi::AVERROR_EXIT);

        let n = unsafe { read_packet(std::ptr::null_mut(), buf.as_mut_ptr(), 8) };
        assert_eq!(n, ffi::AVERROR_EXIT);
    }

    #[test]
    fn test_seek_callback() {
        let cell = cell_with(&[b"abc", b"de"]);
        let size = ffi::AVSEEK_SIZE as c_int;

        unsafe {
            assert_eq!(seek(cell.as_opaque(), 0, size), 5);
            assert_eq!(seek(cell.as_opaque(), 5, libc::SEEK_SET), 5);
            assert!(seek(cell.as_opaque(), 6, libc::SEEK_SET) < 0);
            assert!(seek(cell.as_opaque(), -1, libc::SEEK_SET) < 0);
            assert!(seek(cell.as_opaque(), 0, 7) < 0);
        }
        assert_eq!(cell.get().store().position(), 5);
    }
}
