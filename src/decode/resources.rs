//! Owning wrappers around the FFmpeg objects used by the decode pipeline.
//! All unsafe libavformat / libavcodec / libswscale calls live here.
//!
//! Each wrapper frees its object on drop, so a pipeline that fails half-way
//! through opening releases exactly what it allocated.

use std::ffi::CStr;
use std::os::raw::c_int;
use std::ptr::{self, NonNull};
use std::slice;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::ffi;

use crate::decode::error::DecodeError;
use crate::io::AvioContext;

/// Pixel format of every decoded output frame
pub const TARGET_FORMAT: ffi::AVPixelFormat = ffi::AVPixelFormat::AV_PIX_FMT_RGBA;

fn codec_name(codec_id: ffi::AVCodecID) -> String {
    // SAFETY: avcodec_get_name returns a static string or null
    unsafe {
        let name = ffi::avcodec_get_name(codec_id);
        if name.is_null() {
            "unknown".to_string()
        } else {
            CStr::from_ptr(name).to_string_lossy().into_owned()
        }
    }
}

/// Demuxer context reading through a custom [`AvioContext`]
pub struct FormatInput {
    ptr: NonNull<ffi::AVFormatContext>,
}

impl FormatInput {
    /// Open and probe the input behind `avio`.
    ///
    /// The context is opened non-blocking so that an empty read surfaces as
    /// `EAGAIN` instead of a stall.
    pub fn open(avio: &AvioContext, source_name: &CStr) -> Result<Self, DecodeError> {
        unsafe {
            let mut ctx = ffi::avformat_alloc_context();
            if ctx.is_null() {
                return Err(DecodeError::Allocation("AVFormatContext"));
            }

            (*ctx).flags |= ffi::AVFMT_FLAG_NONBLOCK as c_int;
            (*ctx).pb = avio.as_mut_ptr();

            // On failure FFmpeg frees the context and nulls the pointer,
            // but leaves the custom pb to us
            let ret = ffi::avformat_open_input(&mut ctx, source_name.as_ptr(), ptr::null(), ptr::null_mut());
            if ret < 0 {
                return Err(DecodeError::OpenInput(ffmpeg::Error::from(ret)));
            }

            NonNull::new(ctx)
                .map(|ptr| Self { ptr })
                .ok_or(DecodeError::Allocation("AVFormatContext"))
        }
    }

    /// Read packets ahead to fill in stream parameters
    pub fn find_stream_info(&mut self) -> Result<(), ffmpeg::Error> {
        let ret = unsafe { ffi::avformat_find_stream_info(self.ptr.as_ptr(), ptr::null_mut()) };
        if ret < 0 {
            Err(ffmpeg::Error::from(ret))
        } else {
            Ok(())
        }
    }

    fn streams(&self) -> &[*mut ffi::AVStream] {
        unsafe {
            let ctx = self.ptr.as_ptr();
            if (*ctx).streams.is_null() {
                return &[];
            }
            slice::from_raw_parts((*ctx).streams, (*ctx).nb_streams as usize)
        }
    }

    /// Number of streams found in the container
    pub fn stream_count(&self) -> usize {
        self.streams().len()
    }

    /// Index of the first stream of the given media type
    pub fn first_stream_of(&self, media_type: ffi::AVMediaType) -> Option<usize> {
        self.streams().iter().position(|&stream| unsafe {
            !stream.is_null() && !(*stream).codecpar.is_null() && (*(*stream).codecpar).codec_type == media_type
        })
    }

    /// Codec parameters of stream `index`
    pub fn codec_parameters(&self, index: usize) -> Option<*const ffi::AVCodecParameters> {
        let stream = *self.streams().get(index)?;
        let params = unsafe { (*stream).codecpar };
        (!params.is_null()).then_some(params.cast_const())
    }

    /// Demux the next packet into `packet`. Errors are raw FFmpeg status codes.
    pub fn read_packet(&mut self, packet: &mut Packet) -> Result<(), c_int> {
        let ret = unsafe { ffi::av_read_frame(self.ptr.as_ptr(), packet.as_mut_ptr()) };
        if ret < 0 {
            Err(ret)
        } else {
            Ok(())
        }
    }
}

impl Drop for FormatInput {
    fn drop(&mut self) {
        unsafe {
            let mut ctx = self.ptr.as_ptr();
            ffi::avformat_close_input(&mut ctx);
        }
    }
}

/// Opened video decoder
pub struct CodecContext {
    ptr: NonNull<ffi::AVCodecContext>,
}

impl CodecContext {
    /// Find a decoder for `params`, copy the parameters into a fresh context and open it.
    ///
    /// # Safety
    ///
    /// `params` must point to live codec parameters, e.g. from
    /// [`FormatInput::codec_parameters`] while that input is alive.
    pub unsafe fn open_decoder(params: *const ffi::AVCodecParameters) -> Result<Self, DecodeError> {
        let codec_id = (*params).codec_id;
        let codec = ffi::avcodec_find_decoder(codec_id);
        if codec.is_null() {
            return Err(DecodeError::CodecNotFound(codec_name(codec_id)));
        }

        let ptr = NonNull::new(ffi::avcodec_alloc_context3(codec))
            .ok_or(DecodeError::Allocation("AVCodecContext"))?;
        let context = Self { ptr };

        let ret = ffi::avcodec_parameters_to_context(context.ptr.as_ptr(), params);
        if ret < 0 {
            return Err(DecodeError::CodecOpen(ffmpeg::Error::from(ret)));
        }

        let ret = ffi::avcodec_open2(context.ptr.as_ptr(), codec, ptr::null_mut());
        if ret < 0 {
            return Err(DecodeError::CodecOpen(ffmpeg::Error::from(ret)));
        }

        Ok(context)
    }

    pub fn width(&self) -> i32 {
        unsafe { (*self.ptr.as_ptr()).width }
    }

    pub fn height(&self) -> i32 {
        unsafe { (*self.ptr.as_ptr()).height }
    }

    pub fn pixel_format(&self) -> ffi::AVPixelFormat {
        unsafe { (*self.ptr.as_ptr()).pix_fmt }
    }

    pub fn codec_name(&self) -> String {
        codec_name(unsafe { (*self.ptr.as_ptr()).codec_id })
    }

    /// Feed one compressed packet. Returns the raw FFmpeg status.
    pub fn send_packet(&mut self, packet: &Packet) -> c_int {
        unsafe { ffi::avcodec_send_packet(self.ptr.as_ptr(), packet.as_ptr()) }
    }

    /// Fetch the next decoded frame, if any. Returns the raw FFmpeg status.
    pub fn receive_frame(&mut self, frame: &mut Frame) -> c_int {
        unsafe { ffi::avcodec_receive_frame(self.ptr.as_ptr(), frame.as_mut_ptr()) }
    }
}

impl Drop for CodecContext {
    fn drop(&mut self) {
        unsafe {
            let mut ctx = self.ptr.as_ptr();
            ffi::avcodec_free_context(&mut ctx);
        }
    }
}

/// Software scaler converting decoded frames to RGBA at a fixed size
pub struct Scaler {
    ptr: NonNull<ffi::SwsContext>,
    src_width: c_int,
    src_height: c_int,
    src_format: ffi::AVPixelFormat,
}

impl Scaler {
    /// Create a bilinear scaler. Parameters are fixed for its lifetime.
    pub fn new(
        src_width: c_int,
        src_height: c_int,
        src_format: ffi::AVPixelFormat,
        dst_width: c_int,
        dst_height: c_int,
    ) -> Option<Self> {
        let ctx = unsafe {
            ffi::sws_getContext(
                src_width,
                src_height,
                src_format,
                dst_width,
                dst_height,
                TARGET_FORMAT,
                ffi::SWS_BILINEAR as c_int,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null(),
            )
        };

        NonNull::new(ctx).map(|ptr| Self {
            ptr,
            src_width,
            src_height,
            src_format,
        })
    }

    /// Whether `frame` has the size and format this scaler was built for
    pub fn accepts(&self, frame: &Frame) -> bool {
        frame.width() == self.src_width
            && frame.height() == self.src_height
            && frame.format() == self.src_format as c_int
    }

    /// Convert `frame` into `dest`, whose rows are `stride` bytes apart.
    ///
    /// `dest` must hold at least `stride * dst_height` bytes.
    pub fn scale(&mut self, frame: &Frame, dest: &mut [u8], stride: usize) -> Result<(), DecodeError> {
        if !self.accepts(frame) {
            return Err(DecodeError::SourceChanged {
                width: frame.width(),
                height: frame.height(),
                format: frame.format(),
            });
        }

        let stride = c_int::try_from(stride).map_err(|_| DecodeError::Scale(ffmpeg::Error::Bug))?;
        let dst_data: [*mut u8; 4] = [dest.as_mut_ptr(), ptr::null_mut(), ptr::null_mut(), ptr::null_mut()];
        let dst_stride: [c_int; 4] = [stride, 0, 0, 0];

        let ret = unsafe {
            let src = frame.as_ptr();
            ffi::sws_scale(
                self.ptr.as_ptr(),
                (*src).data.as_ptr() as *const *const u8,
                (*src).linesize.as_ptr(),
                0,
                self.src_height,
                dst_data.as_ptr(),
                dst_stride.as_ptr(),
            )
        };

        if ret < 0 {
            return Err(DecodeError::Scale(ffmpeg::Error::from(ret)));
        }
        Ok(())
    }
}

impl Drop for Scaler {
    fn drop(&mut self) {
        unsafe { ffi::sws_freeContext(self.ptr.as_ptr()) };
    }
}

/// Reusable decoded frame
pub struct Frame {
    ptr: NonNull<ffi::AVFrame>,
}

impl Frame {
    pub fn alloc() -> Result<Self, DecodeError> {
        NonNull::new(unsafe { ffi::av_frame_alloc() })
            .map(|ptr| Self { ptr })
            .ok_or(DecodeError::Allocation("AVFrame"))
    }

    pub fn width(&self) -> c_int {
        unsafe { (*self.ptr.as_ptr()).width }
    }

    pub fn height(&self) -> c_int {
        unsafe { (*self.ptr.as_ptr()).height }
    }

    /// Raw pixel format of the frame
    pub fn format(&self) -> c_int {
        unsafe { (*self.ptr.as_ptr()).format }
    }

    fn as_ptr(&self) -> *const ffi::AVFrame {
        self.ptr.as_ptr()
    }

    fn as_mut_ptr(&mut self) -> *mut ffi::AVFrame {
        self.ptr.as_ptr()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        unsafe {
            let mut frame = self.ptr.as_ptr();
            ffi::av_frame_free(&mut frame);
        }
    }
}

/// Demuxed packet, unreferenced and freed on drop
pub struct Packet {
    ptr: NonNull<ffi::AVPacket>,
}

impl Packet {
    pub fn alloc() -> Result<Self, DecodeError> {
        NonNull::new(unsafe { ffi::av_packet_alloc() })
            .map(|ptr| Self { ptr })
            .ok_or(DecodeError::Allocation("AVPacket"))
    }

    /// Index of the stream this packet belongs to
    pub fn stream_index(&self) -> usize {
        unsafe { (*self.ptr.as_ptr()).stream_index as usize }
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        unsafe { (*self.ptr.as_ptr()).size.max(0) as usize }
    }

    fn as_ptr(&self) -> *const ffi::AVPacket {
        self.ptr.as_ptr()
    }

    fn as_mut_ptr(&mut self) -> *mut ffi::AVPacket {
        self.ptr.as_ptr()
    }
}

impl Drop for Packet {
    fn drop(&mut self) {
        unsafe {
            let mut packet = self.ptr.as_ptr();
            ffi::av_packet_free(&mut packet);
        }
    }
}
