//! Output frame geometry: downscale policy and RGBA buffer layout.

/// Bytes per RGBA pixel
pub const RGBA_BYTES_PER_PIXEL: usize = 4;

/// Row alignment of the output buffer in bytes
pub const ROW_ALIGNMENT: usize = 4;

/// Halve `width` and `height` until the larger one fits within `max_dimension`.
///
/// A `max_dimension` of 0 leaves the size unconstrained. Returns `None` when
/// halving collapses either dimension to zero.
pub fn fit_dimensions(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    let (mut width, mut height) = (width, height);

    if max_dimension > 0 {
        while width.max(height) > max_dimension {
            width /= 2;
            height /= 2;
        }
    }

    if width == 0 || height == 0 {
        None
    } else {
        Some((width, height))
    }
}

/// Length in bytes of one aligned RGBA row
#[inline]
pub fn rgba_stride(width: u32) -> usize {
    let row = width as usize * RGBA_BYTES_PER_PIXEL;
    row.div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT
}

/// Size in bytes of an aligned RGBA image
#[inline]
pub fn rgba_frame_size(width: u32, height: u32) -> usize {
    rgba_stride(width) * height as usize
}

/// Geometry negotiated when a stream is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub source_width: u32,
    pub source_height: u32,
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub byte_size: usize,
}

impl FrameGeometry {
    /// Fit the natural stream size within `max_dimension`.
    /// Returns `None` if the downscale collapses to zero.
    pub fn negotiate(source_width: u32, source_height: u32, max_dimension: u32) -> Option<Self> {
        let (width, height) = fit_dimensions(source_width, source_height, max_dimension)?;

        Some(Self {
            source_width,
            source_height,
            width,
            height,
            stride: rgba_stride(width),
            byte_size: rgba_frame_size(width, height),
        })
    }

    /// Whether the output differs from the natural size
    pub fn is_downscaled(&self) -> bool {
        self.width != self.source_width || self.height != self.source_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halves_until_within_max() {
        assert_eq!(fit_dimensions(4000, 3000, 500), Some((500, 375)));
        assert_eq!(fit_dimensions(1920, 1080, 480), Some((480, 270)));
        assert_eq!(fit_dimensions(640, 480, 480), Some((320, 240)));
    }

    #[test]
    fn test_fits_already() {
        assert_eq!(fit_dimensions(320, 240, 480), Some((320, 240)));
        assert_eq!(fit_dimensions(480, 480, 480), Some((480, 480)));
    }

    #[test]
    fn test_zero_max_is_unconstrained() {
        assert_eq!(fit_dimensions(7680, 4320, 0), Some((7680, 4320)));
    }

    #[test]
    fn test_collapse_to_zero() {
        // 3000x1 halves to 1500x0 before the width fits
        assert_eq!(fit_dimensions(3000, 1, 500), None);
        assert_eq!(fit_dimensions(0, 240, 0), None);
    }

    #[test]
    fn test_rgba_layout() {
        assert_eq!(rgba_stride(1), 4);
        assert_eq!(rgba_stride(375), 1500);
        assert_eq!(rgba_frame_size(500, 375), 500 * 375 * 4);
    }

    #[test]
    fn test_negotiate() {
        let geometry = FrameGeometry::negotiate(4000, 3000, 500).unwrap();
        assert_eq!((geometry.width, geometry.height), (500, 375));
        assert!(geometry.is_downscaled());
        assert!(geometry.width as usize * geometry.height as usize * 4 <= geometry.byte_size);

        let native = FrameGeometry::negotiate(320, 240, 0).unwrap();
        assert!(!native.is_downscaled());
        assert_eq!(native.stride, 1280);
    }
}
