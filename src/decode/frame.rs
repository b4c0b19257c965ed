//! Borrowed view of the decoder's output buffer.

use std::ops::Deref;

/// Decoded RGBA8 frame, borrowed from the decoder.
///
/// The decoder keeps a single output buffer that the next successful decode
/// step overwrites in place. The borrow keeps the decoder locked while the
/// view is alive; copy with [`FrameView::to_vec`] to keep pixels longer.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    stride: usize,
}

impl<'a> FrameView<'a> {
    pub(crate) fn new(data: &'a [u8], width: u32, height: u32, stride: usize) -> Self {
        Self {
            data,
            width,
            height,
            stride,
        }
    }

    /// View with no pixels, returned when no buffer exists
    pub fn empty() -> Self {
        Self::new(&[], 0, 0, 0)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Distance between rows in bytes
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Whole buffer, rows padded to `stride`
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Pixels of row `y` without padding
    pub fn row(&self, y: u32) -> Option<&'a [u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride;
        self.data.get(start..start + self.width as usize * 4)
    }

    /// Copy the buffer out
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }
}

impl Deref for FrameView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data
    }
}

impl AsRef<[u8]> for FrameView<'_> {
    fn as_ref(&self) -> &[u8] {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows() {
        let data: Vec<u8> = (0..24).collect();
        let view = FrameView::new(&data, 2, 3, 8);

        assert_eq!(view.len(), 24);
        assert_eq!(view.row(0), Some(&data[0..8]));
        assert_eq!(view.row(2), Some(&data[16..24]));
        assert_eq!(view.row(3), None);
    }

    #[test]
    fn test_empty() {
        let view = FrameView::empty();
        assert!(view.is_empty());
        assert_eq!(view.row(0), None);
        assert!(view.to_vec().is_empty());
    }
}
