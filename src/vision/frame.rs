use image::{DynamicImage, RgbaImage};

use crate::error::HashError;
use crate::models::FrameSize;

/// A single raster pulled from a frame source.
///
/// Frames only live long enough to be fingerprinted; nothing in the crate
/// writes one to disk or to the database.
#[derive(Debug, Clone)]
pub struct Frame {
    pixels: RgbaImage,
}

impl Frame {
    pub fn from_rgba(pixels: RgbaImage) -> Result<Self, HashError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(HashError::EmptyFrame {
                width: pixels.width(),
                height: pixels.height(),
            });
        }
        Ok(Self { pixels })
    }

    pub fn from_image(image: DynamicImage) -> Result<Self, HashError> {
        Self::from_rgba(image.to_rgba8())
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.pixels.width(), self.pixels.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn rejects_empty_raster() {
        let err = Frame::from_rgba(RgbaImage::new(0, 10)).unwrap_err();
        assert_eq!(err, HashError::EmptyFrame { width: 0, height: 10 });
    }

    #[test]
    fn reports_size() {
        let frame = Frame::from_rgba(RgbaImage::from_pixel(720, 1280, Rgba([1, 2, 3, 255]))).unwrap();
        assert_eq!(frame.size(), FrameSize::new(720, 1280));
    }
}
