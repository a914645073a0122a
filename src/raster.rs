//! Decoding, canvas allocation and pixel compositing helpers.

use std::path::Path;

use image::{
    imageops::{flip_horizontal_in_place, flip_vertical_in_place},
    DynamicImage, Rgba, RgbaImage,
};

use crate::{WarpError, WarpResult};

/// Upper bound on a single canvas allocation (1 GiB of RGBA data).
pub const MAX_CANVAS_BYTES: u64 = 1 << 30;

/// Fully transparent pixel used for fresh canvases.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Mirror flags applied to an image as it is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flip {
    pub horizontal: bool,
    pub vertical: bool,
}

impl Flip {
    pub fn is_identity(&self) -> bool {
        !self.horizontal && !self.vertical
    }

    /// Flips `image` in place according to the flags.
    pub fn apply(&self, image: &mut RgbaImage) {
        if self.horizontal {
            flip_horizontal_in_place(image);
        }
        if self.vertical {
            flip_vertical_in_place(image);
        }
    }
}

/// Decodes an in-memory encoded image into RGBA.
pub fn decode_source(bytes: &[u8]) -> WarpResult<RgbaImage> {
    let decoded = image::load_from_memory(bytes)?;
    debug!("decoded {}x{} source", decoded.width(), decoded.height());
    Ok(decoded.to_rgba8())
}

/// Opens and decodes an image file into RGBA.
pub fn open_source<P: AsRef<Path>>(path: P) -> WarpResult<RgbaImage> {
    Ok(image::open(path)?.to_rgba8())
}

/// Converts an already decoded image into the RGBA layout every warp works on.
pub fn to_source(image: DynamicImage) -> RgbaImage {
    image.into_rgba8()
}

/// Allocates a transparent `width × height` canvas.
///
/// Fails with [`WarpError::ResourceUnavailable`] for empty canvases or ones larger
/// than [`MAX_CANVAS_BYTES`].
pub fn allocate_canvas(width: u32, height: u32) -> WarpResult<RgbaImage> {
    if width == 0 || height == 0 {
        return Err(WarpError::ResourceUnavailable(format!(
            "cannot allocate an empty {width}x{height} canvas"
        )));
    }
    let bytes = u64::from(width) * u64::from(height) * 4;
    if bytes > MAX_CANVAS_BYTES {
        return Err(WarpError::ResourceUnavailable(format!(
            "{width}x{height} canvas needs {bytes} bytes"
        )));
    }
    Ok(RgbaImage::from_pixel(width, height, TRANSPARENT))
}

/// Source-over compositing of a straight-alpha RGBA pixel onto `dst`.
#[inline]
pub(crate) fn blend_over(dst: &mut [u8], src: &[u8]) {
    let sa = u32::from(src[3]);
    if sa == 255 {
        dst[..4].copy_from_slice(&src[..4]);
        return;
    }
    if sa == 0 {
        return;
    }
    let da = u32::from(dst[3]) * (255 - sa) / 255;
    let out_a = sa + da;
    for c in 0..3 {
        dst[c] = ((u32::from(src[c]) * sa + u32::from(dst[c]) * da) / out_a) as u8;
    }
    dst[3] = out_a as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    #[test]
    fn allocate_rejects_empty_and_huge() {
        assert!(matches!(
            allocate_canvas(0, 10),
            Err(WarpError::ResourceUnavailable(_))
        ));
        assert!(matches!(
            allocate_canvas(u32::MAX, u32::MAX),
            Err(WarpError::ResourceUnavailable(_))
        ));
        let canvas = allocate_canvas(3, 2).unwrap();
        assert_eq!(canvas.dimensions(), (3, 2));
        assert!(canvas.pixels().all(|p| *p == TRANSPARENT));
    }

    #[test]
    fn blend_over_opaque_and_transparent() {
        let mut dst = [10u8, 20, 30, 255];
        blend_over(&mut dst, &[1, 2, 3, 0]);
        assert_eq!(dst, [10, 20, 30, 255]);
        blend_over(&mut dst, &[1, 2, 3, 255]);
        assert_eq!(dst, [1, 2, 3, 255]);
    }

    #[test]
    fn blend_over_half_alpha_onto_empty() {
        let mut dst = [0u8, 0, 0, 0];
        blend_over(&mut dst, &[200, 100, 50, 128]);
        assert_eq!(dst, [200, 100, 50, 128]);
    }

    #[test]
    fn decode_round_trips_png_bytes() {
        let image = RgbaImage::from_pixel(4, 3, Rgba([9, 8, 7, 255]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let decoded = decode_source(&bytes).unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn decode_failure_is_surfaced() {
        assert!(matches!(
            decode_source(b"definitely not an image"),
            Err(WarpError::DecodeFailure(_))
        ));
    }

    #[test]
    fn flip_mirrors_axes() {
        let mut image = RgbaImage::from_fn(2, 2, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        Flip {
            horizontal: true,
            vertical: false,
        }
        .apply(&mut image);
        assert_eq!(image.get_pixel(0, 0), &Rgba([1, 0, 0, 255]));
        Flip {
            horizontal: false,
            vertical: true,
        }
        .apply(&mut image);
        assert_eq!(image.get_pixel(0, 0), &Rgba([1, 1, 0, 255]));
        assert!(Flip::default().is_identity());
    }
}
