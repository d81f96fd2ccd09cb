//! Pixel work, delegated to the `image` crate.
//!
//! Everything here is synchronous and CPU-bound; async callers go through
//! [`normalize_blocking`] and [`render_blocking`].

use std::{borrow::Cow, io::Cursor};

use axum::body::Bytes;
use image::{
    codecs::{jpeg::JpegEncoder, webp::WebPEncoder},
    imageops::FilterType,
    DynamicImage, ImageFormat,
};

use crate::{
    error::{Error, Result},
    transform::{Directive, Resize},
};

/// Longest side allowed for a stored image.
pub const MAX_STORED_DIMENSION: u32 = 3000;
/// JPEG output quality. Stored WebP is lossless, so this is the only place
/// a quality setting applies.
pub const QUALITY: u8 = 95;
pub const STORE_FORMAT: ImageFormat = ImageFormat::WebP;

const FILTER: FilterType = FilterType::Lanczos3;

#[derive(Debug)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl Rendered {
    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// Decodes an upload, shrinks it to fit [`MAX_STORED_DIMENSION`] and
/// re-encodes it in the storage format.
pub fn normalize(payload: &[u8]) -> Result<Vec<u8>> {
    let image = image::load_from_memory(payload).map_err(Error::Undecodable)?;
    let image = fit_within(image, MAX_STORED_DIMENSION);
    encode(&image, STORE_FORMAT)
}

/// Applies a directive to stored bytes: resize first, then re-encode.
pub fn render(stored: Vec<u8>, directive: &Directive) -> Result<Rendered> {
    let format = match &directive.format {
        Some(name) => output_format(name)?,
        None => STORE_FORMAT,
    };
    if directive.resize.is_none() && format == STORE_FORMAT {
        return Ok(Rendered {
            bytes: stored,
            format,
        });
    }

    let mut image = image::load_from_memory(&stored)?;
    if let Some(resize) = &directive.resize {
        image = apply_resize(image, resize);
    }
    Ok(Rendered {
        bytes: encode(&image, format)?,
        format,
    })
}

pub async fn normalize_blocking(payload: Bytes) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || normalize(&payload)).await?
}

pub async fn render_blocking(stored: Vec<u8>, directive: Directive) -> Result<Rendered> {
    tokio::task::spawn_blocking(move || render(stored, &directive)).await?
}

/// Looks a format up by its usual file extension (`png`, `jpg`, `jpeg`, ...).
pub fn output_format(name: &str) -> Result<ImageFormat> {
    ImageFormat::from_extension(name.to_ascii_lowercase())
        .filter(|format| format.writing_enabled())
        .ok_or_else(|| Error::UnsupportedFormat(name.to_string()))
}

fn fit_within(image: DynamicImage, bound: u32) -> DynamicImage {
    if image.width() <= bound && image.height() <= bound {
        return image;
    }
    image.resize(bound, bound, FILTER)
}

fn apply_resize(image: DynamicImage, resize: &Resize) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let limit = |target: u32, current: u32| {
        if resize.allow_upscale {
            target
        } else {
            target.min(current)
        }
    };
    match (resize.width, resize.height) {
        (Some(w), Some(h)) => {
            let (w, h) = (limit(w, width), limit(h, height));
            if (w, h) == (width, height) {
                image
            } else {
                image.resize_to_fill(w, h, FILTER)
            }
        }
        (Some(w), None) => {
            let w = limit(w, width);
            if w == width {
                image
            } else {
                image.resize(w, u32::MAX, FILTER)
            }
        }
        (None, Some(h)) => {
            let h = limit(h, height);
            if h == height {
                image
            } else {
                image.resize(u32::MAX, h, FILTER)
            }
        }
        (None, None) => image,
    }
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    match format {
        ImageFormat::WebP => {
            eight_bit(image).write_with_encoder(WebPEncoder::new_lossless(&mut buf))?
        }
        // JPEG has no alpha channel.
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, QUALITY))?,
        other => eight_bit(image).write_to(&mut buf, other)?,
    }
    Ok(buf.into_inner())
}

fn eight_bit(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    match image {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => Cow::Borrowed(image),
        _ if image.color().has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8())),
        _ => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn stored(width: u32, height: u32) -> Vec<u8> {
        normalize(&png_bytes(width, height)).unwrap()
    }

    fn dims(bytes: &[u8]) -> (u32, u32) {
        let image = image::load_from_memory(bytes).unwrap();
        (image.width(), image.height())
    }

    #[test]
    fn normalize_stores_webp() {
        let bytes = stored(40, 20);
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::WebP);
        assert_eq!(dims(&bytes), (40, 20));
    }

    #[test]
    fn stored_webp_keeps_every_pixel() {
        let original = png_bytes(33, 17);
        let stored = normalize(&original).unwrap();
        let before = image::load_from_memory(&original).unwrap().to_rgb8();
        let after = image::load_from_memory(&stored).unwrap().to_rgb8();
        assert_eq!(before, after);
    }

    #[test]
    fn normalize_caps_longer_side() {
        let bytes = stored(3200, 100);
        let (w, h) = dims(&bytes);
        assert_eq!(w, 3000);
        assert!(h <= 100);

        let bytes = stored(50, 3100);
        let (w, h) = dims(&bytes);
        assert_eq!(h, 3000);
        assert!(w <= 50);
    }

    #[test]
    fn normalize_rejects_garbage() {
        let err = normalize(b"definitely not an image").unwrap_err();
        assert!(matches!(err, Error::Undecodable(_)));
    }

    #[test]
    fn identity_returns_stored_bytes() {
        let bytes = stored(10, 10);
        let rendered = render(bytes.clone(), &Directive::default()).unwrap();
        assert_eq!(rendered.bytes, bytes);
        assert_eq!(rendered.content_type(), "image/webp");
    }

    #[test]
    fn width_keeps_aspect() {
        let directive = Directive::build(Some("100"), None, None);
        let rendered = render(stored(400, 200), &directive).unwrap();
        assert_eq!(dims(&rendered.bytes), (100, 50));
        assert_eq!(rendered.format, ImageFormat::WebP);
    }

    #[test]
    fn never_upscales() {
        let directive = Directive::build(Some("1000"), None, None);
        let rendered = render(stored(80, 60), &directive).unwrap();
        assert_eq!(dims(&rendered.bytes), (80, 60));

        let directive = Directive::build(Some("1000"), Some("30"), None);
        let rendered = render(stored(80, 60), &directive).unwrap();
        assert_eq!(dims(&rendered.bytes), (80, 30));
    }

    #[test]
    fn both_dimensions_fill() {
        let directive = Directive::build(Some("20"), Some("20"), None);
        let rendered = render(stored(80, 40), &directive).unwrap();
        assert_eq!(dims(&rendered.bytes), (20, 20));
    }

    #[test]
    fn format_conversion() {
        let directive = Directive::build(None, None, Some("png"));
        let rendered = render(stored(8, 8), &directive).unwrap();
        assert!(rendered.bytes.starts_with(&[0x89, b'P', b'N', b'G']));
        assert_eq!(rendered.content_type(), "image/png");

        let directive = Directive::build(Some("4"), None, Some("JPEG"));
        let rendered = render(stored(8, 8), &directive).unwrap();
        assert!(rendered.bytes.starts_with(&[0xFF, 0xD8]));
        assert_eq!(dims(&rendered.bytes), (4, 4));
    }

    #[test]
    fn unknown_format() {
        let directive = Directive::build(None, None, Some("doc"));
        let err = render(stored(8, 8), &directive).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(name) if name == "doc"));
    }
}
