use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbImage};
use std::io::Cursor;
use tracing::debug;

use super::{fit_within, GenerationError, Rendered, ThumbnailBackend, ThumbnailFormat};

/// [`ThumbnailBackend`] on top of the `image` crate.
///
/// Sources are oriented according to their EXIF tag when decoded, so every
/// variant comes out upright. Output is always 8-bit RGB.
#[derive(Debug, Clone, Copy)]
pub struct ImageBackend {
    filter: FilterType,
}

impl Default for ImageBackend {
    fn default() -> Self {
        Self { filter: FilterType::Lanczos3 }
    }
}

impl ImageBackend {
    pub fn with_filter(filter: FilterType) -> Self {
        Self { filter }
    }
}

fn unreadable(e: impl std::fmt::Display) -> GenerationError {
    GenerationError::UnreadableImage(e.to_string())
}

fn encode_failed(e: impl std::fmt::Display) -> GenerationError {
    GenerationError::Encode(e.to_string())
}

impl ThumbnailBackend for ImageBackend {
    type Source = DynamicImage;

    fn identify(&self, data: &[u8]) -> Result<(u32, u32), GenerationError> {
        ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(unreadable)?
            .into_dimensions()
            .map_err(unreadable)
    }

    fn decode(&self, data: &[u8]) -> Result<DynamicImage, GenerationError> {
        let mut decoder = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(unreadable)?
            .into_decoder()
            .map_err(unreadable)?;
        // A missing or unparsable EXIF block is not an error.
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        let mut image = DynamicImage::from_decoder(decoder).map_err(unreadable)?;
        if orientation != Orientation::NoTransforms {
            debug!(?orientation, "applying EXIF orientation");
            image.apply_orientation(orientation);
        }
        Ok(image)
    }

    fn render(
        &self,
        source:  &DynamicImage,
        bounds:  (u32, u32),
        format:  ThumbnailFormat,
        quality: u8,
    ) -> Result<Rendered, GenerationError> {
        let (width, height) = fit_within((source.width(), source.height()), bounds);
        let rgb: RgbImage = if (width, height) == (source.width(), source.height()) {
            source.to_rgb8()
        } else {
            source.resize_exact(width, height, self.filter).to_rgb8()
        };

        let mut bytes = Vec::new();
        match format {
            ThumbnailFormat::Jpg => {
                JpegEncoder::new_with_quality(&mut bytes, quality)
                    .encode_image(&rgb)
                    .map_err(encode_failed)?;
            }
            ThumbnailFormat::Gif => write_as(rgb, ImageFormat::Gif, &mut bytes)?,
            ThumbnailFormat::Png => write_as(rgb, ImageFormat::Png, &mut bytes)?,
        }
        Ok(Rendered { bytes, width, height })
    }
}

fn write_as(rgb: RgbImage, format: ImageFormat, out: &mut Vec<u8>) -> Result<(), GenerationError> {
    DynamicImage::ImageRgb8(rgb)
        .write_to(&mut Cursor::new(out), format)
        .map_err(encode_failed)
}
