//! CPU-side texture data

use crate::backend::types::TextureFormat;
use image::{DynamicImage, GenericImageView};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Failed to decode image '{name}': {source}")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },
    #[error("Pixel buffer for '{name}' has {actual} bytes, expected {expected}")]
    SizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// Decoded RGBA8 pixels
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
}

impl TextureData {
    pub fn from_rgba8(name: &str, width: u32, height: u32, data: Vec<u8>) -> Result<Self, TextureError> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(TextureError::SizeMismatch {
                name: name.to_string(),
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            width,
            height,
            format: TextureFormat::Rgba8UnormSrgb,
            data,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TextureError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let img = image::open(path).map_err(|source| TextureError::Decode {
            name: name.clone(),
            source,
        })?;
        Ok(Self::from_image(img, &name))
    }

    /// Decode any format the `image` crate understands.
    pub fn from_bytes(bytes: &[u8], name: &str) -> Result<Self, TextureError> {
        let img = image::load_from_memory(bytes).map_err(|source| TextureError::Decode {
            name: name.to_string(),
            source,
        })?;
        Ok(Self::from_image(img, name))
    }

    fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        Self {
            name: name.to_string(),
            width,
            height,
            format: TextureFormat::Rgba8UnormSrgb,
            data: img.to_rgba8().into_raw(),
        }
    }

    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            name: name.to_string(),
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8UnormSrgb,
            data: color.to_vec(),
        }
    }

    pub fn white() -> Self {
        Self::solid_color([255; 4], "white")
    }

    pub fn checkerboard(size: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let size = size.max(1);
        let cell = (size / 8).max(1);
        let data = (0..size * size)
            .flat_map(|i| {
                let (x, y) = (i % size, i / size);
                if ((x / cell) + (y / cell)) % 2 == 0 {
                    a
                } else {
                    b
                }
            })
            .collect();
        Self {
            name: "checkerboard".to_string(),
            width: size,
            height: size,
            format: TextureFormat::Rgba8UnormSrgb,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba8_size_is_checked() {
        assert!(TextureData::from_rgba8("ok", 2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            TextureData::from_rgba8("bad", 2, 2, vec![0; 15]),
            Err(TextureError::SizeMismatch { expected: 16, actual: 15, .. })
        ));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(
            TextureData::from_bytes(b"not an image", "junk"),
            Err(TextureError::Decode { .. })
        ));
    }

    #[test]
    fn checkerboard_alternates() {
        let tex = TextureData::checkerboard(16, [255; 4], [0, 0, 0, 255]);
        assert_eq!(tex.data.len(), 16 * 16 * 4);
        assert_eq!(&tex.data[0..4], &[255; 4]);
        // First pixel of the second cell
        assert_eq!(&tex.data[2 * 4..3 * 4], &[0, 0, 0, 255]);
    }
}
