//! Uploaded image handling
//!
//! Validates extension and size, then stores the file under the upload
//! root with a random name. JPEG and PNG uploads are downscaled to the
//! configured bounds and re-encoded; GIF and WebP are stored untouched so
//! animations survive. Anything that fails to decode is stored as-is
//! without dimensions.

use crate::config::UploadConfig;
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageOutputFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Invalid file type. Allowed types: {0}")]
    InvalidType(String),

    #[error("File too large. Maximum size: {0}MB")]
    TooLarge(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing task failed: {0}")]
    Task(String),
}

/// Where an upload is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Photo,
    ProfilePicture,
}

#[derive(Debug, Clone)]
pub struct StoredImage {
    /// Random name on disk, keeps the original extension
    pub file_name: String,
    /// `uploads/{subdir}/{file_name}`
    pub public_path: String,
    pub disk_path: PathBuf,
    pub file_size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

/// Encoded bytes plus dimensions when the image could be decoded
struct Processed {
    bytes: Vec<u8>,
    dimensions: Option<(u32, u32)>,
}

pub struct ImageService {
    config: UploadConfig,
}

impl ImageService {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Create the photo and profile directories
    pub async fn ensure_dirs(&self) -> Result<(), ImageError> {
        tokio::fs::create_dir_all(self.config.photo_dir()).await?;
        tokio::fs::create_dir_all(self.config.profile_dir()).await?;
        Ok(())
    }

    /// Check the extension and size of an upload, returning the extension
    pub fn validate(&self, filename: &str, size: usize) -> Result<String, ImageError> {
        let ext = UploadConfig::extension_of(filename)
            .filter(|ext| self.config.is_extension_allowed(ext))
            .ok_or_else(|| ImageError::InvalidType(self.config.allowed_extensions_display()))?;

        if size as u64 > self.config.max_file_size {
            return Err(ImageError::TooLarge(self.config.max_file_size_mb()));
        }
        Ok(ext)
    }

    pub async fn save(
        &self,
        kind: ImageKind,
        original_filename: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredImage, ImageError> {
        let ext = self.validate(original_filename, bytes.len())?;

        let (dir, subdir) = match kind {
            ImageKind::Photo => (self.config.photo_dir(), self.config.photo_subdir.as_str()),
            ImageKind::ProfilePicture => {
                (self.config.profile_dir(), self.config.profile_subdir.as_str())
            }
        };
        let file_name = format!("{}.{}", Uuid::new_v4(), ext);
        let disk_path = dir.join(&file_name);

        let max_width = self.config.max_image_width;
        let max_height = self.config.max_image_height;
        let quality = self.config.image_quality;
        let processed = tokio::task::spawn_blocking(move || {
            process_image(bytes, &ext, max_width, max_height, quality)
        })
        .await
        .map_err(|e| ImageError::Task(e.to_string()))?;

        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(&disk_path, &processed.bytes).await?;

        tracing::debug!(
            "Stored {} ({} bytes, {:?})",
            disk_path.display(),
            processed.bytes.len(),
            processed.dimensions
        );

        Ok(StoredImage {
            public_path: self.config.public_path(subdir, &file_name),
            file_name,
            disk_path,
            file_size: processed.bytes.len() as i64,
            width: processed.dimensions.map(|(w, _)| w as i64),
            height: processed.dimensions.map(|(_, h)| h as i64),
        })
    }

    /// Remove a stored file; a missing file is not an error
    pub async fn delete(&self, public_path: &str) {
        let path = self.config.disk_path(public_path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}

/// Shrink to fit within the bounds, preserving aspect ratio. Never upscales.
fn fit_within(img: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width <= max_width && height <= max_height {
        return img;
    }
    img.resize(max_width, max_height, FilterType::Lanczos3)
}

/// JPEG has no alpha channel, so transparent pixels are composited onto white.
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (out, pixel) in rgb.pixels_mut().zip(rgba.pixels()) {
        let [r, g, b, a] = pixel.0;
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        *out = Rgb([blend(r), blend(g), blend(b)]);
    }
    rgb
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> image::ImageResult<Vec<u8>> {
    let rgb = flatten_onto_white(img);
    let mut bytes = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        image::ColorType::Rgb8,
    )?;
    Ok(bytes)
}

fn encode_png(img: &DynamicImage) -> image::ImageResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageOutputFormat::Png)?;
    Ok(cursor.into_inner())
}

fn process_image(bytes: Vec<u8>, ext: &str, max_width: u32, max_height: u32, quality: u8) -> Processed {
    let img = match image::load_from_memory(&bytes) {
        Ok(img) => img,
        Err(e) => {
            tracing::debug!("Could not decode upload, storing as-is: {}", e);
            return Processed {
                bytes,
                dimensions: None,
            };
        }
    };

    let encoded = match ext {
        "jpg" | "jpeg" => {
            let img = fit_within(img, max_width, max_height);
            let dims = img.dimensions();
            encode_jpeg(&img, quality).map(|b| (b, dims))
        }
        "png" => {
            let img = fit_within(img, max_width, max_height);
            let dims = img.dimensions();
            encode_png(&img).map(|b| (b, dims))
        }
        _ => {
            let dims = img.dimensions();
            return Processed {
                bytes,
                dimensions: Some(dims),
            };
        }
    };

    match encoded {
        Ok((encoded, dims)) => Processed {
            bytes: encoded,
            dimensions: Some(dims),
        },
        Err(e) => {
            tracing::warn!("Re-encoding failed, storing original: {}", e);
            Processed {
                bytes,
                dimensions: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> ImageService {
        ImageService::new(UploadConfig {
            root: dir.path().to_path_buf(),
            max_image_width: 100,
            max_image_height: 100,
            ..UploadConfig::default()
        })
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([200, 30, 30])));
        encode_jpeg(&img, 90).unwrap()
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(width, height, Rgba([0, 0, 255, 128])));
        encode_png(&img).unwrap()
    }

    #[test]
    fn test_transparency_is_flattened_onto_white() {
        let img = DynamicImage::ImageRgba8(ImageBuffer::from_fn(3, 1, |x, _| match x {
            0 => Rgba([0, 0, 0, 0]),
            1 => Rgba([0, 0, 255, 128]),
            _ => Rgba([10, 20, 30, 255]),
        }));
        let flat = flatten_onto_white(&img);
        assert_eq!(flat.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(flat.get_pixel(1, 0).0, [127, 127, 255]);
        assert_eq!(flat.get_pixel(2, 0).0, [10, 20, 30]);

        let opaque = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(1, 1, Rgb([1, 2, 3])));
        assert_eq!(flatten_onto_white(&opaque).get_pixel(0, 0).0, [1, 2, 3]);
    }

    #[test]
    fn test_validate_rejects_extension() {
        let dir = TempDir::new().unwrap();
        let err = service(&dir).validate("notes.txt", 10).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid file type. Allowed types: jpg, jpeg, png, gif, webp"
        );
        assert!(service(&dir).validate("no_extension", 10).is_err());
    }

    #[test]
    fn test_validate_rejects_size() {
        let dir = TempDir::new().unwrap();
        let err = service(&dir).validate("a.jpg", 11 * 1024 * 1024).unwrap_err();
        assert_eq!(err.to_string(), "File too large. Maximum size: 10MB");
    }

    #[test]
    fn test_validate_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        assert_eq!(service(&dir).validate("PHOTO.JPG", 10).unwrap(), "jpg");
    }

    #[tokio::test]
    async fn test_large_jpeg_is_downscaled() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let stored = svc
            .save(ImageKind::Photo, "big.jpg", jpeg_bytes(400, 200))
            .await
            .unwrap();

        assert_eq!(stored.width, Some(100));
        assert_eq!(stored.height, Some(50));
        assert!(stored.file_name.ends_with(".jpg"));
        assert!(stored.public_path.starts_with("uploads/photos/"));
        assert!(stored.disk_path.exists());
        let on_disk = std::fs::read(&stored.disk_path).unwrap();
        assert_eq!(on_disk.len() as i64, stored.file_size);
    }

    #[tokio::test]
    async fn test_small_png_keeps_dimensions() {
        let dir = TempDir::new().unwrap();
        let stored = service(&dir)
            .save(ImageKind::ProfilePicture, "avatar.png", png_bytes(40, 30))
            .await
            .unwrap();

        assert_eq!((stored.width, stored.height), (Some(40), Some(30)));
        assert!(stored.public_path.starts_with("uploads/profiles/"));
    }

    #[tokio::test]
    async fn test_undecodable_upload_is_stored_raw() {
        let dir = TempDir::new().unwrap();
        let bytes = b"definitely not an image".to_vec();

        let stored = service(&dir)
            .save(ImageKind::Photo, "broken.webp", bytes.clone())
            .await
            .unwrap();

        assert_eq!(stored.width, None);
        assert_eq!(std::fs::read(&stored.disk_path).unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let stored = svc
            .save(ImageKind::Photo, "gone.jpg", jpeg_bytes(10, 10))
            .await
            .unwrap();

        svc.delete(&stored.public_path).await;
        assert!(!stored.disk_path.exists());

        // Second delete is a no-op
        svc.delete(&stored.public_path).await;
    }
}
