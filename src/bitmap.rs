//! Sample bitmap decoding and caching.
//!
//! The original design parked decoded samples behind soft references and let
//! the runtime reclaim them under memory pressure. That has no transparent
//! equivalent here, so the cache is an explicit bounded LRU: eviction is
//! deterministic (least recently used entry goes first once the cap is hit),
//! and a miss is indistinguishable from "never inserted" — callers reload.

use std::io::Cursor;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use image::{ImageReader, Limits, RgbaImage};
use lru::LruCache;
use tracing::instrument;

use crate::{MAX_IMAGE_ALLOC, MAX_IMAGE_BYTES, MAX_IMAGE_DIMENSION};

/// Decoded formats accepted for sample images - explicit allowlist.
const ALLOWED_FORMATS: &[image::ImageFormat] = &[
    image::ImageFormat::Jpeg,
    image::ImageFormat::Png,
    image::ImageFormat::WebP,
];

#[derive(Debug, thiserror::Error)]
pub enum BitmapError {
    #[error("failed to read image file")]
    Io(#[from] std::io::Error),

    #[error("image decode failed")]
    Decode(#[from] image::ImageError),

    #[error("image file empty")]
    EmptyInput,

    #[error("image file too large: {size} bytes (max {MAX_IMAGE_BYTES})")]
    InputTooLarge { size: usize },

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
}

/// Keyed cache of decoded sample bitmaps.
pub struct BitmapCache {
    entries: LruCache<String, Arc<RgbaImage>>,
}

impl BitmapCache {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Stores `bitmap` under the canonical form of `path`, evicting the least
    /// recently used entry if the cache is full.
    pub fn put(&mut self, path: &Path, bitmap: Arc<RgbaImage>) {
        self.entries.put(cache_key(path), bitmap);
    }

    /// Looks up a previously decoded bitmap. `None` is a plain miss, never an
    /// error; the entry may have been evicted since insertion.
    pub fn get(&mut self, path: &Path) -> Option<Arc<RgbaImage>> {
        self.entries.get(&cache_key(path)).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Canonical cache key for an image path; falls back to the literal path when
/// canonicalization fails (e.g. the file has since disappeared).
fn cache_key(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

/// Decodes a sample image from disk with decompression-bomb guards.
#[instrument(fields(path = %path.display()))]
pub fn load_bitmap(path: &Path) -> Result<RgbaImage, BitmapError> {
    let raw_bytes = std::fs::read(path)?;

    if raw_bytes.is_empty() {
        return Err(BitmapError::EmptyInput);
    }
    if raw_bytes.len() > MAX_IMAGE_BYTES {
        return Err(BitmapError::InputTooLarge {
            size: raw_bytes.len(),
        });
    }

    let format = image::guess_format(&raw_bytes)?;
    if !ALLOWED_FORMATS.contains(&format) {
        return Err(BitmapError::UnsupportedFormat(format!("{format:?}")));
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
    limits.max_image_height = Some(MAX_IMAGE_DIMENSION);
    limits.max_alloc = Some(MAX_IMAGE_ALLOC);

    let mut reader = ImageReader::with_format(Cursor::new(&raw_bytes), format);
    reader.limits(limits);

    Ok(reader.decode()?.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ExtendedColorType, ImageEncoder, Rgba};

    fn test_bitmap(width: u32, height: u32) -> Arc<RgbaImage> {
        Arc::new(RgbaImage::from_pixel(width, height, Rgba([1, 2, 3, 255])))
    }

    fn write_test_png(path: &Path, width: u32, height: u32) {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255])
        });
        let mut buffer = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buffer);
        encoder
            .write_image(img.as_raw(), width, height, ExtendedColorType::Rgba8)
            .unwrap();
        std::fs::write(path, buffer).unwrap();
    }

    #[test]
    fn get_after_put_returns_bitmap() {
        let mut cache = BitmapCache::new(NonZeroUsize::new(4).unwrap());
        let path = Path::new("/samples/a.jpg");

        cache.put(path, test_bitmap(2, 2));

        assert!(cache.get(path).is_some());
    }

    #[test]
    fn miss_is_none_not_error() {
        let mut cache = BitmapCache::new(NonZeroUsize::new(4).unwrap());
        assert!(cache.get(Path::new("/samples/never-inserted.jpg")).is_none());
    }

    #[test]
    fn eviction_is_lru_and_deterministic() {
        let mut cache = BitmapCache::new(NonZeroUsize::new(2).unwrap());
        let a = Path::new("/samples/a.jpg");
        let b = Path::new("/samples/b.jpg");
        let c = Path::new("/samples/c.jpg");

        cache.put(a, test_bitmap(1, 1));
        cache.put(b, test_bitmap(1, 1));
        // Touch `a` so `b` is the least recently used.
        assert!(cache.get(a).is_some());
        cache.put(c, test_bitmap(1, 1));

        assert!(cache.get(a).is_some());
        assert!(cache.get(b).is_none());
        assert!(cache.get(c).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn load_bitmap_decodes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.png");
        write_test_png(&path, 8, 6);

        let bitmap = load_bitmap(&path).unwrap();

        assert_eq!(bitmap.dimensions(), (8, 6));
    }

    #[test]
    fn load_bitmap_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_bitmap(&dir.path().join("absent.png"));
        assert!(matches!(result, Err(BitmapError::Io(_))));
    }

    #[test]
    fn load_bitmap_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.png");
        std::fs::write(&path, []).unwrap();

        assert!(matches!(load_bitmap(&path), Err(BitmapError::EmptyInput)));
    }

    #[test]
    fn load_bitmap_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.png");
        std::fs::write(&path, [0xFF, 0xFE, 0x00, 0x01]).unwrap();

        assert!(load_bitmap(&path).is_err());
    }

    #[test]
    fn load_bitmap_rejects_disallowed_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anim.gif");
        std::fs::write(&path, b"GIF89a\x01\x00\x01\x00").unwrap();

        assert!(matches!(
            load_bitmap(&path),
            Err(BitmapError::UnsupportedFormat(_))
        ));
    }
}
