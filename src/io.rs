// ============================================================================
// RESOURCE I/O — image loading, PNG encoding, uploads, document files
// ============================================================================

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageEncoder, RgbaImage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::Document;
use crate::error::{EditorError, Result};
use crate::layer::Mode;

// ============================================================================
// IMAGE LOADING
// ============================================================================

/// Source of decoded images, addressed by the `src` strings stored in layers
/// and background references.
#[allow(async_fn_in_trait)]
pub trait ImageLoader {
    async fn load(&self, src: &str) -> Result<Arc<RgbaImage>>;
}

/// Loads plain paths and `file://` URLs; relative paths resolve against
/// `base_dir`.
#[derive(Clone, Debug, Default)]
pub struct FsImageLoader {
    pub base_dir: PathBuf,
}

impl FsImageLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    pub fn resolve(&self, src: &str) -> PathBuf {
        let path = Path::new(src.strip_prefix("file://").unwrap_or(src));
        if path.is_absolute() { path.to_path_buf() } else { self.base_dir.join(path) }
    }
}

impl ImageLoader for FsImageLoader {
    async fn load(&self, src: &str) -> Result<Arc<RgbaImage>> {
        let path = self.resolve(src);
        let file = File::open(&path).map_err(|e| EditorError::resource_load(src, e))?;
        let reader = image::io::Reader::new(BufReader::new(file))
            .with_guessed_format()
            .map_err(|e| EditorError::resource_load(src, e))?;
        let img = reader.decode().map_err(|e| EditorError::resource_load(src, e))?;
        tracing::debug!(src, width = img.width(), height = img.height(), "image loaded");
        Ok(Arc::new(img.to_rgba8()))
    }
}

/// Serves images registered up front.
#[derive(Clone, Debug, Default)]
pub struct MemoryImageLoader {
    images: HashMap<String, Arc<RgbaImage>>,
}

impl MemoryImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, src: impl Into<String>, image: RgbaImage) {
        self.images.insert(src.into(), Arc::new(image));
    }
}

impl ImageLoader for MemoryImageLoader {
    async fn load(&self, src: &str) -> Result<Arc<RgbaImage>> {
        self.images
            .get(src)
            .cloned()
            .ok_or_else(|| EditorError::resource_load(src, "not registered"))
    }
}

// ============================================================================
// PNG
// ============================================================================

/// Lossless RGBA8 PNG at best compression.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut bytes, CompressionType::Best, FilterType::Adaptive);
    encoder.write_image(image.as_raw(), image.width(), image.height(), image::ColorType::Rgba8)?;
    Ok(bytes)
}

// ============================================================================
// UPLOADS
// ============================================================================

/// Stable reference returned by an uploader (path, URL or id).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadRef(pub String);

impl fmt::Display for UploadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[allow(async_fn_in_trait)]
pub trait Uploader {
    async fn upload(&self, png: Vec<u8>, mode: &Mode) -> Result<UploadRef>;
}

/// Writes each upload to `<dir>/<mode>-<uuid>.png`.
#[derive(Clone, Debug)]
pub struct DirUploader {
    pub dir: PathBuf,
}

impl DirUploader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Uploader for DirUploader {
    async fn upload(&self, png: Vec<u8>, mode: &Mode) -> Result<UploadRef> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}-{}.png", mode, Uuid::new_v4()));
        let mut writer = BufWriter::new(File::create(&path)?);
        writer.write_all(&png)?;
        writer.flush()?;
        tracing::info!(mode = %mode, path = %path.display(), bytes = png.len(), "export written");
        Ok(UploadRef(path.to_string_lossy().into_owned()))
    }
}

/// Keeps uploads in memory, returning `mem://<mode>/<n>` references.
#[derive(Debug, Default)]
pub struct MemoryUploader {
    uploads: Mutex<Vec<(Mode, Vec<u8>)>>,
}

impl MemoryUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploads(&self) -> Vec<(Mode, Vec<u8>)> {
        self.uploads.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

impl Uploader for MemoryUploader {
    async fn upload(&self, png: Vec<u8>, mode: &Mode) -> Result<UploadRef> {
        let mut uploads = self
            .uploads
            .lock()
            .map_err(|_| EditorError::Upload("upload store poisoned".to_string()))?;
        uploads.push((mode.clone(), png));
        Ok(UploadRef(format!("mem://{}/{}", mode, uploads.len() - 1)))
    }
}

// ============================================================================
// DOCUMENT FILES
// ============================================================================

pub fn save_document(path: &Path, doc: &Document) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, doc)?;
    tracing::info!(path = %path.display(), objects = doc.objects.len(), "document saved");
    Ok(())
}

pub fn load_document_file(path: &Path) -> Result<Document> {
    let reader = BufReader::new(File::open(path)?);
    let doc: Document = serde_json::from_reader(reader)?;
    tracing::info!(path = %path.display(), objects = doc.objects.len(), "document read");
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    #[test]
    fn png_decodes_back_to_same_pixels() {
        let mut img = RgbaImage::new(3, 2);
        img.put_pixel(1, 1, Rgba([10, 20, 30, 40]));
        let bytes = encode_png(&img).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn fs_loader_resolves_relative_and_file_urls() {
        let loader = FsImageLoader::new("/data/designs");
        assert_eq!(loader.resolve("mock/front.png"), PathBuf::from("/data/designs/mock/front.png"));
        assert_eq!(loader.resolve("file:///tmp/a.png"), PathBuf::from("/tmp/a.png"));
        assert_eq!(loader.resolve("file://b.png"), PathBuf::from("/data/designs/b.png"));
    }

    #[test]
    fn fs_loader_round_trip_through_dir_uploader() {
        let dir = std::env::temp_dir().join(format!("printdesigner-io-{}", Uuid::new_v4()));
        let img = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]));
        let uploader = DirUploader::new(&dir);
        let reference = pollster::block_on(uploader.upload(encode_png(&img).unwrap(), &Mode::back())).unwrap();
        assert!(reference.0.contains("back-"));

        let loaded = pollster::block_on(FsImageLoader::new(&dir).load(&reference.0)).unwrap();
        assert_eq!(*loaded, img);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_is_a_resource_error() {
        let loader = FsImageLoader::new("/nonexistent");
        let err = pollster::block_on(loader.load("nope.png")).unwrap_err();
        assert!(matches!(err, EditorError::ResourceLoad { src, .. } if src == "nope.png"));
    }

    #[test]
    fn memory_uploader_numbers_references() {
        let uploader = MemoryUploader::new();
        let a = pollster::block_on(uploader.upload(vec![1], &Mode::front())).unwrap();
        let b = pollster::block_on(uploader.upload(vec![2], &Mode::back())).unwrap();
        assert_eq!(a.0, "mem://front/0");
        assert_eq!(b.0, "mem://back/1");
        assert_eq!(uploader.uploads().len(), 2);
    }
}
