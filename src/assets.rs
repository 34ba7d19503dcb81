//! Image assets – header/footer bands and images inside blocks.
//!
//! Sources are either `data:<mime>;base64,<data>` URIs or paths relative to
//! the store's base directory. Images are registered first and loaded
//! later, so a measurement surface can model the browser's asynchronous
//! image loading: until an image resolves it has no intrinsic size.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};

use crate::error::PrintError;

/// A decoded image: encoded bytes (for PDF embedding) plus RGBA pixels
/// (for rasterization).
#[derive(Debug)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub rgba: image::RgbaImage,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.rgba.width()
    }

    pub fn height(&self) -> u32 {
        self.rgba.height()
    }
}

#[derive(Debug, Clone)]
pub enum ImageState {
    Pending,
    Ready(Arc<DecodedImage>),
    Failed(String),
}

/// Anything that can report an image's intrinsic size in CSS px.
/// Unknown or not-yet-loaded images report `None`.
pub trait ImageSizes {
    fn intrinsic_size(&self, src: &str) -> Option<(f32, f32)>;
}

/// Lookup that knows no images; every image lays out at its CSS size.
pub struct NoImages;

impl ImageSizes for NoImages {
    fn intrinsic_size(&self, _src: &str) -> Option<(f32, f32)> {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    base_dir: Option<PathBuf>,
    images: BTreeMap<String, ImageState>,
    queue: VecDeque<String>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `dir`.
    pub fn with_base_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Register `src` as pending. Already known sources are left alone.
    /// Returns true when the source was new.
    pub fn register(&mut self, src: &str) -> bool {
        if self.images.contains_key(src) {
            return false;
        }
        self.images.insert(src.to_string(), ImageState::Pending);
        self.queue.push_back(src.to_string());
        true
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Load the oldest pending image. Failures are recorded, not returned,
    /// so a broken image never blocks the rest of the queue.
    pub fn load_next(&mut self) -> Option<String> {
        let src = self.queue.pop_front()?;
        let state = match self.decode(&src) {
            Ok(img) => ImageState::Ready(Arc::new(img)),
            Err(e) => {
                log::warn!("Skipping image — {e}");
                ImageState::Failed(e.to_string())
            }
        };
        self.images.insert(src.clone(), state);
        Some(src)
    }

    /// Register and load every pending image right away.
    pub fn load_all(&mut self) {
        while self.load_next().is_some() {}
    }

    /// Decoded image for `src`, loading it synchronously when unknown.
    pub fn fetch(&mut self, src: &str) -> Result<Arc<DecodedImage>, PrintError> {
        if self.register(src) {
            self.queue.retain(|queued| queued != src);
            let state = match self.decode(src) {
                Ok(img) => ImageState::Ready(Arc::new(img)),
                Err(e) => ImageState::Failed(e.to_string()),
            };
            self.images.insert(src.to_string(), state);
        }
        match self.images.get(src) {
            Some(ImageState::Ready(img)) => Ok(Arc::clone(img)),
            Some(ImageState::Failed(msg)) => Err(PrintError::Asset(msg.clone())),
            _ => Err(PrintError::Asset(format!("image {} is still loading", preview(src)))),
        }
    }

    pub fn state(&self, src: &str) -> Option<&ImageState> {
        self.images.get(src)
    }

    fn decode(&self, src: &str) -> Result<DecodedImage, PrintError> {
        let bytes = if src.starts_with("data:") {
            parse_data_uri(src)?
        } else {
            let path = match &self.base_dir {
                Some(dir) => dir.join(src),
                None => Path::new(src).to_path_buf(),
            };
            std::fs::read(&path).map_err(|e| {
                PrintError::Asset(format!("cannot read {}: {e}", path.display()))
            })?
        };
        let rgba = image::load_from_memory(&bytes)
            .map_err(|e| PrintError::Asset(format!("decode error: {e}")))?
            .to_rgba8();
        Ok(DecodedImage { bytes, rgba })
    }
}

impl ImageSizes for ImageStore {
    fn intrinsic_size(&self, src: &str) -> Option<(f32, f32)> {
        match self.images.get(src)? {
            ImageState::Ready(img) => Some((img.width() as f32, img.height() as f32)),
            _ => None,
        }
    }
}

fn preview(src: &str) -> &str {
    match src.char_indices().nth(60) {
        Some((idx, _)) => &src[..idx],
        None => src,
    }
}

/// Decode a `data:<mime>;base64,<data>` URI.
pub fn parse_data_uri(src: &str) -> Result<Vec<u8>, PrintError> {
    let rest = src.strip_prefix("data:").ok_or_else(|| {
        PrintError::Asset(format!("not a data URI: {:?}", preview(src)))
    })?;
    let (header, data) = rest.split_once(',').ok_or_else(|| {
        PrintError::Asset("invalid data URI: missing `,` separator".to_string())
    })?;
    if !header.contains(";base64") {
        return Err(PrintError::Asset(
            "only base64-encoded data URIs are supported".to_string(),
        ));
    }
    BASE64_STD
        .decode(data.trim())
        .map_err(|e| PrintError::Asset(format!("base64 decode error: {e}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A `w`×`h` solid PNG as a data URI.
    pub(crate) fn png_data_uri(w: u32, h: u32, rgb: [u8; 3]) -> String {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([rgb[0], rgb[1], rgb[2], 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        format!("data:image/png;base64,{}", BASE64_STD.encode(bytes))
    }

    #[test]
    fn pending_images_have_no_size_until_loaded() {
        let src = png_data_uri(4, 2, [255, 0, 0]);
        let mut store = ImageStore::new();
        assert!(store.register(&src));
        assert!(!store.register(&src));
        assert_eq!(store.intrinsic_size(&src), None);
        assert_eq!(store.load_next().as_deref(), Some(src.as_str()));
        assert_eq!(store.intrinsic_size(&src), Some((4.0, 2.0)));
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn broken_images_fail_without_blocking_the_queue() {
        let good = png_data_uri(1, 1, [0, 0, 0]);
        let mut store = ImageStore::new();
        store.register("data:image/png;base64,!!!");
        store.register(&good);
        store.load_all();
        assert!(matches!(
            store.state("data:image/png;base64,!!!"),
            Some(ImageState::Failed(_))
        ));
        assert!(store.fetch(&good).is_ok());
    }

    #[test]
    fn fetch_loads_unknown_sources_synchronously() {
        let src = png_data_uri(3, 3, [0, 0, 255]);
        let mut store = ImageStore::new();
        let img = store.fetch(&src).unwrap();
        assert_eq!((img.width(), img.height()), (3, 3));
        assert!(store.fetch("missing-file.png").is_err());
    }

    #[test]
    fn rejects_non_base64_data_uri() {
        assert!(parse_data_uri("data:image/png,abc").is_err());
        assert!(parse_data_uri("logo.png").is_err());
    }
}
