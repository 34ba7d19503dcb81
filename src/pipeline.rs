//! Pipeline – measures, paginates and exports a document in one call.

use std::path::{Path, PathBuf};

use crate::assets::ImageStore;
use crate::document::{DocumentOptions, PrintableDocument};
use crate::error::PrintError;
use crate::export::{ExportDate, ExportProgress, ExportedPdf};
use crate::fonts::FontManager;
use crate::layout_config::DocumentLayout;
use crate::markup::Block;
use crate::raster::SkiaRasterizer;
use crate::render::{render_vector_pdf, PrintPdfSink};
use crate::surface::LayoutSurface;
use crate::table::{PaginatedTable, TableOptions};
use crate::templates::{sample_payroll, spp_blocks, PayrollTable, SppInfo};

/// Frames allowed for measurement before giving up.
pub const DEFAULT_MAX_FRAMES: u32 = 600;

/// How the PDF is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Each page captured as a bitmap and placed as one full-page image.
    #[default]
    Raster,
    /// Pages painted as PDF text and shapes.
    Vector,
}

/// A font face loaded as a web font: it activates on a later frame and
/// triggers re-measurement.
#[derive(Debug, Clone)]
pub struct FontSpec {
    pub family: String,
    pub bold: bool,
    pub italic: bool,
    pub path: PathBuf,
}

impl FontSpec {
    /// Parse `FAMILY=path`, with optional `:bold`, `:italic` or
    /// `:bold-italic` after the family name.
    pub fn parse(spec: &str) -> Result<Self, PrintError> {
        let (name, path) = spec.split_once('=').ok_or_else(|| {
            PrintError::InvalidConfiguration(format!("font must be FAMILY=path, got {spec:?}"))
        })?;
        let (family, variant) = name.split_once(':').unwrap_or((name, ""));
        let (bold, italic) = match variant {
            "" | "regular" => (false, false),
            "bold" => (true, false),
            "italic" => (false, true),
            "bold-italic" => (true, true),
            other => {
                return Err(PrintError::InvalidConfiguration(format!(
                    "unknown font variant {other:?}"
                )))
            }
        };
        if family.is_empty() || path.is_empty() {
            return Err(PrintError::InvalidConfiguration(format!(
                "font must be FAMILY=path, got {spec:?}"
            )));
        }
        Ok(Self {
            family: family.to_string(),
            bold,
            italic,
            path: PathBuf::from(path),
        })
    }
}

/// What goes on the pages.
#[derive(Debug, Clone)]
pub struct DocumentContent {
    pub blocks: Vec<Block>,
    pub intro: Option<Block>,
    pub header_src: String,
    pub footer_src: String,
}

#[derive(Debug)]
pub struct GeneratedDocument {
    pub pdf: ExportedPdf,
    pub layout: DocumentLayout,
    /// Frames spent measuring.
    pub frames: u32,
}

/// Measurement surface for `options`. Images resolve against `asset_dir`;
/// `fonts` are queued as web fonts.
pub fn prepare_surface(
    options: &DocumentOptions,
    asset_dir: Option<&Path>,
    fonts: &[FontSpec],
) -> Result<LayoutSurface, PrintError> {
    let images = match asset_dir {
        Some(dir) => ImageStore::with_base_dir(dir),
        None => ImageStore::new(),
    };
    let mut surface = LayoutSurface::with_resources(
        options.page_width_in,
        options.content_padding_x_in,
        FontManager::default(),
        images,
    );
    for font in fonts {
        let bytes = std::fs::read(&font.path).map_err(|e| {
            PrintError::Font(format!("cannot read {}: {e}", font.path.display()))
        })?;
        surface.queue_web_font(&font.family, font.bold, font.italic, bytes);
    }
    Ok(surface)
}

/// The payment order `info` with `rows` sample payroll lines, its tables
/// chunked on `surface`. Pair with [`crate::templates::spp_options`].
pub fn demo_content(surface: &LayoutSurface, info: &SppInfo, rows: usize) -> Result<Vec<Block>, PrintError> {
    let payroll = sample_payroll(rows);
    let total = payroll.iter().map(|r| r.total()).sum();
    let table = PaginatedTable::new(payroll, PayrollTable, TableOptions::default(), surface)?;
    log::debug!("Demo payroll split into {} tables", table.chunks().len());
    Ok(spp_blocks(info, table.blocks(), total))
}

/// Measure `content` until pagination is ready, then export it.
pub fn generate_document(
    surface: &mut LayoutSurface,
    content: DocumentContent,
    options: DocumentOptions,
    mode: OutputMode,
    date: ExportDate,
    max_frames: u32,
) -> Result<GeneratedDocument, PrintError> {
    let (page_w_in, page_h_in) = (options.page_width_in, options.page_height_in);
    let mut doc = PrintableDocument::new(
        content.blocks,
        &content.header_src,
        &content.footer_src,
        content.intro,
        options,
    )?;

    let frames = doc.paginate(surface, max_frames)?;
    log::info!(
        "Paginated {} blocks into {} pages in {} frames",
        doc.controller().blocks().len(),
        doc.pages().len(),
        frames
    );

    match mode {
        OutputMode::Raster => {
            let rasterizer = SkiaRasterizer::from_surface(surface);
            let sink = PrintPdfSink::new(&doc.options().doc_name, page_w_in, page_h_in);
            let mut job = doc.begin_export(surface, rasterizer, sink, date)?;
            let layout = job.layout().clone();
            log::debug!("Export button: {:?} (enabled={})", doc.export_label(), doc.export_enabled());
            let pdf = loop {
                match job.step()? {
                    ExportProgress::Page { index, total } => {
                        log::debug!("Placed page {}/{}", index + 1, total)
                    }
                    ExportProgress::Finished(pdf) => break pdf,
                }
            };
            Ok(GeneratedDocument { pdf, layout, frames })
        }
        OutputMode::Vector => {
            let layout = doc.compose_layout(surface)?;
            let bytes = render_vector_pdf(&layout, surface.images_mut())?;
            log::info!("Printed {} pages as vector PDF", layout.pages.len());
            Ok(GeneratedDocument {
                pdf: ExportedPdf {
                    file_name: doc.file_name(&date),
                    bytes,
                    page_count: layout.pages.len(),
                },
                layout,
                frames,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{band_image, spp_options};

    fn demo(mode: OutputMode) -> GeneratedDocument {
        let info = SppInfo::sample();
        let options = DocumentOptions {
            device_pixel_ratio: 1.0,
            ..spp_options(&info)
        };
        let mut surface = prepare_surface(&options, None, &[]).unwrap();
        let blocks = demo_content(&surface, &info, 40).unwrap();
        let content = DocumentContent {
            blocks,
            intro: None,
            header_src: band_image(85, 10, [0, 70, 140]).unwrap(),
            footer_src: band_image(85, 10, [200, 200, 200]).unwrap(),
        };
        generate_document(
            &mut surface,
            content,
            options,
            mode,
            ExportDate::new(18, 10, 2026),
            DEFAULT_MAX_FRAMES,
        )
        .unwrap()
    }

    #[test]
    fn font_spec_parsing() {
        let spec = FontSpec::parse("Inter:bold=fonts/Inter-Bold.ttf").unwrap();
        assert_eq!(spec.family, "Inter");
        assert!(spec.bold && !spec.italic);
        assert_eq!(spec.path, PathBuf::from("fonts/Inter-Bold.ttf"));
        assert!(FontSpec::parse("Inter").is_err());
        assert!(FontSpec::parse("Inter:heavy=a.ttf").is_err());
    }

    #[test]
    fn missing_font_file_is_reported() {
        let spec = FontSpec::parse("Inter=/nonexistent/Inter.ttf").unwrap();
        let err = prepare_surface(&DocumentOptions::default(), None, &[spec]).unwrap_err();
        assert!(matches!(err, PrintError::Font(_)));
    }

    #[test]
    fn raster_demo_exports_every_page() {
        let out = demo(OutputMode::Raster);
        assert!(out.layout.pages.len() >= 2);
        assert_eq!(out.pdf.page_count, out.layout.pages.len());
        assert_eq!(
            out.pdf.file_name,
            "Surat_Perintah_Pembayaran_UMUM_2026_10_18 Oktober 2026.pdf"
        );
        // 8.5×13 in at 96 px/in
        assert_eq!(out.layout.page_width_px, 816.0);
        assert!((out.layout.page_height_px - 1248.0).abs() < 0.01);
        assert_eq!(&out.pdf.bytes[0..5], b"%PDF-");
    }

    #[test]
    fn demo_letter_fills_page_one_alone() {
        let out = demo(OutputMode::Raster);
        // Only the letter is on page one; the attachment starts page two.
        assert_eq!(out.layout.pages[0].boxes.len(), 1);
        // Header 1.4 in + 0.2 in padding
        assert!((out.layout.pages[0].boxes[0].y - 153.6).abs() < 0.01);
        assert!((out.layout.pages[1].boxes[0].y - 153.6).abs() < 0.01);
    }

    #[test]
    fn vector_demo_matches_raster_pagination() {
        let raster = demo(OutputMode::Raster);
        let vector = demo(OutputMode::Vector);
        assert_eq!(vector.layout.pages.len(), raster.layout.pages.len());
        assert_eq!(&vector.pdf.bytes[0..5], b"%PDF-");
    }
}
