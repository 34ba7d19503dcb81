//! Printable document – paginated blocks on letterhead pages, plus the
//! export entry point.
//!
//! A document owns a [`PaginationController`] over its blocks. Once the
//! controller is ready, [`PrintableDocument::compose_layout`] turns every
//! page into a [`DocumentLayout`] page: header band, padded content region
//! with the page's blocks, footer band. Export rasterizes those pages.

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::controller::{run_until_ready, PaginationController, PaginationOptions};
use crate::error::PrintError;
use crate::export::{export_scale, BusyGuard, ExportDate, ExportJob};
use crate::layout::{font_key, BoxContent, PositionedBox};
use crate::layout_config::{
    BorderStyle, DocumentLayout, ImageContent, ImageFit, LayoutBox, PageLayout, TextContent,
    TextLine,
};
use crate::markup::Block;
use crate::paginate::PageData;
use crate::raster::PageRasterizer;
use crate::render::PdfSink;
use crate::surface::LayoutSurface;
use crate::PX_PER_IN;

const LABEL_IDLE: &str = "Unduh Surat";
const LABEL_BUSY: &str = "Sedang memproses...";

/// Page geometry and export settings. Lengths are inches except `gap_px`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DocumentOptions {
    /// File name prefix of the exported PDF.
    pub doc_name: String,
    pub gap_px: f32,
    /// Shrink page one's budget by the intro's measured height. The intro
    /// itself is not painted.
    pub include_intro_reserve: bool,
    pub break_before: Option<Vec<bool>>,
    pub header_height_in: f32,
    pub footer_height_in: f32,
    pub page_width_in: f32,
    pub page_height_in: f32,
    pub content_padding_top_in: f32,
    pub content_padding_x_in: f32,
    pub device_pixel_ratio: f32,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            doc_name: "Document".to_string(),
            gap_px: 16.0,
            include_intro_reserve: false,
            break_before: None,
            header_height_in: 1.0,
            footer_height_in: 1.0,
            page_width_in: 8.5,
            page_height_in: 11.0,
            content_padding_top_in: 1.0,
            content_padding_x_in: 1.0,
            device_pixel_ratio: 2.0,
        }
    }
}

impl DocumentOptions {
    pub fn from_json(json: &str) -> Result<Self, PrintError> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| PrintError::InvalidConfiguration(format!("options JSON: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_file(path: &Path) -> Result<Self, PrintError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), PrintError> {
        let invalid = |msg: String| Err(PrintError::InvalidConfiguration(msg));
        if !(self.page_width_in > 0.0 && self.page_height_in > 0.0) {
            return invalid(format!(
                "page size must be positive, got {}x{} in",
                self.page_width_in, self.page_height_in
            ));
        }
        let lengths = [
            ("headerHeightIn", self.header_height_in),
            ("footerHeightIn", self.footer_height_in),
            ("contentPaddingTopIn", self.content_padding_top_in),
            ("contentPaddingXIn", self.content_padding_x_in),
            ("gapPx", self.gap_px),
        ];
        if let Some((name, value)) = lengths.iter().find(|(_, v)| !(*v >= 0.0)) {
            return invalid(format!("{name} must not be negative, got {value}"));
        }
        if self.header_height_in + self.footer_height_in >= self.page_height_in {
            return invalid(format!(
                "header and footer ({} in) leave no room on a {} in page",
                self.header_height_in + self.footer_height_in,
                self.page_height_in
            ));
        }
        if 2.0 * self.content_padding_x_in >= self.page_width_in {
            return invalid(format!(
                "horizontal padding {} in leaves no content width",
                self.content_padding_x_in
            ));
        }
        if !(self.device_pixel_ratio > 0.0) {
            return invalid(format!(
                "devicePixelRatio must be positive, got {}",
                self.device_pixel_ratio
            ));
        }
        Ok(())
    }

    /// Height budget of a page's body in px: page minus header and footer.
    /// Content padding is not subtracted.
    pub fn body_px(&self) -> f32 {
        (self.page_height_in - self.header_height_in - self.footer_height_in) * PX_PER_IN
    }

    pub fn page_width_px(&self) -> f32 {
        self.page_width_in * PX_PER_IN
    }

    pub fn page_height_px(&self) -> f32 {
        self.page_height_in * PX_PER_IN
    }

    /// A measurement surface sized to this document's content region.
    pub fn surface(&self) -> LayoutSurface {
        LayoutSurface::new(self.page_width_in, self.content_padding_x_in)
    }

    fn pagination(&self, blocks: &[Block]) -> PaginationOptions {
        let break_before = self.break_before.clone().or_else(|| {
            blocks
                .iter()
                .any(Block::wants_break_before)
                .then(|| blocks.iter().map(Block::wants_break_before).collect())
        });
        PaginationOptions {
            gap_px: self.gap_px,
            body_px: self.body_px(),
            include_intro: self.include_intro_reserve,
            break_before,
        }
    }
}

pub struct PrintableDocument {
    header_src: String,
    footer_src: String,
    options: DocumentOptions,
    controller: PaginationController<Block>,
    busy: Rc<Cell<bool>>,
}

impl PrintableDocument {
    pub fn new(
        blocks: Vec<Block>,
        header_src: &str,
        footer_src: &str,
        intro: Option<Block>,
        options: DocumentOptions,
    ) -> Result<Self, PrintError> {
        options.validate()?;
        let pagination = options.pagination(&blocks);
        Ok(Self {
            header_src: header_src.to_string(),
            footer_src: footer_src.to_string(),
            controller: PaginationController::new(blocks, intro, pagination),
            options,
            busy: Rc::new(Cell::new(false)),
        })
    }

    pub fn options(&self) -> &DocumentOptions {
        &self.options
    }

    pub fn controller(&self) -> &PaginationController<Block> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut PaginationController<Block> {
        &mut self.controller
    }

    pub fn ready(&self) -> bool {
        self.controller.ready()
    }

    pub fn pages(&self) -> &[PageData<Block>] {
        self.controller.pages()
    }

    /// Replace the blocks; pagination restarts and the surface must be
    /// mounted again.
    pub fn set_blocks(&mut self, blocks: Vec<Block>, intro: Option<Block>) {
        let pagination = self.options.pagination(&blocks);
        self.controller.set_input(blocks, intro, pagination);
    }

    pub fn mount_measure(&mut self, surface: &mut LayoutSurface) -> Result<(), PrintError> {
        self.controller.mount_measure(surface)
    }

    /// Mount on `surface` and run frames until the pages are ready.
    pub fn paginate(&mut self, surface: &mut LayoutSurface, max_frames: u32) -> Result<u32, PrintError> {
        self.controller.mount_measure(surface)?;
        run_until_ready(&mut self.controller, surface, max_frames)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    pub fn export_enabled(&self) -> bool {
        self.ready() && !self.is_busy()
    }

    pub fn export_label(&self) -> &'static str {
        if self.is_busy() {
            LABEL_BUSY
        } else {
            LABEL_IDLE
        }
    }

    /// Lay out every visible page with the surface's fonts and images.
    pub fn compose_layout(&self, surface: &LayoutSurface) -> Result<DocumentLayout, PrintError> {
        if !self.ready() {
            return Err(PrintError::NotReady);
        }
        let o = &self.options;
        let page_w = o.page_width_px();
        let page_h = o.page_height_px();
        let header_h = o.header_height_in * PX_PER_IN;
        let footer_h = o.footer_height_in * PX_PER_IN;
        let content_x = o.content_padding_x_in * PX_PER_IN;
        let content_top = header_h + o.content_padding_top_in * PX_PER_IN;

        let mut pages = Vec::with_capacity(self.pages().len());
        for (index, page) in self.pages().iter().enumerate() {
            let mut boxes = Vec::new();
            let mut y = content_top;

            for (i, block) in page.nodes.iter().enumerate() {
                if i > 0 {
                    y += o.gap_px;
                }
                let layout = surface.layout(block)?;
                boxes.push(to_layout_box(&layout.root, content_x, y, surface));
                y += layout.height;
            }

            pages.push(PageLayout {
                page_index: index,
                header: Some(LayoutBox::band(&self.header_src, 0.0, page_w, header_h)),
                footer: Some(LayoutBox::band(&self.footer_src, page_h - footer_h, page_w, footer_h)),
                boxes,
            });
        }

        Ok(DocumentLayout {
            doc_name: o.doc_name.clone(),
            page_width_px: page_w,
            page_height_px: page_h,
            pages,
        })
    }

    /// Start an export. Fails when pagination is not ready or another
    /// export is still running; the document stays busy until the returned
    /// job finishes, fails or is dropped.
    pub fn begin_export<R: PageRasterizer, P: PdfSink>(
        &self,
        surface: &LayoutSurface,
        rasterizer: R,
        sink: P,
        date: ExportDate,
    ) -> Result<ExportJob<R, P>, PrintError> {
        if !self.ready() {
            return Err(PrintError::NotReady);
        }
        let guard = BusyGuard::acquire(&self.busy)?;
        let layout = self.compose_layout(surface)?;
        Ok(ExportJob::new(
            layout,
            rasterizer,
            sink,
            export_scale(self.options.device_pixel_ratio),
            self.file_name(&date),
            guard,
        ))
    }

    /// `{docName}_{long date}.pdf`
    pub fn file_name(&self, date: &ExportDate) -> String {
        format!("{}_{}.pdf", self.options.doc_name, date.long_id())
    }
}

/// Convert a laid-out block to page coordinates.
fn to_layout_box(pbox: &PositionedBox, dx: f32, dy: f32, surface: &LayoutSurface) -> LayoutBox {
    let s = &pbox.style;
    let mut lbox = LayoutBox::new(pbox.x + dx, pbox.y + dy, pbox.width, pbox.height);
    if !s.background_color.is_transparent() {
        lbox.background_color = Some(s.background_color.to_array());
    }
    if s.border_width > 0.0 {
        lbox.border = Some(BorderStyle {
            width: s.border_width,
            color: s.border_color.to_array(),
        });
    }
    match &pbox.content {
        BoxContent::Text { lines } => {
            let key = font_key(s);
            let family = if surface.fonts().get(&key).is_real() {
                s.font_family.clone()
            } else {
                "Helvetica".to_string()
            };
            lbox.text = Some(TextContent {
                lines: lines
                    .iter()
                    .map(|l| TextLine {
                        text: l.text.clone(),
                        x_offset: l.x_offset,
                        y_offset: l.y_offset,
                    })
                    .collect(),
                font_family: family,
                font_size: s.font_size,
                bold: s.is_bold(),
                italic: s.is_italic(),
                color: s.color.to_array(),
                line_height: s.line_height_px(),
                underline: s.underline,
            });
        }
        BoxContent::Image { src } => {
            lbox.image = Some(ImageContent {
                src: src.clone(),
                fit: ImageFit::Fill,
            });
        }
        BoxContent::ListMarker { marker } => lbox.list_marker = Some(marker.clone()),
        BoxContent::None => {}
    }
    lbox.children = pbox
        .children
        .iter()
        .map(|child| to_layout_box(child, dx, dy, surface))
        .collect();
    lbox
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportProgress;
    use crate::raster::RasterPage;

    fn blocks(n: usize) -> Vec<Block> {
        (0..n)
            .map(|i| Block::from_html(&format!("<p>Rincian pembayaran nomor {i}</p>")))
            .collect()
    }

    struct BlankRasterizer;

    impl PageRasterizer for BlankRasterizer {
        fn rasterize(
            &mut self,
            doc: &DocumentLayout,
            _page: &PageLayout,
            scale: f32,
        ) -> Result<RasterPage, PrintError> {
            Ok(RasterPage {
                width: (doc.page_width_px * scale) as u32,
                height: (doc.page_height_px * scale) as u32,
                png: Vec::new(),
            })
        }
    }

    #[derive(Default)]
    struct CountingSink {
        images: usize,
        pages: usize,
    }

    impl PdfSink for CountingSink {
        fn add_page(&mut self) -> Result<(), PrintError> {
            self.pages += 1;
            Ok(())
        }

        fn add_image(&mut self, _page: &RasterPage) -> Result<(), PrintError> {
            self.images += 1;
            Ok(())
        }

        fn save(&mut self) -> Result<Vec<u8>, PrintError> {
            Ok(format!("{} images on {} extra pages", self.images, self.pages).into_bytes())
        }
    }

    #[test]
    fn defaults_match_letter_with_inch_bands() {
        let o = DocumentOptions::default();
        assert_eq!(o.body_px(), 864.0);
        assert_eq!(o.page_width_px(), 816.0);
        assert_eq!(o.doc_name, "Document");
        assert_eq!(o.gap_px, 16.0);
    }

    #[test]
    fn options_json_uses_camel_case_and_defaults() {
        let o = DocumentOptions::from_json(r#"{"docName": "SPP", "pageHeightIn": 11.69}"#).unwrap();
        assert_eq!(o.doc_name, "SPP");
        assert_eq!(o.page_height_in, 11.69);
        assert_eq!(o.page_width_in, 8.5);
    }

    #[test]
    fn validate_rejects_bands_taller_than_the_page() {
        let o = DocumentOptions {
            header_height_in: 6.0,
            footer_height_in: 5.0,
            ..DocumentOptions::default()
        };
        assert!(matches!(o.validate(), Err(PrintError::InvalidConfiguration(_))));
        let o = DocumentOptions {
            page_width_in: 0.0,
            ..DocumentOptions::default()
        };
        assert!(o.validate().is_err());
    }

    #[test]
    fn break_flags_come_from_block_markup() {
        let blocks = vec![
            Block::from_html("<p>a</p>"),
            Block::from_html(r#"<div data-break-before="">b</div>"#),
        ];
        let pagination = DocumentOptions::default().pagination(&blocks);
        assert_eq!(pagination.break_before, Some(vec![false, true]));
        assert_eq!(DocumentOptions::default().pagination(&blocks[..1]).break_before, None);
    }

    #[test]
    fn export_is_disabled_until_ready() {
        let doc = PrintableDocument::new(blocks(3), "kop.png", "footer.png", None, DocumentOptions::default())
            .unwrap();
        assert!(!doc.export_enabled());
        assert_eq!(doc.export_label(), "Unduh Surat");
        let surface = doc.options().surface();
        let err = doc
            .begin_export(&surface, BlankRasterizer, CountingSink::default(), ExportDate::new(18, 10, 2026))
            .err();
        assert!(matches!(err, Some(PrintError::NotReady)));
    }

    #[test]
    fn compose_places_blocks_below_the_header() {
        let mut doc = PrintableDocument::new(blocks(3), "kop.png", "footer.png", None, DocumentOptions::default())
            .unwrap();
        let mut surface = doc.options().surface();
        doc.paginate(&mut surface, 20).unwrap();
        let layout = doc.compose_layout(&surface).unwrap();
        assert_eq!(layout.pages.len(), 1);
        let page = &layout.pages[0];
        // header 96 + padding 96
        assert_eq!(page.boxes[0].y, 192.0);
        assert_eq!(page.boxes[0].x, 96.0);
        // 21px line + 16px gap
        assert!((page.boxes[1].y - (192.0 + 21.0 + 16.0)).abs() < 0.01);
        assert_eq!(page.footer.as_ref().unwrap().y, 960.0);
    }

    #[test]
    fn busy_flag_blocks_a_second_export_and_clears_after() {
        let mut doc = PrintableDocument::new(blocks(2), "kop.png", "footer.png", None, DocumentOptions::default())
            .unwrap();
        let mut surface = doc.options().surface();
        doc.paginate(&mut surface, 20).unwrap();
        assert!(doc.export_enabled());

        let date = ExportDate::new(1, 1, 2026);
        let mut job = doc
            .begin_export(&surface, BlankRasterizer, CountingSink::default(), date)
            .unwrap();
        assert!(doc.is_busy());
        assert!(!doc.export_enabled());
        assert_eq!(doc.export_label(), "Sedang memproses...");
        assert!(matches!(
            doc.begin_export(&surface, BlankRasterizer, CountingSink::default(), date),
            Err(PrintError::Busy)
        ));

        let pdf = loop {
            match job.step().unwrap() {
                ExportProgress::Page { .. } => continue,
                ExportProgress::Finished(pdf) => break pdf,
            }
        };
        assert!(!doc.is_busy());
        assert_eq!(pdf.file_name, "Document_1 Januari 2026.pdf");
        assert_eq!(pdf.page_count, 1);
    }
}
