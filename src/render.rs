//! PDF output using `printpdf` (v0.8 ops-based API).
//!
//! Two paths:
//! - [`PrintPdfSink`] assembles captured page bitmaps, one full-page image
//!   per PDF page, for the export job.
//! - [`render_vector_pdf`] paints a [`DocumentLayout`] directly as PDF
//!   text and shape operations, sized to the same physical page.

use std::collections::HashMap;

use printpdf::*;

use crate::assets::{DecodedImage, ImageStore};
use crate::error::PrintError;
use crate::layout_config::{DocumentLayout, ImageFit, LayoutBox, TextContent};
use crate::raster::RasterPage;
use crate::PX_PER_IN;

const MM_PER_IN: f32 = 25.4;
/// CSS px → PDF pt.
const PT_PER_PX: f32 = 72.0 / PX_PER_IN;

/// Collects page images into a PDF document.
///
/// A sink starts with one empty page. The first image goes onto it; every
/// further page must be added before its image is placed.
pub trait PdfSink {
    fn add_page(&mut self) -> Result<(), PrintError>;
    /// Place `page` over the whole current page.
    fn add_image(&mut self, page: &RasterPage) -> Result<(), PrintError>;
    fn save(&mut self) -> Result<Vec<u8>, PrintError>;
}

pub struct PrintPdfSink {
    doc: PdfDocument,
    width_in: f32,
    height_in: f32,
    pages: Vec<Vec<Op>>,
}

impl PrintPdfSink {
    pub fn new(title: &str, width_in: f32, height_in: f32) -> Self {
        Self {
            doc: PdfDocument::new(title),
            width_in,
            height_in,
            pages: vec![Vec::new()],
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl PdfSink for PrintPdfSink {
    fn add_page(&mut self) -> Result<(), PrintError> {
        self.pages.push(Vec::new());
        Ok(())
    }

    fn add_image(&mut self, page: &RasterPage) -> Result<(), PrintError> {
        let mut warnings = Vec::new();
        let raw = RawImage::decode_from_bytes(&page.png, &mut warnings)
            .map_err(|e| PrintError::Pdf(format!("page image: {e}")))?;
        let id = self.doc.add_image(&raw);

        // At dpi=72 printpdf places 1 px as 1 pt, so scale = pt / px.
        let page_w_pt = self.width_in * 72.0;
        let page_h_pt = self.height_in * 72.0;
        let ops = self
            .pages
            .last_mut()
            .ok_or_else(|| PrintError::Pdf("document has no page".to_string()))?;
        ops.push(Op::UseXobject {
            id,
            transform: XObjectTransform {
                translate_x: Some(Pt(0.0)),
                translate_y: Some(Pt(0.0)),
                dpi: Some(72.0),
                scale_x: Some(page_w_pt / page.width.max(1) as f32),
                scale_y: Some(page_h_pt / page.height.max(1) as f32),
                rotate: None,
            },
        });
        Ok(())
    }

    fn save(&mut self) -> Result<Vec<u8>, PrintError> {
        let (w, h) = (Mm(self.width_in * MM_PER_IN), Mm(self.height_in * MM_PER_IN));
        let pages = std::mem::take(&mut self.pages)
            .into_iter()
            .map(|ops| PdfPage::new(w, h, ops))
            .collect();
        self.doc.with_pages(pages);
        Ok(self.doc.save(&PdfSaveOptions::default(), &mut Vec::new()))
    }
}

/// An embedded image and its pixel size.
struct ImageResource {
    xobj_id: XObjectId,
    px_width: u32,
    px_height: u32,
}

/// Paint `layout` as a vector PDF. Images come from `images`; any that
/// cannot be loaded are skipped with a warning.
pub fn render_vector_pdf(layout: &DocumentLayout, images: &mut ImageStore) -> Result<Vec<u8>, PrintError> {
    let page_w = Mm(layout.page_width_px / PX_PER_IN * MM_PER_IN);
    let page_h = Mm(layout.page_height_px / PX_PER_IN * MM_PER_IN);
    let page_h_pt = layout.page_height_px * PT_PER_PX;

    let mut doc = PdfDocument::new(&layout.doc_name);
    let mut resources: HashMap<(String, u32, u32), Option<ImageResource>> = HashMap::new();
    let mut pages = Vec::with_capacity(layout.pages.len());

    for page in &layout.pages {
        let mut ops = Vec::new();
        let painted = page
            .header
            .iter()
            .chain(page.boxes.iter())
            .chain(page.footer.iter());
        for lbox in painted {
            for b in lbox.walk() {
                if let Some(img) = &b.image {
                    // Cover bands are cropped to the box's aspect ratio before
                    // embedding, so each (src, box size) gets its own XObject.
                    let key = match img.fit {
                        ImageFit::Fill => (img.src.clone(), 0, 0),
                        ImageFit::Cover => (img.src.clone(), b.width as u32, b.height as u32),
                    };
                    if !resources.contains_key(&key) {
                        let res = embed_image(&mut doc, images, &img.src, img.fit, b.width, b.height);
                        resources.insert(key.clone(), res);
                    }
                }
            }
            render_box(&mut ops, lbox, page_h_pt, &resources);
        }
        pages.push(PdfPage::new(page_w, page_h, ops));
    }

    if pages.is_empty() {
        pages.push(PdfPage::new(page_w, page_h, Vec::new()));
    }

    doc.with_pages(pages);
    Ok(doc.save(&PdfSaveOptions::default(), &mut Vec::new()))
}

fn embed_image(
    doc: &mut PdfDocument,
    images: &mut ImageStore,
    src: &str,
    fit: ImageFit,
    box_w: f32,
    box_h: f32,
) -> Option<ImageResource> {
    let decoded = match images.fetch(src) {
        Ok(img) => img,
        Err(e) => {
            log::warn!("Skipping image — {e}");
            return None;
        }
    };
    let bytes = match fit {
        ImageFit::Fill => decoded.bytes.clone(),
        ImageFit::Cover => match crop_to_cover(&decoded, box_w, box_h) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Skipping image — {e}");
                return None;
            }
        },
    };
    let mut warnings = Vec::new();
    let raw = match RawImage::decode_from_bytes(&bytes, &mut warnings) {
        Ok(r) => r,
        Err(e) => {
            log::warn!("Skipping image — PDF encode error: {e}");
            return None;
        }
    };
    Some(ImageResource {
        px_width: raw.width as u32,
        px_height: raw.height as u32,
        xobj_id: doc.add_image(&raw),
    })
}

/// Centre-crop the image to the box's aspect ratio; stretching the result
/// over the box then equals object-fit cover.
fn crop_to_cover(img: &DecodedImage, box_w: f32, box_h: f32) -> Result<Vec<u8>, PrintError> {
    let (w, h) = (img.width(), img.height());
    if w == 0 || h == 0 || box_w <= 0.0 || box_h <= 0.0 {
        return Ok(img.bytes.clone());
    }
    let box_ratio = box_w / box_h;
    let (cw, ch) = if (w as f32 / h as f32) > box_ratio {
        (((h as f32 * box_ratio).round() as u32).clamp(1, w), h)
    } else {
        (w, ((w as f32 / box_ratio).round() as u32).clamp(1, h))
    };
    let cropped = ::image::imageops::crop_imm(&img.rgba, (w - cw) / 2, (h - ch) / 2, cw, ch).to_image();
    let mut out = Vec::new();
    cropped
        .write_to(&mut std::io::Cursor::new(&mut out), ::image::ImageFormat::Png)
        .map_err(|e| PrintError::Asset(format!("png encode failed: {e}")))?;
    Ok(out)
}

/// Convert a UTF-8 string to raw Windows-1252 bytes then wrap in a String so
/// printpdf writes the bytes unchanged into the PDF stream (builtin fonts use
/// WinAnsiEncoding, so each glyph is one byte 0x00–0xFF).
fn to_winlatin(s: &str) -> String {
    let bytes: Vec<u8> = s
        .chars()
        .map(|c| match c {
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95, // bullet
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{00A0}' => 0x20,
            c if (c as u32) < 256 => c as u8,
            _ => b'?',
        })
        .collect();
    // SAFETY: intentionally non-UTF-8 for 0x80-0x9F range; printpdf passes
    // these bytes straight to the PDF stream, decoded by WinAnsiEncoding.
    #[allow(unsafe_code)]
    unsafe {
        String::from_utf8_unchecked(bytes)
    }
}

fn rgb(c: [f32; 4]) -> printpdf::Color {
    printpdf::Color::Rgb(Rgb {
        r: c[0],
        g: c[1],
        b: c[2],
        icc_profile: None,
    })
}

fn point(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    }
}

/// Corners of a px box in PDF pt (origin bottom-left).
fn corners(lbox: &LayoutBox, page_h_pt: f32) -> [LinePoint; 4] {
    let x1 = lbox.x * PT_PER_PX;
    let x2 = (lbox.x + lbox.width) * PT_PER_PX;
    let top = page_h_pt - lbox.y * PT_PER_PX;
    let bottom = page_h_pt - (lbox.y + lbox.height) * PT_PER_PX;
    [point(x1, bottom), point(x2, bottom), point(x2, top), point(x1, top)]
}

fn builtin_font(text: &TextContent) -> BuiltinFont {
    match (text.bold, text.italic) {
        (true, true) => BuiltinFont::HelveticaBoldOblique,
        (true, false) => BuiltinFont::HelveticaBold,
        (false, true) => BuiltinFont::HelveticaOblique,
        (false, false) => BuiltinFont::Helvetica,
    }
}

fn write_text(ops: &mut Vec<Op>, s: &str, x_pt: f32, baseline_pt: f32, text: &TextContent, font: BuiltinFont) {
    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point {
            x: Pt(x_pt),
            y: Pt(baseline_pt),
        },
    });
    ops.push(Op::SetFontSizeBuiltinFont {
        size: Pt(text.font_size * PT_PER_PX),
        font,
    });
    ops.push(Op::SetFillColor { col: rgb(text.color) });
    ops.push(Op::WriteTextBuiltinFont {
        items: vec![TextItem::Text(to_winlatin(s))],
        font,
    });
    ops.push(Op::EndTextSection);
}

/// Baseline of a line box starting at `top_px`, in PDF pt.
fn baseline_pt(top_px: f32, text: &TextContent, page_h_pt: f32) -> f32 {
    let half_leading = ((text.line_height - text.font_size) / 2.0).max(0.0);
    page_h_pt - (top_px + half_leading + text.font_size * 0.75) * PT_PER_PX
}

fn first_text(lbox: &LayoutBox) -> Option<&TextContent> {
    lbox.text
        .as_ref()
        .or_else(|| lbox.children.iter().find_map(first_text))
}

fn render_box(
    ops: &mut Vec<Op>,
    lbox: &LayoutBox,
    page_h_pt: f32,
    images: &HashMap<(String, u32, u32), Option<ImageResource>>,
) {
    if let Some(bg) = lbox.background_color {
        ops.push(Op::SetFillColor { col: rgb(bg) });
        ops.push(Op::DrawPolygon {
            polygon: Polygon {
                rings: vec![PolygonRing {
                    points: corners(lbox, page_h_pt).to_vec(),
                }],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            },
        });
    }

    if let Some(border) = &lbox.border {
        ops.push(Op::SetOutlineColor { col: rgb(border.color) });
        ops.push(Op::SetOutlineThickness {
            pt: Pt(border.width * PT_PER_PX),
        });
        ops.push(Op::DrawLine {
            line: Line {
                points: corners(lbox, page_h_pt).to_vec(),
                is_closed: true,
            },
        });
    }

    if let Some(img) = &lbox.image {
        let key = match img.fit {
            ImageFit::Fill => (img.src.clone(), 0, 0),
            ImageFit::Cover => (img.src.clone(), lbox.width as u32, lbox.height as u32),
        };
        if let Some(Some(res)) = images.get(&key) {
            let w_pt = lbox.width * PT_PER_PX;
            let h_pt = lbox.height * PT_PER_PX;
            ops.push(Op::UseXobject {
                id: res.xobj_id.clone(),
                transform: XObjectTransform {
                    translate_x: Some(Pt(lbox.x * PT_PER_PX)),
                    translate_y: Some(Pt(page_h_pt - (lbox.y + lbox.height) * PT_PER_PX)),
                    dpi: Some(72.0),
                    scale_x: Some(w_pt / res.px_width.max(1) as f32),
                    scale_y: Some(h_pt / res.px_height.max(1) as f32),
                    rotate: None,
                },
            });
        }
    }

    if let Some(marker) = &lbox.list_marker {
        if let Some(text) = first_text(lbox) {
            let x = (lbox.x - text.font_size * 1.2) * PT_PER_PX;
            write_text(ops, marker, x, baseline_pt(lbox.y, text, page_h_pt), text, BuiltinFont::Helvetica);
        }
    }

    if let Some(text) = &lbox.text {
        let font = builtin_font(text);
        for line in text.lines.iter().filter(|l| !l.text.is_empty()) {
            let x = (lbox.x + line.x_offset) * PT_PER_PX;
            let base = baseline_pt(lbox.y + line.y_offset, text, page_h_pt);
            write_text(ops, &line.text, x, base, text, font);

            if text.underline {
                let under = base - text.font_size * 0.1 * PT_PER_PX;
                let width = (lbox.width - line.x_offset) * PT_PER_PX;
                ops.push(Op::SetOutlineThickness { pt: Pt(0.5) });
                ops.push(Op::SetOutlineColor { col: rgb(text.color) });
                ops.push(Op::DrawLine {
                    line: Line {
                        points: vec![point(x, under), point(x + width, under)],
                        is_closed: false,
                    },
                });
            }
        }
    }

    for child in &lbox.children {
        render_box(ops, child, page_h_pt, images);
    }
}
