//! Page rasterization with `tiny-skia`.
//!
//! Paints a [`PageLayout`] into a bitmap: white page, header band, content
//! boxes (backgrounds, borders, images, text), footer band. Bands use
//! object-fit cover and are clipped to their box. Text is drawn from
//! `ttf-parser` glyph outlines when a real face is loaded; without one,
//! every glyph is a box of the fallback advance width.

use std::collections::HashMap;

use tiny_skia::{
    Color, FillRule, FilterQuality, Mask, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Rect,
    Stroke, Transform,
};
use ttf_parser::OutlineBuilder;

use crate::assets::{DecodedImage, ImageStore};
use crate::error::PrintError;
use crate::fonts::{FontKey, FontManager};
use crate::layout_config::{DocumentLayout, ImageFit, LayoutBox, PageLayout, TextContent};
use crate::surface::LayoutSurface;

/// One captured page.
#[derive(Debug, Clone)]
pub struct RasterPage {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

/// Captures one composed page as a bitmap.
pub trait PageRasterizer {
    fn rasterize(
        &mut self,
        doc: &DocumentLayout,
        page: &PageLayout,
        scale: f32,
    ) -> Result<RasterPage, PrintError>;
}

pub struct SkiaRasterizer {
    fonts: FontManager,
    images: ImageStore,
    pixmaps: HashMap<String, Option<Pixmap>>,
}

impl SkiaRasterizer {
    pub fn new(fonts: FontManager, images: ImageStore) -> Self {
        Self {
            fonts,
            images,
            pixmaps: HashMap::new(),
        }
    }

    /// Rasterize with the fonts and images the surface measured with.
    pub fn from_surface(surface: &LayoutSurface) -> Self {
        Self::new(surface.fonts().clone(), surface.images().clone())
    }

    /// Premultiplied pixmap for `src`; failures are logged once and cached
    /// as missing.
    fn pixmap(&mut self, src: &str) -> Option<&Pixmap> {
        if !self.pixmaps.contains_key(src) {
            let pixmap = match self.images.fetch(src) {
                Ok(img) => to_pixmap(&img),
                Err(e) => {
                    log::warn!("Skipping image — {e}");
                    None
                }
            };
            self.pixmaps.insert(src.to_string(), pixmap);
        }
        self.pixmaps.get(src).and_then(Option::as_ref)
    }

    fn paint_box(&mut self, canvas: &mut Pixmap, lbox: &LayoutBox, ts: Transform) {
        if let Some(bg) = lbox.background_color {
            if let Some(rect) = Rect::from_xywh(lbox.x, lbox.y, lbox.width, lbox.height) {
                canvas.fill_rect(rect, &solid(bg), ts, None);
            }
        }

        if let Some(border) = &lbox.border {
            let half = border.width / 2.0;
            if let Some(rect) = Rect::from_xywh(
                lbox.x + half,
                lbox.y + half,
                (lbox.width - border.width).max(0.0),
                (lbox.height - border.width).max(0.0),
            ) {
                let path = PathBuilder::from_rect(rect);
                let stroke = Stroke {
                    width: border.width,
                    ..Stroke::default()
                };
                canvas.stroke_path(&path, &solid(border.color), &stroke, ts, None);
            }
        }

        if let Some(img) = &lbox.image {
            let target = (lbox.x, lbox.y, lbox.width, lbox.height);
            let fit = img.fit;
            let (w, h) = (canvas.width(), canvas.height());
            if let Some(source) = self.pixmap(&img.src) {
                draw_image(canvas, source, target, fit, ts, (w, h));
            }
        }

        if let Some(marker) = &lbox.list_marker {
            if let Some(text) = first_text(lbox) {
                let key = FontKey::new(&text.font_family, false, false);
                let width = self.fonts.measure_text_width(marker, text.font_size, &key);
                let x = lbox.x - width - text.font_size * 0.5;
                self.draw_text(canvas, marker, x, lbox.y, text, ts);
            }
        }

        if let Some(text) = &lbox.text {
            for line in &text.lines {
                let x = lbox.x + line.x_offset;
                let y = lbox.y + line.y_offset;
                self.draw_text(canvas, &line.text, x, y, text, ts);
                if text.underline {
                    let key = FontKey::new(&text.font_family, text.bold, text.italic);
                    let width = self.fonts.measure_text_width(&line.text, text.font_size, &key);
                    let base = y + half_leading(text) + self.fonts.ascender_px(text.font_size, &key);
                    if let Some(rect) = Rect::from_xywh(x, base + text.font_size * 0.1, width, 1.0) {
                        canvas.fill_rect(rect, &solid(text.color), ts, None);
                    }
                }
            }
        }

        for child in &lbox.children {
            self.paint_box(canvas, child, ts);
        }
    }

    /// Draw one line whose line box starts at `top`.
    fn draw_text(&self, canvas: &mut Pixmap, s: &str, x: f32, top: f32, text: &TextContent, ts: Transform) {
        let key = FontKey::new(&text.font_family, text.bold, text.italic);
        let data = self.fonts.get(&key);
        let paint = solid(text.color);
        let baseline = top + half_leading(text) + self.fonts.ascender_px(text.font_size, &key);

        let face = if data.is_real() {
            ttf_parser::Face::parse(&data.bytes, 0).ok()
        } else {
            None
        };
        let Some(face) = face else {
            // Greeked text: a box per non-space glyph.
            let advance = self.fonts.measure_text_width("x", text.font_size, &key);
            let glyph_h = text.font_size * 0.5;
            for (i, ch) in s.chars().enumerate() {
                if ch.is_whitespace() {
                    continue;
                }
                let gx = x + i as f32 * advance + advance * 0.1;
                if let Some(rect) = Rect::from_xywh(gx, baseline - glyph_h, advance * 0.8, glyph_h) {
                    canvas.fill_rect(rect, &paint, ts, None);
                }
            }
            return;
        };

        let scale = text.font_size / face.units_per_em() as f32;
        let mut pen = x;
        for ch in s.chars() {
            let Some(gid) = face.glyph_index(ch) else {
                pen += text.font_size * 0.5;
                continue;
            };
            let mut builder = GlyphPathBuilder::new(pen, baseline, scale);
            if face.outline_glyph(gid, &mut builder).is_some() {
                if let Some(path) = builder.finish() {
                    canvas.fill_path(&path, &paint, FillRule::Winding, ts, None);
                }
            }
            pen += face
                .glyph_hor_advance(gid)
                .map(|a| a as f32 * scale)
                .unwrap_or(text.font_size * 0.5);
        }
    }
}

impl PageRasterizer for SkiaRasterizer {
    fn rasterize(
        &mut self,
        doc: &DocumentLayout,
        page: &PageLayout,
        scale: f32,
    ) -> Result<RasterPage, PrintError> {
        let width = (doc.page_width_px * scale).round() as u32;
        let height = (doc.page_height_px * scale).round() as u32;
        let mut canvas = Pixmap::new(width, height).ok_or_else(|| {
            PrintError::Raster(format!("invalid raster size {width}x{height} at scale {scale}"))
        })?;
        canvas.fill(Color::WHITE);
        let ts = Transform::from_scale(scale, scale);

        if let Some(header) = &page.header {
            self.paint_box(&mut canvas, header, ts);
        }
        for lbox in &page.boxes {
            self.paint_box(&mut canvas, lbox, ts);
        }
        if let Some(footer) = &page.footer {
            self.paint_box(&mut canvas, footer, ts);
        }

        let png = canvas
            .encode_png()
            .map_err(|e| PrintError::Raster(format!("png encode failed: {e}")))?;
        Ok(RasterPage { width, height, png })
    }
}

fn half_leading(text: &TextContent) -> f32 {
    ((text.line_height - text.font_size) / 2.0).max(0.0)
}

fn first_text(lbox: &LayoutBox) -> Option<&TextContent> {
    lbox.text
        .as_ref()
        .or_else(|| lbox.children.iter().find_map(first_text))
}

fn solid(rgba: [f32; 4]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(
        Color::from_rgba(
            rgba[0].clamp(0.0, 1.0),
            rgba[1].clamp(0.0, 1.0),
            rgba[2].clamp(0.0, 1.0),
            rgba[3].clamp(0.0, 1.0),
        )
        .unwrap_or(Color::BLACK),
    );
    paint.anti_alias = true;
    paint
}

/// Draw `source` into the `(x, y, w, h)` box. Cover keeps the aspect
/// ratio, centres the image and clips what spills out of the box.
fn draw_image(
    canvas: &mut Pixmap,
    source: &Pixmap,
    (x, y, w, h): (f32, f32, f32, f32),
    fit: ImageFit,
    ts: Transform,
    (canvas_w, canvas_h): (u32, u32),
) {
    let (src_w, src_h) = (source.width() as f32, source.height() as f32);
    if src_w <= 0.0 || src_h <= 0.0 || w <= 0.0 || h <= 0.0 {
        return;
    }
    let (sx, sy, ox, oy) = match fit {
        ImageFit::Fill => (w / src_w, h / src_h, 0.0, 0.0),
        ImageFit::Cover => {
            let s = (w / src_w).max(h / src_h);
            (s, s, (w - src_w * s) / 2.0, (h - src_h * s) / 2.0)
        }
    };

    let mask = Rect::from_xywh(x, y, w, h).and_then(|clip| {
        let mut mask = Mask::new(canvas_w, canvas_h)?;
        mask.fill_path(&PathBuilder::from_rect(clip), FillRule::Winding, true, ts);
        Some(mask)
    });

    let placement = ts.pre_concat(Transform::from_row(sx, 0.0, 0.0, sy, x + ox, y + oy));
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    canvas.draw_pixmap(0, 0, source.as_ref(), &paint, placement, mask.as_ref());
}

fn to_pixmap(img: &DecodedImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(img.width(), img.height())?;
    for (src, dst) in img
        .rgba
        .as_raw()
        .chunks_exact(4)
        .zip(pixmap.data_mut().chunks_exact_mut(4))
    {
        let a = src[3];
        dst[0] = premultiply(src[0], a);
        dst[1] = premultiply(src[1], a);
        dst[2] = premultiply(src[2], a);
        dst[3] = a;
    }
    Some(pixmap)
}

fn premultiply(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

/// Glyph outline to device path. Font units grow upwards, the page grows
/// downwards, hence the flipped y.
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.origin_y - y * self.scale)
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}
