//! Measurement surfaces.
//!
//! A surface is where blocks get rendered before pagination: it reports the
//! laid-out height of every mounted block and tells the controller when
//! something that affects layout happened (a block resized, images finished
//! loading, web fonts became active).
//!
//! [`LayoutSurface`] is the off-screen implementation used by the document
//! pipeline. It lays blocks out with Taffy at the exact width of a page's
//! content region and models late-arriving resources: registered images
//! and queued web fonts resolve one per frame, each one possibly changing
//! block heights.

use crate::assets::ImageStore;
use crate::error::PrintError;
use crate::fonts::FontManager;
use crate::layout::{layout_block, BlockLayout};
use crate::markup::Block;
use crate::style::ComputedStyle;
use crate::PX_PER_IN;

/// Notifications a surface raises between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// An observed block (or the intro) changed height.
    Resize,
    /// Every image referenced by the mounted content has settled.
    WindowLoad,
    /// Every queued web font is active.
    FontsReady,
}

/// Host capable of rendering blocks off-screen and reporting their heights.
pub trait MeasureSurface<B> {
    /// Render `blocks` (and the intro, if any), replacing whatever was
    /// mounted before, and start observing them for resizes.
    fn mount(&mut self, blocks: &[B], intro: Option<&B>) -> Result<(), PrintError>;

    /// Current height of each mounted block, in mount order. Empty when
    /// nothing is mounted.
    fn block_heights(&self) -> Vec<f32>;

    /// Current height of the mounted intro, if one was mounted.
    fn intro_height(&self) -> Option<f32>;

    /// Let one rendering frame pass and collect the events it produced.
    fn advance_frame(&mut self) -> Result<Vec<HostEvent>, PrintError>;
}

#[derive(Debug)]
pub struct LayoutSurface {
    content_width: f32,
    root_style: ComputedStyle,
    fonts: FontManager,
    images: ImageStore,
    blocks: Vec<Block>,
    intro: Option<Block>,
    heights: Vec<f32>,
    intro_height: Option<f32>,
    mounted: bool,
    window_loaded: bool,
    fonts_ready: bool,
}

impl LayoutSurface {
    /// Surface for a page `page_width_in` wide with `padding_x_in` of
    /// horizontal content padding on each side.
    pub fn new(page_width_in: f32, padding_x_in: f32) -> Self {
        Self::with_resources(
            page_width_in,
            padding_x_in,
            FontManager::default(),
            ImageStore::new(),
        )
    }

    pub fn with_resources(
        page_width_in: f32,
        padding_x_in: f32,
        fonts: FontManager,
        images: ImageStore,
    ) -> Self {
        let content_width = ((page_width_in - 2.0 * padding_x_in) * PX_PER_IN).max(1.0);
        Self {
            content_width,
            root_style: ComputedStyle::document_root(),
            fonts,
            images,
            blocks: Vec::new(),
            intro: None,
            heights: Vec::new(),
            intro_height: None,
            mounted: false,
            window_loaded: false,
            fonts_ready: false,
        }
    }

    pub fn content_width(&self) -> f32 {
        self.content_width
    }

    pub fn root_style(&self) -> &ComputedStyle {
        &self.root_style
    }

    pub fn fonts(&self) -> &FontManager {
        &self.fonts
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    pub fn images_mut(&mut self) -> &mut ImageStore {
        &mut self.images
    }

    /// Load a face right away; affects the next layout.
    pub fn load_font(
        &mut self,
        family: &str,
        bold: bool,
        italic: bool,
        bytes: Vec<u8>,
    ) -> Result<(), PrintError> {
        self.fonts.load_font(family, bold, italic, bytes)
    }

    /// Queue a web font that activates on a later frame.
    pub fn queue_web_font(&mut self, family: &str, bold: bool, italic: bool, bytes: Vec<u8>) {
        self.fonts_ready = false;
        self.fonts.queue_web_font(family, bold, italic, bytes);
    }

    /// Lay out `block` with the surface's current fonts and images.
    pub fn layout(&self, block: &Block) -> Result<BlockLayout, PrintError> {
        layout_block(
            block.nodes(),
            &self.root_style,
            self.content_width,
            &self.fonts,
            &self.images,
        )
    }

    pub fn is_settled(&self) -> bool {
        self.images.pending_count() == 0 && self.fonts.pending_count() == 0
    }

    fn relayout(&mut self) -> Result<(), PrintError> {
        self.heights = self
            .blocks
            .iter()
            .map(|b| self.layout(b).map(|l| l.height))
            .collect::<Result<Vec<_>, _>>()?;
        self.intro_height = match &self.intro {
            Some(intro) => Some(self.layout(intro)?.height),
            None => None,
        };
        Ok(())
    }

    /// Settle one pending resource. Images go first, then fonts.
    fn resolve_one(&mut self) -> bool {
        if let Some(src) = self.images.load_next() {
            log::debug!("Image settled: {}", src.chars().take(48).collect::<String>());
            return true;
        }
        match self.fonts.activate_next() {
            Some(Ok(key)) => {
                log::debug!("Web font active: {} (bold={}, italic={})", key.family, key.bold, key.italic);
                true
            }
            Some(Err(e)) => {
                log::warn!("Skipping web font — {e}");
                true
            }
            None => false,
        }
    }
}

impl MeasureSurface<Block> for LayoutSurface {
    fn mount(&mut self, blocks: &[Block], intro: Option<&Block>) -> Result<(), PrintError> {
        self.blocks = blocks.to_vec();
        self.intro = intro.cloned();
        for block in self.blocks.iter().chain(self.intro.iter()) {
            for src in block.image_sources() {
                self.images.register(&src);
            }
        }
        self.mounted = true;
        self.window_loaded = false;
        self.relayout()?;
        log::debug!(
            "Mounted {} blocks for measurement at {:.0}px content width",
            self.blocks.len(),
            self.content_width
        );
        Ok(())
    }

    fn block_heights(&self) -> Vec<f32> {
        self.heights.clone()
    }

    fn intro_height(&self) -> Option<f32> {
        self.intro_height
    }

    fn advance_frame(&mut self) -> Result<Vec<HostEvent>, PrintError> {
        let mut events = Vec::new();
        if !self.mounted {
            return Ok(events);
        }

        if self.resolve_one() {
            let before = (self.heights.clone(), self.intro_height);
            self.relayout()?;
            if before != (self.heights.clone(), self.intro_height) {
                events.push(HostEvent::Resize);
            }
        }
        if !self.window_loaded && self.images.pending_count() == 0 {
            self.window_loaded = true;
            events.push(HostEvent::WindowLoad);
        }
        if !self.fonts_ready && self.fonts.pending_count() == 0 {
            self.fonts_ready = true;
            events.push(HostEvent::FontsReady);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::tests::png_data_uri;

    #[test]
    fn measures_each_block_and_the_intro() {
        let mut surface = LayoutSurface::new(8.5, 1.0);
        assert_eq!(surface.content_width(), 624.0);
        let blocks = vec![
            Block::from_html("<p>Satu</p>"),
            Block::from_html("<p>Dua</p><p>Tiga</p>"),
        ];
        let intro = Block::from_html(r#"<h1 class="text-lg">Surat Perintah Pembayaran</h1>"#);
        surface.mount(&blocks, Some(&intro)).unwrap();
        let heights = surface.block_heights();
        assert_eq!(heights.len(), 2);
        assert!((heights[0] - 21.0).abs() < 0.01);
        assert!((heights[1] - 42.0).abs() < 0.01);
        assert!(surface.intro_height().unwrap() > 0.0);
    }

    #[test]
    fn late_image_resizes_its_block() {
        let src = png_data_uri(40, 30, [10, 20, 30]);
        let block = Block::from_html(&format!(r#"<div><img src="{src}" /></div>"#));
        let mut surface = LayoutSurface::new(8.5, 1.0);
        surface.mount(std::slice::from_ref(&block), None).unwrap();
        assert_eq!(surface.block_heights(), vec![0.0]);

        let events = surface.advance_frame().unwrap();
        assert!(events.contains(&HostEvent::Resize));
        assert!(events.contains(&HostEvent::WindowLoad));
        assert!((surface.block_heights()[0] - 30.0).abs() < 0.01);

        // Nothing left to settle: quiet frames.
        assert!(surface.advance_frame().unwrap().is_empty());
    }

    #[test]
    fn queued_web_font_reports_fonts_ready_once() {
        let mut surface = LayoutSurface::new(8.5, 1.0);
        surface.mount(&[Block::from_html("<p>Bendahara</p>")], None).unwrap();
        let first = surface.advance_frame().unwrap();
        assert_eq!(first, vec![HostEvent::WindowLoad, HostEvent::FontsReady]);
        assert!(surface.advance_frame().unwrap().is_empty());

        // Bytes that do not parse still settle the queue.
        surface.queue_web_font("Inter", false, false, vec![1, 2, 3]);
        assert!(!surface.is_settled());
        let events: Vec<HostEvent> = (0..4)
            .flat_map(|_| surface.advance_frame().unwrap())
            .collect();
        assert_eq!(events, vec![HostEvent::FontsReady]);
        assert!(surface.is_settled());
    }

    #[test]
    fn unmounted_surface_is_silent() {
        let mut surface = LayoutSurface::new(8.5, 1.0);
        assert!(surface.block_heights().is_empty());
        assert!(surface.advance_frame().unwrap().is_empty());
    }
}
