//! Document layout – the frozen description of every visible page.
//!
//! This is what both output paths consume: the rasterizer paints it into
//! bitmaps for the image PDF, the vector renderer emits it as PDF drawing
//! operations. All coordinates are CSS px relative to the page's top-left.

use serde::{Deserialize, Serialize};

use crate::error::PrintError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentLayout {
    pub doc_name: String,
    pub page_width_px: f32,
    pub page_height_px: f32,
    pub pages: Vec<PageLayout>,
}

/// One page. Paint order: white page, header band, content boxes, footer
/// band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_index: usize,
    pub header: Option<LayoutBox>,
    pub footer: Option<LayoutBox>,
    pub boxes: Vec<LayoutBox>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    pub background_color: Option<[f32; 4]>,
    pub border: Option<BorderStyle>,

    pub text: Option<TextContent>,
    pub image: Option<ImageContent>,
    /// List bullet/number drawn left of the box (e.g. "•" or "1.").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_marker: Option<String>,

    pub children: Vec<LayoutBox>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorderStyle {
    pub width: f32,
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    pub lines: Vec<TextLine>,
    pub font_family: String,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub color: [f32; 4],
    /// Line box height in px.
    pub line_height: f32,
    pub underline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    /// X offset within the box (alignment).
    pub x_offset: f32,
    /// Y offset of the line box from the top of the box.
    pub y_offset: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFit {
    /// Stretch to the box.
    Fill,
    /// Scale to cover the box, centred, overflow clipped.
    Cover,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageContent {
    pub src: String,
    pub fit: ImageFit,
}

impl DocumentLayout {
    pub fn to_json(&self) -> Result<String, PrintError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PrintError::InvalidConfiguration(format!("layout serialization: {e}")))
    }

    pub fn from_json(json: &str) -> Result<Self, PrintError> {
        serde_json::from_str(json)
            .map_err(|e| PrintError::InvalidConfiguration(format!("layout JSON: {e}")))
    }
}

impl LayoutBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            background_color: None,
            border: None,
            text: None,
            image: None,
            list_marker: None,
            children: Vec::new(),
        }
    }

    /// A full-width image band, e.g. a letterhead.
    pub fn band(src: &str, y: f32, width: f32, height: f32) -> Self {
        Self {
            image: Some(ImageContent {
                src: src.to_string(),
                fit: ImageFit::Cover,
            }),
            ..Self::new(0.0, y, width, height)
        }
    }

    /// This box and all its descendants, depth first.
    pub fn walk(&self) -> Vec<&LayoutBox> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_keeps_bands() {
        let layout = DocumentLayout {
            doc_name: "SPP".to_string(),
            page_width_px: 816.0,
            page_height_px: 1056.0,
            pages: vec![PageLayout {
                page_index: 0,
                header: Some(LayoutBox::band("kop.png", 0.0, 816.0, 96.0)),
                footer: None,
                boxes: vec![LayoutBox::new(96.0, 192.0, 624.0, 21.0)],
            }],
        };
        let json = layout.to_json().unwrap();
        assert!(json.contains("\"fit\": \"cover\""));
        let back = DocumentLayout::from_json(&json).unwrap();
        assert_eq!(back.pages.len(), 1);
        assert_eq!(back.pages[0].header.as_ref().unwrap().height, 96.0);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            DocumentLayout::from_json("{\"pages\": 3}"),
            Err(PrintError::InvalidConfiguration(_))
        ));
    }
}
