//! Font registry and text measurement using `ttf-parser`.
//!
//! Without real font files the manager falls back to Helvetica-like
//! heuristic metrics. Web fonts can be queued and activated later, which is
//! what makes text reflow (and block heights change) after the first
//! measurement pass.

use std::collections::{HashMap, VecDeque};

use crate::error::PrintError;

/// Metrics of a loaded face. `bytes` is empty for the synthetic fallback.
#[derive(Debug, Clone)]
pub struct FontData {
    pub bytes: Vec<u8>,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
}

impl FontData {
    fn synthetic() -> Self {
        Self {
            bytes: Vec::new(),
            units_per_em: 1000.0,
            ascender: 750.0,
            descender: -250.0,
        }
    }

    fn parse(bytes: Vec<u8>) -> Result<Self, PrintError> {
        let face = ttf_parser::Face::parse(&bytes, 0)
            .map_err(|e| PrintError::Font(format!("failed to parse font: {e}")))?;
        Ok(Self {
            units_per_em: face.units_per_em() as f32,
            ascender: face.ascender() as f32,
            descender: face.descender() as f32,
            bytes,
        })
    }

    pub fn is_real(&self) -> bool {
        !self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FontKey {
    pub family: String,
    pub bold: bool,
    pub italic: bool,
}

impl FontKey {
    pub fn new(family: &str, bold: bool, italic: bool) -> Self {
        Self {
            family: family.to_string(),
            bold,
            italic,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingFont {
    key: FontKey,
    bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct FontManager {
    fonts: HashMap<FontKey, FontData>,
    fallback: FontData,
    pending: VecDeque<PendingFont>,
}

impl FontManager {
    pub fn new() -> Self {
        Self {
            fonts: HashMap::new(),
            fallback: FontData::synthetic(),
            pending: VecDeque::new(),
        }
    }

    /// Load a TTF/OTF face immediately.
    pub fn load_font(
        &mut self,
        family: &str,
        bold: bool,
        italic: bool,
        bytes: Vec<u8>,
    ) -> Result<(), PrintError> {
        let data = FontData::parse(bytes)?;
        self.fonts.insert(FontKey::new(family, bold, italic), data);
        Ok(())
    }

    /// Queue a web font. Text keeps fallback metrics until the font is
    /// activated by [`FontManager::activate_next`].
    pub fn queue_web_font(&mut self, family: &str, bold: bool, italic: bool, bytes: Vec<u8>) {
        self.pending.push_back(PendingFont {
            key: FontKey::new(family, bold, italic),
            bytes,
        });
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Activate the oldest queued web font. Returns `None` when nothing is
    /// queued. A face that fails to parse is dropped from the queue.
    pub fn activate_next(&mut self) -> Option<Result<FontKey, PrintError>> {
        let PendingFont { key, bytes } = self.pending.pop_front()?;
        Some(FontData::parse(bytes).map(|data| {
            self.fonts.insert(key.clone(), data);
            key
        }))
    }

    /// Face for `key`: exact match, then the regular face of the same
    /// family, then the synthetic fallback.
    pub fn get(&self, key: &FontKey) -> &FontData {
        self.fonts
            .get(key)
            .or_else(|| self.fonts.get(&FontKey::new(&key.family, false, false)))
            .unwrap_or(&self.fallback)
    }

    pub fn has_real_fonts(&self) -> bool {
        self.fonts.values().any(FontData::is_real)
    }

    /// Width of `text` in px at `font_size`.
    pub fn measure_text_width(&self, text: &str, font_size: f32, key: &FontKey) -> f32 {
        let data = self.get(key);
        let heuristic = || {
            // Average advance of a proportional face; bold runs ~10 % wider.
            let avg = if key.bold { 0.55 } else { 0.5 };
            text.chars().count() as f32 * font_size * avg
        };
        if !data.is_real() {
            return heuristic();
        }
        let Ok(face) = ttf_parser::Face::parse(&data.bytes, 0) else {
            return heuristic();
        };
        let scale = font_size / data.units_per_em;
        text.chars()
            .map(|ch| {
                face.glyph_index(ch)
                    .and_then(|gid| face.glyph_hor_advance(gid))
                    .map(|adv| adv as f32 * scale)
                    .unwrap_or(font_size * 0.5)
            })
            .sum()
    }

    pub fn ascender_px(&self, font_size: f32, key: &FontKey) -> f32 {
        let data = self.get(key);
        data.ascender * font_size / data.units_per_em
    }
}

impl Default for FontManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Greedy word wrap to `max_width` px. Explicit newlines always break.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    key: &FontKey,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            if line.is_empty() {
                line.push_str(word);
                continue;
            }
            let candidate = format!("{line} {word}");
            if max_width > 0.0 && fonts.measure_text_width(&candidate, font_size, key) > max_width {
                lines.push(std::mem::replace(&mut line, word.to_string()));
            } else {
                line = candidate;
            }
        }
        lines.push(line);
    }
    lines
}
