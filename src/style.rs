//! Style resolver – maps Tailwind-like utility classes and inline `style`
//! declarations onto a flat [`ComputedStyle`].
//!
//! Only the utilities the payment-order documents use are understood.
//! Variant prefixes are ignored except `print:`, whose utilities apply
//! because everything this crate lays out is print output.

use std::collections::BTreeMap;

use crate::markup::{DomNode, ElementNode, Tag};

/// One Tailwind spacing unit in CSS px.
const SPACING_UNIT_PX: f32 = 4.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    pub display: Display,
    pub flex_direction: FlexDirection,
    pub flex_grow: f32,
    pub flex_shrink: f32,
    pub justify_content: JustifyContent,
    pub align_items: AlignItems,
    pub gap: f32,

    pub width: Dimension,
    pub height: Dimension,

    /// top, right, bottom, left
    pub margin: [f32; 4],
    /// top, right, bottom, left
    pub padding: [f32; 4],

    pub border_width: f32,
    pub border_color: Color,

    pub font_size: f32,
    pub font_weight: FontWeight,
    pub font_style: FontStyle,
    pub font_family: String,
    /// Multiple of `font_size`.
    pub line_height: f32,
    pub color: Color,
    pub text_align: TextAlign,
    pub underline: bool,

    pub background_color: Color,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Block,
            flex_direction: FlexDirection::Row,
            flex_grow: 0.0,
            flex_shrink: 1.0,
            justify_content: JustifyContent::Start,
            align_items: AlignItems::Stretch,
            gap: 0.0,
            width: Dimension::Auto,
            height: Dimension::Auto,
            margin: [0.0; 4],
            padding: [0.0; 4],
            border_width: 0.0,
            border_color: Color::from_hex("#e5e7eb").unwrap_or(Color::BLACK),
            font_size: 16.0,
            font_weight: FontWeight::Normal,
            font_style: FontStyle::Normal,
            font_family: "Helvetica".to_string(),
            line_height: 1.5,
            color: Color::BLACK,
            text_align: TextAlign::Left,
            underline: false,
            background_color: Color::TRANSPARENT,
        }
    }
}

impl ComputedStyle {
    /// Text style of the measuring container and of every page's content
    /// region: `text-sm leading-normal`.
    pub fn document_root() -> Self {
        Self {
            font_size: 14.0,
            line_height: 1.5,
            ..Self::default()
        }
    }

    /// Copy only the inherited (text) properties of `parent`.
    fn inherit_from(&mut self, parent: &ComputedStyle) {
        self.font_size = parent.font_size;
        self.font_weight = parent.font_weight;
        self.font_style = parent.font_style;
        self.font_family = parent.font_family.clone();
        self.line_height = parent.line_height;
        self.color = parent.color;
        self.text_align = parent.text_align;
        self.underline = parent.underline;
    }

    pub fn is_bold(&self) -> bool {
        self.font_weight == FontWeight::Bold
    }

    pub fn is_italic(&self) -> bool {
        self.font_style == FontStyle::Italic
    }

    pub fn line_height_px(&self) -> f32 {
        self.font_size * self.line_height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Flex,
    Inline,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexDirection {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JustifyContent {
    Start,
    End,
    Center,
    SpaceBetween,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignItems {
    Start,
    End,
    Center,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Px(f32),
    Percent(f32),
}

impl Dimension {
    pub fn resolve(self, parent: f32) -> Option<f32> {
        match self {
            Dimension::Auto => None,
            Dimension::Px(v) => Some(v),
            Dimension::Percent(p) => Some(parent * p / 100.0),
        }
    }
}

/// RGBA colour, channels in 0.0 – 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            6 => Some(Self::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => Some(Self::rgb(
                channel(&hex[0..1].repeat(2))?,
                channel(&hex[1..2].repeat(2))?,
                channel(&hex[2..3].repeat(2))?,
            )),
            _ => None,
        }
    }

    /// Tailwind palette subset, e.g. `slate-400`, `blue-600`, `white`.
    pub fn named(name: &str) -> Option<Self> {
        let hex = match name {
            "black" => "#000000",
            "white" => "#ffffff",
            "slate-100" => "#f1f5f9",
            "slate-200" => "#e2e8f0",
            "slate-300" => "#cbd5e1",
            "slate-400" => "#94a3b8",
            "slate-500" => "#64748b",
            "slate-700" => "#334155",
            "slate-900" => "#0f172a",
            "gray-100" => "#f3f4f6",
            "gray-200" => "#e5e7eb",
            "gray-300" => "#d1d5db",
            "gray-500" => "#6b7280",
            "gray-700" => "#374151",
            "gray-900" => "#111827",
            "blue-600" => "#2563eb",
            "blue-700" => "#1d4ed8",
            "red-600" => "#dc2626",
            "green-600" => "#16a34a",
            _ => return None,
        };
        Self::from_hex(hex)
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve an element's style: tag defaults, then inherited text
/// properties, then classes, then the inline `style` attribute.
pub fn resolve_style(element: &ElementNode, parent: &ComputedStyle) -> ComputedStyle {
    let mut style = ComputedStyle::default();
    style.inherit_from(parent);
    apply_tag_defaults(&mut style, &element.tag);

    for class in element.classes() {
        let class = match class.split_once(':') {
            Some(("print", utility)) => utility,
            Some(_) => continue,
            None => class,
        };
        apply_utility(&mut style, class);
    }

    if let Some(inline) = element.attr("style") {
        for decl in inline.split(';') {
            if let Some((prop, val)) = decl.split_once(':') {
                apply_declaration(&mut style, prop.trim(), val.trim());
            }
        }
    }
    style
}

fn apply_tag_defaults(s: &mut ComputedStyle, tag: &Tag) {
    match tag {
        Tag::H1 | Tag::H2 | Tag::H3 => {
            s.font_weight = FontWeight::Bold;
            s.font_size = match tag {
                Tag::H1 => 24.0,
                Tag::H2 => 20.0,
                _ => 16.0,
            };
            s.margin[2] = 8.0;
        }
        Tag::Ul | Tag::Ol => s.padding[3] = 24.0,
        Tag::Li => s.margin[2] = 2.0,
        Tag::Table => s.width = Dimension::Percent(100.0),
        Tag::Th => s.font_weight = FontWeight::Bold,
        Tag::Strong | Tag::B => {
            s.font_weight = FontWeight::Bold;
            s.display = Display::Inline;
        }
        Tag::Em | Tag::I => {
            s.font_style = FontStyle::Italic;
            s.display = Display::Inline;
        }
        Tag::Span | Tag::Br => s.display = Display::Inline,
        Tag::Head | Tag::Other(_) => s.display = Display::None,
        _ => {}
    }
}

/// Apply one utility class. Unknown classes are ignored.
pub fn apply_utility(s: &mut ComputedStyle, class: &str) {
    match class {
        "flex" => s.display = Display::Flex,
        "block" => s.display = Display::Block,
        "inline" | "inline-block" => s.display = Display::Inline,
        "hidden" => s.display = Display::None,
        "flex-row" => s.flex_direction = FlexDirection::Row,
        "flex-col" => s.flex_direction = FlexDirection::Column,
        "flex-1" => {
            s.flex_grow = 1.0;
            s.flex_shrink = 1.0;
        }
        "grow" | "flex-grow" => s.flex_grow = 1.0,
        "shrink-0" => s.flex_shrink = 0.0,
        "justify-start" => s.justify_content = JustifyContent::Start,
        "justify-end" => s.justify_content = JustifyContent::End,
        "justify-center" => s.justify_content = JustifyContent::Center,
        "justify-between" => s.justify_content = JustifyContent::SpaceBetween,
        "items-start" => s.align_items = AlignItems::Start,
        "items-end" => s.align_items = AlignItems::End,
        "items-center" => s.align_items = AlignItems::Center,
        "items-stretch" => s.align_items = AlignItems::Stretch,
        "font-bold" | "font-semibold" => s.font_weight = FontWeight::Bold,
        "font-normal" => s.font_weight = FontWeight::Normal,
        "italic" => s.font_style = FontStyle::Italic,
        "not-italic" => s.font_style = FontStyle::Normal,
        "underline" => s.underline = true,
        "no-underline" => s.underline = false,
        "text-left" => s.text_align = TextAlign::Left,
        "text-center" => s.text_align = TextAlign::Center,
        "text-right" => s.text_align = TextAlign::Right,
        "text-xs" => s.font_size = 12.0,
        "text-sm" => s.font_size = 14.0,
        "text-base" => s.font_size = 16.0,
        "text-lg" => s.font_size = 18.0,
        "text-xl" => s.font_size = 20.0,
        "text-2xl" => s.font_size = 24.0,
        "leading-none" => s.line_height = 1.0,
        "leading-tight" => s.line_height = 1.25,
        "leading-snug" => s.line_height = 1.375,
        "leading-normal" => s.line_height = 1.5,
        "leading-relaxed" => s.line_height = 1.625,
        "leading-loose" => s.line_height = 2.0,
        "w-full" => s.width = Dimension::Percent(100.0),
        "w-auto" => s.width = Dimension::Auto,
        "border" => s.border_width = 1.0,
        "border-0" => s.border_width = 0.0,
        "border-2" => s.border_width = 2.0,
        _ => apply_parametric_utility(s, class),
    }
}

fn apply_parametric_utility(s: &mut ComputedStyle, class: &str) {
    if let Some(color) = class.strip_prefix("text-").and_then(Color::named) {
        s.color = color;
        return;
    }
    if let Some(color) = class.strip_prefix("bg-").and_then(Color::named) {
        s.background_color = color;
        return;
    }
    if let Some(color) = class.strip_prefix("border-").and_then(Color::named) {
        s.border_color = color;
        return;
    }
    if let Some(frac) = class.strip_prefix("w-") {
        if let Some((num, den)) = frac.split_once('/') {
            if let (Ok(num), Ok(den)) = (num.parse::<f32>(), den.parse::<f32>()) {
                if den > 0.0 {
                    s.width = Dimension::Percent(num * 100.0 / den);
                }
            }
            return;
        }
    }

    let Some((prefix, value)) = class.rsplit_once('-') else {
        return;
    };
    let Ok(units) = value.parse::<f32>() else {
        return;
    };
    let px = units * SPACING_UNIT_PX;
    let [top, right, bottom, left] = [0, 1, 2, 3];
    match prefix {
        "p" => s.padding = [px; 4],
        "px" => {
            s.padding[left] = px;
            s.padding[right] = px;
        }
        "py" => {
            s.padding[top] = px;
            s.padding[bottom] = px;
        }
        "pt" => s.padding[top] = px,
        "pr" => s.padding[right] = px,
        "pb" => s.padding[bottom] = px,
        "pl" => s.padding[left] = px,
        "m" => s.margin = [px; 4],
        "mx" => {
            s.margin[left] = px;
            s.margin[right] = px;
        }
        "my" => {
            s.margin[top] = px;
            s.margin[bottom] = px;
        }
        "mt" => s.margin[top] = px,
        "mr" => s.margin[right] = px,
        "mb" => s.margin[bottom] = px,
        "ml" => s.margin[left] = px,
        "gap" => s.gap = px,
        "w" => s.width = Dimension::Px(px),
        "h" => s.height = Dimension::Px(px),
        _ => {}
    }
}

fn apply_declaration(s: &mut ComputedStyle, prop: &str, val: &str) {
    match prop {
        "display" => match val {
            "flex" => s.display = Display::Flex,
            "block" => s.display = Display::Block,
            "inline" | "inline-block" => s.display = Display::Inline,
            "none" => s.display = Display::None,
            _ => {}
        },
        "flex-direction" => match val {
            "row" => s.flex_direction = FlexDirection::Row,
            "column" => s.flex_direction = FlexDirection::Column,
            _ => {}
        },
        "font-size" => {
            if let Some(px) = parse_length(val) {
                s.font_size = px;
            }
        }
        "font-weight" => {
            s.font_weight = match val {
                "bold" | "600" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "font-style" => {
            s.font_style = if val == "italic" {
                FontStyle::Italic
            } else {
                FontStyle::Normal
            }
        }
        "font-family" => {
            if let Some(first) = val.split(',').next() {
                s.font_family = first.trim().trim_matches(['"', '\'']).to_string();
            }
        }
        "color" => {
            if let Some(c) = Color::from_hex(val) {
                s.color = c;
            }
        }
        "background-color" | "background" => {
            if let Some(c) = Color::from_hex(val) {
                s.background_color = c;
            }
        }
        "text-align" => {
            s.text_align = match val {
                "center" => TextAlign::Center,
                "right" => TextAlign::Right,
                _ => TextAlign::Left,
            }
        }
        "width" => s.width = parse_dimension(val),
        "height" => s.height = parse_dimension(val),
        "margin" => apply_box_shorthand(val, &mut s.margin),
        "margin-top" => set_side(&mut s.margin, 0, val),
        "margin-right" => set_side(&mut s.margin, 1, val),
        "margin-bottom" => set_side(&mut s.margin, 2, val),
        "margin-left" => set_side(&mut s.margin, 3, val),
        "padding" => apply_box_shorthand(val, &mut s.padding),
        "padding-top" => set_side(&mut s.padding, 0, val),
        "padding-right" => set_side(&mut s.padding, 1, val),
        "padding-bottom" => set_side(&mut s.padding, 2, val),
        "padding-left" => set_side(&mut s.padding, 3, val),
        "border-width" => {
            if let Some(px) = parse_length(val) {
                s.border_width = px;
            }
        }
        "border-color" => {
            if let Some(c) = Color::from_hex(val) {
                s.border_color = c;
            }
        }
        "line-height" => {
            if let Ok(factor) = val.parse::<f32>() {
                s.line_height = factor;
            } else if let Some(px) = parse_length(val) {
                if s.font_size > 0.0 {
                    s.line_height = px / s.font_size;
                }
            }
        }
        "gap" => {
            if let Some(px) = parse_length(val) {
                s.gap = px;
            }
        }
        _ => {}
    }
}

/// Parse a CSS length into px. Understands `px`, `in`, `pt`, `mm`, `cm`
/// and bare numbers (px).
pub fn parse_length(val: &str) -> Option<f32> {
    let val = val.trim();
    let units: [(&str, f32); 5] = [
        ("px", 1.0),
        ("in", crate::PX_PER_IN),
        ("pt", crate::PX_PER_IN / 72.0),
        ("mm", crate::PX_PER_IN / 25.4),
        ("cm", crate::PX_PER_IN / 2.54),
    ];
    for (suffix, factor) in units {
        if let Some(num) = val.strip_suffix(suffix) {
            return num.trim().parse::<f32>().ok().map(|v| v * factor);
        }
    }
    val.parse::<f32>().ok()
}

fn parse_dimension(val: &str) -> Dimension {
    if let Some(pct) = val.trim().strip_suffix('%') {
        return pct
            .trim()
            .parse::<f32>()
            .map(Dimension::Percent)
            .unwrap_or(Dimension::Auto);
    }
    parse_length(val).map(Dimension::Px).unwrap_or(Dimension::Auto)
}

fn set_side(sides: &mut [f32; 4], index: usize, val: &str) {
    if let Some(px) = parse_length(val) {
        sides[index] = px;
    }
}

fn apply_box_shorthand(val: &str, sides: &mut [f32; 4]) {
    let parts: Vec<f32> = val.split_whitespace().filter_map(parse_length).collect();
    *sides = match parts.as_slice() {
        [all] => [*all; 4],
        [vertical, horizontal] => [*vertical, *horizontal, *vertical, *horizontal],
        [top, horizontal, bottom] => [*top, *horizontal, *bottom, *horizontal],
        [top, right, bottom, left] => [*top, *right, *bottom, *left],
        _ => return,
    };
}

// ---------------------------------------------------------------------------
// Styled tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum StyledNode {
    Element {
        tag: Tag,
        style: ComputedStyle,
        children: Vec<StyledNode>,
        attrs: BTreeMap<String, String>,
    },
    Text {
        text: String,
        style: ComputedStyle,
    },
}

impl StyledNode {
    pub fn style(&self) -> &ComputedStyle {
        match self {
            StyledNode::Element { style, .. } | StyledNode::Text { style, .. } => style,
        }
    }
}

/// Resolve styles top-down. Elements with `display: none` are dropped.
pub fn build_styled_tree(nodes: &[DomNode], parent: &ComputedStyle) -> Vec<StyledNode> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            DomNode::Element(e) => {
                let style = resolve_style(e, parent);
                if style.display == Display::None {
                    continue;
                }
                let children = build_styled_tree(&e.children, &style);
                out.push(StyledNode::Element {
                    tag: e.tag.clone(),
                    style,
                    children,
                    attrs: e.attributes.clone(),
                });
            }
            DomNode::Text(text) if !text.trim().is_empty() => {
                // Text carries only inherited properties; box-model fields
                // stay at their defaults.
                let mut style = ComputedStyle::default();
                style.inherit_from(parent);
                out.push(StyledNode::Text {
                    text: text.clone(),
                    style,
                });
            }
            DomNode::Text(_) => {}
        }
    }
    out
}
