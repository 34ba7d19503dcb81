//! Layout engine – uses Taffy to lay a block's styled tree out at a given
//! content width, producing positioned boxes relative to the block origin.
//!
//! Each block is laid out in its own tree: blocks never influence each
//! other, so a block's height is a function of its markup, the content
//! width, the loaded fonts and the loaded images only.

use std::collections::HashMap;

use taffy::{
    AvailableSpace, Dimension as TaffyDimension, LengthPercentage, LengthPercentageAuto, NodeId,
    Rect, Size, Style, TaffyTree,
};

use crate::assets::ImageSizes;
use crate::error::PrintError;
use crate::fonts::{wrap_text, FontKey, FontManager};
use crate::markup::{DomNode, Tag};
use crate::style::{self, build_styled_tree, ComputedStyle, Dimension, StyledNode, TextAlign};

/// A box in block coordinates (origin = top-left of the block).
#[derive(Debug, Clone)]
pub struct PositionedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub tag: Option<Tag>,
    pub style: ComputedStyle,
    pub content: BoxContent,
    pub children: Vec<PositionedBox>,
}

#[derive(Debug, Clone)]
pub enum BoxContent {
    None,
    Text { lines: Vec<PlacedLine> },
    Image { src: String },
    ListMarker { marker: String },
}

/// One wrapped line with its offsets inside the text box.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub x_offset: f32,
    pub y_offset: f32,
}

/// A laid-out block: its outer box plus total height including the
/// vertical margins of its top-level elements.
#[derive(Debug, Clone)]
pub struct BlockLayout {
    pub root: PositionedBox,
    pub height: f32,
}

/// Header and row heights of a laid-out table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableMetrics {
    pub header_height: f32,
    pub row_heights: Vec<f32>,
}

struct LayoutBuilder<'a> {
    taffy: TaffyTree<()>,
    fonts: &'a FontManager,
    images: &'a dyn ImageSizes,
    styles: HashMap<NodeId, ComputedStyle>,
    tags: HashMap<NodeId, Tag>,
    content: HashMap<NodeId, BoxContent>,
    /// Raw wrapped lines of text leaves; offsets are placed at extraction
    /// time once the final box width is known.
    raw_lines: HashMap<NodeId, Vec<String>>,
}

impl<'a> LayoutBuilder<'a> {
    fn new(fonts: &'a FontManager, images: &'a dyn ImageSizes) -> Self {
        Self {
            taffy: TaffyTree::new(),
            fonts,
            images,
            styles: HashMap::new(),
            tags: HashMap::new(),
            content: HashMap::new(),
            raw_lines: HashMap::new(),
        }
    }

    fn build(&mut self, node: &StyledNode, width: f32, in_row: bool) -> Result<NodeId, PrintError> {
        match node {
            StyledNode::Text { text, style } => {
                let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
                self.text_leaf(&normalized, style, width, in_row)
            }
            StyledNode::Element {
                tag,
                style,
                children,
                attrs,
            } => match tag {
                Tag::Img => {
                    let src = attrs.get("src").cloned().unwrap_or_default();
                    self.image_leaf(src, style, width)
                }
                Tag::Br => {
                    let leaf = self.taffy.new_leaf(Style {
                        size: Size {
                            width: TaffyDimension::Length(0.0),
                            height: TaffyDimension::Length(style.line_height_px()),
                        },
                        ..Style::default()
                    })?;
                    self.styles.insert(leaf, style.clone());
                    Ok(leaf)
                }
                _ => self.element(tag, style, children, width, in_row),
            },
        }
    }

    fn element(
        &mut self,
        tag: &Tag,
        style: &ComputedStyle,
        children: &[StyledNode],
        width: f32,
        in_row: bool,
    ) -> Result<NodeId, PrintError> {
        let own_width = style.width.resolve(width).unwrap_or(width);
        let inner_width = (own_width
            - style.padding[1]
            - style.padding[3]
            - 2.0 * style.border_width)
            .max(0.0);

        let mut child_ids = Vec::with_capacity(children.len());
        if !children.is_empty() && children.iter().all(is_inline) {
            // A run of inline content flows as one wrapped paragraph.
            let text = collect_text(children);
            if !text.is_empty() {
                child_ids.push(self.text_leaf(&text, style, inner_width, false)?);
            }
        } else {
            let row = is_row(tag, style);
            let child_width = if row {
                let count = children.len().max(1) as f32;
                ((inner_width - style.gap * (count - 1.0)) / count).max(1.0)
            } else {
                inner_width
            };
            let mut item_number = 0;
            for child in children {
                let id = self.build(child, child_width, row)?;
                if let StyledNode::Element { tag: Tag::Li, .. } = child {
                    item_number += 1;
                    let marker = if *tag == Tag::Ol {
                        format!("{item_number}.")
                    } else {
                        "\u{2022}".to_string()
                    };
                    self.content.insert(id, BoxContent::ListMarker { marker });
                }
                child_ids.push(id);
            }
        }

        let taffy_style = to_taffy(style, tag, in_row);
        let node = self.taffy.new_with_children(taffy_style, &child_ids)?;
        self.styles.insert(node, style.clone());
        self.tags.insert(node, tag.clone());
        Ok(node)
    }

    fn text_leaf(
        &mut self,
        text: &str,
        style: &ComputedStyle,
        width: f32,
        in_row: bool,
    ) -> Result<NodeId, PrintError> {
        let key = font_key(style);
        let lines = wrap_text(text, style.font_size, &key, width, self.fonts);
        let height = lines.len() as f32 * style.line_height_px();
        let text_width = lines
            .iter()
            .map(|l| self.fonts.measure_text_width(l, style.font_size, &key))
            .fold(0.0f32, f32::max)
            .min(width.max(0.0));

        let leaf = self.taffy.new_leaf(Style {
            size: Size {
                // In a row the leaf needs its own width; in a column it
                // stretches so alignment has the full line to work with.
                width: if in_row {
                    TaffyDimension::Length(text_width)
                } else {
                    TaffyDimension::Auto
                },
                height: TaffyDimension::Length(height),
            },
            flex_shrink: 0.0,
            ..Style::default()
        })?;
        let mut text_style = style.clone();
        text_style.margin = [0.0; 4];
        text_style.padding = [0.0; 4];
        text_style.border_width = 0.0;
        text_style.background_color = style::Color::TRANSPARENT;
        self.styles.insert(leaf, text_style);
        self.raw_lines.insert(leaf, lines);
        Ok(leaf)
    }

    /// Images without an explicit size take their intrinsic size once
    /// loaded; until then they collapse to 0×0, as in a browser.
    fn image_leaf(
        &mut self,
        src: String,
        style: &ComputedStyle,
        parent_width: f32,
    ) -> Result<NodeId, PrintError> {
        let known_w = style.width.resolve(parent_width);
        let known_h = style.height.resolve(0.0).filter(|_| !matches!(style.height, Dimension::Percent(_)));
        let (w, h) = match (known_w, known_h, self.images.intrinsic_size(&src)) {
            (Some(w), Some(h), _) => (w, h),
            (Some(w), None, Some((iw, ih))) if iw > 0.0 => (w, w * ih / iw),
            (None, Some(h), Some((iw, ih))) if ih > 0.0 => (h * iw / ih, h),
            (None, None, Some((iw, ih))) => (iw.min(parent_width), ih * iw.min(parent_width) / iw.max(1.0)),
            (w, h, _) => (w.unwrap_or(0.0), h.unwrap_or(0.0)),
        };

        let leaf = self.taffy.new_leaf(Style {
            size: Size {
                width: TaffyDimension::Length(w),
                height: TaffyDimension::Length(h),
            },
            margin: margin_rect(style),
            flex_shrink: 0.0,
            ..Style::default()
        })?;
        self.styles.insert(leaf, style.clone());
        self.tags.insert(leaf, Tag::Img);
        self.content.insert(leaf, BoxContent::Image { src });
        Ok(leaf)
    }

    fn extract(&self, node: NodeId, offset_x: f32, offset_y: f32) -> Result<PositionedBox, PrintError> {
        let layout = self.taffy.layout(node)?;
        let x = offset_x + layout.location.x;
        let y = offset_y + layout.location.y;
        let style = self.styles.get(&node).cloned().unwrap_or_default();

        let content = match self.raw_lines.get(&node) {
            Some(lines) => BoxContent::Text {
                lines: self.place_lines(lines, &style, layout.size.width),
            },
            None => self.content.get(&node).cloned().unwrap_or(BoxContent::None),
        };

        let children = self
            .taffy
            .children(node)?
            .into_iter()
            .map(|child| self.extract(child, x, y))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PositionedBox {
            x,
            y,
            width: layout.size.width,
            height: layout.size.height,
            tag: self.tags.get(&node).cloned(),
            style,
            content,
            children,
        })
    }

    fn place_lines(&self, lines: &[String], style: &ComputedStyle, box_width: f32) -> Vec<PlacedLine> {
        let key = font_key(style);
        let line_height = style.line_height_px();
        lines
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let free = box_width - self.fonts.measure_text_width(text, style.font_size, &key);
                let x_offset = match style.text_align {
                    TextAlign::Left => 0.0,
                    TextAlign::Center => (free / 2.0).max(0.0),
                    TextAlign::Right => free.max(0.0),
                };
                PlacedLine {
                    text: text.clone(),
                    x_offset,
                    y_offset: i as f32 * line_height,
                }
            })
            .collect()
    }
}

fn is_inline(node: &StyledNode) -> bool {
    match node {
        StyledNode::Text { .. } => true,
        StyledNode::Element { tag, style, children, .. } => {
            *tag != Tag::Img
                && style.display == style::Display::Inline
                && children.iter().all(is_inline)
        }
    }
}

fn collect_text(nodes: &[StyledNode]) -> String {
    fn walk(node: &StyledNode, out: &mut String) {
        match node {
            StyledNode::Text { text, .. } => {
                out.push(' ');
                out.push_str(text);
            }
            StyledNode::Element { tag: Tag::Br, .. } => out.push('\n'),
            StyledNode::Element { children, .. } => children.iter().for_each(|c| walk(c, out)),
        }
    }
    let mut raw = String::new();
    nodes.iter().for_each(|n| walk(n, &mut raw));
    raw.split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn is_row(tag: &Tag, style: &ComputedStyle) -> bool {
    *tag == Tag::Tr
        || (style.display == style::Display::Flex && style.flex_direction == style::FlexDirection::Row)
}

pub fn font_key(style: &ComputedStyle) -> FontKey {
    FontKey::new(&style.font_family, style.is_bold(), style.is_italic())
}

fn margin_rect(s: &ComputedStyle) -> Rect<LengthPercentageAuto> {
    Rect {
        top: LengthPercentageAuto::Length(s.margin[0]),
        right: LengthPercentageAuto::Length(s.margin[1]),
        bottom: LengthPercentageAuto::Length(s.margin[2]),
        left: LengthPercentageAuto::Length(s.margin[3]),
    }
}

fn sides(values: [f32; 4]) -> Rect<LengthPercentage> {
    Rect {
        top: LengthPercentage::Length(values[0]),
        right: LengthPercentage::Length(values[1]),
        bottom: LengthPercentage::Length(values[2]),
        left: LengthPercentage::Length(values[3]),
    }
}

fn dimension(d: Dimension) -> TaffyDimension {
    match d {
        Dimension::Auto => TaffyDimension::Auto,
        Dimension::Px(v) => TaffyDimension::Length(v),
        Dimension::Percent(v) => TaffyDimension::Percent(v / 100.0),
    }
}

/// Every element becomes a flex container: rows for `tr` and `flex`
/// elements, columns for everything else (block flow).
fn to_taffy(s: &ComputedStyle, tag: &Tag, in_row: bool) -> Style {
    let mut ts = Style {
        display: taffy::Display::Flex,
        flex_direction: if is_row(tag, s) {
            taffy::FlexDirection::Row
        } else {
            taffy::FlexDirection::Column
        },
        size: Size {
            width: dimension(s.width),
            height: dimension(s.height),
        },
        min_size: Size {
            width: TaffyDimension::Length(0.0),
            height: TaffyDimension::Auto,
        },
        margin: margin_rect(s),
        padding: sides(s.padding),
        border: sides([s.border_width; 4]),
        gap: Size {
            width: LengthPercentage::Length(s.gap),
            height: LengthPercentage::Length(s.gap),
        },
        flex_grow: s.flex_grow,
        flex_shrink: s.flex_shrink,
        justify_content: Some(match s.justify_content {
            style::JustifyContent::Start => taffy::JustifyContent::Start,
            style::JustifyContent::End => taffy::JustifyContent::End,
            style::JustifyContent::Center => taffy::JustifyContent::Center,
            style::JustifyContent::SpaceBetween => taffy::JustifyContent::SpaceBetween,
        }),
        align_items: Some(match s.align_items {
            style::AlignItems::Start => taffy::AlignItems::Start,
            style::AlignItems::End => taffy::AlignItems::End,
            style::AlignItems::Center => taffy::AlignItems::Center,
            style::AlignItems::Stretch => taffy::AlignItems::Stretch,
        }),
        ..Style::default()
    };

    match tag {
        Tag::Td | Tag::Th => {
            // Equal-width columns.
            ts.flex_grow = 1.0;
            ts.flex_shrink = 1.0;
            ts.flex_basis = TaffyDimension::Length(0.0);
        }
        Tag::Tr | Tag::Thead | Tag::Tbody | Tag::Tfoot => {
            ts.size.width = TaffyDimension::Percent(1.0);
            ts.align_items = Some(taffy::AlignItems::Stretch);
        }
        _ if in_row && s.width == Dimension::Auto && s.flex_grow == 0.0 => {
            // Children of a flex row that don't grow size to content.
            ts.flex_shrink = 1.0;
        }
        _ => {}
    }
    ts
}

/// Lay out one block's markup at `content_width`.
pub fn layout_block(
    nodes: &[DomNode],
    root_style: &ComputedStyle,
    content_width: f32,
    fonts: &FontManager,
    images: &dyn ImageSizes,
) -> Result<BlockLayout, PrintError> {
    let styled = build_styled_tree(nodes, root_style);
    let mut builder = LayoutBuilder::new(fonts, images);

    let child_ids = styled
        .iter()
        .map(|node| builder.build(node, content_width, false))
        .collect::<Result<Vec<_>, _>>()?;

    let wrapper = builder.taffy.new_with_children(
        Style {
            display: taffy::Display::Flex,
            flex_direction: taffy::FlexDirection::Column,
            size: Size {
                width: TaffyDimension::Length(content_width),
                height: TaffyDimension::Auto,
            },
            ..Style::default()
        },
        &child_ids,
    )?;
    builder.styles.insert(wrapper, root_style.clone());

    builder.taffy.compute_layout(
        wrapper,
        Size {
            width: AvailableSpace::Definite(content_width),
            height: AvailableSpace::MaxContent,
        },
    )?;

    let root = builder.extract(wrapper, 0.0, 0.0)?;
    Ok(BlockLayout {
        height: root.height,
        root,
    })
}

/// Lay out a table and read back the height of its `<thead>` and of every
/// `<tr>` outside it, in document order.
pub fn measure_table(
    nodes: &[DomNode],
    root_style: &ComputedStyle,
    content_width: f32,
    fonts: &FontManager,
    images: &dyn ImageSizes,
) -> Result<TableMetrics, PrintError> {
    fn walk(b: &PositionedBox, in_head: bool, metrics: &mut TableMetrics) {
        match &b.tag {
            Some(Tag::Thead) => metrics.header_height += b.height,
            Some(Tag::Tr) if !in_head => metrics.row_heights.push(b.height),
            _ => b.children.iter().for_each(|c| walk(c, in_head, metrics)),
        }
    }
    let layout = layout_block(nodes, root_style, content_width, fonts, images)?;
    let mut metrics = TableMetrics::default();
    walk(&layout.root, false, &mut metrics);
    Ok(metrics)
}
