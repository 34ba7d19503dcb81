//! Block markup – the controlled HTML subset that page content is written in.
//!
//! A [`Block`] is an opaque unit of page content. It has no size of its own;
//! its height is only known after a measurement surface has laid it out.
//!
//! Supported elements:
//! - Structural: div, p, h1-h3, ul, ol, li, img, br
//! - Tables: table, thead, tbody, tfoot, tr, td, th
//! - Inline: span, strong, b, em, i
//! - Styling via `class` and `style` attributes

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Tree types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Div,
    P,
    H1,
    H2,
    H3,
    Ul,
    Ol,
    Li,
    Table,
    Thead,
    Tbody,
    Tfoot,
    Tr,
    Td,
    Th,
    Span,
    Strong,
    B,
    Em,
    I,
    Br,
    Img,
    Body,
    Html,
    Head,
    /// Anything else. Kept in the tree so serialization round-trips, but
    /// the style resolver hides it.
    Other(String),
}

impl Tag {
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "div" => Tag::Div,
            "p" => Tag::P,
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "h3" => Tag::H3,
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "table" => Tag::Table,
            "thead" => Tag::Thead,
            "tbody" => Tag::Tbody,
            "tfoot" => Tag::Tfoot,
            "tr" => Tag::Tr,
            "td" => Tag::Td,
            "th" => Tag::Th,
            "span" => Tag::Span,
            "strong" => Tag::Strong,
            "b" => Tag::B,
            "em" => Tag::Em,
            "i" => Tag::I,
            "br" => Tag::Br,
            "img" => Tag::Img,
            "body" => Tag::Body,
            "html" => Tag::Html,
            "head" => Tag::Head,
            other => Tag::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Tag::Div => "div",
            Tag::P => "p",
            Tag::H1 => "h1",
            Tag::H2 => "h2",
            Tag::H3 => "h3",
            Tag::Ul => "ul",
            Tag::Ol => "ol",
            Tag::Li => "li",
            Tag::Table => "table",
            Tag::Thead => "thead",
            Tag::Tbody => "tbody",
            Tag::Tfoot => "tfoot",
            Tag::Tr => "tr",
            Tag::Td => "td",
            Tag::Th => "th",
            Tag::Span => "span",
            Tag::Strong => "strong",
            Tag::B => "b",
            Tag::Em => "em",
            Tag::I => "i",
            Tag::Br => "br",
            Tag::Img => "img",
            Tag::Body => "body",
            Tag::Html => "html",
            Tag::Head => "head",
            Tag::Other(name) => name,
        }
    }

    /// Void elements never have children or a closing tag.
    pub fn is_void(&self) -> bool {
        matches!(self, Tag::Img | Tag::Br)
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Tag::Span | Tag::Strong | Tag::B | Tag::Em | Tag::I | Tag::Br)
    }

    pub fn is_table_section(&self) -> bool {
        matches!(self, Tag::Thead | Tag::Tbody | Tag::Tfoot)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub tag: Tag,
    /// Sorted so serialization is stable.
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn with_children(mut self, children: Vec<DomNode>) -> Self {
        self.children = children;
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// A unit of page content: the markup source plus its parsed tree.
///
/// Cloning is cheap; the source and tree are shared. Blocks are never
/// mutated once created.
#[derive(Debug, Clone)]
pub struct Block {
    html: Arc<str>,
    nodes: Arc<[DomNode]>,
}

impl Block {
    pub fn from_html(html: &str) -> Self {
        Self {
            html: Arc::from(html),
            nodes: parse_html(html).into(),
        }
    }

    /// Build a block from already parsed nodes, e.g. one top-level element
    /// of a larger document.
    pub fn from_nodes(nodes: Vec<DomNode>) -> Self {
        let html = to_html(&nodes);
        Self {
            html: Arc::from(html.as_str()),
            nodes: nodes.into(),
        }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn nodes(&self) -> &[DomNode] {
        &self.nodes
    }

    /// True when the block's root element asks for a new page before it,
    /// via a `data-break-before` attribute or a `break-before` class.
    pub fn wants_break_before(&self) -> bool {
        self.nodes.iter().any(|node| match node {
            DomNode::Element(e) => e.has_attr("data-break-before") || e.has_class("break-before"),
            DomNode::Text(_) => false,
        })
    }

    /// All image sources referenced anywhere in the block, in document order.
    pub fn image_sources(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_image_sources(&self.nodes, &mut out);
        out
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.html == other.html
    }
}

fn collect_image_sources(nodes: &[DomNode], out: &mut Vec<String>) {
    for node in nodes {
        if let DomNode::Element(e) = node {
            if e.tag == Tag::Img {
                if let Some(src) = e.attr("src") {
                    out.push(src.to_string());
                }
            }
            collect_image_sources(&e.children, out);
        }
    }
}

/// Split a document into blocks: one block per top-level element of its
/// `<body>` (or of the whole input when there is no body). Stray text
/// between elements is dropped.
pub fn split_blocks(html: &str) -> Vec<Block> {
    let dom = parse_html(html);
    body_children(&dom)
        .into_iter()
        .filter(|node| matches!(node, DomNode::Element(_)))
        .map(|node| Block::from_nodes(vec![node]))
        .collect()
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a markup string into a forest of nodes.
///
/// This is a forgiving recursive-descent parser for the controlled subset:
/// unclosed elements are closed at the end of their parent, unknown closing
/// tags are skipped, comments and doctypes are ignored.
pub fn parse_html(html: &str) -> Vec<DomNode> {
    let mut cursor = Cursor { src: html, pos: 0 };
    cursor.nodes()
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, s: &str) -> bool {
        if self.rest().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn skip_until(&mut self, end: &str) {
        match self.rest().find(end) {
            Some(offset) => self.pos += offset + end.len(),
            None => self.pos = self.src.len(),
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn nodes(&mut self) -> Vec<DomNode> {
        let mut out = Vec::new();
        while !self.at_end() && !self.rest().starts_with("</") {
            if self.eat("<!--") {
                self.skip_until("-->");
            } else if self.rest().starts_with("<!") || self.rest().starts_with("<?") {
                self.skip_until(">");
            } else if self.rest().starts_with('<') {
                out.push(DomNode::Element(self.element()));
            } else {
                let text = self.text();
                // Whitespace-only runs between tags carry no content.
                if !text.trim().is_empty() {
                    out.push(DomNode::Text(text));
                }
            }
        }
        out
    }

    fn text(&mut self) -> String {
        let start = self.pos;
        match self.rest().find('<') {
            Some(offset) => self.pos += offset,
            None => self.pos = self.src.len(),
        }
        decode_entities(&self.src[start..self.pos])
    }

    fn name(&mut self) -> &'a str {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == ':')
        {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn element(&mut self) -> ElementNode {
        self.bump(); // '<'
        let mut elem = ElementNode::new(Tag::parse(self.name()));

        loop {
            self.skip_ws();
            if self.at_end() || self.rest().starts_with('>') || self.rest().starts_with("/>") {
                break;
            }
            let key = self.name().to_ascii_lowercase();
            if key.is_empty() {
                // Garbage inside a tag; skip one char so we always progress.
                self.bump();
                continue;
            }
            self.skip_ws();
            let value = if self.eat("=") {
                self.skip_ws();
                self.attr_value()
            } else {
                String::new()
            };
            elem.attributes.insert(key, value);
        }

        if self.eat("/>") || (self.eat(">") && elem.tag.is_void()) || elem.tag.is_void() {
            return elem;
        }

        elem.children = self.nodes();

        if self.eat("</") {
            self.name();
            self.skip_until(">");
        }
        elem
    }

    fn attr_value(&mut self) -> String {
        for quote in ['"', '\''] {
            if self.peek() == Some(quote) {
                self.bump();
                let start = self.pos;
                match self.rest().find(quote) {
                    Some(offset) => {
                        self.pos += offset;
                        let raw = &self.src[start..self.pos];
                        self.bump();
                        return decode_entities(raw);
                    }
                    None => {
                        self.pos = self.src.len();
                        return decode_entities(&self.src[start..]);
                    }
                }
            }
        }
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !c.is_whitespace() && c != '>' && c != '/')
        {
            self.bump();
        }
        self.src[start..self.pos].to_string()
    }
}

const ENTITIES: [(&str, &str); 7] = [
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&apos;", "'"),
    ("&nbsp;", "\u{00A0}"),
    ("&amp;", "&"),
];

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    ENTITIES
        .iter()
        .fold(s.to_string(), |acc, (entity, ch)| acc.replace(entity, ch))
}

/// Escape `s` for use as element text.
pub fn escape_text(s: &str) -> String {
    escape(s, false)
}

fn escape(s: &str, attr: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            '\u{00A0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Serializer
// ---------------------------------------------------------------------------

/// Serialize nodes back to markup.
pub fn to_html(nodes: &[DomNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(&mut out, node);
    }
    out
}

fn write_node(out: &mut String, node: &DomNode) {
    match node {
        DomNode::Text(text) => out.push_str(&escape(text, false)),
        DomNode::Element(e) => {
            let name = e.tag.name();
            out.push('<');
            out.push_str(name);
            for (key, value) in &e.attributes {
                let _ = write!(out, " {}=\"{}\"", key, escape(value, true));
            }
            if e.tag.is_void() {
                out.push_str(" />");
                return;
            }
            out.push('>');
            for child in &e.children {
                write_node(out, child);
            }
            let _ = write!(out, "</{}>", name);
        }
    }
}

/// Children of the first `<body>`, looking through `<html>`; the input
/// itself when there is no body.
pub fn body_children(nodes: &[DomNode]) -> Vec<DomNode> {
    for node in nodes {
        if let DomNode::Element(e) = node {
            match e.tag {
                Tag::Body => return e.children.clone(),
                Tag::Html => {
                    let inner = body_children(&e.children);
                    if !inner.is_empty() {
                        return inner;
                    }
                }
                _ => {}
            }
        }
    }
    nodes.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(node: &DomNode) -> &ElementNode {
        match node {
            DomNode::Element(e) => e,
            DomNode::Text(t) => panic!("expected element, got text {t:?}"),
        }
    }

    #[test]
    fn parses_classes_and_children() {
        let nodes = parse_html(r#"<div class="mb-6 text-sm"><p>Kepada Yth.</p></div>"#);
        assert_eq!(nodes.len(), 1);
        let div = element(&nodes[0]);
        assert_eq!(div.tag, Tag::Div);
        assert_eq!(div.classes().collect::<Vec<_>>(), vec!["mb-6", "text-sm"]);
        assert_eq!(div.children.len(), 1);
    }

    #[test]
    fn void_elements_do_not_swallow_siblings() {
        let nodes = parse_html(r#"<p>a<br>b</p><img src="logo.png"><p>c</p>"#);
        assert_eq!(nodes.len(), 3);
        let p = element(&nodes[0]);
        assert_eq!(p.children.len(), 3);
        assert_eq!(element(&nodes[1]).attr("src"), Some("logo.png"));
    }

    #[test]
    fn table_sections_are_kept() {
        let nodes = parse_html(
            "<table><thead><tr><th>No</th></tr></thead><tbody><tr><td>1</td></tr></tbody></table>",
        );
        let table = element(&nodes[0]);
        assert_eq!(table.children.len(), 2);
        assert_eq!(element(&table.children[0]).tag, Tag::Thead);
        assert_eq!(element(&table.children[1]).tag, Tag::Tbody);
    }

    #[test]
    fn entities_decode_and_reencode() {
        let nodes = parse_html("<p>Rp 1.000 &amp; PPh</p>");
        let p = element(&nodes[0]);
        assert_eq!(p.children[0], DomNode::Text("Rp 1.000 & PPh".to_string()));
        assert_eq!(to_html(&nodes), "<p>Rp 1.000 &amp; PPh</p>");
    }

    #[test]
    fn split_blocks_uses_body_elements() {
        let blocks = split_blocks(
            "<html><body><h1>SPP</h1>\n<p data-break-before>Lampiran</p><p class=\"break-before x\">b</p></body></html>",
        );
        assert_eq!(blocks.len(), 3);
        assert!(!blocks[0].wants_break_before());
        assert!(blocks[1].wants_break_before());
        assert!(blocks[2].wants_break_before());
    }

    #[test]
    fn image_sources_are_collected_in_order() {
        let block = Block::from_html(r#"<div><img src="a.png" /><p><img src="b.png"></p></div>"#);
        assert_eq!(block.image_sources(), vec!["a.png", "b.png"]);
    }
}
