//! Table chunking – splits a long table into several print-sized tables.
//!
//! Every row of the table is measured once inside a full table (header
//! included), then rows are grouped into chunks whose header plus rows fit
//! `max_chunk_px`. Each chunk becomes its own [`Block`]: a complete
//! `<table>` with the header repeated, so chunks can be handed straight to
//! the page packer.

use serde::Serialize;

use crate::error::PrintError;
use crate::layout::{measure_table, TableMetrics};
use crate::markup::{parse_html, Block, DomNode, ElementNode, Tag};
use crate::surface::LayoutSurface;

pub const DEFAULT_MAX_CHUNK_PX: f32 = 800.0;
const DEFAULT_TABLE_CLASS: &str = "w-full border text-sm";
const PLACEHOLDER_CLASS: &str = "border p-2 text-center italic text-xs";
const PLACEHOLDER_TEXT: &str = "Tidak ada data";

/// Half-open row range `[start, end)` printed as one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub start: usize,
    pub end: usize,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Group rows into chunks of at most `max_chunk_px`, header included.
///
/// A row never gets split; a row taller than the budget opens its own
/// chunk. No rows gives one empty chunk so the caller still prints a table.
pub fn chunk_rows(header_height: f32, row_heights: &[f32], max_chunk_px: f32) -> Vec<Chunk> {
    if row_heights.is_empty() {
        return vec![Chunk { start: 0, end: 0 }];
    }
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut used = header_height;
    for (i, &rh) in row_heights.iter().enumerate() {
        if used + rh <= max_chunk_px || i == start {
            used += rh;
        } else {
            chunks.push(Chunk { start, end: i });
            start = i;
            used = header_height + rh;
        }
    }
    chunks.push(Chunk {
        start,
        end: row_heights.len(),
    });
    chunks
}

/// Caller-supplied rendering of a table's rows.
pub trait TableSource<T> {
    /// Markup placed inside `<thead>`, usually one `<tr>` of `<th>`s.
    fn render_header(&self) -> String;
    /// Markup of one `<tr>` element.
    fn render_row(&self, row: &T, index: usize) -> String;
    /// Stable identity of a row.
    fn row_key(&self, row: &T, index: usize) -> String;
}

/// Anything that can lay out a table and report its header and row heights.
pub trait TableMeasurer {
    fn measure(&self, table: &Block) -> Result<TableMetrics, PrintError>;
}

impl TableMeasurer for LayoutSurface {
    fn measure(&self, table: &Block) -> Result<TableMetrics, PrintError> {
        measure_table(
            table.nodes(),
            self.root_style(),
            self.content_width(),
            self.fonts(),
            self.images(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct TableOptions {
    pub max_chunk_px: f32,
    pub table_class: String,
    pub thead_class: Option<String>,
    pub tbody_class: Option<String>,
    /// Text of the placeholder cell shown for an empty table.
    pub empty_placeholder: Option<String>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            max_chunk_px: DEFAULT_MAX_CHUNK_PX,
            table_class: DEFAULT_TABLE_CLASS.to_string(),
            thead_class: None,
            tbody_class: None,
            empty_placeholder: None,
        }
    }
}

pub struct PaginatedTable<T, S> {
    rows: Vec<T>,
    source: S,
    options: TableOptions,
    chunks: Vec<Chunk>,
}

impl<T, S: TableSource<T>> PaginatedTable<T, S> {
    /// Measure `rows` on `measurer` and chunk them.
    pub fn new(
        rows: Vec<T>,
        source: S,
        options: TableOptions,
        measurer: &dyn TableMeasurer,
    ) -> Result<Self, PrintError> {
        let mut table = Self {
            rows,
            source,
            options,
            chunks: Vec::new(),
        };
        table.refresh(measurer)?;
        Ok(table)
    }

    /// Re-measure and re-chunk, e.g. after fonts or the content width
    /// changed.
    pub fn refresh(&mut self, measurer: &dyn TableMeasurer) -> Result<(), PrintError> {
        if self.rows.is_empty() {
            self.chunks = chunk_rows(0.0, &[], self.options.max_chunk_px);
            return Ok(());
        }
        let metrics = measurer.measure(&self.measurement_table())?;
        if metrics.row_heights.len() != self.rows.len() {
            log::warn!(
                "Measured {} rows but the table has {}",
                metrics.row_heights.len(),
                self.rows.len()
            );
        }
        self.chunks = chunk_rows(
            metrics.header_height,
            &metrics.row_heights,
            self.options.max_chunk_px,
        );
        log::debug!(
            "Chunked {} rows into {} tables (header {:.1}px)",
            self.rows.len(),
            self.chunks.len(),
            metrics.header_height
        );
        Ok(())
    }

    pub fn set_rows(&mut self, rows: Vec<T>, measurer: &dyn TableMeasurer) -> Result<(), PrintError> {
        self.rows = rows;
        self.refresh(measurer)
    }

    pub fn set_max_chunk_px(&mut self, max_chunk_px: f32, measurer: &dyn TableMeasurer) -> Result<(), PrintError> {
        self.options.max_chunk_px = max_chunk_px;
        self.refresh(measurer)
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// One printable table per chunk. An empty table yields a single
    /// table holding the placeholder row.
    pub fn blocks(&self) -> Vec<Block> {
        if self.rows.is_empty() {
            let text = self
                .options
                .empty_placeholder
                .clone()
                .unwrap_or_else(|| PLACEHOLDER_TEXT.to_string());
            let cell = ElementNode::new(Tag::Td)
                .with_attr("colspan", "999")
                .with_attr("class", PLACEHOLDER_CLASS)
                .with_children(vec![DomNode::Text(text)]);
            let row = ElementNode::new(Tag::Tr).with_children(vec![DomNode::Element(cell)]);
            return vec![self.table_block(vec![DomNode::Element(row)])];
        }

        self.chunks
            .iter()
            .map(|chunk| {
                let rows = (chunk.start..chunk.end.min(self.rows.len()))
                    .flat_map(|i| parse_html(&self.source.render_row(&self.rows[i], i)))
                    .collect();
                self.table_block(rows)
            })
            .collect()
    }

    /// The full table with every row rendered for measurement: the row's
    /// cells in a fresh `<tr class="align-top">` carrying its key.
    fn measurement_table(&self) -> Block {
        let rows = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let cells = row_cells(parse_html(&self.source.render_row(row, i)));
                DomNode::Element(
                    ElementNode::new(Tag::Tr)
                        .with_attr("class", "align-top")
                        .with_attr("data-key", self.source.row_key(row, i))
                        .with_children(cells),
                )
            })
            .collect();
        self.table_block(rows)
    }

    fn table_block(&self, body_rows: Vec<DomNode>) -> Block {
        let mut thead = ElementNode::new(Tag::Thead).with_children(parse_html(&self.source.render_header()));
        if let Some(class) = &self.options.thead_class {
            thead = thead.with_attr("class", class.as_str());
        }
        let mut tbody = ElementNode::new(Tag::Tbody).with_children(body_rows);
        if let Some(class) = &self.options.tbody_class {
            tbody = tbody.with_attr("class", class.as_str());
        }
        let table = ElementNode::new(Tag::Table)
            .with_attr("class", self.options.table_class.as_str())
            .with_children(vec![DomNode::Element(thead), DomNode::Element(tbody)]);
        Block::from_nodes(vec![DomNode::Element(table)])
    }
}

/// Children of the first `<tr>` in `nodes`, or `nodes` itself when the
/// row markup is bare cells.
fn row_cells(nodes: Vec<DomNode>) -> Vec<DomNode> {
    let idx = nodes
        .iter()
        .position(|n| matches!(n, DomNode::Element(e) if e.tag == Tag::Tr));
    match idx {
        Some(i) => match nodes.into_iter().nth(i) {
            Some(DomNode::Element(tr)) => tr.children,
            _ => Vec::new(),
        },
        None => nodes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Payroll;

    impl TableSource<(&'static str, u32)> for Payroll {
        fn render_header(&self) -> String {
            "<tr><th>Nama</th><th>Jumlah</th></tr>".to_string()
        }

        fn render_row(&self, row: &(&'static str, u32), _index: usize) -> String {
            format!("<tr><td>{}</td><td>{}</td></tr>", row.0, row.1)
        }

        fn row_key(&self, row: &(&'static str, u32), index: usize) -> String {
            format!("{}-{index}", row.0)
        }
    }

    /// Reports a fixed header height and the same height for every row it
    /// finds in the table.
    struct FixedMeasurer {
        header: f32,
        row: f32,
    }

    impl TableMeasurer for FixedMeasurer {
        fn measure(&self, table: &Block) -> Result<TableMetrics, PrintError> {
            fn count_rows(nodes: &[DomNode], in_body: bool) -> usize {
                nodes
                    .iter()
                    .map(|n| match n {
                        DomNode::Element(e) if e.tag == Tag::Tr && in_body => 1,
                        DomNode::Element(e) => count_rows(&e.children, in_body || e.tag == Tag::Tbody),
                        DomNode::Text(_) => 0,
                    })
                    .sum()
            }
            let rows = count_rows(table.nodes(), false);
            Ok(TableMetrics {
                header_height: self.header,
                row_heights: vec![self.row; rows],
            })
        }
    }

    #[test]
    fn chunks_respect_budget_including_header() {
        // Header 40 + 3×100 = 340 <= 350; the fourth row would overflow.
        let chunks = chunk_rows(40.0, &[100.0; 7], 350.0);
        assert_eq!(
            chunks,
            vec![
                Chunk { start: 0, end: 3 },
                Chunk { start: 3, end: 6 },
                Chunk { start: 6, end: 7 },
            ]
        );
    }

    #[test]
    fn oversized_row_gets_its_own_chunk() {
        let chunks = chunk_rows(20.0, &[50.0, 900.0, 50.0], 800.0);
        assert_eq!(
            chunks,
            vec![
                Chunk { start: 0, end: 1 },
                Chunk { start: 1, end: 2 },
                Chunk { start: 2, end: 3 },
            ]
        );
    }

    #[test]
    fn no_rows_yields_one_empty_chunk() {
        assert_eq!(chunk_rows(30.0, &[], 800.0), vec![Chunk { start: 0, end: 0 }]);
    }

    #[test]
    fn empty_table_renders_placeholder_row() {
        let measurer = FixedMeasurer { header: 30.0, row: 20.0 };
        let table = PaginatedTable::new(Vec::new(), Payroll, TableOptions::default(), &measurer).unwrap();
        assert_eq!(table.chunks(), &[Chunk { start: 0, end: 0 }]);
        let blocks = table.blocks();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].html().contains("Tidak ada data"));
        assert!(blocks[0].html().contains(r#"colspan="999""#));
        assert!(blocks[0].html().contains("<th>Nama</th>"));
    }

    #[test]
    fn measurement_rows_carry_keys_and_alignment() {
        let measurer = FixedMeasurer { header: 30.0, row: 20.0 };
        let table = PaginatedTable::new(vec![("Andi", 100)], Payroll, TableOptions::default(), &measurer).unwrap();
        let html = table.measurement_table().html().to_string();
        assert!(html.contains(r#"class="align-top""#));
        assert!(html.contains(r#"data-key="Andi-0""#));
    }

    #[test]
    fn every_chunk_repeats_the_header() {
        let rows: Vec<(&str, u32)> = (0..10).map(|i| ("Pegawai", i)).collect();
        let measurer = FixedMeasurer { header: 30.0, row: 100.0 };
        let options = TableOptions {
            max_chunk_px: 450.0,
            ..TableOptions::default()
        };
        let table = PaginatedTable::new(rows, Payroll, options, &measurer).unwrap();
        // 30 + 4×100 = 430 fits; a fifth row would not.
        assert_eq!(table.chunks().len(), 3);
        let blocks = table.blocks();
        assert_eq!(blocks.len(), 3);
        for block in &blocks {
            assert!(block.html().contains("<thead><tr><th>Nama</th>"));
        }
        assert!(blocks[2].html().contains("<td>8</td>"));
        assert!(!blocks[2].html().contains("<td>7</td>"));
    }

    #[test]
    fn measures_real_rows_on_a_layout_surface() {
        let surface = LayoutSurface::new(8.5, 1.0);
        let rows: Vec<(&str, u32)> = (0..60).map(|i| ("Karyawan", i)).collect();
        let table = PaginatedTable::new(rows, Payroll, TableOptions::default(), &surface).unwrap();
        let covered: usize = table.chunks().iter().map(Chunk::len).sum();
        assert_eq!(covered, 60);
        assert!(table.chunks().len() > 1);
    }
}
