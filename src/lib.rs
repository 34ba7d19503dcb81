//! # bmu-print – measured pagination and PDF export
//!
//! Turns a list of content blocks (fragments of a small HTML subset) into
//! fixed-size printable pages with a letterhead band on top and a footer
//! band at the bottom, then exports them as PDF. The stages are:
//!
//! 1. **Measure** – lay blocks out off-screen at the content width and read
//!    their heights ([`surface`], [`layout`], [`style`], [`fonts`])
//! 2. **Settle** – re-measure over several frames until heights stop
//!    changing as images and fonts load ([`controller`], [`frame`])
//! 3. **Pack** – greedily fill pages ([`paginate`]); long tables are split
//!    into chunks first ([`table`])
//! 4. **Compose** – position every block on its page ([`document`],
//!    [`layout_config`])
//! 5. **Export** – capture pages as bitmaps and assemble the PDF
//!    ([`export`], [`raster`], [`render`])
//!
//! [`pipeline`] runs all of it in one call.

pub mod assets;
pub mod controller;
pub mod document;
pub mod error;
pub mod export;
pub mod fonts;
pub mod frame;
pub mod layout;
pub mod layout_config;
pub mod markup;
pub mod paginate;
pub mod pipeline;
pub mod raster;
pub mod render;
pub mod style;
pub mod surface;
pub mod table;
pub mod templates;

/// CSS pixels per inch.
pub const PX_PER_IN: f32 = 96.0;

// Re-exports for convenience
pub use controller::{run_until_ready, MeasureState, PaginationController, PaginationOptions};
pub use document::{DocumentOptions, PrintableDocument};
pub use error::PrintError;
pub use export::{ExportDate, ExportJob, ExportProgress, ExportedPdf};
pub use markup::{split_blocks, Block};
pub use paginate::{paginate_blocks, PageData, PaginationInput};
pub use pipeline::{generate_document, OutputMode};
pub use surface::{HostEvent, LayoutSurface, MeasureSurface};
pub use table::{chunk_rows, Chunk, PaginatedTable, TableSource};
