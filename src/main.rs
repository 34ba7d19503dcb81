//! bmu-print – paginate BMU letter blocks and export them as PDF.
//!
//! Usage:
//!   bmu-print <blocks.html> --header kop.png --footer footer.png [--out-dir out]
//!   bmu-print --demo
//!
//! Each top-level element of the input body is one block. Elements with a
//! `data-break-before` attribute or `break-before` class start a new page.

use std::{fs, path::PathBuf, process};

use clap::Parser;

use bmu_print::document::DocumentOptions;
use bmu_print::export::ExportDate;
use bmu_print::markup::{split_blocks, Block};
use bmu_print::pipeline::{
    demo_content, generate_document, prepare_surface, DocumentContent, FontSpec, OutputMode,
    DEFAULT_MAX_FRAMES,
};
use bmu_print::templates::{band_image, spp_options, SppInfo};
use bmu_print::{PrintError, PX_PER_IN};

#[derive(Parser, Debug)]
#[command(author, version, about = "Measured pagination and PDF export for BMU letters")]
struct Args {
    /// HTML file whose top-level body elements are the blocks
    #[arg(required_unless_present = "demo")]
    input: Option<PathBuf>,

    /// Header band image (path relative to the input file, or a data URI)
    #[arg(long)]
    header: Option<String>,

    /// Footer band image
    #[arg(long)]
    footer: Option<String>,

    /// Directory the PDF is written to
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Document options as JSON (camelCase keys)
    #[arg(long)]
    config: Option<PathBuf>,

    /// File name prefix of the PDF
    #[arg(long)]
    doc_name: Option<String>,

    /// Gap between blocks in px
    #[arg(long)]
    gap: Option<f32>,

    /// Intro block shown above the first page's content
    #[arg(long)]
    intro: Option<PathBuf>,

    /// Web font as FAMILY=path.ttf (FAMILY:bold=..., FAMILY:italic=...)
    #[arg(long = "font")]
    fonts: Vec<String>,

    /// Device pixel ratio used to pick the capture scale
    #[arg(long)]
    dpr: Option<f32>,

    /// Also write the composed page layout as JSON
    #[arg(long)]
    layout_json: Option<PathBuf>,

    /// Paint pages as vector PDF instead of captured images
    #[arg(long)]
    vector: bool,

    /// Use the built-in sample payment order and its 8.5×13 in page setup
    #[arg(long)]
    demo: bool,

    /// Payroll rows in the demo document
    #[arg(long, default_value_t = 60)]
    demo_rows: usize,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), PrintError> {
    let spp = SppInfo::sample();
    let mut options = match &args.config {
        Some(path) => DocumentOptions::from_file(path)?,
        None if args.demo => spp_options(&spp),
        None => DocumentOptions::default(),
    };
    if let Some(name) = &args.doc_name {
        options.doc_name = name.clone();
    }
    if let Some(gap) = args.gap {
        options.gap_px = gap;
    }
    if let Some(dpr) = args.dpr {
        options.device_pixel_ratio = dpr;
    }

    let fonts = args
        .fonts
        .iter()
        .map(|f| FontSpec::parse(f))
        .collect::<Result<Vec<_>, _>>()?;
    let asset_dir = args
        .input
        .as_ref()
        .and_then(|p| p.parent())
        .map(|p| p.to_path_buf());

    let intro = match &args.intro {
        Some(path) => Some(Block::from_html(&fs::read_to_string(path)?)),
        None => None,
    };
    if intro.is_some() {
        options.include_intro_reserve = true;
    }
    options.validate()?;

    let mut surface = prepare_surface(&options, asset_dir.as_deref(), &fonts)?;

    let blocks = if args.demo {
        demo_content(&surface, &spp, args.demo_rows)?
    } else {
        let input = args
            .input
            .as_ref()
            .ok_or_else(|| PrintError::InvalidConfiguration("no input file".to_string()))?;
        split_blocks(&fs::read_to_string(input)?)
    };
    if blocks.is_empty() {
        log::warn!("Input has no blocks; the PDF will have one empty page");
    }

    let band_w = options.page_width_px() as u32;
    let header_src = match args.header {
        Some(src) => src,
        None => band_image(band_w, (options.header_height_in * PX_PER_IN) as u32, [0, 70, 140])?,
    };
    let footer_src = match args.footer {
        Some(src) => src,
        None => band_image(band_w, (options.footer_height_in * PX_PER_IN) as u32, [220, 220, 220])?,
    };

    let mode = if args.vector {
        OutputMode::Vector
    } else {
        OutputMode::Raster
    };
    let content = DocumentContent {
        blocks,
        intro,
        header_src,
        footer_src,
    };
    let out = generate_document(
        &mut surface,
        content,
        options,
        mode,
        ExportDate::today(),
        DEFAULT_MAX_FRAMES,
    )?;

    if let Some(path) = &args.layout_json {
        fs::write(path, out.layout.to_json()?)?;
        eprintln!("Wrote layout '{}'", path.display());
    }

    let path = out.pdf.save_to(&args.out_dir)?;
    let pages = out.pdf.page_count;
    eprintln!(
        "Wrote '{}' ({} bytes, {} page{})",
        path.display(),
        out.pdf.bytes.len(),
        pages,
        if pages == 1 { "" } else { "s" }
    );
    Ok(())
}
