//! Integration tests for the bmu-print pipeline.
//!
//! These tests validate:
//! - Blocks are measured on the layout surface and packed in order
//! - Re-measurement after host events and input changes
//! - Table chunks paginate like any other block
//! - Composed pages stay inside the page and export to PDF

use bmu_print::controller::run_until_ready;
use bmu_print::document::{DocumentOptions, PrintableDocument};
use bmu_print::export::{ExportDate, ExportProgress};
use bmu_print::layout_config::DocumentLayout;
use bmu_print::markup::{split_blocks, Block};
use bmu_print::raster::{PageRasterizer, SkiaRasterizer};
use bmu_print::render::{render_vector_pdf, PrintPdfSink};
use bmu_print::surface::{HostEvent, LayoutSurface};
use bmu_print::table::{PaginatedTable, TableOptions};
use bmu_print::templates::{band_image, sample_payroll, PayrollTable};
use bmu_print::{MeasureState, PrintError};
use sha2::{Digest, Sha256};

// =====================================================================
// Helpers
// =====================================================================

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn paragraphs(n: usize) -> Vec<Block> {
    (0..n)
        .map(|i| Block::from_html(&format!("<p>Paragraf nomor {}</p>", i + 1)))
        .collect()
}

fn document(blocks: Vec<Block>, intro: Option<Block>, options: DocumentOptions) -> PrintableDocument {
    let header = band_image(85, 10, [0, 70, 140]).unwrap();
    let footer = band_image(85, 10, [220, 220, 220]).unwrap();
    PrintableDocument::new(blocks, &header, &footer, intro, options).unwrap()
}

fn paginated(blocks: Vec<Block>, options: DocumentOptions) -> (PrintableDocument, LayoutSurface) {
    let mut surface = options.surface();
    let mut doc = document(blocks, None, options);
    doc.paginate(&mut surface, 50).unwrap();
    (doc, surface)
}

fn flatten(doc: &PrintableDocument) -> Vec<Block> {
    doc.pages().iter().flat_map(|p| p.nodes.iter().cloned()).collect()
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

// =====================================================================
// Measurement and packing
// =====================================================================

#[test]
fn short_document_fits_one_page() {
    init_logger();
    let (doc, _) = paginated(paragraphs(3), DocumentOptions::default());
    assert!(doc.ready());
    assert_eq!(doc.pages().len(), 1);
    // 3 × 21px lines + 2 × 16px gaps
    assert!((doc.pages()[0].used_px - 95.0).abs() < 0.01);
    assert!(doc.pages()[0].is_short);
    assert!(doc.export_enabled());
    assert_eq!(doc.export_label(), "Unduh Surat");
}

#[test]
fn many_blocks_spill_onto_later_pages_in_order() {
    init_logger();
    let blocks = paragraphs(80);
    let options = DocumentOptions::default();
    let body = options.body_px();
    let (doc, _) = paginated(blocks.clone(), options);
    assert!(doc.pages().len() >= 3);
    assert_eq!(flatten(&doc), blocks);
    for page in doc.pages() {
        assert!(page.used_px <= body, "page uses {} of {}", page.used_px, body);
    }
    // (864 + 16) / 37 → 23 paragraphs on a full page
    assert_eq!(doc.pages()[0].nodes.len(), 23);
}

#[test]
fn intro_reserve_shrinks_the_first_page() {
    init_logger();
    let intro = Block::from_html(r#"<div class="p-6"><h1>SURAT PERINTAH PEMBAYARAN</h1></div>"#);
    let options = DocumentOptions {
        include_intro_reserve: true,
        ..DocumentOptions::default()
    };
    let mut surface = options.surface();
    let mut with_intro = document(paragraphs(80), Some(intro), options);
    with_intro.paginate(&mut surface, 50).unwrap();

    let (without_intro, _) = paginated(paragraphs(80), DocumentOptions::default());
    assert!(with_intro.pages()[0].nodes.len() < without_intro.pages()[0].nodes.len());
    assert_eq!(with_intro.pages()[1].nodes.len(), without_intro.pages()[1].nodes.len());
}

#[test]
fn reserved_intro_is_not_painted_on_the_first_page() {
    init_logger();
    let intro = Block::from_html(r#"<div class="p-6"><h1>SURAT PERINTAH PEMBAYARAN</h1></div>"#);
    let options = DocumentOptions {
        include_intro_reserve: true,
        ..DocumentOptions::default()
    };
    let body = options.body_px();
    let mut surface = options.surface();
    let mut doc = document(paragraphs(80), Some(intro), options);
    doc.paginate(&mut surface, 50).unwrap();
    let layout = doc.compose_layout(&surface).unwrap();

    let first = &layout.pages[0];
    assert_eq!(first.boxes.len(), doc.pages()[0].nodes.len());
    assert_eq!(first.boxes[0].y, 192.0);
    let last = first.boxes.last().unwrap();
    let painted = last.y + last.height - 192.0;
    assert!((painted - doc.pages()[0].used_px).abs() < 0.01);
    assert!(painted <= body, "page 1 paints {} of {}", painted, body);
}

#[test]
fn break_before_markers_start_new_pages() {
    init_logger();
    let blocks = split_blocks(
        r#"<body>
            <p>Pembukaan</p>
            <p>Isi surat</p>
            <div data-break-before><p>Lampiran I</p></div>
            <div class="break-before"><p>Lampiran II</p></div>
        </body>"#,
    );
    assert_eq!(blocks.len(), 4);
    let (doc, _) = paginated(blocks, DocumentOptions::default());
    let sizes: Vec<usize> = doc.pages().iter().map(|p| p.nodes.len()).collect();
    assert_eq!(sizes, vec![2, 1, 1]);
}

#[test]
fn late_image_height_is_counted() {
    init_logger();
    let band = band_image(40, 300, [10, 20, 30]).unwrap();
    let blocks = vec![
        Block::from_html(&format!(r#"<div><img src="{band}" /></div>"#)),
        Block::from_html("<p>Keterangan gambar</p>"),
    ];
    let (doc, surface) = paginated(blocks, DocumentOptions::default());
    assert!(surface.is_settled());
    assert_eq!(doc.pages().len(), 1);
    assert!((doc.pages()[0].used_px - (300.0 + 16.0 + 21.0)).abs() < 0.01);
}

// =====================================================================
// Re-measurement
// =====================================================================

#[test]
fn resize_after_ready_remeasures_and_keeps_old_pages() {
    init_logger();
    let (mut doc, mut surface) = paginated(paragraphs(30), DocumentOptions::default());
    let before = doc.pages().to_vec();

    doc.controller_mut().handle_event(HostEvent::Resize);
    assert!(!doc.ready());
    assert!(!doc.export_enabled());
    assert_eq!(doc.pages(), before.as_slice(), "old pages stay visible");
    assert!(matches!(doc.compose_layout(&surface), Err(PrintError::NotReady)));

    // Coalesced while the restart is pending.
    doc.controller_mut().handle_event(HostEvent::WindowLoad);
    assert_eq!(doc.controller().restarts(), 1);

    run_until_ready(doc.controller_mut(), &mut surface, 20).unwrap();
    assert!(doc.ready());
    assert_eq!(doc.controller().state(), MeasureState::Stable);
    assert_eq!(doc.pages(), before.as_slice());
}

#[test]
fn new_blocks_wait_for_the_surface_to_be_mounted() {
    init_logger();
    let (mut doc, mut surface) = paginated(paragraphs(3), DocumentOptions::default());
    doc.set_blocks(paragraphs(60), None);
    assert!(!doc.ready());
    assert_eq!(doc.controller().state(), MeasureState::Unmeasured);

    let err = run_until_ready(doc.controller_mut(), &mut surface, 5).unwrap_err();
    assert!(matches!(err, PrintError::Stalled { frames: 5 }));

    doc.paginate(&mut surface, 20).unwrap();
    assert!(doc.pages().len() >= 2);
    assert_eq!(flatten(&doc).len(), 60);
}

// =====================================================================
// Tables
// =====================================================================

#[test]
fn payroll_table_chunks_paginate_with_repeated_headers() {
    init_logger();
    let options = DocumentOptions::default();
    let surface = options.surface();
    let table = PaginatedTable::new(sample_payroll(60), PayrollTable, TableOptions::default(), &surface).unwrap();
    assert!(table.chunks().len() >= 2);
    assert_eq!(table.chunks().iter().map(|c| c.len()).sum::<usize>(), 60);
    assert_eq!(table.chunks()[0].start, 0);
    for pair in table.chunks().windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }

    let blocks = table.blocks();
    assert_eq!(blocks.len(), table.chunks().len());
    for block in &blocks {
        assert!(block.html().contains("<thead"));
        assert!(block.html().contains("Gaji Pokok"));
    }

    let body = options.body_px();
    let (doc, surface) = paginated(blocks, options);
    assert_eq!(doc.pages().len(), table.chunks().len());
    let heights: Vec<f32> = doc
        .pages()
        .iter()
        .flat_map(|p| p.nodes.iter())
        .map(|b| surface.layout(b).unwrap().height)
        .collect();
    assert!(heights.iter().all(|h| *h <= body), "chunk taller than a page: {heights:?}");
}

#[test]
fn empty_table_prints_placeholder() {
    let surface = DocumentOptions::default().surface();
    let table = PaginatedTable::new(Vec::new(), PayrollTable, TableOptions::default(), &surface).unwrap();
    let blocks = table.blocks();
    assert_eq!(blocks.len(), 1);
    assert!(blocks[0].html().contains("Tidak ada data"));
    assert!(blocks[0].html().contains(r#"colspan="999""#));
}

// =====================================================================
// Composition and export
// =====================================================================

#[test]
fn composed_layout_stays_on_the_page() {
    init_logger();
    let options = DocumentOptions::default();
    let (page_w, page_h) = (options.page_width_px(), options.page_height_px());
    let (doc, surface) = paginated(paragraphs(50), options);
    let layout = doc.compose_layout(&surface).unwrap();
    assert_eq!(layout.pages.len(), doc.pages().len());

    for page in &layout.pages {
        let header = page.header.as_ref().unwrap();
        let footer = page.footer.as_ref().unwrap();
        assert_eq!((header.y, header.height), (0.0, 96.0));
        assert_eq!((footer.y, footer.height), (page_h - 96.0, 96.0));
        assert_eq!(page.boxes[0].y, 192.0);
        assert_eq!(page.boxes[0].x, 96.0);
        for lbox in page.boxes.iter().flat_map(|b| b.walk()) {
            assert!(lbox.x >= 0.0 && lbox.x + lbox.width <= page_w + 0.01);
            assert!(lbox.width >= 0.0 && lbox.height >= 0.0);
        }
    }
}

#[test]
fn layout_json_roundtrip_renders_vector_pdf() {
    init_logger();
    let (doc, mut surface) = paginated(paragraphs(30), DocumentOptions::default());
    let layout = doc.compose_layout(&surface).unwrap();
    let json = layout.to_json().unwrap();
    let parsed = DocumentLayout::from_json(&json).unwrap();
    assert_eq!(parsed.pages.len(), layout.pages.len());
    let bytes = render_vector_pdf(&parsed, surface.images_mut()).unwrap();
    assert_valid_pdf(&bytes);
}

#[test]
fn raster_capture_is_deterministic() {
    init_logger();
    let (doc, surface) = paginated(paragraphs(5), DocumentOptions::default());
    let layout = doc.compose_layout(&surface).unwrap();
    let digest = |rasterizer: &mut SkiaRasterizer| {
        let page = rasterizer.rasterize(&layout, &layout.pages[0], 1.0).unwrap();
        assert_eq!((page.width, page.height), (816, 1056));
        Sha256::digest(&page.png)
    };
    let first = digest(&mut SkiaRasterizer::from_surface(&surface));
    let second = digest(&mut SkiaRasterizer::from_surface(&surface));
    assert_eq!(first, second);
}

#[test]
fn export_holds_the_busy_flag_until_finished() {
    init_logger();
    let options = DocumentOptions {
        doc_name: "SPP".to_string(),
        device_pixel_ratio: 1.0,
        ..DocumentOptions::default()
    };
    let (doc, surface) = paginated(paragraphs(30), options);
    let pages = doc.pages().len();
    let date = ExportDate::new(18, 10, 2026);

    let sink = PrintPdfSink::new("SPP", 8.5, 11.0);
    let mut job = doc
        .begin_export(&surface, SkiaRasterizer::from_surface(&surface), sink, date)
        .unwrap();
    assert!(doc.is_busy());
    assert!(!doc.export_enabled());
    assert_eq!(doc.export_label(), "Sedang memproses...");

    let second = doc.begin_export(
        &surface,
        SkiaRasterizer::from_surface(&surface),
        PrintPdfSink::new("SPP", 8.5, 11.0),
        date,
    );
    assert!(matches!(second, Err(PrintError::Busy)));

    let pdf = loop {
        match job.step().unwrap() {
            ExportProgress::Page { total, .. } => assert_eq!(total, pages),
            ExportProgress::Finished(pdf) => break pdf,
        }
    };
    assert_eq!(pdf.file_name, "SPP_18 Oktober 2026.pdf");
    assert_eq!(pdf.page_count, pages);
    assert_valid_pdf(&pdf.bytes);
    assert!(!doc.is_busy());
    assert_eq!(doc.export_label(), "Unduh Surat");
}

#[test]
fn options_load_from_camel_case_json() {
    let options = DocumentOptions::from_json(r#"{"docName":"SPP","gapPx":8,"headerHeightIn":1.25}"#).unwrap();
    assert_eq!(options.doc_name, "SPP");
    assert_eq!(options.gap_px, 8.0);
    assert_eq!(options.header_height_in, 1.25);
    assert_eq!(options.page_width_in, 8.5);
    assert!((options.body_px() - (11.0 - 1.25 - 1.0) * 96.0).abs() < 0.01);

    let err = DocumentOptions::from_json(r#"{"headerHeightIn":6,"footerHeightIn":5}"#).unwrap_err();
    assert!(matches!(err, PrintError::InvalidConfiguration(_)));
}
