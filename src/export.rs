//! Export – rasterize composed pages one at a time and assemble the PDF.
//!
//! An [`ExportJob`] advances one page per [`ExportJob::step`], so a caller
//! driving frames can keep its loop responsive. Pages are captured in
//! order. The first page's image goes onto the document's initial page;
//! every later page is appended first.

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{Datelike, Local, NaiveDate};

use crate::error::PrintError;
use crate::layout_config::DocumentLayout;
use crate::raster::PageRasterizer;
use crate::render::PdfSink;

/// Raster multiplier: device pixel ratio rounded down, at least 2.
pub fn export_scale(device_pixel_ratio: f32) -> f32 {
    let dpr = if device_pixel_ratio.is_finite() {
        device_pixel_ratio.floor()
    } else {
        2.0
    };
    dpr.max(2.0)
}

/// Holds a shared busy flag for as long as it lives.
#[derive(Debug)]
pub struct BusyGuard {
    flag: Rc<Cell<bool>>,
}

impl BusyGuard {
    /// Set `flag`, failing with [`PrintError::Busy`] if it is already set.
    pub fn acquire(flag: &Rc<Cell<bool>>) -> Result<Self, PrintError> {
        if flag.get() {
            return Err(PrintError::Busy);
        }
        flag.set(true);
        Ok(Self {
            flag: Rc::clone(flag),
        })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

const BULAN: [&str; 12] = [
    "Januari",
    "Februari",
    "Maret",
    "April",
    "Mei",
    "Juni",
    "Juli",
    "Agustus",
    "September",
    "Oktober",
    "November",
    "Desember",
];

/// Calendar date used in the exported file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportDate {
    pub day: u32,
    pub month: u32,
    pub year: i32,
}

impl ExportDate {
    pub fn new(day: u32, month: u32, year: i32) -> Self {
        Self { day, month, year }
    }

    /// Today's date in the local time zone.
    pub fn today() -> Self {
        Local::now().date_naive().into()
    }

    /// Indonesian long form, e.g. `18 Oktober 2026`.
    pub fn long_id(&self) -> String {
        let month = BULAN
            .get(self.month.saturating_sub(1) as usize)
            .copied()
            .unwrap_or("?");
        format!("{} {} {}", self.day, month, self.year)
    }
}

impl From<NaiveDate> for ExportDate {
    fn from(date: NaiveDate) -> Self {
        Self::new(date.day(), date.month(), date.year())
    }
}

/// The finished file.
#[derive(Debug, Clone)]
pub struct ExportedPdf {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

impl ExportedPdf {
    /// Write into `dir` under the export file name.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf, PrintError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        log::info!("Saved {} ({} pages, {} bytes)", path.display(), self.page_count, self.bytes.len());
        Ok(path)
    }
}

#[derive(Debug)]
pub enum ExportProgress {
    /// Page `index` (0-based) of `total` was placed.
    Page { index: usize, total: usize },
    Finished(ExportedPdf),
}

pub struct ExportJob<R, P> {
    layout: DocumentLayout,
    rasterizer: R,
    sink: P,
    scale: f32,
    file_name: String,
    next_page: usize,
    finished: bool,
    guard: Option<BusyGuard>,
}

impl<R: PageRasterizer, P: PdfSink> ExportJob<R, P> {
    pub fn new(
        layout: DocumentLayout,
        rasterizer: R,
        sink: P,
        scale: f32,
        file_name: String,
        guard: BusyGuard,
    ) -> Self {
        Self {
            layout,
            rasterizer,
            sink,
            scale,
            file_name,
            next_page: 0,
            finished: false,
            guard: Some(guard),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The pages being exported.
    pub fn layout(&self) -> &DocumentLayout {
        &self.layout
    }

    pub fn total_pages(&self) -> usize {
        self.layout.pages.len()
    }

    /// Capture the next page. The step that places the last page also
    /// saves the document. Any error ends the job and releases the busy
    /// flag.
    pub fn step(&mut self) -> Result<ExportProgress, PrintError> {
        let result = self.advance();
        if !matches!(result, Ok(ExportProgress::Page { .. })) {
            self.finished = true;
            self.guard.take();
        }
        result
    }

    /// Step until the PDF is saved.
    pub fn run(mut self) -> Result<ExportedPdf, PrintError> {
        loop {
            if let ExportProgress::Finished(pdf) = self.step()? {
                return Ok(pdf);
            }
        }
    }

    fn advance(&mut self) -> Result<ExportProgress, PrintError> {
        if self.finished {
            return Err(PrintError::Pdf("export job already finished".to_string()));
        }
        let total = self.layout.pages.len();
        if let Some(page) = self.layout.pages.get(self.next_page) {
            let index = self.next_page;
            let raster = self.rasterizer.rasterize(&self.layout, page, self.scale)?;
            if index > 0 {
                self.sink.add_page()?;
            }
            self.sink.add_image(&raster)?;
            log::debug!("Captured page {}/{} at {}x{}", index + 1, total, raster.width, raster.height);
            self.next_page += 1;
            if self.next_page < total {
                return Ok(ExportProgress::Page { index, total });
            }
        }

        let bytes = self.sink.save()?;
        log::info!("Exported {} ({} pages)", self.file_name, total);
        Ok(ExportProgress::Finished(ExportedPdf {
            file_name: self.file_name.clone(),
            bytes,
            page_count: total,
        }))
    }
}
