//! Shared test fixtures: canned detectors and synthetic documents.

use std::sync::Arc;

use anyhow::anyhow;

use crate::detector::{Detections, Detector};
use crate::doc::{CoarsePixmap, DocumentSource, OutlineEntry, PageImage, RasterError, Rasterizer};
use crate::layout::AnalysisInput;
use crate::worker::AnalysisWorker;

/// Detector returning a fixed output, recording the tensors it was fed.
pub struct FakeDetector {
    output: Option<Detections>,
    fail: bool,
    /// `(im_shape, scale_factor)` per call.
    pub calls: Vec<([f32; 2], [f32; 2])>,
}

impl FakeDetector {
    #[must_use]
    pub fn new(output: Option<Detections>) -> Self {
        Self {
            output,
            fail: false,
            calls: Vec::new(),
        }
    }

    /// A detector whose every run errors.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            output: None,
            fail: true,
            calls: Vec::new(),
        }
    }
}

impl Detector for FakeDetector {
    fn run(
        &mut self,
        im_shape: [f32; 2],
        _image: &[f32],
        scale_factor: [f32; 2],
    ) -> anyhow::Result<Option<Detections>> {
        self.calls.push((im_shape, scale_factor));
        if self.fail {
            return Err(anyhow!("synthetic inference failure"));
        }
        Ok(self.output.clone())
    }
}

/// Build a detection tensor from per-row values.
#[must_use]
pub fn detections_from_rows(cols: usize, rows: &[Vec<f32>]) -> Detections {
    let mut data = Vec::with_capacity(rows.len() * cols);
    for row in rows {
        assert_eq!(row.len(), cols, "row width must match cols");
        data.extend_from_slice(row);
    }
    Detections {
        rows: rows.len(),
        cols,
        data,
    }
}

/// An all-white coarse pixmap plus page dimensions.
#[must_use]
pub fn white_input(px_w: u32, px_h: u32, page_w: f64, page_h: f64) -> AnalysisInput {
    AnalysisInput {
        rgb: vec![255u8; (px_w * px_h * 3) as usize],
        px_w,
        px_h,
        page_w,
        page_h,
    }
}

/// A worker with no detector: every request answers with the fallback
/// analysis, quickly.
#[must_use]
pub fn spawn_fallback_worker() -> AnalysisWorker {
    AnalysisWorker::spawn(|| Err(anyhow!("no model in tests")))
}

/// In-memory document with white pages.
pub struct FakeRasterizer {
    pages: Vec<(f64, f64)>,
    fail_renders: bool,
}

impl Rasterizer for FakeRasterizer {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_size(&self, page: u32) -> Result<(f64, f64), RasterError> {
        self.pages
            .get(page as usize)
            .copied()
            .ok_or_else(|| RasterError::generic("page out of range"))
    }

    fn render_page(&self, page: u32, dpi: f64) -> Result<PageImage, RasterError> {
        if self.fail_renders {
            return Err(RasterError::generic("synthetic render failure"));
        }
        let (w, h) = self.page_size(page)?;
        let width = ((w * dpi / 72.0).round() as u32).max(1);
        let height = ((h * dpi / 72.0).round() as u32).max(1);
        Ok(PageImage {
            pixels: vec![255u8; (width * height * 4) as usize],
            width,
            height,
            dpi,
        })
    }

    fn render_pixmap(&self, page: u32, target_size: u32) -> Result<CoarsePixmap, RasterError> {
        if self.fail_renders {
            return Err(RasterError::generic("synthetic render failure"));
        }
        let (w, h) = self.page_size(page)?;
        let longest = w.max(h);
        let scale = f64::from(target_size) / longest;
        let width = ((w * scale).round() as u32).max(1);
        let height = ((h * scale).round() as u32).max(1);
        Ok(CoarsePixmap {
            rgb: vec![255u8; (width * height * 3) as usize],
            width,
            height,
        })
    }

    fn outline(&self) -> Vec<OutlineEntry> {
        Vec::new()
    }
}

/// Source of `FakeRasterizer`s, shareable with background tasks.
pub struct FakeSource {
    pages: Vec<(f64, f64)>,
    fail_renders: bool,
}

impl FakeSource {
    #[must_use]
    pub fn new(pages: Vec<(f64, f64)>) -> Self {
        Self {
            pages,
            fail_renders: false,
        }
    }

    /// A source whose rasterizers fail every render call.
    #[must_use]
    pub fn failing(pages: Vec<(f64, f64)>) -> Self {
        Self {
            pages,
            fail_renders: true,
        }
    }

    #[must_use]
    pub fn shared(self) -> Arc<dyn DocumentSource> {
        Arc::new(self)
    }
}

impl DocumentSource for FakeSource {
    fn open(&self) -> Result<Box<dyn Rasterizer>, RasterError> {
        Ok(Box::new(FakeRasterizer {
            pages: self.pages.clone(),
            fail_renders: self.fail_renders,
        }))
    }
}
