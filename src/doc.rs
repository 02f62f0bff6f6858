//! Document rasterization seam
//!
//! The core consumes the PDF engine through the `Rasterizer` trait: page
//! geometry, full-page bitmaps at a requested DPI, the coarse pixmap the
//! layout analyzer feeds on, and the bookmark tree. `DocumentSource` lets
//! background tier renders open their own engine handle, because the engine
//! is not safe for concurrent calls on one document.

use std::path::{Path, PathBuf};

use mupdf::{Colorspace, Document, Matrix};

use crate::layout::INPUT_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[error("{detail}")]
    Generic { detail: String },
}

impl RasterError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// A fully rendered page bitmap, tightly packed RGBA.
#[derive(Clone)]
pub struct PageImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// DPI this bitmap was rasterized at.
    pub dpi: f64,
}

impl std::fmt::Debug for PageImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("dpi", &self.dpi)
            .finish_non_exhaustive()
    }
}

/// Reduced RGB rendering of a page, scaled to fit the analyzer's input box
/// with aspect preserved.
#[derive(Clone, Debug)]
pub struct CoarsePixmap {
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// One node of the document bookmark tree.
#[derive(Clone, Debug)]
pub struct OutlineEntry {
    pub title: String,
    pub page: Option<u32>,
    pub children: Vec<OutlineEntry>,
}

/// Rendering operations the core needs from the PDF engine.
pub trait Rasterizer: Send {
    fn page_count(&self) -> u32;

    /// Page size in points.
    fn page_size(&self, page: u32) -> Result<(f64, f64), RasterError>;

    /// Render a full page at the given DPI.
    fn render_page(&self, page: u32, dpi: f64) -> Result<PageImage, RasterError>;

    /// Render the coarse pixmap: the page scaled so its longer edge is
    /// `target_size`, row-major RGB.
    fn render_pixmap(&self, page: u32, target_size: u32) -> Result<CoarsePixmap, RasterError>;

    /// The document's bookmark tree, empty when it has none.
    fn outline(&self) -> Vec<OutlineEntry>;
}

/// Opens fresh engine handles for background tasks.
pub trait DocumentSource: Send + Sync {
    fn open(&self) -> Result<Box<dyn Rasterizer>, RasterError>;
}

/// MuPDF-backed rasterizer.
pub struct MupdfRasterizer {
    doc: Document,
    page_count: u32,
}

impl MupdfRasterizer {
    pub fn open(path: &Path) -> Result<Self, RasterError> {
        let doc = Document::open(path.to_string_lossy().as_ref())?;
        let page_count = doc.page_count()?.max(0) as u32;
        Ok(Self { doc, page_count })
    }
}

impl Rasterizer for MupdfRasterizer {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn page_size(&self, page: u32) -> Result<(f64, f64), RasterError> {
        let page = self.doc.load_page(page as i32)?;
        let bounds = page.bounds()?;
        Ok((
            f64::from(bounds.x1 - bounds.x0),
            f64::from(bounds.y1 - bounds.y0),
        ))
    }

    fn render_page(&self, page: u32, dpi: f64) -> Result<PageImage, RasterError> {
        let page = self.doc.load_page(page as i32)?;
        let scale = (dpi / 72.0) as f32;

        let pixmap = page.to_pixmap(
            &Matrix::new_scale(scale, scale),
            &Colorspace::device_rgb(),
            true,
            false,
        )?;

        let pixels = packed_samples(&pixmap, 4)?;
        Ok(PageImage {
            pixels,
            width: pixmap.width(),
            height: pixmap.height(),
            dpi,
        })
    }

    fn render_pixmap(&self, page: u32, target_size: u32) -> Result<CoarsePixmap, RasterError> {
        let page = self.doc.load_page(page as i32)?;
        let bounds = page.bounds()?;
        let w_pts = f64::from(bounds.x1 - bounds.x0);
        let h_pts = f64::from(bounds.y1 - bounds.y0);
        let longest = w_pts.max(h_pts);
        if longest <= 0.0 {
            return Err(RasterError::generic("Page has no area"));
        }
        let scale = (f64::from(target_size) / longest) as f32;

        let pixmap = page.to_pixmap(
            &Matrix::new_scale(scale, scale),
            &Colorspace::device_rgb(),
            false,
            false,
        )?;

        let rgb = packed_samples(&pixmap, 3)?;
        Ok(CoarsePixmap {
            rgb,
            width: pixmap.width(),
            height: pixmap.height(),
        })
    }

    fn outline(&self) -> Vec<OutlineEntry> {
        match self.doc.outlines() {
            Ok(outlines) => convert_outlines(outlines),
            Err(e) => {
                log::warn!("Failed to load outlines: {e}");
                Vec::new()
            }
        }
    }
}

/// Copy pixmap samples to a tightly packed buffer with `want` channels,
/// honoring the row stride and trimming or padding the channel count.
fn packed_samples(pixmap: &mupdf::Pixmap, want: usize) -> Result<Vec<u8>, RasterError> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(RasterError::generic(format!(
            "Unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    if samples.len() < stride.saturating_mul(height.saturating_sub(1)) + row_bytes || row_bytes > stride
    {
        return Err(RasterError::generic("Pixmap buffer size mismatch"));
    }

    let mut out = Vec::with_capacity(width * height * want);
    for y in 0..height {
        let row = &samples[y * stride..y * stride + row_bytes];
        if n == want {
            out.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                out.extend_from_slice(&px[..want.min(n)]);
                for _ in n..want {
                    out.push(0xFF);
                }
            }
        }
    }
    Ok(out)
}

fn convert_outlines(outlines: Vec<mupdf::Outline>) -> Vec<OutlineEntry> {
    outlines
        .into_iter()
        .map(|o| OutlineEntry {
            title: o.title,
            page: o.dest.map(|d| d.loc.page_number),
            children: convert_outlines(o.down),
        })
        .collect()
}

/// Re-opens the document by path; used by transient tier-render tasks.
pub struct MupdfSource {
    path: PathBuf,
}

impl MupdfSource {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl DocumentSource for MupdfSource {
    fn open(&self) -> Result<Box<dyn Rasterizer>, RasterError> {
        Ok(Box::new(MupdfRasterizer::open(&self.path)?))
    }
}
