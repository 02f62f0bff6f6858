//! Data model produced by page layout analysis

use crate::geometry::BBox;

/// One horizontal text line within a block, in page-point coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineInfo {
    /// Vertical center of the line.
    pub y: f32,
    /// Line height.
    pub height: f32,
}

/// A detected layout region with reading order and per-line geometry.
#[derive(Clone, Debug)]
pub struct LayoutBlock {
    /// Bounding box in page points.
    pub bbox: BBox,
    /// Index into the canonical class table.
    pub class_id: usize,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
    /// Dense reading-order rank, `0..N` within a page.
    pub order: u32,
    /// Text lines in ascending y. Never empty after analysis.
    pub lines: Vec<LineInfo>,
}

/// Analysis result for one page, blocks sorted by reading order.
#[derive(Clone, Debug)]
pub struct PageAnalysis {
    pub blocks: Vec<LayoutBlock>,
    pub page_width: f64,
    pub page_height: f64,
}

impl PageAnalysis {
    /// An analysis with no blocks, still valid for pages where detection
    /// produced nothing usable.
    #[must_use]
    pub fn empty(page_width: f64, page_height: f64) -> Self {
        Self {
            blocks: Vec::new(),
            page_width,
            page_height,
        }
    }
}
