//! Page layout analysis pipeline
//!
//! Turns the coarse pixmap of a page into a `PageAnalysis`: preprocess the
//! RGB buffer into the detector's input tensors, run the model, filter and
//! deduplicate detections, normalize reading order, then project text lines
//! inside each block. Coordinates flow pixel-space in, page-points out.

use anyhow::Result;

use super::lines::detect_lines;
use super::types::{LayoutBlock, LineInfo, PageAnalysis};
use crate::classes::{CLASS_NAMES, TEXT_CLASS_ID};
use crate::detector::{Detections, Detector};
use crate::geometry::BBox;

/// Model input edge length; the coarse pixmap fits inside this square.
pub const INPUT_SIZE: u32 = 800;

const CONFIDENCE_THRESHOLD: f32 = 0.4;
const NMS_IOU_THRESHOLD: f32 = 0.5;
/// Detections narrower or shorter than this many pixels are spurious.
const MIN_DETECTION_PX: f32 = 5.0;

/// Everything the pipeline needs for one page, prepared by the caller so the
/// worker thread never touches the rasterizer.
#[derive(Clone, Debug)]
pub struct AnalysisInput {
    /// Row-major RGB bytes of the coarse pixmap.
    pub rgb: Vec<u8>,
    pub px_w: u32,
    pub px_h: u32,
    /// Page size in points.
    pub page_w: f64,
    pub page_h: f64,
}

/// A detection that survived filtering, still carrying its pixel-space box
/// for line projection and the detector's reading-order prediction.
struct Candidate {
    block: LayoutBlock,
    px: BBox,
    order_hint: f32,
}

/// Run the full analysis pipeline for one page.
pub fn analyze(detector: &mut dyn Detector, input: &AnalysisInput) -> Result<PageAnalysis> {
    let (tensor, im_shape, scale_factor) = preprocess(input);

    let Some(detections) = detector.run(im_shape, &tensor, scale_factor)? else {
        return Ok(PageAnalysis::empty(input.page_w, input.page_h));
    };

    let mut candidates = parse_detections(&detections, input);
    suppress_overlaps(&mut candidates);
    normalize_reading_order(&mut candidates);

    let img_w = input.px_w as usize;
    let img_h = input.px_h as usize;
    let scale_y = (input.page_h / f64::from(input.px_h)) as f32;

    let blocks = candidates
        .into_iter()
        .map(|c| {
            let mut block = c.block;
            block.lines = block_lines(&c.px, &block, &input.rgb, img_w, img_h, scale_y);
            block
        })
        .collect();

    Ok(PageAnalysis {
        blocks,
        page_width: input.page_w,
        page_height: input.page_h,
    })
}

/// Synthetic single-block analysis for pages the detector cannot serve:
/// one full-page text block with one line at the vertical midline.
#[must_use]
pub fn fallback_analysis(page_w: f64, page_h: f64) -> PageAnalysis {
    let w = page_w as f32;
    let h = page_h as f32;
    PageAnalysis {
        blocks: vec![LayoutBlock {
            bbox: BBox::new(0.0, 0.0, w, h),
            class_id: TEXT_CLASS_ID,
            confidence: 1.0,
            order: 0,
            lines: vec![LineInfo { y: h / 2.0, height: h }],
        }],
        page_width: page_w,
        page_height: page_h,
    }
}

/// Nearest-neighbor stretch to `INPUT_SIZE x INPUT_SIZE`, scaled to `[0, 1]`,
/// HWC to CHW. Also yields the model's `im_shape` and `scale_factor` inputs.
fn preprocess(input: &AnalysisInput) -> (Vec<f32>, [f32; 2], [f32; 2]) {
    let orig_w = (input.px_w as usize).max(1);
    let orig_h = (input.px_h as usize).max(1);
    let target = INPUT_SIZE as usize;

    let scale_h = target as f32 / orig_h as f32;
    let scale_w = target as f32 / orig_w as f32;

    let pixel_count = target * target;
    let mut chw = vec![0.0f32; 3 * pixel_count];
    for y in 0..target {
        let src_y = ((y as f32 / scale_h) as usize).min(orig_h - 1);
        for x in 0..target {
            let src_x = ((x as f32 / scale_w) as usize).min(orig_w - 1);
            let src = (src_y * orig_w + src_x) * 3;
            let dst = y * target + x;
            for c in 0..3 {
                let v = input.rgb.get(src + c).copied().unwrap_or(255);
                chw[c * pixel_count + dst] = f32::from(v) / 255.0;
            }
        }
    }

    let im_shape = [target as f32, target as f32];
    let scale_factor = [scale_h, scale_w];
    (chw, im_shape, scale_factor)
}

/// Filter raw rows and map surviving boxes to page points. Detector
/// coordinates arrive in the coarse pixmap's pixel space.
fn parse_detections(detections: &Detections, input: &AnalysisInput) -> Vec<Candidate> {
    let px_w = input.px_w as f32;
    let px_h = input.px_h as f32;
    let scale_x = (input.page_w / f64::from(input.px_w)) as f32;
    let scale_y = (input.page_h / f64::from(input.px_h)) as f32;

    let mut out = Vec::new();
    for i in 0..detections.rows {
        let row = detections.row(i);
        let class_id = row[0] as usize;
        let confidence = row[1];

        if confidence < CONFIDENCE_THRESHOLD || class_id >= CLASS_NAMES.len() {
            continue;
        }

        let x0 = row[2].clamp(0.0, px_w);
        let y0 = row[3].clamp(0.0, px_h);
        let x1 = row[4].clamp(0.0, px_w);
        let y1 = row[5].clamp(0.0, px_h);
        let w = x1 - x0;
        let h = y1 - y0;
        if w < MIN_DETECTION_PX || h < MIN_DETECTION_PX {
            continue;
        }

        // Column 7 is the model's native reading-order prediction; a
        // 6-column output leaves every hint at zero and the y tiebreak
        // takes over.
        let order_hint = if detections.cols > 6 { row[6] } else { 0.0 };

        out.push(Candidate {
            block: LayoutBlock {
                bbox: BBox::new(x0 * scale_x, y0 * scale_y, w * scale_x, h * scale_y),
                class_id,
                confidence,
                order: 0,
                lines: Vec::new(),
            },
            px: BBox::new(x0, y0, w, h),
            order_hint,
        });
    }
    out
}

/// Class-agnostic greedy NMS: keep by descending confidence, drop later
/// boxes overlapping a kept one past the IoU threshold. The sort is stable,
/// so equal confidence resolves to input order.
fn suppress_overlaps(candidates: &mut Vec<Candidate>) {
    candidates.sort_by(|a, b| {
        b.block
            .confidence
            .partial_cmp(&a.block.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = vec![true; candidates.len()];
    for i in 0..candidates.len() {
        if !keep[i] {
            continue;
        }
        for j in (i + 1)..candidates.len() {
            if keep[j] && candidates[i].block.bbox.iou(&candidates[j].block.bbox) > NMS_IOU_THRESHOLD
            {
                keep[j] = false;
            }
        }
    }

    let mut idx = 0;
    candidates.retain(|_| {
        let k = keep[idx];
        idx += 1;
        k
    });
}

/// Sort by the detector's order prediction, ties by ascending y, then assign
/// dense ranks `0..N`.
fn normalize_reading_order(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        a.order_hint
            .partial_cmp(&b.order_hint)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                a.block
                    .bbox
                    .y
                    .partial_cmp(&b.block.bbox.y)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });
    for (rank, c) in candidates.iter_mut().enumerate() {
        c.block.order = rank as u32;
    }
}

/// Line detection for one block; a region with no usable run gets the
/// synthetic midline so every block carries at least one line.
fn block_lines(
    px: &BBox,
    block: &LayoutBlock,
    rgb: &[u8],
    img_w: usize,
    img_h: usize,
    scale_y: f32,
) -> Vec<LineInfo> {
    let px_x = (px.x.round() as usize).min(img_w.saturating_sub(1));
    let px_y = (px.y.round() as usize).min(img_h.saturating_sub(1));
    let px_w = (px.w.round() as usize).min(img_w - px_x);
    let px_h = (px.h.round() as usize).min(img_h - px_y);

    let mut lines = detect_lines(rgb, img_w, px_x, px_y, px_w, px_h, block.bbox.y, scale_y);
    if lines.is_empty() {
        lines.push(LineInfo {
            y: block.bbox.y + block.bbox.h / 2.0,
            height: block.bbox.h,
        });
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{detections_from_rows, white_input, FakeDetector};

    #[test]
    fn empty_detector_output_yields_empty_analysis() {
        let mut det = FakeDetector::new(Some(detections_from_rows(7, &[])));
        let input = white_input(400, 520, 600.0, 780.0);
        let analysis = analyze(&mut det, &input).unwrap();
        assert!(analysis.blocks.is_empty());
        assert_eq!(analysis.page_width, 600.0);
        assert_eq!(analysis.page_height, 780.0);
    }

    #[test]
    fn missing_output_tensor_yields_empty_analysis() {
        let mut det = FakeDetector::new(None);
        let input = white_input(400, 520, 600.0, 780.0);
        let analysis = analyze(&mut det, &input).unwrap();
        assert!(analysis.blocks.is_empty());
    }

    #[test]
    fn detector_receives_model_input_tensors() {
        let mut det = FakeDetector::new(Some(detections_from_rows(7, &[])));
        let input = white_input(400, 520, 600.0, 780.0);
        analyze(&mut det, &input).unwrap();

        let (im_shape, scale_factor) = det.calls[0];
        assert_eq!(im_shape, [800.0, 800.0]);
        assert!((scale_factor[0] - 800.0 / 520.0).abs() < 1e-6);
        assert!((scale_factor[1] - 800.0 / 400.0).abs() < 1e-6);
    }

    #[test]
    fn filters_low_confidence_and_tiny_boxes() {
        let rows = vec![
            vec![22.0, 0.9, 10.0, 10.0, 200.0, 100.0, 0.0],
            vec![22.0, 0.3, 10.0, 150.0, 200.0, 250.0, 1.0], // below 0.4
            vec![22.0, 0.9, 10.0, 300.0, 14.0, 400.0, 2.0],  // 4 px wide
            vec![99.0, 0.9, 10.0, 300.0, 200.0, 400.0, 3.0], // unknown class
        ];
        let mut det = FakeDetector::new(Some(detections_from_rows(7, &rows)));
        let input = white_input(400, 520, 400.0, 520.0);
        let analysis = analyze(&mut det, &input).unwrap();
        assert_eq!(analysis.blocks.len(), 1);
    }

    #[test]
    fn coordinates_are_clamped_then_scaled_to_points() {
        // Box sticks out past the pixmap; page is 2x the pixel size.
        let rows = vec![vec![22.0, 0.9, -20.0, -10.0, 100.0, 60.0, 0.0]];
        let mut det = FakeDetector::new(Some(detections_from_rows(7, &rows)));
        let input = white_input(400, 520, 800.0, 1040.0);
        let analysis = analyze(&mut det, &input).unwrap();
        let b = &analysis.blocks[0].bbox;
        assert_eq!((b.x, b.y), (0.0, 0.0));
        assert!((b.w - 200.0).abs() < 1e-4);
        assert!((b.h - 120.0).abs() < 1e-4);
    }

    #[test]
    fn nms_drops_lower_confidence_overlap() {
        // IoU of these two is ~0.68.
        let rows = vec![
            vec![22.0, 0.9, 0.0, 0.0, 100.0, 100.0, 0.0],
            vec![22.0, 0.85, 10.0, 10.0, 110.0, 110.0, 1.0],
        ];
        let mut det = FakeDetector::new(Some(detections_from_rows(7, &rows)));
        let input = white_input(400, 520, 400.0, 520.0);
        let analysis = analyze(&mut det, &input).unwrap();
        assert_eq!(analysis.blocks.len(), 1);
        assert!((analysis.blocks[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn nms_tie_break_keeps_input_order() {
        let rows = vec![
            vec![22.0, 0.8, 10.0, 10.0, 110.0, 110.0, 0.0],
            vec![17.0, 0.8, 12.0, 12.0, 112.0, 112.0, 1.0],
        ];
        let mut det = FakeDetector::new(Some(detections_from_rows(7, &rows)));
        let input = white_input(400, 520, 400.0, 520.0);
        let analysis = analyze(&mut det, &input).unwrap();
        assert_eq!(analysis.blocks.len(), 1);
        assert_eq!(analysis.blocks[0].class_id, 22);
    }

    #[test]
    fn native_order_column_wins_over_array_order() {
        // Array order A, B, C with order predictions 2, 0, 1 → B, C, A.
        let rows = vec![
            vec![22.0, 0.9, 10.0, 10.0, 110.0, 60.0, 2.0],  // A
            vec![22.0, 0.9, 10.0, 100.0, 110.0, 150.0, 0.0], // B
            vec![22.0, 0.9, 10.0, 200.0, 110.0, 250.0, 1.0], // C
        ];
        let mut det = FakeDetector::new(Some(detections_from_rows(7, &rows)));
        let input = white_input(400, 520, 400.0, 520.0);
        let analysis = analyze(&mut det, &input).unwrap();

        let ys: Vec<f32> = analysis.blocks.iter().map(|b| b.bbox.y).collect();
        assert_eq!(ys, vec![100.0, 200.0, 10.0]);
        let orders: Vec<u32> = analysis.blocks.iter().map(|b| b.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn six_column_output_falls_back_to_y_sort() {
        let rows = vec![
            vec![22.0, 0.9, 10.0, 200.0, 110.0, 250.0],
            vec![22.0, 0.9, 10.0, 10.0, 110.0, 60.0],
        ];
        let mut det = FakeDetector::new(Some(detections_from_rows(6, &rows)));
        let input = white_input(400, 520, 400.0, 520.0);
        let analysis = analyze(&mut det, &input).unwrap();
        let ys: Vec<f32> = analysis.blocks.iter().map(|b| b.bbox.y).collect();
        assert_eq!(ys, vec![10.0, 200.0]);
    }

    #[test]
    fn analysis_invariants_hold() {
        let rows = vec![
            vec![22.0, 0.95, 10.0, 10.0, 390.0, 110.0, 1.0],
            vec![17.0, 0.8, 10.0, 150.0, 390.0, 200.0, 0.0],
            vec![22.0, 0.7, 12.0, 12.0, 388.0, 108.0, 2.0], // NMS victim
        ];
        let mut det = FakeDetector::new(Some(detections_from_rows(7, &rows)));
        let input = white_input(400, 520, 400.0, 520.0);
        let analysis = analyze(&mut det, &input).unwrap();

        let mut orders: Vec<u32> = analysis.blocks.iter().map(|b| b.order).collect();
        orders.sort_unstable();
        assert_eq!(orders, (0..analysis.blocks.len() as u32).collect::<Vec<_>>());

        for block in &analysis.blocks {
            assert!(!block.lines.is_empty());
            assert!(block.bbox.x >= 0.0 && block.bbox.y >= 0.0);
            assert!(f64::from(block.bbox.right()) <= analysis.page_width + 1e-3);
            assert!(f64::from(block.bbox.bottom()) <= analysis.page_height + 1e-3);
        }
        for (i, a) in analysis.blocks.iter().enumerate() {
            for b in analysis.blocks.iter().skip(i + 1) {
                assert!(a.bbox.iou(&b.bbox) <= NMS_IOU_THRESHOLD);
            }
        }
    }

    #[test]
    fn fallback_is_one_text_block_with_midline() {
        let analysis = fallback_analysis(612.0, 792.0);
        assert_eq!(analysis.blocks.len(), 1);
        let block = &analysis.blocks[0];
        assert_eq!(block.class_id, TEXT_CLASS_ID);
        assert_eq!(block.order, 0);
        assert_eq!(block.lines.len(), 1);
        assert!((block.lines[0].y - 396.0).abs() < 1e-4);
        assert_eq!(block.bbox.w, 612.0);
        assert_eq!(block.bbox.h, 792.0);
    }

    #[test]
    fn pipeline_is_deterministic() {
        let rows = vec![
            vec![22.0, 0.9, 10.0, 10.0, 200.0, 100.0, 1.0],
            vec![17.0, 0.9, 10.0, 150.0, 200.0, 250.0, 0.0],
        ];
        let input = white_input(400, 520, 400.0, 520.0);
        let mut det_a = FakeDetector::new(Some(detections_from_rows(7, &rows)));
        let mut det_b = FakeDetector::new(Some(detections_from_rows(7, &rows)));
        let a = analyze(&mut det_a, &input).unwrap();
        let b = analyze(&mut det_b, &input).unwrap();
        assert_eq!(a.blocks.len(), b.blocks.len());
        for (x, y) in a.blocks.iter().zip(&b.blocks) {
            assert_eq!(x.bbox, y.bbox);
            assert_eq!(x.order, y.order);
            assert_eq!(x.lines, y.lines);
        }
    }
}
