//! Ink-density line detection
//!
//! Projects a block's pixel region of the coarse pixmap onto the vertical
//! axis: each row's "ink density" is the fraction of dark pixels, and maximal
//! runs of dense rows become text lines.

use super::types::LineInfo;

/// Luminance below this counts as ink.
const INK_LUMA_MAX: f32 = 160.0;
/// Rows at or below this density are treated as blank.
const DENSITY_FLOOR: f32 = 0.005;
/// Threshold as a fraction of the mean density of non-blank rows.
const DENSITY_RATIO: f32 = 0.15;
/// Minimum run length, in pixel rows, to count as a line.
const MIN_RUN_ROWS: usize = 3;

/// Detect text lines in the block region `(px_x, px_y, px_w, px_h)` of an
/// `img_w x img_h` RGB buffer. `block_y` is the block's top edge in page
/// points and `scale_y` converts pixel rows to points. Returns lines in
/// ascending y; empty when the region has no usable run.
pub(crate) fn detect_lines(
    rgb: &[u8],
    img_w: usize,
    px_x: usize,
    px_y: usize,
    px_w: usize,
    px_h: usize,
    block_y: f32,
    scale_y: f32,
) -> Vec<LineInfo> {
    if px_w == 0 || px_h == 0 {
        return Vec::new();
    }

    // Per-row fraction of pixels darker than the ink threshold.
    let mut profile = vec![0.0f32; px_h];
    for (row, slot) in profile.iter_mut().enumerate() {
        let mut dark = 0u32;
        for col in 0..px_w {
            let idx = ((px_y + row) * img_w + (px_x + col)) * 3;
            if idx + 2 < rgb.len() {
                let r = f32::from(rgb[idx]);
                let g = f32::from(rgb[idx + 1]);
                let b = f32::from(rgb[idx + 2]);
                if r * 0.299 + g * 0.587 + b * 0.114 < INK_LUMA_MAX {
                    dark += 1;
                }
            }
        }
        *slot = dark as f32 / px_w as f32;
    }

    // Radius-1 box smoother.
    let mut smoothed = vec![0.0f32; px_h];
    for (row, slot) in smoothed.iter_mut().enumerate() {
        let start = row.saturating_sub(1);
        let end = (row + 2).min(px_h);
        let sum: f32 = profile[start..end].iter().sum();
        *slot = sum / (end - start) as f32;
    }

    let non_blank: Vec<f32> = smoothed
        .iter()
        .copied()
        .filter(|&v| v > DENSITY_FLOOR)
        .collect();
    let threshold = if non_blank.is_empty() {
        DENSITY_FLOOR
    } else {
        let mean: f32 = non_blank.iter().sum::<f32>() / non_blank.len() as f32;
        (mean * DENSITY_RATIO).max(DENSITY_FLOOR)
    };

    let mut lines = Vec::new();
    let mut run_start: Option<usize> = None;

    for row in 0..px_h {
        if smoothed[row] > threshold {
            if run_start.is_none() {
                run_start = Some(row);
            }
        } else if let Some(start) = run_start.take() {
            push_run(&mut lines, start, row - start, block_y, scale_y);
        }
    }
    if let Some(start) = run_start {
        push_run(&mut lines, start, px_h - start, block_y, scale_y);
    }

    lines
}

fn push_run(lines: &mut Vec<LineInfo>, start: usize, rows: usize, block_y: f32, scale_y: f32) {
    if rows < MIN_RUN_ROWS {
        return;
    }
    let center_px = start as f32 + rows as f32 / 2.0;
    lines.push(LineInfo {
        y: block_y + center_px * scale_y,
        height: rows as f32 * scale_y,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a white RGB image with horizontal black bands.
    fn banded_image(w: usize, h: usize, bands: &[(usize, usize)]) -> Vec<u8> {
        let mut rgb = vec![255u8; w * h * 3];
        for &(top, rows) in bands {
            for row in top..top + rows {
                for col in 0..w {
                    let idx = (row * w + col) * 3;
                    rgb[idx] = 0;
                    rgb[idx + 1] = 0;
                    rgb[idx + 2] = 0;
                }
            }
        }
        rgb
    }

    #[test]
    fn finds_one_line_per_band() {
        let rgb = banded_image(40, 60, &[(10, 5), (30, 5), (50, 5)]);
        let lines = detect_lines(&rgb, 40, 0, 0, 40, 60, 0.0, 1.0);
        assert_eq!(lines.len(), 3);
        // Smoothing widens each 5-row band by one row on each side, so the
        // run is rows [top-1, top+5] and its center stays at band center.
        assert!((lines[0].y - 12.5).abs() <= 1.0);
        assert!((lines[1].y - 32.5).abs() <= 1.0);
        assert!((lines[2].y - 52.5).abs() <= 1.0);
        assert!(lines.windows(2).all(|w| w[0].y < w[1].y));
    }

    #[test]
    fn blank_region_yields_no_lines() {
        let rgb = banded_image(40, 40, &[]);
        let lines = detect_lines(&rgb, 40, 0, 0, 40, 40, 0.0, 1.0);
        assert!(lines.is_empty());
    }

    #[test]
    fn single_dark_row_still_forms_a_minimal_run() {
        // Smoothing spreads a one-row band over three rows, the minimum
        // accepted run length.
        let rgb = banded_image(40, 60, &[(5, 1), (30, 10)]);
        let lines = detect_lines(&rgb, 40, 0, 0, 40, 60, 0.0, 1.0);
        assert_eq!(lines.len(), 2);
        assert!((lines[0].y - 5.5).abs() <= 1.0);
        assert!((lines[1].y - 35.0).abs() <= 1.0);
    }

    #[test]
    fn deterministic_for_same_region() {
        let rgb = banded_image(32, 48, &[(4, 4), (20, 6)]);
        let a = detect_lines(&rgb, 32, 0, 0, 32, 48, 12.0, 0.5);
        let b = detect_lines(&rgb, 32, 0, 0, 32, 48, 12.0, 0.5);
        assert_eq!(a, b);
    }

    #[test]
    fn scales_to_page_points() {
        let rgb = banded_image(40, 40, &[(10, 5)]);
        let lines = detect_lines(&rgb, 40, 0, 0, 40, 40, 100.0, 2.0);
        assert_eq!(lines.len(), 1);
        // Run covers rows 9..=15 after smoothing: center 12.5 px.
        assert!((lines[0].y - (100.0 + 12.5 * 2.0)).abs() < 1e-4);
        assert!((lines[0].height - 7.0 * 2.0).abs() < 1e-4);
    }
}
