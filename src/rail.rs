//! Rail navigation state machine
//!
//! Above the zoom threshold the viewport locks onto navigable layout blocks
//! and advances line by line: a cubic ease-out snap carries the camera to
//! the current line, and hold-to-scroll ramps the camera horizontally along
//! it. The navigator is either inactive or active with a block/line cursor;
//! snap and scroll may run at the same time.

use std::collections::HashSet;
use std::sync::Arc;

use crate::camera::Camera;
use crate::config::Config;
use crate::geometry::Viewport;
use crate::layout::{LayoutBlock, LineInfo, PageAnalysis};

/// Horizontal position of the reading rail as a fraction of viewport width.
const RAIL_LEFT_MARGIN: f64 = 0.05;
/// Horizontal slack around a block during scroll clamping, as a fraction of
/// the block width.
const BLOCK_MARGIN_RATIO: f64 = 0.05;

/// Outcome of a line-cursor move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavOutcome {
    Ok,
    /// Cursor was already on the last line of the last navigable block.
    PageBoundaryNext,
    /// Cursor was already on the first line of the first navigable block.
    PageBoundaryPrev,
}

/// Direction of hold-to-scroll. Forward moves the text leftward under the
/// viewport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollDir {
    Forward,
    Backward,
}

impl ScrollDir {
    fn sign(self) -> f64 {
        match self {
            Self::Forward => -1.0,
            Self::Backward => 1.0,
        }
    }
}

#[derive(Clone, Debug)]
struct SnapAnim {
    start_x: f64,
    start_y: f64,
    target_x: f64,
    target_y: f64,
    elapsed_ms: f64,
    duration_ms: f64,
}

#[derive(Clone, Debug)]
struct ScrollHold {
    dir: ScrollDir,
    start_x: f64,
    hold_secs: f64,
}

#[derive(Debug, Default)]
enum RailState {
    #[default]
    Inactive,
    Active {
        cur_block: usize,
        cur_line: usize,
        snap: Option<SnapAnim>,
        scroll: Option<ScrollHold>,
    },
}

pub struct RailNav {
    config: Config,
    analysis: Option<Arc<PageAnalysis>>,
    /// Indices into `analysis.blocks`, in reading order.
    navigable: Vec<usize>,
    state: RailState,
}

impl RailNav {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            analysis: None,
            navigable: Vec::new(),
            state: RailState::Inactive,
        }
    }

    /// Install a page analysis and recompute the navigable set. The cursor
    /// resets and any running snap or scroll stops.
    pub fn set_analysis(&mut self, analysis: Arc<PageAnalysis>, navigable_classes: &HashSet<usize>) {
        self.navigable = analysis
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| navigable_classes.contains(&b.class_id))
            .map(|(i, _)| i)
            .collect();
        self.analysis = Some(analysis);

        if self.navigable.is_empty() {
            self.state = RailState::Inactive;
        } else if matches!(self.state, RailState::Active { .. }) {
            self.state = RailState::Active {
                cur_block: 0,
                cur_line: 0,
                snap: None,
                scroll: None,
            };
        }
    }

    /// Drop the analysis entirely (page change, load failure).
    pub fn clear_analysis(&mut self) {
        self.analysis = None;
        self.navigable.clear();
        self.state = RailState::Inactive;
    }

    #[must_use]
    pub fn has_analysis(&self) -> bool {
        self.analysis.is_some() && !self.navigable.is_empty()
    }

    #[must_use]
    pub fn active(&self) -> bool {
        matches!(self.state, RailState::Active { .. })
    }

    /// True while a snap or scroll is in progress.
    #[must_use]
    pub fn is_animating(&self) -> bool {
        matches!(
            self.state,
            RailState::Active { ref snap, ref scroll, .. } if snap.is_some() || scroll.is_some()
        )
    }

    #[must_use]
    pub fn analysis(&self) -> Option<&Arc<PageAnalysis>> {
        self.analysis.as_ref()
    }

    #[must_use]
    pub fn navigable_count(&self) -> usize {
        self.navigable.len()
    }

    /// Current `(block, line)` cursor while active.
    #[must_use]
    pub fn cursor(&self) -> Option<(usize, usize)> {
        match self.state {
            RailState::Active { cur_block, cur_line, .. } => Some((cur_block, cur_line)),
            RailState::Inactive => None,
        }
    }

    /// Re-evaluate activation against the zoom threshold. Entering the
    /// active state locks onto the block nearest the viewport center;
    /// leaving it cancels snap and scroll.
    pub fn update_zoom(&mut self, cam: &Camera, viewport: Viewport) {
        let should_be_active = cam.zoom >= self.config.rail_zoom_threshold && self.has_analysis();

        match (&self.state, should_be_active) {
            (RailState::Inactive, true) => {
                self.state = RailState::Active {
                    cur_block: 0,
                    cur_line: 0,
                    snap: None,
                    scroll: None,
                };
                self.find_nearest_block(cam, viewport);
            }
            (RailState::Active { .. }, false) => {
                self.state = RailState::Inactive;
            }
            _ => {}
        }
    }

    /// Move the cursor to the navigable block whose center is closest to the
    /// viewport center, resetting the line to 0.
    pub fn find_nearest_block(&mut self, cam: &Camera, viewport: Viewport) {
        let Some(analysis) = self.analysis.as_deref() else {
            return;
        };
        let (center_x, center_y) = cam.viewport_center_in_page(viewport);

        let mut best = 0;
        let mut best_dist = f64::MAX;
        for (nav_idx, &block_idx) in self.navigable.iter().enumerate() {
            let (bx, by) = analysis.blocks[block_idx].bbox.center();
            let dist = (f64::from(bx) - center_x).powi(2) + (f64::from(by) - center_y).powi(2);
            if dist < best_dist {
                best_dist = dist;
                best = nav_idx;
            }
        }

        if let RailState::Active { cur_block, cur_line, .. } = &mut self.state {
            *cur_block = best;
            *cur_line = 0;
        }
    }

    /// Advance one line, spilling into the next block.
    pub fn next_line(&mut self) -> NavOutcome {
        let Some((block_idx, line_idx)) = self.cursor() else {
            return NavOutcome::Ok;
        };
        let line_count = self.navigable_block(block_idx).map_or(0, |b| b.lines.len());
        let nav_len = self.navigable.len();

        let RailState::Active { cur_block, cur_line, .. } = &mut self.state else {
            return NavOutcome::Ok;
        };
        if line_idx + 1 < line_count {
            *cur_line += 1;
            NavOutcome::Ok
        } else if block_idx + 1 < nav_len {
            *cur_block += 1;
            *cur_line = 0;
            NavOutcome::Ok
        } else {
            NavOutcome::PageBoundaryNext
        }
    }

    /// Step back one line, spilling onto the previous block's last line.
    pub fn prev_line(&mut self) -> NavOutcome {
        let Some((block_idx, line_idx)) = self.cursor() else {
            return NavOutcome::Ok;
        };
        let prev_last_line = block_idx
            .checked_sub(1)
            .and_then(|i| self.navigable_block(i))
            .map_or(0, |b| b.lines.len().saturating_sub(1));

        let RailState::Active { cur_block, cur_line, .. } = &mut self.state else {
            return NavOutcome::Ok;
        };
        if line_idx > 0 {
            *cur_line -= 1;
            NavOutcome::Ok
        } else if block_idx > 0 {
            *cur_block -= 1;
            *cur_line = prev_last_line;
            NavOutcome::Ok
        } else {
            NavOutcome::PageBoundaryPrev
        }
    }

    /// Park the cursor on the last line of the last block, used after
    /// crossing a page boundary backward.
    pub fn jump_to_end(&mut self) {
        if self.navigable.is_empty() {
            return;
        }
        let last_block = self.navigable.len() - 1;
        let last_line = self
            .navigable_block(last_block)
            .map_or(0, |b| b.lines.len().saturating_sub(1));

        if let RailState::Active { cur_block, cur_line, .. } = &mut self.state {
            *cur_block = last_block;
            *cur_line = last_line;
        }
    }

    /// Begin a snap that puts the current block's left edge on the rail and
    /// the current line at mid-viewport.
    pub fn start_snap_to_current(&mut self, cam: &Camera, viewport: Viewport) {
        let Some((block_idx, line_idx)) = self.cursor() else {
            return;
        };
        let Some(block) = self.navigable_block(block_idx) else {
            return;
        };
        let Some(line) = block.lines.get(line_idx) else {
            return;
        };

        let target_x = viewport.w * RAIL_LEFT_MARGIN - f64::from(block.bbox.x) * cam.zoom;
        let target_y = viewport.h / 2.0 - f64::from(line.y) * cam.zoom;
        let duration_ms = self.config.snap_duration_ms;

        if let RailState::Active { snap, .. } = &mut self.state {
            *snap = Some(SnapAnim {
                start_x: cam.offset_x,
                start_y: cam.offset_y,
                target_x,
                target_y,
                elapsed_ms: 0.0,
                duration_ms,
            });
        }
    }

    /// Begin hold-to-scroll from the given camera x. Re-pressing the same
    /// direction does not restart the ramp.
    pub fn start_scroll(&mut self, dir: ScrollDir, cam_x: f64) {
        if self.navigable.is_empty() {
            return;
        }
        let RailState::Active { scroll, .. } = &mut self.state else {
            return;
        };
        if scroll.as_ref().map(|h| h.dir) != Some(dir) {
            *scroll = Some(ScrollHold {
                dir,
                start_x: cam_x,
                hold_secs: 0.0,
            });
        }
    }

    pub fn stop_scroll(&mut self) {
        if let RailState::Active { scroll, .. } = &mut self.state {
            *scroll = None;
        }
    }

    /// Advance snap and scroll by `dt` seconds. Returns whether another
    /// animation frame is needed (including a still-decaying zoom metric).
    pub fn tick(&mut self, cam: &mut Camera, dt: f64, viewport: Viewport) -> bool {
        let analysis = self.analysis.as_deref();
        let navigable = &self.navigable;
        let config = &self.config;

        let RailState::Active { cur_block, snap, scroll, .. } = &mut self.state else {
            return cam.zoom_speed > 0.0;
        };

        if let Some(anim) = snap.as_mut() {
            anim.elapsed_ms += dt * 1000.0;
            let t = if anim.duration_ms > 0.0 {
                (anim.elapsed_ms / anim.duration_ms).min(1.0)
            } else {
                1.0
            };
            let eased = 1.0 - (1.0 - t).powi(3);
            cam.offset_x = anim.start_x + (anim.target_x - anim.start_x) * eased;
            cam.offset_y = anim.start_y + (anim.target_y - anim.start_y) * eased;
            if t >= 1.0 {
                *snap = None;
            }
        }

        if let Some(hold) = scroll.as_mut() {
            hold.hold_secs += dt;
            // Position from total hold time via the closed-form integral of
            // the ramped speed curve, so frame pacing cannot add jitter.
            let displacement = scroll_displacement(config, hold.hold_secs);
            let x = hold.start_x + hold.dir.sign() * displacement * cam.zoom;

            let block = navigable
                .get(*cur_block)
                .and_then(|&i| analysis.and_then(|a| a.blocks.get(i)));
            cam.offset_x = match block {
                Some(block) => clamp_x_to_block(block, x, cam.zoom, viewport.w),
                None => x,
            };
        }

        snap.is_some() || scroll.is_some() || cam.zoom_speed > 0.0
    }

    /// Navigable index of the block containing a page point, if any.
    #[must_use]
    pub fn find_block_at_point(&self, page_x: f32, page_y: f32) -> Option<usize> {
        let analysis = self.analysis.as_deref()?;
        self.navigable
            .iter()
            .position(|&i| analysis.blocks[i].bbox.contains(page_x, page_y))
    }

    /// The block under the cursor, while active.
    #[must_use]
    pub fn current_block(&self) -> Option<&LayoutBlock> {
        let (block_idx, _) = self.cursor()?;
        self.navigable_block(block_idx)
    }

    /// The line under the cursor, while active.
    #[must_use]
    pub fn current_line(&self) -> Option<&LineInfo> {
        let (block_idx, line_idx) = self.cursor()?;
        self.navigable_block(block_idx)?.lines.get(line_idx)
    }

    pub fn update_config(&mut self, config: Config) {
        self.config = config;
    }

    fn navigable_block(&self, nav_idx: usize) -> Option<&LayoutBlock> {
        let analysis = self.analysis.as_deref()?;
        let block_idx = *self.navigable.get(nav_idx)?;
        analysis.blocks.get(block_idx)
    }
}

/// Closed-form displacement after holding scroll for `hold` seconds: the
/// speed ramps quadratically from `scroll_speed_start` to `scroll_speed_max`
/// over `scroll_ramp_time`, then stays constant.
fn scroll_displacement(config: &Config, hold: f64) -> f64 {
    let s0 = config.scroll_speed_start;
    let s1 = config.scroll_speed_max;
    let ramp = config.scroll_ramp_time.max(0.0);

    if hold <= ramp {
        if ramp == 0.0 {
            return s1 * hold;
        }
        s0 * hold + (s1 - s0) * hold.powi(3) / (3.0 * ramp * ramp)
    } else {
        s0 * ramp + (s1 - s0) * ramp / 3.0 + s1 * (hold - ramp)
    }
}

/// Clamp a camera x so the current block stays on screen: a block narrower
/// than the viewport is centered, a wider one may not pull its padded edges
/// inside the viewport edges.
fn clamp_x_to_block(block: &LayoutBlock, x: f64, zoom: f64, viewport_w: f64) -> f64 {
    let margin = f64::from(block.bbox.w) * BLOCK_MARGIN_RATIO;
    let left = f64::from(block.bbox.x) - margin;
    let right = f64::from(block.bbox.right()) + margin;

    if (right - left) * zoom <= viewport_w {
        viewport_w / 2.0 - (left + right) / 2.0 * zoom
    } else {
        let max_x = -left * zoom;
        let min_x = viewport_w - right * zoom;
        x.clamp(min_x, max_x)
    }
}
