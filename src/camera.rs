//! Camera model and raster DPI tiers
//!
//! The screen-space transform is `screen = offset + zoom * page`. Zoom is
//! clamped to a fixed range; `zoom_speed` is a decaying motion metric the
//! compositor's blur effect reads, reset to 1 on every zoom change.

use crate::geometry::Viewport;

pub const ZOOM_MIN: f64 = 0.1;
pub const ZOOM_MAX: f64 = 20.0;

/// Base raster DPI at zoom 1.
const TIER_BASE_DPI: f64 = 150.0;
const TIER_MAX_DPI: f64 = 600.0;
/// Upgrade when the needed DPI outgrows the cached one by this factor.
const TIER_UPGRADE_RATIO: f64 = 1.4;
/// Downgrade when the needed DPI shrinks below this fraction of the cache.
const TIER_DOWNGRADE_RATIO: f64 = 0.4;

/// Exponential half-life of `zoom_speed`, in seconds.
const ZOOM_SPEED_HALF_LIFE: f64 = 0.08;
/// Below this the metric snaps to zero and stops requesting frames.
const ZOOM_SPEED_EPSILON: f64 = 1e-3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub offset_x: f64,
    pub offset_y: f64,
    pub zoom: f64,
    /// Decaying zoom-motion metric in `[0, 1]`.
    pub zoom_speed: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            zoom: 1.0,
            zoom_speed: 0.0,
        }
    }
}

impl Camera {
    /// Set the zoom, clamped. Any actual change re-arms `zoom_speed`.
    pub fn set_zoom(&mut self, zoom: f64) {
        let zoom = zoom.clamp(ZOOM_MIN, ZOOM_MAX);
        if (zoom - self.zoom).abs() > f64::EPSILON {
            self.zoom = zoom;
            self.zoom_speed = 1.0;
        }
    }

    /// Zoom keeping the page point under `(cursor_x, cursor_y)` stationary:
    /// `offset' = cursor - (cursor - offset) * (z' / z)`.
    pub fn zoom_about(&mut self, cursor_x: f64, cursor_y: f64, zoom: f64) {
        let old_zoom = self.zoom;
        self.set_zoom(zoom);
        let ratio = self.zoom / old_zoom;
        self.offset_x = cursor_x - (cursor_x - self.offset_x) * ratio;
        self.offset_y = cursor_y - (cursor_y - self.offset_y) * ratio;
    }

    /// Fit the whole page in the viewport and center it.
    pub fn fit_page(&mut self, page_w: f64, page_h: f64, viewport: Viewport) {
        if page_w <= 0.0 || page_h <= 0.0 || viewport.w <= 0.0 || viewport.h <= 0.0 {
            return;
        }
        self.set_zoom((viewport.w / page_w).min(viewport.h / page_h));
        self.offset_x = (viewport.w - page_w * self.zoom) / 2.0;
        self.offset_y = (viewport.h - page_h * self.zoom) / 2.0;
    }

    /// Per-axis clamp: a page smaller than the viewport is centered, a
    /// larger one may not expose space beyond its edges.
    pub fn clamp_to_page(&mut self, page_w: f64, page_h: f64, viewport: Viewport) {
        let scaled_w = page_w * self.zoom;
        let scaled_h = page_h * self.zoom;

        if scaled_w <= viewport.w {
            self.offset_x = (viewport.w - scaled_w) / 2.0;
        } else {
            self.offset_x = self.offset_x.clamp(viewport.w - scaled_w, 0.0);
        }

        if scaled_h <= viewport.h {
            self.offset_y = (viewport.h - scaled_h) / 2.0;
        } else {
            self.offset_y = self.offset_y.clamp(viewport.h - scaled_h, 0.0);
        }
    }

    /// Decay `zoom_speed` by one frame of `dt` seconds.
    pub fn decay_zoom_speed(&mut self, dt: f64) {
        if self.zoom_speed == 0.0 {
            return;
        }
        self.zoom_speed *= 0.5f64.powf(dt / ZOOM_SPEED_HALF_LIFE);
        if self.zoom_speed < ZOOM_SPEED_EPSILON {
            self.zoom_speed = 0.0;
        }
    }

    /// Viewport center in page-point coordinates.
    #[must_use]
    pub fn viewport_center_in_page(&self, viewport: Viewport) -> (f64, f64) {
        (
            (viewport.w / 2.0 - self.offset_x) / self.zoom,
            (viewport.h / 2.0 - self.offset_y) / self.zoom,
        )
    }

    /// Screen pixel mapped to page points.
    #[must_use]
    pub fn screen_to_page(&self, sx: f64, sy: f64) -> (f64, f64) {
        ((sx - self.offset_x) / self.zoom, (sy - self.offset_y) / self.zoom)
    }
}

/// Raster DPI for the cached page image at a given zoom.
#[must_use]
pub fn dpi_for_zoom(zoom: f64) -> f64 {
    (zoom * TIER_BASE_DPI).clamp(TIER_BASE_DPI, TIER_MAX_DPI)
}

/// Whether the cached image should be re-rendered at `needed` DPI. Upgrades
/// fire past 1.4x; downgrades only once the cache is both oversized by 2.5x
/// and above the base tier.
#[must_use]
pub fn tier_needs_rerender(needed: f64, cached: f64) -> bool {
    needed > cached * TIER_UPGRADE_RATIO
        || (needed < cached * TIER_DOWNGRADE_RATIO && cached > TIER_BASE_DPI)
}
