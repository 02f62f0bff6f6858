//! Frame scheduling
//!
//! The host drives the core from two places: a vsync-aligned animation
//! callback, re-armed one-shot while `Wake::AnimationFrame` is returned, and
//! a low-frequency poll timer that runs only while `Wake::PollTimer` asks
//! for it. The two never overlap; a fixed-rate timer is not a substitute
//! because it either burns energy or beats against the snap animation.
//!
//! Each tick performs, in order: rail animation, zoom-speed decay, worker
//! result polling, one lookahead submission when idle, DPI tier bookkeeping.
//! The outcome lists which paint layers actually changed so a pan does not
//! repaint the page bitmap.

use std::time::{Duration, Instant};

use crate::config::Config;
use crate::geometry::Viewport;
use crate::tab::TabState;
use crate::worker::AnalysisWorker;

/// Upper bound on per-frame delta time; hitches advance animations by at
/// most this much.
const MAX_FRAME_DT: f64 = 0.05;

/// Poll timer period while background work is outstanding.
pub const POLL_PERIOD: Duration = Duration::from_millis(100);

/// Paint layers that changed during a tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Invalidation {
    /// Camera transform changed (pan/zoom/animation).
    pub camera: bool,
    /// The page bitmap itself changed (tier render landed).
    pub page: bool,
    /// Rail highlights or analysis results changed.
    pub overlay: bool,
}

impl Invalidation {
    #[must_use]
    pub fn any(&self) -> bool {
        self.camera || self.page || self.overlay
    }
}

/// How the host should schedule the next tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    /// Re-arm the one-shot vsync callback; an animation is running.
    AnimationFrame,
    /// No animation, but background work is pending; poll at `POLL_PERIOD`.
    PollTimer,
    /// Nothing to do until the next input event.
    Idle,
}

#[derive(Clone, Copy, Debug)]
pub struct FrameOutcome {
    pub invalidate: Invalidation,
    pub wake: Wake,
}

pub struct FrameScheduler {
    last_tick: Option<Instant>,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self { last_tick: None }
    }

    /// Run one frame of coordination work over all tabs, animating the
    /// active one.
    pub fn tick(
        &mut self,
        now: Instant,
        tabs: &mut [TabState],
        active: usize,
        worker: &mut AnalysisWorker,
        config: &Config,
        viewport: Viewport,
    ) -> FrameOutcome {
        let dt = self.frame_dt(now);
        let mut invalidate = Invalidation::default();

        // 1. Advance snap/scroll on the active tab.
        let mut animating = false;
        if let Some(tab) = tabs.get_mut(active) {
            let before = (tab.camera.offset_x, tab.camera.offset_y);
            animating = tab.rail.tick(&mut tab.camera, dt, viewport);
            let moved = (tab.camera.offset_x, tab.camera.offset_y) != before;
            invalidate.camera = animating || moved;

            // 2. Decay the motion-blur metric.
            tab.camera.decay_zoom_speed(dt);
        }

        // 3. Drain worker results into their tabs' caches; a result for the
        // visible page installs immediately and may start a snap.
        while let Some(result) = worker.poll() {
            log::debug!(
                "Analysis result for page {} ({} blocks)",
                result.page + 1,
                result.analysis.blocks.len()
            );
            let analysis = std::sync::Arc::new(result.analysis);
            for (idx, tab) in tabs.iter_mut().enumerate() {
                if tab.file_path != result.path {
                    continue;
                }
                let installed =
                    tab.apply_analysis(result.page, std::sync::Arc::clone(&analysis), config, viewport);
                if installed && idx == active {
                    invalidate.overlay = true;
                }
            }
        }

        // 4. One lookahead submission per quiet frame.
        if worker.is_idle() && !animating {
            if let Some(tab) = tabs.get_mut(active) {
                tab.submit_pending_lookahead(worker);
            }
        }

        // 5. DPI tier bookkeeping for the active tab.
        let mut render_in_flight = false;
        if let Some(tab) = tabs.get_mut(active) {
            if tab.poll_tier_render() {
                invalidate.page = true;
            }
            tab.maybe_request_tier_render();
            render_in_flight = tab.render_in_flight();
        }

        // A snap started by an arriving analysis needs the next frame too.
        let rail_animating = tabs
            .get(active)
            .is_some_and(|t| t.rail.is_animating() || t.camera.zoom_speed > 0.0);

        let wake = if animating || rail_animating {
            Wake::AnimationFrame
        } else if !worker.is_idle() || render_in_flight {
            Wake::PollTimer
        } else {
            Wake::Idle
        };

        FrameOutcome { invalidate, wake }
    }

    fn frame_dt(&mut self, now: Instant) -> f64 {
        let dt = match self.last_tick {
            Some(last) => now.saturating_duration_since(last).as_secs_f64(),
            None => 0.0,
        };
        self.last_tick = Some(now);
        dt.clamp(0.0, MAX_FRAME_DT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{spawn_fallback_worker, FakeSource};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::thread;

    fn viewport() -> Viewport {
        Viewport::new(1000.0, 700.0)
    }

    #[test]
    fn analysis_arrival_activates_rail_and_requests_frames() {
        let config = Config::default();
        let mut worker = spawn_fallback_worker();
        let mut tab = TabState::open(
            PathBuf::from("doc.pdf"),
            Arc::new(FakeSource::new(vec![(60.0, 80.0); 3])),
            &config,
        )
        .unwrap();
        tab.load_page(&mut worker, &config, viewport());
        tab.apply_zoom(5.0, viewport());
        assert!(!tab.rail.active());

        let mut tabs = vec![tab];
        let mut scheduler = FrameScheduler::new();
        let mut now = Instant::now();

        // Tick until the worker's fallback analysis lands.
        let mut overlay_dirty = false;
        for _ in 0..500 {
            let outcome = scheduler.tick(now, &mut tabs, 0, &mut worker, &config, viewport());
            if outcome.invalidate.overlay {
                overlay_dirty = true;
                // The install re-evaluated the zoom threshold and snapped.
                assert!(tabs[0].rail.active());
                assert_eq!(outcome.wake, Wake::AnimationFrame);
                break;
            }
            thread::sleep(std::time::Duration::from_millis(2));
            now = Instant::now();
        }
        assert!(overlay_dirty);

        // Drive the snap to completion; camera frames stay requested until
        // snap, lookahead, and zoom decay all settle.
        for _ in 0..2000 {
            now += std::time::Duration::from_millis(16);
            let outcome = scheduler.tick(now, &mut tabs, 0, &mut worker, &config, viewport());
            if outcome.wake == Wake::Idle {
                assert!(!tabs[0].rail.is_animating());
                assert!(worker.is_idle());
                return;
            }
            if outcome.wake == Wake::PollTimer {
                // Background analysis still draining; give it real time.
                thread::sleep(std::time::Duration::from_millis(2));
            }
        }
        panic!("scheduler never settled to Idle");
    }

    #[test]
    fn quiet_frames_submit_lookahead() {
        let config = Config::default();
        let mut worker = spawn_fallback_worker();
        let mut tab = TabState::open(
            PathBuf::from("doc.pdf"),
            Arc::new(FakeSource::new(vec![(60.0, 80.0); 5])),
            &config,
        )
        .unwrap();
        tab.load_page(&mut worker, &config, viewport());
        assert_eq!(tab.lookahead_queue().len(), 2);

        let mut tabs = vec![tab];
        let mut scheduler = FrameScheduler::new();
        let mut now = Instant::now();

        // Eventually pages 1 and 2 get analyzed via lookahead.
        for _ in 0..2000 {
            let outcome = scheduler.tick(now, &mut tabs, 0, &mut worker, &config, viewport());
            if outcome.wake == Wake::Idle && tabs[0].analysis_cache.len() >= 3 {
                assert!(tabs[0].analysis_cache.contains_key(&1));
                assert!(tabs[0].analysis_cache.contains_key(&2));
                return;
            }
            thread::sleep(std::time::Duration::from_millis(2));
            now = Instant::now();
        }
        panic!("lookahead pages were never analyzed");
    }

    #[test]
    fn results_route_to_their_own_document() {
        let config = Config::default();
        let mut worker = spawn_fallback_worker();
        let mut tab_a = TabState::open(
            PathBuf::from("a.pdf"),
            Arc::new(FakeSource::new(vec![(60.0, 80.0); 2])),
            &config,
        )
        .unwrap();
        let tab_b = TabState::open(
            PathBuf::from("b.pdf"),
            Arc::new(FakeSource::new(vec![(60.0, 80.0); 2])),
            &config,
        )
        .unwrap();
        tab_a.load_page(&mut worker, &config, viewport());

        let mut tabs = vec![tab_a, tab_b];
        let mut scheduler = FrameScheduler::new();
        let mut now = Instant::now();

        for _ in 0..500 {
            scheduler.tick(now, &mut tabs, 0, &mut worker, &config, viewport());
            if tabs[0].analysis_cache.contains_key(&0) {
                assert!(tabs[1].analysis_cache.is_empty());
                return;
            }
            thread::sleep(std::time::Duration::from_millis(2));
            now = Instant::now();
        }
        panic!("analysis never arrived for tab a");
    }
}
