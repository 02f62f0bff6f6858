//! Per-document state
//!
//! A tab owns its camera, rail navigator, cached page image, analysis cache,
//! and lookahead queue. The page image is held behind an `Arc` and replaced
//! wholesale when a DPI tier render lands; the compositor's clone keeps the
//! old bitmap alive until it stops painting from it. Tier renders run on a
//! transient background task that opens its own engine handle.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use flume::Receiver;

use crate::camera::{dpi_for_zoom, tier_needs_rerender, Camera};
use crate::config::Config;
use crate::doc::{DocumentSource, OutlineEntry, PageImage, RasterError, Rasterizer};
use crate::geometry::Viewport;
use crate::layout::{AnalysisInput, PageAnalysis, INPUT_SIZE};
use crate::rail::RailNav;
use crate::worker::{AnalysisRequest, AnalysisWorker};

static NEXT_TAB_ID: AtomicU64 = AtomicU64::new(1);

pub type TabId = u64;

fn next_tab_id() -> TabId {
    NEXT_TAB_ID.fetch_add(1, Ordering::Relaxed)
}

struct TierRender {
    page: u32,
    image: PageImage,
}

pub struct TabState {
    pub id: TabId,
    pub title: String,
    pub file_path: PathBuf,
    raster: Box<dyn Rasterizer>,
    source: Arc<dyn DocumentSource>,
    pub page_count: u32,
    pub current_page: u32,
    pub page_width: f64,
    pub page_height: f64,
    pub camera: Camera,
    pub rail: RailNav,
    pub outline: Vec<OutlineEntry>,
    cached_image: Option<Arc<PageImage>>,
    /// Pending DPI tier render; `Some` doubles as the in-flight flag that
    /// serializes upgrades per tab.
    tier_rx: Option<Receiver<Result<TierRender, RasterError>>>,
    /// Analyses live here until the tab closes.
    pub analysis_cache: HashMap<u32, Arc<PageAnalysis>>,
    lookahead: VecDeque<u32>,
    /// Analysis for the current page was submitted but has not arrived;
    /// rail activation waits on it.
    pub pending_rail_setup: bool,
}

impl TabState {
    /// Open a document. The first page still needs `load_page`.
    pub fn open(
        file_path: PathBuf,
        source: Arc<dyn DocumentSource>,
        config: &Config,
    ) -> Result<Self, RasterError> {
        let raster = source.open()?;
        let page_count = raster.page_count();
        if page_count == 0 {
            return Err(RasterError::generic("Document has no pages"));
        }

        let title = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_path.to_string_lossy().into_owned());
        let outline = raster.outline();

        Ok(Self {
            id: next_tab_id(),
            title,
            file_path,
            raster,
            source,
            page_count,
            current_page: 0,
            page_width: 0.0,
            page_height: 0.0,
            camera: Camera::default(),
            rail: RailNav::new(config.clone()),
            outline,
            cached_image: None,
            tier_rx: None,
            analysis_cache: HashMap::new(),
            lookahead: VecDeque::new(),
            pending_rail_setup: false,
        })
    }

    /// Load the current page: base raster at the zoom's DPI tier, analysis
    /// submission, lookahead refill. A failed render keeps the previous
    /// image and suppresses rail setup for this page.
    pub fn load_page(&mut self, worker: &mut AnalysisWorker, config: &Config, viewport: Viewport) {
        // Any in-flight tier render belongs to the page we are leaving.
        self.tier_rx = None;

        match self.raster.page_size(self.current_page) {
            Ok((w, h)) => {
                self.page_width = w;
                self.page_height = h;
            }
            Err(e) => log::error!("Failed to read page {} size: {e}", self.current_page + 1),
        }

        let dpi = dpi_for_zoom(self.camera.zoom);
        match self.raster.render_page(self.current_page, dpi) {
            Ok(image) => {
                self.cached_image = Some(Arc::new(image));
                self.submit_analysis(worker, config, viewport);
            }
            Err(e) => {
                log::error!("Failed to render page {}: {e}", self.current_page + 1);
                self.pending_rail_setup = false;
            }
        }

        self.queue_lookahead(config.analysis_lookahead_pages);
    }

    /// Navigate to a page. The rail resets and re-arms once the new page's
    /// analysis is installed.
    pub fn go_to_page(
        &mut self,
        page: u32,
        worker: &mut AnalysisWorker,
        config: &Config,
        viewport: Viewport,
    ) {
        let page = page.min(self.page_count - 1);
        if page == self.current_page {
            return;
        }
        self.current_page = page;
        self.rail.clear_analysis();
        self.pending_rail_setup = false;
        self.load_page(worker, config, viewport);
        self.camera.clamp_to_page(self.page_width, self.page_height, viewport);
    }

    /// Install analysis for the current page: from cache when possible,
    /// otherwise prepare the coarse pixmap and hand it to the worker.
    fn submit_analysis(&mut self, worker: &mut AnalysisWorker, config: &Config, viewport: Viewport) {
        if let Some(cached) = self.analysis_cache.get(&self.current_page) {
            log::info!(
                "Using cached analysis for page {} ({} blocks)",
                self.current_page + 1,
                cached.blocks.len()
            );
            let cached = Arc::clone(cached);
            self.install_analysis(cached, config, viewport);
            return;
        }

        if worker.is_in_flight(&self.file_path, self.current_page) {
            self.pending_rail_setup = true;
            return;
        }

        match self.prepare_input(self.current_page) {
            Ok(input) => {
                worker.submit(AnalysisRequest {
                    path: self.file_path.clone(),
                    page: self.current_page,
                    input,
                });
                self.pending_rail_setup = true;
                log::info!("Submitted analysis for page {}", self.current_page + 1);
            }
            Err(e) => {
                log::warn!(
                    "Failed to prepare analysis input for page {}: {e}",
                    self.current_page + 1
                );
                self.pending_rail_setup = false;
            }
        }
    }

    /// Route a worker result into this tab. Returns true when it was
    /// installed for the current page (stale results are cached only).
    pub fn apply_analysis(
        &mut self,
        page: u32,
        analysis: Arc<PageAnalysis>,
        config: &Config,
        viewport: Viewport,
    ) -> bool {
        self.analysis_cache.insert(page, Arc::clone(&analysis));
        if page == self.current_page && self.pending_rail_setup {
            self.install_analysis(analysis, config, viewport);
            true
        } else {
            false
        }
    }

    fn install_analysis(&mut self, analysis: Arc<PageAnalysis>, config: &Config, viewport: Viewport) {
        self.rail.set_analysis(analysis, &config.navigable_classes);
        self.pending_rail_setup = false;
        // Re-evaluate activation right away: the zoom may already be past
        // the threshold, and waiting for the next zoom change would leave
        // rail mode dark on this page.
        self.rail.update_zoom(&self.camera, viewport);
        if self.rail.active() {
            self.rail.start_snap_to_current(&self.camera, viewport);
        }
    }

    /// Re-filter the cached analysis after a `navigable_classes` edit; no
    /// inference re-run.
    pub fn reapply_navigable_classes(&mut self, config: &Config, viewport: Viewport) {
        self.rail.update_config(config.clone());
        if let Some(cached) = self.analysis_cache.get(&self.current_page) {
            let cached = Arc::clone(cached);
            self.rail.set_analysis(cached, &config.navigable_classes);
            self.rail.update_zoom(&self.camera, viewport);
        }
    }

    /// Rebuild the lookahead queue with the next uncached pages.
    pub fn queue_lookahead(&mut self, lookahead_pages: usize) {
        self.lookahead.clear();
        for i in 1..=lookahead_pages as u32 {
            let page = self.current_page + i;
            if page < self.page_count && !self.analysis_cache.contains_key(&page) {
                self.lookahead.push_back(page);
            }
        }
    }

    /// Submit at most one queued lookahead page to an idle worker. Returns
    /// whether a request went out.
    pub fn submit_pending_lookahead(&mut self, worker: &mut AnalysisWorker) -> bool {
        if !worker.is_idle() {
            return false;
        }

        while let Some(page) = self.lookahead.pop_front() {
            if self.analysis_cache.contains_key(&page) || worker.is_in_flight(&self.file_path, page)
            {
                continue;
            }
            match self.prepare_input(page) {
                Ok(input) => {
                    worker.submit(AnalysisRequest {
                        path: self.file_path.clone(),
                        page,
                        input,
                    });
                    log::info!("Submitted lookahead analysis for page {}", page + 1);
                    return true;
                }
                Err(e) => log::warn!("Lookahead prepare failed for page {}: {e}", page + 1),
            }
        }
        false
    }

    fn prepare_input(&self, page: u32) -> Result<AnalysisInput, RasterError> {
        let pixmap = self.raster.render_pixmap(page, INPUT_SIZE)?;
        let (page_w, page_h) = self.raster.page_size(page)?;
        Ok(AnalysisInput {
            rgb: pixmap.rgb,
            px_w: pixmap.width,
            px_h: pixmap.height,
            page_w,
            page_h,
        })
    }

    /// Set an absolute zoom, re-evaluating rail activation.
    pub fn apply_zoom(&mut self, zoom: f64, viewport: Viewport) {
        self.camera.set_zoom(zoom);
        self.after_zoom_change(viewport);
    }

    /// Zoom anchored on a cursor position (wheel zoom).
    pub fn zoom_at_cursor(&mut self, cursor_x: f64, cursor_y: f64, zoom: f64, viewport: Viewport) {
        self.camera.zoom_about(cursor_x, cursor_y, zoom);
        self.after_zoom_change(viewport);
    }

    fn after_zoom_change(&mut self, viewport: Viewport) {
        self.rail.update_zoom(&self.camera, viewport);
        if self.rail.active() {
            self.rail.start_snap_to_current(&self.camera, viewport);
        }
        self.camera.clamp_to_page(self.page_width, self.page_height, viewport);
    }

    /// Fit the page in the viewport (also drops out of rail mode).
    pub fn fit_page_view(&mut self, viewport: Viewport) {
        self.camera.fit_page(self.page_width, self.page_height, viewport);
        self.rail.update_zoom(&self.camera, viewport);
    }

    /// Kick off an async DPI tier render when the zoom has outgrown the
    /// cached image. At most one render runs per tab.
    pub fn maybe_request_tier_render(&mut self) {
        if self.tier_rx.is_some() {
            return;
        }
        let Some(current) = &self.cached_image else {
            return;
        };
        let needed = dpi_for_zoom(self.camera.zoom);
        if !tier_needs_rerender(needed, current.dpi) {
            return;
        }

        let (tx, rx) = flume::bounded(1);
        let source = Arc::clone(&self.source);
        let page = self.current_page;
        let spawned = thread::Builder::new()
            .name("tier-render".into())
            .spawn(move || {
                let result = source
                    .open()
                    .and_then(|raster| raster.render_page(page, needed));
                let _ = tx.send(result.map(|image| TierRender { page, image }));
            });

        match spawned {
            Ok(_) => {
                log::debug!("Requested {needed:.0} dpi render of page {}", page + 1);
                self.tier_rx = Some(rx);
            }
            Err(e) => log::error!("Failed to spawn tier render task: {e}"),
        }
    }

    /// Poll the pending tier render. Returns true when the page bitmap
    /// changed. A result for a page we already left is discarded.
    pub fn poll_tier_render(&mut self) -> bool {
        let Some(rx) = self.tier_rx.as_ref() else {
            return false;
        };
        match rx.try_recv() {
            Ok(Ok(render)) => {
                self.tier_rx = None;
                if render.page == self.current_page {
                    log::debug!(
                        "Page {} upgraded to {:.0} dpi",
                        render.page + 1,
                        render.image.dpi
                    );
                    // The new bitmap is complete; assigning the handle frees
                    // the old one once the compositor drops its clone.
                    self.cached_image = Some(Arc::new(render.image));
                    true
                } else {
                    false
                }
            }
            Ok(Err(e)) => {
                log::warn!("Tier render failed: {e}");
                self.tier_rx = None;
                false
            }
            Err(flume::TryRecvError::Empty) => false,
            Err(flume::TryRecvError::Disconnected) => {
                self.tier_rx = None;
                false
            }
        }
    }

    #[must_use]
    pub fn render_in_flight(&self) -> bool {
        self.tier_rx.is_some()
    }

    #[must_use]
    pub fn cached_image(&self) -> Option<&Arc<PageImage>> {
        self.cached_image.as_ref()
    }

    #[must_use]
    pub fn lookahead_queue(&self) -> &VecDeque<u32> {
        &self.lookahead
    }
}
