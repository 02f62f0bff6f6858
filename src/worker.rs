//! Analysis worker - runs layout inference off the UI thread
//!
//! A single background thread consumes requests from an unbounded queue and
//! publishes results on a second one. Requests are keyed `(file_path, page)`;
//! a key already in flight is rejected at submit, and every accepted request
//! produces exactly one result before its key clears. When the model fails
//! to load the worker keeps serving, answering each request with the
//! synthetic fallback analysis.

use std::collections::HashSet;
use std::path::PathBuf;
use std::thread;

use flume::{Receiver, Sender};

use crate::detector::Detector;
use crate::layout::{self, AnalysisInput, PageAnalysis};

/// A request for one page of one document.
#[derive(Debug)]
pub struct AnalysisRequest {
    pub path: PathBuf,
    pub page: u32,
    pub input: AnalysisInput,
}

/// One result per accepted request, possibly a fallback analysis.
#[derive(Debug)]
pub struct AnalysisResult {
    pub path: PathBuf,
    pub page: u32,
    pub analysis: PageAnalysis,
}

pub struct AnalysisWorker {
    tx: Sender<AnalysisRequest>,
    rx: Receiver<AnalysisResult>,
    in_flight: HashSet<(PathBuf, u32)>,
}

impl AnalysisWorker {
    /// Spawn the worker thread. The detector loads on the worker so a slow
    /// or failing model never stalls the UI context; on load failure the
    /// worker enters fallback mode instead of dying.
    pub fn spawn<F>(load_detector: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<Box<dyn Detector>> + Send + 'static,
    {
        let (req_tx, req_rx) = flume::unbounded::<AnalysisRequest>();
        let (res_tx, res_rx) = flume::unbounded::<AnalysisResult>();

        thread::Builder::new()
            .name("analysis-worker".into())
            .spawn(move || run_worker(load_detector, &req_rx, &res_tx))
            .expect("failed to spawn analysis worker thread");

        Self {
            tx: req_tx,
            rx: res_rx,
            in_flight: HashSet::new(),
        }
    }

    /// Non-blocking submit. Returns false when the same `(path, page)` is
    /// already in flight; the request is not enqueued in that case.
    pub fn submit(&mut self, request: AnalysisRequest) -> bool {
        let key = (request.path.clone(), request.page);
        if self.in_flight.contains(&key) {
            return false;
        }
        if self.tx.send(request).is_err() {
            log::error!("Analysis worker is gone, dropping request");
            return false;
        }
        self.in_flight.insert(key);
        true
    }

    /// Non-blocking poll. Clears the in-flight key of the returned result.
    pub fn poll(&mut self) -> Option<AnalysisResult> {
        let result = self.rx.try_recv().ok()?;
        self.in_flight.remove(&(result.path.clone(), result.page));
        Some(result)
    }

    #[must_use]
    pub fn is_in_flight(&self, path: &std::path::Path, page: u32) -> bool {
        self.in_flight.contains(&(path.to_path_buf(), page))
    }

    /// True iff every accepted request has been polled back.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }
}

fn run_worker<F>(load_detector: F, requests: &Receiver<AnalysisRequest>, results: &Sender<AnalysisResult>)
where
    F: FnOnce() -> anyhow::Result<Box<dyn Detector>>,
{
    let mut detector = match load_detector() {
        Ok(d) => Some(d),
        Err(e) => {
            log::warn!("Layout detector unavailable, serving fallback analyses: {e:#}");
            None
        }
    };

    // Iteration drains remaining requests after the submit side closes,
    // then the thread exits.
    for request in requests.iter() {
        let page_w = request.input.page_w;
        let page_h = request.input.page_h;

        let analysis = match detector.as_mut() {
            Some(det) => match layout::analyze(det.as_mut(), &request.input) {
                Ok(analysis) => analysis,
                Err(e) => {
                    log::warn!("Analysis failed for page {}: {e:#}", request.page + 1);
                    layout::fallback_analysis(page_w, page_h)
                }
            },
            None => layout::fallback_analysis(page_w, page_h),
        };

        let sent = results.send(AnalysisResult {
            path: request.path,
            page: request.page,
            analysis,
        });
        if sent.is_err() {
            break; // UI context dropped its receiver
        }
    }
    log::info!("Analysis worker thread exiting");
}
