//! railview - coordination core of a low-vision PDF reader
//!
//! Above a zoom threshold the viewport locks onto detected text blocks and
//! advances line by line with snap animations ("rail mode"). This crate
//! holds the pieces that make that work: the layout-analysis pipeline, the
//! rail navigation state machine, the background analysis worker, the
//! camera and raster-tier model, and the frame scheduler that coordinates
//! them. The GUI shell, the PDF engine, and the detection model sit behind
//! the seams in `doc` and `detector`.

pub mod camera;
pub mod classes;
pub mod colour;
pub mod config;
pub mod detector;
pub mod doc;
pub mod geometry;
pub mod layout;
pub mod rail;
pub mod scheduler;
pub mod tab;
pub mod worker;

pub mod test_utils;

pub use camera::Camera;
pub use config::Config;
pub use geometry::{BBox, Viewport};
pub use layout::{LayoutBlock, LineInfo, PageAnalysis};
pub use rail::{NavOutcome, RailNav, ScrollDir};
pub use scheduler::{FrameOutcome, FrameScheduler, Invalidation, Wake};
pub use tab::TabState;
pub use worker::AnalysisWorker;
