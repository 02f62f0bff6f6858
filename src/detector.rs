//! Layout detector seam
//!
//! The core consumes the detector through a narrow trait so the analysis
//! pipeline, the worker, and the tests do not depend on the inference
//! runtime. The shipped implementation wraps an ONNX Runtime session.

use std::path::Path;

use anyhow::Result;
use ort::session::Session;
use ort::value::TensorRef;

use crate::layout::INPUT_SIZE;

/// A rank-2 `[rows, cols]` float tensor from the detector, `cols >= 6`.
///
/// Columns: `[class_id, confidence, xmin, ymin, xmax, ymax, order?]`, with
/// coordinates in the coarse pixmap's pixel space.
#[derive(Clone, Debug)]
pub struct Detections {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Detections {
    #[must_use]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }
}

/// A loaded layout-detection model.
///
/// `run` returns `None` when the model produced no rank-2 output with at
/// least 6 columns; callers treat that as an empty page.
pub trait Detector: Send {
    fn run(
        &mut self,
        im_shape: [f32; 2],
        image: &[f32],
        scale_factor: [f32; 2],
    ) -> Result<Option<Detections>>;
}

/// ONNX Runtime backed detector.
pub struct OnnxDetector {
    session: Session,
}

impl OnnxDetector {
    /// Load the model from disk. Fails when the file is missing or the
    /// session cannot be built; callers fall back to synthetic analyses.
    pub fn load(path: &Path) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .commit_from_file(path)?;
        log::info!("Loaded layout model from {}", path.display());
        Ok(Self { session })
    }
}

impl Detector for OnnxDetector {
    fn run(
        &mut self,
        im_shape: [f32; 2],
        image: &[f32],
        scale_factor: [f32; 2],
    ) -> Result<Option<Detections>> {
        let size = INPUT_SIZE as i64;
        let im_shape_t = TensorRef::from_array_view(([1i64, 2], im_shape.as_slice()))?;
        let image_t = TensorRef::from_array_view(([1i64, 3, size, size], image))?;
        let scale_t = TensorRef::from_array_view(([1i64, 2], scale_factor.as_slice()))?;

        let outputs = self.session.run(ort::inputs![im_shape_t, image_t, scale_t])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

        if shape.len() != 2 || (shape[1] as usize) < 6 {
            log::warn!("Detector output has unusable shape {shape:?}");
            return Ok(None);
        }

        Ok(Some(Detections {
            rows: shape[0] as usize,
            cols: shape[1] as usize,
            data: data.to_vec(),
        }))
    }
}
