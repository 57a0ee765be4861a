#![cfg(feature = "backend-tract")]

//! ONNX inference via tract.
//!
//! Loads one model, or a person-model + object-model pair for the legacy
//! two-model deployment, and decodes the attribute-major output tensor.
//! Session construction failure leaves the backend "not ready": `infer`
//! then returns empty lists so the classifier degrades instead of dying.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::decode::decode_output;
use crate::detect::result::RawDetection;
use crate::frame::Frame;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>>;

pub struct TractDetector {
    model: Option<RunnableModel>,
    /// Secondary object model for the legacy two-model strategy. Its
    /// class ids are offset past the primary model's single class.
    object_model: Option<RunnableModel>,
    input_size: u32,
    conf_threshold: f32,
}

impl TractDetector {
    /// Load a single (usually multiclass) model. A load failure is
    /// logged and leaves the detector not ready rather than erroring.
    pub fn single<P: AsRef<Path>>(model_path: P, input_size: u32, conf_threshold: f32) -> Self {
        let model = match load_model(model_path.as_ref(), input_size) {
            Ok(model) => Some(model),
            Err(e) => {
                log::warn!(
                    "detector session construction failed for {}: {e:#}; running degraded",
                    model_path.as_ref().display()
                );
                None
            }
        };
        Self {
            model,
            object_model: None,
            input_size,
            conf_threshold,
        }
    }

    /// Load the legacy person + object model pair.
    pub fn person_and_object<P: AsRef<Path>>(
        person_path: P,
        object_path: P,
        input_size: u32,
        conf_threshold: f32,
    ) -> Self {
        let mut detector = Self::single(person_path, input_size, conf_threshold);
        match load_model(object_path.as_ref(), input_size) {
            Ok(model) => detector.object_model = Some(model),
            Err(e) => log::warn!(
                "object model session construction failed for {}: {e:#}; person model only",
                object_path.as_ref().display()
            ),
        }
        detector
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let size = self.input_size;
        if frame.width() != size || frame.height() != size {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                frame.width(),
                frame.height(),
                size,
                size
            ));
        }
        let pixels = frame.pixels();
        let width = size as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, width, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );
        Ok(input.into_tensor())
    }

    fn run_one(&self, model: &RunnableModel, input: Tensor, cls_id_base: i32) -> Result<Vec<RawDetection>> {
        let outputs = model.run(tvec!(input.into())).context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape();
        let (num_attrs, num_boxes) = match shape.len() {
            3 => (shape[1], shape[2]),
            2 => (shape[0], shape[1]),
            _ => return Err(anyhow!("unexpected output rank {}", shape.len())),
        };
        let data: Vec<f32> = view.iter().copied().collect();
        let mut dets = decode_output(&data, num_attrs, num_boxes, self.conf_threshold);
        if cls_id_base != 0 {
            for det in &mut dets {
                det.cls_id += cls_id_base;
            }
        }
        Ok(dets)
    }
}

impl DetectorBackend for TractDetector {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let Some(model) = &self.model else {
            return Ok(Vec::new());
        };
        let input = self.build_input(frame)?;
        let mut dets = self.run_one(model, input.clone(), 0)?;
        if let Some(object_model) = &self.object_model {
            // Object classes sit after the primary model's person class.
            match self.run_one(object_model, input, 1) {
                Ok(mut object_dets) => dets.append(&mut object_dets),
                Err(e) => log::warn!("object model inference failed: {e:#}"),
            }
        }
        Ok(dets)
    }
}

fn load_model(path: &Path, input_size: u32) -> Result<RunnableModel> {
    tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to load ONNX model from {}", path.display()))?
        .with_input_fact(
            0,
            InferenceFact::dt_shape(
                f32::datum_type(),
                tvec!(1, 3, input_size as usize, input_size as usize),
            ),
        )
        .context("failed to set input fact")?
        .into_optimized()
        .context("failed to optimize ONNX model")?
        .into_runnable()
        .context("failed to build runnable ONNX model")
}
