//! Synthetic detector backends.
//!
//! `StubDetector` emits pseudo-random person/object boxes from a seeded
//! generator so the full pipeline runs without model weights.
//! `ScriptedDetector` replays a fixed per-frame script and is the
//! workhorse of classifier tests.

use std::collections::VecDeque;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;
use crate::frame::Frame;

pub struct StubDetector {
    rng: StdRng,
    input_size: u32,
}

impl StubDetector {
    pub fn new(input_size: u32, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            input_size,
        }
    }
}

impl DetectorBackend for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn infer(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
        let size = self.input_size as f32;
        let mut dets = Vec::new();
        if self.rng.gen::<f32>() > 0.4 {
            dets.push(RawDetection {
                cx: self.rng.gen::<f32>() * size,
                cy: self.rng.gen::<f32>() * size,
                w: 80.0,
                h: 120.0,
                conf: 0.82,
                cls_id: 0,
            });
        }
        if self.rng.gen::<f32>() > 0.7 {
            dets.push(RawDetection {
                cx: self.rng.gen::<f32>() * size,
                cy: self.rng.gen::<f32>() * size,
                w: 60.0,
                h: 40.0,
                conf: 0.63,
                cls_id: 1,
            });
        }
        Ok(dets)
    }
}

/// Replays a queued script of per-frame detection lists, then returns
/// empty lists once the script is exhausted.
pub struct ScriptedDetector {
    input_size: u32,
    script: VecDeque<Vec<RawDetection>>,
}

impl ScriptedDetector {
    pub fn new(input_size: u32, script: Vec<Vec<RawDetection>>) -> Self {
        Self {
            input_size,
            script: script.into(),
        }
    }
}

impl DetectorBackend for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn infer(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
        Ok(self.script.pop_front().unwrap_or_default())
    }
}
