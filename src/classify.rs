//! Per-frame occupancy classifier.
//!
//! Fuses three signals into one `SeatFrameSnapshot` per seat per frame:
//! detector boxes (after letterbox inversion and class-wise NMS), the
//! foreground ratio from the background model, and seat geometry.
//! Every known seat gets a snapshot on every frame, evidence or not,
//! so the judger downstream never sees a silent gap.

use std::time::Instant;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::detect::{letterbox, DetectionBox, DetectorBackend};
use crate::frame::Frame;
use crate::geometry::{box_in_polygon, iou};
use crate::motion::{BackgroundConfig, BackgroundModel, ForegroundMask};
use crate::seats::{SeatDefinition, SeatRegistry};
use crate::snapshot::{state_hash, Snapshotter};
use crate::{OccupancyState, SeatFrameSnapshot};

/// Thresholds and class policy for the classifier. Defaults mirror a
/// tuned indoor-camera deployment.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// A seat "has a person" only above this confidence.
    pub conf_thres_person: f32,
    /// Marginal person boxes between the low and high threshold are kept
    /// in the box lists but do not set `has_person` on their own.
    pub conf_thres_person_low: f32,
    pub conf_thres_object: f32,
    /// Class-wise NMS IoU; zero disables suppression.
    pub nms_iou: f32,
    /// Rectangle-fallback seat assignment threshold.
    pub iou_seat_intersect: f32,
    /// Foreground-ratio fallback when the detector is silent.
    pub fg_ratio_thres: f32,
    /// Object class names that count as seat-squatting evidence.
    pub object_allow: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            conf_thres_person: 0.65,
            conf_thres_person_low: 0.50,
            conf_thres_object: 0.361,
            nms_iou: 0.55,
            iou_seat_intersect: 0.40,
            fg_ratio_thres: 0.08,
            object_allow: [
                "laptop", "pad", "bag", "book", "phone", "bottle", "clothes", "umbrella",
                "other", "backpack",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Occupancy precedence, as a pure function of the per-seat evidence.
///
/// Person beats object; a foreground ratio above the fallback threshold
/// counts as weak object evidence when both detector signals are quiet.
pub fn occupancy_from_evidence(
    has_person: bool,
    has_object: bool,
    fg_ratio: f32,
    fg_ratio_thres: f32,
) -> OccupancyState {
    if has_person {
        OccupancyState::Person
    } else if has_object {
        OccupancyState::ObjectOnly
    } else if fg_ratio >= fg_ratio_thres {
        OccupancyState::ObjectOnly
    } else {
        OccupancyState::Free
    }
}

pub struct FrameClassifier {
    cfg: ClassifierConfig,
    seats: SeatRegistry,
    background: BackgroundModel,
    detector: Box<dyn DetectorBackend>,
    snapshotter: Option<Snapshotter>,
    last_persons: Vec<DetectionBox>,
    last_objects: Vec<DetectionBox>,
}

impl FrameClassifier {
    pub fn new(
        cfg: ClassifierConfig,
        seats: SeatRegistry,
        detector: Box<dyn DetectorBackend>,
        snapshotter: Option<Snapshotter>,
    ) -> Self {
        Self {
            cfg,
            seats,
            background: BackgroundModel::new(BackgroundConfig::default()),
            detector,
            snapshotter,
            last_persons: Vec::new(),
            last_objects: Vec::new(),
        }
    }

    pub fn seat_count(&self) -> usize {
        self.seats.len()
    }

    /// Person and object boxes of the most recently processed frame,
    /// frame-wide rather than per seat. Useful for annotation tooling.
    pub fn last_detections(&self) -> (&[DetectionBox], &[DetectionBox]) {
        (&self.last_persons, &self.last_objects)
    }

    /// Classify one frame. Frames must arrive in temporal order from a
    /// single source; the background model state evolves on every call.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        ts_ms: i64,
        frame_index: i64,
    ) -> Result<Vec<SeatFrameSnapshot>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        let t0 = Instant::now();

        let mask = self.background.apply(frame)?;

        let (letterboxed, transform) = letterbox(frame, self.detector.input_size());
        let t_pre_ms = t0.elapsed().as_millis() as i32;

        let t_inf_start = Instant::now();
        let raw = match self.detector.infer(&letterboxed) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("inference failed at frame {frame_index}: {e:#}");
                Vec::new()
            }
        };
        let t_inf_ms = t_inf_start.elapsed().as_millis() as i32;

        let t_post_start = Instant::now();
        let mut boxes: Vec<DetectionBox> = raw
            .iter()
            .map(|det| DetectionBox {
                rect: transform.unmap(det),
                conf: det.conf,
                cls_id: det.cls_id,
                cls_name: self.class_name(det.cls_id),
            })
            .collect();

        let nms_iou = self.cfg.nms_iou.clamp(0.0, 1.0);
        if !boxes.is_empty() && nms_iou > 0.0 {
            boxes = crate::nms::suppress_classwise(&boxes, nms_iou);
        }

        let (persons, objects): (Vec<_>, Vec<_>) = boxes
            .into_iter()
            .filter(|b| b.cls_name == "person" || self.is_allowed_object(&b.cls_name))
            .partition(|b| b.cls_name == "person");

        let mut out = Vec::with_capacity(self.seats.len());
        for seat in self.seats.seats() {
            let mut snap = self.classify_seat(seat, &persons, &objects, &mask);
            snap.ts_ms = ts_ms;
            snap.frame_index = frame_index;
            snap.t_pre_ms = t_pre_ms;
            snap.t_inf_ms = t_inf_ms;

            if let Some(snapshotter) = &mut self.snapshotter {
                let hash = state_hash(
                    snap.occupancy_state.ordinal(),
                    snap.person_count,
                    snap.object_count,
                );
                snap.snapshot_path = snapshotter.maybe_save(snap.seat_id, hash, ts_ms, frame);
            }
            out.push(snap);
        }

        let t_post_ms = t_post_start.elapsed().as_millis() as i32;
        for snap in &mut out {
            snap.t_post_ms = t_post_ms;
        }
        self.last_persons = persons;
        self.last_objects = objects;
        Ok(out)
    }

    fn classify_seat(
        &self,
        seat: &SeatDefinition,
        persons: &[DetectionBox],
        objects: &[DetectionBox],
        mask: &ForegroundMask,
    ) -> SeatFrameSnapshot {
        let mut snap = SeatFrameSnapshot {
            seat_id: seat.seat_id,
            seat_roi: seat.rect,
            seat_poly: seat.polygon.clone(),
            occupancy_state: OccupancyState::Unknown,
            ..SeatFrameSnapshot::default()
        };

        for p in persons {
            if self.box_in_seat(seat, p) && p.conf >= self.cfg.conf_thres_person_low {
                snap.person_conf_max = snap.person_conf_max.max(p.conf);
                snap.person_boxes.push(p.clone());
            }
        }
        for o in objects {
            if self.box_in_seat(seat, o) {
                snap.object_conf_max = snap.object_conf_max.max(o.conf);
                snap.object_boxes.push(o.clone());
            }
        }

        snap.fg_ratio = if seat.has_polygon() {
            mask.ratio_in_polygon(&seat.polygon)
        } else {
            mask.ratio_in_rect(&seat.rect)
        };
        snap.person_count = snap.person_boxes.len() as u32;
        snap.object_count = snap.object_boxes.len() as u32;
        snap.has_person =
            snap.person_count > 0 && snap.person_conf_max >= self.cfg.conf_thres_person;
        snap.has_object =
            snap.object_count > 0 && snap.object_conf_max >= self.cfg.conf_thres_object;
        snap.occupancy_state = occupancy_from_evidence(
            snap.has_person,
            snap.has_object,
            snap.fg_ratio,
            self.cfg.fg_ratio_thres,
        );
        snap
    }

    fn box_in_seat(&self, seat: &SeatDefinition, b: &DetectionBox) -> bool {
        if seat.has_polygon() {
            box_in_polygon(&seat.polygon, &b.rect)
        } else {
            iou(&seat.rect, &b.rect) > self.cfg.iou_seat_intersect
        }
    }

    fn class_name(&self, cls_id: i32) -> String {
        if cls_id == 0 {
            return "person".to_string();
        }
        self.cfg
            .object_allow
            .get((cls_id - 1) as usize)
            .cloned()
            .unwrap_or_else(|| "object".to_string())
    }

    fn is_allowed_object(&self, name: &str) -> bool {
        name == "object" || self.cfg.object_allow.iter().any(|a| a == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::stub::ScriptedDetector;
    use crate::detect::RawDetection;
    use crate::geometry::Rect;

    fn single_seat_registry() -> SeatRegistry {
        SeatRegistry::new(vec![SeatDefinition {
            seat_id: 1,
            rect: Rect::new(0, 0, 64, 64),
            polygon: Vec::new(),
        }])
    }

    // A raw detection covering the whole 64x64 input maps onto the seat
    // rectangle with IoU 1.0.
    fn full_frame_det(conf: f32, cls_id: i32) -> RawDetection {
        RawDetection {
            cx: 32.0,
            cy: 32.0,
            w: 64.0,
            h: 64.0,
            conf,
            cls_id,
        }
    }

    fn classifier(script: Vec<Vec<RawDetection>>) -> FrameClassifier {
        FrameClassifier::new(
            ClassifierConfig::default(),
            single_seat_registry(),
            Box::new(ScriptedDetector::new(64, script)),
            None,
        )
    }

    #[test]
    fn precedence_person_beats_object() {
        assert_eq!(
            occupancy_from_evidence(true, true, 0.0, 0.08),
            OccupancyState::Person
        );
        assert_eq!(
            occupancy_from_evidence(false, true, 0.0, 0.08),
            OccupancyState::ObjectOnly
        );
        assert_eq!(
            occupancy_from_evidence(false, false, 0.5, 0.08),
            OccupancyState::ObjectOnly
        );
        assert_eq!(
            occupancy_from_evidence(false, false, 0.01, 0.08),
            OccupancyState::Free
        );
    }

    #[test]
    fn every_seat_gets_a_snapshot_even_without_evidence() {
        let mut c = classifier(vec![vec![]]);
        let frame = Frame::black(64, 64);
        let snaps = c.process_frame(&frame, 1_000, 0).unwrap();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].seat_id, 1);
        assert_eq!(snaps[0].occupancy_state, OccupancyState::Free);
        assert_eq!(snaps[0].person_count, 0);
    }

    #[test]
    fn confident_person_in_seat_sets_person_state() {
        let mut c = classifier(vec![vec![full_frame_det(0.9, 0)]]);
        let frame = Frame::black(64, 64);
        let snaps = c.process_frame(&frame, 1_000, 0).unwrap();
        assert!(snaps[0].has_person);
        assert_eq!(snaps[0].occupancy_state, OccupancyState::Person);
        assert_eq!(snaps[0].person_count, 1);
        let (persons, objects) = c.last_detections();
        assert_eq!(persons.len(), 1);
        assert!(objects.is_empty());
    }

    #[test]
    fn marginal_person_is_recorded_but_not_confident() {
        // Between the low and high person thresholds.
        let mut c = classifier(vec![vec![full_frame_det(0.55, 0)]]);
        let frame = Frame::black(64, 64);
        let snaps = c.process_frame(&frame, 1_000, 0).unwrap();
        assert_eq!(snaps[0].person_count, 1);
        assert!(!snaps[0].has_person);
        assert_eq!(snaps[0].occupancy_state, OccupancyState::Free);
    }

    #[test]
    fn object_without_person_is_object_only() {
        let mut c = classifier(vec![vec![full_frame_det(0.6, 1)]]);
        let frame = Frame::black(64, 64);
        let snaps = c.process_frame(&frame, 1_000, 0).unwrap();
        assert!(snaps[0].has_object);
        assert!(!snaps[0].has_person);
        assert_eq!(snaps[0].occupancy_state, OccupancyState::ObjectOnly);
        assert_eq!(snaps[0].object_boxes[0].cls_name, "laptop");
    }

    #[test]
    fn detector_error_degrades_to_free() {
        struct Failing;
        impl DetectorBackend for Failing {
            fn name(&self) -> &'static str {
                "failing"
            }
            fn input_size(&self) -> u32 {
                64
            }
            fn infer(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
                anyhow::bail!("boom")
            }
        }
        let mut c = FrameClassifier::new(
            ClassifierConfig::default(),
            single_seat_registry(),
            Box::new(Failing),
            None,
        );
        let frame = Frame::black(64, 64);
        let snaps = c.process_frame(&frame, 1_000, 0).unwrap();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].occupancy_state, OccupancyState::Free);
    }
}
