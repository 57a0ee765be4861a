//! Output-tensor decoding for YOLO-family detectors.
//!
//! Two layouts are supported, distinguished by the attribute count:
//!
//! - 5 attributes: single-class rows `[cx, cy, w, h, conf]`
//! - 6+ attributes: `[cx, cy, w, h]` + per-class scores; the 85-attribute
//!   COCO export carries a separate objectness row at index 4 that
//!   multiplies the class scores
//!
//! Tensors are attribute-major: attribute `a` of box `i` lives at
//! `data[a * num_boxes + i]`.

use crate::detect::result::RawDetection;

/// Decode an attribute-major `[1, attrs, boxes]` output tensor.
///
/// Rows below `conf_threshold` are dropped. This threshold is the
/// adapter-stage filter and is looser than the per-seat person/object
/// thresholds applied later by the classifier.
pub fn decode_output(
    data: &[f32],
    num_attrs: usize,
    num_boxes: usize,
    conf_threshold: f32,
) -> Vec<RawDetection> {
    if num_attrs < 5 || num_boxes == 0 || data.len() < num_attrs * num_boxes {
        return Vec::new();
    }

    let at = |attr: usize, i: usize| data[attr * num_boxes + i];
    let mut out = Vec::new();

    if num_attrs == 5 {
        // Single-class model; class id 0 is the person class by
        // convention.
        for i in 0..num_boxes {
            let conf = at(4, i);
            if conf >= conf_threshold {
                out.push(RawDetection {
                    cx: at(0, i),
                    cy: at(1, i),
                    w: at(2, i),
                    h: at(3, i),
                    conf,
                    cls_id: 0,
                });
            }
        }
        return out;
    }

    let has_objectness = num_attrs == 85;
    let cls_offset = if has_objectness { 5 } else { 4 };
    let num_classes = num_attrs - cls_offset;

    for i in 0..num_boxes {
        let objectness = if has_objectness { at(4, i) } else { 1.0 };
        let mut best_score = 0.0f32;
        let mut best_cls = -1i32;
        for c in 0..num_classes {
            let mut score = at(cls_offset + c, i);
            if has_objectness {
                score *= objectness;
            }
            if score > best_score {
                best_score = score;
                best_cls = c as i32;
            }
        }
        if best_cls >= 0 && best_score >= conf_threshold {
            out.push(RawDetection {
                cx: at(0, i),
                cy: at(1, i),
                w: at(2, i),
                h: at(3, i),
                conf: best_score,
                cls_id: best_cls,
            });
        }
    }
    out
}
