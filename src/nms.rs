//! Class-wise non-maximum suppression for detection boxes.

use crate::detect::DetectionBox;
use crate::geometry::iou;

/// Suppress duplicate boxes of the same class.
///
/// Boxes are sorted by descending confidence (stable sort, so input order
/// breaks ties deterministically); each kept box suppresses later
/// same-class boxes whose IoU against it exceeds `iou_thres`. Boxes of
/// different classes never suppress each other.
pub fn suppress_classwise(boxes: &[DetectionBox], iou_thres: f32) -> Vec<DetectionBox> {
    let mut sorted: Vec<DetectionBox> = boxes.to_vec();
    sorted.sort_by(|a, b| b.conf.partial_cmp(&a.conf).unwrap_or(std::cmp::Ordering::Equal));

    let mut removed = vec![false; sorted.len()];
    let mut kept = Vec::with_capacity(sorted.len());
    for i in 0..sorted.len() {
        if removed[i] {
            continue;
        }
        for j in (i + 1)..sorted.len() {
            if removed[j] || sorted[i].cls_id != sorted[j].cls_id {
                continue;
            }
            if iou(&sorted[i].rect, &sorted[j].rect) > iou_thres {
                removed[j] = true;
            }
        }
        kept.push(sorted[i].clone());
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    fn boxed(x: i32, conf: f32, cls_id: i32) -> DetectionBox {
        DetectionBox {
            rect: Rect::new(x, 0, 20, 20),
            conf,
            cls_id,
            cls_name: if cls_id == 0 { "person" } else { "object" }.to_string(),
        }
    }

    #[test]
    fn overlapping_same_class_keeps_higher_confidence() {
        let boxes = vec![boxed(0, 0.6, 0), boxed(2, 0.9, 0)];
        let kept = suppress_classwise(&boxes, 0.5);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].conf - 0.9).abs() < 1e-6);
    }

    #[test]
    fn different_classes_never_suppress() {
        let boxes = vec![boxed(0, 0.9, 0), boxed(0, 0.6, 1)];
        let kept = suppress_classwise(&boxes, 0.5);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn disjoint_boxes_survive() {
        let boxes = vec![boxed(0, 0.9, 0), boxed(100, 0.8, 0)];
        let kept = suppress_classwise(&boxes, 0.5);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn chain_suppression_is_greedy_from_top_score() {
        // b overlaps a heavily, c overlaps b but not a: a suppresses b,
        // then c survives because only kept boxes suppress.
        let a = boxed(0, 0.9, 0);
        let b = boxed(5, 0.8, 0);
        let c = boxed(18, 0.7, 0);
        let kept = suppress_classwise(&[a, b, c], 0.3);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].conf - 0.9).abs() < 1e-6);
        assert!((kept[1].conf - 0.7).abs() < 1e-6);
    }
}
