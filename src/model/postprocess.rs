// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/postprocess.rs - 检测框阈值过滤与非极大值抑制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use tracing::debug;

use crate::model::{BoundingBox, DetectParams};

/// 置信度过滤、同类 NMS 和数量上限
///
/// 返回结果按置信度降序排列。
pub fn filter_boxes(mut boxes: Vec<BoundingBox>, params: &DetectParams) -> Vec<BoundingBox> {
  let before = boxes.len();
  boxes.retain(|b| b.is_valid() && b.score >= params.conf_threshold);
  let mut kept = non_max_suppression(boxes, params.iou_threshold);
  kept.truncate(params.max_detections);
  debug!("检测框后处理: {} -> {}", before, kept.len());
  kept
}

/// 非极大值抑制
///
/// 同一类别中与已保留框 IoU 大于阈值的框被抑制，不同类别互不影响。
pub fn non_max_suppression(mut boxes: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
  // 按置信度降序排序
  boxes.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut result: Vec<BoundingBox> = Vec::with_capacity(boxes.len());
  for candidate in boxes {
    let suppressed = result
      .iter()
      .any(|kept| kept.class_id == candidate.class_id && kept.iou(&candidate) > iou_threshold);
    if !suppressed {
      result.push(candidate);
    }
  }

  result
}

#[cfg(test)]
mod tests {
  use super::*;

  fn bbox(x: f32, y: f32, w: f32, h: f32, class_id: u32, score: f32) -> BoundingBox {
    BoundingBox::new(x, y, x + w, y + h, class_id, score)
  }

  #[test]
  fn low_confidence_boxes_are_dropped() {
    let params = DetectParams::default();
    let boxes = vec![
      bbox(0.0, 0.0, 10.0, 10.0, 0, 0.49),
      bbox(50.0, 50.0, 10.0, 10.0, 0, 0.5),
      bbox(100.0, 100.0, 10.0, 10.0, 0, 0.9),
    ];
    let kept = filter_boxes(boxes, &params);
    assert_eq!(kept.len(), 2);
    assert!(kept.iter().all(|b| b.score >= params.conf_threshold));
    assert_eq!(kept[0].score, 0.9);
  }

  #[test]
  fn overlapping_same_class_keeps_highest_score() {
    let low = bbox(0.0, 0.0, 100.0, 40.0, 0, 0.7);
    let high = bbox(5.0, 2.0, 100.0, 40.0, 0, 0.95);
    assert!(low.iou(&high) > 0.4);

    let kept = non_max_suppression(vec![low, high], 0.4);
    assert_eq!(kept, vec![high]);
  }

  #[test]
  fn overlapping_different_classes_both_survive() {
    let a = bbox(0.0, 0.0, 100.0, 40.0, 0, 0.7);
    let b = bbox(5.0, 2.0, 100.0, 40.0, 1, 0.95);
    assert_eq!(non_max_suppression(vec![a, b], 0.4).len(), 2);
  }

  #[test]
  fn iou_at_threshold_is_not_suppressed() {
    // IoU = 50 / 150 = 1/3
    let a = bbox(0.0, 0.0, 10.0, 10.0, 0, 0.9);
    let b = bbox(5.0, 0.0, 10.0, 10.0, 0, 0.8);
    let iou = a.iou(&b);
    assert_eq!(non_max_suppression(vec![a, b], iou).len(), 2);
    assert_eq!(non_max_suppression(vec![a, b], iou - 0.01).len(), 1);
  }

  #[test]
  fn max_detections_keeps_best_boxes() {
    let params = DetectParams {
      max_detections: 2,
      ..DetectParams::default()
    };
    let boxes = (0..5)
      .map(|i| bbox(i as f32 * 50.0, 0.0, 20.0, 10.0, 0, 0.6 + i as f32 * 0.05))
      .collect();
    let kept = filter_boxes(boxes, &params);
    assert_eq!(kept.len(), 2);
    assert!((kept[0].score - 0.8).abs() < 1e-6);
    assert!((kept[1].score - 0.75).abs() < 1e-6);
  }

  #[test]
  fn invalid_boxes_never_survive() {
    let boxes = vec![
      BoundingBox::new(10.0, 10.0, 5.0, 20.0, 0, 0.9),
      BoundingBox::new(0.0, 0.0, f32::INFINITY, 20.0, 0, 0.9),
    ];
    assert!(filter_boxes(boxes, &DetectParams::default()).is_empty());
  }
}
