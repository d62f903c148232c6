// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/postprocess/nms.rs - 非极大值抑制
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use tracing::debug;

use crate::model::{BBox, Candidate};

/// 计算两个边界框的 IoU，任一框面积为 0 时返回 0
pub fn iou(a: &BBox, b: &BBox) -> f32 {
  let area_a = a.area();
  let area_b = b.area();
  if area_a <= 0.0 || area_b <= 0.0 {
    return 0.0;
  }

  let x1 = a.x1.max(b.x1);
  let y1 = a.y1.max(b.y1);
  let x2 = a.x2.min(b.x2);
  let y2 = a.y2.min(b.y2);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 贪心 NMS，不区分类别
#[derive(Debug, Clone, Copy)]
pub struct NmsSuppressor {
  iou_threshold: f32,
  score_floor: f32,
}

impl NmsSuppressor {
  /// `score_floor` 为 0 表示不做额外的分数过滤
  pub fn new(iou_threshold: f32, score_floor: f32) -> Self {
    Self {
      iou_threshold,
      score_floor,
    }
  }

  /// 按置信度降序排序，分数相同时按 [`Candidate::index`] 升序
  pub fn sort_by_score(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
      b.score()
        .total_cmp(&a.score())
        .then_with(|| a.index.cmp(&b.index))
    });
    candidates
  }

  /// 返回按置信度降序排列的保留集合
  ///
  /// 分数相同时按 [`Candidate::index`] 升序，输出与输入顺序无关。
  pub fn suppress(&self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    let total = candidates.len();
    candidates.retain(|c| c.score() >= self.score_floor);

    let candidates = Self::sort_by_score(candidates);

    let mut suppressed = vec![false; candidates.len()];
    let mut result = Vec::new();

    for i in 0..candidates.len() {
      if suppressed[i] {
        continue;
      }
      let best = candidates[i];
      result.push(best);

      for (j, other) in candidates.iter().enumerate().skip(i + 1) {
        if !suppressed[j] && iou(&best.bbox, &other.bbox) > self.iou_threshold {
          suppressed[j] = true;
        }
      }
    }

    debug!(
      "NMS (IoU 阈值 {}): {} -> {}",
      self.iou_threshold,
      total,
      result.len()
    );
    result
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Detection;

  fn cand(index: usize, bbox: BBox, score: f32) -> Candidate {
    Candidate {
      index,
      detection: Detection::from_bbox(&bbox, score, 0),
      bbox,
    }
  }

  fn indices(set: &[Candidate]) -> Vec<usize> {
    set.iter().map(|c| c.index).collect()
  }

  #[test]
  fn iou_of_identical_and_disjoint_boxes() {
    let a = BBox::new(0.0, 0.0, 10.0, 10.0);
    assert_eq!(iou(&a, &a), 1.0);
    assert_eq!(iou(&a, &BBox::new(20.0, 20.0, 30.0, 30.0)), 0.0);
    assert!((iou(&a, &BBox::new(5.0, 0.0, 15.0, 10.0)) - 1.0 / 3.0).abs() < 1e-6);
  }

  #[test]
  fn zero_area_box_never_overlaps() {
    let a = BBox::new(0.0, 0.0, 10.0, 10.0);
    let flat = BBox::new(2.0, 2.0, 8.0, 2.0);
    assert_eq!(iou(&a, &flat), 0.0);
    assert_eq!(iou(&flat, &flat), 0.0);
  }

  #[test]
  fn overlapping_lower_score_is_suppressed() {
    // 10x10 与 10x8 完全包含: IoU = 80 / 100 = 0.8
    let a = cand(0, BBox::new(0.0, 0.0, 10.0, 10.0), 0.9);
    let b = cand(1, BBox::new(0.0, 0.0, 10.0, 8.0), 0.6);
    assert!((iou(&a.bbox, &b.bbox) - 0.8).abs() < 1e-6);

    let out = NmsSuppressor::new(0.5, 0.0).suppress(vec![b, a]);
    assert_eq!(indices(&out), vec![0]);
  }

  #[test]
  fn iou_equal_to_threshold_is_kept() {
    let a = cand(0, BBox::new(0.0, 0.0, 10.0, 10.0), 0.9);
    let b = cand(1, BBox::new(0.0, 0.0, 10.0, 5.0), 0.6);
    let out = NmsSuppressor::new(0.5, 0.0).suppress(vec![a, b]);
    assert_eq!(indices(&out), vec![0, 1]);
  }

  #[test]
  fn output_is_score_descending() {
    let set = vec![
      cand(0, BBox::new(0.0, 0.0, 10.0, 10.0), 0.3),
      cand(1, BBox::new(100.0, 0.0, 110.0, 10.0), 0.8),
      cand(2, BBox::new(200.0, 0.0, 210.0, 10.0), 0.5),
    ];
    let out = NmsSuppressor::new(0.5, 0.0).suppress(set);
    assert_eq!(indices(&out), vec![1, 2, 0]);
  }

  #[test]
  fn score_floor_drops_weak_candidates() {
    let set = vec![
      cand(0, BBox::new(0.0, 0.0, 10.0, 10.0), 0.3),
      cand(1, BBox::new(100.0, 0.0, 110.0, 10.0), 0.8),
    ];
    let out = NmsSuppressor::new(0.5, 0.4).suppress(set);
    assert_eq!(indices(&out), vec![1]);
  }

  fn cluster() -> Vec<Candidate> {
    vec![
      cand(0, BBox::new(0.0, 0.0, 10.0, 10.0), 0.7),
      cand(1, BBox::new(1.0, 1.0, 11.0, 11.0), 0.9),
      cand(2, BBox::new(2.0, 0.0, 12.0, 10.0), 0.7),
      cand(3, BBox::new(50.0, 50.0, 60.0, 60.0), 0.7),
      cand(4, BBox::new(51.0, 50.0, 61.0, 60.0), 0.4),
      cand(5, BBox::new(100.0, 0.0, 104.0, 4.0), 0.7),
      cand(6, BBox::new(8.0, 8.0, 18.0, 18.0), 0.6),
    ]
  }

  #[test]
  fn suppression_is_idempotent() {
    let nms = NmsSuppressor::new(0.3, 0.0);
    let once = nms.suppress(cluster());
    let twice = nms.suppress(once.clone());
    assert_eq!(once, twice);
  }

  #[test]
  fn result_does_not_depend_on_input_order() {
    let nms = NmsSuppressor::new(0.3, 0.0);
    let expected = nms.suppress(cluster());

    let mut reversed = cluster();
    reversed.reverse();
    assert_eq!(nms.suppress(reversed), expected);

    // 固定步长的轮换置换
    let base = cluster();
    for shift in 1..base.len() {
      let permuted: Vec<Candidate> = (0..base.len())
        .map(|i| base[(i * 3 + shift) % base.len()])
        .collect();
      assert_eq!(nms.suppress(permuted), expected);
    }
  }

  #[test]
  fn equal_scores_fall_back_to_index() {
    let set = vec![
      cand(5, BBox::new(100.0, 0.0, 110.0, 10.0), 0.7),
      cand(2, BBox::new(0.0, 0.0, 10.0, 10.0), 0.7),
      cand(3, BBox::new(0.0, 0.0, 10.0, 10.0), 0.7),
    ];
    let out = NmsSuppressor::new(0.5, 0.0).suppress(set);
    assert_eq!(indices(&out), vec![2, 5]);
  }
}
