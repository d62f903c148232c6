// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/postprocess/filter.rs - 置信度过滤
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

use crate::model::{BBox, Candidate, Detection, ImageSize};

/// 模型输入空间到原图空间的缩放系数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
  pub x: f32,
  pub y: f32,
}

impl Scale {
  pub const IDENTITY: Scale = Scale { x: 1.0, y: 1.0 };

  /// `original / model`，水平与垂直方向相互独立
  pub fn between(original: ImageSize, model_width: u32, model_height: u32) -> Self {
    Self {
      x: original.width as f32 / model_width as f32,
      y: original.height as f32 / model_height as f32,
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub struct ConfidenceFilter {
  threshold: f32,
}

impl ConfidenceFilter {
  pub fn new(threshold: f32) -> Self {
    Self { threshold }
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  /// 低于阈值或为 NaN 的分数都不通过
  pub fn passes(&self, score: f32) -> bool {
    score >= self.threshold
  }

  /// 过滤原始检测并换算到原图坐标，保持检测槽顺序
  pub fn filter(&self, detections: &[Detection], scale: Scale, image: ImageSize) -> Vec<Candidate> {
    let candidates: Vec<Candidate> = detections
      .iter()
      .enumerate()
      .filter(|(_, det)| self.passes(det.score))
      .filter_map(|(index, det)| {
        let half_w = det.width / 2.0;
        let half_h = det.height / 2.0;
        let bbox = BBox::new(
          (det.x_center - half_w) * scale.x,
          (det.y_center - half_h) * scale.y,
          (det.x_center + half_w) * scale.x,
          (det.y_center + half_h) * scale.y,
        )
        .clamp_to(image);

        if bbox.is_degenerate() {
          return None;
        }

        Some(Candidate {
          index,
          detection: *det,
          bbox,
        })
      })
      .collect();

    debug!(
      "置信度过滤 (阈值 {}): {} -> {}",
      self.threshold,
      detections.len(),
      candidates.len()
    );
    candidates
  }

  /// 过滤上游已解码的检测，边界框已处于原图坐标
  pub fn filter_boxes<I>(&self, boxes: I, image: ImageSize) -> Vec<Candidate>
  where
    I: IntoIterator<Item = (BBox, f32, usize)>,
  {
    boxes
      .into_iter()
      .enumerate()
      .filter(|(_, (_, score, _))| self.passes(*score))
      .filter_map(|(index, (bbox, score, class_index))| {
        let bbox = bbox.clamp_to(image);
        if bbox.is_degenerate() {
          return None;
        }
        Some(Candidate {
          index,
          detection: Detection::from_bbox(&bbox, score, class_index),
          bbox,
        })
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn det(xc: f32, yc: f32, w: f32, h: f32, score: f32) -> Detection {
    Detection {
      x_center: xc,
      y_center: yc,
      width: w,
      height: h,
      score,
      class_index: 0,
    }
  }

  const IMAGE: ImageSize = ImageSize {
    width: 1280,
    height: 960,
  };

  #[test]
  fn scales_boxes_independently_per_axis() {
    let scale = Scale::between(IMAGE, 640, 640);
    assert_eq!(scale, Scale { x: 2.0, y: 1.5 });

    let out = ConfidenceFilter::new(0.25).filter(&[det(320.0, 320.0, 40.0, 20.0, 0.9)], scale, IMAGE);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].bbox, BBox::new(600.0, 465.0, 680.0, 495.0));
    assert_eq!(out[0].index, 0);
  }

  #[test]
  fn threshold_is_inclusive() {
    let f = ConfidenceFilter::new(0.5);
    let dets = [det(50.0, 50.0, 10.0, 10.0, 0.5), det(80.0, 80.0, 10.0, 10.0, 0.49)];
    let out = f.filter(&dets, Scale::IDENTITY, IMAGE);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].score(), 0.5);
  }

  #[test]
  fn nan_scores_are_dropped() {
    let out = ConfidenceFilter::new(0.0).filter(
      &[det(50.0, 50.0, 10.0, 10.0, f32::NAN)],
      Scale::IDENTITY,
      IMAGE,
    );
    assert!(out.is_empty());
  }

  #[test]
  fn clamps_into_image_and_drops_degenerate() {
    let dets = [
      // 超出左上角，裁剪后仍有面积
      det(0.0, 0.0, 20.0, 20.0, 0.9),
      // 完全位于图像右侧之外，裁剪后宽度为 0
      det(1400.0, 100.0, 20.0, 20.0, 0.9),
      // 宽度为 0
      det(100.0, 100.0, 0.0, 20.0, 0.9),
    ];
    let out = ConfidenceFilter::new(0.1).filter(&dets, Scale::IDENTITY, IMAGE);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].bbox, BBox::new(0.0, 0.0, 10.0, 10.0));
  }

  #[test]
  fn keeps_slot_order_and_indices() {
    let dets = [
      det(10.0, 10.0, 4.0, 4.0, 0.3),
      det(20.0, 20.0, 4.0, 4.0, 0.1),
      det(30.0, 30.0, 4.0, 4.0, 0.9),
    ];
    let out = ConfidenceFilter::new(0.2).filter(&dets, Scale::IDENTITY, IMAGE);
    let indices: Vec<usize> = out.iter().map(|c| c.index).collect();
    assert_eq!(indices, vec![0, 2]);
  }

  #[test]
  fn raising_threshold_never_grows_the_survivors() {
    let dets: Vec<Detection> = (0..50)
      .map(|i| det(10.0 + i as f32 * 5.0, 100.0, 8.0, 8.0, (i as f32 * 0.37) % 1.0))
      .collect();
    let mut previous: Option<Vec<usize>> = None;
    for step in 0..=10 {
      let t = step as f32 / 10.0;
      let survivors: Vec<usize> = ConfidenceFilter::new(t)
        .filter(&dets, Scale::IDENTITY, IMAGE)
        .iter()
        .map(|c| c.index)
        .collect();
      if let Some(prev) = &previous {
        assert!(survivors.iter().all(|i| prev.contains(i)));
      }
      previous = Some(survivors);
    }
  }

  #[test]
  fn decoded_boxes_use_same_rules() {
    let boxes = vec![
      (BBox::new(-5.0, 10.0, 30.0, 40.0), 0.8, 1),
      (BBox::new(10.0, 10.0, 10.0, 40.0), 0.8, 0),
      (BBox::new(10.0, 10.0, 20.0, 40.0), 0.1, 0),
    ];
    let out = ConfidenceFilter::new(0.25).filter_boxes(boxes, IMAGE);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].bbox, BBox::new(0.0, 10.0, 30.0, 40.0));
    assert_eq!(out[0].detection.class_index, 1);
    assert_eq!(out[0].index, 0);
  }
}
