// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/postprocess/geometry.rs - 边界框到正方形与内切圆的映射
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

use std::f32::consts::PI;

use crate::model::{BBox, Circle, ImageSize, Square};

pub const DEFAULT_EDGE_FRACTION: f32 = 0.1;
pub const DEFAULT_POLYGON_POINTS: usize = 16;

/// 正方形的锚点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
  /// 固定右下角，正方形向左上方扩展（靠近左/上边缘时）
  BottomRight,
  /// 固定左上角，正方形向右下方扩展
  TopLeft,
}

/// 边缘感知的正方形映射
///
/// 被图像边缘截断的细胞，其可见边界框偏小；正方形朝边缘外扩展，以还原真实尺寸。
/// 结果不做边界裁剪。
#[derive(Debug, Clone, Copy)]
pub struct SquareCircleMapper {
  edge_fraction: f32,
}

impl Default for SquareCircleMapper {
  fn default() -> Self {
    Self::new(DEFAULT_EDGE_FRACTION)
  }
}

impl SquareCircleMapper {
  pub fn new(edge_fraction: f32) -> Self {
    Self { edge_fraction }
  }

  pub fn anchor(&self, bbox: &BBox, image: ImageSize) -> Anchor {
    let (w, h) = (image.width as f32, image.height as f32);
    let near_left = bbox.x1 < self.edge_fraction * w;
    let near_top = bbox.y1 < self.edge_fraction * h;

    // 左/上优先，靠近右/下边缘与内部框都走左上角锚点
    if near_left || near_top {
      Anchor::BottomRight
    } else {
      Anchor::TopLeft
    }
  }

  pub fn square(&self, bbox: &BBox, image: ImageSize) -> Square {
    let size = bbox.width().max(bbox.height());
    match self.anchor(bbox, image) {
      Anchor::BottomRight => Square {
        x: bbox.x2 - size,
        y: bbox.y2 - size,
        size,
      },
      Anchor::TopLeft => Square {
        x: bbox.x1,
        y: bbox.y1,
        size,
      },
    }
  }

  pub fn map(&self, bbox: &BBox, image: ImageSize) -> (Square, Circle) {
    let square = self.square(bbox, image);
    (square, square.inscribed_circle())
  }
}

impl Square {
  pub fn inscribed_circle(&self) -> Circle {
    let half = self.size / 2.0;
    Circle {
      center_x: self.x + half,
      center_y: self.y + half,
      radius: half,
    }
  }
}

impl Circle {
  pub fn diameter(&self) -> f32 {
    2.0 * self.radius
  }

  pub fn area(&self) -> f32 {
    PI * self.radius * self.radius
  }

  /// 等角间隔采样 `num_points` 个顶点，从 0 弧度开始
  pub fn polygon(&self, num_points: usize) -> Vec<[f32; 2]> {
    (0..num_points)
      .map(|k| {
        let angle = 2.0 * PI * k as f32 / num_points as f32;
        [
          self.center_x + self.radius * angle.cos(),
          self.center_y + self.radius * angle.sin(),
        ]
      })
      .collect()
  }
}
