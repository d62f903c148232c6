// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/model.rs - 检测结果数据模型
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

use serde::Serialize;

/// 原始图像尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageSize {
  pub width: u32,
  pub height: u32,
}

impl ImageSize {
  pub fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }
}

/// 中心点形式的检测
///
/// 由张量解码时坐标位于模型输入空间；由 [`Detection::from_bbox`] 构造时
/// 沿用边界框所在的原图空间。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub x_center: f32,
  pub y_center: f32,
  pub width: f32,
  pub height: f32,
  /// 置信度
  pub score: f32,
  /// 类别索引
  pub class_index: usize,
}

impl Detection {
  /// 由角点坐标构造检测，用于已解码的上游结果
  pub fn from_bbox(bbox: &BBox, score: f32, class_index: usize) -> Self {
    Self {
      x_center: (bbox.x1 + bbox.x2) / 2.0,
      y_center: (bbox.y1 + bbox.y2) / 2.0,
      width: bbox.width(),
      height: bbox.height(),
      score,
      class_index,
    }
  }
}

/// 轴对齐边界框 [x_min, y_min, x_max, y_max]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl BBox {
  pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  pub fn area(&self) -> f32 {
    self.width().max(0.0) * self.height().max(0.0)
  }

  /// 将坐标限制在 `[0, width] x [0, height]` 内
  pub fn clamp_to(&self, image: ImageSize) -> Self {
    let (w, h) = (image.width as f32, image.height as f32);
    Self {
      x1: self.x1.clamp(0.0, w),
      y1: self.y1.clamp(0.0, h),
      x2: self.x2.clamp(0.0, w),
      y2: self.y2.clamp(0.0, h),
    }
  }

  /// 宽或高不为正（包括 NaN）
  pub fn is_degenerate(&self) -> bool {
    !(self.width() > 0.0 && self.height() > 0.0)
  }
}

/// 通过置信度过滤后的候选：原始检测加上图像空间边界框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  /// 在来源中的位置（检测槽索引或解码列表索引）
  pub index: usize,
  pub detection: Detection,
  pub bbox: BBox,
}

impl Candidate {
  pub fn score(&self) -> f32 {
    self.detection.score
  }
}

/// 由边界框推导出的正方形，不做图像边界裁剪
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Square {
  pub x: f32,
  pub y: f32,
  pub size: f32,
}

/// 正方形的内切圆
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
  pub center_x: f32,
  pub center_y: f32,
  pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellLabel {
  Cell,
  Droplet,
}

impl CellLabel {
  pub fn as_str(&self) -> &'static str {
    match self {
      CellLabel::Cell => "cell",
      CellLabel::Droplet => "droplet",
    }
  }
}

impl std::fmt::Display for CellLabel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 完成几何变换与分类的检测
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedDetection {
  pub candidate: Candidate,
  pub square: Square,
  pub circle: Circle,
  /// 掩码像素数，或无掩码时的 `π·r²`
  pub area: f32,
  pub label: CellLabel,
  /// 圆的多边形近似，仅在配置了顶点数时生成
  pub polygon: Option<Vec<[f32; 2]>>,
}

impl ClassifiedDetection {
  pub fn confidence(&self) -> f32 {
    self.candidate.score()
  }
}

/// 单张图像的统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DetectStats {
  /// 通过置信度过滤的候选数
  pub num_candidates: usize,
  /// 被 NMS 抑制的候选数
  pub num_suppressed: usize,
  pub num_cells: usize,
  pub num_droplets: usize,
  /// 因策略被丢弃的液滴数
  pub num_droplets_dropped: usize,
  /// 已近似为正方形的边界框数 (|w - h| < 5)
  pub already_square: usize,
  /// 由矩形扩展为正方形的边界框数
  pub converted_to_square: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectResult {
  pub image: ImageSize,
  /// 按置信度降序排列
  pub items: Box<[ClassifiedDetection]>,
  pub stats: DetectStats,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn cells(&self) -> impl Iterator<Item = &ClassifiedDetection> {
    self.items.iter().filter(|d| d.label == CellLabel::Cell)
  }
}
