// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/postprocess/classify.rs - 细胞/液滴面积分类
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

use crate::model::CellLabel;

/// 细胞最小面积（像素）
pub const DEFAULT_MIN_CELL_AREA: f32 = 500.0;

/// 液滴在输出中的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DropletPolicy {
  /// 从结果中移除
  #[default]
  Drop,
  /// 保留并标记为液滴
  Keep,
}

#[derive(Debug, Clone, Copy)]
pub struct AreaClassifier {
  min_cell_area: f32,
}

impl Default for AreaClassifier {
  fn default() -> Self {
    Self::new(DEFAULT_MIN_CELL_AREA)
  }
}

impl AreaClassifier {
  pub fn new(min_cell_area: f32) -> Self {
    Self { min_cell_area }
  }

  pub fn classify(&self, area: f32) -> CellLabel {
    if area < self.min_cell_area {
      CellLabel::Droplet
    } else {
      CellLabel::Cell
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn boundary_area_is_a_cell() {
    let classifier = AreaClassifier::default();
    assert_eq!(classifier.classify(500.0), CellLabel::Cell);
    assert_eq!(classifier.classify(499.9), CellLabel::Droplet);
    assert_eq!(classifier.classify(10_000.0), CellLabel::Cell);
  }

  #[test]
  fn custom_threshold() {
    let classifier = AreaClassifier::new(50.0);
    assert_eq!(classifier.classify(49.0), CellLabel::Droplet);
    assert_eq!(classifier.classify(50.0), CellLabel::Cell);
  }

  #[test]
  fn drop_is_the_default_policy() {
    assert_eq!(DropletPolicy::default(), DropletPolicy::Drop);
  }
}
