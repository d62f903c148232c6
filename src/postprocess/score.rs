// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/postprocess/score.rs - 检测槽分数提取
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

use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::{
  model::Detection,
  tensor::{BBOX_FEATURES, TensorView},
};

/// 阈值判断前对最高类别分数施加的变换
///
/// 没有默认值：上游分数是概率还是 logits 必须由调用方显式指定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreActivation {
  /// 分数已位于 0~1 区间，原样使用
  Identity,
  /// 分数为 logits，先做 logistic 变换
  Sigmoid,
}

impl ScoreActivation {
  pub fn apply(self, x: f32) -> f32 {
    match self {
      ScoreActivation::Identity => x,
      ScoreActivation::Sigmoid => sigmoid(x),
    }
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("未知的分数激活函数: {0}, 可选值为 identity 或 sigmoid")]
pub struct ParseActivationError(String);

impl FromStr for ScoreActivation {
  type Err = ParseActivationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "identity" | "none" => Ok(ScoreActivation::Identity),
      "sigmoid" | "logistic" => Ok(ScoreActivation::Sigmoid),
      _ => Err(ParseActivationError(s.to_string())),
    }
  }
}

pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 从每个检测槽读取边界框和类别分数
///
/// 只扫描 `[4, 4 + num_class_features)` 这段通道；分割模型中其后的通道是掩码系数，
/// 不参与类别判断。
#[derive(Debug, Clone, Copy)]
pub struct ScoreExtractor {
  num_class_features: Option<usize>,
  activation: ScoreActivation,
}

impl ScoreExtractor {
  /// `num_class_features` 为 `None` 时使用边界框之后的全部通道
  pub fn new(num_class_features: Option<usize>, activation: ScoreActivation) -> Self {
    Self {
      num_class_features,
      activation,
    }
  }

  fn class_range(&self, view: &TensorView) -> std::ops::Range<usize> {
    let available = view.features() - BBOX_FEATURES;
    let count = self
      .num_class_features
      .map_or(available, |n| n.min(available));
    BBOX_FEATURES..BBOX_FEATURES + count
  }

  pub fn extract(&self, view: &TensorView, slot: usize) -> Detection {
    self.extract_in(view, self.class_range(view), slot)
  }

  fn extract_in(&self, view: &TensorView, range: std::ops::Range<usize>, slot: usize) -> Detection {
    let start = range.start;
    let (score, class_index) = {
      let mut max_score = f32::MIN;
      let mut cls_idx = 0usize;
      for feature in range {
        let score = view.value(feature, slot);
        if score > max_score {
          max_score = score;
          cls_idx = feature - start;
        }
      }
      (self.activation.apply(max_score), cls_idx)
    };

    Detection {
      x_center: view.value(0, slot),
      y_center: view.value(1, slot),
      width: view.value(2, slot),
      height: view.value(3, slot),
      score,
      class_index,
    }
  }

  /// 按检测槽顺序解码全部检测
  pub fn extract_all(&self, view: &TensorView) -> Vec<Detection> {
    let range = self.class_range(view);
    debug!(
      "解码 {} 个检测槽, 类别通道 {:?}, 激活函数 {:?}",
      view.slots(),
      range,
      self.activation
    );
    (0..view.slots())
      .map(|slot| self.extract_in(view, range.clone(), slot))
      .collect()
  }
}
