// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/tensor.rs - 检测模型输出张量与布局归一化
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

use thiserror::Error;
use tracing::{debug, error};

/// 边界框占用的特征数量 (xc, yc, w, h)
pub const BBOX_FEATURES: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
  #[error("无法识别的张量布局: 形状 {shape:?}, 期望某一轴长度为 {slot_count}")]
  UnrecognizedLayout {
    shape: [usize; 3],
    slot_count: usize,
  },
  #[error("数据长度不匹配: 形状 {shape:?} 期望长度 {expected}, 实际长度 {actual}")]
  ShapeMismatch {
    shape: [usize; 3],
    expected: usize,
    actual: usize,
  },
  #[error("张量形状 {0:?} 的元素总数溢出")]
  ShapeOverflow([usize; 3]),
  #[error("特征数量不足: 至少需要 {BBOX_FEATURES} 个边界框特征, 实际为 {0}")]
  TooFewFeatures(usize),
}

/// 模型原始输出，形状为 `(1, A, B)`，其中 `{A, B} = {features, N}`
#[derive(Debug, Clone)]
pub struct RawTensor {
  shape: [usize; 3],
  data: Box<[f32]>,
}

impl RawTensor {
  pub fn new(shape: [usize; 3], data: Vec<f32>) -> Result<Self, TensorError> {
    let Some(expected) = shape
      .iter()
      .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    else {
      error!("张量形状 {:?} 的元素总数溢出", shape);
      return Err(TensorError::ShapeOverflow(shape));
    };
    if data.len() != expected {
      error!(
        "数据长度不匹配: 期望长度 {}, 实际长度 {}",
        expected,
        data.len()
      );
      return Err(TensorError::ShapeMismatch {
        shape,
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      shape,
      data: data.into_boxed_slice(),
    })
  }

  pub fn shape(&self) -> [usize; 3] {
    self.shape
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }
}

/// 张量在内存中的排列方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
  /// `(1, features, S)`，无需转置
  FeaturesFirst,
  /// `(1, S, features)`，按转置方式访问
  SlotsFirst,
}

/// 归一化后的 `[features, N]` 访问视图
///
/// 布局只在构造时判定一次，之后所有访问都通过 [`TensorView::value`] 完成。
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
  data: &'a [f32],
  layout: TensorLayout,
  features: usize,
  slots: usize,
}

impl<'a> TensorView<'a> {
  pub fn new(tensor: &'a RawTensor, slot_count: usize) -> Result<Self, TensorError> {
    let shape = tensor.shape();
    let unrecognized = TensorError::UnrecognizedLayout { shape, slot_count };

    if shape[0] != 1 {
      error!("批大小必须为 1, 实际形状 {:?}", shape);
      return Err(unrecognized);
    }

    let (layout, features) = if shape[2] == slot_count {
      (TensorLayout::FeaturesFirst, shape[1])
    } else if shape[1] == slot_count {
      (TensorLayout::SlotsFirst, shape[2])
    } else {
      error!("张量形状 {:?} 与检测槽数量 {} 不符", shape, slot_count);
      return Err(unrecognized);
    };

    if features < BBOX_FEATURES {
      return Err(TensorError::TooFewFeatures(features));
    }

    debug!(
      "张量布局: {:?}, 特征数 {}, 检测槽数 {}",
      layout, features, slot_count
    );

    Ok(Self {
      data: tensor.data(),
      layout,
      features,
      slots: slot_count,
    })
  }

  pub fn layout(&self) -> TensorLayout {
    self.layout
  }

  pub fn features(&self) -> usize {
    self.features
  }

  pub fn slots(&self) -> usize {
    self.slots
  }

  /// 读取第 `slot` 个检测槽的第 `feature` 个特征
  ///
  /// 越界访问会 panic，调用方需保证索引位于 `features()`/`slots()` 之内。
  pub fn value(&self, feature: usize, slot: usize) -> f32 {
    debug_assert!(feature < self.features && slot < self.slots);
    match self.layout {
      TensorLayout::FeaturesFirst => self.data[feature * self.slots + slot],
      TensorLayout::SlotsFirst => self.data[slot * self.features + feature],
    }
  }
}
