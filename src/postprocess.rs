// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/postprocess.rs - 检测后处理各阶段
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

//! 检测后处理
//!
//! 各阶段按数据流顺序排列：
//!
//! 1. [`ScoreExtractor`]：从归一化张量中读取边界框和最高类别分数
//! 2. [`ConfidenceFilter`]：按置信度过滤并映射到原图坐标
//! 3. [`NmsSuppressor`]：贪心非极大值抑制
//! 4. [`SquareCircleMapper`]：边界框 → 正方形 → 内切圆
//! 5. [`AreaClassifier`]：按面积区分细胞与液滴
//!
//! 所有阶段都不持有跨调用的状态。

mod classify;
mod filter;
mod geometry;
mod nms;
mod score;

pub use self::classify::{AreaClassifier, DEFAULT_MIN_CELL_AREA, DropletPolicy};
pub use self::filter::{ConfidenceFilter, Scale};
pub use self::geometry::{
  Anchor, DEFAULT_EDGE_FRACTION, DEFAULT_POLYGON_POINTS, SquareCircleMapper,
};
pub use self::nms::{NmsSuppressor, iou};
pub use self::score::{ParseActivationError, ScoreActivation, ScoreExtractor, sigmoid};
