// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/args.rs - 命令行公共参数
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

use clap::Args;
use tracing::info;

use crate::{
  model::ImageSize,
  pipeline::{
    ConfigError, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_IOU_THRESHOLD, DEFAULT_MODEL_INPUT_SIZE,
    DEFAULT_SLOT_COUNT, PipelineConfig,
  },
  postprocess::{DEFAULT_EDGE_FRACTION, DEFAULT_MIN_CELL_AREA, DropletPolicy, ScoreActivation},
  task::ImageSpec,
};

/// 导出的分割模型：4 个边界框通道 + 2 个类别通道 + 32 个掩码系数
pub const DEFAULT_CLASS_CHANNELS: usize = 2;

/// 后处理参数
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
  /// 类别分数的激活方式（identity 或 sigmoid），取决于模型导出时是否已做激活
  #[arg(long, value_name = "ACTIVATION")]
  pub activation: ScoreActivation,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub conf: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_IOU_THRESHOLD, value_name = "THRESHOLD")]
  pub iou: f32,

  /// 参与 NMS 的最低分数
  #[arg(long, default_value_t = 0.0, value_name = "SCORE")]
  pub score_floor: f32,

  /// 张量中的检测槽位数
  #[arg(long, default_value_t = DEFAULT_SLOT_COUNT, value_name = "COUNT")]
  pub slots: usize,

  #[arg(long, default_value_t = DEFAULT_MODEL_INPUT_SIZE, value_name = "PIXELS")]
  pub model_width: u32,

  #[arg(long, default_value_t = DEFAULT_MODEL_INPUT_SIZE, value_name = "PIXELS")]
  pub model_height: u32,

  /// 边界框之后参与类别判断的通道数
  #[arg(long, default_value_t = DEFAULT_CLASS_CHANNELS, value_name = "COUNT")]
  pub class_channels: usize,

  /// 距离图像边缘多近算作贴边（占宽高的比例）
  #[arg(long, default_value_t = DEFAULT_EDGE_FRACTION, value_name = "FRACTION")]
  pub edge_fraction: f32,

  /// 小于该面积（像素）的检测视为液滴
  #[arg(long, default_value_t = DEFAULT_MIN_CELL_AREA, value_name = "PIXELS")]
  pub min_area: f32,

  /// 在输出中保留液滴
  #[arg(long)]
  pub include_droplets: bool,

  /// 输出圆的多边形近似顶点数
  #[arg(long, value_name = "COUNT")]
  pub polygon_points: Option<usize>,

  /// 对已解码输入同样执行 NMS
  #[arg(long)]
  pub suppress_decoded: bool,
}

impl PipelineArgs {
  pub fn to_config(&self) -> Result<PipelineConfig, ConfigError> {
    info!(
      "激活: {:?}, 置信度阈值: {}, IOU 阈值: {}, 最小面积: {}",
      self.activation, self.conf, self.iou, self.min_area
    );

    let policy = if self.include_droplets {
      DropletPolicy::Keep
    } else {
      DropletPolicy::Drop
    };

    let mut builder = PipelineConfig::builder(self.activation)
      .confidence_threshold(self.conf)
      .iou_threshold(self.iou)
      .score_floor(self.score_floor)
      .slot_count(self.slots)
      .model_size(self.model_width, self.model_height)
      .num_class_features(self.class_channels)
      .edge_fraction(self.edge_fraction)
      .min_cell_area(self.min_area)
      .droplet_policy(policy)
      .suppress_decoded(self.suppress_decoded);
    if let Some(points) = self.polygon_points {
      builder = builder.polygon_points(points);
    }
    builder.build()
  }
}

/// 原图尺寸参数
#[derive(Args, Debug, Clone)]
pub struct ImageArgs {
  #[arg(long, value_name = "PIXELS", requires = "image_height")]
  pub image_width: Option<u32>,

  #[arg(long, value_name = "PIXELS", requires = "image_width")]
  pub image_height: Option<u32>,
}

impl ImageArgs {
  pub fn size(&self) -> Option<ImageSpec> {
    match (self.image_width, self.image_height) {
      (Some(width), Some(height)) => Some(ImageSpec::Size(ImageSize::new(width, height))),
      _ => None,
    }
  }
}
