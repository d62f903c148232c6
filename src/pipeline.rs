// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/pipeline.rs - 检测后处理流水线
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

//! 检测后处理流水线
//!
//! 输入可以是模型原始输出张量，也可以是上游框架已解码的检测列表；两者在入口处
//! 统一为 [`Candidate`]，之后共用同一套几何变换与分类逻辑。
//!
//! ```no_run
//! use cellscan::{
//!   model::ImageSize,
//!   pipeline::{DetectionPipeline, DetectionSource, PipelineConfig},
//!   postprocess::ScoreActivation,
//!   tensor::RawTensor,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::builder(ScoreActivation::Identity)
//!   .num_class_features(2)
//!   .confidence_threshold(0.25)
//!   .build()?;
//! let tensor = RawTensor::new([1, 38, 8400], vec![0.0; 38 * 8400])?;
//! let result = DetectionPipeline::new(config)
//!   .run(&DetectionSource::RawTensor(tensor), ImageSize::new(1280, 960))?;
//! println!("检测到 {} 个细胞", result.stats.num_cells);
//! # Ok(())
//! # }
//! ```

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  model::{BBox, Candidate, CellLabel, ClassifiedDetection, DetectResult, DetectStats, ImageSize},
  postprocess::{
    AreaClassifier, ConfidenceFilter, DEFAULT_EDGE_FRACTION, DEFAULT_MIN_CELL_AREA, DropletPolicy,
    NmsSuppressor, Scale, ScoreActivation, ScoreExtractor, SquareCircleMapper,
  },
  tensor::{RawTensor, TensorError, TensorView},
};

pub const DEFAULT_SLOT_COUNT: usize = 8400;
pub const DEFAULT_MODEL_INPUT_SIZE: u32 = 640;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.7;

/// 宽高差小于该值的边界框视为已是正方形
const SQUARE_TOLERANCE: f32 = 5.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
  #[error(transparent)]
  Tensor(#[from] TensorError),
  #[error("无效的图像尺寸: {width}x{height}")]
  InvalidImage { width: u32, height: u32 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
  #[error("参数 {name} 超出范围 [{min}, {max}]: {value}")]
  OutOfRange {
    name: &'static str,
    value: f32,
    min: f32,
    max: f32,
  },
  #[error("参数 {0} 必须大于 0")]
  Zero(&'static str),
  #[error("多边形顶点数至少为 3, 实际为 {0}")]
  TooFewPolygonPoints(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("掩码数据长度不匹配: {width}x{height} 期望 {expected}, 实际 {actual}")]
pub struct MaskSizeError {
  pub width: u32,
  pub height: u32,
  pub expected: usize,
  pub actual: usize,
}

/// 二值像素掩码，非零像素视为前景
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
  width: u32,
  height: u32,
  data: Box<[u8]>,
}

impl Mask {
  pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, MaskSizeError> {
    let expected = width as usize * height as usize;
    if data.len() != expected {
      return Err(MaskSizeError {
        width,
        height,
        expected,
        actual: data.len(),
      });
    }
    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  /// 前景像素数
  pub fn area(&self) -> f32 {
    self.data.iter().filter(|&&v| v != 0).count() as f32
  }
}

/// 上游框架已解码的单个检测，边界框位于原图坐标
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionInput {
  pub bbox: BBox,
  pub mask: Option<Mask>,
  pub class_index: usize,
  pub score: f32,
}

/// 流水线的两种入口
#[derive(Debug, Clone)]
pub enum DetectionSource {
  /// 模型原始输出张量
  RawTensor(RawTensor),
  /// 框架已完成解码（通常也已完成 NMS）的结果
  Decoded(Vec<DetectionInput>),
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
  slot_count: usize,
  model_width: u32,
  model_height: u32,
  num_class_features: Option<usize>,
  score_activation: ScoreActivation,
  confidence_threshold: f32,
  iou_threshold: f32,
  score_floor: f32,
  edge_fraction: f32,
  min_cell_area: f32,
  droplet_policy: DropletPolicy,
  polygon_points: Option<usize>,
  suppress_decoded: bool,
}

impl PipelineConfig {
  /// 分数激活函数没有默认值，必须显式给出
  pub fn builder(score_activation: ScoreActivation) -> PipelineConfigBuilder {
    PipelineConfigBuilder::new(score_activation)
  }

  pub fn slot_count(&self) -> usize {
    self.slot_count
  }

  pub fn model_size(&self) -> (u32, u32) {
    (self.model_width, self.model_height)
  }

  pub fn score_activation(&self) -> ScoreActivation {
    self.score_activation
  }

  pub fn confidence_threshold(&self) -> f32 {
    self.confidence_threshold
  }

  pub fn iou_threshold(&self) -> f32 {
    self.iou_threshold
  }

  pub fn droplet_policy(&self) -> DropletPolicy {
    self.droplet_policy
  }

  pub fn polygon_points(&self) -> Option<usize> {
    self.polygon_points
  }
}

pub struct PipelineConfigBuilder {
  config: PipelineConfig,
}

impl PipelineConfigBuilder {
  pub fn new(score_activation: ScoreActivation) -> Self {
    Self {
      config: PipelineConfig {
        slot_count: DEFAULT_SLOT_COUNT,
        model_width: DEFAULT_MODEL_INPUT_SIZE,
        model_height: DEFAULT_MODEL_INPUT_SIZE,
        num_class_features: None,
        score_activation,
        confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        iou_threshold: DEFAULT_IOU_THRESHOLD,
        score_floor: 0.0,
        edge_fraction: DEFAULT_EDGE_FRACTION,
        min_cell_area: DEFAULT_MIN_CELL_AREA,
        droplet_policy: DropletPolicy::default(),
        polygon_points: None,
        suppress_decoded: false,
      },
    }
  }

  pub fn slot_count(mut self, slot_count: usize) -> Self {
    self.config.slot_count = slot_count;
    self
  }

  pub fn model_size(mut self, width: u32, height: u32) -> Self {
    self.config.model_width = width;
    self.config.model_height = height;
    self
  }

  /// 参与类别判断的通道数；未设置时使用边界框之后的全部通道
  pub fn num_class_features(mut self, count: usize) -> Self {
    self.config.num_class_features = Some(count);
    self
  }

  pub fn confidence_threshold(mut self, threshold: f32) -> Self {
    self.config.confidence_threshold = threshold;
    self
  }

  pub fn iou_threshold(mut self, threshold: f32) -> Self {
    self.config.iou_threshold = threshold;
    self
  }

  pub fn score_floor(mut self, floor: f32) -> Self {
    self.config.score_floor = floor;
    self
  }

  pub fn edge_fraction(mut self, fraction: f32) -> Self {
    self.config.edge_fraction = fraction;
    self
  }

  pub fn min_cell_area(mut self, area: f32) -> Self {
    self.config.min_cell_area = area;
    self
  }

  pub fn droplet_policy(mut self, policy: DropletPolicy) -> Self {
    self.config.droplet_policy = policy;
    self
  }

  /// 输出圆的多边形近似
  pub fn polygon_points(mut self, points: usize) -> Self {
    self.config.polygon_points = Some(points);
    self
  }

  /// 同样对已解码的检测执行 NMS
  pub fn suppress_decoded(mut self, enabled: bool) -> Self {
    self.config.suppress_decoded = enabled;
    self
  }

  pub fn build(self) -> Result<PipelineConfig, ConfigError> {
    let config = self.config;

    check_range("confidence_threshold", config.confidence_threshold, 0.0, 1.0)?;
    check_range("iou_threshold", config.iou_threshold, 0.0, 1.0)?;
    check_range("score_floor", config.score_floor, 0.0, 1.0)?;
    check_range("edge_fraction", config.edge_fraction, 0.0, 0.5)?;
    check_range("min_cell_area", config.min_cell_area, 0.0, f32::MAX)?;

    if config.slot_count == 0 {
      return Err(ConfigError::Zero("slot_count"));
    }
    if config.model_width == 0 || config.model_height == 0 {
      return Err(ConfigError::Zero("model_size"));
    }
    if config.num_class_features == Some(0) {
      return Err(ConfigError::Zero("num_class_features"));
    }
    if let Some(points) = config.polygon_points
      && points < 3
    {
      return Err(ConfigError::TooFewPolygonPoints(points));
    }

    Ok(config)
  }
}

fn check_range(name: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
  // NaN 同样视为越界
  if value >= min && value <= max {
    Ok(())
  } else {
    Err(ConfigError::OutOfRange {
      name,
      value,
      min,
      max,
    })
  }
}

/// 后处理流水线，每次运行都是输入与配置的纯函数
#[derive(Debug, Clone)]
pub struct DetectionPipeline {
  config: PipelineConfig,
}

impl DetectionPipeline {
  pub fn new(config: PipelineConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn run(&self, source: &DetectionSource, image: ImageSize) -> Result<DetectResult, PipelineError> {
    if image.is_empty() {
      warn!("图像尺寸无效: {}x{}", image.width, image.height);
      return Err(PipelineError::InvalidImage {
        width: image.width,
        height: image.height,
      });
    }

    let config = &self.config;
    let filter = ConfidenceFilter::new(config.confidence_threshold);
    let nms = NmsSuppressor::new(config.iou_threshold, config.score_floor);

    let (candidates, masks): (Vec<Candidate>, Option<&[DetectionInput]>) = match source {
      DetectionSource::RawTensor(tensor) => {
        let view = TensorView::new(tensor, config.slot_count)?;
        let extractor = ScoreExtractor::new(config.num_class_features, config.score_activation);
        let detections = extractor.extract_all(&view);
        let scale = Scale::between(image, config.model_width, config.model_height);
        debug!("缩放系数: scale_x={:.4}, scale_y={:.4}", scale.x, scale.y);
        (filter.filter(&detections, scale, image), None)
      }
      DetectionSource::Decoded(inputs) => {
        let boxes = inputs.iter().map(|d| (d.bbox, d.score, d.class_index));
        (filter.filter_boxes(boxes, image), Some(inputs.as_slice()))
      }
    };

    let num_candidates = candidates.len();
    let kept = if masks.is_none() || config.suppress_decoded {
      nms.suppress(candidates)
    } else {
      NmsSuppressor::sort_by_score(candidates)
    };

    let mapper = SquareCircleMapper::new(config.edge_fraction);
    let classifier = AreaClassifier::new(config.min_cell_area);
    let mut stats = DetectStats {
      num_candidates,
      num_suppressed: num_candidates - kept.len(),
      ..Default::default()
    };

    let mut items = Vec::with_capacity(kept.len());
    for candidate in kept {
      let (square, circle) = mapper.map(&candidate.bbox, image);
      let area = masks
        .and_then(|inputs| inputs.get(candidate.index))
        .and_then(|input| input.mask.as_ref())
        .map_or_else(|| circle.area(), Mask::area);
      let label = classifier.classify(area);

      if label == CellLabel::Droplet {
        stats.num_droplets += 1;
        if config.droplet_policy == DropletPolicy::Drop {
          stats.num_droplets_dropped += 1;
          continue;
        }
      } else {
        stats.num_cells += 1;
      }

      if (candidate.bbox.width() - candidate.bbox.height()).abs() < SQUARE_TOLERANCE {
        stats.already_square += 1;
      } else {
        stats.converted_to_square += 1;
      }

      items.push(ClassifiedDetection {
        candidate,
        square,
        circle,
        area,
        label,
        polygon: config.polygon_points.map(|n| circle.polygon(n)),
      });
    }

    info!(
      "检测完成: 候选 {}, 抑制 {}, 细胞 {}, 液滴 {} (丢弃 {})",
      stats.num_candidates,
      stats.num_suppressed,
      stats.num_cells,
      stats.num_droplets,
      stats.num_droplets_dropped
    );

    Ok(DetectResult {
      image,
      items: items.into_boxed_slice(),
      stats,
    })
  }
}
