// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/output/report.rs - JSON 检测报告
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

use crate::model::{BBox, CellLabel, ClassifiedDetection, DetectResult, DetectStats, Square};

/// 单个检测的序列化形式
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
  pub center_x: f32,
  pub center_y: f32,
  pub radius: f32,
  pub diameter: f32,
  pub area: f32,
  pub confidence: f32,
  pub class_index: usize,
  pub bbox: BBox,
  pub square_bbox: Square,
  pub label: CellLabel,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub polygon: Option<Vec<[f32; 2]>>,
}

impl From<&ClassifiedDetection> for DetectionRecord {
  fn from(det: &ClassifiedDetection) -> Self {
    Self {
      center_x: det.circle.center_x,
      center_y: det.circle.center_y,
      radius: det.circle.radius,
      diameter: det.circle.diameter(),
      area: det.area,
      confidence: det.confidence(),
      class_index: det.candidate.detection.class_index,
      bbox: det.candidate.bbox,
      square_bbox: det.square,
      label: det.label,
      polygon: det.polygon.clone(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessReport {
  success: bool,
  pub source: String,
  pub image_width: u32,
  pub image_height: u32,
  pub num_cells: usize,
  pub num_droplets: usize,
  pub stats: DetectStats,
  pub cells: Vec<DetectionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReport {
  success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub source: Option<String>,
  pub error: String,
}

/// 单张图像的处理结果，成功与失败都以 JSON 输出
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Report {
  Success(SuccessReport),
  Failure(FailureReport),
}

impl Report {
  pub fn success(source: impl Into<String>, result: &DetectResult) -> Self {
    let cells: Vec<DetectionRecord> = result.items.iter().map(DetectionRecord::from).collect();
    // 计数与 stats 一致，包含按策略丢弃的液滴
    Report::Success(SuccessReport {
      success: true,
      source: source.into(),
      image_width: result.image.width,
      image_height: result.image.height,
      num_cells: result.stats.num_cells,
      num_droplets: result.stats.num_droplets,
      stats: result.stats,
      cells,
    })
  }

  pub fn failure(source: Option<String>, error: impl std::fmt::Display) -> Self {
    Report::Failure(FailureReport {
      success: false,
      source,
      // `{:#}` 会展开 anyhow 的错误链
      error: format!("{:#}", error),
    })
  }

  pub fn is_success(&self) -> bool {
    matches!(self, Report::Success(_))
  }

  /// 进程退出码：成功为 0，失败为 1
  pub fn exit_code(&self) -> i32 {
    if self.is_success() { 0 } else { 1 }
  }

  pub fn num_cells(&self) -> usize {
    match self {
      Report::Success(report) => report.num_cells,
      Report::Failure(_) => 0,
    }
  }
}

/// 批处理汇总
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
  pub success: bool,
  pub num_inputs: usize,
  pub num_failed: usize,
  /// 收到中断信号后未处理的输入数
  pub num_skipped: usize,
  pub total_cells: usize,
  pub reports: Vec<Report>,
  /// 汇总报告无法写入配置的输出时的错误
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl BatchReport {
  pub fn new(reports: Vec<Report>, num_skipped: usize) -> Self {
    let num_failed = reports.iter().filter(|r| !r.is_success()).count();
    Self {
      success: num_failed == 0 && num_skipped == 0,
      num_inputs: reports.len() + num_skipped,
      num_failed,
      num_skipped,
      total_cells: reports.iter().map(Report::num_cells).sum(),
      reports,
      error: None,
    }
  }

  /// 标记为失败并记录错误
  pub fn fail(&mut self, error: impl std::fmt::Display) {
    self.success = false;
    self.error = Some(format!("{:#}", error));
  }

  pub fn exit_code(&self) -> i32 {
    if self.success { 0 } else { 1 }
  }
}
