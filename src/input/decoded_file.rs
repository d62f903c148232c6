// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/input/decoded_file.rs - 已解码检测结果文件输入
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

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::BBox,
  pipeline::{DetectionInput, DetectionSource, Mask, MaskSizeError},
  url_file_path,
};

#[derive(Error, Debug)]
pub enum DecodedFileInputError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("I/O 错误")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误")]
  JsonError(#[from] serde_json::Error),
  #[error("第 {index} 个检测的掩码无效")]
  MaskError {
    index: usize,
    #[source]
    source: MaskSizeError,
  },
}

#[derive(Deserialize)]
struct MaskRecord {
  width: u32,
  height: u32,
  data: Vec<u8>,
}

/// 文件中的单条检测，`bbox` 为 `[x1, y1, x2, y2]`
#[derive(Deserialize)]
struct DecodedRecord {
  bbox: [f32; 4],
  score: f32,
  #[serde(default)]
  class_index: usize,
  #[serde(default)]
  mask: Option<MaskRecord>,
}

pub struct DecodedFileInput {
  path: PathBuf,
  detections: Vec<DetectionInput>,
}

impl FromUrlWithScheme for DecodedFileInput {
  const SCHEME: &'static str = "decoded";
}

impl FromUrl for DecodedFileInput {
  type Error = DecodedFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(DecodedFileInputError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let path = url_file_path(url);
    let text = std::fs::read_to_string(&path)?;
    let detections = parse_detections(&text)?;
    debug!("读取 {} 条已解码检测: {}", detections.len(), path.display());

    Ok(DecodedFileInput { path, detections })
  }
}

impl DecodedFileInput {
  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn detections(&self) -> &[DetectionInput] {
    &self.detections
  }

  pub fn into_source(self) -> DetectionSource {
    DetectionSource::Decoded(self.detections)
  }
}

/// 解析已解码检测的 JSON 数组
pub fn parse_detections(text: &str) -> Result<Vec<DetectionInput>, DecodedFileInputError> {
  let records: Vec<DecodedRecord> = serde_json::from_str(text)?;

  records
    .into_iter()
    .enumerate()
    .map(|(index, record)| {
      let mask = record
        .mask
        .map(|m| Mask::new(m.width, m.height, m.data))
        .transpose()
        .map_err(|source| DecodedFileInputError::MaskError { index, source })?;
      let [x1, y1, x2, y2] = record.bbox;
      Ok(DetectionInput {
        bbox: BBox::new(x1, y1, x2, y2),
        mask,
        class_index: record.class_index,
        score: record.score,
      })
    })
    .collect()
}
