// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/input/tensor_file.rs - 模型输出张量文件输入
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

//! 从文件读取模型输出张量
//!
//! 支持两种格式：
//!
//! - `tensor:///path/output.bin?shape=1,38,8400`：小端序 f32 原始数据，形状由查询参数给出
//! - `tensor:///path/output.json`：`{"shape": [1, 38, 8400], "data": [...]}`

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  pipeline::DetectionSource,
  tensor::{RawTensor, TensorError},
  url_file_path,
};

#[derive(Error, Debug)]
pub enum TensorFileInputError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("I/O 错误")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误")]
  JsonError(#[from] serde_json::Error),
  #[error("原始张量文件需要 shape 查询参数")]
  MissingShape,
  #[error("无效的张量形状: {0}")]
  InvalidShape(String),
  #[error("原始数据长度 {0} 不是 4 的整数倍")]
  TruncatedData(usize),
  #[error(transparent)]
  TensorError(#[from] TensorError),
}

#[derive(Deserialize)]
struct TensorDocument {
  shape: [usize; 3],
  data: Vec<f32>,
}

pub struct TensorFileInput {
  path: PathBuf,
  tensor: RawTensor,
}

impl FromUrlWithScheme for TensorFileInput {
  const SCHEME: &'static str = "tensor";
}

impl FromUrl for TensorFileInput {
  type Error = TensorFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TensorFileInputError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let path = url_file_path(url);
    let shape = url
      .query_pairs()
      .find(|(k, _)| k == "shape")
      .map(|(_, v)| parse_shape(&v))
      .transpose()?;

    let tensor = if is_json(&path) {
      read_json(&path)?
    } else {
      read_raw(&path, shape.ok_or(TensorFileInputError::MissingShape)?)?
    };

    debug!("读取张量 {}: 形状 {:?}", path.display(), tensor.shape());
    Ok(TensorFileInput { path, tensor })
  }
}

impl TensorFileInput {
  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn tensor(&self) -> &RawTensor {
    &self.tensor
  }

  pub fn into_source(self) -> DetectionSource {
    DetectionSource::RawTensor(self.tensor)
  }
}

fn is_json(path: &Path) -> bool {
  path
    .extension()
    .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// 解析 `1,38,8400` 形式的形状
pub fn parse_shape(text: &str) -> Result<[usize; 3], TensorFileInputError> {
  let dims = text
    .split(',')
    .map(|d| d.trim().parse::<usize>())
    .collect::<Result<Vec<_>, _>>()
    .map_err(|e| TensorFileInputError::InvalidShape(format!("{}: {}", text, e)))?;

  <[usize; 3]>::try_from(dims)
    .map_err(|_| TensorFileInputError::InvalidShape(format!("{}: 需要 3 个维度", text)))
}

fn read_json(path: &Path) -> Result<RawTensor, TensorFileInputError> {
  let text = std::fs::read_to_string(path)?;
  let document: TensorDocument = serde_json::from_str(&text)?;
  Ok(RawTensor::new(document.shape, document.data)?)
}

fn read_raw(path: &Path, shape: [usize; 3]) -> Result<RawTensor, TensorFileInputError> {
  let bytes = std::fs::read(path)?;
  let data = decode_le_f32(&bytes)?;
  Ok(RawTensor::new(shape, data)?)
}

/// 小端序 f32 解码
pub fn decode_le_f32(bytes: &[u8]) -> Result<Vec<f32>, TensorFileInputError> {
  if bytes.len() % 4 != 0 {
    return Err(TensorFileInputError::TruncatedData(bytes.len()));
  }
  Ok(
    bytes
      .chunks_exact(4)
      .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect(),
  )
}
