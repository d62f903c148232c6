// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/input.rs - 检测输入来源
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

use std::path::Path;

use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme, pipeline::DetectionSource};

mod decoded_file;
mod tensor_file;

pub use self::decoded_file::{DecodedFileInput, DecodedFileInputError, parse_detections};
pub use self::tensor_file::{TensorFileInput, TensorFileInputError, decode_le_f32, parse_shape};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error(transparent)]
  TensorFileInputError(#[from] TensorFileInputError),
  #[error(transparent)]
  DecodedFileInputError(#[from] DecodedFileInputError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  TensorFile(TensorFileInput),
  DecodedFile(DecodedFileInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      TensorFileInput::SCHEME => Ok(InputWrapper::TensorFile(TensorFileInput::from_url(url)?)),
      DecodedFileInput::SCHEME => Ok(InputWrapper::DecodedFile(DecodedFileInput::from_url(url)?)),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl InputWrapper {
  pub fn path(&self) -> &Path {
    match self {
      InputWrapper::TensorFile(input) => input.path(),
      InputWrapper::DecodedFile(input) => input.path(),
    }
  }

  pub fn into_source(self) -> DetectionSource {
    match self {
      InputWrapper::TensorFile(input) => input.into_source(),
      InputWrapper::DecodedFile(input) => input.into_source(),
    }
  }
}
