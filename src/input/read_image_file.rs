// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/input/read_image_file.rs - 从图像文件读取原图尺寸
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

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::ImageSize, url_file_path};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("图像加载错误")]
  ImageLoadError(#[from] image::ImageError),
}

/// 只读取图像头部获得尺寸，不解码像素
pub struct ImageFileInput {
  path: PathBuf,
  size: ImageSize,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    Self::open(url_file_path(url))
  }
}

impl ImageFileInput {
  pub fn open(path: impl Into<PathBuf>) -> Result<Self, ImageFileInputError> {
    let path = path.into();
    let (width, height) = image::image_dimensions(&path)?;
    debug!("图像 {} 尺寸: {}x{}", path.display(), width, height);
    Ok(Self {
      path,
      size: ImageSize::new(width, height),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn size(&self) -> ImageSize {
    self.size
  }
}
