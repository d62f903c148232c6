// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/output.rs - 输出定义
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
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

pub trait Render<Output>: Sized {
  type Error;
  fn render_result(&self, result: &Output) -> Result<(), Self::Error>;
}

impl<Output, T: Render<Output>> Render<Output> for &T {
  type Error = T::Error;

  fn render_result(&self, result: &Output) -> Result<(), Self::Error> {
    (**self).render_result(result)
  }
}

mod json_output;
mod report;

pub use self::json_output::{JsonFileOutput, JsonOutputError, StdoutOutput};
pub use self::report::{BatchReport, DetectionRecord, FailureReport, Report, SuccessReport};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error(transparent)]
  JsonOutputError(#[from] JsonOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  JsonFileOutput(JsonFileOutput),
  StdoutOutput(StdoutOutput),
}

impl Default for OutputWrapper {
  fn default() -> Self {
    OutputWrapper::StdoutOutput(StdoutOutput)
  }
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      JsonFileOutput::SCHEME => {
        let output = JsonFileOutput::from_url(url)?;
        Ok(OutputWrapper::JsonFileOutput(output))
      }
      StdoutOutput::SCHEME => {
        let output = StdoutOutput::from_url(url)?;
        Ok(OutputWrapper::StdoutOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl OutputWrapper {
  /// 写入失败时改为打印到标准输出，保证始终有一份 JSON 报告
  pub fn render_or_stdout<R: Serialize>(&self, result: &R) -> Result<(), OutputError> {
    match self.render_result(result) {
      Ok(()) => Ok(()),
      Err(err) => {
        warn!("{:#}, 改为输出到标准输出", anyhow::Error::from(err));
        Ok(StdoutOutput.render_result(result)?)
      }
    }
  }
}

impl<R: Serialize> Render<R> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, result: &R) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::JsonFileOutput(output) => output
        .render_result(result)
        .map_err(OutputError::from),
      OutputWrapper::StdoutOutput(output) => output
        .render_result(result)
        .map_err(OutputError::from),
    }
  }
}
