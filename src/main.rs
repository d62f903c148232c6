// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/main.rs - 单张图像后处理程序
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

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use url::Url;

use cellscan::{
  FromUrl,
  args::{ImageArgs, PipelineArgs},
  output::{OutputWrapper, Report},
  pipeline::DetectionPipeline,
  task::{ImageSpec, Job, OneShotTask, Task},
};

/// Cellscan 细胞检测后处理
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型输出，`tensor:///path/out.bin?shape=1,38,8400` 或 `decoded:///path/dets.json`
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  #[command(flatten)]
  pub image: ImageArgs,

  /// 原图文件，仅读取尺寸，`image:///path/img.png`
  #[cfg(feature = "read_image_file")]
  #[arg(long, value_name = "IMAGE", conflicts_with = "image_width")]
  pub image_file: Option<Url>,

  /// 输出路径，`stdout:` 或 `json:///path/result.json`
  #[arg(long, value_name = "OUTPUT", default_value = "stdout:")]
  pub output: Url,

  #[command(flatten)]
  pub pipeline: PipelineArgs,
}

impl Args {
  fn image_spec(&self) -> Result<ImageSpec> {
    #[cfg(feature = "read_image_file")]
    if let Some(url) = &self.image_file {
      return Ok(ImageSpec::File(url.clone()));
    }
    self
      .image
      .size()
      .ok_or_else(|| anyhow::anyhow!("需要 --image-width/--image-height 或 --image-file 指定原图尺寸"))
  }
}

fn run(args: &Args, output: &OutputWrapper) -> Result<Report> {
  let config = args.pipeline.to_config()?;
  let job = Job::new(args.input.clone(), args.image_spec()?);
  OneShotTask.run_task(job, &DetectionPipeline::new(config), output)
}

fn main() {
  tracing_subscriber::fmt().with_writer(std::io::stderr).init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let output = OutputWrapper::from_url(&args.output).unwrap_or_else(|err| {
    error!("无法创建输出 {}: {}, 改为输出到标准输出", args.output, err);
    OutputWrapper::default()
  });

  let code = match run(&args, &output) {
    Ok(report) => report.exit_code(),
    Err(err) => {
      error!("处理失败: {:#}", err);
      let report = Report::failure(Some(args.input.to_string()), err);
      if let Err(err) = output.render_or_stdout(&report) {
        error!("无法输出错误报告: {:#}", anyhow::Error::from(err));
      }
      report.exit_code()
    }
  };

  std::process::exit(code);
}
