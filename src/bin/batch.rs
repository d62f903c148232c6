// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/bin/batch.rs - 批量后处理程序
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
  output::{BatchReport, OutputWrapper, Report},
  pipeline::DetectionPipeline,
  task::{BatchTask, ImageSpec, Job, Task},
};

/// Cellscan 批量细胞检测后处理
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型输出，可重复给出
  #[arg(long, value_name = "SOURCE", required = true)]
  pub input: Vec<Url>,

  /// 所有输入共用的原图尺寸
  #[command(flatten)]
  pub image: ImageArgs,

  /// 每个输入对应的原图文件，数量须与 --input 一致
  #[cfg(feature = "read_image_file")]
  #[arg(long, value_name = "IMAGE", conflicts_with = "image_width")]
  pub image_file: Vec<Url>,

  /// 汇总报告输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "stdout:")]
  pub output: Url,

  /// 工作线程数，默认为 CPU 核数
  #[arg(long, value_name = "COUNT")]
  pub workers: Option<usize>,

  #[command(flatten)]
  pub pipeline: PipelineArgs,
}

impl Args {
  fn jobs(&self) -> Result<Vec<Job>> {
    #[cfg(feature = "read_image_file")]
    if !self.image_file.is_empty() {
      if self.image_file.len() != self.input.len() {
        anyhow::bail!(
          "--image-file 数量 ({}) 与 --input 数量 ({}) 不一致",
          self.image_file.len(),
          self.input.len()
        );
      }
      return Ok(
        self
          .input
          .iter()
          .zip(&self.image_file)
          .map(|(input, image)| Job::new(input.clone(), ImageSpec::File(image.clone())))
          .collect(),
      );
    }

    let image = self
      .image
      .size()
      .ok_or_else(|| anyhow::anyhow!("需要 --image-width/--image-height 或 --image-file 指定原图尺寸"))?;
    Ok(
      self
        .input
        .iter()
        .map(|input| Job::new(input.clone(), image.clone()))
        .collect(),
    )
  }
}

fn run(args: &Args, output: &OutputWrapper) -> Result<BatchReport> {
  let config = args.pipeline.to_config()?;
  let jobs = args.jobs()?;
  BatchTask::default()
    .with_workers(args.workers)
    .with_interrupt(true)
    .run_task(jobs, &DetectionPipeline::new(config), output)
}

fn main() {
  tracing_subscriber::fmt().with_writer(std::io::stderr).init();

  let args = Args::parse();

  info!("输入数量: {}", args.input.len());
  info!("输出路径: {}", args.output);

  let output = OutputWrapper::from_url(&args.output).unwrap_or_else(|err| {
    error!("无法创建输出 {}: {}, 改为输出到标准输出", args.output, err);
    OutputWrapper::default()
  });

  let code = match run(&args, &output) {
    Ok(batch) => batch.exit_code(),
    Err(err) => {
      error!("批量处理失败: {:#}", err);
      let report = Report::failure(None, err);
      if let Err(err) = output.render_or_stdout(&report) {
        error!("无法输出错误报告: {:#}", anyhow::Error::from(err));
      }
      report.exit_code()
    }
  };

  std::process::exit(code);
}
