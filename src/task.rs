// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// src/task.rs - 单次与批量检测任务
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

use std::{
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  thread,
  time::{Duration, Instant},
};

use anyhow::Context;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl,
  input::InputWrapper,
  model::{DetectResult, ImageSize},
  output::{BatchReport, Render, Report, StdoutOutput},
  pipeline::DetectionPipeline,
};

pub trait Task<I, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, pipeline: &DetectionPipeline, output: O) -> Result<Self::Output, Self::Error>;
}

/// 原图尺寸来源
#[derive(Debug, Clone)]
pub enum ImageSpec {
  Size(ImageSize),
  /// 从 `image://` 图像文件头读取
  #[cfg(feature = "read_image_file")]
  File(Url),
}

impl ImageSpec {
  pub fn resolve(&self) -> anyhow::Result<ImageSize> {
    match self {
      ImageSpec::Size(size) => Ok(*size),
      #[cfg(feature = "read_image_file")]
      ImageSpec::File(url) => {
        let input = crate::input::ImageFileInput::from_url(url)
          .with_context(|| format!("读取图像尺寸失败: {}", url))?;
        Ok(input.size())
      }
    }
  }
}

/// 一次检测：一份模型输出加上对应原图的尺寸
#[derive(Debug, Clone)]
pub struct Job {
  pub input: Url,
  pub image: ImageSpec,
}

impl Job {
  pub fn new(input: Url, image: ImageSpec) -> Self {
    Self { input, image }
  }

  pub fn process(&self, pipeline: &DetectionPipeline) -> anyhow::Result<DetectResult> {
    let image = self.image.resolve()?;
    let input =
      InputWrapper::from_url(&self.input).with_context(|| format!("读取输入失败: {}", self.input))?;
    debug!("输入文件: {}", input.path().display());
    let source = input.into_source();
    let result = pipeline
      .run(&source, image)
      .with_context(|| format!("后处理失败: {}", self.input))?;
    Ok(result)
  }

  /// 处理并转换为报告，错误同样落入报告
  pub fn report(&self, pipeline: &DetectionPipeline) -> Report {
    let now = Instant::now();
    match self.process(pipeline) {
      Ok(result) => {
        info!(
          "{}: 检测到 {} 个细胞，耗时 {:.2?}",
          self.input,
          result.stats.num_cells,
          now.elapsed()
        );
        Report::success(self.input.as_str(), &result)
      }
      Err(err) => {
        warn!("{}: 处理失败: {:#}", self.input, err);
        Report::failure(Some(self.input.to_string()), err)
      }
    }
  }
}

pub struct OneShotTask;

impl<RE, O> Task<Job, O> for OneShotTask
where
  RE: std::error::Error + Sync + Send + 'static,
  O: Render<Report, Error = RE>,
{
  type Output = Report;
  type Error = anyhow::Error;

  fn run_task(self, input: Job, pipeline: &DetectionPipeline, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let report = input.report(pipeline);
    if let Err(err) = output.render_result(&report) {
      // 输出不可写时报告失败，并改为打印到标准输出
      let err = anyhow::Error::from(err).context("写入报告失败");
      warn!("{:#}, 改为输出到标准输出", err);
      let failure = Report::failure(Some(input.input.to_string()), err);
      StdoutOutput.render_result(&failure)?;
      return Ok(failure);
    }
    info!("任务完成，退出");
    Ok(report)
  }
}

/// 多个输入在工作线程间并行处理，报告按输入顺序排列
#[derive(Default, Debug)]
pub struct BatchTask {
  workers: Option<usize>,
  handle_interrupt: bool,
}

impl BatchTask {
  pub fn with_workers(mut self, workers: Option<usize>) -> Self {
    self.workers = workers;
    self
  }

  /// 安装 Ctrl-C 处理函数，收到信号后不再领取新的输入
  pub fn with_interrupt(mut self, enabled: bool) -> Self {
    self.handle_interrupt = enabled;
    self
  }

  fn install_interrupt(stop: Arc<AtomicBool>) {
    let result = ctrlc::set_handler(move || {
      info!("收到中断信号，等待进行中的任务完成...");
      stop.store(true, Ordering::SeqCst);
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    });
    if let Err(err) = result {
      warn!("无法设置 Ctrl-C 处理函数: {}", err);
    }
  }
}

impl<RE, O> Task<Vec<Job>, O> for BatchTask
where
  RE: std::error::Error + Sync + Send + 'static,
  O: Render<BatchReport, Error = RE>,
{
  type Output = BatchReport;
  type Error = anyhow::Error;

  fn run_task(self, input: Vec<Job>, pipeline: &DetectionPipeline, output: O) -> Result<Self::Output, Self::Error> {
    let workers = self
      .workers
      .unwrap_or_else(num_cpus::get)
      .clamp(1, input.len().max(1));
    info!("开始批量任务: {} 个输入, {} 个工作线程", input.len(), workers);

    let stop = Arc::new(AtomicBool::new(false));
    if self.handle_interrupt {
      Self::install_interrupt(stop.clone());
    }

    let now = Instant::now();
    let cursor = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<Report>>> = Mutex::new(vec![None; input.len()]);

    thread::scope(|scope| {
      for worker in 0..workers {
        let (jobs, cursor, slots, stop) = (&input, &cursor, &slots, &stop);
        scope.spawn(move || {
          loop {
            if stop.load(Ordering::SeqCst) {
              debug!("工作线程 {} 收到停止信号", worker);
              break;
            }
            let index = cursor.fetch_add(1, Ordering::SeqCst);
            let Some(job) = jobs.get(index) else {
              break;
            };
            let report = job.report(pipeline);
            match slots.lock() {
              Ok(mut slots) => slots[index] = Some(report),
              Err(poisoned) => poisoned.into_inner()[index] = Some(report),
            }
          }
        });
      }
    });

    let slots = slots.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    let num_skipped = slots.iter().filter(|r| r.is_none()).count();
    if num_skipped > 0 {
      warn!("中断导致 {} 个输入未处理", num_skipped);
    }
    let mut batch = BatchReport::new(slots.into_iter().flatten().collect(), num_skipped);
    info!(
      "批量任务完成: 失败 {}, 细胞总数 {}, 耗时 {:.2?}",
      batch.num_failed,
      batch.total_cells,
      now.elapsed()
    );

    if let Err(err) = output.render_result(&batch) {
      let err = anyhow::Error::from(err).context("写入汇总报告失败");
      warn!("{:#}, 改为输出到标准输出", err);
      batch.fail(err);
      StdoutOutput.render_result(&batch)?;
    }
    Ok(batch)
  }
}
