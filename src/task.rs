// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 单次与连续识别任务
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
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  buffer::{DEFAULT_CAPACITY, DropOldestBuffer, PopResult, PushOutcome},
  event::{EventRecorder, SourceTag},
  frame::Frame,
  input::InputError,
  output::Render,
  pipeline::{PlatePipeline, PlateRead},
};

/// 处理线程等待新帧的轮询间隔，决定响应停止信号的延迟
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// 连续多少次取帧失败后放弃输入源
const MAX_CONSECUTIVE_INPUT_ERRORS: usize = 10;

#[derive(Error, Debug)]
pub enum TaskError {
  #[error("没有输入帧")]
  NoFrame,
  #[error("输入错误: {0}")]
  Input(#[from] InputError),
  #[error("渲染错误: {0}")]
  Render(Box<dyn std::error::Error + Send + Sync>),
  #[error("无法启动采集线程: {0}")]
  Spawn(std::io::Error),
  #[error("采集线程异常退出")]
  CapturePanicked,
}

/// 在线程之间共享的停止信号
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn stop(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_stopped(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }

  /// 收到 Ctrl-C 时置位，30 秒内未退出则强制结束进程
  pub fn install_ctrlc(&self) -> Result<(), ctrlc::Error> {
    let signal = self.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      signal.stop();
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
  }
}

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 处理输入的第一帧
#[derive(Default)]
pub struct OneShotTask {
  recorder: Option<Arc<EventRecorder>>,
}

impl OneShotTask {
  pub fn with_recorder(mut self, recorder: Arc<EventRecorder>) -> Self {
    self.recorder = Some(recorder);
    self
  }
}

impl<I, O> Task<I, Arc<PlatePipeline>, O> for OneShotTask
where
  I: Iterator<Item = Result<Frame, InputError>>,
  O: Render<Frame, [PlateRead]>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = Vec<PlateRead>;
  type Error = TaskError;

  fn run_task(
    self,
    mut input: I,
    pipeline: Arc<PlatePipeline>,
    output: O,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or(TaskError::NoFrame)??;
    info!("输入帧 {}x{}，开始识别...", frame.width(), frame.height());

    let now = Instant::now();
    let reads = pipeline.process(&frame, SourceTag::Upload);
    info!("识别完成，{} 个车牌，耗时: {:.2?}", reads.len(), now.elapsed());

    if let Some(recorder) = &self.recorder {
      recorder.record(SourceTag::Upload, &reads);
    }
    output
      .render_result(&frame, &reads)
      .map_err(|e| TaskError::Render(Box::new(e)))?;
    Ok(reads)
  }
}

/// 连续任务的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskSummary {
  /// 已处理的帧数
  pub frames: usize,
  /// 读取到的车牌数
  pub reads: usize,
  /// 因处理过慢被丢弃的帧数
  pub dropped: u64,
}

/// 在独立线程上采集，在调用线程上逐帧识别
///
/// 输入由工厂函数在采集线程内打开，采集与处理之间是丢弃最旧帧的有界缓冲。
pub struct ContinuousTask {
  recorder: Option<Arc<EventRecorder>>,
  frame_number: Option<usize>,
  capacity: usize,
  stop: StopSignal,
}

impl Default for ContinuousTask {
  fn default() -> Self {
    Self {
      recorder: None,
      frame_number: None,
      capacity: DEFAULT_CAPACITY,
      stop: StopSignal::default(),
    }
  }
}

impl ContinuousTask {
  pub fn with_recorder(mut self, recorder: Arc<EventRecorder>) -> Self {
    self.recorder = Some(recorder);
    self
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_capacity(mut self, capacity: usize) -> Self {
    self.capacity = capacity;
    self
  }

  pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
    self.stop = stop;
    self
  }

  pub fn stop_signal(&self) -> StopSignal {
    self.stop.clone()
  }
}

fn capture_loop<F, I>(open: F, buffer: &DropOldestBuffer<Frame>, stop: &StopSignal) -> Result<(), InputError>
where
  F: FnOnce() -> Result<I, InputError>,
  I: Iterator<Item = Result<Frame, InputError>>,
{
  let input = open()?;
  info!("输入源已打开");
  let mut consecutive_errors = 0;
  for item in input {
    if stop.is_stopped() {
      break;
    }
    match item {
      Ok(frame) => {
        consecutive_errors = 0;
        match buffer.push(frame) {
          PushOutcome::Accepted => {}
          PushOutcome::DroppedOldest => warn!("处理过慢，丢弃最旧的一帧"),
          PushOutcome::Closed => break,
        }
      }
      Err(e) => {
        consecutive_errors += 1;
        warn!("跳过输入帧: {}", e);
        if consecutive_errors >= MAX_CONSECUTIVE_INPUT_ERRORS {
          return Err(e);
        }
      }
    }
  }
  Ok(())
}

impl<F, I, O> Task<F, Arc<PlatePipeline>, O> for ContinuousTask
where
  F: FnOnce() -> Result<I, InputError> + Send + 'static,
  I: Iterator<Item = Result<Frame, InputError>>,
  O: Render<Frame, [PlateRead]>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = TaskSummary;
  type Error = TaskError;

  fn run_task(
    self,
    open: F,
    pipeline: Arc<PlatePipeline>,
    output: O,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始连续任务...");
    let buffer = Arc::new(DropOldestBuffer::new(self.capacity));
    let producer = {
      let buffer = buffer.clone();
      let stop = self.stop.clone();
      thread::Builder::new()
        .name("lpr-capture".to_string())
        .spawn(move || {
          let result = capture_loop(open, &buffer, &stop);
          buffer.close();
          result
        })
        .map_err(TaskError::Spawn)?
    };

    let mut summary = TaskSummary::default();
    let mut failure = None;
    let mut now = Instant::now();
    while !self.stop.is_stopped() {
      let frame = match buffer.pop_timeout(POLL_INTERVAL) {
        PopResult::Item(frame) => frame,
        PopResult::Empty => continue,
        PopResult::Closed => break,
      };
      summary.frames += 1;
      debug!("处理第 {} 帧图像", summary.frames);

      let reads = pipeline.process(&frame, SourceTag::LiveStream);
      let elapsed_a = now.elapsed();
      summary.reads += reads.len();
      if let Some(recorder) = &self.recorder {
        recorder.record(SourceTag::LiveStream, &reads);
      }
      if let Err(e) = output.render_result(&frame, &reads) {
        warn!("渲染失败，退出任务循环: {}", e);
        failure = Some(TaskError::Render(Box::new(e)));
        break;
      }
      let elapsed_b = now.elapsed();
      now = Instant::now();
      debug!("识别完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);

      if self.frame_number.is_some_and(|n| summary.frames >= n) {
        info!("达到指定帧数 {}, 退出任务循环", summary.frames);
        break;
      }
    }
    if self.stop.is_stopped() {
      warn!("收到停止信号，退出任务循环");
    }

    buffer.close();
    let captured = producer.join().map_err(|_| TaskError::CapturePanicked)?;
    summary.dropped = buffer.dropped();
    info!(
      "任务完成: {} 帧, {} 个车牌, 丢弃 {} 帧",
      summary.frames, summary.reads, summary.dropped
    );

    if let Some(e) = failure {
      return Err(e);
    }
    captured?;
    Ok(summary)
  }
}
