// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/lpr_continuous.rs - 连续帧车牌识别
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use shanan_lpr::{
  FromUrl,
  args::PipelineArgs,
  buffer::DEFAULT_CAPACITY,
  input::InputWrapper,
  output::OutputWrapper,
  task::{ContinuousTask, StopSignal, Task},
};

/// 从摄像头或图像目录持续识别车牌并记录事件
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源，例如 v4l2:///dev/video0 或 dir:///frames?fps=10
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 标注结果输出，例如 mjpeg:///tmp/stream.mjpeg
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  /// 处理多少帧后退出，缺省为不限
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,

  /// 采集与识别之间缓冲的帧数
  #[arg(long, default_value_t = DEFAULT_CAPACITY, value_name = "COUNT")]
  pub buffer: usize,

  #[command(flatten)]
  pub pipeline: PipelineArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();
  info!("输入来源: {}", args.input);

  let pipeline = Arc::new(args.pipeline.build_pipeline()?);
  let recorder = Arc::new(args.pipeline.build_recorder()?);
  let output = args.output.as_ref().map(OutputWrapper::from_url).transpose()?;

  let stop = StopSignal::new();
  stop.install_ctrlc()?;

  let source = args.input.clone();
  let summary = ContinuousTask::default()
    .with_recorder(recorder)
    .with_frame_number(args.frame_number)
    .with_capacity(args.buffer)
    .with_stop_signal(stop)
    .run_task(move || InputWrapper::from_url(&source), pipeline, output)?;

  info!(
    "共处理 {} 帧，读取 {} 个车牌，丢弃 {} 帧",
    summary.frames, summary.reads, summary.dropped
  );
  Ok(())
}
