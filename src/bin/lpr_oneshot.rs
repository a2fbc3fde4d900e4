// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/lpr_oneshot.rs - 单张图像车牌识别
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
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use shanan_lpr::{
  FromUrl,
  args::PipelineArgs,
  input::InputWrapper,
  output::OutputWrapper,
  task::{OneShotTask, Task},
};

/// 识别一张图像中的车牌，结果以 JSON 输出到标准输出
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像，例如 image:///path/car.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 标注结果输出，例如 image:///path/out.jpg
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  #[command(flatten)]
  pub pipeline: PipelineArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  info!("输入来源: {}", args.input);

  let pipeline = Arc::new(args.pipeline.build_pipeline()?);
  let recorder = Arc::new(args.pipeline.build_recorder()?);
  let input = InputWrapper::from_url(&args.input)?;
  let output = args.output.as_ref().map(OutputWrapper::from_url).transpose()?;

  let reads = OneShotTask::default()
    .with_recorder(recorder)
    .run_task(input, pipeline, output)?;

  let results: Vec<_> = reads.iter().map(|read| read.as_pair()).collect();
  println!("{}", json!({ "results": results }));
  Ok(())
}
