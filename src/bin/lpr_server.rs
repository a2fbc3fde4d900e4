// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/lpr_server.rs - 车牌识别 HTTP 服务
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use shanan_lpr::{
  args::PipelineArgs,
  output::mjpeg::DEFAULT_JPEG_QUALITY,
  server::{self, AppState},
};

/// 提供上传识别与实时视频流的 HTTP 服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 监听地址
  #[arg(long, default_value = "0.0.0.0:5000", value_name = "ADDR")]
  pub listen: SocketAddr,

  /// 上传文件保存目录
  #[arg(long, default_value = "uploads", value_name = "DIR")]
  pub upload_dir: PathBuf,

  /// 实时画面来源，例如 v4l2:///dev/video0；缺省时 /video_feed 返回 404
  #[arg(long, value_name = "SOURCE")]
  pub live_source: Option<Url>,

  /// 视频流 JPEG 质量 (1 - 100)
  #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, value_name = "QUALITY")]
  pub jpeg_quality: u8,

  #[command(flatten)]
  pub pipeline: PipelineArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
    )
    .init();

  let args = Args::parse();

  let pipeline = Arc::new(args.pipeline.build_pipeline()?);
  let recorder = Arc::new(args.pipeline.build_recorder()?);
  info!("上传目录: {}", args.upload_dir.display());

  let mut state = AppState::new(pipeline, recorder, args.upload_dir)
    .with_jpeg_quality(args.jpeg_quality);
  if let Some(source) = args.live_source {
    info!("实时画面来源: {}", source);
    state = state.with_live_source(source);
  }

  server::serve(args.listen, state).await?;
  Ok(())
}
