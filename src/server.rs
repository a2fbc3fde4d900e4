// 该文件是 Shanan （山南西风） 项目的一部分。
// src/server.rs - HTTP 服务：上传识别与实时视频流
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

//! 路由：
//! - `GET /` 上传表单与实时画面
//! - `GET /health` 健康检查
//! - `POST /upload` 上传一张图片（multipart 字段 `image`）
//! - `GET /video_feed` 标注后的 multipart JPEG 流

use std::{convert::Infallible, net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
  Json, Router,
  body::Body,
  extract::{DefaultBodyLimit, Multipart, State},
  http::{StatusCode, header},
  response::{Html, IntoResponse, Response},
  routing::{get, post},
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl,
  event::EventRecorder,
  frame::Frame,
  input::InputWrapper,
  output::{
    Render,
    draw::Draw,
    mjpeg::{self, DEFAULT_JPEG_QUALITY, MjpegError},
  },
  pipeline::{PlatePipeline, PlateRead},
  task::{ContinuousTask, StopSignal, Task, TaskError},
  upload::{UploadError, UploadService},
};

/// 上传请求体的上限
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
/// 每个视频流连接在采集与发送之间缓冲的帧数
const STREAM_CHANNEL_CAPACITY: usize = 2;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Number Plate Recognition</title></head>
<body>
<h1>Number Plate Recognition</h1>
<form action="/upload" method="post" enctype="multipart/form-data">
  <input type="file" name="image" accept=".png,.jpg,.jpeg,.bmp">
  <button type="submit">Upload</button>
</form>
<h2>Live Stream</h2>
<img src="/video_feed" alt="live stream">
</body>
</html>
"#;

#[derive(Clone)]
pub struct AppState {
  pipeline: Arc<PlatePipeline>,
  recorder: Arc<EventRecorder>,
  upload: Arc<UploadService>,
  live_source: Option<Url>,
  jpeg_quality: u8,
  shutdown: StopSignal,
}

impl AppState {
  pub fn new(
    pipeline: Arc<PlatePipeline>,
    recorder: Arc<EventRecorder>,
    upload_dir: impl Into<PathBuf>,
  ) -> Self {
    let upload = UploadService::new(upload_dir, pipeline.clone(), recorder.clone());
    Self {
      pipeline,
      recorder,
      upload: Arc::new(upload),
      live_source: None,
      jpeg_quality: DEFAULT_JPEG_QUALITY,
      shutdown: StopSignal::new(),
    }
  }

  /// 实时画面的输入源，每个 `/video_feed` 连接单独打开
  pub fn with_live_source(mut self, source: Url) -> Self {
    self.live_source = Some(source);
    self
  }

  pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
    self.jpeg_quality = quality;
    self
  }

  /// 置位后所有视频流结束
  pub fn shutdown_signal(&self) -> StopSignal {
    self.shutdown.clone()
  }
}

#[derive(Error, Debug)]
pub enum ApiError {
  #[error(transparent)]
  Upload(#[from] UploadError),
  #[error("{0}")]
  BadRequest(String),
  #[error("{0}")]
  NotFound(String),
  #[error("{0}")]
  Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
  error: String,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self {
      ApiError::Upload(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Upload(_) | ApiError::Internal(_) => {
        error!("请求处理失败: {}", self);
        StatusCode::INTERNAL_SERVER_ERROR
      }
    };
    let body = Json(ErrorResponse {
      error: self.to_string(),
    });
    (status, body).into_response()
  }
}

#[derive(Serialize)]
pub struct UploadResponse {
  pub results: Vec<(String, f32)>,
}

#[derive(Serialize)]
pub struct HealthResponse {
  pub status: &'static str,
  pub version: &'static str,
  pub live_source: bool,
}

pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/", get(index))
    .route("/health", get(health))
    .route("/upload", post(upload))
    .route("/video_feed", get(video_feed))
    .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

/// 监听地址并服务，直到收到 Ctrl-C
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
  let listener = tokio::net::TcpListener::bind(addr).await?;
  info!("HTTP 服务监听 {}", listener.local_addr()?);

  let shutdown = state.shutdown_signal();
  axum::serve(listener, router(state))
    .with_graceful_shutdown(async move {
      if let Err(e) = tokio::signal::ctrl_c().await {
        error!("无法监听中断信号: {}", e);
        std::future::pending::<()>().await;
      }
      info!("收到中断信号，停止服务...");
      shutdown.stop();
    })
    .await?;

  info!("服务已停止");
  Ok(())
}

async fn index() -> Html<&'static str> {
  Html(INDEX_HTML)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
  Json(HealthResponse {
    status: "ok",
    version: env!("CARGO_PKG_VERSION"),
    live_source: state.live_source.is_some(),
  })
}

async fn upload(
  State(state): State<AppState>,
  mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
  let mut file = None;
  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|e| ApiError::BadRequest(e.to_string()))?
  {
    if field.name() != Some("image") {
      debug!("忽略表单字段 {:?}", field.name());
      continue;
    }
    let filename = field.file_name().unwrap_or_default().to_string();
    let data = field
      .bytes()
      .await
      .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    debug!("收到上传文件 {:?}, {} 字节", filename, data.len());
    file = Some((filename, data));
    break;
  }

  let service = state.upload.clone();
  let outcome = tokio::task::spawn_blocking(move || match &file {
    Some((filename, data)) => service.handle(Some(filename.as_str()), data),
    None => service.handle(None, &[]),
  })
  .await
  .map_err(|e| ApiError::Internal(e.to_string()))??;

  Ok(Json(UploadResponse {
    results: outcome
      .reads
      .iter()
      .map(|read| (read.plate_text.clone(), read.confidence))
      .collect(),
  }))
}

#[derive(Error, Debug)]
enum StreamError {
  #[error("客户端已断开")]
  Disconnected,
  #[error(transparent)]
  Mjpeg(#[from] MjpegError),
}

/// 把标注后的帧作为 multipart part 发给 HTTP 响应体
struct ChannelOutput {
  tx: mpsc::Sender<Result<Vec<u8>, Infallible>>,
  draw: Draw,
  quality: u8,
}

impl Render<Frame, [PlateRead]> for ChannelOutput {
  type Error = StreamError;

  fn render_result(&self, frame: &Frame, result: &[PlateRead]) -> Result<(), Self::Error> {
    let part = mjpeg::annotated_part(&self.draw, frame, result, self.quality)?;
    self
      .tx
      .blocking_send(Ok(part))
      .map_err(|_| StreamError::Disconnected)
  }
}

async fn video_feed(State(state): State<AppState>) -> Result<Response, ApiError> {
  let source = state
    .live_source
    .clone()
    .ok_or_else(|| ApiError::NotFound("No live source configured".to_string()))?;

  let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
  let output = ChannelOutput {
    tx,
    draw: Draw::default(),
    quality: state.jpeg_quality,
  };
  let task = ContinuousTask::default()
    .with_recorder(state.recorder.clone())
    .with_stop_signal(state.shutdown.clone());
  let pipeline = state.pipeline.clone();

  info!("开始实时视频流: {}", source);
  tokio::task::spawn_blocking(move || {
    let open = move || InputWrapper::from_url(&source);
    match task.run_task(open, pipeline, output) {
      Ok(summary) => info!("视频流结束: {} 帧", summary.frames),
      Err(TaskError::Render(e)) => info!("视频流结束: {}", e),
      Err(e) => warn!("视频流异常结束: {}", e),
    }
  });

  let body = Body::from_stream(ReceiverStream::new(rx));
  Ok(([(header::CONTENT_TYPE, mjpeg::content_type())], body).into_response())
}
