// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/mjpeg.rs - multipart JPEG 流
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

//! `multipart/x-mixed-replace` 格式的 JPEG 帧流。
//!
//! 每一帧是一个独立的 part：
//! `--frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n`。

use std::{
  fs::{File, OpenOptions},
  io::{BufWriter, Write},
  path::Path,
  sync::{Mutex, PoisonError},
};

use image::{RgbImage, codecs::jpeg::JpegEncoder};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  output::{Render, draw::Draw},
  pipeline::PlateRead,
  utils::{query_map, query_value, url_file_path},
};

pub const BOUNDARY: &str = "frame";
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Error, Debug)]
pub enum MjpegError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JPEG 编码错误: {0}")]
  EncodeError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("参数无效: {0}")]
  InvalidParameter(String),
}

/// HTTP 响应的 Content-Type
pub fn content_type() -> String {
  format!("multipart/x-mixed-replace; boundary={}", BOUNDARY)
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, MjpegError> {
  let mut buffer = Vec::new();
  JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).encode_image(image)?;
  Ok(buffer)
}

/// 把一帧 JPEG 包装成一个 multipart part
pub fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
  let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", BOUNDARY);
  let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
  part.extend_from_slice(header.as_bytes());
  part.extend_from_slice(jpeg);
  part.extend_from_slice(b"\r\n");
  part
}

/// 标注帧并编码为 multipart part
pub fn annotated_part(
  draw: &Draw,
  frame: &Frame,
  reads: &[PlateRead],
  quality: u8,
) -> Result<Vec<u8>, MjpegError> {
  let image = draw.render(frame, reads);
  Ok(multipart_part(&encode_jpeg(&image, quality)?))
}

/// 把标注后的帧依次追加到一个 MJPEG 文件
pub struct MjpegFileOutput {
  writer: Mutex<BufWriter<File>>,
  quality: u8,
  draw: Draw,
}

impl FromUrlWithScheme for MjpegFileOutput {
  const SCHEME: &'static str = "mjpeg";
}

impl FromUrl for MjpegFileOutput {
  type Error = MjpegError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(MjpegError::SchemeMismatch(url.scheme().to_string()));
    }
    let query = query_map(url);
    let quality =
      query_value(&query, "quality", DEFAULT_JPEG_QUALITY).map_err(MjpegError::InvalidParameter)?;
    Self::create(url_file_path(url), quality)
  }
}

impl MjpegFileOutput {
  pub fn create(path: impl AsRef<Path>, quality: u8) -> Result<Self, MjpegError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
      .create(true)
      .write(true)
      .truncate(true)
      .open(path)?;
    info!("MJPEG 输出文件: {}", path.display());

    Ok(Self {
      writer: Mutex::new(BufWriter::new(file)),
      quality,
      draw: Draw::default(),
    })
  }
}

impl Render<Frame, [PlateRead]> for MjpegFileOutput {
  type Error = MjpegError;

  fn render_result(&self, frame: &Frame, result: &[PlateRead]) -> Result<(), Self::Error> {
    let part = annotated_part(&self.draw, frame, result, self.quality)?;
    let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
    writer.write_all(&part)?;
    writer.flush()?;
    debug!("写入 MJPEG 帧 {} 字节", part.len());
    Ok(())
  }
}
