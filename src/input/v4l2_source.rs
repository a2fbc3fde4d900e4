// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/v4l2_source.rs - V4L2 摄像头输入源
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::RgbImage;
use thiserror::Error;
use tracing::{error, info};
use url::Url;
use v4l::{
  FourCC,
  buffer::Type,
  io::{mmap::Stream, traits::CaptureStream},
  prelude::*,
  video::Capture,
};

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  utils::{query_map, query_value},
};

const DEFAULT_DEVICE: &str = "/dev/video0";
const BUFFER_COUNT: u32 = 4;

#[derive(Error, Debug)]
pub enum V4l2SourceError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无法打开设备 {0}: {1}")]
  Open(String, std::io::Error),
  #[error("设备 I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("设备不支持 YUYV 格式: {0}")]
  UnsupportedFormat(String),
  #[error("帧数据长度不符: {0} 字节")]
  BufferSize(usize),
  #[error("参数无效: {0}")]
  InvalidParameter(String),
}

/// V4L2 摄像头，以 YUYV 格式采集并转换为 RGB
///
/// `v4l2:///dev/video0?width=640&height=480`
pub struct V4l2Source {
  stream: Stream<'static>,
  width: u32,
  height: u32,
}

impl FromUrlWithScheme for V4l2Source {
  const SCHEME: &'static str = "v4l2";
}

impl FromUrl for V4l2Source {
  type Error = V4l2SourceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4l2SourceError::SchemeMismatch(url.scheme().to_string()));
    }
    let query = query_map(url);
    let width = query_value(&query, "width", 640u32).map_err(V4l2SourceError::InvalidParameter)?;
    let height =
      query_value(&query, "height", 480u32).map_err(V4l2SourceError::InvalidParameter)?;
    let device = match url.path() {
      "" | "/" => DEFAULT_DEVICE,
      path => path,
    };
    Self::open(device, width, height)
  }
}

impl V4l2Source {
  pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, V4l2SourceError> {
    let device = Device::with_path(device_path)
      .map_err(|e| V4l2SourceError::Open(device_path.to_string(), e))?;

    let mut format = device.format()?;
    format.width = width;
    format.height = height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format)?;
    if format.fourcc != FourCC::new(b"YUYV") {
      return Err(V4l2SourceError::UnsupportedFormat(format.fourcc.to_string()));
    }
    info!(
      "打开摄像头 {}: {}x{}",
      device_path, format.width, format.height
    );

    let stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)?;
    Ok(Self {
      stream,
      width: format.width,
      height: format.height,
    })
  }

  fn capture(&mut self) -> Result<Frame, V4l2SourceError> {
    let (buffer, _meta) = self.stream.next()?;
    let rgb = yuyv_to_rgb(buffer);
    let len = rgb.len();
    let image =
      RgbImage::from_raw(self.width, self.height, rgb).ok_or(V4l2SourceError::BufferSize(len))?;
    Ok(Frame::new(image))
  }
}

impl Iterator for V4l2Source {
  type Item = Result<Frame, V4l2SourceError>;

  fn next(&mut self) -> Option<Self::Item> {
    Some(self.capture())
  }
}

/// 每 4 字节 (Y0 U Y1 V) 展开为两个 RGB 像素
fn yuyv_to_rgb(yuyv: &[u8]) -> Vec<u8> {
  let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);
  for chunk in yuyv.chunks_exact(4) {
    let u = chunk[1] as f32 - 128.0;
    let v = chunk[3] as f32 - 128.0;
    for y in [chunk[0] as f32, chunk[2] as f32] {
      rgb.extend_from_slice(&[
        (y + 1.402 * v).clamp(0.0, 255.0) as u8,
        (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8,
        (y + 1.772 * u).clamp(0.0, 255.0) as u8,
      ]);
    }
  }
  rgb
}
