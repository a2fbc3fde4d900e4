// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - RGB 帧定义
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

use image::{DynamicImage, GrayImage, RgbImage, imageops};
use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
  #[error("帧尺寸为零: {width}x{height}")]
  EmptyFrame { width: u32, height: u32 },
  #[error("不支持的通道数: {0}")]
  UnsupportedChannels(usize),
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 一帧 RGB 图像
///
/// 帧由获取它的调用方持有，流水线只以只读引用的方式使用。
#[derive(Debug, Clone)]
pub struct Frame {
  image: RgbImage,
}

impl Frame {
  pub fn new(image: RgbImage) -> Self {
    Self { image }
  }

  /// 从交错排列（HWC）的原始像素构造帧
  ///
  /// 支持 1 通道（灰度）、3 通道（RGB）和 4 通道（RGBA，丢弃 alpha）。
  pub fn from_raw(
    width: u32,
    height: u32,
    channels: usize,
    data: Vec<u8>,
  ) -> Result<Self, FrameError> {
    if width == 0 || height == 0 {
      return Err(FrameError::EmptyFrame { width, height });
    }

    let pixels = width as usize * height as usize;
    let expected = pixels * channels;
    if !matches!(channels, 1 | 3 | 4) {
      return Err(FrameError::UnsupportedChannels(channels));
    }
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    let rgb = match channels {
      3 => data,
      1 => data.iter().flat_map(|&v| [v, v, v]).collect(),
      _ => data
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect(),
    };

    RgbImage::from_raw(width, height, rgb)
      .map(Self::new)
      .ok_or(FrameError::LengthMismatch {
        expected: pixels * RGB_CHANNELS,
        actual: 0,
      })
  }

  /// 检查帧是否可以送入检测模型
  pub fn validate(&self) -> Result<(), FrameError> {
    let (width, height) = self.image.dimensions();
    if width == 0 || height == 0 {
      return Err(FrameError::EmptyFrame { width, height });
    }
    let expected = width as usize * height as usize * RGB_CHANNELS;
    if self.image.as_raw().len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: self.image.as_raw().len(),
      });
    }
    Ok(())
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn into_image(self) -> RgbImage {
    self.image
  }

  pub fn to_luma(&self) -> GrayImage {
    imageops::grayscale(&self.image)
  }

  /// 缩放到模型输入尺寸并返回 NHWC 排列的字节
  pub fn to_nhwc_resized(&self, width: u32, height: u32) -> Vec<u8> {
    if self.image.dimensions() == (width, height) {
      return self.image.as_raw().clone();
    }
    imageops::resize(&self.image, width, height, imageops::FilterType::Triangle).into_raw()
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Self::new(image)
  }
}

impl From<DynamicImage> for Frame {
  fn from(image: DynamicImage) -> Self {
    Self::new(image.to_rgb8())
  }
}

impl AsRef<RgbImage> for Frame {
  fn as_ref(&self) -> &RgbImage {
    &self.image
  }
}
