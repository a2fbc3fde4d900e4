// 该文件是 Shanan （山南西风） 项目的一部分。
// src/extract.rs - 车牌区域裁剪
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

use image::{RgbImage, imageops};
use thiserror::Error;

use crate::{frame::Frame, model::BoundingBox};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
  #[error("裁剪区域无效: ({x_min}, {y_min})-({x_max}, {y_max})")]
  InvalidRegion {
    x_min: f32,
    y_min: f32,
    x_max: f32,
    y_max: f32,
  },
}

/// 裁剪后的像素矩形，右下角不包含在内
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRegion {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

/// 从帧中裁出检测框对应的子图
///
/// 越界的坐标会被截断到帧内，截断后面积为零时返回 [`ExtractError::InvalidRegion`]。
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionExtractor {
  padding: f32,
}

impl RegionExtractor {
  pub fn new() -> Self {
    Self::default()
  }

  /// 按检测框宽高的比例向外扩展，负值视为 0
  pub fn with_padding(mut self, padding: f32) -> Self {
    self.padding = if padding.is_finite() { padding.max(0.0) } else { 0.0 };
    self
  }

  pub fn padding(&self) -> f32 {
    self.padding
  }

  pub fn clamp_region(
    &self,
    bbox: &BoundingBox,
    width: u32,
    height: u32,
  ) -> Result<PixelRegion, ExtractError> {
    let invalid = || ExtractError::InvalidRegion {
      x_min: bbox.x_min,
      y_min: bbox.y_min,
      x_max: bbox.x_max,
      y_max: bbox.y_max,
    };

    let coords = [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max];
    if !coords.iter().all(|v| v.is_finite()) {
      return Err(invalid());
    }

    let pad_x = bbox.width() * self.padding;
    let pad_y = bbox.height() * self.padding;
    let (w, h) = (width as f32, height as f32);
    let x0 = (bbox.x_min - pad_x).floor().clamp(0.0, w);
    let y0 = (bbox.y_min - pad_y).floor().clamp(0.0, h);
    let x1 = (bbox.x_max + pad_x).ceil().clamp(0.0, w);
    let y1 = (bbox.y_max + pad_y).ceil().clamp(0.0, h);

    if x1 <= x0 || y1 <= y0 {
      return Err(invalid());
    }

    Ok(PixelRegion {
      x: x0 as u32,
      y: y0 as u32,
      width: (x1 - x0) as u32,
      height: (y1 - y0) as u32,
    })
  }

  pub fn extract(&self, frame: &Frame, bbox: &BoundingBox) -> Result<RgbImage, ExtractError> {
    let region = self.clamp_region(bbox, frame.width(), frame.height())?;
    Ok(imageops::crop_imm(frame.image(), region.x, region.y, region.width, region.height).to_image())
  }
}
