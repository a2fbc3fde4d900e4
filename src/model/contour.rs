// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/contour.rs - 基于连通域的车牌定位
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! 不需要权重文件的车牌定位器。
//!
//! 流程：灰度 → 可选高斯模糊 → Otsu 二值化 → 8 连通域 → 几何过滤 → 打分。
//! 分数由三部分组成：外接框边缘被连通域覆盖的比例（矩形程度）、
//! 横向扫描线上的笔画跳变数（文字证据）以及宽高比与理想值的接近程度。

use std::str::FromStr;

use image::GrayImage;
use imageproc::{contrast::otsu_level, filter::gaussian_blur_f32};
use tracing::debug;
use url::Url;

use super::{
  BoundingBox, DetectError, DetectParams, ModelError, PlateLabel, RegionDetector, WithLabel,
  postprocess::filter_boxes,
  region::{ComponentStats, Components, FOREGROUND, binarize, intensity_range, label_components},
};
use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  utils::{query_map, query_value},
};

const RECT_WEIGHT: f32 = 0.4;
const TEXT_WEIGHT: f32 = 0.35;
const ASPECT_WEIGHT: f32 = 0.25;
/// 采样扫描线的相对高度
const SCAN_ROWS: [f32; 3] = [0.35, 0.5, 0.65];
/// 少于该笔画数的区域不可能是车牌
const MIN_STROKES: f32 = 2.0;
/// 达到该笔画数时文字得分为满分
const EXPECTED_STROKES: f32 = 5.0;

/// 车牌相对背景的明暗
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
  /// 亮底暗字
  Bright,
  /// 暗底亮字
  Dark,
  Both,
}

impl FromStr for Polarity {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "bright" => Ok(Polarity::Bright),
      "dark" => Ok(Polarity::Dark),
      "both" => Ok(Polarity::Both),
      other => Err(format!("未知的极性: {}", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContourDetectorBuilder {
  min_aspect: f32,
  max_aspect: f32,
  ideal_aspect: f32,
  min_area: f32,
  max_area: f32,
  min_fill: f32,
  min_height: u32,
  min_contrast: u8,
  blur: f32,
  polarity: Polarity,
}

impl Default for ContourDetectorBuilder {
  fn default() -> Self {
    Self {
      min_aspect: 1.5,
      max_aspect: 7.0,
      ideal_aspect: 4.0,
      min_area: 0.001,
      max_area: 0.5,
      min_fill: 0.45,
      min_height: 8,
      min_contrast: 40,
      blur: 0.0,
      polarity: Polarity::Bright,
    }
  }
}

impl ContourDetectorBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// 宽高比范围
  pub fn aspect_range(mut self, min: f32, max: f32) -> Self {
    self.min_aspect = min;
    self.max_aspect = max;
    self
  }

  /// 外接框面积占整帧面积的比例范围
  pub fn area_range(mut self, min: f32, max: f32) -> Self {
    self.min_area = min;
    self.max_area = max;
    self
  }

  pub fn min_fill(mut self, min_fill: f32) -> Self {
    self.min_fill = min_fill;
    self
  }

  pub fn min_contrast(mut self, min_contrast: u8) -> Self {
    self.min_contrast = min_contrast;
    self
  }

  /// 高斯模糊的 sigma，0 表示不模糊
  pub fn blur(mut self, sigma: f32) -> Self {
    self.blur = sigma;
    self
  }

  pub fn polarity(mut self, polarity: Polarity) -> Self {
    self.polarity = polarity;
    self
  }

  fn check(&self) -> Result<(), ModelError> {
    if !(self.min_aspect > 0.0 && self.min_aspect < self.max_aspect) {
      return Err(ModelError::InvalidParameter(format!(
        "宽高比范围无效: {} - {}",
        self.min_aspect, self.max_aspect
      )));
    }
    if !(self.min_area >= 0.0 && self.min_area < self.max_area && self.max_area <= 1.0) {
      return Err(ModelError::InvalidParameter(format!(
        "面积比例范围无效: {} - {}",
        self.min_area, self.max_area
      )));
    }
    if !(0.0..=1.0).contains(&self.min_fill) {
      return Err(ModelError::InvalidParameter(format!(
        "填充率无效: {}",
        self.min_fill
      )));
    }
    if !(self.blur >= 0.0 && self.blur.is_finite()) {
      return Err(ModelError::InvalidParameter(format!(
        "模糊参数无效: {}",
        self.blur
      )));
    }
    Ok(())
  }

  pub fn build(self) -> ContourDetector {
    ContourDetector { config: self }
  }
}

impl FromUrl for ContourDetectorBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::SchemeMismatch(url.scheme().to_string()));
    }

    let query = query_map(url);
    let d = Self::default();
    let builder = Self {
      min_aspect: query_value(&query, "min_aspect", d.min_aspect)
        .map_err(ModelError::InvalidParameter)?,
      max_aspect: query_value(&query, "max_aspect", d.max_aspect)
        .map_err(ModelError::InvalidParameter)?,
      ideal_aspect: query_value(&query, "ideal_aspect", d.ideal_aspect)
        .map_err(ModelError::InvalidParameter)?,
      min_area: query_value(&query, "min_area", d.min_area).map_err(ModelError::InvalidParameter)?,
      max_area: query_value(&query, "max_area", d.max_area).map_err(ModelError::InvalidParameter)?,
      min_fill: query_value(&query, "min_fill", d.min_fill).map_err(ModelError::InvalidParameter)?,
      min_height: query_value(&query, "min_height", d.min_height)
        .map_err(ModelError::InvalidParameter)?,
      min_contrast: query_value(&query, "min_contrast", d.min_contrast)
        .map_err(ModelError::InvalidParameter)?,
      blur: query_value(&query, "blur", d.blur).map_err(ModelError::InvalidParameter)?,
      polarity: query_value(&query, "polarity", d.polarity).map_err(ModelError::InvalidParameter)?,
    };
    builder.check()?;
    Ok(builder)
  }
}

impl FromUrlWithScheme for ContourDetectorBuilder {
  const SCHEME: &'static str = "contour";
}

/// 连通域车牌定位器，构造后只读，可在线程间共享
#[derive(Debug, Clone)]
pub struct ContourDetector {
  config: ContourDetectorBuilder,
}

impl ContourDetector {
  fn candidates(&self, mask: &GrayImage) -> Vec<BoundingBox> {
    let cfg = &self.config;
    let frame_area = mask.width() as f32 * mask.height() as f32;
    let components = label_components(mask);

    components
      .stats
      .iter()
      .filter_map(|c| {
        let area_ratio = c.bbox_area() as f32 / frame_area;
        if area_ratio < cfg.min_area || area_ratio > cfg.max_area || c.height() < cfg.min_height {
          return None;
        }
        let aspect = c.width() as f32 / c.height() as f32;
        if aspect < cfg.min_aspect || aspect > cfg.max_aspect || c.fill() < cfg.min_fill {
          return None;
        }
        let strokes = stroke_count(mask, c);
        if strokes < MIN_STROKES {
          return None;
        }

        let rect = border_coverage(&components, c);
        let text = (strokes / EXPECTED_STROKES).min(1.0);
        let fit = self.aspect_score(aspect);
        let score = (RECT_WEIGHT * rect + TEXT_WEIGHT * text + ASPECT_WEIGHT * fit).clamp(0.0, 1.0);
        debug!(
          "候选区域 ({}, {})-({}, {}): 矩形度 {:.2}, 笔画 {:.1}, 宽高比 {:.2}, 得分 {:.3}",
          c.min_x, c.min_y, c.max_x, c.max_y, rect, strokes, aspect, score
        );

        Some(BoundingBox::new(
          c.min_x as f32,
          c.min_y as f32,
          (c.max_x + 1) as f32,
          (c.max_y + 1) as f32,
          PlateLabel::LicensePlate.to_label_id(),
          score,
        ))
      })
      .collect()
  }

  /// 宽高比与理想值在对数尺度上的接近程度
  fn aspect_score(&self, aspect: f32) -> f32 {
    let cfg = &self.config;
    let span = (cfg.max_aspect / cfg.min_aspect).ln();
    if span <= 0.0 {
      return 0.0;
    }
    (1.0 - (aspect / cfg.ideal_aspect).ln().abs() / span).clamp(0.0, 1.0)
  }
}

impl RegionDetector for ContourDetector {
  fn detect(&self, frame: &Frame, params: &DetectParams) -> Result<Vec<BoundingBox>, DetectError> {
    frame.validate()?;

    let mut gray = frame.to_luma();
    if self.config.blur > 0.0 {
      gray = gaussian_blur_f32(&gray, self.config.blur);
    }

    let (lo, hi) = intensity_range(&gray);
    if hi.saturating_sub(lo) < self.config.min_contrast {
      debug!("帧对比度不足 ({} - {})，跳过定位", lo, hi);
      return Ok(Vec::new());
    }

    let level = otsu_level(&gray);
    let mut boxes = Vec::new();
    if matches!(self.config.polarity, Polarity::Bright | Polarity::Both) {
      boxes.extend(self.candidates(&binarize(&gray, |v| v > level)));
    }
    if matches!(self.config.polarity, Polarity::Dark | Polarity::Both) {
      boxes.extend(self.candidates(&binarize(&gray, |v| v <= level)));
    }

    Ok(filter_boxes(boxes, params))
  }
}

/// 外接框四条边上属于该连通域的像素比例
fn border_coverage(components: &Components, c: &ComponentStats) -> f32 {
  let mut covered = 0u32;
  let mut total = 0u32;
  let mut visit = |x: u32, y: u32| {
    total += 1;
    if components.label_at(x, y) == c.label {
      covered += 1;
    }
  };

  for x in c.min_x..=c.max_x {
    visit(x, c.min_y);
    if c.max_y != c.min_y {
      visit(x, c.max_y);
    }
  }
  if c.max_y > c.min_y + 1 {
    for y in (c.min_y + 1)..c.max_y {
      visit(c.min_x, y);
      if c.max_x != c.min_x {
        visit(c.max_x, y);
      }
    }
  }

  if total == 0 { 0.0 } else { covered as f32 / total as f32 }
}

/// 扫描线上前景/背景跳变数的一半，近似字符笔画数
fn stroke_count(mask: &GrayImage, c: &ComponentStats) -> f32 {
  let height = c.height() as f32;
  let transitions: u32 = SCAN_ROWS
    .iter()
    .map(|frac| {
      let y = c.min_y + ((height * frac) as u32).min(c.height() - 1);
      (c.min_x..c.max_x)
        .filter(|&x| {
          (mask.get_pixel(x, y)[0] == FOREGROUND) != (mask.get_pixel(x + 1, y)[0] == FOREGROUND)
        })
        .count() as u32
    })
    .sum();
  transitions as f32 / SCAN_ROWS.len() as f32 / 2.0
}
