// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::sync::Arc;

use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, FrameError},
};

pub const DEFAULT_CONF_THRESHOLD: f32 = 0.5;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.4;
pub const DEFAULT_MAX_DETECTIONS: usize = 1000;

/// 检测阈值参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectParams {
  pub conf_threshold: f32,
  pub iou_threshold: f32,
  pub max_detections: usize,
}

impl Default for DetectParams {
  fn default() -> Self {
    Self {
      conf_threshold: DEFAULT_CONF_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      max_detections: DEFAULT_MAX_DETECTIONS,
    }
  }
}

/// 车牌区域检测器
///
/// 实现必须是纯函数：相同的帧和权重总是得到相同的结果。
/// 不可重入的推理后端需要自行在内部加锁。
pub trait RegionDetector: Send + Sync {
  fn detect(&self, frame: &Frame, params: &DetectParams) -> Result<Vec<BoundingBox>, DetectError>;
}

/// 文字识别器
///
/// 返回空序列表示区域内没有可读文字，这不是错误。
pub trait TextRecognizer: Send + Sync {
  fn recognize(&self, crop: &RgbImage) -> Result<Vec<RecognitionResult>, RecognizeError>;
}

impl<T: RegionDetector + ?Sized> RegionDetector for Arc<T> {
  fn detect(&self, frame: &Frame, params: &DetectParams) -> Result<Vec<BoundingBox>, DetectError> {
    (**self).detect(frame, params)
  }
}

impl<T: TextRecognizer + ?Sized> TextRecognizer for Arc<T> {
  fn recognize(&self, crop: &RgbImage) -> Result<Vec<RecognitionResult>, RecognizeError> {
    (**self).recognize(crop)
  }
}

/// 像素坐标下的轴对齐检测框
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
  pub x_min: f32,
  pub y_min: f32,
  pub x_max: f32,
  pub y_max: f32,
  pub class_id: u32,
  pub score: f32,
}

impl BoundingBox {
  pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32, class_id: u32, score: f32) -> Self {
    Self {
      x_min,
      y_min,
      x_max,
      y_max,
      class_id,
      score,
    }
  }

  /// 由归一化坐标 [x_min, y_min, x_max, y_max] 换算到像素坐标
  pub fn from_normalized(bbox: [f32; 4], width: u32, height: u32, class_id: u32, score: f32) -> Self {
    let (w, h) = (width as f32, height as f32);
    Self::new(bbox[0] * w, bbox[1] * h, bbox[2] * w, bbox[3] * h, class_id, score)
  }

  pub fn width(&self) -> f32 {
    (self.x_max - self.x_min).max(0.0)
  }

  pub fn height(&self) -> f32 {
    (self.y_max - self.y_min).max(0.0)
  }

  pub fn area(&self) -> f32 {
    self.width() * self.height()
  }

  /// 坐标有限、非退化且置信度在 [0, 1] 内
  pub fn is_valid(&self) -> bool {
    let coords = [self.x_min, self.y_min, self.x_max, self.y_max];
    coords.iter().all(|v| v.is_finite())
      && self.x_min < self.x_max
      && self.y_min < self.y_max
      && (0.0..=1.0).contains(&self.score)
  }

  pub fn iou(&self, other: &BoundingBox) -> f32 {
    let x1 = self.x_min.max(other.x_min);
    let y1 = self.y_min.max(other.y_min);
    let x2 = self.x_max.min(other.x_max);
    let y2 = self.y_max.min(other.y_max);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = self.area() + other.area() - intersection;

    if union > 0.0 { intersection / union } else { 0.0 }
  }

  pub fn label(&self) -> PlateLabel {
    PlateLabel::from_label_id(self.class_id)
  }
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn from_label_id(id: u32) -> Self;
  fn to_label_id(&self) -> u32;
}

/// 车牌检测模型的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlateLabel {
  LicensePlate,
  Other(u32),
}

impl WithLabel for PlateLabel {
  fn to_label_str(&self) -> String {
    match self {
      PlateLabel::LicensePlate => "plate".to_string(),
      PlateLabel::Other(id) => format!("class-{}", id),
    }
  }

  fn from_label_id(id: u32) -> Self {
    match id {
      0 => PlateLabel::LicensePlate,
      other => PlateLabel::Other(other),
    }
  }

  fn to_label_id(&self) -> u32 {
    match self {
      PlateLabel::LicensePlate => 0,
      PlateLabel::Other(id) => *id,
    }
  }
}

/// 一段识别出的文字
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionResult {
  pub text: String,
  pub confidence: f32,
}

impl RecognitionResult {
  pub fn new(text: impl Into<String>, confidence: f32) -> Self {
    Self {
      text: text.into(),
      confidence: confidence.clamp(0.0, 1.0),
    }
  }
}

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("输入帧无效: {0}")]
  InvalidInput(#[from] FrameError),
  #[error("检测推理失败: {0}")]
  Inference(String),
}

#[derive(Error, Debug)]
pub enum RecognizeError {
  #[error("识别区域无效: {width}x{height}")]
  InvalidInput { width: u32, height: u32 },
  #[error("识别推理失败: {0}")]
  Inference(String),
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("模型参数无效: {0}")]
  InvalidParameter(String),
  #[cfg(feature = "model_rknn")]
  #[error("RKNN 模型错误: {0}")]
  Rknn(#[from] RknnModelError),
}

pub mod ctc;
pub mod postprocess;
mod region;

mod contour;
pub use self::contour::{ContourDetector, ContourDetectorBuilder, Polarity};

mod template;
pub use self::template::{TemplateRecognizer, TemplateRecognizerBuilder};

#[cfg(feature = "model_rknn")]
mod rknn;
#[cfg(feature = "model_rknn")]
pub use self::rknn::{RknnCrnnRecognizer, RknnModelError, RknnPlateDetector};

/// 按 URL 方案选择的检测器
pub enum DetectorWrapper {
  Contour(ContourDetector),
  #[cfg(feature = "model_rknn")]
  RknnYolo(RknnPlateDetector),
}

impl FromUrl for DetectorWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ContourDetectorBuilder::SCHEME => {
        let detector = ContourDetectorBuilder::from_url(url)?.build();
        Ok(DetectorWrapper::Contour(detector))
      }
      #[cfg(feature = "model_rknn")]
      RknnPlateDetector::SCHEME => {
        let detector = RknnPlateDetector::from_url(url)?;
        Ok(DetectorWrapper::RknnYolo(detector))
      }
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }
}

impl RegionDetector for DetectorWrapper {
  fn detect(&self, frame: &Frame, params: &DetectParams) -> Result<Vec<BoundingBox>, DetectError> {
    match self {
      DetectorWrapper::Contour(detector) => detector.detect(frame, params),
      #[cfg(feature = "model_rknn")]
      DetectorWrapper::RknnYolo(detector) => detector.detect(frame, params),
    }
  }
}

/// 按 URL 方案选择的识别器
pub enum RecognizerWrapper {
  Template(TemplateRecognizer),
  #[cfg(feature = "model_rknn")]
  RknnCrnn(RknnCrnnRecognizer),
}

impl FromUrl for RecognizerWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      TemplateRecognizerBuilder::SCHEME => {
        let recognizer = TemplateRecognizerBuilder::from_url(url)?.build();
        Ok(RecognizerWrapper::Template(recognizer))
      }
      #[cfg(feature = "model_rknn")]
      RknnCrnnRecognizer::SCHEME => {
        let recognizer = RknnCrnnRecognizer::from_url(url)?;
        Ok(RecognizerWrapper::RknnCrnn(recognizer))
      }
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }
}

impl TextRecognizer for RecognizerWrapper {
  fn recognize(&self, crop: &RgbImage) -> Result<Vec<RecognitionResult>, RecognizeError> {
    match self {
      RecognizerWrapper::Template(recognizer) => recognizer.recognize(crop),
      #[cfg(feature = "model_rknn")]
      RecognizerWrapper::RknnCrnn(recognizer) => recognizer.recognize(crop),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn iou_of_identical_and_disjoint_boxes() {
    let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0, 0, 0.9);
    let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0, 0, 0.9);
    assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    assert_eq!(a.iou(&b), 0.0);

    let half = BoundingBox::new(5.0, 0.0, 15.0, 10.0, 0, 0.9);
    assert!((a.iou(&half) - 50.0 / 150.0).abs() < 1e-6);
  }

  #[test]
  fn degenerate_boxes_are_invalid() {
    assert!(!BoundingBox::new(5.0, 0.0, 5.0, 10.0, 0, 0.9).is_valid());
    assert!(!BoundingBox::new(0.0, 0.0, f32::NAN, 10.0, 0, 0.9).is_valid());
    assert!(!BoundingBox::new(0.0, 0.0, 1.0, 1.0, 0, 1.5).is_valid());
    assert!(BoundingBox::new(0.0, 0.0, 1.0, 1.0, 0, 1.0).is_valid());
  }

  #[test]
  fn wrappers_are_selected_by_scheme() {
    let detector = DetectorWrapper::from_url(&Url::parse("contour://").unwrap());
    assert!(matches!(detector, Ok(DetectorWrapper::Contour(_))));

    let recognizer = RecognizerWrapper::from_url(&Url::parse("template://").unwrap());
    assert!(matches!(recognizer, Ok(RecognizerWrapper::Template(_))));

    let unknown = DetectorWrapper::from_url(&Url::parse("onnx:///model.onnx").unwrap());
    assert!(matches!(unknown, Err(ModelError::SchemeMismatch(s)) if s == "onnx"));
  }

  #[test]
  fn plate_label_round_trips_ids() {
    assert_eq!(PlateLabel::from_label_id(0), PlateLabel::LicensePlate);
    assert_eq!(PlateLabel::from_label_id(3).to_label_id(), 3);
    assert_eq!(PlateLabel::LicensePlate.to_label_str(), "plate");
  }
}
