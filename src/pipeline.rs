// 该文件是 Shanan （山南西风） 项目的一部分。
// src/pipeline.rs - 检测到识别的处理流水线
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

//! 单帧处理流水线：检测 → 裁剪 → 识别 → 规范化。
//!
//! 流水线不做任何持久化，单个区域出错只会跳过该区域。

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
  event::SourceTag,
  extract::RegionExtractor,
  frame::Frame,
  model::{BoundingBox, DetectError, DetectParams, RegionDetector, TextRecognizer},
  normalize::PlateNormalizer,
};

/// 一次车牌读取结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateRead {
  pub plate_text: String,
  pub confidence: f32,
  pub bbox: BoundingBox,
}

impl PlateRead {
  pub fn as_pair(&self) -> (&str, f32) {
    (&self.plate_text, self.confidence)
  }
}

pub struct PlatePipeline {
  detector: Arc<dyn RegionDetector>,
  recognizer: Arc<dyn TextRecognizer>,
  extractor: RegionExtractor,
  normalizer: PlateNormalizer,
  params: DetectParams,
}

impl PlatePipeline {
  pub fn builder(
    detector: Arc<dyn RegionDetector>,
    recognizer: Arc<dyn TextRecognizer>,
  ) -> PlatePipelineBuilder {
    PlatePipelineBuilder {
      detector,
      recognizer,
      extractor: RegionExtractor::default(),
      normalizer: PlateNormalizer::default(),
      params: DetectParams::default(),
    }
  }

  pub fn params(&self) -> &DetectParams {
    &self.params
  }

  /// 处理一帧，按检测置信度顺序返回读取结果
  ///
  /// 帧无效或检测失败时返回空列表。
  pub fn process(&self, frame: &Frame, source: SourceTag) -> Vec<PlateRead> {
    let boxes = match self.detector.detect(frame, &self.params) {
      Ok(boxes) => boxes,
      Err(DetectError::InvalidInput(e)) => {
        warn!("[{}] 跳过无效帧: {}", source, e);
        return Vec::new();
      }
      Err(e) => {
        warn!("[{}] 检测失败，跳过该帧: {}", source, e);
        return Vec::new();
      }
    };
    debug!("[{}] 检测到 {} 个车牌区域", source, boxes.len());

    let mut reads = Vec::with_capacity(boxes.len());
    for bbox in boxes {
      if let Some(read) = self.read_region(frame, bbox, source) {
        reads.push(read);
      }
    }
    reads
  }

  fn read_region(&self, frame: &Frame, bbox: BoundingBox, source: SourceTag) -> Option<PlateRead> {
    let crop = match self.extractor.extract(frame, &bbox) {
      Ok(crop) => crop,
      Err(e) => {
        warn!("[{}] 跳过区域: {}", source, e);
        return None;
      }
    };

    let results = match self.recognizer.recognize(&crop) {
      Ok(results) => results,
      Err(e) => {
        warn!("[{}] 识别失败，跳过区域: {}", source, e);
        return None;
      }
    };

    let best = results
      .into_iter()
      .max_by(|a, b| a.confidence.total_cmp(&b.confidence))?;
    let plate_text = self.normalizer.normalize(&best.text);
    if plate_text.is_empty() {
      debug!("[{}] 识别文本 {:?} 规范化后为空", source, best.text);
      return None;
    }

    debug!(
      "[{}] 读取车牌 {} (识别 {:.3}, 检测 {:.3})",
      source, plate_text, best.confidence, bbox.score
    );
    Some(PlateRead {
      plate_text,
      confidence: best.confidence.clamp(0.0, 1.0),
      bbox,
    })
  }
}

pub struct PlatePipelineBuilder {
  detector: Arc<dyn RegionDetector>,
  recognizer: Arc<dyn TextRecognizer>,
  extractor: RegionExtractor,
  normalizer: PlateNormalizer,
  params: DetectParams,
}

impl PlatePipelineBuilder {
  pub fn params(mut self, params: DetectParams) -> Self {
    self.params = params;
    self
  }

  pub fn extractor(mut self, extractor: RegionExtractor) -> Self {
    self.extractor = extractor;
    self
  }

  pub fn normalizer(mut self, normalizer: PlateNormalizer) -> Self {
    self.normalizer = normalizer;
    self
  }

  pub fn build(self) -> PlatePipeline {
    PlatePipeline {
      detector: self.detector,
      recognizer: self.recognizer,
      extractor: self.extractor,
      normalizer: self.normalizer,
      params: self.params,
    }
  }
}
