// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 命令行共用参数
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{sync::Arc, time::Duration};

use clap::Args;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl,
  event::{EventLogError, EventRecorder},
  extract::RegionExtractor,
  model::{
    DEFAULT_CONF_THRESHOLD, DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_DETECTIONS, DetectParams,
    DetectorWrapper, ModelError, RecognizerWrapper,
  },
  normalize::{Jurisdiction, NormalizeError, PlateNormalizer},
  output::CsvEventLog,
  pipeline::PlatePipeline,
};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("模型加载失败: {0}")]
  Model(#[from] ModelError),
  #[error("规范化配置错误: {0}")]
  Normalize(#[from] NormalizeError),
  #[error("事件日志错误: {0}")]
  EventLog(#[from] EventLogError),
  #[error("参数无效: {0}")]
  InvalidParameter(String),
}

/// 检测、识别与记录的共用参数
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
  /// 检测器，例如 contour://?min_aspect=1.5 或 rknn-yolo:///models/plate.rknn
  #[arg(long, default_value = "contour://", value_name = "URL")]
  pub detector: Url,

  /// 识别器，例如 template:// 或 rknn-crnn:///models/crnn.rknn
  #[arg(long, default_value = "template://", value_name = "URL")]
  pub recognizer: Url,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONF_THRESHOLD, value_name = "THRESHOLD")]
  pub conf: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_IOU_THRESHOLD, value_name = "THRESHOLD")]
  pub iou: f32,

  /// 每帧最多保留的检测框数
  #[arg(long, default_value_t = DEFAULT_MAX_DETECTIONS, value_name = "COUNT")]
  pub max_det: usize,

  /// 车牌格式规则: generic, uk, us, cn
  #[arg(long, default_value = "generic", value_name = "RULE")]
  pub jurisdiction: Jurisdiction,

  /// 自定义字符表，设置后忽略 --jurisdiction
  #[arg(long, value_name = "CHARS")]
  pub alphabet: Option<String>,

  /// 自定义字符表下的最短车牌长度
  #[arg(long, default_value_t = 1, value_name = "LEN")]
  pub min_len: usize,

  /// 自定义字符表下的最长车牌长度
  #[arg(long, default_value_t = 16, value_name = "LEN")]
  pub max_len: usize,

  /// 裁剪时按检测框尺寸向外扩展的比例
  #[arg(long, default_value_t = 0.0, value_name = "RATIO")]
  pub padding: f32,

  /// 事件日志，例如 csv:results.csv
  #[arg(long, default_value = "csv:results.csv", value_name = "URL")]
  pub event_log: Url,

  /// 同一来源同一车牌的去重窗口（秒），0 表示不去重
  #[arg(long, default_value_t = 0, value_name = "SECONDS")]
  pub dedup_secs: u64,
}

impl PipelineArgs {
  pub fn detect_params(&self) -> Result<DetectParams, ConfigError> {
    for (name, value) in [("conf", self.conf), ("iou", self.iou)] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidParameter(format!(
          "{} 必须在 0 到 1 之间: {}",
          name, value
        )));
      }
    }
    Ok(DetectParams {
      conf_threshold: self.conf,
      iou_threshold: self.iou,
      max_detections: self.max_det,
    })
  }

  pub fn normalizer(&self) -> Result<PlateNormalizer, ConfigError> {
    match &self.alphabet {
      Some(alphabet) => Ok(PlateNormalizer::custom(alphabet, self.min_len, self.max_len)?),
      None => Ok(PlateNormalizer::for_jurisdiction(self.jurisdiction)),
    }
  }

  /// 加载模型并组装流水线
  pub fn build_pipeline(&self) -> Result<PlatePipeline, ConfigError> {
    info!("检测器: {}", self.detector);
    info!("识别器: {}", self.recognizer);
    let detector = DetectorWrapper::from_url(&self.detector)?;
    let recognizer = RecognizerWrapper::from_url(&self.recognizer)?;

    Ok(
      PlatePipeline::builder(Arc::new(detector), Arc::new(recognizer))
        .params(self.detect_params()?)
        .extractor(RegionExtractor::new().with_padding(self.padding))
        .normalizer(self.normalizer()?)
        .build(),
    )
  }

  pub fn build_recorder(&self) -> Result<EventRecorder, ConfigError> {
    info!("事件日志: {}", self.event_log);
    let log = CsvEventLog::from_url(&self.event_log)?;
    Ok(EventRecorder::new(Arc::new(log)).with_dedup_window(Duration::from_secs(self.dedup_secs)))
  }
}
