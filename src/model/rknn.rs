// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/rknn.rs - RKNN 车牌检测与字符识别模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::sync::Mutex;

use image::{RgbImage, imageops};
use rknpu::{Context, InitFlags, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use super::{
  BoundingBox, DetectError, DetectParams, ModelError, RecognitionResult, RecognizeError,
  RegionDetector, TextRecognizer,
  ctc::{CtcDecoder, DEFAULT_VOCAB},
  postprocess::filter_boxes,
};
use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  utils::{query_flag, query_map, query_value, url_file_path},
};

const YOLO_NUM_INPUTS: u32 = 1;
const YOLO_NUM_OUTPUTS: u32 = 6;
const YOLO_INPUT_W: u32 = 640;
const YOLO_INPUT_H: u32 = 640;
const YOLO_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const YOLO_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];

const CRNN_INPUT_W: u32 = 200;
const CRNN_INPUT_H: u32 = 64;

#[derive(Error, Debug)]
pub enum RknnModelError {
  #[error("模型加载错误: {0}")]
  Load(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  Invalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  Rknn(#[from] rknpu::Error),
}

impl RknnModelError {
  fn invalid(msg: &str, e: rknpu::Error) -> Self {
    RknnModelError::Invalid(msg.to_string(), e)
  }
}

/// 加载模型文件并检查输入输出数量
fn load_context(url: &Url, inputs: u32, outputs: Option<u32>) -> Result<Context, RknnModelError> {
  let model_path = url_file_path(url);
  info!("加载模型文件: {}", model_path.display());
  let model_data = std::fs::read(&model_path)?;
  debug!(
    "模型文件大小: {:.2} MB",
    model_data.len() as f64 / (1024.0 * 1024.0)
  );

  let context = Context::new(&model_data, InitFlags::default())?;
  match context.sdk_version() {
    Ok(version) => {
      if let Ok(api_ver) = version.api_version() {
        debug!("模型 API 版本: {}", api_ver);
      }
      if let Ok(drv_ver) = version.driver_version() {
        debug!("模型驱动版本: {}", drv_ver);
      }
    }
    Err(e) => {
      error!("查询 SDK 版本失败: {}", e);
      return Err(RknnModelError::invalid("无法查询 SDK 版本", e));
    }
  }

  let num_inputs = context
    .num_inputs()
    .map_err(|e| RknnModelError::invalid("无法获取输入数量", e))?;
  let num_outputs = context
    .num_outputs()
    .map_err(|e| RknnModelError::invalid("无法获取输出数量", e))?;
  debug!("模型输入数量: {}, 输出数量: {}", num_inputs, num_outputs);

  if num_inputs != inputs {
    return Err(RknnModelError::invalid(
      &format!("预期模型输入数量为 {}, 实际为 {}", inputs, num_inputs),
      rknpu::Error::InvalidModel,
    ));
  }
  if let Some(outputs) = outputs
    && num_outputs != outputs
  {
    return Err(RknnModelError::invalid(
      &format!("预期模型输出数量为 {}, 实际为 {}", outputs, num_outputs),
      rknpu::Error::InvalidModel,
    ));
  }

  info!("模型加载完成");
  Ok(context)
}

/// YOLO 车牌检测模型
///
/// 三个检测头，每个检测头输出一对回归/分类张量。
pub struct RknnPlateDetector {
  context: Mutex<Context>,
  class_num: usize,
}

impl FromUrl for RknnPlateDetector {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::SchemeMismatch(url.scheme().to_string()));
    }
    let query = query_map(url);
    let class_num: usize = query_value(&query, "classes", 1).map_err(ModelError::InvalidParameter)?;
    if class_num == 0 {
      return Err(ModelError::InvalidParameter("类别数不能为 0".to_string()));
    }

    let context = load_context(url, YOLO_NUM_INPUTS, Some(YOLO_NUM_OUTPUTS))?;
    Ok(Self {
      context: Mutex::new(context),
      class_num,
    })
  }
}

impl FromUrlWithScheme for RknnPlateDetector {
  const SCHEME: &'static str = "rknn-yolo";
}

/// 根据张量大小区分回归和分类输出
fn match_reg_cls<'a>(
  a: &'a [f32],
  b: &'a [f32],
  reg_expected: usize,
  cls_expected: usize,
) -> Option<(&'a [f32], &'a [f32])> {
  if a.len() == reg_expected && b.len() == cls_expected {
    Some((a, b))
  } else if a.len() == cls_expected && b.len() == reg_expected {
    Some((b, a))
  } else {
    None
  }
}

impl RknnPlateDetector {
  /// 解码检测头，返回归一化坐标的候选框
  fn decode_heads(&self, output: &rknpu::Output, conf_threshold: f32) -> Vec<([f32; 4], u32, f32)> {
    let (in_w, in_h) = (YOLO_INPUT_W as f32, YOLO_INPUT_H as f32);
    let mut items = Vec::new();

    for (head_idx, (&(map_h, map_w), stride)) in YOLO_HEAD_SIZES.iter().zip(YOLO_STRIDES).enumerate() {
      let spatial = map_h * map_w;
      let (t1, t2) = match (output.get_f32(head_idx * 2), output.get_f32(head_idx * 2 + 1)) {
        (Ok(t1), Ok(t2)) => (t1, t2),
        (Err(e), _) | (_, Err(e)) => {
          error!("获取检测头 {} 输出失败: {}", head_idx, e);
          continue;
        }
      };
      let Some((reg, cls)) = match_reg_cls(t1, t2, 4 * spatial, self.class_num * spatial) else {
        error!(
          "检测头 {} 输出大小不匹配: {} / {}",
          head_idx,
          t1.len(),
          t2.len()
        );
        continue;
      };

      for idx in 0..spatial {
        let (class_id, logit) = (0..self.class_num)
          .map(|c| (c, cls[c * spatial + idx]))
          .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        let score = sigmoid(logit);
        if score < conf_threshold {
          continue;
        }

        let grid_x = (idx % map_w) as f32 + 0.5;
        let grid_y = (idx / map_w) as f32 + 0.5;
        let x_min = ((grid_x - reg[idx]) * stride).clamp(0.0, in_w);
        let y_min = ((grid_y - reg[spatial + idx]) * stride).clamp(0.0, in_h);
        let x_max = ((grid_x + reg[2 * spatial + idx]) * stride).clamp(0.0, in_w);
        let y_max = ((grid_y + reg[3 * spatial + idx]) * stride).clamp(0.0, in_h);

        items.push((
          [x_min / in_w, y_min / in_h, x_max / in_w, y_max / in_h],
          class_id as u32,
          score,
        ));
      }
    }

    items
  }
}

impl RegionDetector for RknnPlateDetector {
  fn detect(&self, frame: &Frame, params: &DetectParams) -> Result<Vec<BoundingBox>, DetectError> {
    frame.validate()?;
    let input = frame.to_nhwc_resized(YOLO_INPUT_W, YOLO_INPUT_H);

    let context = self
      .context
      .lock()
      .map_err(|_| DetectError::Inference("推理上下文锁已损坏".to_string()))?;
    let inference = |e: rknpu::Error| DetectError::Inference(e.to_string());
    context
      .set_input(0, &input, rknpu::TensorFormat::NHWC, TensorType::UInt8)
      .map_err(inference)?;
    context.run().map_err(inference)?;
    let output = context.get_outputs().map_err(inference)?;

    let boxes = self
      .decode_heads(&output, params.conf_threshold)
      .into_iter()
      .map(|(bbox, class_id, score)| {
        BoundingBox::from_normalized(bbox, frame.width(), frame.height(), class_id, score)
      })
      .collect();
    Ok(filter_boxes(boxes, params))
  }
}

/// CRNN 字符识别模型，输出按 [T, C] 排列，第 0 类为空白符
pub struct RknnCrnnRecognizer {
  context: Mutex<Context>,
  width: u32,
  height: u32,
  decoder: CtcDecoder,
}

impl FromUrl for RknnCrnnRecognizer {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::SchemeMismatch(url.scheme().to_string()));
    }
    let query = query_map(url);
    let width = query_value(&query, "width", CRNN_INPUT_W).map_err(ModelError::InvalidParameter)?;
    let height = query_value(&query, "height", CRNN_INPUT_H).map_err(ModelError::InvalidParameter)?;
    let vocab: String =
      query_value(&query, "vocab", DEFAULT_VOCAB.to_string()).map_err(ModelError::InvalidParameter)?;
    if width == 0 || height == 0 || vocab.is_empty() {
      return Err(ModelError::InvalidParameter(format!(
        "识别模型输入 {}x{} 或字符表无效",
        width, height
      )));
    }

    let context = load_context(url, 1, None)?;
    Ok(Self {
      context: Mutex::new(context),
      width,
      height,
      decoder: CtcDecoder::new(&vocab).with_logits(query_flag(&query, "logits")),
    })
  }
}

impl FromUrlWithScheme for RknnCrnnRecognizer {
  const SCHEME: &'static str = "rknn-crnn";
}

impl TextRecognizer for RknnCrnnRecognizer {
  fn recognize(&self, crop: &RgbImage) -> Result<Vec<RecognitionResult>, RecognizeError> {
    let (width, height) = crop.dimensions();
    if width == 0 || height == 0 {
      return Err(RecognizeError::InvalidInput { width, height });
    }
    let input = imageops::resize(crop, self.width, self.height, imageops::FilterType::Triangle);

    let context = self
      .context
      .lock()
      .map_err(|_| RecognizeError::Inference("推理上下文锁已损坏".to_string()))?;
    let inference = |e: rknpu::Error| RecognizeError::Inference(e.to_string());
    context
      .set_input(0, input.as_raw(), rknpu::TensorFormat::NHWC, TensorType::UInt8)
      .map_err(inference)?;
    context.run().map_err(inference)?;
    let output = context.get_outputs().map_err(inference)?;
    let scores = output.get_f32(0).map_err(inference)?;

    let classes = self.decoder.vocab_len() + 1;
    let steps = scores.len() / classes;
    let (text, confidence) = self
      .decoder
      .decode(scores, steps)
      .map_err(|e| RecognizeError::Inference(e.to_string()))?;
    debug!("CRNN 识别结果: {:?} ({:.3})", text, confidence);

    if text.is_empty() {
      return Ok(Vec::new());
    }
    Ok(vec![RecognitionResult::new(text, confidence)])
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
