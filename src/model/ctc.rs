// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/ctc.rs - CTC 贪心解码
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;

/// 车牌字符表，空白符固定在第 0 类，字符表从第 1 类开始
pub const DEFAULT_VOCAB: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CtcError {
  #[error("输出长度 {actual} 与形状 {steps}x{classes} 不符")]
  ShapeMismatch {
    steps: usize,
    classes: usize,
    actual: usize,
  },
  #[error("类别数 {classes} 小于字符表长度加一 ({expected})")]
  VocabMismatch { classes: usize, expected: usize },
}

/// 按时间步优先（[T, C]）排列的输出做贪心解码
#[derive(Debug, Clone)]
pub struct CtcDecoder {
  vocab: Vec<char>,
  logits: bool,
}

impl CtcDecoder {
  pub fn new(vocab: &str) -> Self {
    Self {
      vocab: vocab.chars().collect(),
      logits: false,
    }
  }

  /// 输出是未归一化的 logits 时，逐时间步做 softmax
  pub fn with_logits(mut self, logits: bool) -> Self {
    self.logits = logits;
    self
  }

  pub fn vocab_len(&self) -> usize {
    self.vocab.len()
  }

  /// 返回文本和置信度
  ///
  /// 置信度是输出字符所在时间步最大概率的均值；没有输出字符时为 0。
  pub fn decode(&self, output: &[f32], steps: usize) -> Result<(String, f32), CtcError> {
    if steps == 0 || output.is_empty() || output.len() % steps != 0 {
      return Err(CtcError::ShapeMismatch {
        steps,
        classes: if steps == 0 { 0 } else { output.len() / steps },
        actual: output.len(),
      });
    }
    let classes = output.len() / steps;
    if classes < self.vocab.len() + 1 {
      return Err(CtcError::VocabMismatch {
        classes,
        expected: self.vocab.len() + 1,
      });
    }

    let mut text = String::new();
    let mut probs = Vec::new();
    let mut prev = 0usize;
    for row in output.chunks_exact(classes) {
      let (best, prob) = self.argmax(row);
      // 跳过空白符和连续重复
      if best != 0 && best != prev {
        if let Some(&ch) = self.vocab.get(best - 1) {
          text.push(ch);
          probs.push(prob);
        }
      }
      prev = best;
    }

    let confidence = if probs.is_empty() {
      0.0
    } else {
      probs.iter().sum::<f32>() / probs.len() as f32
    };
    Ok((text, confidence.clamp(0.0, 1.0)))
  }

  fn argmax(&self, row: &[f32]) -> (usize, f32) {
    let (index, &max) = row
      .iter()
      .enumerate()
      .fold((0, &f32::MIN), |best, cur| if *cur.1 > *best.1 { cur } else { best });
    if !self.logits {
      return (index, max);
    }
    let denom: f32 = row.iter().map(|v| (v - max).exp()).sum();
    (index, 1.0 / denom)
  }
}

impl Default for CtcDecoder {
  fn default() -> Self {
    Self::new(DEFAULT_VOCAB)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// 生成 one-hot 风格的概率行
  fn probs(classes: usize, sequence: &[usize], peak: f32) -> Vec<f32> {
    let rest = (1.0 - peak) / (classes - 1) as f32;
    sequence
      .iter()
      .flat_map(|&k| (0..classes).map(move |c| if c == k { peak } else { rest }))
      .collect()
  }

  #[test]
  fn collapses_repeats_and_skips_blanks() {
    let decoder = CtcDecoder::new("AB1");
    // A A _ A B B _ 1
    let output = probs(4, &[1, 1, 0, 1, 2, 2, 0, 3], 0.9);
    let (text, confidence) = decoder.decode(&output, 8).unwrap();
    assert_eq!(text, "AAB1");
    assert!((confidence - 0.9).abs() < 1e-5);
  }

  #[test]
  fn all_blank_output_is_empty_text() {
    let decoder = CtcDecoder::new("AB");
    let (text, confidence) = decoder.decode(&probs(3, &[0, 0, 0], 0.8), 3).unwrap();
    assert!(text.is_empty());
    assert_eq!(confidence, 0.0);
  }

  #[test]
  fn logits_are_normalised() {
    let decoder = CtcDecoder::new("A").with_logits(true);
    // softmax([0, ln 3]) = [0.25, 0.75]
    let (text, confidence) = decoder.decode(&[0.0, 3f32.ln(), 2.0, 0.0], 2).unwrap();
    assert_eq!(text, "A");
    assert!((confidence - 0.75).abs() < 1e-5);
  }

  #[test]
  fn rejects_bad_shapes() {
    let decoder = CtcDecoder::default();
    assert!(matches!(
      decoder.decode(&[0.0; 10], 3),
      Err(CtcError::ShapeMismatch { .. })
    ));
    assert!(matches!(
      decoder.decode(&[0.0; 10], 2),
      Err(CtcError::VocabMismatch { classes: 5, expected: 37 })
    ));
  }
}
