// 该文件是 Shanan （山南西风） 项目的一部分。
// src/normalize.rs - 车牌文本规范化
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

use std::{collections::BTreeSet, str::FromStr};

use thiserror::Error;

const ALNUM: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CN_PROVINCES: &str = "京沪津渝冀晋蒙辽吉黑苏浙皖闽赣鲁豫鄂湘粤桂琼川贵云藏陕甘青宁新港澳学使警挂";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
  #[error("未知的地区规则: {0}")]
  UnknownJurisdiction(String),
  #[error("字符表为空")]
  EmptyAlphabet,
  #[error("长度范围无效: {0} - {1}")]
  InvalidLength(usize, usize),
}

/// 车牌所属地区的格式规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jurisdiction {
  /// 仅保留字母与数字，不限长度
  Generic,
  Uk,
  Us,
  Cn,
}

impl FromStr for Jurisdiction {
  type Err = NormalizeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "generic" => Ok(Jurisdiction::Generic),
      "uk" | "gb" => Ok(Jurisdiction::Uk),
      "us" => Ok(Jurisdiction::Us),
      "cn" => Ok(Jurisdiction::Cn),
      other => Err(NormalizeError::UnknownJurisdiction(other.to_string())),
    }
  }
}

/// 识别文本的规范化策略
///
/// 去除首尾空白、转为大写、删除字符表之外的字符；结果长度不在范围内时返回空串。
/// 对同一策略重复规范化结果不变。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateNormalizer {
  alphabet: BTreeSet<char>,
  min_len: usize,
  max_len: usize,
}

impl Default for PlateNormalizer {
  fn default() -> Self {
    Self::for_jurisdiction(Jurisdiction::Generic)
  }
}

impl PlateNormalizer {
  pub fn for_jurisdiction(jurisdiction: Jurisdiction) -> Self {
    let (extra, min_len, max_len) = match jurisdiction {
      Jurisdiction::Generic => ("", 1, usize::MAX),
      Jurisdiction::Uk => ("", 2, 7),
      Jurisdiction::Us => ("", 1, 8),
      Jurisdiction::Cn => (CN_PROVINCES, 7, 8),
    };
    Self {
      alphabet: ALNUM.chars().chain(extra.chars()).collect(),
      min_len,
      max_len,
    }
  }

  /// 自定义字符表，字母按大写比较
  pub fn custom(alphabet: &str, min_len: usize, max_len: usize) -> Result<Self, NormalizeError> {
    let alphabet: BTreeSet<char> = alphabet
      .chars()
      .filter(|c| !c.is_whitespace())
      .flat_map(char::to_uppercase)
      .collect();
    if alphabet.is_empty() {
      return Err(NormalizeError::EmptyAlphabet);
    }
    if min_len == 0 || min_len > max_len {
      return Err(NormalizeError::InvalidLength(min_len, max_len));
    }
    Ok(Self {
      alphabet,
      min_len,
      max_len,
    })
  }

  pub fn normalize(&self, text: &str) -> String {
    let cleaned: String = text
      .trim()
      .chars()
      .flat_map(char::to_uppercase)
      .filter(|c| self.alphabet.contains(c))
      .collect();
    let len = cleaned.chars().count();
    if len < self.min_len || len > self.max_len {
      return String::new();
    }
    cleaned
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strips_and_uppercases() {
    let normalizer = PlateNormalizer::default();
    assert_eq!(normalizer.normalize("  ab 12-cde\n"), "AB12CDE");
    assert_eq!(normalizer.normalize("!!!"), "");
    assert_eq!(normalizer.normalize(""), "");
  }

  #[test]
  fn normalization_is_idempotent() {
    let samples = ["ab12 cde", "京A·12345", "x", "  ", "KA-01-AB-1234", "ß9"];
    for jurisdiction in [
      Jurisdiction::Generic,
      Jurisdiction::Uk,
      Jurisdiction::Us,
      Jurisdiction::Cn,
    ] {
      let normalizer = PlateNormalizer::for_jurisdiction(jurisdiction);
      for sample in samples {
        let once = normalizer.normalize(sample);
        assert_eq!(normalizer.normalize(&once), once, "{:?} {}", jurisdiction, sample);
      }
    }
  }

  #[test]
  fn length_bounds_reject_implausible_reads() {
    let uk = PlateNormalizer::for_jurisdiction(Jurisdiction::Uk);
    assert_eq!(uk.normalize("AB12 CDE"), "AB12CDE");
    assert_eq!(uk.normalize("A"), "");
    assert_eq!(uk.normalize("AB12CDEF"), "");

    let cn = PlateNormalizer::for_jurisdiction(Jurisdiction::Cn);
    assert_eq!(cn.normalize("京a·12345"), "京A12345");
    assert_eq!(cn.normalize("A1234"), "");
  }

  #[test]
  fn custom_alphabet() {
    let digits = PlateNormalizer::custom("0123456789", 3, 6).unwrap();
    assert_eq!(digits.normalize("12-34ab"), "1234");
    assert_eq!(digits.normalize("12"), "");
    assert!(PlateNormalizer::custom(" ", 1, 2).is_err());
    assert!(PlateNormalizer::custom("AB", 3, 2).is_err());
  }

  #[test]
  fn parses_jurisdiction_names() {
    assert_eq!("UK".parse::<Jurisdiction>(), Ok(Jurisdiction::Uk));
    assert_eq!("cn".parse::<Jurisdiction>(), Ok(Jurisdiction::Cn));
    assert!("mars".parse::<Jurisdiction>().is_err());
  }
}
