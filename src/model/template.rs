// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/template.rs - 点阵模板字符识别
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! 基于内置 5x7 点阵的字符识别器。
//!
//! 车牌裁剪图先做 Otsu 二值化（自动判断深色字还是浅色字），
//! 去掉贴边和过小的连通域后按行投影切分文字行，再按列投影切分字符，
//! 每个字符按 5x7 网格采样后与模板逐一比较。

use image::{GrayImage, RgbImage, imageops};
use imageproc::contrast::otsu_level;
use tracing::{debug, trace};
use url::Url;

use super::{
  ModelError, RecognitionResult, RecognizeError, TextRecognizer,
  region::{ComponentStats, binarize, intensity_range, label_components},
};
use crate::{
  FromUrl, FromUrlWithScheme,
  glyph::{self, GLYPH_HEIGHT, GLYPH_WIDTH},
  utils::{query_map, query_value},
};

const CELLS: usize = (GLYPH_WIDTH * GLYPH_HEIGHT) as usize;
/// 每个网格单元内的采样点数（每个方向）
const SUBSAMPLES: u32 = 3;
/// 字符最小高度占裁剪图高度的比例
const MIN_CHAR_HEIGHT_RATIO: f32 = 0.2;
/// 字符最大宽度占裁剪图宽度的比例，超过的连通域视为边框
const MAX_CHAR_WIDTH_RATIO: f32 = 0.5;
/// 宽于期望字宽该倍数的列段会被拆分
const SPLIT_WIDTH_RATIO: f32 = 1.6;

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateRecognizerBuilder {
  min_char_score: f32,
  min_contrast: u8,
  max_lines: usize,
}

impl Default for TemplateRecognizerBuilder {
  fn default() -> Self {
    Self {
      min_char_score: 0.6,
      min_contrast: 30,
      max_lines: 2,
    }
  }
}

impl TemplateRecognizerBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// 单个字符被接受所需的最低模板相似度
  pub fn min_char_score(mut self, score: f32) -> Self {
    self.min_char_score = score;
    self
  }

  pub fn min_contrast(mut self, min_contrast: u8) -> Self {
    self.min_contrast = min_contrast;
    self
  }

  /// 最多识别的文字行数
  pub fn max_lines(mut self, max_lines: usize) -> Self {
    self.max_lines = max_lines;
    self
  }

  pub fn build(self) -> TemplateRecognizer {
    TemplateRecognizer {
      min_char_score: self.min_char_score,
      min_contrast: self.min_contrast,
      max_lines: self.max_lines.max(1),
      templates: glyph::templates().map(|g| (g.ch, g.cells())).collect(),
    }
  }
}

impl FromUrl for TemplateRecognizerBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::SchemeMismatch(url.scheme().to_string()));
    }

    let query = query_map(url);
    let d = Self::default();
    let min_char_score: f32 =
      query_value(&query, "min_char_score", d.min_char_score).map_err(ModelError::InvalidParameter)?;
    if !(0.0..=1.0).contains(&min_char_score) {
      return Err(ModelError::InvalidParameter(format!(
        "字符得分阈值无效: {}",
        min_char_score
      )));
    }

    Ok(Self {
      min_char_score,
      min_contrast: query_value(&query, "min_contrast", d.min_contrast)
        .map_err(ModelError::InvalidParameter)?,
      max_lines: query_value(&query, "max_lines", d.max_lines).map_err(ModelError::InvalidParameter)?,
    })
  }
}

impl FromUrlWithScheme for TemplateRecognizerBuilder {
  const SCHEME: &'static str = "template";
}

pub struct TemplateRecognizer {
  min_char_score: f32,
  min_contrast: u8,
  max_lines: usize,
  templates: Vec<(char, [f32; CELLS])>,
}

/// 裁剪图内的墨迹掩码（true 为字符笔画）
struct InkMask {
  width: u32,
  height: u32,
  ink: Vec<bool>,
}

impl InkMask {
  fn get(&self, x: u32, y: u32) -> bool {
    x < self.width && y < self.height && self.ink[(y * self.width + x) as usize]
  }

  /// 统计 y0 到 y1 行之间每列的墨迹数
  fn column_profile(&self, y0: u32, y1: u32) -> Vec<u32> {
    (0..self.width)
      .map(|x| (y0..=y1).filter(|&y| self.get(x, y)).count() as u32)
      .collect()
  }

  fn row_profile(&self) -> Vec<u32> {
    (0..self.height)
      .map(|y| (0..self.width).filter(|&x| self.get(x, y)).count() as u32)
      .collect()
  }
}

/// 字符在裁剪图中的位置（闭区间）
#[derive(Debug, Clone, Copy)]
struct CharBox {
  x0: u32,
  x1: u32,
  y0: u32,
  y1: u32,
}

impl TemplateRecognizer {
  /// 二值化并去掉贴边与过小的连通域
  fn ink_mask(&self, gray: &GrayImage) -> Option<InkMask> {
    let (width, height) = gray.dimensions();
    let (lo, hi) = intensity_range(gray);
    if hi.saturating_sub(lo) < self.min_contrast {
      debug!("裁剪区域对比度不足 ({} - {})", lo, hi);
      return None;
    }

    let level = otsu_level(gray);
    let dark = binarize(gray, |v| v <= level);
    let dark_count = dark.pixels().filter(|p| p[0] != 0).count();
    // 墨迹占多数时说明是浅色字
    let mask = if dark_count * 2 > (width * height) as usize {
      binarize(gray, |v| v > level)
    } else {
      dark
    };

    let components = label_components(&mask);
    let min_height = ((height as f32 * MIN_CHAR_HEIGHT_RATIO).ceil() as u32).max(2);
    let max_width = ((width as f32 * MAX_CHAR_WIDTH_RATIO) as u32).max(1);
    let keep: Vec<bool> = {
      let max_label = components.stats.iter().map(|s| s.label).max().unwrap_or(0) as usize;
      let mut keep = vec![false; max_label + 1];
      for s in components.stats.iter() {
        keep[s.label as usize] = is_character_blob(s, width, height, min_height, max_width);
      }
      keep
    };

    let ink = components
      .labels
      .pixels()
      .map(|p| keep.get(p[0] as usize).copied().unwrap_or(false))
      .collect();
    Some(InkMask { width, height, ink })
  }

  fn read_line(&self, mask: &InkMask, y0: u32, y1: u32) -> Option<RecognitionResult> {
    let band_height = y1 - y0 + 1;
    let expected_width = (band_height as f32 * GLYPH_WIDTH as f32 / GLYPH_HEIGHT as f32).max(1.0);

    let mut text = String::new();
    let mut scores = Vec::new();
    for (sx0, sx1) in runs(&mask.column_profile(y0, y1), 0) {
      for (cx0, cx1) in split_segment(sx0, sx1, expected_width) {
        let Some(char_box) = tighten(mask, cx0, cx1, y0, y1) else {
          continue;
        };
        let cells = sample_cells(mask, char_box);
        let (ch, score) = self.best_match(&cells);
        trace!("字符 {:?} 匹配 {} 得分 {:.3}", char_box, ch, score);
        scores.push(score);
        if score >= self.min_char_score {
          text.push(ch);
        }
      }
    }

    if text.is_empty() {
      return None;
    }
    let confidence = scores.iter().sum::<f32>() / scores.len() as f32;
    Some(RecognitionResult::new(text, confidence))
  }

  fn best_match(&self, cells: &[f32; CELLS]) -> (char, f32) {
    self
      .templates
      .iter()
      .map(|(ch, template)| {
        let distance: f32 = template.iter().zip(cells.iter()).map(|(t, v)| (t - v).abs()).sum();
        (*ch, 1.0 - distance / CELLS as f32)
      })
      .fold((' ', f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best })
  }
}

impl TextRecognizer for TemplateRecognizer {
  fn recognize(&self, crop: &RgbImage) -> Result<Vec<RecognitionResult>, RecognizeError> {
    let (width, height) = crop.dimensions();
    if width == 0 || height == 0 {
      return Err(RecognizeError::InvalidInput { width, height });
    }

    let gray = imageops::grayscale(crop);
    let Some(mask) = self.ink_mask(&gray) else {
      return Ok(Vec::new());
    };

    let min_band = ((height as f32 * MIN_CHAR_HEIGHT_RATIO).ceil() as u32).max(2);
    let mut bands: Vec<(u32, u32)> = runs(&mask.row_profile(), 1)
      .into_iter()
      .filter(|(y0, y1)| y1 - y0 + 1 >= min_band)
      .collect();
    // 保留最高的若干行，再恢复自上而下的顺序
    bands.sort_by(|a, b| (b.1 - b.0).cmp(&(a.1 - a.0)));
    bands.truncate(self.max_lines);
    bands.sort_by_key(|band| band.0);

    let results: Vec<RecognitionResult> = bands
      .into_iter()
      .filter_map(|(y0, y1)| self.read_line(&mask, y0, y1))
      .collect();
    debug!("识别到 {} 行文字", results.len());
    Ok(results)
  }
}

fn is_character_blob(
  s: &ComponentStats,
  width: u32,
  height: u32,
  min_height: u32,
  max_width: u32,
) -> bool {
  !s.touches_border(width, height) && s.height() >= min_height && s.width() <= max_width
}

/// 投影中非零值的连续区间，间隔不超过 `gap` 的区间被合并
fn runs(profile: &[u32], gap: usize) -> Vec<(u32, u32)> {
  let mut result: Vec<(u32, u32)> = Vec::new();
  let mut start: Option<usize> = None;
  for (i, &v) in profile.iter().enumerate() {
    match (v > 0, start) {
      (true, None) => start = Some(i),
      (false, Some(s)) => {
        push_run(&mut result, s, i - 1, gap);
        start = None;
      }
      _ => {}
    }
  }
  if let Some(s) = start {
    push_run(&mut result, s, profile.len() - 1, gap);
  }
  result
}

fn push_run(result: &mut Vec<(u32, u32)>, start: usize, end: usize, gap: usize) {
  if let Some(last) = result.last_mut() {
    if start - last.1 as usize <= gap + 1 {
      last.1 = end as u32;
      return;
    }
  }
  result.push((start as u32, end as u32));
}

/// 将粘连的宽列段按期望字宽均分
fn split_segment(x0: u32, x1: u32, expected_width: f32) -> Vec<(u32, u32)> {
  let width = (x1 - x0 + 1) as f32;
  if width <= expected_width * SPLIT_WIDTH_RATIO {
    return vec![(x0, x1)];
  }

  let spacing = expected_width / GLYPH_WIDTH as f32;
  let count = ((width + spacing) / (expected_width + spacing)).round().max(1.0) as u32;
  let step = width / count as f32;
  (0..count)
    .map(|i| {
      let start = x0 + (i as f32 * step).round() as u32;
      let end = (x0 + ((i + 1) as f32 * step).round() as u32).saturating_sub(1).min(x1);
      (start, end.max(start))
    })
    .collect()
}

/// 收紧字符的上下边界，空白段返回 None
fn tighten(mask: &InkMask, x0: u32, x1: u32, y0: u32, y1: u32) -> Option<CharBox> {
  let rows: Vec<u32> = (y0..=y1)
    .filter(|&y| (x0..=x1).any(|x| mask.get(x, y)))
    .collect();
  let (&top, &bottom) = (rows.first()?, rows.last()?);
  Some(CharBox {
    x0,
    x1,
    y0: top,
    y1: bottom,
  })
}

/// 按 5x7 网格采样墨迹比例
///
/// 过窄的字符（如 1、I）以期望字宽居中扩展后再采样。
fn sample_cells(mask: &InkMask, b: CharBox) -> [f32; CELLS] {
  let char_height = (b.y1 - b.y0 + 1) as f32;
  let char_width = (b.x1 - b.x0 + 1) as f32;
  let target_width = char_height * GLYPH_WIDTH as f32 / GLYPH_HEIGHT as f32;

  let (left, width) = if char_width < target_width * 0.8 {
    let center = (b.x0 + b.x1 + 1) as f32 / 2.0;
    (center - target_width / 2.0, target_width)
  } else {
    (b.x0 as f32, char_width)
  };
  let cell_w = width / GLYPH_WIDTH as f32;
  let cell_h = char_height / GLYPH_HEIGHT as f32;

  let mut cells = [0.0; CELLS];
  for row in 0..GLYPH_HEIGHT {
    for col in 0..GLYPH_WIDTH {
      let mut hits = 0;
      for sy in 0..SUBSAMPLES {
        for sx in 0..SUBSAMPLES {
          let fx = left + (col as f32 + (sx as f32 + 0.5) / SUBSAMPLES as f32) * cell_w;
          let fy = b.y0 as f32 + (row as f32 + (sy as f32 + 0.5) / SUBSAMPLES as f32) * cell_h;
          if fx >= 0.0 && fy >= 0.0 && mask.get(fx as u32, fy as u32) {
            hits += 1;
          }
        }
      }
      cells[(row * GLYPH_WIDTH + col) as usize] = hits as f32 / (SUBSAMPLES * SUBSAMPLES) as f32;
    }
  }
  cells
}

#[cfg(test)]
mod tests {
  use image::Rgb;

  use super::*;

  fn plate_crop(text: &str, scale: u32, ink: Rgb<u8>, paper: Rgb<u8>) -> RgbImage {
    let tw = glyph::text_width(text, scale);
    let th = glyph::text_height(scale);
    let margin = scale * 3;
    let mut image = RgbImage::from_pixel(tw + margin * 2, th + margin * 2, paper);
    glyph::draw_text_mut(&mut image, text, margin as i32, margin as i32, scale, ink);
    image
  }

  #[test]
  fn reads_dark_text_on_light_plate() {
    let recognizer = TemplateRecognizerBuilder::new().build();
    let crop = plate_crop("AB12CDE", 5, Rgb([20, 20, 20]), Rgb([230, 230, 230]));
    let results = recognizer.recognize(&crop).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "AB12CDE");
    assert!(results[0].confidence > 0.9);
  }

  #[test]
  fn reads_light_text_on_dark_plate() {
    let recognizer = TemplateRecognizerBuilder::new().build();
    let crop = plate_crop("XY7890", 4, Rgb([240, 240, 240]), Rgb([10, 40, 120]));
    let results = recognizer.recognize(&crop).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "XY7890");
  }

  #[test]
  fn reads_every_template_character() {
    let recognizer = TemplateRecognizerBuilder::new().build();
    let alphabet = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    for chunk in alphabet.as_bytes().chunks(6) {
      let text = std::str::from_utf8(chunk).unwrap();
      let crop = plate_crop(text, 4, Rgb([0, 0, 0]), Rgb([255, 255, 255]));
      let results = recognizer.recognize(&crop).unwrap();
      assert_eq!(results.len(), 1, "{}", text);
      assert_eq!(results[0].text, text);
    }
  }

  #[test]
  fn reads_two_line_plate_top_to_bottom() {
    let recognizer = TemplateRecognizerBuilder::new().build();
    let mut crop = RgbImage::from_pixel(120, 100, Rgb([255, 255, 255]));
    glyph::draw_text_mut(&mut crop, "AB", 30, 10, 5, Rgb([0, 0, 0]));
    glyph::draw_text_mut(&mut crop, "1234", 10, 55, 4, Rgb([0, 0, 0]));
    let texts: Vec<String> = recognizer
      .recognize(&crop)
      .unwrap()
      .into_iter()
      .map(|r| r.text)
      .collect();
    assert_eq!(texts, vec!["AB".to_string(), "1234".to_string()]);
  }

  #[test]
  fn blank_crop_has_no_text() {
    let recognizer = TemplateRecognizerBuilder::new().build();
    let crop = RgbImage::from_pixel(100, 30, Rgb([200, 200, 200]));
    assert!(recognizer.recognize(&crop).unwrap().is_empty());
  }

  #[test]
  fn empty_crop_is_invalid_input() {
    let recognizer = TemplateRecognizerBuilder::new().build();
    assert!(matches!(
      recognizer.recognize(&RgbImage::new(0, 10)),
      Err(RecognizeError::InvalidInput { width: 0, height: 10 })
    ));
  }

  #[test]
  fn runs_merge_small_gaps() {
    assert_eq!(runs(&[0, 1, 1, 0, 1, 0, 0, 2], 0), vec![(1, 2), (4, 4), (7, 7)]);
    assert_eq!(runs(&[0, 1, 1, 0, 1, 0, 0, 2], 1), vec![(1, 4), (7, 7)]);
    assert!(runs(&[0, 0], 0).is_empty());
  }

  #[test]
  fn wide_segment_is_split_evenly() {
    // 两个 25 像素宽的字符加 5 像素间隔
    let parts = split_segment(0, 54, 25.0);
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].0, 0);
    assert_eq!(parts[1].1, 54);
    assert_eq!(split_segment(10, 30, 25.0), vec![(10, 30)]);
  }
}
