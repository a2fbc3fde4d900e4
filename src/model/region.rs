// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/region.rs - 二值图连通域统计
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};

pub const FOREGROUND: u8 = 255;

/// 单个连通域的外接框与像素数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentStats {
  pub label: u32,
  pub min_x: u32,
  pub min_y: u32,
  pub max_x: u32,
  pub max_y: u32,
  pub pixels: u32,
}

impl ComponentStats {
  fn seed(label: u32, x: u32, y: u32) -> Self {
    Self {
      label,
      min_x: x,
      min_y: y,
      max_x: x,
      max_y: y,
      pixels: 0,
    }
  }

  fn include(&mut self, x: u32, y: u32) {
    self.min_x = self.min_x.min(x);
    self.min_y = self.min_y.min(y);
    self.max_x = self.max_x.max(x);
    self.max_y = self.max_y.max(y);
    self.pixels += 1;
  }

  pub fn width(&self) -> u32 {
    self.max_x - self.min_x + 1
  }

  pub fn height(&self) -> u32 {
    self.max_y - self.min_y + 1
  }

  pub fn bbox_area(&self) -> u32 {
    self.width() * self.height()
  }

  /// 像素数占外接框面积的比例
  pub fn fill(&self) -> f32 {
    self.pixels as f32 / self.bbox_area() as f32
  }

  pub fn touches_border(&self, width: u32, height: u32) -> bool {
    self.min_x == 0 || self.min_y == 0 || self.max_x + 1 >= width || self.max_y + 1 >= height
  }
}

pub struct Components {
  pub labels: ImageBuffer<Luma<u32>, Vec<u32>>,
  pub stats: Vec<ComponentStats>,
}

impl Components {
  pub fn label_at(&self, x: u32, y: u32) -> u32 {
    self.labels.get_pixel(x, y)[0]
  }
}

/// 对前景（值为 [`FOREGROUND`]）做 8 连通标记并统计每个连通域
pub fn label_components(mask: &GrayImage) -> Components {
  let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

  let mut slots: Vec<Option<ComponentStats>> = Vec::new();
  for (x, y, pixel) in labels.enumerate_pixels() {
    let label = pixel[0];
    if label == 0 {
      continue;
    }
    let index = label as usize;
    if slots.len() <= index {
      slots.resize(index + 1, None);
    }
    slots[index]
      .get_or_insert_with(|| ComponentStats::seed(label, x, y))
      .include(x, y);
  }

  Components {
    labels,
    stats: slots.into_iter().flatten().collect(),
  }
}

/// 按谓词生成二值掩码
pub fn binarize(gray: &GrayImage, is_foreground: impl Fn(u8) -> bool) -> GrayImage {
  GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
    if is_foreground(gray.get_pixel(x, y)[0]) {
      Luma([FOREGROUND])
    } else {
      Luma([0])
    }
  })
}

/// 灰度图的最小值和最大值
pub fn intensity_range(gray: &GrayImage) -> (u8, u8) {
  gray
    .pixels()
    .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn labels_two_separate_blobs() {
    let mut mask = GrayImage::new(10, 6);
    for y in 1..3 {
      for x in 1..4 {
        mask.put_pixel(x, y, Luma([FOREGROUND]));
      }
    }
    mask.put_pixel(8, 5, Luma([FOREGROUND]));

    let components = label_components(&mask);
    assert_eq!(components.stats.len(), 2);

    let big = components.stats.iter().find(|s| s.pixels == 6).unwrap();
    assert_eq!((big.min_x, big.min_y, big.max_x, big.max_y), (1, 1, 3, 2));
    assert_eq!(big.width(), 3);
    assert!((big.fill() - 1.0).abs() < 1e-6);
    assert!(!big.touches_border(10, 6));

    let dot = components.stats.iter().find(|s| s.pixels == 1).unwrap();
    assert!(dot.touches_border(10, 6));
    assert_eq!(components.label_at(8, 5), dot.label);
  }

  #[test]
  fn intensity_range_of_uniform_image() {
    let gray = GrayImage::from_pixel(4, 4, Luma([7]));
    assert_eq!(intensity_range(&gray), (7, 7));
  }
}
