// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 车牌识别结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut},
  rect::Rect,
};

use crate::{frame::Frame, glyph, pipeline::PlateRead};

const BOX_COLOR: [u8; 3] = [0, 200, 0]; // 绿色
const TEXT_COLOR: [u8; 3] = [255, 255, 255];
const BOX_THICKNESS: u32 = 2;
const LABEL_SCALE: u32 = 2;
const LABEL_PADDING: u32 = 2;

pub struct Draw {
  box_color: Rgb<u8>,
  text_color: Rgb<u8>,
  thickness: u32,
  label_scale: u32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      box_color: Rgb(BOX_COLOR),
      text_color: Rgb(TEXT_COLOR),
      thickness: BOX_THICKNESS,
      label_scale: LABEL_SCALE,
    }
  }
}

impl Draw {
  pub fn with_color(mut self, color: [u8; 3]) -> Self {
    self.box_color = Rgb(color);
    self
  }

  pub fn with_label_scale(mut self, scale: u32) -> Self {
    self.label_scale = scale.max(1);
    self
  }

  /// 复制帧并绘制所有识别结果
  pub fn render(&self, frame: &Frame, reads: &[PlateRead]) -> RgbImage {
    let mut image = frame.image().clone();
    self.annotate(&mut image, reads);
    image
  }

  pub fn annotate(&self, image: &mut RgbImage, reads: &[PlateRead]) {
    for read in reads {
      self.draw_read(image, read);
    }
  }

  fn draw_read(&self, image: &mut RgbImage, read: &PlateRead) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (read.bbox.x_min.floor() as i32).clamp(0, w - 1);
    let y_min = (read.bbox.y_min.floor() as i32).clamp(0, h - 1);
    let x_max = (read.bbox.x_max.ceil() as i32).clamp(0, w - 1);
    let y_max = (read.bbox.y_max.ceil() as i32).clamp(0, h - 1);
    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 边框向内加粗
    for t in 0..self.thickness as i32 {
      let (bw, bh) = (x_max - x_min - 2 * t, y_max - y_min - 2 * t);
      if bw <= 0 || bh <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(bw as u32 + 1, bh as u32 + 1);
      draw_hollow_rect_mut(image, rect, self.box_color);
    }

    let label = format!("{} {:.2}", read.plate_text, read.confidence);
    let label_w = glyph::text_width(&label, self.label_scale) + LABEL_PADDING * 2;
    let label_h = glyph::text_height(self.label_scale) + LABEL_PADDING * 2;

    // 优先放在框上方，放不下时放到框内顶部
    let label_x = x_min;
    let label_y = if y_min >= label_h as i32 { y_min - label_h as i32 } else { y_min };
    let visible_w = label_w.min((w - label_x) as u32);
    if visible_w == 0 {
      return;
    }

    draw_filled_rect_mut(
      image,
      Rect::at(label_x, label_y).of_size(visible_w, label_h),
      self.box_color,
    );
    glyph::draw_text_mut(
      image,
      &label,
      label_x + LABEL_PADDING as i32,
      label_y + LABEL_PADDING as i32,
      self.label_scale,
      self.text_color,
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::BoundingBox;

  fn read(bbox: BoundingBox) -> PlateRead {
    PlateRead {
      plate_text: "AB12".to_string(),
      confidence: 0.87,
      bbox,
    }
  }

  #[test]
  fn draws_box_and_label_above_it() {
    let frame = Frame::new(RgbImage::new(200, 120));
    let image = Draw::default().render(&frame, &[read(BoundingBox::new(20.0, 50.0, 120.0, 80.0, 0, 0.9))]);

    assert_eq!(*image.get_pixel(20, 60), Rgb(BOX_COLOR));
    assert_eq!(*image.get_pixel(21, 60), Rgb(BOX_COLOR));
    assert_eq!(*image.get_pixel(120, 70), Rgb(BOX_COLOR));
    // 框内部保持原样
    assert_eq!(*image.get_pixel(60, 65), Rgb([0, 0, 0]));
    // 标签背景位于框上方
    assert_eq!(*image.get_pixel(20, 50 - 2), Rgb(BOX_COLOR));
    // 原帧不被修改
    assert_eq!(*frame.image().get_pixel(20, 60), Rgb([0, 0, 0]));
  }

  #[test]
  fn boxes_outside_the_image_do_not_panic() {
    let mut image = RgbImage::new(50, 20);
    let draw = Draw::default();
    draw.annotate(&mut image, &[read(BoundingBox::new(-30.0, -30.0, 400.0, 400.0, 0, 0.9))]);
    draw.annotate(&mut image, &[read(BoundingBox::new(45.0, 0.0, 49.5, 3.0, 0, 0.9))]);
    draw.annotate(&mut image, &[read(BoundingBox::new(60.0, 30.0, 80.0, 40.0, 0, 0.9))]);
    assert_eq!(*image.get_pixel(0, 10), Rgb(BOX_COLOR));
  }
}
