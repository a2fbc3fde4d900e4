// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/common/mod.rs - 集成测试共用的合成车牌
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

#![allow(dead_code)]

use std::{io::Cursor, sync::Arc};

use image::{ImageFormat, Rgb, RgbImage};
use imageproc::{drawing::draw_filled_rect_mut, rect::Rect};

use shanan_lpr::{
  glyph,
  model::{ContourDetectorBuilder, TemplateRecognizerBuilder},
  pipeline::PlatePipeline,
};

pub const PLATE: (u32, u32, u32, u32) = (170, 200, 300, 75);

/// 640x480 的深色画面，中间一块浅色车牌，车牌上是深色文字
pub fn plate_image(text: &str) -> RgbImage {
  let mut image = RgbImage::from_pixel(640, 480, Rgb([30, 30, 30]));
  let (px, py, pw, ph) = PLATE;
  draw_filled_rect_mut(
    &mut image,
    Rect::at(px as i32, py as i32).of_size(pw, ph),
    Rgb([230, 230, 230]),
  );
  let tw = glyph::text_width(text, 5);
  let th = glyph::text_height(5);
  glyph::draw_text_mut(
    &mut image,
    text,
    (px + (pw - tw) / 2) as i32,
    (py + (ph - th) / 2) as i32,
    5,
    Rgb([20, 20, 20]),
  );
  image
}

pub fn png_bytes(image: &RgbImage) -> Vec<u8> {
  let mut buffer = Cursor::new(Vec::new());
  image.write_to(&mut buffer, ImageFormat::Png).unwrap();
  buffer.into_inner()
}

/// 默认的轮廓检测 + 模板识别流水线
pub fn default_pipeline() -> Arc<PlatePipeline> {
  Arc::new(
    PlatePipeline::builder(
      Arc::new(ContourDetectorBuilder::new().build()),
      Arc::new(TemplateRecognizerBuilder::new().build()),
    )
    .build(),
  )
}
