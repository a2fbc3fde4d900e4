// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/pipeline_e2e.rs - 流水线端到端测试
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

mod common;

use std::sync::Arc;

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_filled_rect_mut, rect::Rect};

use shanan_lpr::{
  event::SourceTag,
  frame::Frame,
  model::{
    BoundingBox, DetectError, DetectParams, RegionDetector, TemplateRecognizerBuilder,
    postprocess::filter_boxes,
  },
  normalize::{Jurisdiction, PlateNormalizer},
  pipeline::PlatePipeline,
};

#[test]
fn synthetic_plate_reads_exact_text() {
  let pipeline = common::default_pipeline();
  let frame = Frame::new(common::plate_image("AB12CDE"));

  let reads = pipeline.process(&frame, SourceTag::Upload);
  assert_eq!(reads.len(), 1);
  assert_eq!(reads[0].plate_text, "AB12CDE");
  assert!(reads[0].confidence > 0.0 && reads[0].confidence <= 1.0);

  let (px, py, pw, ph) = common::PLATE;
  assert_eq!(reads[0].bbox.x_min, px as f32);
  assert_eq!(reads[0].bbox.y_max, (py + ph) as f32);
  assert_eq!(reads[0].bbox.x_max, (px + pw) as f32);
}

#[test]
fn untextured_bright_square_is_ignored() {
  let mut image = common::plate_image("AB12CDE");
  draw_filled_rect_mut(&mut image, Rect::at(30, 30).of_size(100, 100), Rgb([240, 240, 240]));

  let reads = common::default_pipeline().process(&Frame::new(image), SourceTag::LiveStream);
  let texts: Vec<_> = reads.iter().map(|r| r.plate_text.as_str()).collect();
  assert_eq!(texts, vec!["AB12CDE"]);
}

#[test]
fn black_frame_yields_nothing() {
  let frame = Frame::new(RgbImage::new(640, 480));
  assert!(common::default_pipeline().process(&frame, SourceTag::Upload).is_empty());
}

#[test]
fn empty_frame_is_skipped() {
  let frame = Frame::new(RgbImage::new(0, 0));
  assert!(common::default_pipeline().process(&frame, SourceTag::Upload).is_empty());
}

#[test]
fn jurisdiction_rules_filter_reads() {
  let pipeline = PlatePipeline::builder(
    Arc::new(shanan_lpr::model::ContourDetectorBuilder::new().build()),
    Arc::new(TemplateRecognizerBuilder::new().build()),
  )
  .normalizer(PlateNormalizer::for_jurisdiction(Jurisdiction::Uk))
  .build();

  let frame = Frame::new(common::plate_image("AB12CDE"));
  assert_eq!(pipeline.process(&frame, SourceTag::Upload).len(), 1);

  let too_long = Frame::new(common::plate_image("AB12CDEF"));
  assert!(pipeline.process(&too_long, SourceTag::Upload).is_empty());
}

/// 先返回一个完全在画面外的框，再返回真实车牌的位置
struct OffscreenFirst;

impl RegionDetector for OffscreenFirst {
  fn detect(&self, frame: &Frame, params: &DetectParams) -> Result<Vec<BoundingBox>, DetectError> {
    frame.validate()?;
    let (px, py, pw, ph) = common::PLATE;
    Ok(filter_boxes(
      vec![
        BoundingBox::new(700.0, 10.0, 760.0, 40.0, 0, 0.95),
        BoundingBox::new(px as f32, py as f32, (px + pw) as f32, (py + ph) as f32, 0, 0.9),
      ],
      params,
    ))
  }
}

#[test]
fn zero_width_crop_is_skipped_without_losing_the_frame() {
  let pipeline = PlatePipeline::builder(
    Arc::new(OffscreenFirst),
    Arc::new(TemplateRecognizerBuilder::new().build()),
  )
  .build();

  let reads = pipeline.process(&Frame::new(common::plate_image("AB12CDE")), SourceTag::Upload);
  assert_eq!(reads.len(), 1);
  assert_eq!(reads[0].plate_text, "AB12CDE");
}
