// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/upload.rs - 上传路径测试
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

use std::sync::{
  Arc,
  atomic::{AtomicUsize, Ordering},
};

use image::RgbImage;

use shanan_lpr::{
  event::EventRecorder,
  frame::Frame,
  model::{BoundingBox, DetectError, DetectParams, RegionDetector, TemplateRecognizerBuilder},
  output::CsvEventLog,
  pipeline::PlatePipeline,
  upload::{UploadError, UploadService},
};

/// 只统计调用次数的检测器
#[derive(Default)]
struct CountingDetector(AtomicUsize);

impl RegionDetector for CountingDetector {
  fn detect(&self, _: &Frame, _: &DetectParams) -> Result<Vec<BoundingBox>, DetectError> {
    self.0.fetch_add(1, Ordering::SeqCst);
    Ok(Vec::new())
  }
}

struct Fixture {
  dir: tempfile::TempDir,
  detector: Arc<CountingDetector>,
  service: UploadService,
}

fn fixture() -> Fixture {
  let dir = tempfile::tempdir().unwrap();
  let detector = Arc::new(CountingDetector::default());
  let pipeline = PlatePipeline::builder(
    detector.clone(),
    Arc::new(TemplateRecognizerBuilder::new().build()),
  )
  .build();
  let log = CsvEventLog::open(dir.path().join("results.csv")).unwrap();
  let service = UploadService::new(
    dir.path().join("uploads"),
    Arc::new(pipeline),
    Arc::new(EventRecorder::new(Arc::new(log))),
  );
  Fixture {
    dir,
    detector,
    service,
  }
}

#[test]
fn gif_upload_is_rejected_before_the_pipeline() {
  let fx = fixture();
  let png = common::png_bytes(&RgbImage::new(8, 8));

  let result = fx.service.handle(Some("car.gif"), &png);
  assert!(matches!(result, Err(UploadError::DisallowedExtension(_))));
  assert_eq!(fx.detector.0.load(Ordering::SeqCst), 0);
  assert!(!fx.service.upload_dir().exists());
}

#[test]
fn missing_and_empty_filenames_are_client_errors() {
  let fx = fixture();
  let missing = fx.service.handle(None, &[]).unwrap_err();
  assert_eq!(missing.to_string(), "No file part");
  assert!(missing.is_client_error());

  let empty = fx.service.handle(Some(""), b"data").unwrap_err();
  assert_eq!(empty.to_string(), "No selected file");
  assert_eq!(fx.detector.0.load(Ordering::SeqCst), 0);
}

#[test]
fn undecodable_bytes_are_a_client_error() {
  let fx = fixture();
  let err = fx.service.handle(Some("car.png"), b"not really a png").unwrap_err();
  assert!(matches!(err, UploadError::Decode(_)));
  assert!(err.is_client_error());
  assert_eq!(fx.detector.0.load(Ordering::SeqCst), 0);
}

#[test]
fn plate_upload_is_saved_read_and_logged() {
  let dir = tempfile::tempdir().unwrap();
  let log_path = dir.path().join("results.csv");
  let service = UploadService::new(
    dir.path().join("uploads"),
    common::default_pipeline(),
    Arc::new(EventRecorder::new(Arc::new(CsvEventLog::open(&log_path).unwrap()))),
  );
  let png = common::png_bytes(&common::plate_image("AB12CDE"));

  let outcome = service.handle(Some("../my car.PNG"), &png).unwrap();
  assert_eq!(outcome.saved_path, dir.path().join("uploads").join("my_car.PNG"));
  assert_eq!(std::fs::read(&outcome.saved_path).unwrap(), png);
  assert_eq!(outcome.reads.len(), 1);
  assert_eq!(outcome.reads[0].plate_text, "AB12CDE");

  let content = std::fs::read_to_string(&log_path).unwrap();
  let row = content.lines().nth(1).unwrap();
  assert!(row.contains(",Upload,AB12CDE,"));
}

#[test]
fn unusable_filename_falls_back_to_timestamp() {
  let fx = fixture();
  let png = common::png_bytes(&RgbImage::new(8, 8));
  let outcome = fx.service.handle(Some("车牌.JPG"), &png).unwrap();
  let name = outcome.saved_path.file_name().unwrap().to_str().unwrap();
  assert!(name.starts_with("upload-"));
  assert!(name.ends_with(".jpg"));
  assert!(outcome.reads.is_empty());
  assert_eq!(fx.detector.0.load(Ordering::SeqCst), 1);
  drop(fx.dir);
}
