// 该文件是 Shanan （山南西风） 项目的一部分。
// src/upload.rs - 上传图像的校验、保存与识别
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

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::Local;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  event::{EventRecorder, SourceTag},
  frame::Frame,
  pipeline::{PlatePipeline, PlateRead},
  utils::has_image_extension,
};

/// 错误信息会原样返回给客户端
#[derive(Error, Debug)]
pub enum UploadError {
  #[error("No file part")]
  MissingFile,
  #[error("No selected file")]
  EmptyFilename,
  #[error("Invalid file type")]
  DisallowedExtension(String),
  #[error("Invalid image data: {0}")]
  Decode(#[from] image::ImageError),
  #[error("Failed to store upload: {0}")]
  Storage(#[from] std::io::Error),
}

impl UploadError {
  /// 是否属于客户端输入问题
  pub fn is_client_error(&self) -> bool {
    !matches!(self, UploadError::Storage(_))
  }
}

pub fn allowed_file(filename: &str) -> bool {
  has_image_extension(filename)
}

/// 把客户端给出的文件名变成可以安全落盘的名字
///
/// 只保留 ASCII 字母数字与 `._-`，路径分隔符和空白（连续的算一个）变成 `_`，
/// 去掉首尾的 `.` 和 `_`。结果可能为空。
pub fn secure_filename(filename: &str) -> String {
  let mut name = String::with_capacity(filename.len());
  let mut pending_gap = false;
  for ch in filename.chars() {
    if ch == '/' || ch == '\\' || ch.is_whitespace() {
      pending_gap = true;
      continue;
    }
    if !(ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-')) {
      continue;
    }
    if pending_gap && !name.is_empty() {
      name.push('_');
    }
    pending_gap = false;
    name.push(ch);
  }
  name.trim_matches(['.', '_']).to_string()
}

fn extension_of(filename: &str) -> String {
  Path::new(filename)
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| ext.to_ascii_lowercase())
    .unwrap_or_default()
}

/// 一次上传的处理结果
#[derive(Debug)]
pub struct UploadOutcome {
  pub saved_path: PathBuf,
  pub reads: Vec<PlateRead>,
}

/// 上传路径：校验 → 保存 → 识别 → 记录
pub struct UploadService {
  upload_dir: PathBuf,
  pipeline: Arc<PlatePipeline>,
  recorder: Arc<EventRecorder>,
}

impl UploadService {
  pub fn new(
    upload_dir: impl Into<PathBuf>,
    pipeline: Arc<PlatePipeline>,
    recorder: Arc<EventRecorder>,
  ) -> Self {
    Self {
      upload_dir: upload_dir.into(),
      pipeline,
      recorder,
    }
  }

  pub fn upload_dir(&self) -> &Path {
    &self.upload_dir
  }

  /// 处理一个上传文件
  ///
  /// 文件名与扩展名的校验在识别之前完成，校验失败时不会写盘也不会运行识别。
  pub fn handle(&self, filename: Option<&str>, data: &[u8]) -> Result<UploadOutcome, UploadError> {
    let filename = filename.ok_or(UploadError::MissingFile)?;
    if filename.trim().is_empty() {
      return Err(UploadError::EmptyFilename);
    }
    if !allowed_file(filename) {
      warn!("拒绝上传文件 {:?}: 扩展名不允许", filename);
      return Err(UploadError::DisallowedExtension(filename.to_string()));
    }

    let frame = Frame::from(image::load_from_memory(data)?);
    let saved_path = self.store(filename, data)?;
    info!(
      "保存上传文件 {} ({}x{})",
      saved_path.display(),
      frame.width(),
      frame.height()
    );

    let reads = self.pipeline.process(&frame, SourceTag::Upload);
    let recorded = self.recorder.record(SourceTag::Upload, &reads);
    info!("上传识别完成: {} 个车牌, 记录 {} 条", reads.len(), recorded);
    Ok(UploadOutcome { saved_path, reads })
  }

  fn store(&self, filename: &str, data: &[u8]) -> Result<PathBuf, UploadError> {
    let mut name = secure_filename(filename);
    if !allowed_file(&name) {
      name = format!(
        "upload-{}.{}",
        Local::now().format("%Y%m%d%H%M%S%3f"),
        extension_of(filename)
      );
    }
    std::fs::create_dir_all(&self.upload_dir)?;
    let path = self.upload_dir.join(name);
    std::fs::write(&path, data)?;
    Ok(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extensions_are_checked_case_insensitively() {
    assert!(allowed_file("car.PNG"));
    assert!(allowed_file("car.jpeg"));
    assert!(!allowed_file("car.gif"));
    assert!(!allowed_file("png"));
    assert!(!allowed_file("car."));
  }

  #[test]
  fn filenames_are_sanitized() {
    assert_eq!(secure_filename("my car.png"), "my_car.png");
    assert_eq!(secure_filename("../../etc/passwd.png"), "etc_passwd.png");
    assert_eq!(secure_filename("C:\\photos\\plate 1.jpg"), "C_photos_plate_1.jpg");
    assert_eq!(secure_filename("  spaced   out .bmp"), "spaced_out_.bmp");
    assert_eq!(secure_filename("车牌.png"), "png");
    assert_eq!(secure_filename("..."), "");
  }

  #[test]
  fn client_errors_are_classified() {
    assert!(UploadError::MissingFile.is_client_error());
    assert!(UploadError::DisallowedExtension("a.gif".into()).is_client_error());
    assert!(!UploadError::Storage(std::io::Error::other("full")).is_client_error());
    assert_eq!(UploadError::EmptyFilename.to_string(), "No selected file");
  }

  #[test]
  fn extension_is_lowercased() {
    assert_eq!(extension_of("车牌.JPG"), "jpg");
    assert_eq!(extension_of("noext"), "");
  }
}
