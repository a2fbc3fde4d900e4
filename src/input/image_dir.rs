// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/image_dir.rs - 图像目录回放输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  path::{Path, PathBuf},
  thread,
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use super::read_image_file::{ImageFileInputError, load_image};
use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  utils::{has_image_extension, query_flag, query_map, query_value, url_file_path},
};

#[derive(Error, Debug)]
pub enum ImageDirInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("读取目录错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("目录中没有图像文件: {0}")]
  Empty(String),
  #[error("参数无效: {0}")]
  InvalidParameter(String),
  #[error("{path}: {source}")]
  Frame {
    path: String,
    source: ImageFileInputError,
  },
}

/// 把目录中的图像按文件名顺序当作视频流回放
///
/// `fps` 大于 0 时按该帧率节流；`loop` 为真时循环播放。
pub struct ImageDirInput {
  files: Vec<PathBuf>,
  position: usize,
  looping: bool,
  interval: Option<Duration>,
  next_due: Option<Instant>,
}

impl FromUrlWithScheme for ImageDirInput {
  const SCHEME: &'static str = "dir";
}

impl FromUrl for ImageDirInput {
  type Error = ImageDirInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageDirInputError::SchemeMismatch(url.scheme().to_string()));
    }
    let query = query_map(url);
    let fps: f64 = query_value(&query, "fps", 0.0).map_err(ImageDirInputError::InvalidParameter)?;
    if !(fps >= 0.0 && fps.is_finite()) {
      return Err(ImageDirInputError::InvalidParameter(format!("帧率无效: {}", fps)));
    }

    Ok(
      Self::open(url_file_path(url))?
        .with_fps(fps)
        .with_loop(query_flag(&query, "loop")),
    )
  }
}

impl ImageDirInput {
  pub fn open(dir: impl AsRef<Path>) -> Result<Self, ImageDirInputError> {
    let dir = dir.as_ref();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
      let path = entry?.path();
      if path.is_file() && has_image_extension(&path) {
        files.push(path);
      }
    }
    files.sort();

    if files.is_empty() {
      return Err(ImageDirInputError::Empty(dir.display().to_string()));
    }
    info!("图像目录 {}: {} 个文件", dir.display(), files.len());

    Ok(Self {
      files,
      position: 0,
      looping: false,
      interval: None,
      next_due: None,
    })
  }

  pub fn with_fps(mut self, fps: f64) -> Self {
    self.interval = (fps > 0.0).then(|| Duration::from_secs_f64(1.0 / fps));
    self
  }

  pub fn with_loop(mut self, looping: bool) -> Self {
    self.looping = looping;
    self
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  fn pace(&mut self) {
    let Some(interval) = self.interval else {
      return;
    };
    let now = Instant::now();
    if let Some(due) = self.next_due
      && due > now
    {
      thread::sleep(due - now);
    }
    self.next_due = Some(self.next_due.map_or(now, |due| due.max(now)) + interval);
  }
}

impl Iterator for ImageDirInput {
  type Item = Result<Frame, ImageDirInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.position >= self.files.len() {
      if !self.looping {
        return None;
      }
      self.position = 0;
    }
    self.pace();

    let path = &self.files[self.position];
    self.position += 1;
    debug!("读取帧 {}", path.display());
    Some(load_image(path).map_err(|source| ImageDirInputError::Frame {
      path: path.display().to_string(),
      source,
    }))
  }
}

#[cfg(test)]
mod tests {
  use image::{Rgb, RgbImage};

  use super::*;

  fn write_frames(dir: &Path) {
    for (name, shade) in [("b.png", 20u8), ("a.jpg", 10), ("c.BMP", 30)] {
      RgbImage::from_pixel(4, 4, Rgb([shade; 3])).save(dir.join(name)).unwrap();
    }
    std::fs::write(dir.join("notes.txt"), "skip me").unwrap();
  }

  #[test]
  fn replays_images_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path());

    let input = ImageDirInput::open(dir.path()).unwrap();
    assert_eq!(input.len(), 3);
    let frames: Vec<Frame> = input.map(|f| f.unwrap()).collect();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[1].image().get_pixel(0, 0).0, [20, 20, 20]);
  }

  #[test]
  fn looping_restarts_from_first_file() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path());
    let url = Url::parse(&format!("dir://{}?loop=true", dir.path().display())).unwrap();
    let input = ImageDirInput::from_url(&url).unwrap();
    assert_eq!(input.take(7).filter(|f| f.is_ok()).count(), 7);
  }

  #[test]
  fn empty_directory_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      ImageDirInput::open(dir.path()),
      Err(ImageDirInputError::Empty(_))
    ));
  }

  #[test]
  fn undecodable_file_is_reported_per_frame() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.png"), b"not an image").unwrap();
    let mut input = ImageDirInput::open(dir.path()).unwrap();
    assert!(matches!(
      input.next(),
      Some(Err(ImageDirInputError::Frame { .. }))
    ));
    assert!(input.next().is_none());
  }
}
