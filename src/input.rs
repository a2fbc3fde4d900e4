// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError, load_image};

mod image_dir;
pub use self::image_dir::{ImageDirInput, ImageDirInputError};

#[cfg(feature = "v4l2_input")]
mod v4l2_source;
#[cfg(feature = "v4l2_input")]
pub use self::v4l2_source::{V4l2Source, V4l2SourceError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("图像文件输入错误: {0}")]
  ImageFile(#[from] ImageFileInputError),
  #[error("图像目录输入错误: {0}")]
  ImageDir(#[from] ImageDirInputError),
  #[cfg(feature = "v4l2_input")]
  #[error("V4L2 输入错误: {0}")]
  V4l2(#[from] V4l2SourceError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择的帧来源
pub enum InputWrapper {
  ImageFile(ImageFileInput),
  ImageDir(ImageDirInput),
  #[cfg(feature = "v4l2_input")]
  V4l2(V4l2Source),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?)),
      ImageDirInput::SCHEME => Ok(InputWrapper::ImageDir(ImageDirInput::from_url(url)?)),
      #[cfg(feature = "v4l2_input")]
      V4l2Source::SCHEME => Ok(InputWrapper::V4l2(V4l2Source::from_url(url)?)),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ImageFile(input) => input.next().map(Ok),
      InputWrapper::ImageDir(input) => input.next().map(|r| r.map_err(InputError::from)),
      #[cfg(feature = "v4l2_input")]
      InputWrapper::V4l2(input) => input.next().map(|r| r.map_err(InputError::from)),
    }
  }
}

#[cfg(test)]
mod tests {
  use image::{Rgb, RgbImage};

  use super::*;

  #[test]
  fn wrapper_selects_source_by_scheme() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("one.png");
    RgbImage::from_pixel(4, 4, Rgb([9, 9, 9])).save(&path).unwrap();

    let file = Url::parse(&format!("image://{}", path.display())).unwrap();
    let mut input = InputWrapper::from_url(&file).unwrap();
    assert!(matches!(input.next(), Some(Ok(_))));
    assert!(input.next().is_none());

    let directory = Url::parse(&format!("dir://{}", dir.path().display())).unwrap();
    assert!(matches!(
      InputWrapper::from_url(&directory),
      Ok(InputWrapper::ImageDir(_))
    ));

    let rtsp = Url::parse("rtsp://camera/stream").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&rtsp),
      Err(InputError::SchemeMismatch(s)) if s == "rtsp"
    ));
  }
}
