// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 输出定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, pipeline::PlateRead};

pub trait Render<Frame, Output: ?Sized> {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

pub mod draw;
pub mod mjpeg;

mod csv_log;
pub use self::csv_log::{CSV_HEADER, CsvEventLog, csv_row};

mod save_image_file;
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

pub use self::mjpeg::{MjpegError, MjpegFileOutput};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[error("MJPEG 输出错误: {0}")]
  MjpegError(#[from] MjpegError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  SaveImageFile(SaveImageFileOutput),
  MjpegFile(MjpegFileOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFile(output))
      }
      MjpegFileOutput::SCHEME => {
        let output = MjpegFileOutput::from_url(url)?;
        Ok(OutputWrapper::MjpegFile(output))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render<Frame, [PlateRead]> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &Frame, result: &[PlateRead]) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::SaveImageFile(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      OutputWrapper::MjpegFile(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}

/// 不输出任何内容
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl Render<Frame, [PlateRead]> for NullOutput {
  type Error = std::convert::Infallible;

  fn render_result(&self, _frame: &Frame, _result: &[PlateRead]) -> Result<(), Self::Error> {
    Ok(())
  }
}

impl<R: Render<Frame, [PlateRead]>> Render<Frame, [PlateRead]> for Option<R> {
  type Error = R::Error;

  fn render_result(&self, frame: &Frame, result: &[PlateRead]) -> Result<(), Self::Error> {
    match self {
      Some(output) => output.render_result(frame, result),
      None => Ok(()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wrapper_selects_output_by_scheme() {
    let dir = tempfile::tempdir().unwrap();
    let image_url = Url::parse(&format!("image://{}/a.png", dir.path().display())).unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&image_url),
      Ok(OutputWrapper::SaveImageFile(_))
    ));

    let mjpeg_url = Url::parse(&format!("mjpeg://{}/a.mjpeg", dir.path().display())).unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&mjpeg_url),
      Ok(OutputWrapper::MjpegFile(_))
    ));

    let rtsp = Url::parse("rtsp://camera/stream").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&rtsp),
      Err(OutputError::SchemeMismatch(s)) if s == "rtsp"
    ));
  }
}
