// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/csv_log.rs - CSV 事件日志
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
  fs::OpenOptions,
  io::Write,
  path::{Path, PathBuf},
  sync::{Mutex, PoisonError},
};

use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  event::{EventLog, EventLogError, PlateEvent},
  utils::url_file_path,
};

pub const CSV_HEADER: &str = "Timestamp,Source,Detected Number Plate,Confidence";

/// 追加写入的 CSV 文件
///
/// 文件不存在或为空时先写表头。所有写入在同一把锁下进行，每条记录一次写完。
pub struct CsvEventLog {
  path: PathBuf,
  lock: Mutex<()>,
}

impl FromUrlWithScheme for CsvEventLog {
  const SCHEME: &'static str = "csv";
}

impl FromUrl for CsvEventLog {
  type Error = EventLogError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(EventLogError::SchemeMismatch(url.scheme().to_string()));
    }
    Self::open(url_file_path(url))
  }
}

impl CsvEventLog {
  /// 打开（必要时创建）日志文件
  pub fn open(path: impl Into<PathBuf>) -> Result<Self, EventLogError> {
    let path = path.into();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let log = Self {
      path,
      lock: Mutex::new(()),
    };
    log.write(None)?;
    info!("事件日志文件: {}", log.path.display());
    Ok(log)
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn write(&self, event: Option<&PlateEvent>) -> Result<(), EventLogError> {
    let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)?;

    let mut record = String::new();
    if file.metadata()?.len() == 0 {
      record.push_str(CSV_HEADER);
      record.push('\n');
    }
    if let Some(event) = event {
      record.push_str(&csv_row(event));
    }
    if !record.is_empty() {
      file.write_all(record.as_bytes())?;
      file.flush()?;
    }
    Ok(())
  }
}

impl EventLog for CsvEventLog {
  fn append(&self, event: &PlateEvent) -> Result<(), EventLogError> {
    self.write(Some(event))?;
    debug!("记录事件: {} {}", event.source, event.plate_text);
    Ok(())
  }
}

/// 一条以换行结尾的 CSV 记录
pub fn csv_row(event: &PlateEvent) -> String {
  format!(
    "{},{},{},{}\n",
    csv_field(&event.timestamp_string()),
    csv_field(event.source.as_str()),
    csv_field(&event.plate_text),
    event.confidence
  )
}

/// 含逗号、引号或换行的字段加引号，内部引号加倍
fn csv_field(value: &str) -> String {
  if value.contains([',', '"', '\n', '\r']) {
    format!("\"{}\"", value.replace('"', "\"\""))
  } else {
    value.to_string()
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;
  use crate::event::SourceTag;

  fn event(text: &str) -> PlateEvent {
    let ts = NaiveDate::from_ymd_opt(2026, 1, 2)
      .unwrap()
      .and_hms_opt(3, 4, 5)
      .unwrap();
    PlateEvent::at(ts, SourceTag::Upload, text, 0.5)
  }

  #[test]
  fn header_is_written_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs/results.csv");
    let log = CsvEventLog::open(&path).unwrap();
    log.append(&event("AB12")).unwrap();
    drop(log);

    let log = CsvEventLog::open(&path).unwrap();
    log.append(&event("CD34")).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
      content,
      "Timestamp,Source,Detected Number Plate,Confidence\n\
       2026-01-02 03:04:05,Upload,AB12,0.5\n\
       2026-01-02 03:04:05,Upload,CD34,0.5\n"
    );
  }

  #[test]
  fn special_characters_are_quoted() {
    assert_eq!(csv_field("AB,12"), "\"AB,12\"");
    assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    assert_eq!(csv_field("Live Stream"), "Live Stream");
  }

  #[test]
  fn from_url_opens_file_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("r.csv");
    let url = Url::parse(&format!("csv://{}", path.display())).unwrap();
    let log = CsvEventLog::from_url(&url).unwrap();
    assert_eq!(log.path(), path.as_path());

    let wrong = Url::parse("image:///tmp/x.png").unwrap();
    assert!(matches!(
      CsvEventLog::from_url(&wrong),
      Err(EventLogError::SchemeMismatch(_))
    ));
  }
}
