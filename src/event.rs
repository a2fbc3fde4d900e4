// 该文件是 Shanan （山南西风） 项目的一部分。
// src/event.rs - 车牌识别事件与记录
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
  collections::HashMap,
  fmt,
  sync::{Arc, Mutex, PoisonError},
  time::{Duration, Instant},
};

use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::pipeline::PlateRead;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 事件来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SourceTag {
  #[serde(rename = "Upload")]
  Upload,
  #[serde(rename = "Live Stream")]
  LiveStream,
}

impl SourceTag {
  pub fn as_str(&self) -> &'static str {
    match self {
      SourceTag::Upload => "Upload",
      SourceTag::LiveStream => "Live Stream",
    }
  }
}

impl fmt::Display for SourceTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 一条识别事件，写入后不再修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateEvent {
  pub timestamp: NaiveDateTime,
  pub source: SourceTag,
  pub plate_text: String,
  pub confidence: f32,
}

impl PlateEvent {
  /// 以当前本地时间（精确到秒）创建事件
  pub fn now(source: SourceTag, plate_text: impl Into<String>, confidence: f32) -> Self {
    Self::at(Local::now().naive_local(), source, plate_text, confidence)
  }

  pub fn at(
    timestamp: NaiveDateTime,
    source: SourceTag,
    plate_text: impl Into<String>,
    confidence: f32,
  ) -> Self {
    Self {
      timestamp: timestamp.trunc_subsecs(0),
      source,
      plate_text: plate_text.into(),
      confidence: confidence.clamp(0.0, 1.0),
    }
  }

  pub fn timestamp_string(&self) -> String {
    self.timestamp.format(TIMESTAMP_FORMAT).to_string()
  }
}

#[derive(Error, Debug)]
pub enum EventLogError {
  #[error("事件日志写入失败: {0}")]
  Io(#[from] std::io::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 只追加的事件存储
///
/// 实现需要保证并发调用时记录互不交错。
pub trait EventLog: Send + Sync {
  fn append(&self, event: &PlateEvent) -> Result<(), EventLogError>;
}

impl<T: EventLog + ?Sized> EventLog for Arc<T> {
  fn append(&self, event: &PlateEvent) -> Result<(), EventLogError> {
    (**self).append(event)
  }
}

/// 同一来源同一车牌在时间窗口内只记录一次，窗口为 0 时不过滤
#[derive(Debug, Default)]
pub struct DedupFilter {
  window: Duration,
  last_seen: Mutex<HashMap<(SourceTag, String), Instant>>,
}

impl DedupFilter {
  pub fn new(window: Duration) -> Self {
    Self {
      window,
      last_seen: Mutex::new(HashMap::new()),
    }
  }

  pub fn window(&self) -> Duration {
    self.window
  }

  pub fn admit(&self, source: SourceTag, plate_text: &str, now: Instant) -> bool {
    if self.window.is_zero() {
      return true;
    }
    let mut last_seen = self.last_seen.lock().unwrap_or_else(PoisonError::into_inner);
    let window = self.window;
    last_seen.retain(|_, seen| now.saturating_duration_since(*seen) < window);

    let key = (source, plate_text.to_string());
    if last_seen.contains_key(&key) {
      return false;
    }
    last_seen.insert(key, now);
    true
  }
}

/// 把流水线结果写入事件日志
///
/// 存储错误只记录日志，不影响调用方拿到识别结果。
pub struct EventRecorder {
  log: Arc<dyn EventLog>,
  dedup: DedupFilter,
}

impl EventRecorder {
  pub fn new(log: Arc<dyn EventLog>) -> Self {
    Self {
      log,
      dedup: DedupFilter::default(),
    }
  }

  pub fn with_dedup_window(mut self, window: Duration) -> Self {
    self.dedup = DedupFilter::new(window);
    self
  }

  /// 逐条追加，返回成功写入的条数
  pub fn record(&self, source: SourceTag, reads: &[PlateRead]) -> usize {
    let now = Instant::now();
    let mut written = 0;
    for read in reads {
      if read.plate_text.is_empty() {
        continue;
      }
      if !self.dedup.admit(source, &read.plate_text, now) {
        debug!("[{}] 车牌 {} 在去重窗口内，跳过记录", source, read.plate_text);
        continue;
      }
      let event = PlateEvent::now(source, read.plate_text.clone(), read.confidence);
      match self.log.append(&event) {
        Ok(()) => written += 1,
        Err(e) => error!("[{}] 记录车牌 {} 失败: {}", source, read.plate_text, e),
      }
    }
    written
  }
}
