// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/event_log.rs - 并发写入事件日志
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

use std::{sync::Arc, thread, time::Duration};

use shanan_lpr::{
  event::{EventRecorder, SourceTag},
  model::BoundingBox,
  output::{CSV_HEADER, CsvEventLog},
  pipeline::PlateRead,
};

const PER_WRITER: usize = 200;

fn read(text: String) -> PlateRead {
  PlateRead {
    plate_text: text,
    confidence: 0.75,
    bbox: BoundingBox::new(0.0, 0.0, 10.0, 5.0, 0, 0.9),
  }
}

#[test]
fn concurrent_upload_and_live_appends_are_intact() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("results.csv");
  let recorder = Arc::new(EventRecorder::new(Arc::new(CsvEventLog::open(&path).unwrap())));

  let writers: Vec<_> = [(SourceTag::Upload, "UP"), (SourceTag::LiveStream, "LV")]
    .into_iter()
    .map(|(source, prefix)| {
      let recorder = recorder.clone();
      thread::spawn(move || {
        for i in 0..PER_WRITER {
          let written = recorder.record(source, &[read(format!("{}{:04}", prefix, i))]);
          assert_eq!(written, 1);
        }
      })
    })
    .collect();
  for writer in writers {
    writer.join().unwrap();
  }

  let content = std::fs::read_to_string(&path).unwrap();
  let mut lines = content.lines();
  assert_eq!(lines.next(), Some(CSV_HEADER));

  let rows: Vec<Vec<&str>> = lines.map(|line| line.split(',').collect()).collect();
  assert_eq!(rows.len(), 2 * PER_WRITER);
  assert!(rows.iter().all(|row| row.len() == 4));

  for (source, prefix) in [("Upload", "UP"), ("Live Stream", "LV")] {
    let mut plates: Vec<&str> = rows
      .iter()
      .filter(|row| row[1] == source)
      .map(|row| row[2])
      .collect();
    plates.sort();
    let expected: Vec<String> = (0..PER_WRITER).map(|i| format!("{}{:04}", prefix, i)).collect();
    assert_eq!(plates, expected);
  }
  assert_eq!(content.matches(CSV_HEADER).count(), 1);
}

#[test]
fn dedup_window_suppresses_repeats_per_source() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("results.csv");
  let recorder = EventRecorder::new(Arc::new(CsvEventLog::open(&path).unwrap()))
    .with_dedup_window(Duration::from_secs(60));

  assert_eq!(recorder.record(SourceTag::LiveStream, &[read("AB12CDE".into())]), 1);
  assert_eq!(recorder.record(SourceTag::LiveStream, &[read("AB12CDE".into())]), 0);
  assert_eq!(recorder.record(SourceTag::Upload, &[read("AB12CDE".into())]), 1);

  let content = std::fs::read_to_string(&path).unwrap();
  assert_eq!(content.lines().count(), 3);
}
