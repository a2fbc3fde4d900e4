// 该文件是 Shanan （山南西风） 项目的一部分。
// src/utils.rs - URL 参数解析工具
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
  path::{Path, PathBuf},
  str::FromStr,
};

use url::Url;

/// 取出 URL 中的文件路径并做百分号解码
///
/// 同时支持 `csv:///var/lib/results.csv` 这样的绝对路径和
/// `csv:results.csv` 这样的相对路径写法。
pub fn url_file_path(url: &Url) -> PathBuf {
  let raw = url.path();
  let decoded = urlencoding::decode(raw)
    .map(|s| s.into_owned())
    .unwrap_or_else(|_| raw.to_string());
  PathBuf::from(decoded)
}

pub fn query_map(url: &Url) -> HashMap<String, String> {
  url
    .query_pairs()
    .map(|(k, v)| (String::from(k), String::from(v)))
    .collect()
}

/// 读取查询参数，缺省时返回默认值，解析失败时返回参数名
pub fn query_value<T: FromStr>(
  query: &HashMap<String, String>,
  key: &str,
  default: T,
) -> Result<T, String> {
  match query.get(key) {
    Some(value) => value
      .parse()
      .map_err(|_| format!("参数 {} 的值无效: {}", key, value)),
    None => Ok(default),
  }
}

pub fn query_flag(query: &HashMap<String, String>, key: &str) -> bool {
  match query.get(key).map(|v| v.as_str()) {
    Some("") | Some("1") | Some("true") | Some("yes") => true,
    _ => false,
  }
}

/// 可以作为输入的图像文件扩展名
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// 扩展名（不区分大小写）是否属于 [`IMAGE_EXTENSIONS`]
pub fn has_image_extension(path: impl AsRef<Path>) -> bool {
  path
    .as_ref()
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed)))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decodes_absolute_and_relative_paths() {
    let abs = Url::parse("csv:///tmp/plate%20log.csv").unwrap();
    assert_eq!(url_file_path(&abs), PathBuf::from("/tmp/plate log.csv"));

    let rel = Url::parse("csv:results.csv").unwrap();
    assert_eq!(url_file_path(&rel), PathBuf::from("results.csv"));
  }

  #[test]
  fn parses_query_values_with_defaults() {
    let url = Url::parse("contour://?min_aspect=2.5&loop").unwrap();
    let query = query_map(&url);
    assert_eq!(query_value(&query, "min_aspect", 1.0f32), Ok(2.5));
    assert_eq!(query_value(&query, "max_aspect", 7.0f32), Ok(7.0));
    assert!(query_flag(&query, "loop"));
    assert!(!query_flag(&query, "always"));

    let bad = Url::parse("contour://?min_aspect=wide").unwrap();
    assert!(query_value(&query_map(&bad), "min_aspect", 1.0f32).is_err());
  }

  #[test]
  fn image_extensions_are_case_insensitive() {
    assert!(has_image_extension("car.JPG"));
    assert!(has_image_extension("dir/plate.bmp"));
    assert!(!has_image_extension("car.gif"));
    assert!(!has_image_extension("png"));
  }
}
