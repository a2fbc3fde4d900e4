// 该文件是 Shanan （山南西风） 项目的一部分。
// src/glyph.rs - 内置 5x7 点阵字形
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

//! 车牌字符的点阵字形。
//!
//! 同一套字形既用于模板匹配识别，也用于在输出画面上绘制标签。

use image::{Rgb, RgbImage};

pub const GLYPH_WIDTH: u32 = 5;
pub const GLYPH_HEIGHT: u32 = 7;
/// 字符之间的间隔（以点阵单元计）
pub const GLYPH_SPACING: u32 = 1;

#[derive(Debug, Clone, Copy)]
pub struct Glyph {
  pub ch: char,
  rows: [&'static str; GLYPH_HEIGHT as usize],
}

impl Glyph {
  pub fn is_set(&self, col: u32, row: u32) -> bool {
    self
      .rows
      .get(row as usize)
      .and_then(|r| r.as_bytes().get(col as usize))
      .is_some_and(|&b| b == b'#')
  }

  /// 按行优先顺序展开为 0/1 单元
  pub fn cells(&self) -> [f32; (GLYPH_WIDTH * GLYPH_HEIGHT) as usize] {
    let mut cells = [0.0; (GLYPH_WIDTH * GLYPH_HEIGHT) as usize];
    for row in 0..GLYPH_HEIGHT {
      for col in 0..GLYPH_WIDTH {
        if self.is_set(col, row) {
          cells[(row * GLYPH_WIDTH + col) as usize] = 1.0;
        }
      }
    }
    cells
  }
}

const fn g(ch: char, rows: [&'static str; GLYPH_HEIGHT as usize]) -> Glyph {
  Glyph { ch, rows }
}

pub const GLYPHS: [Glyph; 39] = [
  g('A', [".###.", "#...#", "#...#", "#####", "#...#", "#...#", "#...#"]),
  g('B', ["####.", "#...#", "#...#", "####.", "#...#", "#...#", "####."]),
  g('C', [".###.", "#...#", "#....", "#....", "#....", "#...#", ".###."]),
  g('D', ["####.", "#...#", "#...#", "#...#", "#...#", "#...#", "####."]),
  g('E', ["#####", "#....", "#....", "####.", "#....", "#....", "#####"]),
  g('F', ["#####", "#....", "#....", "####.", "#....", "#....", "#...."]),
  g('G', [".###.", "#...#", "#....", "#.###", "#...#", "#...#", ".####"]),
  g('H', ["#...#", "#...#", "#...#", "#####", "#...#", "#...#", "#...#"]),
  g('I', [".###.", "..#..", "..#..", "..#..", "..#..", "..#..", ".###."]),
  g('J', ["..###", "...#.", "...#.", "...#.", "...#.", "#..#.", ".##.."]),
  g('K', ["#...#", "#..#.", "#.#..", "##...", "#.#..", "#..#.", "#...#"]),
  g('L', ["#....", "#....", "#....", "#....", "#....", "#....", "#####"]),
  g('M', ["#...#", "##.##", "#.#.#", "#.#.#", "#...#", "#...#", "#...#"]),
  g('N', ["#...#", "#...#", "##..#", "#.#.#", "#..##", "#...#", "#...#"]),
  g('O', [".###.", "#...#", "#...#", "#...#", "#...#", "#...#", ".###."]),
  g('P', ["####.", "#...#", "#...#", "####.", "#....", "#....", "#...."]),
  g('Q', [".###.", "#...#", "#...#", "#...#", "#.#.#", "#..#.", ".##.#"]),
  g('R', ["####.", "#...#", "#...#", "####.", "#.#..", "#..#.", "#...#"]),
  g('S', [".####", "#....", "#....", ".###.", "....#", "....#", "####."]),
  g('T', ["#####", "..#..", "..#..", "..#..", "..#..", "..#..", "..#.."]),
  g('U', ["#...#", "#...#", "#...#", "#...#", "#...#", "#...#", ".###."]),
  g('V', ["#...#", "#...#", "#...#", "#...#", "#...#", ".#.#.", "..#.."]),
  g('W', ["#...#", "#...#", "#...#", "#.#.#", "#.#.#", "#.#.#", ".#.#."]),
  g('X', ["#...#", "#...#", ".#.#.", "..#..", ".#.#.", "#...#", "#...#"]),
  g('Y', ["#...#", "#...#", ".#.#.", "..#..", "..#..", "..#..", "..#.."]),
  g('Z', ["#####", "....#", "...#.", "..#..", ".#...", "#....", "#####"]),
  g('0', [".###.", "#...#", "#..##", "#.#.#", "##..#", "#...#", ".###."]),
  g('1', ["..#..", ".##..", "..#..", "..#..", "..#..", "..#..", ".###."]),
  g('2', [".###.", "#...#", "....#", "...#.", "..#..", ".#...", "#####"]),
  g('3', ["#####", "...#.", "..#..", "...#.", "....#", "#...#", ".###."]),
  g('4', ["...#.", "..##.", ".#.#.", "#..#.", "#####", "...#.", "...#."]),
  g('5', ["#####", "#....", "####.", "....#", "....#", "#...#", ".###."]),
  g('6', ["..##.", ".#...", "#....", "####.", "#...#", "#...#", ".###."]),
  g('7', ["#####", "....#", "...#.", "..#..", ".#...", ".#...", ".#..."]),
  g('8', [".###.", "#...#", "#...#", ".###.", "#...#", "#...#", ".###."]),
  g('9', [".###.", "#...#", "#...#", ".####", "....#", "...#.", ".##.."]),
  g('-', [".....", ".....", ".....", "#####", ".....", ".....", "....."]),
  g('.', [".....", ".....", ".....", ".....", ".....", ".##..", ".##.."]),
  g(' ', [".....", ".....", ".....", ".....", ".....", ".....", "....."]),
];

pub fn glyph(ch: char) -> Option<&'static Glyph> {
  let ch = ch.to_ascii_uppercase();
  GLYPHS.iter().find(|g| g.ch == ch)
}

/// 参与模板匹配的字形（仅字母与数字）
pub fn templates() -> impl Iterator<Item = &'static Glyph> {
  GLYPHS.iter().filter(|g| g.ch.is_ascii_alphanumeric())
}

/// 文本按给定缩放倍数绘制后的像素宽度
pub fn text_width(text: &str, scale: u32) -> u32 {
  let count = text.chars().count() as u32;
  if count == 0 {
    return 0;
  }
  (count * (GLYPH_WIDTH + GLYPH_SPACING) - GLYPH_SPACING) * scale
}

pub fn text_height(scale: u32) -> u32 {
  GLYPH_HEIGHT * scale
}

/// 在图像上绘制文本，超出边界的部分被裁掉，未知字符留空
pub fn draw_text_mut(image: &mut RgbImage, text: &str, x: i32, y: i32, scale: u32, color: Rgb<u8>) {
  let scale = scale.max(1) as i32;
  let advance = (GLYPH_WIDTH + GLYPH_SPACING) as i32 * scale;
  let (width, height) = (image.width() as i32, image.height() as i32);

  for (index, ch) in text.chars().enumerate() {
    let Some(glyph) = glyph(ch) else {
      continue;
    };
    let origin_x = x + index as i32 * advance;

    for row in 0..GLYPH_HEIGHT {
      for col in 0..GLYPH_WIDTH {
        if !glyph.is_set(col, row) {
          continue;
        }
        let px = origin_x + col as i32 * scale;
        let py = y + row as i32 * scale;
        for dy in 0..scale {
          for dx in 0..scale {
            let (xx, yy) = (px + dx, py + dy);
            if xx >= 0 && yy >= 0 && xx < width && yy < height {
              image.put_pixel(xx as u32, yy as u32, color);
            }
          }
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn glyph_rows_are_well_formed() {
    for g in GLYPHS.iter() {
      for row in g.rows.iter() {
        assert_eq!(row.len(), GLYPH_WIDTH as usize, "字形 {} 行宽错误", g.ch);
        assert!(row.bytes().all(|b| b == b'#' || b == b'.'));
      }
    }
  }

  #[test]
  fn templates_are_pairwise_distinct() {
    let all: Vec<_> = templates().collect();
    assert_eq!(all.len(), 36);
    for (i, a) in all.iter().enumerate() {
      for b in all.iter().skip(i + 1) {
        assert_ne!(a.cells(), b.cells(), "{} 与 {} 字形相同", a.ch, b.ch);
      }
    }
  }

  #[test]
  fn lookup_is_case_insensitive() {
    assert_eq!(glyph('a').map(|g| g.ch), Some('A'));
    assert!(glyph('#').is_none());
  }

  #[test]
  fn draws_scaled_text_and_clips() {
    let mut image = RgbImage::new(20, 20);
    let white = Rgb([255, 255, 255]);
    draw_text_mut(&mut image, "1", 0, 0, 2, white);
    // '1' 第一行只有中间一列
    assert_eq!(*image.get_pixel(4, 0), white);
    assert_eq!(*image.get_pixel(5, 1), white);
    assert_eq!(*image.get_pixel(0, 0), Rgb([0, 0, 0]));

    // 越界绘制不会 panic
    draw_text_mut(&mut image, "W", 15, 15, 3, white);
    draw_text_mut(&mut image, "W", -10, -10, 3, white);
  }

  #[test]
  fn text_width_accounts_for_spacing() {
    assert_eq!(text_width("", 3), 0);
    assert_eq!(text_width("A", 3), 15);
    assert_eq!(text_width("AB", 2), (5 + 1 + 5) * 2);
  }
}
