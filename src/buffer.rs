// 该文件是 Shanan （山南西风） 项目的一部分。
// src/buffer.rs - 丢弃最旧帧的有界缓冲
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
  collections::VecDeque,
  sync::{Condvar, Mutex, MutexGuard, PoisonError},
  time::Duration,
};

pub const DEFAULT_CAPACITY: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
  Accepted,
  /// 缓冲已满，最旧的一项被丢弃
  DroppedOldest,
  /// 缓冲已关闭，新项被丢弃
  Closed,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PopResult<T> {
  Item(T),
  /// 超时仍无数据
  Empty,
  /// 缓冲已关闭且已取空
  Closed,
}

struct State<T> {
  items: VecDeque<T>,
  closed: bool,
  dropped: u64,
}

/// 采集线程与处理线程之间的有界队列
///
/// 生产者从不阻塞：队列满时丢弃最旧的一项，保证处理的总是较新的帧。
pub struct DropOldestBuffer<T> {
  capacity: usize,
  state: Mutex<State<T>>,
  ready: Condvar,
}

impl<T> DropOldestBuffer<T> {
  pub fn new(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    Self {
      capacity,
      state: Mutex::new(State {
        items: VecDeque::with_capacity(capacity),
        closed: false,
        dropped: 0,
      }),
      ready: Condvar::new(),
    }
  }

  fn lock(&self) -> MutexGuard<'_, State<T>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn push(&self, item: T) -> PushOutcome {
    let mut state = self.lock();
    if state.closed {
      return PushOutcome::Closed;
    }
    let outcome = if state.items.len() >= self.capacity {
      state.items.pop_front();
      state.dropped += 1;
      PushOutcome::DroppedOldest
    } else {
      PushOutcome::Accepted
    };
    state.items.push_back(item);
    drop(state);
    self.ready.notify_one();
    outcome
  }

  /// 等待下一项，关闭后仍会先取完剩余数据
  pub fn pop_timeout(&self, timeout: Duration) -> PopResult<T> {
    let state = self.lock();
    let (mut state, _) = self
      .ready
      .wait_timeout_while(state, timeout, |s| s.items.is_empty() && !s.closed)
      .unwrap_or_else(PoisonError::into_inner);

    match state.items.pop_front() {
      Some(item) => PopResult::Item(item),
      None if state.closed => PopResult::Closed,
      None => PopResult::Empty,
    }
  }

  pub fn close(&self) {
    self.lock().closed = true;
    self.ready.notify_all();
  }

  pub fn is_closed(&self) -> bool {
    self.lock().closed
  }

  pub fn len(&self) -> usize {
    self.lock().items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// 因缓冲已满而丢弃的项数
  pub fn dropped(&self) -> u64 {
    self.lock().dropped
  }
}

impl<T> Default for DropOldestBuffer<T> {
  fn default() -> Self {
    Self::new(DEFAULT_CAPACITY)
  }
}
