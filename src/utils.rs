// 该文件是 Shanan （山南西风） 项目的一部分。
// src/utils.rs - 工具函数
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

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

/// 进程存活标志，退出开始后迟到的回调据此丢弃结果
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Default for Liveness {
  fn default() -> Self {
    Self(Arc::new(AtomicBool::new(true)))
  }
}

impl Liveness {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_alive(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }

  pub fn shutdown(&self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

/// 初始化日志输出，重复调用时忽略
pub fn init_tracing() {
  let _ = tracing_subscriber::fmt().try_init();
}
