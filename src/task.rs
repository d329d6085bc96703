// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 帧摄入任务循环
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
  sync::{Mutex, OnceLock},
  thread,
  time::Duration,
};

use anyhow::{Context, anyhow};
use tracing::{info, warn};

use crate::{
  FromUrl, args::NodeArgs, frame::ImageMessage, input::InputWrapper, orchestrator::Ingest,
  utils::Liveness,
};

/// 收到中断信号后等待在途回调的最长时间
const FORCE_EXIT_GRACE: Duration = Duration::from_secs(30);

pub trait Task<I, N: ?Sized>: Sized {
  type Error;
  fn run_task(self, input: I, node: &N) -> Result<TaskSummary, Self::Error>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskSummary {
  pub submitted: usize,
  pub dropped: usize,
}

/// 所有需要响应 Ctrl-C 的存活标志
static INTERRUPT_TARGETS: OnceLock<Mutex<Vec<Liveness>>> = OnceLock::new();

/// 安装 Ctrl-C 处理：翻转存活标志，超时后强制退出
///
/// `ctrlc` 在进程内只能安装一次；之后的调用只登记新的存活标志，
/// 中断时所有登记过的标志一起翻转。
pub fn install_interrupt_handler(liveness: Liveness) -> anyhow::Result<()> {
  let mut first = false;
  let targets = INTERRUPT_TARGETS.get_or_init(|| {
    first = true;
    Mutex::new(Vec::new())
  });
  targets
    .lock()
    .map_err(|_| anyhow!("中断处理状态锁已损坏"))?
    .push(liveness);

  if first {
    ctrlc::set_handler(|| {
      info!("收到中断信号，准备退出...");
      interrupt_all();
      thread::spawn(|| {
        thread::sleep(FORCE_EXIT_GRACE);
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .context("无法安装 Ctrl-C 处理")?;
  }
  Ok(())
}

fn interrupt_all() {
  let Some(targets) = INTERRUPT_TARGETS.get() else {
    return;
  };
  match targets.lock() {
    Ok(targets) => targets.iter().for_each(Liveness::shutdown),
    Err(_) => warn!("中断处理状态锁已损坏"),
  }
}

/// 逐帧摄入，直到输入结束、达到帧数或进程退出
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<I, N> Task<I, N> for ContinuousTask
where
  I: Iterator<Item = ImageMessage>,
  N: Ingest + ?Sized,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, node: &N) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let mut summary = TaskSummary::default();
    let mut frame_index = 0usize;

    for msg in input {
      if !node.liveness().is_alive() {
        warn!("中断信号接收，退出任务循环");
        break;
      }

      frame_index += 1;
      // 错误已在摄入端记录，这里只计数
      match node.feed(&msg) {
        Ok(()) => summary.submitted += 1,
        Err(_) => summary.dropped += 1,
      }

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
    }

    info!(
      "任务完成，提交 {} 帧，丢弃 {} 帧",
      summary.submitted, summary.dropped
    );
    Ok(summary)
  }
}

/// 按启动参数驱动节点：从 `--input` 读取帧，直到输入结束、达到帧数或中断
pub fn run_node<N>(node: &N, args: &NodeArgs) -> anyhow::Result<TaskSummary>
where
  N: Ingest + ?Sized,
{
  let source = args.input.as_ref().context("未指定输入来源 --input")?;
  info!("输入来源: {}", source);
  let input = InputWrapper::from_url(source)?;

  install_interrupt_handler(node.liveness().clone())?;

  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .run_task(input, node)
}
