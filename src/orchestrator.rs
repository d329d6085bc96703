// 该文件是 Shanan （山南西风） 项目的一部分。
// src/orchestrator.rs - 单帧推理编排
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

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::{
  accel::{Accelerator, AcceleratorError, Completion, CorrelationToken, OutputContext},
  frame::{FrameLayoutError, ImageMessage},
  mapper::ResultSink,
  resize::{Nv12Resizer, ResizeError},
  scale::{ScaleError, ScalePlan},
  utils::Liveness,
};

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("仅支持 nv12 编码, 收到 {0}, 其他编码请先转码")]
  Format(String),
  #[error("帧布局错误: {0}")]
  Layout(#[from] FrameLayoutError),
  #[error("计算缩放计划失败: {0}")]
  Scale(#[from] ScaleError),
  #[error("缩放 nv12 图像失败: {0}")]
  Resize(#[from] ResizeError),
  #[error("创建模型输入失败: {0}")]
  Input(#[source] AcceleratorError),
  #[error("提交推理任务失败: {0}")]
  Submission(#[source] AcceleratorError),
  #[error("进程正在退出")]
  ShuttingDown,
}

/// 图像消息的摄入端
pub trait Ingest {
  fn feed(&self, msg: &ImageMessage) -> Result<(), FrameError>;
  fn liveness(&self) -> &Liveness;
}

/// 单帧摄入：格式校验、按需缩放、异步提交
///
/// 提交即返回，不等待推理结果；推理结果由加速器通过回调交给 `sink`。
pub struct InferenceOrchestrator<A, R, H> {
  accelerator: A,
  resizer: R,
  sink: Arc<H>,
  model_width: u32,
  model_height: u32,
  liveness: Liveness,
}

impl<A, R, H> InferenceOrchestrator<A, R, H>
where
  A: Accelerator,
  R: Nv12Resizer,
  H: ResultSink,
{
  pub fn new(
    accelerator: A,
    resizer: R,
    sink: Arc<H>,
    (model_width, model_height): (u32, u32),
    liveness: Liveness,
  ) -> Self {
    Self {
      accelerator,
      resizer,
      sink,
      model_width,
      model_height,
      liveness,
    }
  }

  pub fn model_input_size(&self) -> (u32, u32) {
    (self.model_width, self.model_height)
  }

  pub fn sink(&self) -> &Arc<H> {
    &self.sink
  }

  /// 摄入一帧；失败时记录日志并丢弃该帧
  pub fn feed(&self, msg: &ImageMessage) -> Result<(), FrameError> {
    let result = self.submit(msg);
    match &result {
      Err(FrameError::ShuttingDown) => debug!("进程正在退出, 忽略帧 {}", msg.index),
      Err(e) => error!("丢弃帧 {}: {}", msg.index, e),
      Ok(()) => debug!("帧 {} 已提交推理", msg.index),
    }
    result
  }

  fn submit(&self, msg: &ImageMessage) -> Result<(), FrameError> {
    if !self.liveness.is_alive() {
      return Err(FrameError::ShuttingDown);
    }
    if !msg.is_nv12() {
      return Err(FrameError::Format(msg.encoding.clone()));
    }

    let frame = msg.as_nv12()?;
    let header = msg.header();
    let (model_width, model_height) = (self.model_width, self.model_height);

    let (input, token) = if (msg.width, msg.height) == (model_width, model_height) {
      let input = self
        .accelerator
        .prepare_input(frame, model_width, model_height)
        .map_err(FrameError::Input)?;
      (input, CorrelationToken::identity(header))
    } else {
      // 订阅到的图片和模型输入分辨率不一致，需要缩放
      let plan = ScalePlan::compute(msg.width, msg.height, model_width, model_height)?;
      debug!(
        "缩放 {}x{} -> {}x{}, 比例 {}",
        msg.width, msg.height, plan.target_width, plan.target_height, plan.ratio
      );
      let resized = self.resizer.resize(frame, &plan)?;
      let input = self
        .accelerator
        .prepare_input(resized.as_frame(), model_width, model_height)
        .map_err(FrameError::Input)?;
      (
        input,
        CorrelationToken::scaled(&plan, msg.width, msg.height, header),
      )
    };

    let sink = Arc::clone(&self.sink);
    let completion: Completion = Box::new(move |output| {
      let frame_id = output.context.header().frame_id.clone();
      if let Err(e) = sink.on_result(output) {
        warn!("帧 {} 的推理结果未发布: {}", frame_id, e);
      }
    });

    self
      .accelerator
      .run(vec![input], OutputContext::Scaled(token), completion)
      .map_err(FrameError::Submission)
  }
}

impl<A, R, H> Ingest for InferenceOrchestrator<A, R, H>
where
  A: Accelerator,
  R: Nv12Resizer,
  H: ResultSink,
{
  fn feed(&self, msg: &ImageMessage) -> Result<(), FrameError> {
    InferenceOrchestrator::feed(self, msg)
  }

  fn liveness(&self) -> &Liveness {
    &self.liveness
  }
}
