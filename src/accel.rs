// 该文件是 Shanan （山南西风） 项目的一部分。
// src/accel.rs - 推理加速器接口
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

use std::path::PathBuf;

use thiserror::Error;

use crate::{
  frame::{FrameHeader, Nv12Frame},
  scale::ScalePlan,
};

#[derive(Error, Debug)]
pub enum AcceleratorError {
  #[error("加速器初始化失败: {0}")]
  Init(String),
  #[error("无法获取第 {0} 个模型输入的尺寸")]
  InputSize(usize),
  #[error("创建模型输入失败: {0}")]
  Input(String),
  #[error("推理任务提交失败: {0}")]
  Run(String),
  #[error("加速器忙, 拒绝新的推理任务")]
  Busy,
}

/// 推理核心编号，`Any` 由驱动自行调度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CoreId {
  Any,
  #[default]
  Core0,
  Core1,
}

/// 节点配置阶段交给加速器的模型参数
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParameters {
  pub model_file: PathBuf,
  pub task_num: usize,
  pub core_ids: Vec<CoreId>,
}

impl ModelParameters {
  pub fn new(model_file: PathBuf) -> Self {
    Self {
      model_file,
      task_num: 1,
      core_ids: vec![CoreId::default()],
    }
  }

  pub fn with_core(mut self, core: CoreId) -> Self {
    self.core_ids = vec![core];
    self
  }
}

/// 关联令牌：随一次提交传给加速器，在回调中被消费一次
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationToken {
  pub ratio: f32,
  /// 各轴实际比例 `[原图宽 / 缩放宽, 原图高 / 缩放高]`
  pub axis_ratios: [f32; 2],
  pub header: FrameHeader,
}

impl CorrelationToken {
  pub fn identity(header: FrameHeader) -> Self {
    Self {
      ratio: 1.0,
      axis_ratios: [1.0, 1.0],
      header,
    }
  }

  pub fn scaled(plan: &ScalePlan, src_w: u32, src_h: u32, header: FrameHeader) -> Self {
    Self {
      ratio: plan.ratio,
      axis_ratios: plan.axis_ratios(src_w, src_h),
      header,
    }
  }
}

/// 推理输出携带的上下文
///
/// `Base` 只有消息头；`Scaled` 带有缩放比例扩展。
/// 结果处理只接受 `Scaled`，`Base` 视为内部不变量被破坏。
#[derive(Debug, Clone, PartialEq)]
pub enum OutputContext {
  Base(FrameHeader),
  Scaled(CorrelationToken),
}

impl OutputContext {
  pub fn header(&self) -> &FrameHeader {
    match self {
      OutputContext::Base(header) => header,
      OutputContext::Scaled(token) => &token.header,
    }
  }
}

/// 加速器的运行时统计
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RuntimeStats {
  pub input_fps: f32,
  pub output_fps: f32,
  pub infer_time_ms: u32,
  /// 统计值在本次回调中是否刷新
  pub fps_updated: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTensor {
  pub shape: Vec<usize>,
  pub data: Vec<f32>,
}

/// 一次异步推理的完成结果
#[derive(Debug)]
pub struct InferenceOutput {
  pub context: OutputContext,
  pub tensors: Vec<RawTensor>,
  pub stats: Option<RuntimeStats>,
}

/// 推理完成回调，由加速器驱动在任意线程上调用恰好一次
pub type Completion = Box<dyn FnOnce(InferenceOutput) + Send + 'static>;

/// 外部推理加速器
///
/// `run` 必须立即返回，推理结果通过 `completion` 异步送达。
/// 同时进行中的任务数量由加速器自己控制，超出时返回 [`AcceleratorError::Busy`]。
pub trait Accelerator: Send + Sync {
  type Input: Send;

  fn init(&mut self, params: &ModelParameters) -> Result<(), AcceleratorError>;

  /// 第 `index` 个模型输入的 `(宽, 高)`
  fn model_input_size(&self, index: usize) -> Result<(u32, u32), AcceleratorError>;

  /// 由 NV12 图像创建模型输入，图像小于模型输入时由加速器负责填充
  fn prepare_input(
    &self,
    frame: Nv12Frame<'_>,
    model_width: u32,
    model_height: u32,
  ) -> Result<Self::Input, AcceleratorError>;

  fn run(
    &self,
    inputs: Vec<Self::Input>,
    context: OutputContext,
    completion: Completion,
  ) -> Result<(), AcceleratorError>;
}
