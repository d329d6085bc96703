// 该文件是 Shanan （山南西风） 项目的一部分。
// src/node.rs - 目标检测推理节点
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

use std::{path::PathBuf, sync::Arc};

use thiserror::Error;
use tracing::{error, info};

use crate::{
  accel::{Accelerator, AcceleratorError, InferenceOutput, ModelParameters},
  args::NodeArgs,
  config::{ConfigError, DetectionConfig, read_model_file},
  frame::ImageMessage,
  mapper::{ResultError, ResultMapper},
  orchestrator::{FrameError, InferenceOrchestrator, Ingest},
  parser::DetectionParser,
  publish::{DEFAULT_OUTPUT_TOPIC, Publisher},
  resize::Nv12Resizer,
  utils::Liveness,
};

#[derive(Error, Debug)]
pub enum InitError {
  #[error("读取模型配置失败: {0}")]
  Config(#[from] ConfigError),
  #[error("配置文件 {0} 中缺少 model_file")]
  MissingModelFile(PathBuf),
  #[error("加速器初始化失败: {0}")]
  Accelerator(#[from] AcceleratorError),
  #[error("模型输入尺寸无效: {width}x{height}")]
  InputSize { width: u32, height: u32 },
}

/// 推理节点的能力接口，由加速器驱动调用
pub trait InferenceNode {
  /// 配置推理参数
  fn configure(&self) -> Result<ModelParameters, InitError>;
  /// 处理一次推理输出，解析后发布
  fn on_result(&self, output: InferenceOutput) -> Result<(), ResultError>;
}

/// 从配置文件读取模型参数，推理核心取自启动参数
pub fn model_parameters(args: &NodeArgs) -> Result<ModelParameters, InitError> {
  let config_file = &args.config_file;
  let model_file = read_model_file(config_file)?
    .ok_or_else(|| InitError::MissingModelFile(config_file.clone()))?;
  info!("模型文件: {}, 推理核心: {:?}", model_file.display(), args.core);
  Ok(ModelParameters::new(model_file).with_core(args.core))
}

pub struct TargetDetectionNode<A, R, P, B> {
  args: NodeArgs,
  config: Arc<DetectionConfig>,
  orchestrator: InferenceOrchestrator<A, R, ResultMapper<P, B>>,
  liveness: Liveness,
}

impl<A, R, P, B> TargetDetectionNode<A, R, P, B>
where
  A: Accelerator,
  R: Nv12Resizer,
  P: DetectionParser + 'static,
  B: Publisher + 'static,
{
  /// 初始化节点
  ///
  /// 模型参数、加速器初始化或模型输入尺寸失败都是致命错误；
  /// 类别配置的覆盖失败只记录日志，保留默认值。
  pub fn new(
    args: NodeArgs,
    mut accelerator: A,
    resizer: R,
    parser: P,
    publisher: B,
  ) -> Result<Self, InitError> {
    let params = model_parameters(&args).inspect_err(|e| {
      error!("节点初始化失败: {}", e);
    })?;
    accelerator.init(&params)?;

    let (width, height) = accelerator.model_input_size(0)?;
    if width == 0 || height == 0 {
      error!("模型输入尺寸无效: {}x{}", width, height);
      return Err(InitError::InputSize { width, height });
    }
    info!("模型输入尺寸: {}x{}", width, height);

    let config = Arc::new(DetectionConfig::default().load_from(&args.config_file).config);

    let liveness = Liveness::new();
    let mapper = ResultMapper::new(
      Arc::clone(&config),
      parser,
      publisher,
      (width, height),
      liveness.clone(),
    )
    .with_mode(args.mapping);
    let orchestrator = InferenceOrchestrator::new(
      accelerator,
      resizer,
      Arc::new(mapper),
      (width, height),
      liveness.clone(),
    );

    info!(
      "订阅图像话题 {}, 发布检测结果到 {}",
      args.sub_img_topic, DEFAULT_OUTPUT_TOPIC
    );

    Ok(Self {
      args,
      config,
      orchestrator,
      liveness,
    })
  }

  pub fn args(&self) -> &NodeArgs {
    &self.args
  }

  pub fn config(&self) -> &DetectionConfig {
    &self.config
  }

  pub fn liveness(&self) -> &Liveness {
    &self.liveness
  }

  pub fn orchestrator(&self) -> &InferenceOrchestrator<A, R, ResultMapper<P, B>> {
    &self.orchestrator
  }

  /// 图像消息订阅回调
  pub fn feed(&self, msg: &ImageMessage) -> Result<(), FrameError> {
    self.orchestrator.feed(msg)
  }

  pub fn shutdown(&self) {
    info!("节点退出");
    self.liveness.shutdown();
  }
}

impl<A, R, P, B> Ingest for TargetDetectionNode<A, R, P, B>
where
  A: Accelerator,
  R: Nv12Resizer,
  P: DetectionParser + 'static,
  B: Publisher + 'static,
{
  fn feed(&self, msg: &ImageMessage) -> Result<(), FrameError> {
    TargetDetectionNode::feed(self, msg)
  }

  fn liveness(&self) -> &Liveness {
    &self.liveness
  }
}

impl<A, R, P, B> InferenceNode for TargetDetectionNode<A, R, P, B>
where
  A: Accelerator,
  R: Nv12Resizer,
  P: DetectionParser + 'static,
  B: Publisher + 'static,
{
  fn configure(&self) -> Result<ModelParameters, InitError> {
    model_parameters(&self.args)
  }

  fn on_result(&self, output: InferenceOutput) -> Result<(), ResultError> {
    self.orchestrator.sink().on_result(output)
  }
}
