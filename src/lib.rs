// 该文件是 Shanan （山南西风） 项目的一部分。
// src/lib.rs - 库主文件
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

//! # Shanan 目标检测节点核心
//!
//! 将 NV12 相机帧适配到固定的模型输入分辨率（保持宽高比并满足硬件对齐），
//! 异步提交给推理加速器，并在回调中把模型坐标系下的检测框映射回原图坐标系。
//!
//! 数据流：
//!
//! ```text
//! 输入消息 -> InferenceOrchestrator -> (ScalePlan -> Nv12Resizer) -> Accelerator::run
//!          ... 异步回调 ... -> ResultMapper -> DetectionParser -> Publisher
//! ```

pub mod accel;
pub mod args;
pub mod config;
pub mod frame;
pub mod input;
pub mod mapper;
pub mod node;
pub mod orchestrator;
pub mod parser;
pub mod publish;
pub mod resize;
pub mod scale;
pub mod task;
pub mod utils;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}
