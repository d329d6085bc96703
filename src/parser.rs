// 该文件是 Shanan （山南西风） 项目的一部分。
// src/parser.rs - 检测输出解析接口
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

use thiserror::Error;

use crate::{accel::RawTensor, config::DetectionConfig};

#[derive(Error, Debug)]
pub enum ParseError {
  #[error("输出张量数量不匹配: 期望 {expected}, 实际 {actual}")]
  TensorCount { expected: usize, actual: usize },
  #[error("输出张量形状错误: {0}")]
  Shape(String),
  #[error("解析失败: {0}")]
  Other(String),
}

/// 模型坐标系（像素）下的一个检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
  pub class_id: usize,
  pub class_name: String,
  pub score: f32,
  pub xmin: f32,
  pub ymin: f32,
  pub xmax: f32,
  pub ymax: f32,
}

/// 外部的锚框解码 + NMS
pub trait DetectionParser: Send + Sync {
  fn parse(
    &self,
    tensors: &[RawTensor],
    config: &DetectionConfig,
  ) -> Result<Vec<DetectionRecord>, ParseError>;
}

impl<F> DetectionParser for F
where
  F: Fn(&[RawTensor], &DetectionConfig) -> Result<Vec<DetectionRecord>, ParseError> + Send + Sync,
{
  fn parse(
    &self,
    tensors: &[RawTensor],
    config: &DetectionConfig,
  ) -> Result<Vec<DetectionRecord>, ParseError> {
    self(tensors, config)
  }
}
