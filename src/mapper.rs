// 该文件是 Shanan （山南西风） 项目的一部分。
// src/mapper.rs - 推理结果坐标映射与发布
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

use std::{sync::Arc, time::Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  accel::{CorrelationToken, InferenceOutput, OutputContext, RuntimeStats},
  config::DetectionConfig,
  parser::{DetectionParser, DetectionRecord, ParseError},
  publish::{OutputFrame, PublishError, Publisher, Rect, Roi, Target},
  utils::Liveness,
};

#[derive(Error, Debug)]
pub enum ResultError {
  #[error("解析推理输出失败: {0}")]
  Parse(#[from] ParseError),
  #[error("帧 {0} 的推理输出上下文缺少缩放信息")]
  TokenMismatch(String),
  #[error("发布失败: {0}")]
  Publish(#[from] PublishError),
}

/// 坐标反算方式
///
/// `Uniform` 对两个轴使用同一个缩放比例（约束轴的比例）。当原图与模型输入
/// 宽高比不同、且对齐截断改变了非约束轴的比例时，非约束轴会有偏差。
/// `PerAxis` 使用各轴实际的比例，需要显式选择。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MappingMode {
  #[default]
  Uniform,
  PerAxis,
}

/// 把检测框限制在模型输入范围内，返回 `[xmin, ymin, xmax, ymax]`
pub fn clamp_to_network(
  record: &DetectionRecord,
  model_width: u32,
  model_height: u32,
) -> [f32; 4] {
  [
    record.xmin.max(0.0),
    record.ymin.max(0.0),
    record.xmax.min(model_width.saturating_sub(1) as f32),
    record.ymax.min(model_height.saturating_sub(1) as f32),
  ]
}

/// 浮点检测框转为整数矩形，截断取整
pub fn to_rect([xmin, ymin, xmax, ymax]: [f32; 4]) -> Rect {
  Rect {
    x_offset: xmin as u32,
    y_offset: ymin as u32,
    width: (xmax - xmin) as u32,
    height: (ymax - ymin) as u32,
  }
}

/// 把模型坐标系的矩形映射回原图坐标系
pub fn rescale(rect: Rect, token: &CorrelationToken, mode: MappingMode) -> Rect {
  let [rx, ry] = match mode {
    MappingMode::Uniform => [token.ratio, token.ratio],
    MappingMode::PerAxis => token.axis_ratios,
  };
  if rx == 1.0 && ry == 1.0 {
    return rect;
  }
  Rect {
    x_offset: (rect.x_offset as f32 * rx) as u32,
    y_offset: (rect.y_offset as f32 * ry) as u32,
    width: (rect.width as f32 * rx) as u32,
    height: (rect.height as f32 * ry) as u32,
  }
}

/// 推理完成回调的处理者：解析、限幅、坐标映射、组装并发布
pub struct ResultMapper<P, B> {
  config: Arc<DetectionConfig>,
  parser: P,
  publisher: B,
  model_width: u32,
  model_height: u32,
  mode: MappingMode,
  liveness: Liveness,
}

impl<P: DetectionParser, B: Publisher> ResultMapper<P, B> {
  pub fn new(
    config: Arc<DetectionConfig>,
    parser: P,
    publisher: B,
    (model_width, model_height): (u32, u32),
    liveness: Liveness,
  ) -> Self {
    Self {
      config,
      parser,
      publisher,
      model_width,
      model_height,
      mode: MappingMode::default(),
      liveness,
    }
  }

  pub fn with_mode(mut self, mode: MappingMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn mode(&self) -> MappingMode {
    self.mode
  }

  pub fn config(&self) -> &DetectionConfig {
    &self.config
  }

  pub fn publisher(&self) -> &B {
    &self.publisher
  }

  pub fn on_result(&self, output: InferenceOutput) -> Result<(), ResultError> {
    if !self.liveness.is_alive() {
      debug!("进程正在退出, 丢弃帧 {} 的推理结果", output.context.header().frame_id);
      return Ok(());
    }

    let tp_start = Instant::now();
    let InferenceOutput {
      context,
      tensors,
      stats,
    } = output;

    let records = self.parser.parse(&tensors, &self.config).map_err(|e| {
      error!("解析推理输出失败: {}", e);
      e
    })?;

    // 先限幅，再映射
    let mut targets: Vec<Target> = records
      .iter()
      .map(|record| {
        let clamped = clamp_to_network(record, self.model_width, self.model_height);
        info!(
          "det rect: {} {} {} {}, det type: {}, score: {}",
          clamped[0], clamped[1], clamped[2], clamped[3], record.class_name, record.score
        );
        Target {
          kind: record.class_name.clone(),
          rois: vec![Roi {
            rect: to_rect(clamped),
            confidence: record.score,
          }],
        }
      })
      .collect();

    let token = match context {
      OutputContext::Scaled(token) => token,
      OutputContext::Base(header) => {
        error!("帧 {} 的推理输出上下文缺少缩放信息", header.frame_id);
        return Err(ResultError::TokenMismatch(header.frame_id));
      }
    };

    for roi in targets.iter_mut().flat_map(|t| t.rois.iter_mut()) {
      roi.rect = rescale(roi.rect, &token, self.mode);
    }

    let fps = stats.map(|s| s.output_fps.round() as i32).unwrap_or_default();
    let frame = OutputFrame {
      header: token.header,
      targets,
      fps,
    };

    if let Some(stats) = stats.filter(|s| s.fps_updated) {
      report_stats(&stats, tp_start);
    }

    self.publisher.publish(frame).map_err(|e| {
      error!("发布检测结果失败: {}", e);
      ResultError::from(e)
    })
  }
}

/// 推理完成回调的接收端
pub trait ResultSink: Send + Sync + 'static {
  fn on_result(&self, output: InferenceOutput) -> Result<(), ResultError>;
}

impl<P, B> ResultSink for ResultMapper<P, B>
where
  P: DetectionParser + 'static,
  B: Publisher + 'static,
{
  fn on_result(&self, output: InferenceOutput) -> Result<(), ResultError> {
    ResultMapper::on_result(self, output)
  }
}

fn report_stats(stats: &RuntimeStats, tp_start: Instant) {
  warn!(
    "input fps: {:.2}, out fps: {:.2}, infer time ms: {}, post process time ms: {}",
    stats.input_fps,
    stats.output_fps,
    stats.infer_time_ms,
    tp_start.elapsed().as_millis()
  );
}
