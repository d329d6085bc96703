// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 节点启动参数
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

use clap::Parser;
use url::Url;

use crate::{accel::CoreId, config::DEFAULT_CONFIG_FILE, mapper::MappingMode};

pub const DEFAULT_SUB_IMG_TOPIC: &str = "/hb_image";

/// 目标检测节点参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct NodeArgs {
  /// 订阅的图像话题
  #[arg(long, default_value = DEFAULT_SUB_IMG_TOPIC, value_name = "TOPIC")]
  pub sub_img_topic: String,

  /// 检测配置文件路径
  #[arg(long, default_value = DEFAULT_CONFIG_FILE, value_name = "FILE")]
  pub config_file: PathBuf,

  /// 坐标反算方式
  #[arg(long, value_enum, default_value_t = MappingMode::Uniform)]
  pub mapping: MappingMode,

  /// 运行推理任务的核心
  #[arg(long, value_enum, default_value_t = CoreId::Core0)]
  pub core: CoreId,

  /// 输入来源
  /// 支持格式:
  /// - NV12 原始文件: nv12:///path/frames.nv12?width=1920&height=1080
  /// - GStreamer: gst://camera/dev/video0?width=1920&height=1080
  #[arg(long, value_name = "SOURCE")]
  pub input: Option<Url>,

  /// 结果记录目录，如 jsonl:///var/log/detection
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  /// 最大处理帧数
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

impl Default for NodeArgs {
  fn default() -> Self {
    Self {
      sub_img_topic: DEFAULT_SUB_IMG_TOPIC.to_string(),
      config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
      mapping: MappingMode::Uniform,
      core: CoreId::Core0,
      input: None,
      output: None,
      frame_number: None,
    }
  }
}
