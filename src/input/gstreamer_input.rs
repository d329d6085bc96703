// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer NV12 输入
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

//! # GStreamer 视频输入模块
//!
//! 从摄像头或视频文件拉取帧，统一转换为 NV12 后作为图像消息产出。
//!
//! ```text
//! gst://camera/dev/video0?width=1920&height=1080&fps=30&format=YUY2
//! gst://file/data/record.mp4?rotate=180
//! ```
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```

use std::collections::HashMap;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{ImageMessage, Stamp, nv12_len},
};

#[derive(Error, Debug)]
pub enum GStreamerInputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  #[error("Unsupported video format: {0:?}")]
  UnsupportedFormat(gst_video::VideoFormat),
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

const DEFAULT_CAMERA_WIDTH: u32 = 1920;
const DEFAULT_CAMERA_HEIGHT: u32 = 1080;
const DEFAULT_CAMERA_FPS: u32 = 30;

pub enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    io_mode: Option<u32>,
    format: String,
    width: u32,
    height: u32,
    fps: u32,
  },
  TargetFormat {
    format: String,
  },
  VideoFlip {
    method: u32,
  },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location={} ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        io_mode,
        format,
        width,
        height,
        fps,
      } => {
        let io_mode_str = io_mode
          .map(|mode| format!(" io-mode={}", mode))
          .unwrap_or_default();
        format!(
          "v4l2src device={}{} ! video/x-raw,format={},width={},height={},framerate={}/1",
          camera, io_mode_str, format, width, height, fps
        )
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
      GStreamerInputBuilderItem::VideoFlip { method } => {
        format!("videoflip method={}", method)
      }
    }
  }
}

/// GStreamer 输入管道构建器
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
}

impl GStreamerInputPipelineBuilder {
  fn parse_u32(query: &HashMap<String, String>, key: &str) -> Option<u32> {
    query.get(key).and_then(|v| v.parse::<u32>().ok())
  }

  fn build_camera_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let mut items = vec![GStreamerInputBuilderItem::CameraSource {
      camera: path.to_string(),
      io_mode: Self::parse_u32(query, "io-mode"),
      format: query
        .get("format")
        .cloned()
        .unwrap_or_else(|| String::from("NV12")),
      width: Self::parse_u32(query, "width").unwrap_or(DEFAULT_CAMERA_WIDTH),
      height: Self::parse_u32(query, "height").unwrap_or(DEFAULT_CAMERA_HEIGHT),
      fps: Self::parse_u32(query, "fps").unwrap_or(DEFAULT_CAMERA_FPS),
    }];
    items.extend(Self::video_flip(query.get("rotate").map(String::as_str)));
    GStreamerInputPipelineBuilder { items }
  }

  fn build_file_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let mut items = vec![GStreamerInputBuilderItem::FileSource(path.to_string())];
    items.extend(Self::video_flip(query.get("rotate").map(String::as_str)));
    GStreamerInputPipelineBuilder { items }
  }

  fn video_flip(rotate: Option<&str>) -> Option<GStreamerInputBuilderItem> {
    let method = match rotate? {
      "90" => 1,
      "180" => 2,
      "270" => 3,
      _ => return None,
    };
    Some(GStreamerInputBuilderItem::VideoFlip { method })
  }

  /// 拼接后的管道描述，末端固定为 NV12 的 appsink
  pub fn description(&self) -> String {
    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    format!(
      "{} ! appsink max-buffers=2 drop=true name=sink",
      basic_pipeline
    )
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let full_pipeline = self.description();
    info!("GStreamer pipeline description: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerInput {
      pipeline,
      appsink,
      index: 0,
    })
  }
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let mut builder = match url.host_str() {
      Some("camera") => Self::build_camera_pipeline(url.path(), &query),
      Some("file") => Self::build_file_pipeline(url.path(), &query),
      _ => return Err(GStreamerInputError::SchemeMismatch),
    };

    builder.items.push(GStreamerInputBuilderItem::TargetFormat {
      format: "NV12".to_string(),
    });

    Ok(builder)
  }
}

/// GStreamer 视频输入，逐帧产出 NV12 图像消息
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  index: u64,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl GStreamerInput {
  fn pull_sample(&self) -> Option<gst::Sample> {
    self
      .appsink
      .pull_sample()
      .inspect_err(|e| error!("Failed to pull sample: {}", e))
      .ok()
  }
}

impl Iterator for GStreamerInput {
  type Item = ImageMessage;

  fn next(&mut self) -> Option<Self::Item> {
    // 单帧转换失败时跳过该帧，只有拉流失败才结束
    loop {
      let sample = self.pull_sample()?;
      match convert_sample_to_nv12(&sample) {
        Ok((width, height, data)) => {
          let msg = ImageMessage::nv12(self.index, Stamp::now(), width, height, data);
          self.index += 1;
          return Some(msg);
        }
        Err(e) => error!("Failed to fetch sample: {}", e),
      }
    }
  }
}

/// 去掉行对齐填充，拷贝成紧凑的 Y 平面 + 交错 UV 平面
fn convert_sample_to_nv12(
  sample: &gst::Sample,
) -> Result<(u32, u32, Vec<u8>), GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
  if video_info.format() != gst_video::VideoFormat::Nv12 {
    return Err(GStreamerInputError::UnsupportedFormat(video_info.format()));
  }

  let frame = gst_video::VideoFrameRef::from_buffer_ref_readable(buffer, &video_info)?;
  let width = video_info.width();
  let height = video_info.height();
  let row = width as usize;

  let mut data = Vec::with_capacity(nv12_len(width, height));
  for (plane, rows) in [(0u32, height as usize), (1u32, height as usize / 2)] {
    let stride = frame.plane_stride()[plane as usize] as usize;
    let plane_data = frame.plane_data(plane)?;
    for r in 0..rows {
      let start = r * stride;
      let line = plane_data.get(start..start + row).ok_or_else(|| {
        GStreamerInputError::PipelineError(format!("{} 平面第 {} 行越界", plane, r))
      })?;
      data.extend_from_slice(line);
    }
  }

  debug_assert_eq!(data.len(), nv12_len(width, height));
  Ok((width, height, data))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn camera_url_builds_nv12_pipeline() {
    let url =
      Url::parse("gst://camera/dev/video0?width=1280&height=720&fps=15&rotate=180").unwrap();
    let builder = GStreamerInputPipelineBuilder::from_url(&url).unwrap();
    assert_eq!(
      builder.description(),
      "v4l2src device=/dev/video0 ! video/x-raw,format=NV12,width=1280,height=720,framerate=15/1 \
       ! videoflip method=2 ! videoconvert ! video/x-raw,format=NV12 \
       ! appsink max-buffers=2 drop=true name=sink"
    );
  }

  #[test]
  fn unknown_source_is_rejected() {
    let url = Url::parse("gst://rtsp/stream").unwrap();
    assert!(matches!(
      GStreamerInputPipelineBuilder::from_url(&url),
      Err(GStreamerInputError::SchemeMismatch)
    ));
  }
}
