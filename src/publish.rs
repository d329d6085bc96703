// 该文件是 Shanan （山南西风） 项目的一部分。
// src/publish.rs - 检测结果发布
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
  fs::{File, OpenOptions},
  io::{BufWriter, Write},
  path::{Path, PathBuf},
  sync::{Mutex, mpsc},
};

use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{FromUrl, FromUrlWithScheme, frame::FrameHeader};

/// 检测结果发布的话题名
pub const DEFAULT_OUTPUT_TOPIC: &str = "/robot_target_detection";

#[derive(Error, Debug)]
pub enum PublishError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  Serialize(#[from] serde_json::Error),
  #[error("发布通道已关闭")]
  Closed,
  #[error("发布器状态锁已损坏")]
  Poisoned,
}

/// 原图坐标系下的矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Rect {
  pub x_offset: u32,
  pub y_offset: u32,
  pub width: u32,
  pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Roi {
  pub rect: Rect,
  pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Target {
  #[serde(rename = "type")]
  pub kind: String,
  pub rois: Vec<Roi>,
}

/// 每个成功处理的帧发布一条
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputFrame {
  pub header: FrameHeader,
  pub targets: Vec<Target>,
  pub fps: i32,
}

pub trait Publisher: Send + Sync {
  fn publish(&self, frame: OutputFrame) -> Result<(), PublishError>;
}

/// 进程内通道发布
pub struct ChannelPublisher {
  sender: mpsc::Sender<OutputFrame>,
}

impl ChannelPublisher {
  pub fn new() -> (Self, mpsc::Receiver<OutputFrame>) {
    let (sender, receiver) = mpsc::channel();
    (Self { sender }, receiver)
  }
}

impl Publisher for ChannelPublisher {
  fn publish(&self, frame: OutputFrame) -> Result<(), PublishError> {
    self.sender.send(frame).map_err(|_| PublishError::Closed)
  }
}

#[derive(Serialize)]
struct JsonLine<'a> {
  topic: &'a str,
  #[serde(flatten)]
  frame: &'a OutputFrame,
}

/// 以 JSON Lines 记录到目录，按天分文件：`<dir>/<YYYY>/<MM>/<DD>.jsonl`
///
/// URL 形如 `jsonl:///var/log/detection?topic=/robot_target_detection`。
pub struct JsonLinesPublisher {
  directory: PathBuf,
  topic: String,
  current: Mutex<Option<(NaiveDate, BufWriter<File>)>>,
}

impl FromUrlWithScheme for JsonLinesPublisher {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonLinesPublisher {
  type Error = PublishError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(PublishError::SchemeMismatch);
    }

    let topic = url
      .query_pairs()
      .find(|(k, _)| k == "topic")
      .map(|(_, v)| v.into_owned())
      .unwrap_or_else(|| DEFAULT_OUTPUT_TOPIC.to_string());

    Ok(Self::new(url.path(), topic))
  }
}

impl JsonLinesPublisher {
  pub fn new(directory: impl AsRef<Path>, topic: impl Into<String>) -> Self {
    Self {
      directory: directory.as_ref().to_path_buf(),
      topic: topic.into(),
      current: Mutex::new(None),
    }
  }

  pub fn file_for(&self, date: NaiveDate) -> PathBuf {
    self
      .directory
      .join(date.year().to_string())
      .join(format!("{:02}", date.month()))
      .join(format!("{:02}.jsonl", date.day()))
  }

  fn open(&self, date: NaiveDate) -> Result<BufWriter<File>, PublishError> {
    let path = self.file_for(date);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    info!("检测结果记录到: {}", path.display());
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
  }
}

impl Publisher for JsonLinesPublisher {
  fn publish(&self, frame: OutputFrame) -> Result<(), PublishError> {
    let line = serde_json::to_string(&JsonLine {
      topic: &self.topic,
      frame: &frame,
    })?;

    let today = Utc::now().date_naive();
    let mut current = self.current.lock().map_err(|_| PublishError::Poisoned)?;
    let rotate = !matches!(current.as_ref(), Some((date, _)) if *date == today);
    if rotate {
      *current = Some((today, self.open(today)?));
    }
    if let Some((_, writer)) = current.as_mut() {
      writeln!(writer, "{}", line)?;
      writer.flush()?;
    }
    debug!("发布帧 {} 到 {}", frame.header.frame_id, self.topic);
    Ok(())
  }
}

/// 由启动参数 `--output` 选择的发布器
pub enum PublisherWrapper {
  Channel(ChannelPublisher),
  JsonLines(JsonLinesPublisher),
}

impl PublisherWrapper {
  /// 未指定输出时退回进程内通道，并返回其接收端
  pub fn from_output(
    output: Option<&url::Url>,
  ) -> Result<(Self, Option<mpsc::Receiver<OutputFrame>>), PublishError> {
    match output {
      Some(url) => Ok((Self::from_url(url)?, None)),
      None => {
        let (publisher, receiver) = ChannelPublisher::new();
        Ok((PublisherWrapper::Channel(publisher), Some(receiver)))
      }
    }
  }
}

impl FromUrl for PublisherWrapper {
  type Error = PublishError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() == JsonLinesPublisher::SCHEME {
      return Ok(PublisherWrapper::JsonLines(JsonLinesPublisher::from_url(url)?));
    }
    Err(PublishError::SchemeMismatch)
  }
}

impl Publisher for PublisherWrapper {
  fn publish(&self, frame: OutputFrame) -> Result<(), PublishError> {
    match self {
      PublisherWrapper::Channel(publisher) => publisher.publish(frame),
      PublisherWrapper::JsonLines(publisher) => publisher.publish(frame),
    }
  }
}
