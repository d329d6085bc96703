// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - NV12 帧定义
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

use serde::Serialize;
use thiserror::Error;

/// 唯一支持的像素编码标签
pub const NV12_ENCODING: &str = "nv12";

/// NV12 缓冲区长度：全分辨率 Y 平面 + 半分辨率交错 UV 平面
pub fn nv12_len(width: u32, height: u32) -> usize {
  width as usize * height as usize * 3 / 2
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameLayoutError {
  #[error("NV12 缓冲区长度不足: 期望 {expected} 字节, 实际 {actual} 字节")]
  BufferTooSmall { expected: usize, actual: usize },
  #[error("帧尺寸无效: {width}x{height}")]
  ZeroDimension { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Stamp {
  pub sec: i32,
  pub nanosec: u32,
}

impl Stamp {
  pub fn now() -> Self {
    Self::from_datetime(chrono::Utc::now())
  }

  /// 秒数超出 `i32` 时饱和到边界值
  pub fn from_datetime(time: chrono::DateTime<chrono::Utc>) -> Self {
    let secs = time.timestamp();
    Self {
      sec: i32::try_from(secs).unwrap_or(if secs < 0 { i32::MIN } else { i32::MAX }),
      nanosec: time.timestamp_subsec_nanos(),
    }
  }
}

/// 消息头，提交时从输入消息复制，随推理结果一起发布
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FrameHeader {
  pub frame_id: String,
  pub stamp: Stamp,
}

/// 订阅通道送达的图像消息
#[derive(Debug, Clone)]
pub struct ImageMessage {
  pub index: u64,
  pub stamp: Stamp,
  pub width: u32,
  pub height: u32,
  pub encoding: String,
  pub data: Vec<u8>,
}

impl ImageMessage {
  pub fn nv12(index: u64, stamp: Stamp, width: u32, height: u32, data: Vec<u8>) -> Self {
    Self {
      index,
      stamp,
      width,
      height,
      encoding: NV12_ENCODING.to_string(),
      data,
    }
  }

  pub fn is_nv12(&self) -> bool {
    self.encoding == NV12_ENCODING
  }

  pub fn header(&self) -> FrameHeader {
    FrameHeader {
      frame_id: self.index.to_string(),
      stamp: self.stamp,
    }
  }

  pub fn as_nv12(&self) -> Result<Nv12Frame<'_>, FrameLayoutError> {
    Nv12Frame::new(&self.data, self.width, self.height)
  }
}

/// 借用的 NV12 帧视图，只在一次调用期间有效
#[derive(Debug, Clone, Copy)]
pub struct Nv12Frame<'a> {
  width: u32,
  height: u32,
  data: &'a [u8],
}

impl<'a> Nv12Frame<'a> {
  pub fn new(data: &'a [u8], width: u32, height: u32) -> Result<Self, FrameLayoutError> {
    if width == 0 || height == 0 {
      return Err(FrameLayoutError::ZeroDimension { width, height });
    }
    let expected = nv12_len(width, height);
    if data.len() < expected {
      return Err(FrameLayoutError::BufferTooSmall {
        expected,
        actual: data.len(),
      });
    }
    Ok(Self {
      width,
      height,
      data: &data[..expected],
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn data(&self) -> &'a [u8] {
    self.data
  }

  pub fn y_plane(&self) -> &'a [u8] {
    &self.data[..self.width as usize * self.height as usize]
  }

  pub fn uv_plane(&self) -> &'a [u8] {
    &self.data[self.width as usize * self.height as usize..]
  }
}

/// 拥有所有权的 NV12 图像，缩放后端的输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nv12Image {
  width: u32,
  height: u32,
  data: Box<[u8]>,
}

impl Nv12Image {
  pub fn with_shape(width: u32, height: u32) -> Self {
    Self {
      width,
      height,
      data: vec![0u8; nv12_len(width, height)].into_boxed_slice(),
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn as_frame(&self) -> Nv12Frame<'_> {
    Nv12Frame {
      width: self.width,
      height: self.height,
      data: &self.data,
    }
  }
}

impl AsRef<[u8]> for Nv12Image {
  fn as_ref(&self) -> &[u8] {
    &self.data
  }
}

impl AsMut<[u8]> for Nv12Image {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn nv12_view_splits_planes() {
    let data: Vec<u8> = (0..24).collect();
    let frame = Nv12Frame::new(&data, 4, 4).unwrap();
    assert_eq!(frame.y_plane().len(), 16);
    assert_eq!(frame.uv_plane(), &data[16..24]);
  }

  #[test]
  fn short_buffer_is_rejected() {
    let data = vec![0u8; 10];
    assert_eq!(
      Nv12Frame::new(&data, 4, 4).unwrap_err(),
      FrameLayoutError::BufferTooSmall {
        expected: 24,
        actual: 10
      }
    );
  }

  #[test]
  fn header_uses_sequence_index_as_frame_id() {
    let stamp = Stamp { sec: 12, nanosec: 34 };
    let msg = ImageMessage::nv12(42, stamp, 2, 2, vec![0; 6]);
    assert!(msg.is_nv12());
    assert_eq!(
      msg.header(),
      FrameHeader {
        frame_id: "42".to_string(),
        stamp
      }
    );
  }

  #[test]
  fn stamp_saturates_past_i32_seconds() {
    use chrono::TimeZone;

    let in_range = chrono::Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap();
    assert_eq!(Stamp::from_datetime(in_range).sec as i64, in_range.timestamp());

    let late = chrono::Utc.with_ymd_and_hms(2040, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(Stamp::from_datetime(late), Stamp { sec: i32::MAX, nanosec: 0 });
  }
}
