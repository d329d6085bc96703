// 该文件是 Shanan （山南西风） 项目的一部分。
// src/resize.rs - NV12 缩放后端
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

use crate::{
  frame::{FrameLayoutError, Nv12Frame, Nv12Image},
  scale::{ScalePlan, WIDTH_ALIGNMENT},
};

#[derive(Error, Debug)]
pub enum ResizeError {
  #[error("帧布局错误: {0}")]
  Layout(#[from] FrameLayoutError),
  #[error("输出尺寸 {width}x{height} 不满足对齐要求")]
  Unaligned { width: u32, height: u32 },
  #[error("NV12 原图尺寸必须为偶数: {width}x{height}")]
  OddSource { width: u32, height: u32 },
  #[error("缩放后端错误: {0}")]
  Backend(String),
}

/// 像素重采样后端，按缩放计划输出新的 NV12 图像
pub trait Nv12Resizer: Send + Sync {
  fn resize(&self, src: Nv12Frame<'_>, plan: &ScalePlan) -> Result<Nv12Image, ResizeError>;
}

/// 最近邻 CPU 实现，硬件缩放不可用时使用
#[derive(Debug, Default, Clone, Copy)]
pub struct NearestNv12Resizer;

impl Nv12Resizer for NearestNv12Resizer {
  fn resize(&self, src: Nv12Frame<'_>, plan: &ScalePlan) -> Result<Nv12Image, ResizeError> {
    let (width, height) = (plan.target_width, plan.target_height);
    if width == 0 || height == 0 || width % WIDTH_ALIGNMENT != 0 || height % 2 != 0 {
      return Err(ResizeError::Unaligned { width, height });
    }
    if src.width() % 2 != 0 || src.height() % 2 != 0 {
      return Err(ResizeError::OddSource {
        width: src.width(),
        height: src.height(),
      });
    }

    let (sw, sh) = (src.width() as usize, src.height() as usize);
    let (dw, dh) = (width as usize, height as usize);
    let (y_src, uv_src) = (src.y_plane(), src.uv_plane());

    let mut image = Nv12Image::with_shape(width, height);
    let (y_dst, uv_dst) = image.as_mut().split_at_mut(dw * dh);

    for row in 0..dh {
      let sy = row * sh / dh;
      for col in 0..dw {
        let sx = col * sw / dw;
        y_dst[row * dw + col] = y_src[sy * sw + sx];
      }
    }

    // UV 平面：半分辨率，每个样本 2 字节，行跨度等于宽度
    let (scw, sch) = (sw / 2, sh / 2);
    let (dcw, dch) = (dw / 2, dh / 2);
    for row in 0..dch {
      let sy = row * sch / dch;
      for col in 0..dcw {
        let sx = col * scw / dcw;
        let s = sy * sw + sx * 2;
        let d = row * dw + col * 2;
        uv_dst[d] = uv_src[s];
        uv_dst[d + 1] = uv_src[s + 1];
      }
    }

    Ok(image)
  }
}
