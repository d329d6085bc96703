// 该文件是 Shanan （山南西风） 项目的一部分。
// src/scale.rs - 保持宽高比的对齐缩放计划
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

/// 缩放后端要求输出宽度为 16 的倍数
pub const WIDTH_ALIGNMENT: u32 = 16;

#[derive(Error, Debug, PartialEq)]
pub enum ScaleError {
  #[error("尺寸必须为正整数: 原图 {src_w}x{src_h}, 目标 {tgt_w}x{tgt_h}")]
  ZeroDimension {
    src_w: u32,
    src_h: u32,
    tgt_w: u32,
    tgt_h: u32,
  },
  #[error("缩放结果退化: {width}x{height}")]
  Degenerate { width: u32, height: u32 },
}

/// 缩放计划
///
/// `target_width` 总是 16 的倍数，`target_height` 总是偶数，
/// `ratio` 是宽度对齐之后重新计算得到的原图/缩放图比例，用于坐标反算。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalePlan {
  pub target_width: u32,
  pub target_height: u32,
  pub ratio: f32,
}

impl ScalePlan {
  /// 以较大的缩放比例为约束轴计算缩放尺寸，保证任一维度都不超过目标尺寸
  pub fn compute(src_w: u32, src_h: u32, tgt_w: u32, tgt_h: u32) -> Result<Self, ScaleError> {
    if src_w == 0 || src_h == 0 || tgt_w == 0 || tgt_h == 0 {
      return Err(ScaleError::ZeroDimension {
        src_w,
        src_h,
        tgt_w,
        tgt_h,
      });
    }

    let ratio_w = src_w as f32 / tgt_w as f32;
    let ratio_h = src_h as f32 / tgt_h as f32;
    let mut dst_ratio = ratio_w.max(ratio_h);

    let (mut resized_width, mut resized_height) = if dst_ratio == ratio_w {
      (tgt_w, (src_h as f32 / dst_ratio) as u32)
    } else {
      ((src_w as f32 / dst_ratio) as u32, tgt_h)
    };

    // 向下取 16 的倍数，并按新宽度重新计算缩放系数
    let remain = resized_width % WIDTH_ALIGNMENT;
    if remain != 0 {
      resized_width -= remain;
      if resized_width == 0 {
        return Err(ScaleError::Degenerate {
          width: resized_width,
          height: resized_height,
        });
      }
      dst_ratio = src_w as f32 / resized_width as f32;
      resized_height = (src_h as f32 / dst_ratio) as u32;
    }

    // 高度向下取偶数
    if resized_height % 2 != 0 {
      resized_height -= 1;
    }
    if resized_height == 0 {
      return Err(ScaleError::Degenerate {
        width: resized_width,
        height: resized_height,
      });
    }

    Ok(Self {
      target_width: resized_width,
      target_height: resized_height,
      ratio: dst_ratio,
    })
  }

  /// 各轴实际的原图/缩放图比例
  pub fn axis_ratios(&self, src_w: u32, src_h: u32) -> [f32; 2] {
    [
      src_w as f32 / self.target_width as f32,
      src_h as f32 / self.target_height as f32,
    ]
  }
}
