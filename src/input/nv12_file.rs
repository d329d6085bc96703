// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/nv12_file.rs - NV12 原始帧文件输入
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

//! 从文件读取首尾相接的 NV12 原始帧，例如：
//!
//! ```text
//! nv12:///data/capture.nv12?width=1920&height=1080&loop=true
//! ```

use std::{
  collections::HashMap,
  fs::File,
  io::{BufReader, ErrorKind, Read, Seek, SeekFrom},
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{ImageMessage, Stamp, nv12_len},
};

#[derive(Error, Debug)]
pub enum Nv12FileInputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("Missing query parameter: {0}")]
  MissingParam(&'static str),
  #[error("Invalid query parameter {name}: {value}")]
  InvalidParam { name: &'static str, value: String },
  #[error("I/O error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("File size {actual} is not a multiple of the frame size {frame}")]
  SizeMismatch { frame: usize, actual: u64 },
}

pub struct Nv12FileInput {
  path: PathBuf,
  reader: BufReader<File>,
  width: u32,
  height: u32,
  looping: bool,
  index: u64,
}

impl Nv12FileInput {
  pub fn open(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
    looping: bool,
  ) -> Result<Self, Nv12FileInputError> {
    let path = path.as_ref().to_path_buf();
    let io_error = |source| Nv12FileInputError::Io {
      path: path.clone(),
      source,
    };

    if width == 0 || height == 0 {
      return Err(Nv12FileInputError::InvalidParam {
        name: "width/height",
        value: format!("{}x{}", width, height),
      });
    }

    let file = File::open(&path).map_err(io_error)?;
    let actual = file.metadata().map_err(io_error)?.len();
    let frame = nv12_len(width, height);
    if actual == 0 || actual % frame as u64 != 0 {
      return Err(Nv12FileInputError::SizeMismatch { frame, actual });
    }

    info!(
      "打开 NV12 文件 {}, {}x{}, 共 {} 帧",
      path.display(),
      width,
      height,
      actual / frame as u64
    );

    Ok(Self {
      path,
      reader: BufReader::new(file),
      width,
      height,
      looping,
      index: 0,
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  fn read_frame(&mut self) -> std::io::Result<Option<Vec<u8>>> {
    let mut data = vec![0u8; nv12_len(self.width, self.height)];
    match self.reader.read_exact(&mut data) {
      Ok(()) => Ok(Some(data)),
      Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
      Err(e) => Err(e),
    }
  }
}

fn parse_param<T: std::str::FromStr>(
  query: &HashMap<String, String>,
  name: &'static str,
) -> Result<Option<T>, Nv12FileInputError> {
  query
    .get(name)
    .map(|value| {
      value.parse::<T>().map_err(|_| Nv12FileInputError::InvalidParam {
        name,
        value: value.clone(),
      })
    })
    .transpose()
}

impl FromUrlWithScheme for Nv12FileInput {
  const SCHEME: &'static str = "nv12";
}

impl FromUrl for Nv12FileInput {
  type Error = Nv12FileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(Nv12FileInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let width =
      parse_param::<u32>(&query, "width")?.ok_or(Nv12FileInputError::MissingParam("width"))?;
    let height =
      parse_param::<u32>(&query, "height")?.ok_or(Nv12FileInputError::MissingParam("height"))?;
    let looping = parse_param::<bool>(&query, "loop")?.unwrap_or(false);

    Self::open(url.path(), width, height, looping)
  }
}

impl Iterator for Nv12FileInput {
  type Item = ImageMessage;

  fn next(&mut self) -> Option<Self::Item> {
    let data = match self.read_frame() {
      Ok(Some(data)) => data,
      Ok(None) if self.looping => {
        if let Err(e) = self.reader.seek(SeekFrom::Start(0)) {
          error!("无法回到文件 {} 开头: {}", self.path.display(), e);
          return None;
        }
        match self.read_frame() {
          Ok(Some(data)) => data,
          Ok(None) => return None,
          Err(e) => {
            error!("读取 {} 失败: {}", self.path.display(), e);
            return None;
          }
        }
      }
      Ok(None) => return None,
      Err(e) => {
        warn!("读取 {} 失败: {}", self.path.display(), e);
        return None;
      }
    };

    let msg = ImageMessage::nv12(self.index, Stamp::now(), self.width, self.height, data);
    self.index += 1;
    Some(msg)
  }
}
