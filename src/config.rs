// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 检测配置加载
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

//! 检测配置
//!
//! 配置在启动时加载一次，之后只读。配置文件是 JSON 文档，可选字段：
//!
//! - `class_num`：类别数量，必须为正整数
//! - `cls_names_list`：类别名文件路径，每行一个名称，行数必须等于 `class_num`
//! - `model_file`：模型文件路径，由 [`read_model_file`] 在节点配置阶段读取
//!
//! 字段逐个校验，被拒绝的字段保留原值，加载过程从不致命。

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

pub const DEFAULT_CONFIG_FILE: &str = "config/TonyPi_yolov5sconfig.json";

const KEY_CLASS_NUM: &str = "class_num";
const KEY_CLS_NAMES_LIST: &str = "cls_names_list";
const KEY_MODEL_FILE: &str = "model_file";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("配置文件路径为空")]
  EmptyPath,
  #[error("读取配置文件 [{path}] 失败: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("解析配置文件 {path} 失败: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
  #[error("字段 {field} 类型错误, 期望 {expected}")]
  FieldType {
    field: &'static str,
    expected: &'static str,
  },
  #[error("class_num = {0} 不合法, 仅支持 class_num > 0")]
  InvalidClassNum(String),
  #[error("无法打开类别名文件 {path}: {source}")]
  ClassNames {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("class_names 长度 {names} 与 class_num {class_num} 不一致")]
  ClassCountMismatch { names: usize, class_num: usize },
}

/// 检测配置，加载后不可变
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionConfig {
  strides: Vec<u32>,
  anchors: Vec<Vec<[u32; 2]>>,
  class_num: usize,
  class_names: Vec<String>,
}

impl Default for DetectionConfig {
  fn default() -> Self {
    Self {
      strides: vec![8, 16, 32],
      anchors: vec![
        vec![[10, 13], [16, 30], [33, 23]],
        vec![[30, 61], [62, 45], [59, 119]],
        vec![[116, 90], [156, 198], [373, 326]],
      ],
      class_num: 1,
      class_names: vec!["construction_cone".to_string()],
    }
  }
}

/// 一次加载的结果：新的配置以及所有被拒绝的字段
#[derive(Debug)]
pub struct ConfigReport {
  pub config: DetectionConfig,
  pub rejected: Vec<ConfigError>,
}

impl ConfigReport {
  pub fn is_clean(&self) -> bool {
    self.rejected.is_empty()
  }
}

impl DetectionConfig {
  /// 构造自定义配置，要求 `class_names.len() == class_num > 0`
  pub fn new(
    strides: Vec<u32>,
    anchors: Vec<Vec<[u32; 2]>>,
    class_names: Vec<String>,
  ) -> Result<Self, ConfigError> {
    if class_names.is_empty() {
      return Err(ConfigError::InvalidClassNum("0".to_string()));
    }
    Ok(Self {
      strides,
      anchors,
      class_num: class_names.len(),
      class_names,
    })
  }

  pub fn strides(&self) -> &[u32] {
    &self.strides
  }

  pub fn anchors(&self) -> &[Vec<[u32; 2]>] {
    &self.anchors
  }

  pub fn class_num(&self) -> usize {
    self.class_num
  }

  pub fn class_names(&self) -> &[String] {
    &self.class_names
  }

  pub fn class_name(&self, class_id: usize) -> Option<&str> {
    self.class_names.get(class_id).map(String::as_str)
  }

  /// 读取配置文件并在当前配置之上应用覆盖项
  pub fn load_from(self, config_file: &Path) -> ConfigReport {
    match read_document(config_file) {
      Ok(document) => self.apply(&document),
      Err(e) => {
        error!("加载配置失败: {}", e);
        ConfigReport {
          config: self,
          rejected: vec![e],
        }
      }
    }
  }

  /// 在当前配置之上应用一个已解析的配置文档
  pub fn apply(self, document: &Value) -> ConfigReport {
    let mut rejected = Vec::new();

    let mut class_num = self.class_num;
    if let Some(value) = document.get(KEY_CLASS_NUM) {
      match value.as_i64() {
        Some(n) if n > 0 => class_num = n as usize,
        _ => rejected.push(ConfigError::InvalidClassNum(value.to_string())),
      }
    }

    let mut class_names = None;
    if let Some(value) = document.get(KEY_CLS_NAMES_LIST) {
      match value.as_str() {
        Some(path) => match read_class_names(Path::new(path)) {
          Ok(names) if names.len() == class_num => class_names = Some(names),
          Ok(names) => rejected.push(ConfigError::ClassCountMismatch {
            names: names.len(),
            class_num,
          }),
          Err(e) => rejected.push(e),
        },
        None => rejected.push(ConfigError::FieldType {
          field: KEY_CLS_NAMES_LIST,
          expected: "string",
        }),
      }
    }

    let config = match class_names {
      Some(class_names) => DetectionConfig {
        class_num,
        class_names,
        ..self
      },
      None if class_num == self.class_names.len() => DetectionConfig { class_num, ..self },
      None => {
        // 保留下来的类别名与新的 class_num 不一致，拒绝 class_num
        rejected.push(ConfigError::ClassCountMismatch {
          names: self.class_names.len(),
          class_num,
        });
        self
      }
    };

    for e in &rejected {
      error!("配置字段被拒绝: {}", e);
    }
    info!(
      "检测配置: class_num = {}, class_names = {:?}",
      config.class_num, config.class_names
    );

    ConfigReport { config, rejected }
  }
}

fn read_document(config_file: &Path) -> Result<Value, ConfigError> {
  if config_file.as_os_str().is_empty() {
    return Err(ConfigError::EmptyPath);
  }
  let content = std::fs::read_to_string(config_file).map_err(|source| ConfigError::Read {
    path: config_file.to_path_buf(),
    source,
  })?;
  serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
    path: config_file.to_path_buf(),
    source,
  })
}

fn read_class_names(path: &Path) -> Result<Vec<String>, ConfigError> {
  let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ClassNames {
    path: path.to_path_buf(),
    source,
  })?;
  let names: Vec<String> = content.lines().map(str::to_string).collect();
  debug!("从 {} 读取到 {} 个类别名", path.display(), names.len());
  Ok(names)
}

/// 读取配置文件中的 `model_file` 字段
///
/// 与类别覆盖不同，这里的失败会向上传递，由节点初始化决定是否终止。
pub fn read_model_file(config_file: &Path) -> Result<Option<PathBuf>, ConfigError> {
  let document = read_document(config_file)?;
  match document.get(KEY_MODEL_FILE) {
    None => Ok(None),
    Some(value) => value
      .as_str()
      .map(|s| Some(PathBuf::from(s)))
      .ok_or(ConfigError::FieldType {
        field: KEY_MODEL_FILE,
        expected: "string",
      }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::io::Write;
  use tempfile::NamedTempFile;

  fn names_file(lines: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(lines.as_bytes()).unwrap();
    file
  }

  fn config_with(names: &[&str]) -> DetectionConfig {
    let base = DetectionConfig::default();
    DetectionConfig::new(
      base.strides().to_vec(),
      base.anchors().to_vec(),
      names.iter().map(|s| s.to_string()).collect(),
    )
    .unwrap()
  }

  #[test]
  fn one_line_class_file_loads() {
    let names = names_file("construction_cone\n");
    let mut config_file = NamedTempFile::new().unwrap();
    write!(
      config_file,
      "{}",
      json!({
        "class_num": 1,
        "cls_names_list": names.path(),
        "model_file": "model/yolov5s.bin",
      })
    )
    .unwrap();

    let report = config_with(&["a"]).load_from(config_file.path());
    assert!(report.is_clean());
    assert_eq!(report.config.class_num(), 1);
    assert_eq!(report.config.class_names(), ["construction_cone"]);
    assert_eq!(
      read_model_file(config_file.path()).unwrap(),
      Some(PathBuf::from("model/yolov5s.bin"))
    );
  }

  #[test]
  fn count_mismatch_keeps_previous_config() {
    let names = names_file("x\ny\n");
    let document = json!({ "class_num": 3, "cls_names_list": names.path() });

    let original = config_with(&["a"]);
    let report = original.clone().apply(&document);
    assert!(!report.is_clean());
    assert_eq!(report.config, original);
    assert!(
      report
        .rejected
        .iter()
        .any(|e| matches!(e, ConfigError::ClassCountMismatch { names: 2, class_num: 3 }))
    );
  }

  #[test]
  fn non_positive_class_num_is_rejected() {
    for value in [json!(0), json!(-4), json!(2.5), json!("3")] {
      let report = config_with(&["a"]).apply(&json!({ "class_num": value }));
      assert_eq!(report.config.class_num(), 1);
      assert!(matches!(report.rejected[0], ConfigError::InvalidClassNum(_)));
    }
  }

  #[test]
  fn names_are_checked_against_retained_class_num() {
    let names = names_file("p\nq\n");
    let document = json!({ "class_num": 0, "cls_names_list": names.path() });
    let report = config_with(&["a", "b"]).apply(&document);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.config.class_names(), ["p", "q"]);
  }

  #[test]
  fn absent_fields_leave_config_untouched() {
    let original = DetectionConfig::default();
    let report = original.clone().apply(&json!({ "model_file": "m.bin" }));
    assert!(report.is_clean());
    assert_eq!(report.config, original);
  }

  #[test]
  fn missing_names_file_is_non_fatal() {
    let document = json!({ "cls_names_list": "/definitely/not/here.list" });
    let report = DetectionConfig::default().apply(&document);
    assert!(matches!(report.rejected[0], ConfigError::ClassNames { .. }));
    assert_eq!(report.config, DetectionConfig::default());
  }

  #[test]
  fn unreadable_or_broken_file_is_reported() {
    let report = DetectionConfig::default().load_from(Path::new("/no/such/config.json"));
    assert!(matches!(report.rejected[0], ConfigError::Read { .. }));

    let mut broken = NamedTempFile::new().unwrap();
    broken.write_all(b"{ class_num: ").unwrap();
    let report = DetectionConfig::default().load_from(broken.path());
    assert!(matches!(report.rejected[0], ConfigError::Parse { .. }));
    assert_eq!(report.config, DetectionConfig::default());

    let report = DetectionConfig::default().load_from(Path::new(""));
    assert!(matches!(report.rejected[0], ConfigError::EmptyPath));
  }

  #[test]
  fn class_num_change_without_names_is_rejected() {
    let report = DetectionConfig::default().apply(&json!({ "class_num": 4 }));
    assert_eq!(report.config.class_num(), 1);
    assert!(matches!(
      report.rejected[0],
      ConfigError::ClassCountMismatch { names: 1, class_num: 4 }
    ));
  }
}
