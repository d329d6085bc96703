// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/pipeline.rs - 节点端到端测试
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
  io::Write,
  path::Path,
  sync::{Arc, Mutex},
};

use serde_json::json;
use tempfile::{NamedTempFile, TempDir};
use url::Url;

use shanan_target::{
  accel::{
    Accelerator, AcceleratorError, Completion, CoreId, InferenceOutput, ModelParameters,
    OutputContext, RawTensor, RuntimeStats,
  },
  args::NodeArgs,
  config::DetectionConfig,
  frame::{ImageMessage, Nv12Frame, Stamp, nv12_len},
  mapper::{MappingMode, ResultError},
  node::{InferenceNode, InitError, TargetDetectionNode},
  orchestrator::FrameError,
  parser::{DetectionRecord, ParseError},
  publish::{ChannelPublisher, PublisherWrapper, Rect},
  resize::NearestNv12Resizer,
  task::run_node,
  utils::init_tracing,
};

type Pending = Arc<Mutex<Vec<(OutputContext, Completion)>>>;
type ParserFn = fn(&[RawTensor], &DetectionConfig) -> Result<Vec<DetectionRecord>, ParseError>;

/// 只记录提交，由测试决定何时回调
struct FakeAccelerator {
  input_size: (u32, u32),
  model_file: Option<std::path::PathBuf>,
  prepared: Arc<Mutex<Vec<(u32, u32)>>>,
  pending: Pending,
}

impl FakeAccelerator {
  fn new(input_size: (u32, u32)) -> Self {
    Self {
      input_size,
      model_file: None,
      prepared: Arc::default(),
      pending: Arc::default(),
    }
  }
}

impl Accelerator for FakeAccelerator {
  type Input = Vec<u8>;

  fn init(&mut self, params: &ModelParameters) -> Result<(), AcceleratorError> {
    self.model_file = Some(params.model_file.clone());
    Ok(())
  }

  fn model_input_size(&self, index: usize) -> Result<(u32, u32), AcceleratorError> {
    match self.model_file {
      Some(_) => Ok(self.input_size),
      None => Err(AcceleratorError::InputSize(index)),
    }
  }

  fn prepare_input(
    &self,
    frame: Nv12Frame<'_>,
    _model_width: u32,
    _model_height: u32,
  ) -> Result<Self::Input, AcceleratorError> {
    self
      .prepared
      .lock()
      .unwrap()
      .push((frame.width(), frame.height()));
    Ok(frame.data().to_vec())
  }

  fn run(
    &self,
    _inputs: Vec<Self::Input>,
    context: OutputContext,
    completion: Completion,
  ) -> Result<(), AcceleratorError> {
    self.pending.lock().unwrap().push((context, completion));
    Ok(())
  }
}

fn fire_all(pending: &Pending, stats: Option<RuntimeStats>) -> usize {
  let drained: Vec<_> = pending.lock().unwrap().drain(..).collect();
  let count = drained.len();
  for (context, completion) in drained {
    completion(InferenceOutput {
      context,
      tensors: vec![RawTensor::default()],
      stats,
    });
  }
  count
}

fn cone_parser(
  _tensors: &[RawTensor],
  config: &DetectionConfig,
) -> Result<Vec<DetectionRecord>, ParseError> {
  Ok(vec![DetectionRecord {
    class_id: 0,
    class_name: config.class_name(0).unwrap_or_default().to_string(),
    score: 0.9,
    xmin: 10.0,
    ymin: 20.0,
    xmax: 110.0,
    ymax: 220.0,
  }])
}

struct Fixture {
  _names: NamedTempFile,
  config_file: NamedTempFile,
}

fn fixture(with_model_file: bool) -> Fixture {
  let mut names = NamedTempFile::new().unwrap();
  writeln!(names, "traffic_cone").unwrap();

  let mut document = json!({
    "class_num": 1,
    "cls_names_list": names.path(),
  });
  if with_model_file {
    document["model_file"] = json!("model/yolov5s.bin");
  }

  let mut config_file = NamedTempFile::new().unwrap();
  write!(config_file, "{}", document).unwrap();
  Fixture {
    _names: names,
    config_file,
  }
}

fn args_for(config_file: &Path) -> NodeArgs {
  NodeArgs {
    config_file: config_file.to_path_buf(),
    ..NodeArgs::default()
  }
}

fn nv12_message(index: u64, width: u32, height: u32) -> ImageMessage {
  ImageMessage::nv12(
    index,
    Stamp { sec: 5, nanosec: 6 },
    width,
    height,
    vec![128u8; nv12_len(width, height)],
  )
}

type TestNode =
  TargetDetectionNode<FakeAccelerator, NearestNv12Resizer, ParserFn, ChannelPublisher>;

fn build_node(
  args: NodeArgs,
) -> (
  TestNode,
  Pending,
  Arc<Mutex<Vec<(u32, u32)>>>,
  std::sync::mpsc::Receiver<shanan_target::publish::OutputFrame>,
) {
  let accelerator = FakeAccelerator::new((640, 640));
  let pending = Arc::clone(&accelerator.pending);
  let prepared = Arc::clone(&accelerator.prepared);
  let (publisher, receiver) = ChannelPublisher::new();
  let node = TargetDetectionNode::new(
    args,
    accelerator,
    NearestNv12Resizer,
    cone_parser as ParserFn,
    publisher,
  )
  .unwrap();
  (node, pending, prepared, receiver)
}

#[test]
fn startup_loads_model_and_class_names() {
  init_tracing();
  let fixture = fixture(true);
  let (node, _, _, _) = build_node(args_for(fixture.config_file.path()));

  assert_eq!(node.config().class_names(), ["traffic_cone"]);
  assert_eq!(node.orchestrator().model_input_size(), (640, 640));

  let params = node.configure().unwrap();
  assert_eq!(params.model_file, Path::new("model/yolov5s.bin"));
  assert_eq!(params.task_num, 1);
  assert_eq!(params.core_ids, vec![CoreId::Core0]);
}

#[test]
fn core_selection_reaches_model_parameters() {
  let fixture = fixture(true);
  let args = NodeArgs {
    core: CoreId::Any,
    ..args_for(fixture.config_file.path())
  };
  let (node, _, _, _) = build_node(args);
  assert_eq!(node.configure().unwrap().core_ids, vec![CoreId::Any]);
}

#[test]
fn missing_model_file_is_fatal() {
  let fixture = fixture(false);
  let (publisher, _receiver) = ChannelPublisher::new();
  let result = TargetDetectionNode::new(
    args_for(fixture.config_file.path()),
    FakeAccelerator::new((640, 640)),
    NearestNv12Resizer,
    cone_parser as ParserFn,
    publisher,
  );
  assert!(matches!(result, Err(InitError::MissingModelFile(_))));
}

#[test]
fn zero_model_input_is_fatal() {
  let fixture = fixture(true);
  let (publisher, _receiver) = ChannelPublisher::new();
  let result = TargetDetectionNode::new(
    args_for(fixture.config_file.path()),
    FakeAccelerator::new((0, 640)),
    NearestNv12Resizer,
    cone_parser as ParserFn,
    publisher,
  );
  assert!(matches!(
    result,
    Err(InitError::InputSize {
      width: 0,
      height: 640
    })
  ));
}

#[test]
fn full_hd_frame_is_resized_and_mapped_back() {
  let fixture = fixture(true);
  let (node, pending, prepared, receiver) = build_node(args_for(fixture.config_file.path()));

  node.feed(&nv12_message(42, 1920, 1080)).unwrap();
  assert_eq!(*prepared.lock().unwrap(), vec![(640, 360)]);
  assert!(receiver.try_recv().is_err());

  let stats = RuntimeStats {
    input_fps: 30.0,
    output_fps: 29.6,
    infer_time_ms: 12,
    fps_updated: true,
  };
  assert_eq!(fire_all(&pending, Some(stats)), 1);

  let frame = receiver.recv().unwrap();
  assert_eq!(frame.header.frame_id, "42");
  assert_eq!(frame.header.stamp, Stamp { sec: 5, nanosec: 6 });
  assert_eq!(frame.fps, 30);
  assert_eq!(frame.targets.len(), 1);
  assert_eq!(frame.targets[0].kind, "traffic_cone");
  assert_eq!(
    frame.targets[0].rois[0].rect,
    Rect {
      x_offset: 30,
      y_offset: 60,
      width: 300,
      height: 600,
    }
  );
}

#[test]
fn model_sized_frame_keeps_network_coordinates() {
  let fixture = fixture(true);
  let (node, pending, prepared, receiver) = build_node(args_for(fixture.config_file.path()));

  node.feed(&nv12_message(1, 640, 640)).unwrap();
  assert_eq!(*prepared.lock().unwrap(), vec![(640, 640)]);
  fire_all(&pending, None);

  let frame = receiver.recv().unwrap();
  assert_eq!(frame.fps, 0);
  assert_eq!(
    frame.targets[0].rois[0].rect,
    Rect {
      x_offset: 10,
      y_offset: 20,
      width: 100,
      height: 200,
    }
  );
}

#[test]
fn unsupported_encoding_is_dropped() {
  let fixture = fixture(true);
  let (node, pending, prepared, receiver) = build_node(args_for(fixture.config_file.path()));

  let mut msg = nv12_message(3, 1920, 1080);
  msg.encoding = "rgb8".to_string();
  assert!(matches!(node.feed(&msg), Err(FrameError::Format(_))));

  assert!(prepared.lock().unwrap().is_empty());
  assert_eq!(fire_all(&pending, None), 0);
  assert!(receiver.try_recv().is_err());
}

#[test]
fn late_completion_after_shutdown_publishes_nothing() {
  let fixture = fixture(true);
  let (node, pending, _, receiver) = build_node(args_for(fixture.config_file.path()));

  node.feed(&nv12_message(8, 1920, 1080)).unwrap();
  node.shutdown();
  assert_eq!(fire_all(&pending, None), 1);
  assert!(receiver.try_recv().is_err());

  assert!(matches!(
    node.feed(&nv12_message(9, 1920, 1080)),
    Err(FrameError::ShuttingDown)
  ));
}

#[test]
fn base_context_is_rejected_by_node() {
  let fixture = fixture(true);
  let (node, _, _, receiver) = build_node(args_for(fixture.config_file.path()));

  let output = InferenceOutput {
    context: OutputContext::Base(nv12_message(4, 640, 640).header()),
    tensors: vec![],
    stats: None,
  };
  assert!(matches!(
    node.on_result(output),
    Err(ResultError::TokenMismatch(id)) if id == "4"
  ));
  assert!(receiver.try_recv().is_err());
}

#[test]
fn per_axis_mode_is_selected_from_args() {
  let fixture = fixture(true);
  let args = NodeArgs {
    mapping: MappingMode::PerAxis,
    ..args_for(fixture.config_file.path())
  };
  let (node, pending, _, receiver) = build_node(args);

  // 1080x1920 -> 352x624，两个轴的比例不同
  node.feed(&nv12_message(5, 1080, 1920)).unwrap();
  fire_all(&pending, None);

  let rect = receiver.recv().unwrap().targets[0].rois[0].rect;
  assert_eq!(rect.x_offset, (10.0f32 * (1080.0 / 352.0)) as u32);
  assert_eq!(rect.y_offset, (20.0f32 * (1920.0 / 624.0)) as u32);
}

#[test]
fn driver_reads_nv12_file_and_records_json_lines() {
  let fixture = fixture(true);

  let mut capture = NamedTempFile::new().unwrap();
  for _ in 0..3 {
    capture.write_all(&vec![16u8; nv12_len(640, 640)]).unwrap();
  }
  capture.flush().unwrap();

  let records = TempDir::new().unwrap();
  let args = NodeArgs {
    input: Some(
      Url::parse(&format!(
        "nv12://{}?width=640&height=640",
        capture.path().display()
      ))
      .unwrap(),
    ),
    output: Some(Url::parse(&format!("jsonl://{}", records.path().display())).unwrap()),
    frame_number: Some(2),
    ..args_for(fixture.config_file.path())
  };

  let (publisher, receiver) = PublisherWrapper::from_output(args.output.as_ref()).unwrap();
  assert!(receiver.is_none());

  let accelerator = FakeAccelerator::new((640, 640));
  let pending = Arc::clone(&accelerator.pending);
  let node = TargetDetectionNode::new(
    args.clone(),
    accelerator,
    NearestNv12Resizer,
    cone_parser as ParserFn,
    publisher,
  )
  .unwrap();

  let summary = run_node(&node, &args).unwrap();
  assert_eq!(summary.submitted, 2);
  assert_eq!(summary.dropped, 0);
  assert_eq!(fire_all(&pending, None), 2);

  let today = chrono::Utc::now().date_naive();
  let path = match node.orchestrator().sink().publisher() {
    PublisherWrapper::JsonLines(publisher) => publisher.file_for(today),
    PublisherWrapper::Channel(_) => panic!("expected json lines publisher"),
  };
  let content = std::fs::read_to_string(path).unwrap();
  let ids: Vec<String> = content
    .lines()
    .map(|line| {
      let value: serde_json::Value = serde_json::from_str(line).unwrap();
      assert_eq!(value["topic"], "/robot_target_detection");
      value["header"]["frame_id"].as_str().unwrap().to_string()
    })
    .collect();
  assert_eq!(ids, vec!["0", "1"]);
}
