// 该文件是 Cellscan （细胞扫描） 项目的一部分。
// tests/pipeline.rs - 后处理流水线集成测试
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

use cellscan::{
  model::{BBox, CellLabel, DetectResult, ImageSize},
  output::Report,
  pipeline::{
    DetectionInput, DetectionPipeline, DetectionSource, Mask, PipelineConfig, PipelineConfigBuilder,
    PipelineError,
  },
  postprocess::{DropletPolicy, ScoreActivation},
  tensor::{RawTensor, TensorError},
};

const SLOTS: usize = 5;
const FEATURES: usize = 6;
const IMAGE: ImageSize = ImageSize {
  width: 640,
  height: 640,
};

/// 每个检测槽为 `[cx, cy, w, h, class0, class1]`，不足的槽补零
fn slots(rows: &[[f32; FEATURES]]) -> Vec<[f32; FEATURES]> {
  let mut all = rows.to_vec();
  all.resize(SLOTS, [0.0; FEATURES]);
  all
}

fn features_first(rows: &[[f32; FEATURES]]) -> RawTensor {
  let rows = slots(rows);
  let mut data = vec![0.0; FEATURES * SLOTS];
  for (slot, row) in rows.iter().enumerate() {
    for (feature, value) in row.iter().enumerate() {
      data[feature * SLOTS + slot] = *value;
    }
  }
  RawTensor::new([1, FEATURES, SLOTS], data).unwrap()
}

fn slots_first(rows: &[[f32; FEATURES]]) -> RawTensor {
  let data = slots(rows).into_iter().flatten().collect();
  RawTensor::new([1, SLOTS, FEATURES], data).unwrap()
}

fn builder(activation: ScoreActivation) -> PipelineConfigBuilder {
  PipelineConfig::builder(activation)
    .slot_count(SLOTS)
    .model_size(640, 640)
    .num_class_features(2)
}

fn run(config: PipelineConfigBuilder, source: DetectionSource) -> DetectResult {
  DetectionPipeline::new(config.build().unwrap())
    .run(&source, IMAGE)
    .unwrap()
}

#[test]
fn both_tensor_layouts_give_the_same_result() {
  let rows = [
    [150.0, 150.0, 100.0, 100.0, 0.9, 0.1],
    [400.0, 300.0, 60.0, 80.0, 0.2, 0.7],
    [30.0, 20.0, 40.0, 20.0, 0.6, 0.0],
  ];
  let a = run(builder(ScoreActivation::Identity), DetectionSource::RawTensor(features_first(&rows)));
  let b = run(builder(ScoreActivation::Identity), DetectionSource::RawTensor(slots_first(&rows)));

  assert_eq!(a.len(), 3);
  assert_eq!(
    serde_json::to_value(Report::success("x", &a)).unwrap(),
    serde_json::to_value(Report::success("x", &b)).unwrap()
  );
  // 第二个检测的类别来自第二个通道
  assert_eq!(a.items[1].candidate.detection.class_index, 1);
}

#[test]
fn overlapping_boxes_keep_the_higher_score() {
  // IoU = 8000 / 10000 = 0.8 > 0.7
  let rows = [
    [150.0, 140.0, 100.0, 80.0, 0.8, 0.0],
    [150.0, 150.0, 100.0, 100.0, 0.9, 0.0],
  ];
  let result = run(builder(ScoreActivation::Identity), DetectionSource::RawTensor(features_first(&rows)));

  assert_eq!(result.len(), 1);
  assert_eq!(result.items[0].confidence(), 0.9);
  assert_eq!(result.items[0].candidate.index, 1);
  assert_eq!(result.stats.num_candidates, 2);
  assert_eq!(result.stats.num_suppressed, 1);
}

#[test]
fn box_near_top_left_grows_outward() {
  let rows = [[30.0, 20.0, 40.0, 20.0, 0.9, 0.0]];
  let result = run(builder(ScoreActivation::Identity), DetectionSource::RawTensor(features_first(&rows)));

  assert_eq!(result.len(), 1);
  let item = &result.items[0];
  assert_eq!(item.candidate.bbox, BBox::new(10.0, 10.0, 50.0, 30.0));
  assert_eq!((item.square.x, item.square.y, item.square.size), (10.0, -10.0, 40.0));
  assert_eq!((item.circle.center_x, item.circle.center_y), (30.0, 10.0));
  assert_eq!(item.circle.radius, 20.0);
  assert_eq!(item.label, CellLabel::Cell);
  assert_eq!(result.stats.converted_to_square, 1);
}

#[test]
fn coordinates_are_scaled_to_the_original_image() {
  let rows = [[320.0, 320.0, 64.0, 64.0, 0.9, 0.0]];
  let result = DetectionPipeline::new(builder(ScoreActivation::Identity).build().unwrap())
    .run(
      &DetectionSource::RawTensor(features_first(&rows)),
      ImageSize::new(1280, 960),
    )
    .unwrap();

  let bbox = result.items[0].candidate.bbox;
  assert_eq!(bbox, BBox::new(576.0, 432.0, 704.0, 528.0));
  assert_eq!(result.items[0].circle.radius, 64.0);
}

#[test]
fn small_detections_follow_the_droplet_policy() {
  // 半径 10 的圆，面积约 314 < 500
  let rows = [
    [300.0, 300.0, 20.0, 20.0, 0.9, 0.0],
    [100.0, 400.0, 60.0, 60.0, 0.8, 0.0],
  ];

  let dropped = run(
    builder(ScoreActivation::Identity),
    DetectionSource::RawTensor(features_first(&rows)),
  );
  assert_eq!(dropped.len(), 1);
  assert_eq!(dropped.stats.num_cells, 1);
  assert_eq!(dropped.stats.num_droplets, 1);
  assert_eq!(dropped.stats.num_droplets_dropped, 1);

  let kept = run(
    builder(ScoreActivation::Identity).droplet_policy(DropletPolicy::Keep),
    DetectionSource::RawTensor(features_first(&rows)),
  );
  assert_eq!(kept.len(), 2);
  assert_eq!(kept.items[0].label, CellLabel::Droplet);
  assert_eq!(kept.items[1].label, CellLabel::Cell);
  assert_eq!(kept.cells().count(), 1);
  assert_eq!(kept.stats.num_droplets_dropped, 0);
}

#[test]
fn sigmoid_activation_is_applied_before_the_threshold() {
  let rows = [
    [150.0, 150.0, 100.0, 100.0, 0.0, -1.0],
    [400.0, 400.0, 100.0, 100.0, -3.0, -4.0],
  ];

  let sigmoid = run(builder(ScoreActivation::Sigmoid), DetectionSource::RawTensor(features_first(&rows)));
  assert_eq!(sigmoid.len(), 1);
  assert_eq!(sigmoid.items[0].confidence(), 0.5);

  // 未激活时 0.0 低于阈值
  let identity = run(builder(ScoreActivation::Identity), DetectionSource::RawTensor(features_first(&rows)));
  assert!(identity.is_empty());
}

#[test]
fn raising_the_threshold_never_adds_detections() {
  let rows = [
    [100.0, 100.0, 60.0, 60.0, 0.3, 0.0],
    [300.0, 300.0, 60.0, 60.0, 0.5, 0.0],
    [500.0, 500.0, 60.0, 60.0, 0.95, 0.0],
  ];
  let mut previous = usize::MAX;
  for threshold in [0.0, 0.25, 0.4, 0.6, 1.0] {
    let result = run(
      builder(ScoreActivation::Identity).confidence_threshold(threshold),
      DetectionSource::RawTensor(features_first(&rows)),
    );
    assert!(result.len() <= previous);
    previous = result.len();
  }
  assert_eq!(previous, 0);
}

#[test]
fn unrecognized_shape_is_an_error() {
  let tensor = RawTensor::new([1, 6, 7], vec![0.0; 42]).unwrap();
  let err = DetectionPipeline::new(builder(ScoreActivation::Identity).build().unwrap())
    .run(&DetectionSource::RawTensor(tensor), IMAGE)
    .unwrap_err();
  assert_eq!(
    err,
    PipelineError::Tensor(TensorError::UnrecognizedLayout {
      shape: [1, 6, 7],
      slot_count: SLOTS,
    })
  );
}

#[test]
fn empty_image_is_rejected() {
  let err = DetectionPipeline::new(builder(ScoreActivation::Identity).build().unwrap())
    .run(&DetectionSource::Decoded(Vec::new()), ImageSize::new(0, 480))
    .unwrap_err();
  assert_eq!(
    err,
    PipelineError::InvalidImage {
      width: 0,
      height: 480
    }
  );
}

#[test]
fn decoded_input_uses_mask_area() {
  let mut data = vec![0u8; 100];
  data[..20].fill(1);
  let inputs = vec![
    DetectionInput {
      bbox: BBox::new(100.0, 100.0, 160.0, 160.0),
      mask: Some(Mask::new(10, 10, data).unwrap()),
      class_index: 0,
      score: 0.7,
    },
    DetectionInput {
      bbox: BBox::new(110.0, 110.0, 170.0, 170.0),
      mask: None,
      class_index: 0,
      score: 0.9,
    },
  ];

  let result = run(
    builder(ScoreActivation::Identity).droplet_policy(DropletPolicy::Keep),
    DetectionSource::Decoded(inputs),
  );

  // 已解码输入默认不做 NMS，但按分数排序
  assert_eq!(result.len(), 2);
  assert_eq!(result.items[0].confidence(), 0.9);
  assert_eq!(result.items[0].label, CellLabel::Cell);
  assert_eq!(result.items[1].area, 20.0);
  assert_eq!(result.items[1].label, CellLabel::Droplet);
  assert_eq!(result.stats.num_suppressed, 0);
}

#[test]
fn decoded_input_can_be_suppressed() {
  let inputs = vec![
    DetectionInput {
      bbox: BBox::new(100.0, 100.0, 200.0, 200.0),
      mask: None,
      class_index: 0,
      score: 0.9,
    },
    DetectionInput {
      bbox: BBox::new(100.0, 100.0, 200.0, 180.0),
      mask: None,
      class_index: 0,
      score: 0.8,
    },
  ];

  let result = run(
    builder(ScoreActivation::Identity).suppress_decoded(true),
    DetectionSource::Decoded(inputs),
  );
  assert_eq!(result.len(), 1);
  assert_eq!(result.stats.num_suppressed, 1);
}

#[test]
fn polygon_is_attached_when_requested() {
  let rows = [[320.0, 320.0, 100.0, 100.0, 0.9, 0.0]];
  let result = run(
    builder(ScoreActivation::Identity).polygon_points(8),
    DetectionSource::RawTensor(features_first(&rows)),
  );

  let polygon = result.items[0].polygon.as_ref().unwrap();
  assert_eq!(polygon.len(), 8);
  assert_eq!(polygon[0], [370.0, 320.0]);

  let report = serde_json::to_value(Report::success("a", &result)).unwrap();
  assert_eq!(report["cells"][0]["polygon"].as_array().unwrap().len(), 8);
  assert_eq!(report["num_cells"], 1);
}
