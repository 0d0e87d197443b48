// 该文件是 Renlian （人脸标注） 项目的一部分。
// src/pipeline.rs - 单次上传的处理流水线
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

use std::time::Instant;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::{
  annotate::Annotator,
  artifact::{ArtifactLocator, ArtifactStore},
  config::PipelineConfig,
  detector::{DetectionResult, FaceDetector},
  error::PipelineError,
  normalize::{Decode, Normalizer},
  validate::Validator,
};

/// 一次上传：原始字节与声明的文件名
#[derive(Debug, Clone)]
pub struct UploadRequest {
  pub raw_bytes: Vec<u8>,
  pub declared_filename: String,
}

impl UploadRequest {
  pub fn new(declared_filename: impl Into<String>, raw_bytes: Vec<u8>) -> Self {
    Self {
      raw_bytes,
      declared_filename: declared_filename.into(),
    }
  }
}

/// 成功处理后交给展示层的结果
#[derive(Debug, Clone)]
pub struct Outcome {
  pub original: ArtifactLocator,
  pub output: ArtifactLocator,
  pub face_count: usize,
  pub faces: DetectionResult,
  /// 归一化后的宽高，人脸框坐标所在空间
  pub dimensions: (u32, u32),
}

impl Outcome {
  pub fn to_json(&self) -> Value {
    json!({
      "original": {
        "storage_key": self.original.storage_key,
        "relative_path": self.original.relative_path,
      },
      "output": {
        "storage_key": self.output.storage_key,
        "relative_path": self.output.relative_path,
      },
      "face_count": self.face_count,
      "width": self.dimensions.0,
      "height": self.dimensions.1,
      "faces": self
        .faces
        .iter()
        .map(|b| json!({ "x": b.x, "y": b.y, "width": b.width, "height": b.height }))
        .collect::<Vec<_>>(),
    })
  }
}

/// 校验 → 归一化 → 检测 → 标注 → 写入
///
/// 各阶段不持有跨请求的可变状态，可放入 `Arc` 由多个线程共享；
/// 多个流水线也可以共用同一个存储根目录。
pub struct Pipeline {
  config: PipelineConfig,
  validator: Validator,
  normalizer: Normalizer,
  detector: Box<dyn FaceDetector>,
  annotator: Annotator,
  store: ArtifactStore,
}

impl Pipeline {
  pub fn new(config: PipelineConfig, detector: Box<dyn FaceDetector>, store: ArtifactStore) -> Self {
    Self {
      validator: Validator::new(&config),
      normalizer: Normalizer::new(config.max_dimension),
      detector,
      annotator: Annotator::default(),
      store,
      config,
    }
  }

  /// 替换解码器
  pub fn with_decoder(mut self, decoder: Box<dyn Decode>) -> Self {
    self.normalizer = Normalizer::with_decoder(self.config.max_dimension, decoder);
    self
  }

  pub fn store(&self) -> &ArtifactStore {
    &self.store
  }

  pub fn run(&self, request: &UploadRequest) -> Result<Outcome, PipelineError> {
    let started = Instant::now();
    info!(
      "开始处理上传: {} ({} 字节)",
      request.declared_filename,
      request.raw_bytes.len()
    );

    let key = self
      .validator
      .validate(&request.declared_filename, &request.raw_bytes)?;
    let image = self.normalizer.load(&request.raw_bytes)?;
    let (width, height) = (image.width(), image.height());
    if image.was_scaled() {
      debug!(
        "图像已缩放至 {}x{} (原始 {}x{})",
        width, height, image.original_size.0, image.original_size.1
      );
    }

    let now = Instant::now();
    let raw = self.detector.detect(&image.gray, &self.config.detect);
    let raw_count = raw.count();
    let faces = raw.clip_to(width, height);
    if faces.count() != raw_count {
      warn!(
        "丢弃 {} 个越界的人脸框",
        raw_count - faces.count()
      );
    }
    info!(
      "检测完成，耗时: {:.2?}，人脸数: {}",
      now.elapsed(),
      faces.count()
    );

    let annotated = self.annotator.annotate(&image.color, &faces);
    let (original, output) = self.store.write(&key, &image.color, &annotated)?;

    info!("处理完成 {}，总耗时: {:.2?}", key, started.elapsed());
    Ok(Outcome {
      original,
      output,
      face_count: faces.count(),
      faces,
      dimensions: (width, height),
    })
  }
}
