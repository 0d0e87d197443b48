// 该文件是 Renlian （人脸标注） 项目的一部分。
// src/detector/seetaface.rs - SeetaFace 检测后端
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

use std::{fs::File, io::BufReader};

use image::GrayImage;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::DetectParams,
  detector::{BoundingBox, DetectionResult, FaceDetector},
};

const DEFAULT_MIN_FACE_SIZE: u32 = 20;
const DEFAULT_SCORE_THRESH: f64 = 2.0;
const DEFAULT_WINDOW_STEP: u32 = 4;

#[derive(Error, Debug)]
pub enum SeetaFaceError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch { expected: String, actual: String },
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {path}, 错误: {reason}")]
  ModelInvalid { path: String, reason: String },
  #[error("参数无效: {0}")]
  InvalidParameter(String),
}

pub struct SeetaFaceBuilder {
  model_path: String,
  min_face_size: u32,
  score_thresh: f64,
  window_step: u32,
}

impl FromUrlWithScheme for SeetaFaceBuilder {
  const SCHEME: &'static str = "seetaface";
}

impl FromUrl for SeetaFaceBuilder {
  type Error = SeetaFaceError;

  /// 形如 `seetaface:///models/seeta_fd_frontal_v1.0.bin?min_face_size=40&score_thresh=2.5`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SeetaFaceError::SchemeMismatch {
        expected: Self::SCHEME.to_string(),
        actual: url.scheme().to_string(),
      });
    }

    let mut builder = SeetaFaceBuilder::new(url.path());
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "min_face_size" => {
          builder.min_face_size = v
            .parse()
            .map_err(|_| SeetaFaceError::InvalidParameter(format!("min_face_size={}", v)))?;
        }
        "score_thresh" => {
          builder.score_thresh = v
            .parse()
            .map_err(|_| SeetaFaceError::InvalidParameter(format!("score_thresh={}", v)))?;
        }
        "window_step" => {
          builder.window_step = v
            .parse()
            .map_err(|_| SeetaFaceError::InvalidParameter(format!("window_step={}", v)))?;
        }
        _ => debug!("忽略未知参数: {}={}", k, v),
      }
    }
    Ok(builder)
  }
}

impl SeetaFaceBuilder {
  pub fn new(model_path: impl Into<String>) -> Self {
    Self {
      model_path: model_path.into(),
      min_face_size: DEFAULT_MIN_FACE_SIZE,
      score_thresh: DEFAULT_SCORE_THRESH,
      window_step: DEFAULT_WINDOW_STEP,
    }
  }

  pub fn min_face_size(mut self, size: u32) -> Self {
    self.min_face_size = size;
    self
  }

  pub fn score_thresh(mut self, thresh: f64) -> Self {
    self.score_thresh = thresh;
    self
  }

  pub fn build(self) -> Result<SeetaFaceDetector, SeetaFaceError> {
    if self.window_step == 0 {
      return Err(SeetaFaceError::InvalidParameter("window_step=0".to_string()));
    }

    info!("加载模型文件: {}", self.model_path);
    let file = File::open(&self.model_path)?;
    let model = rustface::read_model(BufReader::new(file)).map_err(|e| SeetaFaceError::ModelInvalid {
      path: self.model_path.clone(),
      reason: e.to_string(),
    })?;
    info!("模型加载完成");

    Ok(SeetaFaceDetector {
      model,
      min_face_size: self.min_face_size,
      score_thresh: self.score_thresh,
      window_step: self.window_step,
    })
  }
}

/// 基于 `rustface`（SeetaFace 引擎）的检测器
///
/// SeetaFace 自行合并重叠窗口，`min_neighbors` 在此后端中不起作用。
pub struct SeetaFaceDetector {
  model: rustface::Model,
  min_face_size: u32,
  score_thresh: f64,
  window_step: u32,
}

/// 金字塔每层的缩放比例为 `1 / scale_factor`
fn pyramid_scale(scale_factor: f32) -> f32 {
  if scale_factor > 1.0 {
    1.0 / scale_factor
  } else {
    1.0 / 1.1
  }
}

impl FaceDetector for SeetaFaceDetector {
  fn detect(&self, gray: &GrayImage, params: &DetectParams) -> DetectionResult {
    let (width, height) = gray.dimensions();
    let mut detector = rustface::create_detector_with_model(self.model.clone());
    detector.set_min_face_size(self.min_face_size);
    detector.set_score_thresh(self.score_thresh);
    detector.set_pyramid_scale_factor(pyramid_scale(params.scale_factor));
    detector.set_slide_window_step(self.window_step, self.window_step);

    let image = rustface::ImageData::new(gray.as_raw(), width, height);
    let faces = detector.detect(&image);
    debug!("SeetaFace 返回 {} 个候选", faces.len());

    faces
      .iter()
      .filter_map(|face| {
        let bbox = face.bbox();
        BoundingBox::from_signed(
          bbox.x() as i64,
          bbox.y() as i64,
          bbox.width() as i64,
          bbox.height() as i64,
          width,
          height,
        )
      })
      .collect()
  }
}
