// 该文件是 Renlian （人脸标注） 项目的一部分。
// src/config.rs - 流水线配置
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

/// 允许上传的扩展名（小写）
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];
/// 默认上传大小上限：8 MiB
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 8 * 1024 * 1024;
/// 默认最长边
pub const DEFAULT_MAX_DIMENSION: u32 = 1200;

const DEFAULT_SCALE_FACTOR: f32 = 1.1;
const DEFAULT_MIN_NEIGHBORS: u32 = 4;

/// 检测器参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectParams {
  /// 相邻金字塔层之间的缩放系数，必须大于 1.0
  pub scale_factor: f32,
  /// 候选框保留所需的最少邻居数
  pub min_neighbors: u32,
}

impl Default for DetectParams {
  fn default() -> Self {
    Self {
      scale_factor: DEFAULT_SCALE_FACTOR,
      min_neighbors: DEFAULT_MIN_NEIGHBORS,
    }
  }
}

/// 流水线配置
#[derive(Debug, Clone)]
pub struct PipelineConfig {
  pub allowed_extensions: Vec<String>,
  pub max_payload_bytes: usize,
  pub max_dimension: u32,
  pub detect: DetectParams,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      allowed_extensions: ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
      max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
      max_dimension: DEFAULT_MAX_DIMENSION,
      detect: DetectParams::default(),
    }
  }
}

impl PipelineConfig {
  pub fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
    self.max_payload_bytes = max_payload_bytes;
    self
  }

  pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
    self.max_dimension = max_dimension;
    self
  }

  pub fn with_detect_params(mut self, detect: DetectParams) -> Self {
    self.detect = detect;
    self
  }
}
