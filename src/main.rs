// 该文件是 Renlian （人脸标注） 项目的一部分。
// src/main.rs - 单张图片人脸标注
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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use renlian::{
  ArtifactStore, DetectParams, FromUrl, Pipeline, PipelineConfig, UploadRequest,
  config::{DEFAULT_MAX_DIMENSION, DEFAULT_MAX_PAYLOAD_BYTES},
};

/// Renlian 参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测模型，例如 seetaface:///models/seeta_fd_frontal_v1.0.bin
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 待处理的图片文件
  #[arg(long, value_name = "FILE")]
  pub input: PathBuf,
  /// 产物存储根目录，例如 folder:///srv/static
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 上传大小上限（字节）
  #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD_BYTES, value_name = "BYTES")]
  pub max_payload_bytes: usize,
  /// 归一化后的最长边
  #[arg(long, default_value_t = DEFAULT_MAX_DIMENSION, value_name = "PIXELS")]
  pub max_dimension: u32,
  /// 检测金字塔缩放系数
  #[arg(long, default_value_t = 1.1, value_name = "FACTOR")]
  pub scale_factor: f32,
  /// 候选框最少邻居数
  #[arg(long, default_value_t = 4, value_name = "COUNT")]
  pub min_neighbors: u32,
}

#[cfg(feature = "seetaface")]
fn load_detector(model: &Url) -> Result<Box<dyn renlian::FaceDetector>> {
  let detector = renlian::detector::SeetaFaceBuilder::from_url(model)?.build()?;
  Ok(Box::new(detector))
}

#[cfg(not(feature = "seetaface"))]
fn load_detector(model: &Url) -> Result<Box<dyn renlian::FaceDetector>> {
  anyhow::bail!("未启用任何检测后端，无法加载模型: {}", model)
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入文件: {}", args.input.display());
  info!("输出路径: {}", args.output);

  let config = PipelineConfig::default()
    .with_max_payload_bytes(args.max_payload_bytes)
    .with_max_dimension(args.max_dimension)
    .with_detect_params(DetectParams {
      scale_factor: args.scale_factor,
      min_neighbors: args.min_neighbors,
    });

  let store = ArtifactStore::from_url(&args.output)?;
  let detector = load_detector(&args.model)?;
  let pipeline = Pipeline::new(config, detector, store);

  let raw_bytes = std::fs::read(&args.input)
    .with_context(|| format!("无法读取图片文件: {}", args.input.display()))?;
  let filename = args
    .input
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_default();

  let outcome = pipeline
    .run(&UploadRequest::new(filename, raw_bytes))
    .with_context(|| format!("处理失败: {}", args.input.display()))?;

  println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);

  Ok(())
}
