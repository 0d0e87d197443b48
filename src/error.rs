// 该文件是 Renlian （人脸标注） 项目的一部分。
// src/error.rs - 流水线错误定义
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

use thiserror::Error;

/// 错误类别，不携带上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  InvalidInput,
  UnsupportedFormat,
  PayloadTooLarge,
  DecodeError,
  StorageWriteError,
}

/// 单次请求的终止错误，均不自动重试
#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("输入无效: {0}")]
  InvalidInput(String),
  #[error("不支持的文件类型 '{extension}': {filename}")]
  UnsupportedFormat { filename: String, extension: String },
  #[error("上传内容过大: {size} 字节 (上限 {limit} 字节)")]
  PayloadTooLarge { size: usize, limit: usize },
  #[error("无法解码图像: {0}")]
  DecodeError(#[source] image::ImageError),
  #[error("写入产物失败 {}: {source}", .path.display())]
  StorageWriteError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl PipelineError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      PipelineError::InvalidInput(_) => ErrorKind::InvalidInput,
      PipelineError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
      PipelineError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
      PipelineError::DecodeError(_) => ErrorKind::DecodeError,
      PipelineError::StorageWriteError { .. } => ErrorKind::StorageWriteError,
    }
  }

  pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    PipelineError::StorageWriteError {
      path: path.into(),
      source,
    }
  }
}

impl From<image::ImageError> for PipelineError {
  fn from(err: image::ImageError) -> Self {
    PipelineError::DecodeError(err)
  }
}
