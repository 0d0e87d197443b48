// 该文件是 Renlian （人脸标注） 项目的一部分。
// src/normalize.rs - 图像解码与尺寸归一化
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

use std::io::Cursor;

use image::{
  DynamicImage, GrayImage, ImageFormat, ImageReader, RgbImage,
  error::{ImageFormatHint, UnsupportedError, UnsupportedErrorKind},
  imageops::FilterType,
};
use tracing::{debug, info};

use crate::error::PipelineError;

/// 字节到图像的解码步骤
pub trait Decode: Send + Sync {
  fn decode(&self, raw_bytes: &[u8]) -> Result<DynamicImage, image::ImageError>;
}

/// 可解码的容器格式，与允许上传的扩展名一一对应
pub const DECODABLE_FORMATS: [ImageFormat; 3] = [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Bmp];

/// 基于 `image` crate 的解码器，按内容猜测格式
///
/// 猜测出的格式不在 [`DECODABLE_FORMATS`] 中时直接拒绝，即使 `image` 启用了更多编解码器。
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateDecode;

impl Decode for ImageCrateDecode {
  fn decode(&self, raw_bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    let reader = ImageReader::new(Cursor::new(raw_bytes))
      .with_guessed_format()
      .map_err(image::ImageError::IoError)?;

    match reader.format() {
      Some(format) if DECODABLE_FORMATS.contains(&format) => reader.decode(),
      guessed => {
        let hint = guessed.map_or(ImageFormatHint::Unknown, ImageFormatHint::Exact);
        debug!("拒绝解码格式: {:?}", hint);
        Err(image::ImageError::Unsupported(
          UnsupportedError::from_format_and_kind(hint.clone(), UnsupportedErrorKind::Format(hint)),
        ))
      }
    }
  }
}

/// 归一化后的图像，彩色与灰度两份尺寸一致
#[derive(Debug, Clone)]
pub struct NormalizedImage {
  /// 用于标注与保存的彩色图像
  pub color: RgbImage,
  /// 用于检测的灰度图像
  pub gray: GrayImage,
  /// 解码后、缩放前的尺寸
  pub original_size: (u32, u32),
}

impl NormalizedImage {
  pub fn width(&self) -> u32 {
    self.color.width()
  }

  pub fn height(&self) -> u32 {
    self.color.height()
  }

  pub fn was_scaled(&self) -> bool {
    self.original_size != self.color.dimensions()
  }
}

/// 计算缩放后的尺寸：最长边不超过 `max_dimension`，保持宽高比，只缩不放
pub fn scaled_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
  let longest = width.max(height);
  if longest <= max_dimension {
    return (width, height);
  }

  let scale = max_dimension as f64 / longest as f64;
  let scaled = |side: u32| ((side as f64 * scale).round() as u32).max(1);
  (scaled(width), scaled(height))
}

pub struct Normalizer {
  max_dimension: u32,
  decoder: Box<dyn Decode>,
}

impl Normalizer {
  pub fn new(max_dimension: u32) -> Self {
    Self::with_decoder(max_dimension, Box::new(ImageCrateDecode))
  }

  pub fn with_decoder(max_dimension: u32, decoder: Box<dyn Decode>) -> Self {
    Self {
      max_dimension,
      decoder,
    }
  }

  /// 解码并在需要时缩小图像
  pub fn load(&self, raw_bytes: &[u8]) -> Result<NormalizedImage, PipelineError> {
    let decoded = self.decoder.decode(raw_bytes)?;
    let color = decoded.to_rgb8();
    let original_size = color.dimensions();
    debug!("图像解码完成: {}x{}", original_size.0, original_size.1);

    let (width, height) = scaled_dimensions(original_size.0, original_size.1, self.max_dimension);
    let color = if (width, height) == original_size {
      color
    } else {
      info!(
        "缩放图像: {}x{} -> {}x{}",
        original_size.0, original_size.1, width, height
      );
      image::imageops::resize(&color, width, height, FilterType::Triangle)
    };
    let gray = image::imageops::grayscale(&color);

    Ok(NormalizedImage {
      color,
      gray,
      original_size,
    })
  }
}
