// 该文件是 Renlian （人脸标注） 项目的一部分。
// src/detector.rs - 人脸检测接口
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

use image::GrayImage;

use crate::config::DetectParams;

/// 人脸框，坐标位于归一化后的图像空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

impl BoundingBox {
  pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// 由可能越界的有符号坐标构造，裁剪到 `[0, bound_w) x [0, bound_h)`，裁剪后为空则返回 `None`
  pub fn from_signed(x: i64, y: i64, width: i64, height: i64, bound_w: u32, bound_h: u32) -> Option<Self> {
    let x_min = x.clamp(0, bound_w as i64);
    let y_min = y.clamp(0, bound_h as i64);
    let x_max = x.saturating_add(width).clamp(0, bound_w as i64);
    let y_max = y.saturating_add(height).clamp(0, bound_h as i64);

    if x_max <= x_min || y_max <= y_min {
      return None;
    }

    Some(Self {
      x: x_min as u32,
      y: y_min as u32,
      width: (x_max - x_min) as u32,
      height: (y_max - y_min) as u32,
    })
  }

  pub fn clip_to(self, bound_w: u32, bound_h: u32) -> Option<Self> {
    Self::from_signed(
      self.x as i64,
      self.y as i64,
      self.width as i64,
      self.height as i64,
      bound_w,
      bound_h,
    )
  }

  /// 右边界（不含），溢出时饱和到 `u32::MAX`
  pub fn right(&self) -> u32 {
    self.x.saturating_add(self.width)
  }

  /// 下边界（不含），溢出时饱和到 `u32::MAX`
  pub fn bottom(&self) -> u32 {
    self.y.saturating_add(self.height)
  }
}

/// 检测结果，按 `(y, x, height, width)` 排序以保证输出稳定
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionResult {
  boxes: Vec<BoundingBox>,
}

impl DetectionResult {
  pub fn new(mut boxes: Vec<BoundingBox>) -> Self {
    boxes.sort_by_key(|b| (b.y, b.x, b.height, b.width));
    Self { boxes }
  }

  /// 将所有框裁剪到图像范围内，丢弃裁剪后为空的框
  pub fn clip_to(self, width: u32, height: u32) -> Self {
    Self::new(
      self
        .boxes
        .into_iter()
        .filter_map(|b| b.clip_to(width, height))
        .collect(),
    )
  }

  pub fn boxes(&self) -> &[BoundingBox] {
    &self.boxes
  }

  pub fn count(&self) -> usize {
    self.boxes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.boxes.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, BoundingBox> {
    self.boxes.iter()
  }
}

impl FromIterator<BoundingBox> for DetectionResult {
  fn from_iter<I: IntoIterator<Item = BoundingBox>>(iter: I) -> Self {
    Self::new(iter.into_iter().collect())
  }
}

/// 可替换的人脸检测后端
///
/// 输入为行优先的灰度图，返回零个框视为成功。同一输入与参数下结果必须确定。
pub trait FaceDetector: Send + Sync {
  fn detect(&self, gray: &GrayImage, params: &DetectParams) -> DetectionResult;
}

impl<D: FaceDetector + ?Sized> FaceDetector for Box<D> {
  fn detect(&self, gray: &GrayImage, params: &DetectParams) -> DetectionResult {
    (**self).detect(gray, params)
  }
}

impl<D: FaceDetector + ?Sized> FaceDetector for std::sync::Arc<D> {
  fn detect(&self, gray: &GrayImage, params: &DetectParams) -> DetectionResult {
    (**self).detect(gray, params)
  }
}

#[cfg(feature = "seetaface")]
mod seetaface;
#[cfg(feature = "seetaface")]
pub use self::seetaface::{SeetaFaceBuilder, SeetaFaceDetector, SeetaFaceError};
