// 该文件是 Renlian （人脸标注） 项目的一部分。
// src/annotate.rs - 检测结果绘制
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use tracing::debug;

use crate::detector::{BoundingBox, DetectionResult};

const STROKE_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const STROKE_WIDTH: u32 = 2;

/// 人脸框绘制器，边框向框内加粗
#[derive(Debug, Clone, Copy)]
pub struct Annotator {
  color: Rgb<u8>,
  stroke_width: u32,
}

impl Default for Annotator {
  fn default() -> Self {
    Self {
      color: Rgb(STROKE_COLOR),
      stroke_width: STROKE_WIDTH,
    }
  }
}

impl Annotator {
  pub fn color(&self) -> Rgb<u8> {
    self.color
  }

  /// 在副本上绘制所有框，输入图像保持不变
  ///
  /// 框先裁剪到图像范围内再绘制，越界部分被丢弃。
  pub fn annotate(&self, image: &RgbImage, result: &DetectionResult) -> RgbImage {
    let mut output = image.clone();
    let (width, height) = image.dimensions();
    for bbox in result.iter() {
      match bbox.clip_to(width, height) {
        Some(clipped) => self.draw_box(&mut output, &clipped),
        None => debug!("跳过图像外的人脸框: {:?}", bbox),
      }
    }
    debug!("绘制 {} 个人脸框", result.count());
    output
  }

  fn draw_box(&self, image: &mut RgbImage, bbox: &BoundingBox) {
    for inset in 0..self.stroke_width {
      let width = bbox.width.saturating_sub(2 * inset);
      let height = bbox.height.saturating_sub(2 * inset);
      if width == 0 || height == 0 {
        break;
      }
      let origin = (
        i32::try_from(bbox.x.saturating_add(inset)),
        i32::try_from(bbox.y.saturating_add(inset)),
      );
      let (Ok(x), Ok(y)) = origin else {
        debug!("人脸框坐标超出绘制范围: {:?}", bbox);
        return;
      };
      draw_hollow_rect_mut(image, Rect::at(x, y).of_size(width, height), self.color);
    }
  }

  /// 像素 `(x, y)` 是否落在该框的描边区域内
  pub fn stroke_contains(&self, bbox: &BoundingBox, x: u32, y: u32) -> bool {
    let inside = x >= bbox.x && x < bbox.right() && y >= bbox.y && y < bbox.bottom();
    inside
      && (x < bbox.x.saturating_add(self.stroke_width)
        || y < bbox.y.saturating_add(self.stroke_width)
        || x >= bbox.right().saturating_sub(self.stroke_width)
        || y >= bbox.bottom().saturating_sub(self.stroke_width))
  }
}
