// 该文件是 Renlian （人脸标注） 项目的一部分。
// src/validate.rs - 上传校验与唯一键生成
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

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{config::PipelineConfig, error::PipelineError};

const FALLBACK_STEM: &str = "upload";
const OUTPUT_PREFIX: &str = "out_";

/// 进程内共享的键序号，所有 `Validator` 实例共用
static KEY_SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// 一次上传的唯一存储键，形如 `photo_20260101120000123456_1f3a_0001.png`
///
/// 依次为清理后的文件名、UTC 微秒时间戳、进程号、进程内序号。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniqueKey {
  stem: String,
  extension: String,
}

impl UniqueKey {
  pub fn stem(&self) -> &str {
    &self.stem
  }

  /// 小写扩展名，不含点
  pub fn extension(&self) -> &str {
    &self.extension
  }

  /// 标注结果的文件名：固定前缀 + 键
  pub fn output_name(&self) -> String {
    format!("{}{}", OUTPUT_PREFIX, self)
  }
}

impl fmt::Display for UniqueKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.stem, self.extension)
  }
}

/// 上传校验器
///
/// 序号取自进程级计数器，多个校验器（多条流水线）共用同一存储根目录时键也不会重复。
#[derive(Debug, Clone)]
pub struct Validator {
  allowed_extensions: Vec<String>,
  max_payload_bytes: usize,
}

impl Validator {
  pub fn new(config: &PipelineConfig) -> Self {
    Self {
      allowed_extensions: config.allowed_extensions.clone(),
      max_payload_bytes: config.max_payload_bytes,
    }
  }

  /// 校验文件名与内容，成功时返回唯一键；在任何解码之前完成
  pub fn validate(&self, declared_filename: &str, raw_bytes: &[u8]) -> Result<UniqueKey, PipelineError> {
    self.validate_at(declared_filename, raw_bytes, Utc::now())
  }

  fn validate_at(
    &self,
    declared_filename: &str,
    raw_bytes: &[u8],
    now: DateTime<Utc>,
  ) -> Result<UniqueKey, PipelineError> {
    if declared_filename.trim().is_empty() {
      return Err(PipelineError::InvalidInput("未提供文件名".to_string()));
    }
    if raw_bytes.is_empty() {
      return Err(PipelineError::InvalidInput(format!(
        "文件内容为空: {}",
        declared_filename
      )));
    }
    if raw_bytes.len() > self.max_payload_bytes {
      warn!(
        "拒绝过大的上传: {} ({} 字节)",
        declared_filename,
        raw_bytes.len()
      );
      return Err(PipelineError::PayloadTooLarge {
        size: raw_bytes.len(),
        limit: self.max_payload_bytes,
      });
    }

    let basename = basename(declared_filename);
    let extension = match basename.rsplit_once('.') {
      Some((_, ext)) if !ext.is_empty() => ext.to_ascii_lowercase(),
      _ => {
        return Err(PipelineError::UnsupportedFormat {
          filename: declared_filename.to_string(),
          extension: String::new(),
        });
      }
    };
    if !self
      .allowed_extensions
      .iter()
      .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
    {
      return Err(PipelineError::UnsupportedFormat {
        filename: declared_filename.to_string(),
        extension,
      });
    }

    let stem = basename
      .rsplit_once('.')
      .map(|(stem, _)| sanitize(stem))
      .filter(|stem| !stem.is_empty())
      .unwrap_or_else(|| FALLBACK_STEM.to_string());

    let sequence = KEY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let key = UniqueKey {
      stem: format!(
        "{}_{}_{:x}_{:04x}",
        stem,
        now.format("%Y%m%d%H%M%S%6f"),
        std::process::id(),
        sequence
      ),
      extension,
    };
    debug!("生成唯一键: {} <- {}", key, declared_filename);
    Ok(key)
  }
}

/// 取路径最后一段，兼容 `/` 与 `\`
fn basename(filename: &str) -> &str {
  filename
    .rsplit(['/', '\\'])
    .next()
    .unwrap_or(filename)
    .trim()
}

fn sanitize(stem: &str) -> String {
  let cleaned: String = stem
    .chars()
    .filter_map(|c| {
      if c.is_whitespace() {
        Some('_')
      } else if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
        Some(c)
      } else {
        None
      }
    })
    .collect();
  cleaned.trim_matches(['.', '_']).to_string()
}
