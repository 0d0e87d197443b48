// 该文件是 Renlian （人脸标注） 项目的一部分。
// src/artifact.rs - 产物目录与写入
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

use std::{
  io::{BufWriter, Write},
  path::{Path, PathBuf},
};

use image::{ImageFormat, RgbImage};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, error::PipelineError, validate::UniqueKey};

pub const UPLOADS_DIR: &str = "uploads";
pub const OUTPUTS_DIR: &str = "outputs";
const STAGING_PREFIX: &str = ".staging-";

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无法创建目录 {}: {source}", .path.display())]
  ProvisionError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// 产物位置，`relative_path` 相对于存储根目录，使用 `/` 分隔
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocator {
  pub storage_key: String,
  pub relative_path: String,
}

impl ArtifactLocator {
  fn new(dir: &str, storage_key: String) -> Self {
    Self {
      relative_path: format!("{}/{}", dir, storage_key),
      storage_key,
    }
  }
}

/// 产物存储：根目录下固定的 `uploads/` 与 `outputs/` 两级布局
///
/// 目录在进程启动时通过 [`ArtifactStore::provision`] 一次性创建，之后只读取路径。
#[derive(Debug, Clone)]
pub struct ArtifactStore {
  root: PathBuf,
}

impl FromUrlWithScheme for ArtifactStore {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ArtifactStore {
  type Error = StoreError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(StoreError::SchemeMismatch(format!(
        "期望存储方式 '{}', 实际存储方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }
    Self::provision(url.path())
  }
}

impl ArtifactStore {
  /// 创建根目录及 `uploads/`、`outputs/`，已存在时直接复用
  pub fn provision(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
    let root = root.into();
    for dir in [UPLOADS_DIR, OUTPUTS_DIR] {
      let path = root.join(dir);
      std::fs::create_dir_all(&path).map_err(|source| StoreError::ProvisionError {
        path: path.clone(),
        source,
      })?;
    }
    info!("产物目录就绪: {}", root.display());
    Ok(Self { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn uploads_dir(&self) -> PathBuf {
    self.root.join(UPLOADS_DIR)
  }

  pub fn outputs_dir(&self) -> PathBuf {
    self.root.join(OUTPUTS_DIR)
  }

  /// 产物在磁盘上的绝对位置
  pub fn resolve(&self, locator: &ArtifactLocator) -> PathBuf {
    locator
      .relative_path
      .split('/')
      .fold(self.root.clone(), |path, part| path.join(part))
  }

  /// 写入原图与标注图
  ///
  /// 两张图先编码到各自目录中的临时文件，再逐个以不覆盖的方式原子发布。
  /// 第二个发布失败时撤回第一个，失败的请求不会留下产物。
  pub fn write(
    &self,
    key: &UniqueKey,
    normalized: &RgbImage,
    annotated: &RgbImage,
  ) -> Result<(ArtifactLocator, ArtifactLocator), PipelineError> {
    let format = ImageFormat::from_extension(key.extension()).ok_or_else(|| {
      PipelineError::storage(
        self.uploads_dir().join(key.to_string()),
        std::io::Error::new(
          std::io::ErrorKind::InvalidInput,
          format!("无法编码扩展名 '{}'", key.extension()),
        ),
      )
    })?;

    let original = ArtifactLocator::new(UPLOADS_DIR, key.to_string());
    let output = ArtifactLocator::new(OUTPUTS_DIR, key.output_name());
    let original_path = self.resolve(&original);
    let output_path = self.resolve(&output);

    let staged_original = stage(&self.uploads_dir(), normalized, format)?;
    let staged_output = stage(&self.outputs_dir(), annotated, format)?;

    publish(staged_original, &original_path)?;
    if let Err(err) = publish(staged_output, &output_path) {
      if let Err(cleanup) = std::fs::remove_file(&original_path) {
        error!("撤回原图失败 {}: {}", original_path.display(), cleanup);
      } else {
        warn!("标注图写入失败，已撤回原图: {}", original_path.display());
      }
      return Err(err);
    }

    info!(
      "产物已保存: {} / {}",
      original.relative_path, output.relative_path
    );
    Ok((original, output))
  }
}

fn stage(dir: &Path, image: &RgbImage, format: ImageFormat) -> Result<NamedTempFile, PipelineError> {
  let mut staged = tempfile::Builder::new()
    .prefix(STAGING_PREFIX)
    .tempfile_in(dir)
    .map_err(|e| PipelineError::storage(dir, e))?;
  let staged_path = staged.path().to_path_buf();

  {
    let mut writer = BufWriter::new(staged.as_file_mut());
    image
      .write_to(&mut writer, format)
      .map_err(|e| PipelineError::storage(&staged_path, into_io_error(e)))?;
    writer
      .flush()
      .map_err(|e| PipelineError::storage(&staged_path, e))?;
  }
  staged
    .as_file()
    .sync_all()
    .map_err(|e| PipelineError::storage(&staged_path, e))?;

  Ok(staged)
}

fn publish(staged: NamedTempFile, target: &Path) -> Result<(), PipelineError> {
  staged
    .persist_noclobber(target)
    .map(|_| ())
    .map_err(|e| PipelineError::storage(target, e.error))
}

fn into_io_error(err: image::ImageError) -> std::io::Error {
  match err {
    image::ImageError::IoError(e) => e,
    other => std::io::Error::other(other.to_string()),
  }
}
