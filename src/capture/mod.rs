//! フレーム取得
//!
//! ライブ映像の代わりとなるフレームソース:
//! - FrameDirectory: 連番画像ディレクトリを指定fpsで再生
//! - StillImage: プリセット静止画（1フレーム）
//!
//! ソースはスコープ付きリソースで、Drop 時に必ず解放される。

mod frame_dir;
mod still;

pub use frame_dir::FrameDirectory;
pub use still::StillImage;

use crate::error::{Result, ScanError};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

/// 1フレーム
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub image: DynamicImage,
    pub path: Option<PathBuf>,
}

/// フレームソース
pub trait FrameSource {
    /// 1秒あたりのティック数
    fn frame_rate(&self) -> f64;

    /// 次のフレーム（None で終端）
    fn next_frame(&mut self) -> Option<Result<Frame>>;

    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn frame_rate(&self) -> f64 {
        (**self).frame_rate()
    }

    fn next_frame(&mut self) -> Option<Result<Frame>> {
        (**self).next_frame()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// ソースの種類
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// フレームディレクトリ（ライブ相当）
    Live(PathBuf),
    /// 静止画
    Still(PathBuf),
}

/// パスからソースの種類を判定
pub fn classify_source(path: &Path) -> Result<SourceKind> {
    if path.is_dir() {
        Ok(SourceKind::Live(path.to_path_buf()))
    } else if path.is_file() {
        if is_image_file(path) {
            Ok(SourceKind::Still(path.to_path_buf()))
        } else {
            Err(ScanError::ImageLoad(format!("対応していない画像形式です: {}", path.display())))
        }
    } else {
        Err(ScanError::FileNotFound(path.display().to_string()))
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.iter().any(|&e| e == ext)
        })
        .unwrap_or(false)
}

/// フォルダ直下の画像をファイル名順に列挙
pub fn list_images(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.exists() {
        return Err(ScanError::FolderNotFound(folder.display().to_string()));
    }

    let mut images: Vec<PathBuf> = WalkDir::new(folder)
        .max_depth(1) // 直下のみ（再帰しない）
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && is_image_file(p))
        .collect();

    images.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));

    Ok(images)
}

pub fn load_image(path: &Path) -> Result<DynamicImage> {
    if !path.exists() {
        return Err(ScanError::FileNotFound(path.display().to_string()));
    }
    image::open(path).map_err(|e| ScanError::ImageLoad(format!("{}: {}", path.display(), e)))
}
