use super::{list_images, load_image, Frame, FrameSource};
use crate::error::{Result, ScanError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 連番画像ディレクトリを映像として再生するソース
#[derive(Debug)]
pub struct FrameDirectory {
    root: PathBuf,
    frames: Vec<PathBuf>,
    cursor: usize,
    index: u64,
    fps: f64,
    repeat: bool,
}

impl FrameDirectory {
    /// ソースを開く
    ///
    /// 画像が1枚もない場合はカメラ利用不可と同じ扱い（セッション致命的）。
    pub fn open(root: &Path, fps: f64, repeat: bool) -> Result<Self> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(ScanError::Config(format!("fps は正の値で指定してください: {}", fps)));
        }

        if !root.is_dir() {
            return Err(ScanError::CameraUnavailable(root.display().to_string()));
        }

        let frames = list_images(root)?;
        if frames.is_empty() {
            return Err(ScanError::NoFramesFound(root.display().to_string()));
        }

        info!(source = %root.display(), frames = frames.len(), fps, "フレームソースを開きました");

        Ok(Self {
            root: root.to_path_buf(),
            frames,
            cursor: 0,
            index: 0,
            fps,
            repeat,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for FrameDirectory {
    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn next_frame(&mut self) -> Option<Result<Frame>> {
        if self.cursor >= self.frames.len() {
            if !self.repeat {
                return None;
            }
            self.cursor = 0;
        }

        let path = self.frames[self.cursor].clone();
        self.cursor += 1;
        let index = self.index;
        self.index += 1;

        debug!(index, path = %path.display(), "フレーム読み込み");
        Some(load_image(&path).map(|image| Frame {
            index,
            image,
            path: Some(path),
        }))
    }

    fn describe(&self) -> String {
        format!("{} ({}フレーム, {:.1}fps)", self.root.display(), self.frames.len(), self.fps)
    }
}

impl Drop for FrameDirectory {
    fn drop(&mut self) {
        info!(source = %self.root.display(), played = self.index, "フレームソースを解放しました");
    }
}
