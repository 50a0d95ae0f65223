use super::{load_image, Frame, FrameSource};
use crate::error::Result;
use image::DynamicImage;
use std::path::{Path, PathBuf};

/// プリセット静止画（カメラを経由しない）
#[derive(Debug, Clone)]
pub struct StillImage {
    path: PathBuf,
    image: DynamicImage,
    consumed: bool,
}

impl StillImage {
    pub fn open(path: &Path) -> Result<Self> {
        let image = load_image(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            image,
            consumed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn frame(&self) -> Frame {
        Frame {
            index: 0,
            image: self.image.clone(),
            path: Some(self.path.clone()),
        }
    }
}

impl FrameSource for StillImage {
    fn frame_rate(&self) -> f64 {
        1.0
    }

    fn next_frame(&mut self) -> Option<Result<Frame>> {
        if self.consumed {
            return None;
        }
        self.consumed = true;
        Some(Ok(self.frame()))
    }

    fn describe(&self) -> String {
        format!("{} (静止画)", self.path.display())
    }
}
