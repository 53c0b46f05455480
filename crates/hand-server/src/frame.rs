//! 图像帧来源
//!
//! 每个回复都附带一帧图像。相机采集由外部进程负责，
//! 这里只定义取帧接口与两个简单实现。

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 最小占位 JPEG（SOI + EOI）
pub const PLACEHOLDER_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xD9];

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Failed to read frame {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Frame file {0} is empty")]
    Empty(PathBuf),
}

/// 取帧接口
pub trait FrameSource {
    /// 取一帧编码后的图像
    fn capture(&mut self) -> Result<Vec<u8>, FrameError>;
}

impl<F: FrameSource + ?Sized> FrameSource for Box<F> {
    fn capture(&mut self) -> Result<Vec<u8>, FrameError> {
        (**self).capture()
    }
}

/// 固定内容的帧
#[derive(Debug, Clone)]
pub struct StaticFrame {
    bytes: Vec<u8>,
}

impl StaticFrame {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn placeholder() -> Self {
        Self::new(PLACEHOLDER_JPEG)
    }
}

impl Default for StaticFrame {
    fn default() -> Self {
        Self::placeholder()
    }
}

impl FrameSource for StaticFrame {
    fn capture(&mut self) -> Result<Vec<u8>, FrameError> {
        Ok(self.bytes.clone())
    }
}

/// 从文件读取的帧
///
/// 每次请求重新读取，外部采集进程可以随时覆盖该文件。
#[derive(Debug, Clone)]
pub struct FileFrame {
    path: PathBuf,
}

impl FileFrame {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for FileFrame {
    fn capture(&mut self) -> Result<Vec<u8>, FrameError> {
        let bytes = fs::read(&self.path).map_err(|source| FrameError::Io {
            path: self.path.clone(),
            source,
        })?;
        if bytes.is_empty() {
            return Err(FrameError::Empty(self.path.clone()));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_static_frame() {
        let mut frame = StaticFrame::default();
        assert_eq!(frame.capture().unwrap(), PLACEHOLDER_JPEG);
    }

    #[test]
    fn test_file_frame_rereads() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[1, 2, 3]).unwrap();
        file.flush().unwrap();

        let mut frame = FileFrame::new(file.path());
        assert_eq!(frame.capture().unwrap(), vec![1, 2, 3]);

        std::fs::write(file.path(), [9, 9]).unwrap();
        assert_eq!(frame.capture().unwrap(), vec![9, 9]);
    }

    #[test]
    fn test_file_frame_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut frame = FileFrame::new(dir.path().join("missing.jpg"));
        assert!(matches!(frame.capture(), Err(FrameError::Io { .. })));
    }

    #[test]
    fn test_file_frame_empty() {
        let file = NamedTempFile::new().unwrap();
        let mut frame = FileFrame::new(file.path());
        assert!(matches!(frame.capture(), Err(FrameError::Empty(_))));
    }

    #[test]
    fn test_boxed_source() {
        let mut frame: Box<dyn FrameSource> = Box::new(StaticFrame::new(vec![7u8]));
        assert_eq!(frame.capture().unwrap(), vec![7]);
    }
}
