//! Camera slot: at most one open stream, released on close, on reset and
//! on drop.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::CameraError;

use super::Frame;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// An open handle that yields frames on demand.
pub trait FrameStream: Send {
    fn grab(&mut self) -> Result<Frame, CameraError>;
}

/// Something that can be opened into a [`FrameStream`].
pub trait FrameSource: Send + Sync {
    type Stream: FrameStream + 'static;

    fn open(&self) -> impl Future<Output = Result<Self::Stream, CameraError>> + Send;

    fn describe(&self) -> String;
}

pub struct Camera<S: FrameSource> {
    source: S,
    stream: Option<S::Stream>,
}

/// Shared between session capture and enrollment so the two never use a
/// stream at the same time.
pub type SharedCamera<S> = Arc<tokio::sync::Mutex<Camera<S>>>;

impl<S: FrameSource> Camera<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            stream: None,
        }
    }

    pub fn shared(source: S) -> SharedCamera<S> {
        Arc::new(tokio::sync::Mutex::new(Self::new(source)))
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Open a fresh stream. Any stream already held is released first.
    pub async fn open(&mut self) -> Result<(), CameraError> {
        self.close();
        let stream = self.source.open().await?;
        log_info!("camera opened: {}", self.source.describe());
        self.stream = Some(stream);
        Ok(())
    }

    pub fn grab(&mut self) -> Result<Frame, CameraError> {
        let stream = self.stream.as_mut().ok_or(CameraError::NotOpen)?;
        stream.grab()
    }

    /// Release the stream if one is held. Returns whether anything was released.
    pub fn close(&mut self) -> bool {
        match self.stream.take() {
            Some(stream) => {
                drop(stream);
                log_debug!("camera released: {}", self.source.describe());
                true
            }
            None => false,
        }
    }
}

impl<S: FrameSource> Drop for Camera<S> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reads frames from an image file on disk. Each grab re-reads the file, so
/// a process that keeps overwriting it behaves like a live feed.
#[derive(Debug, Clone)]
pub struct ImageFileSource {
    path: PathBuf,
}

impl ImageFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

pub struct ImageFileStream {
    path: PathBuf,
}

impl FrameSource for ImageFileSource {
    type Stream = ImageFileStream;

    fn open(&self) -> impl Future<Output = Result<Self::Stream, CameraError>> + Send {
        let path = self.path.clone();
        async move {
            let metadata = tokio::fs::metadata(&path)
                .await
                .map_err(|err| CameraError::Unavailable(format!("{}: {err}", path.display())))?;
            if !metadata.is_file() {
                return Err(CameraError::Unavailable(format!(
                    "{} is not a file",
                    path.display()
                )));
            }
            Ok(ImageFileStream { path })
        }
    }

    fn describe(&self) -> String {
        format!("image file {}", self.path.display())
    }
}

impl FrameStream for ImageFileStream {
    fn grab(&mut self) -> Result<Frame, CameraError> {
        let image = image::open(&self.path)
            .map_err(|err| CameraError::Frame(format!("{}: {err}", self.path.display())))?;
        Ok(Frame::from_image(image)?)
    }
}
