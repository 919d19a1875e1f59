//! In-memory frame source for exercising the camera slot without a device.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::RgbaImage;

use super::camera::{FrameSource, FrameStream};
use super::Frame;
use crate::error::CameraError;

/// In-memory source whose picture can be swapped while a stream is open.
/// Tracks how many streams are currently held.
#[derive(Debug, Clone)]
pub struct StillFrameSource {
    picture: Arc<Mutex<RgbaImage>>,
    open_streams: Arc<AtomicUsize>,
    available: Arc<Mutex<bool>>,
}

impl StillFrameSource {
    pub fn new(picture: RgbaImage) -> Self {
        Self {
            picture: Arc::new(Mutex::new(picture)),
            open_streams: Arc::new(AtomicUsize::new(0)),
            available: Arc::new(Mutex::new(true)),
        }
    }

    /// Point the "camera" at something else.
    pub fn show(&self, picture: RgbaImage) {
        *lock(&self.picture) = picture;
    }

    /// Simulate the device being unplugged or permission being denied.
    pub fn set_available(&self, available: bool) {
        *lock(&self.available) = available;
    }

    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct StillFrameStream {
    picture: Arc<Mutex<RgbaImage>>,
    open_streams: Arc<AtomicUsize>,
}

impl FrameSource for StillFrameSource {
    type Stream = StillFrameStream;

    fn open(&self) -> impl Future<Output = Result<Self::Stream, CameraError>> + Send {
        let available = *lock(&self.available);
        let picture = self.picture.clone();
        let open_streams = self.open_streams.clone();
        async move {
            if !available {
                return Err(CameraError::Unavailable("camera permission denied".into()));
            }
            open_streams.fetch_add(1, Ordering::SeqCst);
            Ok(StillFrameStream {
                picture,
                open_streams,
            })
        }
    }

    fn describe(&self) -> String {
        "still frame".into()
    }
}

impl FrameStream for StillFrameStream {
    fn grab(&mut self) -> Result<Frame, CameraError> {
        let picture = lock(&self.picture).clone();
        Ok(Frame::from_rgba(picture)?)
    }
}

impl Drop for StillFrameStream {
    fn drop(&mut self) {
        self.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}
