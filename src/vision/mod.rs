pub mod camera;
pub mod frame;
pub mod matcher;
pub mod phash;
#[cfg(any(test, feature = "test-util"))]
pub mod still;

pub use camera::{Camera, FrameSource, FrameStream, ImageFileSource, SharedCamera};
pub use frame::Frame;
pub use matcher::{hamming_distance, match_references, MatchPolicy, MatchVerdict};
pub use phash::{compute_average_hash, compute_difference_hash, fingerprint};
#[cfg(any(test, feature = "test-util"))]
pub use still::StillFrameSource;
