//! Deferred screenshots for real-time render loops.
//!
//! A [`ShotCoordinator`] sits at the end of each frame. Requests queued with
//! [`ShotCoordinator::request_screenshot`] are captured by the next
//! [`ShotCoordinator::advance`], read back a few frames later once the copy
//! has landed, and encoded to disk on a worker pool while rendering goes on.

pub mod backend;
pub mod convert;
pub mod coordinator;
pub mod encode;
pub mod error;
pub mod format;
pub mod path_template;
pub mod pool;
pub mod rect;
pub mod request;
pub mod ring;
pub mod software;
pub mod stats;

pub use backend::{
    FrameBuffer, PixelLayout, PixelView, ReadbackBackend, RowOrder, SourcePixelFormat,
};
pub use coordinator::{ShotConfig, ShotCoordinator, ShotCoordinatorBuilder, ShotRequester};
pub use encode::{ImageCrateWriter, ImageWriter, ShotEvent};
pub use error::{ShotError, ShotErrorClass, ShotResult};
pub use format::{ColorMode, ImageFileType, PngCompression, ShotFormat};
pub use rect::CaptureRect;
pub use ring::SlotPhase;
pub use software::{SoftwareBackend, SoftwareSurface};
pub use stats::{ShotStats, ShotStatsSnapshot};
