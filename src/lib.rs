//! # motioncam - driver stack for a depth-and-motion tracking camera
//!
//! The camera pairs a depth/color imager with a wide-angle motion-tracking
//! module. The two subsystems run on independent hardware clocks, so raw
//! frames arrive with capture-time estimates that don't line up with the
//! motion data. This crate:
//! - derives per-stream geometric calibration (intrinsics/extrinsics) from
//!   the device calibration document,
//! - aligns frame timestamps onto the hardware microcontroller clock via
//!   the [`TimestampCorrector`],
//! - pumps motion-module timestamp events into the corrector on a
//!   background thread.
//!
//! ## Quick Start
//! ```no_run
//! use motioncam::{EventTuning, Stream, TimestampCorrector, TimestampEvent, EventSource, VideoFrame};
//!
//! let tuning = EventTuning::default();
//! let corrector = TimestampCorrector::new(
//!     tuning.queue_capacity.clone(),
//!     tuning.wait_timeout_ms.clone(),
//! );
//!
//! // Hardware notification path:
//! corrector.ingest(TimestampEvent {
//!     source: EventSource::DepthCam,
//!     frame_number: 7,
//!     timestamp: 100.0,
//! });
//!
//! // Frame delivery path:
//! let mut frame = VideoFrame::new(Stream::Depth, 7, 99.2);
//! if corrector.resolve(&mut frame, Stream::Depth).unwrap() {
//!     println!("corrected: {:.3}", frame.timestamp);
//! }
//! ```

pub mod calib;
pub mod device;
pub mod error;
pub mod events;
pub mod timestamps;
pub mod types;

pub use calib::MotionModuleCalibration;
pub use device::{EventTuning, MotionCamera, MotionProfile, MotionTransport};
pub use error::MotionCamError;
pub use events::EventPump;
pub use timestamps::TimestampCorrector;
pub use types::*;

/// Result type alias for motioncam operations.
pub type Result<T> = std::result::Result<T, MotionCamError>;
