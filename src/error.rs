use crate::types::Stream;

/// Errors surfaced by the driver stack.
///
/// Expected real-time outcomes on the frame path - no matching event yet,
/// a stale candidate, a resolve timeout - are ordinary boolean returns,
/// not errors. Only programming/configuration faults land here.
#[derive(Debug, thiserror::Error)]
pub enum MotionCamError {
    #[error("stream {0:?} has no timestamp event source")]
    UnsupportedStream(Stream),

    #[error("no motion extrinsics from stream {0:?}")]
    NoMotionExtrinsics(Stream),

    #[error("calibration field missing or invalid: {0}")]
    CalibrationField(&'static str),

    #[error("calibration JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("event pump failed: {0}")]
    EventPump(String),

    #[error("event channel disconnected")]
    ChannelDisconnected,

    #[error("motion transport error: {0}")]
    Transport(String),
}
