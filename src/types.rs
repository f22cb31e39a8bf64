use crate::{MotionCamError, Result};

/// Logical streams exposed by the camera.
///
/// The first five are native hardware streams. The remaining ones are
/// synthetic streams derived on the host (rectified/aligned images); they
/// carry no hardware timestamp source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Depth,
    Color,
    Infrared,
    Infrared2,
    Fisheye,
    Points,
    RectifiedColor,
    ColorAlignedToDepth,
}

impl Stream {
    pub const COUNT: usize = 8;

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Clock-domain groups.
///
/// Streams in one group share a physical timing source and are matched
/// against one shared timestamp event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// Primary camera controller: depth, color and both infrared imagers.
    DepthCam,
    /// Motion module: the wide-angle fisheye imager.
    MotionCam,
}

impl EventSource {
    pub const COUNT: usize = 2;

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Map a video stream to the clock-domain group that timestamps it.
    ///
    /// Synthetic streams have no group; asking for one is a programming
    /// error, not a runtime condition.
    pub fn for_stream(stream: Stream) -> Result<EventSource> {
        match stream {
            Stream::Depth | Stream::Color | Stream::Infrared | Stream::Infrared2 => {
                Ok(EventSource::DepthCam)
            }
            Stream::Fisheye => Ok(EventSource::MotionCam),
            other => Err(MotionCamError::UnsupportedStream(other)),
        }
    }
}

/// Which clock produced a frame's final timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampDomain {
    /// Raw capture-time estimate taken on the host side.
    #[default]
    CameraClock,
    /// Corrected timestamp from the hardware microcontroller.
    Microcontroller,
}

/// Authoritative timestamp notification from a hardware subsystem.
///
/// `frame_number` is the correlation key between a raw frame and this
/// event; it is unique within a source's recent history (bounded by the
/// event queue capacity), not globally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampEvent {
    pub source: EventSource,
    pub frame_number: u64,
    /// Time in the hardware's authoritative clock for this group.
    pub timestamp: f64,
}

/// Frame metadata the corrector needs to read and stamp.
///
/// Implemented by whatever frame object the delivery pipeline carries;
/// the corrector only touches these fields.
pub trait FrameMeta {
    fn frame_number(&self) -> u64;
    fn stream(&self) -> Stream;
    fn set_timestamp(&mut self, timestamp: f64);
    fn set_timestamp_domain(&mut self, domain: TimestampDomain);
}

/// Minimal frame record used by the delivery pipeline and tests.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub frame_number: u64,
    pub stream: Stream,
    pub timestamp: f64,
    pub timestamp_domain: TimestampDomain,
}

impl VideoFrame {
    /// A raw frame carrying the host-side capture-time estimate.
    pub fn new(stream: Stream, frame_number: u64, capture_estimate: f64) -> VideoFrame {
        VideoFrame {
            frame_number,
            stream,
            timestamp: capture_estimate,
            timestamp_domain: TimestampDomain::CameraClock,
        }
    }
}

impl FrameMeta for VideoFrame {
    fn frame_number(&self) -> u64 {
        self.frame_number
    }

    fn stream(&self) -> Stream {
        self.stream
    }

    fn set_timestamp(&mut self, timestamp: f64) {
        self.timestamp = timestamp;
    }

    fn set_timestamp_domain(&mut self, domain: TimestampDomain) {
        self.timestamp_domain = domain;
    }
}

bitflags::bitflags! {
    /// Capability bits advertised by the device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        const DEPTH         = 1 << 0;
        const COLOR         = 1 << 1;
        const INFRARED      = 1 << 2;
        const INFRARED2     = 1 << 3;
        const FISH_EYE      = 1 << 4;
        const MOTION_EVENTS = 1 << 5;
    }
}

/// An enabled stream configuration, as far as timing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMode {
    pub stream: Stream,
    pub fps: u32,
}
