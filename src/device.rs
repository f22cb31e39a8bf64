//! Device-level surface: tuning knobs, motion-module lifecycle, and the
//! geometric queries the application uses for motion compensation.

use crate::calib::{Extrinsics, Intrinsics, MotionIntrinsics, MotionModuleCalibration};
use crate::events::EventPump;
use crate::timestamps::TimestampCorrector;
use crate::types::{Capabilities, FrameMeta, Stream, StreamMode, TimestampEvent};
use crate::{MotionCamError, Result};
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Runtime-tunable knobs shared between the device and its corrector.
///
/// Both values are read live on every ingest/resolve call, so an operator
/// can retune them while the camera streams.
#[derive(Debug, Clone)]
pub struct EventTuning {
    /// Timestamp events retained per clock-domain group.
    pub queue_capacity: Arc<AtomicU32>,
    /// Maximum time a resolve call blocks waiting for a match.
    pub wait_timeout_ms: Arc<AtomicU32>,
}

impl EventTuning {
    pub const DEFAULT_QUEUE_CAPACITY: u32 = 100;
    pub const DEFAULT_WAIT_TIMEOUT_MS: u32 = 100;

    pub fn new(queue_capacity: u32, wait_timeout_ms: u32) -> EventTuning {
        EventTuning {
            queue_capacity: Arc::new(AtomicU32::new(queue_capacity)),
            wait_timeout_ms: Arc::new(AtomicU32::new(wait_timeout_ms)),
        }
    }

    pub fn set_queue_capacity(&self, capacity: u32) {
        self.queue_capacity.store(capacity, Ordering::Relaxed);
    }

    pub fn set_wait_timeout_ms(&self, timeout_ms: u32) {
        self.wait_timeout_ms.store(timeout_ms, Ordering::Relaxed);
    }
}

impl Default for EventTuning {
    fn default() -> EventTuning {
        EventTuning::new(
            EventTuning::DEFAULT_QUEUE_CAPACITY,
            EventTuning::DEFAULT_WAIT_TIMEOUT_MS,
        )
    }
}

/// Motion module acquisition profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionProfile {
    pub imu_buffer_depth: u32,
    pub fisheye_buffer_depth: u32,
    pub sync_imu: bool,
    pub gyro_enabled: bool,
    pub gyro_fps: u32,
    pub gyro_range_dps: u32,
    pub accel_enabled: bool,
    pub accel_fps: u32,
    pub accel_range_g: u32,
    pub fisheye_enabled: bool,
    pub fisheye_fps: u32,
    pub depth_enabled: bool,
}

impl Default for MotionProfile {
    fn default() -> MotionProfile {
        MotionProfile {
            imu_buffer_depth: 1,
            fisheye_buffer_depth: 20,
            sync_imu: false,
            gyro_enabled: true,
            gyro_fps: 200,
            gyro_range_dps: 1000,
            accel_enabled: true,
            accel_fps: 125,
            accel_range_g: 4,
            fisheye_enabled: true,
            fisheye_fps: 30,
            depth_enabled: true,
        }
    }
}

/// Interface to the vendor motion subsystem.
///
/// Implementations own the power/register plumbing; the driver only needs
/// lifecycle control and the channel on which the subsystem delivers its
/// authoritative timestamp events.
pub trait MotionTransport: Send {
    /// Power up the motion module with the given acquisition profile.
    fn start(&mut self, profile: &MotionProfile) -> Result<()>;

    /// Start the fisheye camera feed.
    fn start_fisheye(&mut self) -> Result<()>;

    /// Power down the motion module.
    fn stop(&mut self) -> Result<()>;

    /// Channel carrying timestamp events from the module's callback context.
    fn events(&mut self) -> Result<Receiver<TimestampEvent>>;
}

/// An opened depth-and-motion camera.
///
/// Owns the timestamp corrector and the motion-module lifecycle; stream
/// enumeration and UVC plumbing live behind the transport boundary.
pub struct MotionCamera {
    calibration: MotionModuleCalibration,
    tuning: EventTuning,
    corrector: Arc<TimestampCorrector>,
    transport: Box<dyn MotionTransport>,
    profile: MotionProfile,
    pump: Option<EventPump>,
    motion_started: bool,
    fisheye_started: bool,
}

impl MotionCamera {
    pub fn new(
        calibration: MotionModuleCalibration,
        transport: Box<dyn MotionTransport>,
        tuning: EventTuning,
    ) -> MotionCamera {
        let corrector = Arc::new(TimestampCorrector::new(
            tuning.queue_capacity.clone(),
            tuning.wait_timeout_ms.clone(),
        ));
        MotionCamera {
            calibration,
            tuning,
            corrector,
            transport,
            profile: MotionProfile::default(),
            pump: None,
            motion_started: false,
            fisheye_started: false,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    pub fn tuning(&self) -> &EventTuning {
        &self.tuning
    }

    pub fn corrector(&self) -> &Arc<TimestampCorrector> {
        &self.corrector
    }

    /// Replace the acquisition profile used by the next motion start.
    pub fn set_profile(&mut self, profile: MotionProfile) {
        self.profile = profile;
    }

    /// Power up the motion module and start pumping its timestamp events
    /// into the corrector. Idempotent.
    pub fn start_motion_tracking(&mut self) -> Result<()> {
        if self.motion_started {
            return Ok(());
        }
        log::info!("starting motion tracking");
        self.transport.start(&self.profile)?;
        let events = self.transport.events()?;
        self.pump = Some(EventPump::start(events, self.corrector.clone())?);
        self.motion_started = true;
        Ok(())
    }

    /// Start the fisheye camera feed. Requires motion tracking. Idempotent.
    pub fn enable_fisheye_stream(&mut self) -> Result<()> {
        if self.fisheye_started {
            return Ok(());
        }
        if !self.motion_started {
            return Err(MotionCamError::Transport(
                "fisheye stream requires motion tracking".into(),
            ));
        }
        self.transport.start_fisheye()?;
        self.fisheye_started = true;
        Ok(())
    }

    /// Power down the motion module and stop the event pump. Idempotent.
    pub fn stop_motion_tracking(&mut self) -> Result<()> {
        if !self.motion_started {
            return Ok(());
        }
        log::info!("stopping motion tracking");
        if let Some(pump) = self.pump.take() {
            pump.stop();
        }
        self.transport.stop()?;
        self.motion_started = false;
        self.fisheye_started = false;
        Ok(())
    }

    /// Correct a frame's timestamp before releasing it to the application.
    /// See [`TimestampCorrector::resolve`].
    pub fn resolve_frame(&self, frame: &mut dyn FrameMeta, stream: Stream) -> Result<bool> {
        self.corrector.resolve(frame, stream)
    }

    pub fn fisheye_intrinsics(&self) -> &Intrinsics {
        &self.calibration.fisheye
    }

    pub fn motion_intrinsics(&self) -> &MotionIntrinsics {
        &self.calibration.imu
    }

    /// Rigid transform from a video stream's frame to the IMU frame.
    pub fn motion_extrinsics_from(&self, stream: Stream) -> Result<Extrinsics> {
        let extrinsics = &self.calibration.extrinsics;
        match stream {
            Stream::Depth => Ok(extrinsics.depth_to_imu),
            Stream::Color => Ok(extrinsics.rgb_to_imu),
            Stream::Fisheye => Ok(extrinsics.fisheye_to_imu),
            other => Err(MotionCamError::NoMotionExtrinsics(other)),
        }
    }
}

impl Drop for MotionCamera {
    fn drop(&mut self) {
        let _ = self.stop_motion_tracking();
    }
}

/// Pick the stream to wait on when assembling coherent framesets.
///
/// When all streams run at an identical framerate, images arrive in the
/// order depth -> color -> infrared, so waiting on the latest-arriving
/// stream running at the fastest framerate maximizes the chance of a
/// coherent set.
pub fn select_key_stream(modes: &[StreamMode]) -> Stream {
    let max_fps = modes.iter().map(|m| m.fps).max().unwrap_or(0);
    for stream in [
        Stream::Color,
        Stream::Infrared2,
        Stream::Infrared,
        Stream::Fisheye,
    ] {
        if modes.iter().any(|m| m.stream == stream && m.fps == max_fps) {
            return stream;
        }
    }
    Stream::Depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventSource, VideoFrame};
    use crossbeam_channel::Sender;

    struct FakeTransport {
        sender: Option<Sender<TimestampEvent>>,
        receiver: Option<Receiver<TimestampEvent>>,
    }

    impl FakeTransport {
        fn new() -> (FakeTransport, Sender<TimestampEvent>) {
            let (sender, receiver) = crossbeam_channel::bounded(64);
            (
                FakeTransport {
                    sender: Some(sender.clone()),
                    receiver: Some(receiver),
                },
                sender,
            )
        }
    }

    impl MotionTransport for FakeTransport {
        fn start(&mut self, _profile: &MotionProfile) -> Result<()> {
            Ok(())
        }

        fn start_fisheye(&mut self) -> Result<()> {
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.sender.take();
            Ok(())
        }

        fn events(&mut self) -> Result<Receiver<TimestampEvent>> {
            self.receiver
                .clone()
                .ok_or(MotionCamError::ChannelDisconnected)
        }
    }

    fn camera() -> (MotionCamera, Sender<TimestampEvent>) {
        let (transport, sender) = FakeTransport::new();
        let camera = MotionCamera::new(
            MotionModuleCalibration::default(),
            Box::new(transport),
            EventTuning::new(100, 2_000),
        );
        (camera, sender)
    }

    #[test]
    fn test_motion_events_flow_to_frames() {
        let (mut camera, sender) = camera();
        camera.start_motion_tracking().unwrap();

        sender
            .send(TimestampEvent {
                source: EventSource::DepthCam,
                frame_number: 11,
                timestamp: 500.25,
            })
            .unwrap();

        let mut frame = VideoFrame::new(Stream::Depth, 11, 0.0);
        assert!(camera.resolve_frame(&mut frame, Stream::Depth).unwrap());
        assert_eq!(frame.timestamp, 500.25);

        camera.stop_motion_tracking().unwrap();
    }

    #[test]
    fn test_start_is_idempotent() {
        let (mut camera, _sender) = camera();
        camera.start_motion_tracking().unwrap();
        camera.start_motion_tracking().unwrap();
        camera.enable_fisheye_stream().unwrap();
        camera.enable_fisheye_stream().unwrap();
        camera.stop_motion_tracking().unwrap();
        camera.stop_motion_tracking().unwrap();
    }

    #[test]
    fn test_fisheye_requires_motion_tracking() {
        let (mut camera, _sender) = camera();
        assert!(matches!(
            camera.enable_fisheye_stream(),
            Err(MotionCamError::Transport(_))
        ));
    }

    #[test]
    fn test_motion_extrinsics_mapping() {
        let (camera, _sender) = camera();
        assert!(camera.motion_extrinsics_from(Stream::Depth).is_ok());
        assert!(camera.motion_extrinsics_from(Stream::Color).is_ok());
        assert!(camera.motion_extrinsics_from(Stream::Fisheye).is_ok());
        assert!(matches!(
            camera.motion_extrinsics_from(Stream::Infrared),
            Err(MotionCamError::NoMotionExtrinsics(Stream::Infrared))
        ));
    }

    #[test]
    fn test_tuning_is_shared_with_corrector() {
        let (camera, _sender) = camera();
        camera.tuning().set_wait_timeout_ms(1);

        let mut frame = VideoFrame::new(Stream::Depth, 99, 0.0);
        let start = std::time::Instant::now();
        assert!(!camera.resolve_frame(&mut frame, Stream::Depth).unwrap());
        // The live-read timeout, not the construction-time one, bounds the wait.
        assert!(start.elapsed() < std::time::Duration::from_millis(500));
    }

    #[test]
    fn test_select_key_stream_prefers_latest_arriving() {
        let modes = [
            StreamMode {
                stream: Stream::Depth,
                fps: 30,
            },
            StreamMode {
                stream: Stream::Color,
                fps: 30,
            },
            StreamMode {
                stream: Stream::Infrared,
                fps: 30,
            },
        ];
        assert_eq!(select_key_stream(&modes), Stream::Color);

        let mixed = [
            StreamMode {
                stream: Stream::Depth,
                fps: 60,
            },
            StreamMode {
                stream: Stream::Color,
                fps: 30,
            },
        ];
        // Only depth runs at the fastest rate.
        assert_eq!(select_key_stream(&mixed), Stream::Depth);

        assert_eq!(select_key_stream(&[]), Stream::Depth);
    }
}
