use crate::timestamps::TimestampCorrector;
use crate::types::TimestampEvent;
use crate::{MotionCamError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Background pump draining hardware timestamp events into the corrector.
///
/// The motion module delivers events on a channel from its callback
/// context; the pump forwards each one to [`TimestampCorrector::ingest`]
/// on a dedicated thread so the hardware callback never blocks on the
/// corrector lock.
pub struct EventPump {
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl EventPump {
    /// Start the pump thread.
    pub fn start(
        events: Receiver<TimestampEvent>,
        corrector: Arc<TimestampCorrector>,
    ) -> Result<EventPump> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let thread = std::thread::Builder::new()
            .name("motioncam-events".into())
            .spawn(move || {
                pump_loop(events, corrector, stop_clone);
            })
            .map_err(|e| MotionCamError::EventPump(format!("failed to spawn event thread: {}", e)))?;

        Ok(EventPump {
            stop_flag,
            thread: Some(thread),
        })
    }

    /// Check if the pump is still forwarding events.
    pub fn is_active(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
    }

    /// Stop the pump and wait for the thread to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn pump_loop(
    events: Receiver<TimestampEvent>,
    corrector: Arc<TimestampCorrector>,
    stop_flag: Arc<AtomicBool>,
) {
    log::info!("event pump started");

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            log::info!("event pump stopping (stop flag set)");
            break;
        }

        // recv_timeout: 100ms to periodically check the stop flag
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                log::trace!(
                    "event {:?} frame {} ts {:.3}",
                    event.source,
                    event.frame_number,
                    event.timestamp
                );
                corrector.ingest(event);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("event channel disconnected, stopping pump");
                stop_flag.store(true, Ordering::Relaxed);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventSource, Stream, VideoFrame};
    use std::sync::atomic::AtomicU32;
    use std::time::Instant;

    fn corrector() -> Arc<TimestampCorrector> {
        Arc::new(TimestampCorrector::new(
            Arc::new(AtomicU32::new(100)),
            Arc::new(AtomicU32::new(2_000)),
        ))
    }

    #[test]
    fn test_pump_forwards_events() {
        let corrector = corrector();
        let (sender, receiver) = crossbeam_channel::bounded(64);
        let pump = EventPump::start(receiver, corrector.clone()).unwrap();

        sender
            .send(TimestampEvent {
                source: EventSource::MotionCam,
                frame_number: 3,
                timestamp: 77.0,
            })
            .unwrap();

        let mut frame = VideoFrame::new(Stream::Fisheye, 3, 0.0);
        assert!(corrector.resolve(&mut frame, Stream::Fisheye).unwrap());
        assert_eq!(frame.timestamp, 77.0);

        pump.stop();
    }

    #[test]
    fn test_pump_stops_on_disconnect() {
        let corrector = corrector();
        let (sender, receiver) = crossbeam_channel::bounded::<TimestampEvent>(64);
        let pump = EventPump::start(receiver, corrector).unwrap();
        assert!(pump.is_active());

        drop(sender);

        let deadline = Instant::now() + Duration::from_secs(2);
        while pump.is_active() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(!pump.is_active());
    }
}
