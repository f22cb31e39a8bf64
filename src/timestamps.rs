//! Frame timestamp synchronization.
//!
//! Video frames and motion-module timestamp events arrive on independent
//! paths with independent clocks. The [`TimestampCorrector`] keeps one
//! bounded queue of recent events per clock-domain group and matches an
//! arriving frame to its authoritative timestamp by frame number, blocking
//! the frame-delivery thread for at most the configured timeout when the
//! event hasn't arrived yet.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::types::{EventSource, FrameMeta, Stream, TimestampDomain, TimestampEvent};
use crate::Result;

/// Bounded FIFO of recent timestamp events for one clock-domain group.
///
/// Holds one monotonic watermark per logical stream serviced by the group,
/// so a timestamp earlier than one already delivered for a stream is never
/// handed out again for that stream.
#[derive(Debug)]
struct EventQueue {
    entries: VecDeque<TimestampEvent>,
    last_accepted: [Option<f64>; Stream::COUNT],
}

impl EventQueue {
    fn new() -> EventQueue {
        EventQueue {
            entries: VecDeque::new(),
            last_accepted: [None; Stream::COUNT],
        }
    }

    /// Append an event, evicting from the head while over `capacity`.
    /// Never fails; overflow silently drops the oldest entries.
    fn push(&mut self, event: TimestampEvent, capacity: usize) {
        self.entries.push_back(event);
        while self.entries.len() > capacity {
            self.entries.pop_front();
        }
    }

    /// Look up the frame's number and stamp the frame on success.
    ///
    /// A candidate below the stream's watermark is rejected without
    /// touching the frame. Matched entries stay resident until capacity
    /// eviction, so a still-resident frame number can match again.
    fn match_and_correct(&mut self, frame: &mut dyn FrameMeta, stream: Stream) -> bool {
        let number = frame.frame_number();
        let Some(entry) = self.entries.iter().find(|e| e.frame_number == number) else {
            return false;
        };

        let ts = entry.timestamp;
        if let Some(watermark) = self.last_accepted[stream.index()] {
            if ts < watermark {
                log::debug!(
                    "rejecting stale timestamp {:.3} for {:?} frame {} (watermark {:.3})",
                    ts,
                    stream,
                    number,
                    watermark
                );
                return false;
            }
        }

        frame.set_timestamp(ts);
        self.last_accepted[stream.index()] = Some(ts);
        true
    }
}

/// Matches raw video frames to authoritative hardware timestamp events.
///
/// One [`EventQueue`] per clock-domain group, all behind a single mutex;
/// queue operations are O(capacity) and cheap, so the coarse lock is not a
/// contention concern. The capacity and timeout knobs are shared with the
/// owning device and read live on every call, so an operator can retune
/// them while streaming.
pub struct TimestampCorrector {
    queues: Mutex<[EventQueue; EventSource::COUNT]>,
    matched: Condvar,
    queue_capacity: Arc<AtomicU32>,
    wait_timeout_ms: Arc<AtomicU32>,
}

impl TimestampCorrector {
    pub fn new(queue_capacity: Arc<AtomicU32>, wait_timeout_ms: Arc<AtomicU32>) -> TimestampCorrector {
        TimestampCorrector {
            queues: Mutex::new([EventQueue::new(), EventQueue::new()]),
            matched: Condvar::new(),
            queue_capacity,
            wait_timeout_ms,
        }
    }

    // The queues can't be left mid-mutation by a panicking peer, so a
    // poisoned lock is recovered rather than propagated.
    fn lock_queues(&self) -> MutexGuard<'_, [EventQueue; EventSource::COUNT]> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Producer entry point, called from the hardware notification path.
    ///
    /// Records the event in its group's queue and wakes every consumer
    /// blocked in [`resolve`](Self::resolve) so a waiting frame observes
    /// the match immediately instead of sleeping out its timeout.
    pub fn ingest(&self, event: TimestampEvent) {
        let capacity = self.queue_capacity.load(Ordering::Relaxed) as usize;
        {
            let mut queues = self.lock_queues();
            queues[event.source.index()].push(event, capacity);
        }
        self.matched.notify_all();
    }

    /// Consumer entry point, called before a frame is released to the
    /// application.
    ///
    /// Tries to match the frame against its group's queue, waiting up to
    /// the configured timeout for the event to arrive. On success the
    /// frame's timestamp is replaced and its domain tagged
    /// [`TimestampDomain::Microcontroller`]; `Ok(true)` is returned. On
    /// timeout the frame keeps whatever timestamp it had and `Ok(false)`
    /// is returned - a missed correction is an expected occurrence in a
    /// real-time pipeline, not a fault.
    ///
    /// The only error is resolving a stream with no clock-domain group.
    pub fn resolve(&self, frame: &mut dyn FrameMeta, stream: Stream) -> Result<bool> {
        let source = EventSource::for_stream(stream)?;
        let timeout = Duration::from_millis(self.wait_timeout_ms.load(Ordering::Relaxed) as u64);
        let deadline = Instant::now() + timeout;

        let mut queues = self.lock_queues();
        loop {
            if queues[source.index()].match_and_correct(frame, stream) {
                frame.set_timestamp_domain(TimestampDomain::Microcontroller);
                return Ok(true);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let (guard, _) = self
                .matched
                .wait_timeout(queues, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            queues = guard;
        }
    }

    /// Number of events currently retained for a group. Diagnostic only.
    pub fn pending_events(&self, source: EventSource) -> usize {
        self.lock_queues()[source.index()].entries.len()
    }
}
