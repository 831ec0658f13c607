//! Motion tracking for polled devices
//!
//! Drivers start a move, then learn about its progress only by polling. The
//! tracker turns those observations into the `Idle -> Busy -> Ok | Alert`
//! state sequence and decides when a move has completed or timed out.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Externally visible motion state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionState {
    /// No motion has been requested
    #[default]
    Idle,
    /// A motion is in progress
    Busy,
    /// The last motion completed
    Ok,
    /// The last motion or poll failed
    Alert,
}

/// Result of feeding an observation into the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionUpdate {
    /// No motion was pending
    Idle,
    /// The motion is still under way
    InProgress,
    /// The motion finished with this observation
    Completed,
    /// The motion outlived its timeout
    TimedOut,
}

#[derive(Debug, Clone, Copy)]
struct PendingMotion {
    target: Option<i64>,
    started: Instant,
}

/// Tracks a single in-flight motion
#[derive(Debug, Clone)]
pub struct MotionTracker {
    state: MotionState,
    pending: Option<PendingMotion>,
    timeout: Duration,
}

impl MotionTracker {
    /// Create a tracker that gives up on motions older than `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: MotionState::Idle,
            pending: None,
            timeout,
        }
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    /// Target of the pending motion, if it has one
    pub fn target(&self) -> Option<i64> {
        self.pending.and_then(|p| p.target)
    }

    /// Whether a motion is still pending
    pub fn is_moving(&self) -> bool {
        self.pending.is_some()
    }

    /// Start tracking a motion towards `target` (or an untargeted one, like homing)
    pub fn begin(&mut self, target: Option<i64>) {
        self.begin_at(target, Instant::now());
    }

    /// The device reported whether it is still moving
    pub fn observe_moving(&mut self, moving: bool) -> MotionUpdate {
        self.observe_moving_at(moving, Instant::now())
    }

    /// The device reported its position; reaching the target completes the motion
    pub fn observe_position(&mut self, position: i64) -> MotionUpdate {
        self.observe_position_at(position, Instant::now())
    }

    /// A poll failed. The motion stays pending so a later poll can resolve it.
    pub fn fail(&mut self) -> MotionUpdate {
        self.fail_at(Instant::now())
    }

    /// Issuing the motion command failed; nothing is pending afterwards
    pub fn reject(&mut self) {
        self.state = MotionState::Alert;
        self.pending = None;
    }

    /// The motion was aborted on request
    pub fn abort(&mut self) {
        self.state = MotionState::Idle;
        self.pending = None;
    }

    fn begin_at(&mut self, target: Option<i64>, now: Instant) {
        debug!("Motion started (target: {:?})", target);
        self.state = MotionState::Busy;
        self.pending = Some(PendingMotion {
            target,
            started: now,
        });
    }

    fn observe_moving_at(&mut self, moving: bool, now: Instant) -> MotionUpdate {
        if self.pending.is_none() {
            return MotionUpdate::Idle;
        }
        if !moving {
            return self.complete();
        }
        self.still_moving(now)
    }

    fn observe_position_at(&mut self, position: i64, now: Instant) -> MotionUpdate {
        let Some(pending) = self.pending else {
            return MotionUpdate::Idle;
        };
        if pending.target == Some(position) {
            return self.complete();
        }
        self.still_moving(now)
    }

    fn fail_at(&mut self, now: Instant) -> MotionUpdate {
        if self.pending.is_none() {
            self.state = MotionState::Alert;
            return MotionUpdate::Idle;
        }
        if self.expired(now) {
            return self.time_out();
        }
        self.state = MotionState::Alert;
        MotionUpdate::InProgress
    }

    fn still_moving(&mut self, now: Instant) -> MotionUpdate {
        if self.expired(now) {
            return self.time_out();
        }
        self.state = MotionState::Busy;
        MotionUpdate::InProgress
    }

    fn complete(&mut self) -> MotionUpdate {
        debug!("Motion complete (target: {:?})", self.target());
        self.state = MotionState::Ok;
        self.pending = None;
        MotionUpdate::Completed
    }

    fn time_out(&mut self) -> MotionUpdate {
        warn!(
            "Motion did not complete within {:?} (target: {:?})",
            self.timeout,
            self.target()
        );
        self.state = MotionState::Alert;
        self.pending = None;
        MotionUpdate::TimedOut
    }

    fn expired(&self, now: Instant) -> bool {
        self.pending
            .is_some_and(|p| now.saturating_duration_since(p.started) > self.timeout)
    }
}
