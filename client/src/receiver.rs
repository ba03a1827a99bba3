//! Latest-tick store with the startup hold and countdown gate.

use arcade_shared::{GameFamily, Snapshot};
use log::{debug, info};
use std::time::Instant;

use crate::config::Timing;
use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartupPhase {
    AwaitingFirst,
    Hold { since: Instant },
    Countdown { since: Instant },
    Ready,
    /// A terminal tick arrived; nothing more is consumed for this room.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    First,
    Stored,
    Ignored,
}

/// What the render loop may draw this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameView<'a> {
    Nothing,
    Frozen {
        snapshot: &'a Snapshot,
        digit: Option<u8>,
    },
    Live(&'a Snapshot),
}

#[derive(Debug)]
pub struct SnapshotReceiver {
    family: GameFamily,
    timing: Timing,
    phase: StartupPhase,
    first: Option<Snapshot>,
    latest: Option<Snapshot>,
    /// Countdown digits already announced.
    announced: u8,
    digit: Option<u8>,
    received: u64,
}

impl SnapshotReceiver {
    pub fn new(family: GameFamily, timing: Timing) -> Self {
        Self {
            family,
            timing,
            phase: StartupPhase::AwaitingFirst,
            first: None,
            latest: None,
            announced: 0,
            digit: None,
            received: 0,
        }
    }

    pub fn phase(&self) -> StartupPhase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == StartupPhase::Ready
    }

    pub fn is_stopped(&self) -> bool {
        self.phase == StartupPhase::Stopped
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.latest.as_ref()
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// Stores `snapshot` as the latest tick, replacing whatever was there.
    pub fn accept(&mut self, snapshot: Snapshot, now: Instant) -> Result<Accepted, ProtocolError> {
        if self.phase == StartupPhase::Stopped {
            debug!("{} tick {} after stop ignored", self.family, snapshot.tick());
            return Ok(Accepted::Ignored);
        }

        if snapshot.family() != self.family {
            return Err(ProtocolError::FamilyMismatch {
                expected: self.family,
                found: snapshot.family(),
            });
        }
        snapshot.validate()?;

        self.received += 1;
        if self.phase == StartupPhase::AwaitingFirst {
            info!("{} first tick {}, holding", self.family, snapshot.tick());
            self.first = Some(snapshot.clone());
            self.latest = Some(snapshot);
            self.phase = StartupPhase::Hold { since: now };
            return Ok(Accepted::First);
        }

        self.latest = Some(snapshot);
        Ok(Accepted::Stored)
    }

    /// Moves through hold and countdown. Returns digits that became visible.
    pub fn advance(&mut self, now: Instant) -> Vec<u8> {
        let mut started = Vec::new();

        if let StartupPhase::Hold { since } = self.phase {
            if now.saturating_duration_since(since) < self.timing.startup_hold {
                return started;
            }
            self.phase = StartupPhase::Countdown {
                since: since + self.timing.startup_hold,
            };
        }

        let StartupPhase::Countdown { since } = self.phase else {
            return started;
        };

        let elapsed = now.saturating_duration_since(since);
        let from = self.timing.countdown_from;
        let step_ms = self.timing.countdown_step.as_millis().max(1);
        let steps_elapsed = (elapsed.as_millis() / step_ms).min(from as u128) as u8;

        // Frames may be skipped under load; every digit is still announced in order.
        let due = (steps_elapsed + 1).min(from);
        while self.announced < due {
            started.push(from - self.announced);
            self.announced += 1;
        }

        self.digit = if steps_elapsed < from {
            Some(from - steps_elapsed)
        } else {
            None
        };

        let total = self.timing.countdown_step * from as u32 + self.timing.countdown_pause;
        if elapsed >= total {
            info!("{} countdown complete, ready", self.family);
            self.phase = StartupPhase::Ready;
            self.digit = None;
        }

        started
    }

    pub fn view(&self) -> FrameView<'_> {
        match (self.phase, &self.first, &self.latest) {
            (StartupPhase::Countdown { .. }, Some(first), _) => FrameView::Frozen {
                snapshot: first,
                digit: self.digit,
            },
            (StartupPhase::Ready | StartupPhase::Stopped, _, Some(latest)) => {
                FrameView::Live(latest)
            }
            _ => FrameView::Nothing,
        }
    }

    pub fn stop(&mut self) {
        if self.phase != StartupPhase::Stopped {
            info!("{} receiver stopped after {} ticks", self.family, self.received);
            self.phase = StartupPhase::Stopped;
        }
    }

    pub fn reset(&mut self) {
        self.phase = StartupPhase::AwaitingFirst;
        self.first = None;
        self.latest = None;
        self.announced = 0;
        self.digit = None;
        self.received = 0;
    }
}
