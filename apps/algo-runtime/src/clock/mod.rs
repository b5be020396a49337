//! Tick sources for the execution loop.
//!
//! Two variants behind one interface: a deterministic clock that replays a
//! precomputed schedule with no real-time waiting (backtests, tests), and a
//! wall clock that fires at a fixed interval until externally stopped. The
//! wall clock can carry an observer that sees each tick's freshly built
//! stats before the loop moves on.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::time::{Interval, MissedTickBehavior};

use crate::stats::PeriodStats;

/// Callback invoked with each tick's stats record (live mode only).
pub type StatsObserver = Box<dyn Fn(&PeriodStats) + Send + Sync>;

/// Deterministic tick source backed by a precomputed schedule.
///
/// `next` pops the schedule front immediately; the source is exhausted when
/// the schedule is.
#[derive(Debug, Clone)]
pub struct SimClock {
    schedule: VecDeque<DateTime<Utc>>,
}

impl SimClock {
    /// Replay an explicit list of tick timestamps.
    #[must_use]
    pub fn from_ticks(ticks: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        Self {
            schedule: ticks.into_iter().collect(),
        }
    }

    /// Generate ticks every `step` over `[start, end)`.
    ///
    /// A non-positive `step` yields an empty schedule; the schedule could
    /// never advance through the window.
    #[must_use]
    pub fn from_sessions(start: DateTime<Utc>, end: DateTime<Utc>, step: ChronoDuration) -> Self {
        let mut schedule = VecDeque::new();
        if step <= ChronoDuration::zero() {
            return Self { schedule };
        }
        let mut cursor = start;
        while cursor < end {
            schedule.push_back(cursor);
            cursor += step;
        }
        Self { schedule }
    }

    /// Ticks left on the schedule.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.schedule.len()
    }
}

/// Wall-clock tick source firing at a fixed interval, forever.
pub struct WallClock {
    interval: Interval,
    observer: Option<StatsObserver>,
}

impl WallClock {
    /// Tick every `period` of real time.
    ///
    /// Ticks missed while the loop was busy are delayed, not bursted, so
    /// the strategy never sees two ticks back to back.
    #[must_use]
    pub fn new(period: std::time::Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            observer: None,
        }
    }

    /// Attach an observer that sees each tick's stats record.
    #[must_use]
    pub fn with_observer(mut self, observer: StatsObserver) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl fmt::Debug for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WallClock")
            .field("has_observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

/// The loop's tick source, selected once at startup.
#[derive(Debug)]
pub enum ClockSource {
    /// Deterministic schedule, exhausts.
    Sim(SimClock),
    /// Real-time interval, runs until stopped.
    Wall(WallClock),
}

impl ClockSource {
    /// Wait for the next tick.
    ///
    /// Returns `None` only when a deterministic schedule is exhausted; a
    /// wall clock never returns `None`.
    pub async fn next(&mut self) -> Option<DateTime<Utc>> {
        match self {
            Self::Sim(clock) => clock.schedule.pop_front(),
            Self::Wall(clock) => {
                clock.interval.tick().await;
                Some(Utc::now())
            }
        }
    }

    /// Hand the tick's stats record to the observer, if one is attached.
    pub fn observe(&self, stats: &PeriodStats) {
        if let Self::Wall(clock) = self {
            if let Some(observer) = &clock.observer {
                observer(stats);
            }
        }
    }
}
