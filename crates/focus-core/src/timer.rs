//! Countdown timer state machine
//!
//! The remaining time is never decremented per tick. Every recompute derives
//! it from the absolute start instant and the accumulated pause buffer:
//!
//! ```text
//! remaining = target - (now - start - pause_buffer)
//! ```
//!
//! so late or skipped ticks (or a suspended process) cannot make the
//! countdown drift. Pausing does not stop anything; the paused span is added
//! to the buffer on unpause and thereby excluded from elapsed time.

use chrono::{DateTime, Local};
use focus_api::{ContextPatch, TimerCommand, TimerNotice, TimerPhase, TimerSnapshot};
use focus_util::{Clock, TimerId, seconds_between};
use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use crate::chart::{Behavior, Chart, Transition};

/// Lookup key for timer commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Start,
    Tick,
    Pause,
    Unpause,
    Increment,
    Decrement,
    Stop,
    OverrideState,
}

#[derive(Debug, Clone, Copy)]
pub enum TimerGuard {
    /// Elapsed time is past the target
    Overdue,
    /// Elapsed time is at or before the target
    OnTime,
}

#[derive(Debug, Clone, Copy)]
pub enum TimerAction {
    Reset,
    BeginCountdown,
    Recompute,
    RaiseTick,
    ExtendTarget,
    ExtendFromElapsed,
    ShortenTarget,
    NotifyEnded,
    NotifyReversed,
    MarkPauseStart,
    ReleasePause,
    IgnoreOverride,
}

/// Mutable timer fields
#[derive(Debug, Clone, PartialEq)]
pub struct TimerContext {
    pub start_date: DateTime<Local>,
    pub target_duration_secs: u64,
    pub seconds_remaining: i64,
    pub pause_buffer_secs: f64,
    pub pause_started_at: Option<DateTime<Local>>,
}

impl TimerContext {
    fn zeroed(now: DateTime<Local>) -> Self {
        Self {
            start_date: now,
            target_duration_secs: 0,
            seconds_remaining: 0,
            pause_buffer_secs: 0.0,
            pause_started_at: None,
        }
    }

    /// Seconds counted against the target at `now`
    pub fn elapsed_secs(&self, now: DateTime<Local>) -> f64 {
        seconds_between(self.start_date, now) - self.pause_buffer_secs
    }

    /// Remaining seconds at `now`, rounded to the nearest second
    pub fn remaining_at(&self, now: DateTime<Local>) -> i64 {
        (self.target_duration_secs as f64 - self.elapsed_secs(now)).round() as i64
    }
}

type TimerChart = Chart<TimerPhase, TimerKind, TimerGuard, TimerAction>;

fn timer_chart() -> &'static TimerChart {
    static CHART: OnceLock<TimerChart> = OnceLock::new();
    CHART.get_or_init(build_chart)
}

fn build_chart() -> TimerChart {
    use TimerAction as A;
    use TimerKind as K;
    use TimerPhase as S;

    Chart::new(S::Idle, TimerPhase::ALL)
        .entry(S::Idle, [A::Reset])
        .on(S::Idle, K::Start, [Transition::to(S::Running).with([A::BeginCountdown])])
        .ignore(S::Idle, K::Tick)
        .on(S::Running, K::Pause, [Transition::to(S::Paused)])
        .always(S::Running, [Transition::to(S::Overflowed).when(TimerGuard::Overdue)])
        .entry(S::Overflowed, [A::NotifyEnded])
        .on(
            S::Overflowed,
            K::Increment,
            [Transition::stay().with([A::ExtendFromElapsed, A::RaiseTick])],
        )
        .on(S::Overflowed, K::Pause, [Transition::to(S::Paused)])
        .always(
            S::Overflowed,
            [Transition::to(S::Running)
                .when(TimerGuard::OnTime)
                .with([A::NotifyReversed])],
        )
        .entry(S::Paused, [A::MarkPauseStart])
        .ignore(S::Paused, K::Pause)
        .on(
            S::Paused,
            K::Unpause,
            [Transition::to(S::Running).with([A::ReleasePause])],
        )
        .global(K::Stop, [Transition::to(S::Idle)])
        .global(K::Tick, [Transition::stay().with([A::Recompute])])
        .global(
            K::Increment,
            [Transition::stay().with([A::ExtendTarget, A::RaiseTick])],
        )
        .global(
            K::Decrement,
            [Transition::stay().with([A::ShortenTarget, A::RaiseTick])],
        )
        .global(
            K::OverrideState,
            [Transition::stay().with([A::IgnoreOverride])],
        )
}

/// Everything the chart's actions touch
#[derive(Debug)]
struct TimerCore {
    id: TimerId,
    clock: Arc<dyn Clock>,
    ctx: TimerContext,
    raised: VecDeque<TimerCommand>,
    outbox: Vec<TimerNotice>,
}

impl TimerCore {
    fn recompute(&mut self, now: DateTime<Local>) {
        self.ctx.seconds_remaining = self.ctx.remaining_at(now);
    }
}

impl Behavior for TimerCore {
    type State = TimerPhase;
    type Kind = TimerKind;
    type Guard = TimerGuard;
    type Action = TimerAction;
    type Event = TimerCommand;

    fn kind(event: &TimerCommand) -> TimerKind {
        match event {
            TimerCommand::Start { .. } => TimerKind::Start,
            TimerCommand::Tick => TimerKind::Tick,
            TimerCommand::Pause => TimerKind::Pause,
            TimerCommand::Unpause { .. } => TimerKind::Unpause,
            TimerCommand::Increment { .. } => TimerKind::Increment,
            TimerCommand::Decrement { .. } => TimerKind::Decrement,
            TimerCommand::Stop => TimerKind::Stop,
            TimerCommand::OverrideState { .. } => TimerKind::OverrideState,
        }
    }

    fn check(&self, guard: TimerGuard, _event: &TimerCommand) -> bool {
        match guard {
            TimerGuard::Overdue => self.ctx.seconds_remaining < 0,
            TimerGuard::OnTime => self.ctx.seconds_remaining >= 0,
        }
    }

    fn perform(&mut self, action: TimerAction, event: &TimerCommand) {
        let now = self.clock.now();

        match action {
            TimerAction::Reset => {
                self.ctx = TimerContext::zeroed(now);
            }
            TimerAction::BeginCountdown => {
                if let TimerCommand::Start { duration_secs } = event {
                    self.ctx = TimerContext {
                        start_date: now,
                        target_duration_secs: *duration_secs,
                        seconds_remaining: i64::try_from(*duration_secs).unwrap_or(i64::MAX),
                        pause_buffer_secs: 0.0,
                        pause_started_at: None,
                    };
                    info!(
                        timer_id = %self.id,
                        duration_secs = *duration_secs,
                        "Countdown started"
                    );
                }
            }
            TimerAction::Recompute => self.recompute(now),
            TimerAction::RaiseTick => self.raised.push_back(TimerCommand::Tick),
            TimerAction::ExtendTarget => {
                if let TimerCommand::Increment { seconds } = event {
                    self.ctx.target_duration_secs =
                        self.ctx.target_duration_secs.saturating_add(*seconds);
                }
            }
            TimerAction::ExtendFromElapsed => {
                if let TimerCommand::Increment { seconds } = event {
                    let elapsed = self.ctx.elapsed_secs(now).max(0.0).round() as u64;
                    self.ctx.target_duration_secs = elapsed.saturating_add(*seconds);
                }
            }
            TimerAction::ShortenTarget => {
                if let TimerCommand::Decrement { seconds } = event {
                    self.ctx.target_duration_secs =
                        self.ctx.target_duration_secs.saturating_sub(*seconds);
                }
            }
            TimerAction::NotifyEnded => {
                info!(timer_id = %self.id, "Timer overflowed");
                self.outbox.push(TimerNotice::TimerEnded);
            }
            TimerAction::NotifyReversed => {
                info!(timer_id = %self.id, "Timer overflow reversed");
                self.outbox.push(TimerNotice::OverflowReversed);
            }
            TimerAction::MarkPauseStart => {
                self.ctx.pause_started_at = Some(now);
                self.outbox.push(TimerNotice::OverrideState {
                    patch: ContextPatch::pause_marker(now),
                });
            }
            TimerAction::ReleasePause => {
                let started = self.ctx.pause_started_at.take().unwrap_or(now);
                let paused_for = seconds_between(started, now).max(0.0);
                self.ctx.pause_buffer_secs += paused_for;
                self.recompute(now);

                let next_target = match event {
                    TimerCommand::Unpause { next_target } => *next_target,
                    _ => None,
                };

                debug!(
                    timer_id = %self.id,
                    paused_secs = paused_for,
                    pause_buffer_secs = self.ctx.pause_buffer_secs,
                    "Pause released"
                );

                self.outbox
                    .push(TimerNotice::record_pause(started, now, next_target));
            }
            TimerAction::IgnoreOverride => {
                debug!(timer_id = %self.id, command = ?event, "Timer state override ignored");
            }
        }
    }
}

/// A single countdown.
///
/// Commands go in through [`TimerMachine::send`]; notices for the owner come
/// back out. The machine itself never schedules anything, so whoever owns it
/// decides how ticks are delivered.
#[derive(Debug)]
pub struct TimerMachine {
    state: TimerPhase,
    core: TimerCore,
}

impl TimerMachine {
    pub fn new(id: TimerId, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            state: timer_chart().initial(),
            core: TimerCore {
                id,
                clock,
                ctx: TimerContext::zeroed(now),
                raised: VecDeque::new(),
                outbox: Vec::new(),
            },
        }
    }

    pub fn id(&self) -> TimerId {
        self.core.id
    }

    pub fn state(&self) -> TimerPhase {
        self.state
    }

    pub fn context(&self) -> &TimerContext {
        &self.core.ctx
    }

    /// Process one command and any ticks it raises; returns notices for the owner
    pub fn send(&mut self, command: TimerCommand) -> Vec<TimerNotice> {
        let chart = timer_chart();
        let mut next = Some(command);

        while let Some(command) = next {
            let step = chart.step(&mut self.state, &mut self.core, &command);
            if step.changed() {
                debug!(
                    timer_id = %self.core.id,
                    from = %step.from,
                    to = %step.to,
                    "Timer transition"
                );
            }
            next = self.core.raised.pop_front();
        }

        std::mem::take(&mut self.core.outbox)
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        let ctx = &self.core.ctx;
        let elapsed = match self.state {
            TimerPhase::Idle => 0.0,
            _ => ctx.elapsed_secs(self.core.clock.now()),
        };

        TimerSnapshot {
            timer_id: self.core.id,
            state: self.state,
            start_date: ctx.start_date,
            target_duration_secs: ctx.target_duration_secs,
            seconds_remaining: ctx.seconds_remaining,
            elapsed_secs: elapsed,
            pause_buffer_secs: ctx.pause_buffer_secs,
            pause_started_at: ctx.pause_started_at,
        }
    }
}
