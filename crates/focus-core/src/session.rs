//! Session orchestrator state machine
//!
//! The orchestrator owns at most one timer at a time and is the only writer
//! of the period history. It never touches a timer directly: spawning,
//! disposing and commanding timers are emitted as [`SessionEffect`]s for the
//! runtime to carry out, and the timer's replies come back in as
//! [`TimerNotice`]s addressed by [`TimerId`].
//!
//! Pauses use a two-phase handoff. The orchestrator asks the timer to pause
//! but does not timestamp anything itself; on unpause the timer reports the
//! exact interval back via `RecordPause`, optionally echoing a follow-up
//! target (`idle` or `rest`) that the orchestrator attached when it asked.

use chrono::{DateTime, Local};
use focus_api::{
    API_VERSION, Command, ContextPatch, EventPayload, NextTarget, PauseInterval, PeriodKind,
    PeriodRecord, SessionPhase, SessionSnapshot, TimerCommand, TimerNotice, TimerSnapshot,
};
use focus_config::Settings;
use focus_util::{Clock, TimerId};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info};

use crate::chart::{Behavior, Chart, Transition};

/// Input to the orchestrator with all durations resolved
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    InitFocus { duration_secs: u64 },
    TakeABreak { duration_secs: u64 },
    /// The breathing delay scheduled for `epoch` ran out
    BreatheElapsed { epoch: u64 },
    StopWorking,
    CompleteTask,
    Pause,
    Unpause,
    Increment { seconds: u64 },
    Decrement { seconds: u64 },
    AbandonSession,
    OverrideState { patch: ContextPatch },
    TimerEnded,
    OverflowReversed,
    RecordPause {
        start: DateTime<Local>,
        end: DateTime<Local>,
        next_target: Option<NextTarget>,
    },
}

impl SessionEvent {
    /// Translate a wire command, filling missing durations from settings.
    ///
    /// Returns `None` for commands that are not state machine events.
    pub fn from_command(command: Command, settings: &Settings) -> Option<Self> {
        let event = match command {
            Command::InitFocus { duration_secs } => SessionEvent::InitFocus {
                duration_secs: duration_secs.unwrap_or(settings.defaults.focus_secs),
            },
            Command::TakeABreak { duration_secs } => SessionEvent::TakeABreak {
                duration_secs: duration_secs.unwrap_or(settings.defaults.rest_secs),
            },
            Command::StopWorking => SessionEvent::StopWorking,
            Command::CompleteTask => SessionEvent::CompleteTask,
            Command::Pause => SessionEvent::Pause,
            Command::Unpause => SessionEvent::Unpause,
            Command::Increment { seconds } => SessionEvent::Increment { seconds },
            Command::Decrement { seconds } => SessionEvent::Decrement { seconds },
            Command::AbandonSession => SessionEvent::AbandonSession,
            Command::OverrideState { patch } => SessionEvent::OverrideState { patch },
            Command::GetState => return None,
        };
        Some(event)
    }
}

impl From<TimerNotice> for SessionEvent {
    fn from(notice: TimerNotice) -> Self {
        match notice {
            TimerNotice::TimerEnded => SessionEvent::TimerEnded,
            TimerNotice::OverflowReversed => SessionEvent::OverflowReversed,
            TimerNotice::OverrideState { patch } => SessionEvent::OverrideState { patch },
            TimerNotice::RecordPause {
                start,
                end,
                next_target,
            } => SessionEvent::RecordPause {
                start,
                end,
                next_target,
            },
        }
    }
}

/// Side effects for the runtime to carry out, in order
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    /// Create a timer with this id. A `SendTimer` with its start command follows.
    SpawnTimer { timer_id: TimerId, duration_secs: u64 },
    /// Cancel the timer's tick and drop its mailbox
    DisposeTimer { timer_id: TimerId },
    SendTimer {
        timer_id: TimerId,
        command: TimerCommand,
    },
    /// Deliver `BreatheElapsed { epoch }` after `delay`
    ScheduleBreathe { epoch: u64, delay: Duration },
    StateChanged { from: SessionPhase, to: SessionPhase },
    Committed(PeriodRecord),
    PauseRecorded(PauseInterval),
}

impl SessionEffect {
    /// What subscribers get told about this effect, if anything
    pub fn event_payload(&self) -> Option<EventPayload> {
        let payload = match self {
            SessionEffect::SpawnTimer {
                timer_id,
                duration_secs,
            } => EventPayload::TimerSpawned {
                timer_id: *timer_id,
                duration_secs: *duration_secs,
            },
            SessionEffect::DisposeTimer { timer_id } => EventPayload::TimerDisposed {
                timer_id: *timer_id,
            },
            SessionEffect::StateChanged { from, to } => EventPayload::StateChanged {
                from: *from,
                to: *to,
            },
            SessionEffect::Committed(record) => EventPayload::PeriodCommitted(record.clone()),
            SessionEffect::PauseRecorded(interval) => {
                EventPayload::PauseRecorded(interval.clone())
            }
            SessionEffect::SendTimer { .. } | SessionEffect::ScheduleBreathe { .. } => {
                return None;
            }
        };
        Some(payload)
    }
}

/// Lookup key for session events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    InitFocus,
    TakeABreak,
    BreatheElapsed,
    StopWorking,
    CompleteTask,
    Pause,
    Unpause,
    Increment,
    Decrement,
    AbandonSession,
    OverrideState,
    TimerEnded,
    OverflowReversed,
    RecordPause,
}

#[derive(Debug, Clone, Copy)]
pub enum SessionGuard {
    /// The breathing delay belongs to the current breathe
    CurrentBreathe,
    ToIdle,
    ToRest,
}

#[derive(Debug, Clone, Copy)]
pub enum SessionAction {
    SpawnTimer,
    DisposeTimer,
    Commit(PeriodKind),
    ResetForIdle,
    ScheduleBreathe,
    ForwardPause,
    ForwardUnpause,
    ForwardUnpauseToIdle,
    ForwardUnpauseToRest,
    ForwardAdjust,
    MergePatch,
    AppendPause,
}

/// Orchestrator-owned data
#[derive(Debug, Clone)]
pub struct SessionContext {
    active_timer: Option<TimerId>,
    history: Vec<PeriodRecord>,
    current_period_start: DateTime<Local>,
    pending_pause_marker: Option<DateTime<Local>>,
    accumulated_pauses: Vec<PauseInterval>,
    title: String,
}

impl SessionContext {
    fn new(now: DateTime<Local>) -> Self {
        Self {
            active_timer: None,
            history: Vec::new(),
            current_period_start: now,
            pending_pause_marker: None,
            accumulated_pauses: Vec::new(),
            title: String::new(),
        }
    }

    pub fn active_timer(&self) -> Option<TimerId> {
        self.active_timer
    }

    /// Committed periods, oldest first
    pub fn history(&self) -> &[PeriodRecord] {
        &self.history
    }

    pub fn current_period_start(&self) -> DateTime<Local> {
        self.current_period_start
    }

    pub fn pending_pause_marker(&self) -> Option<DateTime<Local>> {
        self.pending_pause_marker
    }

    pub fn accumulated_pauses(&self) -> &[PauseInterval] {
        &self.accumulated_pauses
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

/// Knobs the orchestrator needs from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub breathe_delay: Duration,
    /// Duration for timers spawned by an event that carries none
    pub fallback_duration_secs: u64,
}

impl SessionOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            breathe_delay: settings.timing.breathe_delay,
            fallback_duration_secs: settings.timing.fallback_duration_secs,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

type SessionChart = Chart<SessionPhase, SessionKind, SessionGuard, SessionAction>;

fn session_chart() -> &'static SessionChart {
    static CHART: OnceLock<SessionChart> = OnceLock::new();
    CHART.get_or_init(build_chart)
}

fn build_chart() -> SessionChart {
    use SessionAction as A;
    use SessionKind as K;
    use SessionPhase as S;

    let commit_and_respawn = |kind| [A::Commit(kind), A::DisposeTimer, A::SpawnTimer];

    Chart::new(S::Idle, SessionPhase::ALL)
        // Idle
        .entry(S::Idle, [A::ResetForIdle])
        .on(S::Idle, K::TakeABreak, [Transition::to(S::Rest).with([A::SpawnTimer])])
        .on(S::Idle, K::InitFocus, [Transition::to(S::Breathe).with([A::SpawnTimer])])
        // Breathe
        .entry(S::Breathe, [A::ScheduleBreathe])
        .on(
            S::Breathe,
            K::BreatheElapsed,
            [Transition::to(S::Session).when(SessionGuard::CurrentBreathe)],
        )
        .on(S::Breathe, K::AbandonSession, [Transition::to(S::Idle)])
        // Session
        .on(
            S::Session,
            K::StopWorking,
            [Transition::to(S::Idle).with([A::Commit(PeriodKind::Focus)])],
        )
        .on(
            S::Session,
            K::TakeABreak,
            [Transition::to(S::Rest).with(commit_and_respawn(PeriodKind::Focus))],
        )
        .on(S::Session, K::Pause, [Transition::to(S::SessionPaused)])
        .on(S::Session, K::TimerEnded, [Transition::to(S::SessionEnd)])
        // SessionPaused: leaving is deferred until the timer reports the pause
        .entry(S::SessionPaused, [A::ForwardPause])
        .on(
            S::SessionPaused,
            K::StopWorking,
            [Transition::stay().with([A::ForwardUnpauseToIdle])],
        )
        .on(
            S::SessionPaused,
            K::TakeABreak,
            [Transition::stay().with([A::ForwardUnpauseToRest])],
        )
        .on(
            S::SessionPaused,
            K::Unpause,
            [Transition::to(S::Session).with([A::ForwardUnpause])],
        )
        // SessionEnd
        .on(
            S::SessionEnd,
            K::StopWorking,
            [Transition::to(S::Idle).with([A::Commit(PeriodKind::Focus)])],
        )
        .on(
            S::SessionEnd,
            K::TakeABreak,
            [Transition::to(S::Rest).with(commit_and_respawn(PeriodKind::Focus))],
        )
        .on(S::SessionEnd, K::CompleteTask, [Transition::to(S::Rest)])
        .on(S::SessionEnd, K::OverflowReversed, [Transition::to(S::Session)])
        .on(S::SessionEnd, K::Pause, [Transition::to(S::SessionPaused)])
        // Rest
        .on(
            S::Rest,
            K::StopWorking,
            [Transition::to(S::Idle).with([A::Commit(PeriodKind::Rest)])],
        )
        .on(
            S::Rest,
            K::InitFocus,
            [Transition::to(S::Breathe).with(commit_and_respawn(PeriodKind::Rest))],
        )
        .on(S::Rest, K::TimerEnded, [Transition::to(S::RestEnd)])
        // RestEnd
        .on(
            S::RestEnd,
            K::TimerEnded,
            [Transition::to(S::Idle).with([A::Commit(PeriodKind::Rest)])],
        )
        // Global
        .global(K::AbandonSession, [Transition::to(S::Idle)])
        .global(K::Increment, [Transition::stay().with([A::ForwardAdjust])])
        .global(K::Decrement, [Transition::stay().with([A::ForwardAdjust])])
        .global(K::OverrideState, [Transition::stay().with([A::MergePatch])])
        .global(
            K::RecordPause,
            [
                Transition::to(S::Idle)
                    .when(SessionGuard::ToIdle)
                    .with([A::AppendPause])
                    .with(commit_and_respawn(PeriodKind::Focus)),
                Transition::to(S::Rest)
                    .when(SessionGuard::ToRest)
                    .with([A::AppendPause])
                    .with(commit_and_respawn(PeriodKind::Focus)),
                Transition::stay().with([A::AppendPause]),
            ],
        )
}

/// Everything the chart's actions touch
#[derive(Debug)]
struct SessionCore {
    clock: Arc<dyn Clock>,
    options: SessionOptions,
    ctx: SessionContext,
    breathe_epoch: u64,
    effects: Vec<SessionEffect>,
}

impl SessionCore {
    fn send_timer(&mut self, command: TimerCommand) {
        match self.ctx.active_timer {
            Some(timer_id) => self.effects.push(SessionEffect::SendTimer { timer_id, command }),
            None => debug!(command = ?command, "No live timer, command dropped"),
        }
    }

    fn dispose_timer(&mut self) {
        if let Some(timer_id) = self.ctx.active_timer.take() {
            info!(timer_id = %timer_id, "Disposing timer");
            self.effects.push(SessionEffect::DisposeTimer { timer_id });
        }
    }

    fn spawn_timer(&mut self, duration_secs: u64) {
        // Only one timer may be live; a replacement always follows disposal.
        self.dispose_timer();

        let timer_id = TimerId::new();
        self.ctx.active_timer = Some(timer_id);
        self.ctx.current_period_start = self.clock.now();

        info!(timer_id = %timer_id, duration_secs, "Spawning timer");

        self.effects.push(SessionEffect::SpawnTimer {
            timer_id,
            duration_secs,
        });
        self.effects.push(SessionEffect::SendTimer {
            timer_id,
            command: TimerCommand::Start { duration_secs },
        });
    }

    fn commit(&mut self, kind: PeriodKind) {
        let start = self.ctx.current_period_start;
        let end = self.clock.now().max(start);
        let record = PeriodRecord {
            kind,
            title: self.ctx.title.clone(),
            note: String::new(),
            project_id: String::new(),
            start,
            end,
            pauses: std::mem::take(&mut self.ctx.accumulated_pauses),
        };

        info!(
            kind = ?kind,
            duration_secs = record.duration_secs(),
            pauses = record.pauses.len(),
            history_len = self.ctx.history.len() + 1,
            "Period committed"
        );

        self.ctx.history.push(record.clone());
        self.effects.push(SessionEffect::Committed(record));
    }

    /// Duration for a spawn triggered by `event`
    fn spawn_duration(&self, event: &SessionEvent) -> u64 {
        match event {
            SessionEvent::InitFocus { duration_secs }
            | SessionEvent::TakeABreak { duration_secs } => *duration_secs,
            SessionEvent::RecordPause {
                next_target: Some(NextTarget::Rest { duration_secs }),
                ..
            } => *duration_secs,
            _ => self.options.fallback_duration_secs,
        }
    }
}

impl Behavior for SessionCore {
    type State = SessionPhase;
    type Kind = SessionKind;
    type Guard = SessionGuard;
    type Action = SessionAction;
    type Event = SessionEvent;

    fn kind(event: &SessionEvent) -> SessionKind {
        match event {
            SessionEvent::InitFocus { .. } => SessionKind::InitFocus,
            SessionEvent::TakeABreak { .. } => SessionKind::TakeABreak,
            SessionEvent::BreatheElapsed { .. } => SessionKind::BreatheElapsed,
            SessionEvent::StopWorking => SessionKind::StopWorking,
            SessionEvent::CompleteTask => SessionKind::CompleteTask,
            SessionEvent::Pause => SessionKind::Pause,
            SessionEvent::Unpause => SessionKind::Unpause,
            SessionEvent::Increment { .. } => SessionKind::Increment,
            SessionEvent::Decrement { .. } => SessionKind::Decrement,
            SessionEvent::AbandonSession => SessionKind::AbandonSession,
            SessionEvent::OverrideState { .. } => SessionKind::OverrideState,
            SessionEvent::TimerEnded => SessionKind::TimerEnded,
            SessionEvent::OverflowReversed => SessionKind::OverflowReversed,
            SessionEvent::RecordPause { .. } => SessionKind::RecordPause,
        }
    }

    fn check(&self, guard: SessionGuard, event: &SessionEvent) -> bool {
        match (guard, event) {
            (SessionGuard::CurrentBreathe, SessionEvent::BreatheElapsed { epoch }) => {
                *epoch == self.breathe_epoch
            }
            (
                SessionGuard::ToIdle,
                SessionEvent::RecordPause {
                    next_target: Some(NextTarget::Idle),
                    ..
                },
            ) => true,
            (
                SessionGuard::ToRest,
                SessionEvent::RecordPause {
                    next_target: Some(NextTarget::Rest { .. }),
                    ..
                },
            ) => true,
            _ => false,
        }
    }

    fn perform(&mut self, action: SessionAction, event: &SessionEvent) {
        match action {
            SessionAction::SpawnTimer => {
                let duration_secs = self.spawn_duration(event);
                self.spawn_timer(duration_secs);
            }
            SessionAction::DisposeTimer => self.dispose_timer(),
            SessionAction::Commit(kind) => self.commit(kind),
            SessionAction::ResetForIdle => {
                self.dispose_timer();
                self.ctx.title.clear();
                self.ctx.accumulated_pauses.clear();
            }
            SessionAction::ScheduleBreathe => {
                self.breathe_epoch += 1;
                self.effects.push(SessionEffect::ScheduleBreathe {
                    epoch: self.breathe_epoch,
                    delay: self.options.breathe_delay,
                });
            }
            SessionAction::ForwardPause => self.send_timer(TimerCommand::Pause),
            SessionAction::ForwardUnpause => {
                self.send_timer(TimerCommand::Unpause { next_target: None })
            }
            SessionAction::ForwardUnpauseToIdle => self.send_timer(TimerCommand::Unpause {
                next_target: Some(NextTarget::Idle),
            }),
            SessionAction::ForwardUnpauseToRest => {
                let duration_secs = self.spawn_duration(event);
                self.send_timer(TimerCommand::Unpause {
                    next_target: Some(NextTarget::Rest { duration_secs }),
                });
            }
            SessionAction::ForwardAdjust => match event {
                SessionEvent::Increment { seconds } => {
                    self.send_timer(TimerCommand::Increment { seconds: *seconds })
                }
                SessionEvent::Decrement { seconds } => {
                    self.send_timer(TimerCommand::Decrement { seconds: *seconds })
                }
                _ => {}
            },
            SessionAction::MergePatch => {
                if let SessionEvent::OverrideState { patch } = event {
                    if patch.is_empty() {
                        debug!("Empty context patch ignored");
                        return;
                    }
                    if let Some(title) = &patch.title {
                        self.ctx.title = title.clone();
                    }
                    if let Some(marker) = patch.pending_pause_marker {
                        self.ctx.pending_pause_marker = Some(marker);
                    }
                }
            }
            SessionAction::AppendPause => {
                if let SessionEvent::RecordPause { start, end, .. } = event {
                    let interval = PauseInterval::new(*start, *end);
                    debug!(
                        paused_secs = interval.duration_secs(),
                        accumulated = self.ctx.accumulated_pauses.len() + 1,
                        "Pause recorded"
                    );
                    self.ctx.accumulated_pauses.push(interval.clone());
                    self.effects.push(SessionEffect::PauseRecorded(interval));
                }
            }
        }
    }
}

/// The session orchestrator
#[derive(Debug)]
pub struct SessionMachine {
    state: SessionPhase,
    core: SessionCore,
}

impl SessionMachine {
    pub fn new(clock: Arc<dyn Clock>, options: SessionOptions) -> Self {
        let now = clock.now();
        Self {
            state: session_chart().initial(),
            core: SessionCore {
                clock,
                options,
                ctx: SessionContext::new(now),
                breathe_epoch: 0,
                effects: Vec::new(),
            },
        }
    }

    pub fn state(&self) -> SessionPhase {
        self.state
    }

    pub fn context(&self) -> &SessionContext {
        &self.core.ctx
    }

    /// Process one event and return the effects it produced
    pub fn send(&mut self, event: SessionEvent) -> Vec<SessionEffect> {
        let step = session_chart().step(&mut self.state, &mut self.core, &event);

        if step.changed() {
            debug!(from = %step.from, to = %step.to, "Session transition");
            self.core.effects.push(SessionEffect::StateChanged {
                from: step.from,
                to: step.to,
            });
        }

        std::mem::take(&mut self.core.effects)
    }

    /// Deliver a notice from a timer.
    ///
    /// Notices from anything but the live timer are dropped; a disposed
    /// timer may still have had messages in flight.
    pub fn notify(&mut self, from: TimerId, notice: TimerNotice) -> Vec<SessionEffect> {
        if self.core.ctx.active_timer != Some(from) {
            debug!(timer_id = %from, notice = ?notice, "Notice from stale timer dropped");
            return Vec::new();
        }
        self.send(notice.into())
    }

    /// Read-only view; `timer` is the live timer's snapshot if the caller has one
    pub fn snapshot(&self, timer: Option<TimerSnapshot>) -> SessionSnapshot {
        let ctx = &self.core.ctx;
        SessionSnapshot {
            api_version: API_VERSION,
            state: self.state,
            active_timer: ctx.active_timer,
            history: ctx.history.clone(),
            current_period_start: ctx.current_period_start,
            pending_pause_marker: ctx.pending_pause_marker,
            accumulated_pauses: ctx.accumulated_pauses.clone(),
            title: ctx.title.clone(),
            timer: timer.filter(|t| Some(t.timer_id) == ctx.active_timer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use focus_util::ManualClock;

    fn machine() -> (SessionMachine, ManualClock) {
        let clock = ManualClock::starting_now();
        let machine = SessionMachine::new(Arc::new(clock.clone()), SessionOptions::default());
        (machine, clock)
    }

    fn spawned(effects: &[SessionEffect]) -> Vec<(TimerId, u64)> {
        effects
            .iter()
            .filter_map(|e| match e {
                SessionEffect::SpawnTimer {
                    timer_id,
                    duration_secs,
                } => Some((*timer_id, *duration_secs)),
                _ => None,
            })
            .collect()
    }

    fn disposed(effects: &[SessionEffect]) -> Vec<TimerId> {
        effects
            .iter()
            .filter_map(|e| match e {
                SessionEffect::DisposeTimer { timer_id } => Some(*timer_id),
                _ => None,
            })
            .collect()
    }

    fn sent(effects: &[SessionEffect]) -> Vec<TimerCommand> {
        effects
            .iter()
            .filter_map(|e| match e {
                SessionEffect::SendTimer { command, .. } => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// Drive the machine into `Session` and return the live timer
    fn in_session(machine: &mut SessionMachine) -> TimerId {
        machine.send(SessionEvent::InitFocus {
            duration_secs: 1500,
        });
        machine.send(SessionEvent::BreatheElapsed { epoch: 1 });
        assert_eq!(machine.state(), SessionPhase::Session);
        machine.context().active_timer().unwrap()
    }

    #[test]
    fn init_focus_spawns_and_breathes() {
        let (mut machine, _clock) = machine();

        let effects = machine.send(SessionEvent::InitFocus {
            duration_secs: 1500,
        });

        assert_eq!(machine.state(), SessionPhase::Breathe);
        let spawns = spawned(&effects);
        assert_eq!(spawns.len(), 1);
        assert_eq!(spawns[0].1, 1500);
        assert_eq!(machine.context().active_timer(), Some(spawns[0].0));
        assert_eq!(sent(&effects), vec![TimerCommand::Start { duration_secs: 1500 }]);
        assert!(effects.contains(&SessionEffect::ScheduleBreathe {
            epoch: 1,
            delay: Duration::from_secs(1),
        }));
        assert!(effects.contains(&SessionEffect::StateChanged {
            from: SessionPhase::Idle,
            to: SessionPhase::Breathe,
        }));
    }

    #[test]
    fn stale_breathe_delay_is_ignored() {
        let (mut machine, _clock) = machine();

        machine.send(SessionEvent::InitFocus { duration_secs: 60 });
        machine.send(SessionEvent::AbandonSession);
        machine.send(SessionEvent::InitFocus { duration_secs: 60 });

        machine.send(SessionEvent::BreatheElapsed { epoch: 1 });
        assert_eq!(machine.state(), SessionPhase::Breathe);

        machine.send(SessionEvent::BreatheElapsed { epoch: 2 });
        assert_eq!(machine.state(), SessionPhase::Session);
    }

    #[test]
    fn stop_working_commits_focus() {
        let (mut machine, clock) = machine();
        machine.send(SessionEvent::OverrideState {
            patch: ContextPatch::title("draft chapter"),
        });
        let timer = in_session(&mut machine);

        clock.advance_secs(600);
        let effects = machine.send(SessionEvent::StopWorking);

        assert_eq!(machine.state(), SessionPhase::Idle);
        assert_eq!(disposed(&effects), vec![timer]);
        assert!(machine.context().active_timer().is_none());

        let history = machine.context().history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, PeriodKind::Focus);
        assert_eq!(history[0].title, "draft chapter");
        assert_eq!(history[0].note, "");
        assert_eq!(history[0].project_id, "");
        assert_eq!(history[0].duration_secs(), 600.0);

        // Idle entry clears the title
        assert_eq!(machine.context().title(), "");
    }

    #[test]
    fn pause_is_forwarded_on_entry() {
        let (mut machine, _clock) = machine();
        in_session(&mut machine);

        let effects = machine.send(SessionEvent::Pause);
        assert_eq!(machine.state(), SessionPhase::SessionPaused);
        assert_eq!(sent(&effects), vec![TimerCommand::Pause]);

        let effects = machine.send(SessionEvent::Unpause);
        assert_eq!(machine.state(), SessionPhase::Session);
        assert_eq!(sent(&effects), vec![TimerCommand::Unpause { next_target: None }]);
    }

    #[test]
    fn stop_while_paused_is_deferred() {
        let (mut machine, clock) = machine();
        let timer = in_session(&mut machine);
        machine.send(SessionEvent::Pause);

        let effects = machine.send(SessionEvent::StopWorking);
        assert_eq!(machine.state(), SessionPhase::SessionPaused);
        assert_eq!(
            sent(&effects),
            vec![TimerCommand::Unpause {
                next_target: Some(NextTarget::Idle)
            }]
        );
        assert!(machine.context().history().is_empty());

        let pause_start = clock.now();
        clock.advance_secs(20);
        let effects = machine.notify(
            timer,
            TimerNotice::record_pause(pause_start, clock.now(), Some(NextTarget::Idle)),
        );

        assert_eq!(machine.state(), SessionPhase::Idle);
        assert!(machine.context().active_timer().is_none());

        let history = machine.context().history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, PeriodKind::Focus);
        assert_eq!(history[0].pauses.len(), 1);
        assert_eq!(history[0].pauses[0].duration_secs(), 20.0);

        // The old timer is disposed, a fresh one spawned, then disposed by Idle
        let spawns = spawned(&effects);
        assert_eq!(spawns.len(), 1);
        assert_eq!(spawns[0].1, SessionOptions::default().fallback_duration_secs);
        assert_eq!(disposed(&effects), vec![timer, spawns[0].0]);
    }

    #[test]
    fn break_while_paused_keeps_requested_duration() {
        let (mut machine, clock) = machine();
        let timer = in_session(&mut machine);
        machine.send(SessionEvent::Pause);

        let effects = machine.send(SessionEvent::TakeABreak { duration_secs: 420 });
        let hint = Some(NextTarget::Rest { duration_secs: 420 });
        assert_eq!(
            sent(&effects),
            vec![TimerCommand::Unpause { next_target: hint }]
        );

        let start = clock.now();
        clock.advance_secs(5);
        let effects = machine.notify(timer, TimerNotice::record_pause(start, clock.now(), hint));

        assert_eq!(machine.state(), SessionPhase::Rest);
        let spawns = spawned(&effects);
        assert_eq!(spawns.len(), 1);
        assert_eq!(spawns[0].1, 420);
        assert_eq!(machine.context().active_timer(), Some(spawns[0].0));
        assert_eq!(machine.context().history().len(), 1);
        assert!(machine.context().accumulated_pauses().is_empty());
    }

    #[test]
    fn record_pause_without_target_only_appends() {
        let (mut machine, clock) = machine();
        let timer = in_session(&mut machine);

        let start = clock.now();
        clock.advance_secs(30);
        machine.notify(timer, TimerNotice::record_pause(start, clock.now(), None));

        assert_eq!(machine.state(), SessionPhase::Session);
        assert_eq!(machine.context().accumulated_pauses().len(), 1);
        assert!(machine.context().history().is_empty());
    }

    #[test]
    fn stale_timer_notices_are_dropped() {
        let (mut machine, _clock) = machine();
        in_session(&mut machine);

        let effects = machine.notify(TimerId::new(), TimerNotice::TimerEnded);
        assert!(effects.is_empty());
        assert_eq!(machine.state(), SessionPhase::Session);
    }

    #[test]
    fn timer_end_and_reversal() {
        let (mut machine, _clock) = machine();
        let timer = in_session(&mut machine);

        machine.notify(timer, TimerNotice::TimerEnded);
        assert_eq!(machine.state(), SessionPhase::SessionEnd);

        machine.notify(timer, TimerNotice::OverflowReversed);
        assert_eq!(machine.state(), SessionPhase::Session);
    }

    #[test]
    fn take_a_break_replaces_timer() {
        let (mut machine, _clock) = machine();
        let focus_timer = in_session(&mut machine);

        let effects = machine.send(SessionEvent::TakeABreak { duration_secs: 300 });

        assert_eq!(machine.state(), SessionPhase::Rest);
        assert_eq!(disposed(&effects), vec![focus_timer]);
        let spawns = spawned(&effects);
        assert_eq!(spawns.len(), 1);
        assert_eq!(spawns[0].1, 300);
        assert_eq!(machine.context().history().len(), 1);
        assert_eq!(machine.context().history()[0].kind, PeriodKind::Focus);

        // Dispose must come before the replacement spawn
        let dispose_at = effects
            .iter()
            .position(|e| matches!(e, SessionEffect::DisposeTimer { .. }))
            .unwrap();
        let spawn_at = effects
            .iter()
            .position(|e| matches!(e, SessionEffect::SpawnTimer { .. }))
            .unwrap();
        assert!(dispose_at < spawn_at);
    }

    #[test]
    fn rest_cycle_commits_rest() {
        let (mut machine, clock) = machine();
        machine.send(SessionEvent::TakeABreak { duration_secs: 300 });
        let rest_timer = machine.context().active_timer().unwrap();
        assert_eq!(machine.state(), SessionPhase::Rest);

        clock.advance_secs(301);
        machine.notify(rest_timer, TimerNotice::TimerEnded);
        assert_eq!(machine.state(), SessionPhase::RestEnd);

        // RestEnd only advances on a second TimerEnded
        machine.send(SessionEvent::StopWorking);
        assert_eq!(machine.state(), SessionPhase::RestEnd);

        machine.notify(rest_timer, TimerNotice::TimerEnded);
        assert_eq!(machine.state(), SessionPhase::Idle);
        let history = machine.context().history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, PeriodKind::Rest);
    }

    #[test]
    fn init_focus_from_rest_commits_rest_then_breathes() {
        let (mut machine, _clock) = machine();
        machine.send(SessionEvent::TakeABreak { duration_secs: 300 });
        let rest_timer = machine.context().active_timer().unwrap();

        let effects = machine.send(SessionEvent::InitFocus {
            duration_secs: 1200,
        });

        assert_eq!(machine.state(), SessionPhase::Breathe);
        assert_eq!(disposed(&effects), vec![rest_timer]);
        assert_eq!(spawned(&effects)[0].1, 1200);
        assert_eq!(machine.context().history()[0].kind, PeriodKind::Rest);
    }

    #[test]
    fn abandon_from_every_state_leaves_no_timer() {
        for target in SessionPhase::ALL {
            let (mut machine, clock) = machine();
            let start = clock.now();

            match target {
                SessionPhase::Idle => {}
                SessionPhase::Breathe => {
                    machine.send(SessionEvent::InitFocus { duration_secs: 60 });
                }
                SessionPhase::Session => {
                    in_session(&mut machine);
                }
                SessionPhase::SessionPaused => {
                    in_session(&mut machine);
                    machine.send(SessionEvent::Pause);
                }
                SessionPhase::SessionEnd => {
                    let timer = in_session(&mut machine);
                    machine.notify(timer, TimerNotice::TimerEnded);
                }
                SessionPhase::Rest => {
                    machine.send(SessionEvent::TakeABreak { duration_secs: 60 });
                }
                SessionPhase::RestEnd => {
                    machine.send(SessionEvent::TakeABreak { duration_secs: 60 });
                    let timer = machine.context().active_timer().unwrap();
                    machine.notify(timer, TimerNotice::TimerEnded);
                }
            }
            assert_eq!(machine.state(), target);

            let live = machine.context().active_timer();
            let effects = machine.send(SessionEvent::AbandonSession);

            assert_eq!(machine.state(), SessionPhase::Idle, "from {target}");
            assert!(machine.context().active_timer().is_none());
            assert!(machine.context().history().is_empty());
            if let Some(timer) = live {
                assert_eq!(disposed(&effects), vec![timer]);
            }
            assert!(machine.context().current_period_start() >= start);
        }
    }

    #[test]
    fn adjustments_forwarded_only_with_live_timer() {
        let (mut machine, _clock) = machine();

        let effects = machine.send(SessionEvent::Increment { seconds: 60 });
        assert!(effects.is_empty());

        let timer = in_session(&mut machine);
        let effects = machine.send(SessionEvent::Increment { seconds: 60 });
        assert_eq!(
            effects,
            vec![SessionEffect::SendTimer {
                timer_id: timer,
                command: TimerCommand::Increment { seconds: 60 }
            }]
        );

        let effects = machine.send(SessionEvent::Decrement { seconds: 30 });
        assert_eq!(sent(&effects), vec![TimerCommand::Decrement { seconds: 30 }]);
    }

    #[test]
    fn pause_marker_patch_is_merged() {
        let (mut machine, clock) = machine();
        let timer = in_session(&mut machine);

        let at = clock.now();
        machine.notify(
            timer,
            TimerNotice::OverrideState {
                patch: ContextPatch::pause_marker(at),
            },
        );

        assert_eq!(machine.context().pending_pause_marker(), Some(at));
        assert_eq!(machine.state(), SessionPhase::Session);
    }

    #[test]
    fn empty_patch_leaves_context_alone() {
        let (mut machine, clock) = machine();
        let timer = in_session(&mut machine);

        let at = clock.now();
        machine.send(SessionEvent::OverrideState {
            patch: ContextPatch::title("writing"),
        });
        machine.notify(
            timer,
            TimerNotice::OverrideState {
                patch: ContextPatch::pause_marker(at),
            },
        );

        machine.send(SessionEvent::OverrideState {
            patch: ContextPatch::default(),
        });

        assert_eq!(machine.context().title(), "writing");
        assert_eq!(machine.context().pending_pause_marker(), Some(at));
        assert_eq!(machine.state(), SessionPhase::Session);
    }

    #[test]
    fn complete_task_moves_to_rest_without_commit() {
        let (mut machine, _clock) = machine();
        let timer = in_session(&mut machine);
        machine.notify(timer, TimerNotice::TimerEnded);

        let effects = machine.send(SessionEvent::CompleteTask);
        assert_eq!(machine.state(), SessionPhase::Rest);
        assert!(machine.context().history().is_empty());
        assert!(spawned(&effects).is_empty());
        assert_eq!(machine.context().active_timer(), Some(timer));
    }

    #[test]
    fn undefined_pairs_are_noops() {
        let (mut machine, _clock) = machine();

        for event in [
            SessionEvent::StopWorking,
            SessionEvent::Pause,
            SessionEvent::Unpause,
            SessionEvent::CompleteTask,
            SessionEvent::TimerEnded,
            SessionEvent::BreatheElapsed { epoch: 0 },
        ] {
            let effects = machine.send(event);
            assert!(effects.is_empty());
            assert_eq!(machine.state(), SessionPhase::Idle);
        }
    }

    #[test]
    fn history_is_append_only() {
        let (mut machine, clock) = machine();

        in_session(&mut machine);
        clock.advance_secs(100);
        machine.send(SessionEvent::TakeABreak { duration_secs: 60 });
        let first = machine.context().history()[0].clone();

        clock.advance_secs(60);
        machine.send(SessionEvent::StopWorking);

        let history = machine.context().history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], first);
        assert_eq!(history[1].kind, PeriodKind::Rest);
        for record in history {
            assert!(record.end >= record.start);
        }
    }

    #[test]
    fn command_translation_uses_defaults() {
        let settings = Settings::default();

        assert_eq!(
            SessionEvent::from_command(Command::InitFocus { duration_secs: None }, &settings),
            Some(SessionEvent::InitFocus {
                duration_secs: settings.defaults.focus_secs
            })
        );
        assert_eq!(
            SessionEvent::from_command(
                Command::TakeABreak {
                    duration_secs: Some(90)
                },
                &settings
            ),
            Some(SessionEvent::TakeABreak { duration_secs: 90 })
        );
        assert_eq!(SessionEvent::from_command(Command::GetState, &settings), None);
    }

    #[test]
    fn snapshot_ignores_foreign_timer() {
        let (mut machine, _clock) = machine();
        in_session(&mut machine);

        let foreign = TimerSnapshot {
            timer_id: TimerId::new(),
            state: focus_api::TimerPhase::Running,
            start_date: focus_util::now(),
            target_duration_secs: 1,
            seconds_remaining: 1,
            elapsed_secs: 0.0,
            pause_buffer_secs: 0.0,
            pause_started_at: None,
        };

        let snap = machine.snapshot(Some(foreign));
        assert_eq!(snap.state, SessionPhase::Session);
        assert!(snap.timer.is_none());
        assert!(snap.active_timer.is_some());
    }
}
