//! Single-threaded driver for the two machines
//!
//! [`LocalRuntime`] wires a [`SessionMachine`] to its timers through FIFO
//! mailboxes and a [`ManualClock`]. Nothing happens until the caller sends a
//! command or advances the clock, which makes whole sessions reproducible in
//! tests and lets tools replay a command script without waiting in real time.

use chrono::{DateTime, Local};
use focus_api::{
    Command, Event, EventPayload, PeriodRecord, SessionPhase, SessionSnapshot, TimerCommand,
    TimerNotice,
};
use focus_config::Settings;
use focus_util::{Clock, ManualClock, TimerId};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::session::{SessionEffect, SessionEvent, SessionMachine, SessionOptions};
use crate::timer::TimerMachine;

/// A message waiting for delivery
#[derive(Debug)]
enum Envelope {
    ToSession(SessionEvent),
    ToTimer(TimerId, TimerCommand),
    FromTimer(TimerId, TimerNotice),
}

#[derive(Debug, Clone, Copy)]
struct PendingBreathe {
    epoch: u64,
    due: DateTime<Local>,
}

/// Deterministic runtime driven by explicit clock advances.
///
/// Ticks are delivered once per simulated second.
#[derive(Debug)]
pub struct LocalRuntime {
    clock: ManualClock,
    settings: Settings,
    session: SessionMachine,
    timer: Option<TimerMachine>,
    mailbox: VecDeque<Envelope>,
    breathe: Option<PendingBreathe>,
    events: Vec<Event>,
}

impl LocalRuntime {
    /// Runtime with a clock starting at the current system time
    pub fn new(settings: Settings) -> Self {
        Self::with_clock(settings, ManualClock::starting_now())
    }

    pub fn with_clock(settings: Settings, clock: ManualClock) -> Self {
        let session = SessionMachine::new(
            Arc::new(clock.clone()),
            SessionOptions::from_settings(&settings),
        );

        Self {
            clock,
            settings,
            session,
            timer: None,
            mailbox: VecDeque::new(),
            breathe: None,
            events: Vec::new(),
        }
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn state(&self) -> SessionPhase {
        self.session.state()
    }

    pub fn history(&self) -> &[PeriodRecord] {
        self.session.context().history()
    }

    pub fn timer(&self) -> Option<&TimerMachine> {
        self.timer.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot(self.timer.as_ref().map(TimerMachine::snapshot))
    }

    /// Events emitted so far, oldest first
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Deliver a command and run everything it sets off
    pub fn command(&mut self, command: Command) {
        trace!(command = ?command, "Local command");

        match SessionEvent::from_command(command, &self.settings) {
            Some(event) => {
                self.mailbox.push_back(Envelope::ToSession(event));
                self.pump();
                self.fire_due_breathe();
            }
            None => {
                let snapshot = self.snapshot();
                self.emit(EventPayload::State(snapshot));
            }
        }
    }

    /// Move the clock forward, ticking the live timer every second
    pub fn advance_secs(&mut self, secs: u64) {
        for _ in 0..secs {
            self.clock.advance_secs(1);
            self.fire_due_breathe();

            if let Some(timer_id) = self.timer.as_ref().map(TimerMachine::id) {
                self.mailbox.push_back(Envelope::ToTimer(timer_id, TimerCommand::Tick));
                self.pump();
            }
        }
    }

    fn fire_due_breathe(&mut self) {
        let Some(pending) = self.breathe else {
            return;
        };
        if pending.due > self.clock.now() {
            return;
        }

        self.breathe = None;
        self.mailbox.push_back(Envelope::ToSession(SessionEvent::BreatheElapsed {
            epoch: pending.epoch,
        }));
        self.pump();
    }

    /// Deliver queued messages until the mailbox is empty
    fn pump(&mut self) {
        while let Some(envelope) = self.mailbox.pop_front() {
            match envelope {
                Envelope::ToSession(event) => {
                    let effects = self.session.send(event);
                    self.apply(effects);
                }
                Envelope::FromTimer(timer_id, notice) => {
                    self.announce_notice(timer_id, &notice);
                    let effects = self.session.notify(timer_id, notice);
                    self.apply(effects);
                }
                Envelope::ToTimer(timer_id, command) => {
                    let Some(timer) = self.timer.as_mut().filter(|t| t.id() == timer_id) else {
                        debug!(
                            timer_id = %timer_id,
                            command = ?command,
                            "Timer gone, command dropped"
                        );
                        continue;
                    };
                    for notice in timer.send(command) {
                        self.mailbox.push_back(Envelope::FromTimer(timer_id, notice));
                    }
                }
            }
        }
    }

    fn apply(&mut self, effects: Vec<SessionEffect>) {
        for effect in effects {
            if let Some(payload) = effect.event_payload() {
                self.emit(payload);
            }

            match effect {
                SessionEffect::SpawnTimer { timer_id, .. } => {
                    if let Some(old) = self.timer.take() {
                        warn!(
                            timer_id = %old.id(),
                            "Spawn replaced a timer that was never disposed"
                        );
                    }
                    self.timer = Some(TimerMachine::new(timer_id, Arc::new(self.clock.clone())));
                }
                SessionEffect::DisposeTimer { timer_id } => {
                    if self.timer.as_ref().is_some_and(|t| t.id() == timer_id) {
                        self.timer = None;
                    }
                }
                SessionEffect::SendTimer { timer_id, command } => {
                    self.mailbox.push_back(Envelope::ToTimer(timer_id, command));
                }
                SessionEffect::ScheduleBreathe { epoch, delay } => {
                    // A delay past the end of the calendar never elapses
                    let due = chrono::Duration::from_std(delay)
                        .ok()
                        .and_then(|d| self.clock.now().checked_add_signed(d));
                    match due {
                        Some(due) => self.breathe = Some(PendingBreathe { epoch, due }),
                        None => {
                            warn!(
                                epoch,
                                delay_ms = delay.as_millis() as u64,
                                "Breathe delay out of range"
                            );
                            self.breathe = None;
                        }
                    }
                }
                SessionEffect::StateChanged { .. }
                | SessionEffect::Committed(_)
                | SessionEffect::PauseRecorded(_) => {}
            }
        }
    }

    /// Timer milestones are reported only for the live timer
    fn announce_notice(&mut self, timer_id: TimerId, notice: &TimerNotice) {
        if self.session.context().active_timer() != Some(timer_id) {
            return;
        }
        match notice {
            TimerNotice::TimerEnded => self.emit(EventPayload::TimerEnded { timer_id }),
            TimerNotice::OverflowReversed => {
                self.emit(EventPayload::OverflowReversed { timer_id })
            }
            _ => {}
        }
    }

    fn emit(&mut self, payload: EventPayload) {
        self.events.push(Event::at(self.clock.now(), payload));
    }
}
