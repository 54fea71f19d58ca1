//! Async session service
//!
//! Runs the [`SessionMachine`] on a tokio task. Commands arrive over an mpsc
//! channel, timers run as [`TimerHandle`] tasks, and the breathing delay is a
//! spawned sleep. Subscribers get an [`Event`] stream over broadcast and the
//! latest [`SessionSnapshot`] over watch.

use focus_api::{Command, Event, EventPayload, SessionSnapshot, TimerNotice, TimerSnapshot};
use focus_config::Settings;
use focus_util::{Clock, FocusError, Result, TimerId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::actor::{TaggedNotice, TimerHandle};
use crate::session::{SessionEffect, SessionEvent, SessionMachine, SessionOptions};

const EVENT_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug)]
enum Inbound {
    Command(Command),
    BreatheElapsed { epoch: u64 },
    Shutdown,
}

/// Handle to a running session service
#[derive(Debug)]
pub struct SessionService {
    inbox: mpsc::UnboundedSender<Inbound>,
    snapshot: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<Event>,
    task: JoinHandle<()>,
}

impl SessionService {
    /// Start the service. Must be called from within a tokio runtime.
    pub fn spawn(settings: Settings, clock: Arc<dyn Clock>) -> Self {
        let options = SessionOptions::from_settings(&settings);
        let machine = SessionMachine::new(clock.clone(), options);
        let (snapshot_tx, snapshot) = watch::channel(machine.snapshot(None));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        let runner = Runner {
            machine,
            settings,
            clock,
            timer: None,
            breathe: None,
            inbox: inbox.clone(),
            notice_tx,
            events: events.clone(),
            snapshot: snapshot_tx,
        };

        let task = tokio::spawn(runner.run(inbox_rx, notice_rx));

        info!("Session service started");

        Self {
            inbox,
            snapshot,
            events,
            task,
        }
    }

    /// Queue a command for the orchestrator
    pub fn send(&self, command: Command) -> Result<()> {
        self.inbox
            .send(Inbound::Command(command))
            .map_err(|_| FocusError::ServiceStopped)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Put an event on the stream from outside the machine (e.g. input errors)
    pub fn announce(&self, payload: EventPayload) {
        let _ = self.events.send(Event::new(payload));
    }

    /// Stop the service, disposing any live timer, and wait for it to finish
    pub async fn shutdown(self) -> Result<()> {
        self.inbox
            .send(Inbound::Shutdown)
            .map_err(|_| FocusError::ServiceStopped)?;
        self.task
            .await
            .map_err(|e| FocusError::internal(format!("session task failed: {e}")))
    }
}

/// What woke the service loop
enum Wake {
    Inbound(Option<Inbound>),
    Notice(TaggedNotice),
    TimerChanged,
}

/// State owned by the service task
struct Runner {
    machine: SessionMachine,
    settings: Settings,
    clock: Arc<dyn Clock>,
    timer: Option<TimerHandle>,
    breathe: Option<JoinHandle<()>>,
    inbox: mpsc::UnboundedSender<Inbound>,
    notice_tx: mpsc::UnboundedSender<TaggedNotice>,
    events: broadcast::Sender<Event>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl Runner {
    async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<Inbound>,
        mut notices: mpsc::UnboundedReceiver<TaggedNotice>,
    ) {
        let mut timer_watch: Option<(TimerId, watch::Receiver<TimerSnapshot>)> = None;

        loop {
            let wake = tokio::select! {
                inbound = inbox.recv() => Wake::Inbound(inbound),
                Some(tagged) = notices.recv() => Wake::Notice(tagged),
                Some(()) = timer_changed(&mut timer_watch) => Wake::TimerChanged,
            };

            match wake {
                Wake::Inbound(None) | Wake::Inbound(Some(Inbound::Shutdown)) => {
                    info!("Session service shutting down");
                    break;
                }
                Wake::Inbound(Some(Inbound::Command(command))) => {
                    self.handle_command(command, &mut timer_watch)
                }
                Wake::Inbound(Some(Inbound::BreatheElapsed { epoch })) => {
                    let effects = self.machine.send(SessionEvent::BreatheElapsed { epoch });
                    self.apply(effects);
                }
                Wake::Notice((timer_id, notice)) => {
                    self.announce_notice(timer_id, &notice);
                    let effects = self.machine.notify(timer_id, notice);
                    self.apply(effects);
                }
                Wake::TimerChanged => {}
            }

            let live = self.timer.as_ref().map(TimerHandle::id);
            if timer_watch.as_ref().map(|(id, _)| *id) != live {
                timer_watch = self.timer.as_ref().map(|h| (h.id(), h.watch()));
            }

            self.publish(&mut timer_watch);
        }

        if let Some(breathe) = self.breathe.take() {
            breathe.abort();
        }
        self.timer = None;
        self.broadcast(EventPayload::Shutdown);
    }

    fn handle_command(
        &mut self,
        command: Command,
        timer_watch: &mut Option<(TimerId, watch::Receiver<TimerSnapshot>)>,
    ) {
        match SessionEvent::from_command(command, &self.settings) {
            Some(event) => {
                let effects = self.machine.send(event);
                self.apply(effects);
            }
            None => {
                let timer = timer_watch.as_mut().map(|(_, rx)| rx.borrow_and_update().clone());
                let snapshot = self.machine.snapshot(timer);
                self.broadcast(EventPayload::State(snapshot));
            }
        }
    }

    fn apply(&mut self, effects: Vec<SessionEffect>) {
        for effect in effects {
            if let Some(payload) = effect.event_payload() {
                self.broadcast(payload);
            }

            match effect {
                SessionEffect::SpawnTimer { timer_id, .. } => {
                    let handle = TimerHandle::spawn(
                        timer_id,
                        self.clock.clone(),
                        self.settings.timing.tick_interval,
                        self.notice_tx.clone(),
                    );
                    if let Some(old) = self.timer.replace(handle) {
                        warn!(
                            timer_id = %old.id(),
                            "Spawn replaced a timer that was never disposed"
                        );
                    }
                }
                SessionEffect::DisposeTimer { timer_id } => {
                    if self.timer.as_ref().is_some_and(|h| h.id() == timer_id) {
                        self.timer = None;
                    }
                }
                SessionEffect::SendTimer { timer_id, command } => match &self.timer {
                    Some(handle) if handle.id() == timer_id => {
                        if !handle.send(command) {
                            warn!(timer_id = %timer_id, "Timer task gone");
                        }
                    }
                    _ => debug!(timer_id = %timer_id, "Command for disposed timer dropped"),
                },
                SessionEffect::ScheduleBreathe { epoch, delay } => {
                    self.schedule_breathe(epoch, delay)
                }
                SessionEffect::StateChanged { .. }
                | SessionEffect::Committed(_)
                | SessionEffect::PauseRecorded(_) => {}
            }
        }
    }

    fn schedule_breathe(&mut self, epoch: u64, delay: Duration) {
        if let Some(previous) = self.breathe.take() {
            previous.abort();
        }

        let inbox = self.inbox.clone();
        self.breathe = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inbox.send(Inbound::BreatheElapsed { epoch });
        }));
    }

    fn announce_notice(&self, timer_id: TimerId, notice: &TimerNotice) {
        if self.machine.context().active_timer() != Some(timer_id) {
            return;
        }
        match notice {
            TimerNotice::TimerEnded => self.broadcast(EventPayload::TimerEnded { timer_id }),
            TimerNotice::OverflowReversed => {
                self.broadcast(EventPayload::OverflowReversed { timer_id })
            }
            _ => {}
        }
    }

    fn publish(&self, timer_watch: &mut Option<(TimerId, watch::Receiver<TimerSnapshot>)>) {
        let timer = timer_watch.as_mut().map(|(_, rx)| rx.borrow_and_update().clone());
        self.snapshot.send_replace(self.machine.snapshot(timer));
    }

    fn broadcast(&self, payload: EventPayload) {
        // No subscribers is fine
        let _ = self.events.send(Event::at(self.clock.now(), payload));
    }
}

/// Resolves when the live timer publishes a new snapshot; never if none is live
async fn timer_changed(
    timer_watch: &mut Option<(TimerId, watch::Receiver<TimerSnapshot>)>,
) -> Option<()> {
    match timer_watch {
        Some((_, rx)) => rx.changed().await.ok(),
        None => std::future::pending().await,
    }
}
