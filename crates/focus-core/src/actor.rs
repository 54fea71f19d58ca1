//! Async timer actor
//!
//! Each live timer runs as its own tokio task with a command mailbox and a
//! tick interval. Notices go back to the owner tagged with the timer's id;
//! the latest snapshot is published on a watch channel.
//!
//! Dropping the [`TimerHandle`] aborts the task, which cancels the tick and
//! closes the mailbox in one step.

use focus_api::{TimerCommand, TimerNotice, TimerSnapshot};
use focus_util::{Clock, TimerId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::timer::TimerMachine;

/// Notice tagged with the timer that sent it
pub type TaggedNotice = (TimerId, TimerNotice);

/// Owner's handle to a running timer task
#[derive(Debug)]
pub struct TimerHandle {
    id: TimerId,
    commands: mpsc::UnboundedSender<TimerCommand>,
    snapshot: watch::Receiver<TimerSnapshot>,
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Spawn a timer task. Must be called from within a tokio runtime.
    pub fn spawn(
        id: TimerId,
        clock: Arc<dyn Clock>,
        tick_interval: Duration,
        notices: mpsc::UnboundedSender<TaggedNotice>,
    ) -> Self {
        let machine = TimerMachine::new(id, clock);
        let (snapshot_tx, snapshot) = watch::channel(machine.snapshot());
        let (commands, inbox) = mpsc::unbounded_channel();

        let task = tokio::spawn(run(machine, inbox, notices, snapshot_tx, tick_interval));

        debug!(
            timer_id = %id,
            tick_ms = tick_interval.as_millis() as u64,
            "Timer task spawned"
        );

        Self {
            id,
            commands,
            snapshot,
            task,
        }
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Queue a command. Returns false if the task is gone.
    pub fn send(&self, command: TimerCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// A receiver for the timer's snapshots
    pub fn watch(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshot.clone()
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.snapshot.borrow().clone()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        trace!(timer_id = %self.id, "Aborting timer task");
        self.task.abort();
    }
}

async fn run(
    mut machine: TimerMachine,
    mut inbox: mpsc::UnboundedReceiver<TimerCommand>,
    notices: mpsc::UnboundedSender<TaggedNotice>,
    snapshot: watch::Sender<TimerSnapshot>,
    tick_interval: Duration,
) {
    let id = machine.id();
    let mut ticker = time::interval_at(Instant::now() + tick_interval, tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let command = tokio::select! {
            command = inbox.recv() => match command {
                Some(command) => command,
                None => break,
            },
            _ = ticker.tick() => TimerCommand::Tick,
        };

        for notice in machine.send(command) {
            if notices.send((id, notice)).is_err() {
                debug!(timer_id = %id, "Owner gone, timer task exiting");
                return;
            }
        }

        snapshot.send_replace(machine.snapshot());
    }

    debug!(timer_id = %id, "Timer mailbox closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use focus_api::TimerPhase;
    use focus_util::ManualClock;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn ticks_drive_overflow() {
        let clock = ManualClock::starting_now();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = TimerHandle::spawn(
            TimerId::new(),
            Arc::new(clock.clone()),
            Duration::from_millis(10),
            tx,
        );

        assert!(handle.send(TimerCommand::Start { duration_secs: 5 }));

        let mut watch = handle.watch();
        time::timeout(TIMEOUT, watch.wait_for(|s| s.state == TimerPhase::Running))
            .await
            .unwrap()
            .unwrap();

        clock.advance_secs(6);

        let (from, notice) = time::timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(from, handle.id());
        assert_eq!(notice, TimerNotice::TimerEnded);

        let snap = time::timeout(TIMEOUT, watch.wait_for(|s| s.state == TimerPhase::Overflowed))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(snap.seconds_remaining, -1);
    }

    #[tokio::test]
    async fn drop_aborts_task() {
        let clock = ManualClock::starting_now();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = TimerHandle::spawn(
            TimerId::new(),
            Arc::new(clock.clone()),
            Duration::from_millis(10),
            tx,
        );
        handle.send(TimerCommand::Start { duration_secs: 5 });
        drop(handle);

        clock.advance_secs(60);

        // With the task gone the sender it held is dropped too
        let next = time::timeout(TIMEOUT, rx.recv()).await.unwrap();
        assert!(next.is_none());
    }
}
