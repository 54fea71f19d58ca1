//! Declarative transition tables
//!
//! A [`Chart`] maps `(state, event kind)` to an ordered list of guarded
//! [`Transition`]s. Lookup is two-tier: the state's own table first, then
//! the global table shared by every state. The first transition whose guard
//! holds wins; if none does, the event is a no-op.
//!
//! An explicitly empty list in a state's table shadows the global handlers
//! for that kind, so a state can opt out of a global reaction.
//!
//! After every handled event the current state's eventless (`always`)
//! transitions are re-evaluated until none applies. The pass is bounded by
//! the number of states so a cycle of eventless transitions cannot spin.
//!
//! Guards and actions are plain enums interpreted by a [`Behavior`], which
//! keeps the tables as data and the side effects in one place.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use tracing::{trace, warn};

/// The context a chart drives
pub trait Behavior {
    type State: Copy + Eq + Hash + Debug;
    type Kind: Copy + Eq + Hash + Debug;
    type Guard: Copy + Debug;
    type Action: Copy + Debug;
    type Event: Debug;

    /// Discriminant used to look the event up in the tables
    fn kind(event: &Self::Event) -> Self::Kind;

    fn check(&self, guard: Self::Guard, event: &Self::Event) -> bool;

    fn perform(&mut self, action: Self::Action, event: &Self::Event);
}

/// One guarded alternative
#[derive(Debug, Clone)]
pub struct Transition<S, G, A> {
    pub guard: Option<G>,
    /// `None` keeps the current state without re-entering it
    pub target: Option<S>,
    pub actions: Vec<A>,
}

impl<S, G, A> Transition<S, G, A> {
    pub fn to(target: S) -> Self {
        Self {
            guard: None,
            target: Some(target),
            actions: Vec::new(),
        }
    }

    pub fn stay() -> Self {
        Self {
            guard: None,
            target: None,
            actions: Vec::new(),
        }
    }

    pub fn when(mut self, guard: G) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with(mut self, actions: impl IntoIterator<Item = A>) -> Self {
        self.actions.extend(actions);
        self
    }
}

#[derive(Debug, Clone)]
struct StateNode<S, K, G, A> {
    entry: Vec<A>,
    on: HashMap<K, Vec<Transition<S, G, A>>>,
    always: Vec<Transition<S, G, A>>,
}

impl<S, K, G, A> Default for StateNode<S, K, G, A> {
    fn default() -> Self {
        Self {
            entry: Vec::new(),
            on: HashMap::new(),
            always: Vec::new(),
        }
    }
}

/// Result of feeding one event through a chart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step<S> {
    pub from: S,
    pub to: S,
    /// Whether any transition (including a targetless one) was taken
    pub handled: bool,
}

impl<S: PartialEq> Step<S> {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// A flat statechart with a global handler tier
#[derive(Debug, Clone)]
pub struct Chart<S, K, G, A> {
    initial: S,
    states: HashMap<S, StateNode<S, K, G, A>>,
    global: HashMap<K, Vec<Transition<S, G, A>>>,
}

impl<S, K, G, A> Chart<S, K, G, A>
where
    S: Copy + Eq + Hash + Debug,
    K: Copy + Eq + Hash + Debug,
    G: Copy + Debug,
    A: Copy + Debug,
{
    /// Create a chart over the given states. Every state gets an empty node.
    pub fn new(initial: S, states: impl IntoIterator<Item = S>) -> Self {
        let mut nodes: HashMap<S, StateNode<S, K, G, A>> =
            states.into_iter().map(|s| (s, StateNode::default())).collect();
        nodes.entry(initial).or_default();

        Self {
            initial,
            states: nodes,
            global: HashMap::new(),
        }
    }

    pub fn initial(&self) -> S {
        self.initial
    }

    /// Actions run every time `state` is entered
    pub fn entry(mut self, state: S, actions: impl IntoIterator<Item = A>) -> Self {
        self.states.entry(state).or_default().entry.extend(actions);
        self
    }

    /// State-local handlers for `kind`, appended in priority order
    pub fn on(
        mut self,
        state: S,
        kind: K,
        transitions: impl IntoIterator<Item = Transition<S, G, A>>,
    ) -> Self {
        self.states
            .entry(state)
            .or_default()
            .on
            .entry(kind)
            .or_default()
            .extend(transitions);
        self
    }

    /// Handle `kind` in `state` by doing nothing, shadowing any global handler
    pub fn ignore(mut self, state: S, kind: K) -> Self {
        self.states.entry(state).or_default().on.entry(kind).or_default();
        self
    }

    /// Eventless transitions checked after every processed event
    pub fn always(
        mut self,
        state: S,
        transitions: impl IntoIterator<Item = Transition<S, G, A>>,
    ) -> Self {
        self.states
            .entry(state)
            .or_default()
            .always
            .extend(transitions);
        self
    }

    /// Handlers active in every state unless the state shadows them
    pub fn global(
        mut self,
        kind: K,
        transitions: impl IntoIterator<Item = Transition<S, G, A>>,
    ) -> Self {
        self.global.entry(kind).or_default().extend(transitions);
        self
    }

    /// Feed `event` to the chart, mutating `state` and running actions on
    /// `behavior`.
    pub fn step<B>(&self, state: &mut S, behavior: &mut B, event: &B::Event) -> Step<S>
    where
        B: Behavior<State = S, Kind = K, Guard = G, Action = A>,
    {
        let from = *state;
        let kind = B::kind(event);

        let selected = match self.states.get(&*state).and_then(|node| node.on.get(&kind)) {
            Some(local) if local.is_empty() => None,
            Some(local) => Self::select(local, &*behavior, event).or_else(|| {
                self.global
                    .get(&kind)
                    .and_then(|g| Self::select(g, &*behavior, event))
            }),
            None => self
                .global
                .get(&kind)
                .and_then(|g| Self::select(g, &*behavior, event)),
        };

        let handled = selected.is_some();
        if let Some(transition) = selected {
            self.take(transition, state, behavior, event);
        } else {
            trace!(state = ?from, kind = ?kind, "Event not handled");
        }

        self.settle(state, behavior, event);

        Step {
            from,
            to: *state,
            handled,
        }
    }

    fn select<'a, B>(
        candidates: &'a [Transition<S, G, A>],
        behavior: &B,
        event: &B::Event,
    ) -> Option<&'a Transition<S, G, A>>
    where
        B: Behavior<State = S, Kind = K, Guard = G, Action = A>,
    {
        candidates
            .iter()
            .find(|t| t.guard.is_none_or(|g| behavior.check(g, event)))
    }

    fn take<B>(
        &self,
        transition: &Transition<S, G, A>,
        state: &mut S,
        behavior: &mut B,
        event: &B::Event,
    ) where
        B: Behavior<State = S, Kind = K, Guard = G, Action = A>,
    {
        for action in &transition.actions {
            behavior.perform(*action, event);
        }

        if let Some(target) = transition.target {
            trace!(from = ?*state, to = ?target, "Transition");
            *state = target;
            if let Some(node) = self.states.get(&target) {
                for action in &node.entry {
                    behavior.perform(*action, event);
                }
            }
        }
    }

    /// Follow eventless transitions until the state is stable
    fn settle<B>(&self, state: &mut S, behavior: &mut B, event: &B::Event)
    where
        B: Behavior<State = S, Kind = K, Guard = G, Action = A>,
    {
        for _ in 0..self.states.len() {
            let Some(node) = self.states.get(&*state) else {
                return;
            };
            let Some(transition) = Self::select(&node.always, &*behavior, event) else {
                return;
            };
            self.take(transition, state, behavior, event);
        }

        warn!(state = ?*state, "Eventless transitions did not settle");
    }
}
