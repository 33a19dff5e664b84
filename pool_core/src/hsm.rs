//! Hierarchical state machine engine.
//!
//! States are nodes of a tree declared once in a table: each [`State`] carries
//! its parent, default child and callback references. Transitions are matched
//! against the active leaf first, then each ancestor in turn; the first
//! transition whose guard holds wins, otherwise the trigger is ignored.
//!
//! Executing a transition:
//! 1. invalidate the owner's timers and stamp the entry time,
//! 2. run the machine-wide before hook and the transition's `before` callbacks,
//! 3. exit states leaf-to-root up to the common ancestor,
//! 4. enter states root-to-leaf down to the target and its default children,
//! 5. run the repeat callback of the nearest active state that has one.
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::actor::Context;
use crate::error::BuildError;

/// What the machine needs from the owning actor.
pub trait MachineContext<T> {
    fn now(&self) -> Instant;
    /// Drop every timer scheduled so far.
    fn invalidate_timers(&mut self);
    /// Call the active repeat callback again after `after`.
    fn schedule_repeat(&mut self, after: Duration);
    /// Fire `trigger` from the owner's inbox, after the current handler.
    fn defer_trigger(&mut self, trigger: T);
}

/// Outcome of a repeat callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat<T> {
    /// Run again after the state's cadence.
    Continue,
    /// End the chain; the state stays active.
    Stop,
    /// Fire this trigger.
    Transition(T),
}

pub type Action<M, C> = fn(&mut M, &mut C);
pub type Guard<M> = fn(&M) -> bool;
/// Repeat callbacks also receive the time spent in the current leaf.
pub type RepeatFn<M, C, T> = fn(&mut M, &mut C, Duration) -> Repeat<T>;

pub struct State<S, T, M, C> {
    id: S,
    parent: Option<S>,
    initial: Option<S>,
    on_enter: Option<Action<M, C>>,
    on_exit: Option<Action<M, C>>,
    repeat: Option<(RepeatFn<M, C, T>, Duration)>,
}

impl<S, T, M, C> State<S, T, M, C> {
    pub fn new(id: S) -> Self {
        Self {
            id,
            parent: None,
            initial: None,
            on_enter: None,
            on_exit: None,
            repeat: None,
        }
    }

    pub fn parent(mut self, parent: S) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Default child entered whenever this composite state is entered.
    pub fn initial(mut self, child: S) -> Self {
        self.initial = Some(child);
        self
    }

    pub fn on_enter(mut self, f: Action<M, C>) -> Self {
        self.on_enter = Some(f);
        self
    }

    pub fn on_exit(mut self, f: Action<M, C>) -> Self {
        self.on_exit = Some(f);
        self
    }

    pub fn repeat(mut self, f: RepeatFn<M, C, T>, every: Duration) -> Self {
        self.repeat = Some((f, every));
        self
    }
}

pub struct Transition<S, T, M, C> {
    trigger: T,
    sources: Vec<S>,
    target: S,
    guard: Option<(Guard<M>, bool)>,
    before: Vec<Action<M, C>>,
}

impl<S: Copy, T, M, C> Transition<S, T, M, C> {
    pub fn new(trigger: T, sources: &[S], target: S) -> Self {
        Self {
            trigger,
            sources: sources.to_vec(),
            target,
            guard: None,
            before: Vec::new(),
        }
    }

    /// Only taken when `guard` holds.
    pub fn when(mut self, guard: Guard<M>) -> Self {
        self.guard = Some((guard, true));
        self
    }

    /// Only taken when `guard` does not hold.
    pub fn unless(mut self, guard: Guard<M>) -> Self {
        self.guard = Some((guard, false));
        self
    }

    pub fn before(mut self, f: Action<M, C>) -> Self {
        self.before.push(f);
        self
    }
}

pub struct MachineBuilder<S, T, M, C> {
    name: &'static str,
    initial: S,
    states: Vec<State<S, T, M, C>>,
    transitions: Vec<Transition<S, T, M, C>>,
    before_change: Option<Action<M, C>>,
}

impl<S, T, M, C> MachineBuilder<S, T, M, C>
where
    S: Copy + Eq + Hash + Debug,
    T: Copy + Eq + Debug,
    C: MachineContext<T>,
{
    pub fn new(name: &'static str, initial: S) -> Self {
        Self {
            name,
            initial,
            states: Vec::new(),
            transitions: Vec::new(),
            before_change: None,
        }
    }

    pub fn state(mut self, state: State<S, T, M, C>) -> Self {
        self.states.push(state);
        self
    }

    pub fn transition(mut self, transition: Transition<S, T, M, C>) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Model hook run before every transition.
    pub fn before_change(mut self, f: Action<M, C>) -> Self {
        self.before_change = Some(f);
        self
    }

    pub fn build(self) -> Result<Machine<S, T, M, C>, BuildError> {
        let mut states = HashMap::with_capacity(self.states.len());
        for state in self.states {
            if states.contains_key(&state.id) {
                return Err(BuildError::DuplicateState(format!("{:?}", state.id)));
            }
            states.insert(state.id, state);
        }
        let unknown = |s: &S| BuildError::UnknownState(format!("{s:?}"));
        for state in states.values() {
            if let Some(parent) = &state.parent
                && !states.contains_key(parent)
            {
                return Err(unknown(parent));
            }
            if let Some(child) = &state.initial {
                let child_parent = states.get(child).ok_or_else(|| unknown(child))?.parent;
                if child_parent != Some(state.id) {
                    return Err(BuildError::InvalidInitial {
                        parent: format!("{:?}", state.id),
                        child: format!("{child:?}"),
                    });
                }
            }
        }
        for t in &self.transitions {
            if let Some(s) = t
                .sources
                .iter()
                .chain(std::iter::once(&t.target))
                .find(|s| !states.contains_key(*s))
            {
                return Err(unknown(s));
            }
        }
        if !states.contains_key(&self.initial) {
            return Err(unknown(&self.initial));
        }
        Ok(Machine {
            name: self.name,
            states,
            transitions: self.transitions,
            initial: self.initial,
            current: self.initial,
            entered_at: None,
            before_change: self.before_change,
        })
    }
}

pub struct Machine<S, T, M, C> {
    name: &'static str,
    states: HashMap<S, State<S, T, M, C>>,
    transitions: Vec<Transition<S, T, M, C>>,
    initial: S,
    current: S,
    entered_at: Option<Instant>,
    before_change: Option<Action<M, C>>,
}

impl<S, T, M, C> Machine<S, T, M, C>
where
    S: Copy + Eq + Hash + Debug,
    T: Copy + Eq + Debug,
    C: MachineContext<T>,
{
    pub fn builder(name: &'static str, initial: S) -> MachineBuilder<S, T, M, C> {
        MachineBuilder::new(name, initial)
    }

    /// Active leaf.
    pub fn state(&self) -> S {
        self.current
    }

    /// Active path from root to leaf.
    pub fn path(&self) -> Vec<S> {
        self.path_of(self.current)
    }

    /// True if `state` is the active leaf or one of its ancestors.
    pub fn is(&self, state: S) -> bool {
        let mut cursor = Some(self.current);
        while let Some(s) = cursor {
            if s == state {
                return true;
            }
            cursor = self.states.get(&s).and_then(|n| n.parent);
        }
        false
    }

    pub fn entered_at(&self) -> Option<Instant> {
        self.entered_at
    }

    pub fn time_in_state(&self, now: Instant) -> Duration {
        self.entered_at
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default()
    }

    fn path_of(&self, leaf: S) -> Vec<S> {
        let mut path = vec![leaf];
        let mut cursor = self.states.get(&leaf).and_then(|n| n.parent);
        while let Some(s) = cursor {
            path.push(s);
            cursor = self.states.get(&s).and_then(|n| n.parent);
        }
        path.reverse();
        path
    }

    /// Enter the initial state (and its default children) and start its repeat.
    pub fn start(&mut self, model: &mut M, ctx: &mut C) {
        ctx.invalidate_timers();
        self.entered_at = Some(ctx.now());
        for s in self.path_of(self.initial) {
            self.enter(s, model, ctx);
        }
        let leaf = self.descend(self.initial, model, ctx);
        tracing::info!(machine = self.name, state = ?leaf, "machine started");
        self.repeat(model, ctx);
    }

    /// Fire a trigger. Returns true if a transition was taken.
    pub fn fire(&mut self, trigger: T, model: &mut M, ctx: &mut C) -> bool {
        let path = self.path();
        let found = path.iter().rev().find_map(|state| {
            self.transitions.iter().find(|t| {
                t.trigger == trigger
                    && t.sources.contains(state)
                    && t.guard.is_none_or(|(guard, expected)| guard(model) == expected)
            })
        });
        let Some(t) = found else {
            tracing::trace!(machine = self.name, ?trigger, state = ?self.current, "trigger ignored");
            return false;
        };
        let target = t.target;
        let before = t.before.clone();
        self.execute(trigger, target, &before, model, ctx);
        true
    }

    fn execute(&mut self, trigger: T, target: S, before: &[Action<M, C>], model: &mut M, ctx: &mut C) {
        let from = self.current;
        ctx.invalidate_timers();
        self.entered_at = Some(ctx.now());
        if let Some(hook) = self.before_change {
            hook(model, ctx);
        }
        for f in before {
            f(model, ctx);
        }

        let source_path = self.path_of(from);
        let target_path = self.path_of(target);
        let mut common = source_path
            .iter()
            .zip(&target_path)
            .take_while(|(a, b)| a == b)
            .count();
        // Target is the source or one of its ancestors: leave and re-enter it.
        if common == target_path.len() {
            common -= 1;
        }
        for s in source_path[common..].iter().rev() {
            if let Some(exit) = self.states.get(s).and_then(|n| n.on_exit) {
                exit(model, ctx);
            }
        }
        for s in &target_path[common..] {
            self.enter(*s, model, ctx);
        }
        let leaf = self.descend(target, model, ctx);
        tracing::info!(machine = self.name, ?trigger, ?from, to = ?leaf, "transition");
        self.repeat(model, ctx);
    }

    fn enter(&mut self, state: S, model: &mut M, ctx: &mut C) {
        self.current = state;
        if let Some(enter) = self.states.get(&state).and_then(|n| n.on_enter) {
            enter(model, ctx);
        }
    }

    fn descend(&mut self, from: S, model: &mut M, ctx: &mut C) -> S {
        let mut leaf = from;
        while let Some(child) = self.states.get(&leaf).and_then(|n| n.initial) {
            self.enter(child, model, ctx);
            leaf = child;
        }
        self.current = leaf;
        leaf
    }

    /// Run the repeat callback of the nearest active state that declares one.
    pub fn repeat(&mut self, model: &mut M, ctx: &mut C) {
        let found = self
            .path()
            .iter()
            .rev()
            .find_map(|s| self.states.get(s).and_then(|n| n.repeat));
        let Some((callback, every)) = found else {
            return;
        };
        let in_state = self.time_in_state(ctx.now());
        match callback(model, ctx, in_state) {
            Repeat::Continue => ctx.schedule_repeat(every),
            Repeat::Stop => {}
            Repeat::Transition(trigger) => ctx.defer_trigger(trigger),
        }
    }
}

/// Messages of an actor driven by a [`Machine`].
pub trait MachineMsg: Send + Sized + 'static {
    type Trigger: Copy + Eq + Debug + Send + 'static;

    fn fire(trigger: Self::Trigger) -> Self;
    fn repeat() -> Self;
}

/// Messages of an actor answering state queries.
pub trait StateQuery: MachineMsg {
    type State: Copy + Eq + Debug + Send + 'static;

    fn is(state: Self::State, reply: crossbeam_channel::Sender<bool>) -> Self;
}

impl<M: MachineMsg> MachineContext<M::Trigger> for Context<M> {
    fn now(&self) -> Instant {
        Context::now(self)
    }

    fn invalidate_timers(&mut self) {
        self.cancel();
    }

    fn schedule_repeat(&mut self, after: Duration) {
        self.schedule_delay(after, M::repeat());
    }

    fn defer_trigger(&mut self, trigger: M::Trigger) {
        self.defer(M::fire(trigger));
    }
}
