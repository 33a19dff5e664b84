//! Test and helper doubles for pool_core.
//!
//! Stub peers stand in for the actors an actor under test talks to: they
//! record every command and answer queries from a configurable state set.
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::cover::{CoverState, CoverTrigger};
use crate::error::AskError;
use crate::filtration::{FiltrationState, FiltrationTrigger};
use crate::interlock::{CoverPort, FiltrationPort, MachinePort, PwmPort, ReadingsPort, Reply, TankPort};
use crate::sensor::Probe;
use crate::status::StatusSink;
use crate::tank::{TankMode, TankState, TankTrigger};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// Status sink keeping every publication in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    publications: Mutex<Vec<Publication>>,
}

impl RecordingSink {
    pub fn publications(&self) -> Vec<Publication> {
        lock(&self.publications).clone()
    }

    pub fn last(&self, topic: &str) -> Option<String> {
        lock(&self.publications)
            .iter()
            .rev()
            .find(|p| p.topic == topic)
            .map(|p| p.payload.clone())
    }

    pub fn count(&self, topic: &str) -> usize {
        lock(&self.publications)
            .iter()
            .filter(|p| p.topic == topic)
            .count()
    }
}

impl StatusSink for RecordingSink {
    fn publish(&self, topic: &str, payload: &str, retain: bool) {
        lock(&self.publications).push(Publication {
            topic: topic.to_string(),
            payload: payload.to_string(),
            retain,
        });
    }
}

struct StubInner<S, T> {
    active: Vec<S>,
    fired: Vec<T>,
    commands: Vec<String>,
    silent: bool,
    late_requests: bool,
    accept_requests: bool,
}

/// Stand-in for a state-machine peer.
pub struct StubMachine<S, T> {
    inner: Arc<Mutex<StubInner<S, T>>>,
}

impl<S, T> Clone for StubMachine<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, T> StubMachine<S, T>
where
    S: Copy + PartialEq + Send + 'static,
    T: Copy + PartialEq + Send + 'static,
{
    /// Peer whose active path is `active`.
    pub fn new(active: &[S]) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StubInner {
                active: active.to_vec(),
                fired: Vec::new(),
                commands: Vec::new(),
                silent: false,
                late_requests: false,
                accept_requests: true,
            })),
        }
    }

    pub fn set_active(&self, active: &[S]) {
        lock(&self.inner).active = active.to_vec();
    }

    /// Make every query time out.
    pub fn set_silent(&self, silent: bool) {
        lock(&self.inner).silent = silent;
    }

    /// Record requests but time out on the reply, as if processed late.
    pub fn set_late_requests(&self, late: bool) {
        lock(&self.inner).late_requests = late;
    }

    pub fn set_accept_requests(&self, accept: bool) {
        lock(&self.inner).accept_requests = accept;
    }

    pub fn fired(&self) -> Vec<T> {
        lock(&self.inner).fired.clone()
    }

    pub fn was_fired(&self, trigger: T) -> bool {
        lock(&self.inner).fired.contains(&trigger)
    }

    pub fn commands(&self) -> Vec<String> {
        lock(&self.inner).commands.clone()
    }

    pub fn clear(&self) {
        let mut inner = lock(&self.inner);
        inner.fired.clear();
        inner.commands.clear();
    }

    fn command(&self, name: impl Into<String>) {
        lock(&self.inner).commands.push(name.into());
    }
}

impl<S, T> MachinePort<S, T> for StubMachine<S, T>
where
    S: Copy + PartialEq + Send + 'static,
    T: Copy + PartialEq + Send + 'static,
{
    fn is(&self, state: S) -> Reply<bool> {
        let inner = lock(&self.inner);
        if inner.silent {
            return Err(AskError::Timeout("stub"));
        }
        Ok(inner.active.contains(&state))
    }

    fn fire(&self, trigger: T) {
        lock(&self.inner).fired.push(trigger);
    }
}

impl FiltrationPort for StubMachine<FiltrationState, FiltrationTrigger> {
    fn request(&self, trigger: FiltrationTrigger) -> Reply<bool> {
        let mut inner = lock(&self.inner);
        if inner.silent {
            return Err(AskError::Timeout("stub"));
        }
        inner.fired.push(trigger);
        if inner.late_requests {
            return Err(AskError::Timeout("stub"));
        }
        Ok(inner.accept_requests)
    }
}

impl TankPort for StubMachine<TankState, TankTrigger> {
    fn set_mode(&self, mode: TankMode) {
        self.command(format!("mode {mode:?}"));
    }
}

/// Cover stub reporting a settable position.
#[derive(Clone)]
pub struct StubCover {
    machine: StubMachine<CoverState, CoverTrigger>,
    position: Arc<Mutex<Option<u8>>>,
}

impl StubCover {
    pub fn new(position: u8) -> Self {
        Self {
            machine: StubMachine::new(&[CoverState::Halt]),
            position: Arc::new(Mutex::new(Some(position))),
        }
    }

    pub fn set_position(&self, position: Option<u8>) {
        *lock(&self.position) = position;
    }

    pub fn commands(&self) -> Vec<String> {
        self.machine.commands()
    }

    pub fn fired(&self) -> Vec<CoverTrigger> {
        self.machine.fired()
    }
}

impl MachinePort<CoverState, CoverTrigger> for StubCover {
    fn is(&self, state: CoverState) -> Reply<bool> {
        self.machine.is(state)
    }

    fn fire(&self, trigger: CoverTrigger) {
        self.machine.fire(trigger);
    }
}

impl CoverPort for StubCover {
    fn open(&self) {
        self.machine.command("open");
    }

    fn close(&self) {
        self.machine.command("close");
    }

    fn stop(&self) {
        self.machine.command("stop");
    }

    fn position(&self) -> Reply<Option<u8>> {
        Ok(*lock(&self.position))
    }
}

/// Readings stub with settable values per probe.
#[derive(Clone, Default)]
pub struct StubReadings {
    values: Arc<Mutex<HashMap<Probe, f64>>>,
}

impl StubReadings {
    pub fn set(&self, probe: Probe, value: Option<f64>) {
        let mut values = lock(&self.values);
        match value {
            Some(v) => values.insert(probe, v),
            None => values.remove(&probe),
        };
    }
}

impl ReadingsPort for StubReadings {
    fn reading(&self, probe: Probe) -> Reply<Option<f64>> {
        Ok(lock(&self.values).get(&probe).copied())
    }
}

#[derive(Debug, Default)]
struct PwmRecord {
    value: f64,
    running: bool,
    cancels: u32,
    period: Option<Duration>,
}

/// PWM stub remembering the last duty and run state.
#[derive(Clone, Default)]
pub struct StubPwm {
    record: Arc<Mutex<PwmRecord>>,
}

impl StubPwm {
    pub fn value(&self) -> f64 {
        lock(&self.record).value
    }

    pub fn is_running(&self) -> bool {
        lock(&self.record).running
    }

    pub fn cancels(&self) -> u32 {
        lock(&self.record).cancels
    }

    pub fn period(&self) -> Option<Duration> {
        lock(&self.record).period
    }
}

impl PwmPort for StubPwm {
    fn run(&self) {
        lock(&self.record).running = true;
    }

    fn cancel(&self) {
        let mut r = lock(&self.record);
        r.running = false;
        r.cancels += 1;
    }

    fn set_value(&self, value: f64) {
        lock(&self.record).value = value;
    }

    fn set_period(&self, period: Duration) {
        lock(&self.record).period = Some(period);
    }
}

impl<S: Debug, T: Debug> Debug for StubMachine<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("StubMachine")
            .field("active", &inner.active)
            .field("fired", &inner.fired)
            .finish_non_exhaustive()
    }
}
