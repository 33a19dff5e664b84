//! Cross-actor interlock contract.
//!
//! Each actor holds typed handles to the peers it legitimately talks to,
//! injected at wiring time. Commands are fire-and-forget triggers; they are
//! idempotent because a trigger the peer's current state does not accept is
//! ignored. Queries are bounded `ask`s: an `Err` means "unknown", and every
//! call site picks the safe default for its own decision.
use std::time::Duration;

use crate::actor::Addr;
use crate::cover::{CoverMsg, CoverState, CoverTrigger};
use crate::error::AskError;
use crate::filtration::{FiltrationMsg, FiltrationState, FiltrationTrigger};
use crate::hsm::{MachineMsg, StateQuery};
use crate::pwm::PwmMsg;
use crate::sensor::{Probe, ReaderMsg};
use crate::tank::{TankMode, TankMsg, TankState, TankTrigger};

pub type Reply<T> = Result<T, AskError>;

/// Query and command surface of a state-machine actor.
pub trait MachinePort<S, T>: Send {
    /// True if `state` is on the peer's active path.
    fn is(&self, state: S) -> Reply<bool>;
    fn fire(&self, trigger: T);
}

impl<M: StateQuery> MachinePort<M::State, M::Trigger> for Addr<M> {
    fn is(&self, state: M::State) -> Reply<bool> {
        self.ask(|reply| M::is(state, reply))
    }

    fn fire(&self, trigger: M::Trigger) {
        self.send(M::fire(trigger));
    }
}

pub trait FiltrationPort: MachinePort<FiltrationState, FiltrationTrigger> {
    /// Fire and wait until it was processed. True if a transition was taken.
    fn request(&self, trigger: FiltrationTrigger) -> Reply<bool>;
}

impl FiltrationPort for Addr<FiltrationMsg> {
    fn request(&self, trigger: FiltrationTrigger) -> Reply<bool> {
        self.ask(|reply| FiltrationMsg::Request(trigger, reply))
    }
}

pub trait TankPort: MachinePort<TankState, TankTrigger> {
    fn set_mode(&self, mode: TankMode);

    /// Halted, filling or low: not enough water to draw from.
    fn is_low(&self) -> Reply<bool> {
        Ok(self.is(TankState::Halt)? || self.is(TankState::Fill)? || self.is(TankState::Low)?)
    }
}

impl TankPort for Addr<TankMsg> {
    fn set_mode(&self, mode: TankMode) {
        self.send(TankMsg::SetMode(mode));
    }
}

pub trait CoverPort: MachinePort<CoverState, CoverTrigger> {
    fn open(&self);
    fn close(&self);
    fn stop(&self);
    /// Position in percent, `None` when the controller could not be read.
    fn position(&self) -> Reply<Option<u8>>;
}

impl CoverPort for Addr<CoverMsg> {
    fn open(&self) {
        self.send(CoverMsg::Open);
    }

    fn close(&self) {
        self.send(CoverMsg::Close);
    }

    fn stop(&self) {
        self.send(CoverMsg::Stop);
    }

    fn position(&self) -> Reply<Option<u8>> {
        self.ask(CoverMsg::Position)
    }
}

pub trait ReadingsPort: Send {
    /// Averaged value of a probe, `None` without samples.
    fn reading(&self, probe: Probe) -> Reply<Option<f64>>;
}

impl ReadingsPort for Addr<ReaderMsg> {
    fn reading(&self, probe: Probe) -> Reply<Option<f64>> {
        self.ask(|reply| ReaderMsg::Reading(probe, reply))
    }
}

pub trait PwmPort: Send {
    fn run(&self);
    fn cancel(&self);
    fn set_value(&self, value: f64);
    fn set_period(&self, period: Duration);
}

impl PwmPort for Addr<PwmMsg> {
    fn run(&self) {
        self.send(PwmMsg::Run);
    }

    fn cancel(&self) {
        self.send(PwmMsg::Cancel);
    }

    fn set_value(&self, value: f64) {
        self.send(PwmMsg::SetValue(value));
    }

    fn set_period(&self, period: Duration) {
        self.send(PwmMsg::SetPeriod(period));
    }
}

/// Start a peer whose start trigger also has other meanings outside `halt`.
pub fn start_if_halted<S, T, P>(peer: &P, halt: S, start: T)
where
    P: MachinePort<S, T> + ?Sized,
{
    match peer.is(halt) {
        Ok(true) => peer.fire(start),
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, "peer did not answer, not starting it"),
    }
}

/// Fire a trigger through any machine actor's address.
pub fn fire<M: MachineMsg>(addr: &Addr<M>, trigger: M::Trigger) -> bool {
    addr.send(M::fire(trigger))
}
