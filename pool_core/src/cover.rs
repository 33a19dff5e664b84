//! Serial microcontroller driving the cover motor and the fresh water meter.
use std::time::Duration;

use crossbeam_channel::Sender;
use pool_traits::{Cover as CoverDevice, WaterMeter};

use crate::actor::{Actor, Context};
use crate::error::BuildError;
use crate::hsm::{Machine, MachineMsg, Repeat, State, StateQuery, Transition};
use crate::hw_error::log_device;
use crate::status::Encoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoverState {
    Halt,
    Run,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverTrigger {
    Run,
    Halt,
}

pub enum CoverMsg {
    Fire(CoverTrigger),
    Repeat,
    Is(CoverState, Sender<bool>),
    Open,
    Close,
    Stop,
    Position(Sender<Option<u8>>),
    RestoreWaterCounter(u64),
}

impl MachineMsg for CoverMsg {
    type Trigger = CoverTrigger;

    fn fire(trigger: CoverTrigger) -> Self {
        CoverMsg::Fire(trigger)
    }

    fn repeat() -> Self {
        CoverMsg::Repeat
    }
}

impl StateQuery for CoverMsg {
    type State = CoverState;

    fn is(state: CoverState, reply: Sender<bool>) -> Self {
        CoverMsg::Is(state, reply)
    }
}

pub struct CoverModel {
    cover: Box<dyn CoverDevice>,
    meter: Box<dyn WaterMeter>,
    water_counter: u64,
    last_pulses: Option<u64>,
    encoder: Encoder,
}

impl CoverModel {
    pub fn water_counter(&self) -> u64 {
        self.water_counter
    }

    fn stop(&mut self) {
        log_device("cover", self.cover.stop());
    }

    fn position(&mut self) -> Option<u8> {
        match self.cover.position() {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(error = %e, "unable to read cover position");
                None
            }
        }
    }
}

type CoverMachine = Machine<CoverState, CoverTrigger, CoverModel, Context<CoverMsg>>;

fn enter_halt(m: &mut CoverModel, _: &mut Context<CoverMsg>) {
    tracing::info!(state = "halt", "cover entering state");
    m.stop();
}

fn enter_run(_: &mut CoverModel, _: &mut Context<CoverMsg>) {
    tracing::info!(state = "run", "cover entering state");
}

fn repeat_run(m: &mut CoverModel, _: &mut Context<CoverMsg>, _: Duration) -> Repeat<CoverTrigger> {
    match m.meter.counter() {
        Ok(pulses) => {
            if let Some(last) = m.last_pulses
                && last != pulses
            {
                m.water_counter += pulses.saturating_sub(last);
                m.encoder.publish_retained("water/counter", m.water_counter);
            }
            m.last_pulses = Some(pulses);
        }
        Err(e) => tracing::error!(error = %e, "unable to read water counter, not updating the value"),
    }
    Repeat::Continue
}

fn machine(refresh: Duration) -> Result<CoverMachine, BuildError> {
    use CoverState as S;
    use CoverTrigger as T;
    Machine::builder("cover", S::Halt)
        .state(State::new(S::Halt).on_enter(enter_halt))
        .state(State::new(S::Run).on_enter(enter_run).repeat(repeat_run, refresh))
        .transition(Transition::new(T::Run, &[S::Halt], S::Run))
        .transition(Transition::new(T::Halt, &[S::Run], S::Halt))
        .build()
}

/// Cover and water meter actor.
pub struct Cover {
    machine: CoverMachine,
    model: CoverModel,
}

impl Cover {
    pub fn new(
        cover: Box<dyn CoverDevice>,
        meter: Box<dyn WaterMeter>,
        encoder: Encoder,
        refresh: Duration,
    ) -> Result<Self, BuildError> {
        Ok(Self {
            machine: machine(refresh)?,
            model: CoverModel {
                cover,
                meter,
                water_counter: 0,
                last_pulses: None,
                encoder,
            },
        })
    }

    pub fn state(&self) -> CoverState {
        self.machine.state()
    }

    pub fn model(&self) -> &CoverModel {
        &self.model
    }
}

impl Actor for Cover {
    type Msg = CoverMsg;

    fn started(&mut self, ctx: &mut Context<CoverMsg>) {
        self.machine.start(&mut self.model, ctx);
    }

    fn handle(&mut self, msg: CoverMsg, ctx: &mut Context<CoverMsg>) {
        match msg {
            CoverMsg::Fire(t) => {
                self.machine.fire(t, &mut self.model, ctx);
            }
            CoverMsg::Repeat => self.machine.repeat(&mut self.model, ctx),
            CoverMsg::Is(state, reply) => {
                let _ = reply.send(self.machine.is(state));
            }
            CoverMsg::Open => log_device("cover", self.model.cover.open()),
            CoverMsg::Close => log_device("cover", self.model.cover.close()),
            CoverMsg::Stop => self.model.stop(),
            CoverMsg::Position(reply) => {
                let _ = reply.send(self.model.position());
            }
            CoverMsg::RestoreWaterCounter(value) => {
                self.model.water_counter = value;
                tracing::info!(value, "water counter restored");
            }
        }
    }
}
