use crossbeam_channel::Sender;
use pool_traits::Switch;

use crate::actor::{Actor, Context};
use crate::error::BuildError;
use crate::hsm::{Machine, MachineMsg, State, StateQuery, Transition};
use crate::hw_error::log_device;
use crate::status::Encoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightState {
    Halt,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightTrigger {
    On,
    Halt,
}

pub enum LightMsg {
    Fire(LightTrigger),
    Repeat,
    Is(LightState, Sender<bool>),
}

impl MachineMsg for LightMsg {
    type Trigger = LightTrigger;

    fn fire(trigger: LightTrigger) -> Self {
        LightMsg::Fire(trigger)
    }

    fn repeat() -> Self {
        LightMsg::Repeat
    }
}

impl StateQuery for LightMsg {
    type State = LightState;

    fn is(state: LightState, reply: Sender<bool>) -> Self {
        LightMsg::Is(state, reply)
    }
}

pub struct LightModel {
    switch: Box<dyn Switch>,
    encoder: Encoder,
}

type LightMachine = Machine<LightState, LightTrigger, LightModel, Context<LightMsg>>;

fn enter_halt(m: &mut LightModel, _: &mut Context<LightMsg>) {
    tracing::info!(state = "halt", "light entering state");
    m.encoder.state("light", "halt");
    log_device("light", m.switch.off());
}

fn enter_on(m: &mut LightModel, _: &mut Context<LightMsg>) {
    tracing::info!(state = "on", "light entering state");
    m.encoder.state("light", "on");
    log_device("light", m.switch.on());
}

/// Pool light.
pub struct Light {
    machine: LightMachine,
    model: LightModel,
}

impl Light {
    pub fn new(switch: Box<dyn Switch>, encoder: Encoder) -> Result<Self, BuildError> {
        use LightState as S;
        use LightTrigger as T;
        let machine = Machine::builder("light", S::Halt)
            .state(State::new(S::Halt).on_enter(enter_halt))
            .state(State::new(S::On).on_enter(enter_on))
            .transition(Transition::new(T::On, &[S::Halt], S::On))
            .transition(Transition::new(T::Halt, &[S::On], S::Halt))
            .build()?;
        Ok(Self {
            machine,
            model: LightModel { switch, encoder },
        })
    }

    pub fn state(&self) -> LightState {
        self.machine.state()
    }
}

impl Actor for Light {
    type Msg = LightMsg;

    fn started(&mut self, ctx: &mut Context<LightMsg>) {
        self.machine.start(&mut self.model, ctx);
    }

    fn handle(&mut self, msg: LightMsg, ctx: &mut Context<LightMsg>) {
        match msg {
            LightMsg::Fire(t) => {
                self.machine.fire(t, &mut self.model, ctx);
            }
            LightMsg::Repeat => self.machine.repeat(&mut self.model, ctx),
            LightMsg::Is(state, reply) => {
                let _ = reply.send(self.machine.is(state));
            }
        }
    }
}
