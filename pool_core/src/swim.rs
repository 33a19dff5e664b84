//! Swim (counter-current) pump.
//!
//! Only runs while Filtration has the pool opened or is wintering. During
//! wintering the pump is stirred periodically so the swim circuit does not
//! freeze when the technical room gets cold.
use std::time::Duration;

use crossbeam_channel::Sender;
use pool_traits::SpeedPump;

use crate::actor::{Actor, Context};
use crate::config::{SwimCfg, WinteringCfg};
use crate::error::BuildError;
use crate::filtration::FiltrationState;
use crate::hsm::{Machine, MachineMsg, Repeat, State, StateQuery, Transition};
use crate::hw_error::log_device;
use crate::interlock::{FiltrationPort, ReadingsPort};
use crate::sensor::Probe;
use crate::status::Encoder;
use crate::util::Timer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwimState {
    Halt,
    Timed,
    Continuous,
    Wintering,
    WinteringWaiting,
    WinteringStir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwimTrigger {
    Timed,
    Continuous,
    Wintering,
    WinteringStir,
    WinteringWaiting,
    Halt,
}

pub enum SwimMsg {
    Fire(SwimTrigger),
    Repeat,
    Is(SwimState, Sender<bool>),
    Timer(Duration),
    Speed(u8),
}

impl MachineMsg for SwimMsg {
    type Trigger = SwimTrigger;

    fn fire(trigger: SwimTrigger) -> Self {
        SwimMsg::Fire(trigger)
    }

    fn repeat() -> Self {
        SwimMsg::Repeat
    }
}

impl StateQuery for SwimMsg {
    type State = SwimState;

    fn is(state: SwimState, reply: Sender<bool>) -> Self {
        SwimMsg::Is(state, reply)
    }
}

pub struct SwimModel {
    cfg: SwimCfg,
    wintering: WinteringCfg,
    timer: Timer,
    pump: Box<dyn SpeedPump>,
    filtration: Box<dyn FiltrationPort>,
    readings: Box<dyn ReadingsPort>,
    encoder: Encoder,
}

impl SwimModel {
    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    fn speed(&mut self, value: u8) {
        log_device("swim", self.pump.speed(value));
    }

    fn off(&mut self) {
        log_device("swim", self.pump.off());
    }

    fn filtration_is(&self, state: FiltrationState) -> bool {
        self.filtration.is(state).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "filtration did not answer");
            false
        })
    }

    fn publish_state(&self, state: &'static str) {
        tracing::info!(state, "swim entering state");
        self.encoder.state("swim", state);
    }
}

fn filtration_is_wintering(m: &SwimModel) -> bool {
    m.filtration_is(FiltrationState::WinteringWaiting) || m.filtration_is(FiltrationState::WinteringStir)
}

fn filtration_allows_swim(m: &SwimModel) -> bool {
    m.filtration_is(FiltrationState::OverflowNormal)
        || m.filtration_is(FiltrationState::StandbyNormal)
        || m.filtration_is(FiltrationState::Comfort)
        || filtration_is_wintering(m)
}

type SwimMachine = Machine<SwimState, SwimTrigger, SwimModel, Context<SwimMsg>>;

fn enter_halt(m: &mut SwimModel, _: &mut Context<SwimMsg>) {
    m.publish_state("halt");
    m.off();
}

fn enter_timed(m: &mut SwimModel, _: &mut Context<SwimMsg>) {
    m.publish_state("timed");
    m.timer.reset();
}

fn repeat_timed(m: &mut SwimModel, ctx: &mut Context<SwimMsg>, _: Duration) -> Repeat<SwimTrigger> {
    let speed = m.cfg.speed;
    m.speed(speed);
    m.timer.update(ctx.wall_now(), 1.0);
    if m.timer.elapsed() {
        Repeat::Transition(SwimTrigger::Halt)
    } else {
        Repeat::Continue
    }
}

fn enter_continuous(m: &mut SwimModel, _: &mut Context<SwimMsg>) {
    m.publish_state("continuous");
}

fn repeat_continuous(m: &mut SwimModel, _: &mut Context<SwimMsg>, _: Duration) -> Repeat<SwimTrigger> {
    let speed = m.cfg.speed;
    m.speed(speed);
    Repeat::Continue
}

fn enter_wintering_waiting(m: &mut SwimModel, _: &mut Context<SwimMsg>) {
    m.publish_state("wintering_waiting");
    m.off();
}

fn repeat_wintering_waiting(m: &mut SwimModel, _: &mut Context<SwimMsg>, in_state: Duration) -> Repeat<SwimTrigger> {
    if in_state > m.wintering.swim_period {
        let cold = match m.readings.reading(Probe::Ncc) {
            Ok(Some(t)) => t <= m.wintering.swim_only_below,
            _ => true,
        };
        if cold {
            return Repeat::Transition(SwimTrigger::WinteringStir);
        }
    }
    Repeat::Continue
}

fn enter_wintering_stir(m: &mut SwimModel, ctx: &mut Context<SwimMsg>) {
    m.publish_state("wintering_stir");
    let max = m.pump.max_speed();
    m.speed(max);
    ctx.schedule_delay(
        m.wintering.swim_duration,
        SwimMsg::Fire(SwimTrigger::WinteringWaiting),
    );
}

fn machine(cfg: &SwimCfg) -> Result<SwimMachine, BuildError> {
    use SwimState as S;
    use SwimTrigger as T;
    Machine::builder("swim", S::Halt)
        .state(State::new(S::Halt).on_enter(enter_halt))
        .state(State::new(S::Timed).on_enter(enter_timed).repeat(repeat_timed, cfg.refresh))
        .state(
            State::new(S::Continuous)
                .on_enter(enter_continuous)
                .repeat(repeat_continuous, cfg.refresh),
        )
        .state(State::new(S::Wintering).initial(S::WinteringWaiting))
        .state(
            State::new(S::WinteringWaiting)
                .parent(S::Wintering)
                .on_enter(enter_wintering_waiting)
                .repeat(repeat_wintering_waiting, cfg.wintering_poll),
        )
        .state(
            State::new(S::WinteringStir)
                .parent(S::Wintering)
                .on_enter(enter_wintering_stir),
        )
        .transition(Transition::new(T::Timed, &[S::Halt, S::Continuous], S::Timed).when(filtration_allows_swim))
        .transition(
            Transition::new(T::Continuous, &[S::Halt, S::Timed], S::Continuous).when(filtration_allows_swim),
        )
        .transition(Transition::new(T::Wintering, &[S::Halt], S::Wintering).when(filtration_is_wintering))
        .transition(Transition::new(T::WinteringStir, &[S::WinteringWaiting], S::WinteringStir))
        .transition(Transition::new(T::WinteringWaiting, &[S::WinteringStir], S::WinteringWaiting))
        .transition(Transition::new(
            T::Halt,
            &[S::Timed, S::Continuous, S::Wintering],
            S::Halt,
        ))
        .build()
}

pub struct Swim {
    machine: SwimMachine,
    model: SwimModel,
}

impl Swim {
    pub fn new(
        cfg: SwimCfg,
        wintering: WinteringCfg,
        pump: Box<dyn SpeedPump>,
        filtration: Box<dyn FiltrationPort>,
        readings: Box<dyn ReadingsPort>,
        encoder: Encoder,
    ) -> Result<Self, BuildError> {
        let mut timer = Timer::new("swim");
        timer.set_delay(cfg.timer);
        Ok(Self {
            machine: machine(&cfg)?,
            model: SwimModel {
                cfg,
                wintering,
                timer,
                pump,
                filtration,
                readings,
                encoder,
            },
        })
    }

    pub fn state(&self) -> SwimState {
        self.machine.state()
    }

    pub fn model(&self) -> &SwimModel {
        &self.model
    }
}

impl Actor for Swim {
    type Msg = SwimMsg;

    fn started(&mut self, ctx: &mut Context<SwimMsg>) {
        self.machine.start(&mut self.model, ctx);
    }

    fn handle(&mut self, msg: SwimMsg, ctx: &mut Context<SwimMsg>) {
        match msg {
            SwimMsg::Fire(t) => {
                self.machine.fire(t, &mut self.model, ctx);
            }
            SwimMsg::Repeat => self.machine.repeat(&mut self.model, ctx),
            SwimMsg::Is(state, reply) => {
                let _ = reply.send(self.machine.is(state));
            }
            SwimMsg::Timer(d) => {
                self.model.timer.set_delay(d);
                tracing::info!(timer = ?d, "swim timer set");
            }
            SwimMsg::Speed(v) => {
                self.model.cfg.speed = v;
                tracing::info!(speed = v, "swim pump speed set");
            }
        }
    }
}
