//! Buffer tank level controller.
//!
//! The tank collects the overflow water and feeds the filtration pump. Its
//! main valve refills it from the mains while the level is low. Levels are in
//! percent of the tank height and depend on the filtration mode (eco or
//! overflow). Dwelling too long in `fill` or `low`, or a level below
//! `too_low` while low, halts the whole plant through Filtration.
use std::time::Duration;

use crossbeam_channel::Sender;
use pool_traits::{Sensor, Switch};

use crate::actor::{Actor, Context};
use crate::config::{Levels, TankCfg};
use crate::error::BuildError;
use crate::filtration::FiltrationTrigger;
use crate::hsm::{Machine, MachineMsg, Repeat, State, StateQuery, Transition};
use crate::hw_error::{log_device, map_hw_error};
use crate::interlock::FiltrationPort;
use crate::status::Encoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TankState {
    Halt,
    Fill,
    Low,
    Normal,
    High,
}

impl TankState {
    pub fn name(self) -> &'static str {
        match self {
            TankState::Halt => "halt",
            TankState::Fill => "fill",
            TankState::Low => "low",
            TankState::Normal => "normal",
            TankState::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TankTrigger {
    Fill,
    Low,
    Normal,
    High,
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TankMode {
    Eco,
    Overflow,
}

pub enum TankMsg {
    Fire(TankTrigger),
    Repeat,
    Is(TankState, Sender<bool>),
    SetMode(TankMode),
    ForceEmpty(bool),
}

impl MachineMsg for TankMsg {
    type Trigger = TankTrigger;

    fn fire(trigger: TankTrigger) -> Self {
        TankMsg::Fire(trigger)
    }

    fn repeat() -> Self {
        TankMsg::Repeat
    }
}

impl StateQuery for TankMsg {
    type State = TankState;

    fn is(state: TankState, reply: Sender<bool>) -> Self {
        TankMsg::Is(state, reply)
    }
}

pub struct TankDevices {
    pub level: Box<dyn Sensor>,
    pub main_valve: Box<dyn Switch>,
}

pub struct TankModel {
    cfg: TankCfg,
    levels: Levels,
    force_empty: bool,
    /// First level check after entering `fill`.
    fill_entry: bool,
    devices: TankDevices,
    filtration: Box<dyn FiltrationPort>,
    encoder: Encoder,
}

impl TankModel {
    pub fn levels(&self) -> Levels {
        self.levels
    }

    pub fn is_force_empty(&self) -> bool {
        self.force_empty
    }

    fn set_mode(&mut self, mode: TankMode) {
        tracing::info!(?mode, "tank levels set");
        self.levels = match mode {
            TankMode::Eco => self.cfg.eco,
            TankMode::Overflow => self.cfg.overflow,
        };
    }

    fn height(&mut self) -> Option<f64> {
        match self.devices.level.read() {
            Ok(h) => {
                tracing::debug!(height = h, "tank level");
                self.encoder.publish("tank/height", h.round() as i64);
                Some(h)
            }
            Err(e) => {
                let err = map_hw_error(e.as_ref());
                tracing::warn!(error = %err, "tank level unavailable, holding");
                None
            }
        }
    }

    fn valve(&mut self, on: bool) {
        let result = if on {
            self.devices.main_valve.on()
        } else {
            self.devices.main_valve.off()
        };
        log_device("main", result);
    }

    fn enter(&mut self, state: TankState, valve: bool) {
        tracing::info!(state = state.name(), "tank entering state");
        self.encoder.state("tank", state.name());
        self.valve(valve);
    }

    fn halt_plant(&self, reason: &'static str) {
        tracing::warn!(reason, "stopping everything");
        self.filtration.fire(FiltrationTrigger::Halt);
    }
}

type TankMachine = Machine<TankState, TankTrigger, TankModel, Context<TankMsg>>;

fn enter_halt(m: &mut TankModel, _: &mut Context<TankMsg>) {
    m.enter(TankState::Halt, false);
}

fn enter_fill(m: &mut TankModel, _: &mut Context<TankMsg>) {
    tracing::info!(state = "fill", "tank entering state");
    m.encoder.state("tank", "fill");
    m.fill_entry = true;
}

fn enter_low(m: &mut TankModel, _: &mut Context<TankMsg>) {
    m.enter(TankState::Low, true);
}

fn enter_normal(m: &mut TankModel, _: &mut Context<TankMsg>) {
    m.enter(TankState::Normal, false);
}

fn enter_high(m: &mut TankModel, _: &mut Context<TankMsg>) {
    m.enter(TankState::High, false);
}

fn repeat_fill(m: &mut TankModel, _: &mut Context<TankMsg>, in_state: Duration) -> Repeat<TankTrigger> {
    if in_state > m.cfg.fill_timeout {
        m.halt_plant("tank too long in fill state");
        return Repeat::Stop;
    }
    let Some(height) = m.height() else {
        return Repeat::Continue;
    };
    let first = std::mem::take(&mut m.fill_entry);
    if first {
        if height >= m.cfg.too_low {
            return Repeat::Transition(TankTrigger::Normal);
        }
        m.valve(true);
    } else if height > m.cfg.too_low {
        return Repeat::Transition(TankTrigger::Low);
    }
    Repeat::Continue
}

fn repeat_low(m: &mut TankModel, _: &mut Context<TankMsg>, in_state: Duration) -> Repeat<TankTrigger> {
    if in_state > m.cfg.low_timeout {
        m.halt_plant("tank too long in low state");
        return Repeat::Stop;
    }
    let Some(height) = m.height() else {
        return Repeat::Continue;
    };
    if height >= m.levels.low + m.cfg.hysteresis {
        return Repeat::Transition(TankTrigger::Normal);
    }
    if height < m.cfg.too_low {
        tracing::warn!(height, "tank too low");
        m.halt_plant("tank too low");
        return Repeat::Stop;
    }
    Repeat::Continue
}

fn repeat_normal(m: &mut TankModel, _: &mut Context<TankMsg>, _: Duration) -> Repeat<TankTrigger> {
    match m.height() {
        Some(h) if h < m.levels.low - m.cfg.hysteresis => Repeat::Transition(TankTrigger::Low),
        Some(h) if h >= m.levels.high + m.cfg.hysteresis => Repeat::Transition(TankTrigger::High),
        _ => Repeat::Continue,
    }
}

fn repeat_high(m: &mut TankModel, _: &mut Context<TankMsg>, _: Duration) -> Repeat<TankTrigger> {
    match m.height() {
        Some(h) if h < m.levels.high - m.cfg.hysteresis => Repeat::Transition(TankTrigger::Normal),
        _ => Repeat::Continue,
    }
}

fn is_force_empty(m: &TankModel) -> bool {
    m.force_empty
}

fn machine(refresh: Duration) -> Result<TankMachine, BuildError> {
    use TankState as S;
    use TankTrigger as T;
    let running = [S::Fill, S::Low, S::Normal, S::High];
    Machine::builder("tank", S::Halt)
        .state(State::new(S::Halt).on_enter(enter_halt))
        .state(State::new(S::Fill).on_enter(enter_fill).repeat(repeat_fill, refresh / 2))
        .state(State::new(S::Low).on_enter(enter_low).repeat(repeat_low, refresh / 2))
        .state(State::new(S::Normal).on_enter(enter_normal).repeat(repeat_normal, refresh))
        .state(State::new(S::High).on_enter(enter_high).repeat(repeat_high, refresh * 2))
        .transition(Transition::new(T::Low, &[S::Fill, S::Normal], S::Low))
        .transition(Transition::new(T::Normal, &[S::Fill, S::Low, S::High], S::Normal))
        .transition(Transition::new(T::High, &[S::Fill, S::Normal], S::High))
        .transition(Transition::new(T::Halt, &running, S::Halt))
        .transition(Transition::new(T::Fill, &[S::Halt], S::Fill).unless(is_force_empty))
        .build()
}

pub struct Tank {
    machine: TankMachine,
    model: TankModel,
}

impl Tank {
    pub fn new(
        cfg: TankCfg,
        devices: TankDevices,
        filtration: Box<dyn FiltrationPort>,
        encoder: Encoder,
    ) -> Result<Self, BuildError> {
        Ok(Self {
            machine: machine(cfg.refresh)?,
            model: TankModel {
                levels: cfg.eco,
                cfg,
                force_empty: false,
                fill_entry: false,
                devices,
                filtration,
                encoder,
            },
        })
    }

    pub fn state(&self) -> TankState {
        self.machine.state()
    }

    pub fn model(&self) -> &TankModel {
        &self.model
    }

    fn set_force_empty(&mut self, value: bool, ctx: &mut Context<TankMsg>) {
        let previous = std::mem::replace(&mut self.model.force_empty, value);
        tracing::info!(enabled = value, "force empty tank");
        let halted = self.machine.is(TankState::Halt);
        if !previous && value && !halted {
            self.model.halt_plant("force empty enabled while running");
        } else if previous && !value && halted {
            ctx.defer(TankMsg::Fire(TankTrigger::Fill));
        }
    }
}

impl Actor for Tank {
    type Msg = TankMsg;

    fn started(&mut self, ctx: &mut Context<TankMsg>) {
        self.machine.start(&mut self.model, ctx);
    }

    fn handle(&mut self, msg: TankMsg, ctx: &mut Context<TankMsg>) {
        match msg {
            TankMsg::Fire(t) => {
                self.machine.fire(t, &mut self.model, ctx);
            }
            TankMsg::Repeat => self.machine.repeat(&mut self.model, ctx),
            TankMsg::Is(state, reply) => {
                let _ = reply.send(self.machine.is(state));
            }
            TankMsg::SetMode(mode) => self.model.set_mode(mode),
            TankMsg::ForceEmpty(value) => self.set_force_empty(value, ctx),
        }
    }
}
