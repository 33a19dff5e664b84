//! Heat pump (`Heating`) and technical room frost heater (`Heater`).
//!
//! Heating runs at most once a day, after `start_hour`, while the pool is
//! below its setpoint and the air is warm enough for the heat pump to be
//! efficient. It needs Filtration in `heating.running`: the waiting loop asks
//! Filtration to switch to heating and only starts once it has.
use std::time::Duration;

use chrono::NaiveDateTime;
use crossbeam_channel::Sender;
use pool_traits::Switch;

use crate::actor::{Actor, Context};
use crate::config::{HeaterCfg, HeatingCfg};
use crate::error::BuildError;
use crate::filtration::{FiltrationState, FiltrationTrigger};
use crate::hsm::{Machine, MachineMsg, Repeat, State, StateQuery, Transition};
use crate::hw_error::log_device;
use crate::interlock::{FiltrationPort, ReadingsPort};
use crate::sensor::Probe;
use crate::status::Encoder;
use crate::util::{DAY, RunCounter, add, at_hour};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeatingState {
    Halt,
    Waiting,
    Heating,
    Forcing,
    Recovering,
}

impl HeatingState {
    pub fn name(self) -> &'static str {
        match self {
            HeatingState::Halt => "halt",
            HeatingState::Waiting => "waiting",
            HeatingState::Heating => "heating",
            HeatingState::Forcing => "forcing",
            HeatingState::Recovering => "recovering",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatingTrigger {
    Wait,
    Heat,
    Force,
    RecoverDone,
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeatingSetting {
    Enable(bool),
    Setpoint(f64),
    StartHour(u32),
    MinTemp(f64),
    /// Restore the persisted total run time.
    TotalSeconds(u64),
}

pub enum HeatingMsg {
    Fire(HeatingTrigger),
    Repeat,
    Is(HeatingState, Sender<bool>),
    Setting(HeatingSetting),
}

impl MachineMsg for HeatingMsg {
    type Trigger = HeatingTrigger;

    fn fire(trigger: HeatingTrigger) -> Self {
        HeatingMsg::Fire(trigger)
    }

    fn repeat() -> Self {
        HeatingMsg::Repeat
    }
}

impl StateQuery for HeatingMsg {
    type State = HeatingState;

    fn is(state: HeatingState, reply: Sender<bool>) -> Self {
        HeatingMsg::Is(state, reply)
    }
}

pub struct HeatingModel {
    cfg: HeatingCfg,
    next_start: NaiveDateTime,
    total: RunCounter,
    valve: Box<dyn Switch>,
    filtration: Box<dyn FiltrationPort>,
    readings: Box<dyn ReadingsPort>,
    encoder: Encoder,
}

impl HeatingModel {
    pub fn next_start(&self) -> NaiveDateTime {
        self.next_start
    }

    pub fn total(&self) -> Duration {
        self.total.total()
    }

    pub fn setpoint(&self) -> f64 {
        self.cfg.setpoint
    }

    fn reading(&self, probe: Probe) -> Option<f64> {
        self.readings.reading(probe).unwrap_or_else(|e| {
            tracing::warn!(%probe, error = %e, "reading unavailable");
            None
        })
    }

    fn filtration_is(&self, state: FiltrationState) -> bool {
        self.filtration.is(state).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "filtration did not answer");
            false
        })
    }

    fn filtration_ready(&self) -> bool {
        self.filtration_is(FiltrationState::EcoWaiting) || self.filtration_is(FiltrationState::EcoNormal)
    }

    /// Tomorrow at the start hour.
    fn schedule_tomorrow(&mut self, now: NaiveDateTime) {
        self.next_start = add(at_hour(now, self.cfg.start_hour), DAY);
    }

    fn valve(&mut self, on: bool) {
        let result = if on { self.valve.on() } else { self.valve.off() };
        log_device("heating", result);
    }

    fn publish_state(&self, state: HeatingState) {
        tracing::info!(state = state.name(), "heating entering state");
        self.encoder.state("heating", state.name());
    }

    fn start_counting(&mut self, now: NaiveDateTime) {
        self.total.start(now);
        self.valve(true);
    }

    fn stop_counting(&mut self, now: NaiveDateTime) {
        let total = self.total.stop(now);
        self.encoder
            .publish_retained("heating/total_seconds", total.as_secs());
        self.valve(false);
    }

    fn apply(&mut self, setting: HeatingSetting, now: NaiveDateTime) {
        match setting {
            HeatingSetting::Enable(v) => self.cfg.enable = v,
            HeatingSetting::Setpoint(v) => {
                self.cfg.setpoint = v;
                // a new setpoint allows another run today
                if self.next_start > now {
                    self.next_start -= chrono::TimeDelta::days(1);
                }
            }
            HeatingSetting::StartHour(h) => {
                self.cfg.start_hour = h.min(23);
                self.next_start = next_occurrence(now, self.cfg.start_hour);
                tracing::info!(next = %self.next_start, "next heating scheduled");
            }
            HeatingSetting::MinTemp(v) => self.cfg.min_temp = v,
            HeatingSetting::TotalSeconds(s) => self.total.init(Duration::from_secs(s)),
        }
        tracing::info!(?setting, "heating setting applied");
    }
}

/// Today at `hour` if not past yet, tomorrow otherwise.
fn next_occurrence(now: NaiveDateTime, hour: u32) -> NaiveDateTime {
    let today = at_hour(now, hour);
    if today >= now { today } else { add(today, DAY) }
}

type HeatingMachine = Machine<HeatingState, HeatingTrigger, HeatingModel, Context<HeatingMsg>>;

fn enter_halt(m: &mut HeatingModel, _: &mut Context<HeatingMsg>) {
    m.publish_state(HeatingState::Halt);
    m.valve(false);
}

fn enter_waiting(m: &mut HeatingModel, _: &mut Context<HeatingMsg>) {
    m.publish_state(HeatingState::Waiting);
    m.valve(false);
}

fn repeat_waiting(m: &mut HeatingModel, ctx: &mut Context<HeatingMsg>, _: Duration) -> Repeat<HeatingTrigger> {
    // a request that timed out may still have landed
    if filtration_allows_heating(m) {
        if m.cfg.enable {
            return Repeat::Transition(HeatingTrigger::Heat);
        }
        m.filtration.fire(FiltrationTrigger::HeatingDelay);
        return Repeat::Continue;
    }
    let now = ctx.wall_now();
    if !m.cfg.enable || now < m.next_start {
        return Repeat::Continue;
    }
    if let Some(pool) = m.reading(Probe::Pool)
        && pool - m.cfg.hysteresis_down >= m.cfg.setpoint
    {
        m.schedule_tomorrow(now);
        tracing::info!(next = %m.next_start, "no heating needed today");
        return Repeat::Continue;
    }
    if let Some(air) = m.reading(Probe::Air)
        && air < m.cfg.min_temp
    {
        return Repeat::Continue;
    }
    if !m.filtration_ready() {
        return Repeat::Continue;
    }
    if let Err(e) = m.filtration.request(FiltrationTrigger::Heat) {
        tracing::warn!(error = %e, "filtration did not switch to heating");
    }
    if filtration_allows_heating(m) {
        Repeat::Transition(HeatingTrigger::Heat)
    } else {
        Repeat::Continue
    }
}

fn enter_heating(m: &mut HeatingModel, ctx: &mut Context<HeatingMsg>) {
    m.publish_state(HeatingState::Heating);
    m.start_counting(ctx.wall_now());
}

fn repeat_heating(m: &mut HeatingModel, _: &mut Context<HeatingMsg>, _: Duration) -> Repeat<HeatingTrigger> {
    if !m.cfg.enable {
        return Repeat::Transition(HeatingTrigger::Wait);
    }
    match m.reading(Probe::Pool) {
        Some(pool) if pool < m.cfg.setpoint + m.cfg.hysteresis_up => {}
        _ => return Repeat::Transition(HeatingTrigger::Wait),
    }
    if let Some(air) = m.reading(Probe::Air)
        && air < m.cfg.min_temp - m.cfg.hysteresis_min_temp
    {
        tracing::info!(air, "air too cold for the heat pump");
        return Repeat::Transition(HeatingTrigger::Wait);
    }
    Repeat::Continue
}

fn exit_heating(m: &mut HeatingModel, ctx: &mut Context<HeatingMsg>) {
    let now = ctx.wall_now();
    m.stop_counting(now);
    // an aborted run also counts as today's run
    m.schedule_tomorrow(now);
    tracing::info!(next = %m.next_start, "heating done for today");
    if filtration_allows_heating(m) {
        m.filtration.fire(FiltrationTrigger::HeatingDelay);
    }
}

fn enter_forcing(m: &mut HeatingModel, ctx: &mut Context<HeatingMsg>) {
    m.publish_state(HeatingState::Forcing);
    m.start_counting(ctx.wall_now());
}

fn exit_forcing(m: &mut HeatingModel, ctx: &mut Context<HeatingMsg>) {
    m.stop_counting(ctx.wall_now());
}

fn enter_recovering(m: &mut HeatingModel, ctx: &mut Context<HeatingMsg>) {
    m.publish_state(HeatingState::Recovering);
    ctx.schedule_delay(
        m.cfg.recover_period,
        HeatingMsg::Fire(HeatingTrigger::RecoverDone),
    );
}

fn filtration_allows_heating(m: &HeatingModel) -> bool {
    m.filtration_is(FiltrationState::HeatingRunning)
}

fn heating_machine(refresh: Duration) -> Result<HeatingMachine, BuildError> {
    use HeatingState as S;
    use HeatingTrigger as T;
    Machine::builder("heating", S::Halt)
        .state(State::new(S::Halt).on_enter(enter_halt))
        .state(
            State::new(S::Waiting)
                .on_enter(enter_waiting)
                .repeat(repeat_waiting, refresh),
        )
        .state(
            State::new(S::Heating)
                .on_enter(enter_heating)
                .on_exit(exit_heating)
                .repeat(repeat_heating, refresh),
        )
        .state(State::new(S::Forcing).on_enter(enter_forcing).on_exit(exit_forcing))
        .state(State::new(S::Recovering).on_enter(enter_recovering))
        .transition(Transition::new(T::Wait, &[S::Halt], S::Waiting))
        .transition(
            Transition::new(T::Heat, &[S::Halt, S::Waiting], S::Heating).when(filtration_allows_heating),
        )
        .transition(Transition::new(T::Force, &[S::Halt, S::Waiting], S::Forcing))
        .transition(Transition::new(
            T::Halt,
            &[S::Waiting, S::Heating, S::Forcing, S::Recovering],
            S::Halt,
        ))
        .transition(Transition::new(T::Wait, &[S::Heating, S::Forcing], S::Recovering))
        .transition(Transition::new(T::RecoverDone, &[S::Recovering], S::Waiting))
        .build()
}

pub struct Heating {
    machine: HeatingMachine,
    model: HeatingModel,
}

impl Heating {
    pub fn new(
        cfg: HeatingCfg,
        valve: Box<dyn Switch>,
        filtration: Box<dyn FiltrationPort>,
        readings: Box<dyn ReadingsPort>,
        encoder: Encoder,
        now: NaiveDateTime,
    ) -> Result<Self, BuildError> {
        Ok(Self {
            machine: heating_machine(cfg.refresh)?,
            model: HeatingModel {
                next_start: next_occurrence(now, cfg.start_hour),
                cfg,
                total: RunCounter::default(),
                valve,
                filtration,
                readings,
                encoder,
            },
        })
    }

    pub fn state(&self) -> HeatingState {
        self.machine.state()
    }

    pub fn model(&self) -> &HeatingModel {
        &self.model
    }
}

impl Actor for Heating {
    type Msg = HeatingMsg;

    fn started(&mut self, ctx: &mut Context<HeatingMsg>) {
        self.machine.start(&mut self.model, ctx);
    }

    fn handle(&mut self, msg: HeatingMsg, ctx: &mut Context<HeatingMsg>) {
        match msg {
            HeatingMsg::Fire(t) => {
                self.machine.fire(t, &mut self.model, ctx);
            }
            HeatingMsg::Repeat => self.machine.repeat(&mut self.model, ctx),
            HeatingMsg::Is(state, reply) => {
                let _ = reply.send(self.machine.is(state));
            }
            HeatingMsg::Setting(s) => self.model.apply(s, ctx.wall_now()),
        }
    }
}

// ── Heater ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaterState {
    Halt,
    Waiting,
    Heating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterTrigger {
    Wait,
    Heat,
    Halt,
}

pub enum HeaterMsg {
    Fire(HeaterTrigger),
    Repeat,
    Is(HeaterState, Sender<bool>),
    Setpoint(f64),
}

impl MachineMsg for HeaterMsg {
    type Trigger = HeaterTrigger;

    fn fire(trigger: HeaterTrigger) -> Self {
        HeaterMsg::Fire(trigger)
    }

    fn repeat() -> Self {
        HeaterMsg::Repeat
    }
}

impl StateQuery for HeaterMsg {
    type State = HeaterState;

    fn is(state: HeaterState, reply: Sender<bool>) -> Self {
        HeaterMsg::Is(state, reply)
    }
}

pub struct HeaterModel {
    cfg: HeaterCfg,
    heater: Option<Box<dyn Switch>>,
    readings: Box<dyn ReadingsPort>,
}

impl HeaterModel {
    fn switch(&mut self, on: bool) {
        if let Some(heater) = self.heater.as_mut() {
            let result = if on { heater.on() } else { heater.off() };
            log_device("heater", result);
        }
    }

    fn temperature(&self) -> Option<f64> {
        self.readings.reading(Probe::Local).unwrap_or(None)
    }
}

type HeaterMachine = Machine<HeaterState, HeaterTrigger, HeaterModel, Context<HeaterMsg>>;

fn heater_enter_halt(m: &mut HeaterModel, _: &mut Context<HeaterMsg>) {
    tracing::info!(state = "halt", "heater entering state");
    m.switch(false);
}

fn heater_enter_heating(m: &mut HeaterModel, _: &mut Context<HeaterMsg>) {
    tracing::info!(state = "heating", "heater entering state");
    m.switch(true);
}

fn heater_exit_heating(m: &mut HeaterModel, _: &mut Context<HeaterMsg>) {
    m.switch(false);
}

fn heater_repeat_waiting(m: &mut HeaterModel, _: &mut Context<HeaterMsg>, _: Duration) -> Repeat<HeaterTrigger> {
    match m.temperature() {
        Some(t) if t >= m.cfg.setpoint - m.cfg.hysteresis_down => Repeat::Continue,
        // unknown temperature: keep the room frost free
        _ => Repeat::Transition(HeaterTrigger::Heat),
    }
}

fn heater_repeat_heating(m: &mut HeaterModel, _: &mut Context<HeaterMsg>, _: Duration) -> Repeat<HeaterTrigger> {
    match m.temperature() {
        Some(t) if t > m.cfg.setpoint + m.cfg.hysteresis_up => Repeat::Transition(HeaterTrigger::Wait),
        _ => Repeat::Continue,
    }
}

fn has_heater(m: &HeaterModel) -> bool {
    m.heater.is_some()
}

fn heater_machine(refresh: Duration) -> Result<HeaterMachine, BuildError> {
    use HeaterState as S;
    use HeaterTrigger as T;
    Machine::builder("heater", S::Halt)
        .state(State::new(S::Halt).on_enter(heater_enter_halt))
        .state(State::new(S::Waiting).repeat(heater_repeat_waiting, refresh))
        .state(
            State::new(S::Heating)
                .on_enter(heater_enter_heating)
                .on_exit(heater_exit_heating)
                .repeat(heater_repeat_heating, refresh),
        )
        .transition(Transition::new(T::Wait, &[S::Halt, S::Heating], S::Waiting).when(has_heater))
        .transition(Transition::new(T::Heat, &[S::Waiting], S::Heating))
        .transition(Transition::new(T::Halt, &[S::Waiting, S::Heating], S::Halt))
        .build()
}

pub struct Heater {
    machine: HeaterMachine,
    model: HeaterModel,
}

impl Heater {
    pub fn new(
        cfg: HeaterCfg,
        heater: Option<Box<dyn Switch>>,
        readings: Box<dyn ReadingsPort>,
    ) -> Result<Self, BuildError> {
        Ok(Self {
            machine: heater_machine(cfg.refresh)?,
            model: HeaterModel { cfg, heater, readings },
        })
    }

    pub fn state(&self) -> HeaterState {
        self.machine.state()
    }
}

impl Actor for Heater {
    type Msg = HeaterMsg;

    fn started(&mut self, ctx: &mut Context<HeaterMsg>) {
        self.machine.start(&mut self.model, ctx);
    }

    fn handle(&mut self, msg: HeaterMsg, ctx: &mut Context<HeaterMsg>) {
        match msg {
            HeaterMsg::Fire(t) => {
                self.machine.fire(t, &mut self.model, ctx);
            }
            HeaterMsg::Repeat => self.machine.repeat(&mut self.model, ctx),
            HeaterMsg::Is(state, reply) => {
                let _ = reply.send(self.machine.is(state));
            }
            HeaterMsg::Setpoint(v) => {
                self.model.cfg.setpoint = v;
                tracing::info!(setpoint = v, "heater setpoint set");
            }
        }
    }
}
