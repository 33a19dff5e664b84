//! Filtration orchestrator.
//!
//! The primary state machine of the plant. It owns the filtration pumps and
//! valves, runs the daily budget ([`EcoMode`]) and the stir scheduler
//! ([`StirMode`]), and drives every other actor through the interlock ports:
//!
//! ```text
//! halt ─eco─▶ eco{compute, normal, tank, waiting} ◀─closed─ closing
//!              │ heat                │ standby/overflow        ▲ eco
//!              ▼                     ▼                         │
//!        heating{running,      opening{standby, overflow} ─opened─▶ standby/overflow{boost, normal}
//!                delay{none, standby, overflow}}                     comfort, sweep
//!        wash{backwash, rinse} ─▶ eco         wintering{waiting, stir}
//! ```
//!
//! Moving between eco and an opened mode always goes through `closing` or
//! `opening`, with the pumps stopped until the cover reports its end
//! position. `reload` is a pass-through state used to re-run an entry
//! callback after a live setting change.
use std::time::Duration;

use chrono::NaiveDateTime;
use crossbeam_channel::Sender;
use pool_traits::{SpeedPump, Switch};

use crate::actor::{Actor, Context};
use crate::config::FiltrationCfg;
use crate::cover::{CoverState, CoverTrigger};
use crate::disinfection::{DisinfectionState, DisinfectionTrigger};
use crate::eco::EcoMode;
use crate::error::BuildError;
use crate::heating::{HeaterState, HeaterTrigger, HeatingState, HeatingTrigger};
use crate::hsm::{Machine, MachineMsg, Repeat, State, StateQuery, Transition};
use crate::hw_error::log_device;
use crate::interlock::{CoverPort, MachinePort, ReadingsPort, TankPort, start_if_halted};
use crate::light::{LightState, LightTrigger};
use crate::sensor::Probe;
use crate::status::Encoder;
use crate::stir::StirMode;
use crate::swim::{SwimState, SwimTrigger};
use crate::tank::{TankMode, TankState, TankTrigger};
use crate::util::{DAY, span};

/// Format of the persisted last backwash timestamp.
pub const BACKWASH_LAST_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const WINTERING_POLL: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FiltrationState {
    Halt,
    Closing,
    Opening,
    OpeningStandby,
    OpeningOverflow,
    Eco,
    EcoCompute,
    EcoNormal,
    EcoTank,
    EcoWaiting,
    Heating,
    HeatingRunning,
    HeatingDelay,
    HeatingDelayNone,
    HeatingDelayStandby,
    HeatingDelayOverflow,
    Standby,
    StandbyBoost,
    StandbyNormal,
    Overflow,
    OverflowBoost,
    OverflowNormal,
    Comfort,
    Sweep,
    Reload,
    Wash,
    WashBackwash,
    WashRinse,
    Wintering,
    WinteringStir,
    WinteringWaiting,
}

impl FiltrationState {
    pub fn name(self) -> &'static str {
        use FiltrationState as S;
        match self {
            S::Halt => "halt",
            S::Closing => "closing",
            S::Opening => "opening",
            S::OpeningStandby => "opening_standby",
            S::OpeningOverflow => "opening_overflow",
            S::Eco => "eco",
            S::EcoCompute => "eco_compute",
            S::EcoNormal => "eco_normal",
            S::EcoTank => "eco_tank",
            S::EcoWaiting => "eco_waiting",
            S::Heating => "heating",
            S::HeatingRunning => "heating_running",
            S::HeatingDelay => "heating_delay",
            S::HeatingDelayNone => "heating_delay_none",
            S::HeatingDelayStandby => "heating_delay_standby",
            S::HeatingDelayOverflow => "heating_delay_overflow",
            S::Standby => "standby",
            S::StandbyBoost => "standby_boost",
            S::StandbyNormal => "standby_normal",
            S::Overflow => "overflow",
            S::OverflowBoost => "overflow_boost",
            S::OverflowNormal => "overflow_normal",
            S::Comfort => "comfort",
            S::Sweep => "sweep",
            S::Reload => "reload",
            S::Wash => "wash",
            S::WashBackwash => "wash_backwash",
            S::WashRinse => "wash_rinse",
            S::Wintering => "wintering",
            S::WinteringStir => "wintering_stir",
            S::WinteringWaiting => "wintering_waiting",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiltrationTrigger {
    Eco,
    Closed,
    EcoNormal,
    EcoTank,
    EcoWaiting,
    Heat,
    HeatingDelay,
    HeatingDelayed,
    Opened,
    Standby,
    Overflow,
    Comfort,
    Sweep,
    Halt,
    Wash,
    Rinse,
    Wintering,
    WinteringWaiting,
    WinteringStir,
    Reload,
}

/// Live settings of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FiltrationSetting {
    /// Daily target; what already ran today is kept.
    Duration(Duration),
    Period(u32),
    /// Today's elapsed duration, restored once at startup.
    RestoreDuration(Duration),
    TankPercentage(f64),
    ResetHour(u32),
    CoverPositionEco(u8),
    BoostDuration(Duration),
    SpeedEco(u8),
    SpeedStandby(u8),
    SpeedOverflow(u8),
    StirDuration(Duration),
    StirPeriod(Duration),
    BackwashDuration(Duration),
    RinseDuration(Duration),
    /// Days between two backwashes, at least 2.
    BackwashPeriod(u32),
    BackwashLast(NaiveDateTime),
}

/// Valve sequence of `wash.backwash`, one step per timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackwashStep {
    OpenBackwash,
    OpenDrain,
}

pub enum FiltrationMsg {
    Fire(FiltrationTrigger),
    /// Fire and report whether a transition was taken.
    Request(FiltrationTrigger, Sender<bool>),
    Repeat,
    Is(FiltrationState, Sender<bool>),
    State(Sender<FiltrationState>),
    Setting(FiltrationSetting),
    Backwash(BackwashStep),
}

impl MachineMsg for FiltrationMsg {
    type Trigger = FiltrationTrigger;

    fn fire(trigger: FiltrationTrigger) -> Self {
        FiltrationMsg::Fire(trigger)
    }

    fn repeat() -> Self {
        FiltrationMsg::Repeat
    }
}

impl StateQuery for FiltrationMsg {
    type State = FiltrationState;

    fn is(state: FiltrationState, reply: Sender<bool>) -> Self {
        FiltrationMsg::Is(state, reply)
    }
}

/// Actuators owned by the orchestrator.
pub struct FiltrationDevices {
    pub variable: Box<dyn SpeedPump>,
    pub boost: Box<dyn Switch>,
    pub gravity: Box<dyn Switch>,
    pub backwash: Box<dyn Switch>,
    pub tank: Box<dyn Switch>,
    pub drain: Box<dyn Switch>,
}

fn switch(name: &'static str, sw: &mut dyn Switch, on: bool) {
    log_device(name, if on { sw.on() } else { sw.off() });
}

impl FiltrationDevices {
    fn speed(&mut self, value: u8) {
        log_device("variable", self.variable.speed(value));
    }

    fn variable_off(&mut self) {
        log_device("variable", self.variable.off());
    }

    fn boost(&mut self, on: bool) {
        switch("boost", self.boost.as_mut(), on);
    }

    fn gravity(&mut self, on: bool) {
        switch("gravity", self.gravity.as_mut(), on);
    }

    fn backwash(&mut self, on: bool) {
        switch("backwash", self.backwash.as_mut(), on);
    }

    fn tank(&mut self, on: bool) {
        switch("tank", self.tank.as_mut(), on);
    }

    fn drain(&mut self, on: bool) {
        switch("drain", self.drain.as_mut(), on);
    }

    fn all_off(&mut self) {
        self.variable_off();
        self.boost(false);
        self.gravity(false);
        self.backwash(false);
        self.tank(false);
        self.drain(false);
    }
}

/// Peers the orchestrator queries and commands.
pub struct FiltrationPeers {
    pub tank: Box<dyn TankPort>,
    pub heating: Box<dyn MachinePort<HeatingState, HeatingTrigger>>,
    pub heater: Box<dyn MachinePort<HeaterState, HeaterTrigger>>,
    pub disinfection: Box<dyn MachinePort<DisinfectionState, DisinfectionTrigger>>,
    pub swim: Box<dyn MachinePort<SwimState, SwimTrigger>>,
    pub light: Box<dyn MachinePort<LightState, LightTrigger>>,
    pub cover: Box<dyn CoverPort>,
    pub readings: Box<dyn ReadingsPort>,
}

impl FiltrationPeers {
    fn halt_all(&self) {
        self.disinfection.fire(DisinfectionTrigger::Halt);
        self.tank.fire(TankTrigger::Halt);
        self.cover.fire(CoverTrigger::Halt);
        self.heating.fire(HeatingTrigger::Halt);
        self.light.fire(LightTrigger::Halt);
        self.swim.fire(SwimTrigger::Halt);
    }

    fn disinfection_halt(&self) {
        self.disinfection.fire(DisinfectionTrigger::Halt);
    }

    fn disinfection_run(&self) {
        start_if_halted(
            self.disinfection.as_ref(),
            DisinfectionState::Halt,
            DisinfectionTrigger::Run,
        );
    }

    fn disinfection_constant(&self) {
        if !matches!(self.disinfection.is(DisinfectionState::Constant), Ok(true)) {
            self.disinfection.fire(DisinfectionTrigger::Constant);
        }
    }
}

pub struct FiltrationModel {
    cfg: FiltrationCfg,
    eco: EcoMode,
    stir: StirMode,
    backwash_last: NaiveDateTime,
    devices: FiltrationDevices,
    peers: FiltrationPeers,
    encoder: Encoder,
}

impl FiltrationModel {
    pub fn eco(&self) -> &EcoMode {
        &self.eco
    }

    pub fn stir(&self) -> &StirMode {
        &self.stir
    }

    pub fn cfg(&self) -> &FiltrationCfg {
        &self.cfg
    }

    pub fn backwash_last(&self) -> NaiveDateTime {
        self.backwash_last
    }

    fn publish_state(&self, state: &str) {
        tracing::info!(state, "filtration entering state");
        self.encoder.state("filtration", state);
    }

    fn backwash_due(&self, now: NaiveDateTime) -> bool {
        let period = DAY * self.cfg.backwash.period_days;
        if span(self.backwash_last, now) < period {
            return false;
        }
        if tank_is_high(self) {
            tracing::info!("time for a backwash and tank is high");
            true
        } else {
            tracing::debug!("time for a backwash but tank is not high");
            false
        }
    }

    fn cover_position(&self) -> Option<u8> {
        match self.peers.cover.position() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "cover position unknown");
                None
            }
        }
    }

    fn publish_cover_progress(&self, prefix: &str, position: u8) {
        self.encoder
            .state("filtration", &format!("{prefix}_{}", position / 10 * 10));
    }

    fn stir_update(&mut self, now: NaiveDateTime) {
        self.stir.update(now, self.devices.boost.as_mut());
    }

    fn stir_clear(&mut self) {
        self.stir.clear(self.devices.boost.as_mut());
    }

    fn stir_suspend(&mut self) {
        self.stir.suspend(self.devices.boost.as_mut());
    }
}

fn tank_is_low(m: &FiltrationModel) -> bool {
    m.peers.tank.is_low().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "tank did not answer, assuming low");
        true
    })
}

fn tank_is_high(m: &FiltrationModel) -> bool {
    m.peers.tank.is(TankState::High).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "tank did not answer, assuming not high");
        false
    })
}

fn pump_stopped_in_standby(m: &FiltrationModel) -> bool {
    m.cfg.speed_standby == 0
}

/// Leave the current mode through `reload` and come back with `back`.
fn reload(ctx: &Context<FiltrationMsg>, back: FiltrationTrigger) {
    ctx.defer(FiltrationMsg::Fire(FiltrationTrigger::Reload));
    ctx.defer(FiltrationMsg::Fire(back));
}

type Ctx = Context<FiltrationMsg>;
type FiltrationMachine = Machine<FiltrationState, FiltrationTrigger, FiltrationModel, Ctx>;

fn before_change(m: &mut FiltrationModel, _: &mut Ctx) {
    m.eco.clear();
}

// ── halt ──

fn enter_halt(m: &mut FiltrationModel, _: &mut Ctx) {
    m.publish_state("halt");
    m.peers.halt_all();
    m.devices.all_off();
}

fn exit_halt(m: &mut FiltrationModel, _: &mut Ctx) {
    m.stir_clear();
}

fn start_peers(m: &mut FiltrationModel, _: &mut Ctx) {
    start_if_halted(m.peers.cover.as_ref(), CoverState::Halt, CoverTrigger::Run);
    start_if_halted(m.peers.tank.as_ref(), TankState::Halt, TankTrigger::Fill);
    start_if_halted(m.peers.heating.as_ref(), HeatingState::Halt, HeatingTrigger::Wait);
}

// ── closing / opening ──

fn stop_for_cover(m: &mut FiltrationModel) {
    m.peers.disinfection_halt();
    // no water movement while the cover moves
    m.devices.gravity(true);
    m.devices.boost(false);
    m.devices.variable_off();
}

fn enter_closing(m: &mut FiltrationModel, _: &mut Ctx) {
    m.publish_state("closing");
    stop_for_cover(m);
    m.peers.cover.close();
}

fn repeat_closing(m: &mut FiltrationModel, ctx: &mut Ctx, _: Duration) -> Repeat<FiltrationTrigger> {
    let Some(position) = m.cover_position() else {
        return Repeat::Continue;
    };
    tracing::debug!(position, "cover closing");
    m.publish_cover_progress("closing", position);
    if position > m.cfg.cover_position_eco {
        return Repeat::Continue;
    }
    if m.cfg.cover_position_eco == 0 {
        // let the cover travel its last bit
        ctx.schedule_delay(m.cfg.cover_settle, FiltrationMsg::Fire(FiltrationTrigger::Closed));
        Repeat::Stop
    } else {
        Repeat::Transition(FiltrationTrigger::Closed)
    }
}

fn exit_closing(m: &mut FiltrationModel, _: &mut Ctx) {
    m.peers.cover.stop();
    // the pool was opened until now, no need to stir right away
    m.stir_clear();
}

fn enter_opening(m: &mut FiltrationModel, _: &mut Ctx) {
    m.publish_state("opening");
    stop_for_cover(m);
    m.peers.cover.open();
}

fn repeat_opening(m: &mut FiltrationModel, ctx: &mut Ctx, _: Duration) -> Repeat<FiltrationTrigger> {
    let Some(position) = m.cover_position() else {
        return Repeat::Continue;
    };
    tracing::debug!(position, "cover opening");
    m.publish_cover_progress("opening", position);
    if position >= 100 {
        ctx.schedule_delay(m.cfg.cover_settle, FiltrationMsg::Fire(FiltrationTrigger::Opened));
        Repeat::Stop
    } else {
        Repeat::Continue
    }
}

fn exit_opening(m: &mut FiltrationModel, _: &mut Ctx) {
    m.peers.tank.set_mode(TankMode::Overflow);
    m.peers.cover.stop();
}

// ── eco ──

fn enter_eco(m: &mut FiltrationModel, _: &mut Ctx) {
    tracing::info!("filtration entering eco");
    m.peers.light.fire(LightTrigger::Halt);
    m.devices.drain(false);
    m.devices.gravity(true);
    m.devices.tank(false);
    m.peers.tank.set_mode(TankMode::Eco);
}

fn enter_eco_compute(m: &mut FiltrationModel, ctx: &mut Ctx) {
    m.publish_state("eco_compute");
    let now = ctx.wall_now();
    m.eco.update(now, 0.0);
    m.eco.compute(now);
    let next = if m.eco.off_duration().is_zero() && !m.eco.on_duration().is_zero() {
        FiltrationTrigger::EcoNormal
    } else {
        FiltrationTrigger::EcoWaiting
    };
    ctx.schedule_delay(m.cfg.compute_delay, FiltrationMsg::Fire(next));
}

fn enter_eco_normal(m: &mut FiltrationModel, _: &mut Ctx) {
    m.publish_state("eco_normal");
    let on = m.eco.on_duration();
    m.eco.set_current(on);
    m.peers.disinfection_run();
    let speed = m.cfg.speed_eco;
    m.devices.speed(speed);
}

fn repeat_eco_normal(m: &mut FiltrationModel, ctx: &mut Ctx, _: Duration) -> Repeat<FiltrationTrigger> {
    let now = ctx.wall_now();
    if m.backwash_due(now) {
        return Repeat::Transition(FiltrationTrigger::Wash);
    }
    if m.eco.update(now, 1.0) {
        reload(ctx, FiltrationTrigger::Eco);
        return Repeat::Stop;
    }
    // never draw from a low tank
    if tank_is_low(m) {
        return Repeat::Transition(FiltrationTrigger::EcoWaiting);
    }
    if m.eco.elapsed_on() {
        return if m.eco.tank_duration().is_zero() {
            Repeat::Transition(FiltrationTrigger::EcoWaiting)
        } else {
            Repeat::Transition(FiltrationTrigger::EcoTank)
        };
    }
    m.stir_update(now);
    Repeat::Continue
}

fn enter_eco_tank(m: &mut FiltrationModel, _: &mut Ctx) {
    m.publish_state("eco_tank");
    let tank = m.eco.tank_duration();
    m.eco.set_current(tank);
    m.peers.disinfection_halt();
    m.stir_suspend();
    m.devices.tank(true);
    // slowest speed, a faster one empties the tank into the pool
    m.devices.speed(1);
}

fn repeat_eco_tank(m: &mut FiltrationModel, ctx: &mut Ctx, _: Duration) -> Repeat<FiltrationTrigger> {
    if m.eco.update(ctx.wall_now(), 1.0) {
        reload(ctx, FiltrationTrigger::Eco);
        Repeat::Stop
    } else if m.eco.elapsed_on() {
        Repeat::Transition(FiltrationTrigger::EcoWaiting)
    } else {
        Repeat::Continue
    }
}

fn exit_eco_tank(m: &mut FiltrationModel, _: &mut Ctx) {
    m.devices.tank(false);
}

fn enter_eco_waiting(m: &mut FiltrationModel, _: &mut Ctx) {
    m.publish_state("eco_waiting");
    let off = m.eco.off_duration();
    m.eco.set_current(off);
    m.peers.disinfection_halt();
    m.devices.variable_off();
}

fn repeat_eco_waiting(m: &mut FiltrationModel, ctx: &mut Ctx, _: Duration) -> Repeat<FiltrationTrigger> {
    let now = ctx.wall_now();
    if m.backwash_due(now) {
        return Repeat::Transition(FiltrationTrigger::Wash);
    }
    if m.eco.update(now, 0.0) {
        reload(ctx, FiltrationTrigger::Eco);
        return Repeat::Stop;
    }
    if m.eco.elapsed_off() {
        return Repeat::Transition(FiltrationTrigger::EcoNormal);
    }
    // last, so the boost pump is not switched for nothing
    m.stir_update(now);
    Repeat::Continue
}

// ── heating ──

fn enter_heating_running(m: &mut FiltrationModel, _: &mut Ctx) {
    m.publish_state("heating_running");
    m.eco.clear();
    m.peers.disinfection_run();
    m.devices.speed(2);
}

fn repeat_heating_running(m: &mut FiltrationModel, ctx: &mut Ctx, _: Duration) -> Repeat<FiltrationTrigger> {
    let now = ctx.wall_now();
    m.eco.update(now, 1.0);
    m.stir_update(now);
    Repeat::Continue
}

fn exit_heating_running(m: &mut FiltrationModel, _: &mut Ctx) {
    if matches!(m.peers.heating.is(HeatingState::Heating), Ok(true)) {
        m.peers.heating.fire(HeatingTrigger::Wait);
    }
    m.stir_suspend();
}

fn enter_heating_delay(m: &mut FiltrationModel, _: &mut Ctx) {
    m.publish_state("heating_delay");
}

fn enter_heating_delay_none(m: &mut FiltrationModel, ctx: &mut Ctx) {
    // the heat pump needs water flow for a while after switching off
    ctx.schedule_delay(
        m.cfg.heating_delay_to_eco,
        FiltrationMsg::Fire(FiltrationTrigger::HeatingDelayed),
    );
}

fn enter_heating_delay_open(m: &mut FiltrationModel, ctx: &mut Ctx) {
    ctx.schedule_delay(
        m.cfg.heating_delay_to_open,
        FiltrationMsg::Fire(FiltrationTrigger::HeatingDelayed),
    );
}

// ── standby ──

fn enter_standby(m: &mut FiltrationModel, _: &mut Ctx) {
    tracing::info!("filtration entering standby");
    m.devices.gravity(false);
    m.peers.disinfection_halt();
}

fn enter_standby_boost(m: &mut FiltrationModel, ctx: &mut Ctx) {
    m.publish_state("standby_boost");
    m.devices.tank(true);
    m.devices.boost(true);
    m.devices.speed(3);
    ctx.schedule_delay(m.cfg.boost_duration, FiltrationMsg::Fire(FiltrationTrigger::Standby));
}

fn enter_standby_normal(m: &mut FiltrationModel, _: &mut Ctx) {
    m.publish_state("standby");
    m.devices.tank(false);
    m.devices.boost(false);
    let speed = m.cfg.speed_standby;
    m.devices.speed(speed);
    if speed > 0 {
        m.peers.disinfection_run();
    }
}

fn repeat_standby_normal(m: &mut FiltrationModel, ctx: &mut Ctx, _: Duration) -> Repeat<FiltrationTrigger> {
    let factor = if m.cfg.speed_standby > 0 { 1.0 } else { 0.0 };
    m.eco.update(ctx.wall_now(), factor);
    Repeat::Continue
}

// ── overflow ──

fn enter_overflow(m: &mut FiltrationModel, _: &mut Ctx) {
    tracing::info!("filtration entering overflow");
    m.devices.gravity(false);
    m.devices.tank(true);
}

fn enter_overflow_boost(m: &mut FiltrationModel, ctx: &mut Ctx) {
    m.publish_state("overflow_boost");
    m.devices.speed(3);
    m.devices.boost(true);
    ctx.schedule_delay(m.cfg.boost_duration, FiltrationMsg::Fire(FiltrationTrigger::Overflow));
}

fn enter_overflow_normal(m: &mut FiltrationModel, _: &mut Ctx) {
    m.publish_state("overflow");
    let speed = m.cfg.speed_overflow;
    m.devices.speed(speed.min(3));
    m.devices.boost(speed > 3);
    m.peers.disinfection_constant();
}

fn repeat_overflow_normal(m: &mut FiltrationModel, ctx: &mut Ctx, _: Duration) -> Repeat<FiltrationTrigger> {
    let factor = if m.cfg.speed_overflow > 2 { 1.0 } else { 0.5 };
    m.eco.update(ctx.wall_now(), factor);
    Repeat::Continue
}

fn exit_overflow_normal(m: &mut FiltrationModel, _: &mut Ctx) {
    m.peers.swim.fire(SwimTrigger::Halt);
}

// ── comfort / sweep ──

fn enter_comfort(m: &mut FiltrationModel, _: &mut Ctx) {
    m.publish_state("comfort");
    m.devices.gravity(false);
    m.devices.tank(false);
    m.devices.speed(2);
    m.devices.boost(false);
    m.peers.disinfection_constant();
}

fn repeat_comfort(m: &mut FiltrationModel, ctx: &mut Ctx, _: Duration) -> Repeat<FiltrationTrigger> {
    m.eco.update(ctx.wall_now(), 0.5);
    let heating = m.peers.heating.as_ref();
    let busy = |s| heating.is(s).unwrap_or(true);
    if !busy(HeatingState::Forcing) && !busy(HeatingState::Recovering) {
        heating.fire(HeatingTrigger::Force);
    }
    Repeat::Continue
}

fn exit_comfort(m: &mut FiltrationModel, _: &mut Ctx) {
    m.peers.heating.fire(HeatingTrigger::Wait);
}

fn enter_sweep(m: &mut FiltrationModel, _: &mut Ctx) {
    m.publish_state("sweep");
    m.peers.disinfection_halt();
    m.devices.gravity(true);
    m.devices.tank(false);
    m.devices.speed(3);
    m.devices.boost(false);
}

// ── wash ──

fn enter_wash(m: &mut FiltrationModel, _: &mut Ctx) {
    tracing::info!("filtration entering wash");
    m.peers.disinfection_halt();
    m.stir_suspend();
}

fn enter_wash_backwash(m: &mut FiltrationModel, ctx: &mut Ctx) {
    m.publish_state("backwash");
    m.devices.tank(true);
    let max = m.devices.variable.max_speed();
    m.devices.speed(max);
    ctx.schedule_delay(
        m.cfg.backwash.valve_step,
        FiltrationMsg::Backwash(BackwashStep::OpenBackwash),
    );
}

fn backwash_step(m: &mut FiltrationModel, ctx: &mut Ctx, step: BackwashStep) {
    match step {
        BackwashStep::OpenBackwash => {
            m.devices.backwash(true);
            ctx.schedule_delay(
                m.cfg.backwash.valve_step,
                FiltrationMsg::Backwash(BackwashStep::OpenDrain),
            );
        }
        BackwashStep::OpenDrain => {
            m.devices.drain(true);
            ctx.schedule_delay(m.cfg.backwash.backwash, FiltrationMsg::Fire(FiltrationTrigger::Rinse));
        }
    }
}

fn enter_wash_rinse(m: &mut FiltrationModel, ctx: &mut Ctx) {
    m.publish_state("rinse");
    m.devices.backwash(false);
    ctx.schedule_delay(m.cfg.backwash.rinse, FiltrationMsg::Fire(FiltrationTrigger::Eco));
}

fn exit_wash_rinse(m: &mut FiltrationModel, ctx: &mut Ctx) {
    m.devices.speed(1);
    // an aborted rinse still counts as a backwash
    m.backwash_last = ctx.wall_now();
    m.encoder.publish_retained(
        "filtration/backwash/last",
        m.backwash_last.format(BACKWASH_LAST_FORMAT),
    );
}

// ── wintering ──

fn enter_wintering(m: &mut FiltrationModel, _: &mut Ctx) {
    tracing::info!("filtration entering wintering");
    m.encoder.publish("filtration/remaining", "0:00:00");
    m.peers.heater.fire(HeaterTrigger::Wait);
    m.peers.swim.fire(SwimTrigger::Wintering);
    m.peers.cover.open();
}

fn exit_wintering(m: &mut FiltrationModel, _: &mut Ctx) {
    m.peers.heater.fire(HeaterTrigger::Halt);
    m.peers.swim.fire(SwimTrigger::Halt);
}

fn enter_wintering_waiting(m: &mut FiltrationModel, _: &mut Ctx) {
    m.publish_state("wintering_waiting");
    m.devices.variable_off();
}

fn repeat_wintering_waiting(
    m: &mut FiltrationModel,
    _: &mut Ctx,
    in_state: Duration,
) -> Repeat<FiltrationTrigger> {
    if in_state > m.cfg.wintering.period {
        let air = m.peers.readings.reading(Probe::Air).unwrap_or(None);
        // an unknown temperature counts as cold
        if air.is_none_or(|t| t <= m.cfg.wintering.only_below) {
            return Repeat::Transition(FiltrationTrigger::WinteringStir);
        }
    }
    Repeat::Continue
}

fn enter_wintering_stir(m: &mut FiltrationModel, ctx: &mut Ctx) {
    m.publish_state("wintering_stir");
    let speed = m.cfg.wintering.pump_speed;
    m.devices.speed(speed);
    ctx.schedule_delay(
        m.cfg.wintering.duration,
        FiltrationMsg::Fire(FiltrationTrigger::WinteringWaiting),
    );
}

fn machine(cfg: &FiltrationCfg) -> Result<FiltrationMachine, BuildError> {
    use FiltrationState as S;
    use FiltrationTrigger as T;
    let refresh = cfg.refresh;
    Machine::builder("filtration", S::Halt)
        .before_change(before_change)
        .state(State::new(S::Halt).on_enter(enter_halt).on_exit(exit_halt))
        .state(
            State::new(S::Closing)
                .on_enter(enter_closing)
                .on_exit(exit_closing)
                .repeat(repeat_closing, cfg.cover_poll),
        )
        .state(
            State::new(S::Opening)
                .on_enter(enter_opening)
                .on_exit(exit_opening)
                .repeat(repeat_opening, cfg.cover_poll),
        )
        .state(State::new(S::OpeningStandby).parent(S::Opening))
        .state(State::new(S::OpeningOverflow).parent(S::Opening))
        .state(State::new(S::Eco).initial(S::EcoCompute).on_enter(enter_eco))
        .state(State::new(S::EcoCompute).parent(S::Eco).on_enter(enter_eco_compute))
        .state(
            State::new(S::EcoNormal)
                .parent(S::Eco)
                .on_enter(enter_eco_normal)
                .repeat(repeat_eco_normal, refresh),
        )
        .state(
            State::new(S::EcoTank)
                .parent(S::Eco)
                .on_enter(enter_eco_tank)
                .on_exit(exit_eco_tank)
                .repeat(repeat_eco_tank, refresh),
        )
        .state(
            State::new(S::EcoWaiting)
                .parent(S::Eco)
                .on_enter(enter_eco_waiting)
                .repeat(repeat_eco_waiting, refresh),
        )
        .state(State::new(S::Heating).initial(S::HeatingRunning))
        .state(
            State::new(S::HeatingRunning)
                .parent(S::Heating)
                .on_enter(enter_heating_running)
                .on_exit(exit_heating_running)
                .repeat(repeat_heating_running, refresh),
        )
        .state(
            State::new(S::HeatingDelay)
                .parent(S::Heating)
                .initial(S::HeatingDelayNone)
                .on_enter(enter_heating_delay),
        )
        .state(
            State::new(S::HeatingDelayNone)
                .parent(S::HeatingDelay)
                .on_enter(enter_heating_delay_none),
        )
        .state(
            State::new(S::HeatingDelayStandby)
                .parent(S::HeatingDelay)
                .on_enter(enter_heating_delay_open),
        )
        .state(
            State::new(S::HeatingDelayOverflow)
                .parent(S::HeatingDelay)
                .on_enter(enter_heating_delay_open),
        )
        .state(State::new(S::Standby).initial(S::StandbyNormal).on_enter(enter_standby))
        .state(State::new(S::StandbyBoost).parent(S::Standby).on_enter(enter_standby_boost))
        .state(
            State::new(S::StandbyNormal)
                .parent(S::Standby)
                .on_enter(enter_standby_normal)
                .repeat(repeat_standby_normal, refresh),
        )
        .state(State::new(S::Overflow).initial(S::OverflowNormal).on_enter(enter_overflow))
        .state(State::new(S::OverflowBoost).parent(S::Overflow).on_enter(enter_overflow_boost))
        .state(
            State::new(S::OverflowNormal)
                .parent(S::Overflow)
                .on_enter(enter_overflow_normal)
                .on_exit(exit_overflow_normal)
                .repeat(repeat_overflow_normal, refresh),
        )
        .state(
            State::new(S::Comfort)
                .on_enter(enter_comfort)
                .on_exit(exit_comfort)
                .repeat(repeat_comfort, refresh),
        )
        .state(State::new(S::Sweep).on_enter(enter_sweep))
        .state(State::new(S::Reload))
        .state(State::new(S::Wash).initial(S::WashBackwash).on_enter(enter_wash))
        .state(State::new(S::WashBackwash).parent(S::Wash).on_enter(enter_wash_backwash))
        .state(
            State::new(S::WashRinse)
                .parent(S::Wash)
                .on_enter(enter_wash_rinse)
                .on_exit(exit_wash_rinse),
        )
        .state(
            State::new(S::Wintering)
                .initial(S::WinteringWaiting)
                .on_enter(enter_wintering)
                .on_exit(exit_wintering),
        )
        .state(
            State::new(S::WinteringWaiting)
                .parent(S::Wintering)
                .on_enter(enter_wintering_waiting)
                .repeat(repeat_wintering_waiting, WINTERING_POLL),
        )
        .state(
            State::new(S::WinteringStir)
                .parent(S::Wintering)
                .on_enter(enter_wintering_stir),
        )
        // eco
        .transition(Transition::new(T::Eco, &[S::Standby, S::Overflow, S::Opening], S::Closing))
        .transition(Transition::new(T::Eco, &[S::Halt], S::Eco).before(start_peers))
        .transition(Transition::new(T::Eco, &[S::Reload, S::WashRinse], S::Eco))
        .transition(Transition::new(T::Closed, &[S::Closing], S::Eco))
        .transition(Transition::new(
            T::EcoNormal,
            &[S::EcoCompute, S::EcoWaiting],
            S::EcoNormal,
        ))
        .transition(Transition::new(T::EcoTank, &[S::EcoNormal], S::EcoTank).unless(tank_is_low))
        .transition(Transition::new(
            T::EcoWaiting,
            &[S::EcoCompute, S::EcoNormal, S::EcoTank],
            S::EcoWaiting,
        ))
        // heating
        .transition(Transition::new(T::Heat, &[S::EcoWaiting, S::EcoNormal], S::Heating))
        .transition(Transition::new(T::HeatingDelay, &[S::Heating], S::HeatingDelayNone))
        .transition(Transition::new(T::HeatingDelayed, &[S::HeatingDelayNone], S::Eco))
        .transition(Transition::new(T::Opened, &[S::OpeningStandby], S::StandbyBoost))
        .transition(Transition::new(T::Opened, &[S::OpeningOverflow], S::OverflowBoost))
        // standby
        .transition(
            Transition::new(T::Standby, &[S::HeatingRunning], S::HeatingDelayStandby).unless(tank_is_low),
        )
        .transition(
            Transition::new(T::HeatingDelayed, &[S::HeatingDelayStandby], S::OpeningStandby)
                .unless(tank_is_low),
        )
        .transition(
            Transition::new(T::Standby, &[S::Eco, S::Closing], S::OpeningStandby).unless(tank_is_low),
        )
        .transition(Transition::new(
            T::Standby,
            &[S::Overflow, S::Sweep, S::Reload],
            S::Standby,
        ))
        .transition(Transition::new(T::Standby, &[S::Comfort], S::Standby).unless(pump_stopped_in_standby))
        .transition(Transition::new(T::Standby, &[S::StandbyBoost], S::StandbyNormal))
        // manual boost
        .transition(Transition::new(T::Standby, &[S::StandbyNormal], S::StandbyBoost))
        // overflow
        .transition(
            Transition::new(T::Overflow, &[S::HeatingRunning], S::HeatingDelayOverflow).unless(tank_is_low),
        )
        .transition(
            Transition::new(T::HeatingDelayed, &[S::HeatingDelayOverflow], S::OpeningOverflow)
                .unless(tank_is_low),
        )
        .transition(
            Transition::new(T::Overflow, &[S::Eco, S::Closing], S::OpeningOverflow).unless(tank_is_low),
        )
        .transition(Transition::new(
            T::Overflow,
            &[S::Standby, S::Comfort, S::Reload],
            S::Overflow,
        ))
        .transition(Transition::new(T::Overflow, &[S::OverflowBoost], S::OverflowNormal))
        .transition(Transition::new(T::Overflow, &[S::OverflowNormal], S::OverflowBoost))
        // comfort, sweep
        .transition(Transition::new(T::Comfort, &[S::Standby, S::Overflow], S::Comfort))
        .transition(Transition::new(T::Sweep, &[S::Standby], S::Sweep))
        .transition(Transition::new(
            T::Halt,
            &[
                S::Eco,
                S::Heating,
                S::Standby,
                S::Overflow,
                S::Comfort,
                S::Sweep,
                S::Opening,
                S::Closing,
                S::Wash,
                S::Wintering,
            ],
            S::Halt,
        ))
        // wash
        .transition(
            Transition::new(T::Wash, &[S::EcoNormal, S::EcoWaiting], S::Wash).when(tank_is_high),
        )
        .transition(Transition::new(T::Rinse, &[S::WashBackwash], S::WashRinse))
        // wintering
        .transition(Transition::new(T::Wintering, &[S::Halt], S::Wintering))
        .transition(Transition::new(
            T::WinteringWaiting,
            &[S::WinteringStir],
            S::WinteringWaiting,
        ))
        .transition(Transition::new(
            T::WinteringStir,
            &[S::WinteringWaiting],
            S::WinteringStir,
        ))
        .transition(Transition::new(
            T::Reload,
            &[S::Eco, S::Standby, S::Overflow],
            S::Reload,
        ))
        .build()
}

pub struct Filtration {
    machine: FiltrationMachine,
    model: FiltrationModel,
}

impl Filtration {
    pub fn new(
        cfg: FiltrationCfg,
        devices: FiltrationDevices,
        peers: FiltrationPeers,
        encoder: Encoder,
        now: NaiveDateTime,
    ) -> Result<Self, BuildError> {
        let mut eco = EcoMode::new(now, encoder.clone());
        eco.set_reset_hour(cfg.reset_hour, now);
        eco.set_period(cfg.period);
        eco.set_daily(cfg.daily);
        eco.set_tank_percentage(cfg.tank_percentage);
        Ok(Self {
            machine: machine(&cfg)?,
            model: FiltrationModel {
                stir: StirMode::new(&cfg.stir),
                cfg,
                eco,
                backwash_last: NaiveDateTime::default(),
                devices,
                peers,
                encoder,
            },
        })
    }

    pub fn state(&self) -> FiltrationState {
        self.machine.state()
    }

    pub fn path(&self) -> Vec<FiltrationState> {
        self.machine.path()
    }

    pub fn is(&self, state: FiltrationState) -> bool {
        self.machine.is(state)
    }

    pub fn model(&self) -> &FiltrationModel {
        &self.model
    }

    fn apply(&mut self, setting: FiltrationSetting, ctx: &mut Ctx) {
        use FiltrationSetting as F;
        use FiltrationState as S;
        let m = &mut self.model;
        let in_eco = self.machine.is(S::Eco);
        match setting {
            F::Duration(d) => {
                m.eco.set_daily(d);
                tracing::info!(daily = ?d, "daily filtration duration set");
            }
            F::Period(p) => {
                m.eco.set_period(p);
                tracing::info!(period = p, "filtration periods set");
            }
            F::RestoreDuration(d) => {
                m.eco.restore_elapsed(d);
                tracing::info!(elapsed = ?d, "filtration elapsed duration restored");
            }
            F::TankPercentage(v) => {
                m.eco.set_tank_percentage(v);
                tracing::info!(percentage = v, "tank filtration share set");
            }
            F::ResetHour(h) => {
                m.eco.set_reset_hour(h, ctx.wall_now());
                tracing::info!(hour = h, next = %m.eco.next_reset(), "daily filtration reset hour set");
            }
            F::CoverPositionEco(p) => m.cfg.cover_position_eco = p,
            F::BoostDuration(d) => m.cfg.boost_duration = d,
            F::SpeedEco(v) => {
                m.cfg.speed_eco = v;
                if self.machine.is(S::EcoNormal) {
                    reload(ctx, FiltrationTrigger::Eco);
                }
            }
            F::SpeedStandby(v) => {
                m.cfg.speed_standby = v;
                if self.machine.is(S::StandbyNormal) {
                    reload(ctx, FiltrationTrigger::Standby);
                }
            }
            F::SpeedOverflow(v) => {
                m.cfg.speed_overflow = v;
                if self.machine.is(S::OverflowNormal) {
                    reload(ctx, FiltrationTrigger::Overflow);
                }
            }
            F::StirDuration(d) => {
                m.stir.set_duration(d);
            }
            F::StirPeriod(d) => {
                m.stir.set_period(d);
            }
            F::BackwashDuration(d) => m.cfg.backwash.backwash = d,
            F::RinseDuration(d) => m.cfg.backwash.rinse = d,
            F::BackwashPeriod(days) => {
                if days < 2 {
                    tracing::error!(days, "refusing a backwash period below 2 days");
                    return;
                }
                m.cfg.backwash.period_days = days;
            }
            F::BackwashLast(t) => m.backwash_last = t,
        }
        tracing::debug!(?setting, "filtration setting applied");
        let recomputes = matches!(
            setting,
            F::Duration(_) | F::Period(_) | F::TankPercentage(_) | F::ResetHour(_)
        );
        if recomputes && in_eco {
            reload(ctx, FiltrationTrigger::Eco);
        }
    }
}

impl Actor for Filtration {
    type Msg = FiltrationMsg;

    fn started(&mut self, ctx: &mut Ctx) {
        self.machine.start(&mut self.model, ctx);
    }

    fn handle(&mut self, msg: FiltrationMsg, ctx: &mut Ctx) {
        match msg {
            FiltrationMsg::Fire(t) => {
                self.machine.fire(t, &mut self.model, ctx);
            }
            FiltrationMsg::Request(t, reply) => {
                let taken = self.machine.fire(t, &mut self.model, ctx);
                let _ = reply.send(taken);
            }
            FiltrationMsg::Repeat => self.machine.repeat(&mut self.model, ctx),
            FiltrationMsg::Is(state, reply) => {
                let _ = reply.send(self.machine.is(state));
            }
            FiltrationMsg::State(reply) => {
                let _ = reply.send(self.machine.state());
            }
            FiltrationMsg::Setting(s) => self.apply(s, ctx),
            FiltrationMsg::Backwash(step) => {
                if self.machine.is(FiltrationState::WashBackwash) {
                    backwash_step(&mut self.model, ctx, step);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorCell, Addr, mailbox};
    use crate::mocks::{RecordingSink, StubCover, StubMachine, StubReadings};
    use pool_hardware::{PumpProbe, SimPump, SimSwitch, SwitchProbe};
    use pool_traits::Clock;
    use pool_traits::clock::test_clock::TestClock;
    use std::sync::Arc;

    struct Rig {
        clock: TestClock,
        cell: ActorCell<Filtration>,
        addr: Addr<FiltrationMsg>,
        variable: PumpProbe,
        boost: SwitchProbe,
        tank_valve: SwitchProbe,
        tank: StubMachine<TankState, TankTrigger>,
        heating: StubMachine<HeatingState, HeatingTrigger>,
        disinfection: StubMachine<DisinfectionState, DisinfectionTrigger>,
        swim: StubMachine<SwimState, SwimTrigger>,
        cover: StubCover,
        sink: Arc<RecordingSink>,
    }

    fn rig(cfg: FiltrationCfg) -> Rig {
        let clock = TestClock::new();
        let variable = SimPump::new("variable", 3);
        let boost = SimSwitch::new("boost");
        let tank_valve = SimSwitch::new("tank");
        let probes = (variable.probe(), boost.probe(), tank_valve.probe());
        let tank = StubMachine::new(&[TankState::Normal]);
        let heating = StubMachine::new(&[HeatingState::Halt]);
        let disinfection = StubMachine::new(&[DisinfectionState::Halt]);
        let swim = StubMachine::new(&[SwimState::Halt]);
        let cover = StubCover::new(0);
        let sink = Arc::new(RecordingSink::default());
        let devices = FiltrationDevices {
            variable: Box::new(variable),
            boost: Box::new(boost),
            gravity: Box::new(SimSwitch::new("gravity")),
            backwash: Box::new(SimSwitch::new("backwash")),
            tank: Box::new(tank_valve),
            drain: Box::new(SimSwitch::new("drain")),
        };
        let peers = FiltrationPeers {
            tank: Box::new(tank.clone()),
            heating: Box::new(heating.clone()),
            heater: Box::new(StubMachine::<HeaterState, HeaterTrigger>::new(&[HeaterState::Halt])),
            disinfection: Box::new(disinfection.clone()),
            swim: Box::new(swim.clone()),
            light: Box::new(StubMachine::<LightState, LightTrigger>::new(&[LightState::Halt])),
            cover: Box::new(cover.clone()),
            readings: Box::new(StubReadings::default()),
        };
        let filtration = Filtration::new(cfg, devices, peers, Encoder::new(sink.clone()), clock.wall_now()).unwrap();
        let (addr, mb) = mailbox("filtration", Duration::from_millis(100));
        let mut cell = ActorCell::new(filtration, mb, Arc::new(clock.clone()));
        cell.run_pending();
        Rig {
            clock,
            cell,
            addr,
            variable: probes.0,
            boost: probes.1,
            tank_valve: probes.2,
            tank,
            heating,
            disinfection,
            swim,
            cover,
            sink,
        }
    }

    impl Rig {
        fn fire(&mut self, t: FiltrationTrigger) {
            self.addr.send(FiltrationMsg::Fire(t));
            self.cell.run_pending();
        }

        fn set(&mut self, s: FiltrationSetting) {
            self.addr.send(FiltrationMsg::Setting(s));
            self.cell.run_pending();
        }

        fn wait(&mut self, secs: u64) {
            self.clock.advance(Duration::from_secs(secs));
            self.cell.run_pending();
        }

        fn state(&self) -> FiltrationState {
            self.cell.actor().state()
        }
    }

    #[test]
    fn starts_halted_with_every_peer_halted() {
        let rig = rig(FiltrationCfg::default());
        assert_eq!(rig.state(), FiltrationState::Halt);
        assert!(rig.tank.was_fired(TankTrigger::Halt));
        assert!(rig.disinfection.was_fired(DisinfectionTrigger::Halt));
        assert!(rig.swim.was_fired(SwimTrigger::Halt));
        assert_eq!(rig.sink.last("/status/filtration/state").as_deref(), Some("halt"));
    }

    #[test]
    fn eco_starts_peers_and_computes() {
        let mut rig = rig(FiltrationCfg::default());
        rig.tank.set_active(&[TankState::Halt]);
        rig.heating.clear();
        rig.fire(FiltrationTrigger::Eco);
        assert_eq!(rig.state(), FiltrationState::EcoCompute);
        assert!(rig.tank.was_fired(TankTrigger::Fill));
        assert!(rig.tank.commands().contains(&"mode Eco".to_string()));
        assert!(rig.heating.was_fired(HeatingTrigger::Wait));
        assert_eq!(rig.cover.fired(), vec![CoverTrigger::Halt, CoverTrigger::Run]);
        // 10h over 3 periods in a 24h day leaves off time first
        rig.wait(5);
        assert_eq!(rig.state(), FiltrationState::EcoWaiting);
        assert_eq!(rig.variable.speed(), 0);
    }

    #[test]
    fn eco_cycle_runs_normal_tank_waiting() {
        let mut cfg = FiltrationCfg::default();
        cfg.period = 1;
        cfg.daily = Duration::from_secs(23 * 3600);
        let mut rig = rig(cfg);
        rig.fire(FiltrationTrigger::Eco);
        rig.wait(5);
        // 23h in 24h: one hour off first
        assert_eq!(rig.state(), FiltrationState::EcoWaiting);
        rig.wait(3600);
        rig.wait(10);
        assert_eq!(rig.state(), FiltrationState::EcoNormal);
        assert_eq!(rig.variable.speed(), 1);
        assert!(rig.disinfection.was_fired(DisinfectionTrigger::Run));

        let on = rig.cell.actor().model().eco().on_duration();
        rig.wait(on.as_secs());
        rig.wait(10);
        assert_eq!(rig.state(), FiltrationState::EcoTank);
        assert!(rig.tank_valve.is_on());
    }

    #[test]
    fn opening_waits_for_the_cover() {
        let mut rig = rig(FiltrationCfg::default());
        rig.fire(FiltrationTrigger::Eco);
        rig.fire(FiltrationTrigger::Overflow);
        assert_eq!(rig.state(), FiltrationState::OpeningOverflow);
        assert!(rig.cover.commands().contains(&"open".to_string()));
        assert_eq!(rig.variable.speed(), 0);
        rig.wait(5);
        assert_eq!(rig.state(), FiltrationState::OpeningOverflow);

        rig.cover.set_position(Some(100));
        rig.wait(5);
        rig.wait(2);
        assert_eq!(rig.state(), FiltrationState::OverflowBoost);
        assert!(rig.tank.commands().contains(&"mode Overflow".to_string()));
        assert!(rig.boost.is_on());
        rig.wait(300);
        assert_eq!(rig.state(), FiltrationState::OverflowNormal);
        assert_eq!(rig.variable.speed(), 3);
        assert!(rig.boost.is_on());
        assert!(rig.disinfection.was_fired(DisinfectionTrigger::Constant));
    }

    #[test]
    fn low_tank_refuses_to_open() {
        let mut rig = rig(FiltrationCfg::default());
        rig.fire(FiltrationTrigger::Eco);
        rig.tank.set_active(&[TankState::Low]);
        rig.fire(FiltrationTrigger::Standby);
        assert!(rig.cell.actor().is(FiltrationState::Eco));
    }

    #[test]
    fn silent_tank_counts_as_low() {
        let mut rig = rig(FiltrationCfg::default());
        rig.fire(FiltrationTrigger::Eco);
        rig.tank.set_silent(true);
        rig.fire(FiltrationTrigger::Overflow);
        assert!(rig.cell.actor().is(FiltrationState::Eco));
    }

    #[test]
    fn closing_goes_back_to_eco() {
        let mut rig = rig(FiltrationCfg::default());
        rig.fire(FiltrationTrigger::Eco);
        rig.cover.set_position(Some(100));
        rig.fire(FiltrationTrigger::Standby);
        rig.wait(2);
        rig.wait(300);
        assert_eq!(rig.state(), FiltrationState::StandbyNormal);

        rig.cover.set_position(Some(50));
        rig.fire(FiltrationTrigger::Eco);
        assert_eq!(rig.state(), FiltrationState::Closing);
        assert_eq!(rig.sink.last("/status/filtration/state").as_deref(), Some("closing_50"));
        rig.cover.set_position(Some(0));
        rig.wait(5);
        rig.wait(2);
        assert!(rig.cell.actor().is(FiltrationState::Eco));
        assert!(rig.cover.commands().ends_with(&["close".to_string(), "stop".to_string()]));
    }

    #[test]
    fn speed_change_reloads_standby() {
        let mut rig = rig(FiltrationCfg::default());
        rig.fire(FiltrationTrigger::Eco);
        rig.cover.set_position(Some(100));
        rig.fire(FiltrationTrigger::Standby);
        rig.wait(2);
        rig.wait(300);
        assert_eq!(rig.variable.speed(), 1);
        rig.set(FiltrationSetting::SpeedStandby(2));
        assert_eq!(rig.state(), FiltrationState::StandbyNormal);
        assert_eq!(rig.variable.speed(), 2);
    }

    #[test]
    fn comfort_forces_heating_and_releases_it() {
        let mut rig = rig(FiltrationCfg::default());
        rig.fire(FiltrationTrigger::Eco);
        rig.cover.set_position(Some(100));
        rig.fire(FiltrationTrigger::Overflow);
        rig.wait(2);
        rig.fire(FiltrationTrigger::Comfort);
        assert_eq!(rig.state(), FiltrationState::Comfort);
        assert!(rig.heating.was_fired(HeatingTrigger::Force));
        rig.fire(FiltrationTrigger::Overflow);
        assert_eq!(rig.heating.fired().last(), Some(&HeatingTrigger::Wait));
    }

    #[test]
    fn heating_delay_returns_to_eco() {
        let mut rig = rig(FiltrationCfg::default());
        rig.fire(FiltrationTrigger::Eco);
        rig.wait(5);
        let (tx, rx) = crossbeam_channel::bounded(1);
        rig.addr.send(FiltrationMsg::Request(FiltrationTrigger::Heat, tx));
        rig.cell.run_pending();
        assert!(rx.recv().unwrap());
        assert_eq!(rig.state(), FiltrationState::HeatingRunning);
        assert_eq!(rig.variable.speed(), 2);

        rig.heating.set_active(&[HeatingState::Heating]);
        rig.heating.clear();
        rig.fire(FiltrationTrigger::HeatingDelay);
        assert_eq!(rig.state(), FiltrationState::HeatingDelayNone);
        assert_eq!(rig.heating.fired(), vec![HeatingTrigger::Wait]);
        rig.wait(300);
        assert!(rig.cell.actor().is(FiltrationState::Eco));
    }

    #[test]
    fn backwash_period_below_two_days_is_refused() {
        let mut rig = rig(FiltrationCfg::default());
        rig.set(FiltrationSetting::BackwashPeriod(1));
        assert_eq!(rig.cell.actor().model().cfg().backwash.period_days, 30);
        rig.set(FiltrationSetting::BackwashPeriod(14));
        assert_eq!(rig.cell.actor().model().cfg().backwash.period_days, 14);
    }

    #[test]
    fn duration_change_keeps_elapsed_and_recomputes() {
        let mut rig = rig(FiltrationCfg::default());
        rig.set(FiltrationSetting::RestoreDuration(Duration::from_secs(3600)));
        rig.fire(FiltrationTrigger::Eco);
        rig.wait(5);
        rig.set(FiltrationSetting::Duration(Duration::from_secs(8 * 3600)));
        let eco = rig.cell.actor().model().eco();
        assert_eq!(eco.daily(), Duration::from_secs(8 * 3600));
        assert_eq!(eco.elapsed(), Duration::from_secs(3600));
        assert_eq!(rig.state(), FiltrationState::EcoCompute);
    }

    #[test]
    fn wintering_stirs_when_air_is_cold() {
        let mut cfg = FiltrationCfg::default();
        cfg.wintering.period = Duration::from_secs(600);
        let mut rig = rig(cfg);
        rig.fire(FiltrationTrigger::Wintering);
        assert_eq!(rig.state(), FiltrationState::WinteringWaiting);
        assert!(rig.swim.was_fired(SwimTrigger::Wintering));
        assert!(rig.cover.commands().contains(&"open".to_string()));
        // no air reading counts as cold
        for _ in 0..6 {
            rig.wait(120);
        }
        assert_eq!(rig.state(), FiltrationState::WinteringStir);
        assert_eq!(rig.variable.speed(), 1);
        rig.wait(600);
        assert_eq!(rig.state(), FiltrationState::WinteringWaiting);
        rig.fire(FiltrationTrigger::Halt);
        assert_eq!(rig.swim.fired().last(), Some(&SwimTrigger::Halt));
    }
}
