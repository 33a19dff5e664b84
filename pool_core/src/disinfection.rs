//! pH and chlorine dosing.
//!
//! While running, the actor alternates between `adjusting` (read the averaged
//! pH and ORP, compute the proportional feedback, set both PWM duties) and
//! `treating` (let the dosing pumps work for `waiting_delay`). pH uses "pH
//! minus" chemicals, so its controller gain is negative. `constant` keeps the
//! pH regulation and doses chlorine at a fixed duty, which is used while the
//! pool is open to swimmers.
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::actor::{Actor, Context};
use crate::config::DisinfectionCfg;
use crate::error::BuildError;
use crate::hsm::{Machine, MachineMsg, Repeat, State, StateQuery, Transition};
use crate::interlock::{PwmPort, ReadingsPort};
use crate::pwm::PController;
use crate::sensor::Probe;
use crate::status::Encoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisinfectionState {
    Halt,
    Waiting,
    Running,
    RunningAdjusting,
    RunningTreating,
    Constant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisinfectionTrigger {
    Run,
    Constant,
    Adjust,
    Treat,
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisinfectionSetting {
    PhEnable(bool),
    PhSetpoint(f64),
    PhPterm(f64),
    OrpEnable(bool),
    OrpSetpoint(f64),
    OrpPterm(f64),
}

pub enum DisinfectionMsg {
    Fire(DisinfectionTrigger),
    Repeat,
    Is(DisinfectionState, Sender<bool>),
    Setting(DisinfectionSetting),
}

impl MachineMsg for DisinfectionMsg {
    type Trigger = DisinfectionTrigger;

    fn fire(trigger: DisinfectionTrigger) -> Self {
        DisinfectionMsg::Fire(trigger)
    }

    fn repeat() -> Self {
        DisinfectionMsg::Repeat
    }
}

impl StateQuery for DisinfectionMsg {
    type State = DisinfectionState;

    fn is(state: DisinfectionState, reply: Sender<bool>) -> Self {
        DisinfectionMsg::Is(state, reply)
    }
}

pub struct DisinfectionModel {
    cfg: DisinfectionCfg,
    ph_enable: bool,
    orp_enable: bool,
    ph: PController,
    orp: PController,
    ph_pwm: Box<dyn PwmPort>,
    cl_pwm: Box<dyn PwmPort>,
    readings: Box<dyn ReadingsPort>,
    encoder: Encoder,
}

impl DisinfectionModel {
    pub fn ph_controller(&self) -> &PController {
        &self.ph
    }

    pub fn orp_controller(&self) -> &PController {
        &self.orp
    }

    fn reading(&self, probe: Probe) -> Option<f64> {
        match self.readings.reading(probe) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(%probe, error = %e, "reading unavailable");
                None
            }
        }
    }

    fn adjust_ph(&mut self) {
        let Some(ph) = self.reading(Probe::Ph) else {
            tracing::warn!("no pH reading, keeping the current duty");
            return;
        };
        self.ph.current = ph;
        let feedback = if self.ph_enable { self.ph.compute() } else { 0.0 };
        tracing::debug!(ph, feedback, "pH adjusted");
        self.encoder
            .publish("disinfection/ph/feedback", (feedback * 100.0).round() as i64);
        self.ph_pwm.set_value(feedback);
    }

    fn adjust_cl(&mut self) {
        let Some(orp) = self.reading(Probe::Orp) else {
            tracing::warn!("no ORP reading, keeping the current duty");
            return;
        };
        self.orp.current = orp;
        let feedback = if self.orp_enable { self.orp.compute() } else { 0.0 };
        tracing::debug!(orp, feedback, "chlorine adjusted");
        self.encoder
            .publish("disinfection/cl/feedback", (feedback * 100.0).round() as i64);
        self.cl_pwm.set_value(feedback);
    }

    fn apply(&mut self, setting: DisinfectionSetting) {
        match setting {
            DisinfectionSetting::PhEnable(v) => self.ph_enable = v,
            DisinfectionSetting::PhSetpoint(v) => self.ph.setpoint = v,
            // pH minus: a pH above the setpoint must give a positive duty
            DisinfectionSetting::PhPterm(v) => self.ph.pterm = -v,
            DisinfectionSetting::OrpEnable(v) => self.orp_enable = v,
            DisinfectionSetting::OrpSetpoint(v) => self.orp.setpoint = v,
            DisinfectionSetting::OrpPterm(v) => self.orp.pterm = v,
        }
        tracing::info!(?setting, "disinfection setting applied");
    }
}

type DisinfectionMachine =
    Machine<DisinfectionState, DisinfectionTrigger, DisinfectionModel, Context<DisinfectionMsg>>;

fn enter_halt(m: &mut DisinfectionModel, _: &mut Context<DisinfectionMsg>) {
    tracing::info!(state = "halt", "disinfection entering state");
    m.encoder.state("disinfection", "halt");
    m.ph_pwm.set_value(0.0);
    m.cl_pwm.set_value(0.0);
    m.ph_pwm.cancel();
    m.cl_pwm.cancel();
    m.encoder.publish("disinfection/cl/feedback", 0);
    m.encoder.publish("disinfection/ph/feedback", 0);
}

fn enter_waiting(m: &mut DisinfectionModel, ctx: &mut Context<DisinfectionMsg>) {
    tracing::info!(state = "waiting", "disinfection entering state");
    m.encoder.state("disinfection", "waiting");
    ctx.schedule_delay(
        m.cfg.start_delay,
        DisinfectionMsg::Fire(DisinfectionTrigger::Run),
    );
}

fn enter_running(m: &mut DisinfectionModel, _: &mut Context<DisinfectionMsg>) {
    tracing::info!(state = "running", "disinfection entering state");
    m.ph_pwm.run();
    m.cl_pwm.set_period(m.cfg.cl_pwm.period);
    m.cl_pwm.run();
}

fn enter_adjusting(m: &mut DisinfectionModel, ctx: &mut Context<DisinfectionMsg>) {
    m.encoder.state("disinfection", "adjusting");
    m.adjust_ph();
    m.adjust_cl();
    ctx.defer(DisinfectionMsg::Fire(DisinfectionTrigger::Treat));
}

fn enter_treating(m: &mut DisinfectionModel, ctx: &mut Context<DisinfectionMsg>) {
    m.encoder.state("disinfection", "treating");
    ctx.schedule_delay(
        m.cfg.waiting_delay,
        DisinfectionMsg::Fire(DisinfectionTrigger::Adjust),
    );
}

fn enter_constant(m: &mut DisinfectionModel, _: &mut Context<DisinfectionMsg>) {
    tracing::info!(state = "constant", duty = m.cfg.constant_cl_duty, "disinfection entering state");
    m.encoder.state("disinfection", "constant");
    m.cl_pwm.set_value(m.cfg.constant_cl_duty);
    m.encoder.publish(
        "disinfection/cl/feedback",
        (m.cfg.constant_cl_duty * 100.0).round() as i64,
    );
    m.ph_pwm.run();
    m.cl_pwm.run();
}

fn repeat_constant(
    m: &mut DisinfectionModel,
    _: &mut Context<DisinfectionMsg>,
    _: Duration,
) -> Repeat<DisinfectionTrigger> {
    m.adjust_ph();
    Repeat::Continue
}

fn is_disabled(m: &DisinfectionModel) -> bool {
    m.cfg.disabled
}

fn machine(waiting_delay: Duration) -> Result<DisinfectionMachine, BuildError> {
    use DisinfectionState as S;
    use DisinfectionTrigger as T;
    Machine::builder("disinfection", S::Halt)
        .state(State::new(S::Halt).on_enter(enter_halt))
        .state(State::new(S::Waiting).on_enter(enter_waiting))
        .state(
            State::new(S::Running)
                .initial(S::RunningAdjusting)
                .on_enter(enter_running),
        )
        .state(
            State::new(S::RunningAdjusting)
                .parent(S::Running)
                .on_enter(enter_adjusting),
        )
        .state(
            State::new(S::RunningTreating)
                .parent(S::Running)
                .on_enter(enter_treating),
        )
        .state(
            State::new(S::Constant)
                .on_enter(enter_constant)
                .repeat(repeat_constant, waiting_delay),
        )
        .transition(Transition::new(T::Run, &[S::Halt], S::Waiting).unless(is_disabled))
        .transition(Transition::new(T::Run, &[S::Waiting], S::Running))
        .transition(
            Transition::new(T::Constant, &[S::Halt, S::Waiting, S::Running], S::Constant)
                .unless(is_disabled),
        )
        .transition(Transition::new(
            T::Halt,
            &[S::Waiting, S::Running, S::Constant],
            S::Halt,
        ))
        .transition(Transition::new(T::Adjust, &[S::RunningTreating], S::RunningAdjusting))
        .transition(Transition::new(T::Treat, &[S::RunningAdjusting], S::RunningTreating))
        .build()
}

pub struct Disinfection {
    machine: DisinfectionMachine,
    model: DisinfectionModel,
}

impl Disinfection {
    pub fn new(
        cfg: DisinfectionCfg,
        ph_pwm: Box<dyn PwmPort>,
        cl_pwm: Box<dyn PwmPort>,
        readings: Box<dyn ReadingsPort>,
        encoder: Encoder,
    ) -> Result<Self, BuildError> {
        let mut ph = PController::new(-cfg.ph_pterm, 1.0);
        ph.setpoint = cfg.ph_setpoint;
        let mut orp = PController::new(cfg.orp_pterm, cfg.orp_scale);
        orp.setpoint = cfg.orp_setpoint;
        ph_pwm.set_period(cfg.ph_pwm.period);
        cl_pwm.set_period(cfg.cl_pwm.period);
        Ok(Self {
            machine: machine(cfg.waiting_delay)?,
            model: DisinfectionModel {
                ph_enable: cfg.ph_enable,
                orp_enable: cfg.orp_enable,
                cfg,
                ph,
                orp,
                ph_pwm,
                cl_pwm,
                readings,
                encoder,
            },
        })
    }

    pub fn state(&self) -> DisinfectionState {
        self.machine.state()
    }

    pub fn model(&self) -> &DisinfectionModel {
        &self.model
    }
}

impl Actor for Disinfection {
    type Msg = DisinfectionMsg;

    fn started(&mut self, ctx: &mut Context<DisinfectionMsg>) {
        self.machine.start(&mut self.model, ctx);
    }

    fn handle(&mut self, msg: DisinfectionMsg, ctx: &mut Context<DisinfectionMsg>) {
        match msg {
            DisinfectionMsg::Fire(t) => {
                self.machine.fire(t, &mut self.model, ctx);
            }
            DisinfectionMsg::Repeat => self.machine.repeat(&mut self.model, ctx),
            DisinfectionMsg::Is(state, reply) => {
                let _ = reply.send(self.machine.is(state));
            }
            DisinfectionMsg::Setting(setting) => self.model.apply(setting),
        }
    }
}
