//! Plant wiring: one actor per subsystem, peers injected as typed ports.
//!
//! Every mailbox is created before any actor so that cyclic peer references
//! (filtration ⇄ tank, filtration ⇄ heating, ...) can be handed out up front.
use std::sync::Arc;

use pool_traits::{Cover as CoverDevice, Sensor, SpeedPump, Switch, WaterMeter};

use crate::actor::{ActorHandle, Addr, SharedClock, mailbox, spawn};
use crate::config::PlantCfg;
use crate::cover::{Cover, CoverMsg};
use crate::disinfection::{Disinfection, DisinfectionMsg};
use crate::dispatcher::{Dispatcher, Targets};
use crate::error::{AskError, Result};
use crate::filtration::{
    Filtration, FiltrationDevices, FiltrationMsg, FiltrationPeers, FiltrationState, FiltrationTrigger,
};
use crate::heating::{Heater, HeaterMsg, Heating, HeatingMsg};
use crate::light::{Light, LightMsg};
use crate::pwm::{Pwm, PwmActor, PwmMsg};
use crate::sensor::{Probe, ReaderMsg, SensorReader};
use crate::status::{Encoder, StatusSink};
use crate::swim::{Swim, SwimMsg};
use crate::tank::{Tank, TankDevices, TankMsg};

/// Every device the plant drives or reads.
pub struct PlantDevices {
    pub variable: Box<dyn SpeedPump>,
    pub boost: Box<dyn Switch>,
    pub gravity: Box<dyn Switch>,
    pub backwash: Box<dyn Switch>,
    pub tank_valve: Box<dyn Switch>,
    pub drain: Box<dyn Switch>,
    pub main_valve: Box<dyn Switch>,
    pub tank_level: Box<dyn Sensor>,
    pub heating_valve: Box<dyn Switch>,
    /// Frost heater of the technical room, if installed.
    pub heater: Option<Box<dyn Switch>>,
    pub ph_pump: Box<dyn Switch>,
    pub cl_pump: Box<dyn Switch>,
    pub swim_pump: Box<dyn SpeedPump>,
    pub light: Box<dyn Switch>,
    pub cover: Box<dyn CoverDevice>,
    pub water_meter: Box<dyn WaterMeter>,
    pub probes: Vec<(Probe, Box<dyn Sensor>)>,
}

/// Running plant. Dropping it stops every actor.
pub struct Plant {
    targets: Targets,
    readings: Addr<ReaderMsg>,
    handles: Vec<ActorHandle>,
}

impl Plant {
    /// Build and spawn every actor. Filtration starts in `halt`.
    pub fn start(
        cfg: PlantCfg,
        devices: PlantDevices,
        sink: Arc<dyn StatusSink>,
        clock: SharedClock,
    ) -> Result<Self> {
        let ask = cfg.runtime.ask_timeout;
        let encoder = Encoder::new(sink);
        let now = clock.wall_now();

        let (filtration, filtration_mb) = mailbox::<FiltrationMsg>("filtration", ask);
        let (tank, tank_mb) = mailbox::<TankMsg>("tank", ask);
        let (heating, heating_mb) = mailbox::<HeatingMsg>("heating", ask);
        let (heater, heater_mb) = mailbox::<HeaterMsg>("heater", ask);
        let (disinfection, disinfection_mb) = mailbox::<DisinfectionMsg>("disinfection", ask);
        let (ph_pwm, ph_pwm_mb) = mailbox::<PwmMsg>("ph_pwm", ask);
        let (cl_pwm, cl_pwm_mb) = mailbox::<PwmMsg>("cl_pwm", ask);
        let (swim, swim_mb) = mailbox::<SwimMsg>("swim", ask);
        let (light, light_mb) = mailbox::<LightMsg>("light", ask);
        let (cover, cover_mb) = mailbox::<CoverMsg>("cover", ask);
        let (readings, readings_mb) = mailbox::<ReaderMsg>("readings", ask);

        let mut reader = SensorReader::new(cfg.sensors.sample, encoder.clone());
        for (probe, sensor) in devices.probes {
            let window = match probe {
                Probe::Ph | Probe::Orp => cfg.sensors.disinfection_window,
                _ => cfg.sensors.temperature_window,
            };
            reader = reader.with_probe(probe, sensor, cfg.sensors.samples(window));
        }

        let filtration_actor = Filtration::new(
            cfg.filtration.clone(),
            FiltrationDevices {
                variable: devices.variable,
                boost: devices.boost,
                gravity: devices.gravity,
                backwash: devices.backwash,
                tank: devices.tank_valve,
                drain: devices.drain,
            },
            FiltrationPeers {
                tank: Box::new(tank.clone()),
                heating: Box::new(heating.clone()),
                heater: Box::new(heater.clone()),
                disinfection: Box::new(disinfection.clone()),
                swim: Box::new(swim.clone()),
                light: Box::new(light.clone()),
                cover: Box::new(cover.clone()),
                readings: Box::new(readings.clone()),
            },
            encoder.clone(),
            now,
        )?;
        let tank_actor = Tank::new(
            cfg.tank.clone(),
            TankDevices {
                level: devices.tank_level,
                main_valve: devices.main_valve,
            },
            Box::new(filtration.clone()),
            encoder.clone(),
        )?;
        let heating_actor = Heating::new(
            cfg.heating.clone(),
            devices.heating_valve,
            Box::new(filtration.clone()),
            Box::new(readings.clone()),
            encoder.clone(),
            now,
        )?;
        let heater_actor = Heater::new(cfg.heater.clone(), devices.heater, Box::new(readings.clone()))?;
        let ph_actor = PwmActor::new(
            Pwm::new("ph", devices.ph_pump, &cfg.disinfection.ph_pwm, now),
            cfg.disinfection.ph_pwm.tick,
        );
        let cl_actor = PwmActor::new(
            Pwm::new("cl", devices.cl_pump, &cfg.disinfection.cl_pwm, now),
            cfg.disinfection.cl_pwm.tick,
        );
        let disinfection_actor = Disinfection::new(
            cfg.disinfection.clone(),
            Box::new(ph_pwm.clone()),
            Box::new(cl_pwm.clone()),
            Box::new(readings.clone()),
            encoder.clone(),
        )?;
        let swim_actor = Swim::new(
            cfg.swim.clone(),
            cfg.filtration.wintering.clone(),
            devices.swim_pump,
            Box::new(filtration.clone()),
            Box::new(readings.clone()),
            encoder.clone(),
        )?;
        let light_actor = Light::new(devices.light, encoder.clone())?;
        let cover_actor = Cover::new(devices.cover, devices.water_meter, encoder, cfg.cover_refresh)?;

        // peers first, the orchestrator last: its start halts everybody
        let handles = vec![
            spawn(reader, readings_mb, Arc::clone(&clock))?,
            spawn(ph_actor, ph_pwm_mb, Arc::clone(&clock))?,
            spawn(cl_actor, cl_pwm_mb, Arc::clone(&clock))?,
            spawn(disinfection_actor, disinfection_mb, Arc::clone(&clock))?,
            spawn(tank_actor, tank_mb, Arc::clone(&clock))?,
            spawn(heating_actor, heating_mb, Arc::clone(&clock))?,
            spawn(heater_actor, heater_mb, Arc::clone(&clock))?,
            spawn(swim_actor, swim_mb, Arc::clone(&clock))?,
            spawn(light_actor, light_mb, Arc::clone(&clock))?,
            spawn(cover_actor, cover_mb, Arc::clone(&clock))?,
            spawn(filtration_actor, filtration_mb, clock)?,
        ];
        tracing::info!(actors = handles.len(), "plant started");

        Ok(Self {
            targets: Targets {
                filtration,
                tank,
                swim,
                light,
                heater,
                heating,
                disinfection,
                cover,
            },
            readings,
            handles,
        })
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.targets.clone())
    }

    pub fn filtration(&self) -> &Addr<FiltrationMsg> {
        &self.targets.filtration
    }

    pub fn readings(&self) -> &Addr<ReaderMsg> {
        &self.readings
    }

    /// Current leaf of the orchestrator.
    pub fn state(&self) -> std::result::Result<FiltrationState, AskError> {
        self.targets.filtration.ask(FiltrationMsg::State)
    }

    /// Halt the orchestrator, which cascades to every peer, then stop and
    /// join all actors.
    pub fn shutdown(mut self) {
        self.targets
            .filtration
            .send(FiltrationMsg::Fire(FiltrationTrigger::Halt));
        match self.state() {
            Ok(state) => tracing::info!(state = state.name(), "filtration halted"),
            Err(e) => tracing::warn!(error = %e, "filtration did not confirm halt"),
        }
        // the orchestrator goes first so it cannot wake peers again
        while let Some(handle) = self.handles.pop() {
            handle.join();
        }
        tracing::info!("plant stopped");
    }
}
