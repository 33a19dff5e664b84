//! Filtration rig shared by the scenario tests: a synchronous actor cell on a
//! test clock, simulated actuators and stub peers.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pool_core::actor::{ActorCell, Addr, mailbox};
use pool_core::config::FiltrationCfg;
use pool_core::cover::CoverTrigger;
use pool_core::disinfection::{DisinfectionState, DisinfectionTrigger};
use pool_core::filtration::{
    Filtration, FiltrationDevices, FiltrationMsg, FiltrationPeers, FiltrationSetting, FiltrationState,
    FiltrationTrigger,
};
use pool_core::heating::{HeaterState, HeaterTrigger, HeatingState, HeatingTrigger};
use pool_core::light::{LightState, LightTrigger};
use pool_core::mocks::{RecordingSink, StubCover, StubMachine, StubReadings};
use pool_core::status::Encoder;
use pool_core::swim::{SwimState, SwimTrigger};
use pool_core::tank::{TankState, TankTrigger};
use pool_hardware::{PumpProbe, SimPump, SimSwitch, SwitchProbe};
use pool_traits::Clock;
use pool_traits::clock::test_clock::TestClock;

pub struct Switches {
    pub boost: SwitchProbe,
    pub gravity: SwitchProbe,
    pub backwash: SwitchProbe,
    pub tank: SwitchProbe,
    pub drain: SwitchProbe,
}

impl Switches {
    pub fn all_off(&self) -> bool {
        [&self.boost, &self.gravity, &self.backwash, &self.tank, &self.drain]
            .iter()
            .all(|p| !p.is_on())
    }
}

pub struct Plant {
    pub clock: TestClock,
    pub cell: ActorCell<Filtration>,
    pub addr: Addr<FiltrationMsg>,
    pub variable: PumpProbe,
    pub switches: Switches,
    pub tank: StubMachine<TankState, TankTrigger>,
    pub heating: StubMachine<HeatingState, HeatingTrigger>,
    pub disinfection: StubMachine<DisinfectionState, DisinfectionTrigger>,
    pub cover: StubCover,
    pub readings: StubReadings,
    pub sink: Arc<RecordingSink>,
}

fn switch(name: &'static str) -> (SimSwitch, SwitchProbe) {
    let sw = SimSwitch::new(name);
    let probe = sw.probe();
    (sw, probe)
}

pub fn plant(cfg: FiltrationCfg) -> Plant {
    let clock = TestClock::new();
    let variable = SimPump::new("variable", 3);
    let variable_probe = variable.probe();
    let (boost, boost_p) = switch("boost");
    let (gravity, gravity_p) = switch("gravity");
    let (backwash, backwash_p) = switch("backwash");
    let (tank_valve, tank_p) = switch("tank");
    let (drain, drain_p) = switch("drain");

    let tank = StubMachine::new(&[TankState::Normal]);
    let heating = StubMachine::new(&[HeatingState::Waiting]);
    let disinfection = StubMachine::new(&[DisinfectionState::Halt]);
    let cover = StubCover::new(0);
    let readings = StubReadings::default();
    let sink = Arc::new(RecordingSink::default());

    let filtration = Filtration::new(
        cfg,
        FiltrationDevices {
            variable: Box::new(variable),
            boost: Box::new(boost),
            gravity: Box::new(gravity),
            backwash: Box::new(backwash),
            tank: Box::new(tank_valve),
            drain: Box::new(drain),
        },
        FiltrationPeers {
            tank: Box::new(tank.clone()),
            heating: Box::new(heating.clone()),
            heater: Box::new(StubMachine::<HeaterState, HeaterTrigger>::new(&[HeaterState::Halt])),
            disinfection: Box::new(disinfection.clone()),
            swim: Box::new(StubMachine::<SwimState, SwimTrigger>::new(&[SwimState::Halt])),
            light: Box::new(StubMachine::<LightState, LightTrigger>::new(&[LightState::Halt])),
            cover: Box::new(cover.clone()),
            readings: Box::new(readings.clone()),
        },
        Encoder::new(sink.clone()),
        clock.wall_now(),
    )
    .expect("filtration state table");
    let (addr, mb) = mailbox("filtration", Duration::from_millis(100));
    let mut cell = ActorCell::new(filtration, mb, Arc::new(clock.clone()));
    cell.run_pending();

    Plant {
        clock,
        cell,
        addr,
        variable: variable_probe,
        switches: Switches {
            boost: boost_p,
            gravity: gravity_p,
            backwash: backwash_p,
            tank: tank_p,
            drain: drain_p,
        },
        tank,
        heating,
        disinfection,
        cover,
        readings,
        sink,
    }
}

impl Plant {
    pub fn fire(&mut self, trigger: FiltrationTrigger) {
        self.addr.send(FiltrationMsg::Fire(trigger));
        self.cell.run_pending();
    }

    pub fn set(&mut self, setting: FiltrationSetting) {
        self.addr.send(FiltrationMsg::Setting(setting));
        self.cell.run_pending();
    }

    /// Advance the clock and run whatever became due.
    pub fn wait(&mut self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
        self.cell.run_pending();
    }

    /// Advance in `step` increments so every periodic tick runs.
    pub fn wait_ticks(&mut self, secs: u64, step: u64) {
        let mut left = secs;
        while left > 0 {
            let s = step.min(left);
            self.wait(s);
            left -= s;
        }
    }

    pub fn state(&self) -> FiltrationState {
        self.cell.actor().state()
    }

    pub fn is(&self, state: FiltrationState) -> bool {
        self.cell.actor().is(state)
    }

    pub fn states_published(&self) -> Vec<String> {
        self.sink
            .publications()
            .into_iter()
            .filter(|p| p.topic == "/status/filtration/state")
            .map(|p| p.payload)
            .collect()
    }

    /// Open the pool into standby boost.
    pub fn open_standby(&mut self) {
        self.fire(FiltrationTrigger::Eco);
        self.cover.set_position(Some(100));
        self.fire(FiltrationTrigger::Standby);
        self.wait(2);
        assert_eq!(self.state(), FiltrationState::StandbyBoost);
        assert!(self.cover.fired().contains(&CoverTrigger::Run));
    }
}
