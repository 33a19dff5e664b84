//! Threaded plant on the real clock: wiring, settings and shutdown.
use std::sync::Arc;
use std::time::{Duration, Instant};

use pool_core::config::PlantCfg;
use pool_core::mocks::RecordingSink;
use pool_core::sensor::Probe;
use pool_core::{FiltrationState, Plant, PlantDevices, SettingError};
use pool_hardware::{SimCover, SimPump, SimSensor, SimSwitch, SimWaterMeter};
use pool_traits::MonotonicClock;

fn devices() -> PlantDevices {
    PlantDevices {
        variable: Box::new(SimPump::new("variable", 3)),
        boost: Box::new(SimSwitch::new("boost")),
        gravity: Box::new(SimSwitch::new("gravity")),
        backwash: Box::new(SimSwitch::new("backwash")),
        tank_valve: Box::new(SimSwitch::new("tank")),
        drain: Box::new(SimSwitch::new("drain")),
        main_valve: Box::new(SimSwitch::new("main")),
        tank_level: Box::new(SimSensor::new("tank", 60.0)),
        heating_valve: Box::new(SimSwitch::new("heating")),
        heater: None,
        ph_pump: Box::new(SimSwitch::new("ph")),
        cl_pump: Box::new(SimSwitch::new("cl")),
        swim_pump: Box::new(SimPump::new("swim", 100)),
        light: Box::new(SimSwitch::new("light")),
        cover: Box::new(SimCover::new(0)),
        water_meter: Box::new(SimWaterMeter::new(1)),
        probes: vec![
            (Probe::Pool, Box::new(SimSensor::new("pool", 24.0)) as Box<dyn pool_traits::Sensor>),
            (Probe::Air, Box::new(SimSensor::new("air", 20.0))),
            (Probe::Local, Box::new(SimSensor::new("local", 12.0))),
            (Probe::Ph, Box::new(SimSensor::new("ph", 7.2))),
            (Probe::Orp, Box::new(SimSensor::new("orp", 650.0))),
        ],
    }
}

fn wait_for(plant: &Plant, wanted: impl Fn(FiltrationState) -> bool) -> Option<FiltrationState> {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if let Ok(state) = plant.state()
            && wanted(state)
        {
            return Some(state);
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    None
}

#[test]
fn plant_starts_halted_runs_eco_and_shuts_down() {
    let sink = Arc::new(RecordingSink::default());
    let plant = Plant::start(PlantCfg::default(), devices(), sink.clone(), Arc::new(MonotonicClock::new()))
        .expect("plant wiring");
    assert_eq!(wait_for(&plant, |s| s == FiltrationState::Halt), Some(FiltrationState::Halt));

    let mut dispatcher = plant.dispatcher();
    dispatcher.dispatch("/settings/mode", b"eco").expect("mode accepted");
    assert_eq!(
        wait_for(&plant, |s| s == FiltrationState::EcoCompute),
        Some(FiltrationState::EcoCompute)
    );
    assert!(matches!(
        dispatcher.dispatch("/settings/mode", b"disco"),
        Err(SettingError::OutOfRange { .. })
    ));

    plant.shutdown();
    assert_eq!(sink.last("/status/filtration/state").as_deref(), Some("halt"));
    assert_eq!(sink.last("/status/tank/state").as_deref(), Some("halt"));
}
