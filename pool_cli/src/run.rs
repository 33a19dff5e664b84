//! `poolctl run`: the simulated plant driven by settings read from stdin.

use std::io::BufRead;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use eyre::{Result, WrapErr};
use pool_config::Config;
use pool_core::sensor::Probe;
use pool_core::{Dispatcher, Plant, PlantCfg, PlantDevices, TracingSink};
use pool_hardware::{SimCover, SimPump, SimSensor, SimSwitch, SimWaterMeter};
use pool_traits::{MonotonicClock, Sensor};

enum Event {
    Line(String),
    Eof,
    Interrupt,
}

/// Simulated plant: every device is in memory, sensors hold plausible values.
fn sim_devices() -> PlantDevices {
    let probe = |probe, name, value| (probe, Box::new(SimSensor::new(name, value)) as Box<dyn Sensor>);
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
        heater: Some(Box::new(SimSwitch::new("heater"))),
        ph_pump: Box::new(SimSwitch::new("ph")),
        cl_pump: Box::new(SimSwitch::new("cl")),
        swim_pump: Box::new(SimPump::new("swim", 100)),
        light: Box::new(SimSwitch::new("light")),
        cover: Box::new(SimCover::new(0)),
        water_meter: Box::new(SimWaterMeter::new(1)),
        probes: vec![
            probe(Probe::Pool, "pool", 24.0),
            probe(Probe::Air, "air", 20.0),
            probe(Probe::Local, "local", 12.0),
            probe(Probe::Ncc, "ncc", 25.0),
            probe(Probe::Ph, "ph", 7.2),
            probe(Probe::Orp, "orp", 650.0),
        ],
    }
}

fn spawn_stdin_reader(tx: Sender<Event>) -> Result<()> {
    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(l) => {
                        if tx.send(Event::Line(l)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
            let _ = tx.send(Event::Eof);
        })
        .wrap_err("spawning stdin reader")?;
    Ok(())
}

/// One stdin line. Returns an output line for queries.
fn handle_line(plant: &Plant, dispatcher: &mut Dispatcher, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    if line == "state" {
        return Some(match plant.state() {
            Ok(s) => s.name().to_string(),
            Err(e) => format!("error: {e}"),
        });
    }
    let Some((topic, payload)) = line.split_once(char::is_whitespace) else {
        tracing::warn!(line, "expected `topic payload`");
        return None;
    };
    match dispatcher.dispatch(topic, payload.trim().as_bytes()) {
        Ok(()) => tracing::debug!(topic, "setting applied"),
        Err(e) => eprintln!("{topic}: {e}"),
    }
    None
}

fn next_event(rx: &Receiver<Event>, deadline: Option<Instant>) -> Event {
    match deadline {
        Some(d) => rx.recv_deadline(d).unwrap_or(Event::Interrupt),
        None => rx.recv().unwrap_or(Event::Eof),
    }
}

pub fn run(cfg: &Config, mode: &str, run_for: Option<Duration>) -> Result<()> {
    let plant = Plant::start(
        PlantCfg::from(cfg),
        sim_devices(),
        Arc::new(TracingSink),
        Arc::new(MonotonicClock::new()),
    )?;
    let mut dispatcher = plant.dispatcher();
    if let Err(e) = dispatcher.dispatch("/settings/mode", mode.as_bytes()) {
        plant.shutdown();
        return Err(e).wrap_err_with(|| format!("initial mode {mode:?}"));
    }
    tracing::info!(mode, "plant running");

    let (tx, rx) = unbounded();
    let interrupt = tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt.send(Event::Interrupt);
    })
    .wrap_err("installing Ctrl-C handler")?;
    spawn_stdin_reader(tx)?;

    let deadline = run_for.map(|d| Instant::now() + d);
    loop {
        match next_event(&rx, deadline) {
            Event::Line(l) => {
                if let Some(out) = handle_line(&plant, &mut dispatcher, &l) {
                    println!("{out}");
                }
            }
            // with --run-for, only the deadline or Ctrl-C ends the run
            Event::Eof if deadline.is_some() => {}
            Event::Eof => {
                tracing::info!("stdin closed");
                break;
            }
            Event::Interrupt => {
                tracing::info!("stopping");
                break;
            }
        }
    }

    plant.shutdown();
    Ok(())
}
