#![no_main]
use std::time::Duration;

use libfuzzer_sys::arbitrary::{self, Arbitrary};
use libfuzzer_sys::fuzz_target;
use pool_core::dispatcher::{Dispatcher, TOPICS, Targets};
use pool_core::mailbox;

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    topic: u8,
    /// Occasionally dispatch a free-form topic instead of a known one.
    raw_topic: Option<&'a str>,
    payload: &'a [u8],
}

fn with_targets(f: impl FnOnce(&mut Dispatcher)) {
    let t = Duration::from_millis(1);
    let (filtration, filtration_mb) = mailbox("filtration", t);
    let (tank, tank_mb) = mailbox("tank", t);
    let (swim, swim_mb) = mailbox("swim", t);
    let (light, light_mb) = mailbox("light", t);
    let (heater, heater_mb) = mailbox("heater", t);
    let (heating, heating_mb) = mailbox("heating", t);
    let (disinfection, disinfection_mb) = mailbox("disinfection", t);
    let (cover, cover_mb) = mailbox("cover", t);
    let mut dispatcher = Dispatcher::new(Targets {
        filtration,
        tank,
        swim,
        light,
        heater,
        heating,
        disinfection,
        cover,
    });
    f(&mut dispatcher);
    // at most one message per dispatch
    let posted = filtration_mb.drain().len()
        + tank_mb.drain().len()
        + swim_mb.drain().len()
        + light_mb.drain().len()
        + heater_mb.drain().len()
        + heating_mb.drain().len()
        + disinfection_mb.drain().len()
        + cover_mb.drain().len();
    assert!(posted <= 1);
}

fuzz_target!(|input: Input| {
    with_targets(|dispatcher| {
        let topic = match input.raw_topic {
            Some(raw) => raw,
            None => TOPICS[usize::from(input.topic) % TOPICS.len()].path,
        };
        let _ = dispatcher.dispatch(topic, input.payload);
    });
});
