//! End-to-end behaviour of the filtration orchestrator against stub peers.
mod common;

use std::time::Duration;

use pool_core::config::FiltrationCfg;
use pool_core::disinfection::DisinfectionTrigger;
use pool_core::filtration::{BACKWASH_LAST_FORMAT, FiltrationState, FiltrationTrigger};
use pool_core::tank::{TankState, TankTrigger};
use pool_traits::Clock;
use rstest::rstest;

use common::plant;

fn always_on() -> FiltrationCfg {
    FiltrationCfg {
        daily: Duration::from_secs(24 * 3600),
        period: 1,
        ..FiltrationCfg::default()
    }
}

#[test]
fn low_tank_in_eco_normal_goes_waiting() {
    let mut p = plant(always_on());
    p.fire(FiltrationTrigger::Eco);
    p.wait(5);
    assert_eq!(p.state(), FiltrationState::EcoNormal);
    assert_eq!(p.variable.speed(), 1);

    p.tank.set_active(&[TankState::Low]);
    p.wait(10);
    assert_eq!(p.state(), FiltrationState::EcoWaiting);
    assert_eq!(p.variable.speed(), 0);
    assert!(!p.switches.tank.is_on());
    assert!(!p.states_published().iter().any(|s| s == "eco_tank"));
}

#[test]
fn halt_during_standby_boost_drops_the_boost_timer() {
    let mut p = plant(FiltrationCfg::default());
    p.open_standby();
    assert!(p.switches.boost.is_on());
    assert!(p.switches.tank.is_on());
    assert_eq!(p.variable.speed(), 3);

    p.fire(FiltrationTrigger::Halt);
    assert_eq!(p.state(), FiltrationState::Halt);
    assert_eq!(p.variable.speed(), 0);
    assert!(p.switches.all_off());
    assert_eq!(p.tank.fired().last(), Some(&TankTrigger::Halt));

    let published = p.states_published().len();
    p.wait(600);
    assert_eq!(p.state(), FiltrationState::Halt);
    assert_eq!(p.states_published().len(), published);
    assert!(!p.switches.boost.is_on());
}

#[test]
fn backwash_runs_once_when_due_and_tank_high() {
    let mut p = plant(FiltrationCfg::default());
    p.tank.set_active(&[TankState::High]);
    p.fire(FiltrationTrigger::Eco);
    p.wait(5);
    assert_eq!(p.state(), FiltrationState::WashBackwash);
    assert!(p.switches.tank.is_on());
    assert_eq!(p.variable.speed(), 3);
    assert!(p.disinfection.was_fired(DisinfectionTrigger::Halt));

    // valves open one after the other
    p.wait(2);
    assert!(p.switches.backwash.is_on());
    assert!(!p.switches.drain.is_on());
    p.wait(2);
    assert!(p.switches.drain.is_on());

    p.wait(120);
    assert_eq!(p.state(), FiltrationState::WashRinse);
    assert!(!p.switches.backwash.is_on());

    p.wait(60);
    assert!(p.is(FiltrationState::Eco));
    assert!(!p.switches.drain.is_on());
    assert_eq!(p.sink.count("/status/filtration/backwash/last"), 1);
    let expected = p.clock.wall_now().format(BACKWASH_LAST_FORMAT).to_string();
    assert_eq!(p.sink.last("/status/filtration/backwash/last"), Some(expected));

    // not due again for the rest of the period
    p.wait_ticks(3600, 10);
    assert!(p.is(FiltrationState::Eco));
    assert_eq!(p.sink.count("/status/filtration/backwash/last"), 1);
}

#[test]
fn backwash_waits_for_a_high_tank() {
    let mut p = plant(FiltrationCfg::default());
    p.fire(FiltrationTrigger::Eco);
    p.wait(5);
    assert_eq!(p.state(), FiltrationState::EcoWaiting);
    p.wait_ticks(60, 10);
    assert_eq!(p.state(), FiltrationState::EcoWaiting);

    p.tank.set_active(&[TankState::High]);
    p.wait(10);
    assert_eq!(p.state(), FiltrationState::WashBackwash);
}

#[test]
fn halt_aborts_a_running_backwash() {
    let mut p = plant(FiltrationCfg::default());
    p.tank.set_active(&[TankState::High]);
    p.fire(FiltrationTrigger::Eco);
    p.wait(5);
    p.wait(2);
    p.fire(FiltrationTrigger::Halt);
    assert!(p.switches.all_off());
    p.wait(300);
    assert_eq!(p.state(), FiltrationState::Halt);
    assert!(!p.switches.drain.is_on());
    assert_eq!(p.sink.count("/status/filtration/backwash/last"), 0);
}

#[test]
fn halt_during_rinse_counts_as_a_backwash() {
    let mut p = plant(FiltrationCfg::default());
    p.tank.set_active(&[TankState::High]);
    p.fire(FiltrationTrigger::Eco);
    p.wait(5);
    p.wait(2);
    p.wait(2);
    p.wait(120);
    assert_eq!(p.state(), FiltrationState::WashRinse);
    p.wait(10);
    p.fire(FiltrationTrigger::Halt);
    assert_eq!(p.state(), FiltrationState::Halt);
    assert_eq!(p.sink.count("/status/filtration/backwash/last"), 1);
    let expected = p.clock.wall_now().format(BACKWASH_LAST_FORMAT).to_string();
    assert_eq!(p.sink.last("/status/filtration/backwash/last"), Some(expected));
}

#[rstest]
#[case(FiltrationTrigger::Standby)]
#[case(FiltrationTrigger::Overflow)]
fn low_tank_keeps_the_pool_closed(#[case] trigger: FiltrationTrigger) {
    let mut p = plant(FiltrationCfg::default());
    p.fire(FiltrationTrigger::Eco);
    p.tank.set_active(&[TankState::Fill]);
    p.fire(trigger);
    assert!(p.is(FiltrationState::Eco));
    assert!(p.cover.commands().is_empty());
}

#[test]
fn daily_reset_reloads_eco() {
    let mut p = plant(always_on());
    p.fire(FiltrationTrigger::Eco);
    p.wait(5);
    assert_eq!(p.state(), FiltrationState::EcoNormal);
    // the stub clock starts at midnight, next reset is 24h later
    p.wait_ticks(24 * 3600, 600);
    let states = p.states_published();
    assert!(states.iter().filter(|s| *s == "eco_compute").count() >= 2, "{states:?}");
    assert!(p.is(FiltrationState::Eco));
}
