//! A state transition drops every continuation scheduled before it.
use std::sync::Arc;
use std::time::Duration;

use pool_core::actor::{Actor, ActorCell, Context, mailbox};
use pool_core::hsm::{Machine, MachineMsg, State, Transition};
use pool_traits::clock::test_clock::TestClock;
use proptest::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum St {
    Idle,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tr {
    Go,
}

enum Msg {
    Fire(Tr),
    Repeat,
    Burst(Vec<u64>),
    Delayed,
}

impl MachineMsg for Msg {
    type Trigger = Tr;

    fn fire(trigger: Tr) -> Self {
        Msg::Fire(trigger)
    }

    fn repeat() -> Self {
        Msg::Repeat
    }
}

#[derive(Default)]
struct Model {
    delivered: u32,
}

struct Subject {
    machine: Machine<St, Tr, Model, Context<Msg>>,
    model: Model,
}

impl Subject {
    fn new() -> Self {
        let machine = Machine::builder("subject", St::Idle)
            .state(State::new(St::Idle))
            .state(State::new(St::Busy))
            .transition(Transition::new(Tr::Go, &[St::Idle, St::Busy], St::Busy))
            .build()
            .expect("state table");
        Self {
            machine,
            model: Model::default(),
        }
    }
}

impl Actor for Subject {
    type Msg = Msg;

    fn started(&mut self, ctx: &mut Context<Msg>) {
        self.machine.start(&mut self.model, ctx);
    }

    fn handle(&mut self, msg: Msg, ctx: &mut Context<Msg>) {
        match msg {
            Msg::Fire(t) => {
                self.machine.fire(t, &mut self.model, ctx);
            }
            Msg::Repeat => self.machine.repeat(&mut self.model, ctx),
            Msg::Burst(delays) => {
                for d in delays {
                    ctx.schedule_delay(Duration::from_secs(d), Msg::Delayed);
                }
            }
            Msg::Delayed => self.model.delivered += 1,
        }
    }
}

fn run(delays: Vec<u64>, transition: bool) -> u32 {
    let clock = TestClock::new();
    let (addr, mb) = mailbox("subject", Duration::from_millis(10));
    let mut cell = ActorCell::new(Subject::new(), mb, Arc::new(clock.clone()));
    addr.send(Msg::Burst(delays));
    if transition {
        addr.send(Msg::Fire(Tr::Go));
    }
    cell.run_pending();
    clock.advance(Duration::from_secs(7200));
    cell.run_pending();
    cell.actor().model.delivered
}

proptest! {
    #[test]
    fn transition_drops_every_pending_delay(delays in prop::collection::vec(1u64..3600, 1..20)) {
        prop_assert_eq!(run(delays, true), 0);
    }

    #[test]
    fn only_the_latest_delay_survives(delays in prop::collection::vec(1u64..3600, 1..20)) {
        prop_assert_eq!(run(delays, false), 1);
    }
}

#[test]
fn self_transition_also_cancels() {
    let clock = TestClock::new();
    let (addr, mb) = mailbox("subject", Duration::from_millis(10));
    let mut cell = ActorCell::new(Subject::new(), mb, Arc::new(clock.clone()));
    addr.send(Msg::Fire(Tr::Go));
    addr.send(Msg::Burst(vec![10]));
    addr.send(Msg::Fire(Tr::Go));
    cell.run_pending();
    assert_eq!(cell.actor().machine.state(), St::Busy);
    clock.advance(Duration::from_secs(60));
    cell.run_pending();
    assert_eq!(cell.actor().model.delivered, 0);
}
