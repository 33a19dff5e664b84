//! Actor runtime: one thread and one FIFO inbox per subsystem.
//!
//! An actor only ever runs one handler at a time. Peers reach it through a
//! cloneable [`Addr`]: `send` never blocks, `ask` waits for a reply with a
//! bounded timeout. Delayed self-messages go through [`Context::schedule_delay`]
//! and are keyed by the actor's epoch: bumping the epoch drops every timer that
//! was scheduled before, so stale continuations never fire.
//!
//! [`ActorCell`] can be driven two ways: [`spawn`] runs it on its own thread,
//! blocking on the inbox until the next timer deadline; [`ActorCell::run_pending`]
//! drains it synchronously against the injected clock, which is what the tests
//! use together with `TestClock`.
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use crossbeam_channel as xch;
use pool_traits::Clock;

use crate::error::AskError;

/// Upper bound of handler invocations for one `run_pending` call.
const MAX_PENDING_STEPS: usize = 100_000;

pub type SharedClock = Arc<dyn Clock + Send + Sync>;

pub trait Actor: Send + 'static {
    type Msg: Send + 'static;

    fn started(&mut self, _ctx: &mut Context<Self::Msg>) {}
    fn handle(&mut self, msg: Self::Msg, ctx: &mut Context<Self::Msg>);
    fn stopped(&mut self, _ctx: &mut Context<Self::Msg>) {}
}

enum Envelope<M> {
    Msg(M),
    Stop,
}

/// Handle used to post messages to an actor.
pub struct Addr<M> {
    name: &'static str,
    tx: xch::Sender<Envelope<M>>,
    ask_timeout: Duration,
}

impl<M> Clone for Addr<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            ask_timeout: self.ask_timeout,
        }
    }
}

impl<M> std::fmt::Debug for Addr<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Addr").field("name", &self.name).finish()
    }
}

impl<M: Send + 'static> Addr<M> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ask_timeout(&self) -> Duration {
        self.ask_timeout
    }

    /// Enqueue without blocking. Returns false if the actor is gone.
    pub fn send(&self, msg: M) -> bool {
        if self.tx.send(Envelope::Msg(msg)).is_err() {
            tracing::debug!(actor = self.name, "message dropped, actor is gone");
            return false;
        }
        true
    }

    /// Enqueue a request and wait for the reply up to the default ask timeout.
    pub fn ask<R>(&self, make: impl FnOnce(xch::Sender<R>) -> M) -> Result<R, AskError> {
        self.ask_within(self.ask_timeout, make)
    }

    pub fn ask_within<R>(
        &self,
        timeout: Duration,
        make: impl FnOnce(xch::Sender<R>) -> M,
    ) -> Result<R, AskError> {
        let (reply_tx, reply_rx) = xch::bounded(1);
        if self.tx.send(Envelope::Msg(make(reply_tx))).is_err() {
            return Err(AskError::Disconnected(self.name));
        }
        match reply_rx.recv_timeout(timeout) {
            Ok(r) => Ok(r),
            Err(xch::RecvTimeoutError::Timeout) => {
                tracing::debug!(actor = self.name, ?timeout, "ask timed out");
                Err(AskError::Timeout(self.name))
            }
            Err(xch::RecvTimeoutError::Disconnected) => Err(AskError::Disconnected(self.name)),
        }
    }

    /// Ask the actor to stop after the messages already queued.
    pub fn stop(&self) {
        let _ = self.tx.send(Envelope::Stop);
    }
}

/// Receiving side of an actor's inbox, consumed by [`ActorCell::new`].
pub struct Mailbox<M> {
    addr: Addr<M>,
    rx: xch::Receiver<Envelope<M>>,
}

impl<M> Mailbox<M> {
    /// Take every message queued so far without running an actor.
    pub fn drain(&self) -> Vec<M> {
        self.rx
            .try_iter()
            .filter_map(|e| match e {
                Envelope::Msg(m) => Some(m),
                Envelope::Stop => None,
            })
            .collect()
    }
}

/// Create an inbox. Addresses can be handed to peers before the actor exists,
/// which is how cyclic peer references get wired.
pub fn mailbox<M: Send + 'static>(name: &'static str, ask_timeout: Duration) -> (Addr<M>, Mailbox<M>) {
    let (tx, rx) = xch::unbounded();
    let addr = Addr {
        name,
        tx,
        ask_timeout,
    };
    (addr.clone(), Mailbox { addr, rx })
}

/// Capture of the epoch a delayed message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    pub epoch: u64,
    pub deadline: Instant,
}

struct PendingTimer<M> {
    token: TimerToken,
    msg: M,
}

/// Per-actor execution context handed to every handler.
pub struct Context<M> {
    myself: Addr<M>,
    clock: SharedClock,
    epoch: u64,
    timers: Vec<PendingTimer<M>>,
}

impl<M: Send + 'static> Context<M> {
    pub fn new(myself: Addr<M>, clock: SharedClock) -> Self {
        Self {
            myself,
            clock,
            epoch: 0,
            timers: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.myself.name
    }

    pub fn myself(&self) -> &Addr<M> {
        &self.myself
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn wall_now(&self) -> NaiveDateTime {
        self.clock.wall_now()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Invalidate every outstanding timer.
    pub fn cancel(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.timers.clear();
    }

    /// Deliver `msg` to this actor after `delay`.
    ///
    /// Scheduling bumps the epoch first, so only the most recent delay of an
    /// actor is ever honored.
    pub fn schedule_delay(&mut self, delay: Duration, msg: M) -> TimerToken {
        self.cancel();
        let token = TimerToken {
            epoch: self.epoch,
            deadline: self.now() + delay,
        };
        self.timers.push(PendingTimer { token, msg });
        token
    }

    pub fn is_current(&self, token: &TimerToken) -> bool {
        token.epoch == self.epoch
    }

    /// Post to our own inbox, behind everything already queued.
    pub fn defer(&self, msg: M) {
        self.myself.send(msg);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|t| t.token.deadline).min()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Pop the earliest timer due at `now`, dropping any stale one on the way.
    fn take_due(&mut self, now: Instant) -> Option<M> {
        let epoch = self.epoch;
        self.timers.retain(|t| t.token.epoch == epoch);
        let idx = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.token.deadline <= now)
            .min_by_key(|(_, t)| t.token.deadline)
            .map(|(i, _)| i)?;
        Some(self.timers.swap_remove(idx).msg)
    }
}

/// Owns an actor, its context and its inbox.
pub struct ActorCell<A: Actor> {
    actor: A,
    ctx: Context<A::Msg>,
    rx: xch::Receiver<Envelope<A::Msg>>,
    started: bool,
    stopped: bool,
}

impl<A: Actor> ActorCell<A> {
    pub fn new(actor: A, mailbox: Mailbox<A::Msg>, clock: SharedClock) -> Self {
        Self {
            actor,
            ctx: Context::new(mailbox.addr, clock),
            rx: mailbox.rx,
            started: false,
            stopped: false,
        }
    }

    pub fn actor(&self) -> &A {
        &self.actor
    }

    pub fn actor_mut(&mut self) -> &mut A {
        &mut self.actor
    }

    pub fn context(&self) -> &Context<A::Msg> {
        &self.ctx
    }

    pub fn addr(&self) -> Addr<A::Msg> {
        self.ctx.myself.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn start(&mut self) {
        if !self.started {
            self.started = true;
            self.actor.started(&mut self.ctx);
        }
    }

    fn finish(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.actor.stopped(&mut self.ctx);
        }
    }

    /// Handle everything queued and every timer due at the clock's current
    /// time, without blocking. Returns the number of handled messages.
    pub fn run_pending(&mut self) -> usize {
        self.start();
        let mut handled = 0;
        while !self.stopped && handled < MAX_PENDING_STEPS {
            match self.rx.try_recv() {
                Ok(Envelope::Msg(msg)) => {
                    self.actor.handle(msg, &mut self.ctx);
                    handled += 1;
                    continue;
                }
                Ok(Envelope::Stop) => {
                    self.finish();
                    break;
                }
                Err(_) => {}
            }
            let now = self.ctx.now();
            match self.ctx.take_due(now) {
                Some(msg) => {
                    self.actor.handle(msg, &mut self.ctx);
                    handled += 1;
                }
                None => break,
            }
        }
        handled
    }

    /// Blocking loop used by [`spawn`].
    pub fn run(mut self) {
        self.start();
        loop {
            let now = self.ctx.now();
            if let Some(msg) = self.ctx.take_due(now) {
                self.actor.handle(msg, &mut self.ctx);
                continue;
            }
            let received = match self.ctx.next_deadline() {
                Some(deadline) => self.rx.recv_deadline(deadline),
                None => self
                    .rx
                    .recv()
                    .map_err(|_| xch::RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(Envelope::Msg(msg)) => self.actor.handle(msg, &mut self.ctx),
                Ok(Envelope::Stop) | Err(xch::RecvTimeoutError::Disconnected) => break,
                Err(xch::RecvTimeoutError::Timeout) => {}
            }
        }
        self.finish();
        tracing::trace!(actor = self.ctx.name(), "actor thread exiting cleanly");
    }
}

/// Running actor thread. Dropping the handle stops the actor and joins it.
pub struct ActorHandle {
    name: &'static str,
    stop: Box<dyn Fn() + Send>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl ActorHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn join(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        (self.stop)();
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!(actor = self.name, "actor joined"),
                Err(e) => tracing::warn!(actor = self.name, ?e, "actor thread panicked"),
            }
        }
    }
}

impl Drop for ActorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run `actor` on a dedicated named thread.
pub fn spawn<A: Actor>(
    actor: A,
    mailbox: Mailbox<A::Msg>,
    clock: SharedClock,
) -> std::io::Result<ActorHandle> {
    let name = mailbox.addr.name;
    let stopper = mailbox.addr.clone();
    let cell = ActorCell::new(actor, mailbox, clock);
    let join_handle = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || cell.run())?;
    Ok(ActorHandle {
        name,
        stop: Box::new(move || stopper.stop()),
        join_handle: Some(join_handle),
    })
}
