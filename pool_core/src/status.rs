//! Outbound status publications.
//!
//! Actors publish through an [`Encoder`], which formats `/status/<path>` topics
//! and forwards them to a [`StatusSink`] (the transport in production, a
//! tracing or recording sink otherwise). Values that must survive a transport
//! restart are published with `retain`.
use std::fmt::Display;
use std::sync::Arc;

pub trait StatusSink: Send + Sync {
    fn publish(&self, topic: &str, payload: &str, retain: bool);
}

/// Sink that only logs each publication.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn publish(&self, topic: &str, payload: &str, retain: bool) {
        tracing::info!(target: "pool::status", topic, payload, retain, "status");
    }
}

/// Cloneable publisher shared by every actor.
#[derive(Clone)]
pub struct Encoder {
    sink: Arc<dyn StatusSink>,
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder").finish_non_exhaustive()
    }
}

impl Encoder {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self { sink }
    }

    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    fn send(&self, path: &str, value: &dyn Display, retain: bool) {
        let topic = format!("/status/{path}");
        self.sink.publish(&topic, &value.to_string(), retain);
    }

    pub fn publish(&self, path: &str, value: impl Display) {
        self.send(path, &value, false);
    }

    pub fn publish_retained(&self, path: &str, value: impl Display) {
        self.send(path, &value, true);
    }

    /// `/status/<subsystem>/state`
    pub fn state(&self, subsystem: &str, state: &str) {
        self.send(&format!("{subsystem}/state"), &state, false);
    }
}
