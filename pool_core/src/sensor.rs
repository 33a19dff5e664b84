//! Sampled sensor readings.
//!
//! A [`SensorReader`] owns a set of probes, samples them on a fixed cadence
//! into moving averages and answers `reading(probe)` queries from the control
//! actors. A failed read skips the sample, so consumers keep acting on the
//! last known average.
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use crossbeam_channel::Sender;
use pool_traits::Sensor;

use crate::actor::{Actor, Context};
use crate::hw_error::map_hw_error;
use crate::status::Encoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Probe {
    Pool,
    Air,
    /// Technical room.
    Local,
    /// Swim pump enclosure.
    Ncc,
    Ph,
    Orp,
}

impl Probe {
    pub fn topic(self) -> &'static str {
        match self {
            Probe::Pool => "temperature/pool",
            Probe::Air => "temperature/air",
            Probe::Local => "temperature/local",
            Probe::Ncc => "temperature/ncc",
            Probe::Ph => "disinfection/ph/value",
            Probe::Orp => "disinfection/orp/value",
        }
    }

    fn precision(self) -> usize {
        match self {
            Probe::Ph => 2,
            Probe::Orp => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Probe::Pool => "pool",
            Probe::Air => "air",
            Probe::Local => "local",
            Probe::Ncc => "ncc",
            Probe::Ph => "ph",
            Probe::Orp => "orp",
        };
        f.write_str(name)
    }
}

/// Fixed-length window of the latest samples.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    samples: VecDeque<f64>,
    maxlen: usize,
}

impl MovingAverage {
    pub fn new(maxlen: usize) -> Self {
        let maxlen = maxlen.max(1);
        Self {
            samples: VecDeque::with_capacity(maxlen),
            maxlen,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.maxlen {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Change per hour between the oldest and newest sample.
    pub fn slope_per_hour(&self, sample: Duration) -> Option<f64> {
        let (first, last) = (self.samples.front()?, self.samples.back()?);
        let span = sample.as_secs_f64() * (self.samples.len() - 1) as f64;
        if span <= 0.0 {
            return None;
        }
        Some((last - first) / span * 3600.0)
    }
}

struct Channel {
    probe: Probe,
    sensor: Box<dyn Sensor>,
    average: MovingAverage,
}

pub enum ReaderMsg {
    Sample,
    Reading(Probe, Sender<Option<f64>>),
    Slope(Probe, Sender<Option<f64>>),
}

pub struct SensorReader {
    channels: Vec<Channel>,
    sample: Duration,
    encoder: Encoder,
}

impl SensorReader {
    pub fn new(sample: Duration, encoder: Encoder) -> Self {
        Self {
            channels: Vec::new(),
            sample,
            encoder,
        }
    }

    /// Add a probe averaged over `samples` readings.
    pub fn with_probe(mut self, probe: Probe, sensor: Box<dyn Sensor>, samples: usize) -> Self {
        self.channels.push(Channel {
            probe,
            sensor,
            average: MovingAverage::new(samples),
        });
        self
    }

    fn channel(&self, probe: Probe) -> Option<&Channel> {
        self.channels.iter().find(|c| c.probe == probe)
    }

    pub fn reading(&self, probe: Probe) -> Option<f64> {
        self.channel(probe).and_then(|c| c.average.mean())
    }

    pub fn slope(&self, probe: Probe) -> Option<f64> {
        self.channel(probe)
            .and_then(|c| c.average.slope_per_hour(self.sample))
    }

    fn sample_all(&mut self) {
        for channel in &mut self.channels {
            match channel.sensor.read() {
                Ok(value) => channel.average.push(value),
                Err(e) => {
                    let err = map_hw_error(e.as_ref());
                    tracing::warn!(probe = %channel.probe, error = %err, "sensor read failed");
                }
            }
        }
        self.publish();
    }

    fn publish(&self) {
        for channel in &self.channels {
            let Some(mean) = channel.average.mean() else {
                continue;
            };
            let precision = channel.probe.precision();
            self.encoder
                .publish(channel.probe.topic(), format!("{mean:.precision$}"));
        }
        if let Some(slope) = self.slope(Probe::Pool) {
            self.encoder.publish("temperature/pool/slope", format!("{slope:.2}"));
        }
    }
}

impl Actor for SensorReader {
    type Msg = ReaderMsg;

    fn started(&mut self, ctx: &mut Context<ReaderMsg>) {
        self.sample_all();
        ctx.schedule_delay(self.sample, ReaderMsg::Sample);
    }

    fn handle(&mut self, msg: ReaderMsg, ctx: &mut Context<ReaderMsg>) {
        match msg {
            ReaderMsg::Sample => {
                self.sample_all();
                ctx.schedule_delay(self.sample, ReaderMsg::Sample);
            }
            ReaderMsg::Reading(probe, reply) => {
                let _ = reply.send(self.reading(probe));
            }
            ReaderMsg::Slope(probe, reply) => {
                let _ = reply.send(self.slope(probe));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorCell, mailbox};
    use crate::mocks::RecordingSink;
    use pool_hardware::SimSensor;
    use pool_traits::clock::test_clock::TestClock;
    use std::sync::Arc;

    #[test]
    fn window_drops_oldest_sample() {
        let mut avg = MovingAverage::new(3);
        assert_eq!(avg.mean(), None);
        for v in [1.0, 2.0, 3.0, 10.0] {
            avg.push(v);
        }
        assert_eq!(avg.len(), 3);
        assert_eq!(avg.mean(), Some(5.0));
    }

    #[test]
    fn slope_is_per_hour() {
        let mut avg = MovingAverage::new(30);
        for i in 0..31 {
            avg.push(20.0 + f64::from(i) * 0.01);
        }
        // 29 intervals of 60 s, 0.29 degrees
        let slope = avg.slope_per_hour(Duration::from_secs(60)).unwrap();
        assert!((slope - 0.6).abs() < 1e-9);
        assert_eq!(MovingAverage::new(3).slope_per_hour(Duration::from_secs(60)), None);
    }

    #[test]
    fn failed_read_keeps_last_average() {
        let clock = TestClock::new();
        let sink = Arc::new(RecordingSink::default());
        let pool = SimSensor::new("pool", 24.0);
        let probe = pool.probe();
        let reader = SensorReader::new(Duration::from_secs(60), Encoder::new(sink.clone()))
            .with_probe(Probe::Pool, Box::new(pool), 5);
        let (addr, mb) = mailbox("temperature", Duration::from_millis(100));
        let mut cell = ActorCell::new(reader, mb, Arc::new(clock.clone()));
        cell.run_pending();
        assert_eq!(cell.actor().reading(Probe::Pool), Some(24.0));
        assert_eq!(sink.last("/status/temperature/pool").as_deref(), Some("24.0"));

        probe.set(None);
        clock.advance(Duration::from_secs(60));
        cell.run_pending();
        assert_eq!(cell.actor().reading(Probe::Pool), Some(24.0));

        probe.set(Some(26.0));
        clock.advance(Duration::from_secs(60));
        cell.run_pending();
        assert_eq!(cell.actor().reading(Probe::Pool), Some(25.0));
        assert_eq!(cell.actor().reading(Probe::Air), None);
        drop(addr);
    }
}
