//! Inbound settings: topic table, payload parsing and range checks.
//!
//! Every accepted payload becomes one message posted to the owning actor.
//! A rejected payload is logged and changes nothing. Topics marked `once`
//! restore persisted counters at startup and disappear after their first
//! successful delivery.
use std::collections::HashSet;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::actor::Addr;
use crate::cover::CoverMsg;
use crate::disinfection::{DisinfectionMsg, DisinfectionSetting};
use crate::error::SettingError;
use crate::filtration::{BACKWASH_LAST_FORMAT, FiltrationMsg, FiltrationSetting, FiltrationTrigger};
use crate::heating::{HeaterMsg, HeatingMsg, HeatingSetting};
use crate::light::{LightMsg, LightTrigger};
use crate::swim::{SwimMsg, SwimTrigger};
use crate::tank::TankMsg;

/// Accepted payload shape of a topic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kind {
    /// Number within `[min, max]`, truncated to an integer.
    Int { min: f64, max: f64 },
    Float { min: f64, max: f64 },
    Bool,
    Choice(&'static [&'static str]),
    /// Timestamp in [`BACKWASH_LAST_FORMAT`].
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Key {
    Mode,
    Duration,
    Period,
    ResetHour,
    TankPercentage,
    StirDuration,
    StirPeriod,
    BoostDuration,
    BackwashPeriod,
    BackwashDuration,
    RinseDuration,
    BackwashLast,
    RestoreDuration,
    SpeedEco,
    SpeedStandby,
    SpeedOverflow,
    CoverPositionEco,
    ForceEmpty,
    SwimMode,
    SwimTimer,
    SwimSpeed,
    LightMode,
    HeaterSetpoint,
    HeatingEnable,
    HeatingSetpoint,
    HeatingStartHour,
    HeatingMinTemp,
    HeatingTotalSeconds,
    PhEnable,
    PhSetpoint,
    PhPterm,
    OrpEnable,
    OrpSetpoint,
    OrpPterm,
    WaterCounter,
}

/// One entry of the settings table.
#[derive(Debug, Clone, Copy)]
pub struct Topic {
    pub path: &'static str,
    pub kind: Kind,
    /// Accepted only until the first successful delivery.
    pub once: bool,
    key: Key,
}

const fn topic(path: &'static str, kind: Kind, key: Key) -> Topic {
    Topic {
        path,
        kind,
        once: false,
        key,
    }
}

const fn once(path: &'static str, kind: Kind, key: Key) -> Topic {
    Topic {
        path,
        kind,
        once: true,
        key,
    }
}

const fn int(min: f64, max: f64) -> Kind {
    Kind::Int { min, max }
}

const fn float(min: f64, max: f64) -> Kind {
    Kind::Float { min, max }
}

const MODES: &[&str] = &[
    "halt", "eco", "standby", "overflow", "comfort", "sweep", "wash", "wintering",
];
const SWIM_MODES: &[&str] = &["halt", "timed", "continuous"];
const LIGHT_MODES: &[&str] = &["halt", "on"];

pub const TOPICS: &[Topic] = &[
    topic("/settings/mode", Kind::Choice(MODES), Key::Mode),
    topic("/settings/filtration/duration", int(1.0, 172_800.0), Key::Duration),
    topic("/settings/filtration/period", int(1.0, 10.0), Key::Period),
    topic("/settings/filtration/reset_hour", int(0.0, 23.0), Key::ResetHour),
    topic("/settings/filtration/tank_percentage", float(0.0, 0.5), Key::TankPercentage),
    topic("/settings/filtration/stir_duration", int(0.0, 600.0), Key::StirDuration),
    topic("/settings/filtration/stir_period", int(0.0, 7200.0), Key::StirPeriod),
    topic("/settings/filtration/boost_duration", int(0.0, 600.0), Key::BoostDuration),
    topic("/settings/filtration/backwash/period", int(0.0, 90.0), Key::BackwashPeriod),
    topic(
        "/settings/filtration/backwash/backwash_duration",
        int(0.0, 300.0),
        Key::BackwashDuration,
    ),
    topic(
        "/settings/filtration/backwash/rinse_duration",
        int(0.0, 300.0),
        Key::RinseDuration,
    ),
    topic("/status/filtration/backwash/last", Kind::Timestamp, Key::BackwashLast),
    once("/status/filtration/duration", int(0.0, 86_400.0), Key::RestoreDuration),
    topic("/settings/filtration/speed/eco", int(1.0, 3.0), Key::SpeedEco),
    topic("/settings/filtration/speed/standby", int(0.0, 2.0), Key::SpeedStandby),
    topic("/settings/filtration/speed/overflow", int(1.0, 4.0), Key::SpeedOverflow),
    topic("/settings/cover/position/eco", int(0.0, 100.0), Key::CoverPositionEco),
    topic("/settings/tank/force_empty", Kind::Bool, Key::ForceEmpty),
    topic("/settings/swim/mode", Kind::Choice(SWIM_MODES), Key::SwimMode),
    topic("/settings/swim/timer", int(1.0, 60.0), Key::SwimTimer),
    topic("/settings/swim/speed", int(1.0, 100.0), Key::SwimSpeed),
    topic("/settings/light/mode", Kind::Choice(LIGHT_MODES), Key::LightMode),
    topic("/settings/heater/setpoint", float(0.0, 30.0), Key::HeaterSetpoint),
    topic("/settings/heating/enable", Kind::Bool, Key::HeatingEnable),
    topic("/settings/heating/setpoint", float(10.0, 32.0), Key::HeatingSetpoint),
    topic("/settings/heating/start_hour", int(0.0, 23.0), Key::HeatingStartHour),
    topic("/settings/heating/min_temp", int(5.0, 25.0), Key::HeatingMinTemp),
    once(
        "/status/heating/total_seconds",
        int(0.0, 1.0e12),
        Key::HeatingTotalSeconds,
    ),
    topic("/settings/disinfection/ph/enable", Kind::Bool, Key::PhEnable),
    topic("/settings/disinfection/ph/setpoint", float(6.0, 8.0), Key::PhSetpoint),
    topic("/settings/disinfection/ph/pterm", float(0.0, 10.0), Key::PhPterm),
    topic("/settings/disinfection/orp/enable", Kind::Bool, Key::OrpEnable),
    topic("/settings/disinfection/orp/setpoint", int(500.0, 800.0), Key::OrpSetpoint),
    topic("/settings/disinfection/orp/pterm", float(0.0, 10.0), Key::OrpPterm),
    once("/status/water/counter", int(0.0, 1.0e15), Key::WaterCounter),
];

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(u64),
    Float(f64),
    Bool(bool),
    Text(&'static str),
    Timestamp(NaiveDateTime),
}

pub fn to_float(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integer value of a numeric payload; fractional parts are truncated.
#[allow(clippy::cast_possible_truncation)]
pub fn to_int(s: &str) -> Option<i64> {
    to_float(s).map(|v| v.trunc() as i64)
}

pub fn to_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "on" | "true" | "yes" | "y" => Some(true),
        "0" | "off" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn parse(t: &Topic, text: &str) -> Result<Value, SettingError> {
    let parse_err = || SettingError::Parse {
        topic: t.path.to_string(),
        payload: text.to_string(),
    };
    let range_err = || SettingError::OutOfRange {
        topic: t.path.to_string(),
        payload: text.to_string(),
    };
    match t.kind {
        Kind::Int { min, max } => {
            let v = to_float(text).ok_or_else(parse_err)?;
            if !(min..=max).contains(&v) {
                return Err(range_err());
            }
            let int = to_int(text).ok_or_else(parse_err)?;
            u64::try_from(int).map(Value::Int).map_err(|_| range_err())
        }
        Kind::Float { min, max } => {
            let v = to_float(text).ok_or_else(parse_err)?;
            if (min..=max).contains(&v) {
                Ok(Value::Float(v))
            } else {
                Err(range_err())
            }
        }
        Kind::Bool => to_bool(text).map(Value::Bool).ok_or_else(parse_err),
        Kind::Choice(choices) => choices
            .iter()
            .copied()
            .find(|c| *c == text.trim())
            .map(Value::Text)
            .ok_or_else(range_err),
        Kind::Timestamp => NaiveDateTime::parse_from_str(text.trim(), BACKWASH_LAST_FORMAT)
            .map(Value::Timestamp)
            .map_err(|_| parse_err()),
    }
}

/// Addresses of every actor that accepts settings.
#[derive(Clone)]
pub struct Targets {
    pub filtration: Addr<FiltrationMsg>,
    pub tank: Addr<TankMsg>,
    pub swim: Addr<SwimMsg>,
    pub light: Addr<LightMsg>,
    pub heater: Addr<HeaterMsg>,
    pub heating: Addr<HeatingMsg>,
    pub disinfection: Addr<DisinfectionMsg>,
    pub cover: Addr<CoverMsg>,
}

fn mode_trigger(mode: &str) -> Option<FiltrationTrigger> {
    Some(match mode {
        "halt" => FiltrationTrigger::Halt,
        "eco" => FiltrationTrigger::Eco,
        "standby" => FiltrationTrigger::Standby,
        "overflow" => FiltrationTrigger::Overflow,
        "comfort" => FiltrationTrigger::Comfort,
        "sweep" => FiltrationTrigger::Sweep,
        "wash" => FiltrationTrigger::Wash,
        "wintering" => FiltrationTrigger::Wintering,
        _ => return None,
    })
}

fn secs(v: u64) -> Duration {
    Duration::from_secs(v)
}

fn narrow<T: TryFrom<u64>>(v: u64) -> Option<T> {
    T::try_from(v).ok()
}

pub struct Dispatcher {
    targets: Targets,
    consumed: HashSet<&'static str>,
}

impl Dispatcher {
    pub fn new(targets: Targets) -> Self {
        Self {
            targets,
            consumed: HashSet::new(),
        }
    }

    /// Topics still accepted.
    pub fn topics(&self) -> impl Iterator<Item = &'static str> + '_ {
        TOPICS
            .iter()
            .map(|t| t.path)
            .filter(|p| !self.consumed.contains(p))
    }

    /// Validate `payload` for `topic` and post it to the owning actor.
    pub fn dispatch(&mut self, topic: &str, payload: &[u8]) -> Result<(), SettingError> {
        let result = self.try_dispatch(topic, payload);
        if let Err(e) = &result {
            tracing::warn!(topic, error = %e, "setting rejected");
        }
        result
    }

    fn try_dispatch(&mut self, topic: &str, payload: &[u8]) -> Result<(), SettingError> {
        let entry = TOPICS
            .iter()
            .find(|t| t.path == topic && !self.consumed.contains(t.path))
            .ok_or_else(|| SettingError::UnknownTopic(topic.to_string()))?;
        let text = std::str::from_utf8(payload).map_err(|_| SettingError::Parse {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
        })?;
        let value = parse(entry, text)?;
        self.deliver(entry.key, value).ok_or_else(|| SettingError::OutOfRange {
            topic: topic.to_string(),
            payload: text.to_string(),
        })?;
        tracing::debug!(topic, payload = text, "setting applied");
        if entry.once {
            tracing::debug!(topic, "removing topic, only processed once");
            self.consumed.insert(entry.path);
        }
        Ok(())
    }

    /// Post the message for `key`. `None` if the value does not fit the target type.
    fn deliver(&self, key: Key, value: Value) -> Option<()> {
        use FiltrationSetting as F;
        let t = &self.targets;
        let filtration = |s: FiltrationSetting| t.filtration.send(FiltrationMsg::Setting(s));
        let heating = |s: HeatingSetting| t.heating.send(HeatingMsg::Setting(s));
        let disinfection = |s: DisinfectionSetting| t.disinfection.send(DisinfectionMsg::Setting(s));
        let sent = match (key, value) {
            (Key::Mode, Value::Text(m)) => t.filtration.send(FiltrationMsg::Fire(mode_trigger(m)?)),
            (Key::Duration, Value::Int(v)) => filtration(F::Duration(secs(v))),
            (Key::Period, Value::Int(v)) => filtration(F::Period(narrow(v)?)),
            (Key::ResetHour, Value::Int(v)) => filtration(F::ResetHour(narrow(v)?)),
            (Key::TankPercentage, Value::Float(v)) => filtration(F::TankPercentage(v)),
            (Key::StirDuration, Value::Int(v)) => filtration(F::StirDuration(secs(v))),
            (Key::StirPeriod, Value::Int(v)) => filtration(F::StirPeriod(secs(v))),
            (Key::BoostDuration, Value::Int(v)) => filtration(F::BoostDuration(secs(v))),
            (Key::BackwashPeriod, Value::Int(v)) => filtration(F::BackwashPeriod(narrow(v)?)),
            (Key::BackwashDuration, Value::Int(v)) => filtration(F::BackwashDuration(secs(v))),
            (Key::RinseDuration, Value::Int(v)) => filtration(F::RinseDuration(secs(v))),
            (Key::BackwashLast, Value::Timestamp(ts)) => filtration(F::BackwashLast(ts)),
            (Key::RestoreDuration, Value::Int(v)) => filtration(F::RestoreDuration(secs(v))),
            (Key::SpeedEco, Value::Int(v)) => filtration(F::SpeedEco(narrow(v)?)),
            (Key::SpeedStandby, Value::Int(v)) => filtration(F::SpeedStandby(narrow(v)?)),
            (Key::SpeedOverflow, Value::Int(v)) => filtration(F::SpeedOverflow(narrow(v)?)),
            (Key::CoverPositionEco, Value::Int(v)) => filtration(F::CoverPositionEco(narrow(v)?)),
            (Key::ForceEmpty, Value::Bool(b)) => t.tank.send(TankMsg::ForceEmpty(b)),
            (Key::SwimMode, Value::Text(m)) => {
                let trigger = match m {
                    "timed" => SwimTrigger::Timed,
                    "continuous" => SwimTrigger::Continuous,
                    _ => SwimTrigger::Halt,
                };
                t.swim.send(SwimMsg::Fire(trigger))
            }
            // minutes
            (Key::SwimTimer, Value::Int(v)) => t.swim.send(SwimMsg::Timer(secs(v * 60))),
            (Key::SwimSpeed, Value::Int(v)) => t.swim.send(SwimMsg::Speed(narrow(v)?)),
            (Key::LightMode, Value::Text(m)) => {
                let trigger = if m == "on" { LightTrigger::On } else { LightTrigger::Halt };
                t.light.send(LightMsg::Fire(trigger))
            }
            (Key::HeaterSetpoint, Value::Float(v)) => t.heater.send(HeaterMsg::Setpoint(v)),
            (Key::HeatingEnable, Value::Bool(b)) => heating(HeatingSetting::Enable(b)),
            (Key::HeatingSetpoint, Value::Float(v)) => heating(HeatingSetting::Setpoint(v)),
            (Key::HeatingStartHour, Value::Int(v)) => heating(HeatingSetting::StartHour(narrow(v)?)),
            (Key::HeatingMinTemp, Value::Int(v)) => heating(HeatingSetting::MinTemp(f64::from(narrow::<u32>(v)?))),
            (Key::HeatingTotalSeconds, Value::Int(v)) => heating(HeatingSetting::TotalSeconds(v)),
            (Key::PhEnable, Value::Bool(b)) => disinfection(DisinfectionSetting::PhEnable(b)),
            (Key::PhSetpoint, Value::Float(v)) => disinfection(DisinfectionSetting::PhSetpoint(v)),
            (Key::PhPterm, Value::Float(v)) => disinfection(DisinfectionSetting::PhPterm(v)),
            (Key::OrpEnable, Value::Bool(b)) => disinfection(DisinfectionSetting::OrpEnable(b)),
            (Key::OrpSetpoint, Value::Int(v)) => {
                disinfection(DisinfectionSetting::OrpSetpoint(f64::from(narrow::<u32>(v)?)))
            }
            (Key::OrpPterm, Value::Float(v)) => disinfection(DisinfectionSetting::OrpPterm(v)),
            (Key::WaterCounter, Value::Int(v)) => t.cover.send(CoverMsg::RestoreWaterCounter(v)),
            _ => return None,
        };
        if !sent {
            tracing::warn!(?key, "setting target is gone");
        }
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Mailbox, mailbox};
    use rstest::rstest;

    struct Inboxes {
        filtration: Mailbox<FiltrationMsg>,
        tank: Mailbox<TankMsg>,
        swim: Mailbox<SwimMsg>,
        heating: Mailbox<HeatingMsg>,
        cover: Mailbox<CoverMsg>,
    }

    fn dispatcher() -> (Dispatcher, Inboxes) {
        let ms = std::time::Duration::from_millis(10);
        let (filtration, filtration_mb) = mailbox("filtration", ms);
        let (tank, tank_mb) = mailbox("tank", ms);
        let (swim, swim_mb) = mailbox("swim", ms);
        let (light, _) = mailbox("light", ms);
        let (heater, _) = mailbox("heater", ms);
        let (heating, heating_mb) = mailbox("heating", ms);
        let (disinfection, _) = mailbox("disinfection", ms);
        let (cover, cover_mb) = mailbox("cover", ms);
        let targets = Targets {
            filtration,
            tank,
            swim,
            light,
            heater,
            heating,
            disinfection,
            cover,
        };
        (
            Dispatcher::new(targets),
            Inboxes {
                filtration: filtration_mb,
                tank: tank_mb,
                swim: swim_mb,
                heating: heating_mb,
                cover: cover_mb,
            },
        )
    }

    fn settings(mb: &Mailbox<FiltrationMsg>) -> Vec<FiltrationSetting> {
        mb.drain()
            .into_iter()
            .filter_map(|m| match m {
                FiltrationMsg::Setting(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[rstest]
    #[case("1", Some(true))]
    #[case("on", Some(true))]
    #[case("YES", Some(true))]
    #[case("y", Some(true))]
    #[case("true", Some(true))]
    #[case("0", Some(false))]
    #[case("off", Some(false))]
    #[case("maybe", None)]
    #[case("", None)]
    fn bool_payloads(#[case] input: &str, #[case] expected: Option<bool>) {
        assert_eq!(to_bool(input), expected);
    }

    #[rstest]
    #[case("42", Some(42))]
    #[case("3.9", Some(3))]
    #[case("-1.5", Some(-1))]
    #[case(" 7 ", Some(7))]
    #[case("nan", None)]
    #[case("abc", None)]
    fn int_payloads(#[case] input: &str, #[case] expected: Option<i64>) {
        assert_eq!(to_int(input), expected);
    }

    #[test]
    fn duration_is_forwarded_in_seconds() {
        let (mut d, inbox) = dispatcher();
        d.dispatch("/settings/filtration/duration", b"36000").unwrap();
        assert_eq!(
            settings(&inbox.filtration),
            vec![FiltrationSetting::Duration(Duration::from_secs(36000))]
        );
    }

    #[rstest]
    #[case("/settings/filtration/duration", "0")]
    #[case("/settings/filtration/duration", "172801")]
    #[case("/settings/filtration/period", "11")]
    #[case("/settings/filtration/tank_percentage", "0.6")]
    #[case("/settings/filtration/speed/eco", "0")]
    #[case("/settings/filtration/speed/standby", "3")]
    #[case("/settings/filtration/speed/overflow", "5")]
    #[case("/settings/mode", "party")]
    fn out_of_range_is_rejected(#[case] topic: &str, #[case] payload: &str) {
        let (mut d, inbox) = dispatcher();
        let err = d.dispatch(topic, payload.as_bytes()).unwrap_err();
        assert!(matches!(err, SettingError::OutOfRange { .. }), "{err}");
        assert!(inbox.filtration.drain().is_empty());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let (mut d, inbox) = dispatcher();
        let err = d.dispatch("/settings/filtration/period", b"three").unwrap_err();
        assert!(matches!(err, SettingError::Parse { .. }));
        let err = d.dispatch("/settings/filtration/period", &[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, SettingError::Parse { .. }));
        assert!(inbox.filtration.drain().is_empty());
    }

    #[test]
    fn unknown_topic() {
        let (mut d, _inbox) = dispatcher();
        assert_eq!(
            d.dispatch("/settings/nope", b"1"),
            Err(SettingError::UnknownTopic("/settings/nope".to_string()))
        );
    }

    #[test]
    fn fractional_period_is_truncated() {
        let (mut d, inbox) = dispatcher();
        d.dispatch("/settings/filtration/period", b"2.7").unwrap();
        assert_eq!(settings(&inbox.filtration), vec![FiltrationSetting::Period(2)]);
    }

    #[test]
    fn mode_fires_filtration_trigger() {
        let (mut d, inbox) = dispatcher();
        d.dispatch("/settings/mode", b"overflow").unwrap();
        let msgs = inbox.filtration.drain();
        assert!(matches!(
            msgs.as_slice(),
            [FiltrationMsg::Fire(FiltrationTrigger::Overflow)]
        ));
    }

    #[test]
    fn restore_topics_are_applied_once() {
        let (mut d, inbox) = dispatcher();
        d.dispatch("/status/filtration/duration", b"1800").unwrap();
        assert_eq!(
            d.dispatch("/status/filtration/duration", b"1900"),
            Err(SettingError::UnknownTopic("/status/filtration/duration".to_string()))
        );
        assert_eq!(
            settings(&inbox.filtration),
            vec![FiltrationSetting::RestoreDuration(Duration::from_secs(1800))]
        );
        assert!(!d.topics().any(|t| t == "/status/filtration/duration"));

        d.dispatch("/status/water/counter", b"1234").unwrap();
        assert!(d.dispatch("/status/water/counter", b"1234").is_err());
        assert!(matches!(
            inbox.cover.drain().as_slice(),
            [CoverMsg::RestoreWaterCounter(1234)]
        ));
    }

    #[test]
    fn rejected_restore_stays_available() {
        let (mut d, inbox) = dispatcher();
        assert!(d.dispatch("/status/heating/total_seconds", b"-5").is_err());
        d.dispatch("/status/heating/total_seconds", b"7200").unwrap();
        assert!(matches!(
            inbox.heating.drain().as_slice(),
            [HeatingMsg::Setting(HeatingSetting::TotalSeconds(7200))]
        ));
    }

    #[test]
    fn backwash_last_parses_timestamp() {
        let (mut d, inbox) = dispatcher();
        d.dispatch("/status/filtration/backwash/last", b"2024-04-01 10:30:00")
            .unwrap();
        let expected = NaiveDateTime::parse_from_str("2024-04-01 10:30:00", BACKWASH_LAST_FORMAT).unwrap();
        assert_eq!(
            settings(&inbox.filtration),
            vec![FiltrationSetting::BackwashLast(expected)]
        );
        assert!(d.dispatch("/status/filtration/backwash/last", b"yesterday").is_err());
    }

    #[test]
    fn other_actors_receive_their_settings() {
        let (mut d, inbox) = dispatcher();
        d.dispatch("/settings/tank/force_empty", b"on").unwrap();
        d.dispatch("/settings/swim/timer", b"5").unwrap();
        d.dispatch("/settings/swim/mode", b"timed").unwrap();
        assert!(matches!(inbox.tank.drain().as_slice(), [TankMsg::ForceEmpty(true)]));
        let swim = inbox.swim.drain();
        assert!(matches!(
            swim.as_slice(),
            [SwimMsg::Timer(t), SwimMsg::Fire(SwimTrigger::Timed)] if *t == Duration::from_secs(300)
        ));
    }

    #[test]
    fn every_topic_is_unique() {
        let unique: HashSet<_> = TOPICS.iter().map(|t| t.path).collect();
        assert_eq!(unique.len(), TOPICS.len());
    }
}
