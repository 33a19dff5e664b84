#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Swimming pool controller (hardware-agnostic).
//!
//! Each subsystem of the plant is an actor owning its devices and running a
//! hierarchical state machine. Every device goes through the `pool_traits`
//! contract, so the same code drives simulated or real hardware.
//!
//! ## Architecture
//!
//! - **Runtime**: actors, bounded asks and epoch-cancelled timers (`actor`)
//! - **State machines**: explicit state tables with guards and repeat callbacks (`hsm`)
//! - **Filtration**: the orchestrator, with the daily budget (`eco`) and stirring (`stir`)
//! - **Dosing**: PWM pumps driven by P controllers (`pwm`, `disinfection`)
//! - **Peers**: `tank`, `heating`, `swim`, `cover`, `light`, `sensor`
//! - **Interlocks**: typed ports between actors (`interlock`)
//! - **Bus**: inbound settings (`dispatcher`) and outbound status (`status`)
//! - **Wiring**: `system`
//!
//! ## Time
//!
//! Monotonic time drives timers and dwell limits; wall time drives the daily
//! reset, start hours and the daylight stirring window. Both come from the
//! injected `pool_traits::Clock`.

pub mod actor;
pub mod config;
pub mod conversions;
pub mod cover;
pub mod disinfection;
pub mod dispatcher;
pub mod eco;
pub mod error;
pub mod filtration;
pub mod heating;
pub mod hsm;
pub mod hw_error;
pub mod interlock;
pub mod light;
pub mod mocks;
pub mod pwm;
pub mod sensor;
pub mod status;
pub mod stir;
pub mod swim;
pub mod system;
pub mod tank;
pub mod util;

pub use crate::actor::{ActorCell, Addr, SharedClock, mailbox, spawn};
pub use crate::config::PlantCfg;
pub use crate::dispatcher::{Dispatcher, TOPICS};
pub use crate::error::{AskError, BuildError, PoolError, SettingError};
pub use crate::filtration::{FiltrationState, FiltrationTrigger};
pub use crate::status::{Encoder, StatusSink, TracingSink};
pub use crate::system::{Plant, PlantDevices};
