//! Cached, periodically refreshed model of an evohome heating installation: one
//! controller, its zones and an optional hot water unit.
//!
//! A [`Hub`] owns the cache. Ticks refresh it from a [`Remote`]; commands change the
//! installation and update the cache optimistically; subscribers learn about both
//! through [`Signal`]s.

mod cache;
mod cascade;
mod client;
mod config;
mod diff;
mod entity;
mod error;
mod hub;
mod logger;
mod protocol;
mod refresh;
mod remote;
mod schedule;
mod signal;
mod state;
mod types;

pub use cache::{Cache, RefreshClock, Snapshot, ZoneView};
pub use cascade::{cascade, ECO_OFFSET};
pub use client::{HttpRemote, HttpRemoteBuilder};
pub use config::{Config, ConfigBuilder, DEFAULT_SCAN_INTERVAL, MIN_SCAN_INTERVAL};
pub use entity::{Entity, EntityKind, EntityState, Phased};
pub use error::{Error, Result};
pub use hub::{Hub, HubBuilder, TickOutcome};
pub use logger::MessageLogMode;
pub use refresh::{plan, Refresh};
pub use remote::Remote;
pub use schedule::{lookup, next_saturday, temperature_at};
pub use signal::{Signal, SignalBus, SubscriptionId};
pub use state::{controller_state, dhw_state, zone_state};
pub use types::*;
