use std::fmt;

use crate::cache::Snapshot;
use crate::config::Config;
use crate::signal::Signal;
use crate::state::{controller_state, dhw_state, zone_state};
use crate::types::*;
use crate::{Error, Result};

/// Which part of the installation an entity represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Controller,
    Zone(ZoneId),
    Dhw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Controller(ControllerMode),
    Zone(ZoneState),
    Dhw(DhwState),
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityState::Controller(m) => write!(f, "{m}"),
            EntityState::Zone(s) => write!(f, "{s}"),
            EntityState::Dhw(s) => write!(f, "{s}"),
        }
    }
}

impl EntityKind {
    pub fn state(&self, snapshot: &Snapshot, config: &Config) -> Result<EntityState> {
        Ok(match self {
            EntityKind::Controller => EntityState::Controller(controller_state(snapshot)),
            EntityKind::Zone(id) => EntityState::Zone(zone_state(snapshot, config, id)?),
            EntityKind::Dhw => EntityState::Dhw(dhw_state(snapshot, config)?),
        })
    }

    pub fn name(&self, snapshot: &Snapshot) -> Result<String> {
        match self {
            EntityKind::Controller => Ok(snapshot.topology().location_name.clone()),
            EntityKind::Zone(id) => Ok(snapshot.zone(id)?.descriptor.name.clone()),
            EntityKind::Dhw => snapshot.dhw().map(|_| "Hot Water".to_string()),
        }
    }

    /// Measured temperature, to tenths of a degree. `None` if unavailable.
    pub fn current_temperature(&self, snapshot: &Snapshot) -> Result<Option<Temperature>> {
        let current = match self {
            EntityKind::Controller => None,
            EntityKind::Zone(id) => snapshot.zone(id)?.status.current,
            EntityKind::Dhw => snapshot.dhw()?.1.current,
        };
        Ok(current.map(|t| t.round_to(0.1)))
    }

    pub fn target_temperature(&self, snapshot: &Snapshot) -> Result<Option<Temperature>> {
        match self {
            EntityKind::Zone(id) => Ok(Some(snapshot.zone(id)?.status.target)),
            _ => Ok(None),
        }
    }

    pub fn operation_mode(&self, snapshot: &Snapshot) -> Result<&'static str> {
        Ok(match self {
            EntityKind::Controller => snapshot.controller_mode().as_vendor_str(),
            EntityKind::Zone(id) => snapshot.zone(id)?.status.setpoint_mode.as_vendor_str(),
            EntityKind::Dhw => snapshot.dhw()?.1.mode.as_vendor_str(),
        })
    }

    pub fn operation_list(&self, snapshot: &Snapshot) -> Result<Vec<&'static str>> {
        Ok(match self {
            EntityKind::Controller => snapshot
                .topology()
                .allowed_modes
                .iter()
                .map(ControllerMode::as_vendor_str)
                .collect(),
            EntityKind::Zone(id) => snapshot
                .zone(id)?
                .descriptor
                .allowed_modes
                .iter()
                .map(SetpointMode::as_vendor_str)
                .collect(),
            EntityKind::Dhw => snapshot
                .dhw()?
                .0
                .allowed_modes
                .iter()
                .map(SetpointMode::as_vendor_str)
                .collect(),
        })
    }

    pub fn min_temp(&self, snapshot: &Snapshot) -> Result<Temperature> {
        Ok(self.zone_descriptor(snapshot)?.min_temp)
    }

    pub fn max_temp(&self, snapshot: &Snapshot) -> Result<Temperature> {
        Ok(self.zone_descriptor(snapshot)?.max_temp)
    }

    pub fn target_temperature_step(&self, snapshot: &Snapshot) -> Result<f64> {
        Ok(self.zone_descriptor(snapshot)?.step)
    }

    fn zone_descriptor<'a>(&self, snapshot: &'a Snapshot) -> Result<&'a ZoneDescriptor> {
        match self {
            EntityKind::Zone(id) => Ok(snapshot.zone(id)?.descriptor),
            other => Err(Error::InvalidMode(format!(
                "{other:?} has no setpoint range"
            ))),
        }
    }
}

/// A value that is either confirmed by the remote service or provisionally assumed
/// after an optimistic local change.
#[derive(Debug, Clone, PartialEq)]
pub struct Phased<T> {
    confirmed: T,
    provisional: Option<T>,
}

impl<T> Phased<T> {
    pub fn new(confirmed: T) -> Self {
        Self {
            confirmed,
            provisional: None,
        }
    }

    /// The provisional value if one is pending, else the confirmed one.
    pub fn current(&self) -> &T {
        self.provisional.as_ref().unwrap_or(&self.confirmed)
    }

    pub fn confirmed(&self) -> &T {
        &self.confirmed
    }

    pub fn is_provisional(&self) -> bool {
        self.provisional.is_some()
    }

    pub fn assume(&mut self, value: T) {
        self.provisional = Some(value);
    }

    pub fn confirm(&mut self, value: T) {
        self.confirmed = value;
        self.provisional = None;
    }
}

/// Host-side view of one entity, kept current by bus signals.
#[derive(Debug, Clone)]
pub struct Entity {
    kind: EntityKind,
    state: Phased<EntityState>,
}

impl Entity {
    pub fn new(kind: EntityKind, snapshot: &Snapshot, config: &Config) -> Result<Self> {
        let state = kind.state(snapshot, config)?;
        Ok(Self {
            kind,
            state: Phased::new(state),
        })
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn state(&self) -> EntityState {
        *self.state.current()
    }

    /// True between an `Assume` signal and the next `Update`.
    pub fn assumed_state(&self) -> bool {
        self.state.is_provisional()
    }

    pub fn on_signal(&mut self, signal: Signal, snapshot: &Snapshot, config: &Config) -> Result<()> {
        let state = self.kind.state(snapshot, config)?;
        match signal {
            Signal::Update => self.state.confirm(state),
            Signal::Assume => self.state.assume(state),
        }
        Ok(())
    }
}
