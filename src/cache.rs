use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::types::*;
use crate::{Error, Result};

/// Expiry clocks driving the refresh scheduler. `None` means "never happened".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshClock {
    pub last_status_refresh: Option<DateTime<Utc>>,
    /// Advances only on a successful status fetch.
    pub status_expires_at: Option<DateTime<Utc>>,
    /// Advances only on a successful re-authentication.
    pub session_expires_at: Option<DateTime<Utc>>,
    pub last_topology_refresh: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct IndexedTopology {
    topology: Topology,
    zones: HashMap<ZoneId, usize>,
}

#[derive(Debug)]
struct IndexedStatus {
    status: Status,
    zones: HashMap<ZoneId, usize>,
}

/// Borrowed view of one zone: its descriptor and its latest status.
#[derive(Debug, Clone, Copy)]
pub struct ZoneView<'a> {
    pub descriptor: &'a ZoneDescriptor,
    pub status: &'a ZoneStatus,
}

/// Internally consistent view of the cache at one instant.
/// Cheap to clone; readers hold one for the duration of a derivation.
#[derive(Debug, Clone)]
pub struct Snapshot {
    topology: Arc<IndexedTopology>,
    status: Arc<IndexedStatus>,
    schedules: Arc<HashMap<ZoneId, Schedule>>,
}

impl Snapshot {
    pub fn topology(&self) -> &Topology {
        &self.topology.topology
    }

    pub fn status(&self) -> &Status {
        &self.status.status
    }

    pub fn controller_mode(&self) -> ControllerMode {
        self.status.status.mode
    }

    pub fn zone(&self, id: &ZoneId) -> Result<ZoneView<'_>> {
        let descriptor = self
            .topology
            .zones
            .get(id)
            .map(|&i| &self.topology.topology.zones[i]);
        let status = self
            .status
            .zones
            .get(id)
            .map(|&i| &self.status.status.zones[i]);
        match (descriptor, status) {
            (Some(descriptor), Some(status)) => Ok(ZoneView { descriptor, status }),
            _ => Err(Error::ZoneNotFound(id.clone())),
        }
    }

    pub fn zone_ids(&self) -> impl Iterator<Item = &ZoneId> {
        self.topology.topology.zones.iter().map(|z| &z.id)
    }

    pub fn dhw(&self) -> Result<(&DhwDescriptor, &DhwStatus)> {
        match (&self.topology.topology.dhw, &self.status.status.dhw) {
            (Some(d), Some(s)) => Ok((d, s)),
            _ => Err(Error::DhwNotFound),
        }
    }

    pub fn schedule(&self, id: &ZoneId) -> Result<&Schedule> {
        self.schedules
            .get(id)
            .ok_or_else(|| Error::ScheduleNotFound(id.clone()))
    }
}

#[derive(Debug, Default)]
struct Slots {
    topology: Option<Arc<IndexedTopology>>,
    status: Option<Arc<IndexedStatus>>,
    schedules: Arc<HashMap<ZoneId, Schedule>>,
}

/// The single mutable store of installation state.
///
/// Each replace operation validates its input, then swaps it in under one write lock,
/// so readers see either the old or the new value and never a mix. Rejected input
/// leaves the previous value in place.
#[derive(Debug, Default)]
pub struct Cache {
    slots: RwLock<Slots>,
    clock: Mutex<RefreshClock>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        match (&slots.topology, &slots.status) {
            (Some(topology), Some(status)) => Ok(Snapshot {
                topology: Arc::clone(topology),
                status: Arc::clone(status),
                schedules: Arc::clone(&slots.schedules),
            }),
            _ => Err(Error::NoSnapshot),
        }
    }

    pub fn has_topology(&self) -> bool {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.topology.is_some()
    }

    /// Location the cache is bound to, available as soon as a topology is stored.
    pub fn location_id(&self) -> Option<String> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .topology
            .as_ref()
            .map(|t| t.topology.location_id.clone())
    }

    pub fn schedules(&self) -> Arc<HashMap<ZoneId, Schedule>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&slots.schedules)
    }

    /// A stored status that does not fit the new topology is dropped with it.
    pub fn replace_topology(&self, topology: Topology) -> Result<()> {
        let zones = index_unique(topology.zones.iter().map(|z| &z.id))?;
        for zone in &topology.zones {
            if zone.min_temp > zone.max_temp {
                return Err(Error::MalformedResponse(format!(
                    "zone {} has min setpoint {} above max {}",
                    zone.id, zone.min_temp, zone.max_temp
                )));
            }
        }
        let indexed = Arc::new(IndexedTopology { topology, zones });
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(status) = &slots.status
            && check_status_shape(&indexed.topology, &status.status).is_err()
        {
            slots.status = None;
        }
        slots.topology = Some(indexed);
        Ok(())
    }

    pub fn replace_status(&self, status: Status) -> Result<()> {
        let zones = index_unique(status.zones.iter().map(|z| &z.id))?;
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let Some(topology) = &slots.topology else {
            return Err(Error::NoSnapshot);
        };
        check_status_shape(&topology.topology, &status)?;
        slots.status = Some(Arc::new(IndexedStatus { status, zones }));
        Ok(())
    }

    pub fn replace_schedules(&self, schedules: HashMap<ZoneId, Schedule>) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.schedules = Arc::new(schedules);
    }

    pub fn clock(&self) -> RefreshClock {
        *self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn update_clock(&self, f: impl FnOnce(&mut RefreshClock)) {
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut clock);
    }
}

fn index_unique<'a>(ids: impl Iterator<Item = &'a ZoneId>) -> Result<HashMap<ZoneId, usize>> {
    let mut index = HashMap::new();
    for (i, id) in ids.enumerate() {
        if index.insert(id.clone(), i).is_some() {
            return Err(Error::MalformedResponse(format!("duplicate zone id {id}")));
        }
    }
    Ok(index)
}

fn check_status_shape(topology: &Topology, status: &Status) -> Result<()> {
    if status.system_id != topology.system_id {
        return Err(Error::MalformedResponse(format!(
            "status for system {} but bound to {}",
            status.system_id, topology.system_id
        )));
    }
    let known: HashSet<&ZoneId> = topology.zones.iter().map(|z| &z.id).collect();
    if let Some(stray) = status.zones.iter().find(|z| !known.contains(&z.id)) {
        return Err(Error::MalformedResponse(format!(
            "status reports unknown zone {}",
            stray.id
        )));
    }
    if status.dhw.is_some() && topology.dhw.is_none() {
        return Err(Error::MalformedResponse(
            "status reports hot water but topology has none".to_string(),
        ));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn snapshot_requires_topology_and_status() {
        let cache = Cache::new();
        assert!(matches!(cache.snapshot(), Err(Error::NoSnapshot)));
        cache.replace_topology(topology(&["z1"], false)).unwrap();
        assert!(matches!(cache.snapshot(), Err(Error::NoSnapshot)));
        cache
            .replace_status(status(ControllerMode::Auto, vec![], None))
            .unwrap();
        assert!(cache.snapshot().is_ok());
    }

    #[test]
    fn zone_lookup_by_id() {
        let cache = cache_with(ControllerMode::Auto, 21.0, SetpointMode::FollowSchedule);
        let snap = cache.snapshot().unwrap();
        let zone = snap.zone(&ZoneId::new("z1")).unwrap();
        assert_eq!(zone.descriptor.name, "Zone z1");
        assert_eq!(zone.status.target, Temperature::from_celsius(21.0));
        assert!(matches!(
            snap.zone(&ZoneId::new("nope")),
            Err(Error::ZoneNotFound(id)) if id.as_str() == "nope"
        ));
    }

    #[test]
    fn zone_ids_follow_topology_order() {
        let cache = Cache::new();
        cache.replace_topology(topology(&["z2", "z1"], false)).unwrap();
        cache
            .replace_status(status(ControllerMode::Auto, vec![], None))
            .unwrap();
        let snap = cache.snapshot().unwrap();
        let ids: Vec<&str> = snap.zone_ids().map(ZoneId::as_str).collect();
        assert_eq!(ids, vec!["z2", "z1"]);
    }

    #[test]
    fn malformed_status_keeps_previous() {
        let cache = cache_with(ControllerMode::Auto, 21.0, SetpointMode::FollowSchedule);
        let stray = status(
            ControllerMode::Away,
            vec![zone_status("ghost", 18.0, SetpointMode::FollowSchedule)],
            None,
        );
        let err = cache.replace_status(stray).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
        assert_eq!(cache.snapshot().unwrap().controller_mode(), ControllerMode::Auto);
    }

    #[test]
    fn status_for_other_system_rejected() {
        let cache = cache_with(ControllerMode::Auto, 21.0, SetpointMode::FollowSchedule);
        let mut other = status(ControllerMode::Away, vec![], None);
        other.system_id = "tcs-2".to_string();
        assert!(matches!(
            cache.replace_status(other),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn duplicate_zone_ids_rejected() {
        let cache = Cache::new();
        let err = cache
            .replace_topology(topology(&["z1", "z1"], false))
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
        assert!(!cache.has_topology());
    }

    #[test]
    fn held_snapshot_is_unaffected_by_replace() {
        let cache = cache_with(ControllerMode::Auto, 21.0, SetpointMode::FollowSchedule);
        let held = cache.snapshot().unwrap();
        cache
            .replace_status(status(
                ControllerMode::HeatingOff,
                vec![zone_status("z1", 5.0, SetpointMode::FollowSchedule)],
                Some(DhwState::Off),
            ))
            .unwrap();
        assert_eq!(held.controller_mode(), ControllerMode::Auto);
        assert_eq!(
            cache.snapshot().unwrap().controller_mode(),
            ControllerMode::HeatingOff
        );
    }

    #[test]
    fn topology_change_drops_mismatched_status() {
        let cache = cache_with(ControllerMode::Auto, 21.0, SetpointMode::FollowSchedule);
        cache.replace_topology(topology(&["z1", "z2"], true)).unwrap();
        assert!(cache.snapshot().is_ok());

        cache.replace_topology(topology(&["z2"], true)).unwrap();
        assert!(matches!(cache.snapshot(), Err(Error::NoSnapshot)));
        assert_eq!(cache.location_id().as_deref(), Some("loc-1"));
    }

    #[test]
    fn missing_schedule_is_typed_error() {
        let cache = cache_with(ControllerMode::Auto, 21.0, SetpointMode::FollowSchedule);
        let snap = cache.snapshot().unwrap();
        assert!(matches!(
            snap.schedule(&ZoneId::new("z1")),
            Err(Error::ScheduleNotFound(_))
        ));
    }
}
