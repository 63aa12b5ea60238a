use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, Utc};
use tokio::sync::MutexGuard;
use tracing::{debug, info, warn};

use crate::cache::{Cache, RefreshClock, Snapshot};
use crate::cascade::cascade;
use crate::config::Config;
use crate::entity::{Entity, EntityKind};
use crate::refresh::{self, Refresh};
use crate::remote::Remote;
use crate::schedule::temperature_at;
use crate::signal::{Signal, SignalBus, SignalCallback, SubscriptionId};
use crate::state;
use crate::types::*;
use crate::{Error, Result};

/// Hours a DHW `TemporaryOverride` lasts when no end time is given.
const DHW_OVERRIDE_HOURS: i64 = 1;

/// What a call to [`Hub::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The last status is still fresh.
    Skipped,
    Refreshed(Refresh),
    /// A command holds the hub; the tick runs as soon as it finishes.
    Deferred,
}

/// Owner of the installation cache.
///
/// Refreshes and commands share one timeline: at most one of them touches the remote
/// service and the cache at a time. Reads (`snapshot`, `zone_state`, ...) never wait on
/// that timeline and always see one consistent snapshot.
pub struct Hub<R: Remote> {
    remote: R,
    config: Config,
    cache: Cache,
    bus: SignalBus,
    timeline: tokio::sync::Mutex<()>,
    /// Latest tick that arrived while the timeline was held.
    deferred: Mutex<Option<DateTime<Utc>>>,
    /// Fatal error from a deferred tick, handed to the next `tick` caller.
    deferred_failure: Mutex<Option<Error>>,
    local_now: fn() -> NaiveDateTime,
}

pub struct HubBuilder<R: Remote> {
    remote: R,
    config: Config,
    subscribers: Vec<SignalCallback>,
    local_now: fn() -> NaiveDateTime,
}

impl<R: Remote> HubBuilder<R> {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Subscribe before the first refresh so no signal is missed.
    pub fn on_signal(mut self, f: impl Fn(Signal, &Snapshot) + Send + Sync + 'static) -> Self {
        self.subscribers.push(Arc::new(f));
        self
    }

    /// Wall-clock time at the installation, used for schedule lookups.
    /// Defaults to the host's local time.
    pub fn local_clock(mut self, now: fn() -> NaiveDateTime) -> Self {
        self.local_now = now;
        self
    }

    pub fn build(self) -> Hub<R> {
        let bus = SignalBus::new();
        for f in self.subscribers {
            bus.subscribe_arc(f);
        }
        Hub {
            remote: self.remote,
            config: self.config,
            cache: Cache::new(),
            bus,
            timeline: tokio::sync::Mutex::new(()),
            deferred: Mutex::new(None),
            deferred_failure: Mutex::new(None),
            local_now: self.local_now,
        }
    }
}

fn host_local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl<R: Remote> Hub<R> {
    pub fn builder(remote: R) -> HubBuilder<R> {
        HubBuilder {
            remote,
            config: Config::default(),
            subscribers: Vec::new(),
            local_now: host_local_now,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn clock(&self) -> RefreshClock {
        self.cache.clock()
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        self.cache.snapshot()
    }

    pub fn subscribe(&self, f: impl Fn(Signal, &Snapshot) + Send + Sync + 'static) -> SubscriptionId {
        self.bus.subscribe(f)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn controller_state(&self) -> Result<ControllerMode> {
        Ok(state::controller_state(&self.cache.snapshot()?))
    }

    pub fn zone_state(&self, zone_id: &ZoneId) -> Result<ZoneState> {
        state::zone_state(&self.cache.snapshot()?, &self.config, zone_id)
    }

    pub fn dhw_state(&self) -> Result<DhwState> {
        state::dhw_state(&self.cache.snapshot()?, &self.config)
    }

    /// Scheduled setpoint of a zone at a local wall-clock time.
    pub fn scheduled_temperature(&self, zone_id: &ZoneId, at: NaiveDateTime) -> Result<Temperature> {
        temperature_at(&self.cache.snapshot()?, zone_id, at)
    }

    /// Create an entity view kept current by this hub's signals. The subscription
    /// lapses into a no-op once the returned entity is dropped; unsubscribe with the
    /// returned id to remove it entirely.
    pub fn track(&self, kind: EntityKind) -> Result<(Arc<Mutex<Entity>>, SubscriptionId)> {
        let entity = Entity::new(kind, &self.cache.snapshot()?, &self.config)?;
        let entity = Arc::new(Mutex::new(entity));
        let weak: Weak<Mutex<Entity>> = Arc::downgrade(&entity);
        let config = self.config.clone();
        let id = self.bus.subscribe(move |signal, snapshot| {
            let Some(entity) = weak.upgrade() else {
                return;
            };
            let mut entity = entity.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = entity.on_signal(signal, snapshot, &config) {
                warn!(kind = ?entity.kind(), error = %e, "entity not refreshed");
            }
        });
        Ok((entity, id))
    }

    /// Bring the cache up to date if it is due. Safe to call as often as wanted.
    ///
    /// A refresh failure leaves the previous snapshot and the status expiry untouched,
    /// so the next tick retries. A fatal failure of a deferred tick is returned by the
    /// next call instead of refreshing.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickOutcome> {
        let guard = {
            let mut deferred = self.deferred.lock().unwrap_or_else(PoisonError::into_inner);
            match self.timeline.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    *deferred = Some(deferred.map_or(now, |d| d.max(now)));
                    debug!(%now, "hub busy, tick deferred");
                    return Ok(TickOutcome::Deferred);
                }
            }
        };
        let missed = self
            .deferred_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let result = match missed {
            Some(e) => Err(e),
            None => self.refresh(now).await,
        };
        self.release(guard).await;
        result
    }

    /// Switch the controller mode and cascade its effect to the zones without waiting
    /// for the next poll.
    ///
    /// If the remote call fails the local change is kept and left provisional (one
    /// `Assume` signal, no `Update`); the next successful poll corrects it.
    pub async fn set_controller_mode(&self, mode: ControllerMode) -> Result<()> {
        let guard = self.timeline.lock().await;
        let result = self.transition(mode).await;
        self.release(guard).await;
        result
    }

    /// Override a zone's setpoint, permanently when `until` is `None`.
    /// The value is rounded to the zone's resolution and checked against its range.
    pub async fn set_zone_override(
        &self,
        zone_id: &ZoneId,
        temperature: Temperature,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let guard = self.timeline.lock().await;
        let result = self.override_zone(zone_id, temperature, until).await;
        self.release(guard).await;
        result
    }

    /// Return a zone to its schedule.
    pub async fn clear_zone_override(&self, zone_id: &ZoneId) -> Result<()> {
        let guard = self.timeline.lock().await;
        let result = self.resume_zone(zone_id).await;
        self.release(guard).await;
        result
    }

    /// Switch the hot water unit. With `FollowSchedule` the state is ignored and the
    /// unit returns to its schedule; a `TemporaryOverride` without `until` lasts an hour.
    pub async fn set_dhw_state(
        &self,
        dhw_state: DhwState,
        mode: SetpointMode,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let guard = self.timeline.lock().await;
        let result = self.switch_dhw(dhw_state, mode, until).await;
        self.release(guard).await;
        result
    }

    /// Run any tick deferred while `guard` was held, then let go of the timeline.
    async fn release(&self, guard: MutexGuard<'_, ()>) {
        loop {
            let pending = {
                let mut deferred = self.deferred.lock().unwrap_or_else(PoisonError::into_inner);
                match deferred.take() {
                    Some(at) => at,
                    None => {
                        // still under the deferred lock, so no tick can slip in between
                        drop(guard);
                        return;
                    }
                }
            };
            debug!(now = %pending, "running deferred tick");
            // already logged inside refresh
            if let Err(e) = self.refresh(pending).await
                && e.is_fatal()
            {
                *self.deferred_failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(e);
            }
        }
    }

    async fn call<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.config.request_timeout(), fut)
            .await
            .map_err(|_| Error::Timeout)?
    }

    fn publish(&self, signal: Signal) {
        match self.cache.snapshot() {
            Ok(snapshot) => self.bus.publish(signal, &snapshot),
            Err(e) => debug!(?signal, error = %e, "nothing to publish"),
        }
    }

    async fn refresh(&self, now: DateTime<Utc>) -> Result<TickOutcome> {
        let plan = refresh::plan(&self.cache.clock(), now, self.cache.has_topology(), &self.config);
        if plan == Refresh::Skip {
            return Ok(TickOutcome::Skipped);
        }
        debug!(?plan, %now, "refreshing");

        let result = self.run_refresh(plan, now).await;
        match &result {
            Ok(()) => self.publish(Signal::Update),
            Err(e) if e.is_fatal() => warn!(error = %e, "refresh failed, credentials rejected"),
            Err(e) => warn!(error = %e, transient = e.is_transient(), "refresh failed, keeping previous state"),
        }
        result.map(|()| TickOutcome::Refreshed(plan))
    }

    async fn run_refresh(&self, plan: Refresh, now: DateTime<Utc>) -> Result<()> {
        if plan == Refresh::Full {
            let session = self.call(self.remote.reauthenticate()).await?;
            debug!(lifetime = ?session.lifetime, "session renewed");
            self.cache
                .update_clock(|c| refresh::session_renewed(c, now, session.lifetime, &self.config));
        }
        if matches!(plan, Refresh::Full | Refresh::Topology) {
            self.refresh_topology(now).await?;
        }
        self.refresh_status(now).await
    }

    async fn refresh_topology(&self, now: DateTime<Utc>) -> Result<()> {
        let mut installations = self.call(self.remote.fetch_installations()).await?;
        let index = self.config.location_index();
        if index >= installations.len() {
            return Err(Error::InstallationNotFound(index));
        }
        let topology = installations.swap_remove(index);
        debug!(
            location = %topology.location_id,
            zones = topology.zones.len(),
            dhw = topology.dhw.is_some(),
            "topology fetched"
        );

        let schedules = if self.config.schedules() {
            Some(self.fetch_schedules(&topology).await?)
        } else {
            None
        };

        self.cache.replace_topology(topology)?;
        if let Some(schedules) = schedules {
            self.cache.replace_schedules(schedules);
        }
        self.cache.update_clock(|c| refresh::topology_refreshed(c, now));
        Ok(())
    }

    /// A zone whose schedule cannot be fetched keeps the one it had, if any.
    async fn fetch_schedules(&self, topology: &Topology) -> Result<HashMap<ZoneId, Schedule>> {
        let previous = self.cache.schedules();
        let mut schedules = HashMap::with_capacity(topology.zones.len());
        for zone in &topology.zones {
            match self.call(self.remote.fetch_zone_schedule(&zone.id)).await {
                Ok(schedule) => {
                    schedules.insert(zone.id.clone(), schedule);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(zone = %zone.id, error = %e, "schedule fetch failed");
                    if let Some(old) = previous.get(&zone.id) {
                        schedules.insert(zone.id.clone(), old.clone());
                    }
                }
            }
        }
        Ok(schedules)
    }

    async fn refresh_status(&self, now: DateTime<Utc>) -> Result<()> {
        let location_id = self.cache.location_id().ok_or(Error::NoSnapshot)?;
        let mut status = self.call(self.remote.fetch_status(&location_id)).await?;
        if self.config.high_precision() {
            self.splice_precise(&mut status).await;
        }
        self.cache.replace_status(status)?;
        self.cache
            .update_clock(|c| refresh::status_refreshed(c, now, &self.config));
        Ok(())
    }

    /// Best effort: any failure leaves the coarse temperatures in place.
    async fn splice_precise(&self, status: &mut Status) {
        let precise = match self.call(self.remote.fetch_precise_temperatures()).await {
            Ok(precise) => precise,
            Err(e) => {
                warn!(error = %e, "high-precision temperatures unavailable");
                return;
            }
        };
        for reading in precise {
            let Some(temperature) = reading.temperature else {
                continue;
            };
            if let Some(zone) = status.zones.iter_mut().find(|z| z.id == reading.zone_id) {
                zone.current = Some(temperature);
            }
        }
    }

    async fn transition(&self, mode: ControllerMode) -> Result<()> {
        let snapshot = self.cache.snapshot()?;
        let allowed = &snapshot.topology().allowed_modes;
        if !allowed.is_empty() && !allowed.contains(&mode) {
            return Err(Error::InvalidMode(mode.to_string()));
        }
        let previous = snapshot.controller_mode();
        info!(from = %previous, to = %mode, "setting controller mode");

        let remote = self
            .call(self.remote.apply_controller_mode(&snapshot.topology().system_id, mode))
            .await;

        let mut status = snapshot.status().clone();
        status.mode = mode;
        if remote.is_ok() {
            self.cache.replace_status(status.clone())?;
            self.publish(Signal::Assume);
        }

        cascade(&mut status, &snapshot, &self.config, mode, previous, (self.local_now)());
        self.cache.replace_status(status)?;

        match remote {
            Ok(()) => {
                self.publish(Signal::Update);
                Ok(())
            }
            Err(e) => {
                warn!(%mode, error = %e, "mode change not confirmed, keeping local change");
                self.publish(Signal::Assume);
                Err(e)
            }
        }
    }

    async fn override_zone(
        &self,
        zone_id: &ZoneId,
        temperature: Temperature,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let snapshot = self.cache.snapshot()?;
        let zone = snapshot.zone(zone_id)?;
        let descriptor = zone.descriptor;
        let target = temperature.round_to(descriptor.step);
        if target < descriptor.min_temp || target > descriptor.max_temp {
            return Err(Error::InvalidSetpoint {
                zone_id: zone_id.clone(),
                value: temperature.celsius(),
                min: descriptor.min_temp.celsius(),
                max: descriptor.max_temp.celsius(),
            });
        }
        let mode = match until {
            Some(_) => SetpointMode::TemporaryOverride,
            None => SetpointMode::PermanentOverride,
        };
        if !descriptor.allowed_modes.is_empty() && !descriptor.allowed_modes.contains(&mode) {
            return Err(Error::InvalidMode(format!("{mode} not allowed for zone {zone_id}")));
        }

        debug!(zone = %zone_id, %target, ?until, "overriding zone");
        self.call(self.remote.apply_zone_override(zone_id, target, until))
            .await?;

        let mut status = snapshot.status().clone();
        if let Some(z) = status.zones.iter_mut().find(|z| &z.id == zone_id) {
            z.target = target;
            z.setpoint_mode = mode;
            z.until = until;
        }
        self.cache.replace_status(status)?;
        self.publish(Signal::Update);
        Ok(())
    }

    async fn resume_zone(&self, zone_id: &ZoneId) -> Result<()> {
        let snapshot = self.cache.snapshot()?;
        snapshot.zone(zone_id)?;

        debug!(zone = %zone_id, "clearing zone override");
        self.call(self.remote.clear_zone_override(zone_id)).await?;

        let scheduled = if self.config.schedules() {
            match temperature_at(&snapshot, zone_id, (self.local_now)()) {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!(zone = %zone_id, error = %e, "keeping target, schedule lookup failed");
                    None
                }
            }
        } else {
            None
        };

        let mut status = snapshot.status().clone();
        if let Some(z) = status.zones.iter_mut().find(|z| &z.id == zone_id) {
            z.setpoint_mode = SetpointMode::FollowSchedule;
            z.until = None;
            if let Some(t) = scheduled {
                z.target = t;
            }
        }
        self.cache.replace_status(status)?;
        self.publish(Signal::Update);
        Ok(())
    }

    async fn switch_dhw(
        &self,
        dhw_state: DhwState,
        mode: SetpointMode,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let snapshot = self.cache.snapshot()?;
        let (descriptor, _) = snapshot.dhw()?;
        if !descriptor.allowed_modes.is_empty() && !descriptor.allowed_modes.contains(&mode) {
            return Err(Error::InvalidMode(format!("{mode} not allowed for hot water")));
        }

        let (state, until) = match mode {
            SetpointMode::FollowSchedule => (None, None),
            SetpointMode::PermanentOverride => (Some(dhw_state), None),
            SetpointMode::TemporaryOverride => (
                Some(dhw_state),
                Some(until.unwrap_or_else(|| Utc::now() + TimeDelta::hours(DHW_OVERRIDE_HOURS))),
            ),
        };

        debug!(?state, %mode, ?until, "setting hot water");
        self.call(self.remote.apply_dhw_state(&descriptor.id, state, mode, until))
            .await?;

        let mut status = snapshot.status().clone();
        if let Some(dhw) = status.dhw.as_mut() {
            if let Some(state) = state {
                dhw.state = state;
            }
            dhw.mode = mode;
            dhw.until = until;
        }
        self.cache.replace_status(status)?;
        self.publish(Signal::Update);
        Ok(())
    }
}
