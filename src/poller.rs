//! Periodic account refresh.
//!
//! The poller owns one recurring job on a tokio runtime. Each tick fetches the
//! account's zones and heaters and pushes them to whatever observers the host
//! registry currently holds. A failed tick demotes the bridge to Offline and
//! backs off to the offline interval; the next successful tick brings it back.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::CloudClient;
use crate::types::*;
use crate::Result;

/// Where a tick gets its data from.
pub trait AccountSource: Send + Sync + 'static {
    fn all_zones(&self) -> impl Future<Output = Result<Vec<Zone>>> + Send;
    fn all_heaters(&self) -> impl Future<Output = Result<Vec<HeaterInfo>>> + Send;
}

impl AccountSource for CloudClient {
    fn all_zones(&self) -> impl Future<Output = Result<Vec<Zone>>> + Send {
        CloudClient::all_zones(self)
    }

    fn all_heaters(&self) -> impl Future<Output = Result<Vec<HeaterInfo>>> + Send {
        CloudClient::all_heaters(self)
    }
}

pub trait ZoneObserver: Send + Sync {
    fn update_data(&self, zone: &Zone) -> Result<()>;
    /// Heaters currently assigned to this zone.
    fn update_heaters(&self, heaters: &[HeaterInfo]) -> Result<()>;
}

pub trait HeaterObserver: Send + Sync {
    fn update_data(&self, heater: &HeaterInfo) -> Result<()>;
}

/// Host-side view of the devices attached to one account.
///
/// The observer maps are snapshots; the poller asks for fresh ones on every
/// tick and never mutates the registry.
pub trait DeviceRegistry: Send + Sync {
    fn zone_observers(&self) -> HashMap<i64, Arc<dyn ZoneObserver>>;
    fn heater_observers(&self) -> HashMap<i64, Arc<dyn HeaterObserver>>;
    fn status(&self) -> ThingStatus;
    fn set_status(&self, status: ThingStatus, detail: StatusDetail, message: Option<String>);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStatus {
    pub status: ThingStatus,
    pub detail: StatusDetail,
    pub message: Option<String>,
}

#[derive(Default)]
pub struct InMemoryRegistry {
    zones: Mutex<HashMap<i64, Arc<dyn ZoneObserver>>>,
    heaters: Mutex<HashMap<i64, Arc<dyn HeaterObserver>>>,
    status: Mutex<BridgeStatus>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_zone(&self, zone_id: i64, observer: Arc<dyn ZoneObserver>) {
        lock(&self.zones).insert(zone_id, observer);
    }

    pub fn unregister_zone(&self, zone_id: i64) -> bool {
        lock(&self.zones).remove(&zone_id).is_some()
    }

    pub fn register_heater(&self, heater_id: i64, observer: Arc<dyn HeaterObserver>) {
        lock(&self.heaters).insert(heater_id, observer);
    }

    pub fn unregister_heater(&self, heater_id: i64) -> bool {
        lock(&self.heaters).remove(&heater_id).is_some()
    }

    pub fn bridge_status(&self) -> BridgeStatus {
        lock(&self.status).clone()
    }
}

impl DeviceRegistry for InMemoryRegistry {
    fn zone_observers(&self) -> HashMap<i64, Arc<dyn ZoneObserver>> {
        lock(&self.zones).clone()
    }

    fn heater_observers(&self) -> HashMap<i64, Arc<dyn HeaterObserver>> {
        lock(&self.heaters).clone()
    }

    fn status(&self) -> ThingStatus {
        lock(&self.status).status
    }

    fn set_status(&self, status: ThingStatus, detail: StatusDetail, message: Option<String>) {
        *lock(&self.status) = BridgeStatus {
            status,
            detail,
            message,
        };
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub online_interval: Duration,
    pub offline_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            online_interval: Duration::from_secs(60),
            offline_interval: Duration::from_secs(120),
        }
    }
}

struct Job {
    cancel: CancellationToken,
    interval: Duration,
}

struct Inner<S> {
    source: Arc<S>,
    registry: Arc<dyn DeviceRegistry>,
    config: PollerConfig,
    handle: Handle,
    job: Mutex<Option<Job>>,
    /// Tripped once by `cancel`; no job is installed afterwards.
    stopped: CancellationToken,
    /// Held for the whole of a tick so ticks of one account never overlap.
    ticking: tokio::sync::Mutex<()>,
}

/// Keeps one account's observers in sync with the cloud.
///
/// Dropping the poller cancels its job; a tick already running is allowed
/// to finish but cannot schedule another.
pub struct AccountPoller<S: AccountSource> {
    inner: Arc<Inner<S>>,
}

impl<S: AccountSource> AccountPoller<S> {
    pub fn new(
        source: Arc<S>,
        registry: Arc<dyn DeviceRegistry>,
        config: PollerConfig,
        handle: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                registry,
                config,
                handle,
                job: Mutex::new(None),
                stopped: CancellationToken::new(),
                ticking: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Replace any existing job with one that first ticks after
    /// `initial_delay`, then at the online or offline interval.
    /// Does nothing once the poller has been cancelled.
    pub fn schedule(&self, initial_delay: Duration, online: bool) {
        self.inner.schedule(initial_delay, online);
    }

    /// Run one tick now, outside the schedule. Waits for a scheduled tick
    /// that is already running.
    pub fn poll_now(&self) -> impl Future<Output = ()> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        async move {
            let _turn = inner.ticking.lock().await;
            inner.tick().await;
        }
    }

    /// Interval of the active job, if one is scheduled.
    pub fn current_interval(&self) -> Option<Duration> {
        lock(&self.inner.job).as_ref().map(|job| job.interval)
    }

    pub fn is_scheduled(&self) -> bool {
        lock(&self.inner.job).is_some()
    }

    /// Stop polling for good. A tick in flight finishes without rescheduling.
    pub fn cancel(&self) {
        let mut job = lock(&self.inner.job);
        self.inner.stopped.cancel();
        if let Some(job) = job.take() {
            job.cancel.cancel();
            debug!("poller cancelled");
        }
    }
}

impl<S: AccountSource> Drop for AccountPoller<S> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<S: AccountSource> Inner<S> {
    fn schedule(self: &Arc<Self>, initial_delay: Duration, online: bool) {
        let interval = if online {
            self.config.online_interval
        } else {
            self.config.offline_interval
        };

        let mut job = lock(&self.job);
        if self.stopped.is_cancelled() {
            debug!("poller stopped, not rescheduling");
            return;
        }
        if let Some(previous) = job.take() {
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let inner = Arc::clone(self);
        self.handle
            .spawn(inner.run(initial_delay, interval, cancel.clone()));
        *job = Some(Job { cancel, interval });
        debug!(?initial_delay, ?interval, online, "poller scheduled");
    }

    async fn run(self: Arc<Self>, initial_delay: Duration, interval: Duration, cancel: CancellationToken) {
        let mut delay = initial_delay;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            {
                let _turn = self.ticking.lock().await;
                if cancel.is_cancelled() {
                    return;
                }
                self.tick().await;
            }
            if cancel.is_cancelled() {
                return;
            }
            delay = interval;
        }
    }

    /// One refresh and status transition. Callers hold `ticking`.
    async fn tick(self: &Arc<Self>) {
        let was_online = self.registry.status() == ThingStatus::Online;
        if was_online {
            debug!("polling");
        } else {
            info!("attempting to go online");
        }

        match self.refresh().await {
            Ok(()) => {
                if !was_online {
                    self.registry
                        .set_status(ThingStatus::Online, StatusDetail::None, None);
                    info!("account online");
                    self.schedule(self.config.online_interval, true);
                }
            }
            Err(e) => {
                error!(error = %e, "communication with the Adax cloud failed");
                self.registry.set_status(
                    ThingStatus::Offline,
                    StatusDetail::CommunicationError,
                    Some(e.to_string()),
                );
                self.schedule(self.config.offline_interval, false);
            }
        }
    }

    /// Fetch zones then heaters. Each fetch is attempted regardless of the
    /// other; the first failure is reported after both have run.
    async fn refresh(&self) -> Result<()> {
        let zone_observers = self.registry.zone_observers();
        let heater_observers = self.registry.heater_observers();

        let zones = self.source.all_zones().await;
        match &zones {
            Ok(zones) => update_zones(zones, &zone_observers),
            Err(e) => warn!(error = %e, "failed to fetch zones"),
        }

        let heaters = self.source.all_heaters().await;
        match &heaters {
            Ok(heaters) => update_heaters(heaters, &zone_observers, &heater_observers),
            Err(e) => warn!(error = %e, "failed to fetch heaters"),
        }

        zones?;
        heaters?;
        Ok(())
    }
}

fn update_zones(zones: &[Zone], observers: &HashMap<i64, Arc<dyn ZoneObserver>>) {
    for zone in zones {
        let Some(observer) = zone.id.and_then(|id| observers.get(&id)) else {
            continue;
        };
        if let Err(e) = observer.update_data(zone) {
            warn!(zone_id = zone.id, error = %e, "zone update failed");
        }
    }
}

fn update_heaters(
    heaters: &[HeaterInfo],
    zone_observers: &HashMap<i64, Arc<dyn ZoneObserver>>,
    heater_observers: &HashMap<i64, Arc<dyn HeaterObserver>>,
) {
    for (zone_id, members) in group_by_zone(heaters) {
        let Some(observer) = zone_observers.get(&zone_id) else {
            continue;
        };
        if let Err(e) = observer.update_heaters(&members) {
            warn!(zone_id, error = %e, "zone heater update failed");
        }
    }

    for heater in heaters {
        let Some(observer) = heater.id.and_then(|id| heater_observers.get(&id)) else {
            continue;
        };
        if let Err(e) = observer.update_data(heater) {
            warn!(heater_id = heater.id, error = %e, "heater update failed");
        }
    }
}

/// Heaters keyed by zone id, in response order. Heaters with no zone are left out.
pub fn group_by_zone(heaters: &[HeaterInfo]) -> BTreeMap<i64, Vec<HeaterInfo>> {
    let mut groups: BTreeMap<i64, Vec<HeaterInfo>> = BTreeMap::new();
    for heater in heaters {
        if let Some(zone_id) = heater.zone {
            groups.entry(zone_id).or_default().push(heater.clone());
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::Error;

    #[derive(Default)]
    struct FakeSource {
        failing: AtomicBool,
        zone_calls: AtomicUsize,
    }

    impl AccountSource for FakeSource {
        async fn all_zones(&self) -> Result<Vec<Zone>> {
            self.zone_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::remote(ClientErrorType::ConnectionTimeout.code()));
            }
            Ok(vec![])
        }

        async fn all_heaters(&self) -> Result<Vec<HeaterInfo>> {
            Ok(vec![])
        }
    }

    /// Each zone fetch takes ten seconds and records how many overlap.
    #[derive(Default)]
    struct SlowSource {
        failing: bool,
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl AccountSource for SlowSource {
        async fn all_zones(&self) -> Result<Vec<Zone>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.failing {
                return Err(Error::remote(ClientErrorType::ConnectionTimeout.code()));
            }
            Ok(vec![])
        }

        async fn all_heaters(&self) -> Result<Vec<HeaterInfo>> {
            Ok(vec![])
        }
    }

    fn slow_poller(source: &Arc<SlowSource>, registry: &Arc<InMemoryRegistry>) -> AccountPoller<SlowSource> {
        AccountPoller::new(
            Arc::clone(source),
            Arc::clone(registry) as Arc<dyn DeviceRegistry>,
            PollerConfig::default(),
            Handle::current(),
        )
    }

    fn poller(source: &Arc<FakeSource>, registry: &Arc<InMemoryRegistry>) -> AccountPoller<FakeSource> {
        AccountPoller::new(
            Arc::clone(source),
            Arc::clone(registry) as Arc<dyn DeviceRegistry>,
            PollerConfig::default(),
            Handle::current(),
        )
    }

    fn heater(id: i64, zone: Option<i64>) -> HeaterInfo {
        let mut h = HeaterInfo::new(Temperature::from_wire(2000), 60);
        h.id = Some(id);
        h.zone = zone;
        h
    }

    #[test]
    fn groups_heaters_by_zone() {
        let heaters = vec![
            heater(10, Some(1)),
            heater(11, Some(1)),
            heater(12, Some(2)),
            heater(13, None),
        ];
        let groups = group_by_zone(&heaters);
        assert_eq!(groups.len(), 2);
        let ids: Vec<_> = groups[&1].iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![Some(10), Some(11)]);
        assert_eq!(groups[&2][0].id, Some(12));
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_twice_keeps_one_job() {
        let source = Arc::new(FakeSource::default());
        let registry = Arc::new(InMemoryRegistry::new());
        let poller = poller(&source, &registry);

        poller.schedule(Duration::from_secs(5), true);
        poller.schedule(Duration::from_secs(30), false);
        assert_eq!(poller.current_interval(), Some(Duration::from_secs(120)));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.zone_calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(source.zone_calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.status(), ThingStatus::Online);
        assert_eq!(poller.current_interval(), Some(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_back_off_until_success() {
        let source = Arc::new(FakeSource::default());
        source.failing.store(true, Ordering::SeqCst);
        let registry = Arc::new(InMemoryRegistry::new());
        let poller = poller(&source, &registry);

        // Ticks at 5s, 125s and 245s all fail.
        poller.schedule(Duration::from_secs(5), true);
        tokio::time::sleep(Duration::from_secs(250)).await;
        assert_eq!(source.zone_calls.load(Ordering::SeqCst), 3);
        let status = registry.bridge_status();
        assert_eq!(status.status, ThingStatus::Offline);
        assert_eq!(status.detail, StatusDetail::CommunicationError);
        assert!(status.message.is_some());
        assert_eq!(poller.current_interval(), Some(Duration::from_secs(120)));

        source.failing.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(source.zone_calls.load(Ordering::SeqCst), 4);
        assert_eq!(registry.status(), ThingStatus::Online);
        assert_eq!(poller.current_interval(), Some(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_future_ticks() {
        let source = Arc::new(FakeSource::default());
        let registry = Arc::new(InMemoryRegistry::new());
        let poller = poller(&source, &registry);

        poller.schedule(Duration::from_secs(5), true);
        poller.cancel();
        assert!(!poller.is_scheduled());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(source.zone_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_tick_does_not_reschedule() {
        let source = Arc::new(SlowSource {
            failing: true,
            ..SlowSource::default()
        });
        let registry = Arc::new(InMemoryRegistry::new());
        let poller = slow_poller(&source, &registry);

        poller.schedule(Duration::from_secs(1), true);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(source.active.load(Ordering::SeqCst), 1);

        poller.cancel();
        assert!(!poller.is_scheduled());
        drop(poller);

        tokio::time::sleep(Duration::from_secs(1000)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.active.load(Ordering::SeqCst), 0);
        assert_eq!(registry.status(), ThingStatus::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_after_cancel_is_ignored() {
        let source = Arc::new(FakeSource::default());
        let registry = Arc::new(InMemoryRegistry::new());
        let poller = poller(&source, &registry);

        poller.cancel();
        poller.schedule(Duration::from_secs(1), true);
        assert!(!poller.is_scheduled());

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(source.zone_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_poll_waits_for_scheduled_tick() {
        let source = Arc::new(SlowSource::default());
        let registry = Arc::new(InMemoryRegistry::new());
        let poller = slow_poller(&source, &registry);

        poller.schedule(Duration::from_secs(1), true);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(source.active.load(Ordering::SeqCst), 1);

        poller.poll_now().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(registry.status(), ThingStatus::Online);
        assert_eq!(poller.current_interval(), Some(Duration::from_secs(60)));
    }
}
