//! Reconciliation engine.
//!
//! Owns the table of managed containers and drives the proxy API until the
//! remote state matches the decoded labels.
//!
//! ```text
//! ContainerEvent ──mpsc──┐
//!                        ├──> ReconciliationEngine ──ProxyApi──> proxy manager
//! retry interval ────────┘            │
//!                                     └──watch──> StatusHandle
//! ```
//!
//! A single task processes events and retry ticks one at a time, so the
//! table has exactly one writer and needs no lock. Remote calls run to
//! completion before the next message is taken.
//!
//! Entry lifecycle:
//!
//! ```text
//! Pending ──ok──> Synced ──labels/runtime change──> Pending
//!    │                                                 
//!    └──error──> Failed ──retry tick──> Pending
//! any ──removed──> (deleted) | Removing (delete failed, retried)
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use labelsync_core::metrics as m;
use labelsync_core::types::ContainerSnapshot;
use labelsync_docker::ContainerEvent;
use labelsync_npm::{NpmError, ProxyApi, RemoteId, RemoteProxyHost};

use crate::labels::{self, DecodeDefaults, DesiredConfig};
use crate::status::{self, ContainerStatus, StatusHandle, StatusSnapshot, SyncPhase};

/// Last known sync state of a managed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// 반영 대기
    Pending,
    /// 반영 완료
    Synced,
    /// 실패 (다음 재시도 주기에 다시 시도)
    Failed(String),
}

/// One container the engine manages.
#[derive(Debug, Clone)]
pub struct ManagedContainer {
    /// 컨테이너 ID
    pub container_id: String,
    /// 컨테이너 이름
    pub name: String,
    /// 원하는 설정
    pub desired: DesiredConfig,
    /// 원격 proxy host ID (생성 전에는 없음)
    pub remote_id: Option<RemoteId>,
    /// 동기화 상태
    pub state: SyncState,
    /// 삭제가 실패해 재시도를 기다리는 항목
    pub removing: bool,
}

impl ManagedContainer {
    fn status(&self) -> ContainerStatus {
        let (state, last_error) = match (&self.state, self.removing) {
            (SyncState::Failed(reason), true) => (SyncPhase::Removing, Some(reason.clone())),
            (_, true) => (SyncPhase::Removing, None),
            (SyncState::Pending, false) => (SyncPhase::Pending, None),
            (SyncState::Synced, false) => (SyncPhase::Synced, None),
            (SyncState::Failed(reason), false) => (SyncPhase::Failed, Some(reason.clone())),
        };
        ContainerStatus {
            container_id: self.container_id.clone(),
            name: self.name.clone(),
            domains: self.desired.domains.clone(),
            upstream: self.desired.upstream.to_string(),
            ssl: self.desired.ssl,
            remote_id: self.remote_id,
            state,
            last_error,
        }
    }
}

/// Single-writer reconciliation state machine.
///
/// # 사용 예시
/// ```ignore
/// let (engine, status) = ReconciliationEngine::new(api, defaults, Duration::from_secs(30));
/// let handle = engine.spawn(event_rx, cancel.child_token());
/// let snapshot = status.current();
/// ```
pub struct ReconciliationEngine<P: ProxyApi> {
    api: Arc<P>,
    defaults: DecodeDefaults,
    retry_interval: Duration,
    table: HashMap<String, ManagedContainer>,
    /// 원격 proxy host 목록 캐시 (지연 로드, 전체 열거 시 갱신)
    remote_index: Option<Vec<RemoteProxyHost>>,
    status_tx: watch::Sender<Arc<StatusSnapshot>>,
}

impl<P: ProxyApi> ReconciliationEngine<P> {
    /// Creates an engine and the handle used to read its status.
    pub fn new(
        api: Arc<P>,
        defaults: DecodeDefaults,
        retry_interval: Duration,
    ) -> (Self, StatusHandle) {
        let (status_tx, handle) = status::channel();
        let engine = Self {
            api,
            defaults,
            retry_interval,
            table: HashMap::new(),
            remote_index: None,
            status_tx,
        };
        (engine, handle)
    }

    /// 관리 중인 컨테이너 항목을 반환합니다.
    pub fn entry(&self, container_id: &str) -> Option<&ManagedContainer> {
        self.table.get(container_id)
    }

    /// 관리 중인 컨테이너 수를 반환합니다.
    pub fn managed_count(&self) -> usize {
        self.table.len()
    }

    /// 백그라운드 태스크로 실행합니다.
    pub fn spawn(
        self,
        rx: mpsc::Receiver<ContainerEvent>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(rx, cancel))
    }

    /// Processes events and retry ticks until cancelled or the event channel closes.
    pub async fn run(mut self, mut rx: mpsc::Receiver<ContainerEvent>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.retry_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 첫 tick은 즉시 완료되므로 소비
        ticker.tick().await;

        info!(
            retry_interval_secs = self.retry_interval.as_secs(),
            "reconciliation engine started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                // 이벤트가 계속 들어와도 재시도가 밀리지 않도록 tick 먼저
                _ = ticker.tick() => self.retry_failed().await,
                event = rx.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => {
                        info!("event channel closed, stopping reconciliation engine");
                        break;
                    }
                },
            }
        }

        info!(managed = self.table.len(), "reconciliation engine stopped");
    }

    /// Applies one container event and publishes the resulting status.
    pub async fn handle(&mut self, event: ContainerEvent) {
        debug!(event = %event, "handling container event");
        match event {
            ContainerEvent::Seen(snapshot) => self.on_seen(snapshot).await,
            ContainerEvent::Removed { container_id } => self.on_removed(&container_id).await,
            ContainerEvent::EnumerationComplete { running } => {
                self.on_enumeration_complete(&running).await
            }
        }
        self.publish();
    }

    /// Re-attempts every entry in the failed state. Removals go first so
    /// their domains are free before re-creating anything.
    pub async fn retry_failed(&mut self) {
        let mut removals = Vec::new();
        let mut upserts = Vec::new();
        for (id, entry) in &self.table {
            match (&entry.state, entry.removing) {
                (SyncState::Failed(_), true) => removals.push(id.clone()),
                (SyncState::Failed(_), false) => upserts.push(id.clone()),
                _ => {}
            }
        }
        if removals.is_empty() && upserts.is_empty() {
            return;
        }

        info!(
            removals = removals.len(),
            upserts = upserts.len(),
            "retrying failed entries"
        );
        for id in removals {
            self.remove(&id).await;
        }
        for id in upserts {
            if let Some(entry) = self.table.get_mut(&id) {
                entry.state = SyncState::Pending;
            }
            self.apply(&id).await;
        }
        self.publish();
    }

    async fn on_seen(&mut self, snapshot: ContainerSnapshot) {
        let id = snapshot.id.clone();

        let desired = match labels::decode(&snapshot, &self.defaults) {
            Ok(desired) => desired,
            Err(reason) => {
                if reason.is_opt_out() {
                    debug!(container_id = %id, name = %snapshot.name, "container has no proxy labels");
                } else {
                    warn!(container_id = %id, name = %snapshot.name, reason = %reason, "rejected container labels");
                }
                if self.table.contains_key(&id) {
                    info!(container_id = %id, "labels withdrawn, removing proxy host");
                    self.remove(&id).await;
                }
                return;
            }
        };

        if let Some(existing) = self.table.get(&id) {
            if !existing.removing
                && existing.state == SyncState::Synced
                && existing.desired.signature == desired.signature
            {
                debug!(container_id = %id, "desired configuration unchanged");
                return;
            }
        }

        self.displace_overlapping(&id, &desired).await;

        let entry = self
            .table
            .entry(id.clone())
            .or_insert_with(|| ManagedContainer {
                container_id: id.clone(),
                name: snapshot.name.clone(),
                desired: desired.clone(),
                remote_id: None,
                state: SyncState::Pending,
                removing: false,
            });
        entry.name = snapshot.name;
        entry.desired = desired;
        entry.state = SyncState::Pending;
        entry.removing = false;

        self.apply(&id).await;
    }

    async fn on_removed(&mut self, container_id: &str) {
        if self.table.contains_key(container_id) {
            self.remove(container_id).await;
        } else {
            debug!(container_id, "removal for unmanaged container");
        }
    }

    async fn on_enumeration_complete(&mut self, running: &HashSet<String>) {
        let vanished: Vec<String> = self
            .table
            .keys()
            .filter(|id| !running.contains(*id))
            .cloned()
            .collect();
        for id in vanished {
            info!(container_id = %id, "container no longer running, removing proxy host");
            self.remove(&id).await;
        }

        match self.api.list_proxy_hosts().await {
            Ok(hosts) => {
                let hosts = self.remove_orphans(hosts).await;
                self.remote_index = Some(hosts);
            }
            Err(e) => {
                warn!(error = %e, "failed to list proxy hosts, skipping orphan cleanup");
                metrics::counter!(m::SYNC_FAILURES_TOTAL, m::LABEL_OPERATION => "list").increment(1);
                self.remote_index = None;
            }
        }
    }

    /// Deletes managed remote hosts whose domain set matches no managed
    /// container. Returns the hosts that remain.
    async fn remove_orphans(&mut self, hosts: Vec<RemoteProxyHost>) -> Vec<RemoteProxyHost> {
        let claimed: HashSet<Vec<String>> = self
            .table
            .values()
            .filter(|e| !e.removing)
            .map(|e| domain_set(&e.desired.domains))
            .collect();
        let held: HashSet<RemoteId> = self.table.values().filter_map(|e| e.remote_id).collect();

        let mut remaining = Vec::with_capacity(hosts.len());
        for host in hosts {
            let orphan = host.managed
                && !held.contains(&host.id)
                && !claimed.contains(&domain_set(&host.domains));
            if !orphan {
                remaining.push(host);
                continue;
            }

            match self.api.delete_proxy_host(host.id).await {
                Ok(()) => {
                    info!(remote_id = host.id, domains = ?host.domains, "removed orphaned proxy host");
                    metrics::counter!(m::SYNC_ORPHANS_REMOVED_TOTAL).increment(1);
                    metrics::counter!(m::SYNC_PROXY_HOSTS_DELETED_TOTAL).increment(1);
                }
                Err(e) => {
                    warn!(remote_id = host.id, error = %e, "failed to remove orphaned proxy host");
                    metrics::counter!(m::SYNC_FAILURES_TOTAL, m::LABEL_OPERATION => "delete")
                        .increment(1);
                    remaining.push(host);
                }
            }
        }
        remaining
    }

    /// Removes every other entry claiming one of `desired`'s domains.
    async fn displace_overlapping(&mut self, id: &str, desired: &DesiredConfig) {
        let rivals: Vec<String> = self
            .table
            .iter()
            .filter(|(other, entry)| other.as_str() != id && desired.overlaps(&entry.desired.domains))
            .map(|(other, _)| other.clone())
            .collect();

        for rival in rivals {
            warn!(
                container_id = %id,
                displaced = %rival,
                domains = ?desired.domains,
                "domain claimed by another container, removing the older claim"
            );
            self.remove(&rival).await;
        }
    }

    /// Deletes the entry's remote host, then drops the entry. On failure the
    /// entry stays in the table marked for removal.
    async fn remove(&mut self, id: &str) {
        let Some(remote_id) = self.table.get(id).map(|e| e.remote_id) else {
            return;
        };

        let Some(remote_id) = remote_id else {
            self.table.remove(id);
            return;
        };

        match self.api.delete_proxy_host(remote_id).await {
            Ok(()) => {
                metrics::counter!(m::SYNC_PROXY_HOSTS_DELETED_TOTAL).increment(1);
                self.forget_remote(remote_id);
                self.table.remove(id);
                info!(container_id = %id, remote_id, "proxy host removed");
            }
            Err(e) => {
                warn!(container_id = %id, remote_id, error = %e, "failed to delete proxy host, will retry");
                metrics::counter!(m::SYNC_FAILURES_TOTAL, m::LABEL_OPERATION => "delete")
                    .increment(1);
                if let Some(entry) = self.table.get_mut(id) {
                    entry.removing = true;
                    entry.state = SyncState::Failed(e.to_string());
                }
            }
        }
    }

    /// Creates, adopts or updates the remote host for a pending entry.
    async fn apply(&mut self, id: &str) {
        let Some(entry) = self.table.get(id) else {
            return;
        };
        let request = entry.desired.to_request();
        let known_remote = entry.remote_id;

        let target = match known_remote {
            Some(remote_id) => Ok(Some(remote_id)),
            None => self.adoption_target(id, &request.domains).await,
        };

        let attempted = target.as_ref().ok().copied().flatten();
        let (operation, result) = match target {
            Ok(Some(remote_id)) => (
                "update",
                self.api
                    .update_proxy_host(remote_id, &request)
                    .await
                    .map(|()| remote_id),
            ),
            Ok(None) => ("create", self.api.create_proxy_host(&request).await),
            Err(e) => ("list", Err(e)),
        };

        let Some(entry) = self.table.get_mut(id) else {
            return;
        };
        match result {
            Ok(remote_id) => {
                if operation == "create" {
                    metrics::counter!(m::SYNC_PROXY_HOSTS_CREATED_TOTAL).increment(1);
                } else {
                    metrics::counter!(m::SYNC_PROXY_HOSTS_UPDATED_TOTAL).increment(1);
                }
                entry.remote_id = Some(remote_id);
                entry.state = SyncState::Synced;
                info!(
                    container_id = %id,
                    remote_id,
                    operation,
                    domains = ?entry.desired.domains,
                    upstream = %entry.desired.upstream,
                    "proxy host in sync"
                );
                let domains = entry.desired.domains.clone();
                self.remember_remote(remote_id, domains);
            }
            Err(e) => {
                warn!(container_id = %id, operation, error = %e, "failed to sync proxy host, will retry");
                metrics::counter!(m::SYNC_FAILURES_TOTAL, m::LABEL_OPERATION => operation)
                    .increment(1);
                entry.state = SyncState::Failed(e.to_string());

                if operation == "update" && e.status() == Some(404) {
                    // the host vanished remotely; create a fresh one next time
                    entry.remote_id = None;
                    if let Some(stale) = attempted {
                        self.forget_remote(stale);
                    }
                } else if operation == "create" {
                    // a host may have appeared since the index was loaded
                    self.remote_index = None;
                }
            }
        }
    }

    /// Finds an existing remote host sharing a domain with `domains` that no
    /// other entry holds.
    async fn adoption_target(
        &mut self,
        id: &str,
        domains: &[String],
    ) -> Result<Option<RemoteId>, NpmError> {
        if self.remote_index.is_none() {
            let hosts = self.api.list_proxy_hosts().await?;
            debug!(count = hosts.len(), "loaded remote proxy host index");
            self.remote_index = Some(hosts);
        }

        let held: HashSet<RemoteId> = self
            .table
            .iter()
            .filter(|(other, _)| other.as_str() != id)
            .filter_map(|(_, e)| e.remote_id)
            .collect();

        let target = self.remote_index.as_deref().and_then(|hosts| {
            hosts
                .iter()
                .filter(|h| !held.contains(&h.id))
                .find(|h| h.domains.iter().any(|d| domains.contains(&d.to_ascii_lowercase())))
                .map(|h| (h.id, h.managed))
        });

        if let Some((remote_id, managed)) = target {
            info!(container_id = %id, remote_id, previously_managed = managed, "adopting existing proxy host");
        }
        Ok(target.map(|(remote_id, _)| remote_id))
    }

    fn remember_remote(&mut self, id: RemoteId, domains: Vec<String>) {
        if let Some(index) = self.remote_index.as_mut() {
            match index.iter_mut().find(|h| h.id == id) {
                Some(host) => {
                    host.domains = domains;
                    host.managed = true;
                }
                None => index.push(RemoteProxyHost {
                    id,
                    domains,
                    managed: true,
                }),
            }
        }
    }

    fn forget_remote(&mut self, id: RemoteId) {
        if let Some(index) = self.remote_index.as_mut() {
            index.retain(|h| h.id != id);
        }
    }

    fn publish(&self) {
        let containers = self.table.values().map(ManagedContainer::status).collect();
        let snapshot = StatusSnapshot::new(containers);
        metrics::gauge!(m::SYNC_MANAGED_CONTAINERS).set(snapshot.managed as f64);
        self.status_tx.send_replace(Arc::new(snapshot));
    }
}

/// Order-insensitive, case-insensitive domain set key.
fn domain_set(domains: &[String]) -> Vec<String> {
    let mut set: Vec<String> = domains.iter().map(|d| d.to_ascii_lowercase()).collect();
    set.sort();
    set.dedup();
    set
}
