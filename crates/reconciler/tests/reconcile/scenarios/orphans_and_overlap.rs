//! Startup orphan cleanup, adoption and overlapping domain claims.

use std::collections::HashSet;

use labelsync_docker::ContainerEvent;
use labelsync_npm::NpmError;
use labelsync_reconciler::SyncState;

use crate::helpers::containers::{container_a, engine, engine_with, labelled};
use crate::helpers::mock_api::{Call, MockProxyApi};

fn running(ids: &[&str]) -> ContainerEvent {
    ContainerEvent::EnumerationComplete {
        running: ids.iter().map(|id| (*id).to_owned()).collect::<HashSet<_>>(),
    }
}

#[tokio::test]
async fn startup_removes_managed_orphans_only() {
    let api = MockProxyApi::new();
    let orphan = api.seed(&["old.test"], true);
    let manual = api.seed(&["manual.test"], false);
    let (mut engine, _status, api) = engine_with(api);

    engine.handle(running(&[])).await;

    assert_eq!(api.deletes(), vec![orphan]);
    let remaining: Vec<_> = api.hosts().into_iter().map(|h| h.id).collect();
    assert_eq!(remaining, vec![manual]);
}

#[tokio::test]
async fn startup_keeps_hosts_matching_running_containers() {
    let api = MockProxyApi::new();
    let existing = api.seed(&["app.test"], true);
    let stale = api.seed(&["gone.test"], true);
    let (mut engine, _status, api) = engine_with(api);

    engine.handle(ContainerEvent::Seen(container_a())).await;
    engine.handle(running(&["aaaa"])).await;

    // adopted rather than duplicated
    assert!(api.creates().is_empty());
    assert_eq!(engine.entry("aaaa").unwrap().remote_id, Some(existing));
    assert_eq!(api.deletes(), vec![stale]);
}

#[tokio::test]
async fn unmanaged_overlapping_host_is_adopted() {
    let api = MockProxyApi::new();
    let manual = api.seed(&["app.test"], false);
    let (mut engine, _status, api) = engine_with(api);

    engine.handle(ContainerEvent::Seen(container_a())).await;

    let writes = api.writes();
    assert_eq!(writes.len(), 1);
    assert!(matches!(&writes[0], Call::Update(id, _) if *id == manual));
    let host = api.hosts().into_iter().find(|h| h.id == manual).unwrap();
    assert!(host.managed);
}

#[tokio::test]
async fn orphan_domain_comparison_ignores_order() {
    let api = MockProxyApi::new();
    let kept = api.seed(&["www.x.test", "x.test"], true);
    // the lazy index load fails, so the container is not linked to the host
    api.fail("list", 1, NpmError::Transport("timeout".to_owned()));
    let (mut engine, _status, api) = engine_with(api);

    engine
        .handle(ContainerEvent::Seen(labelled("xxxx", "x.test,www.x.test")))
        .await;
    assert!(engine.entry("xxxx").unwrap().remote_id.is_none());

    engine.handle(running(&["xxxx"])).await;

    assert!(api.deletes().is_empty());
    assert!(api.hosts().iter().any(|h| h.id == kept));
}

#[tokio::test]
async fn failed_listing_skips_cleanup() {
    let api = MockProxyApi::new();
    api.seed(&["old.test"], true);
    api.fail("list", 1, NpmError::Transport("timeout".to_owned()));
    let (mut engine, _status, api) = engine_with(api);

    engine.handle(running(&[])).await;

    assert!(api.deletes().is_empty());
    assert_eq!(api.hosts().len(), 1);
}

#[tokio::test]
async fn later_claim_displaces_earlier_container() {
    let (mut engine, _status, api) = engine();

    engine
        .handle(ContainerEvent::Seen(labelled("1111", "app.test")))
        .await;
    let first_remote = engine.entry("1111").unwrap().remote_id.unwrap();

    engine
        .handle(ContainerEvent::Seen(labelled("2222", "www.test,app.test")))
        .await;

    assert_eq!(api.deletes(), vec![first_remote]);
    assert!(engine.entry("1111").is_none());
    let second = engine.entry("2222").unwrap();
    assert!(second.remote_id.is_some());
    assert_ne!(second.remote_id, Some(first_remote));
    assert_eq!(api.creates().len(), 2);
}

#[tokio::test]
async fn displaced_entry_with_failed_delete_is_retried() {
    let (mut engine, _status, api) = engine();

    engine
        .handle(ContainerEvent::Seen(labelled("1111", "app.test")))
        .await;
    api.fail("delete", 1, NpmError::Transport("connection reset".to_owned()));

    engine
        .handle(ContainerEvent::Seen(labelled("2222", "app.test")))
        .await;
    assert!(engine.entry("1111").unwrap().removing);

    engine.retry_failed().await;
    assert!(engine.entry("1111").is_none());
    assert!(engine.entry("2222").unwrap().remote_id.is_some());
}

#[tokio::test]
async fn host_created_by_hand_after_startup_is_adopted_on_retry() {
    let (mut engine, _status, api) = engine();
    api.reject_duplicate_domains();

    // 빈 원격 목록으로 인덱스 로드
    engine.handle(running(&[])).await;

    let manual = api.seed(&["app.test"], false);
    engine.handle(ContainerEvent::Seen(container_a())).await;
    assert!(matches!(
        engine.entry("aaaa").unwrap().state,
        SyncState::Failed(_)
    ));
    assert_eq!(api.creates().len(), 1);

    engine.retry_failed().await;

    let entry = engine.entry("aaaa").unwrap();
    assert_eq!(entry.state, SyncState::Synced);
    assert_eq!(entry.remote_id, Some(manual));
    assert_eq!(api.creates().len(), 1);
    assert!(matches!(api.writes().last(), Some(Call::Update(id, _)) if *id == manual));
}
