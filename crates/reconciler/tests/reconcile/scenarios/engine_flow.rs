//! Create, update, remove and retry behaviour of the engine.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use labelsync_docker::ContainerEvent;
use labelsync_npm::NpmError;
use labelsync_reconciler::{SyncPhase, SyncState};

use crate::helpers::containers::{container, container_a, container_b, engine, labelled};
use crate::helpers::mock_api::Call;

fn removed(id: &str) -> ContainerEvent {
    ContainerEvent::Removed {
        container_id: id.to_owned(),
    }
}

#[tokio::test]
async fn host_mapped_container_creates_one_proxy_host() {
    let (mut engine, status, api) = engine();

    engine.handle(ContainerEvent::Seen(container_a())).await;

    let creates = api.creates();
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].domains, vec!["app.test"]);
    assert_eq!(creates[0].upstream.host, "172.17.0.1");
    assert_eq!(creates[0].upstream.port, 8089);
    assert!(!creates[0].ssl);

    let entry = engine.entry("aaaa").unwrap();
    assert_eq!(entry.state, SyncState::Synced);
    assert!(entry.remote_id.is_some());

    let snapshot = status.current();
    assert_eq!(snapshot.managed, 1);
    assert_eq!(snapshot.containers[0].upstream, "http://172.17.0.1:8089");
    assert_eq!(snapshot.containers[0].state, SyncPhase::Synced);
}

#[tokio::test]
async fn unmapped_container_uses_container_ip() {
    let (mut engine, _status, api) = engine();

    engine.handle(ContainerEvent::Seen(container_b())).await;

    let creates = api.creates();
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].upstream.to_string(), "http://172.18.0.5:9000");
}

#[tokio::test]
async fn unchanged_labels_issue_a_single_write() {
    let (mut engine, _status, api) = engine();

    engine.handle(ContainerEvent::Seen(container_a())).await;
    engine.handle(ContainerEvent::Seen(container_a())).await;

    assert_eq!(api.writes().len(), 1);
}

#[tokio::test]
async fn changed_labels_update_the_same_remote_host() {
    let (mut engine, _status, api) = engine();

    engine.handle(ContainerEvent::Seen(container_a())).await;
    let remote_id = engine.entry("aaaa").unwrap().remote_id.unwrap();

    let mut changed = container_a();
    changed
        .labels
        .insert("npm.proxy.host".to_owned(), "app.test,www.app.test".to_owned());
    engine.handle(ContainerEvent::Seen(changed)).await;

    let writes = api.writes();
    assert_eq!(writes.len(), 2);
    match &writes[1] {
        Call::Update(id, req) => {
            assert_eq!(*id, remote_id);
            assert_eq!(req.domains, vec!["app.test", "www.app.test"]);
        }
        other => panic!("expected update, got {other:?}"),
    }
}

#[tokio::test]
async fn unlabelled_containers_are_ignored() {
    let (mut engine, status, api) = engine();

    engine
        .handle(ContainerEvent::Seen(container("cccc", &[("com.example", "x")])))
        .await;
    engine.handle(removed("cccc")).await;

    assert!(api.calls().is_empty());
    assert_eq!(status.current().managed, 0);
}

#[tokio::test]
async fn invalid_labels_are_skipped() {
    let (mut engine, _status, api) = engine();

    engine
        .handle(ContainerEvent::Seen(labelled("cccc", "a.test,,b.test")))
        .await;

    assert!(api.calls().is_empty());
    assert_eq!(engine.managed_count(), 0);
}

#[tokio::test]
async fn removal_deletes_exactly_once() {
    let (mut engine, status, api) = engine();

    engine.handle(ContainerEvent::Seen(container_a())).await;
    let remote_id = engine.entry("aaaa").unwrap().remote_id.unwrap();

    // stop, die and destroy all arrive for one container
    for _ in 0..3 {
        engine.handle(removed("aaaa")).await;
    }

    assert_eq!(api.deletes(), vec![remote_id]);
    assert!(engine.entry("aaaa").is_none());
    assert_eq!(status.current().managed, 0);
}

#[tokio::test]
async fn label_withdrawal_removes_proxy_host() {
    let (mut engine, _status, api) = engine();

    engine.handle(ContainerEvent::Seen(container_a())).await;
    let remote_id = engine.entry("aaaa").unwrap().remote_id.unwrap();

    let mut unlabelled = container_a();
    unlabelled.labels.remove("npm.proxy.host");
    engine.handle(ContainerEvent::Seen(unlabelled)).await;

    assert_eq!(api.deletes(), vec![remote_id]);
    assert_eq!(engine.managed_count(), 0);
}

#[tokio::test]
async fn failed_create_is_retried_on_next_pass() {
    let (mut engine, status, api) = engine();
    api.fail(
        "create",
        1,
        NpmError::RemoteApi {
            status: 500,
            body: "internal error".to_owned(),
        },
    );

    engine.handle(ContainerEvent::Seen(container_a())).await;

    let entry = engine.entry("aaaa").unwrap();
    assert!(matches!(entry.state, SyncState::Failed(ref reason) if reason.contains("internal error")));
    let snapshot = status.current();
    assert_eq!(snapshot.containers[0].state, SyncPhase::Failed);
    assert!(snapshot.containers[0].last_error.is_some());

    engine.retry_failed().await;

    assert_eq!(engine.entry("aaaa").unwrap().state, SyncState::Synced);
    assert_eq!(api.creates().len(), 2);
    assert_eq!(api.hosts().len(), 1);
    assert_eq!(status.current().synced, 1);
}

#[tokio::test]
async fn failed_delete_keeps_entry_until_retry() {
    let (mut engine, status, api) = engine();
    engine.handle(ContainerEvent::Seen(container_a())).await;
    let remote_id = engine.entry("aaaa").unwrap().remote_id.unwrap();

    api.fail("delete", 1, NpmError::Transport("connection reset".to_owned()));
    engine.handle(removed("aaaa")).await;

    let entry = engine.entry("aaaa").unwrap();
    assert!(entry.removing);
    assert_eq!(status.current().containers[0].state, SyncPhase::Removing);

    engine.retry_failed().await;

    assert!(engine.entry("aaaa").is_none());
    assert_eq!(api.deletes(), vec![remote_id, remote_id]);
    assert!(api.hosts().is_empty());
}

#[tokio::test]
async fn update_of_vanished_host_recreates_it() {
    let (mut engine, _status, api) = engine();
    engine.handle(ContainerEvent::Seen(container_a())).await;
    let remote_id = engine.entry("aaaa").unwrap().remote_id.unwrap();

    // deleted by hand in the proxy manager
    api.drop_host(remote_id);

    let mut changed = container_a();
    changed
        .labels
        .insert("npm.proxy.port".to_owned(), "8089".to_owned());
    changed
        .labels
        .insert("npm.proxy.scheme".to_owned(), "https".to_owned());
    engine.handle(ContainerEvent::Seen(changed)).await;

    let entry = engine.entry("aaaa").unwrap();
    assert!(matches!(entry.state, SyncState::Failed(_)));
    assert!(entry.remote_id.is_none());

    engine.retry_failed().await;
    let entry = engine.entry("aaaa").unwrap();
    assert_eq!(entry.state, SyncState::Synced);
    assert_ne!(entry.remote_id, Some(remote_id));
}

#[tokio::test]
async fn resync_removes_containers_that_vanished() {
    let (mut engine, _status, api) = engine();
    engine.handle(ContainerEvent::Seen(container_a())).await;
    engine.handle(ContainerEvent::Seen(container_b())).await;
    let a_remote = engine.entry("aaaa").unwrap().remote_id.unwrap();

    engine
        .handle(ContainerEvent::EnumerationComplete {
            running: HashSet::from(["bbbb".to_owned()]),
        })
        .await;

    assert_eq!(api.deletes(), vec![a_remote]);
    assert!(engine.entry("aaaa").is_none());
    assert!(engine.entry("bbbb").is_some());
}

#[tokio::test(start_paused = true)]
async fn retry_tick_is_not_starved_by_busy_event_stream() {
    const BACKLOG: usize = 10_000;

    let (mut engine, status, api) = engine();
    api.fail(
        "create",
        1,
        NpmError::RemoteApi {
            status: 500,
            body: "internal error".to_owned(),
        },
    );
    engine.handle(ContainerEvent::Seen(container_a())).await;
    assert!(matches!(
        engine.entry("aaaa").unwrap().state,
        SyncState::Failed(_)
    ));

    // 관리 대상이 아닌 컨테이너의 제거 이벤트로 채널을 가득 채움
    let (tx, rx) = mpsc::channel(BACKLOG);
    for i in 0..BACKLOG {
        tx.try_send(removed(&format!("noise-{i}"))).unwrap();
    }

    let cancel = CancellationToken::new();
    let task = tokio::spawn(engine.run(rx, cancel.clone()));
    tokio::task::yield_now().await;
    tokio::time::advance(Duration::from_secs(31)).await;

    let mut synced = false;
    for _ in 0..100_000 {
        let snapshot = status.current();
        if snapshot
            .containers
            .iter()
            .any(|c| c.container_id == "aaaa" && c.state == SyncPhase::Synced)
        {
            synced = true;
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(synced, "failed entry was never retried");
    assert!(
        tx.capacity() < BACKLOG,
        "retry only ran after the whole backlog was drained"
    );

    cancel.cancel();
    task.await.unwrap();
}
