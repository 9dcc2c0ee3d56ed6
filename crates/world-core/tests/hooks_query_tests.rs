use std::time::Duration;

use serde_json::json;
use tokio_test::assert_ok;
use world_core::{EntityKind, HookFutures, IndexKey, IndexRef, Storage, StoreError};
use world_domain::{CreateEventRequest, CreateHookRequest, CreateStepRequest, CreateWorkflowRunRequest, ListHooksParams,
                   ResolveData};

async fn new_run(storage: &Storage) -> String {
    storage.create_run(CreateWorkflowRunRequest::new("approval", "dpl_local", vec![]))
           .await
           .unwrap()
           .run_id
}

#[tokio::test]
async fn test_hook_lookup_by_token_and_id() {
    let storage = Storage::new();
    let run_id = new_run(&storage).await;
    let hook = storage.create_hook(&run_id,
                                   CreateHookRequest::new("hook_1").with_token("tok-approve")
                                                                   .with_metadata(json!({"user": "ana"})))
                      .await
                      .unwrap();

    let by_token = storage.get_hook_by_token("tok-approve", ResolveData::All).await.unwrap();
    assert_eq!(by_token, hook);
    let by_id = storage.get_hook_by_id("hook_1", ResolveData::None).await.unwrap();
    assert_eq!(by_id.run_id, run_id);
    assert!(by_id.metadata.is_none());
}

#[tokio::test]
async fn test_disposed_hook_is_not_found_by_token() {
    let storage = Storage::new();
    let run_id = new_run(&storage).await;
    storage.create_hook(&run_id, CreateHookRequest::new("hook_1").with_token("tok-1"))
           .await
           .unwrap();
    assert_ok!(storage.get_hook_by_token("tok-1", ResolveData::All).await);

    storage.dispose_hook(&run_id, "hook_1").await.unwrap();

    let err = storage.get_hook_by_token("tok-1", ResolveData::All).await.unwrap_err();
    assert_eq!(err, StoreError::not_found(EntityKind::Hook, "tok-1"));
    assert!(storage.get_hook_by_id("hook_1", ResolveData::All).await.unwrap_err().is_not_found());
    // las entradas se borran por completo, no se marcan
    assert!(storage.index().get(&IndexKey::Token("tok-1".into())).await.unwrap().is_empty());
    assert!(storage.index().get(&IndexKey::HookId("hook_1".into())).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_and_dangling_references_are_not_found() {
    let storage = Storage::new();
    assert!(storage.get_hook_by_token("never", ResolveData::All).await.unwrap_err().is_not_found());

    storage.index()
           .append(&IndexKey::Token("ghost".into()), IndexRef::hook("wfrun_gone", "hook_x"))
           .await
           .unwrap();
    let err = storage.get_hook_by_token("ghost", ResolveData::All).await.unwrap_err();
    assert_eq!(err.code(), 404);
}

#[tokio::test]
async fn test_list_hooks_requires_run_id() {
    let storage = Storage::new();
    let run_id = new_run(&storage).await;
    for id in ["h1", "h2", "h3"] {
        storage.create_hook(&run_id, CreateHookRequest::new(id)).await.unwrap();
    }
    storage.dispose_hook(&run_id, "h2").await.unwrap();

    let hooks = storage.list_hooks(ListHooksParams { run_id: Some(run_id.clone()),
                                                     resolve_data: ResolveData::All })
                       .await
                       .unwrap();
    let ids: Vec<&str> = hooks.iter().map(|h| h.hook_id.as_str()).collect();
    assert_eq!(ids, vec!["h1", "h3"]);

    let err = storage.list_hooks(ListHooksParams::default()).await.unwrap_err();
    assert_eq!(err.code(), 501);
}

#[tokio::test]
async fn test_duplicate_hook_id_in_run_fails() {
    let storage = Storage::new();
    let run_id = new_run(&storage).await;
    storage.create_hook(&run_id, CreateHookRequest::new("h1")).await.unwrap();
    let err = storage.create_hook(&run_id, CreateHookRequest::new("h1")).await.unwrap_err();
    assert!(err.is_already_exists());
}

#[tokio::test]
async fn test_events_by_correlation_across_runs() {
    let storage = Storage::new();
    let run_a = new_run(&storage).await;
    let run_b = new_run(&storage).await;

    for run_id in [&run_a, &run_b, &run_a] {
        storage.create_event(run_id, CreateEventRequest::new("hook_received").correlated("corr-1"), ResolveData::All)
               .await
               .unwrap();
    }
    storage.create_event(&run_a, CreateEventRequest::new("unrelated").correlated("corr-2"), ResolveData::All)
           .await
           .unwrap();
    storage.create_event(&run_b, CreateEventRequest::new("plain"), ResolveData::All)
           .await
           .unwrap();

    let events = storage.list_events_by_correlation_id("corr-1", ResolveData::All)
                        .await
                        .unwrap();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.correlation_id.as_deref() == Some("corr-1")));
    // un grupo por run, sin duplicados aunque el índice repita el run
    assert_eq!(events[0].run_id, run_a);
    assert_eq!(events[1].run_id, run_a);
    assert_eq!(events[2].run_id, run_b);

    assert!(storage.list_events_by_correlation_id("corr-none", ResolveData::All)
                   .await
                   .unwrap()
                   .is_empty());
}

#[tokio::test]
async fn test_rebuild_restores_index_from_entities() {
    let storage = Storage::new();
    let run_id = new_run(&storage).await;
    storage.create_hook(&run_id, CreateHookRequest::new("h1").with_token("tok-r"))
           .await
           .unwrap();
    storage.create_event(&run_id, CreateEventRequest::new("e").correlated("corr-r"), ResolveData::All)
           .await
           .unwrap();

    // índice corrompido: clave perdida y clave huérfana
    storage.index().clear(&IndexKey::Token("tok-r".into())).await.unwrap();
    storage.index()
           .append(&IndexKey::Correlation("orphan".into()), IndexRef::run("wfrun_x"))
           .await
           .unwrap();
    assert!(storage.get_hook_by_token("tok-r", ResolveData::All).await.is_err());

    let keys = storage.rebuild_indexes().await.unwrap();
    assert_eq!(keys, 3);
    assert_ok!(storage.get_hook_by_token("tok-r", ResolveData::All).await);
    assert!(storage.index()
                   .get(&IndexKey::Correlation("orphan".into()))
                   .await
                   .unwrap()
                   .is_empty());
    assert_eq!(storage.list_events_by_correlation_id("corr-r", ResolveData::All)
                      .await
                      .unwrap()
                      .len(),
               1);
}

#[tokio::test]
async fn test_subscribe_before_resolve_receives_value() {
    let futures = HookFutures::new();
    let waiter = futures.subscribe("tok", Some(json!({"runId": "wfrun_a"}))).await.unwrap();
    let handle = tokio::spawn(waiter.wait());

    let resolution = futures.resolve("tok", json!("approved")).await.unwrap();
    assert!(resolution.first);
    assert_eq!(resolution.metadata, Some(json!({"runId": "wfrun_a"})));
    assert_eq!(handle.await.unwrap(), Ok(json!("approved")));
}

#[tokio::test]
async fn test_late_subscriber_gets_value_immediately() {
    let futures = HookFutures::new();
    futures.resolve("tok", json!(7)).await.unwrap();
    let mut waiter = futures.subscribe("tok", None).await.unwrap();
    assert_eq!(waiter.try_take(), Some(Ok(json!(7))));
}

#[tokio::test]
async fn test_first_resolve_wins() {
    let futures = HookFutures::new();
    let w1 = futures.subscribe("tok", Some(json!("m1"))).await.unwrap();
    let w2 = futures.subscribe("tok", Some(json!("m2"))).await.unwrap();
    assert!(futures.resolve("tok", json!("first")).await.unwrap().first);
    let second = futures.resolve("tok", json!("second")).await.unwrap();

    // el segundo resolve no gana y ve el valor vigente
    assert!(!second.first);
    assert_eq!(second.value, json!("first"));
    // la metadata se fija en la primera suscripción
    assert_eq!(second.metadata, Some(json!("m1")));
    assert_eq!(w1.wait().await, Ok(json!("first")));
    assert_eq!(w2.wait().await, Ok(json!("first")));
    let late = futures.subscribe("tok", None).await.unwrap();
    assert_eq!(late.wait().await, Ok(json!("first")));

    let snapshot = futures.snapshot("tok").await.unwrap();
    assert_eq!(snapshot.result, Some(json!("first")));
    assert_eq!(snapshot.pending, 0);
}

#[tokio::test]
async fn test_dispose_fails_pending_waiters() {
    let futures = HookFutures::new();
    let waiter = futures.subscribe("tok", None).await.unwrap();
    futures.dispose("tok").await.unwrap();

    let res = tokio::time::timeout(Duration::from_secs(1), waiter.wait()).await.unwrap();
    assert_eq!(res, Err(StoreError::HookDisposed("tok".into())));

    let snapshot = futures.snapshot("tok").await.unwrap();
    assert!(snapshot.result.is_none());
    assert!(snapshot.metadata.is_none());
}

#[tokio::test]
async fn test_dispose_hook_record_also_disposes_future() {
    let storage = Storage::new();
    let run_id = new_run(&storage).await;
    storage.create_hook(&run_id, CreateHookRequest::new("h1").with_token("tok-d"))
           .await
           .unwrap();
    let waiter = storage.futures().subscribe("tok-d", None).await.unwrap();

    storage.dispose_hook(&run_id, "h1").await.unwrap();

    let res = tokio::time::timeout(Duration::from_secs(1), waiter.wait()).await.unwrap();
    assert!(matches!(res, Err(StoreError::HookDisposed(_))));
}

#[tokio::test]
async fn test_dispose_keeps_other_runs_hook_with_same_id_and_token() {
    let storage = Storage::new();
    let run_a = new_run(&storage).await;
    let run_b = new_run(&storage).await;
    for run_id in [&run_a, &run_b] {
        storage.create_hook(run_id, CreateHookRequest::new("h1").with_token("tok"))
               .await
               .unwrap();
    }
    let waiter = storage.futures().subscribe("tok", None).await.unwrap();

    storage.dispose_hook(&run_b, "h1").await.unwrap();

    assert_eq!(storage.get_hook_by_id("h1", ResolveData::All).await.unwrap().run_id, run_a);
    assert_eq!(storage.get_hook_by_token("tok", ResolveData::All).await.unwrap().run_id, run_a);
    assert_eq!(storage.index().get(&IndexKey::Token("tok".into())).await.unwrap(),
               vec![IndexRef::hook(&run_a, "h1")]);
    // el future sigue vivo mientras el hook de A lo referencie
    assert_eq!(storage.futures().snapshot("tok").await.unwrap().pending, 1);

    storage.dispose_hook(&run_a, "h1").await.unwrap();
    let res = tokio::time::timeout(Duration::from_secs(1), waiter.wait()).await.unwrap();
    assert_eq!(res, Err(StoreError::HookDisposed("tok".into())));
    assert!(storage.get_hook_by_token("tok", ResolveData::All).await.unwrap_err().is_not_found());
    assert!(storage.get_hook_by_id("h1", ResolveData::All).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_dispose_keeps_other_runs_hook_with_same_id() {
    let storage = Storage::new();
    let run_a = new_run(&storage).await;
    let run_b = new_run(&storage).await;
    storage.create_hook(&run_a, CreateHookRequest::new("h1").with_token("tok-a"))
           .await
           .unwrap();
    storage.create_hook(&run_b, CreateHookRequest::new("h1").with_token("tok-b"))
           .await
           .unwrap();

    storage.dispose_hook(&run_a, "h1").await.unwrap();

    assert_eq!(storage.get_hook_by_id("h1", ResolveData::All).await.unwrap().run_id, run_b);
    assert!(storage.get_hook_by_token("tok-a", ResolveData::All).await.unwrap_err().is_not_found());
    assert_ok!(storage.get_hook_by_token("tok-b", ResolveData::All).await);
}

#[tokio::test]
async fn test_lookups_of_unknown_ids_open_no_partitions() {
    let storage = Storage::new();
    for i in 0..1000 {
        let run_id = format!("wfrun_missing_{i}");
        assert!(storage.get_run(&run_id, ResolveData::All).await.unwrap_err().is_not_found());
        assert!(storage.get_hook_by_token(&format!("tok_{i}"), ResolveData::All)
                       .await
                       .unwrap_err()
                       .is_not_found());
    }
    let err = storage.create_step("wfrun_missing_0", CreateStepRequest::new("s1", "step//a.ts//f", vec![]))
                     .await
                     .unwrap_err();
    assert_eq!(err, StoreError::not_found(EntityKind::Run, "wfrun_missing_0"));
    assert!(storage.futures().snapshot("tok_0").await.unwrap().result.is_none());

    assert!(storage.entities().run_ids().is_empty());
    assert!(storage.index().keys().is_empty());
    assert!(storage.futures().keys().is_empty());
    assert_eq!(storage.rebuild_indexes().await.unwrap(), 0);
}
