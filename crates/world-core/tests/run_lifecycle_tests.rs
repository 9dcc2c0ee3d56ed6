use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use world_core::{EntityKind, Storage, StoreError};
use world_domain::{CreateWorkflowRunRequest, ListParams, ResolveData, RunStatus, UpdateWorkflowRunRequest};

fn signup() -> CreateWorkflowRunRequest {
    CreateWorkflowRunRequest::new("userSignup", "dpl_local", vec![json!({"email": "ana@example.com"})])
}

#[tokio::test]
async fn test_create_then_get_is_pending_without_stamps() {
    let storage = Storage::new();
    let created = storage.create_run(signup()).await.unwrap();
    assert!(created.run_id.starts_with("wfrun_"));

    let run = storage.get_run(&created.run_id, ResolveData::All).await.unwrap();
    assert_eq!(run.status, RunStatus::Pending);
    assert!(run.started_at.is_none());
    assert!(run.completed_at.is_none());
    assert_eq!(run.input, vec![json!({"email": "ana@example.com"})]);
}

#[tokio::test]
async fn test_create_on_occupied_id_fails() {
    let storage = Storage::new();
    let entities = storage.entities();
    assert_ok!(entities.create_run("wfrun_fixed", signup()).await);
    let err = entities.create_run("wfrun_fixed", signup()).await.unwrap_err();
    assert!(err.is_already_exists());
    assert_eq!(err.code(), 409);
}

#[tokio::test]
async fn test_missing_run_is_not_found() {
    let storage = Storage::new();
    let err = storage.get_run("wfrun_nope", ResolveData::All).await.unwrap_err();
    assert_eq!(err, StoreError::not_found(EntityKind::Run, "wfrun_nope"));
    assert_err!(storage.update_run("wfrun_nope", UpdateWorkflowRunRequest::status(RunStatus::Running))
                       .await);
}

#[tokio::test]
async fn test_running_twice_stamps_started_at_once() {
    let storage = Storage::new();
    let run = storage.create_run(signup()).await.unwrap();
    let first = storage.update_run(&run.run_id, UpdateWorkflowRunRequest::status(RunStatus::Running))
                       .await
                       .unwrap();
    let second = storage.update_run(&run.run_id, UpdateWorkflowRunRequest::status(RunStatus::Running))
                        .await
                        .unwrap();
    assert!(first.started_at.is_some());
    assert_eq!(first.started_at, second.started_at);
    assert!(second.updated_at >= first.updated_at);
}

#[tokio::test]
async fn test_terminal_stamp_is_set_once_and_run_is_sticky() {
    let storage = Storage::new();
    let run = storage.create_run(signup()).await.unwrap();
    storage.update_run(&run.run_id, UpdateWorkflowRunRequest::status(RunStatus::Running))
           .await
           .unwrap();
    let done = storage.update_run(&run.run_id,
                                  UpdateWorkflowRunRequest::status(RunStatus::Completed).with_output(json!({"ok": true})))
                      .await
                      .unwrap();
    let again = storage.update_run(&run.run_id, UpdateWorkflowRunRequest::status(RunStatus::Completed))
                       .await
                       .unwrap();
    assert!(done.completed_at.is_some());
    assert_eq!(done.completed_at, again.completed_at);
    assert_eq!(again.output, Some(json!({"ok": true})));

    let err = storage.cancel_run(&run.run_id).await.unwrap_err();
    assert!(matches!(err,
                     StoreError::InvalidTransition { from: RunStatus::Completed,
                                                     to: RunStatus::Cancelled }));
}

#[tokio::test]
async fn test_pause_resume_cancel() {
    let storage = Storage::new();
    let run = storage.create_run(signup()).await.unwrap();

    // resume sobre un run nunca arrancado sella started_at
    let resumed = storage.resume_run(&run.run_id).await.unwrap();
    assert_eq!(resumed.status, RunStatus::Running);
    let started = resumed.started_at;
    assert!(started.is_some());

    let paused = storage.pause_run(&run.run_id).await.unwrap();
    assert_eq!(paused.status, RunStatus::Paused);
    assert!(paused.completed_at.is_none());

    let resumed = storage.resume_run(&run.run_id).await.unwrap();
    assert_eq!(resumed.started_at, started);

    let cancelled = storage.cancel_run(&run.run_id).await.unwrap();
    assert_eq!(cancelled.status, RunStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());
}

#[tokio::test]
async fn test_pause_before_start_is_rejected() {
    let storage = Storage::new();
    let run = storage.create_run(signup()).await.unwrap();
    let err = storage.pause_run(&run.run_id).await.unwrap_err();
    assert_eq!(err.code(), 409);
    let current = storage.get_run(&run.run_id, ResolveData::All).await.unwrap();
    assert_eq!(current.status, RunStatus::Pending);
}

#[tokio::test]
async fn test_failed_run_keeps_error_and_code() {
    let storage = Storage::new();
    let run = storage.create_run(signup()).await.unwrap();
    let failed = storage.update_run(&run.run_id,
                                    UpdateWorkflowRunRequest::status(RunStatus::Failed).with_error("boom",
                                                                                                   Some("E_STEP".into())))
                        .await
                        .unwrap();
    assert_eq!(failed.error.as_deref(), Some("boom"));
    assert_eq!(failed.error_code.as_deref(), Some("E_STEP"));
    assert!(failed.completed_at.is_some());
    assert!(failed.started_at.is_none());
}

#[tokio::test]
async fn test_resolve_data_none_is_subset_of_all() {
    let storage = Storage::new();
    let run = storage.create_run(signup()).await.unwrap();
    storage.update_run(&run.run_id,
                       UpdateWorkflowRunRequest::status(RunStatus::Running).with_output(json!("partial")))
           .await
           .unwrap();

    let light = storage.get_run(&run.run_id, ResolveData::None).await.unwrap();
    let full = storage.get_run(&run.run_id, ResolveData::All).await.unwrap();
    assert!(light.input.is_empty());
    assert!(light.output.is_none());
    assert_eq!(light.status, full.status);
    assert_eq!(light.started_at, full.started_at);
    assert_eq!(light.updated_at, full.updated_at);
    assert_eq!(full.output, Some(json!("partial")));
}

#[tokio::test]
async fn test_list_runs_fails_loudly() {
    let storage = Storage::new();
    storage.create_run(signup()).await.unwrap();
    let err = storage.list_runs(ListParams::default()).await.unwrap_err();
    assert_eq!(err.kind(), "unimplemented");
}
