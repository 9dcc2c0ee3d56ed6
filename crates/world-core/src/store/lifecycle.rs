//! Reglas de ciclo de vida compartidas por runs y steps.
//!
//! Regla canónica de sellado, aplicada igual en todos los caminos de
//! escritura: `started_at` se fija sólo si está vacío y el nuevo estado es
//! `running`; `completed_at` se fija sólo si está vacío y el nuevo estado es
//! terminal. `updated_at` se refresca siempre.
use chrono::{DateTime, Utc};
use log::warn;
use world_domain::{RunStatus, Step, StepStatus, UpdateStepRequest, UpdateWorkflowRunRequest, WorkflowRun};

use crate::errors::{StoreError, StoreResult};

fn stamp(started_at: &mut Option<DateTime<Utc>>,
         completed_at: &mut Option<DateTime<Utc>>,
         running: bool,
         terminal: bool,
         now: DateTime<Utc>) {
    if running && started_at.is_none() {
        *started_at = Some(now);
    }
    if terminal && completed_at.is_none() {
        *completed_at = Some(now);
    }
}

/// Aplica la máquina de estados de `WorkflowRun`. Repetir el mismo estado
/// siempre es válido (replay); un run terminal no sale de su estado, sólo un
/// run `running` se pausa y ninguno vuelve a `pending`.
pub fn check_run_transition(from: RunStatus, to: RunStatus) -> StoreResult<()> {
    if from == to {
        return Ok(());
    }
    let allowed = !from.is_terminal()
                  && match to {
                      RunStatus::Pending => false,
                      RunStatus::Paused => from == RunStatus::Running,
                      _ => true,
                  };
    if !allowed {
        warn!("[store] rejected transition {from} -> {to}");
        return Err(StoreError::InvalidTransition { from, to });
    }
    Ok(())
}

/// Mezcla el patch sobre el run. No modifica nada si la transición es
/// inválida.
pub fn apply_run_patch(run: &mut WorkflowRun, patch: UpdateWorkflowRunRequest, now: DateTime<Utc>) -> StoreResult<()> {
    if let Some(status) = patch.status {
        check_run_transition(run.status, status)?;
        run.status = status;
        stamp(&mut run.started_at,
              &mut run.completed_at,
              status == RunStatus::Running,
              status.is_terminal(),
              now);
    }
    if let Some(output) = patch.output {
        run.output = Some(output);
    }
    if let Some(error) = patch.error {
        run.error = Some(error);
    }
    if let Some(code) = patch.error_code {
        run.error_code = Some(code);
    }
    if let Some(ctx) = patch.execution_context {
        run.execution_context = Some(ctx);
    }
    run.updated_at = now;
    Ok(())
}

/// Los steps no son pegajosos: un step fallido puede volver a `running` en
/// un reintento (con `attempt` incrementado).
pub fn apply_step_patch(step: &mut Step, patch: UpdateStepRequest, now: DateTime<Utc>) {
    if let Some(status) = patch.status {
        step.status = status;
        stamp(&mut step.started_at,
              &mut step.completed_at,
              status == StepStatus::Running,
              status.is_terminal(),
              now);
    }
    if let Some(output) = patch.output {
        step.output = Some(output);
    }
    if let Some(error) = patch.error {
        step.error = Some(error);
    }
    if let Some(code) = patch.error_code {
        step.error_code = Some(code);
    }
    if let Some(attempt) = patch.attempt {
        step.attempt = attempt;
    }
    step.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use world_domain::{CreateStepRequest, CreateWorkflowRunRequest};

    fn run_at(now: DateTime<Utc>) -> WorkflowRun {
        WorkflowRun::pending("wfrun_t", CreateWorkflowRunRequest::new("wf", "dpl", vec![]), now)
    }

    #[test]
    fn started_at_is_stamped_once() {
        let t0 = Utc::now();
        let mut run = run_at(t0);
        apply_run_patch(&mut run, UpdateWorkflowRunRequest::status(RunStatus::Running), t0).unwrap();
        let t1 = t0 + Duration::seconds(5);
        apply_run_patch(&mut run, UpdateWorkflowRunRequest::status(RunStatus::Running), t1).unwrap();
        assert_eq!(run.started_at, Some(t0));
        assert_eq!(run.updated_at, t1);
        assert!(run.completed_at.is_none());
    }

    #[test]
    fn paused_then_running_keeps_first_start() {
        let t0 = Utc::now();
        let mut run = run_at(t0);
        apply_run_patch(&mut run, UpdateWorkflowRunRequest::status(RunStatus::Running), t0).unwrap();
        apply_run_patch(&mut run, UpdateWorkflowRunRequest::status(RunStatus::Paused), t0 + Duration::seconds(1)).unwrap();
        apply_run_patch(&mut run, UpdateWorkflowRunRequest::status(RunStatus::Running), t0 + Duration::seconds(2)).unwrap();
        assert_eq!(run.started_at, Some(t0));
    }

    #[test]
    fn only_running_runs_can_pause() {
        let t0 = Utc::now();
        let mut run = run_at(t0);
        let err = apply_run_patch(&mut run, UpdateWorkflowRunRequest::status(RunStatus::Paused), t0).unwrap_err();
        assert_eq!(err,
                   StoreError::InvalidTransition { from: RunStatus::Pending,
                                                   to: RunStatus::Paused });
        assert_eq!(run.status, RunStatus::Pending);

        apply_run_patch(&mut run, UpdateWorkflowRunRequest::status(RunStatus::Running), t0).unwrap();
        apply_run_patch(&mut run, UpdateWorkflowRunRequest::status(RunStatus::Paused), t0).unwrap();
        apply_run_patch(&mut run, UpdateWorkflowRunRequest::status(RunStatus::Paused), t0).unwrap();
        assert!(apply_run_patch(&mut run, UpdateWorkflowRunRequest::status(RunStatus::Pending), t0).is_err());
        // cancelar sigue permitido desde pausa
        apply_run_patch(&mut run, UpdateWorkflowRunRequest::status(RunStatus::Cancelled), t0).unwrap();
    }

    #[test]
    fn terminal_is_sticky_but_replay_is_accepted() {
        let t0 = Utc::now();
        let mut run = run_at(t0);
        apply_run_patch(&mut run,
                        UpdateWorkflowRunRequest::status(RunStatus::Completed).with_output(json!(1)),
                        t0).unwrap();
        let t1 = t0 + Duration::seconds(3);
        apply_run_patch(&mut run, UpdateWorkflowRunRequest::status(RunStatus::Completed), t1).unwrap();
        assert_eq!(run.completed_at, Some(t0));

        let err = apply_run_patch(&mut run, UpdateWorkflowRunRequest::status(RunStatus::Running), t1).unwrap_err();
        assert_eq!(err.code(), 409);
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.started_at.is_none());
    }

    #[test]
    fn step_retry_after_failure_is_allowed() {
        let t0 = Utc::now();
        let mut step = Step::pending("wfrun_t", CreateStepRequest::new("s1", "step//a//b", vec![]), t0);
        apply_step_patch(&mut step, UpdateStepRequest::status(StepStatus::Failed).with_error("boom"), t0);
        apply_step_patch(&mut step, UpdateStepRequest::status(StepStatus::Running).with_attempt(2), t0);
        assert_eq!(step.status, StepStatus::Running);
        assert_eq!(step.attempt, 2);
        assert_eq!(step.completed_at, Some(t0));
    }
}
