//! Demo de extremo a extremo: un run de registro de usuario con dos steps,
//! un hook resuelto desde fuera y un mensaje entregado en proceso.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use workflow_world::{AppConfig, QueueOptions, World, WorldError, WorldResult};
use world_core::StepRegistry;
use world_delivery::{HandlerResult, MessageHandler, MessageMetadata, QueueHandler, STEP_QUEUE_PREFIX};
use world_domain::{CreateHookRequest, CreateWorkflowRunRequest, ListParams, ResolveData, RunStatus,
                   UpdateWorkflowRunRequest};

const CREATE_USER: &str = "step//src/workflows/user-signup.ts//createUser";
const SEND_WELCOME: &str = "step//src/workflows/user-signup.ts//sendWelcomeEmail";

/// Receptor en proceso: reenvía cada mensaje recibido por un canal.
struct Inbox {
    tx: mpsc::UnboundedSender<(Value, MessageMetadata)>,
}

#[async_trait]
impl MessageHandler for Inbox {
    async fn handle(&self, message: Value, meta: MessageMetadata) -> HandlerResult {
        let _ = self.tx.send((message, meta));
        Ok(None)
    }
}

fn registry() -> StepRegistry {
    StepRegistry::builder().register_fn(CREATE_USER, |input: Vec<Value>| async move {
                               let email = input.first()
                                                .and_then(|v| v.get("email"))
                                                .and_then(Value::as_str)
                                                .unwrap_or_default()
                                                .to_string();
                               if email.is_empty() {
                                   return Err("email is required".to_string());
                               }
                               Ok(json!({"userId": "usr_1", "email": email}))
                           })
                           .register_fn(SEND_WELCOME, |_input: Vec<Value>| async move { Ok(json!({"sent": true})) })
                           .build()
}

#[tokio::main]
async fn main() -> WorldResult<()> {
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                                                                                               "workflow_world=info,world_core=info,world_delivery=info".into()
                                                                                           }))
                                  .with(tracing_subscriber::fmt::layer())
                                  .init();

    let config = AppConfig::from_env()?;
    let (tx, mut inbox) = mpsc::unbounded_channel();
    let handler = QueueHandler::new(STEP_QUEUE_PREFIX, Arc::new(Inbox { tx }));
    let world = World::with_transport(config, registry(), Arc::new(handler));
    info!("health: {:?}", world.health());

    let storage = world.storage();
    let run = storage.create_run(CreateWorkflowRunRequest::new("userSignup",
                                                               "dpl_demo",
                                                               vec![json!({"email": "ana@example.com"})]))
                     .await?;
    storage.resume_run(&run.run_id).await?;
    println!("Run creado: {} ({})", run.run_id, run.workflow_name);

    let input = run.input.clone();
    let user = world.run_step(&run.run_id, "s1", CREATE_USER, input.clone()).await?;
    // replay: el segundo intento reutiliza el step completado
    let replay = world.run_step(&run.run_id, "s1", CREATE_USER, input).await?;
    println!("Step createUser: {:?} (replay reutilizado: {})",
             user.output,
             user.completed_at == replay.completed_at);

    let (hook, waiter) = world.create_hook_future(&run.run_id, CreateHookRequest::new("hook_confirm"))
                              .await?;
    let token = hook.token.clone().unwrap_or_default();
    let approved = tokio::spawn(waiter.wait());
    world.resume_hook(&token, json!({"confirmed": true})).await?;
    let value = approved.await
                        .map_err(|e| WorldError::Config(format!("waiter task: {e}")))??;
    println!("Hook {} resuelto con {}", hook.hook_id, value);

    world.run_step(&run.run_id, "s2", SEND_WELCOME, vec![]).await?;

    let message_id = world.queue("__wkf_step_sendWelcomeEmail",
                                 json!({"runId": run.run_id}),
                                 QueueOptions::default())?;
    if let Some((message, meta)) = inbox.recv().await {
        println!("Mensaje {} entregado (intento {}): {}", message_id, meta.attempt, message);
    }

    let done = storage.update_run(&run.run_id, UpdateWorkflowRunRequest::status(RunStatus::Completed))
                      .await?;
    println!("Run {} -> {}", done.run_id, done.status);

    let steps = storage.list_steps(&run.run_id, ListParams::default()).await?;
    for step in &steps.data {
        println!("  step {} [{}] intento {}", step.step_id, step.status, step.attempt);
    }
    let events = storage.list_events_by_correlation_id(&hook.hook_id, ResolveData::All)
                        .await?;
    println!("Eventos del hook: {}", events.len());
    Ok(())
}
