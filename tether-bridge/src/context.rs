//! Service operations and the state they share.
//!
//! [`BridgeContext`] owns the queue handle, the wait bound, one coarse
//! single-flight lock and the last-known answers for every query. Each
//! operation takes the lock, enqueues its work for the host thread and waits
//! at most `wait_timeout`. Host-side tasks refresh the cache themselves, so a
//! task that outlives its waiter still updates what the next caller sees.
//! A timed-out query answers from that cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tether_core::{ExternalObject, FamilyRef, IdentityTag, ParameterInfo};
use tether_host::{catalog, HostDocument, HostError};
use tether_sync::{SyncError, SyncReport};

use crate::actions::{self, ActionInput, ActionRegistry, DOC_NAME};
use crate::error::BridgeError;
use crate::host::HostApp;
use crate::queue::{PendingTask, TaskQueue, WaitOutcome};

#[derive(Debug, Default, Clone)]
struct Snapshot {
    families: Vec<FamilyRef>,
    types: HashMap<FamilyRef, Vec<String>>,
    parameters: HashMap<(FamilyRef, String), Vec<ParameterInfo>>,
    document_name: Option<String>,
}

/// Answer to `create_or_modify`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrModifyOutcome {
    pub accepted: bool,
    /// The host had not finished when the wait bound elapsed.
    pub pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<SyncReport>,
}

pub struct BridgeContext<D> {
    queue: TaskQueue<HostApp<D>>,
    wait_timeout: Duration,
    flight: tokio::sync::Mutex<()>,
    cache: Arc<Mutex<Snapshot>>,
    actions: Arc<ActionRegistry>,
}

impl<D: HostDocument + 'static> BridgeContext<D> {
    pub fn new(queue: TaskQueue<HostApp<D>>, wait_timeout: Duration, actions: ActionRegistry) -> Self {
        Self {
            queue,
            wait_timeout,
            flight: tokio::sync::Mutex::new(()),
            cache: Arc::new(Mutex::new(Snapshot::default())),
            actions: Arc::new(actions),
        }
    }

    pub fn queue(&self) -> &TaskQueue<HostApp<D>> {
        &self.queue
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    pub async fn family_names(&self) -> Result<Vec<FamilyRef>, BridgeError> {
        let _flight = self.flight.lock().await;
        let cache = self.cache.clone();
        let pending = self.queue.enqueue(move |app: &mut HostApp<D>| {
            let names = catalog::family_names(&app.document);
            cache.lock().families = names.clone();
            names
        })?;
        self.settle(pending, |snap| snap.families.clone()).await
    }

    pub async fn type_names(&self, family: FamilyRef) -> Result<Vec<String>, BridgeError> {
        let _flight = self.flight.lock().await;
        let cache = self.cache.clone();
        let key = family.clone();
        let pending = self.queue.enqueue(move |app: &mut HostApp<D>| -> Result<_, HostError> {
            let types = catalog::type_names(&app.document, &key)?;
            cache.lock().types.insert(key, types.clone());
            Ok(types)
        })?;
        Ok(self
            .settle(pending, |snap| {
                Ok(snap.types.get(&family).cloned().unwrap_or_default())
            })
            .await??)
    }

    pub async fn parameters(
        &self,
        family: FamilyRef,
        type_name: String,
    ) -> Result<Vec<ParameterInfo>, BridgeError> {
        let _flight = self.flight.lock().await;
        let cache = self.cache.clone();
        let key = (family, type_name);
        let task_key = key.clone();
        let pending = self.queue.enqueue(move |app: &mut HostApp<D>| -> Result<_, HostError> {
            let params = catalog::parameters(&app.document, &task_key.0, &task_key.1)?;
            cache.lock().parameters.insert(task_key, params.clone());
            Ok(params)
        })?;
        Ok(self
            .settle(pending, |snap| {
                Ok(snap.parameters.get(&key).cloned().unwrap_or_default())
            })
            .await??)
    }

    pub async fn document_name(&self) -> Result<String, BridgeError> {
        let _flight = self.flight.lock().await;
        let cache = self.cache.clone();
        let pending = self.queue.enqueue(move |app: &mut HostApp<D>| {
            let title = app.document.title();
            cache.lock().document_name = Some(title.clone());
            title
        })?;
        self.settle(pending, |snap| snap.document_name.clone().unwrap_or_default())
            .await
    }

    /// Reconcile `objects` under `identity` on the host thread.
    ///
    /// If the host has not answered within the wait bound the batch is
    /// reported as accepted and pending; it still runs to completion.
    pub async fn create_or_modify(
        &self,
        objects: Vec<ExternalObject>,
        identity: IdentityTag,
    ) -> Result<CreateOrModifyOutcome, BridgeError> {
        if objects.is_empty() {
            return Err(SyncError::EmptyBatch.into());
        }
        let _flight = self.flight.lock().await;
        tracing::info!(%identity, objects = objects.len(), "create_or_modify enqueued");
        let pending = self.queue.enqueue(move |app: &mut HostApp<D>| {
            let HostApp {
                document,
                prompt,
                reconciler,
            } = app;
            reconciler.sync(document, &mut **prompt, &objects, &identity)
        })?;
        let seq = pending.seq();
        match pending.wait(self.wait_timeout).await {
            WaitOutcome::Completed(Ok(report)) => Ok(CreateOrModifyOutcome {
                accepted: report.accepted,
                pending: false,
                report: Some(report),
            }),
            WaitOutcome::Completed(Err(err)) => Err(err.into()),
            WaitOutcome::TimedOut => Ok(CreateOrModifyOutcome {
                accepted: true,
                pending: true,
                report: None,
            }),
            WaitOutcome::Abandoned => Err(BridgeError::TaskAbandoned { seq }),
        }
    }

    /// Run the action named by the input's `CommandGuid`.
    pub async fn run_action(&self, input: ActionInput) -> Result<ActionInput, BridgeError> {
        let guid = actions::command_guid(&input)?;
        let action = self
            .actions
            .get(&guid)
            .ok_or(BridgeError::UnknownAction(guid))?;
        tracing::info!(
            command = %guid,
            action = action.name(),
            assembly = actions::assembly_path(&input).unwrap_or("-"),
            "running action"
        );

        let _flight = self.flight.lock().await;
        let cache = self.cache.clone();
        let pending = self.queue.enqueue(move |app: &mut HostApp<D>| {
            cache.lock().document_name = Some(app.document.title());
            action.run(&mut app.document, &input)
        })?;
        self.settle(pending, |snap| {
            let mut stale = ActionInput::new();
            stale.insert("pending".to_string(), Value::Bool(true));
            if let Some(name) = &snap.document_name {
                stale.insert(DOC_NAME.to_string(), Value::String(name.clone()));
            }
            Ok(stale)
        })
        .await?
    }

    async fn settle<R>(
        &self,
        pending: PendingTask<R>,
        stale: impl FnOnce(&Snapshot) -> R,
    ) -> Result<R, BridgeError> {
        let seq = pending.seq();
        match pending.wait(self.wait_timeout).await {
            WaitOutcome::Completed(value) => Ok(value),
            WaitOutcome::TimedOut => {
                let snap = self.cache.lock();
                Ok(stale(&*snap))
            }
            WaitOutcome::Abandoned => Err(BridgeError::TaskAbandoned { seq }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{spawn_host_thread, HostThread};
    use crate::queue::task_queue;
    use tether_host::MemoryDocument;
    use tether_sync::{AutoApprove, Reconciler};

    fn start(wait: Duration) -> (BridgeContext<MemoryDocument>, HostThread) {
        let (queue, runner) = task_queue(16);
        let host = spawn_host_thread(
            runner,
            || {
                Ok(HostApp::new(
                    MemoryDocument::sample(),
                    Box::new(AutoApprove),
                    Reconciler::default(),
                ))
            },
            Duration::from_millis(1),
        )
        .expect("host thread");
        (
            BridgeContext::new(queue, wait, ActionRegistry::with_builtins()),
            host,
        )
    }

    #[tokio::test]
    async fn queries_answer_from_the_host() {
        let (ctx, host) = start(Duration::from_secs(5));
        let families = ctx.family_names().await.expect("families");
        assert!(families.contains(&FamilyRef::new("Furniture", "Table")));

        let types = ctx
            .type_names(FamilyRef::new("Furniture", "Table"))
            .await
            .expect("types");
        assert_eq!(types, vec!["60\" x 30\"".to_string()]);

        let params = ctx
            .parameters(FamilyRef::new("Furniture", "Table"), "60\" x 30\"".into())
            .await
            .expect("params");
        assert!(params[0].is_type);

        assert_eq!(ctx.document_name().await.expect("name"), "Sample Project");
        ctx.queue().close();
        host.join().expect("join");
    }

    #[tokio::test]
    async fn unknown_family_is_a_host_error() {
        let (ctx, host) = start(Duration::from_secs(5));
        let err = ctx
            .type_names(FamilyRef::new("Furniture", "Sofa"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Host(_)));
        ctx.queue().close();
        host.join().expect("join");
    }

    #[tokio::test]
    async fn timed_out_query_returns_stale_cache() {
        let (ctx, host) = start(Duration::from_millis(50));
        // Occupy the host thread so the next query cannot finish in time.
        let _busy = ctx
            .queue()
            .enqueue(|_: &mut HostApp<MemoryDocument>| {
                std::thread::sleep(Duration::from_millis(400))
            })
            .expect("busy");

        let started = std::time::Instant::now();
        let first = ctx.family_names().await.expect("stale");
        assert!(first.is_empty());
        assert!(started.elapsed() < Duration::from_millis(300));

        // The late task refreshed the cache after its waiter gave up.
        tokio::time::sleep(Duration::from_millis(600)).await;
        let snapshot = ctx.cache.lock().families.clone();
        assert!(!snapshot.is_empty());

        ctx.queue().close();
        host.join().expect("join");
    }

    #[tokio::test]
    async fn empty_batch_never_reaches_the_host() {
        let (ctx, host) = start(Duration::from_secs(5));
        let err = ctx
            .create_or_modify(Vec::new(), IdentityTag::from("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Sync(SyncError::EmptyBatch)));
        ctx.queue().close();
        assert_eq!(host.join().expect("join"), 0);
    }

    #[tokio::test]
    async fn builtin_action_reports_document_name() {
        let (ctx, host) = start(Duration::from_secs(5));
        let out = ctx
            .run_action(actions::action_input(actions::DOCUMENT_NAME_ACTION, "/opt/client"))
            .await
            .expect("action");
        assert_eq!(out[DOC_NAME], Value::String("Sample Project".into()));

        let unknown = ctx
            .run_action(actions::action_input(uuid::Uuid::new_v4(), "/opt/client"))
            .await;
        assert!(matches!(unknown, Err(BridgeError::UnknownAction(_))));
        ctx.queue().close();
        host.join().expect("join");
    }
}
