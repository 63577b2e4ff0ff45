//! Host service: task queue, host thread, socket server and client channel.

pub mod actions;
pub mod channel;
pub mod context;
mod error;
pub mod host;
pub mod protocol;
pub mod queue;
mod runtime;

pub use actions::{ActionInput, ActionRegistry, DocumentNameAction, HostAction};
pub use channel::Channel;
pub use context::{BridgeContext, CreateOrModifyOutcome};
pub use error::BridgeError;
pub use host::{spawn_host_thread, HostApp, HostThread};
pub use protocol::{send_request, BridgeRequest, BridgeResponse};
pub use queue::{task_queue, IdleOutcome, PendingTask, TaskQueue, TaskRunner, WaitOutcome};
pub use runtime::{init_tracing, run, start_blocking};
