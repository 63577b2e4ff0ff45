//! Caller-addressed host actions.
//!
//! A client sends a map carrying `CommandGuid` (which action to run) and
//! `AssemblyPath` (where the caller's code lives). The bridge looks the guid
//! up here and runs the handler on the host thread with the whole map.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tether_host::HostDocument;
use uuid::Uuid;

use crate::error::BridgeError;

pub type ActionInput = Map<String, Value>;

pub const COMMAND_GUID: &str = "CommandGuid";
pub const ASSEMBLY_PATH: &str = "AssemblyPath";
pub const DOC_NAME: &str = "docName";

/// Guid of the built-in [`DocumentNameAction`].
pub const DOCUMENT_NAME_ACTION: Uuid = Uuid::from_u128(0x2b1e_64c0_5a3f_4d7e_9c28_0f61_d3a4_b8e5);

pub trait HostAction: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, doc: &mut dyn HostDocument, input: &ActionInput)
        -> Result<ActionInput, BridgeError>;
}

/// Answers `{"docName": <document title>}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentNameAction;

impl HostAction for DocumentNameAction {
    fn name(&self) -> &str {
        "document-name"
    }

    fn run(
        &self,
        doc: &mut dyn HostDocument,
        _input: &ActionInput,
    ) -> Result<ActionInput, BridgeError> {
        let mut out = Map::new();
        out.insert(DOC_NAME.to_string(), Value::String(doc.title()));
        Ok(out)
    }
}

#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<Uuid, Arc<dyn HostAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in actions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(DOCUMENT_NAME_ACTION, DocumentNameAction);
        registry
    }

    pub fn register(&mut self, guid: Uuid, action: impl HostAction + 'static) {
        self.actions.insert(guid, Arc::new(action));
    }

    pub fn get(&self, guid: &Uuid) -> Option<Arc<dyn HostAction>> {
        self.actions.get(guid).cloned()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Build the wire payload for running `guid`.
pub fn action_input(guid: Uuid, assembly_path: impl Into<String>) -> ActionInput {
    let mut input = Map::new();
    input.insert(COMMAND_GUID.to_string(), Value::String(guid.to_string()));
    input.insert(
        ASSEMBLY_PATH.to_string(),
        Value::String(assembly_path.into()),
    );
    input
}

pub fn command_guid(input: &ActionInput) -> Result<Uuid, BridgeError> {
    let raw = input
        .get(COMMAND_GUID)
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::Protocol(format!("missing {COMMAND_GUID}")))?;
    Uuid::parse_str(raw)
        .map_err(|err| BridgeError::Protocol(format!("invalid {COMMAND_GUID} '{raw}': {err}")))
}

pub fn assembly_path(input: &ActionInput) -> Option<&str> {
    input.get(ASSEMBLY_PATH).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_host::MemoryDocument;

    #[test]
    fn builtin_document_name() {
        let registry = ActionRegistry::with_builtins();
        let action = registry.get(&DOCUMENT_NAME_ACTION).expect("builtin");
        let mut doc = MemoryDocument::sample();
        let out = action
            .run(&mut doc, &action_input(DOCUMENT_NAME_ACTION, "/opt/client"))
            .expect("run");
        assert_eq!(out[DOC_NAME], Value::String("Sample Project".into()));
    }

    #[test]
    fn guid_is_parsed_from_input() {
        let guid = Uuid::new_v4();
        let input = action_input(guid, "/opt/client");
        assert_eq!(command_guid(&input).expect("guid"), guid);
        assert_eq!(assembly_path(&input), Some("/opt/client"));

        let mut bad = input.clone();
        bad.insert(COMMAND_GUID.into(), Value::String("not-a-guid".into()));
        assert!(matches!(command_guid(&bad), Err(BridgeError::Protocol(_))));
        assert!(command_guid(&Map::new()).is_err());
    }
}
