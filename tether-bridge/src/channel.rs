//! Client half of the bridge.
//!
//! A [`Channel`] is stateless between calls: every call opens the socket,
//! writes one request, reads one response and closes. Failures come back as
//! `false` / `None` from the plain methods; the `try_*` forms keep the error.
//! Nothing is retried.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tether_core::config::socket_path_at;
use tether_core::{BridgeConfig, ExternalObject, FamilyRef, IdentityTag, ParameterInfo};

use crate::actions::ActionInput;
use crate::error::BridgeError;
use crate::protocol::{send_request, BridgeRequest};

#[derive(Debug, Clone)]
pub struct Channel {
    socket: PathBuf,
    host_version: String,
    timeout: Duration,
}

impl Channel {
    /// Channel to the host serving `config.host_version` under `home`.
    pub fn new(home: &Path, config: &BridgeConfig) -> Self {
        Self {
            socket: socket_path_at(home, &config.host_version),
            host_version: config.host_version.clone(),
            timeout: config.client_timeout(),
        }
    }

    pub fn with_socket(
        socket: impl Into<PathBuf>,
        host_version: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            socket: socket.into(),
            host_version: host_version.into(),
            timeout,
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub fn host_version(&self) -> &str {
        &self.host_version
    }

    /// True when a host for this channel's version answers a ping.
    pub fn create(&self) -> bool {
        match self.ping() {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(socket = %self.socket.display(), error = %err, "channel unavailable");
                false
            }
        }
    }

    /// Ping the host and check that it serves the expected version.
    pub fn ping(&self) -> Result<(), BridgeError> {
        let data = self.call(&BridgeRequest::Ping)?;
        let found = data
            .get("host_version")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if found != self.host_version {
            return Err(BridgeError::VersionMismatch {
                expected: self.host_version.clone(),
                found: found.to_string(),
            });
        }
        Ok(())
    }

    /// Send one request; `ok:false` answers become [`BridgeError::Protocol`].
    pub fn call(&self, request: &BridgeRequest) -> Result<Value, BridgeError> {
        send_request(&self.socket, request, Some(self.timeout))?.into_data()
    }

    /// [`Channel::call`] with every failure collapsed to `None`.
    pub fn invoke(&self, request: &BridgeRequest) -> Option<Value> {
        match self.call(request) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(cmd = request.name(), error = %err, "bridge call failed");
                None
            }
        }
    }

    pub fn try_family_names(&self) -> Result<Vec<FamilyRef>, BridgeError> {
        self.call_as(&BridgeRequest::GetFamilyNames)
    }

    pub fn try_type_names(&self, family: &FamilyRef) -> Result<Vec<String>, BridgeError> {
        self.call_as(&BridgeRequest::GetTypeNames {
            family: family.clone(),
        })
    }

    pub fn try_parameters(
        &self,
        family: &FamilyRef,
        type_name: &str,
    ) -> Result<Vec<ParameterInfo>, BridgeError> {
        self.call_as(&BridgeRequest::GetParameters {
            family: family.clone(),
            type_name: type_name.to_string(),
        })
    }

    /// Full `create_or_modify` answer: `accepted`, `pending` and the report.
    pub fn try_create_or_modify(
        &self,
        objects: &[ExternalObject],
        identity: &IdentityTag,
    ) -> Result<Value, BridgeError> {
        self.call(&BridgeRequest::CreateOrModify {
            objects: objects.to_vec(),
            identity: identity.clone(),
        })
    }

    pub fn try_document_name(&self) -> Result<String, BridgeError> {
        self.call_as(&BridgeRequest::GetDocumentName)
    }

    pub fn try_action(&self, input: ActionInput) -> Result<ActionInput, BridgeError> {
        self.call_as(&BridgeRequest::Action { input })
    }

    pub fn family_names(&self) -> Option<Vec<FamilyRef>> {
        self.invoke_as(&BridgeRequest::GetFamilyNames)
    }

    pub fn type_names(&self, family: &FamilyRef) -> Option<Vec<String>> {
        self.invoke_as(&BridgeRequest::GetTypeNames {
            family: family.clone(),
        })
    }

    pub fn parameters(&self, family: &FamilyRef, type_name: &str) -> Option<Vec<ParameterInfo>> {
        self.invoke_as(&BridgeRequest::GetParameters {
            family: family.clone(),
            type_name: type_name.to_string(),
        })
    }

    /// The host's accept flag for one batch; `None` on any transport failure.
    pub fn create_or_modify(
        &self,
        objects: &[ExternalObject],
        identity: &IdentityTag,
    ) -> Option<bool> {
        self.invoke(&BridgeRequest::CreateOrModify {
            objects: objects.to_vec(),
            identity: identity.clone(),
        })?
        .get("accepted")
        .and_then(Value::as_bool)
    }

    pub fn document_name(&self) -> Option<String> {
        self.invoke_as(&BridgeRequest::GetDocumentName)
    }

    pub fn action(&self, input: ActionInput) -> Option<Map<String, Value>> {
        match self.invoke(&BridgeRequest::Action { input })? {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Ask the host to shut down.
    pub fn stop(&self) -> Result<(), BridgeError> {
        self.call(&BridgeRequest::Stop).map(|_| ())
    }

    fn call_as<T: DeserializeOwned>(&self, request: &BridgeRequest) -> Result<T, BridgeError> {
        Ok(serde_json::from_value(self.call(request)?)?)
    }

    fn invoke_as<T: DeserializeOwned>(&self, request: &BridgeRequest) -> Option<T> {
        let value = self.invoke(request)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                tracing::warn!(cmd = request.name(), error = %err, "unexpected bridge payload");
                None
            }
        }
    }
}
