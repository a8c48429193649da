//! Session context and the traits for its external collaborators.
//!
//! A [`Session`] ties together the two opaque execution backends: a
//! [`CommandTransport`] for the remote session service and a [`LocalEngine`]
//! for in-process execution. At most one session is registered as the
//! process-wide active session; it is only consulted through the explicit
//! [`Session::active`] accessor when an operation was not handed a session,
//! and by best-effort reference cleanup.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::command::{Command, CommandResponse, MlOperator, MlParams, TransportError};
use crate::dataset::Plan;
use crate::object::ParamValue;

/// Env var that forces local-mode execution when present, regardless of the
/// session context. Checked by name on every call.
pub const FORCE_LOCAL_ENV: &str = "MLBRIDGE_FORCE_LOCAL";

/// Env var that redirects the temporary dataset-caching step to durable
/// storage instead of in-memory persistence.
pub const TEMP_DFS_PATH_ENV: &str = "MLBRIDGE_TEMP_DFS_PATH";

/// Blocking transport primitive for the remote session protocol.
///
/// The wire encoding and any timeout behavior belong to the implementation;
/// the bridge calls block until the round trip completes.
pub trait CommandTransport: Send + Sync {
    /// Executes one command round trip.
    fn execute_command(&self, command: &Command) -> Result<CommandResponse, TransportError>;

    /// Deletes cached server-side objects by reference id.
    fn delete_ml_cache(&self, ref_ids: &[String]) -> Result<(), TransportError>;
}

/// Error from the co-located execution engine.
#[derive(Error, Debug)]
#[error("local engine error: {0}")]
pub struct EngineError(pub String);

/// Co-located execution engine invoked in local mode.
///
/// Fitted objects live inside the engine and are addressed by the object id
/// it returned; the bridge forwards calls unchanged.
pub trait LocalEngine: Send + Sync {
    /// Fits an estimator over a dataset; returns the engine object id of
    /// the fitted model.
    fn fit(
        &self,
        estimator: &MlOperator,
        params: &MlParams,
        dataset: &Plan,
    ) -> Result<String, EngineError>;

    /// Applies a fitted model or named transformer to a dataset; returns
    /// the plan of the transformed relation.
    fn transform(
        &self,
        target: &str,
        params: &MlParams,
        dataset: &Plan,
    ) -> Result<Plan, EngineError>;

    /// Evaluates a dataset with an evaluator; returns the metric value.
    fn evaluate(
        &self,
        evaluator: &MlOperator,
        params: &MlParams,
        dataset: &Plan,
    ) -> Result<ParamValue, EngineError>;

    /// Invokes a method on an engine object (or the helper sentinel).
    fn call(
        &self,
        target: &str,
        method: &str,
        args: &[ParamValue],
    ) -> Result<ParamValue, EngineError>;
}

/// Bridge configuration carried by the session.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Fitted-model classes that keep their own uid after fit instead of
    /// inheriting the estimator's. Treated as configuration data; new
    /// exemptions are never inferred.
    pub uid_propagation_exempt: BTreeSet<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let mut exempt = BTreeSet::new();
        exempt.insert("mlbridge.feature.Bucketizer".to_string());
        Self {
            uid_propagation_exempt: exempt,
        }
    }
}

/// Execution context for bridge operations.
pub struct Session {
    transport: Option<Arc<dyn CommandTransport>>,
    engine: Option<Arc<dyn LocalEngine>>,
    version: String,
    config: BridgeConfig,
}

static ACTIVE_SESSION: Mutex<Option<Arc<Session>>> = Mutex::new(None);

impl Session {
    /// Creates a local session backed by an execution engine.
    pub fn local(engine: Arc<dyn LocalEngine>, version: impl Into<String>) -> Self {
        Self {
            transport: None,
            engine: Some(engine),
            version: version.into(),
            config: BridgeConfig::default(),
        }
    }

    /// Creates a remote session backed by a command transport.
    pub fn remote(transport: Arc<dyn CommandTransport>, version: impl Into<String>) -> Self {
        Self {
            transport: Some(transport),
            engine: None,
            version: version.into(),
            config: BridgeConfig::default(),
        }
    }

    /// Replaces the bridge configuration.
    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Attaches a local engine, e.g. so a remote session can still serve
    /// forced-local calls.
    pub fn with_engine(mut self, engine: Arc<dyn LocalEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// True when this session is attached to a remote session service.
    pub fn is_remote(&self) -> bool {
        self.transport.is_some()
    }

    /// The remote transport, if any.
    pub fn transport(&self) -> Option<&Arc<dyn CommandTransport>> {
        self.transport.as_ref()
    }

    /// The local execution engine, if any.
    pub fn engine(&self) -> Option<&Arc<dyn LocalEngine>> {
        self.engine.as_ref()
    }

    /// Version string of the producing system, persisted into metadata.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Bridge configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Registers the process-wide active session.
    pub fn set_active(session: Arc<Session>) {
        let mut active = ACTIVE_SESSION.lock().expect("lock");
        *active = Some(session);
    }

    /// Clears the process-wide active session.
    pub fn clear_active() {
        let mut active = ACTIVE_SESSION.lock().expect("lock");
        *active = None;
    }

    /// The currently registered session, if any.
    pub fn active() -> Option<Arc<Session>> {
        ACTIVE_SESSION
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("remote", &self.is_remote())
            .field("engine", &self.engine.is_some())
            .field("version", &self.version)
            .finish()
    }
}
