//! Shared test fixtures: mock transport and engine plus serialization of
//! tests that touch process-wide state (active session, env vars).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use serde_json::json;

use crate::command::{Command, CommandResponse, MODEL_SUMMARY_LOST, MlOperator, MlParams, TransportError};
use crate::dataset::Plan;
use crate::object::ParamValue;
use crate::session::{CommandTransport, EngineError, LocalEngine, Session};

/// Serializes tests that mutate the active session or process env.
pub fn session_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

/// Scripted transport recording every command it executes.
#[derive(Default)]
pub struct MockTransport {
    pub commands: Mutex<Vec<Command>>,
    pub responses: Mutex<VecDeque<Result<CommandResponse, TransportError>>>,
    pub deleted: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_response(&self, response: Result<CommandResponse, TransportError>) {
        self.responses.lock().expect("lock").push_back(response);
    }

    /// Kinds of the executed commands, in order.
    pub fn command_kinds(&self) -> Vec<&'static str> {
        self.commands
            .lock()
            .expect("lock")
            .iter()
            .map(|command| match command {
                Command::Fit { .. } => "fit",
                Command::Evaluate { .. } => "evaluate",
                Command::Fetch { .. } => "fetch",
                Command::CreateSummary { .. } => "create_summary",
            })
            .collect()
    }
}

impl CommandTransport for MockTransport {
    fn execute_command(&self, command: &Command) -> Result<CommandResponse, TransportError> {
        self.commands.lock().expect("lock").push(command.clone());
        self.responses
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Ok(CommandResponse::default()))
    }

    fn delete_ml_cache(&self, ref_ids: &[String]) -> Result<(), TransportError> {
        self.deleted.lock().expect("lock").extend(ref_ids.iter().cloned());
        Ok(())
    }
}

/// Engine stub recording call targets and methods.
#[derive(Default)]
pub struct MockEngine {
    pub calls: Mutex<Vec<(String, String)>>,
}

impl LocalEngine for MockEngine {
    fn fit(
        &self,
        estimator: &MlOperator,
        _params: &MlParams,
        _dataset: &Plan,
    ) -> Result<String, EngineError> {
        self.calls
            .lock()
            .expect("lock")
            .push((estimator.name.clone(), "fit".to_string()));
        Ok(format!("engine-{}", estimator.uid))
    }

    fn transform(
        &self,
        target: &str,
        _params: &MlParams,
        _dataset: &Plan,
    ) -> Result<Plan, EngineError> {
        self.calls
            .lock()
            .expect("lock")
            .push((target.to_string(), "transform".to_string()));
        Ok(Plan::Source(json!({ "transformed_by": target })))
    }

    fn evaluate(
        &self,
        evaluator: &MlOperator,
        _params: &MlParams,
        _dataset: &Plan,
    ) -> Result<ParamValue, EngineError> {
        self.calls
            .lock()
            .expect("lock")
            .push((evaluator.name.clone(), "evaluate".to_string()));
        Ok(json!(0.5))
    }

    fn call(
        &self,
        target: &str,
        method: &str,
        _args: &[ParamValue],
    ) -> Result<ParamValue, EngineError> {
        self.calls
            .lock()
            .expect("lock")
            .push((target.to_string(), method.to_string()));
        Ok(json!({ "method": method }))
    }
}

/// Remote session over a mock transport.
pub fn remote_session(transport: &Arc<MockTransport>) -> Arc<Session> {
    Arc::new(Session::remote(
        Arc::clone(transport) as Arc<dyn CommandTransport>,
        "2.5.0",
    ))
}

/// Local session over a mock engine.
pub fn local_session(engine: &Arc<MockEngine>) -> Arc<Session> {
    Arc::new(Session::local(
        Arc::clone(engine) as Arc<dyn LocalEngine>,
        "2.5.0",
    ))
}

/// Fit response minting the given server-side reference.
pub fn model_info_response(ref_id: &str, warning: Option<&str>) -> CommandResponse {
    let mut info = json!({ "obj_ref": ref_id });
    if let Some(warning) = warning {
        info["warning_message"] = json!(warning);
    }
    CommandResponse::default().with_property("model_info", info)
}

/// Fetch response carrying a plain value.
pub fn value_response(value: ParamValue) -> CommandResponse {
    CommandResponse::default().with_property("value", value)
}

/// Transport error carrying the summary-loss error class.
pub fn summary_lost_error() -> TransportError {
    TransportError::Service {
        error_class: MODEL_SUMMARY_LOST.to_string(),
        message: "summary evicted".to_string(),
    }
}
