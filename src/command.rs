//! Transport-agnostic command envelope for the remote session protocol.
//!
//! The bridge never sees the wire encoding; it builds a [`Command`], hands it
//! to the session's transport, and decodes the structured
//! [`CommandResponse`] that comes back. Errors from the service carry an
//! opaque error-class tag; [`MODEL_SUMMARY_LOST`] is the single class the
//! invocation layer recovers from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::Plan;
use crate::error::BridgeError;
use crate::object::{ObjectSpec, ParamValue};

/// Error class reported when the service has evicted a model's training
/// summary to reclaim resources. Matched exactly, never by substring.
pub const MODEL_SUMMARY_LOST: &str = "SESSION_ML.MODEL_SUMMARY_LOST";

/// Declared type of the operator a command targets.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum OperatorType {
    /// An estimator to be fitted.
    Estimator,
    /// An evaluator producing a metric.
    Evaluator,
    /// A stateless transformer.
    Transformer,
}

/// Typed operator descriptor sent with fit and evaluate commands.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MlOperator {
    /// Fully qualified operator name.
    pub name: String,
    /// Client-side uid of the operator instance.
    pub uid: String,
    /// Declared operator type.
    pub op_type: OperatorType,
}

/// Serialized parameter set accompanying an operator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MlParams {
    /// Resolved parameter values, user-set winning over defaults.
    pub params: BTreeMap<String, ParamValue>,
}

impl MlParams {
    /// Builds the serialized parameter set from an object spec.
    pub fn from_spec(spec: &ObjectSpec) -> Self {
        Self {
            params: spec.resolved(),
        }
    }
}

/// One method application within a fetch chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FetchMethod {
    /// Method or property name.
    pub method: String,
    /// Serialized positional arguments.
    pub args: Vec<ParamValue>,
}

/// A command sent to the remote session service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Command {
    /// Fit an estimator over a dataset, minting a server-side model.
    Fit {
        /// Estimator descriptor.
        estimator: MlOperator,
        /// Serialized estimator parameters.
        params: MlParams,
        /// Plan of the training dataset.
        dataset: Plan,
    },
    /// Evaluate a dataset with an evaluator, returning a metric.
    Evaluate {
        /// Evaluator descriptor.
        evaluator: MlOperator,
        /// Serialized evaluator parameters.
        params: MlParams,
        /// Plan of the dataset under evaluation.
        dataset: Plan,
    },
    /// Apply one or more chained method calls to a server-side object.
    Fetch {
        /// Base object reference (or the helper sentinel).
        obj_ref: String,
        /// Method applications, innermost first.
        methods: Vec<FetchMethod>,
    },
    /// Recreate an evicted training summary from the retained model
    /// reference and the original summary dataset.
    CreateSummary {
        /// Reference id of the owning model.
        model_ref: String,
        /// Plan of the dataset the summary was computed over.
        dataset: Plan,
    },
}

/// Structured result of a command round trip.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Result payload keyed by result kind (`model_info`, `summary`,
    /// `operator_info`, `value`).
    pub properties: BTreeMap<String, ParamValue>,
}

impl CommandResponse {
    /// Returns a copy with the given property set.
    pub fn with_property(mut self, key: &str, value: ParamValue) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    /// The plain deserialized value of the response, `Null` when absent.
    pub fn value(&self) -> ParamValue {
        self.properties
            .get("value")
            .cloned()
            .unwrap_or(ParamValue::Null)
    }
}

/// Payload describing a freshly minted server-side object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Reference id of the new server-side object.
    pub obj_ref: String,
    /// Non-fatal warning produced during fitting; logged, never raised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_message: Option<String>,
    /// Optional summary bootstrap data attached by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ParamValue>,
}

impl ModelInfo {
    /// Decodes the `model_info` payload from a response.
    pub fn from_response(response: &CommandResponse) -> Result<Self, BridgeError> {
        let value = response
            .properties
            .get("model_info")
            .ok_or_else(|| BridgeError::Response("missing `model_info` payload".to_string()))?;
        serde_json::from_value(value.clone()).map_err(|e| BridgeError::Response(e.to_string()))
    }
}

/// Decoded result of a fetch command.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchResult {
    /// Summary payload returned by a summary accessor.
    Summary(ParamValue),
    /// Reference id of a new server-side object derived from the target.
    /// The caller is responsible for wrapping it into its own
    /// reference-counted handle.
    OperatorRef(String),
    /// An arbitrary deserialized value.
    Value(ParamValue),
}

impl FetchResult {
    /// Decodes a fetch response into one of the three result shapes.
    pub fn from_response(response: &CommandResponse) -> Result<Self, BridgeError> {
        if let Some(summary) = response.properties.get("summary") {
            return Ok(FetchResult::Summary(summary.clone()));
        }
        if let Some(info) = response.properties.get("operator_info") {
            let info: ModelInfo = serde_json::from_value(info.clone())
                .map_err(|e| BridgeError::Response(e.to_string()))?;
            return Ok(FetchResult::OperatorRef(info.obj_ref));
        }
        Ok(FetchResult::Value(response.value()))
    }
}

/// Error reported by the remote transport primitive.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Structured service error carrying an error-class tag.
    #[error("remote service error [{error_class}]: {message}")]
    Service {
        /// Opaque error-class tag assigned by the service.
        error_class: String,
        /// Human-readable message.
        message: String,
    },
    /// Session or channel failure below the command layer.
    #[error("session channel error: {0}")]
    Channel(String),
}

impl TransportError {
    /// The error-class tag, if this is a structured service error.
    pub fn error_class(&self) -> Option<&str> {
        match self {
            TransportError::Service { error_class, .. } => Some(error_class),
            TransportError::Channel(_) => None,
        }
    }
}
