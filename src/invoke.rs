//! Remote command construction, execution, and result decoding.
//!
//! All three call shapes share one skeleton: build a typed operator
//! descriptor plus serialized parameters and arguments, wrap them in a
//! [`Command`], execute through the session's transport, and decode the
//! structured result. The single recoverable condition is a summary fetch
//! failing with [`MODEL_SUMMARY_LOST`]; the summary is recreated from the
//! retained model reference and the fetch replayed exactly once.

use std::sync::Arc;

use tracing::warn;

use crate::command::{
    Command, FetchMethod, FetchResult, MODEL_SUMMARY_LOST, MlOperator, MlParams, ModelInfo,
    OperatorType,
};
use crate::dataset::{Dataset, Plan};
use crate::error::BridgeError;
use crate::executor::{CallTarget, finalize_fitted_model};
use crate::object::{MlObject, ParamValue};
use crate::operators::{Estimator, Evaluator, Model, ModelHandle, Transformer};
use crate::remote::{RemoteObjectRef, RemoteRefHold};
use crate::session::{CommandTransport, Session};
use crate::summary::TrainingSummary;

/// Sentinel object id addressing the stateless helper channel on the
/// session service.
pub const HELPER_ID: &str = "______ML_HELPER______";

fn remote_transport(session: &Session) -> Result<&Arc<dyn CommandTransport>, BridgeError> {
    session.transport().ok_or(BridgeError::NoTransport)
}

/// Splits a derived object id into its base reference and the chain of
/// method applications leading to the target.
fn extract_id_methods(object_id: &str) -> (String, Vec<FetchMethod>) {
    let mut parts = object_id.split('.');
    let obj_ref = parts.next().unwrap_or_default().to_string();
    let methods = parts
        .map(|method| FetchMethod {
            method: method.to_string(),
            args: Vec::new(),
        })
        .collect();
    (obj_ref, methods)
}

fn target_object_id(target: &CallTarget<'_>) -> Result<String, BridgeError> {
    match target {
        CallTarget::Model(model) => match model.handle() {
            ModelHandle::Remote(hold) => Ok(hold.ref_id().to_string()),
            _ => Err(BridgeError::Unsupported(format!(
                "model {} is not attached to a remote session",
                model.uid()
            ))),
        },
        CallTarget::Summary(summary) => Ok(summary.ref_id().to_string()),
        CallTarget::Helper => Ok(HELPER_ID.to_string()),
    }
}

/// Fits an estimator remotely, minting a reference-counted model handle.
pub fn fit(
    session: &Arc<Session>,
    estimator: &Estimator,
    dataset: &Dataset,
) -> Result<Model, BridgeError> {
    let transport = remote_transport(session)?;
    let command = Command::Fit {
        estimator: MlOperator {
            name: estimator.class_name().to_string(),
            uid: estimator.uid().to_string(),
            op_type: OperatorType::Estimator,
        },
        params: MlParams::from_spec(estimator.spec()),
        dataset: dataset.plan().clone(),
    };
    let response = transport.execute_command(&command)?;
    let info = ModelInfo::from_response(&response)?;
    if let Some(warning) = &info.warning_message {
        warn!("{warning}");
    }

    let obj = RemoteObjectRef::new(info.obj_ref.clone());
    let mut model = Model::new(
        estimator.model_class_name(),
        ModelHandle::Remote(RemoteRefHold::adopt(Arc::clone(&obj))),
    );
    if estimator.summary_support() {
        let summary_dataset = transform(&model, dataset)?;
        let summary = TrainingSummary::new(
            format!("{}.summary", obj.ref_id()),
            summary_dataset,
            Some(RemoteRefHold::share(&obj)),
        );
        model.set_summary(summary);
    }
    finalize_fitted_model(&mut model, estimator, session);
    Ok(model)
}

/// Evaluates a dataset remotely, returning the deserialized metric.
pub fn evaluate(
    session: &Arc<Session>,
    evaluator: &Evaluator,
    dataset: &Dataset,
) -> Result<ParamValue, BridgeError> {
    let transport = remote_transport(session)?;
    let command = Command::Evaluate {
        evaluator: MlOperator {
            name: evaluator.class_name().to_string(),
            uid: evaluator.uid().to_string(),
            op_type: OperatorType::Evaluator,
        },
        params: MlParams::from_spec(evaluator.spec()),
        dataset: dataset.plan().clone(),
    };
    let response = transport.execute_command(&command)?;
    Ok(response.value())
}

fn execute_fetch(
    transport: &dyn CommandTransport,
    command: &Command,
) -> Result<FetchResult, BridgeError> {
    let response = transport.execute_command(command)?;
    FetchResult::from_response(&response)
}

/// Invokes a method on a remote object, chaining through any derived
/// reference segments in a single round trip.
///
/// A summary target failing with the summary-loss error class is recovered
/// exactly once: a recreate command is issued against the retained model
/// reference and the original fetch replayed. Any other failure, or a
/// second loss, propagates.
pub fn fetch(
    session: &Arc<Session>,
    target: &CallTarget<'_>,
    method: &str,
    args: Vec<ParamValue>,
) -> Result<FetchResult, BridgeError> {
    let transport = remote_transport(session)?;
    let object_id = target_object_id(target)?;
    let (obj_ref, mut methods) = extract_id_methods(&object_id);
    methods.push(FetchMethod {
        method: method.to_string(),
        args,
    });
    let command = Command::Fetch { obj_ref, methods };

    match execute_fetch(transport.as_ref(), &command) {
        Err(BridgeError::Transport(err)) if err.error_class() == Some(MODEL_SUMMARY_LOST) => {
            let CallTarget::Summary(summary) = target else {
                return Err(BridgeError::Transport(err));
            };
            let Some(model_hold) = summary.model_hold() else {
                return Err(BridgeError::Transport(err));
            };
            let recreate = Command::CreateSummary {
                model_ref: model_hold.ref_id().to_string(),
                dataset: summary.dataset().plan().clone(),
            };
            transport.execute_command(&recreate)?;
            execute_fetch(transport.as_ref(), &command)
        }
        result => result,
    }
}

/// Invokes a method through the stateless helper channel.
pub fn helper_call(
    session: &Arc<Session>,
    method: &str,
    args: Vec<ParamValue>,
) -> Result<ParamValue, BridgeError> {
    match fetch(session, &CallTarget::Helper, method, args)? {
        FetchResult::Value(value) => Ok(value),
        other => Err(BridgeError::Response(format!(
            "helper method {method} returned an unexpected payload: {other:?}"
        ))),
    }
}

/// Builds the lazily transformed dataset for a fitted model.
///
/// No round trip happens here; the returned handle carries a transformer
/// relation plan plus a strong hold on the model, so the server-side state
/// outlives every dataset derived from it.
pub fn transform(model: &Model, dataset: &Dataset) -> Result<Dataset, BridgeError> {
    let ModelHandle::Remote(hold) = model.handle() else {
        return Err(BridgeError::Unsupported(format!(
            "model {} is not attached to a remote session",
            model.uid()
        )));
    };
    let plan = Plan::Transform {
        name: hold.ref_id().to_string(),
        uid: None,
        params: MlParams::from_spec(model.spec()),
        is_model: true,
        child: Box::new(dataset.plan().clone()),
    };
    let mut holds = dataset.holds().to_vec();
    holds.push(hold.clone());
    Ok(Dataset::with_holds(plan, holds))
}

/// Builds the lazily transformed dataset for an unfitted transformer.
pub fn transform_stage(transformer: &Transformer, dataset: &Dataset) -> Dataset {
    let plan = Plan::Transform {
        name: transformer.class_name().to_string(),
        uid: Some(transformer.uid().to_string()),
        params: MlParams::from_spec(transformer.spec()),
        is_model: false,
        child: Box::new(dataset.plan().clone()),
    };
    Dataset::with_holds(plan, dataset.holds().to_vec())
}

/// Fetches an attribute of a remote object as a relation.
///
/// The returned dataset retains a strong hold on the source object so the
/// state it depends on survives until the derived handle is dropped.
pub fn attribute_relation(
    target: &CallTarget<'_>,
    method: &str,
    args: Vec<ParamValue>,
) -> Result<Dataset, BridgeError> {
    let object_id = target_object_id(target)?;
    let (obj_ref, mut methods) = extract_id_methods(&object_id);
    methods.push(FetchMethod {
        method: method.to_string(),
        args,
    });

    let summary_chain = methods
        .first()
        .is_some_and(|first| first.method == "summary");
    let child = match target {
        CallTarget::Summary(summary) if summary_chain => {
            Some(Box::new(summary.dataset().plan().clone()))
        }
        _ => None,
    };

    let holds = match target {
        CallTarget::Model(model) => match model.handle() {
            ModelHandle::Remote(hold) => vec![hold.clone()],
            _ => Vec::new(),
        },
        CallTarget::Summary(summary) => summary
            .model_hold()
            .cloned()
            .into_iter()
            .chain(summary.dataset().holds().iter().cloned())
            .collect(),
        CallTarget::Helper => Vec::new(),
    };

    let plan = Plan::Attribute {
        obj_ref,
        methods,
        child,
    };
    Ok(Dataset::with_holds(plan, holds))
}
