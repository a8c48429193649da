//! Execution strategy selected once per call.
//!
//! Every public operation resolves an [`Executor`] through
//! [`executor_for`], which consults the mode selector at call time. The
//! remote strategy serializes calls into commands; the local strategy
//! forwards them unchanged to the session's engine. Post-fit bookkeeping
//! (uid propagation, parameter copy-down) is shared so the two modes mint
//! indistinguishable models.

use std::sync::Arc;

use crate::command::{FetchResult, MlOperator, MlParams, OperatorType};
use crate::dataset::Dataset;
use crate::error::BridgeError;
use crate::invoke::{self, HELPER_ID};
use crate::mode::{self, ExecMode};
use crate::object::{MlObject, ParamValue};
use crate::operators::{Estimator, Evaluator, Model, ModelHandle, Transformer};
use crate::session::{LocalEngine, Session};
use crate::summary::TrainingSummary;

/// Target of a fetch-style call.
#[derive(Debug)]
pub enum CallTarget<'a> {
    /// A fitted model.
    Model(&'a Model),
    /// A model's training summary.
    Summary(&'a TrainingSummary),
    /// The stateless helper channel.
    Helper,
}

/// One execution strategy: local forwarding or remote command dispatch.
pub trait Executor {
    /// Fits an estimator over a dataset.
    fn fit(&self, estimator: &Estimator, dataset: &Dataset) -> Result<Model, BridgeError>;

    /// Evaluates a dataset, returning the metric value.
    fn evaluate(&self, evaluator: &Evaluator, dataset: &Dataset)
    -> Result<ParamValue, BridgeError>;

    /// Applies a fitted model to a dataset.
    fn transform(&self, model: &Model, dataset: &Dataset) -> Result<Dataset, BridgeError>;

    /// Applies an unfitted transformer to a dataset.
    fn transform_stage(
        &self,
        transformer: &Transformer,
        dataset: &Dataset,
    ) -> Result<Dataset, BridgeError>;

    /// Invokes a method on a call target.
    fn call(
        &self,
        target: &CallTarget<'_>,
        method: &str,
        args: Vec<ParamValue>,
    ) -> Result<FetchResult, BridgeError>;

    /// Fetches an attribute of a call target as a relation.
    fn attribute_relation(
        &self,
        target: &CallTarget<'_>,
        method: &str,
        args: Vec<ParamValue>,
    ) -> Result<Dataset, BridgeError>;
}

/// Resolves the strategy for one call. The mode signals are re-read every
/// time; nothing is cached on the object.
pub fn executor_for(session: &Arc<Session>) -> Box<dyn Executor> {
    match mode::select(session) {
        ExecMode::Remote => Box::new(RemoteExecutor {
            session: Arc::clone(session),
        }),
        ExecMode::Local => Box::new(LocalExecutor {
            session: Arc::clone(session),
        }),
    }
}

/// Applies shared post-fit bookkeeping: the model inherits the estimator's
/// uid unless its class is in the configured exemption set, and the
/// estimator's parameter values are copied onto it.
pub(crate) fn finalize_fitted_model(model: &mut Model, estimator: &Estimator, session: &Session) {
    let exempt = &session.config().uid_propagation_exempt;
    if !exempt.contains(model.class_name()) {
        model.spec_mut().reset_uid(estimator.uid().to_string());
    }
    model.spec_mut().copy_values_from(estimator.spec());
}

/// Strategy that serializes calls into session-service commands.
pub struct RemoteExecutor {
    session: Arc<Session>,
}

impl Executor for RemoteExecutor {
    fn fit(&self, estimator: &Estimator, dataset: &Dataset) -> Result<Model, BridgeError> {
        invoke::fit(&self.session, estimator, dataset)
    }

    fn evaluate(
        &self,
        evaluator: &Evaluator,
        dataset: &Dataset,
    ) -> Result<ParamValue, BridgeError> {
        invoke::evaluate(&self.session, evaluator, dataset)
    }

    fn transform(&self, model: &Model, dataset: &Dataset) -> Result<Dataset, BridgeError> {
        invoke::transform(model, dataset)
    }

    fn transform_stage(
        &self,
        transformer: &Transformer,
        dataset: &Dataset,
    ) -> Result<Dataset, BridgeError> {
        Ok(invoke::transform_stage(transformer, dataset))
    }

    fn call(
        &self,
        target: &CallTarget<'_>,
        method: &str,
        args: Vec<ParamValue>,
    ) -> Result<FetchResult, BridgeError> {
        invoke::fetch(&self.session, target, method, args)
    }

    fn attribute_relation(
        &self,
        target: &CallTarget<'_>,
        method: &str,
        args: Vec<ParamValue>,
    ) -> Result<Dataset, BridgeError> {
        invoke::attribute_relation(target, method, args)
    }
}

/// Strategy that forwards calls unchanged to the co-located engine.
pub struct LocalExecutor {
    session: Arc<Session>,
}

impl LocalExecutor {
    fn engine(&self) -> Result<&Arc<dyn LocalEngine>, BridgeError> {
        self.session.engine().ok_or(BridgeError::NoEngine)
    }

    fn engine_target_id(target: &CallTarget<'_>) -> Result<String, BridgeError> {
        match target {
            CallTarget::Model(model) => model.engine_target_id(),
            CallTarget::Summary(summary) => Ok(summary.ref_id().to_string()),
            CallTarget::Helper => Ok(HELPER_ID.to_string()),
        }
    }
}

impl Executor for LocalExecutor {
    fn fit(&self, estimator: &Estimator, dataset: &Dataset) -> Result<Model, BridgeError> {
        let engine = self.engine()?;
        let operator = MlOperator {
            name: estimator.class_name().to_string(),
            uid: estimator.uid().to_string(),
            op_type: OperatorType::Estimator,
        };
        let params = MlParams::from_spec(estimator.spec());
        let object_id = engine.fit(&operator, &params, dataset.plan())?;
        let mut model = Model::new(
            estimator.model_class_name(),
            ModelHandle::Local(object_id.clone()),
        );
        if estimator.summary_support() {
            let plan = engine.transform(&object_id, &params, dataset.plan())?;
            model.set_summary(TrainingSummary::new(
                format!("{object_id}.summary"),
                Dataset::from_plan(plan),
                None,
            ));
        }
        finalize_fitted_model(&mut model, estimator, &self.session);
        Ok(model)
    }

    fn evaluate(
        &self,
        evaluator: &Evaluator,
        dataset: &Dataset,
    ) -> Result<ParamValue, BridgeError> {
        let engine = self.engine()?;
        let operator = MlOperator {
            name: evaluator.class_name().to_string(),
            uid: evaluator.uid().to_string(),
            op_type: OperatorType::Evaluator,
        };
        let params = MlParams::from_spec(evaluator.spec());
        Ok(engine.evaluate(&operator, &params, dataset.plan())?)
    }

    fn transform(&self, model: &Model, dataset: &Dataset) -> Result<Dataset, BridgeError> {
        let engine = self.engine()?;
        let target = model.engine_target_id()?;
        let plan = engine.transform(&target, &MlParams::from_spec(model.spec()), dataset.plan())?;
        Ok(Dataset::from_plan(plan))
    }

    fn transform_stage(
        &self,
        transformer: &Transformer,
        dataset: &Dataset,
    ) -> Result<Dataset, BridgeError> {
        let engine = self.engine()?;
        let plan = engine.transform(
            transformer.class_name(),
            &MlParams::from_spec(transformer.spec()),
            dataset.plan(),
        )?;
        Ok(Dataset::from_plan(plan))
    }

    fn call(
        &self,
        target: &CallTarget<'_>,
        method: &str,
        args: Vec<ParamValue>,
    ) -> Result<FetchResult, BridgeError> {
        let engine = self.engine()?;
        let target_id = Self::engine_target_id(target)?;
        let value = engine.call(&target_id, method, &args)?;
        Ok(FetchResult::Value(value))
    }

    fn attribute_relation(
        &self,
        target: &CallTarget<'_>,
        method: &str,
        args: Vec<ParamValue>,
    ) -> Result<Dataset, BridgeError> {
        let engine = self.engine()?;
        let target_id = Self::engine_target_id(target)?;
        let source = engine.call(&target_id, method, &args)?;
        Ok(Dataset::from_source(source))
    }
}
