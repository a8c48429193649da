//! Estimator, transformer, model, and evaluator descriptors.
//!
//! Algorithm logic is out of scope for the bridge: an operator is its fully
//! qualified class name plus an [`ObjectSpec`]. Public operations dispatch
//! through the execution strategy selected per call, so the same descriptor
//! behaves identically against a co-located engine and a remote session.

use std::sync::Arc;

use crate::command::FetchResult;
use crate::dataset::Dataset;
use crate::error::BridgeError;
use crate::executor::{CallTarget, executor_for};
use crate::object::{MlObject, ObjectSpec, ParamValue, random_uid};
use crate::persist::MetadataWriter;
use crate::remote::{RemoteObjectRef, RemoteRefHold};
use crate::summary::TrainingSummary;
use crate::session::Session;

/// Where a fitted model's state lives.
#[derive(Debug)]
pub enum ModelHandle {
    /// Server-side state addressed by a reference-counted handle.
    Remote(RemoteRefHold),
    /// Object inside the co-located engine, addressed by its id.
    Local(String),
    /// Reconstructed from persisted metadata; not attached to any backend.
    Detached,
}

/// An unfitted estimator descriptor.
#[derive(Clone, Debug)]
pub struct Estimator {
    class_name: String,
    spec: ObjectSpec,
    summary_support: bool,
}

impl Estimator {
    /// Creates an estimator with a fresh random uid.
    pub fn new(class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        let uid = random_uid(&class_name);
        Self {
            class_name,
            spec: ObjectSpec::new(uid),
            summary_support: false,
        }
    }

    /// Replaces the generated uid with an explicit one.
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.spec.reset_uid(uid);
        self
    }

    /// Declares whether models fitted from this estimator carry a
    /// training summary.
    pub fn with_summary_support(mut self, summary_support: bool) -> Self {
        self.summary_support = summary_support;
        self
    }

    /// Sets a user parameter value.
    pub fn with_param(mut self, name: &str, value: ParamValue) -> Self {
        self.spec.set(name, value);
        self
    }

    /// Sets a default parameter value.
    pub fn with_default(mut self, name: &str, value: ParamValue) -> Self {
        self.spec.set_default(name, value);
        self
    }

    /// True when fitted models declare summary support.
    pub fn summary_support(&self) -> bool {
        self.summary_support
    }

    /// Class name of the models this estimator produces.
    pub fn model_class_name(&self) -> String {
        format!("{}Model", self.class_name)
    }

    /// Fits a model over the dataset, locally or remotely depending on the
    /// mode selected for this call.
    pub fn fit(&self, dataset: &Dataset, session: &Arc<Session>) -> Result<Model, BridgeError> {
        executor_for(session).fit(self, dataset)
    }

    /// Returns a metadata writer for this estimator.
    pub fn writer(&self) -> MetadataWriter<'_> {
        MetadataWriter::new(self)
    }
}

impl MlObject for Estimator {
    fn spec(&self) -> &ObjectSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut ObjectSpec {
        &mut self.spec
    }

    fn class_name(&self) -> &str {
        &self.class_name
    }
}

/// A stateless transformer descriptor.
#[derive(Clone, Debug)]
pub struct Transformer {
    class_name: String,
    spec: ObjectSpec,
}

impl Transformer {
    /// Creates a transformer with a fresh random uid.
    pub fn new(class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        let uid = random_uid(&class_name);
        Self {
            class_name,
            spec: ObjectSpec::new(uid),
        }
    }

    /// Replaces the generated uid with an explicit one.
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.spec.reset_uid(uid);
        self
    }

    /// Sets a user parameter value.
    pub fn with_param(mut self, name: &str, value: ParamValue) -> Self {
        self.spec.set(name, value);
        self
    }

    /// Applies this transformer to a dataset.
    pub fn transform(
        &self,
        dataset: &Dataset,
        session: &Arc<Session>,
    ) -> Result<Dataset, BridgeError> {
        executor_for(session).transform_stage(self, dataset)
    }

    /// Returns a metadata writer for this transformer.
    pub fn writer(&self) -> MetadataWriter<'_> {
        MetadataWriter::new(self)
    }
}

impl MlObject for Transformer {
    fn spec(&self) -> &ObjectSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut ObjectSpec {
        &mut self.spec
    }

    fn class_name(&self) -> &str {
        &self.class_name
    }
}

/// A fitted model.
#[derive(Debug)]
pub struct Model {
    class_name: String,
    spec: ObjectSpec,
    handle: ModelHandle,
    summary: Option<TrainingSummary>,
}

impl Model {
    pub(crate) fn new(class_name: String, handle: ModelHandle) -> Self {
        let uid = random_uid(&class_name);
        Self {
            class_name,
            spec: ObjectSpec::new(uid),
            handle,
            summary: None,
        }
    }

    /// Creates a detached model, e.g. when reconstructing from metadata.
    pub fn detached(class_name: impl Into<String>) -> Self {
        Self::new(class_name.into(), ModelHandle::Detached)
    }

    /// Wraps an operator reference returned by a fetch into a model with
    /// its own freshly counted server-side handle.
    pub fn from_operator_ref(class_name: impl Into<String>, ref_id: impl Into<String>) -> Self {
        let obj = RemoteObjectRef::new(ref_id);
        Self::new(class_name.into(), ModelHandle::Remote(RemoteRefHold::adopt(obj)))
    }

    /// Where this model's state lives.
    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    pub(crate) fn set_summary(&mut self, summary: TrainingSummary) {
        self.summary = Some(summary);
    }

    /// True when a training summary is attached.
    pub fn has_summary(&self) -> bool {
        self.summary.is_some()
    }

    /// The training summary, or an error when none exists.
    pub fn summary(&self) -> Result<&TrainingSummary, BridgeError> {
        self.summary
            .as_ref()
            .ok_or_else(|| BridgeError::NoSummary(self.class_name.clone()))
    }

    /// Target id used when forwarding calls to the local engine.
    pub(crate) fn engine_target_id(&self) -> Result<String, BridgeError> {
        match &self.handle {
            ModelHandle::Remote(hold) => Ok(hold.ref_id().to_string()),
            ModelHandle::Local(id) => Ok(id.clone()),
            ModelHandle::Detached => Err(BridgeError::Unsupported(format!(
                "model {} is not attached to an execution backend",
                self.uid()
            ))),
        }
    }

    /// Applies this model to a dataset.
    pub fn transform(
        &self,
        dataset: &Dataset,
        session: &Arc<Session>,
    ) -> Result<Dataset, BridgeError> {
        executor_for(session).transform(self, dataset)
    }

    /// Invokes a method or property accessor on this model.
    pub fn call(
        &self,
        method: &str,
        args: Vec<ParamValue>,
        session: &Arc<Session>,
    ) -> Result<FetchResult, BridgeError> {
        executor_for(session).call(&CallTarget::Model(self), method, args)
    }

    /// Fetches a model attribute that is itself a relation.
    pub fn attribute_relation(
        &self,
        method: &str,
        args: Vec<ParamValue>,
        session: &Arc<Session>,
    ) -> Result<Dataset, BridgeError> {
        executor_for(session).attribute_relation(&CallTarget::Model(self), method, args)
    }

    /// Returns a metadata writer for this model.
    pub fn writer(&self) -> MetadataWriter<'_> {
        MetadataWriter::new(self)
    }
}

impl MlObject for Model {
    fn spec(&self) -> &ObjectSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut ObjectSpec {
        &mut self.spec
    }

    fn class_name(&self) -> &str {
        &self.class_name
    }
}

/// An evaluator descriptor producing a metric from a dataset.
#[derive(Clone, Debug)]
pub struct Evaluator {
    class_name: String,
    spec: ObjectSpec,
}

impl Evaluator {
    /// Creates an evaluator with a fresh random uid.
    pub fn new(class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        let uid = random_uid(&class_name);
        Self {
            class_name,
            spec: ObjectSpec::new(uid),
        }
    }

    /// Replaces the generated uid with an explicit one.
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.spec.reset_uid(uid);
        self
    }

    /// Sets a user parameter value.
    pub fn with_param(mut self, name: &str, value: ParamValue) -> Self {
        self.spec.set(name, value);
        self
    }

    /// Evaluates the dataset, returning the metric value.
    pub fn evaluate(
        &self,
        dataset: &Dataset,
        session: &Arc<Session>,
    ) -> Result<ParamValue, BridgeError> {
        executor_for(session).evaluate(self, dataset)
    }

    /// Returns a metadata writer for this evaluator.
    pub fn writer(&self) -> MetadataWriter<'_> {
        MetadataWriter::new(self)
    }
}

impl MlObject for Evaluator {
    fn spec(&self) -> &ObjectSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut ObjectSpec {
        &mut self.spec
    }

    fn class_name(&self) -> &str {
        &self.class_name
    }
}
