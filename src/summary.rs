//! Training summaries attached to fitted models.
//!
//! A summary is owned by exactly one model. In remote mode it keeps an
//! `add_ref`-ed hold on the owning model's reference so the model cannot be
//! deleted server-side while the summary is alive; dropping the summary
//! releases that hold. The summary's own id is a derived reference
//! (`<model>.summary`) and never owns server-side lifetime itself.

use std::sync::Arc;

use crate::command::FetchResult;
use crate::dataset::Dataset;
use crate::error::BridgeError;
use crate::executor::{CallTarget, executor_for};
use crate::object::ParamValue;
use crate::remote::RemoteRefHold;
use crate::session::Session;

/// Summary of a model's training run.
#[derive(Debug)]
pub struct TrainingSummary {
    ref_id: String,
    dataset: Dataset,
    model_hold: Option<RemoteRefHold>,
}

impl TrainingSummary {
    pub(crate) fn new(ref_id: String, dataset: Dataset, model_hold: Option<RemoteRefHold>) -> Self {
        Self {
            ref_id,
            dataset,
            model_hold,
        }
    }

    /// Derived reference id of this summary.
    pub fn ref_id(&self) -> &str {
        &self.ref_id
    }

    /// The dataset the summary was computed over.
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub(crate) fn model_hold(&self) -> Option<&RemoteRefHold> {
        self.model_hold.as_ref()
    }

    /// Invokes a method on the summary, e.g. an accuracy accessor.
    ///
    /// If the service has evicted the summary, it is recreated from the
    /// retained model reference and the call is replayed exactly once.
    pub fn call(
        &self,
        method: &str,
        args: Vec<ParamValue>,
        session: &Arc<Session>,
    ) -> Result<FetchResult, BridgeError> {
        executor_for(session).call(&CallTarget::Summary(self), method, args)
    }

    /// Fetches a summary attribute that is itself a relation, e.g. a curve.
    pub fn attribute_relation(
        &self,
        method: &str,
        args: Vec<ParamValue>,
        session: &Arc<Session>,
    ) -> Result<Dataset, BridgeError> {
        executor_for(session).attribute_relation(&CallTarget::Summary(self), method, args)
    }
}
