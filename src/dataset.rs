//! Opaque dataset handle and its logical plan.
//!
//! A [`Dataset`] is never materialized by the bridge; it carries a
//! serializable [`Plan`] describing how the relation is computed, plus the
//! strong holds that keep any server-side objects the plan depends on alive
//! for as long as the handle (or a handle derived from it) is reachable.

use serde::{Deserialize, Serialize};

use crate::command::{FetchMethod, MlParams};
use crate::object::ParamValue;
use crate::remote::RemoteRefHold;

/// Logical plan of a dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Plan {
    /// Opaque source relation supplied by the caller.
    Source(ParamValue),
    /// Application of a transformer or fitted model to a child relation.
    Transform {
        /// Operator name, or the model's reference id when `is_model`.
        name: String,
        /// Uid of the unfitted transformer; absent for models.
        uid: Option<String>,
        /// Serialized operator parameters.
        params: MlParams,
        /// True when `name` addresses a fitted server-side model.
        is_model: bool,
        /// The relation being transformed.
        child: Box<Plan>,
    },
    /// An attribute of a server-side object materialized as a relation,
    /// e.g. a curve from a trained model's summary.
    Attribute {
        /// Base object reference.
        obj_ref: String,
        /// Chained method applications leading to the relation.
        methods: Vec<FetchMethod>,
        /// Child relation, present when the chain starts at a summary.
        child: Option<Box<Plan>>,
    },
}

/// Opaque handle to a tabular dataset.
#[derive(Clone, Debug)]
pub struct Dataset {
    plan: Plan,
    holds: Vec<RemoteRefHold>,
}

impl Dataset {
    /// Wraps a caller-supplied source relation.
    pub fn from_source(source: ParamValue) -> Self {
        Self::from_plan(Plan::Source(source))
    }

    /// Wraps an existing plan with no server-side dependencies.
    pub fn from_plan(plan: Plan) -> Self {
        Self {
            plan,
            holds: Vec::new(),
        }
    }

    pub(crate) fn with_holds(plan: Plan, holds: Vec<RemoteRefHold>) -> Self {
        Self { plan, holds }
    }

    /// The logical plan of this dataset.
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub(crate) fn holds(&self) -> &[RemoteRefHold] {
        &self.holds
    }
}
