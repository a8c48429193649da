//! Identity and parameter model shared by every bridge object.
//!
//! Every estimator, transformer, model, and evaluator carries an
//! [`ObjectSpec`]: a uid that is stable across save/load plus two parameter
//! maps, one for user-set values and one for defaults. User-set values win
//! over defaults for any key present in both. The [`MlObject`] trait is the
//! common surface consumed by composite traversal and metadata persistence.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Map;

use crate::error::BridgeError;
use crate::session::Session;

/// JSON-representable parameter value.
pub type ParamValue = serde_json::Value;

/// Namespace prefix for client-side class names, e.g.
/// `mlbridge.pipeline.Pipeline`.
pub const CLIENT_NAMESPACE: &str = "mlbridge";

/// How an object participates in composite traversal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompositeKind {
    /// Terminal object with no sub-stages.
    Leaf,
    /// Sequential pipeline of estimator/transformer stages.
    Pipeline,
    /// Fitted pipeline holding the fitted stage sequence.
    PipelineModel,
    /// One-vs-rest wrapper around a single classifier.
    OneVsRest,
    /// Fitted one-vs-rest wrapper: classifier plus per-class models.
    OneVsRestModel,
    /// Estimator with nested candidate stages (tuning validators).
    /// Traversal of this kind is unsupported and fails fast.
    Validator,
}

/// Generates a uid of the form `<ShortName>_<12 hex chars>`.
pub fn random_uid(class_name: &str) -> String {
    let short = class_name.rsplit('.').next().unwrap_or(class_name);
    let suffix = rand::random::<u64>() & 0xffff_ffff_ffff;
    format!("{short}_{suffix:012x}")
}

/// Identity plus parameter state of an ML object.
///
/// The uid is fixed at construction; only loading a persisted record or
/// fit-time uid propagation may rewrite it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectSpec {
    uid: String,
    params: BTreeMap<String, ParamValue>,
    defaults: BTreeMap<String, ParamValue>,
}

impl ObjectSpec {
    /// Creates an empty spec with the given uid.
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            params: BTreeMap::new(),
            defaults: BTreeMap::new(),
        }
    }

    /// Returns the unique identifier.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub(crate) fn reset_uid(&mut self, uid: impl Into<String>) {
        self.uid = uid.into();
    }

    /// Sets a user-supplied parameter value.
    pub fn set(&mut self, name: impl Into<String>, value: ParamValue) {
        self.params.insert(name.into(), value);
    }

    /// Sets a default parameter value.
    pub fn set_default(&mut self, name: impl Into<String>, value: ParamValue) {
        self.defaults.insert(name.into(), value);
    }

    /// Returns the value for a parameter, user-set winning over default.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name).or_else(|| self.defaults.get(name))
    }

    /// User-set parameter values.
    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }

    /// Default parameter values.
    pub fn defaults(&self) -> &BTreeMap<String, ParamValue> {
        &self.defaults
    }

    /// Resolved view: defaults overlaid with user-set values.
    pub fn resolved(&self) -> BTreeMap<String, ParamValue> {
        let mut resolved = self.defaults.clone();
        resolved.extend(self.params.iter().map(|(k, v)| (k.clone(), v.clone())));
        resolved
    }

    /// Copies both parameter maps from another spec, leaving the uid alone.
    pub fn copy_values_from(&mut self, other: &ObjectSpec) {
        for (name, value) in other.params() {
            self.params.insert(name.clone(), value.clone());
        }
        for (name, value) in other.defaults() {
            self.defaults.insert(name.clone(), value.clone());
        }
    }
}

/// Common surface of estimators, transformers, models, and evaluators.
///
/// Composite types override [`composite_kind`](MlObject::composite_kind) and
/// [`sub_stages`](MlObject::sub_stages) for traversal, and the persistence
/// hooks to write their nested stages.
pub trait MlObject: std::fmt::Debug {
    /// Identity and parameter state.
    fn spec(&self) -> &ObjectSpec;

    /// Mutable identity and parameter state.
    fn spec_mut(&mut self) -> &mut ObjectSpec;

    /// Fully qualified class name.
    fn class_name(&self) -> &str;

    /// Unique identifier, stable across save/load.
    fn uid(&self) -> &str {
        self.spec().uid()
    }

    /// How this object participates in composite traversal.
    fn composite_kind(&self) -> CompositeKind {
        CompositeKind::Leaf
    }

    /// Immediate sub-stages for composite traversal. Terminal objects
    /// return an empty sequence.
    fn sub_stages(&self) -> Vec<&dyn MlObject> {
        Vec::new()
    }

    /// Extension fields merged at the top level of the persisted metadata
    /// record (e.g. a composite's sub-stage uid list).
    fn extra_metadata(&self) -> Option<Map<String, ParamValue>> {
        None
    }

    /// Structural validation performed before anything is written.
    fn validate_save(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    /// Writes state beyond the metadata record, such as nested stage
    /// directories. The default writes nothing.
    fn write_payload(&self, path: &Path, session: &Arc<Session>) -> Result<(), BridgeError> {
        let _ = (path, session);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn random_uid_uses_short_name_and_hex_suffix() {
        let uid = random_uid("mlbridge.classification.LogisticRegression");
        let (name, suffix) = uid.split_once('_').expect("separator");
        assert_eq!(name, "LogisticRegression");
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn user_value_wins_over_default() {
        let mut spec = ObjectSpec::new("a_1");
        spec.set_default("maxIter", json!(100));
        spec.set_default("tol", json!(1e-6));
        spec.set("maxIter", json!(25));

        assert_eq!(spec.get("maxIter"), Some(&json!(25)));
        assert_eq!(spec.get("tol"), Some(&json!(1e-6)));
        let resolved = spec.resolved();
        assert_eq!(resolved["maxIter"], json!(25));
        assert_eq!(resolved["tol"], json!(1e-6));
    }

    #[test]
    fn copy_values_preserves_uid() {
        let mut source = ObjectSpec::new("src_1");
        source.set("threshold", json!(0.5));
        source.set_default("maxIter", json!(10));

        let mut target = ObjectSpec::new("dst_1");
        target.copy_values_from(&source);
        assert_eq!(target.uid(), "dst_1");
        assert_eq!(target.get("threshold"), Some(&json!(0.5)));
        assert_eq!(target.get("maxIter"), Some(&json!(10)));
    }
}
