//! Composite pipeline and wrapper types.
//!
//! These are the objects [`crate::composite`] traverses: sequential
//! pipelines (unfitted and fitted), one-vs-rest wrappers, and tuning
//! validators. Composites persist their nested stages under the save
//! location (`stages/<idx>_<uid>`, `classifier`, `models/<idx>_<uid>`) and
//! record the uid lists as extension fields of the metadata record, after
//! validating that the transitive stage set has no duplicate uids.

use std::path::Path;
use std::sync::Arc;

use serde_json::Map;

use crate::composite;
use crate::error::BridgeError;
use crate::object::{CompositeKind, MlObject, ObjectSpec, ParamValue, random_uid};
use crate::persist::{self, MetadataWriter};
use crate::registry::TypeRegistry;
use crate::session::Session;

/// Class name of [`Pipeline`].
pub const PIPELINE_CLASS: &str = "mlbridge.pipeline.Pipeline";
/// Class name of [`PipelineModel`].
pub const PIPELINE_MODEL_CLASS: &str = "mlbridge.pipeline.PipelineModel";
/// Class name of [`OneVsRest`].
pub const ONE_VS_REST_CLASS: &str = "mlbridge.classification.OneVsRest";
/// Class name of [`OneVsRestModel`].
pub const ONE_VS_REST_MODEL_CLASS: &str = "mlbridge.classification.OneVsRestModel";
/// Class name of [`CrossValidator`].
pub const CROSS_VALIDATOR_CLASS: &str = "mlbridge.tuning.CrossValidator";
/// Class name of [`TrainValidationSplit`].
pub const TRAIN_VALIDATION_SPLIT_CLASS: &str = "mlbridge.tuning.TrainValidationSplit";

fn uid_list(stages: &[Box<dyn MlObject>]) -> ParamValue {
    ParamValue::from(
        stages
            .iter()
            .map(|stage| stage.uid().to_string())
            .collect::<Vec<_>>(),
    )
}

fn write_stage_list(
    dir: &Path,
    stages: &[Box<dyn MlObject>],
    session: &Arc<Session>,
) -> Result<(), BridgeError> {
    for (index, stage) in stages.iter().enumerate() {
        let stage_path = dir.join(format!("{index}_{}", stage.uid()));
        persist::save_instance(stage.as_ref(), &stage_path, session)?;
    }
    Ok(())
}

fn read_stage_list(
    dir: &Path,
    uids: &[String],
    registry: &TypeRegistry,
) -> Result<Vec<Box<dyn MlObject>>, BridgeError> {
    let mut stages = Vec::with_capacity(uids.len());
    for (index, uid) in uids.iter().enumerate() {
        let stage_path = dir.join(format!("{index}_{uid}"));
        stages.push(persist::load_instance_with(&stage_path, registry)?);
    }
    Ok(stages)
}

// Native-engine records store their own namespace; compare after remap so
// they load into the mirror composite type.
fn load_composite_metadata(
    path: &Path,
    class_name: &str,
) -> Result<persist::Metadata, BridgeError> {
    let metadata = persist::load_metadata(path, "")?;
    if persist::resolved_class_name(&metadata.class) != class_name {
        return Err(BridgeError::ClassMismatch {
            expected: class_name.to_string(),
            found: metadata.class,
        });
    }
    Ok(metadata)
}

fn extra_uid_list(
    metadata: &persist::Metadata,
    field: &str,
) -> Result<Vec<String>, BridgeError> {
    let value = metadata
        .extra
        .get(field)
        .ok_or_else(|| BridgeError::InvalidMetadata(format!("missing `{field}` field")))?;
    serde_json::from_value(value.clone()).map_err(|e| BridgeError::InvalidMetadata(e.to_string()))
}

/// A sequential pipeline of estimator and transformer stages.
#[derive(Debug)]
pub struct Pipeline {
    spec: ObjectSpec,
    stages: Vec<Box<dyn MlObject>>,
}

impl Pipeline {
    /// Creates an empty pipeline with a fresh random uid.
    pub fn new() -> Self {
        Self {
            spec: ObjectSpec::new(random_uid(PIPELINE_CLASS)),
            stages: Vec::new(),
        }
    }

    /// Replaces the generated uid with an explicit one.
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.spec.reset_uid(uid);
        self
    }

    /// Appends a stage.
    pub fn with_stage(mut self, stage: impl MlObject + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Appends an already boxed stage.
    pub fn push_stage(&mut self, stage: Box<dyn MlObject>) {
        self.stages.push(stage);
    }

    /// The ordered stage sequence.
    pub fn stages(&self) -> &[Box<dyn MlObject>] {
        &self.stages
    }

    /// Returns a metadata writer for this pipeline.
    pub fn writer(&self) -> MetadataWriter<'_> {
        MetadataWriter::new(self)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl MlObject for Pipeline {
    fn spec(&self) -> &ObjectSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut ObjectSpec {
        &mut self.spec
    }

    fn class_name(&self) -> &str {
        PIPELINE_CLASS
    }

    fn composite_kind(&self) -> CompositeKind {
        CompositeKind::Pipeline
    }

    fn sub_stages(&self) -> Vec<&dyn MlObject> {
        self.stages.iter().map(AsRef::as_ref).collect()
    }

    fn extra_metadata(&self) -> Option<Map<String, ParamValue>> {
        let mut extra = Map::new();
        extra.insert("stageUids".to_string(), uid_list(&self.stages));
        Some(extra)
    }

    fn validate_save(&self) -> Result<(), BridgeError> {
        composite::uid_map(self)?;
        Ok(())
    }

    fn write_payload(&self, path: &Path, session: &Arc<Session>) -> Result<(), BridgeError> {
        write_stage_list(&path.join("stages"), &self.stages, session)
    }
}

/// Registry reader for [`Pipeline`].
pub(crate) fn read_pipeline(
    path: &Path,
    registry: &TypeRegistry,
) -> Result<Box<dyn MlObject>, BridgeError> {
    let metadata = load_composite_metadata(path, PIPELINE_CLASS)?;
    let uids = extra_uid_list(&metadata, "stageUids")?;
    let stages = read_stage_list(&path.join("stages"), &uids, registry)?;
    let mut pipeline = Pipeline::new();
    pipeline.spec.reset_uid(metadata.uid.clone());
    persist::get_and_set_params(&mut pipeline, &metadata, &[])?;
    pipeline.stages = stages;
    Ok(Box::new(pipeline))
}

/// A fitted pipeline holding the fitted stage sequence.
#[derive(Debug)]
pub struct PipelineModel {
    spec: ObjectSpec,
    stages: Vec<Box<dyn MlObject>>,
}

impl PipelineModel {
    /// Creates a fitted pipeline from its fitted stages.
    pub fn new(stages: Vec<Box<dyn MlObject>>) -> Self {
        Self {
            spec: ObjectSpec::new(random_uid(PIPELINE_MODEL_CLASS)),
            stages,
        }
    }

    /// Replaces the generated uid with an explicit one.
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.spec.reset_uid(uid);
        self
    }

    /// The ordered fitted stage sequence.
    pub fn stages(&self) -> &[Box<dyn MlObject>] {
        &self.stages
    }

    /// Returns a metadata writer for this fitted pipeline.
    pub fn writer(&self) -> MetadataWriter<'_> {
        MetadataWriter::new(self)
    }
}

impl MlObject for PipelineModel {
    fn spec(&self) -> &ObjectSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut ObjectSpec {
        &mut self.spec
    }

    fn class_name(&self) -> &str {
        PIPELINE_MODEL_CLASS
    }

    fn composite_kind(&self) -> CompositeKind {
        CompositeKind::PipelineModel
    }

    fn sub_stages(&self) -> Vec<&dyn MlObject> {
        self.stages.iter().map(AsRef::as_ref).collect()
    }

    fn extra_metadata(&self) -> Option<Map<String, ParamValue>> {
        let mut extra = Map::new();
        extra.insert("stageUids".to_string(), uid_list(&self.stages));
        Some(extra)
    }

    fn validate_save(&self) -> Result<(), BridgeError> {
        composite::uid_map(self)?;
        Ok(())
    }

    fn write_payload(&self, path: &Path, session: &Arc<Session>) -> Result<(), BridgeError> {
        write_stage_list(&path.join("stages"), &self.stages, session)
    }
}

/// Registry reader for [`PipelineModel`].
pub(crate) fn read_pipeline_model(
    path: &Path,
    registry: &TypeRegistry,
) -> Result<Box<dyn MlObject>, BridgeError> {
    let metadata = load_composite_metadata(path, PIPELINE_MODEL_CLASS)?;
    let uids = extra_uid_list(&metadata, "stageUids")?;
    let stages = read_stage_list(&path.join("stages"), &uids, registry)?;
    let mut model = PipelineModel::new(stages);
    model.spec.reset_uid(metadata.uid.clone());
    persist::get_and_set_params(&mut model, &metadata, &[])?;
    Ok(Box::new(model))
}

/// A one-vs-rest wrapper around a single binary classifier.
#[derive(Debug)]
pub struct OneVsRest {
    spec: ObjectSpec,
    classifier: Box<dyn MlObject>,
}

impl OneVsRest {
    /// Creates a wrapper around the given classifier.
    pub fn new(classifier: impl MlObject + 'static) -> Self {
        Self {
            spec: ObjectSpec::new(random_uid(ONE_VS_REST_CLASS)),
            classifier: Box::new(classifier),
        }
    }

    /// Replaces the generated uid with an explicit one.
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.spec.reset_uid(uid);
        self
    }

    /// The wrapped classifier.
    pub fn classifier(&self) -> &dyn MlObject {
        self.classifier.as_ref()
    }

    /// Returns a metadata writer for this wrapper.
    pub fn writer(&self) -> MetadataWriter<'_> {
        MetadataWriter::new(self)
    }
}

impl MlObject for OneVsRest {
    fn spec(&self) -> &ObjectSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut ObjectSpec {
        &mut self.spec
    }

    fn class_name(&self) -> &str {
        ONE_VS_REST_CLASS
    }

    fn composite_kind(&self) -> CompositeKind {
        CompositeKind::OneVsRest
    }

    fn sub_stages(&self) -> Vec<&dyn MlObject> {
        vec![self.classifier.as_ref()]
    }

    fn validate_save(&self) -> Result<(), BridgeError> {
        composite::uid_map(self)?;
        Ok(())
    }

    fn write_payload(&self, path: &Path, session: &Arc<Session>) -> Result<(), BridgeError> {
        persist::save_instance(self.classifier.as_ref(), &path.join("classifier"), session)
    }
}

/// Registry reader for [`OneVsRest`].
pub(crate) fn read_one_vs_rest(
    path: &Path,
    registry: &TypeRegistry,
) -> Result<Box<dyn MlObject>, BridgeError> {
    let metadata = load_composite_metadata(path, ONE_VS_REST_CLASS)?;
    let classifier = persist::load_instance_with(&path.join("classifier"), registry)?;
    let mut wrapper = OneVsRest {
        spec: ObjectSpec::new(metadata.uid.clone()),
        classifier,
    };
    persist::get_and_set_params(&mut wrapper, &metadata, &[])?;
    Ok(Box::new(wrapper))
}

/// A fitted one-vs-rest wrapper: the classifier plus per-class models.
#[derive(Debug)]
pub struct OneVsRestModel {
    spec: ObjectSpec,
    classifier: Box<dyn MlObject>,
    models: Vec<Box<dyn MlObject>>,
}

impl OneVsRestModel {
    /// Creates a fitted wrapper from the classifier and per-class models.
    pub fn new(classifier: impl MlObject + 'static, models: Vec<Box<dyn MlObject>>) -> Self {
        Self {
            spec: ObjectSpec::new(random_uid(ONE_VS_REST_MODEL_CLASS)),
            classifier: Box::new(classifier),
            models,
        }
    }

    /// Replaces the generated uid with an explicit one.
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.spec.reset_uid(uid);
        self
    }

    /// The wrapped classifier.
    pub fn classifier(&self) -> &dyn MlObject {
        self.classifier.as_ref()
    }

    /// The per-class fitted models.
    pub fn models(&self) -> &[Box<dyn MlObject>] {
        &self.models
    }

    /// Returns a metadata writer for this fitted wrapper.
    pub fn writer(&self) -> MetadataWriter<'_> {
        MetadataWriter::new(self)
    }
}

impl MlObject for OneVsRestModel {
    fn spec(&self) -> &ObjectSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut ObjectSpec {
        &mut self.spec
    }

    fn class_name(&self) -> &str {
        ONE_VS_REST_MODEL_CLASS
    }

    fn composite_kind(&self) -> CompositeKind {
        CompositeKind::OneVsRestModel
    }

    fn sub_stages(&self) -> Vec<&dyn MlObject> {
        let mut stages: Vec<&dyn MlObject> = vec![self.classifier.as_ref()];
        stages.extend(self.models.iter().map(AsRef::as_ref));
        stages
    }

    fn extra_metadata(&self) -> Option<Map<String, ParamValue>> {
        let mut extra = Map::new();
        extra.insert("modelUids".to_string(), uid_list(&self.models));
        Some(extra)
    }

    fn validate_save(&self) -> Result<(), BridgeError> {
        composite::uid_map(self)?;
        Ok(())
    }

    fn write_payload(&self, path: &Path, session: &Arc<Session>) -> Result<(), BridgeError> {
        persist::save_instance(self.classifier.as_ref(), &path.join("classifier"), session)?;
        write_stage_list(&path.join("models"), &self.models, session)
    }
}

/// Registry reader for [`OneVsRestModel`].
pub(crate) fn read_one_vs_rest_model(
    path: &Path,
    registry: &TypeRegistry,
) -> Result<Box<dyn MlObject>, BridgeError> {
    let metadata = load_composite_metadata(path, ONE_VS_REST_MODEL_CLASS)?;
    let uids = extra_uid_list(&metadata, "modelUids")?;
    let classifier = persist::load_instance_with(&path.join("classifier"), registry)?;
    let models = read_stage_list(&path.join("models"), &uids, registry)?;
    let mut model = OneVsRestModel {
        spec: ObjectSpec::new(metadata.uid.clone()),
        classifier,
        models,
    };
    persist::get_and_set_params(&mut model, &metadata, &[])?;
    Ok(Box::new(model))
}

/// K-fold cross-validation wrapper over an estimator.
///
/// Validators carry nested candidate stages; expanding them is unsupported
/// and fails fast rather than attempting partial traversal.
#[derive(Debug)]
pub struct CrossValidator {
    spec: ObjectSpec,
    estimator: Box<dyn MlObject>,
}

impl CrossValidator {
    /// Creates a validator over the given estimator.
    pub fn new(estimator: impl MlObject + 'static) -> Self {
        Self {
            spec: ObjectSpec::new(random_uid(CROSS_VALIDATOR_CLASS)),
            estimator: Box::new(estimator),
        }
    }

    /// The estimator under validation.
    pub fn estimator(&self) -> &dyn MlObject {
        self.estimator.as_ref()
    }
}

impl MlObject for CrossValidator {
    fn spec(&self) -> &ObjectSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut ObjectSpec {
        &mut self.spec
    }

    fn class_name(&self) -> &str {
        CROSS_VALIDATOR_CLASS
    }

    fn composite_kind(&self) -> CompositeKind {
        CompositeKind::Validator
    }

    fn sub_stages(&self) -> Vec<&dyn MlObject> {
        vec![self.estimator.as_ref()]
    }

    fn validate_save(&self) -> Result<(), BridgeError> {
        Err(BridgeError::NestedValidator(
            CROSS_VALIDATOR_CLASS.to_string(),
        ))
    }
}

/// Single train/validation split wrapper over an estimator.
///
/// Same traversal restrictions as [`CrossValidator`].
#[derive(Debug)]
pub struct TrainValidationSplit {
    spec: ObjectSpec,
    estimator: Box<dyn MlObject>,
}

impl TrainValidationSplit {
    /// Creates a split validator over the given estimator.
    pub fn new(estimator: impl MlObject + 'static) -> Self {
        Self {
            spec: ObjectSpec::new(random_uid(TRAIN_VALIDATION_SPLIT_CLASS)),
            estimator: Box::new(estimator),
        }
    }

    /// The estimator under validation.
    pub fn estimator(&self) -> &dyn MlObject {
        self.estimator.as_ref()
    }
}

impl MlObject for TrainValidationSplit {
    fn spec(&self) -> &ObjectSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut ObjectSpec {
        &mut self.spec
    }

    fn class_name(&self) -> &str {
        TRAIN_VALIDATION_SPLIT_CLASS
    }

    fn composite_kind(&self) -> CompositeKind {
        CompositeKind::Validator
    }

    fn sub_stages(&self) -> Vec<&dyn MlObject> {
        vec![self.estimator.as_ref()]
    }

    fn validate_save(&self) -> Result<(), BridgeError> {
        Err(BridgeError::NestedValidator(
            TRAIN_VALIDATION_SPLIT_CLASS.to_string(),
        ))
    }
}
