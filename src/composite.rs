//! Composite traversal and uid validation.
//!
//! A composite owns or orders other ML objects: a pipeline's stage
//! sequence, a one-vs-rest wrapper's classifier and per-class models.
//! Traversal expands the full transitive stage tree in document order;
//! validators with nested candidate stages are rejected rather than
//! partially traversed. The transitive stage set must have unique uids.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::BridgeError;
use crate::object::{CompositeKind, MlObject};

/// True when the object owns nested sub-stages (including validators,
/// whose traversal is unsupported).
pub fn is_composite(obj: &dyn MlObject) -> bool {
    !matches!(obj.composite_kind(), CompositeKind::Leaf)
}

/// Recursively expands a composite into `[obj]` followed by the expansion
/// of each immediate sub-stage, in order. Terminal objects yield
/// themselves. Validators fail fast with a descriptive error.
pub fn all_nested_stages<'a>(obj: &'a dyn MlObject) -> Result<Vec<&'a dyn MlObject>, BridgeError> {
    if matches!(obj.composite_kind(), CompositeKind::Validator) {
        return Err(BridgeError::NestedValidator(obj.class_name().to_string()));
    }
    let mut stages: Vec<&'a dyn MlObject> = vec![obj];
    for sub in obj.sub_stages() {
        stages.extend(all_nested_stages(sub)?);
    }
    Ok(stages)
}

/// Maps each nested stage's uid to the stage. Fails with a structural
/// error naming the colliding uids when two distinct stages share one.
pub fn uid_map<'a>(
    obj: &'a dyn MlObject,
) -> Result<BTreeMap<String, &'a dyn MlObject>, BridgeError> {
    let stages = all_nested_stages(obj)?;
    let mut map: BTreeMap<String, &dyn MlObject> = BTreeMap::new();
    let mut colliding = BTreeSet::new();
    for stage in stages {
        if map.insert(stage.uid().to_string(), stage).is_some() {
            colliding.insert(stage.uid().to_string());
        }
    }
    if !colliding.is_empty() {
        return Err(BridgeError::DuplicateUids(colliding.into_iter().collect()));
    }
    Ok(map)
}
