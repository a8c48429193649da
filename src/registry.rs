//! Registry of loadable class names.
//!
//! Persisted metadata drives reconstruction by fully qualified class name.
//! Rather than runtime introspection, the loadable set is a closed registry
//! mapping each class name to a zero-argument factory, populated at process
//! start. Composites whose construction needs nested stages register a
//! reader instead; the reader loads the stage tree from storage.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{OnceLock, RwLock};

use crate::error::BridgeError;
use crate::object::MlObject;
use crate::operators::{Estimator, Evaluator, Model, Transformer};
use crate::pipeline::{
    ONE_VS_REST_CLASS, ONE_VS_REST_MODEL_CLASS, PIPELINE_CLASS, PIPELINE_MODEL_CLASS,
    read_one_vs_rest, read_one_vs_rest_model, read_pipeline, read_pipeline_model,
};

type Factory = Box<dyn Fn() -> Box<dyn MlObject> + Send + Sync>;

/// Reader for types whose persisted state is more than a metadata record.
pub type ReaderFn = fn(&Path, &TypeRegistry) -> Result<Box<dyn MlObject>, BridgeError>;

struct RegistryEntry {
    factory: Option<Factory>,
    reader: Option<ReaderFn>,
}

/// Closed mapping from fully qualified class names to constructors.
pub struct TypeRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Creates a registry pre-populated with the composite types the crate
    /// ships.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_reader(PIPELINE_CLASS, read_pipeline);
        registry.register_reader(PIPELINE_MODEL_CLASS, read_pipeline_model);
        registry.register_reader(ONE_VS_REST_CLASS, read_one_vs_rest);
        registry.register_reader(ONE_VS_REST_MODEL_CLASS, read_one_vs_rest_model);
        registry
    }

    /// Registers a zero-argument factory for a class name.
    pub fn register(
        &mut self,
        class_name: &str,
        factory: impl Fn() -> Box<dyn MlObject> + Send + Sync + 'static,
    ) {
        self.entries.insert(
            class_name.to_string(),
            RegistryEntry {
                factory: Some(Box::new(factory)),
                reader: None,
            },
        );
    }

    /// Registers a reader for a composite class whose reconstruction needs
    /// more than the metadata record.
    pub fn register_reader(&mut self, class_name: &str, reader: ReaderFn) {
        self.entries.insert(
            class_name.to_string(),
            RegistryEntry {
                factory: None,
                reader: Some(reader),
            },
        );
    }

    /// Registers a generic estimator class.
    pub fn register_estimator(&mut self, class_name: &str) {
        let name = class_name.to_string();
        self.register(class_name, move || Box::new(Estimator::new(name.clone())));
    }

    /// Registers a generic transformer class.
    pub fn register_transformer(&mut self, class_name: &str) {
        let name = class_name.to_string();
        self.register(class_name, move || Box::new(Transformer::new(name.clone())));
    }

    /// Registers a generic model class. Reconstructed models are detached
    /// from any execution backend.
    pub fn register_model(&mut self, class_name: &str) {
        let name = class_name.to_string();
        self.register(class_name, move || Box::new(Model::detached(name.clone())));
    }

    /// Registers a generic evaluator class.
    pub fn register_evaluator(&mut self, class_name: &str) {
        let name = class_name.to_string();
        self.register(class_name, move || Box::new(Evaluator::new(name.clone())));
    }

    /// True when the class name is registered.
    pub fn contains(&self, class_name: &str) -> bool {
        self.entries.contains_key(class_name)
    }

    /// Instantiates a registered class with no arguments.
    pub fn instantiate(&self, class_name: &str) -> Result<Box<dyn MlObject>, BridgeError> {
        let entry = self
            .entries
            .get(class_name)
            .ok_or_else(|| BridgeError::UnknownClass(class_name.to_string()))?;
        match &entry.factory {
            Some(factory) => Ok(factory()),
            None => Err(BridgeError::Unsupported(format!(
                "class {class_name} can only be reconstructed through its registered reader"
            ))),
        }
    }

    /// The reader registered for a class, if any.
    pub fn reader_for(&self, class_name: &str) -> Option<ReaderFn> {
        self.entries.get(class_name).and_then(|entry| entry.reader)
    }

    /// The process-wide registry, initialized with builtins on first use.
    pub fn global() -> &'static RwLock<TypeRegistry> {
        static GLOBAL: OnceLock<RwLock<TypeRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| RwLock::new(TypeRegistry::with_builtins()))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
