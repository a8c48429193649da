//! Versioned metadata persistence.
//!
//! An object's identity and parameters round-trip through a single JSON
//! record at `<path>/metadata`: class name, creation timestamp, producing
//! system version, uid, the two parameter maps, and any extension fields
//! merged at the top level. Loading resolves the class through the
//! [`TypeRegistry`] (remapping the native engine namespace when the record
//! was produced by the paired native implementation), reinstates the uid,
//! and applies both parameter maps. Records older than format version 2.4
//! are accepted without a default-parameter section.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::error::BridgeError;
use crate::invoke;
use crate::mode::{self, ExecMode};
use crate::object::{CLIENT_NAMESPACE, MlObject, ParamValue};
use crate::registry::TypeRegistry;
use crate::session::Session;

/// File name of the metadata record below the save location.
pub const METADATA_FILE: &str = "metadata";

/// Namespace prefix of the paired native engine implementation. Class
/// names persisted by it are remapped onto the client namespace at load.
pub const NATIVE_NAMESPACE: &str = "org.mlengine";

/// The persisted form of an ML object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Metadata {
    /// Fully qualified class name.
    pub class: String,
    /// Creation time, epoch milliseconds.
    pub timestamp: i64,
    /// Version string of the producing system.
    #[serde(rename = "engineVersion")]
    pub engine_version: String,
    /// Uid of the saved instance.
    pub uid: String,
    /// User-set parameter values.
    #[serde(rename = "paramMap")]
    pub param_map: BTreeMap<String, ParamValue>,
    /// Default parameter values. Absent in records produced before
    /// format version 2.4.
    #[serde(rename = "defaultParamMap", default, skip_serializing_if = "Option::is_none")]
    pub default_param_map: Option<BTreeMap<String, ParamValue>>,
    /// Subclass-specific extension fields, merged at the top level.
    #[serde(flatten)]
    pub extra: Map<String, ParamValue>,
}

/// Writer that persists an object's metadata record.
///
/// Overwrite semantics are explicit: without [`overwrite`](Self::overwrite)
/// an existing location is left untouched and the underlying storage call
/// fails naturally. Option keys are case-insensitive and stored
/// lower-cased, keeping the record deterministic.
pub struct MetadataWriter<'a> {
    instance: &'a dyn MlObject,
    session: Option<Arc<Session>>,
    should_overwrite: bool,
    options: BTreeMap<String, String>,
}

impl<'a> MetadataWriter<'a> {
    /// Creates a writer for the given instance.
    pub fn new(instance: &'a dyn MlObject) -> Self {
        Self {
            instance,
            session: None,
            should_overwrite: false,
            options: BTreeMap::new(),
        }
    }

    /// Overwrites the target location if it already exists.
    pub fn overwrite(mut self) -> Self {
        self.should_overwrite = true;
        self
    }

    /// Adds a writer option. The key is case-insensitive.
    pub fn option(mut self, key: &str, value: impl Into<String>) -> Self {
        self.options.insert(key.to_lowercase(), value.into());
        self
    }

    /// Accumulated writer options, keys lower-cased.
    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    /// Uses an explicit session instead of the registered one.
    pub fn session(mut self, session: Arc<Session>) -> Self {
        self.session = Some(session);
        self
    }

    fn resolve_session(&self) -> Result<Arc<Session>, BridgeError> {
        self.session
            .clone()
            .or_else(Session::active)
            .ok_or(BridgeError::NoActiveSession)
    }

    /// Saves the instance to the given location.
    pub fn save(&self, path: &Path) -> Result<(), BridgeError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BridgeError::PathType(path.to_string_lossy().into_owned()))?;
        let session = self.resolve_session()?;
        if self.should_overwrite {
            handle_overwrite(path_str, &session)?;
        }
        save_instance(self.instance, path, &session)
    }
}

/// Removes an existing target location ahead of an overwriting save.
///
/// In remote mode the removal runs on the session service through the
/// helper channel; in local mode it is a filesystem delete.
pub fn handle_overwrite(path: &str, session: &Arc<Session>) -> Result<(), BridgeError> {
    match mode::select(session) {
        ExecMode::Remote => {
            invoke::helper_call(
                session,
                "handleOverwrite",
                vec![ParamValue::from(path), ParamValue::from(true)],
            )?;
            Ok(())
        }
        ExecMode::Local => {
            let target = Path::new(path);
            if target.exists() {
                fs::remove_dir_all(target)?;
            }
            Ok(())
        }
    }
}

/// Validates and writes an instance: the metadata record plus any payload
/// the type defines (e.g. a composite's stage directories).
pub fn save_instance(
    instance: &dyn MlObject,
    path: &Path,
    session: &Arc<Session>,
) -> Result<(), BridgeError> {
    instance.validate_save()?;
    save_metadata(instance, path, session, None, None)?;
    instance.write_payload(path, session)
}

/// Writes the metadata record for an instance to `<path>/metadata`.
///
/// `extra` is merged at the top level alongside the instance's own
/// extension fields; `param_map` overrides the stored user-parameter map,
/// e.g. one produced by [`extract_params`] with a skip-list.
pub fn save_metadata(
    instance: &dyn MlObject,
    path: &Path,
    session: &Arc<Session>,
    extra: Option<Map<String, ParamValue>>,
    param_map: Option<BTreeMap<String, ParamValue>>,
) -> Result<(), BridgeError> {
    let json = metadata_json(instance, session, extra, param_map)?;
    fs::create_dir_all(path)?;
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path.join(METADATA_FILE))?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

/// Renders the metadata record for an instance as a single JSON line.
pub fn metadata_json(
    instance: &dyn MlObject,
    session: &Arc<Session>,
    extra: Option<Map<String, ParamValue>>,
    param_map: Option<BTreeMap<String, ParamValue>>,
) -> Result<String, BridgeError> {
    let mut merged = instance.extra_metadata().unwrap_or_default();
    if let Some(extra) = extra {
        merged.extend(extra);
    }
    let record = Metadata {
        class: instance.class_name().to_string(),
        timestamp: chrono::Utc::now().timestamp_millis(),
        engine_version: session.version().to_string(),
        uid: instance.uid().to_string(),
        param_map: param_map.unwrap_or_else(|| instance.spec().params().clone()),
        default_param_map: Some(instance.spec().defaults().clone()),
        extra: merged,
    };
    serde_json::to_string(&record).map_err(|e| BridgeError::Serialization(e.to_string()))
}

/// Resolved parameter values of an instance, minus a skip-list.
pub fn extract_params(
    instance: &dyn MlObject,
    skip_params: &[&str],
) -> BTreeMap<String, ParamValue> {
    instance
        .spec()
        .resolved()
        .into_iter()
        .filter(|(name, _)| !skip_params.contains(&name.as_str()))
        .collect()
}

/// Reads and parses the metadata record at `<path>/metadata`.
///
/// When `expected_class` is non-empty, a differing stored class name is a
/// hard structural error.
pub fn load_metadata(path: &Path, expected_class: &str) -> Result<Metadata, BridgeError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| BridgeError::PathType(path.to_string_lossy().into_owned()))?;
    let text = fs::read_to_string(Path::new(path_str).join(METADATA_FILE))?;
    parse_metadata(&text, expected_class)
}

/// Parses a metadata record from its JSON text.
pub fn parse_metadata(text: &str, expected_class: &str) -> Result<Metadata, BridgeError> {
    let metadata: Metadata =
        serde_json::from_str(text).map_err(|e| BridgeError::Serialization(e.to_string()))?;
    if !expected_class.is_empty() && metadata.class != expected_class {
        return Err(BridgeError::ClassMismatch {
            expected: expected_class.to_string(),
            found: metadata.class,
        });
    }
    Ok(metadata)
}

/// Applies a metadata record's parameters to an instance.
///
/// User-set values are applied through the parameter setter (respecting the
/// skip-list), defaults through the set-default operation. The default
/// section is required for records produced at format version 2.4 or later
/// and ignored for older records.
pub fn get_and_set_params(
    instance: &mut dyn MlObject,
    metadata: &Metadata,
    skip_params: &[&str],
) -> Result<(), BridgeError> {
    for (name, value) in &metadata.param_map {
        if !skip_params.contains(&name.as_str()) {
            instance.spec_mut().set(name.clone(), value.clone());
        }
    }

    let (major, minor) = major_minor_version(&metadata.engine_version)?;
    if major > 2 || (major == 2 && minor >= 4) {
        let defaults = metadata
            .default_param_map
            .as_ref()
            .ok_or(BridgeError::MissingDefaultSection)?;
        for (name, value) in defaults {
            instance.spec_mut().set_default(name.clone(), value.clone());
        }
    }
    Ok(())
}

/// Extracts `(major, minor)` from a `major.minor[.patch]` version string.
pub fn major_minor_version(version: &str) -> Result<(u32, u32), BridgeError> {
    let mut parts = version.splitn(3, '.');
    let major = parts.next().and_then(|p| p.parse().ok());
    let minor = parts.next().and_then(|p| p.parse().ok());
    match (major, minor) {
        (Some(major), Some(minor)) => Ok((major, minor)),
        _ => Err(BridgeError::InvalidVersion(version.to_string())),
    }
}

/// True when a class name belongs to this client's own namespace.
pub fn is_client_class(class_name: &str) -> bool {
    class_name
        .strip_prefix(CLIENT_NAMESPACE)
        .is_some_and(|rest| rest.starts_with('.'))
}

/// Maps a stored class name onto the client namespace. Names persisted by
/// the paired native engine have their namespace prefix remapped so they
/// resolve to the equivalent client-side mirror type.
pub fn resolved_class_name(class_name: &str) -> String {
    if is_client_class(class_name) {
        class_name.to_string()
    } else {
        class_name.replacen(NATIVE_NAMESPACE, CLIENT_NAMESPACE, 1)
    }
}

/// Reader that reconstructs a saved instance from its metadata record.
///
/// Loading is a filesystem read and needs no session. The stored class name
/// is resolved through the registry, remapping native-engine names onto the
/// client namespace first.
#[derive(Clone, Debug, Default)]
pub struct MetadataReader {
    expected_class: Option<String>,
    skip_params: Vec<String>,
}

impl MetadataReader {
    /// Creates a reader accepting any registered class.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the stored class to resolve to the given client class name.
    pub fn expecting(mut self, class_name: impl Into<String>) -> Self {
        self.expected_class = Some(class_name.into());
        self
    }

    /// Skips a stored user parameter when applying the record.
    pub fn skip_param(mut self, name: impl Into<String>) -> Self {
        self.skip_params.push(name.into());
        self
    }

    /// Loads the instance at the given location via the process-wide
    /// registry.
    pub fn load(&self, path: &Path) -> Result<Box<dyn MlObject>, BridgeError> {
        let registry = TypeRegistry::global()
            .read()
            .unwrap_or_else(|poison| poison.into_inner());
        self.load_with(path, &registry)
    }

    /// Loads the instance, resolving its stored class name through the
    /// given registry.
    pub fn load_with(
        &self,
        path: &Path,
        registry: &TypeRegistry,
    ) -> Result<Box<dyn MlObject>, BridgeError> {
        let metadata = load_metadata(path, "")?;
        let class_name = resolved_class_name(&metadata.class);
        if let Some(expected) = &self.expected_class {
            if &class_name != expected {
                return Err(BridgeError::ClassMismatch {
                    expected: expected.clone(),
                    found: metadata.class,
                });
            }
        }
        if let Some(reader) = registry.reader_for(&class_name) {
            return reader(path, registry);
        }
        let mut instance = registry.instantiate(&class_name)?;
        instance.spec_mut().reset_uid(metadata.uid.clone());
        let skip: Vec<&str> = self.skip_params.iter().map(String::as_str).collect();
        get_and_set_params(instance.as_mut(), &metadata, &skip)?;
        Ok(instance)
    }
}

/// Loads a saved instance through the process-wide registry.
pub fn load_instance(path: &Path) -> Result<Box<dyn MlObject>, BridgeError> {
    MetadataReader::new().load(path)
}

/// Loads a saved instance, resolving its stored class name through the
/// given registry.
pub fn load_instance_with(
    path: &Path,
    registry: &TypeRegistry,
) -> Result<Box<dyn MlObject>, BridgeError> {
    MetadataReader::new().load_with(path, registry)
}
