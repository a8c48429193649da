//! Temporary dataset caching around multi-pass operations.
//!
//! Iterative steps that read a dataset several times pin it first. By
//! default the dataset is persisted in engine memory for the duration of
//! the step; when [`TEMP_DFS_PATH_ENV`](crate::session::TEMP_DFS_PATH_ENV)
//! is set, it is instead materialized under a random subdirectory of that
//! durable location and removed on exit. The env var is re-read on every
//! call. Cleanup runs whether the wrapped operation succeeds or fails.

use std::path::PathBuf;
use std::sync::Arc;

use crate::dataset::Dataset;
use crate::error::BridgeError;
use crate::invoke::{self, HELPER_ID};
use crate::mode::{self, ExecMode};
use crate::object::ParamValue;
use crate::persist;
use crate::session::{Session, TEMP_DFS_PATH_ENV};

/// The configured durable caching location, if any.
pub fn temp_dfs_path() -> Option<PathBuf> {
    std::env::var_os(TEMP_DFS_PATH_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn utility_call(
    session: &Arc<Session>,
    method: &str,
    args: Vec<ParamValue>,
) -> Result<ParamValue, BridgeError> {
    match mode::select(session) {
        ExecMode::Remote => invoke::helper_call(session, method, args),
        ExecMode::Local => {
            let engine = session.engine().ok_or(BridgeError::NoEngine)?;
            Ok(engine.call(HELPER_ID, method, &args)?)
        }
    }
}

/// Runs `f` with the dataset pinned for repeated reads.
///
/// With `enable` false the dataset is passed through untouched. Otherwise
/// the dataset is either persisted in memory and unpersisted afterwards,
/// or, when a durable caching location is configured, written below it and
/// the written copy both read back for `f` and deleted afterwards.
pub fn with_cached_dataset<T>(
    dataset: &Dataset,
    session: &Arc<Session>,
    enable: bool,
    f: impl FnOnce(&Dataset) -> Result<T, BridgeError>,
) -> Result<T, BridgeError> {
    if !enable {
        return f(dataset);
    }

    let plan_value =
        serde_json::to_value(dataset.plan()).map_err(|e| BridgeError::Serialization(e.to_string()))?;

    if let Some(base) = temp_dfs_path() {
        let cache_path = base.join(format!("{:032x}", rand::random::<u128>()));
        let cache_str = cache_path
            .to_str()
            .ok_or_else(|| BridgeError::PathType(cache_path.to_string_lossy().into_owned()))?
            .to_string();
        utility_call(
            session,
            "saveDataset",
            vec![ParamValue::from(cache_str.clone()), plan_value],
        )?;
        let cleanup_session = Arc::clone(session);
        let cleanup_path = cache_str.clone();
        let _cleanup = scopeguard::guard((), move |_| {
            let _ = persist::handle_overwrite(&cleanup_path, &cleanup_session);
        });
        let source = utility_call(session, "loadDataset", vec![ParamValue::from(cache_str)])?;
        f(&Dataset::from_source(source))
    } else {
        utility_call(session, "persistDataset", vec![plan_value.clone()])?;
        let cleanup_session = Arc::clone(session);
        let _cleanup = scopeguard::guard((), move |_| {
            let _ = utility_call(&cleanup_session, "unpersistDataset", vec![plan_value]);
        });
        f(dataset)
    }
}
