//! Tests for metadata persistence: round trips, version gating, overwrite
//! semantics, and cross-namespace class resolution.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use crate::error::BridgeError;
use crate::object::MlObject;
use crate::operators::{Estimator, Transformer};
use crate::persist::{
    self, MetadataReader, MetadataWriter, load_metadata, major_minor_version, parse_metadata,
    resolved_class_name,
};
use crate::pipeline::{CrossValidator, OneVsRest, OneVsRestModel, Pipeline};
use crate::registry::TypeRegistry;
use crate::session::Session;
use crate::testutil::{MockEngine, local_session};

const LR_CLASS: &str = "mlbridge.classification.LogisticRegression";

fn test_session() -> Arc<Session> {
    local_session(&Arc::new(MockEngine::default()))
}

fn test_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::with_builtins();
    registry.register_estimator(LR_CLASS);
    registry.register_transformer("mlbridge.feature.Tokenizer");
    registry.register_model("mlbridge.classification.LogisticRegressionModel");
    registry
}

fn sample_estimator() -> Estimator {
    Estimator::new(LR_CLASS)
        .with_uid("lr_42")
        .with_param("maxIter", json!(25))
        .with_param("regParam", json!(0.1))
        .with_default("maxIter", json!(100))
        .with_default("tol", json!(1e-6))
}

#[test]
fn test_save_load_round_trip_preserves_uid_and_resolved_params() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("lr");
    let session = test_session();
    let estimator = sample_estimator();

    estimator
        .writer()
        .session(Arc::clone(&session))
        .save(&path)
        .expect("save");
    let loaded = persist::load_instance_with(&path, &test_registry()).expect("load");

    assert_eq!(loaded.class_name(), LR_CLASS);
    assert_eq!(loaded.uid(), "lr_42");
    for key in ["maxIter", "regParam", "tol"] {
        assert_eq!(loaded.spec().get(key), estimator.spec().get(key), "{key}");
    }
    // User-set still wins over the default after the round trip.
    assert_eq!(loaded.spec().get("maxIter"), Some(&json!(25)));
}

#[test]
fn test_metadata_record_shape() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("lr");
    let session = test_session();
    sample_estimator()
        .writer()
        .session(session)
        .save(&path)
        .expect("save");

    let text = fs::read_to_string(path.join("metadata")).expect("read");
    let record: serde_json::Value = serde_json::from_str(&text).expect("json");
    assert_eq!(record["class"], json!(LR_CLASS));
    assert_eq!(record["uid"], json!("lr_42"));
    assert_eq!(record["engineVersion"], json!("2.5.0"));
    assert!(record["timestamp"].as_i64().expect("timestamp") > 0);
    assert_eq!(record["paramMap"]["maxIter"], json!(25));
    assert_eq!(record["defaultParamMap"]["maxIter"], json!(100));
}

#[test]
fn test_save_without_overwrite_leaves_existing_content() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("lr");
    let session = test_session();

    sample_estimator()
        .writer()
        .session(Arc::clone(&session))
        .save(&path)
        .expect("save");

    let second = Estimator::new(LR_CLASS)
        .with_uid("lr_other")
        .with_param("maxIter", json!(1));
    let err = second
        .writer()
        .session(Arc::clone(&session))
        .save(&path)
        .expect_err("must fail");
    assert!(matches!(err, BridgeError::Io(_)));

    // Original record unchanged, as observed by reloading it.
    let reloaded = persist::load_instance_with(&path, &test_registry()).expect("load");
    assert_eq!(reloaded.uid(), "lr_42");
    assert_eq!(reloaded.spec().get("maxIter"), Some(&json!(25)));
}

#[test]
fn test_save_with_overwrite_replaces_existing_content() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("lr");
    let session = test_session();

    sample_estimator()
        .writer()
        .session(Arc::clone(&session))
        .save(&path)
        .expect("save");

    let second = Estimator::new(LR_CLASS)
        .with_uid("lr_other")
        .with_param("maxIter", json!(1));
    second
        .writer()
        .overwrite()
        .session(Arc::clone(&session))
        .save(&path)
        .expect("overwriting save");

    let reloaded = persist::load_instance_with(&path, &test_registry()).expect("load");
    assert_eq!(reloaded.uid(), "lr_other");
}

#[test]
fn test_writer_options_are_lower_cased() {
    let estimator = sample_estimator();
    let writer = MetadataWriter::new(&estimator)
        .option("CompressionCodec", "gzip")
        .option("chunkSize", "64");
    assert_eq!(writer.options().get("compressioncodec"), Some(&"gzip".to_string()));
    assert_eq!(writer.options().get("chunksize"), Some(&"64".to_string()));
}

#[test]
fn test_expected_class_mismatch_is_terminal() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("lr");
    sample_estimator()
        .writer()
        .session(test_session())
        .save(&path)
        .expect("save");

    let err = load_metadata(&path, "mlbridge.feature.Tokenizer").expect_err("mismatch");
    assert!(matches!(err, BridgeError::ClassMismatch { .. }));
}

#[test]
fn test_pre_24_record_without_defaults_is_accepted() {
    let text = json!({
        "class": LR_CLASS,
        "timestamp": 1_700_000_000_000_i64,
        "engineVersion": "2.3.0",
        "uid": "lr_legacy",
        "paramMap": {"maxIter": 5}
    })
    .to_string();
    let metadata = parse_metadata(&text, "").expect("parse");

    let mut instance = Estimator::new(LR_CLASS);
    persist::get_and_set_params(&mut instance, &metadata, &[]).expect("apply");
    assert_eq!(instance.spec().get("maxIter"), Some(&json!(5)));
    assert!(instance.spec().defaults().is_empty());
}

#[test]
fn test_24_record_without_defaults_fails_presence_assertion() {
    let text = json!({
        "class": LR_CLASS,
        "timestamp": 1_700_000_000_000_i64,
        "engineVersion": "2.4.0",
        "uid": "lr_legacy",
        "paramMap": {"maxIter": 5}
    })
    .to_string();
    let metadata = parse_metadata(&text, "").expect("parse");

    let mut instance = Estimator::new(LR_CLASS);
    let err = persist::get_and_set_params(&mut instance, &metadata, &[]).expect_err("gate");
    assert!(matches!(err, BridgeError::MissingDefaultSection));
}

#[test]
fn test_version_parsing() {
    assert_eq!(major_minor_version("2.4.0").expect("parse"), (2, 4));
    assert_eq!(major_minor_version("2.3").expect("parse"), (2, 3));
    assert_eq!(major_minor_version("10.0.1").expect("parse"), (10, 0));
    assert!(major_minor_version("2").is_err());
    assert!(major_minor_version("abc.def").is_err());
}

#[test]
fn test_skip_list_excludes_params_on_load() {
    let text = json!({
        "class": LR_CLASS,
        "timestamp": 1_700_000_000_000_i64,
        "engineVersion": "2.5.0",
        "uid": "lr_skip",
        "paramMap": {"maxIter": 5, "weightCol": "w"},
        "defaultParamMap": {}
    })
    .to_string();
    let metadata = parse_metadata(&text, "").expect("parse");

    let mut instance = Estimator::new(LR_CLASS);
    persist::get_and_set_params(&mut instance, &metadata, &["weightCol"]).expect("apply");
    assert_eq!(instance.spec().get("maxIter"), Some(&json!(5)));
    assert_eq!(instance.spec().get("weightCol"), None);
}

#[test]
fn test_reader_rejects_unexpected_class() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("lr");
    sample_estimator()
        .writer()
        .session(test_session())
        .save(&path)
        .expect("save");

    let err = MetadataReader::new()
        .expecting("mlbridge.feature.Tokenizer")
        .load_with(&path, &test_registry())
        .expect_err("mismatch");
    assert!(matches!(err, BridgeError::ClassMismatch { .. }));
}

#[test]
fn test_reader_skip_param_excludes_stored_value() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("lr");
    sample_estimator()
        .writer()
        .session(test_session())
        .save(&path)
        .expect("save");

    let loaded = MetadataReader::new()
        .expecting(LR_CLASS)
        .skip_param("regParam")
        .load_with(&path, &test_registry())
        .expect("load");
    assert_eq!(loaded.spec().get("maxIter"), Some(&json!(25)));
    assert!(loaded.spec().params().get("regParam").is_none());
}

#[test]
fn test_native_class_names_are_remapped() {
    assert_eq!(
        resolved_class_name("org.mlengine.classification.LogisticRegression"),
        LR_CLASS
    );
    assert_eq!(resolved_class_name(LR_CLASS), LR_CLASS);
}

#[test]
fn test_native_record_loads_into_mirror_type() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("native");
    fs::create_dir_all(&path).expect("mkdir");
    let text = json!({
        "class": "org.mlengine.classification.LogisticRegression",
        "timestamp": 1_700_000_000_000_i64,
        "engineVersion": "2.5.0",
        "uid": "lr_native",
        "paramMap": {"maxIter": 7},
        "defaultParamMap": {"tol": 1e-6}
    })
    .to_string();
    fs::write(path.join("metadata"), text).expect("write");

    let loaded = persist::load_instance_with(&path, &test_registry()).expect("load");
    assert_eq!(loaded.class_name(), LR_CLASS);
    assert_eq!(loaded.uid(), "lr_native");
    assert_eq!(loaded.spec().get("maxIter"), Some(&json!(7)));
}

#[test]
fn test_native_pipeline_record_loads_into_mirror_type() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("native_pipe");
    let stage_path = path.join("stages").join("0_tok_1");
    fs::create_dir_all(&stage_path).expect("mkdir");
    fs::write(
        path.join("metadata"),
        json!({
            "class": "org.mlengine.pipeline.Pipeline",
            "timestamp": 1_700_000_000_000_i64,
            "engineVersion": "2.5.0",
            "uid": "pipe_native",
            "paramMap": {},
            "defaultParamMap": {},
            "stageUids": ["tok_1"]
        })
        .to_string(),
    )
    .expect("write");
    fs::write(
        stage_path.join("metadata"),
        json!({
            "class": "org.mlengine.feature.Tokenizer",
            "timestamp": 1_700_000_000_000_i64,
            "engineVersion": "2.5.0",
            "uid": "tok_1",
            "paramMap": {},
            "defaultParamMap": {}
        })
        .to_string(),
    )
    .expect("write");

    let loaded = persist::load_instance_with(&path, &test_registry()).expect("load");
    assert_eq!(loaded.class_name(), "mlbridge.pipeline.Pipeline");
    assert_eq!(loaded.uid(), "pipe_native");
    let stages = loaded.sub_stages();
    assert_eq!(stages.len(), 1);
    assert_eq!(stages[0].class_name(), "mlbridge.feature.Tokenizer");
}

#[test]
fn test_unregistered_class_is_a_capability_error() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("unknown");
    fs::create_dir_all(&path).expect("mkdir");
    let text = json!({
        "class": "org.mlengine.frequent.FPGrowth",
        "timestamp": 1_700_000_000_000_i64,
        "engineVersion": "2.5.0",
        "uid": "fp_1",
        "paramMap": {},
        "defaultParamMap": {}
    })
    .to_string();
    fs::write(path.join("metadata"), text).expect("write");

    let err = persist::load_instance_with(&path, &test_registry()).expect_err("unknown");
    match err {
        BridgeError::UnknownClass(class) => {
            assert_eq!(class, "mlbridge.frequent.FPGrowth");
        }
        other => panic!("expected unknown class error, got {other:?}"),
    }
}

#[test]
fn test_non_utf8_path_fails_before_io() {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;

    let raw = OsString::from_vec(vec![0x2f, 0x74, 0x6d, 0x70, 0x2f, 0xff, 0xfe]);
    let path = Path::new(&raw);
    let estimator = sample_estimator();
    let err = estimator
        .writer()
        .session(test_session())
        .save(path)
        .expect_err("path type");
    assert!(matches!(err, BridgeError::PathType(_)));
}

#[test]
fn test_pipeline_round_trip_restores_stage_order() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("pipe");
    let session = test_session();

    let pipeline = Pipeline::new()
        .with_uid("pipe_1")
        .with_stage(Transformer::new("mlbridge.feature.Tokenizer").with_uid("tok_1"))
        .with_stage(sample_estimator());
    pipeline
        .writer()
        .session(Arc::clone(&session))
        .save(&path)
        .expect("save");

    let loaded = persist::load_instance_with(&path, &test_registry()).expect("load");
    assert_eq!(loaded.uid(), "pipe_1");
    let stages = loaded.sub_stages();
    assert_eq!(stages.len(), 2);
    assert_eq!(stages[0].uid(), "tok_1");
    assert_eq!(stages[0].class_name(), "mlbridge.feature.Tokenizer");
    assert_eq!(stages[1].uid(), "lr_42");
    assert_eq!(stages[1].spec().get("maxIter"), Some(&json!(25)));
}

#[test]
fn test_pipeline_with_duplicate_stage_uids_fails_before_writing() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("pipe");
    let pipeline = Pipeline::new()
        .with_uid("pipe_1")
        .with_stage(Transformer::new("mlbridge.feature.Tokenizer").with_uid("dup"))
        .with_stage(Transformer::new("mlbridge.feature.HashingTF").with_uid("dup"));

    let err = pipeline
        .writer()
        .session(test_session())
        .save(&path)
        .expect_err("duplicate uids");
    assert!(matches!(err, BridgeError::DuplicateUids(_)));
    assert!(!path.exists());
}

#[test]
fn test_one_vs_rest_round_trip_restores_classifier() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("ovr");
    let session = test_session();

    let ovr = OneVsRest::new(sample_estimator()).with_uid("ovr_1");
    ovr.writer()
        .session(Arc::clone(&session))
        .save(&path)
        .expect("save");

    let loaded = persist::load_instance_with(&path, &test_registry()).expect("load");
    assert_eq!(loaded.uid(), "ovr_1");
    let stages = loaded.sub_stages();
    assert_eq!(stages.len(), 1);
    assert_eq!(stages[0].uid(), "lr_42");
}

#[test]
fn test_fitted_one_vs_rest_round_trip_restores_models() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("ovr_model");
    let session = test_session();

    let mut m1 = crate::operators::Model::detached("mlbridge.classification.LogisticRegressionModel");
    m1.spec_mut().reset_uid("m1");
    let mut m2 = crate::operators::Model::detached("mlbridge.classification.LogisticRegressionModel");
    m2.spec_mut().reset_uid("m2");
    let ovr_model = OneVsRestModel::new(sample_estimator(), vec![Box::new(m1), Box::new(m2)])
        .with_uid("ovr_model_1");
    ovr_model
        .writer()
        .session(Arc::clone(&session))
        .save(&path)
        .expect("save");

    let loaded = persist::load_instance_with(&path, &test_registry()).expect("load");
    assert_eq!(loaded.uid(), "ovr_model_1");
    let stages = loaded.sub_stages();
    assert_eq!(stages.len(), 3);
    assert_eq!(stages[0].uid(), "lr_42");
    assert_eq!(stages[1].uid(), "m1");
    assert_eq!(stages[2].uid(), "m2");
}

#[test]
fn test_validator_save_is_rejected() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("cv");
    let validator = CrossValidator::new(sample_estimator());
    let err = MetadataWriter::new(&validator)
        .session(test_session())
        .save(&path)
        .expect_err("rejected");
    assert!(matches!(err, BridgeError::NestedValidator(_)));
}
