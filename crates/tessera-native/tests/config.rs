use tempfile::TempDir;
use tessera_ir::ModuleBuilder;
use tessera_native::{ConfigError, EngineOptions, OptLevel, Pass};

mod common;
use common::{add_module, engine_with, vector_add_function};

#[test]
fn test_engine_from_toml_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.toml");
    std::fs::write(
        &path,
        r#"
        enable_object_cache = false
        opt_level = "none"
        passes = ["unreachable", "pipeline"]
        "#,
    )
    .unwrap();
    let options = EngineOptions::load(&path).unwrap();

    assert_eq!(options.opt_level, OptLevel::None);
    assert_eq!(options.passes, vec![Pass::Unreachable, Pass::Pipeline]);

    let engine = engine_with(options.clone());
    assert_eq!(engine.options(), &options);
    assert!(engine.object_cache().is_none());
    assert!(engine.link(&add_module("from_toml")));
    let add: extern "C" fn(i64, i64) -> i64 = unsafe { engine.lookup_fn("add").unwrap() };
    assert_eq!(add(2, 3), 5);
}

#[test]
fn test_each_opt_level_produces_working_code() {
    for level in ["none", "speed", "speed_and_size"] {
        let options = EngineOptions::from_toml_str(&format!(
            "opt_level = \"{level}\"\npasses = [\"pipeline\"]\ndump_ir = true"
        ))
        .unwrap();
        let engine = engine_with(options);
        let module = ModuleBuilder::new("vadd").function(vector_add_function("vadd")).build().unwrap();
        assert!(engine.link(&module), "link failed at {level}");

        let vadd: extern "C" fn(*const f32, *const f32, *mut f32, i64) =
            unsafe { engine.lookup_fn("vadd").unwrap() };
        let a = [1.0f32, 2.0, 3.0];
        let b = [10.0f32, 20.0, 30.0];
        let mut out = [0.0f32; 3];
        vadd(a.as_ptr(), b.as_ptr(), out.as_mut_ptr(), 3);
        assert_eq!(out, [11.0, 22.0, 33.0], "wrong result at {level}");
    }
}

#[test]
fn test_bad_config_is_diagnostic() {
    let err = EngineOptions::from_toml_str("opt_level = \"fastest\"").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
    let code = miette::Diagnostic::code(&err).map(|c| c.to_string());
    assert_eq!(code.as_deref(), Some("CONFIG-002"));
}
