//! Unit loader tests
//!
//! Resolution order, identity caching, mismatch handling and release.

use std::sync::Arc;

use modhost::module::loader::{UnitIdentity, UnitLoader};

use super::test_utils::*;

#[test]
fn test_resolve_returns_cached_instance() {
    let fixture = ModuleTestFixture::new().unwrap();
    fixture.write_unit("Alpha.bin", "Alpha", &["alpha::AlphaModule"]);

    let mut loader = UnitLoader::new("test", [fixture.modules_dir.clone()]);
    let first = loader.resolve("Alpha").unwrap();

    // Removing the file proves the second resolution never touches disk
    std::fs::remove_file(fixture.modules_dir.join("Alpha.bin")).unwrap();
    let second = loader.resolve("Alpha").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.identity(), &UnitIdentity::new("Alpha", "1.0.0"));
}

#[test]
fn test_resolution_is_case_insensitive() {
    let fixture = ModuleTestFixture::new().unwrap();
    fixture.write_unit("Alpha.bin", "Alpha", &["alpha::AlphaModule"]);

    let mut loader = UnitLoader::new("test", [fixture.modules_dir.clone()]);
    assert_eq!(loader.resolve("ALPHA").map(|u| u.name().to_string()), Some("Alpha".to_string()));
}

#[test]
fn test_identity_mismatch_is_not_cached_and_search_continues() {
    let fixture = ModuleTestFixture::new().unwrap();
    let first = fixture.dir("first");
    let second = fixture.dir("second");
    write_unit(&first, "Alpha.bin", "Impostor", "1.0.0", &["alpha::AlphaModule"]);
    write_unit(&second, "Alpha.bin", "Alpha", "1.0.0", &["alpha::AlphaModule"]);

    let mut loader = UnitLoader::new("test", [first, second.clone()]);
    let unit = loader.resolve("Alpha").unwrap();

    assert_eq!(unit.name(), "Alpha");
    assert_eq!(unit.path(), second.join("Alpha.bin").as_path());
    assert_eq!(loader.loaded_units(), vec![UnitIdentity::new("Alpha", "1.0.0")]);
}

#[test]
fn test_mismatch_only_resolves_to_none() {
    let fixture = ModuleTestFixture::new().unwrap();
    fixture.write_unit("Alpha.bin", "Impostor", &["alpha::AlphaModule"]);

    let mut loader = UnitLoader::new("test", [fixture.modules_dir.clone()]);
    assert!(loader.resolve("Alpha").is_none());
    assert!(loader.loaded_units().is_empty());
}

#[test]
fn test_bad_candidates_do_not_abort_resolution() {
    let fixture = ModuleTestFixture::new().unwrap();
    let broken = fixture.dir("broken");
    let good = fixture.dir("good");
    std::fs::write(broken.join("Alpha.bin"), b"\x00\x01 not a manifest").unwrap();
    std::fs::write(broken.join("Alpha.unit"), "[unit]\nname = \"Alpha\"\n").unwrap();
    write_unit(&good, "Alpha.unit", "Alpha", "2.0.0", &["alpha::AlphaModule"]);

    let mut loader = UnitLoader::new(
        "test",
        [fixture.temp_dir.path().join("missing"), broken, good],
    );
    assert_eq!(loader.resolve("Alpha").map(|u| u.version().to_string()), Some("2.0.0".to_string()));
}

#[test]
fn test_pinned_version_request() {
    let fixture = ModuleTestFixture::new().unwrap();
    let v1 = fixture.dir("v1");
    let v2 = fixture.dir("v2");
    write_unit(&v1, "Alpha.bin", "Alpha", "1.0.0", &["alpha::AlphaModule"]);
    write_unit(&v2, "Alpha.bin", "Alpha", "2.0.0", &["alpha::AlphaModule"]);

    let mut loader = UnitLoader::new("test", [v1, v2]);
    assert_eq!(loader.resolve("Alpha@2.0.0").unwrap().version(), "2.0.0");
    assert_eq!(loader.resolve("Alpha@1.0.0").unwrap().version(), "1.0.0");
    assert_eq!(loader.loaded_units().len(), 2);
}

#[test]
fn test_load_from_path_dedupes_identity() {
    let fixture = ModuleTestFixture::new().unwrap();
    let a = fixture.write_unit("Alpha.bin", "Alpha", &["alpha::AlphaModule"]);
    let copy = fixture.write_unit("AlphaCopy.unit", "Alpha", &["alpha::AlphaModule"]);

    let mut loader = UnitLoader::new("test", Vec::<std::path::PathBuf>::new());
    let first = loader.load_from_path(&a).unwrap();
    let second = loader.load_from_path(&copy).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.path(), a.as_path());
    assert_eq!(first.fingerprint().len(), 64);
}

#[test]
fn test_release_unloads_everything_together() {
    let fixture = ModuleTestFixture::new().unwrap();
    fixture.write_unit("Alpha.bin", "Alpha", &["alpha::AlphaModule"]);
    fixture.write_unit("Beta.bin", "Beta", &["beta::BetaModule"]);

    let mut loader = UnitLoader::new("test", [fixture.modules_dir.clone()]);
    let alpha = loader.resolve("Alpha").unwrap();
    let beta = loader.resolve("Beta").unwrap();
    assert_eq!(alpha.context_id(), beta.context_id());

    let released = loader.release();
    assert_eq!(released.len(), 2);
    assert_eq!(released.still_loaded().len(), 2);

    drop(alpha);
    assert!(!released.all_unloaded());
    drop(beta);
    assert!(released.all_unloaded());

    // A fresh context loads a new instance
    let reloaded = loader.resolve("Alpha").unwrap();
    assert_ne!(reloaded.context_id(), released.context_id());
}
