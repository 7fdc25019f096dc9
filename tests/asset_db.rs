use std::fs;
use zdl_engine::assets::{
    content_hash, AssetDatabase, AssetState, AssetType, ProcessOutcome, ProcessorRegistry,
};

#[test]
fn save_load_round_trip() {
    let dir = std::env::temp_dir().join(format!("zdl-assetdb-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("assets.zdla");

    let mut db = AssetDatabase::new();
    db.register("textures/grass.png", AssetType::Texture);
    db.mark_processed(
        "textures/grass.png",
        b"grass",
        12,
        vec!["build/grass.png".into(), "build/grass.meta".into()],
    )
    .unwrap();
    db.register("audio/step.wav", AssetType::Audio);
    db.mark_failed("audio/step.wav").unwrap();
    db.register("scenes/level1.scene", AssetType::Scene);

    db.save(&path).unwrap();
    let loaded = AssetDatabase::load(&path).unwrap();
    assert_eq!(loaded, db);

    let grass = loaded.get("textures/grass.png").unwrap();
    assert_eq!(grass.state, AssetState::Processed);
    assert_eq!(grass.hash, content_hash(b"grass"));
    assert_eq!(grass.outputs.len(), 2);
    assert_eq!(loaded.get("audio/step.wav").unwrap().state, AssetState::Failed);

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[..4], b"ZDLA");
    assert_eq!(u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), 3);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn processing_state_survives_reload() {
    let dir = std::env::temp_dir().join(format!("zdl-assetproc-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let source = dir.join("cube.obj");
    fs::write(&source, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
    let db_path = dir.join("assets.zdla");

    let registry = ProcessorRegistry::with_builtin();
    let mut db = AssetDatabase::new();
    let outcome = registry.process_file(&mut db, &source, &dir.join("build")).unwrap();
    assert!(matches!(outcome, ProcessOutcome::Processed(_)));
    db.save(&db_path).unwrap();

    let mut reloaded = AssetDatabase::load(&db_path).unwrap();
    let outcome = registry
        .process_file(&mut reloaded, &source, &dir.join("build"))
        .unwrap();
    assert_eq!(outcome, ProcessOutcome::UpToDate);
    let _ = fs::remove_dir_all(&dir);
}
