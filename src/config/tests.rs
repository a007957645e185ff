use super::*;
use crate::tracking::{MtimeResolution, RootId};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn init_in(base: &Path) -> (PathBuf, TrackerConfig) {
    let logs = base.join("logs");
    fs::create_dir_all(&logs).unwrap();
    let path = base.join(CONFIG_FILE_NAME);
    let config = init(&path, &base.join("state.db"), &logs).unwrap();
    (path, config)
}

#[test]
fn init_creates_database_and_refuses_to_clobber() {
    let dir = tempdir().unwrap();
    let (path, config) = init_in(dir.path());
    assert!(path.is_file());
    assert!(dir.path().join("state.db").is_file());
    assert!(config.database.is_absolute());
    assert!(config.roots.is_empty());

    let err = init(&path, &dir.path().join("state.db"), &dir.path().join("logs")).unwrap_err();
    assert!(matches!(err, ConfigError::AlreadyExists { .. }));
}

#[test]
fn init_requires_existing_log_folder() {
    let dir = tempdir().unwrap();
    let err = init(
        &dir.path().join(CONFIG_FILE_NAME),
        &dir.path().join("state.db"),
        &dir.path().join("missing"),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::NotADirectory { .. }));
    assert!(!dir.path().join(CONFIG_FILE_NAME).exists());
}

#[test]
fn saved_config_round_trips_through_toml() {
    let dir = tempdir().unwrap();
    let (path, mut config) = init_in(dir.path());
    let photos = dir.path().join("photos");
    fs::create_dir(&photos).unwrap();
    config.add_root(&photos, None).unwrap();
    config.mtime_resolution = MtimeResolution::Seconds;
    save_to_path(&config, &path).unwrap();

    let loaded = load_from(&path).unwrap();
    assert_eq!(loaded, config);
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("[[root]]"));
    assert!(text.contains("mtime_resolution = \"seconds\""));
}

#[test]
fn missing_config_is_reported() {
    let dir = tempdir().unwrap();
    let err = load_from(&dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Missing { .. }));
}

#[test]
fn add_root_derives_unique_ids_and_ignores_duplicates() {
    let dir = tempdir().unwrap();
    let (_, mut config) = init_in(dir.path());
    let first = dir.path().join("a/music");
    let second = dir.path().join("b/music");
    fs::create_dir_all(&first).unwrap();
    fs::create_dir_all(&second).unwrap();

    let before = config.config_last_changed_ms;
    assert_eq!(
        config.add_root(&first, None).unwrap(),
        Some(RootId::from_string("music"))
    );
    assert_eq!(
        config.add_root(&second, None).unwrap(),
        Some(RootId::from_string("music-2"))
    );
    assert_eq!(config.add_root(&first, None).unwrap(), None);
    assert_eq!(config.roots.len(), 2);
    assert!(config.config_last_changed_ms >= before);
    #[cfg(unix)]
    assert!(config.roots.iter().all(|root| root.device.is_some()));
}

#[test]
fn add_root_rejects_files_and_nested_roots() {
    let dir = tempdir().unwrap();
    let (_, mut config) = init_in(dir.path());
    let outer = dir.path().join("data");
    let inner = outer.join("inner");
    fs::create_dir_all(&inner).unwrap();
    fs::write(dir.path().join("file.txt"), b"x").unwrap();

    let err = config.add_root(&dir.path().join("file.txt"), None).unwrap_err();
    assert!(matches!(err, ConfigError::NotADirectory { .. }));

    config.add_root(&outer, None).unwrap();
    let err = config.add_root(&inner, None).unwrap_err();
    assert!(matches!(err, ConfigError::OverlappingRoots { .. }));
    assert_eq!(config.roots.len(), 1);
}

#[test]
fn explicit_duplicate_id_is_rejected() {
    let dir = tempdir().unwrap();
    let (_, mut config) = init_in(dir.path());
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    fs::create_dir(&a).unwrap();
    fs::create_dir(&b).unwrap();
    config.add_root(&a, Some("main".into())).unwrap();
    let err = config.add_root(&b, Some("main".into())).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateRootId(_)));
}

#[test]
fn remove_root_matches_id_or_path() {
    let dir = tempdir().unwrap();
    let (_, mut config) = init_in(dir.path());
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    fs::create_dir(&a).unwrap();
    fs::create_dir(&b).unwrap();
    config.add_root(&a, None).unwrap();
    config.add_root(&b, None).unwrap();

    assert!(config.remove_root("a"));
    assert!(config.remove_root(b.to_str().unwrap()));
    assert!(!config.remove_root("a"));
    assert!(config.roots.is_empty());
}

#[test]
fn select_roots_rejects_unknown_ids() {
    let dir = tempdir().unwrap();
    let (_, mut config) = init_in(dir.path());
    let a = dir.path().join("a");
    fs::create_dir(&a).unwrap();
    config.add_root(&a, None).unwrap();

    assert_eq!(config.select_roots(&[]).unwrap().len(), 1);
    assert_eq!(config.select_roots(&["a".into()]).unwrap()[0].id.as_str(), "a");
    let err = config.select_roots(&["zzz".into()]).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownRoot(_)));
}

#[test]
fn set_database_rejects_directories_and_foreign_files() {
    let dir = tempdir().unwrap();
    let (_, mut config) = init_in(dir.path());
    let err = config.set_database(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));

    let text = dir.path().join("notes.txt");
    fs::write(&text, b"just some notes, not a database").unwrap();
    let err = config.set_database(&text).unwrap_err();
    assert!(matches!(err, ConfigError::Database { .. }));
}

#[test]
fn legacy_json_is_imported() {
    let dir = tempdir().unwrap();
    let music = dir.path().join("music");
    fs::create_dir(&music).unwrap();
    let gone = dir.path().join("old/music");
    let legacy_path = dir.path().join("config.json");
    let legacy = serde_json::json!({
        "config_last_changed": 1_650_000_000_000_i64,
        "database": dir.path().join("files.db"),
        "log_folder": dir.path().join("logs"),
        "filesystems_to_scan": {
            music.to_str().unwrap(): 1234,
            gone.to_str().unwrap(): 99,
        }
    });
    fs::write(&legacy_path, serde_json::to_vec_pretty(&legacy).unwrap()).unwrap();

    let config = import_legacy(&legacy_path).unwrap();
    assert_eq!(config.config_last_changed_ms, 1_650_000_000_000);
    assert_eq!(config.database, dir.path().join("files.db"));
    assert_eq!(config.roots.len(), 2);
    let ids: Vec<&str> = config.roots.iter().map(|root| root.id.as_str()).collect();
    assert!(ids.contains(&"music"));
    assert!(ids.contains(&"music-2"));
    let missing = config.roots.iter().find(|root| root.path == gone).unwrap();
    assert_eq!(missing.device, None);
}

#[test]
fn legacy_json_without_database_is_rejected() {
    let dir = tempdir().unwrap();
    let legacy_path = dir.path().join("config.json");
    fs::write(
        &legacy_path,
        br#"{"config_last_changed": 1, "database": null, "log_folder": null, "filesystems_to_scan": {}}"#,
    )
    .unwrap();
    let err = import_legacy(&legacy_path).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn default_config_path_lives_under_app_dir() {
    let dir = tempdir().unwrap();
    let _guard = crate::app_dirs::TestHome::set(dir.path().to_path_buf());
    let path = config_path().unwrap();
    assert_eq!(
        path,
        dir.path()
            .join(crate::app_dirs::APP_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    );
}
