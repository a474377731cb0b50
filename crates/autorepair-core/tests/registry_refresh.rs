use autorepair_core::{LanguageProfile, Registry};
use tempfile::tempdir;

#[test]
fn refresh_without_disk_changes_is_idempotent() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src").join("main");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::write(src.join("Foo.java"), "import a.b.Bar;\nclass Foo { Bar b = new Bar(); }").unwrap();
    std::fs::write(src.join("Bar.java"), "class Bar {}").unwrap();

    let mut registry = Registry::build(dir.path(), &LanguageProfile::java()).unwrap();
    let before = registry.clone();

    let summary = registry.refresh();

    assert!(summary.is_noop());
    assert!(summary.touched.is_empty());
    assert_eq!(registry, before);
    for (name, entry) in before.iter() {
        assert_eq!(registry.get(name).unwrap().checksum, entry.checksum);
    }
}

#[test]
fn mtime_only_change_keeps_entry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Foo.java");
    std::fs::write(&path, "class Foo {}").unwrap();
    let mut registry = Registry::build(dir.path(), &LanguageProfile::java()).unwrap();
    let before = registry.get("Foo.java").unwrap().clone();

    let later = std::time::SystemTime::now() + std::time::Duration::from_secs(30);
    std::fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(later)
        .unwrap();

    let summary = registry.refresh();
    assert_eq!(summary.touched, vec!["Foo.java".to_string()]);
    assert!(summary.rebuilt.is_empty());
    assert_eq!(registry.get("Foo.java").unwrap(), &before);
}
