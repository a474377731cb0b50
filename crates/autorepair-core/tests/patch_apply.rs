use std::path::Path;

use autorepair_core::{apply_patch, LanguageProfile, PatchWarning, Registry, RelevantSet};
use tempfile::tempdir;

fn backups_of(dir: &Path, name: &str) -> Vec<String> {
    let prefix = format!("{name}.backup_");
    let mut found: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(&prefix))
        .collect();
    found.sort();
    found
}

fn project(files: &[(&str, &str)]) -> (tempfile::TempDir, Registry, RelevantSet) {
    let dir = tempdir().unwrap();
    for (name, content) in files {
        std::fs::write(dir.path().join(name), content).unwrap();
    }
    let registry = Registry::build(dir.path(), &LanguageProfile::java()).unwrap();
    let relevant = RelevantSet::from_registry(registry.filenames().iter(), &registry);
    (dir, registry, relevant)
}

#[test]
fn unknown_file_is_never_created() {
    let (dir, mut registry, relevant) = project(&[("Foo.java", "class Foo {}")]);
    let response = "FILENAME: Ghost.java\n```java\nclass Ghost {}\n```\n";

    let outcome = apply_patch(response, &relevant, &mut registry);

    assert!(outcome.applied.is_empty());
    assert_eq!(
        outcome.warnings,
        vec![PatchWarning::UnknownFileSuggested {
            filename: "Ghost.java".to_string()
        }]
    );
    assert!(!dir.path().join("Ghost.java").exists());
    assert_eq!(registry.len(), 1);
}

#[test]
fn file_outside_relevant_set_is_not_written() {
    let (dir, mut registry, _) = project(&[("Foo.java", "class Foo {}"), ("Bar.java", "class Bar {}")]);
    let only_foo = RelevantSet::from_registry([String::from("Foo.java")].iter(), &registry);

    let outcome = apply_patch(
        "FILENAME: Bar.java\n```java\nclass Bar { int x; }\n```",
        &only_foo,
        &mut registry,
    );

    assert!(outcome.applied.is_empty());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("Bar.java")).unwrap(),
        "class Bar {}"
    );
}

#[test]
fn applying_same_patch_twice_is_idempotent() {
    let (dir, mut registry, relevant) = project(&[("Foo.java", "class Foo { }")]);
    let response = "Here is the fix.\n\nFILENAME: foo.JAVA\n```java\nimport a.b.Helper;\nclass Foo { Helper h; }\n```\n";

    let first = apply_patch(response, &relevant, &mut registry);
    let after_first = std::fs::read_to_string(dir.path().join("Foo.java")).unwrap();
    let entry_after_first = registry.get("Foo.java").unwrap().clone();

    let second = apply_patch(response, &relevant, &mut registry);
    let after_second = std::fs::read_to_string(dir.path().join("Foo.java")).unwrap();

    assert_eq!(first.applied.len(), 1);
    assert_eq!(second.applied.len(), 1);
    assert_eq!(after_first, "import a.b.Helper;\nclass Foo { Helper h; }");
    assert_eq!(after_first, after_second);
    assert_eq!(registry.get("Foo.java").unwrap().checksum, entry_after_first.checksum);

    let backups = backups_of(dir.path(), "Foo.java");
    assert_eq!(backups.len(), 2);
    let contents: Vec<String> = backups
        .iter()
        .map(|b| std::fs::read_to_string(dir.path().join(b)).unwrap())
        .collect();
    assert!(contents.contains(&"class Foo { }".to_string()));
    assert!(contents.contains(&after_first));
}

#[test]
fn applied_patch_rebuilds_registry_entry() {
    let (_dir, mut registry, relevant) = project(&[("Foo.java", "class Foo {}")]);

    apply_patch(
        "FILENAME: Foo.java\n```java\nimport x.y.Z;\nclass Renamed { Z z = new Z(); }\n```",
        &relevant,
        &mut registry,
    );

    let entry = registry.get("Foo.java").unwrap();
    assert_eq!(entry.declared_type, "Renamed");
    assert_eq!(entry.imports, vec!["x.y.Z".to_string()]);
    assert!(entry.calls.contains("Z"));
    assert_eq!(entry.checksum, autorepair_core::registry::checksum(&entry.content));
}

#[test]
fn multi_file_response_with_noise() {
    let (dir, mut registry, relevant) =
        project(&[("A.java", "class A {}"), ("B.java", "class B {}")]);
    let response = "\
Analysis: A forgot a null check and B leaks.

```java
// stray snippet without a filename
```

FILENAME: A.java
```java
class A { void f(Object o) { if (o == null) return; } }
```

FILENAME: B.java
```java
class B { }
```
Trailing prose.";

    let outcome = apply_patch(response, &relevant, &mut registry);

    assert_eq!(outcome.applied.len(), 2);
    assert!(matches!(
        outcome.warnings.as_slice(),
        [PatchWarning::OrphanCodeBlock { .. }]
    ));
    assert!(std::fs::read_to_string(dir.path().join("A.java"))
        .unwrap()
        .contains("o == null"));
}

#[test]
fn prose_naming_another_file_does_not_redirect_the_block() {
    let (dir, mut registry, relevant) =
        project(&[("Foo.java", "class Foo {}"), ("Bar.java", "class Bar {}")]);
    let response = "FILENAME: Foo.java\nThis version of Foo no longer depends on Bar.java\n```java\nclass Foo { int fixed; }\n```";

    let outcome = apply_patch(response, &relevant, &mut registry);

    let applied: Vec<&str> = outcome.applied.iter().map(|a| a.filename.as_str()).collect();
    assert_eq!(applied, vec!["Foo.java"]);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("Foo.java")).unwrap(),
        "class Foo { int fixed; }"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("Bar.java")).unwrap(),
        "class Bar {}"
    );
    assert!(backups_of(dir.path(), "Bar.java").is_empty());
}
