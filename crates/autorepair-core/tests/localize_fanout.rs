use std::collections::BTreeSet;
use std::path::Path;

use autorepair_core::{fan_out, localize, LanguageProfile, Registry};
use tempfile::tempdir;

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// A imports B, B imports C, C references nothing; D stands alone.
fn chain_project() -> (tempfile::TempDir, Registry) {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    std::fs::create_dir_all(&src).unwrap();
    write(
        &src,
        "A.java",
        "package app;\nimport app.model.B;\npublic class A { }\n",
    );
    write(
        &src,
        "B.java",
        "package app.model;\nimport app.util.C;\npublic class B { }\n",
    );
    write(&src, "C.java", "package app.util;\npublic class C { }\n");
    write(&src, "D.java", "package app;\npublic class D { }\n");

    let registry = Registry::build(dir.path(), &LanguageProfile::java()).unwrap();
    (dir, registry)
}

#[test]
fn fan_out_depth_bounds_the_chain() {
    let (_dir, registry) = chain_project();
    let seeds = set(&["A.java"]);

    assert_eq!(fan_out(&seeds, &registry, 0), set(&["A.java"]));
    assert_eq!(fan_out(&seeds, &registry, 1), set(&["A.java", "B.java"]));
    assert_eq!(
        fan_out(&seeds, &registry, 2),
        set(&["A.java", "B.java", "C.java"])
    );
    assert_eq!(
        fan_out(&seeds, &registry, 10),
        set(&["A.java", "B.java", "C.java"])
    );
}

#[test]
fn localize_seeds_from_stack_frames() {
    let (_dir, registry) = chain_project();
    let log = "Exception in thread \"main\" java.lang.IllegalStateException: bad\n\
               \tat app.A.run(A.java:12)\n\
               \tat app.Main.main(Main.java:3)\n";

    assert_eq!(localize(log, &registry, 1), set(&["A.java", "B.java"]));
}

#[test]
fn localize_without_frames_selects_everything() {
    let (_dir, registry) = chain_project();
    let everything = registry.filenames();

    for depth in [0, 1, 5] {
        assert_eq!(localize("Out of memory, no trace", &registry, depth), everything);
    }
}

#[test]
fn localize_with_only_unknown_frames_selects_everything() {
    let (_dir, registry) = chain_project();
    let log = "\tat lib.Vendor.call(Vendor.java:1)";
    assert_eq!(localize(log, &registry, 2), registry.filenames());
}

#[test]
fn cycles_terminate() {
    let dir = tempdir().unwrap();
    write(dir.path(), "P.java", "class P { Q q = new Q(); }");
    write(dir.path(), "Q.java", "class Q { P p = new P(); }");
    let registry = Registry::build(dir.path(), &LanguageProfile::java()).unwrap();

    assert_eq!(
        fan_out(&set(&["P.java"]), &registry, 50),
        set(&["P.java", "Q.java"])
    );
}

#[test]
fn constructor_only_trace_seeds_the_named_file() {
    let dir = tempdir().unwrap();
    write(dir.path(), "Foo.java", "class Foo { }");
    write(dir.path(), "Bar.java", "class Bar { }");
    write(dir.path(), "Baz.java", "class Baz { }");
    let registry = Registry::build(dir.path(), &LanguageProfile::java()).unwrap();

    let log = "Exception in thread \"main\" java.lang.ExceptionInInitializerError\n\
               \tat com.acme.Foo.<init>(Foo.java:12)\n\
               \tat com.acme.Foo.<clinit>(Foo.java:3)\n";

    assert_eq!(localize(log, &registry, 0), set(&["Foo.java"]));
}
