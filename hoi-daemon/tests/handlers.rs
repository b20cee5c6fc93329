//! Handler-level tests against a store on disk.
//!
//! The server configuration used here disables every subsystem, so the
//! pipelines are empty: what is exercised is the parse -> augment ->
//! validate -> persist -> pipeline -> status flow itself, not the host
//! mutations.

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use hoi_core::domain::{DomainDirective, Www};
use hoi_core::meta::Status;
use hoi_core::{project, server};
use hoi_daemon::handlers::Handlers;
use hoi_store::Store;
use hoi_system::Systemctl;

fn handlers(tmp: &TempDir) -> Handlers {
    let store = Store::new(tmp.path().join("data.db"));
    store.load().expect("load store");

    Handlers {
        server: server::Config::default(),
        store: Arc::new(store),
        mysql: None,
        systemd: Systemctl::new(false),
    }
}

fn write_project(tmp: &TempDir, name: &str, hoifile: &str) -> std::path::PathBuf {
    let root = tmp.path().join(name);
    std::fs::create_dir_all(&root).expect("mkdir");
    std::fs::write(root.join("index.html"), "<html></html>").expect("write index");
    std::fs::write(root.join("Hoifile"), hoifile).expect("write Hoifile");
    root
}

#[test]
fn load_persists_project_as_active() {
    let tmp = TempDir::new().expect("tempdir");
    let h = handlers(&tmp);
    let root = write_project(
        &tmp,
        "acme",
        "context: dev\ndomain:\n  example.test: {}\n",
    );

    h.load(&root).expect("load");

    let id = project::path_to_id(&root);
    assert!(h.store.has(&id));
    assert_eq!(h.store.read_status(&id).expect("status"), Status::Active);

    let entity = h.store.read(&id).expect("entity");
    assert_eq!(entity.project.name, "acme");
    assert!(entity.project.domain.contains_key("example.test"));
}

#[test]
fn load_rejects_invalid_config_without_storing() {
    let tmp = TempDir::new().expect("tempdir");
    let h = handlers(&tmp);
    // A .test TLD is forbidden outside dev contexts.
    let root = write_project(
        &tmp,
        "acme",
        "context: prod\ndomain:\n  example.test: {}\n",
    );

    assert!(h.load(&root).is_err());
    assert!(!h.store.has(&project::path_to_id(&root)));
}

#[test]
fn unload_deletes_from_store() {
    let tmp = TempDir::new().expect("tempdir");
    let h = handlers(&tmp);
    let root = write_project(&tmp, "acme", "context: dev\n");

    h.load(&root).expect("load");
    let id = project::path_to_id(&root);
    assert!(h.store.has(&id));

    h.unload(&root).expect("unload");
    assert!(!h.store.has(&id));
}

#[test]
fn unload_of_unknown_project_errors() {
    let tmp = TempDir::new().expect("tempdir");
    let h = handlers(&tmp);
    assert!(h.unload(Path::new("/var/www/nothing")).is_err());
}

#[test]
fn reload_rereads_the_hoifile() {
    let tmp = TempDir::new().expect("tempdir");
    let h = handlers(&tmp);
    let root = write_project(&tmp, "acme", "context: dev\n");

    h.load(&root).expect("load");
    std::fs::write(root.join("Hoifile"), "context: dev\nname: renamed\n").expect("rewrite");
    h.reload(&root).expect("reload");

    let entity = h.store.read(&project::path_to_id(&root)).expect("entity");
    assert_eq!(entity.project.name, "renamed");
    assert_eq!(entity.meta.status, Status::Active);
}

#[test]
fn domain_merges_aliases_and_replaces_www_policy() {
    let tmp = TempDir::new().expect("tempdir");
    let h = handlers(&tmp);
    let root = write_project(
        &tmp,
        "acme",
        "context: dev\ndomain:\n  example.org:\n    www: keep\n",
    );
    h.load(&root).expect("load");

    let directive = DomainDirective {
        fqdn: "example.org".to_string(),
        www: Www::Drop,
        aliases: vec!["a.example.org".to_string()],
        ..DomainDirective::default()
    };
    h.domain(&root, directive).expect("domain");

    let entity = h.store.read(&project::path_to_id(&root)).expect("entity");
    let domain = &entity.project.domain["example.org"];
    assert_eq!(domain.www, Www::Drop);
    assert_eq!(domain.aliases, vec!["a.example.org"]);
    assert_eq!(entity.meta.status, Status::Active);
}

#[test]
fn domain_adds_previously_unknown_fqdn() {
    let tmp = TempDir::new().expect("tempdir");
    let h = handlers(&tmp);
    let root = write_project(&tmp, "acme", "context: dev\n");
    h.load(&root).expect("load");

    let directive = DomainDirective {
        fqdn: "example.org".to_string(),
        ..DomainDirective::default()
    };
    h.domain(&root, directive).expect("domain");

    let entity = h.store.read(&project::path_to_id(&root)).expect("entity");
    assert!(entity.project.domain.contains_key("example.org"));
}

#[test]
fn reload_all_continues_past_failures() {
    let tmp = TempDir::new().expect("tempdir");
    let h = handlers(&tmp);

    let good = write_project(&tmp, "good", "context: dev\n");
    let bad = write_project(&tmp, "bad", "context: dev\n");
    h.load(&good).expect("load good");
    h.load(&bad).expect("load bad");

    // Break one project's Hoifile, then reload everything.
    std::fs::write(bad.join("Hoifile"), "context: [").expect("break");
    assert!(h.reload_all().is_err());

    // The intact project was still reloaded and stays active, the broken
    // one is recorded as failed.
    let good_id = project::path_to_id(&good);
    assert_eq!(h.store.read_status(&good_id).expect("status"), Status::Active);
    let bad_id = project::path_to_id(&bad);
    assert_eq!(h.store.read_status(&bad_id).expect("status"), Status::Failed);
}

#[test]
fn status_returns_the_stored_entity() {
    let tmp = TempDir::new().expect("tempdir");
    let h = handlers(&tmp);
    let root = write_project(&tmp, "acme", "context: dev\n");
    h.load(&root).expect("load");

    let entity = h.status(&root).expect("status");
    assert_eq!(entity.project.name, "acme");
    assert_eq!(h.status_all().len(), 1);
}
