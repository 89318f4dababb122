//! Integration test for the staging/reporting pipeline, per spec.md s8's
//! seed scenarios. Building genuine signed RPKI objects needs real key
//! material this test suite doesn't have, so this drives the surrounding
//! machinery end to end instead: tree rotation, fetch-cache-driven pruning,
//! counter bookkeeping, the trust anchor locator format, and the XML
//! summary shape.

use rrp::config::Config;
use rrp::counters::CounterRegistry;
use rrp::error::Outcome;
use rrp::fetch::FetchCache;
use rrp::stage::{InstallMode, Trees};
use rrp::trust_anchor;

fn trees(root: &std::path::Path) -> Trees {
    Trees {
        authenticated: root.join("authenticated"),
        old_authenticated: root.join("old_authenticated"),
        unauthenticated: root.join("unauthenticated"),
        install_mode: InstallMode::Copy,
    }
}

#[test]
fn a_full_run_rotates_installs_and_prunes() {
    let dir = tempfile::tempdir().unwrap();
    let trees = trees(dir.path());

    // First run: install one object, leave a second unreferenced.
    trees.rotate().unwrap();
    std::fs::create_dir_all(trees.unauthenticated.join("rpki.example/repo")).unwrap();
    std::fs::write(trees.unauthenticated.join("rpki.example/repo/ca.cer"), b"cert-one").unwrap();
    std::fs::write(trees.unauthenticated.join("rpki.example/repo/orphan.cer"), b"cert-two").unwrap();
    trees.install("rsync://rpki.example/repo/ca.cer", &trees.unauthenticated.join("rpki.example/repo/ca.cer")).unwrap();

    let counters = CounterRegistry::new();
    counters.record("rsync://rpki.example/repo/ca.cer", Outcome::CurrentCertAccepted);
    counters.record("rsync://rpki.example/repo/orphan.cer", Outcome::ObjectNotInManifest);

    let cache = FetchCache::new();
    cache.insert("rsync://rpki.example/repo/ca.cer");
    trees.prune_unauthenticated(&cache).unwrap();

    assert!(trees.authenticated_path("rsync://rpki.example/repo/ca.cer").unwrap().exists());
    assert!(trees.unauthenticated.join("rpki.example/repo/ca.cer").exists());
    assert!(!trees.unauthenticated.join("rpki.example/repo/orphan.cer").exists());

    // Second run: rotate again, the first authenticated/ tree becomes the backup.
    trees.rotate().unwrap();
    assert!(trees.old_authenticated.join("rpki.example/repo/ca.cer").exists());
    assert!(trees.authenticated.read_dir().unwrap().next().is_none());

    let hosts = counters.hosts();
    assert_eq!(hosts["rpki.example"].get(Outcome::CurrentCertAccepted), 1);
    assert_eq!(hosts["rpki.example"].get(Outcome::ObjectNotInManifest), 1);
}

#[test]
fn locator_round_trip_matches_fetched_key() {
    let dir = tempfile::tempdir().unwrap();
    let tal_path = dir.path().join("ta.tal");
    std::fs::write(&tal_path, "rsync://rpki.example/ta/ta.cer\n\nQUJD\n").unwrap();

    let anchor = trust_anchor::load_locator(&tal_path).unwrap();
    assert_eq!(anchor.uri, "rsync://rpki.example/ta/ta.cer");
    assert_eq!(anchor.expected_key.as_deref(), Some(&b"ABC"[..]));
}

#[test]
fn config_round_trip_drives_trees_and_policy() {
    let dir = tempfile::tempdir().unwrap();
    let conf_path = dir.path().join("rpki.conf");
    std::fs::write(
        &conf_path,
        format!(
            "authenticated {}\nold-authenticated {}\nunauthenticated {}\nallow-stale-crl yes\nprune yes\n",
            dir.path().join("authenticated").display(),
            dir.path().join("old_authenticated").display(),
            dir.path().join("unauthenticated").display(),
        ),
    )
    .unwrap();

    let config = Config::read(&conf_path).unwrap();
    assert!(config.allow_stale_crl);
    assert!(config.prune);
    assert_eq!(config.authenticated, dir.path().join("authenticated"));
}

#[test]
fn xml_summary_contains_every_counter_label_and_status_entries() {
    let counters = CounterRegistry::new();
    counters.record("rsync://rpki.example/repo/ca.cer", Outcome::CurrentCertAccepted);

    let mut buf = Vec::new();
    rrp::xml::write_summary(&mut buf, &counters).unwrap();
    let xml = String::from_utf8(buf).unwrap();

    assert!(xml.starts_with("<?xml"));
    assert!(xml.contains("<rcynic-summary"));
    assert!(xml.contains("current_cert_accepted"));
    assert!(xml.contains("rsync://rpki.example/repo/ca.cer"));
}
