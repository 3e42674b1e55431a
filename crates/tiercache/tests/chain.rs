use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tiercache::{Backend, Cache, Chain, EmbeddedBackend, Error, Lifetime, StoreOptions, TypedGetter};

fn embedded(dir: &TempDir, name: &str) -> Arc<dyn Backend> {
    Arc::new(EmbeddedBackend::open(dir.path().join(name), StoreOptions::default()).unwrap())
}

fn two_levels(dir: &TempDir) -> Cache {
    Chain::build(vec![embedded(dir, "a"), embedded(dir, "b")]).unwrap()
}

#[test]
fn test_construction_guard() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(Chain::build(vec![embedded(&dir, "a")]), Err(Error::Config(_))));
}

#[tokio::test]
async fn test_chain_invariant() {
    let dir = TempDir::new().unwrap();
    let a = Chain::build(vec![embedded(&dir, "a"), embedded(&dir, "b"), embedded(&dir, "c")]).unwrap();

    let b = a.parent().unwrap();
    let c = b.parent().unwrap();
    assert!(a.children().is_none());
    assert!(c.parent().is_none());
    assert_eq!(b.children().unwrap().index(), a.index());
    assert_eq!(c.children().unwrap().index(), b.index());
}

#[tokio::test]
async fn test_idempotent_link() {
    let dir = TempDir::new().unwrap();
    let a = two_levels(&dir);
    let b = a.parent().unwrap();

    assert!(!a.set_parent(&b).unwrap());
    assert!(!b.set_children(&a).unwrap());
    assert_eq!(a.parent().unwrap().index(), 1);
}

#[tokio::test]
async fn test_write_through_and_promotion() {
    let dir = TempDir::new().unwrap();
    let a = two_levels(&dir);
    let b = a.parent().unwrap();

    a.set("k", &42, Some(Duration::from_secs(60))).await.unwrap();
    assert!(a.backend().contains("k").await.unwrap());
    assert!(b.backend().contains("k").await.unwrap());

    a.backend().remove(&["k".to_string()]).await.unwrap();
    assert!(!a.backend().contains("k").await.unwrap());

    assert_eq!(a.get_i64("k").await, 42);
    assert!(a.backend().contains("k").await.unwrap());
    match a.ttl("k").await.unwrap() {
        Some(Lifetime::Remaining(left)) => assert!(left > Duration::from_secs(55)),
        other => panic!("unexpected lifetime {:?}", other),
    }
    assert_eq!(a.stats().promotions(), 1);
}

#[tokio::test]
async fn test_expiry() {
    let dir = TempDir::new().unwrap();
    let a = two_levels(&dir);

    a.set("short", "v", Some(Duration::from_secs(1))).await.unwrap();
    assert!(a.has("short").await.unwrap());

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(!a.has("short").await.unwrap());
    assert_eq!(a.has_get_string("short").await, None);
}

#[tokio::test]
async fn test_zero_ttl_is_absent_immediately() {
    let dir = TempDir::new().unwrap();
    let a = two_levels(&dir);

    a.set("gone", &1, Some(Duration::ZERO)).await.unwrap();
    assert!(!a.has("gone").await.unwrap());
    assert_eq!(a.get_value("gone").await.unwrap(), None);
}

#[tokio::test]
async fn test_persistent_entries_survive_reads() {
    let dir = TempDir::new().unwrap();
    let a = two_levels(&dir);
    let b = a.parent().unwrap();

    a.set("forever", "x", None).await.unwrap();
    for _ in 0..3 {
        assert_eq!(a.get_string("forever").await, "x");
    }
    assert_eq!(b.ttl("forever").await.unwrap(), Some(Lifetime::Persistent));

    a.backend().remove(&["forever".to_string()]).await.unwrap();
    assert_eq!(a.get_string("forever").await, "x");
    assert_eq!(a.ttl("forever").await.unwrap(), Some(Lifetime::Persistent));
}

#[tokio::test]
async fn test_delete_propagation() {
    let dir = TempDir::new().unwrap();
    let a = two_levels(&dir);
    let b = a.parent().unwrap();

    a.set("x", &1, None).await.unwrap();
    a.set("y", &2, None).await.unwrap();
    a.del(&["x", "y"]).await.unwrap();

    for level in [&a, &b] {
        assert!(!level.backend().contains("x").await.unwrap());
        assert!(!level.backend().contains("y").await.unwrap());
    }
}

#[tokio::test]
async fn test_delete_from_root_leaves_nearer_copy() {
    let dir = TempDir::new().unwrap();
    let a = two_levels(&dir);
    let b = a.parent().unwrap();

    a.set("k", &1, None).await.unwrap();
    b.del(&["k"]).await.unwrap();

    // An embedded root has no channel to notify nearer tiers
    assert!(a.backend().contains("k").await.unwrap());
    assert!(!b.backend().contains("k").await.unwrap());
}

#[tokio::test]
async fn test_counter_anchoring() {
    let dir = TempDir::new().unwrap();
    let a = two_levels(&dir);
    let b = a.parent().unwrap();

    assert_eq!(a.incr("visits").await.unwrap(), 1);
    assert_eq!(a.incr_by("visits", 10).await.unwrap(), 11);
    assert_eq!(b.incr("visits").await.unwrap(), 12);
    assert_eq!(a.incr_by_float("ratio", 0.25).await.unwrap(), 0.25);

    assert!(!a.backend().contains("visits").await.unwrap());
    assert_eq!(b.get_i64("visits").await, 12);
    assert_eq!(b.ttl("visits").await.unwrap(), Some(Lifetime::Persistent));
}

#[tokio::test]
async fn test_counter_reads_between_increments() {
    let dir = TempDir::new().unwrap();
    let a = two_levels(&dir);

    a.incr("n").await.unwrap();
    assert_eq!(a.get_i64("n").await, 1);
    assert!(a.backend().contains("n").await.unwrap());

    a.incr("n").await.unwrap();
    assert!(!a.backend().contains("n").await.unwrap());
    assert_eq!(a.get_i64("n").await, 2);

    a.incr_by_float("n", 0.5).await.unwrap();
    assert_eq!(a.get_f64("n").await, 2.5);
}

#[tokio::test]
async fn test_sub_second_ttl_lives_one_second() {
    let dir = TempDir::new().unwrap();
    let a = two_levels(&dir);
    let b = a.parent().unwrap();

    a.set("blink", "v", Some(Duration::from_millis(500))).await.unwrap();
    assert_eq!(a.get_string("blink").await, "v");
    assert!(matches!(b.ttl("blink").await.unwrap(), Some(Lifetime::Remaining(_))));

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(a.get_value("blink").await.unwrap(), None);
    assert_eq!(b.ttl("blink").await.unwrap(), None);
}

#[tokio::test]
async fn test_scans_prefer_nearest_non_empty_level() {
    let dir = TempDir::new().unwrap();
    let a = two_levels(&dir);
    let b = a.parent().unwrap();

    b.set("user:1:name", "ada", None).await.unwrap();
    b.set("user:2:name", "bob", None).await.unwrap();

    let found = a.has_prefix("user:", None).await.unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found["user:1:name"], "ada");

    a.set("user:3:name", "eve", None).await.unwrap();
    let found = a.has_suffix(":name", None).await.unwrap();
    assert_eq!(found.keys().collect::<Vec<_>>(), vec!["user:3:name"]);

    let found = b.contains(":name", Some(2)).await.unwrap();
    assert_eq!(found.len(), 2);

    assert!(a.has_prefix("order:", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_typed_getters() {
    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        tags: Vec<String>,
    }

    let dir = TempDir::new().unwrap();
    let a = two_levels(&dir);

    let profile = Profile {
        name: "ada".to_string(),
        tags: vec!["admin".to_string()],
    };
    a.set("profile", &profile, None).await.unwrap();
    a.set("pi", &2.5, None).await.unwrap();
    a.set("on", &true, None).await.unwrap();
    a.set("when", "2024-01-02T03:04:05Z", None).await.unwrap();

    assert_eq!(a.has_get::<Profile>("profile").await, Some(profile));
    assert_eq!(a.get_f64("pi").await, 2.5);
    assert_eq!(a.get_i32("pi").await, 2);
    assert_eq!(a.get_string("pi").await, "2.5");
    assert!(a.get_bool("on").await);
    assert_eq!(a.has_get_time("when").await.unwrap().timestamp(), 1_704_164_645);
    assert_eq!(a.get_u16_or("missing", 9).await, 9);
    assert_eq!(a.has_get_bool("pi").await, None);
}

#[tokio::test]
async fn test_close_level() {
    let dir = TempDir::new().unwrap();
    let a = two_levels(&dir);
    let b = a.parent().unwrap();

    b.set("k", &1, None).await.unwrap();
    a.close().await.unwrap();

    assert!(a.backend().contains("k").await.is_err());
    assert!(b.backend().contains("k").await.unwrap());
}
