//! Primary cache behavior against both record backends.

mod common;

use std::time::Duration;

use common::{Backend, Deployment, Project, fixture, project};
use futures_util::future::join_all;
use keygate_cache::{KeyValueStore, clear_cache_of};
use keygate_storage::EntityStore;

#[tokio::test]
async fn test_concurrent_cold_reads_collapse_to_one_fill() {
    for backend in [Backend::Shared, Backend::Local] {
        let fx = fixture::<Project>(backend);
        fx.counting.create(&project("p1", "Apollo")).await.unwrap();

        let cache = fx.cache.clone();
        let reads = (0..8).map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get("p1").await })
        });
        let results = join_all(reads).await;

        for result in results {
            let found = result.unwrap().unwrap().unwrap();
            assert_eq!(found, project("p1", "Apollo"));
        }
        assert_eq!(fx.counting.point_reads(), 1, "{backend:?}");
    }
}

#[tokio::test]
async fn test_batch_preserves_order_and_queries_only_uncached() {
    for backend in [Backend::Shared, Backend::Local] {
        let fx = fixture::<Project>(backend);
        fx.counting.create(&project("id1", "one")).await.unwrap();
        fx.counting.create(&project("id2", "two")).await.unwrap();
        fx.cache.get("id1").await.unwrap();

        let ids = vec!["id2".to_string(), "id1".to_string(), "id3".to_string()];
        let results = fx.cache.get_batch(&ids).await.unwrap();

        assert_eq!(
            results,
            vec![Some(project("id2", "two")), Some(project("id1", "one")), None]
        );
        assert_eq!(
            *fx.counting.batch_queries.lock(),
            vec![vec!["id2".to_string(), "id3".to_string()]],
            "{backend:?}"
        );

        // id2 was written back; a second batch is served from the cache.
        fx.cache.get_batch(&ids).await.unwrap();
        assert_eq!(fx.counting.batch_queries.lock().len(), 2);
        assert_eq!(fx.counting.batch_queries.lock()[1], vec!["id3".to_string()]);
    }
}

#[tokio::test]
async fn test_reads_observe_last_write() {
    for backend in [Backend::Shared, Backend::Local] {
        let fx = fixture::<Project>(backend);

        fx.store.create(&project("p1", "v1")).await.unwrap();
        assert_eq!(fx.cache.get("p1").await.unwrap().unwrap().name, "v1");

        fx.store.update(&project("p1", "v2")).await.unwrap();
        assert_eq!(fx.cache.get("p1").await.unwrap().unwrap().name, "v2");

        fx.store.update(&project("p1", "v3")).await.unwrap();
        fx.store.update(&project("p1", "v4")).await.unwrap();
        assert_eq!(fx.cache.get("p1").await.unwrap().unwrap().name, "v4");

        fx.store.delete("p1").await.unwrap();
        assert!(fx.cache.get("p1").await.unwrap().is_none(), "{backend:?}");
    }
}

#[tokio::test]
async fn test_fill_overlapping_a_destroy_does_not_restore_the_row() {
    for backend in [Backend::Shared, Backend::Local] {
        let fx = fixture::<Project>(backend);
        fx.counting.create(&project("p1", "v1")).await.unwrap();

        // The fill reads v1, then stalls while the row is destroyed.
        fx.counting.set_delay(Duration::from_millis(60));
        let cache = fx.cache.clone();
        let fill = tokio::spawn(async move { cache.get("p1").await });
        tokio::time::sleep(Duration::from_millis(15)).await;
        fx.counting.set_delay(Duration::ZERO);
        fx.store.delete("p1").await.unwrap();
        fill.await.unwrap().unwrap();

        assert!(fx.cache.get("p1").await.unwrap().is_none(), "{backend:?}");
        assert!(fx.kv.get("projects:p1").await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_fill_overlapping_an_update_keeps_the_new_state() {
    for backend in [Backend::Shared, Backend::Local] {
        let fx = fixture::<Project>(backend);
        fx.counting.create(&project("p1", "v1")).await.unwrap();

        fx.counting.set_delay(Duration::from_millis(60));
        let cache = fx.cache.clone();
        let fill = tokio::spawn(async move { cache.get("p1").await });
        tokio::time::sleep(Duration::from_millis(15)).await;
        fx.counting.set_delay(Duration::ZERO);
        fx.store.update(&project("p1", "v2")).await.unwrap();

        let filled = fill.await.unwrap().unwrap().unwrap();
        assert_eq!(filled.name, "v1");
        assert_eq!(
            fx.cache.get("p1").await.unwrap().unwrap().name,
            "v2",
            "{backend:?}"
        );
    }
}

#[tokio::test]
async fn test_detached_cache_goes_stale() {
    let fx = fixture::<Project>(Backend::Shared);
    fx.store.create(&project("p1", "v1")).await.unwrap();
    fx.cache.detach(&fx.hooks);

    fx.store.update(&project("p1", "v2")).await.unwrap();
    assert_eq!(fx.cache.get("p1").await.unwrap().unwrap().name, "v1");
}

#[tokio::test]
async fn test_corrupt_shared_payload_refetches() {
    let fx = fixture::<Project>(Backend::Shared);
    fx.counting.create(&project("p1", "Apollo")).await.unwrap();
    fx.kv.set("projects:p1", "\u{0}garbage", None).await.unwrap();

    let found = fx.cache.get("p1").await.unwrap().unwrap();
    assert_eq!(found.name, "Apollo");
    assert_eq!(fx.counting.point_reads(), 1);

    // The fill replaced the corrupt payload.
    fx.cache.get("p1").await.unwrap();
    assert_eq!(fx.counting.point_reads(), 1);
}

#[tokio::test]
async fn test_parent_destroy_evicts_dependents() {
    let parents = fixture::<Project>(Backend::Shared);
    let children = common::fixture_on::<Deployment>(Backend::Shared, parents.kv.clone());

    for (id, project_id) in [("d1", "p1"), ("d2", "p1"), ("d3", "p2")] {
        children
            .store
            .create(&Deployment {
                id: id.into(),
                project_id: project_id.into(),
            })
            .await
            .unwrap();
    }
    parents.store.create(&project("p1", "Apollo")).await.unwrap();

    let cascade = clear_cache_of(children.cache.clone(), "project_id");
    assert!(cascade.attach(&parents.hooks));
    assert!(!cascade.attach(&parents.hooks));

    parents.store.delete("p1").await.unwrap();

    assert!(parents.kv.get("deployments:d1").await.unwrap().is_none());
    assert!(parents.kv.get("deployments:d2").await.unwrap().is_none());
    assert!(parents.kv.get("deployments:d3").await.unwrap().is_some());

    // Eviction only; the rows themselves remain.
    assert!(
        children
            .counting
            .find_by_id("d1", &[])
            .await
            .unwrap()
            .is_some()
    );
}
