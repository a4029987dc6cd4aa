//! Property tests for the bulk cache invariants.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bulkcache_test_utils::assertions::*;
use bulkcache_test_utils::fixtures::*;
use bulkcache_test_utils::generators::*;
use bulkcache_test_utils::*;
use proptest::prelude::*;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("test runtime")
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Cached keys are never forwarded, the source runs at most once, and
    /// the merged result covers every requested key.
    #[test]
    fn prop_partial_hits_forward_only_misses((ids, cached) in arb_partial_hit(16)) {
        block_on(async {
            let log = OpLog::new();
            let store = Arc::new(RecordingStore::<String>::with_log(log.clone()));
            let coordinator = scalar_coordinator(store.clone());
            let method = find_by_ids();
            let read = coordinator
                .declare(OperationDeclaration::read().cache("letters"), &method)
                .unwrap();

            for (id, _) in ids.iter().zip(&cached).filter(|(_, hit)| **hit) {
                store.seed("letters", key(*id), format!("cached-{}", id)).await.unwrap();
            }
            let source = CountingSource::new(ids.iter().map(|id| (*id, format!("fresh-{}", id))));

            let result = coordinator
                .execute(&[read], source.lookup(REPOSITORY, &method, &ids))
                .await
                .unwrap()
                .into_mapping()
                .unwrap();

            let misses: HashSet<u64> = ids
                .iter()
                .zip(&cached)
                .filter(|(_, hit)| !**hit)
                .map(|(id, _)| *id)
                .collect();

            assert_eq!(result.len(), ids.len());
            assert_source_calls(&source, usize::from(!misses.is_empty()));
            let forwarded: HashSet<u64> = source.requested_keys().into_iter().collect();
            assert_eq!(forwarded, misses);

            for (id, hit) in ids.iter().zip(&cached) {
                let expected = if *hit {
                    format!("cached-{}", id)
                } else {
                    format!("fresh-{}", id)
                };
                assert_eq!(result[id], expected);
            }
            assert_eq!(log.puts_to("letters").len(), misses.len());
        });
    }

    /// Every freshly fetched entry lands in every declared cache.
    #[test]
    fn prop_misses_written_to_every_cache(names in arb_cache_names(), ids in arb_id_batch(8)) {
        block_on(async {
            let log = OpLog::new();
            let store = Arc::new(RecordingStore::<String>::with_log(log.clone()));
            let coordinator = scalar_coordinator(store.clone());
            let method = find_by_ids();
            let read = coordinator
                .declare(OperationDeclaration::read().cache_names(names.clone()), &method)
                .unwrap();
            let source = CountingSource::new(ids.iter().map(|id| (*id, id.to_string())));

            coordinator
                .execute(&[read], source.lookup(REPOSITORY, &method, &ids))
                .await
                .unwrap();

            for name in &names {
                for id in &ids {
                    assert!(store.inner().contains(name, &key(*id)).await);
                }
                assert_eq!(log.puts_to(name).len(), ids.len());
            }
        });
    }

    /// Every targeted key is gone from every cache before the source runs.
    #[test]
    fn prop_evict_before_invoke(names in arb_cache_names(), (ids, cached) in arb_partial_hit(10)) {
        block_on(async {
            let log = OpLog::new();
            let store = Arc::new(RecordingStore::<String>::with_log(log.clone()));
            let coordinator = scalar_coordinator(store.clone());
            let method = delete_all();
            let evict = coordinator
                .declare(OperationDeclaration::evict().cache_names(names.clone()), &method)
                .unwrap();

            for (id, _) in ids.iter().zip(&cached).filter(|(_, hit)| **hit) {
                for name in &names {
                    store.seed(name, key(*id), id.to_string()).await.unwrap();
                }
            }
            let source = CountingSource::<u64, String>::new(Vec::new()).with_log(log.clone());

            let output = coordinator
                .execute(&[evict], source.delete(REPOSITORY, &method, &ids))
                .await
                .unwrap();

            assert_eq!(output, InvocationOutput::Unit);
            assert_evicted_before_proceed(&log);
            assert_eq!(store.inner().entry_count().await, 0);
            assert_eq!(log.proceeds(), 1);
        });
    }

    /// A false condition skips every probe and write; the source sees the original ids.
    #[test]
    fn prop_condition_gates_whole_batch(ids in arb_id_batch(6)) {
        block_on(async {
            let log = OpLog::new();
            let store = Arc::new(RecordingStore::<String>::with_log(log.clone()));
            let coordinator = scalar_coordinator(store.clone());
            let method = find_by_ids();
            let read = coordinator
                .declare(
                    OperationDeclaration::read().cache("letters").condition(SMALL_BATCH),
                    &method,
                )
                .unwrap();
            let source = CountingSource::new(ids.iter().map(|id| (*id, id.to_string())));

            let result = coordinator
                .execute(&[read], source.lookup(REPOSITORY, &method, &ids))
                .await
                .unwrap()
                .into_mapping()
                .unwrap();
            assert_eq!(result.len(), ids.len());

            if ids.len() < 3 {
                assert_eq!(log.puts_to("letters").len(), ids.len());
            } else {
                assert_no_probes(&log);
                assert_no_puts(&log);
                assert_eq!(source.batches(), vec![ids.clone()]);
            }
        });
    }

    /// Write-through caches every returned element under its value key,
    /// replacing whatever was cached before.
    #[test]
    fn prop_write_through_is_unconditional(
        entries in prop::collection::vec((arb_item(), any::<bool>()), 0..12),
    ) {
        block_on(async {
            let store = Arc::new(RecordingStore::<Item>::new());
            let coordinator = item_coordinator(store.clone());
            let save = save_all();
            let write = coordinator
                .declare(
                    OperationDeclaration::write().cache("items").key(RESULT_ID),
                    &save,
                )
                .unwrap();

            for (item, _) in entries.iter().filter(|(_, stale)| *stale) {
                let stale = Item { id: item.id, name: format!("stale-{}", item.name) };
                store.seed("items", key(item.id), stale).await.unwrap();
            }
            let items: Vec<Item> = entries.into_iter().map(|(item, _)| item).collect();
            let source = CountingSource::<ItemId, Item>::new(Vec::new());

            let saved = coordinator
                .execute(&[write], source.save(REPOSITORY, &save, items.clone()))
                .await
                .unwrap()
                .into_collection()
                .unwrap();

            assert_eq!(saved, items);
            assert_source_calls(&source, 1);

            let latest: HashMap<u64, &Item> = items.iter().map(|item| (item.id, item)).collect();
            for (id, item) in latest {
                assert_eq!(store.inner().peek("items", &key(id)).await.as_ref(), Some(item));
            }
        });
    }
}
