//! Property-Based Tests for the Manager
//!
//! Random operation sequences checked against a plain map model.

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{json, Value};

use crate::backend::{BackendKind, SyncKvBackend};
use crate::manager::{GetOptions, SetOptions, TieredCacheManager};

// == Strategies ==
/// Few distinct keys so operations collide.
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-f]{1,2}".prop_map(|s| s)
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: i64 },
    Get { key: String },
    Remove { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), any::<i64>()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
        key_strategy().prop_map(|key| CacheOp::Remove { key }),
    ]
}

async fn manager(memory_capacity: usize) -> TieredCacheManager {
    TieredCacheManager::builder("prop")
        .backend(Arc::new(SyncKvBackend::volatile(BackendKind::LocalKv, 1_000_000)))
        .memory_capacity(memory_capacity)
        .build()
        .await
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Reads always agree with the last write or removal, however small the
    // memory tier, and the counters add up.
    #[test]
    fn prop_reads_match_model(
        capacity in 0usize..4,
        ops in prop::collection::vec(cache_op_strategy(), 1..60),
    ) {
        tokio_test::block_on(async {
            let manager = manager(capacity).await;
            let mut model: HashMap<String, i64> = HashMap::new();
            let (mut hits, mut misses, mut writes) = (0u64, 0u64, 0u64);

            for op in ops {
                match op {
                    CacheOp::Set { key, value } => {
                        manager.set(&key, &json!(value), SetOptions::default()).await.unwrap();
                        model.insert(key, value);
                        writes += 1;
                    }
                    CacheOp::Get { key } => {
                        let got = manager.get(&key, GetOptions::default()).await.unwrap();
                        let expected = model.get(&key).map(|v| Value::from(*v));
                        if expected.is_some() { hits += 1 } else { misses += 1 }
                        prop_assert_eq!(got, expected, "read of {} disagrees", key);
                    }
                    CacheOp::Remove { key } => {
                        manager.remove(&key, None).await.unwrap();
                        model.remove(&key);
                    }
                }
            }

            let stats = manager.stats();
            prop_assert_eq!(stats.hits, hits);
            prop_assert_eq!(stats.misses, misses);
            prop_assert_eq!(stats.writes, writes);
            prop_assert!(stats.memory_entries <= capacity);
            Ok(())
        })?;
    }
}
