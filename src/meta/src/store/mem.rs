// Copyright 2024 The mnode Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! In-process implementation of [`CatalogStore`]. Good enough to run a
//! single management node and to exercise every invariant in spec §8; a
//! replicated backend would sit behind the same trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mnode_common::{MnodeError, MnodeResult};
use parking_lot::{Mutex, RwLock};

use super::{CatalogRow, CatalogStore, OperationScope, StoreDescriptor};

/// Per-key write lock so that operations on the same table id are
/// serialized while operations on different ids proceed concurrently (spec
/// §5 "Ordering guarantees").
#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    fn get(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

pub struct MemCatalogStore<T: CatalogRow> {
    descriptor: StoreDescriptor<T>,
    live: RwLock<HashMap<String, T>>,
    /// Insertion order of currently-live keys, so `snapshot`/`export`
    /// observe persistence order (spec §4.1 "Replay contract").
    order: Mutex<Vec<String>>,
    key_locks: KeyLocks,
}

impl<T: CatalogRow> MemCatalogStore<T> {
    /// Creates an empty store from a descriptor.
    pub fn new(descriptor: StoreDescriptor<T>) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            live: RwLock::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
            key_locks: KeyLocks::default(),
        })
    }

    /// Replays a persisted log: decodes every row and invokes `on_insert` in
    /// persistence order. An `on_insert` failure (forward reference to a
    /// missing db/vgroup/super) demotes that row to orphan via a `Local`
    /// delete rather than aborting the replay (spec §4.1).
    pub fn open(descriptor: StoreDescriptor<T>, persisted: Vec<(String, Vec<u8>)>) -> Arc<Self> {
        let store = Self::new(descriptor);
        for (key, bytes) in persisted {
            let row = match (store.descriptor.decode)(&bytes) {
                Ok(row) => row,
                Err(err) => {
                    tracing::warn!(key, error = %err, "dropping undecodable row during replay");
                    continue;
                }
            };
            match (store.descriptor.on_insert)(&row) {
                Ok(()) => {
                    store.live.write().insert(key.clone(), row);
                    store.order.lock().push(key);
                }
                Err(err) => {
                    tracing::warn!(
                        key,
                        error = %err,
                        "orphan row during replay, local-deleting"
                    );
                }
            }
        }
        store
    }

    /// Synchronous read used by hooks, which run outside the `async_trait`
    /// machinery (spec §4.1 callbacks are plain invocations, not RPCs).
    pub fn get_sync(&self, key: &str) -> Option<T> {
        self.live.read().get(key).cloned()
    }
}

impl MemCatalogStore<crate::model::SuperTable> {
    /// Adjusts `child_count` in place. Called from the `ctables` insert/
    /// delete hooks under the ctables write lock (spec §5 "Shared
    /// resources"); bypasses the full insert/update pipeline since this is
    /// bookkeeping derived from the child catalog, not an independent
    /// mutation of the super row.
    pub fn adjust_child_count(&self, super_id: &str, delta: i32) {
        if let Some(s) = self.live.write().get_mut(super_id) {
            s.child_count = (s.child_count as i32 + delta).max(0) as u32;
        }
    }
}

#[async_trait]
impl<T: CatalogRow> CatalogStore<T> for MemCatalogStore<T> {
    fn descriptor(&self) -> &StoreDescriptor<T> {
        &self.descriptor
    }

    async fn insert(&self, row: T, scope: OperationScope) -> MnodeResult<()> {
        let key = row.key();
        let guard = self.key_locks.get(&key);
        let _permit = guard.lock().await;

        if self.live.read().contains_key(&key) {
            return Err(MnodeError::TableAlreadyExist(key));
        }
        (self.descriptor.on_insert)(&row)?;
        self.live.write().insert(key.clone(), row);
        if scope == OperationScope::Global {
            self.order.lock().push(key);
        }
        Ok(())
    }

    async fn delete(&self, key: &str, _scope: OperationScope) -> MnodeResult<()> {
        let guard = self.key_locks.get(key);
        let _permit = guard.lock().await;

        let removed = self.live.write().remove(key);
        if let Some(row) = removed {
            (self.descriptor.on_delete)(&row)?;
            (self.descriptor.on_destroy)(&row);
            self.order.lock().retain(|k| k != key);
        }
        Ok(())
    }

    async fn update(&self, row: T, _scope: OperationScope) -> MnodeResult<()> {
        let key = row.key();
        let guard = self.key_locks.get(&key);
        let _permit = guard.lock().await;

        if !self.live.read().contains_key(&key) {
            return Err(MnodeError::InvalidTable(key));
        }
        (self.descriptor.on_update)(&row)?;
        self.live.write().insert(key, row);
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<T> {
        self.get_sync(key)
    }

    fn snapshot(&self) -> Vec<T> {
        let live = self.live.read();
        self.order
            .lock()
            .iter()
            .filter_map(|k| live.get(k).cloned())
            .collect()
    }

    fn inc_ref(&self, key: &str) {
        if let Some(row) = self.live.write().get_mut(key) {
            row.set_ref_count(row.ref_count() + 1);
        }
    }

    fn dec_ref(&self, key: &str) {
        if let Some(row) = self.live.write().get_mut(key) {
            let n = row.ref_count();
            row.set_ref_count(n.saturating_sub(1));
        }
    }

    fn export(&self) -> Vec<(String, Vec<u8>)> {
        let live = self.live.read();
        self.order
            .lock()
            .iter()
            .filter_map(|k| live.get(k).map(|row| (k.clone(), (self.descriptor.encode)(row))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnType, SchemaColumn, SuperTable, TableId};
    use crate::store::codec::{decode_super, encode_super};

    fn make_store() -> Arc<MemCatalogStore<SuperTable>> {
        MemCatalogStore::new(StoreDescriptor::new(
            "stables_test",
            16,
            0,
            4096,
            encode_super,
            decode_super,
        ))
    }

    #[tokio::test]
    async fn insert_get_delete_round_trip() {
        let store = make_store();
        let s = SuperTable::new(
            TableId::new("a.db1.weather").unwrap(),
            1,
            1,
            vec![SchemaColumn::new(0, "ts", ColumnType::Timestamp, 8)],
            vec![SchemaColumn::new(1, "loc", ColumnType::Binary, 16)],
        );
        store
            .insert(s.clone(), OperationScope::Global)
            .await
            .unwrap();
        assert!(store.get("a.db1.weather").await.is_some());

        let dup = store.insert(s.clone(), OperationScope::Global).await;
        assert!(matches!(dup, Err(MnodeError::TableAlreadyExist(_))));

        store
            .delete("a.db1.weather", OperationScope::Global)
            .await
            .unwrap();
        assert!(store.get("a.db1.weather").await.is_none());
    }

    #[tokio::test]
    async fn ref_counting() {
        let store = make_store();
        let s = SuperTable::new(TableId::new("a.db1.t").unwrap(), 1, 1, vec![], vec![]);
        store.insert(s, OperationScope::Global).await.unwrap();
        store.inc_ref("a.db1.t");
        store.inc_ref("a.db1.t");
        store.dec_ref("a.db1.t");
        assert_eq!(store.get("a.db1.t").await.unwrap().header.ref_count, 1);
    }
}
