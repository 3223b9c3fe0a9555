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

//! Catalog Store Adapter (C1): a uniform interface to the replicated log for
//! the two logical catalog tables `stables` and `ctables` (spec §4.1).
//!
//! The trait here is deliberately the *only* thing the rest of the crate
//! depends on; the persistent replicated log itself ("SDB") is out of scope
//! (spec §1). [`mem::MemCatalogStore`] is the in-process implementation this
//! crate ships, good enough to run standalone and to exercise every
//! invariant in spec §8. A real replicated-log backend would implement
//! [`CatalogStore`] without any caller needing to change.

mod codec;
mod mem;

pub use codec::{decode_child, decode_super, encode_child, encode_super};
pub use mem::MemCatalogStore;

use std::sync::Arc;

use async_trait::async_trait;
use mnode_common::MnodeResult;

/// Whether a write must be durably replicated before acknowledgement
/// (`Global`) or is in-memory-only bookkeeping (`Local`), spec §4.1. Replay
/// uses `Local` deletes to clean up rows whose forward references (db,
/// vgroup, super table) turned out to be missing, without re-appending
/// anything to the durable log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationScope {
    Global,
    Local,
}

/// A row stored in a [`CatalogStore`] must expose a stable string key (the
/// dotted table id) and a mutable reference count (spec §3: `ref_count`).
pub trait CatalogRow: Clone + Send + Sync + 'static {
    fn key(&self) -> String;
    fn ref_count(&self) -> u32;
    fn set_ref_count(&mut self, n: u32);
}

impl CatalogRow for crate::model::SuperTable {
    fn key(&self) -> String {
        self.table_id().as_str().to_string()
    }

    fn ref_count(&self) -> u32 {
        self.header.ref_count
    }

    fn set_ref_count(&mut self, n: u32) {
        self.header.ref_count = n;
    }
}

impl CatalogRow for crate::model::ChildTable {
    fn key(&self) -> String {
        self.table_id().as_str().to_string()
    }

    fn ref_count(&self) -> u32 {
        self.header.ref_count
    }

    fn set_ref_count(&mut self, n: u32) {
        self.header.ref_count = n;
    }
}

/// A side-effecting hook invoked by the store around a mutation or during
/// replay (spec §4.1: "six callbacks ... invoked by the store during replay
/// and mutation"). Hooks report failure by returning `Err`; the store turns
/// an `Err` from the *insert* hook during replay into a `Local` delete of
/// the offending row rather than aborting the replay (spec §4.1 "Replay
/// contract").
pub type RowHook<T> = Arc<dyn Fn(&T) -> MnodeResult<()> + Send + Sync>;

/// Static shape of a logical catalog table (spec §4.1).
pub struct StoreDescriptor<T> {
    pub name: &'static str,
    pub hash_buckets: usize,
    /// Contiguous header bytes eligible for in-place update (spec §4.1).
    pub update_prefix_size: usize,
    pub max_row_size: usize,
    pub encode: fn(&T) -> Vec<u8>,
    pub decode: fn(&[u8]) -> MnodeResult<T>,
    pub on_insert: RowHook<T>,
    pub on_delete: RowHook<T>,
    pub on_update: RowHook<T>,
    pub on_destroy: RowHook<T>,
}

impl<T> StoreDescriptor<T> {
    /// A descriptor whose four side-effect hooks are no-ops; callers wire in
    /// the hooks that actually matter (e.g. child_count maintenance) when
    /// they have something to hook.
    pub fn new(
        name: &'static str,
        hash_buckets: usize,
        update_prefix_size: usize,
        max_row_size: usize,
        encode: fn(&T) -> Vec<u8>,
        decode: fn(&[u8]) -> MnodeResult<T>,
    ) -> Self {
        let noop: RowHook<T> = Arc::new(|_: &T| Ok(()));
        Self {
            name,
            hash_buckets,
            update_prefix_size,
            max_row_size,
            encode,
            decode,
            on_insert: noop.clone(),
            on_delete: noop.clone(),
            on_update: noop.clone(),
            on_destroy: noop,
        }
    }

    pub fn with_on_insert(mut self, hook: RowHook<T>) -> Self {
        self.on_insert = hook;
        self
    }

    pub fn with_on_delete(mut self, hook: RowHook<T>) -> Self {
        self.on_delete = hook;
        self
    }
}

/// The Catalog Store Adapter contract (spec §4.1): `open` happens at
/// construction time (see [`MemCatalogStore::open`]), everything else is
/// exposed here.
#[async_trait]
pub trait CatalogStore<T>: Send + Sync
where
    T: CatalogRow,
{
    fn descriptor(&self) -> &StoreDescriptor<T>;

    async fn insert(&self, row: T, scope: OperationScope) -> MnodeResult<()>;

    async fn delete(&self, key: &str, scope: OperationScope) -> MnodeResult<()>;

    async fn update(&self, row: T, scope: OperationScope) -> MnodeResult<()>;

    async fn get(&self, key: &str) -> Option<T>;

    /// A consistent point-in-time snapshot of every row, in persistence
    /// order. Show/Retrieve iterators (C7) build their cursor on top of
    /// this.
    fn snapshot(&self) -> Vec<T>;

    fn inc_ref(&self, key: &str);

    fn dec_ref(&self, key: &str);

    /// Encodes every live row for persistence, in insertion order. Used by
    /// tests to simulate a close/reopen cycle (spec §8 "Round-trip").
    fn export(&self) -> Vec<(String, Vec<u8>)>;
}
