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

//! Catalog Registry (C3): in-memory lookup by table id, reference counting,
//! and cross-table resolution (spec §4.3). Owns the two catalog stores and
//! wires the `child_count` bookkeeping and replay-time orphan checks into
//! their hooks, so every other component only ever talks to `Registry`.

use std::sync::Arc;

use mnode_common::{MnodeError, MnodeResult};

use crate::manager::{DbDirectory, VgroupDirectory};
use crate::model::{ChildBody, ChildTable, SuperTable, TableId};
use crate::store::{
    decode_child, decode_super, encode_child, encode_super, CatalogStore, MemCatalogStore,
    OperationScope, StoreDescriptor,
};

/// Either half of what the registry can resolve a table id to
/// (spec §4.2 "tagged variant across the four kinds", surfaced here since
/// `stables`/`ctables` are two separate stores).
#[derive(Debug, Clone)]
pub enum Entity {
    Super(SuperTable),
    Child(ChildTable),
}

pub struct Registry {
    stables: Arc<MemCatalogStore<SuperTable>>,
    ctables: Arc<MemCatalogStore<ChildTable>>,
}

impl Registry {
    /// Builds the `stables`/`ctables` descriptors, wiring the `ctables`
    /// insert/delete hooks to validate forward references and maintain
    /// `child_count` (spec §4.1, §5 "Shared resources").
    fn ctables_descriptor(
        stables: Arc<MemCatalogStore<SuperTable>>,
        db_dir: Arc<DbDirectory>,
        vgroup_dir: Arc<VgroupDirectory>,
    ) -> StoreDescriptor<ChildTable> {
        let stables_insert = stables.clone();
        let db_dir_insert = db_dir.clone();
        let vgroup_dir_insert = vgroup_dir.clone();
        let on_insert = Arc::new(move |row: &ChildTable| -> MnodeResult<()> {
            if db_dir_insert.get_db_by_table_id(row.table_id()).is_none() {
                return Err(MnodeError::InvalidDb(row.table_id().db_name().to_string()));
            }
            if !vgroup_dir_insert.exists(row.vg_id) {
                return Err(MnodeError::InvalidVgroupId(row.vg_id));
            }
            if let Some(super_id) = row.super_table_id() {
                if stables_insert.get_sync(super_id.as_str()).is_none() {
                    return Err(MnodeError::InvalidTable(super_id.to_string()));
                }
                stables_insert.adjust_child_count(super_id.as_str(), 1);
            }
            Ok(())
        });

        let stables_delete = stables;
        let on_delete = Arc::new(move |row: &ChildTable| -> MnodeResult<()> {
            if let Some(super_id) = row.super_table_id() {
                stables_delete.adjust_child_count(super_id.as_str(), -1);
            }
            Ok(())
        });

        StoreDescriptor::new("ctables", 16, 0, 4096, encode_child, decode_child)
            .with_on_insert(on_insert)
            .with_on_delete(on_delete)
    }

    /// Constructs an empty registry (spec §4.1 `open` with no persisted
    /// rows).
    pub fn new(db_dir: Arc<DbDirectory>, vgroup_dir: Arc<VgroupDirectory>) -> Arc<Self> {
        let stables = MemCatalogStore::new(StoreDescriptor::new(
            "stables",
            16,
            0,
            4096,
            encode_super,
            decode_super,
        ));
        let ctables_descriptor = Self::ctables_descriptor(stables.clone(), db_dir, vgroup_dir);
        let ctables = MemCatalogStore::new(ctables_descriptor);
        Arc::new(Self { stables, ctables })
    }

    /// Replays persisted rows in order, super tables first (children may
    /// reference them), tolerating forward-reference failures by dropping
    /// the offending row rather than aborting (spec §4.1 "Replay contract",
    /// §8 scenario S6).
    pub fn open(
        db_dir: Arc<DbDirectory>,
        vgroup_dir: Arc<VgroupDirectory>,
        persisted_stables: Vec<(String, Vec<u8>)>,
        persisted_ctables: Vec<(String, Vec<u8>)>,
    ) -> Arc<Self> {
        let stables = MemCatalogStore::open(
            StoreDescriptor::new("stables", 16, 0, 4096, encode_super, decode_super),
            persisted_stables,
        );
        let ctables_descriptor = Self::ctables_descriptor(stables.clone(), db_dir, vgroup_dir);
        let ctables = MemCatalogStore::open(ctables_descriptor, persisted_ctables);
        Arc::new(Self { stables, ctables })
    }

    pub fn for_test() -> Arc<Self> {
        Self::new(DbDirectory::for_test(), VgroupDirectory::for_test())
    }

    pub fn stables(&self) -> &Arc<MemCatalogStore<SuperTable>> {
        &self.stables
    }

    pub fn ctables(&self) -> &Arc<MemCatalogStore<ChildTable>> {
        &self.ctables
    }

    pub async fn get_super(&self, id: &str) -> Option<SuperTable> {
        self.stables.get(id).await
    }

    pub async fn get_child(&self, id: &str) -> Option<ChildTable> {
        self.ctables.get(id).await
    }

    /// `get_table(id)`: stables first, then ctables (spec §4.3).
    pub async fn get_table(&self, id: &str) -> Option<Entity> {
        if let Some(s) = self.stables.get(id).await {
            return Some(Entity::Super(s));
        }
        self.ctables.get(id).await.map(Entity::Child)
    }

    pub fn inc_ref(&self, id: &str) {
        if self.stables.get_sync(id).is_some() {
            self.stables.inc_ref(id);
        } else {
            self.ctables.inc_ref(id);
        }
    }

    pub fn dec_ref(&self, id: &str) {
        if self.stables.get_sync(id).is_some() {
            self.stables.dec_ref(id);
        } else {
            self.ctables.dec_ref(id);
        }
    }

    /// Strips the `acct.db.` prefix: splits on `.` and returns everything
    /// after the second separator. A pure substring operation with no
    /// failure mode; a malformed id short of two dots returns the whole
    /// string (SPEC_FULL §11.6, grounded in `mgmtExtractTableName`).
    pub fn extract_display_name(table_id: &str) -> &str {
        match table_id.match_indices('.').nth(1) {
            Some((idx, _)) => &table_id[idx + 1..],
            None => table_id,
        }
    }

    /// Number of children currently referencing `super_id` (used by tests
    /// asserting invariant 1 in spec §8 without needing a live scan).
    pub fn child_count_of(&self, super_id: &TableId) -> u32 {
        self.stables
            .get_sync(super_id.as_str())
            .map(|s| s.child_count)
            .unwrap_or_default()
    }

    /// Distinct vgroup ids hosting at least one child of `super_id`
    /// (spec §6 wire kind `SuperTableVgroup`).
    pub fn child_vgroups_of(&self, super_id: &TableId) -> Vec<i32> {
        let mut vg_ids: Vec<i32> = self
            .ctables
            .snapshot()
            .into_iter()
            .filter(|c| child_references(c, super_id))
            .map(|c| c.vg_id)
            .collect();
        vg_ids.sort_unstable();
        vg_ids.dedup();
        vg_ids
    }
}

/// True when `child`'s body resolves to `super_id` (used by invariant tests
/// that scan `ctables.snapshot()` directly, spec §8 invariant 1).
pub fn child_references(child: &ChildTable, super_id: &TableId) -> bool {
    matches!(&child.body, ChildBody::Child { super_table_id } if super_table_id == super_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnType, SchemaColumn};

    fn db_dir_with(name: &str) -> Arc<DbDirectory> {
        let dir = DbDirectory::for_test();
        dir.insert(crate::manager::Db::new(
            name,
            "acct1",
            crate::manager::Precision::Milliseconds,
        ));
        dir
    }

    #[tokio::test]
    async fn child_count_tracks_inserts_and_deletes() {
        let db_dir = db_dir_with("a.db1");
        let vgroup_dir = VgroupDirectory::for_test();
        let vg_id = vgroup_dir.create_vgroup("a.db1", 4, vec![]);
        let registry = Registry::new(db_dir, vgroup_dir);

        let super_id = TableId::new("a.db1.weather").unwrap();
        let super_table = SuperTable::new(
            super_id.clone(),
            1,
            1,
            vec![SchemaColumn::new(0, "ts", ColumnType::Timestamp, 8)],
            vec![SchemaColumn::new(1, "loc", ColumnType::Binary, 16)],
        );
        registry
            .stables()
            .insert(super_table, OperationScope::Global)
            .await
            .unwrap();

        let child = ChildTable::new_child(
            TableId::new("a.db1.paris").unwrap(),
            2,
            1,
            vg_id,
            0,
            super_id.clone(),
        );
        registry
            .ctables()
            .insert(child, OperationScope::Global)
            .await
            .unwrap();

        assert_eq!(registry.child_count_of(&super_id), 1);

        registry
            .ctables()
            .delete("a.db1.paris", OperationScope::Global)
            .await
            .unwrap();
        assert_eq!(registry.child_count_of(&super_id), 0);
    }

    #[tokio::test]
    async fn insert_with_missing_super_is_rejected() {
        let db_dir = db_dir_with("a.db1");
        let vgroup_dir = VgroupDirectory::for_test();
        let vg_id = vgroup_dir.create_vgroup("a.db1", 4, vec![]);
        let registry = Registry::new(db_dir, vgroup_dir);

        let child = ChildTable::new_child(
            TableId::new("a.db1.paris").unwrap(),
            2,
            1,
            vg_id,
            0,
            TableId::new("a.db1.missing").unwrap(),
        );
        let err = registry
            .ctables()
            .insert(child, OperationScope::Global)
            .await
            .unwrap_err();
        assert!(matches!(err, MnodeError::InvalidTable(_)));
        assert!(registry.get_table("a.db1.paris").await.is_none());
    }

    #[test]
    fn extract_display_name_strips_acct_db_prefix() {
        assert_eq!(
            Registry::extract_display_name("a.db1.weather"),
            "weather"
        );
        assert_eq!(Registry::extract_display_name("malformed"), "malformed");
    }
}
