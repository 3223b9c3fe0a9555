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

//! Schema Mutation Engine (C4): add/drop/rename column and tag operations
//! with invariant enforcement (spec §4.4). Operates on rows already resolved
//! through the [`crate::registry::Registry`] and persists through
//! `CatalogStore::update`.

use mnode_common::config::SchemaLimits;
use mnode_common::{MnodeError, MnodeResult};

use crate::manager::AccountDirectory;
use crate::model::{ChildBody, ChildTable, SchemaColumn, SuperTable};
use crate::registry::Registry;
use crate::store::{CatalogStore, OperationScope};

/// `AlterTable` kinds the engine understands (spec §6 wire message kinds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlterKind {
    AddTag,
    DropTag,
    RenameTag,
    AddColumn,
    DropColumn,
    UpdateTagValue,
}

pub struct SchemaEngine<'a> {
    pub registry: &'a Registry,
    pub accounts: &'a AccountDirectory,
    pub limits: SchemaLimits,
}

fn reject_name_collision(schema: &[SchemaColumn], name: &str) -> MnodeResult<()> {
    if schema.iter().any(|c| c.name.eq_ignore_ascii_case(name)) {
        Err(MnodeError::AppError(format!(
            "column or tag name already exists: {name}"
        )))
    } else {
        Ok(())
    }
}

fn reject_name_too_long(name: &str, max_name_len: usize) -> MnodeResult<()> {
    if name.len() > max_name_len {
        Err(MnodeError::AppError(format!(
            "name too long: {name} (max {max_name_len})"
        )))
    } else {
        Ok(())
    }
}

impl<'a> SchemaEngine<'a> {
    pub fn new(registry: &'a Registry, accounts: &'a AccountDirectory, limits: SchemaLimits) -> Self {
        Self {
            registry,
            accounts,
            limits,
        }
    }

    /// Add one or more tags to a super table (spec §4.4 "Add tag(s)").
    pub async fn add_tags(
        &self,
        acct: &str,
        mut s: SuperTable,
        new_tags: Vec<(String, crate::model::ColumnType, i32)>,
    ) -> MnodeResult<SuperTable> {
        if s.num_tags + new_tags.len() > self.limits.max_tags {
            return Err(MnodeError::AppError(format!(
                "num_tags would exceed MAX_TAGS ({})",
                self.limits.max_tags
            )));
        }
        for (name, _, _) in &new_tags {
            reject_name_collision(&s.schema, name)?;
            reject_name_too_long(name, self.limits.max_name_len)?;
        }
        let num_new_tags = new_tags.len();
        for (name, ty, bytes) in new_tags {
            let col_id = s.alloc_col_id();
            s.schema.push(SchemaColumn::new(col_id, name, ty, bytes));
            s.num_tags += 1;
        }
        s.schema_version += 1;

        let child_count = s.child_count;
        let key = s.table_id().as_str().to_string();
        self.registry
            .stables()
            .update(s.clone(), OperationScope::Global)
            .await?;
        if child_count > 0 {
            self.accounts
                .grant_add(acct, num_new_tags as i64 * child_count as i64)?;
        }
        tracing::info!(table_id = %key, "added tag(s) to super table");
        Ok(s)
    }

    /// Drop a tag by index (spec §4.4 "Drop tag"); index 0 (the primary tag)
    /// is undroppable (spec §9 Open Question (b)).
    pub async fn drop_tag(&self, mut s: SuperTable, tag_index: usize) -> MnodeResult<SuperTable> {
        if tag_index == 0 || tag_index >= s.num_tags {
            return Err(MnodeError::AppError(format!(
                "tag index {tag_index} cannot be dropped"
            )));
        }
        let schema_idx = s.num_columns + tag_index;
        s.schema.remove(schema_idx);
        s.num_tags -= 1;
        s.schema_version += 1;
        self.registry
            .stables()
            .update(s.clone(), OperationScope::Global)
            .await?;
        Ok(s)
    }

    /// Rename a tag (spec §4.4 "Rename tag").
    pub async fn rename_tag(
        &self,
        mut s: SuperTable,
        tag_index: usize,
        new_name: String,
    ) -> MnodeResult<SuperTable> {
        if tag_index >= s.num_tags {
            return Err(MnodeError::AppError(format!("no such tag index {tag_index}")));
        }
        reject_name_collision(&s.schema, &new_name)?;
        reject_name_too_long(&new_name, self.limits.max_name_len)?;
        let schema_idx = s.num_columns + tag_index;
        s.schema[schema_idx].name = new_name;
        s.schema_version += 1;
        self.registry
            .stables()
            .update(s.clone(), OperationScope::Global)
            .await?;
        Ok(s)
    }

    /// Add column(s) to a super table (spec §4.4 "Add column").
    pub async fn add_super_columns(
        &self,
        acct: &str,
        mut s: SuperTable,
        new_columns: Vec<(String, crate::model::ColumnType, i32)>,
    ) -> MnodeResult<SuperTable> {
        if s.num_columns + s.num_tags + new_columns.len() > self.limits.max_columns {
            return Err(MnodeError::AppError(format!(
                "total columns+tags would exceed MAX_COLUMNS ({})",
                self.limits.max_columns
            )));
        }
        for (name, _, _) in &new_columns {
            reject_name_collision(&s.schema, name)?;
            reject_name_too_long(name, self.limits.max_name_len)?;
        }
        let num_new_columns = new_columns.len();
        for (name, ty, bytes) in new_columns {
            let col_id = s.alloc_col_id();
            s.schema
                .insert(s.num_columns, SchemaColumn::new(col_id, name, ty, bytes));
            s.num_columns += 1;
        }
        s.schema_version += 1;

        let child_count = s.child_count;
        self.registry
            .stables()
            .update(s.clone(), OperationScope::Global)
            .await?;
        if child_count > 0 {
            self.accounts
                .grant_add(acct, num_new_columns as i64 * child_count as i64)?;
        }
        Ok(s)
    }

    /// Drop a column from a super table (spec §4.4 "Drop column").
    pub async fn drop_super_column(
        &self,
        acct: &str,
        mut s: SuperTable,
        column_index: usize,
    ) -> MnodeResult<SuperTable> {
        if column_index >= s.num_columns {
            return Err(MnodeError::AppError(format!("no such column index {column_index}")));
        }
        s.schema.remove(column_index);
        s.num_columns -= 1;
        s.schema_version += 1;

        let child_count = s.child_count;
        self.registry
            .stables()
            .update(s.clone(), OperationScope::Global)
            .await?;
        if child_count > 0 {
            self.accounts.grant_add(acct, -(child_count as i64))?;
        }
        Ok(s)
    }

    /// Add column(s) to a normal/stream table (spec §4.4 "Add column /
    /// Drop column" for normal tables, account adjustment by ±1).
    pub async fn add_normal_columns(
        &self,
        acct: &str,
        mut t: ChildTable,
        new_columns: Vec<(String, crate::model::ColumnType, i32)>,
    ) -> MnodeResult<ChildTable> {
        let schema = t
            .own_schema()
            .ok_or_else(|| MnodeError::AppError("not a normal/stream table".to_string()))?
            .to_vec();
        for (name, _, _) in &new_columns {
            reject_name_collision(&schema, name)?;
            reject_name_too_long(name, self.limits.max_name_len)?;
        }
        match &mut t.body {
            ChildBody::Normal {
                schema,
                num_columns,
                next_col_id,
                schema_version,
            }
            | ChildBody::Stream {
                schema,
                num_columns,
                next_col_id,
                schema_version,
                ..
            } => {
                for (name, ty, bytes) in new_columns {
                    let col_id = *next_col_id;
                    *next_col_id += 1;
                    schema.push(SchemaColumn::new(col_id, name, ty, bytes));
                    *num_columns += 1;
                }
                *schema_version += 1;
            }
            ChildBody::Child { .. } => unreachable!("checked by own_schema above"),
        }

        self.registry
            .ctables()
            .update(t.clone(), OperationScope::Global)
            .await?;
        self.accounts.grant_add(acct, 1)?;
        Ok(t)
    }

    /// Drop a column from a normal/stream table.
    pub async fn drop_normal_column(
        &self,
        acct: &str,
        mut t: ChildTable,
        column_index: usize,
    ) -> MnodeResult<ChildTable> {
        match &mut t.body {
            ChildBody::Normal {
                schema,
                num_columns,
                schema_version,
                ..
            }
            | ChildBody::Stream {
                schema,
                num_columns,
                schema_version,
                ..
            } => {
                if column_index >= schema.len() {
                    return Err(MnodeError::AppError(format!(
                        "no such column index {column_index}"
                    )));
                }
                schema.remove(column_index);
                *num_columns -= 1;
                *schema_version += 1;
            }
            ChildBody::Child { .. } => {
                return Err(MnodeError::AppError("not a normal/stream table".to_string()))
            }
        }
        self.registry
            .ctables()
            .update(t.clone(), OperationScope::Global)
            .await?;
        self.accounts.grant_add(acct, -1)?;
        Ok(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{Db, DbDirectory, Precision, VgroupDirectory};
    use crate::model::{ColumnType, TableId};

    async fn seed_super(registry: &Registry) -> SuperTable {
        let s = SuperTable::new(
            TableId::new("a.db1.weather").unwrap(),
            1,
            1,
            vec![SchemaColumn::new(0, "ts", ColumnType::Timestamp, 8)],
            vec![SchemaColumn::new(1, "loc", ColumnType::Binary, 16)],
        );
        registry
            .stables()
            .insert(s.clone(), OperationScope::Global)
            .await
            .unwrap();
        s
    }

    fn setup() -> (std::sync::Arc<Registry>, std::sync::Arc<AccountDirectory>) {
        let db_dir = DbDirectory::for_test();
        db_dir.insert(Db::new("a.db1", "a", Precision::Milliseconds));
        let vgroup_dir = VgroupDirectory::for_test();
        let accounts = AccountDirectory::for_test();
        accounts.insert_unlimited("a");
        (Registry::new(db_dir, vgroup_dir), accounts)
    }

    #[tokio::test]
    async fn add_tag_bumps_schema_version_and_allocates_col_id() {
        let (registry, accounts) = setup();
        let s = seed_super(&registry).await;
        let prev_next = s.next_col_id;
        let engine = SchemaEngine::new(&registry, &accounts, SchemaLimits::default());
        let updated = engine
            .add_tags("a", s, vec![("alt".to_string(), ColumnType::Int, 4)])
            .await
            .unwrap();
        assert_eq!(updated.num_tags, 2);
        assert_eq!(updated.schema_version, 1);
        assert_eq!(updated.tags()[1].col_id, prev_next);
        assert_eq!(accounts.num_of_time_series("a"), 0);
    }

    #[tokio::test]
    async fn add_tag_with_children_bumps_account_counter() {
        let db_dir = DbDirectory::for_test();
        db_dir.insert(Db::new("a.db1", "a", Precision::Milliseconds));
        let vgroup_dir = VgroupDirectory::for_test();
        let vg_id = vgroup_dir.create_vgroup("a.db1", 4, vec![]);
        let registry = Registry::new(db_dir, vgroup_dir);
        let accounts = AccountDirectory::for_test();
        accounts.insert_unlimited("a");

        let s = SuperTable::new(
            TableId::new("a.db1.weather").unwrap(),
            1,
            1,
            vec![SchemaColumn::new(0, "ts", ColumnType::Timestamp, 8)],
            vec![SchemaColumn::new(1, "loc", ColumnType::Binary, 16)],
        );
        registry
            .stables()
            .insert(s.clone(), OperationScope::Global)
            .await
            .unwrap();
        let child = ChildTable::new_child(
            TableId::new("a.db1.paris").unwrap(),
            2,
            1,
            vg_id,
            0,
            s.table_id().clone(),
        );
        registry
            .ctables()
            .insert(child, OperationScope::Global)
            .await
            .unwrap();
        let s = registry.get_super("a.db1.weather").await.unwrap();
        assert_eq!(s.child_count, 1);

        let engine = SchemaEngine::new(&registry, &accounts, SchemaLimits::default());
        engine
            .add_tags("a", s, vec![("alt".to_string(), ColumnType::Int, 4)])
            .await
            .unwrap();
        assert_eq!(accounts.num_of_time_series("a"), 1);
    }

    #[tokio::test]
    async fn drop_tag_index_zero_is_rejected() {
        let (registry, accounts) = setup();
        let s = seed_super(&registry).await;
        let engine = SchemaEngine::new(&registry, &accounts, SchemaLimits::default());
        let err = engine.drop_tag(s, 0).await.unwrap_err();
        assert!(matches!(err, MnodeError::AppError(_)));
    }

    #[tokio::test]
    async fn add_tag_at_limit_is_rejected() {
        let (registry, accounts) = setup();
        let s = seed_super(&registry).await;
        let limits = SchemaLimits {
            max_tags: 1,
            ..SchemaLimits::default()
        };
        let engine = SchemaEngine::new(&registry, &accounts, limits);
        let err = engine
            .add_tags("a", s, vec![("alt".to_string(), ColumnType::Int, 4)])
            .await
            .unwrap_err();
        assert!(matches!(err, MnodeError::AppError(_)));
    }
}
