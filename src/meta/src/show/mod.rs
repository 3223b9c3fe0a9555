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

//! Show/Retrieve Iterators (C7): paginated catalog scans behind
//! `SHOW STABLES`/`SHOW TABLES`, with an optional glob-like pattern filter
//! on the display name (spec §4.7). Read-path consumer of the
//! [`crate::registry::Registry`]; never mutates catalog state.

use crate::model::{ChildTable, SuperTable, TableKind};
use crate::registry::Registry;
use crate::store::CatalogStore;

/// What a single `SHOW` row carries (spec §4.7 "Columns emitted").
#[derive(Debug, Clone, PartialEq)]
pub struct ShowRow {
    pub name: String,
    pub created_time_ms: i64,
    pub num_columns: usize,
    /// `Some` only for `SHOW STABLES` rows.
    pub num_tags: Option<usize>,
    /// `Some` only for `SHOW STABLES` rows.
    pub child_count: Option<u32>,
    /// `Some` only for `SHOW TABLES` rows on a Child (the super it belongs
    /// to); `None` for Normal/Stream/Super rows.
    pub stable_name: Option<String>,
}

/// Resumable position across paginated `SHOW` calls: the last table id
/// yielded, so the next call's scan picks up immediately after it in
/// persistence order (spec §4.7 "remembers the last yielded store cursor").
#[derive(Debug, Clone, Default)]
pub struct ShowCursor {
    last_key: Option<String>,
}

impl ShowCursor {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Case-insensitive SQL-`LIKE`-style glob: `%` matches any run of
/// characters, `_` matches exactly one (spec §4.7 "glob-like pattern").
/// Returns exactly one of {match, nomatch}, never an error (spec §4.7).
pub fn pattern_match(pattern: &str, name: &str) -> bool {
    fn rec(p: &[u8], n: &[u8]) -> bool {
        match p.first() {
            None => n.is_empty(),
            Some(b'%') => rec(&p[1..], n) || (!n.is_empty() && rec(p, &n[1..])),
            Some(b'_') => !n.is_empty() && rec(&p[1..], &n[1..]),
            Some(&c) => {
                !n.is_empty() && n[0].to_ascii_lowercase() == c.to_ascii_lowercase() && rec(&p[1..], &n[1..])
            }
        }
    }
    rec(pattern.as_bytes(), name.as_bytes())
}

/// Scan state for one `SHOW STABLES` or `SHOW TABLES` call (spec §4.7).
pub struct ShowIterator<'a> {
    registry: &'a Registry,
    db_name: String,
    pattern: Option<String>,
}

impl<'a> ShowIterator<'a> {
    pub fn new(registry: &'a Registry, db_name: impl Into<String>, pattern: Option<String>) -> Self {
        Self {
            registry,
            db_name: db_name.into(),
            pattern,
        }
    }

    fn matches(&self, table_id: &str) -> bool {
        let prefix = format!("{}.", self.db_name);
        if !table_id.starts_with(&prefix) {
            return false;
        }
        match &self.pattern {
            Some(p) => pattern_match(p, Registry::extract_display_name(table_id)),
            None => true,
        }
    }

    /// `SHOW STABLES` page: filters `stables` by db-name prefix and pattern,
    /// resuming after `cursor.last_key` (spec §4.7).
    pub fn next_stables_page(&self, cursor: &mut ShowCursor, page_size: usize) -> Vec<ShowRow> {
        let snapshot: Vec<SuperTable> = self.registry.stables().snapshot();
        let mut rows = Vec::with_capacity(page_size.min(snapshot.len()));
        let mut skipping = cursor.last_key.is_some();
        for s in &snapshot {
            let key = s.table_id().as_str();
            if skipping {
                if cursor.last_key.as_deref() == Some(key) {
                    skipping = false;
                }
                continue;
            }
            if !self.matches(key) {
                continue;
            }
            rows.push(ShowRow {
                name: Registry::extract_display_name(key).to_string(),
                created_time_ms: s.created_time_ms,
                num_columns: s.num_columns,
                num_tags: Some(s.num_tags),
                child_count: Some(s.child_count),
                stable_name: None,
            });
            cursor.last_key = Some(key.to_string());
            if rows.len() >= page_size {
                break;
            }
        }
        rows
    }

    /// `SHOW TABLES` page: filters `ctables` (child/normal/stream share this
    /// store) the same way (spec §4.7).
    pub fn next_tables_page(&self, cursor: &mut ShowCursor, page_size: usize) -> Vec<ShowRow> {
        let snapshot: Vec<ChildTable> = self.registry.ctables().snapshot();
        let mut rows = Vec::with_capacity(page_size.min(snapshot.len()));
        let mut skipping = cursor.last_key.is_some();
        for t in &snapshot {
            let key = t.table_id().as_str();
            if skipping {
                if cursor.last_key.as_deref() == Some(key) {
                    skipping = false;
                }
                continue;
            }
            if !self.matches(key) {
                continue;
            }
            let (num_columns, stable_name) = match t.kind() {
                TableKind::Child => {
                    let super_id = t.super_table_id().expect("child always has a super id");
                    // Best-effort: a dangling super reference would only
                    // occur between replay and orphan cleanup; fall back to
                    // zero columns rather than panicking on a read path.
                    let num_columns = resolve_super_num_columns(self.registry, super_id.as_str());
                    (num_columns, Some(Registry::extract_display_name(super_id.as_str()).to_string()))
                }
                _ => (t.own_num_columns().unwrap_or_default(), None),
            };
            rows.push(ShowRow {
                name: Registry::extract_display_name(key).to_string(),
                created_time_ms: t.created_time_ms,
                num_columns,
                num_tags: None,
                child_count: None,
                stable_name,
            });
            cursor.last_key = Some(key.to_string());
            if rows.len() >= page_size {
                break;
            }
        }
        rows
    }
}

/// Synchronous helper bridging the async registry lookup used only by the
/// (sync) row-building loop above; `stables().get_sync` is the store's
/// non-async read used by hooks (spec §4.1), reused here for the same
/// reason: this loop runs outside an `async fn`.
fn resolve_super_num_columns(registry: &Registry, super_id: &str) -> usize {
    registry
        .stables()
        .get_sync(super_id)
        .map(|s| s.num_columns)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{Db, DbDirectory, Precision, VgroupDirectory};
    use crate::model::{ColumnType, SchemaColumn, TableId};
    use crate::store::OperationScope;

    async fn seeded_registry() -> std::sync::Arc<Registry> {
        let db_dir = DbDirectory::for_test();
        db_dir.insert(Db::new("a.db1", "a", Precision::Milliseconds));
        let vgroup_dir = VgroupDirectory::for_test();
        let vg_id = vgroup_dir.create_vgroup("a.db1", 4, vec![]);
        let registry = Registry::new(db_dir, vgroup_dir);

        for name in ["weather", "traffic"] {
            let s = SuperTable::new(
                TableId::new(format!("a.db1.{name}")).unwrap(),
                1,
                1,
                vec![SchemaColumn::new(0, "ts", ColumnType::Timestamp, 8)],
                vec![SchemaColumn::new(1, "loc", ColumnType::Binary, 16)],
            );
            registry.stables().insert(s, OperationScope::Global).await.unwrap();
        }
        for name in ["paris", "tokyo", "berlin"] {
            let t = ChildTable::new_child(
                TableId::new(format!("a.db1.{name}")).unwrap(),
                2,
                1,
                vg_id,
                0,
                TableId::new("a.db1.weather").unwrap(),
            );
            registry.ctables().insert(t, OperationScope::Global).await.unwrap();
        }
        registry
    }

    #[test]
    fn pattern_match_supports_percent_and_underscore() {
        assert!(pattern_match("wea%", "weather"));
        assert!(pattern_match("w_ather", "weather"));
        assert!(!pattern_match("wea%", "traffic"));
        assert!(pattern_match("WEA%", "weather"));
    }

    #[tokio::test]
    async fn show_stables_filters_by_db_and_pattern() {
        let registry = seeded_registry().await;
        let iter = ShowIterator::new(&registry, "a.db1", Some("wea%".to_string()));
        let mut cursor = ShowCursor::new();
        let rows = iter.next_stables_page(&mut cursor, 10);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "weather");
        assert_eq!(rows[0].child_count, Some(3));
    }

    #[tokio::test]
    async fn show_tables_paginates_across_calls() {
        let registry = seeded_registry().await;
        let iter = ShowIterator::new(&registry, "a.db1", None);
        let mut cursor = ShowCursor::new();
        let page1 = iter.next_tables_page(&mut cursor, 2);
        assert_eq!(page1.len(), 2);
        let page2 = iter.next_tables_page(&mut cursor, 2);
        assert_eq!(page2.len(), 1);
        let names: std::collections::HashSet<_> = page1
            .iter()
            .chain(page2.iter())
            .map(|r| r.name.clone())
            .collect();
        assert_eq!(names.len(), 3);
        for row in page1.iter().chain(page2.iter()) {
            assert_eq!(row.stable_name.as_deref(), Some("weather"));
        }
    }

    #[tokio::test]
    async fn non_matching_rows_do_not_advance_output_but_skip_cleanly() {
        let registry = seeded_registry().await;
        let iter = ShowIterator::new(&registry, "a.db1", Some("zzz%".to_string()));
        let mut cursor = ShowCursor::new();
        let rows = iter.next_stables_page(&mut cursor, 10);
        assert!(rows.is_empty());
    }
}
