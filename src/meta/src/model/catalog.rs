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

use super::{SchemaColumn, TableHeader, TableId, TableKind};

/// Mask applied to the catalog version when folding it into the low 16 bits
/// of a `uid` (spec §3).
const UID_VERSION_MASK: u64 = 0xFFFF;

/// `uid = (created_time_ms << 16) | (catalog_version & 0xFFFF)`, used by
/// `SuperTable` and by `Normal`/`Stream` child-table bodies (spec §3).
pub fn time_based_uid(created_time_ms: i64, catalog_version: u64) -> u64 {
    ((created_time_ms as u64) << 16) | (catalog_version & UID_VERSION_MASK)
}

/// `uid = (vg_id << 40) | (sid << 16) | (catalog_version & 0xFFFF)`, used by
/// `Child` table bodies (spec §3).
pub fn child_uid(vg_id: i32, sid: i32, catalog_version: u64) -> u64 {
    ((vg_id as u64) << 40) | (((sid as u64) & 0xFF_FFFF) << 16) | (catalog_version & UID_VERSION_MASK)
}

/// A schema template shared by many tagged children. Stores no rows itself
/// (spec glossary: "Super table").
#[derive(Debug, Clone)]
pub struct SuperTable {
    pub header: TableHeader,
    pub created_time_ms: i64,
    pub uid: u64,
    pub schema_version: u32,
    /// Number of plain columns; `schema[..num_columns]` are columns,
    /// `schema[num_columns..]` are tags (spec §3).
    pub num_columns: usize,
    pub num_tags: usize,
    /// Monotonic allocator for column/tag ids; never recycled (spec §3
    /// invariant 5).
    pub next_col_id: i32,
    pub schema: Vec<SchemaColumn>,
    pub child_count: u32,
}

impl SuperTable {
    pub fn new(
        table_id: TableId,
        created_time_ms: i64,
        catalog_version: u64,
        columns: Vec<SchemaColumn>,
        tags: Vec<SchemaColumn>,
    ) -> Self {
        let num_columns = columns.len();
        let num_tags = tags.len();
        let mut schema = columns;
        schema.extend(tags);
        let mut next_col_id = 0;
        for c in &mut schema {
            c.col_id = next_col_id;
            next_col_id += 1;
        }
        Self {
            header: TableHeader::new(table_id, TableKind::Super),
            created_time_ms,
            uid: time_based_uid(created_time_ms, catalog_version),
            schema_version: 0,
            num_columns,
            num_tags,
            next_col_id,
            schema,
            child_count: 0,
        }
    }

    pub fn table_id(&self) -> &TableId {
        &self.header.table_id
    }

    pub fn columns(&self) -> &[SchemaColumn] {
        &self.schema[..self.num_columns]
    }

    pub fn tags(&self) -> &[SchemaColumn] {
        &self.schema[self.num_columns..]
    }

    /// Case-insensitive lookup across the whole schema (columns and tags
    /// share one namespace, spec §3 invariant 6).
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.schema
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Index of a tag within `schema` (i.e. `num_columns + local_tag_index`).
    pub fn find_tag(&self, name: &str) -> Option<usize> {
        self.tags()
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .map(|i| self.num_columns + i)
    }

    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns()
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn alloc_col_id(&mut self) -> i32 {
        let id = self.next_col_id;
        self.next_col_id += 1;
        id
    }
}

/// The kind-specific payload of a child-table-store row: a child table
/// resolves its schema through its super table (weak reference, spec §9),
/// while normal/stream tables own their schema outright.
#[derive(Debug, Clone)]
pub enum ChildBody {
    Child {
        super_table_id: TableId,
    },
    Normal {
        schema_version: u32,
        num_columns: usize,
        next_col_id: i32,
        schema: Vec<SchemaColumn>,
    },
    Stream {
        schema_version: u32,
        num_columns: usize,
        next_col_id: i32,
        schema: Vec<SchemaColumn>,
        /// Logical SQL text, NUL-stripped (see SPEC_FULL.md §11.7).
        sql: String,
    },
}

/// Child, normal or stream table: a physical container for rows living in a
/// vgroup (spec glossary).
#[derive(Debug, Clone)]
pub struct ChildTable {
    pub header: TableHeader,
    pub created_time_ms: i64,
    pub uid: u64,
    pub vg_id: i32,
    pub sid: i32,
    pub body: ChildBody,
}

impl ChildTable {
    pub fn new_child(
        table_id: TableId,
        created_time_ms: i64,
        catalog_version: u64,
        vg_id: i32,
        sid: i32,
        super_table_id: TableId,
    ) -> Self {
        Self {
            header: TableHeader::new(table_id, TableKind::Child),
            created_time_ms,
            uid: child_uid(vg_id, sid, catalog_version),
            vg_id,
            sid,
            body: ChildBody::Child { super_table_id },
        }
    }

    /// Builds a normal table, or a stream table when `sql` is non-empty
    /// (spec §4.5 step 4: "Stream if `sql_len > 0`").
    pub fn new_standalone(
        table_id: TableId,
        created_time_ms: i64,
        catalog_version: u64,
        vg_id: i32,
        sid: i32,
        mut schema: Vec<SchemaColumn>,
        sql: Option<String>,
    ) -> Self {
        let num_columns = schema.len();
        let mut next_col_id = 0;
        for c in &mut schema {
            c.col_id = next_col_id;
            next_col_id += 1;
        }
        let kind = if sql.is_some() {
            TableKind::Stream
        } else {
            TableKind::Normal
        };
        let body = match sql {
            Some(sql) => ChildBody::Stream {
                schema_version: 0,
                num_columns,
                next_col_id,
                schema,
                sql,
            },
            None => ChildBody::Normal {
                schema_version: 0,
                num_columns,
                next_col_id,
                schema,
            },
        };
        Self {
            header: TableHeader::new(table_id, kind),
            created_time_ms,
            uid: time_based_uid(created_time_ms, catalog_version),
            vg_id,
            sid,
            body,
        }
    }

    pub fn table_id(&self) -> &TableId {
        &self.header.table_id
    }

    pub fn kind(&self) -> TableKind {
        self.header.kind
    }

    pub fn super_table_id(&self) -> Option<&TableId> {
        match &self.body {
            ChildBody::Child { super_table_id } => Some(super_table_id),
            _ => None,
        }
    }

    pub fn own_schema(&self) -> Option<&[SchemaColumn]> {
        match &self.body {
            ChildBody::Child { .. } => None,
            ChildBody::Normal { schema, .. } => Some(schema),
            ChildBody::Stream { schema, .. } => Some(schema),
        }
    }

    pub fn own_num_columns(&self) -> Option<usize> {
        match &self.body {
            ChildBody::Child { .. } => None,
            ChildBody::Normal { num_columns, .. } => Some(*num_columns),
            ChildBody::Stream { num_columns, .. } => Some(*num_columns),
        }
    }

    pub fn schema_version(&self) -> Option<u32> {
        match &self.body {
            ChildBody::Child { .. } => None,
            ChildBody::Normal { schema_version, .. } => Some(*schema_version),
            ChildBody::Stream { schema_version, .. } => Some(*schema_version),
        }
    }

    pub fn sql(&self) -> Option<&str> {
        match &self.body {
            ChildBody::Stream { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// Encoded length of the SQL text, terminating NUL included (spec §3:
    /// "terminating NUL included in `sql_len`").
    pub fn sql_len(&self) -> Option<usize> {
        self.sql().map(|s| s.len() + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnType;

    fn col(id: i32, name: &str) -> SchemaColumn {
        SchemaColumn::new(id, name, ColumnType::Int, 4)
    }

    #[test]
    fn super_table_renumbers_columns_then_tags() {
        // Caller-supplied ids are ignored; `new` assigns 0..N itself
        // (spec §4.5 step 2), columns before tags.
        let s = SuperTable::new(
            TableId::new("a.db1.weather").unwrap(),
            1000,
            1,
            vec![col(9, "ts"), col(9, "t")],
            vec![col(9, "loc")],
        );
        assert_eq!(s.num_columns, 2);
        assert_eq!(s.num_tags, 1);
        assert_eq!(s.next_col_id, 3);
        assert_eq!(s.schema[0].col_id, 0);
        assert_eq!(s.schema[1].col_id, 1);
        assert_eq!(s.schema[2].col_id, 2);
        assert_eq!(s.find_tag("loc"), Some(2));
        assert_eq!(s.find_tag("LOC"), Some(2));
        assert_eq!(s.find_column("ts"), Some(0));
    }

    #[test]
    fn child_uid_encodes_vgroup_and_slot() {
        let uid = child_uid(7, 3, 0xABCD);
        assert_eq!(uid >> 40, 7);
        assert_eq!((uid >> 16) & 0xFF_FFFF, 3);
        assert_eq!(uid & 0xFFFF, 0xABCD);
    }

    #[test]
    fn stream_sql_len_includes_nul() {
        let t = ChildTable::new_standalone(
            TableId::new("a.db1.cq1").unwrap(),
            5,
            1,
            1,
            0,
            vec![col(0, "ts"), col(1, "v")],
            Some("select * from t".to_string()),
        );
        assert_eq!(t.kind(), TableKind::Stream);
        assert_eq!(t.sql(), Some("select * from t"));
        assert_eq!(t.sql_len(), Some("select * from t".len() + 1));
    }
}
