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

//! Entity model (C2): typed representations of super/child/normal/stream
//! tables sharing a common header, and the column/tag schema they carry.

mod catalog;
mod schema;

pub use catalog::{ChildBody, ChildTable, SuperTable};
pub use schema::{ColumnType, SchemaColumn};

use mnode_common::{MnodeError, MnodeResult};

/// Max length of a dotted `acct.db.name` table id (spec §3).
pub const MAX_TABLE_ID_LEN: usize = 192;

/// The four table kinds this catalog knows about (spec §1, non-goals: no
/// dynamic addition of kinds beyond these four).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Super,
    Child,
    Normal,
    Stream,
}

impl TableKind {
    pub fn is_super(self) -> bool {
        matches!(self, TableKind::Super)
    }
}

/// A dotted `acct.db.name` identifier. Validated once at construction time;
/// every other component treats it as an opaque, already-valid key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(String);

impl TableId {
    pub fn new(id: impl Into<String>) -> MnodeResult<Self> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_TABLE_ID_LEN {
            return Err(MnodeError::InvalidTable(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `acct.db` prefix of this id, i.e. everything up to and including
    /// the second `.`-delimited segment's owner. Used to resolve the owning
    /// database (spec §6: `get_db_by_table_id`).
    pub fn db_name(&self) -> &str {
        match self.0.match_indices('.').nth(1) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Common prefix shared by every table kind (spec §3 "TableHeader").
#[derive(Debug, Clone)]
pub struct TableHeader {
    pub table_id: TableId,
    pub kind: TableKind,
    pub ref_count: u32,
}

impl TableHeader {
    pub fn new(table_id: TableId, kind: TableKind) -> Self {
        Self {
            table_id,
            kind,
            ref_count: 0,
        }
    }

    pub fn inc_ref(&mut self) {
        self.ref_count += 1;
    }

    pub fn dec_ref(&mut self) {
        self.ref_count = self.ref_count.saturating_sub(1);
    }
}
