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

//! Column/tag schema entries shared by super, normal and stream tables.

/// Storage type of a column or tag. `bytes` on [`SchemaColumn`] is the
/// on-disk width for variable-length types and otherwise implied by the
/// type itself; both travel together in the wire encoding (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Timestamp,
    Bool,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Binary,
    Nchar,
}

/// One column or tag: `(col_id, name, type, bytes)` per spec §3.
#[derive(Debug, Clone)]
pub struct SchemaColumn {
    pub col_id: i32,
    pub name: String,
    pub ty: ColumnType,
    pub bytes: i32,
}

impl SchemaColumn {
    pub fn new(col_id: i32, name: impl Into<String>, ty: ColumnType, bytes: i32) -> Self {
        Self {
            col_id,
            name: name.into(),
            ty,
            bytes,
        }
    }
}
