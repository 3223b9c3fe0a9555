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

//! Wire message kinds (spec §6). Modeled as plain request/response structs
//! rather than bytes-on-the-wire, since the RPC transport itself is out of
//! scope (spec §1); `MnodeService` (in [`super`]) is the typed surface a
//! real transport layer would deserialize onto.

use mnode_common::ErrorCode;

use crate::meta_assembly::TableMeta;
use crate::model::{ChildTable, SchemaColumn, SuperTable, TableId};
use crate::schema::AlterKind;
use crate::show::{ShowCursor, ShowRow};

/// `CreateTable` (client → mgmt).
#[derive(Debug, Clone)]
pub struct CreateTableMsg {
    pub table_id: TableId,
    pub columns: Vec<SchemaColumn>,
    pub tags: Vec<SchemaColumn>,
    /// The super table a Child create tags into. In the wire protocol this
    /// rides inside the tag payload (the stable name is its first field);
    /// parsing that out is a transport/protocol-layer concern out of scope
    /// here (spec §1), so the dispatcher takes it pre-resolved.
    pub super_table_id: Option<TableId>,
    /// Tag values for a Child create (opaque to this core past validation;
    /// forwarded to the data node as `tag_payload`).
    pub tag_payload: Vec<u8>,
    pub sql: Option<String>,
    pub ig_exists: bool,
}

/// `DropTable` (client → mgmt).
#[derive(Debug, Clone)]
pub struct DropTableMsg {
    pub table_id: TableId,
    pub ig_not_exists: bool,
}

/// `AlterTable` (client → mgmt). At most one schema entry per request
/// (SPEC_FULL §11.3).
#[derive(Debug, Clone)]
pub struct AlterTableMsg {
    pub table_id: TableId,
    pub alter: AlterKind,
    pub schema_entry: Option<(String, crate::model::ColumnType, i32)>,
    pub tag_index: Option<usize>,
    pub column_index: Option<usize>,
    pub tag_value: Option<Vec<u8>>,
    pub has_write_authority: bool,
}

/// `TableInfo` (client → mgmt): single-table meta fetch.
#[derive(Debug, Clone)]
pub struct TableInfoMsg {
    pub table_id: TableId,
    pub create_flag: bool,
    /// Super table the synthesized create should tag into, pre-resolved
    /// from the tag payload the same way `CreateTableMsg::super_table_id`
    /// is (spec §4.5 "On-demand child creation").
    pub super_table_id: Option<TableId>,
    /// Tag payload to use if this fetch synthesizes a create (spec §4.5
    /// "On-demand child creation").
    pub tags: Vec<u8>,
}

/// `MultiTableInfo` (client → mgmt): batch meta fetch.
#[derive(Debug, Clone)]
pub struct MultiTableInfoMsg {
    pub table_ids: Vec<TableId>,
}

/// `STableVgroup` (client → mgmt): vgroup list of a super table's children.
#[derive(Debug, Clone)]
pub struct STableVgroupMsg {
    pub table_id: TableId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowTarget {
    Stable,
    Table,
}

/// `ShowMeta` (client → mgmt): opens a paginated scan.
#[derive(Debug, Clone)]
pub struct ShowMetaMsg {
    pub target: ShowTarget,
    pub db_name: String,
    pub pattern: Option<String>,
}

/// `ShowRetrieve` (client → mgmt): fetches the next page of an open scan.
/// The session carrying `cursor` between calls is the transport's job
/// (out of scope, spec §1); this core only defines what the cursor is and
/// how it advances (spec §4.7).
#[derive(Debug, Clone)]
pub struct ShowRetrieveMsg {
    pub target: ShowTarget,
    pub db_name: String,
    pub pattern: Option<String>,
    pub page_size: usize,
    pub cursor: ShowCursor,
}

#[derive(Debug, Clone)]
pub struct ShowMetaReply {
    pub cursor: ShowCursor,
}

#[derive(Debug, Clone)]
pub struct ShowRetrieveReply {
    pub rows: Vec<ShowRow>,
    pub cursor: ShowCursor,
}

/// One terminal response per client request (spec §7 "Propagation policy").
#[derive(Debug, Clone)]
pub struct Ack {
    pub code: ErrorCode,
}

impl Ack {
    pub fn success() -> Self {
        Self {
            code: ErrorCode::Success,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateTableReply {
    pub ack: Ack,
    pub created: Option<CreatedTable>,
}

#[derive(Debug, Clone)]
pub enum CreatedTable {
    Super(SuperTable),
    Child(ChildTable),
}

/// `SuperTableVgroup` reply: the vgroup ids hosting at least one of the
/// super table's children (spec §4.8 wire kind `SuperTableVgroup`).
#[derive(Debug, Clone)]
pub struct STableVgroupReply {
    pub vg_ids: Vec<i32>,
}

#[derive(Debug, Clone)]
pub struct MultiTableMetaReply {
    pub buf: Vec<u8>,
    pub num_resolved: usize,
    pub unresolved: Vec<String>,
}

/// Peer (data-node) response kinds (spec §6): `CreateTableRsp`,
/// `DropTableRsp`, `AlterTableRsp`, `DropStableRsp` all carry just a result
/// code back to mgmt; `TableConfig` carries the data node's view of a
/// table's config. This core only needs the ack shape since the downstream
/// call site already awaits `DataNodeClient::{create_table,drop_table}`
/// directly (spec §5 "Suspension points").
#[derive(Debug, Clone)]
pub struct TableConfigMsg {
    pub table_id: TableId,
    pub vg_id: i32,
    pub sid: i32,
}

pub use crate::meta_assembly::TableMeta as TableMetaReply;

/// What a `TableInfo` fetch on a missing table with `create_flag=1`
/// resolves to once the synthesized create round-trips: either the caller
/// gets a ready meta immediately (table already existed) or the request was
/// handed to the shell queue and the original caller sees nothing further
/// from this call (spec §4.5 "On-demand child creation"; the meta-fetch
/// response routes back out-of-band once the synthesized create completes).
#[derive(Debug, Clone)]
pub enum TableInfoOutcome {
    Meta(TableMeta),
    Deferred,
}
