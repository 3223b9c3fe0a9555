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

//! Meta Assembly (C6): produces `TableMeta`/`MultiTableMeta` responses
//! clients use to locate data (spec §4.6). Reads only; every field it fills
//! in is resolved through the [`Registry`] and the `db`/`vgroup` directories,
//! never mutates catalog state.

use byteorder::{BigEndian, WriteBytesExt};
use mnode_common::config::SchemaLimits;
use mnode_common::{MnodeError, MnodeResult};

use crate::manager::{DbDirectory, Precision, VgroupDirectory, VnodePeer};
use crate::model::{SchemaColumn, TableId, TableKind};
use crate::registry::{Entity, Registry};

/// The client's view of which vnode address to hand back for a peer: public
/// or private, selected by comparing the connection's server ip against the
/// configured public ip (spec §4.6). Both sides of the comparison are out of
/// scope for this crate (RPC transport, §1) so callers supply them directly
/// rather than this module reaching into a transport handle.
#[derive(Debug, Clone, Copy)]
pub struct ConnInfo {
    pub server_ip: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct NetworkConfig {
    pub public_ip: u32,
}

/// A resolved vnode peer as it goes on the wire: `(ip, vnode_index)`
/// (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerDescriptor {
    pub ip: u32,
    pub vnode_index: i32,
}

/// Picks public vs. private per spec §4.6: a client that reached this node
/// through its configured public address keeps seeing public vnode
/// addresses; anything else (an internal client) gets the private address.
fn select_ip(peer: &VnodePeer, conn: ConnInfo, net: NetworkConfig) -> u32 {
    if conn.server_ip == net.public_ip {
        peer.public_ip
    } else {
        peer.private_ip
    }
}

/// `TableMeta` response fields (spec §4.6).
#[derive(Debug, Clone)]
pub struct TableMeta {
    pub table_id: TableId,
    pub uid: u64,
    pub sid: i32,
    pub vg_id: i32,
    pub precision: Precision,
    pub kind: TableKind,
    pub schema_version: u32,
    pub num_columns: usize,
    /// Always 0 for a Child: tags live at the data node, not inlined here
    /// (spec §4.6 "For a Child the super's schema is inlined with
    /// `num_tags=0`").
    pub num_tags: usize,
    pub schema: Vec<SchemaColumn>,
    pub stable_id: Option<TableId>,
    pub peers: Vec<PeerDescriptor>,
}

/// Builds the `TableMeta` for a resolved table id (spec §4.6). The caller is
/// expected to have already run the `TableMeta`-on-missing-table decision
/// (SPEC_FULL §11.5: on-demand child creation or `INVALID_TABLE`) before
/// calling this; it operates purely on an existing entity.
pub async fn assemble_table_meta(
    registry: &Registry,
    db_dir: &DbDirectory,
    vgroup_dir: &VgroupDirectory,
    limits: &SchemaLimits,
    conn: ConnInfo,
    net: NetworkConfig,
    table_id: &str,
) -> MnodeResult<TableMeta> {
    let entity = registry
        .get_table(table_id)
        .await
        .ok_or_else(|| MnodeError::InvalidTable(table_id.to_string()))?;

    match entity {
        Entity::Super(s) => {
            let db = db_dir
                .get_db_by_table_id(s.table_id())
                .ok_or_else(|| MnodeError::InvalidDb(s.table_id().db_name().to_string()))?;
            // A super table has no vgroup of its own; it is not a physical
            // container (spec glossary). Schema carries columns and tags
            // both, unlike the Child inlining rule below.
            Ok(TableMeta {
                table_id: s.table_id().clone(),
                uid: s.uid,
                sid: 0,
                vg_id: 0,
                precision: db.precision,
                kind: TableKind::Super,
                schema_version: s.schema_version,
                num_columns: s.num_columns,
                num_tags: s.num_tags,
                schema: s.schema.clone(),
                stable_id: None,
                peers: Vec::new(),
            })
        }
        Entity::Child(t) => {
            let db = db_dir
                .get_db_by_table_id(t.table_id())
                .ok_or_else(|| MnodeError::InvalidDb(t.table_id().db_name().to_string()))?;
            let all_peers = vgroup_dir.get_ip_set_from_vgroup(t.vg_id)?;
            let peers = all_peers
                .iter()
                .take(limits.max_vnodes_per_vgroup)
                .map(|p| PeerDescriptor {
                    ip: select_ip(p, conn, net),
                    vnode_index: p.vnode_index,
                })
                .collect();

            match t.super_table_id() {
                Some(super_id) => {
                    let super_table = registry
                        .get_super(super_id.as_str())
                        .await
                        .ok_or_else(|| MnodeError::InvalidTable(super_id.to_string()))?;
                    Ok(TableMeta {
                        table_id: t.table_id().clone(),
                        uid: t.uid,
                        sid: t.sid,
                        vg_id: t.vg_id,
                        precision: db.precision,
                        kind: TableKind::Child,
                        schema_version: super_table.schema_version,
                        num_columns: super_table.num_columns,
                        num_tags: 0,
                        schema: super_table.columns().to_vec(),
                        stable_id: Some(super_id.clone()),
                        peers,
                    })
                }
                None => Ok(TableMeta {
                    table_id: t.table_id().clone(),
                    uid: t.uid,
                    sid: t.sid,
                    vg_id: t.vg_id,
                    precision: db.precision,
                    kind: t.kind(),
                    schema_version: t.schema_version().unwrap_or_default(),
                    num_columns: t.own_num_columns().unwrap_or_default(),
                    num_tags: 0,
                    schema: t.own_schema().unwrap_or_default().to_vec(),
                    stable_id: None,
                    peers,
                }),
            }
        }
    }
}

fn column_type_tag(ty: crate::model::ColumnType) -> u8 {
    use crate::model::ColumnType::*;
    match ty {
        Timestamp => 0,
        Bool => 1,
        TinyInt => 2,
        SmallInt => 3,
        Int => 4,
        BigInt => 5,
        Float => 6,
        Double => 7,
        Binary => 8,
        Nchar => 9,
    }
}

/// Serializes one schema entry: `col_id` and `bytes` in network byte order,
/// `name` copied verbatim and padded to `max_name_len` (spec §4.6 "Schema
/// serialization").
fn encode_schema_entry(buf: &mut Vec<u8>, c: &SchemaColumn, max_name_len: usize) {
    buf.push(column_type_tag(c.ty));
    buf.write_i32::<BigEndian>(c.bytes).unwrap();
    buf.write_i32::<BigEndian>(c.col_id).unwrap();
    let name_bytes = c.name.as_bytes();
    let n = name_bytes.len().min(max_name_len);
    buf.extend_from_slice(&name_bytes[..n]);
    buf.resize(buf.len() + (max_name_len - n), 0);
}

/// Encodes a full `TableMeta` block onto `buf`: the fixed fields then
/// `schema[]` then the peer list (spec §4.6). This is the unit
/// [`assemble_multi_table_meta`] repeats per table.
pub fn encode_table_meta(buf: &mut Vec<u8>, meta: &TableMeta, max_name_len: usize) {
    buf.write_u64::<BigEndian>(meta.uid).unwrap();
    buf.write_i32::<BigEndian>(meta.sid).unwrap();
    buf.write_i32::<BigEndian>(meta.vg_id).unwrap();
    buf.write_u32::<BigEndian>(meta.schema_version).unwrap();
    buf.write_u32::<BigEndian>(meta.num_columns as u32).unwrap();
    buf.write_u32::<BigEndian>(meta.num_tags as u32).unwrap();
    for c in &meta.schema {
        encode_schema_entry(buf, c, max_name_len);
    }
    buf.write_u32::<BigEndian>(meta.peers.len() as u32).unwrap();
    for p in &meta.peers {
        buf.write_u32::<BigEndian>(p.ip).unwrap();
        buf.write_i32::<BigEndian>(p.vnode_index).unwrap();
    }
}

/// `MultiTableMeta`: concatenates per-table `TableMeta` blocks into one
/// buffer, starting at `limits.multi_table_meta_initial_capacity_bytes` and
/// growing (never truncating) when a block would not fit, so every
/// resolvable table appears (spec §4.6, §9 Open Question (c)).
pub async fn assemble_multi_table_meta(
    registry: &Registry,
    db_dir: &DbDirectory,
    vgroup_dir: &VgroupDirectory,
    limits: &SchemaLimits,
    conn: ConnInfo,
    net: NetworkConfig,
    table_ids: &[String],
) -> (Vec<u8>, usize, Vec<String>) {
    let mut buf = Vec::with_capacity(limits.multi_table_meta_initial_capacity_bytes);
    let mut resolved = 0usize;
    let mut unresolved = Vec::new();
    for id in table_ids {
        match assemble_table_meta(registry, db_dir, vgroup_dir, limits, conn, net, id).await {
            Ok(meta) => {
                // `Vec::extend`'s growth already doubles capacity on
                // overflow; we never pre-check remaining space and never
                // skip, which is exactly the "growth over silent skip"
                // mandate (spec §9 Open Question (c)).
                let before = buf.len();
                encode_table_meta(&mut buf, &meta, limits.max_name_len);
                debug_assert!(buf.len() > before);
                resolved += 1;
            }
            Err(_) => unresolved.push(id.clone()),
        }
    }
    (buf, resolved, unresolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnType, SuperTable};
    use crate::store::{CatalogStore, OperationScope};

    fn net() -> (ConnInfo, NetworkConfig) {
        (ConnInfo { server_ip: 1 }, NetworkConfig { public_ip: 1 })
    }

    async fn seed(registry: &Registry, vgroup_dir: &VgroupDirectory) -> (TableId, i32) {
        let super_table = SuperTable::new(
            TableId::new("a.db1.weather").unwrap(),
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
        let vg_id = vgroup_dir.create_vgroup(
            "a.db1",
            4,
            vec![VnodePeer {
                vnode_index: 0,
                public_ip: 1,
                private_ip: 2,
            }],
        );
        let child = crate::model::ChildTable::new_child(
            TableId::new("a.db1.paris").unwrap(),
            2,
            1,
            vg_id,
            0,
            TableId::new("a.db1.weather").unwrap(),
        );
        registry
            .ctables()
            .insert(child, OperationScope::Global)
            .await
            .unwrap();
        (TableId::new("a.db1.paris").unwrap(), vg_id)
    }

    #[tokio::test]
    async fn child_table_meta_inlines_super_schema_with_zero_tags() {
        let db_dir = DbDirectory::for_test();
        db_dir.insert(crate::manager::Db::new("a.db1", "a", Precision::Milliseconds));
        let vgroup_dir = VgroupDirectory::for_test();
        let registry = Registry::new(db_dir.clone(), vgroup_dir.clone());
        seed(&registry, &vgroup_dir).await;

        let (conn, net_cfg) = net();
        let limits = SchemaLimits::default();
        let meta = assemble_table_meta(
            &registry,
            &db_dir,
            &vgroup_dir,
            &limits,
            conn,
            net_cfg,
            "a.db1.paris",
        )
        .await
        .unwrap();

        assert_eq!(meta.kind, TableKind::Child);
        assert_eq!(meta.num_tags, 0);
        assert_eq!(meta.num_columns, 2);
        assert_eq!(meta.stable_id.unwrap().as_str(), "a.db1.weather");
        assert_eq!(meta.peers.len(), 1);
        assert_eq!(meta.peers[0].ip, 1);
    }

    #[tokio::test]
    async fn select_ip_picks_private_for_non_public_conn() {
        let db_dir = DbDirectory::for_test();
        db_dir.insert(crate::manager::Db::new("a.db1", "a", Precision::Milliseconds));
        let vgroup_dir = VgroupDirectory::for_test();
        let registry = Registry::new(db_dir.clone(), vgroup_dir.clone());
        seed(&registry, &vgroup_dir).await;

        let limits = SchemaLimits::default();
        let meta = assemble_table_meta(
            &registry,
            &db_dir,
            &vgroup_dir,
            &limits,
            ConnInfo { server_ip: 9 },
            NetworkConfig { public_ip: 1 },
            "a.db1.paris",
        )
        .await
        .unwrap();
        assert_eq!(meta.peers[0].ip, 2);
    }

    #[tokio::test]
    async fn missing_table_is_invalid_table() {
        let registry = Registry::for_test();
        let db_dir = DbDirectory::for_test();
        let vgroup_dir = VgroupDirectory::for_test();
        let limits = SchemaLimits::default();
        let (conn, net_cfg) = net();
        let err = assemble_table_meta(
            &registry,
            &db_dir,
            &vgroup_dir,
            &limits,
            conn,
            net_cfg,
            "a.db1.missing",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MnodeError::InvalidTable(_)));
    }

    #[tokio::test]
    async fn multi_table_meta_grows_buffer_for_many_tables() {
        let db_dir = DbDirectory::for_test();
        db_dir.insert(crate::manager::Db::new("a.db1", "a", Precision::Milliseconds));
        let vgroup_dir = VgroupDirectory::for_test();
        let registry = Registry::new(db_dir.clone(), vgroup_dir.clone());
        seed(&registry, &vgroup_dir).await;

        // A tiny initial capacity forces at least one grow for even a
        // single table (spec §9 Open Question (c): grow, never skip).
        let limits = SchemaLimits {
            multi_table_meta_initial_capacity_bytes: 4,
            ..SchemaLimits::default()
        };
        let (conn, net_cfg) = net();
        let ids = vec!["a.db1.paris".to_string(); 50];
        let (buf, resolved, unresolved) =
            assemble_multi_table_meta(&registry, &db_dir, &vgroup_dir, &limits, conn, net_cfg, &ids)
                .await;
        assert_eq!(resolved, 50);
        assert!(unresolved.is_empty());
        assert!(buf.len() > 4);
    }
}
