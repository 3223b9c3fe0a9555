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

//! Row encoding for the two catalog stores, per the encoding contract in
//! spec §4.1: `[fixed_header_bytes | schema_bytes]` for Super,
//! `[fixed_header_bytes]` for Child, `[fixed_header_bytes | schema | sql]`
//! for Normal/Stream. This is the persistence format the replicated log
//! would carry; it is distinct from the network-byte-order wire encoding
//! Meta Assembly (C6) produces for clients.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use mnode_common::{MnodeError, MnodeResult};

use crate::model::{ChildBody, ChildTable, ColumnType, SchemaColumn, SuperTable, TableHeader, TableId, TableKind};

fn write_str(buf: &mut Vec<u8>, s: &str) {
    buf.write_u16::<BigEndian>(s.len() as u16).unwrap();
    buf.extend_from_slice(s.as_bytes());
}

fn read_str(cur: &mut &[u8]) -> MnodeResult<String> {
    let len = cur.read_u16::<BigEndian>().map_err(decode_err)? as usize;
    if cur.len() < len {
        return Err(MnodeError::Others("truncated catalog row".to_string()));
    }
    let (head, tail) = cur.split_at(len);
    let s = String::from_utf8(head.to_vec())
        .map_err(|e| MnodeError::Others(format!("invalid utf8 in catalog row: {e}")))?;
    *cur = tail;
    Ok(s)
}

fn decode_err(e: std::io::Error) -> MnodeError {
    MnodeError::Others(format!("truncated catalog row: {e}"))
}

fn column_type_tag(ty: ColumnType) -> u8 {
    match ty {
        ColumnType::Timestamp => 0,
        ColumnType::Bool => 1,
        ColumnType::TinyInt => 2,
        ColumnType::SmallInt => 3,
        ColumnType::Int => 4,
        ColumnType::BigInt => 5,
        ColumnType::Float => 6,
        ColumnType::Double => 7,
        ColumnType::Binary => 8,
        ColumnType::Nchar => 9,
    }
}

fn column_type_from_tag(tag: u8) -> MnodeResult<ColumnType> {
    Ok(match tag {
        0 => ColumnType::Timestamp,
        1 => ColumnType::Bool,
        2 => ColumnType::TinyInt,
        3 => ColumnType::SmallInt,
        4 => ColumnType::Int,
        5 => ColumnType::BigInt,
        6 => ColumnType::Float,
        7 => ColumnType::Double,
        8 => ColumnType::Binary,
        9 => ColumnType::Nchar,
        other => return Err(MnodeError::Others(format!("unknown column type tag {other}"))),
    })
}

fn write_schema(buf: &mut Vec<u8>, schema: &[SchemaColumn]) {
    buf.write_u32::<BigEndian>(schema.len() as u32).unwrap();
    for c in schema {
        buf.write_i32::<BigEndian>(c.col_id).unwrap();
        write_str(buf, &c.name);
        buf.write_u8(column_type_tag(c.ty)).unwrap();
        buf.write_i32::<BigEndian>(c.bytes).unwrap();
    }
}

fn read_schema(cur: &mut &[u8]) -> MnodeResult<Vec<SchemaColumn>> {
    let n = cur.read_u32::<BigEndian>().map_err(decode_err)? as usize;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let col_id = cur.read_i32::<BigEndian>().map_err(decode_err)?;
        let name = read_str(cur)?;
        let ty = column_type_from_tag(cur.read_u8().map_err(decode_err)?)?;
        let bytes = cur.read_i32::<BigEndian>().map_err(decode_err)?;
        out.push(SchemaColumn::new(col_id, name, ty, bytes));
    }
    Ok(out)
}

/// `encode` callback for the `stables` descriptor.
pub fn encode_super(s: &SuperTable) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64 + s.schema.len() * 24);
    write_str(&mut buf, s.table_id().as_str());
    buf.write_u32::<BigEndian>(s.header.ref_count).unwrap();
    buf.write_i64::<BigEndian>(s.created_time_ms).unwrap();
    buf.write_u64::<BigEndian>(s.uid).unwrap();
    buf.write_u32::<BigEndian>(s.schema_version).unwrap();
    buf.write_u32::<BigEndian>(s.num_columns as u32).unwrap();
    buf.write_u32::<BigEndian>(s.num_tags as u32).unwrap();
    buf.write_i32::<BigEndian>(s.next_col_id).unwrap();
    buf.write_u32::<BigEndian>(s.child_count).unwrap();
    write_schema(&mut buf, &s.schema);
    buf
}

/// `decode` callback for the `stables` descriptor.
pub fn decode_super(bytes: &[u8]) -> MnodeResult<SuperTable> {
    let mut cur = bytes;
    let table_id = TableId::new(read_str(&mut cur)?)?;
    let ref_count = cur.read_u32::<BigEndian>().map_err(decode_err)?;
    let created_time_ms = cur.read_i64::<BigEndian>().map_err(decode_err)?;
    let uid = cur.read_u64::<BigEndian>().map_err(decode_err)?;
    let schema_version = cur.read_u32::<BigEndian>().map_err(decode_err)?;
    let num_columns = cur.read_u32::<BigEndian>().map_err(decode_err)? as usize;
    let num_tags = cur.read_u32::<BigEndian>().map_err(decode_err)? as usize;
    let next_col_id = cur.read_i32::<BigEndian>().map_err(decode_err)?;
    let child_count = cur.read_u32::<BigEndian>().map_err(decode_err)?;
    let schema = read_schema(&mut cur)?;
    Ok(SuperTable {
        header: TableHeader {
            table_id,
            kind: TableKind::Super,
            ref_count,
        },
        created_time_ms,
        uid,
        schema_version,
        num_columns,
        num_tags,
        next_col_id,
        schema,
        child_count,
    })
}

/// `encode` callback for the `ctables` descriptor. Covers Child, Normal and
/// Stream rows, tagged by `kind` (spec §9 "Heterogeneous rows sharing a
/// store").
pub fn encode_child(t: &ChildTable) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    write_str(&mut buf, t.table_id().as_str());
    buf.write_u8(match t.kind() {
        TableKind::Child => 0,
        TableKind::Normal => 1,
        TableKind::Stream => 2,
        TableKind::Super => unreachable!("stable rows never land in ctables"),
    })
    .unwrap();
    buf.write_u32::<BigEndian>(t.header.ref_count).unwrap();
    buf.write_i64::<BigEndian>(t.created_time_ms).unwrap();
    buf.write_u64::<BigEndian>(t.uid).unwrap();
    buf.write_i32::<BigEndian>(t.vg_id).unwrap();
    buf.write_i32::<BigEndian>(t.sid).unwrap();
    match &t.body {
        ChildBody::Child { super_table_id } => {
            write_str(&mut buf, super_table_id.as_str());
        }
        ChildBody::Normal {
            schema_version,
            num_columns,
            next_col_id,
            schema,
        } => {
            buf.write_u32::<BigEndian>(*schema_version).unwrap();
            buf.write_u32::<BigEndian>(*num_columns as u32).unwrap();
            buf.write_i32::<BigEndian>(*next_col_id).unwrap();
            write_schema(&mut buf, schema);
        }
        ChildBody::Stream {
            schema_version,
            num_columns,
            next_col_id,
            schema,
            sql,
        } => {
            buf.write_u32::<BigEndian>(*schema_version).unwrap();
            buf.write_u32::<BigEndian>(*num_columns as u32).unwrap();
            buf.write_i32::<BigEndian>(*next_col_id).unwrap();
            write_schema(&mut buf, schema);
            // sql_len includes the terminating NUL (spec §3); the stored
            // bytes carry it, the logical `sql` field does not (SPEC_FULL
            // §11.7).
            buf.write_u32::<BigEndian>((sql.len() + 1) as u32).unwrap();
            buf.extend_from_slice(sql.as_bytes());
            buf.push(0);
        }
    }
    buf
}

/// `decode` callback for the `ctables` descriptor.
pub fn decode_child(bytes: &[u8]) -> MnodeResult<ChildTable> {
    let mut cur = bytes;
    let table_id = TableId::new(read_str(&mut cur)?)?;
    let kind_tag = cur.read_u8().map_err(decode_err)?;
    let ref_count = cur.read_u32::<BigEndian>().map_err(decode_err)?;
    let created_time_ms = cur.read_i64::<BigEndian>().map_err(decode_err)?;
    let uid = cur.read_u64::<BigEndian>().map_err(decode_err)?;
    let vg_id = cur.read_i32::<BigEndian>().map_err(decode_err)?;
    let sid = cur.read_i32::<BigEndian>().map_err(decode_err)?;
    let (kind, body) = match kind_tag {
        0 => {
            let super_table_id = TableId::new(read_str(&mut cur)?)?;
            (TableKind::Child, ChildBody::Child { super_table_id })
        }
        1 => {
            let schema_version = cur.read_u32::<BigEndian>().map_err(decode_err)?;
            let num_columns = cur.read_u32::<BigEndian>().map_err(decode_err)? as usize;
            let next_col_id = cur.read_i32::<BigEndian>().map_err(decode_err)?;
            let schema = read_schema(&mut cur)?;
            (
                TableKind::Normal,
                ChildBody::Normal {
                    schema_version,
                    num_columns,
                    next_col_id,
                    schema,
                },
            )
        }
        2 => {
            let schema_version = cur.read_u32::<BigEndian>().map_err(decode_err)?;
            let num_columns = cur.read_u32::<BigEndian>().map_err(decode_err)? as usize;
            let next_col_id = cur.read_i32::<BigEndian>().map_err(decode_err)?;
            let schema = read_schema(&mut cur)?;
            let sql_len = cur.read_u32::<BigEndian>().map_err(decode_err)? as usize;
            if cur.len() < sql_len {
                return Err(MnodeError::Others("truncated stream sql".to_string()));
            }
            let (sql_bytes, rest) = cur.split_at(sql_len);
            // sql_len includes the terminating NUL; strip it from the
            // logical value (SPEC_FULL §11.7).
            let sql_no_nul = &sql_bytes[..sql_len.saturating_sub(1)];
            let sql = String::from_utf8(sql_no_nul.to_vec())
                .map_err(|e| MnodeError::Others(format!("invalid utf8 in stream sql: {e}")))?;
            cur = rest;
            (
                TableKind::Stream,
                ChildBody::Stream {
                    schema_version,
                    num_columns,
                    next_col_id,
                    schema,
                    sql,
                },
            )
        }
        other => return Err(MnodeError::Others(format!("unknown table kind tag {other}"))),
    };
    Ok(ChildTable {
        header: TableHeader {
            table_id,
            kind,
            ref_count,
        },
        created_time_ms,
        uid,
        vg_id,
        sid,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TableId;

    #[test]
    fn super_round_trips() {
        let s = SuperTable::new(
            TableId::new("a.db1.weather").unwrap(),
            1000,
            7,
            vec![SchemaColumn::new(0, "ts", ColumnType::Timestamp, 8)],
            vec![SchemaColumn::new(1, "loc", ColumnType::Binary, 16)],
        );
        let bytes = encode_super(&s);
        let back = decode_super(&bytes).unwrap();
        assert_eq!(back.table_id(), s.table_id());
        assert_eq!(back.next_col_id, s.next_col_id);
        assert_eq!(back.num_columns, s.num_columns);
        assert_eq!(back.num_tags, s.num_tags);
        assert_eq!(back.schema.len(), s.schema.len());
    }

    #[test]
    fn stream_sql_round_trips_without_nul() {
        let t = ChildTable::new_standalone(
            TableId::new("a.db1.cq1").unwrap(),
            5,
            1,
            1,
            0,
            vec![SchemaColumn::new(0, "ts", ColumnType::Timestamp, 8)],
            Some("select * from t".to_string()),
        );
        let bytes = encode_child(&t);
        let back = decode_child(&bytes).unwrap();
        assert_eq!(back.sql(), Some("select * from t"));
        assert_eq!(back.sql_len(), Some("select * from t".len() + 1));
    }

    #[test]
    fn child_round_trips() {
        let t = ChildTable::new_child(
            TableId::new("a.db1.paris").unwrap(),
            5,
            1,
            2,
            3,
            TableId::new("a.db1.weather").unwrap(),
        );
        let bytes = encode_child(&t);
        let back = decode_child(&bytes).unwrap();
        assert_eq!(back.super_table_id().unwrap().as_str(), "a.db1.weather");
        assert_eq!(back.vg_id, 2);
        assert_eq!(back.sid, 3);
    }
}
