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

//! Database directory (spec §6): `get_db`, `get_db_by_table_id` and the
//! attributes the catalog core reads off a db (`dirty`, `cfg.acct`,
//! `cfg.precision`, table counts). No persistence of its own; consulted, not
//! designed here.

use std::collections::HashMap;
use std::sync::Arc;

use mnode_common::{MnodeError, MnodeResult};
use parking_lot::RwLock;

use crate::model::TableId;

/// Timestamp precision a database stores at, copied into `TableMeta`
/// (spec §4.6 `precision`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Milliseconds,
    Microseconds,
}

#[derive(Debug, Clone)]
pub struct Db {
    pub name: String,
    pub acct: String,
    pub precision: Precision,
    /// A dirty db (being dropped) rejects new mutations (`DB_NOT_SELECTED`
    /// family of checks, spec §11.2).
    pub dirty: bool,
    pub num_of_tables: u32,
    pub num_of_super_tables: u32,
}

impl Db {
    pub fn new(name: impl Into<String>, acct: impl Into<String>, precision: Precision) -> Self {
        Self {
            name: name.into(),
            acct: acct.into(),
            precision,
            dirty: false,
            num_of_tables: 0,
            num_of_super_tables: 0,
        }
    }
}

/// In-memory stand-in for the database subsystem (spec §1 "consulted, not
/// designed here"). The monitor database name is configured once; mutating
/// operations against it are rejected (spec §11.4).
pub struct DbDirectory {
    dbs: RwLock<HashMap<String, Db>>,
    monitor_db_name: String,
}

impl DbDirectory {
    pub fn new(monitor_db_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            dbs: RwLock::new(HashMap::new()),
            monitor_db_name: monitor_db_name.into(),
        })
    }

    pub fn for_test() -> Arc<Self> {
        Self::new("monitor")
    }

    pub fn is_monitor_db(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(&self.monitor_db_name)
    }

    pub fn insert(&self, db: Db) {
        self.dbs.write().insert(db.name.clone(), db);
    }

    pub fn get_db(&self, name: &str) -> Option<Db> {
        self.dbs.read().get(name).cloned()
    }

    /// Resolves the owning database from a dotted table id (spec §6).
    pub fn get_db_by_table_id(&self, id: &TableId) -> Option<Db> {
        self.get_db(id.db_name())
    }

    /// Resolves the db, rejecting missing or dirty databases
    /// (`DB_NOT_SELECTED`, spec §11.2/§11.3 gate order).
    pub fn resolve_selected(&self, id: &TableId) -> MnodeResult<Db> {
        match self.get_db_by_table_id(id) {
            Some(db) if !db.dirty => Ok(db),
            _ => Err(MnodeError::DbNotSelected(id.to_string())),
        }
    }

    /// Rejects the monitor database for mutating operations (spec §11.4).
    pub fn reject_monitor_db(&self, db: &Db) -> MnodeResult<()> {
        if self.is_monitor_db(&db.name) {
            Err(MnodeError::MonitorDbForbidden(db.name.clone()))
        } else {
            Ok(())
        }
    }

    pub fn bump_tables(&self, db_name: &str, delta: i64) {
        if let Some(db) = self.dbs.write().get_mut(db_name) {
            db.num_of_tables = (db.num_of_tables as i64 + delta).max(0) as u32;
        }
    }

    pub fn bump_super_tables(&self, db_name: &str, delta: i64) {
        if let Some(db) = self.dbs.write().get_mut(db_name) {
            db.num_of_super_tables = (db.num_of_super_tables as i64 + delta).max(0) as u32;
        }
    }
}
