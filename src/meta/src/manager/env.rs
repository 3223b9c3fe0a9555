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

//! `MetaSrvEnv`: the one handle every component is constructed from, tying
//! together the registry, the collaborator directories, and the tunables
//! `spec.md` leaves as named constants (SPEC_FULL.md §10.3). Modeled on the
//! teacher's `MetaSrvEnv`/`for_test()` pattern.

use std::sync::Arc;

use mnode_common::config::SchemaLimits;
use mnode_common::time::CatalogVersionGenerator;

use super::account::AccountDirectory;
use super::db::DbDirectory;
use super::vgroup::VgroupDirectory;
use crate::registry::Registry;

/// Tunables named but left abstract by `spec.md` (`MAX_TAGS`, `MAX_COLUMNS`,
/// `MAX_NAME_LEN`, `MAX_VNODES_PER_VGROUP`) plus deployment-shape settings
/// (is this node the master, the monitor db name).
#[derive(Debug, Clone)]
pub struct MetaOpts {
    pub limits: SchemaLimits,
    pub monitor_db_name: String,
    /// A non-master node redirects mutating requests (spec §4.8
    /// `CheckRedirect`).
    pub is_master: bool,
}

impl Default for MetaOpts {
    fn default() -> Self {
        Self {
            limits: SchemaLimits::default(),
            monitor_db_name: "log".to_string(),
            is_master: true,
        }
    }
}

pub struct MetaSrvEnv {
    pub opts: MetaOpts,
    pub registry: Arc<Registry>,
    pub db_dir: Arc<DbDirectory>,
    pub vgroup_dir: Arc<VgroupDirectory>,
    pub account_dir: Arc<AccountDirectory>,
    pub catalog_version: Arc<CatalogVersionGenerator>,
}

impl MetaSrvEnv {
    pub fn new(opts: MetaOpts) -> Self {
        let db_dir = DbDirectory::new(opts.monitor_db_name.clone());
        let vgroup_dir = VgroupDirectory::new();
        let account_dir = AccountDirectory::new();
        let registry = Registry::new(db_dir.clone(), vgroup_dir.clone());
        Self {
            opts,
            registry,
            db_dir,
            vgroup_dir,
            account_dir,
            catalog_version: CatalogVersionGenerator::new(),
        }
    }

    /// A ready-to-use environment for tests: one database (`a.db1`) owned by
    /// account `a` with an unlimited time-series grant, and one vgroup with
    /// free slots.
    pub fn for_test() -> Self {
        let env = Self::new(MetaOpts::default());
        env.account_dir.insert_unlimited("a");
        env.db_dir.insert(super::db::Db::new(
            "a.db1",
            "a",
            super::db::Precision::Milliseconds,
        ));
        env.vgroup_dir.create_vgroup("a.db1", 4, vec![]);
        env
    }
}
