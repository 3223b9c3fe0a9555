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

//! Schema limits shared between the catalog core and its callers. These are
//! the concrete values behind the named constants in spec §3 invariant 7.

use serde::{Deserialize, Serialize};

/// Schema-shape limits enforced by the Schema Mutation Engine (C4) and the
/// Placement & Lifecycle Coordinator (C5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaLimits {
    /// `MAX_TAGS` in spec §3 invariant 7.
    pub max_tags: usize,
    /// `MAX_COLUMNS` in spec §3 invariant 7 (columns + tags combined).
    pub max_columns: usize,
    /// `MAX_NAME_LEN` in spec §3 invariant 7.
    pub max_name_len: usize,
    /// `MAX_VNODES_PER_VGROUP` in spec §4.6.
    pub max_vnodes_per_vgroup: usize,
    /// Initial capacity of a `MultiTableMeta` response buffer (spec §4.6).
    pub multi_table_meta_initial_capacity_bytes: usize,
}

impl Default for SchemaLimits {
    fn default() -> Self {
        Self {
            max_tags: 128,
            max_columns: 1024,
            max_name_len: 64,
            max_vnodes_per_vgroup: 3,
            multi_table_meta_initial_capacity_bytes: 4 * 1024 * 1024,
        }
    }
}
