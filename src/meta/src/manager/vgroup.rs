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

//! Vgroup directory (spec §6): slot allocation, ip-set resolution, and the
//! create/drop-on-empty lifecycle the Placement Coordinator (C5) drives.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use mnode_common::{MnodeError, MnodeResult};
use parking_lot::RwLock;

/// One vnode replica of a vgroup, carrying both addresses so the reader
/// (Meta Assembly, C6) can pick public vs. private per the connecting
/// client (spec §4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VnodePeer {
    pub vnode_index: i32,
    pub public_ip: u32,
    pub private_ip: u32,
}

#[derive(Debug, Clone)]
struct Vgroup {
    vg_id: i32,
    db_name: String,
    vnodes: Vec<VnodePeer>,
    slot_capacity: usize,
    used_slots: HashSet<i32>,
}

impl Vgroup {
    fn has_free_slot(&self) -> bool {
        self.used_slots.len() < self.slot_capacity
    }

    fn alloc_slot(&mut self) -> Option<i32> {
        let sid = (0..self.slot_capacity as i32).find(|sid| !self.used_slots.contains(sid))?;
        self.used_slots.insert(sid);
        Some(sid)
    }
}

/// In-memory stand-in for the vgroup subsystem (spec §1 "consulted, not
/// designed here"); the slot pool it mutates is the one Invariant 4 (§3)
/// refers to.
pub struct VgroupDirectory {
    vgroups: RwLock<HashMap<i32, Vgroup>>,
    next_vg_id: AtomicI32,
}

impl VgroupDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            vgroups: RwLock::new(HashMap::new()),
            next_vg_id: AtomicI32::new(1),
        })
    }

    pub fn for_test() -> Arc<Self> {
        Self::new()
    }

    /// Creates a new, empty vgroup for `db_name` and returns its id. Used
    /// both for initial provisioning and for the "enqueue a new-vgroup
    /// request" fallback in the create-table flow (spec §4.5 step 3).
    pub fn create_vgroup(
        &self,
        db_name: impl Into<String>,
        slot_capacity: usize,
        vnodes: Vec<VnodePeer>,
    ) -> i32 {
        let vg_id = self.next_vg_id.fetch_add(1, Ordering::SeqCst);
        self.vgroups.write().insert(
            vg_id,
            Vgroup {
                vg_id,
                db_name: db_name.into(),
                vnodes,
                slot_capacity,
                used_slots: HashSet::new(),
            },
        );
        vg_id
    }

    pub fn get_vgroup_db_name(&self, vg_id: i32) -> Option<String> {
        self.vgroups.read().get(&vg_id).map(|v| v.db_name.clone())
    }

    pub fn exists(&self, vg_id: i32) -> bool {
        self.vgroups.read().contains_key(&vg_id)
    }

    /// First vgroup belonging to `db_name` with a free slot, if any
    /// (spec §4.5 step 3 `get_available_vgroup`).
    pub fn get_available_vgroup(&self, db_name: &str) -> Option<i32> {
        self.vgroups
            .read()
            .values()
            .find(|v| v.db_name == db_name && v.has_free_slot())
            .map(|v| v.vg_id)
    }

    pub fn get_ip_set_from_vgroup(&self, vg_id: i32) -> MnodeResult<Vec<VnodePeer>> {
        self.vgroups
            .read()
            .get(&vg_id)
            .map(|v| v.vnodes.clone())
            .ok_or(MnodeError::InvalidVgroupId(vg_id))
    }

    /// Allocates a free slot index from the vgroup's id pool
    /// (spec §4.5 step 3).
    pub fn alloc_sid(&self, vg_id: i32) -> MnodeResult<i32> {
        let mut vgroups = self.vgroups.write();
        let vgroup = vgroups
            .get_mut(&vg_id)
            .ok_or(MnodeError::InvalidVgroupId(vg_id))?;
        vgroup.alloc_slot().ok_or(MnodeError::InvalidVgroupId(vg_id))
    }

    /// Marks a slot as no longer in use. Returns `true` when the vgroup is
    /// now empty, signalling the caller to trigger vgroup drop
    /// (spec §4.5 "Drop table flow").
    pub fn remove_table(&self, vg_id: i32, sid: i32) -> bool {
        let mut vgroups = self.vgroups.write();
        if let Some(vgroup) = vgroups.get_mut(&vg_id) {
            vgroup.used_slots.remove(&sid);
            vgroup.used_slots.is_empty()
        } else {
            false
        }
    }

    pub fn drop_vgroup(&self, vg_id: i32) {
        self.vgroups.write().remove(&vg_id);
    }
}
