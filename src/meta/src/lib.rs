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

//! The metadata management core of a distributed time-series database: the
//! catalog of super tables and child/normal/stream tables, schema mutation,
//! table placement onto vgroups, and the read paths (`TableMeta`,
//! `SHOW`/`SELECT` on the catalog) that client drivers rely on to find data.
//!
//! Module map (letters match the component table in `SPEC_FULL.md` §2):
//! - [`model`], entity model (C2): `TableHeader`, `SuperTable`, `ChildTable`.
//! - [`store`], catalog store adapter (C1): the `CatalogStore` trait and its
//!   in-memory implementation.
//! - [`registry`], catalog registry (C3): in-memory lookup and reference
//!   counting across the two catalog stores.
//! - [`schema`], schema mutation engine (C4): add/drop/rename column & tag.
//! - [`placement`], placement & lifecycle coordinator (C5): two-phase
//!   create/drop against a vgroup and its owning data node.
//! - [`meta_assembly`], meta assembly (C6): `TableMeta`/`MultiTableMeta`.
//! - [`show`], show/retrieve iterators (C7): paginated catalog scans.
//! - [`rpc`], message dispatcher (C8): wire message kinds and routing.
//! - [`manager`], the external collaborators `spec.md` §6 treats as
//!   consulted-not-designed-here: db/vgroup/account directories, and
//!   [`manager::env::MetaSrvEnv`] tying them together with the catalog store.

pub mod manager;
pub mod meta_assembly;
pub mod model;
pub mod placement;
pub mod registry;
pub mod rpc;
pub mod schema;
pub mod show;
pub mod store;

pub use mnode_common::{ErrorCode, MnodeError, MnodeResult};
