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

//! External collaborators consulted, not designed here (spec §1, §6): the
//! database/vgroup/account directories, and [`env::MetaSrvEnv`] that wires
//! them together with the catalog stores and registry into one handle.

mod account;
mod db;
mod env;
mod vgroup;

pub use account::{AccountDirectory, GrantKind};
pub use db::{Db, DbDirectory, Precision};
pub use env::{MetaOpts, MetaSrvEnv};
pub use vgroup::{VgroupDirectory, VnodePeer};
