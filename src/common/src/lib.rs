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

//! Shared primitives for the `mnode` workspace: error codes, logging bootstrap
//! and small time/id helpers used by both the catalog core and the binary.

pub mod config;
pub mod error;
pub mod logging;
pub mod time;

pub use error::{ErrorCode, MnodeError, MnodeResult};
