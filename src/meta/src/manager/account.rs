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

//! Account/grant directory (spec §6): `get_acct` with its mutable
//! `numOfTimeSeries` counter, plus `grant_check`/`grant_add`/`grant_restore`.
//! Consulted, not designed here (spec §1); grant policy itself (quotas,
//! expiry) is out of scope; this is the minimal surface the catalog core
//! calls through.

use std::collections::HashMap;
use std::sync::Arc;

use mnode_common::{MnodeError, MnodeResult};
use parking_lot::RwLock;

/// The only grant kind the catalog core consults (spec §4.5 step 3
/// `grant_check(TIMESERIES)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantKind {
    TimeSeries,
}

#[derive(Debug, Clone)]
struct Account {
    /// Σ over Children (super.num_columns−1) + Σ over Normal/Stream
    /// (num_columns−1); invariant 8, spec §3.
    num_of_time_series: i64,
    time_series_limit: i64,
}

/// In-memory stand-in for the account/grant subsystem.
pub struct AccountDirectory {
    accounts: RwLock<HashMap<String, Account>>,
}

impl AccountDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            accounts: RwLock::new(HashMap::new()),
        })
    }

    pub fn for_test() -> Arc<Self> {
        Self::new()
    }

    /// Registers an account with an (effectively) unlimited time-series
    /// quota, useful for tests that only care about the counter, not grant
    /// rejection.
    pub fn insert_unlimited(&self, name: impl Into<String>) {
        self.accounts.write().insert(
            name.into(),
            Account {
                num_of_time_series: 0,
                time_series_limit: i64::MAX,
            },
        );
    }

    pub fn insert_with_limit(&self, name: impl Into<String>, limit: i64) {
        self.accounts.write().insert(
            name.into(),
            Account {
                num_of_time_series: 0,
                time_series_limit: limit,
            },
        );
    }

    pub fn num_of_time_series(&self, acct: &str) -> i64 {
        self.accounts
            .read()
            .get(acct)
            .map(|a| a.num_of_time_series)
            .unwrap_or_default()
    }

    /// Rejects the operation if granting one more time series of `kind`
    /// would exceed quota (spec §4.5 step 3).
    pub fn grant_check(&self, acct: &str, kind: GrantKind) -> MnodeResult<()> {
        let GrantKind::TimeSeries = kind;
        let accounts = self.accounts.read();
        let account = accounts
            .get(acct)
            .ok_or_else(|| MnodeError::InvalidAcct(acct.to_string()))?;
        if account.num_of_time_series >= account.time_series_limit {
            Err(MnodeError::AppError(format!(
                "time series grant exceeded for account {acct}"
            )))
        } else {
            Ok(())
        }
    }

    /// Adjusts `numOfTimeSeries` by `n` (spec invariant 8); `n` may be
    /// negative when columns are dropped.
    pub fn grant_add(&self, acct: &str, n: i64) -> MnodeResult<()> {
        let mut accounts = self.accounts.write();
        let account = accounts
            .get_mut(acct)
            .ok_or_else(|| MnodeError::InvalidAcct(acct.to_string()))?;
        account.num_of_time_series += n;
        Ok(())
    }

    /// Releases `n` previously-granted time series, e.g. when a downstream
    /// data-node rejection rolls back a create (spec §4.5 step 7).
    pub fn grant_restore(&self, acct: &str, n: i64) -> MnodeResult<()> {
        self.grant_add(acct, -n)
    }
}
