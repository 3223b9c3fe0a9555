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

//! Logger bootstrap for `mnode` binaries.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Tunable knobs for the process-wide logger, mirroring the shape of a
/// typical database server's `LoggerSettings` (compact fmt layer, per-target
/// level overrides, ANSI autodetection).
pub struct LoggerSettings {
    colorful: bool,
}

impl LoggerSettings {
    pub fn new_default() -> Self {
        Self {
            colorful: console_colors_enabled(),
        }
    }
}

fn console_colors_enabled() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stderr())
}

/// Default filter directive: this crate's own targets at `INFO`, everything
/// else at `WARN`. Overridden wholesale by `RUST_LOG` when set.
const DEFAULT_FILTER: &str = "warn,mnode_meta=info,mnode_cmd=info,mnode_common=info";

/// Initialize the global `tracing` subscriber. Safe to call at most once per
/// process; call from `main` before anything else runs.
pub fn init_logger(settings: LoggerSettings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_ansi(settings.colorful);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
