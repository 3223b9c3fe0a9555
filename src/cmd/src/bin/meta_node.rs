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

//! `mnode-meta`: process entry point wiring `MetaSrvEnv` and the message
//! dispatcher together. The RPC transport itself is out of scope (spec §1),
//! so this binary's job ends at standing the catalog core up and parking it
//! until shutdown; a real transport layer would drive `Dispatcher` from
//! here.

use std::net::Ipv4Addr;
use std::sync::Arc;

use clap::Parser;
use mnode_common::config::SchemaLimits;
use mnode_common::logging::{self, LoggerSettings};
use mnode_meta::manager::{Db, MetaOpts, MetaSrvEnv, Precision};
use mnode_meta::meta_assembly::NetworkConfig;
use mnode_meta::placement::AlwaysAckDataNode;
use mnode_meta::rpc::{ChannelShellQueue, Dispatcher};

/// Process-level options (spec SPEC_FULL §10.3), analogous to the teacher's
/// `MetaNodeOpts`: listen/advertise addresses plus the schema-shape
/// tunables `spec.md` leaves as named constants.
#[derive(Parser, Debug, Clone)]
#[command(name = "mnode-meta", about = "mnode metadata management core")]
pub struct MnodeOpts {
    /// Address this node listens on for management RPCs (transport out of
    /// scope for this crate; recorded for parity with the teacher's CLI).
    #[arg(long, env = "MNODE_LISTEN_ADDR", default_value = "0.0.0.0:6030")]
    pub listen_addr: String,

    /// Public address clients reach this node through; compared against a
    /// connection's observed server ip to pick public vs. private vnode
    /// addresses in `TableMeta` (spec §4.6).
    #[arg(long, env = "MNODE_ADVERTISE_IP", default_value = "127.0.0.1")]
    pub advertise_ip: Ipv4Addr,

    /// Name of the reserved monitor database, in the same dotted
    /// `acct.db` form every other db name takes; mutating requests against
    /// it are rejected (spec §11.4).
    #[arg(long, env = "MNODE_MONITOR_DB", default_value = "sys.log")]
    pub monitor_db_name: String,

    /// Whether this node is the elected master; non-master nodes redirect
    /// mutating requests (spec §4.8 `CheckRedirect`).
    #[arg(long, env = "MNODE_IS_MASTER", default_value_t = true)]
    pub is_master: bool,

    #[arg(long, env = "MNODE_MAX_TAGS", default_value_t = SchemaLimits::default().max_tags)]
    pub max_tags: usize,

    #[arg(long, env = "MNODE_MAX_COLUMNS", default_value_t = SchemaLimits::default().max_columns)]
    pub max_columns: usize,

    #[arg(long, env = "MNODE_MAX_NAME_LEN", default_value_t = SchemaLimits::default().max_name_len)]
    pub max_name_len: usize,

    #[arg(long, env = "MNODE_MAX_VNODES_PER_VGROUP", default_value_t = SchemaLimits::default().max_vnodes_per_vgroup)]
    pub max_vnodes_per_vgroup: usize,

    #[arg(
        long,
        env = "MNODE_MULTI_TABLE_META_INITIAL_CAPACITY_BYTES",
        default_value_t = SchemaLimits::default().multi_table_meta_initial_capacity_bytes
    )]
    pub multi_table_meta_initial_capacity_bytes: usize,
}

impl MnodeOpts {
    fn limits(&self) -> SchemaLimits {
        SchemaLimits {
            max_tags: self.max_tags,
            max_columns: self.max_columns,
            max_name_len: self.max_name_len,
            max_vnodes_per_vgroup: self.max_vnodes_per_vgroup,
            multi_table_meta_initial_capacity_bytes: self.multi_table_meta_initial_capacity_bytes,
        }
    }
}

fn ipv4_to_u32(ip: Ipv4Addr) -> u32 {
    u32::from_be_bytes(ip.octets())
}

#[tokio::main]
async fn main() {
    let opts = MnodeOpts::parse();
    logging::init_logger(LoggerSettings::new_default());

    tracing::info!(
        listen_addr = %opts.listen_addr,
        advertise_ip = %opts.advertise_ip,
        is_master = opts.is_master,
        "starting mnode-meta"
    );

    let meta_opts = MetaOpts {
        limits: opts.limits(),
        monitor_db_name: opts.monitor_db_name.clone(),
        is_master: opts.is_master,
    };
    let env = Arc::new(MetaSrvEnv::new(meta_opts));
    // The monitor database always exists so `reject_monitor_db` has
    // something to compare against from process start (spec §11.4).
    env.db_dir.insert(Db::new(
        env.opts.monitor_db_name.clone(),
        "sys",
        Precision::Milliseconds,
    ));

    let (shell_queue, mut create_table_rx) = ChannelShellQueue::new();
    let net = NetworkConfig {
        public_ip: ipv4_to_u32(opts.advertise_ip),
    };
    let dispatcher = Arc::new(Dispatcher::new(
        env.clone(),
        Arc::new(AlwaysAckDataNode),
        shell_queue,
        net,
    ));

    // Drains on-demand child creates synthesized by `table_info` (spec §4.5
    // "On-demand child creation"); a real deployment would fan this out to
    // worker tasks, this core only needs the re-entry point to exist.
    let drain_dispatcher = dispatcher.clone();
    tokio::spawn(async move {
        use mnode_meta::rpc::{MnodeService, Outcome};
        while let Some(msg) = create_table_rx.recv().await {
            let table_id = msg.table_id.clone();
            match drain_dispatcher.create_table(msg).await {
                Outcome::Response(Ok(_)) => {
                    tracing::info!(table_id = %table_id, "on-demand create completed")
                }
                Outcome::Response(Err(e)) => {
                    tracing::warn!(table_id = %table_id, error = %e, "on-demand create failed")
                }
                Outcome::Redirect => {
                    tracing::warn!(table_id = %table_id, "on-demand create redirected, dropped")
                }
            }
        }
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received shutdown signal"),
        Err(err) => tracing::error!(error = %err, "failed to listen for shutdown signal"),
    }
}
