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

//! Message Dispatcher (C8): binds each inbound wire message kind (spec §6)
//! to a handler, running `CheckRedirect` before any mutating call and
//! mediating responses back to clients and peer data nodes (spec §4.8).
//!
//! The wire transport itself is out of scope (spec §1): [`MnodeService`] is
//! the typed surface a real RPC layer would sit in front of, the same shape
//! `DdlServiceImpl` exposes per RPC method in the teacher, minus the
//! transport-specific `Request`/`Response`/`Status` wrapper types.

pub mod messages;

use std::sync::Arc;

use async_trait::async_trait;
use mnode_common::{MnodeError, MnodeResult};

use crate::manager::MetaSrvEnv;
use crate::meta_assembly::{self, ConnInfo, NetworkConfig};
use crate::model::{ChildTable, ColumnType, TableId};
use crate::placement::{
    ChildOrSuper, CreateTableKind, CreateTableRequest, DataNodeClient, MdUpdateTagValue, Placement,
};
use crate::registry::Entity;
use crate::schema::{AlterKind, SchemaEngine};
use crate::show::{ShowCursor, ShowIterator};

pub use messages::*;

/// A handler's answer once `CheckRedirect` has run: either this node is not
/// the master and the caller must retry elsewhere, or it is, and the
/// request was (or was not) satisfied (spec §4.8 "A non-master management
/// node redirects mutating requests (`CheckRedirect`) before handling").
#[derive(Debug)]
pub enum Outcome<T> {
    Redirect,
    Response(MnodeResult<T>),
}

impl<T> Outcome<T> {
    fn ok(value: T) -> Self {
        Outcome::Response(Ok(value))
    }

    fn err(e: MnodeError) -> Self {
        Outcome::Response(Err(e))
    }
}

/// The message-passing pattern behind "on-demand table creation during meta
/// fetch": a synthesized `CreateTable` is re-enqueued on the shell queue
/// rather than recursed into inline (spec §4.5, §9 "preserve it rather than
/// recursing within the handler").
pub trait ShellQueue: Send + Sync {
    fn enqueue_create_table(&self, msg: CreateTableMsg);
}

/// A [`ShellQueue`] backed by an unbounded channel; `main` (or a test) drains
/// the receiving half and feeds synthesized creates back through
/// [`Dispatcher::create_table`].
pub struct ChannelShellQueue {
    tx: tokio::sync::mpsc::UnboundedSender<CreateTableMsg>,
}

impl ChannelShellQueue {
    pub fn new() -> (Arc<Self>, tokio::sync::mpsc::UnboundedReceiver<CreateTableMsg>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl ShellQueue for ChannelShellQueue {
    fn enqueue_create_table(&self, msg: CreateTableMsg) {
        // The receiver may already be gone (e.g. in a test that only checks
        // the `Deferred` outcome); losing the synthesized message in that
        // case is the caller's choice, not this queue's to report.
        let _ = self.tx.send(msg);
    }
}

/// Client-facing request kinds (spec §4.8 "Request kinds (client-facing)").
#[async_trait]
pub trait MnodeService: Send + Sync {
    async fn create_table(&self, msg: CreateTableMsg) -> Outcome<CreateTableReply>;
    async fn drop_table(&self, msg: DropTableMsg) -> Outcome<Ack>;
    async fn alter_table(&self, msg: AlterTableMsg) -> Outcome<Ack>;
    async fn table_info(&self, conn: ConnInfo, msg: TableInfoMsg) -> Outcome<TableInfoOutcome>;
    async fn multi_table_info(
        &self,
        conn: ConnInfo,
        msg: MultiTableInfoMsg,
    ) -> Outcome<MultiTableMetaReply>;
    async fn stable_vgroup(&self, msg: STableVgroupMsg) -> Outcome<STableVgroupReply>;
    async fn show_meta(&self, msg: ShowMetaMsg) -> Outcome<ShowMetaReply>;
    async fn show_retrieve(&self, msg: ShowRetrieveMsg) -> Outcome<ShowRetrieveReply>;
}

pub struct Dispatcher {
    env: Arc<MetaSrvEnv>,
    data_node: Arc<dyn DataNodeClient>,
    shell_queue: Arc<dyn ShellQueue>,
    net: NetworkConfig,
}

impl Dispatcher {
    pub fn new(
        env: Arc<MetaSrvEnv>,
        data_node: Arc<dyn DataNodeClient>,
        shell_queue: Arc<dyn ShellQueue>,
        net: NetworkConfig,
    ) -> Self {
        Self {
            env,
            data_node,
            shell_queue,
            net,
        }
    }

    fn check_redirect(&self) -> bool {
        self.env.opts.is_master
    }

    fn placement(&self) -> Placement<'_> {
        Placement::new(
            &self.env.registry,
            &self.env.db_dir,
            &self.env.vgroup_dir,
            &self.env.account_dir,
            self.env.opts.limits,
            self.data_node.as_ref(),
            &self.env.catalog_version,
        )
    }

    /// Classifies a `CreateTable` request by shape (spec §4.5 step 1: "by
    /// `numOfTags > 0`"; step 4: Child if `numOfColumns == 0`, Stream if
    /// `sql_len > 0`, else Normal).
    fn classify_create(msg: &CreateTableMsg) -> CreateTableKind {
        if !msg.tags.is_empty() {
            CreateTableKind::Super {
                columns: msg.columns.clone(),
                tags: msg.tags.clone(),
            }
        } else if let Some(super_table_id) = &msg.super_table_id {
            CreateTableKind::Child {
                super_table_id: super_table_id.clone(),
            }
        } else if let Some(sql) = &msg.sql {
            CreateTableKind::Stream {
                columns: msg.columns.clone(),
                sql: sql.clone(),
            }
        } else {
            CreateTableKind::Normal {
                columns: msg.columns.clone(),
            }
        }
    }

    fn to_reply(created: Option<ChildOrSuper>) -> CreateTableReply {
        CreateTableReply {
            ack: Ack::success(),
            created: created.map(|c| match c {
                ChildOrSuper::Super(s) => CreatedTable::Super(s),
                ChildOrSuper::Child(t) => CreatedTable::Child(t),
            }),
        }
    }
}

#[async_trait]
impl MnodeService for Dispatcher {
    /// spec §4.5 "Create table flow" + SPEC_FULL §11.1 gate order (existence
    /// before db-selected, both enforced inside `Placement::create_table`).
    async fn create_table(&self, msg: CreateTableMsg) -> Outcome<CreateTableReply> {
        if !self.check_redirect() {
            return Outcome::Redirect;
        }
        let req = CreateTableRequest {
            table_id: msg.table_id.clone(),
            ig_exists: msg.ig_exists,
            kind: Self::classify_create(&msg),
        };
        match self.placement().create_table(req).await {
            Ok(created) => {
                tracing::info!(table_id = %msg.table_id, "create_table accepted");
                Outcome::ok(Self::to_reply(created))
            }
            Err(e) => {
                tracing::warn!(table_id = %msg.table_id, error = %e, "create_table rejected");
                Outcome::err(e)
            }
        }
    }

    /// SPEC_FULL §11.2 gate order: redirect → resolve db → monitor-db
    /// forbidden → table lookup (`igNotExists` short-circuit) → dispatch by
    /// kind; all enforced inside `Placement::drop_table`.
    async fn drop_table(&self, msg: DropTableMsg) -> Outcome<Ack> {
        if !self.check_redirect() {
            return Outcome::Redirect;
        }
        match self.placement().drop_table(&msg.table_id, msg.ig_not_exists).await {
            Ok(()) => Outcome::ok(Ack::success()),
            Err(e) => Outcome::err(e),
        }
    }

    /// SPEC_FULL §11.3 gate order: redirect → write-authority (`NoRights`)
    /// → resolve db → monitor-db forbidden → table lookup (`InvalidTable`)
    /// → per-kind dispatch. Rejects more than one schema entry per request
    /// at the type level (`AlterTableMsg` carries at most one).
    async fn alter_table(&self, msg: AlterTableMsg) -> Outcome<Ack> {
        if !self.check_redirect() {
            return Outcome::Redirect;
        }
        if !msg.has_write_authority {
            return Outcome::err(MnodeError::NoRights(msg.table_id.to_string()));
        }
        let db = match self.env.db_dir.resolve_selected(&msg.table_id) {
            Ok(db) => db,
            Err(e) => return Outcome::err(e),
        };
        if let Err(e) = self.env.db_dir.reject_monitor_db(&db) {
            return Outcome::err(e);
        }
        let entity = match self.env.registry.get_table(msg.table_id.as_str()).await {
            Some(e) => e,
            None => return Outcome::err(MnodeError::InvalidTable(msg.table_id.to_string())),
        };

        let engine = SchemaEngine::new(&self.env.registry, &self.env.account_dir, self.env.opts.limits);
        let result = self.dispatch_alter(&db.acct, entity, msg, &engine).await;
        match result {
            Ok(()) => Outcome::ok(Ack::success()),
            Err(e) => Outcome::err(e),
        }
    }

    /// SPEC_FULL §11.5: missing table + `create_flag=1` synthesizes a
    /// `CreateTable` and re-enqueues it on the shell queue rather than
    /// erroring (spec §4.5 "On-demand child creation"); missing table
    /// without the flag is `INVALID_TABLE`.
    async fn table_info(&self, conn: ConnInfo, msg: TableInfoMsg) -> Outcome<TableInfoOutcome> {
        if self.env.registry.get_table(msg.table_id.as_str()).await.is_none() {
            if !msg.create_flag {
                return Outcome::err(MnodeError::InvalidTable(msg.table_id.to_string()));
            }
            self.shell_queue.enqueue_create_table(CreateTableMsg {
                table_id: msg.table_id,
                columns: Vec::new(),
                tags: Vec::new(),
                super_table_id: msg.super_table_id,
                tag_payload: msg.tags,
                sql: None,
                ig_exists: true,
            });
            return Outcome::ok(TableInfoOutcome::Deferred);
        }
        match meta_assembly::assemble_table_meta(
            &self.env.registry,
            &self.env.db_dir,
            &self.env.vgroup_dir,
            &self.env.opts.limits,
            conn,
            self.net,
            msg.table_id.as_str(),
        )
        .await
        {
            Ok(meta) => Outcome::ok(TableInfoOutcome::Meta(meta)),
            Err(e) => Outcome::err(e),
        }
    }

    /// `MultiTableMeta` (spec §4.6): tables that fail to resolve are
    /// reported in `unresolved`, not surfaced as a request-level error;
    /// only the buffer-growth behavior is normative here (spec §9 Open
    /// Question (c)).
    async fn multi_table_info(
        &self,
        conn: ConnInfo,
        msg: MultiTableInfoMsg,
    ) -> Outcome<MultiTableMetaReply> {
        let ids: Vec<String> = msg.table_ids.iter().map(|t| t.to_string()).collect();
        let (buf, num_resolved, unresolved) = meta_assembly::assemble_multi_table_meta(
            &self.env.registry,
            &self.env.db_dir,
            &self.env.vgroup_dir,
            &self.env.opts.limits,
            conn,
            self.net,
            &ids,
        )
        .await;
        Outcome::ok(MultiTableMetaReply {
            buf,
            num_resolved,
            unresolved,
        })
    }

    async fn stable_vgroup(&self, msg: STableVgroupMsg) -> Outcome<STableVgroupReply> {
        if self.env.registry.get_super(msg.table_id.as_str()).await.is_none() {
            return Outcome::err(MnodeError::InvalidTable(msg.table_id.to_string()));
        }
        let vg_ids = self.env.registry.child_vgroups_of(&msg.table_id);
        Outcome::ok(STableVgroupReply { vg_ids })
    }

    async fn show_meta(&self, _msg: ShowMetaMsg) -> Outcome<ShowMetaReply> {
        Outcome::ok(ShowMetaReply {
            cursor: ShowCursor::new(),
        })
    }

    async fn show_retrieve(&self, msg: ShowRetrieveMsg) -> Outcome<ShowRetrieveReply> {
        let iter = ShowIterator::new(&self.env.registry, msg.db_name, msg.pattern);
        let mut cursor = msg.cursor;
        let rows = match msg.target {
            ShowTarget::Stable => iter.next_stables_page(&mut cursor, msg.page_size),
            ShowTarget::Table => iter.next_tables_page(&mut cursor, msg.page_size),
        };
        Outcome::ok(ShowRetrieveReply { rows, cursor })
    }
}

impl Dispatcher {
    /// Per-kind alter dispatch (spec §4.4). `UpdateTagValue` on a Child is
    /// the one alter kind that never touches the catalog: it is forwarded
    /// to the owning data node verbatim (spec §4.4 "catalog is not
    /// modified").
    async fn dispatch_alter(
        &self,
        acct: &str,
        entity: Entity,
        msg: AlterTableMsg,
        engine: &SchemaEngine<'_>,
    ) -> MnodeResult<()> {
        let missing_arg = || MnodeError::AppError("missing argument for alter operation".to_string());

        match (entity, msg.alter) {
            (Entity::Super(s), AlterKind::AddTag) => {
                let (name, ty, bytes) = msg.schema_entry.ok_or_else(missing_arg)?;
                engine.add_tags(acct, s, vec![(name, ty, bytes)]).await?;
                Ok(())
            }
            (Entity::Super(s), AlterKind::DropTag) => {
                let idx = msg.tag_index.ok_or_else(missing_arg)?;
                engine.drop_tag(s, idx).await?;
                Ok(())
            }
            (Entity::Super(s), AlterKind::RenameTag) => {
                let idx = msg.tag_index.ok_or_else(missing_arg)?;
                let (new_name, _, _) = msg.schema_entry.ok_or_else(missing_arg)?;
                engine.rename_tag(s, idx, new_name).await?;
                Ok(())
            }
            (Entity::Super(s), AlterKind::AddColumn) => {
                let (name, ty, bytes) = msg.schema_entry.ok_or_else(missing_arg)?;
                engine.add_super_columns(acct, s, vec![(name, ty, bytes)]).await?;
                Ok(())
            }
            (Entity::Super(s), AlterKind::DropColumn) => {
                let idx = msg.column_index.ok_or_else(missing_arg)?;
                engine.drop_super_column(acct, s, idx).await?;
                Ok(())
            }
            (Entity::Child(t), AlterKind::AddColumn) if t.own_schema().is_some() => {
                let (name, ty, bytes) = msg.schema_entry.ok_or_else(missing_arg)?;
                engine.add_normal_columns(acct, t, vec![(name, ty, bytes)]).await?;
                Ok(())
            }
            (Entity::Child(t), AlterKind::DropColumn) if t.own_schema().is_some() => {
                let idx = msg.column_index.ok_or_else(missing_arg)?;
                engine.drop_normal_column(acct, t, idx).await?;
                Ok(())
            }
            (Entity::Child(t), AlterKind::UpdateTagValue) if t.own_schema().is_none() => {
                self.dispatch_update_tag_value(t, msg.tag_value.ok_or_else(missing_arg)?).await
            }
            _ => Err(MnodeError::OpsNotSupport(format!("{:?}", msg.alter))),
        }
    }

    async fn dispatch_update_tag_value(&self, t: ChildTable, tag_value: Vec<u8>) -> MnodeResult<()> {
        self.data_node
            .update_tag_value(MdUpdateTagValue {
                table_id: t.table_id().clone(),
                vg_id: t.vg_id,
                sid: t.sid,
                uid: t.uid,
                tag_value,
            })
            .await
    }
}

/// Builds a `CreateTableKind::Child` request directly, for callers that
/// already have both ids resolved and want to bypass `CreateTableMsg`
/// entirely (spec §4.5 step 1, step 4; `classify_create` is the
/// `CreateTableMsg`-based counterpart).
pub fn child_create_request(table_id: TableId, super_table_id: TableId, ig_exists: bool) -> CreateTableRequest {
    CreateTableRequest {
        table_id,
        ig_exists,
        kind: CreateTableKind::Child { super_table_id },
    }
}

/// Convenience for building a super-table schema entry tuple from request
/// fields, used by binaries/tests assembling `AlterTableMsg`s.
pub fn schema_entry(name: impl Into<String>, ty: ColumnType, bytes: i32) -> (String, ColumnType, i32) {
    (name.into(), ty, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::MetaOpts;
    use crate::model::SchemaColumn;
    use crate::placement::AlwaysAckDataNode;

    fn dispatcher() -> Dispatcher {
        let env = Arc::new(MetaSrvEnv::for_test());
        let (shell_queue, _rx) = ChannelShellQueue::new();
        Dispatcher::new(
            env,
            Arc::new(AlwaysAckDataNode),
            shell_queue,
            NetworkConfig { public_ip: 0 },
        )
    }

    fn conn() -> ConnInfo {
        ConnInfo { server_ip: 0 }
    }

    fn super_create_msg() -> CreateTableMsg {
        CreateTableMsg {
            table_id: TableId::new("a.db1.weather").unwrap(),
            columns: vec![SchemaColumn::new(0, "ts", ColumnType::Timestamp, 8)],
            tags: vec![SchemaColumn::new(0, "loc", ColumnType::Binary, 16)],
            super_table_id: None,
            tag_payload: Vec::new(),
            sql: None,
            ig_exists: false,
        }
    }

    fn child_create_msg() -> CreateTableMsg {
        CreateTableMsg {
            table_id: TableId::new("a.db1.paris").unwrap(),
            columns: Vec::new(),
            tags: Vec::new(),
            super_table_id: Some(TableId::new("a.db1.weather").unwrap()),
            tag_payload: vec![9, 9],
            sql: None,
            ig_exists: false,
        }
    }

    #[tokio::test]
    async fn create_super_then_child_then_meta() {
        let d = dispatcher();
        let super_reply = d.create_table(super_create_msg()).await;
        assert!(matches!(super_reply, Outcome::Response(Ok(_))));

        let child_reply = d.create_table(child_create_msg()).await;
        match child_reply {
            Outcome::Response(Ok(reply)) => {
                assert!(matches!(reply.created, Some(CreatedTable::Child(_))))
            }
            other => panic!("expected child create to succeed, got {other:?}"),
        }

        let meta = d
            .table_info(
                conn(),
                TableInfoMsg {
                    table_id: TableId::new("a.db1.paris").unwrap(),
                    create_flag: false,
                    super_table_id: None,
                    tags: Vec::new(),
                },
            )
            .await;
        match meta {
            Outcome::Response(Ok(TableInfoOutcome::Meta(m))) => {
                assert_eq!(m.stable_id.unwrap().as_str(), "a.db1.weather");
            }
            other => panic!("expected meta, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn table_info_missing_without_create_flag_is_invalid() {
        let d = dispatcher();
        let outcome = d
            .table_info(
                conn(),
                TableInfoMsg {
                    table_id: TableId::new("a.db1.missing").unwrap(),
                    create_flag: false,
                    super_table_id: None,
                    tags: Vec::new(),
                },
            )
            .await;
        assert!(matches!(
            outcome,
            Outcome::Response(Err(MnodeError::InvalidTable(_)))
        ));
    }

    #[tokio::test]
    async fn table_info_missing_with_create_flag_defers_to_shell_queue() {
        let env = Arc::new(MetaSrvEnv::for_test());
        let (shell_queue, mut rx) = ChannelShellQueue::new();
        let d = Dispatcher::new(
            env,
            Arc::new(AlwaysAckDataNode),
            shell_queue,
            NetworkConfig { public_ip: 0 },
        );
        let outcome = d
            .table_info(
                conn(),
                TableInfoMsg {
                    table_id: TableId::new("a.db1.paris").unwrap(),
                    create_flag: true,
                    super_table_id: Some(TableId::new("a.db1.weather").unwrap()),
                    tags: vec![1, 2, 3],
                },
            )
            .await;
        assert!(matches!(
            outcome,
            Outcome::Response(Ok(TableInfoOutcome::Deferred))
        ));
        let synthesized = rx.try_recv().unwrap();
        assert_eq!(synthesized.table_id.as_str(), "a.db1.paris");
        assert_eq!(synthesized.tag_payload, vec![1, 2, 3]);
        assert_eq!(
            synthesized.super_table_id.unwrap().as_str(),
            "a.db1.weather"
        );
    }

    #[tokio::test]
    async fn non_master_redirects_mutating_requests() {
        let mut env = MetaSrvEnv::for_test();
        env.opts.is_master = false;
        let (shell_queue, _rx) = ChannelShellQueue::new();
        let d = Dispatcher::new(
            Arc::new(env),
            Arc::new(AlwaysAckDataNode),
            shell_queue,
            NetworkConfig { public_ip: 0 },
        );
        let outcome = d.create_table(super_create_msg()).await;
        assert!(matches!(outcome, Outcome::Redirect));
    }

    #[tokio::test]
    async fn alter_without_write_authority_is_rejected() {
        let d = dispatcher();
        d.create_table(super_create_msg()).await;

        let outcome = d
            .alter_table(AlterTableMsg {
                table_id: TableId::new("a.db1.weather").unwrap(),
                alter: AlterKind::AddTag,
                schema_entry: Some(("alt".to_string(), ColumnType::Int, 4)),
                tag_index: None,
                column_index: None,
                tag_value: None,
                has_write_authority: false,
            })
            .await;
        assert!(matches!(
            outcome,
            Outcome::Response(Err(MnodeError::NoRights(_)))
        ));
    }

    #[tokio::test]
    async fn alter_add_tag_bumps_schema_version() {
        let d = dispatcher();
        d.create_table(super_create_msg()).await;

        let outcome = d
            .alter_table(AlterTableMsg {
                table_id: TableId::new("a.db1.weather").unwrap(),
                alter: AlterKind::AddTag,
                schema_entry: Some(("alt".to_string(), ColumnType::Int, 4)),
                tag_index: None,
                column_index: None,
                tag_value: None,
                has_write_authority: true,
            })
            .await;
        assert!(matches!(outcome, Outcome::Response(Ok(_))));
        let s = d.env.registry.get_super("a.db1.weather").await.unwrap();
        assert_eq!(s.num_tags, 2);
        assert_eq!(s.schema_version, 1);
    }

    #[tokio::test]
    async fn stable_vgroup_lists_child_vgroups() {
        let d = dispatcher();
        d.create_table(super_create_msg()).await;
        d.create_table(child_create_msg()).await;

        let outcome = d
            .stable_vgroup(STableVgroupMsg {
                table_id: TableId::new("a.db1.weather").unwrap(),
            })
            .await;
        match outcome {
            Outcome::Response(Ok(reply)) => assert_eq!(reply.vg_ids.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }
}
