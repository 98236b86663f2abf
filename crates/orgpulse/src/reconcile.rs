//! Publish-or-update reconciliation for one table.
//!
//! The engine's contract is identity preservation: once a table exists, its
//! item id must survive every refresh, because dashboards reference tables
//! by id. The only identity-changing path is delete-then-recreate, and it
//! is reachable solely through an explicit recovery decision.

use std::io::{BufRead, Write};
use std::time::Duration;

use snafu::prelude::*;
use tracing::{error, info, warn};

use orgpulse_core::{Dataset, SessionContext};

use crate::batch;
use crate::config::{FailurePolicy, PublishConfig};
use crate::error::{CreatePublishSnafu, CreateStagingSnafu, DeleteExistingSnafu, PublishError};
use crate::locate::find_table;
use crate::portal::{
    FolderKey, ItemPropertyUpdate, PublishParameters, SinkItem, TableSink,
};
use crate::staging::{
    create_staging_artifact, find_staging_artifact, staging_name, update_staging_artifact,
};

/// What the engine did with one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Published {
    /// Empty dataset; nothing was written and nothing existing was touched.
    Nothing,
    /// Existing table refreshed in place, id unchanged.
    Updated { id: String },
    /// No table existed; a fresh one was published.
    Created { id: String },
    /// Operator-approved delete and republish; the id changed.
    Recreated { id: String },
    /// Refresh failed and the stale table was kept; the run is marked failed.
    Aborted { id: String },
    /// Refresh failed and the stale table was kept; the run continues.
    Stale { id: String },
}

impl Published {
    pub fn item_id(&self) -> Option<&str> {
        match self {
            Published::Nothing => None,
            Published::Updated { id }
            | Published::Created { id }
            | Published::Recreated { id }
            | Published::Aborted { id }
            | Published::Stale { id } => Some(id),
        }
    }

    /// Whether this outcome should fail the overall run.
    pub fn is_failure(&self) -> bool {
        matches!(self, Published::Aborted { .. })
    }
}

/// How to proceed when the in-place refresh chain is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryDecision {
    /// Delete the stale table and publish a fresh one. Changes the item id.
    Recreate,
    /// Keep the stale table and mark the run failed.
    Abort,
    /// Keep the stale table and continue the run.
    Skip,
}

/// Facts presented to the recovery decision.
#[derive(Debug, Clone)]
pub struct RecoveryContext {
    pub table: String,
    pub item_id: String,
    pub rows: usize,
    /// Which refresh steps failed and how.
    pub detail: String,
}

/// Decision point reached when an existing table cannot be refreshed.
pub trait RecoveryPolicy: Send + Sync {
    fn decide(&self, ctx: &RecoveryContext) -> RecoveryDecision;
}

/// Interactive policy: blocks on stdin until the operator answers.
///
/// Re-prompts on unrecognized input and never times out, so an unattended
/// run configured with this policy will hang here.
pub struct ConsolePrompt;

impl ConsolePrompt {
    fn decide_from(
        &self,
        ctx: &RecoveryContext,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
    ) -> RecoveryDecision {
        let banner = format!(
            "Table '{}' (id {}) could not be refreshed in place.\n\
             {}\n\
             Likely causes:\n\
             - staging file '{}' is missing from your content\n\
             - schema changed since the original publish (columns added, removed, or retyped)\n\
             - editing is disabled on the service, or you lack edit permission on it\n\
             - the service is locked by another process; waiting and retrying may clear it\n\
             Recreating it will CHANGE the item id and break dashboard references.\n",
            ctx.table,
            ctx.item_id,
            ctx.detail,
            staging_name(&ctx.table),
        );
        if output.write_all(banner.as_bytes()).is_err() {
            return RecoveryDecision::Abort;
        }
        loop {
            if output
                .write_all(b"Delete and recreate? [yes/no/skip]: ")
                .and_then(|_| output.flush())
                .is_err()
            {
                return RecoveryDecision::Abort;
            }
            let mut line = String::new();
            match input.read_line(&mut line) {
                Ok(0) | Err(_) => {
                    warn!(table = %ctx.table, "no operator input available, keeping existing table");
                    return RecoveryDecision::Abort;
                }
                Ok(_) => match line.trim().to_lowercase().as_str() {
                    "yes" | "y" => return RecoveryDecision::Recreate,
                    "no" | "n" => return RecoveryDecision::Abort,
                    "skip" | "s" => return RecoveryDecision::Skip,
                    _ => continue,
                },
            }
        }
    }
}

impl RecoveryPolicy for ConsolePrompt {
    fn decide(&self, ctx: &RecoveryContext) -> RecoveryDecision {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        self.decide_from(ctx, &mut stdin.lock(), &mut stdout.lock())
    }
}

/// Fixed answer for unattended runs.
pub struct AutoPolicy {
    decision: RecoveryDecision,
}

impl AutoPolicy {
    pub fn new(decision: RecoveryDecision) -> Self {
        AutoPolicy { decision }
    }
}

impl RecoveryPolicy for AutoPolicy {
    fn decide(&self, ctx: &RecoveryContext) -> RecoveryDecision {
        info!(table = %ctx.table, decision = ?self.decision, "applying configured recovery decision");
        self.decision
    }
}

/// Policy implementation for a configured failure mode.
pub fn policy_for(policy: FailurePolicy) -> Box<dyn RecoveryPolicy> {
    match policy {
        FailurePolicy::Prompt => Box::new(ConsolePrompt),
        FailurePolicy::Abort => Box::new(AutoPolicy::new(RecoveryDecision::Abort)),
        FailurePolicy::Skip => Box::new(AutoPolicy::new(RecoveryDecision::Skip)),
        FailurePolicy::Recreate => Box::new(AutoPolicy::new(RecoveryDecision::Recreate)),
    }
}

/// Drives publish-or-update for the report tables.
pub struct Reconciler<'a> {
    sink: &'a dyn TableSink,
    session: SessionContext,
    config: &'a PublishConfig,
    policy: &'a dyn RecoveryPolicy,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        sink: &'a dyn TableSink,
        session: SessionContext,
        config: &'a PublishConfig,
        policy: &'a dyn RecoveryPolicy,
    ) -> Self {
        Reconciler {
            sink,
            session,
            config,
            policy,
        }
    }

    async fn propagation_pause(&self) {
        tokio::time::sleep(Duration::from_secs(self.config.pacing.propagation_secs)).await;
    }

    /// Reconcile one table with `dataset`.
    ///
    /// An existing table is refreshed in place; a missing one is published
    /// fresh. An empty dataset is a no-op so a source outage can never wipe
    /// a live dashboard table.
    pub async fn publish_or_update(
        &self,
        table: &str,
        dataset: &Dataset,
        folder: &str,
        description: &str,
    ) -> Result<Published, PublishError> {
        if dataset.is_empty() {
            warn!(%table, "dataset is empty, leaving any existing table untouched");
            return Ok(Published::Nothing);
        }

        match find_table(self.sink, &self.session, table).await {
            Some(existing) => {
                info!(%table, id = %existing.id, "table exists, refreshing in place");
                match self.refresh(&existing, table, dataset, folder).await {
                    Ok(()) => Ok(Published::Updated { id: existing.id }),
                    Err(detail) => self.recover(&existing, table, dataset, folder, description, detail).await,
                }
            }
            None => {
                info!(%table, "no existing table, publishing fresh");
                let id = self.create(table, dataset, folder, description).await?;
                Ok(Published::Created { id })
            }
        }
    }

    /// Identity-preserving refresh: clear rows, refresh the staging
    /// artifact, bulk-append, and fall back to batched inserts when the
    /// append does not clearly succeed.
    ///
    /// Returns a human-readable failure description on the error path; the
    /// caller turns that into a recovery decision.
    async fn refresh(
        &self,
        existing: &SinkItem,
        table: &str,
        dataset: &Dataset,
        folder: &str,
    ) -> Result<(), String> {
        if let Err(error) = self.sink.delete_all_rows(&existing.id).await {
            warn!(%table, %error, "could not clear existing rows");
            return Err(format!("row deletion failed: {error}"));
        }
        self.propagation_pause().await;

        let artifact = match find_staging_artifact(self.sink, &self.session, table).await {
            Some(artifact) => {
                if let Err(error) = update_staging_artifact(self.sink, &artifact, dataset).await {
                    warn!(%table, %error, "could not refresh staging artifact");
                    return Err(format!("staging refresh failed: {error}"));
                }
                artifact
            }
            None => {
                info!(%table, "staging artifact missing, recreating it");
                match create_staging_artifact(self.sink, table, dataset, Some(folder)).await {
                    Ok(artifact) => artifact,
                    Err(error) => {
                        warn!(%table, %error, "could not recreate staging artifact");
                        return Err(format!("staging recreation failed: {error}"));
                    }
                }
            }
        };

        match self.sink.append_from_item(&existing.id, &artifact.id).await {
            Ok(Some(true)) => {
                info!(%table, id = %existing.id, rows = dataset.len(), "bulk append succeeded");
                return Ok(());
            }
            Ok(Some(false)) => warn!(%table, "bulk append reported failure"),
            Ok(None) => warn!(%table, "bulk append result ambiguous, not trusting it"),
            Err(error) => warn!(%table, %error, "bulk append errored"),
        }

        info!(%table, "falling back to batched row inserts");
        let report = batch::insert_all(self.sink, &existing.id, dataset, self.config).await;
        if report.succeeded() {
            if report.inserted < report.attempted {
                warn!(
                    %table,
                    inserted = report.inserted,
                    attempted = report.attempted,
                    "partial batch insert, keeping the refresh"
                );
            }
            Ok(())
        } else {
            Err(format!(
                "bulk append and batched insert both failed ({} of {} rows written)",
                report.inserted, report.attempted
            ))
        }
    }

    async fn recover(
        &self,
        existing: &SinkItem,
        table: &str,
        dataset: &Dataset,
        folder: &str,
        description: &str,
        detail: String,
    ) -> Result<Published, PublishError> {
        let ctx = RecoveryContext {
            table: table.to_string(),
            item_id: existing.id.clone(),
            rows: dataset.len(),
            detail,
        };
        match self.policy.decide(&ctx) {
            RecoveryDecision::Recreate => {
                warn!(%table, old_id = %existing.id, "recreating table, item id will change");
                self.sink
                    .delete_item(&existing.id)
                    .await
                    .context(DeleteExistingSnafu {
                        table: table.to_string(),
                        id: existing.id.clone(),
                    })?;
                self.propagation_pause().await;
                let id = self.create(table, dataset, folder, description).await?;
                Ok(Published::Recreated { id })
            }
            RecoveryDecision::Abort => {
                error!(%table, id = %existing.id, "keeping stale table, marking run failed");
                Ok(Published::Aborted {
                    id: existing.id.clone(),
                })
            }
            RecoveryDecision::Skip => {
                warn!(%table, id = %existing.id, "keeping stale table, continuing");
                Ok(Published::Stale {
                    id: existing.id.clone(),
                })
            }
        }
    }

    /// Publish a fresh table. Acceptable only when none exists (or identity
    /// change was explicitly approved).
    async fn create(
        &self,
        table: &str,
        dataset: &Dataset,
        folder: &str,
        description: &str,
    ) -> Result<String, PublishError> {
        // A recreate leaves the previous run's artifact behind; reuse it so
        // the sink never accumulates duplicates.
        let artifact = match find_staging_artifact(self.sink, &self.session, table).await {
            Some(existing) => {
                update_staging_artifact(self.sink, &existing, dataset)
                    .await
                    .context(CreateStagingSnafu {
                        table: table.to_string(),
                    })?;
                existing
            }
            None => create_staging_artifact(self.sink, table, dataset, Some(folder))
                .await
                .context(CreateStagingSnafu {
                    table: table.to_string(),
                })?,
        };

        let analyzed = match self.sink.analyze_csv(&artifact.id).await {
            Ok(parameters) => Some(parameters),
            Err(error) => {
                warn!(%table, %error, "analyze failed, publishing with defaults");
                None
            }
        };

        let params = PublishParameters::table(table, analyzed).with_schema(dataset.columns());
        let published = self
            .sink
            .publish_table(&artifact.id, &params)
            .await
            .context(CreatePublishSnafu {
                table: table.to_string(),
            })?;
        info!(%table, id = %published.id, rows = dataset.len(), "published hosted table");

        let update = ItemPropertyUpdate {
            title: Some(table.to_string()),
            description: Some(description.to_string()),
            snippet: None,
        };
        if let Err(error) = self.sink.update_item_properties(&published.id, &update).await {
            warn!(%table, %error, "could not set table properties");
        }

        self.relocate(&published.id, table, folder).await;
        self.share(&published.id, table).await;
        Ok(published.id)
    }

    /// Move a published table into the output folder.
    ///
    /// Sinks differ in which folder addressing they accept, so three
    /// strategies run in order; a table left at the root is only a
    /// cosmetic defect.
    async fn relocate(&self, id: &str, table: &str, folder: &str) {
        match self.sink.move_item(id, &FolderKey::Name(folder.to_string())).await {
            Ok(()) => return,
            Err(error) => warn!(%table, %folder, %error, "move by folder name failed"),
        }

        if self.sink.ensure_folder(folder).await.is_ok() {
            match self.sink.move_item(id, &FolderKey::Name(folder.to_string())).await {
                Ok(()) => return,
                Err(error) => warn!(%table, %folder, %error, "move after folder creation failed"),
            }
        }

        match self.sink.find_folder(folder).await {
            Ok(Some(folder_id)) => {
                if let Err(error) = self.sink.move_item(id, &FolderKey::Id(folder_id)).await {
                    warn!(%table, %folder, %error, "move by folder id failed, leaving at root");
                }
            }
            Ok(None) => warn!(%table, %folder, "folder not found, leaving table at root"),
            Err(error) => warn!(%table, %folder, %error, "folder lookup failed, leaving table at root"),
        }
    }

    async fn share(&self, id: &str, table: &str) {
        if let Err(error) = self.sink.share_org(id).await {
            warn!(%table, %error, "org share failed, trying legacy call");
            if let Err(error) = self.sink.share_org_legacy(id).await {
                warn!(%table, %error, "legacy org share also failed");
            }
        }
    }
}
