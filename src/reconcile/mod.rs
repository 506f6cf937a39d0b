//! Batch reconciliation.
//!
//! A [`Reconciler`] takes a batch of content units, partitions it into
//! lookup groups, queries the providers for every group concurrently, merges
//! the answers field by field and verifies season completeness. Records are
//! written only once every group of the batch has been accepted: a single
//! verification failure cancels the remaining work and nothing is committed.
//!
//! # Module layout
//!
//! - [`group`] -- Partitioning of units into lookup groups.
//! - [`harvest`] -- Provider calls for one group.
//! - [`verify`] -- Episode completeness check.
//! - [`store`] -- Record persistence.

pub mod group;
pub mod harvest;
pub mod store;
pub mod verify;

use std::path::PathBuf;
use std::sync::Arc;

use tapedeck_common::{ContentUnit, EpisodeNumber, GroupKey};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use self::group::{group_units, GroupError, LookupGroup};
use self::harvest::harvest;
use self::store::{GroupCommit, RecordStore};
use self::verify::{verify, MissingEpisodeReport, UnlistedEpisodePolicy, Verdict};
use crate::config::Config;
use crate::metadata::client::{CallPolicy, ProviderClient};
use crate::metadata::fields::FieldScope;
use crate::metadata::merge::{MergeResolver, MergedRecord};
use crate::metadata::registry::ProviderRegistry;

pub use self::store::SqliteRecordStore;

/// Failures that end a run.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// A season failed verification. `path` is where the report was
    /// written, `None` if writing it failed.
    #[error("verification failed for {report}")]
    VerificationMismatch {
        report: Box<MissingEpisodeReport>,
        path: Option<PathBuf>,
    },

    #[error(transparent)]
    Grouping(#[from] GroupError),

    #[error("record store failure: {0}")]
    Store(#[from] tapedeck_common::Error),

    #[error("group task failed: {0}")]
    Task(String),
}

/// Run settings.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Maximum number of groups in flight.
    pub fan_out: usize,
    pub on_unlisted_local: UnlistedEpisodePolicy,
    pub report_path: PathBuf,
    /// Merge and verify without writing records.
    pub dry_run: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            fan_out: 4,
            on_unlisted_local: UnlistedEpisodePolicy::default(),
            report_path: PathBuf::from("missingepisodes.txt"),
            dry_run: false,
        }
    }
}

impl ReconcileOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fan_out: config.reconcile.fan_out,
            on_unlisted_local: config.verification.on_unlisted_local,
            report_path: config.verification.report_path.clone(),
            dry_run: config.reconcile.dry_run,
        }
    }
}

/// What a successful run did.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub groups: usize,
    pub units: usize,
    /// Final records per group, in group key order. Written unless dry run.
    pub commits: Vec<GroupCommit>,
    pub committed: bool,
    /// Seasons accepted without a remote listing.
    pub unverified: Vec<GroupKey>,
    /// Seasons accepted with local episodes the listing lacks.
    pub unlisted: Vec<(GroupKey, Vec<EpisodeNumber>)>,
}

/// A group that passed verification, before upgrade against stored records.
struct AcceptedGroup {
    key: GroupKey,
    group: MergedRecord,
    units: Vec<(ContentUnit, MergedRecord)>,
    verdict: Verdict,
}

enum GroupResult {
    Accepted(AcceptedGroup),
    Rejected(MissingEpisodeReport),
    Cancelled,
}

/// Drives reconciliation of a batch against the configured providers.
pub struct Reconciler {
    clients: Arc<Vec<ProviderClient>>,
    resolver: Arc<MergeResolver>,
    store: Arc<dyn RecordStore>,
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(
        registry: &ProviderRegistry,
        resolver: MergeResolver,
        store: Arc<dyn RecordStore>,
        call_policy: CallPolicy,
        options: ReconcileOptions,
    ) -> Self {
        registry.check_policy(resolver.policy());
        let clients = registry
            .available()
            .into_iter()
            .map(|provider| ProviderClient::new(provider, call_policy))
            .collect();
        Self {
            clients: Arc::new(clients),
            resolver: Arc::new(resolver),
            store,
            options,
        }
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Reconcile one batch.
    ///
    /// Either every group is accepted and (unless dry run) committed in
    /// group key order, or nothing is written.
    pub async fn run(&self, units: &[ContentUnit]) -> Result<RunSummary, ReconcileError> {
        let groups = group_units(units)?;
        info!(
            groups = groups.len(),
            units = units.len(),
            providers = self.clients.len(),
            dry_run = self.options.dry_run,
            "Starting reconciliation"
        );

        let mut accepted = self.process_groups(groups).await?;
        accepted.sort_by(|a, b| a.key.cmp(&b.key));

        let mut summary = RunSummary {
            groups: accepted.len(),
            units: units.len(),
            ..RunSummary::default()
        };

        for group in accepted {
            match &group.verdict {
                Verdict::Unverified => summary.unverified.push(group.key.clone()),
                Verdict::UnlistedLocal { extra } => {
                    summary.unlisted.push((group.key.clone(), extra.clone()))
                }
                Verdict::Complete | Verdict::NotApplicable => {}
            }
            summary.commits.push(self.finalize(group)?);
        }

        if self.options.dry_run {
            info!(groups = summary.groups, "Dry run, no records written");
            return Ok(summary);
        }

        for commit in &summary.commits {
            self.store.commit_group(commit)?;
            debug!(group = %commit.key, units = commit.units.len(), "Committed group");
        }
        summary.committed = true;
        info!(groups = summary.groups, units = summary.units, "Reconciliation committed");

        Ok(summary)
    }

    async fn process_groups(
        &self,
        groups: Vec<LookupGroup>,
    ) -> Result<Vec<AcceptedGroup>, ReconcileError> {
        let cancel = CancellationToken::new();
        let semaphore = Arc::new(Semaphore::new(self.options.fan_out.max(1)));
        let mut tasks = JoinSet::new();

        for group in groups {
            let stored = self.store.load_group(&group.key)?;
            let clients = Arc::clone(&self.clients);
            let resolver = Arc::clone(&self.resolver);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let policy = self.options.on_unlisted_local;

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return GroupResult::Cancelled;
                };
                if cancel.is_cancelled() {
                    return GroupResult::Cancelled;
                }
                tokio::select! {
                    _ = cancel.cancelled() => GroupResult::Cancelled,
                    result = reconcile_group(&clients, &resolver, group, stored, policy) => match result {
                        Ok(group) => GroupResult::Accepted(group),
                        Err(report) => GroupResult::Rejected(report),
                    },
                }
            });
        }

        let mut accepted = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(GroupResult::Accepted(group)) => accepted.push(group),
                Ok(GroupResult::Cancelled) => {}
                Ok(GroupResult::Rejected(report)) => {
                    cancel.cancel();
                    tasks.abort_all();
                    let path = self.write_report(&report);
                    return Err(ReconcileError::VerificationMismatch {
                        report: Box::new(report),
                        path,
                    });
                }
                Err(e) => {
                    cancel.cancel();
                    tasks.abort_all();
                    return Err(ReconcileError::Task(e.to_string()));
                }
            }
        }

        Ok(accepted)
    }

    fn write_report(&self, report: &MissingEpisodeReport) -> Option<PathBuf> {
        let path = &self.options.report_path;
        match report.write_to(path) {
            Ok(()) => {
                error!(
                    series = %report.series,
                    season = report.season,
                    missing = report.missing.len(),
                    unlisted = report.unlisted.len(),
                    report = %path.display(),
                    "Episode verification failed, halting run"
                );
                Some(path.clone())
            }
            Err(e) => {
                error!(
                    report = %path.display(),
                    error = %e,
                    "Episode verification failed and the report could not be written"
                );
                None
            }
        }
    }

    /// Upgrade an accepted group against the store and propagate group fields.
    fn finalize(&self, accepted: AcceptedGroup) -> Result<GroupCommit, ReconcileError> {
        let kind = accepted.key.entity_kind();

        let stored_group = self.store.load_group(&accepted.key)?.unwrap_or_default();
        let group = self.resolver.upgrade(kind, &stored_group, &accepted.group);

        let mut units = Vec::with_capacity(accepted.units.len());
        for (unit, fresh) in accepted.units {
            let stored = self.store.load_unit(&unit.checksum)?.unwrap_or_default();
            let mut record = self.resolver.upgrade(kind, &stored, &fresh);
            record.propagate(&group);
            units.push((unit, record));
        }

        Ok(GroupCommit {
            key: accepted.key,
            group,
            units,
        })
    }
}

/// Harvest, merge and verify one group.
///
/// `stored` is the group's record from an earlier run; its catalog ids are
/// fetched directly instead of searched.
async fn reconcile_group(
    clients: &[ProviderClient],
    resolver: &MergeResolver,
    group: LookupGroup,
    stored: Option<MergedRecord>,
    policy: UnlistedEpisodePolicy,
) -> Result<AcceptedGroup, MissingEpisodeReport> {
    let harvest = harvest(clients, &group, stored.as_ref()).await;
    let kind = group.entity_kind();
    let label = group.key.to_string();

    let group_record = resolver.merge(&label, kind, FieldScope::Group, &harvest.group);
    let units = group
        .members
        .iter()
        .map(|unit| {
            let specific = harvest.specific_for(&unit.checksum, unit.episode_number());
            let record = resolver.merge_layered(
                unit.checksum.as_str(),
                kind,
                FieldScope::Unit,
                &[&specific, &harvest.group],
            );
            (unit.clone(), record)
        })
        .collect();

    let verdict = verify(&group, harvest.listing(), policy)?;
    match &verdict {
        Verdict::Complete => debug!(group = %group.key, "Season complete"),
        Verdict::UnlistedLocal { extra } => warn!(
            group = %group.key,
            extra = ?extra.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Local episodes missing from the remote listing, accepting"
        ),
        Verdict::Unverified => warn!(group = %group.key, "No remote listing, season not verified"),
        Verdict::NotApplicable => {}
    }

    Ok(AcceptedGroup {
        key: group.key,
        group: group_record,
        units,
        verdict,
    })
}
