//! Merge a source commit's history into a target branch.

use std::collections::BTreeMap;

use tracing::{debug, info};
use verso_commit::{check_expected_hash, fail_on_conflict, CommitLogic, CreateCommit};
use verso_dag::{common_ancestor, CommitLog};
use verso_diff::diff_commits;
use verso_index::IndexesLogic;
use verso_refs::{NamedRef, Reference, ReferenceLogic};
use verso_store::{CommitMeta, CommitObj, Persist};
use verso_types::{ContentKey, ObjId};

use crate::error::{MergeError, MergeOpResult};
use crate::plan::{PlannedCommit, Planner, SourceChange};
use crate::types::{KeyDetails, MergeMode, MergeOptions, MergeResult};

/// Merges and transplants onto branches of one backend.
pub struct MergeLogic<'a> {
    pub(crate) persist: &'a dyn Persist,
}

impl<'a> MergeLogic<'a> {
    pub fn new(persist: &'a dyn Persist) -> Self {
        Self { persist }
    }

    /// Merge everything reachable from `source` but not from `target` into
    /// `target`.
    ///
    /// - If `source` is already an ancestor of the target, nothing happens.
    /// - If the target head is the common ancestor, a squash merge only moves
    ///   the target to `source`.
    /// - Otherwise the changes since the common ancestor are replayed, as one
    ///   commit ([`MergeMode::Squash`]) or one per source commit
    ///   ([`MergeMode::Individual`]). The last produced commit records
    ///   `source` as a merge parent.
    pub fn merge(
        &self,
        source: ObjId,
        target: &NamedRef,
        options: &MergeOptions,
    ) -> MergeOpResult<MergeResult> {
        let (reference, head) = self.resolve_target(target, options)?;
        let mut result = MergeResult::new(target.clone(), reference.pointer, options.expected_hash);
        let ancestor = common_ancestor(self.persist, reference.pointer, source)?;
        result.common_ancestor = Some(ancestor);

        if ancestor == source {
            debug!(target = %target, source = %source.short_hex(), "source already merged");
            result.was_successful = true;
            result.resultant_target_hash = Some(reference.pointer);
            return Ok(result);
        }

        let source_commits = self.commits_since(source, ancestor)?;
        result.source_commits = source_commits.iter().map(|c| c.id).collect();

        if ancestor == reference.pointer
            && options.mode == MergeMode::Squash
            && options.resolutions.is_empty()
        {
            return self.fast_forward(&reference, source, result, options);
        }

        let indexes = IndexesLogic::new(self.persist);
        let commits = CommitLogic::new(self.persist);
        let mut planner = Planner::new(IndexesLogic::new(self.persist), head.as_ref(), options);
        let planned = match options.mode {
            MergeMode::Squash => {
                let base = commits.fetch_commit(ancestor)?;
                let tip = commits.fetch_commit(source)?;
                let diff = diff_commits(self.persist, base.as_ref(), tip.as_ref())?;
                let operations = planner.plan(SourceChange::from_diff(diff))?;
                let meta = match &options.meta {
                    Some(meta) => meta.clone(),
                    None => default_meta(tip.as_ref(), source, target),
                };
                vec![PlannedCommit {
                    meta,
                    secondary_parents: vec![source],
                    operations,
                }]
            }
            MergeMode::Individual => {
                let mut planned = Vec::with_capacity(source_commits.len());
                let mut parent = match source_commits.first() {
                    Some(first) => commits.fetch_commit(first.parent())?,
                    None => None,
                };
                for commit in source_commits {
                    let changes = SourceChange::from_commit(&indexes, parent.as_ref(), &commit)?;
                    planned.push(PlannedCommit {
                        meta: commit.meta.clone(),
                        secondary_parents: Vec::new(),
                        operations: planner.plan(changes)?,
                    });
                    parent = Some(commit);
                }
                if let Some(last) = planned.iter_mut().rev().find(|p| !p.operations.is_empty()) {
                    last.secondary_parents.push(source);
                }
                planned
            }
        };
        let details = std::mem::take(&mut planner.details);
        self.finish(reference, details, planned, result, options)
    }

    /// Check the target and read its head.
    pub(crate) fn resolve_target(
        &self,
        target: &NamedRef,
        options: &MergeOptions,
    ) -> MergeOpResult<(Reference, Option<CommitObj>)> {
        if !target.is_branch() {
            return Err(MergeError::NotABranch(target.clone()));
        }
        let reference = ReferenceLogic::new(self.persist).get(target)?;
        check_expected_hash(&reference, options.expected_hash)?;
        let head = CommitLogic::new(self.persist).fetch_commit(reference.pointer)?;
        Ok((reference, head))
    }

    /// Report the decisions, then unless this is a dry run or something
    /// conflicts, build and publish every non-empty planned commit.
    pub(crate) fn finish(
        &self,
        mut reference: Reference,
        details: BTreeMap<ContentKey, KeyDetails>,
        planned: Vec<PlannedCommit>,
        mut result: MergeResult,
        options: &MergeOptions,
    ) -> MergeOpResult<MergeResult> {
        result.details = details;
        result.was_successful = !result.has_conflicts();
        if !result.was_successful && !options.dry_run {
            debug!(
                target = %result.target_branch,
                conflicts = result.conflicts().count(),
                "merge conflicts"
            );
            return Err(MergeError::Conflict(Box::new(result)));
        }
        if options.dry_run {
            return Ok(result);
        }

        let commits = CommitLogic::new(self.persist);
        for plan in planned {
            if plan.operations.is_empty() {
                continue;
            }
            let create = CreateCommit {
                parent: reference.pointer,
                secondary_parents: plan.secondary_parents,
                meta: plan.meta,
                operations: plan.operations,
            };
            let built = commits.build_commit(&create, &mut fail_on_conflict)?;
            reference = commits.publish(&reference, &built)?;
            result.created_commits.push(built.commit.id);
        }
        result.was_applied = !result.created_commits.is_empty();
        result.resultant_target_hash = Some(reference.pointer);
        info!(
            target = %result.target_branch,
            commits = result.created_commits.len(),
            head = %reference.pointer.short_hex(),
            "merged"
        );
        Ok(result)
    }

    fn fast_forward(
        &self,
        reference: &Reference,
        source: ObjId,
        mut result: MergeResult,
        options: &MergeOptions,
    ) -> MergeOpResult<MergeResult> {
        let diff = CommitLogic::new(self.persist).diff(reference.pointer, source)?;
        for change in diff.changes {
            let key = change.key().clone();
            let details = KeyDetails {
                behavior: options.behavior_for(&key),
                conflict: None,
            };
            result.details.insert(key, details);
        }
        result.was_successful = true;
        if !options.dry_run {
            let moved = ReferenceLogic::new(self.persist).assign(reference, source)?;
            result.was_applied = true;
            result.resultant_target_hash = Some(moved.pointer);
            info!(target = %result.target_branch, head = %source.short_hex(), "fast-forwarded");
        }
        Ok(result)
    }

    /// First-parent history of `source` back to (excluding) `ancestor`,
    /// oldest first.
    fn commits_since(&self, source: ObjId, ancestor: ObjId) -> MergeOpResult<Vec<CommitObj>> {
        let mut commits = Vec::new();
        for commit in CommitLog::new(self.persist, source) {
            let commit = commit?;
            if commit.id == ancestor {
                break;
            }
            commits.push(commit);
        }
        commits.reverse();
        Ok(commits)
    }
}

fn default_meta(tip: Option<&CommitObj>, source: ObjId, target: &NamedRef) -> CommitMeta {
    let author = tip.map(|c| c.meta.author.clone()).unwrap_or_default();
    CommitMeta::new(
        author,
        format!("Merge {} into {}", source.short_hex(), target.short_name()),
    )
}
