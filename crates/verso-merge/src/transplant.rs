//! Replay selected commits onto a branch.

use tracing::debug;
use verso_commit::CommitLogic;
use verso_index::IndexesLogic;
use verso_refs::NamedRef;
use verso_types::ObjId;

use crate::error::{MergeError, MergeOpResult};
use crate::merge::MergeLogic;
use crate::plan::{PlannedCommit, Planner, SourceChange};
use crate::types::{MergeOptions, MergeResult};

impl MergeLogic<'_> {
    /// Re-apply each of `commits`, in the given order, as a new commit on
    /// `target`. Each replayed commit keeps its metadata; commits whose
    /// changes are already present on the target produce nothing.
    ///
    /// Every key is decided before anything is written, so a conflict
    /// leaves the target untouched.
    pub fn transplant(
        &self,
        commits: &[ObjId],
        target: &NamedRef,
        options: &MergeOptions,
    ) -> MergeOpResult<MergeResult> {
        if commits.is_empty() {
            return Err(MergeError::NothingToTransplant);
        }
        let (reference, head) = self.resolve_target(target, options)?;
        let mut result = MergeResult::new(target.clone(), reference.pointer, options.expected_hash);
        result.source_commits = commits.to_vec();

        let logic = CommitLogic::new(self.persist);
        let indexes = IndexesLogic::new(self.persist);
        let mut planner = Planner::new(IndexesLogic::new(self.persist), head.as_ref(), options);
        let mut planned = Vec::with_capacity(commits.len());
        for commit in self.persist.fetch_commits(commits)? {
            let parent = logic.fetch_commit(commit.parent())?;
            let changes = SourceChange::from_commit(&indexes, parent.as_ref(), &commit)?;
            let operations = planner.plan(changes)?;
            debug!(
                commit = %commit.id.short_hex(),
                operations = operations.len(),
                "planned transplant"
            );
            planned.push(PlannedCommit {
                meta: commit.meta,
                secondary_parents: Vec::new(),
                operations,
            });
        }
        let details = std::mem::take(&mut planner.details);
        self.finish(reference, details, planned, result, options)
    }
}
