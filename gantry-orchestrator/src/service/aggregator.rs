//! Status Aggregator
//!
//! Pure decision functions mapping a registry snapshot to what should
//! happen to the pipeline next.

use gantry_core::domain::build::BuildStatus;
use gantry_core::domain::pipeline::Pipeline;

use super::registry::RegistrySnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    EnterRunning,
    Succeed,
    Fail,
    NoOp,
}

/// React to the most recently updated build
///
/// A success only becomes `Succeed` when the full counts confirm that no
/// build is outstanding.
pub fn decide(pipeline: &Pipeline, snapshot: &RegistrySnapshot) -> Verdict {
    if pipeline.is_terminal() {
        return Verdict::NoOp;
    }

    let recent = snapshot.most_recent;
    match recent.status {
        BuildStatus::Success if snapshot.is_complete() => Verdict::Succeed,
        BuildStatus::Success => Verdict::NoOp,
        BuildStatus::Failed if recent.allow_failure => Verdict::NoOp,
        BuildStatus::Failed => Verdict::Fail,
        BuildStatus::Skipped | BuildStatus::Running => Verdict::EnterRunning,
        BuildStatus::Pending | BuildStatus::Cancelled => Verdict::NoOp,
    }
}

/// Full re-check independent of which build reported last
///
/// Catches completions whose triggering report did not itself indicate a
/// verdict, such as an allowed failure finishing last.
pub fn decide_sweep(pipeline: &Pipeline, snapshot: &RegistrySnapshot) -> Verdict {
    if pipeline.is_terminal() {
        return Verdict::NoOp;
    }

    if snapshot.blocking_failure_count > 0 {
        Verdict::Fail
    } else if snapshot.is_complete() {
        Verdict::Succeed
    } else {
        decide(pipeline, snapshot)
    }
}

/// Verdict for a status-update event
///
/// The per-build rule first; when it decides nothing, the full counts get
/// the final word so a completion is not left for the next sweep.
pub fn decide_event(pipeline: &Pipeline, snapshot: &RegistrySnapshot) -> Verdict {
    match decide(pipeline, snapshot) {
        Verdict::NoOp => decide_sweep(pipeline, snapshot),
        verdict => verdict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::registry::RecentBuild;
    use chrono::Utc;
    use gantry_core::domain::pipeline::PipelineStatus;

    fn pipeline(status: PipelineStatus) -> Pipeline {
        let now = Utc::now();
        Pipeline {
            id: 1,
            project_id: 1,
            ref_name: "main".to_string(),
            sha: "abc".to_string(),
            before_sha: None,
            tag: false,
            trigger_user_id: None,
            status,
            started_at: None,
            finished_at: None,
            duration: None,
            cascade_pending: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn snapshot(status: BuildStatus, allow_failure: bool, counts: (i64, i64, i64, i64)) -> RegistrySnapshot {
        let (success_count, allowed_failure_count, blocking_failure_count, total) = counts;
        RegistrySnapshot {
            most_recent: RecentBuild {
                build_id: Some(1),
                status,
                allow_failure,
            },
            success_count,
            allowed_failure_count,
            blocking_failure_count,
            total,
        }
    }

    #[test]
    fn test_decision_table() {
        let running = pipeline(PipelineStatus::Running);
        let cases = [
            (BuildStatus::Success, false, (3, 0, 0, 3), Verdict::Succeed),
            (BuildStatus::Failed, false, (0, 0, 1, 1), Verdict::Fail),
            (BuildStatus::Failed, true, (0, 1, 0, 2), Verdict::NoOp),
            (BuildStatus::Skipped, false, (0, 0, 0, 1), Verdict::EnterRunning),
            (BuildStatus::Running, false, (0, 0, 0, 1), Verdict::EnterRunning),
            (BuildStatus::Pending, false, (0, 0, 0, 1), Verdict::NoOp),
        ];

        for (status, allow_failure, counts, expected) in cases {
            assert_eq!(
                decide(&running, &snapshot(status, allow_failure, counts)),
                expected,
                "most recent build {status} (allow_failure: {allow_failure})"
            );
        }
    }

    #[test]
    fn test_success_degrades_while_builds_outstanding() {
        let running = pipeline(PipelineStatus::Running);
        let verdict = decide(&running, &snapshot(BuildStatus::Success, false, (1, 0, 0, 3)));
        assert_eq!(verdict, Verdict::NoOp);
    }

    #[test]
    fn test_success_counts_allowed_failures() {
        let running = pipeline(PipelineStatus::Running);
        let verdict = decide(&running, &snapshot(BuildStatus::Success, false, (2, 1, 0, 3)));
        assert_eq!(verdict, Verdict::Succeed);
    }

    #[test]
    fn test_no_builds_enters_running() {
        let pending = pipeline(PipelineStatus::Pending);
        let empty = RegistrySnapshot {
            most_recent: RecentBuild::NONE,
            success_count: 0,
            allowed_failure_count: 0,
            blocking_failure_count: 0,
            total: 0,
        };
        assert_eq!(decide(&pending, &empty), Verdict::EnterRunning);
        assert_eq!(decide_sweep(&pending, &empty), Verdict::EnterRunning);
    }

    #[test]
    fn test_terminal_pipeline_is_noop() {
        for status in [
            PipelineStatus::Success,
            PipelineStatus::Failed,
            PipelineStatus::Cancelled,
        ] {
            let done = pipeline(status);
            let failing = snapshot(BuildStatus::Failed, false, (0, 0, 1, 1));
            assert_eq!(decide(&done, &failing), Verdict::NoOp);
            assert_eq!(decide_sweep(&done, &failing), Verdict::NoOp);
        }
    }

    #[test]
    fn test_sweep_confirms_completion_after_allowed_failure() {
        let running = pipeline(PipelineStatus::Running);
        let last_allowed = snapshot(BuildStatus::Failed, true, (2, 1, 0, 3));

        assert_eq!(decide(&running, &last_allowed), Verdict::NoOp);
        assert_eq!(decide_sweep(&running, &last_allowed), Verdict::Succeed);
    }

    #[test]
    fn test_sweep_fails_on_earlier_blocking_failure() {
        let running = pipeline(PipelineStatus::Running);
        let masked = snapshot(BuildStatus::Pending, false, (1, 0, 1, 3));

        assert_eq!(decide(&running, &masked), Verdict::NoOp);
        assert_eq!(decide_sweep(&running, &masked), Verdict::Fail);
    }

    #[test]
    fn test_event_falls_back_to_full_counts() {
        let running = pipeline(PipelineStatus::Running);

        let last_allowed = snapshot(BuildStatus::Failed, true, (2, 1, 0, 3));
        assert_eq!(decide_event(&running, &last_allowed), Verdict::Succeed);

        let outstanding = snapshot(BuildStatus::Failed, true, (1, 1, 0, 3));
        assert_eq!(decide_event(&running, &outstanding), Verdict::NoOp);

        let done = pipeline(PipelineStatus::Success);
        assert_eq!(decide_event(&done, &last_allowed), Verdict::NoOp);
    }
}
