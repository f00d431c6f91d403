// src/pool/admission.rs

//! Admission policy for the reconciliation pass.
//!
//! Pure function over a snapshot of the pool so it can be tested (and
//! property-tested) without spawning anything.

use tracing::debug;

use crate::types::TaskStatus;

/// Snapshot of one pool entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    /// Creation order; lower is older.
    pub seq: u64,
    pub status: TaskStatus,
    /// Resolved source directory.
    pub source: String,
}

/// Names of waiting candidates to start now, oldest first.
///
/// Working candidates plus the ones admitted in this pass never exceed
/// `cap`, and no two of them share a source directory. A waiting candidate
/// that conflicts is skipped and stays eligible for the next pass.
pub fn admit(candidates: &[Candidate], cap: usize) -> Vec<String> {
    let mut busy: Vec<&str> = candidates
        .iter()
        .filter(|c| c.status == TaskStatus::Working)
        .map(|c| c.source.as_str())
        .collect();

    let mut waiting: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.status == TaskStatus::Waiting)
        .collect();
    waiting.sort_by_key(|c| c.seq);

    let mut admitted = Vec::new();
    for candidate in waiting {
        if busy.len() >= cap {
            break;
        }
        if busy.contains(&candidate.source.as_str()) {
            debug!(
                task = %candidate.name,
                source = %candidate.source,
                "source directory busy; task stays waiting"
            );
            continue;
        }
        busy.push(candidate.source.as_str());
        admitted.push(candidate.name.clone());
    }
    admitted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(name: &str, seq: u64, status: TaskStatus, source: &str) -> Candidate {
        Candidate {
            name: name.into(),
            seq,
            status,
            source: source.into(),
        }
    }

    #[test]
    fn admits_oldest_first_up_to_cap() {
        let pool = vec![
            cand("c", 3, TaskStatus::Waiting, "/c"),
            cand("a", 1, TaskStatus::Waiting, "/a"),
            cand("b", 2, TaskStatus::Waiting, "/b"),
        ];
        assert_eq!(admit(&pool, 2), vec!["a", "b"]);
    }

    #[test]
    fn working_tasks_count_against_cap() {
        let pool = vec![
            cand("a", 1, TaskStatus::Working, "/a"),
            cand("b", 2, TaskStatus::Waiting, "/b"),
        ];
        assert!(admit(&pool, 1).is_empty());
        assert_eq!(admit(&pool, 2), vec!["b"]);
    }

    #[test]
    fn conflicting_waiting_task_is_skipped_not_blocking() {
        let pool = vec![
            cand("a", 1, TaskStatus::Working, "/x"),
            cand("b", 2, TaskStatus::Waiting, "/x"),
            cand("c", 3, TaskStatus::Waiting, "/y"),
        ];
        assert_eq!(admit(&pool, 4), vec!["c"]);
    }

    #[test]
    fn two_waiting_tasks_on_one_source_start_one_at_a_time() {
        let pool = vec![
            cand("t1", 1, TaskStatus::Waiting, "/tmp/x"),
            cand("t2", 2, TaskStatus::Waiting, "/tmp/x"),
        ];
        assert_eq!(admit(&pool, 4), vec!["t1"]);
    }

    #[test]
    fn terminal_and_stopping_entries_are_ignored() {
        let pool = vec![
            cand("a", 1, TaskStatus::Finished, "/x"),
            cand("b", 2, TaskStatus::Error, "/x"),
            cand("c", 3, TaskStatus::Waiting, "/x"),
        ];
        assert_eq!(admit(&pool, 1), vec!["c"]);
    }
}
