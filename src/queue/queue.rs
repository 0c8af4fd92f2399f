//! The story queue (§4.D): dependency resolution, ready-set computation,
//! cycle detection, and crash-recovery serialization.
//!
//! Cycle detection reuses `petgraph`, the teacher's own graph crate
//! (`claude/memory.rs` builds a `petgraph::Graph` for its concept graph);
//! here `tarjan_scc` finds strongly-connected components of the
//! non-completed dependency subgraph, each of which is reported as one
//! cycle (Design Note, Open Question (b)).

use crate::error::{Error, Result};
use crate::queue::parser::parse_stories_dir;
use crate::queue::story::{QueuedStory, StoryStatus};
use chrono::Utc;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueSummary {
    pub total_stories: usize,
    pub total_points: u64,
    pub completed_points: u64,
    pub ready_stories: usize,
    pub in_progress: usize,
    pub failed: usize,
}

/// The queue's serializable on-disk form, round-tripped by `to_json`/
/// `from_json` for crash recovery.
#[derive(Debug, Serialize, Deserialize)]
struct QueueDocument {
    stories: Vec<QueuedStory>,
}

/// A single in-memory structure, mutex-guarded so queue mutations serialize
/// across concurrently running agents (§5).
pub struct StoryQueue {
    stories: Mutex<HashMap<String, QueuedStory>>,
}

impl StoryQueue {
    pub fn new() -> Self {
        Self {
            stories: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_stories(stories: Vec<QueuedStory>) -> Self {
        let map = stories.into_iter().map(|s| (s.id.clone(), s)).collect();
        Self {
            stories: Mutex::new(map),
        }
    }

    /// Parse every story file under `dir` into a fresh queue.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        Ok(Self::from_stories(parse_stories_dir(dir)?))
    }

    pub fn to_json(&self) -> Result<String> {
        let stories = self.stories.lock().unwrap();
        let mut values: Vec<QueuedStory> = stories.values().cloned().collect();
        values.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(serde_json::to_string_pretty(&QueueDocument { stories: values })?)
    }

    pub fn from_json(bytes: &str) -> Result<Self> {
        let doc: QueueDocument = serde_json::from_str(bytes)?;
        Ok(Self::from_stories(doc.stories))
    }

    pub fn get(&self, id: &str) -> Option<QueuedStory> {
        self.stories.lock().unwrap().get(id).cloned()
    }

    /// Every `PENDING` story all of whose dependencies are `COMPLETED`, in
    /// unspecified order.
    pub fn ready_stories(&self) -> Vec<QueuedStory> {
        let stories = self.stories.lock().unwrap();
        stories
            .values()
            .filter(|story| is_ready(&stories, story))
            .cloned()
            .collect()
    }

    /// The ready story with the smallest `estimated_points`, ties broken by
    /// ascending `id`.
    pub fn next_ready_story(&self) -> Option<QueuedStory> {
        let mut ready = self.ready_stories();
        ready.sort_by(|a, b| {
            a.estimated_points
                .cmp(&b.estimated_points)
                .then_with(|| a.id.cmp(&b.id))
        });
        ready.into_iter().next()
    }

    pub fn mark_in_progress(&self, id: &str, agent_id: &str) -> Result<()> {
        self.transition_status(id, &[StoryStatus::Pending], |story| {
            story.status = StoryStatus::InProgress;
            story.assigned_agent = Some(agent_id.to_string());
            story.started_at = Some(Utc::now());
        })
    }

    pub fn mark_waiting_review(&self, id: &str) -> Result<()> {
        self.transition_status(id, &[StoryStatus::InProgress], |story| {
            story.status = StoryStatus::WaitingReview;
        })
    }

    pub fn mark_completed(&self, id: &str) -> Result<()> {
        self.transition_status(
            id,
            &[StoryStatus::InProgress, StoryStatus::WaitingReview],
            |story| {
                story.status = StoryStatus::Completed;
                story.completed_at = Some(Utc::now());
            },
        )
    }

    pub fn mark_failed(&self, id: &str) -> Result<()> {
        self.transition_status(
            id,
            &[StoryStatus::InProgress, StoryStatus::WaitingReview],
            |story| {
                story.status = StoryStatus::Failed;
                story.completed_at = Some(Utc::now());
            },
        )
    }

    fn transition_status(
        &self,
        id: &str,
        allowed: &[StoryStatus],
        apply: impl FnOnce(&mut QueuedStory),
    ) -> Result<()> {
        let mut stories = self.stories.lock().unwrap();
        let story = stories
            .get_mut(id)
            .ok_or_else(|| Error::StoryNotFound(id.to_string()))?;

        if !allowed.contains(&story.status) {
            return Err(Error::InvalidStoryTransition {
                id: id.to_string(),
                expected: format!("{allowed:?}"),
                actual: format!("{:?}", story.status),
            });
        }

        apply(story);
        story.last_updated = Utc::now();
        Ok(())
    }

    /// Every strongly-connected component (size > 1, or a single node with
    /// a self-dependency) of the non-completed dependency subgraph.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let stories = self.stories.lock().unwrap();
        let non_completed: Vec<&QueuedStory> = stories
            .values()
            .filter(|s| s.status != StoryStatus::Completed)
            .collect();

        let mut graph = DiGraph::<String, ()>::new();
        let mut indices = HashMap::new();
        for story in &non_completed {
            let idx = graph.add_node(story.id.clone());
            indices.insert(story.id.clone(), idx);
        }
        for story in &non_completed {
            let Some(&from) = indices.get(&story.id) else {
                continue;
            };
            for dep in &story.depends_on {
                if let Some(&to) = indices.get(dep) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        petgraph::algo::tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1
                    || scc
                        .first()
                        .is_some_and(|&n| graph.contains_edge(n, n))
            })
            .map(|scc| {
                let mut ids: Vec<String> = scc.into_iter().map(|n| graph[n].clone()).collect();
                ids.sort();
                ids
            })
            .collect()
    }

    pub fn queue_summary(&self) -> QueueSummary {
        let stories = self.stories.lock().unwrap();
        let total_stories = stories.len();
        let total_points: u64 = stories.values().map(|s| s.estimated_points as u64).sum();
        let completed_points: u64 = stories
            .values()
            .filter(|s| s.status == StoryStatus::Completed)
            .map(|s| s.estimated_points as u64)
            .sum();
        let ready_stories = stories.values().filter(|s| is_ready(&stories, s)).count();
        let in_progress = stories
            .values()
            .filter(|s| s.status == StoryStatus::InProgress)
            .count();
        let failed = stories
            .values()
            .filter(|s| s.status == StoryStatus::Failed)
            .count();

        QueueSummary {
            total_stories,
            total_points,
            completed_points,
            ready_stories,
            in_progress,
            failed,
        }
    }
}

impl Default for StoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn is_ready(stories: &HashMap<String, QueuedStory>, story: &QueuedStory) -> bool {
    story.status == StoryStatus::Pending
        && story.depends_on.iter().all(|dep| {
            stories
                .get(dep)
                .is_some_and(|d| d.status == StoryStatus::Completed)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(id: &str, depends_on: &[&str], points: u32, status: StoryStatus) -> QueuedStory {
        let mut s = QueuedStory::new(id, format!("story {id}"), depends_on.iter().map(|s| s.to_string()).collect(), points, "");
        s.status = status;
        s
    }

    #[test]
    fn ready_stories_respects_dependency_completion() {
        let queue = StoryQueue::from_stories(vec![
            story("001", &[], 0, StoryStatus::Pending),
            story("002", &["001"], 0, StoryStatus::Pending),
            story("003", &["004"], 0, StoryStatus::Pending),
            story("004", &[], 0, StoryStatus::Completed),
        ]);

        let mut ready: Vec<String> = queue.ready_stories().into_iter().map(|s| s.id).collect();
        ready.sort();
        assert_eq!(ready, vec!["001".to_string(), "003".to_string()]);
    }

    #[test]
    fn next_ready_story_picks_smallest_points_then_id() {
        let queue = StoryQueue::from_stories(vec![
            story("001", &[], 3, StoryStatus::Pending),
            story("002", &[], 1, StoryStatus::Pending),
            story("003", &[], 2, StoryStatus::Pending),
        ]);

        assert_eq!(queue.next_ready_story().unwrap().id, "002");
    }

    #[test]
    fn detect_cycles_finds_the_three_story_cycle() {
        let queue = StoryQueue::from_stories(vec![
            story("001", &["003"], 0, StoryStatus::Pending),
            story("002", &["001"], 0, StoryStatus::Pending),
            story("003", &["002"], 0, StoryStatus::Pending),
        ]);

        let cycles = queue.detect_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 3);
        assert!(cycles[0].contains(&"001".to_string()));
        assert!(cycles[0].contains(&"002".to_string()));
        assert!(cycles[0].contains(&"003".to_string()));
    }

    #[test]
    fn detect_cycles_is_empty_for_a_dag() {
        let queue = StoryQueue::from_stories(vec![
            story("001", &[], 0, StoryStatus::Pending),
            story("002", &["001"], 0, StoryStatus::Pending),
        ]);
        assert!(queue.detect_cycles().is_empty());
    }

    #[test]
    fn completed_stories_cannot_form_a_reported_cycle() {
        let queue = StoryQueue::from_stories(vec![
            story("001", &["002"], 0, StoryStatus::Completed),
            story("002", &["001"], 0, StoryStatus::Completed),
        ]);
        assert!(queue.detect_cycles().is_empty());
    }

    #[test]
    fn status_transitions_enforce_preconditions() {
        let queue = StoryQueue::from_stories(vec![story("001", &[], 0, StoryStatus::Pending)]);

        assert!(queue.mark_waiting_review("001").is_err());
        queue.mark_in_progress("001", "agent-1").unwrap();
        assert!(queue.mark_in_progress("001", "agent-1").is_err());
        queue.mark_completed("001").unwrap();

        let story = queue.get("001").unwrap();
        assert_eq!(story.status, StoryStatus::Completed);
        assert_eq!(story.assigned_agent, Some("agent-1".to_string()));
        assert!(story.completed_at.is_some());
    }

    #[test]
    fn queue_summary_reports_expected_counts() {
        let queue = StoryQueue::from_stories(vec![
            story("001", &[], 3, StoryStatus::Completed),
            story("002", &["001"], 2, StoryStatus::Pending),
            story("003", &[], 1, StoryStatus::InProgress),
            story("004", &[], 5, StoryStatus::Failed),
        ]);

        let summary = queue.queue_summary();
        assert_eq!(summary.total_stories, 4);
        assert_eq!(summary.total_points, 11);
        assert_eq!(summary.completed_points, 3);
        assert_eq!(summary.ready_stories, 1);
        assert_eq!(summary.in_progress, 1);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn json_round_trips_full_queue() {
        let queue = StoryQueue::from_stories(vec![story("001", &[], 2, StoryStatus::Pending)]);
        queue.mark_in_progress("001", "agent-1").unwrap();

        let json = queue.to_json().unwrap();
        let restored = StoryQueue::from_json(&json).unwrap();

        let story = restored.get("001").unwrap();
        assert_eq!(story.status, StoryStatus::InProgress);
        assert_eq!(story.assigned_agent, Some("agent-1".to_string()));
    }
}
