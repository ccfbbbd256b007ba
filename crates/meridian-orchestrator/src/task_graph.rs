use meridian_core::{AgentTask, MeridianError, TaskId};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// The tasks of one run and what has been recorded for them.
///
/// Readiness is recomputed against the recorded set after every layer, so
/// execution is layered rather than globally sorted.
pub struct TaskGraph {
    tasks: HashMap<TaskId, AgentTask>,
    /// Submission order, used to break priority ties.
    order: Vec<TaskId>,
    recorded: HashSet<TaskId>,
}

impl TaskGraph {
    /// Build a graph from a batch. Ids in `prior` already have results and
    /// satisfy dependencies; a task reusing one of them is dropped.
    pub fn new<I>(tasks: Vec<AgentTask>, prior: I) -> Self
    where
        I: IntoIterator<Item = TaskId>,
    {
        let mut graph = Self {
            tasks: HashMap::new(),
            order: Vec::new(),
            recorded: prior.into_iter().collect(),
        };
        for task in tasks {
            graph.add(task);
        }
        graph
    }

    /// Add a task. Returns false, keeping the first occurrence, when the id
    /// is already known.
    pub fn add(&mut self, task: AgentTask) -> bool {
        if self.tasks.contains_key(&task.id) || self.recorded.contains(&task.id) {
            warn!(task_id = %task.id, "Duplicate task id, keeping the first occurrence");
            return false;
        }
        self.order.push(task.id.clone());
        self.tasks.insert(task.id.clone(), task);
        true
    }

    fn is_pending(&self, id: &str) -> bool {
        self.tasks.contains_key(id) && !self.recorded.contains(id)
    }

    /// Pending tasks whose dependencies all have a recorded result.
    /// Higher priority first, then submission order.
    pub fn ready_frontier(&self) -> Vec<&AgentTask> {
        let mut ready: Vec<(usize, &AgentTask)> = self
            .order
            .iter()
            .enumerate()
            .filter(|(_, id)| self.is_pending(id))
            .filter_map(|(i, id)| self.tasks.get(id).map(|t| (i, t)))
            .filter(|(_, t)| t.is_ready(|dep| self.recorded.contains(dep)))
            .collect();
        ready.sort_by_key(|(i, t)| (std::cmp::Reverse(t.priority), *i));
        ready.into_iter().map(|(_, t)| t).collect()
    }

    /// Mark a task as having its single result.
    pub fn record(&mut self, id: &str) {
        self.recorded.insert(id.to_string());
    }

    pub fn is_recorded(&self, id: &str) -> bool {
        self.recorded.contains(id)
    }

    /// Pending tasks in submission order.
    pub fn pending(&self) -> Vec<&AgentTask> {
        self.order
            .iter()
            .filter(|id| self.is_pending(id))
            .filter_map(|id| self.tasks.get(id))
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.order.iter().filter(|id| self.is_pending(id)).count()
    }

    pub fn is_done(&self) -> bool {
        self.pending_count() == 0
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Check for cycles in the dependency graph.
    pub fn has_cycle(&self) -> bool {
        let mut visited = HashMap::new();
        self.order
            .iter()
            .any(|id| self.dfs_cycle(id, &mut visited))
    }

    fn dfs_cycle<'a>(&'a self, id: &'a str, visited: &mut HashMap<&'a str, u8>) -> bool {
        match visited.get(id) {
            Some(1) => return true,  // back edge = cycle
            Some(2) => return false, // already processed
            _ => {}
        }
        visited.insert(id, 1);
        if let Some(task) = self.tasks.get(id) {
            for dep in &task.dependencies {
                if self.dfs_cycle(dep, visited) {
                    return true;
                }
            }
        }
        visited.insert(id, 2);
        false
    }

    /// Pending tasks reachable from `id` through pending dependencies,
    /// including `id` itself when it sits on a cycle.
    fn reachable(&self, id: &str) -> HashSet<&str> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = self
            .tasks
            .get(id)
            .map(|t| t.dependencies.iter().map(String::as_str).collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            if !self.is_pending(next) || !seen.insert(next) {
                continue;
            }
            if let Some(task) = self.tasks.get(next) {
                stack.extend(task.dependencies.iter().map(String::as_str));
            }
        }
        seen
    }

    /// Explain why a pending task can never become ready.
    pub fn diagnose(&self, id: &str) -> MeridianError {
        let Some(task) = self.tasks.get(id) else {
            return MeridianError::DependencyResolution(format!("unknown task '{id}'"));
        };

        let missing: Vec<&str> = task
            .dependencies
            .iter()
            .filter(|dep| !self.tasks.contains_key(*dep) && !self.recorded.contains(*dep))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return MeridianError::DependencyResolution(format!(
                "task '{id}' depends on unknown task {}",
                quote_list(&missing)
            ));
        }

        let reachable = self.reachable(id);
        if reachable.contains(id) {
            let mut members: Vec<&str> = reachable
                .into_iter()
                .filter(|other| self.reachable(other).contains(id))
                .collect();
            members.sort_unstable();
            return MeridianError::DependencyResolution(format!(
                "task '{id}' is part of a dependency cycle involving {}",
                quote_list(&members)
            ));
        }

        let mut blockers: Vec<&str> = task
            .dependencies
            .iter()
            .filter(|dep| self.is_pending(dep))
            .map(String::as_str)
            .collect();
        blockers.sort_unstable();
        MeridianError::DependencyResolution(format!(
            "task '{id}' is blocked by unresolvable task {}",
            quote_list(&blockers)
        ))
    }
}

fn quote_list(ids: &[&str]) -> String {
    ids.iter()
        .map(|id| format!("'{id}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
