use async_trait::async_trait;
use meridian_agent::Agent;
use meridian_core::{AgentResult, AgentTask};

/// Executes one task and always yields its result.
///
/// The executor dispatches through this seam; [`Agent`] is the production
/// implementation.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &AgentTask) -> AgentResult;
}

#[async_trait]
impl TaskRunner for Agent {
    async fn run(&self, task: &AgentTask) -> AgentResult {
        self.execute(task).await
    }
}
