use super::connection::{AgentConnection, PollBudget, Task, TerminalOutcome};
use crate::error::Result;

/// Multi-turn exchange with one agent.
///
/// Every follow-up carries the last known context id. The task id is only
/// carried while the previous task is still open, so a finished task is never
/// resumed.
pub struct Conversation {
    connection: AgentConnection,
    budget: PollBudget,
    task_id: Option<String>,
    context_id: Option<String>,
}

impl Conversation {
    pub fn new(connection: AgentConnection, budget: PollBudget) -> Self {
        Self {
            connection,
            budget,
            task_id: None,
            context_id: None,
        }
    }

    pub fn connection(&self) -> &AgentConnection { &self.connection }

    pub fn task_id(&self) -> Option<&str> { self.task_id.as_deref() }

    pub fn context_id(&self) -> Option<&str> { self.context_id.as_deref() }

    pub async fn ask(&mut self, text: &str) -> Result<TerminalOutcome> {
        let mut task = self.connection.send_message(text, self.task_id.as_deref(), self.context_id.as_deref()).await?;
        self.remember(&task);

        let outcome = self.connection.poll(&mut task, self.budget).await;
        self.remember(&task);
        outcome
    }

    fn remember(&mut self, task: &Task) {
        if task.context_id.is_some() {
            self.context_id = task.context_id.clone();
        }
        self.task_id = (!task.is_terminal()).then(|| task.id.clone());
    }
}
