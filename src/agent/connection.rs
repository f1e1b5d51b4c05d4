use super::messages::{decode_task, Message, RpcRequest, TaskSnapshot, TaskState};
use super::types::AgentCard;
use crate::config::structs::Client as ClientConfig;
use crate::error::{Error, Result};
use crate::helpers::normalize_url;

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

pub const WELL_KNOWN_CARD: &str = "/.well-known/agent.json";
pub const NO_TEXT: &str = "[no text found in message parts]";

/// Carries JSON-RPC requests to an agent and hands back the raw response body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, request: &RpcRequest) -> Result<String>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, request: &RpcRequest) -> Result<String> {
        let response = self.client.post(&self.url).json(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::protocol_with_body(format!("agent answered {status}"), body));
        }

        Ok(body)
    }
}

/// Suspends the poll loop between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) { tokio::time::sleep(duration).await }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            attempts: 60,
            interval: Duration::from_secs(1),
        }
    }
}

impl From<&ClientConfig> for PollBudget {
    fn from(config: &ClientConfig) -> Self {
        Self {
            attempts: config.attempts,
            interval: Duration::from_secs(config.interval),
        }
    }
}

/// Local view of one conversation with an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub context_id: Option<String>,
    pub state: TaskState,
    pub last_message: Option<Message>,
}

impl Task {
    fn submitted(snapshot: &TaskSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            context_id: snapshot.context_id.clone(),
            state: TaskState::Submitted,
            last_message: None,
        }
    }

    /// Apply a remote snapshot of this same task. The state may only move forward.
    pub fn observe(&mut self, snapshot: &TaskSnapshot) -> Result<()> {
        if snapshot.id != self.id {
            let body = serde_json::to_string(snapshot).unwrap_or_default();
            return Err(Error::protocol_with_body(format!("reply for task {} while tracking {}", snapshot.id, self.id), body));
        }

        let next = snapshot.status.state;

        if !self.state.can_advance_to(next) {
            return Err(Error::InvalidTransition { from: self.state, to: next });
        }

        self.state = next;
        if snapshot.context_id.is_some() {
            self.context_id = snapshot.context_id.clone();
        }
        if let Some(ref message) = snapshot.status.message {
            self.last_message = Some(message.clone());
        }

        Ok(())
    }

    pub fn is_terminal(&self) -> bool { self.state.is_terminal() }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TerminalOutcome {
    pub state: TaskState,
    pub text: String,
    pub snapshot: TaskSnapshot,
    pub attempts: u32,
}

impl TerminalOutcome {
    pub fn is_completed(&self) -> bool { self.state == TaskState::Completed }
}

/// First text part of the most relevant message: the result message of a
/// completed task, otherwise the status message. Never fails.
pub fn extract_text(snapshot: &TaskSnapshot) -> String {
    let result = snapshot.result.as_ref().and_then(|result| result.message.as_ref());

    let source = match (snapshot.status.state, result) {
        (TaskState::Completed, Some(message)) => Some(message),
        _ => snapshot.status.message.as_ref(),
    };

    source.and_then(Message::first_text).unwrap_or(NO_TEXT).to_string()
}

pub async fn fetch_agent_card(endpoint: &str, timeout: Duration) -> Result<AgentCard> {
    let url = format!("{}{WELL_KNOWN_CARD}", normalize_url(endpoint));
    let client = reqwest::Client::builder().timeout(timeout).build()?;

    let body = client.get(&url).send().await?.error_for_status()?.text().await?;
    serde_json::from_str(&body).map_err(|err| Error::protocol_with_body(format!("invalid agent card at {url}: {err}"), body))
}

/// Drives tasks on one agent through send, poll and cancel.
pub struct AgentConnection {
    card: AgentCard,
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
}

impl AgentConnection {
    pub fn new(card: AgentCard, transport: Arc<dyn Transport>) -> Self {
        Self {
            card,
            transport,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Fetch the agent's published card and open a transport to its protocol url.
    pub async fn connect(endpoint: &str, config: &ClientConfig) -> Result<Self> {
        let card = fetch_agent_card(endpoint, Duration::from_secs(config.card_timeout)).await?;
        card.validate()?;

        log::info!("connecting to '{}' at {}", card.name, card.url);
        let transport = HttpTransport::new(&card.url, Duration::from_secs(config.timeout))?;

        Ok(Self::new(card, Arc::new(transport)))
    }

    pub fn card(&self) -> &AgentCard { &self.card }

    /// Send one user message. Supplying `task_id`/`context_id` continues an
    /// existing conversation.
    pub async fn send_message(&self, text: &str, task_id: Option<&str>, context_id: Option<&str>) -> Result<Task> {
        let message = Message::user(text, task_id, context_id);
        let body = self.transport.call(&RpcRequest::send_message(&message)).await?;
        let snapshot = decode_task(&body)?;

        let mut task = Task::submitted(&snapshot);
        task.observe(&snapshot)?;

        log::debug!("task {} created in state {}", task.id, task.state);
        Ok(task)
    }

    pub async fn fetch(&self, task_id: &str) -> Result<TaskSnapshot> {
        let body = self.transport.call(&RpcRequest::get_task(task_id)).await?;
        decode_task(&body)
    }

    /// Poll until the task reaches a terminal state or the budget runs out.
    ///
    /// A failed fetch counts as a spent attempt and the loop carries on. A state
    /// regression aborts the loop.
    pub async fn poll(&self, task: &mut Task, budget: PollBudget) -> Result<TerminalOutcome> {
        for attempt in 1..=budget.attempts {
            self.sleeper.sleep(budget.interval).await;

            let snapshot = match self.fetch(&task.id).await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    log::warn!("task {} attempt {attempt}/{} failed: {err}", task.id, budget.attempts);
                    continue;
                }
            };

            task.observe(&snapshot)?;
            log::debug!("task {} attempt {attempt}: {}", task.id, task.state);

            if task.is_terminal() {
                return Ok(TerminalOutcome {
                    state: task.state,
                    text: extract_text(&snapshot),
                    snapshot,
                    attempts: attempt,
                });
            }
        }

        Err(Error::Timeout {
            task_id: task.id.clone(),
            attempts: budget.attempts,
        })
    }

    /// Ask the agent to cancel. The local task only learns of it through `poll`.
    pub async fn cancel(&self, task_id: &str) -> Result<TaskSnapshot> {
        let body = self.transport.call(&RpcRequest::cancel_task(task_id)).await?;
        decode_task(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::messages::{CANCEL_TASK, GET_TASK, SEND_MESSAGE};
    use crate::agent::types::fixtures::card;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Reply {
        Body(Value),
        Fail,
    }

    /// Replays canned replies; repeats the last one once the script runs out.
    struct Scripted {
        replies: Mutex<VecDeque<Reply>>,
        last: Mutex<Option<Value>>,
        requests: Mutex<Vec<RpcRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                last: Mutex::new(None),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn methods(&self) -> Vec<&'static str> { self.requests.lock().unwrap().iter().map(|r| r.method).collect() }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn call(&self, request: &RpcRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());

            let reply = self.replies.lock().unwrap().pop_front();
            let body = match reply {
                Some(Reply::Body(body)) => {
                    *self.last.lock().unwrap() = Some(body.clone());
                    body
                }
                Some(Reply::Fail) => return Err(Error::protocol("connection reset")),
                None => self.last.lock().unwrap().clone().expect("script exhausted"),
            };

            Ok(json!({"jsonrpc": "2.0", "id": request.id, "result": body}).to_string())
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Duration>>);

    #[async_trait]
    impl Sleeper for Recorder {
        async fn sleep(&self, duration: Duration) { self.0.lock().unwrap().push(duration) }
    }

    fn task(state: &str) -> Reply { Reply::Body(json!({"id": "t-1", "contextId": "c-1", "status": {"state": state}})) }

    fn connection(transport: Arc<Scripted>, sleeper: Arc<Recorder>) -> AgentConnection {
        AgentConnection::new(card("Echo", "http://echo.local", &[]), transport).with_sleeper(sleeper)
    }

    fn zero(attempts: u32) -> PollBudget { PollBudget { attempts, interval: Duration::ZERO } }

    #[tokio::test]
    async fn send_message_opens_a_submitted_task() {
        let transport = Scripted::new(vec![task("submitted")]);
        let connection = connection(transport.clone(), Arc::default());

        let task = connection.send_message("hello", None, None).await.unwrap();
        assert_eq!(task.id, "t-1");
        assert_eq!(task.context_id.as_deref(), Some("c-1"));
        assert_eq!(task.state, TaskState::Submitted);

        let request = transport.requests.lock().unwrap()[0].clone();
        assert_eq!(request.method, SEND_MESSAGE);
        assert_eq!(request.params["message"]["parts"][0]["text"], "hello");
        assert!(request.params["message"].get("taskId").is_none());
    }

    #[tokio::test]
    async fn send_message_continues_a_conversation() {
        let transport = Scripted::new(vec![task("working")]);
        let connection = connection(transport.clone(), Arc::default());

        connection.send_message("more", Some("t-1"), Some("c-1")).await.unwrap();

        let request = transport.requests.lock().unwrap()[0].clone();
        assert_eq!(request.params["message"]["taskId"], "t-1");
        assert_eq!(request.params["message"]["contextId"], "c-1");
    }

    #[tokio::test]
    async fn send_message_surfaces_error_envelopes() {
        struct Refusing;

        #[async_trait]
        impl Transport for Refusing {
            async fn call(&self, _request: &RpcRequest) -> Result<String> {
                Ok(r#"{"jsonrpc":"2.0","id":"x","error":{"code":-32600,"message":"bad request"}}"#.to_string())
            }
        }

        let connection = AgentConnection::new(card("Echo", "http://echo.local", &[]), Arc::new(Refusing));
        match connection.send_message("hi", None, None).await {
            Err(Error::Protocol { body: Some(body), .. }) => assert!(body.contains("bad request")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn poll_times_out_after_exact_attempt_budget() {
        let transport = Scripted::new(vec![task("submitted"), task("working")]);
        let sleeper = Arc::new(Recorder::default());
        let connection = connection(transport.clone(), sleeper.clone());

        let mut task = connection.send_message("hello", None, None).await.unwrap();
        let result = connection.poll(&mut task, zero(3)).await;

        match result {
            Err(Error::Timeout { task_id, attempts }) => {
                assert_eq!(task_id, "t-1");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected: {other:?}"),
        }

        assert_eq!(transport.methods(), vec![SEND_MESSAGE, GET_TASK, GET_TASK, GET_TASK]);
        assert_eq!(sleeper.0.lock().unwrap().len(), 3);
        assert_eq!(task.state, TaskState::Working);
    }

    #[tokio::test]
    async fn poll_returns_completed_answer() {
        let answer = Reply::Body(json!({
            "id": "t-1",
            "status": {"state": "completed", "message": {"role": "agent", "messageId": "m1", "parts": [{"kind": "text", "text": "status text"}]}},
            "result": {"message": {"role": "agent", "messageId": "m2", "parts": [{"kind": "data", "data": {}}, {"kind": "text", "text": "42"}]}}
        }));
        let transport = Scripted::new(vec![task("submitted"), task("working"), answer]);
        let connection = connection(transport, Arc::default());

        let mut task = connection.send_message("question", None, None).await.unwrap();
        let outcome = connection.poll(&mut task, zero(60)).await.unwrap();

        assert!(outcome.is_completed());
        assert_eq!(outcome.text, "42");
        assert_eq!(outcome.attempts, 2);
        assert!(task.is_terminal());
        assert_eq!(task.context_id.as_deref(), Some("c-1"));
    }

    #[tokio::test]
    async fn poll_rejects_a_snapshot_of_another_task() {
        let stranger = Reply::Body(json!({"id": "t-2", "contextId": "c-1", "status": {"state": "completed"}}));
        let transport = Scripted::new(vec![task("submitted"), stranger]);
        let connection = connection(transport, Arc::default());

        let mut task = connection.send_message("question", None, None).await.unwrap();
        let err = connection.poll(&mut task, zero(5)).await.unwrap_err();

        assert!(matches!(err, Error::Protocol { body: Some(_), .. }), "{err:?}");
        assert_eq!(task.state, TaskState::Submitted);
        assert!(!task.is_terminal());
    }

    #[tokio::test]
    async fn failed_fetch_spends_an_attempt_and_continues() {
        let transport = Scripted::new(vec![task("submitted"), Reply::Fail, task("failed")]);
        let connection = connection(transport, Arc::default());

        let mut task = connection.send_message("question", None, None).await.unwrap();
        let outcome = connection.poll(&mut task, zero(3)).await.unwrap();

        assert_eq!(outcome.state, TaskState::Failed);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.text, NO_TEXT);
    }

    #[tokio::test]
    async fn failed_fetches_alone_exhaust_the_budget() {
        let transport = Scripted::new(vec![task("submitted"), Reply::Fail, Reply::Fail]);
        let connection = connection(transport, Arc::default());

        let mut task = connection.send_message("question", None, None).await.unwrap();
        assert!(matches!(connection.poll(&mut task, zero(2)).await, Err(Error::Timeout { attempts: 2, .. })));
    }

    #[tokio::test]
    async fn regression_after_terminal_is_rejected() {
        let transport = Scripted::new(vec![task("completed"), task("working")]);
        let connection = connection(transport, Arc::default());

        let mut task = connection.send_message("question", None, None).await.unwrap();
        assert_eq!(task.state, TaskState::Completed);

        match connection.poll(&mut task, zero(5)).await {
            Err(Error::InvalidTransition { from, to }) => {
                assert_eq!(from, TaskState::Completed);
                assert_eq!(to, TaskState::Working);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(task.state, TaskState::Completed);
    }

    #[tokio::test]
    async fn poll_sleeps_the_configured_interval() {
        let transport = Scripted::new(vec![task("submitted"), task("cancelled")]);
        let sleeper = Arc::new(Recorder::default());
        let connection = connection(transport, sleeper.clone());

        let mut task = connection.send_message("question", None, None).await.unwrap();
        let budget = PollBudget { attempts: 4, interval: Duration::from_secs(1) };
        let outcome = connection.poll(&mut task, budget).await.unwrap();

        assert_eq!(outcome.state, TaskState::Cancelled);
        assert_eq!(*sleeper.0.lock().unwrap(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn cancel_is_its_own_protocol_message() {
        let transport = Scripted::new(vec![task("cancelled")]);
        let connection = connection(transport.clone(), Arc::default());

        let snapshot = connection.cancel("t-1").await.unwrap();
        assert_eq!(snapshot.status.state, TaskState::Cancelled);

        let request = transport.requests.lock().unwrap()[0].clone();
        assert_eq!(request.method, CANCEL_TASK);
        assert_eq!(request.params["id"], "t-1");
    }

    #[test]
    fn extract_text_prefers_result_only_when_completed() {
        let snapshot: TaskSnapshot = serde_json::from_value(json!({
            "id": "t",
            "status": {"state": "working", "message": {"role": "agent", "messageId": "m1", "parts": [{"kind": "text", "text": "thinking"}]}},
            "result": {"message": {"role": "agent", "messageId": "m2", "parts": [{"kind": "text", "text": "done"}]}}
        }))
        .unwrap();
        assert_eq!(extract_text(&snapshot), "thinking");

        let mut completed = snapshot.clone();
        completed.status.state = TaskState::Completed;
        assert_eq!(extract_text(&completed), "done");
    }

    #[test]
    fn extract_text_falls_back_to_status_then_sentinel() {
        let status_only: TaskSnapshot = serde_json::from_value(json!({
            "id": "t",
            "status": {"state": "completed", "message": {"role": "agent", "messageId": "m1", "parts": [{"kind": "text", "text": "from status"}]}}
        }))
        .unwrap();
        assert_eq!(extract_text(&status_only), "from status");

        let empty: TaskSnapshot = serde_json::from_value(json!({
            "id": "t",
            "status": {"state": "completed", "message": {"role": "agent", "messageId": "m1", "parts": [{"kind": "file", "file": {"uri": "x"}}]}},
            "result": {}
        }))
        .unwrap();
        assert_eq!(extract_text(&empty), NO_TEXT);
    }

    #[test]
    fn budget_follows_client_config() {
        let budget = PollBudget::from(&ClientConfig::default());
        assert_eq!(budget, PollBudget::default());
    }
}
