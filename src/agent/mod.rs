pub mod connection;
pub mod conversation;
pub mod discovery;
pub mod messages;
pub mod registry;
pub mod types;

pub use connection::{AgentConnection, PollBudget, Task, TerminalOutcome, extract_text};
pub use conversation::Conversation;
pub use discovery::Discovery;
pub use registry::AgentRegistry;
pub use types::{AgentCapabilities, AgentCard, AgentSkill};
