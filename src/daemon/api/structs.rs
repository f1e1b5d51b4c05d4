use agentdir::agent::AgentCard;
use rocket::serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorMessage {
    #[schema(example = 404)]
    pub code: u16,
    #[schema(example = "Not Found")]
    pub message: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterBody {
    pub agent: AgentCard,
    /// Defaults to the email of the verified caller.
    #[schema(example = "ops@example.com")]
    pub owner_email: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct Registered {
    #[schema(example = "Agent registered successfully")]
    pub message: String,
    #[schema(example = "https://weather.example.com")]
    pub endpoint: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AgentList {
    pub agents: Vec<AgentCard>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct Health {
    #[schema(example = "ok")]
    pub status: String,
    #[schema(example = "Agent Registry is running")]
    pub message: String,
}
