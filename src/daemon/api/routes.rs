use prometheus::{Encoder, TextEncoder};
use serde_json::json;

use rocket::{
    State, get,
    http::Status,
    options, post,
    response::status::Custom,
    serde::json::{self, Json},
};

use super::{
    Caller, HTTP_COUNTER, HTTP_REQ_HISTOGRAM, REGISTERED_AGENTS,
    helpers::{GenericError, from_error, generic_error},
    structs::{AgentList, ErrorMessage, Health, RegisterBody, Registered},
};

use agentdir::{
    agent::{AgentCard, AgentRegistry},
    config::structs::Config,
};

#[options("/<_..>")]
pub fn preflight() -> Status { Status::NoContent }

#[post("/register", data = "<body>")]
#[utoipa::path(post, tag = "Directory", path = "/register", request_body = RegisterBody, security(("bearer" = [])),
    responses(
        (status = 201, description = "Agent registered", body = Registered),
        (status = BAD_REQUEST, description = "Body is not a valid agent card", body = ErrorMessage),
        (
            status = UNAUTHORIZED, description = "Credential rejected or domain not trusted", body = ErrorMessage,
            example = json!({"code": 401, "message": "unauthorized: token expired"})
        ),
        (
            status = CONFLICT, description = "Endpoint already registered", body = ErrorMessage,
            example = json!({"code": 409, "message": "agent already registered at https://weather.example.com"})
        )
    )
)]
pub async fn register_handler(
    caller: Result<Caller, agentdir::Error>,
    registry: &State<AgentRegistry>,
    body: Result<Json<RegisterBody>, json::Error<'_>>,
) -> Result<Custom<Json<Registered>>, GenericError> {
    let timer = HTTP_REQ_HISTOGRAM.with_label_values(&["register"]).start_timer();
    HTTP_COUNTER.inc();

    // credentials are judged before the body
    let Caller(identity) = caller.map_err(from_error)?;
    let RegisterBody { agent, owner_email } = body.map_err(|err| from_error(agentdir::Error::Invalid(err.to_string())))?.into_inner();
    let endpoint = agent.endpoint.clone();

    registry.register(agent, owner_email.or(Some(identity.email))).await.map_err(from_error)?;
    REGISTERED_AGENTS.set(registry.len() as f64);
    log::info!("registered agent at {endpoint} for {}", identity.subject);
    timer.observe_duration();

    Ok(Custom(
        Status::Created,
        Json(Registered {
            message: "Agent registered successfully".to_string(),
            endpoint,
        }),
    ))
}

#[get("/agents")]
#[utoipa::path(get, tag = "Directory", path = "/agents",
    responses((status = 200, description = "All registered agents in registration order", body = AgentList))
)]
pub async fn list_handler(registry: &State<AgentRegistry>) -> Json<AgentList> {
    let timer = HTTP_REQ_HISTOGRAM.with_label_values(&["list"]).start_timer();
    HTTP_COUNTER.inc();

    let agents = registry.list();
    timer.observe_duration();

    Json(AgentList { agents })
}

#[get("/agents/search?<q>&<k>")]
#[utoipa::path(get, tag = "Directory", path = "/agents/search",
    params(
        ("q" = Option<String>, Query, description = "Free-text intent", example = "weather forecast"),
        ("k" = Option<usize>, Query, description = "Maximum number of agents returned"),
    ),
    responses(
        (status = 200, description = "Agents ranked by relevance", body = AgentList),
        (status = INTERNAL_SERVER_ERROR, description = "Discovery backend failed", body = ErrorMessage)
    )
)]
pub async fn search_handler(q: Option<&str>, k: Option<usize>, registry: &State<AgentRegistry>, config: &State<Config>) -> Result<Json<AgentList>, GenericError> {
    let timer = HTTP_REQ_HISTOGRAM.with_label_values(&["search"]).start_timer();
    HTTP_COUNTER.inc();

    let agents = registry.search(q.unwrap_or_default(), k.unwrap_or(config.discovery.default_k)).await.map_err(from_error)?;
    timer.observe_duration();

    Ok(Json(AgentList { agents }))
}

#[get("/agents/<endpoint>", rank = 2)]
#[utoipa::path(get, tag = "Directory", path = "/agents/{endpoint}",
    params(("endpoint" = String, Path, description = "Percent-encoded agent endpoint")),
    responses(
        (status = 200, description = "Agent card as registered", body = AgentCard),
        (
            status = NOT_FOUND, description = "No agent at this endpoint", body = ErrorMessage,
            example = json!({"code": 404, "message": "agent not found: https://weather.example.com"})
        )
    )
)]
pub async fn get_handler(endpoint: &str, registry: &State<AgentRegistry>) -> Result<Json<AgentCard>, GenericError> {
    let timer = HTTP_REQ_HISTOGRAM.with_label_values(&["get"]).start_timer();
    HTTP_COUNTER.inc();

    let card = registry.get(endpoint).map_err(from_error)?;
    timer.observe_duration();

    Ok(Json(card))
}

#[get("/healthz")]
#[utoipa::path(get, tag = "Daemon", path = "/healthz", responses((status = 200, description = "Liveness", body = Health)))]
pub async fn health_handler() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
        message: "Agent Registry is running".to_string(),
    })
}

#[get("/metrics")]
#[utoipa::path(get, tag = "Daemon", path = "/metrics",
    responses(
        (
            description = "Get prometheus metrics", body = String, status = 200,
            example = json!("# HELP http_requests_total Number of HTTP requests made.\n# TYPE http_requests_total counter\nhttp_requests_total 3"),
        )
    )
)]
pub async fn prometheus_handler() -> Result<String, GenericError> {
    let mut buffer = Vec::<u8>::new();

    TextEncoder::new()
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|err| generic_error(Status::InternalServerError, err.to_string()))?;

    String::from_utf8(buffer).map_err(|err| generic_error(Status::InternalServerError, err.to_string()))
}
