mod fairing;
mod helpers;
mod routes;
mod structs;

use fairing::{AddCORS, Logger};
use helpers::create_status;
use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, HistogramVec, opts, register_counter, register_gauge, register_histogram_vec};
use structs::ErrorMessage;

use agentdir::{
    agent::{AgentCapabilities, AgentCard, AgentRegistry, AgentSkill},
    config::structs::Config,
    gate::{AccessGate, Identity},
};

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use rocket::{
    Build, Rocket, catch,
    http::Status,
    outcome::Outcome,
    request::{self, FromRequest, Request},
    serde::json::Json,
};

lazy_static! {
    pub static ref HTTP_COUNTER: Counter = register_counter!(opts!("http_requests_total", "Number of HTTP requests made.")).unwrap();
    pub static ref REGISTERED_AGENTS: Gauge = register_gauge!(opts!("registered_agents", "Number of agents in the directory.")).unwrap();
    pub static ref HTTP_REQ_HISTOGRAM: HistogramVec = register_histogram_vec!("http_request_duration_seconds", "The HTTP request latencies in seconds.", &["route"]).unwrap();
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    paths(
        routes::register_handler,
        routes::list_handler,
        routes::search_handler,
        routes::get_handler,
        routes::health_handler,
        routes::prometheus_handler,
    ),
    components(schemas(
        ErrorMessage,
        AgentCard,
        AgentSkill,
        AgentCapabilities,
        structs::RegisterBody,
        structs::Registered,
        structs::AgentList,
        structs::Health,
    ))
)]
struct ApiDoc;
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme("bearer", SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()))
        }
    }
}

/// Principal that passed the access gate.
pub struct Caller(pub Identity);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Caller {
    type Error = agentdir::Error;

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let Some(gate) = request.rocket().state::<AccessGate>() else {
            log::error!("access gate is not managed");
            return Outcome::Forward(Status::InternalServerError);
        };

        match gate.verify_header(request.headers().get_one("Authorization")) {
            Ok(identity) => Outcome::Success(Caller(identity)),
            Err(err) => Outcome::Error((Status::Unauthorized, err)),
        }
    }
}

#[catch(500)]
fn internal_error() -> Json<ErrorMessage> { create_status(Status::InternalServerError) }

#[catch(400)]
fn bad_request() -> Json<ErrorMessage> { create_status(Status::BadRequest) }

#[catch(405)]
fn not_allowed() -> Json<ErrorMessage> { create_status(Status::MethodNotAllowed) }

#[catch(404)]
fn not_found() -> Json<ErrorMessage> { create_status(Status::NotFound) }

#[catch(401)]
fn unauthorized() -> Json<ErrorMessage> { create_status(Status::Unauthorized) }

#[catch(422)]
fn unprocessable() -> Json<ErrorMessage> { create_status(Status::UnprocessableEntity) }

/// Assemble the directory service around already-built state.
pub fn build(rocket_config: rocket::Config, config: Config, registry: AgentRegistry, gate: AccessGate) -> Rocket<Build> {
    let routes = rocket::routes![
        docs_json,
        routes::preflight,
        routes::register_handler,
        routes::list_handler,
        routes::search_handler,
        routes::get_handler,
        routes::health_handler,
        routes::prometheus_handler,
    ];

    rocket::custom(rocket_config)
        .attach(Logger)
        .attach(AddCORS)
        .manage(config)
        .manage(registry)
        .manage(gate)
        .mount("/", routes)
        .register("/", rocket::catchers![internal_error, bad_request, not_allowed, not_found, unauthorized, unprocessable])
}

pub async fn start(config: Config, registry: AgentRegistry, gate: AccessGate) -> anyhow::Result<()> {
    let rocket_config = config.rocket()?;

    log::info!("API start: Configuring Rocket server at {}", config.fmt_address());
    let result = build(rocket_config, config, registry, gate).launch().await;

    match result {
        Ok(_) => {
            log::info!("Rocket server stopped normally");
            Ok(())
        }
        Err(err) => {
            log::error!("Failed to launch Rocket server: {err}");
            Err(anyhow::anyhow!("failed to launch API server: {err}"))
        }
    }
}

#[rocket::get("/openapi.json")]
async fn docs_json() -> Json<utoipa::openapi::OpenApi> { Json(ApiDoc::openapi()) }
