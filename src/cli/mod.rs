mod args;
pub use args::*;

use agentdir::{
    Error,
    agent::{AgentConnection, AgentCard, Conversation, PollBudget, TerminalOutcome},
    client::RegistryClient,
    config::structs::Config,
    gate::{Claims, HmacVerifier},
    helpers,
};

use colored::Colorize;
use macros_rs::{crashln, string, ternary};
use serde::Serialize;
use std::{fs, io::Write, time::Duration};
use tokio::io::{AsyncBufReadExt, BufReader};

use tabled::{
    Table, Tabled,
    settings::{
        Color, Rotate,
        object::{Columns, Rows},
        style::{BorderColor, Style},
        themes::Colorization,
    },
};

pub fn get_version(short: bool) -> String {
    match short {
        true => format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        false => match env!("GIT_HASH") {
            "" => format!("{} ({}) [{}]", env!("CARGO_PKG_VERSION"), env!("BUILD_DATE"), env!("PROFILE")),
            hash => format!("{} ({} {hash}) [{}]", env!("CARGO_PKG_VERSION"), env!("BUILD_DATE"), env!("PROFILE")),
        },
    }
}

#[derive(Tabled, Serialize, Debug)]
struct AgentRow {
    name: String,
    endpoint: String,
    version: String,
    skills: String,
    description: String,
}

impl From<&AgentCard> for AgentRow {
    fn from(card: &AgentCard) -> Self {
        Self {
            name: card.name.clone(),
            endpoint: card.endpoint.clone(),
            version: card.version.clone(),
            skills: card.skills.iter().map(|skill| skill.name.as_str()).collect::<Vec<_>>().join(", "),
            description: helpers::truncate(card.description.as_deref().unwrap_or_default(), 40),
        }
    }
}

fn registry(config: &Config) -> RegistryClient {
    match RegistryClient::new(&config.client.registry, Duration::from_secs(config.client.timeout)) {
        Ok(client) => client,
        Err(err) => crashln!("{} {err}", *helpers::FAIL),
    }
}

fn render_agents(agents: &[AgentCard], format: Format) {
    let rows: Vec<AgentRow> = agents.iter().map(AgentRow::from).collect();

    match format {
        Format::Raw => println!("{rows:?}"),
        Format::Json => match serde_json::to_string(agents) {
            Ok(json) => println!("{json}"),
            Err(err) => crashln!("{} Cannot encode agents: {err}", *helpers::FAIL),
        },
        Format::Default => {
            if rows.is_empty() {
                return println!("{} Directory is empty", *helpers::SUCCESS);
            }

            let table = Table::new(&rows)
                .with(Style::rounded().remove_verticals())
                .with(BorderColor::filled(Color::FG_BRIGHT_BLACK))
                .with(Colorization::exact([Color::FG_BRIGHT_CYAN], Rows::first()))
                .to_string();

            println!("{table}");
        }
    }
}

pub async fn list(config: &Config, format: Format) {
    match registry(config).list().await {
        Ok(agents) => render_agents(&agents, format),
        Err(err) => crashln!("{} Failed to list agents: {err}", *helpers::FAIL),
    }
}

pub async fn search(config: &Config, query: &str, k: Option<usize>, format: Format) {
    match registry(config).search(query, k, None).await {
        Ok(agents) if agents.is_empty() && format == Format::Default => println!("{} No agent matched '{query}'", *helpers::WARN),
        Ok(agents) => render_agents(&agents, format),
        Err(err) => crashln!("{} Search failed: {err}", *helpers::FAIL),
    }
}

pub async fn get(config: &Config, endpoint: &str, format: Format) {
    let card = match registry(config).get(endpoint).await {
        Ok(card) => card,
        Err(Error::NotFound(_)) => crashln!("{} No agent registered at {}", *helpers::FAIL, endpoint.bold()),
        Err(err) => crashln!("{} Failed to fetch agent: {err}", *helpers::FAIL),
    };

    match format {
        Format::Default => {
            let table = Table::new([AgentRow::from(&card)])
                .with(Rotate::Left)
                .with(Style::rounded().remove_horizontals())
                .with(Colorization::exact([Color::FG_CYAN], Columns::first()))
                .with(BorderColor::filled(Color::FG_BRIGHT_BLACK))
                .to_string();

            println!("{}\n{table}\n", format!("Describing agent '{}'", card.name).on_bright_white().black());
            println!(" {}", format!("Use `agentdir ask <question> --endpoint {}` to talk to it", card.endpoint).white());
        }
        _ => render_agents(&[card], format),
    }
}

pub async fn register(config: &Config, path: &str, owner: Option<String>, token: &str) {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => crashln!("{} Cannot read {path}: {err}", *helpers::FAIL),
    };

    let card: AgentCard = match serde_json::from_str(&contents) {
        Ok(card) => card,
        Err(err) => crashln!("{} {path} is not an agent card: {err}", *helpers::FAIL),
    };

    if let Err(err) = card.validate() {
        crashln!("{} {err}", *helpers::FAIL);
    }

    match registry(config).register(&card, owner.as_deref(), token).await {
        Ok(endpoint) => println!("{} Registered '{}' at {} ✓", *helpers::SUCCESS, card.name, endpoint.bold()),
        Err(Error::Conflict(endpoint)) => crashln!("{} An agent is already registered at {}", *helpers::FAIL, endpoint.bold()),
        Err(err) if err.is_auth() => crashln!("{} Registration refused: {err}", *helpers::FAIL),
        Err(err) => crashln!("{} Registration failed: {err}", *helpers::FAIL),
    }
}

fn print_outcome(outcome: &TerminalOutcome) {
    let state = ternary!(outcome.is_completed(), outcome.state.to_string().green(), outcome.state.to_string().red());
    log::debug!("task {} finished after {} attempts", outcome.snapshot.id, outcome.attempts);
    println!("{} [{state}] {}", *helpers::SUCCESS, outcome.text);
}

async fn connect(config: &Config, endpoint: &str) -> AgentConnection {
    match AgentConnection::connect(endpoint, &config.client).await {
        Ok(connection) => connection,
        Err(err) => crashln!("{} Cannot reach agent at {endpoint}: {err}", *helpers::FAIL),
    }
}

pub async fn ask(config: &Config, question: &str, target: Target, token: Option<String>) {
    let endpoint = match target {
        Target::Endpoint(endpoint) => endpoint,
        Target::Search => match registry(config).best_match(question, token.as_deref()).await {
            Ok(card) => {
                println!("{} Selected '{}' ({})", *helpers::SUCCESS, card.name.bold(), card.endpoint);
                card.endpoint
            }
            Err(err) => crashln!("{} {err}", *helpers::FAIL),
        },
    };

    let mut chat = Conversation::new(connect(config, &endpoint).await, PollBudget::from(&config.client));
    let name = chat.connection().card().name.clone();

    match chat.ask(question).await {
        Ok(outcome) => print_outcome(&outcome),
        Err(err @ Error::Timeout { .. }) => println!("{} {err}", *helpers::WARN),
        Err(err) => crashln!("{} {err}", *helpers::FAIL),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{} ", format!("{name} >").cyan());
        let _ = std::io::stdout().flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => crashln!("{} Cannot read input: {err}", *helpers::FAIL),
        };

        let text = line.trim();
        if text.is_empty() {
            break;
        }

        match chat.ask(text).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(err @ Error::Timeout { .. }) => println!("{} {err}", *helpers::WARN),
            Err(err) => println!("{} {err}", *helpers::FAIL),
        }
    }

    if let Some(context) = chat.context_id() {
        log::info!("conversation {context} closed");
    }
}

pub async fn cancel(config: &Config, endpoint: &str, task_id: &str) {
    let connection = connect(config, endpoint).await;

    match connection.cancel(task_id).await {
        Ok(snapshot) => println!("{} Task {} is {}", *helpers::SUCCESS, snapshot.id.bold(), snapshot.status.state),
        Err(err) => crashln!("{} Cancel failed: {err}", *helpers::FAIL),
    }
}

pub fn token(config: &Config, email: &str, ttl: i64) {
    let auth = &config.daemon.auth;
    let claims = Claims {
        sub: string!(email),
        email: string!(email),
        exp: chrono::Utc::now().timestamp() + ttl,
        aud: auth.audience.clone(),
        iss: Some(string!(env!("CARGO_PKG_NAME"))),
    };

    match HmacVerifier::new(&auth.secret, auth.audience.clone()).issue(&claims) {
        Ok(token) => println!("{token}"),
        Err(err) => crashln!("{} {err}", *helpers::FAIL),
    }
}
