use clap::ValueEnum;

/// How listing commands print agents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    #[default]
    Default,
    Json,
    Raw,
}

/// Where `ask` sends its question.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// Let the directory pick the best match for the question.
    Search,
    Endpoint(String),
}

impl From<Option<String>> for Target {
    fn from(endpoint: Option<String>) -> Self {
        match endpoint {
            Some(endpoint) if !endpoint.trim().is_empty() => Target::Endpoint(endpoint),
            _ => Target::Search,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_endpoint_falls_back_to_search() {
        assert_eq!(Target::from(None), Target::Search);
        assert_eq!(Target::from(Some("  ".to_string())), Target::Search);
        assert_eq!(Target::from(Some("http://a".to_string())), Target::Endpoint("http://a".to_string()));
    }
}
