use colored::Colorize;
use once_cell::sync::Lazy;

pub static SUCCESS: Lazy<colored::ColoredString> = Lazy::new(|| "[AGENTDIR]".green());
pub static FAIL: Lazy<colored::ColoredString> = Lazy::new(|| "[AGENTDIR]".red());
pub static WARN: Lazy<colored::ColoredString> = Lazy::new(|| "[AGENTDIR]".yellow());

/// Strip trailing slashes so `http://a/` and `http://a` name the same agent.
pub fn normalize_url(url: &str) -> String { url.trim().trim_end_matches('/').to_string() }

/// Shorten long text for table cells.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((index, _)) => format!("{}…", &text[..index]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_trailing_slashes() {
        assert_eq!(normalize_url("http://a.local//"), "http://a.local");
        assert_eq!(normalize_url(" http://a.local/x "), "http://a.local/x");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo world", 5), "héllo…");
        assert_eq!(truncate("short", 10), "short");
    }
}
