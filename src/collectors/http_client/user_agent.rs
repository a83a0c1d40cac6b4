//! User agent handling for HTTP requests.

/// Browser user agent sent by default; several APIs reject generic clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Identifying user agent for operators who prefer to announce themselves.
pub const BOT_USER_AGENT: &str = concat!("aggre/", env!("CARGO_PKG_VERSION"));

/// Resolve user agent from config value.
/// - None => default browser user agent
/// - "bot" => identifying aggre user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        None | Some("") => USER_AGENT.to_string(),
        Some("bot") => BOT_USER_AGENT.to_string(),
        Some(custom) => custom.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_user_agent_default() {
        let ua = resolve_user_agent(None);
        assert!(ua.contains("Mozilla"));
    }

    #[test]
    fn test_resolve_user_agent_bot() {
        let ua = resolve_user_agent(Some("bot"));
        assert!(ua.starts_with("aggre/"));
    }

    #[test]
    fn test_resolve_user_agent_custom() {
        let ua = resolve_user_agent(Some("MyBot/1.0"));
        assert_eq!(ua, "MyBot/1.0");
    }
}
