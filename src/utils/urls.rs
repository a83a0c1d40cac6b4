//! URL canonicalization for content deduplication.
//!
//! Every URL an adapter discovers is mapped to exactly one canonical string
//! before it touches the `contents` table. The mapping is pure: no I/O and
//! no randomness, so the same input always yields byte-identical output.

use std::sync::LazyLock;

use regex::Regex;
use url::{form_urlencoded, Url};

/// Query parameters that only carry attribution or analytics state.
pub const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "msclkid",
    "ref",
    "source",
    "campaign",
    "_ga",
    "_gid",
];

/// Parameters the blogging platform injects into shared links.
const MEDIUM_PARAMS: &[&str] = &["source", "sk"];

static ARXIV_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:v\d+)+$").expect("valid regex"));
static GIT_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\.git)+$").expect("valid regex"));
static GITHUB_TREE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/tree/[^/]+/?$").expect("valid regex"));
static REDDIT_THREAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(/r/[^/]+/comments/[^/]+)").expect("valid regex"));

/// Per-host normalization rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostRule {
    Arxiv,
    Youtube { short_link: bool },
    Github,
    Reddit,
    HackerNews,
    Medium,
    Generic,
}

impl HostRule {
    fn for_host(host: &str) -> Self {
        match host {
            "youtube.com" | "m.youtube.com" => Self::Youtube { short_link: false },
            "youtu.be" => Self::Youtube { short_link: true },
            "news.ycombinator.com" => Self::HackerNews,
            _ if is_or_subdomain_of(host, "arxiv.org") => Self::Arxiv,
            _ if is_or_subdomain_of(host, "github.com") => Self::Github,
            _ if is_or_subdomain_of(host, "reddit.com") => Self::Reddit,
            _ if is_or_subdomain_of(host, "medium.com") => Self::Medium,
            _ => Self::Generic,
        }
    }
}

fn is_or_subdomain_of(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Canonicalize a raw URL.
///
/// Returns `None` for empty input, non-http(s) schemes, or URLs without a
/// host.
pub fn canonicalize(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }

    let parsed = Url::parse(&lowered).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }

    let host = parsed.host_str()?;
    let mut host = host.strip_prefix("www.").unwrap_or(host).to_string();
    if host.is_empty() {
        return None;
    }

    // Trailing slashes go first so the per-host suffix rules see the real end.
    let mut path = parsed.path().trim_end_matches('/').to_string();
    let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();

    let query = match HostRule::for_host(&host) {
        HostRule::Arxiv => {
            path = ARXIV_VERSION.replace(&path, "").into_owned();
            String::new()
        }
        HostRule::Youtube { short_link } => {
            host = "youtube.com".to_string();
            let video_id = first_value(&pairs, "v").map(str::to_string).or_else(|| {
                short_link
                    .then(|| path.trim_matches('/').split('/').next().unwrap_or(""))
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
            });
            match video_id {
                Some(id) => {
                    path = "/watch".to_string();
                    encode_pairs(&[("v".to_string(), id)])
                }
                None => String::new(),
            }
        }
        HostRule::Github => {
            loop {
                let stripped = {
                    let no_tree = GITHUB_TREE.replace(&path, "");
                    let no_git = GIT_SUFFIX.replace(no_tree.trim_end_matches('/'), "");
                    no_git.trim_end_matches('/').to_string()
                };
                if stripped == path {
                    break;
                }
                path = stripped;
            }
            String::new()
        }
        HostRule::Reddit => {
            host = "reddit.com".to_string();
            if let Some(thread) = REDDIT_THREAD.captures(&path).and_then(|c| c.get(1)) {
                path = thread.as_str().to_string();
            }
            String::new()
        }
        HostRule::HackerNews => match first_value(&pairs, "id") {
            Some(id) => encode_pairs(&[("id".to_string(), id.to_string())]),
            None => String::new(),
        },
        HostRule::Medium => {
            let kept: Vec<(String, String)> = pairs
                .into_iter()
                .filter(|(k, _)| !MEDIUM_PARAMS.contains(&k.as_str()))
                .collect();
            clean_query(kept)
        }
        HostRule::Generic => clean_query(pairs),
    };

    let trimmed = path.trim_end_matches('/');
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();

    let mut result = format!("https://{}{}{}", host, port, trimmed);
    if !query.is_empty() {
        result.push('?');
        result.push_str(&query);
    }

    // Percent-escapes come back upper-case from the encoder; fold them so a
    // second pass is byte-identical.
    Some(result.to_lowercase())
}

/// Drop tracking parameters and sort the rest by key.
///
/// The sort is stable, so repeated keys keep their relative order.
pub fn strip_tracking_params(query: &str) -> String {
    let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    clean_query(pairs)
}

fn clean_query(pairs: Vec<(String, String)>) -> String {
    let mut kept: Vec<(String, String)> = pairs
        .into_iter()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.to_lowercase().as_str()))
        .collect();
    kept.sort_by(|a, b| a.0.cmp(&b.0));
    encode_pairs(&kept)
}

fn encode_pairs(pairs: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish()
}

fn first_value<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, v)| k == key && !v.is_empty())
        .map(|(_, v)| v.as_str())
}

/// Lower-cased host of a URL without a leading `www.`.
pub fn extract_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(url: &str) -> String {
        canonicalize(url).unwrap_or_else(|| panic!("rejected: {}", url))
    }

    #[test]
    fn test_basic_normalization() {
        assert_eq!(
            canon("  HTTP://WWW.Example.COM/page/  "),
            "https://example.com/page"
        );
        assert_eq!(
            canon("HTTP://WWW.Example.COM/Page/?utm_source=x&id=7"),
            "https://example.com/page?id=7"
        );
    }

    #[test]
    fn test_superficial_variants_collapse() {
        let expected = "https://example.com/a";
        assert_eq!(canon("https://www.example.com/a/"), expected);
        assert_eq!(canon("http://example.com/a"), expected);
        assert_eq!(canon("https://example.com/a?utm_source=x"), expected);
        assert_eq!(canon("https://example.com/a#section-2"), expected);
    }

    #[test]
    fn test_rejects_unusable_input() {
        assert_eq!(canonicalize(""), None);
        assert_eq!(canonicalize("   "), None);
        assert_eq!(canonicalize("not-a-url"), None);
        assert_eq!(canonicalize("ftp://example.com/file"), None);
        assert_eq!(canonicalize("mailto:someone@example.com"), None);
    }

    #[test]
    fn test_root_path_becomes_empty() {
        assert_eq!(canon("https://example.com/"), "https://example.com");
        assert_eq!(canon("https://example.com"), "https://example.com");
    }

    #[test]
    fn test_generic_params_sorted_and_tracking_removed() {
        assert_eq!(
            canon("https://example.com/p?z=1&a=2&fbclid=abc&UTM_MEDIUM=mail"),
            "https://example.com/p?a=2&z=1"
        );
        assert_eq!(canon("https://example.com/p?ref=hn"), "https://example.com/p");
    }

    #[test]
    fn test_arxiv_version_and_query_dropped() {
        assert_eq!(
            canon("https://arxiv.org/abs/2301.12345v2?context=cs"),
            "https://arxiv.org/abs/2301.12345"
        );
    }

    #[test]
    fn test_trailing_slash_does_not_hide_suffix_rules() {
        assert_eq!(
            canon("https://arxiv.org/abs/2301.12345v2/"),
            "https://arxiv.org/abs/2301.12345"
        );
        assert_eq!(
            canon("https://github.com/owner/repo.git/"),
            "https://github.com/owner/repo"
        );
    }

    #[test]
    fn test_youtube_variants_collapse() {
        let expected = "https://youtube.com/watch?v=abc123";
        assert_eq!(canon("https://youtu.be/abc123"), expected);
        assert_eq!(
            canon("https://www.youtube.com/watch?v=abc123&list=xyz"),
            expected
        );
        assert_eq!(canon("https://m.youtube.com/watch?v=abc123"), expected);
        assert_eq!(
            canon("https://www.youtube.com/channel/UC123?view=0"),
            "https://youtube.com/channel/uc123"
        );
    }

    #[test]
    fn test_github_tree_and_git_suffix() {
        assert_eq!(
            canon("https://github.com/owner/repo/tree/main/"),
            "https://github.com/owner/repo"
        );
        assert_eq!(
            canon("https://github.com/owner/repo.git?tab=readme"),
            "https://github.com/owner/repo"
        );
    }

    #[test]
    fn test_reddit_thread_prefix() {
        assert_eq!(
            canon("https://old.reddit.com/r/rust/comments/abc123/some_title/?utm_source=share"),
            "https://reddit.com/r/rust/comments/abc123"
        );
    }

    #[test]
    fn test_hackernews_keeps_only_id() {
        assert_eq!(
            canon("https://news.ycombinator.com/item?id=12345&p=2"),
            "https://news.ycombinator.com/item?id=12345"
        );
        assert_eq!(
            canon("https://news.ycombinator.com/news?p=2"),
            "https://news.ycombinator.com/news"
        );
    }

    #[test]
    fn test_medium_platform_params() {
        assert_eq!(
            canon("https://medium.com/@user/post-123?source=twitter&other=1"),
            "https://medium.com/@user/post-123?other=1"
        );
        assert_eq!(
            canon("https://blog.medium.com/post?sk=abc&utm_campaign=x"),
            "https://blog.medium.com/post"
        );
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "HTTP://WWW.Example.COM/Page/?utm_source=x&id=7",
            "https://example.com/caf%C3%A9?q=caf%C3%A9&b=a+b",
            "https://youtu.be/abc123",
            "https://news.ycombinator.com/item?id=1",
            "https://example.com:8080/x/?b=2&a=1",
            "https://github.com/o/r/tree/dev",
            "https://arxiv.org/abs/2301.12345v2/",
            "https://arxiv.org/abs/2301.12345v2v3",
            "https://github.com/o/r.git/",
            "https://github.com/o/r.git/tree/main",
        ];
        for input in inputs {
            let once = canon(input);
            assert_eq!(canon(&once), once, "not idempotent for {}", input);
        }
    }

    #[test]
    fn test_non_default_port_kept() {
        assert_eq!(canon("http://example.com:8080/x"), "https://example.com:8080/x");
    }

    #[test]
    fn test_strip_tracking_params() {
        assert_eq!(strip_tracking_params("b=2&utm_term=x&a=1"), "a=1&b=2");
        assert_eq!(strip_tracking_params(""), "");
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://WWW.Example.com/x"),
            Some("example.com".to_string())
        );
        assert_eq!(
            extract_domain("https://i.redd.it/a.png"),
            Some("i.redd.it".to_string())
        );
        assert_eq!(extract_domain("nope"), None);
    }
}
