//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! News-source URLs carry API keys in their query strings and article links
//! carry tracking tokens, so neither goes into a log field unredacted.

/// Drops userinfo, query and fragment from a URL.
///
/// - `https://newsdata.io/api/1/news?apikey=pub_1&q=x` → `https://newsdata.io/api/1/news`
/// - `https://user:pw@host/a#top` → `https://host/a`
/// - unparsable input → `<invalid url>`
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_username("");
            let _ = parsed.set_password(None);
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}

/// Truncates free text (article titles, analyzer stderr) for log fields.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_url_strips_api_key() {
        assert_eq!(
            redact_url("https://newsdata.io/api/1/news?apikey=pub_1&q=x"),
            "https://newsdata.io/api/1/news"
        );
    }

    #[test]
    fn test_redact_url_strips_userinfo_and_fragment() {
        assert_eq!(redact_url("https://user:pw@host.test/a#top"), "https://host.test/a");
    }

    #[test]
    fn test_redact_url_invalid() {
        assert_eq!(redact_url("not a url"), "<invalid url>");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }
}
