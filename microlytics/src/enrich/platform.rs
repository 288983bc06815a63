//! User agent to platform classification.

use once_cell::sync::Lazy;
use regex::Regex;

/// Ordered so the more specific patterns win: "windows phone" before
/// "windows nt" would otherwise never match.
static PLATFORMS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)windows phone", "WindowsPhone"),
        (r"(?i)windows nt", "Windows"),
        (r"(?i)ipad", "iPad"),
        (r"(?i)ipod", "iPod"),
        (r"(?i)iphone", "iPhone"),
        (r"(?i)macintosh", "Mac"),
        (r"(?i)android", "Android"),
        (r"(?i)linux", "Linux"),
        (r"(?i)wii", "Wii"),
        (r"(?i)playstation", "Playstation"),
        (r"(?i)blackberry", "Blackberry"),
        (r"(?i)samsung", "Samsung"),
        (r"(?i)curl", "Curl"),
    ]
    .into_iter()
    .map(|(pattern, name)| (Regex::new(pattern).unwrap(), name))
    .collect()
});

/// Platform label for a user agent string, `unknown` when nothing
/// matches.
pub fn platform(user_agent: &str) -> String {
    PLATFORMS
        .iter()
        .find(|(regex, _)| regex.is_match(user_agent))
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_common_agents() {
        let cases = [
            (
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
                "Windows",
            ),
            (
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) Safari/605.1.15",
                "Mac",
            ),
            ("Mozilla/5.0 (X11; Linux x86_64) Firefox/122.0", "Linux"),
            (
                "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)",
                "iPhone",
            ),
            (
                "Mozilla/5.0 (Linux; Android 14; Pixel 8) Chrome/121.0",
                "Android",
            ),
            ("Mozilla/5.0 (Windows Phone 10.0)", "WindowsPhone"),
            ("curl/8.4.0", "Curl"),
            ("SomethingNew/1.0", "unknown"),
            ("", "unknown"),
        ];

        for (user_agent, expected) in cases {
            assert_eq!(platform(user_agent), expected, "agent: {}", user_agent);
        }
    }
}
