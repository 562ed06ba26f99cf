//! Text helpers for logs and user-facing replies.

use std::sync::LazyLock;

use regex::Regex;

/// `<numeric bot id>:<secret>`, the shape of a Telegram bot token.
static BOT_TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{6,}:[A-Za-z0-9_-]{30,}").unwrap());

/// First `max_chars` characters of `s`, with "..." appended when cut.
pub fn preview(s: &str, max_chars: usize) -> String {
    let mut chars = s.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head.trim_end())
    } else {
        head
    }
}

/// Replace every occurrence of a known `secret` in `s`.
///
/// Bot tokens end up in API and webhook URLs; anything logged goes through here.
pub fn redact_secret(s: &str, secret: &str) -> String {
    if secret.is_empty() {
        return s.to_string();
    }
    s.replace(secret, "***REDACTED***")
}

/// Mask anything shaped like a bot token, for text whose secrets are unknown.
pub fn mask_bot_tokens(s: &str) -> String {
    BOT_TOKEN_PATTERN
        .replace_all(s, "***REDACTED_BOT_TOKEN***")
        .into_owned()
}

/// Size in binary units, e.g. `20 MB` or `1.5 KB`.
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    match unit {
        0 => format!("{bytes} B"),
        _ if value.fract() == 0.0 => format!("{value:.0} {}", UNITS[unit]),
        _ => format!("{value:.1} {}", UNITS[unit]),
    }
}
