use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

pub const MAX_CAPTION_LEN: usize = 150;
pub const MAX_BIO_LEN: usize = 80;
pub const MAX_COMMENT_LEN: usize = 500;
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 24;

const RESERVED_USERNAMES: &[&str] = &["admin", "support", "cliptok", "official"];

static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").expect("hashtag regex"));
static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w+)").expect("mention regex"));

/// Compact counter display: 999 stays literal, thousands and millions get a
/// single decimal with trailing ".0" stripped.
pub fn format_count(count: u64) -> String {
    if count >= 1_000_000 {
        trim_decimal(count as f64 / 1_000_000.0, "M")
    } else if count >= 1_000 {
        trim_decimal(count as f64 / 1_000.0, "K")
    } else {
        count.to_string()
    }
}

fn trim_decimal(value: f64, suffix: &str) -> String {
    let text = format!("{:.1}", value);
    let text = text.strip_suffix(".0").unwrap_or(&text);
    format!("{}{}", text, suffix)
}

/// Seconds to M:SS. Anything non-positive renders as 0:00.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let total = seconds as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

pub fn format_relative(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(timestamp);
    let secs = elapsed.num_seconds();
    if secs < 60 {
        "Just now".to_string()
    } else if secs < 3_600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h ago", secs / 3_600)
    } else if secs < 604_800 {
        format!("{}d ago", secs / 86_400)
    } else {
        timestamp.format("%Y-%m-%d").to_string()
    }
}

pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let exponent = (bytes as f64).log(1024.0).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exponent as i32);
    if exponent == 0 {
        format!("{} {}", bytes, UNITS[exponent])
    } else {
        format!("{:.2} {}", value, UNITS[exponent])
    }
}

pub fn parse_hashtags(text: &str) -> Vec<String> {
    HASHTAG_RE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

pub fn parse_mentions(text: &str) -> Vec<String> {
    MENTION_RE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

pub fn validate_username(name: &str) -> Result<(), String> {
    let len = name.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(format!(
            "Username must be {}-{} characters.",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        ));
    }
    if !name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.')
    {
        return Err("Username may only contain letters, digits, '_' and '.'.".to_string());
    }
    if RESERVED_USERNAMES
        .iter()
        .any(|reserved| name.eq_ignore_ascii_case(reserved))
    {
        return Err("That username is reserved.".to_string());
    }
    Ok(())
}

pub fn validate_caption(caption: &str) -> Result<(), String> {
    if caption.chars().count() > MAX_CAPTION_LEN {
        return Err(format!(
            "Caption is too long. Maximum is {} characters.",
            MAX_CAPTION_LEN
        ));
    }
    Ok(())
}

pub fn validate_bio(bio: &str) -> Result<(), String> {
    if bio.chars().count() > MAX_BIO_LEN {
        return Err(format!(
            "Bio is too long. Maximum is {} characters.",
            MAX_BIO_LEN
        ));
    }
    Ok(())
}

pub fn validate_comment(text: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err("Please enter a comment.".to_string());
    }
    if text.chars().count() > MAX_COMMENT_LEN {
        return Err(format!(
            "Comment is too long. Maximum is {} characters.",
            MAX_COMMENT_LEN
        ));
    }
    Ok(())
}

/// Time source the feed engine and debouncers run against. Production code
/// uses [`SystemClock`]; tests drive a manual clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Trailing-edge debouncer: `ready` reports true once the settling window
/// has elapsed since the most recent `touch`.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_touch: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_touch: None,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_touch = Some(now);
    }

    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last_touch {
            Some(last) if now.duration_since(last) >= self.window => {
                self.last_touch = None;
                true
            }
            _ => false,
        }
    }

    pub fn pending(&self) -> bool {
        self.last_touch.is_some()
    }
}

/// Leading-edge throttle: the first call passes, later calls are dropped
/// until the limit elapses.
#[derive(Debug)]
pub struct Throttle {
    limit: Duration,
    last_pass: Option<Instant>,
}

impl Throttle {
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            last_pass: None,
        }
    }

    pub fn allow(&mut self, now: Instant) -> bool {
        match self.last_pass {
            Some(last) if now.duration_since(last) < self.limit => false,
            _ => {
                self.last_pass = Some(now);
                true
            }
        }
    }
}
