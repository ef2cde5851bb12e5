use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const KEY_PREFIX: &str = "cliptok.";

/// Bumped whenever the shape of a stored value changes; a mismatch on read
/// runs [`migrate_value`] before the value is returned.
pub const ENTRY_VERSION: i64 = 2;

pub const WATCH_HISTORY_CAP: usize = 100;
pub const WATCH_HISTORY_TRIMMED: usize = 50;
pub const RECENT_SEARCHES_CAP: usize = 20;
pub const AUTH_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub const KEY_AUTH_TOKEN: &str = "auth_token";
pub const KEY_WATCH_HISTORY: &str = "watch_history";
pub const KEY_RECENT_SEARCHES: &str = "recent_searches";
pub const KEY_APP_SETTINGS: &str = "app_settings";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache quota exceeded and eviction could not free enough space")]
    QuotaExceeded,
}

/// Entry class used by quota eviction: `Cache` rows go first, `History`
/// second, `Durable` rows are never evicted automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Durable,
    History,
    Cache,
}

impl Tag {
    fn as_str(self) -> &'static str {
        match self {
            Tag::Durable => "durable",
            Tag::History => "history",
            Tag::Cache => "cache",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    pub expires_in: Option<Duration>,
    pub tag: Option<Tag>,
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
    /// Total bytes of stored values before eviction kicks in. Zero means
    /// unlimited.
    pub max_bytes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchEntry {
    pub video_id: u64,
    pub timestamp: i64,
    pub watch_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppSettings {
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default = "default_true")]
    pub auto_play: bool,
    #[serde(default)]
    pub data_saver: bool,
    #[serde(default = "default_true")]
    pub start_muted: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            auto_play: true,
            data_saver: false,
            start_muted: true,
        }
    }
}

fn default_theme() -> String {
    "auto".into()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct Cache {
    conn: Arc<Mutex<Connection>>,
    max_bytes: i64,
}

impl Cache {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("cache: resolve default path")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cache: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("cache: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", &"WAL")
            .context("cache: set WAL")?;
        conn.pragma_update(None, "busy_timeout", &5000)
            .context("cache: set busy timeout")?;
        migrate(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_bytes: opts.max_bytes,
        })
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T, opts: SetOptions) -> Result<()> {
        let json = serde_json::to_string(value).context("cache: serialize value")?;
        let now = Utc::now();
        let expires_at = opts
            .expires_in
            .map(|ttl| now.timestamp_millis() + ttl.as_millis() as i64);
        let tag = opts.tag.unwrap_or(Tag::Durable);

        self.ensure_quota(json.len() as i64)?;

        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO kv_cache (key, value, tag, timestamp, expires_at, version)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(key) DO UPDATE SET
  value = excluded.value,
  tag = excluded.tag,
  timestamp = excluded.timestamp,
  expires_at = excluded.expires_at,
  version = excluded.version
"#,
            params![
                storage_key(key),
                json,
                tag.as_str(),
                now.timestamp_millis(),
                expires_at,
                ENTRY_VERSION,
            ],
        )
        .context("cache: write entry")?;
        Ok(())
    }

    /// Returns `None` (and deletes the row) when the entry is missing or
    /// expired. A version mismatch migrates the value in place first.
    pub fn get<T: DeserializeOwned + Serialize>(&self, key: &str) -> Result<Option<T>> {
        let row = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT value, expires_at, version FROM kv_cache WHERE key = ?1",
                params![storage_key(key)],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()
            .context("cache: query entry")?
        };

        let Some((json, expires_at, version)) = row else {
            return Ok(None);
        };

        if let Some(expiry) = expires_at {
            if Utc::now().timestamp_millis() >= expiry {
                self.remove(key)?;
                return Ok(None);
            }
        }

        let mut value: serde_json::Value =
            serde_json::from_str(&json).context("cache: parse entry")?;
        if version != ENTRY_VERSION {
            value = migrate_value(key, value, version);
            let migrated: T = serde_json::from_value(value.clone())
                .context("cache: decode migrated entry")?;
            // Rewrite in place so the row keeps its tag, timestamp and
            // expiry; only the value shape and version change.
            let json = serde_json::to_string(&value).context("cache: serialize migrated entry")?;
            let conn = self.conn.lock();
            conn.execute(
                "UPDATE kv_cache SET value = ?1, version = ?2 WHERE key = ?3",
                params![json, ENTRY_VERSION, storage_key(key)],
            )
            .context("cache: persist migrated entry")?;
            return Ok(Some(migrated));
        }

        serde_json::from_value(value)
            .map(Some)
            .context("cache: decode entry")
    }

    pub fn get_or<T: DeserializeOwned + Serialize>(&self, key: &str, default: T) -> T {
        self.get(key).ok().flatten().unwrap_or(default)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM kv_cache WHERE key = ?1",
            params![storage_key(key)],
        )
        .context("cache: delete entry")?;
        Ok(())
    }

    pub fn clear(&self, only_app_data: bool) -> Result<()> {
        let conn = self.conn.lock();
        if only_app_data {
            conn.execute(
                "DELETE FROM kv_cache WHERE key LIKE ?1",
                params![format!("{}%", KEY_PREFIX)],
            )
            .context("cache: clear app entries")?;
        } else {
            conn.execute("DELETE FROM kv_cache", [])
                .context("cache: clear all entries")?;
        }
        Ok(())
    }

    pub fn total_bytes(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let total: Option<i64> = conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(value)), 0) FROM kv_cache",
                [],
                |row| row.get(0),
            )
            .context("cache: total size")?;
        Ok(total.unwrap_or(0))
    }

    fn ensure_quota(&self, incoming_bytes: i64) -> Result<()> {
        if self.max_bytes <= 0 {
            return Ok(());
        }
        if self.total_bytes()? + incoming_bytes <= self.max_bytes {
            return Ok(());
        }

        // First pass: drop every cache-tagged entry; they can be refetched.
        {
            let conn = self.conn.lock();
            conn.execute(
                "DELETE FROM kv_cache WHERE tag = 'cache'",
                [],
            )
            .context("cache: evict cache-tagged entries")?;
        }
        if self.total_bytes()? + incoming_bytes <= self.max_bytes {
            return Ok(());
        }

        // Second pass: trim watch history down to the smaller cap.
        let history = self.watch_history()?;
        if history.len() > WATCH_HISTORY_TRIMMED {
            let trimmed: Vec<WatchEntry> =
                history.into_iter().take(WATCH_HISTORY_TRIMMED).collect();
            let json = serde_json::to_string(&trimmed).context("cache: serialize history")?;
            let conn = self.conn.lock();
            conn.execute(
                "UPDATE kv_cache SET value = ?1 WHERE key = ?2",
                params![json, storage_key(KEY_WATCH_HISTORY)],
            )
            .context("cache: trim watch history")?;
        }
        if self.total_bytes()? + incoming_bytes <= self.max_bytes {
            return Ok(());
        }

        Err(CacheError::QuotaExceeded.into())
    }

    // Typed helpers.

    pub fn set_auth_token(&self, token: &str) -> Result<()> {
        self.set(
            KEY_AUTH_TOKEN,
            &token.to_string(),
            SetOptions {
                expires_in: Some(AUTH_TOKEN_TTL),
                tag: Some(Tag::Durable),
            },
        )
    }

    pub fn auth_token(&self) -> Result<Option<String>> {
        self.get(KEY_AUTH_TOKEN)
    }

    pub fn clear_auth_token(&self) -> Result<()> {
        self.remove(KEY_AUTH_TOKEN)
    }

    /// Most-recent-first, deduplicated by video, capped at 100 entries.
    pub fn push_watch_history(&self, video_id: u64, now: DateTime<Utc>) -> Result<()> {
        let mut history = self.watch_history()?;
        if let Some(pos) = history.iter().position(|entry| entry.video_id == video_id) {
            let mut entry = history.remove(pos);
            entry.timestamp = now.timestamp_millis();
            entry.watch_count += 1;
            history.insert(0, entry);
        } else {
            history.insert(
                0,
                WatchEntry {
                    video_id,
                    timestamp: now.timestamp_millis(),
                    watch_count: 1,
                },
            );
        }
        history.truncate(WATCH_HISTORY_CAP);
        self.set(
            KEY_WATCH_HISTORY,
            &history,
            SetOptions {
                expires_in: None,
                tag: Some(Tag::History),
            },
        )
    }

    pub fn watch_history(&self) -> Result<Vec<WatchEntry>> {
        Ok(self.get(KEY_WATCH_HISTORY)?.unwrap_or_default())
    }

    pub fn push_recent_search(&self, query: &str) -> Result<()> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(());
        }
        let mut searches: Vec<String> = self.get(KEY_RECENT_SEARCHES)?.unwrap_or_default();
        searches.retain(|existing| existing != query);
        searches.insert(0, query.to_string());
        searches.truncate(RECENT_SEARCHES_CAP);
        self.set(
            KEY_RECENT_SEARCHES,
            &searches,
            SetOptions {
                expires_in: None,
                tag: Some(Tag::History),
            },
        )
    }

    pub fn recent_searches(&self) -> Result<Vec<String>> {
        Ok(self.get(KEY_RECENT_SEARCHES)?.unwrap_or_default())
    }

    /// Shallow merge: keys present in `patch` replace stored ones, the rest
    /// are kept.
    pub fn merge_settings(&self, patch: serde_json::Value) -> Result<AppSettings> {
        let current = self.settings();
        let mut merged =
            serde_json::to_value(&current).context("cache: serialize settings")?;
        if let (Some(base), Some(patch)) = (merged.as_object_mut(), patch.as_object()) {
            for (key, value) in patch {
                base.insert(key.clone(), value.clone());
            }
        }
        let settings: AppSettings =
            serde_json::from_value(merged).context("cache: decode merged settings")?;
        self.set(KEY_APP_SETTINGS, &settings, SetOptions::default())?;
        Ok(settings)
    }

    pub fn settings(&self) -> AppSettings {
        self.get_or(KEY_APP_SETTINGS, AppSettings::default())
    }
}

fn storage_key(key: &str) -> String {
    format!("{}{}", KEY_PREFIX, key)
}

/// Entry-shape migrations. Version 1 settings predate `data_saver` and
/// `start_muted`; serde defaults fill them in, so passing the value through
/// unchanged is enough for now.
fn migrate_value(key: &str, value: serde_json::Value, from_version: i64) -> serde_json::Value {
    match (key, from_version) {
        (KEY_APP_SETTINGS, 1) => value,
        _ => value,
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
)
"#,
        [],
    )?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for (idx, sql) in migrations().iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, Utc::now().timestamp()],
        )?;
    }
    Ok(())
}

fn migrations() -> Vec<&'static str> {
    vec![
        r#"
CREATE TABLE IF NOT EXISTS kv_cache (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  tag TEXT NOT NULL DEFAULT 'durable',
  timestamp INTEGER NOT NULL,
  expires_at INTEGER,
  version INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_kv_cache_tag ON kv_cache(tag);
CREATE INDEX IF NOT EXISTS idx_kv_cache_timestamp ON kv_cache(timestamp);
"#,
    ]
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("clip-tui").join("cache.db"))
}
