use std::fs::OpenOptions;
use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::OnceCell;
use rand::{distributions::Alphanumeric, Rng};
use serde_json::json;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::feed::{PlayAttempt, PlayerPort};
use crate::model::Video;

fn player_debug_enabled() -> bool {
    static FLAG: OnceCell<bool> = OnceCell::new();
    *FLAG.get_or_init(|| {
        std::env::var("CLIPTUI_DEBUG_PLAYER")
            .map(|val| {
                let trimmed = val.trim();
                !(trimmed.is_empty()
                    || trimmed.eq_ignore_ascii_case("0")
                    || trimmed.eq_ignore_ascii_case("false")
                    || trimmed.eq_ignore_ascii_case("no")
                    || trimmed.eq_ignore_ascii_case("off"))
            })
            .unwrap_or(false)
    })
}

fn player_debug_writer() -> Option<&'static Mutex<std::fs::File>> {
    static WRITER: OnceCell<Option<Mutex<std::fs::File>>> = OnceCell::new();
    WRITER
        .get_or_init(|| {
            std::env::var("CLIPTUI_DEBUG_PLAYER_LOG")
                .ok()
                .and_then(|path| {
                    OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path)
                        .map(Mutex::new)
                        .ok()
                })
        })
        .as_ref()
}

pub fn debug_log(message: impl AsRef<str>) {
    if !player_debug_enabled() {
        return;
    }
    if let Some(writer) = player_debug_writer() {
        if let Ok(mut file) = writer.lock() {
            let _ = writeln!(file, "{}", message.as_ref());
            return;
        }
    }
    eprintln!("{}", message.as_ref());
}

#[derive(Debug, Clone)]
pub struct PlayerOptions {
    /// Player binary; anything with an mpv-compatible CLI and IPC works.
    pub command: String,
    pub fullscreen: bool,
    pub start_muted: bool,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            command: "mpv".to_string(),
            fullscreen: false,
            start_muted: true,
        }
    }
}

/// External playback over mpv. One process at a time; switching videos
/// replaces it. Pause is toggled over mpv's IPC socket so the process
/// survives across pause/resume.
pub struct MpvPlayer {
    options: PlayerOptions,
    child: Option<Child>,
    ipc_path: Option<String>,
    current: Option<crate::model::VideoId>,
}

impl MpvPlayer {
    pub fn new(options: PlayerOptions) -> Self {
        Self {
            options,
            child: None,
            ipc_path: None,
            current: None,
        }
    }

    fn spawn(&mut self, video: &Video) -> Result<()> {
        if video.media_url.trim().is_empty() {
            return Err(anyhow!("video URL missing"));
        }
        let ipc_path = unique_ipc_path();
        #[cfg(unix)]
        if let Some(path) = &ipc_path {
            if let Err(err) = std::fs::remove_file(path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    debug_log(format!("failed to remove stale mpv ipc path {path}: {err}"));
                }
            }
        }

        let mut args = vec![video.media_url.clone()];
        if self.options.fullscreen {
            args.push("--fullscreen".to_string());
        }
        if self.options.start_muted {
            args.push("--mute=yes".to_string());
        }
        args.push("--force-window=yes".to_string());
        args.push("--keep-open=no".to_string());
        args.push("--loop-file=inf".to_string());
        args.push("--really-quiet".to_string());
        args.push("--no-config".to_string());
        args.push("--ytdl=no".to_string());
        args.push("--osc=no".to_string());
        if let Some(path) = &ipc_path {
            args.push(format!("--input-ipc-server={path}"));
        }
        if !video.caption.is_empty() {
            args.push(format!("--force-media-title={}", video.caption));
        }
        if player_debug_enabled() {
            debug_log(format!("mpv args: {args:?}"));
        }

        let mut command = Command::new(&self.options.command);
        for arg in &args {
            command.arg(arg);
        }
        command.stdin(Stdio::null());
        command.stdout(Stdio::null());
        command.stderr(Stdio::null());

        let child = command
            .spawn()
            .with_context(|| format!("launch {} for {}", self.options.command, video.media_url))?;
        self.child = Some(child);
        self.ipc_path = ipc_path;
        Ok(())
    }

    fn kill_child(&mut self) {
        self.current = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        #[cfg(unix)]
        if let Some(path) = self.ipc_path.take() {
            if let Err(err) = std::fs::remove_file(&path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    debug_log(format!("failed to remove mpv ipc path {path}: {err}"));
                }
            }
        }
        #[cfg(not(unix))]
        {
            self.ipc_path = None;
        }
    }

    fn send_pause(&self, paused: bool) -> Result<()> {
        self.send_property("pause", paused)
    }

    fn send_mute(&self, muted: bool) -> Result<()> {
        self.send_property("mute", muted)
    }

    fn send_property(&self, property: &str, value: bool) -> Result<()> {
        let Some(path) = &self.ipc_path else {
            return Err(anyhow!("player controls are not available"));
        };
        let payload = json!({ "command": ["set_property", property, value] });
        let serialized = serde_json::to_string(&payload).context("serialize mpv command")?;
        send_ipc_command(path, &serialized)
    }
}

impl PlayerPort for MpvPlayer {
    fn play(&mut self, video: &Video) -> PlayAttempt {
        // A resume on the already-loaded video only needs an unpause.
        if self.current == Some(video.id) && self.child.is_some() && self.send_pause(false).is_ok()
        {
            return PlayAttempt::Started;
        }
        self.kill_child();
        match self.spawn(video) {
            Ok(()) => {
                self.current = Some(video.id);
                PlayAttempt::Started
            }
            Err(err) => {
                debug_log(format!("player launch failed: {err:#}"));
                PlayAttempt::Rejected
            }
        }
    }

    fn pause(&mut self) {
        if let Err(err) = self.send_pause(true) {
            debug_log(format!("player pause failed: {err:#}"));
        }
    }

    fn stop(&mut self) {
        self.kill_child();
    }

    fn set_muted(&mut self, muted: bool) {
        // Remember the flag for the next spawn too, not just this process.
        self.options.start_muted = muted;
        if self.child.is_some() {
            if let Err(err) = self.send_mute(muted) {
                debug_log(format!("player mute failed: {err:#}"));
            }
        }
    }
}

impl Drop for MpvPlayer {
    fn drop(&mut self) {
        self.kill_child();
    }
}

/// Playback stub for headless runs: every play attempt succeeds and nothing
/// is spawned.
#[derive(Debug, Default)]
pub struct NullPlayer;

impl PlayerPort for NullPlayer {
    fn play(&mut self, _video: &Video) -> PlayAttempt {
        PlayAttempt::Started
    }

    fn pause(&mut self) {}

    fn stop(&mut self) {}

    fn set_muted(&mut self, _muted: bool) {}
}

#[cfg(unix)]
fn send_ipc_command(path: &str, serialized: &str) -> Result<()> {
    let mut stream =
        UnixStream::connect(path).with_context(|| format!("connect to mpv IPC socket {path}"))?;
    stream
        .write_all(serialized.as_bytes())
        .context("write mpv IPC command")?;
    stream
        .write_all(b"\n")
        .context("write mpv IPC command terminator")?;
    Ok(())
}

#[cfg(target_os = "windows")]
fn send_ipc_command(path: &str, serialized: &str) -> Result<()> {
    use std::io::ErrorKind;
    use std::time::Duration;

    const PIPE_RETRIES: usize = 5;
    const PIPE_RETRY_DELAY: Duration = Duration::from_millis(100);

    for attempt in 0..PIPE_RETRIES {
        match OpenOptions::new().read(true).write(true).open(path) {
            Ok(mut pipe) => {
                pipe.write_all(serialized.as_bytes())
                    .with_context(|| format!("write mpv IPC command to {path}"))?;
                pipe.write_all(b"\n")
                    .with_context(|| format!("write mpv IPC command terminator to {path}"))?;
                pipe.flush().ok();
                return Ok(());
            }
            Err(err) if err.kind() == ErrorKind::NotFound && attempt + 1 < PIPE_RETRIES => {
                std::thread::sleep(PIPE_RETRY_DELAY);
            }
            Err(err) => {
                return Err(anyhow!(err)).context(format!("connect to mpv IPC named pipe {path}"));
            }
        }
    }

    Err(anyhow!("connect to mpv IPC named pipe {}", path))
}

#[cfg(all(not(unix), not(target_os = "windows")))]
fn send_ipc_command(_path: &str, _serialized: &str) -> Result<()> {
    Err(anyhow!("player controls are not supported on this platform"))
}

#[cfg(unix)]
fn unique_ipc_path() -> Option<String> {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    let mut path = std::env::temp_dir();
    path.push(format!("cliptui-mpv-{}-{suffix}.sock", std::process::id()));
    Some(path.to_string_lossy().to_string())
}

#[cfg(target_os = "windows")]
fn unique_ipc_path() -> Option<String> {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    Some(format!(
        r"\\.\pipe\cliptui-mpv-{}-{suffix}",
        std::process::id()
    ))
}

#[cfg(all(not(unix), not(target_os = "windows")))]
fn unique_ipc_path() -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Privacy, Sound, User};
    use chrono::Utc;

    fn video(url: &str) -> Video {
        Video {
            id: 1,
            user: User {
                id: 1,
                username: "tester".into(),
                display_name: "Tester".into(),
                avatar_url: String::new(),
                bio: String::new(),
                verified: false,
                followers: 0,
                following: 0,
                is_following: false,
            },
            media_url: url.to_string(),
            thumbnail_url: String::new(),
            caption: String::new(),
            duration_secs: 10,
            likes: 0,
            comments: 0,
            shares: 0,
            views: 0,
            sound: Sound {
                name: String::new(),
                url: String::new(),
            },
            tags: Vec::new(),
            privacy: Privacy::Public,
            created_at: Utc::now(),
            is_liked: false,
            is_saved: false,
        }
    }

    #[test]
    fn missing_binary_maps_to_rejection() {
        let mut player = MpvPlayer::new(PlayerOptions {
            command: "definitely-not-a-player-binary".into(),
            ..PlayerOptions::default()
        });
        assert_eq!(
            player.play(&video("https://cdn.test/1.mp4")),
            PlayAttempt::Rejected
        );
    }

    #[test]
    fn empty_url_is_rejected_without_spawning() {
        let mut player = MpvPlayer::new(PlayerOptions::default());
        assert_eq!(player.play(&video("   ")), PlayAttempt::Rejected);
    }

    #[test]
    fn null_player_always_starts() {
        let mut player = NullPlayer;
        assert_eq!(
            player.play(&video("https://cdn.test/1.mp4")),
            PlayAttempt::Started
        );
    }
}
