use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;

use crate::cache;
use crate::config;
use crate::data::{Dataset, FaultPolicy, FeedService, MockApi};
use crate::feed::{FeedEngine, FeedOptions, PlayerPort, PreloadPort};
use crate::model::Video;
use crate::format::SystemClock;
use crate::player::{MpvPlayer, NullPlayer, PlayerOptions};
use crate::session::Session;
use crate::ui;

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let config_path = config::default_path();
    let display_path = friendly_path(config_path.as_ref());

    let store = Arc::new(
        cache::Cache::open(cache::Options {
            path: cfg.cache.path.clone(),
            max_bytes: cfg.cache.max_bytes as i64,
        })
        .context("open cache")?,
    );

    let fault = if cfg.api.failure_rate <= 0.0 && cfg.api.latency_max_ms == 0 {
        FaultPolicy::None
    } else {
        FaultPolicy::randomized(
            cfg.api.latency_min_ms..cfg.api.latency_max_ms.max(cfg.api.latency_min_ms + 1),
            cfg.api.failure_rate,
            cfg.api.seed,
        )
    };
    let api = Arc::new(MockApi::new(Dataset::seeded(), fault, cfg.api.timeout));

    let mut session = Session::new(store.clone(), api.clone());
    {
        let api = api.clone();
        session
            .restore(move |token| api.restore_token(token))
            .context("restore session")?;
    }
    let status = match session.user() {
        Some(user) => format!(
            "Signed in as @{}. j/k to browse, space to pause, q to quit.",
            user.username
        ),
        None => "Browsing as a guest. Press L to sign in, j/k to browse, q to quit.".to_string(),
    };
    let session = Arc::new(Mutex::new(session));

    let player: Box<dyn PlayerPort> = if cfg.player.disabled {
        Box::new(NullPlayer)
    } else {
        Box::new(MpvPlayer::new(PlayerOptions {
            command: cfg.player.command.clone(),
            fullscreen: cfg.player.fullscreen,
            start_muted: cfg.player.start_muted,
        }))
    };

    let engine = FeedEngine::new(
        Vec::new(),
        FeedOptions {
            visibility_threshold: cfg.feed.visibility_threshold,
            swipe_min_px: cfg.feed.swipe_min_px,
            swipe_max: cfg.feed.swipe_max,
            settle_window: cfg.feed.settle_window,
            start_muted: cfg.player.start_muted,
        },
        Arc::new(SystemClock),
        player,
        Box::new(ServicePreload::new(api.clone())),
    );

    let options = ui::Options {
        status_message: status,
        videos: Vec::new(),
        engine,
        feed_service: api.clone(),
        comment_service: api.clone(),
        interaction_service: api.clone(),
        profile_service: api.clone(),
        search_service: api,
        cache: store,
        session,
        config_path: display_path,
    };

    let mut model = ui::Model::new(options);
    model.run()?;

    Ok(())
}

/// Production preload port: asks the service layer to start fetching the
/// next video's media on a worker thread, so `next()` lands on warm media.
pub struct ServicePreload {
    service: Arc<dyn FeedService>,
}

impl ServicePreload {
    pub fn new(service: Arc<dyn FeedService>) -> Self {
        Self { service }
    }
}

impl PreloadPort for ServicePreload {
    fn preload(&mut self, video: &Video) {
        let service = self.service.clone();
        let id = video.id;
        std::thread::spawn(move || {
            if let Err(err) = service.prefetch_media(id) {
                crate::player::debug_log(format!("preload of video {id} failed: {err}"));
            }
        });
    }
}

fn friendly_path(path: Option<&std::path::PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/clip-tui/config.yaml".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ApiError, ApiResult, VideoUpload};
    use crate::model::{FeedKind, Hashtag, Page, Privacy, Sound, User, VideoId};
    use std::time::Duration;

    struct RecordingFeed(crossbeam_channel::Sender<VideoId>);

    impl FeedService for RecordingFeed {
        fn list_feed(&self, _kind: FeedKind, _page: usize) -> ApiResult<Page<Video>> {
            Ok(Page::empty())
        }

        fn get_video(&self, _id: VideoId) -> ApiResult<Video> {
            Err(ApiError::NotFound("video"))
        }

        fn trending_videos(&self) -> ApiResult<Vec<Video>> {
            Ok(Vec::new())
        }

        fn trending_hashtags(&self) -> ApiResult<Vec<Hashtag>> {
            Ok(Vec::new())
        }

        fn upload_video(&self, _upload: VideoUpload) -> ApiResult<Video> {
            Err(ApiError::Unauthorized)
        }

        fn prefetch_media(&self, id: VideoId) -> ApiResult<String> {
            let _ = self.0.send(id);
            Ok(String::new())
        }
    }

    fn video(id: VideoId) -> Video {
        Video {
            id,
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
            media_url: format!("https://cdn.test/{id}.mp4"),
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
            created_at: chrono::Utc::now(),
            is_liked: false,
            is_saved: false,
        }
    }

    #[test]
    fn preload_asks_the_service_for_the_video() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut preload = ServicePreload::new(Arc::new(RecordingFeed(tx)));
        preload.preload(&video(7));
        let id = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(id, 7);
    }

    #[test]
    fn friendly_path_collapses_home() {
        if let Some(home) = dirs::home_dir() {
            let path = home.join(".config/clip-tui/config.yaml");
            assert_eq!(
                friendly_path(Some(&path)),
                "~/.config/clip-tui/config.yaml"
            );
        }
    }
}
