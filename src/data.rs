use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::format;
use crate::model::{
    Comment, CommentId, FeedKind, FollowOutcome, Hashtag, LikeOutcome, Notification,
    NotificationKind, Page, Privacy, SaveOutcome, SearchKind, SearchResults, ShareOutcome, Sound,
    User, UserId, Video, VideoId, MAX_UPLOAD_BYTES,
};

pub const FEED_PAGE_SIZE: usize = 5;
pub const COMMENT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("sign in to do that")]
    Unauthorized,
    #[error("{0}")]
    Transient(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Transient errors are retryable and roll back optimistic state;
    /// everything else is a terminal answer from the service.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transient(_))
    }
}

/// Injectable latency/failure strategy for the mock service. Production
/// config uses `Randomized`; tests pin deterministic variants so every
/// scenario is reproducible.
#[derive(Debug)]
pub enum FaultPolicy {
    /// No delay, no failures.
    None,
    /// Fixed delay before every call, never fails.
    Delay(Duration),
    /// Seeded random latency in `latency_ms` and failures at `failure_rate`.
    Randomized {
        latency_ms: std::ops::Range<u64>,
        failure_rate: f64,
        rng: Mutex<StdRng>,
    },
    /// Fail the next `n` calls with a transient error, then succeed.
    FailNext(Mutex<u32>),
}

impl FaultPolicy {
    pub fn randomized(latency_ms: std::ops::Range<u64>, failure_rate: f64, seed: u64) -> Self {
        FaultPolicy::Randomized {
            latency_ms,
            failure_rate,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn fail_next(count: u32) -> Self {
        FaultPolicy::FailNext(Mutex::new(count))
    }

    fn apply(&self, timeout: Duration) -> ApiResult<()> {
        match self {
            FaultPolicy::None => Ok(()),
            FaultPolicy::Delay(delay) => sleep_or_time_out(*delay, timeout),
            FaultPolicy::Randomized {
                latency_ms,
                failure_rate,
                rng,
            } => {
                let (delay_ms, fails) = {
                    let mut rng = rng.lock();
                    let delay_ms = if latency_ms.is_empty() {
                        0
                    } else {
                        rng.gen_range(latency_ms.clone())
                    };
                    (delay_ms, rng.gen_bool(*failure_rate))
                };
                sleep_or_time_out(Duration::from_millis(delay_ms), timeout)?;
                if fails {
                    Err(ApiError::Transient("mock service error".into()))
                } else {
                    Ok(())
                }
            }
            FaultPolicy::FailNext(remaining) => {
                let mut remaining = remaining.lock();
                if *remaining > 0 {
                    *remaining -= 1;
                    Err(ApiError::Transient("mock service error".into()))
                } else {
                    Ok(())
                }
            }
        }
    }
}

fn sleep_or_time_out(delay: Duration, timeout: Duration) -> ApiResult<()> {
    if !timeout.is_zero() && delay > timeout {
        std::thread::sleep(timeout);
        return Err(ApiError::Transient("request timed out".into()));
    }
    std::thread::sleep(delay);
    Ok(())
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub display_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub user: User,
    pub videos: Vec<Video>,
    pub total_likes: u64,
}

#[derive(Debug, Clone)]
pub struct VideoUpload {
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub caption: String,
    pub privacy: Privacy,
    pub duration_secs: u32,
}

pub trait FeedService: Send + Sync {
    fn list_feed(&self, kind: FeedKind, page: usize) -> ApiResult<Page<Video>>;
    fn get_video(&self, id: VideoId) -> ApiResult<Video>;
    fn trending_videos(&self) -> ApiResult<Vec<Video>>;
    fn trending_hashtags(&self) -> ApiResult<Vec<Hashtag>>;
    fn upload_video(&self, upload: VideoUpload) -> ApiResult<Video>;
    /// Warm the media for a video about to come on screen. Unlike
    /// `get_video` this is not a view: the count stays untouched.
    fn prefetch_media(&self, id: VideoId) -> ApiResult<String>;
}

pub trait CommentService: Send + Sync {
    fn list_comments(&self, video: VideoId, cursor: Option<CommentId>)
        -> ApiResult<Page<Comment>>;
    fn post_comment(&self, video: VideoId, text: &str) -> ApiResult<Comment>;
    fn toggle_comment_like(&self, comment: CommentId) -> ApiResult<LikeOutcome>;
}

pub trait InteractionService: Send + Sync {
    fn toggle_like(&self, video: VideoId) -> ApiResult<LikeOutcome>;
    fn toggle_save(&self, video: VideoId) -> ApiResult<SaveOutcome>;
    fn share_video(&self, video: VideoId) -> ApiResult<ShareOutcome>;
    fn toggle_follow(&self, user: UserId) -> ApiResult<FollowOutcome>;
}

pub trait ProfileService: Send + Sync {
    fn login(&self, email: &str, password: &str) -> ApiResult<LoginResponse>;
    fn register(&self, registration: Registration) -> ApiResult<User>;
    fn logout(&self) -> ApiResult<()>;
    fn current_user(&self) -> ApiResult<User>;
    fn get_profile(&self, username: &str) -> ApiResult<Profile>;
    fn update_profile(&self, update: ProfileUpdate) -> ApiResult<User>;
    fn notifications(&self) -> ApiResult<Vec<Notification>>;
    fn mark_notification_read(&self, id: u64) -> ApiResult<()>;
}

pub trait SearchService: Send + Sync {
    fn search(&self, query: &str, kind: SearchKind) -> ApiResult<SearchResults>;
}

/// The in-memory world the mock service operates on. Toggles are the only
/// mutation path for like/save/follow state, so duplicates are impossible
/// by construction.
pub struct Dataset {
    pub current_user: User,
    pub users: Vec<User>,
    pub videos: Vec<Video>,
    pub comments: Vec<Comment>,
    pub hashtags: Vec<Hashtag>,
    pub notifications: Vec<Notification>,
    next_video_id: VideoId,
    next_comment_id: CommentId,
}

impl Dataset {
    pub fn seeded() -> Self {
        let users = seed_users();
        let videos = seed_videos(&users);
        let comments = seed_comments(&users);
        Self {
            current_user: User {
                id: 1001,
                username: "your_username".into(),
                display_name: "Your Name".into(),
                avatar_url: "https://cdn.cliptok.test/avatars/you.jpg".into(),
                bio: "This is my awesome bio!".into(),
                verified: false,
                followers: 1_234,
                following: 567,
                is_following: false,
            },
            users,
            videos,
            comments,
            hashtags: seed_hashtags(),
            notifications: seed_notifications(),
            next_video_id: 100,
            next_comment_id: 100,
        }
    }

    fn video_mut(&mut self, id: VideoId) -> ApiResult<&mut Video> {
        self.videos
            .iter_mut()
            .find(|video| video.id == id)
            .ok_or(ApiError::NotFound("video"))
    }

    fn user_mut(&mut self, id: UserId) -> ApiResult<&mut User> {
        self.users
            .iter_mut()
            .find(|user| user.id == id)
            .ok_or(ApiError::NotFound("user"))
    }
}

pub struct MockApi {
    dataset: Arc<Mutex<Dataset>>,
    fault: FaultPolicy,
    timeout: Duration,
    token: Mutex<Option<String>>,
}

impl MockApi {
    pub fn new(dataset: Dataset, fault: FaultPolicy, timeout: Duration) -> Self {
        Self {
            dataset: Arc::new(Mutex::new(dataset)),
            fault,
            timeout,
            token: Mutex::new(None),
        }
    }

    pub fn seeded(fault: FaultPolicy) -> Self {
        Self::new(Dataset::seeded(), fault, Duration::from_secs(10))
    }

    /// Adopt a token restored from the persistent cache.
    pub fn restore_token(&self, token: String) {
        *self.token.lock() = Some(token);
    }

    fn call(&self) -> ApiResult<()> {
        self.fault.apply(self.timeout)
    }

    fn require_auth(&self) -> ApiResult<()> {
        if self.token.lock().is_some() {
            Ok(())
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}

impl FeedService for MockApi {
    fn list_feed(&self, kind: FeedKind, page: usize) -> ApiResult<Page<Video>> {
        self.call()?;
        let dataset = self.dataset.lock();
        let filtered: Vec<Video> = match kind {
            FeedKind::ForYou => dataset.videos.clone(),
            FeedKind::Following => dataset
                .videos
                .iter()
                .filter(|video| video.user.is_following)
                .cloned()
                .collect(),
        };
        let start = page.saturating_sub(1) * FEED_PAGE_SIZE;
        let end = (start + FEED_PAGE_SIZE).min(filtered.len());
        let items = if start < filtered.len() {
            filtered[start..end].to_vec()
        } else {
            Vec::new()
        };
        Ok(Page {
            has_more: end < filtered.len(),
            items,
        })
    }

    /// Reading a video bumps its view count, matching the service's side
    /// effect on fetch.
    fn get_video(&self, id: VideoId) -> ApiResult<Video> {
        self.call()?;
        let mut dataset = self.dataset.lock();
        let video = dataset.video_mut(id)?;
        video.views = video.views.saturating_add(1);
        Ok(video.clone())
    }

    fn trending_videos(&self) -> ApiResult<Vec<Video>> {
        self.call()?;
        let dataset = self.dataset.lock();
        let mut videos = dataset.videos.clone();
        videos.sort_by(|a, b| b.views.cmp(&a.views));
        videos.truncate(10);
        Ok(videos)
    }

    fn trending_hashtags(&self) -> ApiResult<Vec<Hashtag>> {
        self.call()?;
        let dataset = self.dataset.lock();
        let mut tags = dataset.hashtags.clone();
        tags.sort_by(|a, b| b.views.cmp(&a.views));
        Ok(tags)
    }

    fn upload_video(&self, upload: VideoUpload) -> ApiResult<Video> {
        self.require_auth()?;
        if !upload.mime_type.starts_with("video/") {
            return Err(ApiError::Validation(
                "Only video files can be uploaded.".into(),
            ));
        }
        if upload.size_bytes > MAX_UPLOAD_BYTES {
            return Err(ApiError::Validation(
                "Video file is too large. Maximum size is 100MB.".into(),
            ));
        }
        format::validate_caption(&upload.caption).map_err(ApiError::Validation)?;
        self.call()?;

        let mut dataset = self.dataset.lock();
        let id = dataset.next_video_id;
        dataset.next_video_id += 1;
        let owner = dataset.current_user.clone();
        let video = Video {
            id,
            media_url: format!("https://cdn.cliptok.test/videos/{id}.mp4"),
            thumbnail_url: format!("https://cdn.cliptok.test/thumbs/{id}.jpg"),
            caption: upload.caption.clone(),
            duration_secs: upload.duration_secs.max(1),
            likes: 0,
            comments: 0,
            shares: 0,
            views: 0,
            sound: Sound {
                name: format!("Original Sound - {}", owner.username),
                url: String::new(),
            },
            tags: format::parse_hashtags(&upload.caption),
            privacy: upload.privacy,
            created_at: Utc::now(),
            is_liked: false,
            is_saved: false,
            user: owner,
        };
        dataset.videos.insert(0, video.clone());
        Ok(video)
    }

    fn prefetch_media(&self, id: VideoId) -> ApiResult<String> {
        self.call()?;
        let dataset = self.dataset.lock();
        dataset
            .videos
            .iter()
            .find(|video| video.id == id)
            .map(|video| video.media_url.clone())
            .ok_or(ApiError::NotFound("video"))
    }
}

impl CommentService for MockApi {
    fn list_comments(
        &self,
        video: VideoId,
        cursor: Option<CommentId>,
    ) -> ApiResult<Page<Comment>> {
        self.call()?;
        let dataset = self.dataset.lock();
        let all: Vec<&Comment> = dataset
            .comments
            .iter()
            .filter(|comment| comment.video_id == video)
            .collect();
        let start = match cursor {
            Some(cursor) => all
                .iter()
                .position(|comment| comment.id == cursor)
                .map(|pos| pos + 1)
                .unwrap_or(all.len()),
            None => 0,
        };
        let end = (start + COMMENT_PAGE_SIZE).min(all.len());
        Ok(Page {
            items: all[start..end].iter().map(|c| (*c).clone()).collect(),
            has_more: end < all.len(),
        })
    }

    fn post_comment(&self, video: VideoId, text: &str) -> ApiResult<Comment> {
        self.require_auth()?;
        format::validate_comment(text).map_err(ApiError::Validation)?;
        self.call()?;

        let mut dataset = self.dataset.lock();
        dataset.video_mut(video)?.comments += 1;
        let id = dataset.next_comment_id;
        dataset.next_comment_id += 1;
        let comment = Comment {
            id,
            video_id: video,
            user: dataset.current_user.clone(),
            text: text.to_string(),
            likes: 0,
            is_liked: false,
            created_at: Utc::now(),
            replies: Vec::new(),
        };
        dataset.comments.insert(0, comment.clone());
        Ok(comment)
    }

    fn toggle_comment_like(&self, comment: CommentId) -> ApiResult<LikeOutcome> {
        self.require_auth()?;
        self.call()?;
        let mut dataset = self.dataset.lock();
        let comment = dataset
            .comments
            .iter_mut()
            .find(|c| c.id == comment)
            .ok_or(ApiError::NotFound("comment"))?;
        comment.is_liked = !comment.is_liked;
        if comment.is_liked {
            comment.likes += 1;
        } else {
            comment.likes = comment.likes.saturating_sub(1);
        }
        Ok(LikeOutcome {
            likes: comment.likes,
            is_liked: comment.is_liked,
        })
    }
}

impl InteractionService for MockApi {
    fn toggle_like(&self, video: VideoId) -> ApiResult<LikeOutcome> {
        self.require_auth()?;
        self.call()?;
        let mut dataset = self.dataset.lock();
        let video = dataset.video_mut(video)?;
        video.is_liked = !video.is_liked;
        if video.is_liked {
            video.likes += 1;
        } else {
            video.likes = video.likes.saturating_sub(1);
        }
        Ok(LikeOutcome {
            likes: video.likes,
            is_liked: video.is_liked,
        })
    }

    fn toggle_save(&self, video: VideoId) -> ApiResult<SaveOutcome> {
        self.require_auth()?;
        self.call()?;
        let mut dataset = self.dataset.lock();
        let video = dataset.video_mut(video)?;
        video.is_saved = !video.is_saved;
        Ok(SaveOutcome {
            is_saved: video.is_saved,
        })
    }

    fn share_video(&self, video: VideoId) -> ApiResult<ShareOutcome> {
        self.call()?;
        let mut dataset = self.dataset.lock();
        let video = dataset.video_mut(video)?;
        video.shares += 1;
        Ok(ShareOutcome {
            shares: video.shares,
            share_url: format!("https://cliptok.test/video/{}", video.id),
        })
    }

    fn toggle_follow(&self, user: UserId) -> ApiResult<FollowOutcome> {
        self.require_auth()?;
        {
            let dataset = self.dataset.lock();
            if dataset.current_user.id == user {
                return Err(ApiError::Validation("You cannot follow yourself.".into()));
            }
        }
        self.call()?;
        let mut dataset = self.dataset.lock();
        let target = dataset.user_mut(user)?;
        target.is_following = !target.is_following;
        if target.is_following {
            target.followers += 1;
        } else {
            target.followers = target.followers.saturating_sub(1);
        }
        let outcome = FollowOutcome {
            followers: target.followers,
            is_following: target.is_following,
        };
        // Videos embed a copy of their owner; keep those in step.
        for video in &mut dataset.videos {
            if video.user.id == user {
                video.user.is_following = outcome.is_following;
                video.user.followers = outcome.followers;
            }
        }
        if outcome.is_following {
            dataset.current_user.following += 1;
        } else {
            dataset.current_user.following = dataset.current_user.following.saturating_sub(1);
        }
        Ok(outcome)
    }
}

impl ProfileService for MockApi {
    fn login(&self, email: &str, password: &str) -> ApiResult<LoginResponse> {
        self.call()?;
        if email != "user@example.com" || password != "password" {
            return Err(ApiError::Validation("Invalid email or password.".into()));
        }
        let token = mint_token();
        *self.token.lock() = Some(token.clone());
        let dataset = self.dataset.lock();
        Ok(LoginResponse {
            token,
            user: dataset.current_user.clone(),
        })
    }

    fn register(&self, registration: Registration) -> ApiResult<User> {
        format::validate_username(&registration.username).map_err(ApiError::Validation)?;
        self.call()?;
        let mut dataset = self.dataset.lock();
        let taken = dataset
            .users
            .iter()
            .any(|user| user.username.eq_ignore_ascii_case(&registration.username))
            || dataset
                .current_user
                .username
                .eq_ignore_ascii_case(&registration.username);
        if taken {
            return Err(ApiError::Conflict("Username is already taken.".into()));
        }
        let id = dataset.users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        let user = User {
            id,
            username: registration.username,
            display_name: registration.display_name,
            avatar_url: String::new(),
            bio: String::new(),
            verified: false,
            followers: 0,
            following: 0,
            is_following: false,
        };
        dataset.users.push(user.clone());
        Ok(user)
    }

    fn logout(&self) -> ApiResult<()> {
        self.call()?;
        *self.token.lock() = None;
        Ok(())
    }

    fn current_user(&self) -> ApiResult<User> {
        self.call()?;
        Ok(self.dataset.lock().current_user.clone())
    }

    fn get_profile(&self, username: &str) -> ApiResult<Profile> {
        self.call()?;
        let dataset = self.dataset.lock();
        let user = if dataset.current_user.username == username {
            dataset.current_user.clone()
        } else {
            dataset
                .users
                .iter()
                .find(|user| user.username == username)
                .cloned()
                .ok_or(ApiError::NotFound("user"))?
        };
        let videos: Vec<Video> = dataset
            .videos
            .iter()
            .filter(|video| video.user.id == user.id)
            .cloned()
            .collect();
        let total_likes = videos.iter().map(|video| video.likes).sum();
        Ok(Profile {
            user,
            videos,
            total_likes,
        })
    }

    fn update_profile(&self, update: ProfileUpdate) -> ApiResult<User> {
        self.require_auth()?;
        if let Some(bio) = &update.bio {
            format::validate_bio(bio).map_err(ApiError::Validation)?;
        }
        self.call()?;
        let mut dataset = self.dataset.lock();
        if let Some(display_name) = update.display_name {
            dataset.current_user.display_name = display_name;
        }
        if let Some(bio) = update.bio {
            dataset.current_user.bio = bio;
        }
        if let Some(avatar_url) = update.avatar_url {
            dataset.current_user.avatar_url = avatar_url;
        }
        Ok(dataset.current_user.clone())
    }

    fn notifications(&self) -> ApiResult<Vec<Notification>> {
        self.call()?;
        Ok(self.dataset.lock().notifications.clone())
    }

    fn mark_notification_read(&self, id: u64) -> ApiResult<()> {
        self.call()?;
        let mut dataset = self.dataset.lock();
        if let Some(notification) = dataset.notifications.iter_mut().find(|n| n.id == id) {
            notification.read = true;
        }
        Ok(())
    }
}

impl SearchService for MockApi {
    fn search(&self, query: &str, kind: SearchKind) -> ApiResult<SearchResults> {
        self.call()?;
        let matcher = SkimMatcherV2::default();
        let dataset = self.dataset.lock();
        let mut results = SearchResults::default();

        if matches!(kind, SearchKind::All | SearchKind::Users) {
            let mut scored: Vec<(i64, User)> = dataset
                .users
                .iter()
                .filter_map(|user| {
                    let score = matcher
                        .fuzzy_match(&user.username, query)
                        .max(matcher.fuzzy_match(&user.display_name, query))?;
                    Some((score, user.clone()))
                })
                .collect();
            scored.sort_by(|a, b| b.0.cmp(&a.0));
            results.users = scored.into_iter().map(|(_, user)| user).collect();
        }

        if matches!(kind, SearchKind::All | SearchKind::Videos) {
            let mut scored: Vec<(i64, Video)> = dataset
                .videos
                .iter()
                .filter_map(|video| {
                    let score = matcher.fuzzy_match(&video.caption, query)?;
                    Some((score, video.clone()))
                })
                .collect();
            scored.sort_by(|a, b| b.0.cmp(&a.0));
            results.videos = scored.into_iter().map(|(_, video)| video).collect();
        }

        if matches!(kind, SearchKind::All | SearchKind::Hashtags) {
            results.hashtags = dataset
                .hashtags
                .iter()
                .filter(|tag| matcher.fuzzy_match(&tag.tag, query).is_some())
                .cloned()
                .collect();
        }

        Ok(results)
    }
}

fn mint_token() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("mock_jwt_{}_{}", Utc::now().timestamp_millis(), suffix)
}

fn seed_users() -> Vec<User> {
    vec![
        User {
            id: 1,
            username: "creative_user".into(),
            display_name: "Creative User".into(),
            avatar_url: "https://cdn.cliptok.test/avatars/1.jpg".into(),
            bio: "Digital creator | Art lover".into(),
            verified: true,
            followers: 125_000,
            following: 345,
            is_following: false,
        },
        User {
            id: 2,
            username: "nature_lover".into(),
            display_name: "Nature Explorer".into(),
            avatar_url: "https://cdn.cliptok.test/avatars/2.jpg".into(),
            bio: "Capturing nature's beauty".into(),
            verified: false,
            followers: 89_000,
            following: 210,
            is_following: true,
        },
        User {
            id: 3,
            username: "tech_guru".into(),
            display_name: "Tech Guru".into(),
            avatar_url: "https://cdn.cliptok.test/avatars/3.jpg".into(),
            bio: "Tech reviews & tutorials".into(),
            verified: true,
            followers: 456_000,
            following: 89,
            is_following: false,
        },
        User {
            id: 4,
            username: "dance_queen".into(),
            display_name: "Dance Queen".into(),
            avatar_url: "https://cdn.cliptok.test/avatars/4.jpg".into(),
            bio: "Professional dancer | Choreographer".into(),
            verified: true,
            followers: 789_000,
            following: 567,
            is_following: true,
        },
    ]
}

#[allow(clippy::type_complexity)]
fn seed_videos(users: &[User]) -> Vec<Video> {
    let rows: Vec<(VideoId, usize, &str, &str, u64, u64, u64, u64, u32)> = vec![
        (
            1,
            0,
            "Check out this amazing neon effect! #art #creative #digitalart",
            "Original Sound - creative_user",
            125_000,
            2_500,
            4_500,
            2_500_000,
            15,
        ),
        (
            2,
            1,
            "Beautiful spring day in the park #nature #spring #flowers",
            "Nature Sounds - nature_lover",
            89_000,
            1_800,
            3_200,
            1_500_000,
            12,
        ),
        (
            3,
            2,
            "New gadget unboxing! This thing is amazing #tech #gadgets #unboxing",
            "Original Sound - tech_guru",
            456_000,
            8_900,
            12_500,
            5_000_000,
            18,
        ),
        (
            4,
            3,
            "New dance routine! Who's trying this? #dance #choreography #tutorial",
            "Popular Song - artist_name",
            789_000,
            15_600,
            23_400,
            8_900_000,
            21,
        ),
    ];
    rows.into_iter()
        .map(
            |(id, user_idx, caption, sound, likes, comments, shares, views, duration)| Video {
                id,
                user: users[user_idx].clone(),
                media_url: format!("https://cdn.cliptok.test/videos/{id}.mp4"),
                thumbnail_url: format!("https://cdn.cliptok.test/thumbs/{id}.jpg"),
                caption: caption.to_string(),
                duration_secs: duration,
                likes,
                comments,
                shares,
                views,
                sound: Sound {
                    name: sound.to_string(),
                    url: String::new(),
                },
                tags: format::parse_hashtags(caption),
                privacy: Privacy::Public,
                created_at: Utc
                    .with_ymd_and_hms(2024, 1, 12 + id as u32, 10, 30, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
                is_liked: id == 2 || id == 4,
                is_saved: id == 3,
            },
        )
        .collect()
}

fn seed_comments(users: &[User]) -> Vec<Comment> {
    let at = |day: u32, hour: u32, minute: u32| {
        Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0)
            .single()
            .unwrap_or_else(Utc::now)
    };
    vec![
        Comment {
            id: 1,
            video_id: 1,
            user: users[1].clone(),
            text: "This is absolutely stunning! :)".into(),
            likes: 45,
            is_liked: false,
            created_at: at(15, 11, 0),
            replies: vec![Comment {
                id: 10,
                video_id: 1,
                user: users[0].clone(),
                text: "Thank you so much!".into(),
                likes: 4,
                is_liked: false,
                created_at: at(15, 11, 10),
                replies: Vec::new(),
            }],
        },
        Comment {
            id: 2,
            video_id: 1,
            user: users[2].clone(),
            text: "How did you create this effect? Amazing work!".into(),
            likes: 23,
            is_liked: false,
            created_at: at(15, 11, 30),
            replies: Vec::new(),
        },
        Comment {
            id: 3,
            video_id: 2,
            user: users[0].clone(),
            text: "So peaceful and beautiful!".into(),
            likes: 67,
            is_liked: false,
            created_at: at(14, 9, 0),
            replies: Vec::new(),
        },
    ]
}

fn seed_hashtags() -> Vec<Hashtag> {
    vec![
        Hashtag {
            tag: "digitalart".into(),
            views: 12_500_000,
            videos: 45_600,
        },
        Hashtag {
            tag: "nature".into(),
            views: 8_900_000,
            videos: 23_400,
        },
        Hashtag {
            tag: "tech".into(),
            views: 45_600_000,
            videos: 123_400,
        },
        Hashtag {
            tag: "dance".into(),
            views: 78_900_000,
            videos: 56_700,
        },
    ]
}

fn seed_notifications() -> Vec<Notification> {
    vec![
        Notification {
            id: 1,
            kind: NotificationKind::Like,
            text: "nature_lover liked your video".into(),
            created_at: Utc
                .with_ymd_and_hms(2024, 1, 15, 11, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
            read: false,
        },
        Notification {
            id: 2,
            kind: NotificationKind::Comment,
            text: "tech_guru commented on your video".into(),
            created_at: Utc
                .with_ymd_and_hms(2024, 1, 15, 11, 30, 0)
                .single()
                .unwrap_or_else(Utc::now),
            read: false,
        },
        Notification {
            id: 3,
            kind: NotificationKind::Follow,
            text: "dance_queen started following you".into(),
            created_at: Utc
                .with_ymd_and_hms(2024, 1, 14, 16, 45, 0)
                .single()
                .unwrap_or_else(Utc::now),
            read: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> MockApi {
        let api = MockApi::seeded(FaultPolicy::None);
        api.restore_token("test-token".into());
        api
    }

    #[test]
    fn feed_paginates_with_has_more() {
        let api = api();
        let page = api.list_feed(FeedKind::ForYou, 1).unwrap();
        assert_eq!(page.items.len(), 4);
        assert!(!page.has_more);
        let beyond = api.list_feed(FeedKind::ForYou, 2).unwrap();
        assert!(beyond.items.is_empty());
    }

    #[test]
    fn following_feed_filters_by_follow_state() {
        let api = api();
        let page = api.list_feed(FeedKind::Following, 1).unwrap();
        assert!(page.items.iter().all(|video| video.user.is_following));
        assert_eq!(page.items.len(), 2);
    }

    #[test]
    fn get_video_bumps_views() {
        let api = api();
        let before = api.get_video(1).unwrap().views;
        let after = api.get_video(1).unwrap().views;
        assert_eq!(after, before + 1);
    }

    #[test]
    fn prefetch_returns_media_url_without_a_view() {
        let api = api();
        let before = api.get_video(1).unwrap().views;
        let url = api.prefetch_media(1).unwrap();
        assert!(url.ends_with(".mp4"), "url was: {url}");
        assert_eq!(api.get_video(1).unwrap().views, before + 1);
        assert!(matches!(
            api.prefetch_media(9999),
            Err(ApiError::NotFound("video"))
        ));
    }

    #[test]
    fn like_toggle_round_trips() {
        let api = api();
        let first = api.toggle_like(1).unwrap();
        assert!(first.is_liked);
        assert_eq!(first.likes, 125_001);
        let second = api.toggle_like(1).unwrap();
        assert!(!second.is_liked);
        assert_eq!(second.likes, 125_000);
    }

    #[test]
    fn self_follow_is_refused() {
        let api = api();
        let err = api.toggle_follow(1001).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn follow_updates_videos_of_that_user() {
        let api = api();
        let outcome = api.toggle_follow(1).unwrap();
        assert!(outcome.is_following);
        let video = api.get_video(1).unwrap();
        assert!(video.user.is_following);
    }

    #[test]
    fn comments_cursor_pagination() {
        let api = api();
        let first = api.list_comments(1, None).unwrap();
        assert_eq!(first.items.len(), 2);
        assert!(!first.has_more);
        let cursor = first.items.last().unwrap().id;
        let next = api.list_comments(1, Some(cursor)).unwrap();
        assert!(next.items.is_empty());
    }

    #[test]
    fn post_comment_prepends_and_counts() {
        let api = api();
        let before = api.get_video(1).unwrap().comments;
        let comment = api.post_comment(1, "first!").unwrap();
        assert_eq!(comment.video_id, 1);
        let listed = api.list_comments(1, None).unwrap();
        assert_eq!(listed.items[0].id, comment.id);
        assert_eq!(api.get_video(1).unwrap().comments, before + 1);
    }

    #[test]
    fn overlong_comment_is_a_validation_error() {
        let api = api();
        let text = "x".repeat(501);
        let err = api.post_comment(1, &text).unwrap_err();
        match err {
            ApiError::Validation(message) => assert!(message.contains("500")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn upload_rejects_non_video_and_oversize() {
        let api = api();
        let base = VideoUpload {
            file_name: "clip.mp4".into(),
            mime_type: "video/mp4".into(),
            size_bytes: 1_000,
            caption: "a clip #test".into(),
            privacy: Privacy::Public,
            duration_secs: 10,
        };
        let err = api
            .upload_video(VideoUpload {
                mime_type: "image/png".into(),
                ..base.clone()
            })
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        let err = api
            .upload_video(VideoUpload {
                size_bytes: MAX_UPLOAD_BYTES + 1,
                ..base.clone()
            })
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        let video = api.upload_video(base).unwrap();
        assert_eq!(video.tags, vec!["test".to_string()]);
        let feed = api.list_feed(FeedKind::ForYou, 1).unwrap();
        assert_eq!(feed.items[0].id, video.id);
    }

    #[test]
    fn register_refuses_taken_username() {
        let api = api();
        let err = api
            .register(Registration {
                username: "tech_guru".into(),
                display_name: "Impostor".into(),
                email: "x@example.com".into(),
            })
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn login_requires_known_credentials() {
        let api = MockApi::seeded(FaultPolicy::None);
        assert!(api.login("user@example.com", "wrong").is_err());
        let response = api.login("user@example.com", "password").unwrap();
        assert!(response.token.starts_with("mock_jwt_"));
        assert!(api.toggle_like(1).is_ok(), "token unlocks interactions");
    }

    #[test]
    fn unauthorized_without_token() {
        let api = MockApi::seeded(FaultPolicy::None);
        let err = api.toggle_like(1).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[test]
    fn search_matches_users_videos_hashtags() {
        let api = api();
        let results = api.search("dance", SearchKind::All).unwrap();
        assert!(results.users.iter().any(|u| u.username == "dance_queen"));
        assert!(!results.videos.is_empty());
        assert!(results.hashtags.iter().any(|t| t.tag == "dance"));
    }

    #[test]
    fn fail_next_policy_is_deterministic() {
        let api = MockApi::new(
            Dataset::seeded(),
            FaultPolicy::fail_next(2),
            Duration::from_secs(10),
        );
        api.restore_token("t".into());
        assert!(api.toggle_like(1).unwrap_err().is_transient());
        assert!(api.toggle_like(1).unwrap_err().is_transient());
        assert!(api.toggle_like(1).is_ok());
    }

    #[test]
    fn trending_sorted_by_views() {
        let api = api();
        let trending = api.trending_videos().unwrap();
        assert_eq!(trending[0].id, 4);
        let views: Vec<u64> = trending.iter().map(|v| v.views).collect();
        assert!(views.windows(2).all(|w| w[0] >= w[1]));
    }
}
