use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type VideoId = u64;
pub type UserId = u64;
pub type CommentId = u64;

pub const COMMENT_MAX_DEPTH: usize = 2;
pub const COMMENT_MAX_VISIBLE_REPLIES: usize = 10;
pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    ForYou,
    Following,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sound {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
    pub avatar_url: String,
    pub bio: String,
    pub verified: bool,
    pub followers: u64,
    pub following: u64,
    pub is_following: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    pub user: User,
    pub media_url: String,
    pub thumbnail_url: String,
    pub caption: String,
    pub duration_secs: u32,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub views: u64,
    pub sound: Sound,
    pub tags: Vec<String>,
    pub privacy: Privacy,
    pub created_at: DateTime<Utc>,
    pub is_liked: bool,
    pub is_saved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub video_id: VideoId,
    pub user: User,
    pub text: String,
    pub likes: u64,
    pub is_liked: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub replies: Vec<Comment>,
}

impl Comment {
    /// Replies shown at once are bounded; deeper nesting is flattened away
    /// by the mock service before it gets here.
    pub fn visible_replies(&self) -> &[Comment] {
        let cap = self.replies.len().min(COMMENT_MAX_VISIBLE_REPLIES);
        &self.replies[..cap]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            has_more: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    All,
    Users,
    Videos,
    Hashtags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hashtag {
    pub tag: String,
    pub views: u64,
    pub videos: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub users: Vec<User>,
    pub videos: Vec<Video>,
    pub hashtags: Vec<Hashtag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub kind: NotificationKind,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

/// Result of a server-side like toggle; the caller reconciles its
/// optimistic state against these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeOutcome {
    pub likes: u64,
    pub is_liked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowOutcome {
    pub followers: u64,
    pub is_following: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub is_saved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareOutcome {
    pub shares: u64,
    pub share_url: String,
}
