use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;

use crate::format;
use crate::model::{Comment, CommentId, LikeOutcome, Page, User, VideoId};

/// Local ids for optimistic comments count down from the top of the id
/// space so they can never collide with server-assigned ids.
const LOCAL_ID_BASE: CommentId = u64::MAX;

/// Handle for an in-flight first-page fetch. Carries the generation so a
/// stale response (the panel was re-opened meanwhile) is discarded on
/// arrival instead of clobbering the newer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenRequest {
    pub video: VideoId,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadMoreRequest {
    pub video: VideoId,
    pub cursor: CommentId,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub video: VideoId,
    local_id: CommentId,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentLikeToken {
    comment: CommentId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeRefused {
    InFlight,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
struct LikeRollback {
    flag: bool,
    count: u64,
}

/// State of the comment overlay for whichever video it is open on.
/// Service calls happen outside; the panel hands out request tokens and
/// reconciles the answers.
pub struct CommentPanel {
    video: Option<VideoId>,
    generation: u64,
    comments: Vec<Comment>,
    has_more: bool,
    loading: bool,
    expanded: HashSet<CommentId>,
    pending_likes: HashMap<CommentId, LikeRollback>,
    next_local_id: CommentId,
    toasts: VecDeque<String>,
}

impl Default for CommentPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl CommentPanel {
    pub fn new() -> Self {
        Self {
            video: None,
            generation: 0,
            comments: Vec::new(),
            has_more: false,
            loading: false,
            expanded: HashSet::new(),
            pending_likes: HashMap::new(),
            next_local_id: LOCAL_ID_BASE,
            toasts: VecDeque::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.video.is_some()
    }

    pub fn video(&self) -> Option<VideoId> {
        self.video
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn replies_expanded(&self, comment: CommentId) -> bool {
        self.expanded.contains(&comment)
    }

    pub fn take_toasts(&mut self) -> Vec<String> {
        self.toasts.drain(..).collect()
    }

    /// Open the panel on a video and request its first page. Re-opening
    /// while a fetch is outstanding bumps the generation; the older
    /// response is dropped when it lands.
    pub fn open(&mut self, video: VideoId) -> OpenRequest {
        self.generation += 1;
        self.video = Some(video);
        self.comments.clear();
        self.expanded.clear();
        self.pending_likes.clear();
        self.has_more = false;
        self.loading = true;
        OpenRequest {
            video,
            generation: self.generation,
        }
    }

    pub fn close(&mut self) {
        self.generation += 1;
        self.video = None;
        self.comments.clear();
        self.expanded.clear();
        self.pending_likes.clear();
        self.loading = false;
        self.has_more = false;
    }

    /// Apply a first-page response. Last-opened-wins: anything from an
    /// older generation is ignored.
    pub fn resolve_open(&mut self, request: OpenRequest, page: Page<Comment>) {
        if request.generation != self.generation {
            return;
        }
        self.loading = false;
        self.comments = page.items;
        self.has_more = page.has_more;
    }

    pub fn fail_open(&mut self, request: OpenRequest, message: &str) {
        if request.generation != self.generation {
            return;
        }
        self.loading = false;
        self.toasts.push_back(message.to_string());
    }

    /// Request the next page, cursored from the last loaded comment.
    /// No-ops while a fetch is in flight, with nothing open, or when the
    /// service said there is nothing more.
    pub fn begin_load_more(&mut self) -> Option<LoadMoreRequest> {
        if self.loading || !self.has_more {
            return None;
        }
        let video = self.video?;
        let cursor = self.comments.last()?.id;
        self.loading = true;
        Some(LoadMoreRequest {
            video,
            cursor,
            generation: self.generation,
        })
    }

    pub fn resolve_load_more(&mut self, request: LoadMoreRequest, page: Page<Comment>) {
        if request.generation != self.generation {
            return;
        }
        self.loading = false;
        self.comments.extend(page.items);
        self.has_more = page.has_more;
    }

    pub fn fail_load_more(&mut self, request: LoadMoreRequest, message: &str) {
        if request.generation != self.generation {
            return;
        }
        self.loading = false;
        self.toasts.push_back(message.to_string());
    }

    /// Validate and optimistically prepend a new comment as the given
    /// author. The entry carries a local id until the server answer
    /// reconciles it.
    pub fn begin_submit(&mut self, text: &str, author: &User) -> Result<Submission, String> {
        let video = self.video.ok_or_else(|| "No video open.".to_string())?;
        // An optimistic entry prepended now would be wiped when the page
        // response replaces the list, orphaning the reconciliation.
        if self.loading {
            return Err("Comments are still loading.".to_string());
        }
        format::validate_comment(text)?;
        let local_id = self.next_local_id;
        self.next_local_id -= 1;
        self.comments.insert(
            0,
            Comment {
                id: local_id,
                video_id: video,
                user: author.clone(),
                text: text.trim().to_string(),
                likes: 0,
                is_liked: false,
                created_at: Utc::now(),
                replies: Vec::new(),
            },
        );
        Ok(Submission {
            video,
            local_id,
            generation: self.generation,
        })
    }

    /// The server accepted the comment: adopt its id and timestamps.
    pub fn confirm_submit(&mut self, submission: Submission, comment: Comment) {
        if submission.generation != self.generation {
            return;
        }
        if let Some(slot) = self
            .comments
            .iter_mut()
            .find(|c| c.id == submission.local_id)
        {
            *slot = comment;
        }
    }

    /// The post failed: the optimistic entry disappears again.
    pub fn fail_submit(&mut self, submission: Submission, message: &str) {
        if submission.generation == self.generation {
            self.comments.retain(|c| c.id != submission.local_id);
        }
        self.toasts.push_back(message.to_string());
    }

    /// Pure visibility toggle for a comment's replies.
    pub fn toggle_replies(&mut self, comment: CommentId) {
        if !self.expanded.remove(&comment) {
            self.expanded.insert(comment);
        }
    }

    /// Optimistic like on a comment, same pending-guard rule as the feed:
    /// one in-flight toggle per comment.
    pub fn begin_comment_like(
        &mut self,
        comment: CommentId,
    ) -> Result<CommentLikeToken, LikeRefused> {
        if self.pending_likes.contains_key(&comment) {
            return Err(LikeRefused::InFlight);
        }
        let slot = find_comment_mut(&mut self.comments, comment).ok_or(LikeRefused::Unknown)?;
        let rollback = LikeRollback {
            flag: slot.is_liked,
            count: slot.likes,
        };
        slot.is_liked = !slot.is_liked;
        if slot.is_liked {
            slot.likes += 1;
        } else {
            slot.likes = slot.likes.saturating_sub(1);
        }
        self.pending_likes.insert(comment, rollback);
        Ok(CommentLikeToken { comment })
    }

    pub fn confirm_comment_like(&mut self, token: CommentLikeToken, outcome: LikeOutcome) {
        self.pending_likes.remove(&token.comment);
        if let Some(slot) = find_comment_mut(&mut self.comments, token.comment) {
            slot.is_liked = outcome.is_liked;
            slot.likes = outcome.likes;
        }
    }

    pub fn fail_comment_like(&mut self, token: CommentLikeToken, message: &str) {
        if let Some(rollback) = self.pending_likes.remove(&token.comment) {
            if let Some(slot) = find_comment_mut(&mut self.comments, token.comment) {
                slot.is_liked = rollback.flag;
                slot.likes = rollback.count;
            }
        }
        self.toasts.push_back(message.to_string());
    }
}

/// Replies nest at most one level below the root, so a depth-one scan
/// covers the whole tree.
fn find_comment_mut(comments: &mut [Comment], id: CommentId) -> Option<&mut Comment> {
    for comment in comments.iter_mut() {
        if comment.id == id {
            return Some(comment);
        }
        if let Some(reply) = comment.replies.iter_mut().find(|r| r.id == id) {
            return Some(reply);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 1001,
            username: "your_username".into(),
            display_name: "Your Name".into(),
            avatar_url: String::new(),
            bio: String::new(),
            verified: false,
            followers: 0,
            following: 0,
            is_following: false,
        }
    }

    fn comment(id: CommentId, video: VideoId, likes: u64) -> Comment {
        Comment {
            id,
            video_id: video,
            user: user(),
            text: format!("comment {id}"),
            likes,
            is_liked: false,
            created_at: Utc::now(),
            replies: Vec::new(),
        }
    }

    fn page(ids: &[CommentId], video: VideoId, has_more: bool) -> Page<Comment> {
        Page {
            items: ids.iter().map(|&id| comment(id, video, 0)).collect(),
            has_more,
        }
    }

    #[test]
    fn open_replaces_list_when_response_arrives() {
        let mut panel = CommentPanel::new();
        let request = panel.open(1);
        assert!(panel.is_loading());
        panel.resolve_open(request, page(&[1, 2], 1, true));
        assert_eq!(panel.comments().len(), 2);
        assert!(panel.has_more());
        assert!(!panel.is_loading());
    }

    #[test]
    fn stale_open_response_is_discarded() {
        let mut panel = CommentPanel::new();
        let first = panel.open(1);
        let second = panel.open(2);
        // The older fetch resolves after the newer open: dropped.
        panel.resolve_open(first, page(&[1, 2], 1, false));
        assert!(panel.comments().is_empty());
        assert!(panel.is_loading());
        panel.resolve_open(second, page(&[9], 2, false));
        assert_eq!(panel.comments().len(), 1);
        assert_eq!(panel.comments()[0].id, 9);
    }

    #[test]
    fn close_invalidates_outstanding_requests() {
        let mut panel = CommentPanel::new();
        let request = panel.open(1);
        panel.close();
        panel.resolve_open(request, page(&[1], 1, false));
        assert!(!panel.is_open());
        assert!(panel.comments().is_empty());
    }

    #[test]
    fn submit_validates_length_locally() {
        let mut panel = CommentPanel::new();
        let request = panel.open(1);
        panel.resolve_open(request, page(&[], 1, false));
        let text = "x".repeat(501);
        let err = panel.begin_submit(&text, &user()).unwrap_err();
        assert!(err.contains("500"), "message was: {err}");
        assert!(panel.begin_submit("   ", &user()).is_err());
        assert!(panel.comments().is_empty(), "nothing was prepended");
    }

    #[test]
    fn submit_is_refused_while_first_page_loads() {
        let mut panel = CommentPanel::new();
        let request = panel.open(1);
        let err = panel.begin_submit("too early", &user()).unwrap_err();
        assert!(err.contains("loading"), "message was: {err}");
        panel.resolve_open(request, page(&[1], 1, false));
        assert_eq!(panel.comments().len(), 1, "nothing optimistic was lost");
        assert!(panel.begin_submit("now it lands", &user()).is_ok());
    }

    #[test]
    fn submit_prepends_then_reconciles_server_id() {
        let mut panel = CommentPanel::new();
        let request = panel.open(1);
        panel.resolve_open(request, page(&[1], 1, false));
        let submission = panel.begin_submit("hello", &user()).unwrap();
        assert_eq!(panel.comments().len(), 2);
        assert_eq!(panel.comments()[0].text, "hello");
        let server = comment(77, 1, 0);
        panel.confirm_submit(submission, server);
        assert_eq!(panel.comments()[0].id, 77);
    }

    #[test]
    fn failed_submit_removes_the_optimistic_entry() {
        let mut panel = CommentPanel::new();
        let request = panel.open(1);
        panel.resolve_open(request, page(&[1], 1, false));
        let submission = panel.begin_submit("hello", &user()).unwrap();
        assert_eq!(panel.comments().len(), 2);
        panel.fail_submit(submission, "Couldn't post comment");
        assert_eq!(panel.comments().len(), 1);
        assert_eq!(panel.comments()[0].id, 1);
        assert_eq!(panel.take_toasts(), vec!["Couldn't post comment"]);
    }

    #[test]
    fn load_more_cursors_from_the_last_comment() {
        let mut panel = CommentPanel::new();
        let request = panel.open(1);
        panel.resolve_open(request, page(&[1, 2], 1, true));
        let more = panel.begin_load_more().unwrap();
        assert_eq!(more.cursor, 2);
        // No concurrent second fetch.
        assert!(panel.begin_load_more().is_none());
        panel.resolve_load_more(more, page(&[3], 1, false));
        assert_eq!(panel.comments().len(), 3);
        assert!(!panel.has_more());
        assert!(panel.begin_load_more().is_none());
    }

    #[test]
    fn load_more_without_open_video_is_a_no_op() {
        let mut panel = CommentPanel::new();
        assert!(panel.begin_load_more().is_none());
    }

    #[test]
    fn reply_visibility_is_a_pure_toggle() {
        let mut panel = CommentPanel::new();
        assert!(!panel.replies_expanded(1));
        panel.toggle_replies(1);
        assert!(panel.replies_expanded(1));
        panel.toggle_replies(1);
        assert!(!panel.replies_expanded(1));
    }

    #[test]
    fn comment_like_rolls_back_and_guards() {
        let mut panel = CommentPanel::new();
        let request = panel.open(1);
        panel.resolve_open(request, page(&[1], 1, false));
        let token = panel.begin_comment_like(1).unwrap();
        assert_eq!(panel.comments()[0].likes, 1);
        assert!(panel.comments()[0].is_liked);
        assert_eq!(panel.begin_comment_like(1), Err(LikeRefused::InFlight));
        panel.fail_comment_like(token, "network");
        assert_eq!(panel.comments()[0].likes, 0);
        assert!(!panel.comments()[0].is_liked);
        assert!(panel.begin_comment_like(1).is_ok());
    }

    #[test]
    fn comment_like_reaches_replies() {
        let mut panel = CommentPanel::new();
        let request = panel.open(1);
        let mut root = comment(1, 1, 0);
        root.replies.push(comment(10, 1, 4));
        panel.resolve_open(
            request,
            Page {
                items: vec![root],
                has_more: false,
            },
        );
        let token = panel.begin_comment_like(10).unwrap();
        assert_eq!(panel.comments()[0].replies[0].likes, 5);
        panel.confirm_comment_like(
            token,
            LikeOutcome {
                likes: 5,
                is_liked: true,
            },
        );
        assert!(panel.comments()[0].replies[0].is_liked);
    }

    #[test]
    fn unknown_comment_like_is_refused() {
        let mut panel = CommentPanel::new();
        assert_eq!(panel.begin_comment_like(99), Err(LikeRefused::Unknown));
    }
}
