use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::format::{Clock, Debouncer};
use crate::model::{FollowOutcome, LikeOutcome, SaveOutcome, UserId, Video, VideoId};

/// Playback lifecycle of one feed slot. Exactly one slot may be
/// `VisiblePlaying` at any time; `switch_to` serializes transitions so the
/// invariant holds even when events race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Hidden,
    VisiblePaused,
    VisiblePlaying,
    Buffering { was_playing: bool },
}

/// Outcome of asking the player to start. `Rejected` models the autoplay
/// policies of real playback backends: the slot stays visible-paused with a
/// tap-to-play affordance instead of erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayAttempt {
    Started,
    Rejected,
}

/// Playback side of the engine. The engine never talks to a terminal or a
/// process directly; the shell supplies a real player, tests a scripted one.
pub trait PlayerPort {
    fn play(&mut self, video: &Video) -> PlayAttempt;
    fn pause(&mut self);
    fn stop(&mut self);
    fn set_muted(&mut self, muted: bool);
}

/// Media prefetch side. Invoked for the slot after the active one only.
pub trait PreloadPort {
    fn preload(&mut self, video: &Video);
}

/// No-op ports for headless runs.
pub struct NullPreload;

impl PreloadPort for NullPreload {
    fn preload(&mut self, _video: &Video) {}
}

#[derive(Debug, Clone)]
pub struct FeedOptions {
    /// Fraction of a slot that must be visible before it becomes active.
    pub visibility_threshold: f64,
    /// Minimum vertical travel for a drag to count as a swipe.
    pub swipe_min_px: f64,
    /// Maximum duration for a drag to count as a swipe.
    pub swipe_max: Duration,
    /// Scroll settling window before the position is reconciled.
    pub settle_window: Duration,
    /// Whether playback starts muted. One global flag across all slots.
    pub start_muted: bool,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            visibility_threshold: 0.8,
            swipe_min_px: 50.0,
            swipe_max: Duration::from_millis(300),
            settle_window: Duration::from_millis(100),
            start_muted: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToggleKind {
    Like,
    Save,
    Follow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PendingKey {
    Like(VideoId),
    Save(VideoId),
    Follow(UserId),
}

/// Snapshot taken before an optimistic flip; applied verbatim on failure.
#[derive(Debug, Clone, Copy)]
struct Rollback {
    flag: bool,
    count: u64,
}

/// Handle for one in-flight optimistic toggle. The shell carries it through
/// the service call and hands it back to `confirm_*` or `fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingToggle {
    key: PendingKey,
    pub request_id: u64,
}

impl PendingToggle {
    pub fn kind(&self) -> ToggleKind {
        match self.key {
            PendingKey::Like(_) => ToggleKind::Like,
            PendingKey::Save(_) => ToggleKind::Save,
            PendingKey::Follow(_) => ToggleKind::Follow,
        }
    }
}

/// Refusals from the optimistic layer. `InFlight` is the per-target guard:
/// a second toggle on the same target waits for the first to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleRefused {
    InFlight,
    OutOfRange,
}

/// The video feed engine: an index-addressed list of slots, one active
/// index, and per-slot playback phase. Pure state; all I/O goes through
/// the injected ports.
pub struct FeedEngine {
    videos: Vec<Video>,
    phases: Vec<Phase>,
    failed: Vec<bool>,
    tap_to_play: Vec<bool>,
    current: usize,
    page_visible: bool,
    muted: bool,
    pending: HashMap<PendingKey, Rollback>,
    next_request_id: u64,
    settle: Debouncer,
    pending_scroll: Option<usize>,
    toasts: VecDeque<String>,
    options: FeedOptions,
    clock: Arc<dyn Clock>,
    player: Box<dyn PlayerPort>,
    preload: Box<dyn PreloadPort>,
}

impl FeedEngine {
    pub fn new(
        videos: Vec<Video>,
        options: FeedOptions,
        clock: Arc<dyn Clock>,
        player: Box<dyn PlayerPort>,
        preload: Box<dyn PreloadPort>,
    ) -> Self {
        let len = videos.len();
        Self {
            videos,
            phases: vec![Phase::Hidden; len],
            failed: vec![false; len],
            tap_to_play: vec![false; len],
            current: 0,
            page_visible: true,
            muted: options.start_muted,
            pending: HashMap::new(),
            next_request_id: 1,
            settle: Debouncer::new(options.settle_window),
            pending_scroll: None,
            toasts: VecDeque::new(),
            options,
            clock,
            player,
            preload,
        }
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn phase(&self, index: usize) -> Phase {
        self.phases.get(index).copied().unwrap_or(Phase::Hidden)
    }

    pub fn video(&self, index: usize) -> Option<&Video> {
        self.videos.get(index)
    }

    pub fn current_video(&self) -> Option<&Video> {
        self.videos.get(self.current)
    }

    pub fn videos(&self) -> &[Video] {
        &self.videos
    }

    pub fn is_failed(&self, index: usize) -> bool {
        self.failed.get(index).copied().unwrap_or(false)
    }

    pub fn needs_tap_to_play(&self, index: usize) -> bool {
        self.tap_to_play.get(index).copied().unwrap_or(false)
    }

    pub fn take_toasts(&mut self) -> Vec<String> {
        self.toasts.drain(..).collect()
    }

    fn toast(&mut self, message: impl Into<String>) {
        self.toasts.push_back(message.into());
    }

    /// Append a freshly fetched page without disturbing playback state.
    pub fn extend(&mut self, more: Vec<Video>) {
        let added = more.len();
        self.videos.extend(more);
        self.phases.extend(std::iter::repeat(Phase::Hidden).take(added));
        self.failed.extend(std::iter::repeat(false).take(added));
        self.tap_to_play
            .extend(std::iter::repeat(false).take(added));
    }

    /// Swap in a refreshed feed. Playback stops, pending toggles are
    /// dropped, and the first slot activates if the page is visible.
    pub fn replace(&mut self, videos: Vec<Video>) {
        self.player.stop();
        self.videos.clear();
        self.phases.clear();
        self.failed.clear();
        self.tap_to_play.clear();
        self.pending.clear();
        self.pending_scroll = None;
        self.current = 0;
        self.extend(videos);
        if !self.videos.is_empty() {
            self.activate(0);
            if let Some(next) = self.videos.get(1) {
                let next = next.clone();
                self.preload.preload(&next);
            }
        }
    }

    /// Activate slot `index`. Out-of-range and same-index calls are no-ops.
    /// The previous active slot is deactivated first and the index is
    /// updated before any port call, so re-entrant events observe the new
    /// position.
    pub fn switch_to(&mut self, index: usize) {
        if index >= self.videos.len() || index == self.current {
            return;
        }
        self.deactivate(self.current);
        self.current = index;
        self.activate(index);
        if let Some(next) = self.videos.get(index + 1) {
            let next = next.clone();
            self.preload.preload(&next);
        }
    }

    pub fn next(&mut self) {
        if self.current + 1 < self.videos.len() {
            self.switch_to(self.current + 1);
        }
    }

    pub fn previous(&mut self) {
        if self.current > 0 {
            self.switch_to(self.current - 1);
        }
    }

    fn deactivate(&mut self, index: usize) {
        let Some(phase) = self.phases.get(index).copied() else {
            return;
        };
        if matches!(
            phase,
            Phase::VisiblePlaying | Phase::Buffering { was_playing: true }
        ) {
            self.player.pause();
        }
        self.phases[index] = Phase::Hidden;
    }

    fn activate(&mut self, index: usize) {
        if !self.page_visible {
            self.phases[index] = Phase::Hidden;
            return;
        }
        if self.failed[index] {
            self.phases[index] = Phase::VisiblePaused;
            return;
        }
        let video = self.videos[index].clone();
        match self.player.play(&video) {
            PlayAttempt::Started => {
                self.tap_to_play[index] = false;
                self.phases[index] = Phase::VisiblePlaying;
            }
            PlayAttempt::Rejected => {
                self.tap_to_play[index] = true;
                self.phases[index] = Phase::VisiblePaused;
            }
        }
    }

    /// Synthetic intersection event: `fraction` of slot `index` is visible.
    pub fn on_visibility(&mut self, index: usize, fraction: f64) {
        if index >= self.videos.len() {
            return;
        }
        if fraction >= self.options.visibility_threshold {
            if index != self.current {
                self.switch_to(index);
            } else if self.phases[index] == Phase::Hidden {
                self.activate(index);
            }
        } else if index == self.current && self.phases[index] != Phase::Hidden {
            self.deactivate(index);
        }
    }

    /// The whole page went to the background: pause and hide, remember
    /// nothing. Returning to the foreground re-activates the current slot.
    pub fn on_page_hidden(&mut self) {
        self.page_visible = false;
        self.deactivate(self.current);
    }

    pub fn on_page_visible(&mut self) {
        self.page_visible = true;
        if !self.videos.is_empty() {
            self.activate(self.current);
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Global mute flip, forwarded to the player so the running process
    /// picks it up immediately. Returns the new state.
    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        self.player.set_muted(self.muted);
        self.muted
    }

    /// Manual play/pause on the active slot. Also clears the tap-to-play
    /// affordance left behind by a rejected autoplay attempt.
    pub fn toggle_playback(&mut self) {
        if self.videos.is_empty() {
            return;
        }
        match self.phases[self.current] {
            Phase::VisiblePlaying => {
                self.player.pause();
                self.phases[self.current] = Phase::VisiblePaused;
            }
            Phase::VisiblePaused | Phase::Hidden => self.activate(self.current),
            Phase::Buffering { .. } => {}
        }
    }

    /// Scroll offset changed. The target index is `round(offset/viewport)`;
    /// reconciliation waits for the settling window so a fast flick causes
    /// one switch, not one per intermediate offset.
    pub fn on_scroll(&mut self, offset: f64, viewport: f64) {
        if self.videos.is_empty() || viewport <= 0.0 {
            return;
        }
        let target = (offset / viewport).round().max(0.0) as usize;
        let target = target.min(self.videos.len() - 1);
        self.pending_scroll = Some(target);
        self.settle.touch(self.clock.now());
    }

    /// Advance time-driven work; the shell calls this every frame.
    pub fn tick(&mut self) {
        if self.settle.ready(self.clock.now()) {
            if let Some(target) = self.pending_scroll.take() {
                self.switch_to(target);
            }
        }
    }

    /// Completed drag gesture. Vertical travel beyond the threshold inside
    /// the time limit advances the feed by the drag's direction; everything
    /// else is ignored.
    pub fn on_swipe(&mut self, dx: f64, dy: f64, elapsed: Duration) {
        if dy.abs() <= self.options.swipe_min_px
            || dy.abs() <= dx.abs()
            || elapsed >= self.options.swipe_max
        {
            return;
        }
        if dy < 0.0 {
            self.next();
        } else {
            self.previous();
        }
    }

    /// Playback stalled waiting for data. Cosmetic: remembers whether the
    /// slot was playing so `on_playable` can restore it.
    pub fn on_stall(&mut self, index: usize) {
        if let Some(phase) = self.phases.get_mut(index) {
            match *phase {
                Phase::VisiblePlaying => *phase = Phase::Buffering { was_playing: true },
                Phase::VisiblePaused => *phase = Phase::Buffering { was_playing: false },
                _ => {}
            }
        }
    }

    pub fn on_playable(&mut self, index: usize) {
        if let Some(phase) = self.phases.get_mut(index) {
            if let Phase::Buffering { was_playing } = *phase {
                *phase = if was_playing {
                    Phase::VisiblePlaying
                } else {
                    Phase::VisiblePaused
                };
            }
        }
    }

    /// The media for slot `index` failed to load. The slot is marked and
    /// paused but stays navigable.
    pub fn on_media_error(&mut self, index: usize) {
        if index >= self.videos.len() {
            return;
        }
        self.failed[index] = true;
        if self.phases[index] == Phase::VisiblePlaying {
            self.player.pause();
        }
        if self.phases[index] != Phase::Hidden {
            self.phases[index] = Phase::VisiblePaused;
        }
        self.toast("Video failed to load");
    }

    fn begin(&mut self, key: PendingKey, snapshot: Rollback) -> Result<PendingToggle, ToggleRefused> {
        if self.pending.contains_key(&key) {
            return Err(ToggleRefused::InFlight);
        }
        self.pending.insert(key, snapshot);
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        Ok(PendingToggle { key, request_id })
    }

    /// Optimistic like: flip the flag and count immediately and return a
    /// handle for the in-flight call. A second like on the same video while
    /// one is pending is refused.
    pub fn begin_like(&mut self, index: usize) -> Result<PendingToggle, ToggleRefused> {
        let video = self
            .videos
            .get(index)
            .ok_or(ToggleRefused::OutOfRange)?
            .clone();
        let snapshot = Rollback {
            flag: video.is_liked,
            count: video.likes,
        };
        let token = self.begin(PendingKey::Like(video.id), snapshot)?;
        let slot = &mut self.videos[index];
        slot.is_liked = !slot.is_liked;
        if slot.is_liked {
            slot.likes += 1;
        } else {
            slot.likes = slot.likes.saturating_sub(1);
        }
        Ok(token)
    }

    /// Double-tap likes but never unlikes; a second tap on an already-liked
    /// video is a no-op rather than a toggle.
    pub fn double_tap_like(&mut self, index: usize) -> Result<Option<PendingToggle>, ToggleRefused> {
        match self.videos.get(index) {
            Some(video) if video.is_liked => Ok(None),
            Some(_) => self.begin_like(index).map(Some),
            None => Err(ToggleRefused::OutOfRange),
        }
    }

    pub fn begin_save(&mut self, index: usize) -> Result<PendingToggle, ToggleRefused> {
        let video = self
            .videos
            .get(index)
            .ok_or(ToggleRefused::OutOfRange)?
            .clone();
        let snapshot = Rollback {
            flag: video.is_saved,
            count: 0,
        };
        let token = self.begin(PendingKey::Save(video.id), snapshot)?;
        let slot = &mut self.videos[index];
        slot.is_saved = !slot.is_saved;
        Ok(token)
    }

    /// Optimistic follow, keyed by the creator: the flip applies to every
    /// slot owned by that user so the feed stays consistent.
    pub fn begin_follow(&mut self, index: usize) -> Result<PendingToggle, ToggleRefused> {
        let user = self
            .videos
            .get(index)
            .ok_or(ToggleRefused::OutOfRange)?
            .user
            .clone();
        let snapshot = Rollback {
            flag: user.is_following,
            count: user.followers,
        };
        let token = self.begin(PendingKey::Follow(user.id), snapshot)?;
        let now_following = !user.is_following;
        let followers = if now_following {
            user.followers + 1
        } else {
            user.followers.saturating_sub(1)
        };
        self.apply_follow(user.id, now_following, followers);
        Ok(token)
    }

    fn apply_follow(&mut self, user: UserId, is_following: bool, followers: u64) {
        for video in &mut self.videos {
            if video.user.id == user {
                video.user.is_following = is_following;
                video.user.followers = followers;
            }
        }
    }

    /// Reconcile the optimistic like with the server's answer.
    pub fn confirm_like(&mut self, token: PendingToggle, outcome: LikeOutcome) {
        if let PendingKey::Like(id) = token.key {
            self.pending.remove(&token.key);
            for video in &mut self.videos {
                if video.id == id {
                    video.is_liked = outcome.is_liked;
                    video.likes = outcome.likes;
                }
            }
        }
    }

    pub fn confirm_save(&mut self, token: PendingToggle, outcome: SaveOutcome) {
        if let PendingKey::Save(id) = token.key {
            self.pending.remove(&token.key);
            for video in &mut self.videos {
                if video.id == id {
                    video.is_saved = outcome.is_saved;
                }
            }
        }
    }

    pub fn confirm_follow(&mut self, token: PendingToggle, outcome: FollowOutcome) {
        if let PendingKey::Follow(id) = token.key {
            self.pending.remove(&token.key);
            self.apply_follow(id, outcome.is_following, outcome.followers);
        }
    }

    /// The in-flight call failed: restore the exact pre-toggle snapshot and
    /// surface a toast.
    pub fn fail(&mut self, token: PendingToggle, message: &str) {
        let Some(snapshot) = self.pending.remove(&token.key) else {
            return;
        };
        match token.key {
            PendingKey::Like(id) => {
                for video in &mut self.videos {
                    if video.id == id {
                        video.is_liked = snapshot.flag;
                        video.likes = snapshot.count;
                    }
                }
            }
            PendingKey::Save(id) => {
                for video in &mut self.videos {
                    if video.id == id {
                        video.is_saved = snapshot.flag;
                    }
                }
            }
            PendingKey::Follow(id) => {
                self.apply_follow(id, snapshot.flag, snapshot.count);
            }
        }
        self.toast(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SystemClock;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::time::Instant;

    struct ManualClock(Mutex<Instant>);

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Instant::now())))
        }

        fn advance(&self, by: Duration) {
            let mut now = self.0.lock();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.0.lock()
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum PlayerCall {
        Play(VideoId),
        Pause,
        Stop,
        SetMuted(bool),
    }

    struct ScriptedPlayer {
        log: Arc<Mutex<Vec<PlayerCall>>>,
        reject: bool,
    }

    impl PlayerPort for ScriptedPlayer {
        fn play(&mut self, video: &Video) -> PlayAttempt {
            self.log.lock().push(PlayerCall::Play(video.id));
            if self.reject {
                PlayAttempt::Rejected
            } else {
                PlayAttempt::Started
            }
        }

        fn pause(&mut self) {
            self.log.lock().push(PlayerCall::Pause);
        }

        fn stop(&mut self) {
            self.log.lock().push(PlayerCall::Stop);
        }

        fn set_muted(&mut self, muted: bool) {
            self.log.lock().push(PlayerCall::SetMuted(muted));
        }
    }

    struct RecordingPreload(Arc<Mutex<Vec<VideoId>>>);

    impl PreloadPort for RecordingPreload {
        fn preload(&mut self, video: &Video) {
            self.0.lock().push(video.id);
        }
    }

    fn video(id: VideoId, likes: u64) -> Video {
        use crate::model::{Privacy, Sound, User};
        Video {
            id,
            user: User {
                id: 100 + id,
                username: format!("user{id}"),
                display_name: format!("User {id}"),
                avatar_url: String::new(),
                bio: String::new(),
                verified: false,
                followers: 50,
                following: 0,
                is_following: false,
            },
            media_url: format!("https://cdn.test/{id}.mp4"),
            thumbnail_url: String::new(),
            caption: String::new(),
            duration_secs: 10,
            likes,
            comments: 0,
            shares: 0,
            views: 0,
            sound: Sound {
                name: "Original Sound".into(),
                url: String::new(),
            },
            tags: Vec::new(),
            privacy: Privacy::Public,
            created_at: Utc::now(),
            is_liked: false,
            is_saved: false,
        }
    }

    struct Harness {
        engine: FeedEngine,
        player_log: Arc<Mutex<Vec<PlayerCall>>>,
        preloads: Arc<Mutex<Vec<VideoId>>>,
        clock: Arc<ManualClock>,
    }

    fn harness_with(videos: Vec<Video>, reject: bool) -> Harness {
        let player_log = Arc::new(Mutex::new(Vec::new()));
        let preloads = Arc::new(Mutex::new(Vec::new()));
        let clock = ManualClock::new();
        let engine = FeedEngine::new(
            videos,
            FeedOptions::default(),
            clock.clone(),
            Box::new(ScriptedPlayer {
                log: player_log.clone(),
                reject,
            }),
            Box::new(RecordingPreload(preloads.clone())),
        );
        Harness {
            engine,
            player_log,
            preloads,
            clock,
        }
    }

    fn harness(count: usize) -> Harness {
        harness_with((0..count).map(|i| video(i as u64 + 1, 10)).collect(), false)
    }

    #[test]
    fn switch_keeps_single_active_slot() {
        let mut h = harness(3);
        h.engine.on_visibility(0, 1.0);
        assert_eq!(h.engine.phase(0), Phase::VisiblePlaying);
        h.engine.switch_to(2);
        assert_eq!(h.engine.current_index(), 2);
        assert_eq!(h.engine.phase(2), Phase::VisiblePlaying);
        assert_eq!(h.engine.phase(0), Phase::Hidden);
        let playing = (0..3)
            .filter(|&i| h.engine.phase(i) == Phase::VisiblePlaying)
            .count();
        assert_eq!(playing, 1);
    }

    #[test]
    fn same_index_switch_is_a_no_op() {
        let mut h = harness(3);
        h.engine.on_visibility(0, 1.0);
        let calls_before = h.player_log.lock().len();
        h.engine.switch_to(0);
        assert_eq!(h.player_log.lock().len(), calls_before);
    }

    #[test]
    fn out_of_range_switch_is_a_no_op() {
        let mut h = harness(3);
        h.engine.switch_to(7);
        assert_eq!(h.engine.current_index(), 0);
    }

    #[test]
    fn next_previous_clamp_at_boundaries() {
        let mut h = harness(2);
        h.engine.previous();
        assert_eq!(h.engine.current_index(), 0);
        h.engine.next();
        assert_eq!(h.engine.current_index(), 1);
        h.engine.next();
        assert_eq!(h.engine.current_index(), 1, "no wraparound");
    }

    #[test]
    fn empty_feed_ignores_everything() {
        let mut h = harness(0);
        h.engine.next();
        h.engine.previous();
        h.engine.toggle_playback();
        h.engine.on_scroll(500.0, 100.0);
        h.engine.tick();
        assert!(h.engine.is_empty());
        assert!(h.player_log.lock().is_empty());
        assert!(matches!(
            h.engine.begin_like(0),
            Err(ToggleRefused::OutOfRange)
        ));
    }

    #[test]
    fn scroll_two_viewports_lands_on_index_two() {
        let mut h = harness(3);
        h.engine.on_visibility(0, 1.0);
        h.engine.on_scroll(2.0 * 600.0, 600.0);
        // Nothing moves until the settling window elapses.
        h.engine.tick();
        assert_eq!(h.engine.current_index(), 0);
        h.clock.advance(Duration::from_millis(150));
        h.engine.tick();
        assert_eq!(h.engine.current_index(), 2);
        assert_eq!(h.engine.phase(2), Phase::VisiblePlaying);
        assert_eq!(h.engine.phase(0), Phase::Hidden);
    }

    #[test]
    fn rapid_scrolls_settle_into_one_switch() {
        let mut h = harness(3);
        h.engine.on_visibility(0, 1.0);
        let plays_before = h.player_log.lock().len();
        h.engine.on_scroll(600.0, 600.0);
        h.clock.advance(Duration::from_millis(50));
        h.engine.on_scroll(1200.0, 600.0);
        h.clock.advance(Duration::from_millis(150));
        h.engine.tick();
        assert_eq!(h.engine.current_index(), 2);
        let plays: usize = h.player_log.lock()[plays_before..]
            .iter()
            .filter(|call| matches!(call, PlayerCall::Play(_)))
            .count();
        assert_eq!(plays, 1);
    }

    #[test]
    fn scroll_target_clamps_to_last_slot() {
        let mut h = harness(3);
        h.engine.on_scroll(50.0 * 600.0, 600.0);
        h.clock.advance(Duration::from_millis(150));
        h.engine.tick();
        assert_eq!(h.engine.current_index(), 2);
    }

    #[test]
    fn swipe_thresholds_filter_gestures() {
        let mut h = harness(3);
        // Too short.
        h.engine.on_swipe(0.0, -30.0, Duration::from_millis(100));
        assert_eq!(h.engine.current_index(), 0);
        // Too slow.
        h.engine.on_swipe(0.0, -80.0, Duration::from_millis(400));
        assert_eq!(h.engine.current_index(), 0);
        // Mostly horizontal.
        h.engine.on_swipe(120.0, -60.0, Duration::from_millis(100));
        assert_eq!(h.engine.current_index(), 0);
        // A real swipe up.
        h.engine.on_swipe(5.0, -80.0, Duration::from_millis(100));
        assert_eq!(h.engine.current_index(), 1);
        // And back down.
        h.engine.on_swipe(0.0, 90.0, Duration::from_millis(120));
        assert_eq!(h.engine.current_index(), 0);
    }

    #[test]
    fn visibility_below_threshold_pauses_and_hides() {
        let mut h = harness(2);
        h.engine.on_visibility(0, 1.0);
        assert_eq!(h.engine.phase(0), Phase::VisiblePlaying);
        h.engine.on_visibility(0, 0.5);
        assert_eq!(h.engine.phase(0), Phase::Hidden);
        assert!(h.player_log.lock().contains(&PlayerCall::Pause));
    }

    #[test]
    fn page_hidden_pauses_and_restore_resumes() {
        let mut h = harness(2);
        h.engine.on_visibility(0, 1.0);
        h.engine.on_page_hidden();
        assert_eq!(h.engine.phase(0), Phase::Hidden);
        h.engine.on_page_visible();
        assert_eq!(h.engine.phase(0), Phase::VisiblePlaying);
    }

    #[test]
    fn autoplay_rejection_leaves_tap_affordance() {
        let mut h = harness_with(vec![video(1, 0), video(2, 0)], true);
        h.engine.on_visibility(0, 1.0);
        assert_eq!(h.engine.phase(0), Phase::VisiblePaused);
        assert!(h.engine.needs_tap_to_play(0));
    }

    #[test]
    fn buffering_restores_prior_phase() {
        let mut h = harness(2);
        h.engine.on_visibility(0, 1.0);
        h.engine.on_stall(0);
        assert_eq!(h.engine.phase(0), Phase::Buffering { was_playing: true });
        h.engine.on_playable(0);
        assert_eq!(h.engine.phase(0), Phase::VisiblePlaying);

        h.engine.toggle_playback();
        h.engine.on_stall(0);
        assert_eq!(h.engine.phase(0), Phase::Buffering { was_playing: false });
        h.engine.on_playable(0);
        assert_eq!(h.engine.phase(0), Phase::VisiblePaused);
    }

    #[test]
    fn media_error_never_blocks_navigation() {
        let mut h = harness(3);
        h.engine.on_visibility(0, 1.0);
        h.engine.on_media_error(1);
        assert!(h.engine.is_failed(1));
        h.engine.next();
        assert_eq!(h.engine.current_index(), 1);
        assert_eq!(h.engine.phase(1), Phase::VisiblePaused);
        h.engine.next();
        assert_eq!(h.engine.current_index(), 2);
        assert_eq!(h.engine.phase(2), Phase::VisiblePlaying);
    }

    #[test]
    fn preload_targets_only_the_next_slot() {
        let mut h = harness(3);
        h.engine.switch_to(1);
        assert_eq!(h.preloads.lock().as_slice(), &[3]);
        h.engine.switch_to(2);
        // Last slot has no successor, so nothing new.
        assert_eq!(h.preloads.lock().as_slice(), &[3]);
    }

    #[test]
    fn optimistic_like_rolls_back_exactly() {
        let mut h = harness(1);
        assert_eq!(h.engine.video(0).map(|v| v.likes), Some(10));
        let token = h.engine.begin_like(0).unwrap();
        assert_eq!(h.engine.video(0).map(|v| v.likes), Some(11));
        assert_eq!(h.engine.video(0).map(|v| v.is_liked), Some(true));
        h.engine.fail(token, "Couldn't like video");
        assert_eq!(h.engine.video(0).map(|v| v.likes), Some(10));
        assert_eq!(h.engine.video(0).map(|v| v.is_liked), Some(false));
        assert_eq!(h.engine.take_toasts(), vec!["Couldn't like video"]);
    }

    #[test]
    fn confirmed_like_adopts_server_truth() {
        let mut h = harness(1);
        let token = h.engine.begin_like(0).unwrap();
        h.engine.confirm_like(
            token,
            LikeOutcome {
                likes: 42,
                is_liked: true,
            },
        );
        assert_eq!(h.engine.video(0).map(|v| v.likes), Some(42));
        // Settled: the target accepts a new toggle.
        assert!(h.engine.begin_like(0).is_ok());
    }

    #[test]
    fn pending_guard_refuses_second_toggle() {
        let mut h = harness(1);
        let token = h.engine.begin_like(0).unwrap();
        assert_eq!(h.engine.begin_like(0), Err(ToggleRefused::InFlight));
        // Independent targets are unaffected.
        assert!(h.engine.begin_save(0).is_ok());
        h.engine.fail(token, "network");
        assert!(h.engine.begin_like(0).is_ok());
    }

    #[test]
    fn like_toggle_is_idempotent_when_settled() {
        let mut h = harness(1);
        let token = h.engine.begin_like(0).unwrap();
        h.engine.confirm_like(
            token,
            LikeOutcome {
                likes: 11,
                is_liked: true,
            },
        );
        let token = h.engine.begin_like(0).unwrap();
        h.engine.confirm_like(
            token,
            LikeOutcome {
                likes: 10,
                is_liked: false,
            },
        );
        assert_eq!(h.engine.video(0).map(|v| v.likes), Some(10));
        assert_eq!(h.engine.video(0).map(|v| v.is_liked), Some(false));
    }

    #[test]
    fn double_tap_likes_but_never_unlikes() {
        let mut h = harness(1);
        let token = h.engine.double_tap_like(0).unwrap().unwrap();
        h.engine.confirm_like(
            token,
            LikeOutcome {
                likes: 11,
                is_liked: true,
            },
        );
        assert_eq!(h.engine.double_tap_like(0), Ok(None));
        assert_eq!(h.engine.video(0).map(|v| v.likes), Some(11));
    }

    #[test]
    fn follow_flips_every_slot_of_that_creator() {
        let mut videos = vec![video(1, 0), video(2, 0), video(3, 0)];
        videos[2].user = videos[0].user.clone();
        let mut h = harness_with(videos, false);
        let token = h.engine.begin_follow(0).unwrap();
        assert_eq!(h.engine.video(0).map(|v| v.user.is_following), Some(true));
        assert_eq!(h.engine.video(2).map(|v| v.user.is_following), Some(true));
        assert_eq!(h.engine.video(1).map(|v| v.user.is_following), Some(false));
        h.engine.fail(token, "network");
        assert_eq!(h.engine.video(0).map(|v| v.user.is_following), Some(false));
        assert_eq!(h.engine.video(0).map(|v| v.user.followers), Some(50));
        assert_eq!(h.engine.video(2).map(|v| v.user.is_following), Some(false));
    }

    #[test]
    fn extend_appends_without_touching_playback() {
        let mut h = harness(2);
        h.engine.on_visibility(1, 1.0);
        h.engine.extend(vec![video(9, 0)]);
        assert_eq!(h.engine.len(), 3);
        assert_eq!(h.engine.current_index(), 1);
        assert_eq!(h.engine.phase(1), Phase::VisiblePlaying);
        assert_eq!(h.engine.phase(2), Phase::Hidden);
    }

    #[test]
    fn mute_toggle_reaches_the_player() {
        let mut h = harness(1);
        assert!(h.engine.is_muted(), "feeds start muted");
        assert!(!h.engine.toggle_mute());
        assert!(h.player_log.lock().contains(&PlayerCall::SetMuted(false)));
        assert!(h.engine.toggle_mute());
        assert!(h.engine.is_muted());
        assert!(h.player_log.lock().contains(&PlayerCall::SetMuted(true)));
    }

    #[test]
    fn replace_swaps_feed_and_restarts_from_the_top() {
        let mut h = harness(3);
        h.engine.on_visibility(2, 1.0);
        h.engine.replace(vec![video(20, 0), video(21, 0)]);
        assert_eq!(h.engine.len(), 2);
        assert_eq!(h.engine.current_index(), 0);
        assert_eq!(h.engine.phase(0), Phase::VisiblePlaying);
        assert!(h.player_log.lock().contains(&PlayerCall::Stop));
        assert_eq!(*h.preloads.lock().last().unwrap(), 21);
    }

    #[test]
    fn system_clock_engine_constructs() {
        let engine = FeedEngine::new(
            vec![video(1, 0)],
            FeedOptions::default(),
            Arc::new(SystemClock),
            Box::new(ScriptedPlayer {
                log: Arc::new(Mutex::new(Vec::new())),
                reject: false,
            }),
            Box::new(NullPreload),
        );
        assert_eq!(engine.len(), 1);
    }
}
