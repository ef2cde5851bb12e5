use std::io::{self, Stdout};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use parking_lot::Mutex;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Tabs, Wrap};
use ratatui::{Frame, Terminal};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::cache::Cache;
use crate::comments::{CommentLikeToken, CommentPanel, LoadMoreRequest, OpenRequest, Submission};
use crate::data::{
    ApiError, CommentService, FeedService, InteractionService, ProfileService, SearchService,
};
use crate::feed::{FeedEngine, PendingToggle, Phase, ToggleRefused};
use crate::format;
use crate::model::{
    Comment, FeedKind, FollowOutcome, Hashtag, LikeOutcome, Notification, Page as ModelPage,
    Privacy, SaveOutcome, SearchKind, SearchResults, ShareOutcome, User, Video,
};
use crate::richtext;
use crate::session::Session;

const TOAST_LIFETIME: Duration = Duration::from_secs(3);
const TAB_TITLES: [&str; 5] = ["Home", "Discover", "Upload", "Inbox", "Profile"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppPage {
    Home,
    Discover,
    Upload,
    Inbox,
    Profile,
}

impl AppPage {
    fn index(self) -> usize {
        match self {
            AppPage::Home => 0,
            AppPage::Discover => 1,
            AppPage::Upload => 2,
            AppPage::Inbox => 3,
            AppPage::Profile => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputMode {
    Normal,
    Search,
    Comment,
    Upload,
    LoginEmail,
    LoginPassword { email: String },
}

enum AsyncResponse {
    Feed {
        request_id: u64,
        kind: FeedKind,
        result: Result<ModelPage<Video>, ApiError>,
    },
    CommentsOpened {
        request: OpenRequest,
        result: Result<ModelPage<Comment>, ApiError>,
    },
    CommentsMore {
        request: LoadMoreRequest,
        result: Result<ModelPage<Comment>, ApiError>,
    },
    CommentPosted {
        submission: Submission,
        result: Result<Comment, ApiError>,
    },
    CommentLiked {
        token: CommentLikeToken,
        result: Result<LikeOutcome, ApiError>,
    },
    Liked {
        token: PendingToggle,
        result: Result<LikeOutcome, ApiError>,
    },
    Saved {
        token: PendingToggle,
        result: Result<SaveOutcome, ApiError>,
    },
    Followed {
        token: PendingToggle,
        result: Result<FollowOutcome, ApiError>,
    },
    Shared {
        result: Result<ShareOutcome, ApiError>,
    },
    Searched {
        request_id: u64,
        query: String,
        result: Result<SearchResults, ApiError>,
    },
    Discover {
        request_id: u64,
        result: Result<(Vec<Video>, Vec<Hashtag>), ApiError>,
    },
    Inbox {
        request_id: u64,
        result: Result<Vec<Notification>, ApiError>,
    },
    ProfileLoaded {
        request_id: u64,
        result: Result<crate::data::Profile, ApiError>,
    },
    Uploaded {
        result: Result<Video, ApiError>,
    },
    LoggedIn {
        result: Result<User, ApiError>,
    },
    LoggedOut {
        result: Result<(), anyhow::Error>,
    },
}

pub struct Options {
    pub status_message: String,
    pub videos: Vec<Video>,
    pub engine: FeedEngine,
    pub feed_service: Arc<dyn FeedService>,
    pub comment_service: Arc<dyn CommentService>,
    pub interaction_service: Arc<dyn InteractionService>,
    pub profile_service: Arc<dyn ProfileService>,
    pub search_service: Arc<dyn SearchService>,
    pub cache: Arc<Cache>,
    pub session: Arc<Mutex<Session>>,
    pub config_path: String,
}

pub struct Model {
    engine: FeedEngine,
    panel: CommentPanel,
    page: AppPage,
    feed_kind: FeedKind,
    feed_page: usize,
    feed_has_more: bool,
    feed_resetting: bool,
    pending_feed: Option<u64>,
    input: InputMode,
    input_buffer: String,
    status_message: String,
    toasts: Vec<(String, Instant)>,
    scroll_offset: f64,
    selected_comment: usize,
    search_results: Option<SearchResults>,
    recent_searches: Vec<String>,
    pending_search: Option<u64>,
    trending_videos: Vec<Video>,
    trending_hashtags: Vec<Hashtag>,
    pending_discover: Option<u64>,
    notifications: Vec<Notification>,
    selected_notification: usize,
    pending_inbox: Option<u64>,
    profile: Option<crate::data::Profile>,
    pending_profile: Option<u64>,
    feed_service: Arc<dyn FeedService>,
    comment_service: Arc<dyn CommentService>,
    interaction_service: Arc<dyn InteractionService>,
    profile_service: Arc<dyn ProfileService>,
    search_service: Arc<dyn SearchService>,
    cache: Arc<Cache>,
    session: Arc<Mutex<Session>>,
    config_path: String,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    next_request_id: u64,
    needs_redraw: bool,
}

impl Model {
    pub fn new(options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let mut engine = options.engine;
        engine.extend(options.videos);
        let recent_searches = options.cache.recent_searches().unwrap_or_default();
        let mut model = Self {
            engine,
            panel: CommentPanel::new(),
            page: AppPage::Home,
            feed_kind: FeedKind::ForYou,
            feed_page: 1,
            feed_has_more: true,
            feed_resetting: false,
            pending_feed: None,
            input: InputMode::Normal,
            input_buffer: String::new(),
            status_message: options.status_message,
            toasts: Vec::new(),
            scroll_offset: 0.0,
            selected_comment: 0,
            search_results: None,
            recent_searches,
            pending_search: None,
            trending_videos: Vec::new(),
            trending_hashtags: Vec::new(),
            pending_discover: None,
            notifications: Vec::new(),
            selected_notification: 0,
            pending_inbox: None,
            profile: None,
            pending_profile: None,
            feed_service: options.feed_service,
            comment_service: options.comment_service,
            interaction_service: options.interaction_service,
            profile_service: options.profile_service,
            search_service: options.search_service,
            cache: options.cache,
            session: options.session,
            config_path: options.config_path,
            response_tx,
            response_rx,
            next_request_id: 1,
            needs_redraw: true,
        };
        if model.engine.is_empty() {
            model.request_feed();
        } else {
            model.engine.on_visibility(0, 1.0);
            model.record_watch();
        }
        model
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    fn toast(&mut self, message: impl Into<String>) {
        self.toasts.push((message.into(), Instant::now()));
        self.mark_dirty();
    }

    fn record_watch(&mut self) {
        if let Some(video) = self.engine.current_video() {
            let id = video.id;
            if let Err(err) = self.cache.push_watch_history(id, Utc::now()) {
                crate::player::debug_log(format!("watch history write failed: {err:#}"));
            }
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let tick_rate = Duration::from_millis(60);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }
            self.advance_time();

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            if event::poll(tick_rate)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.status_message = format!("Error: {err}");
                                self.mark_dirty();
                            }
                        }
                    }
                    Event::Mouse(mouse) => match mouse.kind {
                        MouseEventKind::ScrollDown => {
                            self.scroll_offset += 0.34;
                            self.engine.on_scroll(self.scroll_offset, 1.0);
                            self.mark_dirty();
                        }
                        MouseEventKind::ScrollUp => {
                            self.scroll_offset = (self.scroll_offset - 0.34).max(0.0);
                            self.engine.on_scroll(self.scroll_offset, 1.0);
                            self.mark_dirty();
                        }
                        _ => {}
                    },
                    Event::Resize(..) => self.mark_dirty(),
                    _ => {}
                }
            }
        }

        Ok(())
    }

    /// Time-driven work between events: scroll settling and toast expiry.
    fn advance_time(&mut self) {
        let before = self.engine.current_index();
        self.engine.tick();
        if self.engine.current_index() != before {
            self.scroll_offset = self.engine.current_index() as f64;
            self.record_watch();
            self.mark_dirty();
        }
        let now = Instant::now();
        let before = self.toasts.len();
        self.toasts
            .retain(|(_, created)| now.duration_since(*created) < TOAST_LIFETIME);
        if self.toasts.len() != before {
            self.mark_dirty();
        }
        for message in self.engine.take_toasts() {
            self.toast(message);
        }
        for message in self.panel.take_toasts() {
            self.toast(message);
        }
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        if self.input != InputMode::Normal {
            self.handle_input_key(code);
            return Ok(false);
        }
        if self.panel.is_open() {
            return Ok(self.handle_panel_key(code));
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Char('1') => self.switch_page(AppPage::Home),
            KeyCode::Char('2') => self.switch_page(AppPage::Discover),
            KeyCode::Char('3') => self.switch_page(AppPage::Upload),
            KeyCode::Char('4') => self.switch_page(AppPage::Inbox),
            KeyCode::Char('5') => self.switch_page(AppPage::Profile),
            KeyCode::Char('/') => {
                self.input = InputMode::Search;
                self.input_buffer.clear();
                self.mark_dirty();
            }
            KeyCode::Char('L') => {
                self.input = InputMode::LoginEmail;
                self.input_buffer.clear();
                self.mark_dirty();
            }
            KeyCode::Char('X') => self.logout(),
            _ => match self.page {
                AppPage::Home => self.handle_feed_key(code),
                AppPage::Discover => self.handle_discover_key(code),
                AppPage::Upload => self.handle_upload_key(code),
                AppPage::Inbox => self.handle_inbox_key(code),
                AppPage::Profile => {}
            },
        }
        Ok(false)
    }

    fn handle_feed_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('j') | KeyCode::Down => {
                self.engine.next();
                self.after_navigation();
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.engine.previous();
                self.after_navigation();
            }
            KeyCode::Char(' ') => {
                self.engine.toggle_playback();
                self.mark_dirty();
            }
            KeyCode::Char('l') => self.like_current(),
            KeyCode::Char('m') => {
                let muted = self.engine.toggle_mute();
                self.toast(if muted { "Muted" } else { "Unmuted" });
            }
            KeyCode::Enter => self.double_tap_current(),
            KeyCode::Char('f') => self.follow_current(),
            KeyCode::Char('s') => self.save_current(),
            KeyCode::Char('S') => self.share_current(),
            KeyCode::Char('c') => self.open_comments(),
            KeyCode::Char('t') => {
                self.feed_kind = match self.feed_kind {
                    FeedKind::ForYou => FeedKind::Following,
                    FeedKind::Following => FeedKind::ForYou,
                };
                self.reset_feed();
            }
            KeyCode::Char('r') => self.reset_feed(),
            KeyCode::Char('n') => self.request_feed(),
            _ => {}
        }
    }

    fn after_navigation(&mut self) {
        self.scroll_offset = self.engine.current_index() as f64;
        self.record_watch();
        // Fetch the next page when the end of the loaded feed comes close.
        if self.feed_has_more
            && self.pending_feed.is_none()
            && self.engine.current_index() + 2 >= self.engine.len()
        {
            self.request_feed();
        }
        self.mark_dirty();
    }

    fn reset_feed(&mut self) {
        self.feed_page = 1;
        self.feed_has_more = true;
        self.feed_resetting = true;
        self.pending_feed = None;
        self.request_feed();
    }

    fn request_feed(&mut self) {
        if self.pending_feed.is_some() || !self.feed_has_more {
            return;
        }
        let request_id = self.request_id();
        self.pending_feed = Some(request_id);
        let kind = self.feed_kind;
        let page = self.feed_page;
        let service = self.feed_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.list_feed(kind, page);
            let _ = tx.send(AsyncResponse::Feed {
                request_id,
                kind,
                result,
            });
        });
        self.status_message = "Loading feed…".to_string();
        self.mark_dirty();
    }

    fn like_current(&mut self) {
        let Some(video) = self.engine.current_video() else {
            return;
        };
        let id = video.id;
        match self.engine.begin_like(self.engine.current_index()) {
            Ok(token) => {
                let service = self.interaction_service.clone();
                let tx = self.response_tx.clone();
                thread::spawn(move || {
                    let result = service.toggle_like(id);
                    let _ = tx.send(AsyncResponse::Liked { token, result });
                });
                self.mark_dirty();
            }
            Err(ToggleRefused::InFlight) => self.toast("Hold on, still working on that like"),
            Err(ToggleRefused::OutOfRange) => {}
        }
    }

    fn double_tap_current(&mut self) {
        let Some(video) = self.engine.current_video() else {
            return;
        };
        let id = video.id;
        match self.engine.double_tap_like(self.engine.current_index()) {
            Ok(Some(token)) => {
                let service = self.interaction_service.clone();
                let tx = self.response_tx.clone();
                thread::spawn(move || {
                    let result = service.toggle_like(id);
                    let _ = tx.send(AsyncResponse::Liked { token, result });
                });
                self.mark_dirty();
            }
            Ok(None) => {}
            Err(_) => {}
        }
    }

    fn save_current(&mut self) {
        let Some(video) = self.engine.current_video() else {
            return;
        };
        let id = video.id;
        match self.engine.begin_save(self.engine.current_index()) {
            Ok(token) => {
                let service = self.interaction_service.clone();
                let tx = self.response_tx.clone();
                thread::spawn(move || {
                    let result = service.toggle_save(id);
                    let _ = tx.send(AsyncResponse::Saved { token, result });
                });
                self.mark_dirty();
            }
            Err(ToggleRefused::InFlight) => self.toast("Save already in flight"),
            Err(ToggleRefused::OutOfRange) => {}
        }
    }

    fn follow_current(&mut self) {
        let Some(video) = self.engine.current_video() else {
            return;
        };
        let user_id = video.user.id;
        match self.engine.begin_follow(self.engine.current_index()) {
            Ok(token) => {
                let service = self.interaction_service.clone();
                let tx = self.response_tx.clone();
                thread::spawn(move || {
                    let result = service.toggle_follow(user_id);
                    let _ = tx.send(AsyncResponse::Followed { token, result });
                });
                self.mark_dirty();
            }
            Err(ToggleRefused::InFlight) => self.toast("Follow already in flight"),
            Err(ToggleRefused::OutOfRange) => {}
        }
    }

    fn share_current(&mut self) {
        let Some(video) = self.engine.current_video() else {
            return;
        };
        let id = video.id;
        let service = self.interaction_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.share_video(id);
            let _ = tx.send(AsyncResponse::Shared { result });
        });
    }

    fn open_comments(&mut self) {
        let Some(video) = self.engine.current_video() else {
            return;
        };
        let id = video.id;
        self.selected_comment = 0;
        let request = self.panel.open(id);
        let service = self.comment_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.list_comments(id, None);
            let _ = tx.send(AsyncResponse::CommentsOpened { request, result });
        });
        self.mark_dirty();
    }

    fn handle_panel_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Esc | KeyCode::Char('c') | KeyCode::Char('q') => {
                self.panel.close();
                self.mark_dirty();
            }
            KeyCode::Char('j') | KeyCode::Down => {
                let count = self.panel.comments().len();
                if count > 0 {
                    self.selected_comment = (self.selected_comment + 1).min(count - 1);
                    self.mark_dirty();
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected_comment = self.selected_comment.saturating_sub(1);
                self.mark_dirty();
            }
            KeyCode::Char('i') => {
                self.input = InputMode::Comment;
                self.input_buffer.clear();
                self.mark_dirty();
            }
            KeyCode::Char('n') => {
                if let Some(request) = self.panel.begin_load_more() {
                    let service = self.comment_service.clone();
                    let tx = self.response_tx.clone();
                    thread::spawn(move || {
                        let result = service.list_comments(request.video, Some(request.cursor));
                        let _ = tx.send(AsyncResponse::CommentsMore { request, result });
                    });
                    self.mark_dirty();
                }
            }
            KeyCode::Char('r') => {
                if let Some(comment) = self.panel.comments().get(self.selected_comment) {
                    let id = comment.id;
                    self.panel.toggle_replies(id);
                    self.mark_dirty();
                }
            }
            KeyCode::Char('l') => {
                let Some(comment) = self.panel.comments().get(self.selected_comment) else {
                    return false;
                };
                let id = comment.id;
                match self.panel.begin_comment_like(id) {
                    Ok(token) => {
                        let service = self.comment_service.clone();
                        let tx = self.response_tx.clone();
                        thread::spawn(move || {
                            let result = service.toggle_comment_like(id);
                            let _ = tx.send(AsyncResponse::CommentLiked { token, result });
                        });
                        self.mark_dirty();
                    }
                    Err(_) => self.toast("Comment like already in flight"),
                }
            }
            _ => {}
        }
        false
    }

    fn handle_discover_key(&mut self, code: KeyCode) {
        if code == KeyCode::Char('r') {
            self.request_discover();
        }
    }

    fn handle_upload_key(&mut self, code: KeyCode) {
        if code == KeyCode::Char('i') || code == KeyCode::Enter {
            self.input = InputMode::Upload;
            self.input_buffer.clear();
            self.mark_dirty();
        }
    }

    fn handle_inbox_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('j') | KeyCode::Down => {
                if !self.notifications.is_empty() {
                    self.selected_notification =
                        (self.selected_notification + 1).min(self.notifications.len() - 1);
                    self.mark_dirty();
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected_notification = self.selected_notification.saturating_sub(1);
                self.mark_dirty();
            }
            KeyCode::Enter => {
                if let Some(notification) = self.notifications.get_mut(self.selected_notification)
                {
                    notification.read = true;
                    let id = notification.id;
                    let service = self.profile_service.clone();
                    thread::spawn(move || {
                        let _ = service.mark_notification_read(id);
                    });
                    self.mark_dirty();
                }
            }
            KeyCode::Char('r') => self.request_inbox(),
            _ => {}
        }
    }

    fn handle_input_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => {
                self.input = InputMode::Normal;
                self.input_buffer.clear();
                self.mark_dirty();
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
                self.mark_dirty();
            }
            KeyCode::Char(ch) => {
                self.input_buffer.push(ch);
                self.mark_dirty();
            }
            KeyCode::Enter => {
                let text = std::mem::take(&mut self.input_buffer);
                let mode = std::mem::replace(&mut self.input, InputMode::Normal);
                match mode {
                    InputMode::Search => self.submit_search(text),
                    InputMode::Comment => self.submit_comment(text),
                    InputMode::Upload => self.submit_upload(text),
                    InputMode::LoginEmail => {
                        self.input = InputMode::LoginPassword { email: text };
                    }
                    InputMode::LoginPassword { email } => self.submit_login(email, text),
                    InputMode::Normal => {}
                }
                self.mark_dirty();
            }
            _ => {}
        }
    }

    fn submit_search(&mut self, query: String) {
        let query = query.trim().to_string();
        if query.is_empty() {
            return;
        }
        if let Err(err) = self.cache.push_recent_search(&query) {
            crate::player::debug_log(format!("recent search write failed: {err:#}"));
        }
        self.recent_searches = self.cache.recent_searches().unwrap_or_default();
        let request_id = self.request_id();
        self.pending_search = Some(request_id);
        let service = self.search_service.clone();
        let tx = self.response_tx.clone();
        let sent_query = query.clone();
        thread::spawn(move || {
            let result = service.search(&sent_query, SearchKind::All);
            let _ = tx.send(AsyncResponse::Searched {
                request_id,
                query: sent_query,
                result,
            });
        });
        self.page = AppPage::Discover;
        self.status_message = format!("Searching for \"{query}\"…");
    }

    fn submit_comment(&mut self, text: String) {
        let maybe_author = self.session.lock().user().cloned();
        let author = match maybe_author {
            Some(user) => user,
            None => {
                self.toast("Sign in to comment (press L)");
                return;
            }
        };
        match self.panel.begin_submit(&text, &author) {
            Ok(submission) => {
                let service = self.comment_service.clone();
                let tx = self.response_tx.clone();
                let body = text.trim().to_string();
                thread::spawn(move || {
                    let result = service.post_comment(submission.video, &body);
                    let _ = tx.send(AsyncResponse::CommentPosted { submission, result });
                });
                self.selected_comment = 0;
            }
            Err(message) => self.toast(message),
        }
    }

    fn submit_upload(&mut self, caption: String) {
        if self.session.lock().user().is_none() {
            self.toast("Sign in to upload (press L)");
            return;
        }
        let upload = crate::data::VideoUpload {
            file_name: "clip.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            size_bytes: 12 * 1024 * 1024,
            caption,
            privacy: Privacy::Public,
            duration_secs: 15,
        };
        let service = self.feed_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.upload_video(upload);
            let _ = tx.send(AsyncResponse::Uploaded { result });
        });
        self.status_message = "Uploading…".to_string();
    }

    fn submit_login(&mut self, email: String, password: String) {
        let session = self.session.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = session.lock().login(&email, &password);
            let _ = tx.send(AsyncResponse::LoggedIn { result });
        });
        self.status_message = "Signing in…".to_string();
    }

    fn logout(&mut self) {
        if self.session.lock().user().is_none() {
            self.toast("Not signed in");
            return;
        }
        let session = self.session.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = session.lock().logout();
            let _ = tx.send(AsyncResponse::LoggedOut { result });
        });
        self.status_message = "Signing out…".to_string();
        self.mark_dirty();
    }

    fn switch_page(&mut self, page: AppPage) {
        if page == self.page {
            return;
        }
        // Leaving the feed backgrounds playback; coming back restores it.
        if self.page == AppPage::Home {
            self.engine.on_page_hidden();
        }
        if page == AppPage::Home {
            self.engine.on_page_visible();
        }
        self.page = page;
        match page {
            AppPage::Discover => {
                if self.trending_videos.is_empty() {
                    self.request_discover();
                }
            }
            AppPage::Inbox => self.request_inbox(),
            AppPage::Profile => self.request_profile(),
            _ => {}
        }
        self.mark_dirty();
    }

    fn request_discover(&mut self) {
        let request_id = self.request_id();
        self.pending_discover = Some(request_id);
        let service = self.feed_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service
                .trending_videos()
                .and_then(|videos| service.trending_hashtags().map(|tags| (videos, tags)));
            let _ = tx.send(AsyncResponse::Discover { request_id, result });
        });
    }

    fn request_inbox(&mut self) {
        let request_id = self.request_id();
        self.pending_inbox = Some(request_id);
        let service = self.profile_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.notifications();
            let _ = tx.send(AsyncResponse::Inbox { request_id, result });
        });
    }

    fn request_profile(&mut self) {
        let username = match self.session.lock().user() {
            Some(user) => user.username.clone(),
            None => {
                self.status_message = "Sign in to see your profile (press L)".to_string();
                return;
            }
        };
        let request_id = self.request_id();
        self.pending_profile = Some(request_id);
        let service = self.profile_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.get_profile(&username);
            let _ = tx.send(AsyncResponse::ProfileLoaded { request_id, result });
        });
    }

    fn copy_to_clipboard(&mut self, text: &str) {
        match arboard::Clipboard::new().and_then(|mut clip| clip.set_text(text.to_string())) {
            Ok(()) => self.toast("Link copied to clipboard"),
            Err(_) => self.toast(format!("Share link: {text}")),
        }
    }

    fn poll_async(&mut self) -> bool {
        let mut handled = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.apply_async(message);
            handled = true;
        }
        handled
    }

    fn apply_async(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::Feed {
                request_id,
                kind,
                result,
            } => {
                if self.pending_feed != Some(request_id) || kind != self.feed_kind {
                    return;
                }
                self.pending_feed = None;
                match result {
                    Ok(page) => {
                        let was_empty = self.engine.is_empty();
                        let count = page.items.len();
                        self.feed_has_more = page.has_more;
                        self.feed_page += 1;
                        if std::mem::take(&mut self.feed_resetting) {
                            self.engine.replace(page.items);
                            self.scroll_offset = 0.0;
                            self.record_watch();
                        } else {
                            self.engine.extend(page.items);
                            if was_empty && !self.engine.is_empty() {
                                self.engine.on_visibility(0, 1.0);
                                self.record_watch();
                            }
                        }
                        self.status_message = format!("Loaded {count} videos");
                    }
                    Err(err) => {
                        self.status_message = format!("Feed failed: {err}");
                        self.toast("Couldn't load feed");
                    }
                }
            }
            AsyncResponse::CommentsOpened { request, result } => match result {
                Ok(page) => self.panel.resolve_open(request, page),
                Err(err) => self.panel.fail_open(request, &format!("Comments failed: {err}")),
            },
            AsyncResponse::CommentsMore { request, result } => match result {
                Ok(page) => self.panel.resolve_load_more(request, page),
                Err(err) => self
                    .panel
                    .fail_load_more(request, &format!("Comments failed: {err}")),
            },
            AsyncResponse::CommentPosted { submission, result } => match result {
                Ok(comment) => self.panel.confirm_submit(submission, comment),
                Err(err) => self
                    .panel
                    .fail_submit(submission, &format!("Couldn't post comment: {err}")),
            },
            AsyncResponse::CommentLiked { token, result } => match result {
                Ok(outcome) => self.panel.confirm_comment_like(token, outcome),
                Err(err) => self
                    .panel
                    .fail_comment_like(token, &format!("Couldn't like comment: {err}")),
            },
            AsyncResponse::Liked { token, result } => match result {
                Ok(outcome) => self.engine.confirm_like(token, outcome),
                Err(err) => self.engine.fail(token, &format!("Couldn't like video: {err}")),
            },
            AsyncResponse::Saved { token, result } => match result {
                Ok(outcome) => {
                    let saved = outcome.is_saved;
                    self.engine.confirm_save(token, outcome);
                    self.toast(if saved { "Saved" } else { "Removed from saved" });
                }
                Err(err) => self.engine.fail(token, &format!("Couldn't save video: {err}")),
            },
            AsyncResponse::Followed { token, result } => match result {
                Ok(outcome) => self.engine.confirm_follow(token, outcome),
                Err(err) => self.engine.fail(token, &format!("Couldn't follow: {err}")),
            },
            AsyncResponse::Shared { result } => match result {
                Ok(outcome) => self.copy_to_clipboard(&outcome.share_url),
                Err(err) => self.toast(format!("Couldn't share: {err}")),
            },
            AsyncResponse::Searched {
                request_id,
                query,
                result,
            } => {
                if self.pending_search != Some(request_id) {
                    return;
                }
                self.pending_search = None;
                match result {
                    Ok(results) => {
                        self.status_message = format!(
                            "{} users, {} videos, {} hashtags for \"{query}\"",
                            results.users.len(),
                            results.videos.len(),
                            results.hashtags.len()
                        );
                        self.search_results = Some(results);
                    }
                    Err(err) => {
                        self.status_message = format!("Search failed: {err}");
                        self.toast("Search failed");
                    }
                }
            }
            AsyncResponse::Discover { request_id, result } => {
                if self.pending_discover != Some(request_id) {
                    return;
                }
                self.pending_discover = None;
                match result {
                    Ok((videos, tags)) => {
                        self.trending_videos = videos;
                        self.trending_hashtags = tags;
                    }
                    Err(err) => self.toast(format!("Couldn't load trends: {err}")),
                }
            }
            AsyncResponse::Inbox { request_id, result } => {
                if self.pending_inbox != Some(request_id) {
                    return;
                }
                self.pending_inbox = None;
                match result {
                    Ok(notifications) => {
                        self.notifications = notifications;
                        self.selected_notification = 0;
                    }
                    Err(err) => self.toast(format!("Couldn't load inbox: {err}")),
                }
            }
            AsyncResponse::ProfileLoaded { request_id, result } => {
                if self.pending_profile != Some(request_id) {
                    return;
                }
                self.pending_profile = None;
                match result {
                    Ok(profile) => self.profile = Some(profile),
                    Err(err) => self.toast(format!("Couldn't load profile: {err}")),
                }
            }
            AsyncResponse::Uploaded { result } => match result {
                Ok(video) => {
                    self.status_message = format!("Uploaded: {}", video.caption);
                    self.toast("Video uploaded");
                    // New uploads land at the top of the feed; refetch so
                    // the author sees theirs.
                    self.reset_feed();
                }
                Err(err) => {
                    self.status_message = format!("Upload failed: {err}");
                    self.toast(format!("Upload failed: {err}"));
                }
            },
            AsyncResponse::LoggedIn { result } => match result {
                Ok(user) => {
                    self.status_message = format!("Signed in as @{}", user.username);
                    self.toast(format!("Welcome back, {}", user.display_name));
                }
                Err(err) => {
                    self.status_message = "Sign in failed".to_string();
                    self.toast(format!("{err}"));
                }
            },
            AsyncResponse::LoggedOut { result } => match result {
                Ok(()) => {
                    self.profile = None;
                    self.status_message = "Signed out".to_string();
                }
                Err(err) => self.toast(format!("Sign out failed: {err}")),
            },
        }
    }

    fn draw(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(3),
                Constraint::Length(1),
            ])
            .split(frame.size());

        let tabs = Tabs::new(TAB_TITLES.iter().map(|t| Line::from(*t)).collect::<Vec<_>>())
            .select(self.page.index())
            .highlight_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .divider(" ");
        frame.render_widget(tabs, chunks[0]);

        match self.page {
            AppPage::Home => self.draw_feed(frame, chunks[1]),
            AppPage::Discover => self.draw_discover(frame, chunks[1]),
            AppPage::Upload => self.draw_upload(frame, chunks[1]),
            AppPage::Inbox => self.draw_inbox(frame, chunks[1]),
            AppPage::Profile => self.draw_profile(frame, chunks[1]),
        }

        self.draw_status(frame, chunks[2]);

        if self.panel.is_open() {
            self.draw_comment_overlay(frame, frame.size());
        }
        if self.input != InputMode::Normal {
            self.draw_input(frame, frame.size());
        }
        self.draw_toasts(frame, frame.size());
    }

    fn draw_feed(&self, frame: &mut Frame, area: Rect) {
        if self.engine.is_empty() {
            let empty = Paragraph::new("No videos. Press r to refresh.")
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL).title(" Feed "));
            frame.render_widget(empty, area);
            return;
        }

        let index = self.engine.current_index();
        let video = match self.engine.video(index) {
            Some(video) => video,
            None => return,
        };

        let phase = match self.engine.phase(index) {
            Phase::VisiblePlaying => ("▶ playing", Color::Green),
            Phase::VisiblePaused if self.engine.needs_tap_to_play(index) => {
                ("⏸ tap to play (space)", Color::Yellow)
            }
            Phase::VisiblePaused => ("⏸ paused", Color::Yellow),
            Phase::Buffering { .. } => ("◌ buffering…", Color::Blue),
            Phase::Hidden => ("∅ hidden", Color::DarkGray),
        };

        let feed_label = match self.feed_kind {
            FeedKind::ForYou => "For You",
            FeedKind::Following => "Following",
        };
        let title = format!(" {} · {}/{} ", feed_label, index + 1, self.engine.len());

        let mut lines: Vec<Line> = Vec::new();
        let mut author = vec![Span::styled(
            format!("@{}", video.user.username),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )];
        if video.user.verified {
            author.push(Span::styled(" ✔", Style::default().fg(Color::Blue)));
        }
        if video.user.is_following {
            author.push(Span::styled(" · following", Style::default().fg(Color::Green)));
        }
        author.push(Span::styled(
            format!("  {} followers", format::format_count(video.user.followers)),
            Style::default().fg(Color::DarkGray),
        ));
        lines.push(Line::from(author));
        lines.push(Line::default());
        lines.push(richtext::render_line(&video.caption));
        lines.push(Line::default());
        lines.push(Line::from(vec![Span::styled(
            format!("♫ {}", video.sound.name),
            Style::default().fg(Color::Magenta),
        )]));
        lines.push(Line::default());
        lines.push(Line::from(vec![
            Span::styled(
                format!(
                    "{} {}",
                    if video.is_liked { "♥" } else { "♡" },
                    format::format_count(video.likes)
                ),
                if video.is_liked {
                    Style::default().fg(Color::Red)
                } else {
                    Style::default()
                },
            ),
            Span::raw("   "),
            Span::raw(format!("💬 {}", format::format_count(video.comments))),
            Span::raw("   "),
            Span::raw(format!("↗ {}", format::format_count(video.shares))),
            Span::raw("   "),
            Span::raw(format!("▣ {}", format::format_count(video.views))),
            Span::raw("   "),
            Span::styled(
                if video.is_saved { "⚑ saved" } else { "⚐" },
                Style::default().fg(Color::Yellow),
            ),
        ]));
        lines.push(Line::default());
        let mut state_line = vec![Span::styled(phase.0, Style::default().fg(phase.1))];
        if self.engine.is_failed(index) {
            state_line.push(Span::styled(
                "  ⚠ failed to load",
                Style::default().fg(Color::Red),
            ));
        }
        state_line.push(Span::styled(
            format!("  {}", format::format_time(video.duration_secs as f64)),
            Style::default().fg(Color::DarkGray),
        ));
        state_line.push(Span::styled(
            format!("  {}", format::format_relative(video.created_at, Utc::now())),
            Style::default().fg(Color::DarkGray),
        ));
        lines.push(Line::from(state_line));

        let card = Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(card, area);
    }

    fn draw_discover(&self, frame: &mut Frame, area: Rect) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(area);

        let video_items: Vec<ListItem> = if let Some(results) = &self.search_results {
            results
                .videos
                .iter()
                .map(|video| {
                    ListItem::new(format!(
                        "@{} · {} · {} views",
                        video.user.username,
                        truncate(&video.caption, 40),
                        format::format_count(video.views)
                    ))
                })
                .collect()
        } else {
            self.trending_videos
                .iter()
                .map(|video| {
                    ListItem::new(format!(
                        "@{} · {} · {} views",
                        video.user.username,
                        truncate(&video.caption, 40),
                        format::format_count(video.views)
                    ))
                })
                .collect()
        };
        let left_title = if self.search_results.is_some() {
            " Results "
        } else {
            " Trending "
        };
        frame.render_widget(
            List::new(video_items).block(Block::default().borders(Borders::ALL).title(left_title)),
            columns[0],
        );

        let mut right: Vec<ListItem> = Vec::new();
        if let Some(results) = &self.search_results {
            for user in &results.users {
                right.push(ListItem::new(format!(
                    "@{} · {} followers",
                    user.username,
                    format::format_count(user.followers)
                )));
            }
            for tag in &results.hashtags {
                right.push(ListItem::new(format!(
                    "#{} · {} views",
                    tag.tag,
                    format::format_count(tag.views)
                )));
            }
        } else {
            for tag in &self.trending_hashtags {
                right.push(ListItem::new(format!(
                    "#{} · {} videos · {} views",
                    tag.tag,
                    format::format_count(tag.videos),
                    format::format_count(tag.views)
                )));
            }
            if !self.recent_searches.is_empty() {
                right.push(ListItem::new(""));
                right.push(ListItem::new(Span::styled(
                    "Recent searches:",
                    Style::default().add_modifier(Modifier::BOLD),
                )));
                for query in &self.recent_searches {
                    right.push(ListItem::new(format!("  {query}")));
                }
            }
        }
        frame.render_widget(
            List::new(right).block(Block::default().borders(Borders::ALL).title(" Tags & People ")),
            columns[1],
        );
    }

    fn draw_upload(&self, frame: &mut Frame, area: Rect) {
        let signed_in = self.session.lock().user().is_some();
        let lines = vec![
            Line::default(),
            Line::from("Press i to describe your clip, then Enter to upload."),
            Line::default(),
            Line::from(format!(
                "Captions up to {} characters; hashtags become tags.",
                format::MAX_CAPTION_LEN
            )),
            Line::from(format!(
                "Files up to {}.",
                format::format_file_size(crate::model::MAX_UPLOAD_BYTES)
            )),
            Line::default(),
            if signed_in {
                Line::from(Span::styled("Ready.", Style::default().fg(Color::Green)))
            } else {
                Line::from(Span::styled(
                    "Sign in first (press L).",
                    Style::default().fg(Color::Yellow),
                ))
            },
        ];
        frame.render_widget(
            Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Upload ")),
            area,
        );
    }

    fn draw_inbox(&self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = self
            .notifications
            .iter()
            .enumerate()
            .map(|(i, notification)| {
                let marker = if notification.read { "  " } else { "● " };
                let style = if i == self.selected_notification {
                    Style::default().add_modifier(Modifier::REVERSED)
                } else if notification.read {
                    Style::default().fg(Color::DarkGray)
                } else {
                    Style::default()
                };
                ListItem::new(Line::from(vec![Span::styled(
                    format!(
                        "{}{} · {}",
                        marker,
                        notification.text,
                        format::format_relative(notification.created_at, Utc::now())
                    ),
                    style,
                )]))
            })
            .collect();
        let list = if items.is_empty() {
            List::new(vec![ListItem::new("Nothing here yet.")])
        } else {
            List::new(items)
        };
        frame.render_widget(
            list.block(Block::default().borders(Borders::ALL).title(" Inbox ")),
            area,
        );
    }

    fn draw_profile(&self, frame: &mut Frame, area: Rect) {
        let Some(profile) = &self.profile else {
            let hint = if self.session.lock().user().is_some() {
                "Loading profile…"
            } else {
                "Sign in to see your profile (press L)."
            };
            frame.render_widget(
                Paragraph::new(hint)
                    .alignment(Alignment::Center)
                    .block(Block::default().borders(Borders::ALL).title(" Profile ")),
                area,
            );
            return;
        };

        let mut lines = vec![
            Line::from(vec![
                Span::styled(
                    format!("@{}", profile.user.username),
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw(format!("  ({})", profile.user.display_name)),
            ]),
            Line::from(profile.user.bio.clone()),
            Line::default(),
            Line::from(format!(
                "{} following · {} followers · {} likes",
                format::format_count(profile.user.following),
                format::format_count(profile.user.followers),
                format::format_count(profile.total_likes)
            )),
            Line::from(Span::styled(
                format!("Config: {}", self.config_path),
                Style::default().fg(Color::DarkGray),
            )),
            Line::default(),
            Line::from(Span::styled(
                format!("Videos ({}):", profile.videos.len()),
                Style::default().add_modifier(Modifier::BOLD),
            )),
        ];
        for video in &profile.videos {
            lines.push(Line::from(format!(
                "  {} · {} views · {} likes",
                truncate(&video.caption, 50),
                format::format_count(video.views),
                format::format_count(video.likes)
            )));
        }
        frame.render_widget(
            Paragraph::new(lines)
                .wrap(Wrap { trim: true })
                .block(Block::default().borders(Borders::ALL).title(" Profile ")),
            area,
        );
    }

    fn draw_comment_overlay(&self, frame: &mut Frame, area: Rect) {
        let popup = centered_rect(70, 70, area);
        frame.render_widget(Clear, popup);

        let width = popup.width.saturating_sub(4).max(20) as usize;
        let mut lines: Vec<Line> = Vec::new();
        for (i, comment) in self.panel.comments().iter().enumerate() {
            let selected = i == self.selected_comment;
            let marker = if selected { "> " } else { "  " };
            let like_marker = if comment.is_liked { "♥" } else { "♡" };
            let header = format!(
                "{marker}@{} · {} {} · {}",
                comment.user.username,
                like_marker,
                format::format_count(comment.likes),
                format::format_relative(comment.created_at, Utc::now())
            );
            let header_style = if selected {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            lines.push(Line::from(Span::styled(header, header_style)));
            for wrapped in textwrap::wrap(&comment.text, width.saturating_sub(4)) {
                let mut line = richtext::render_line(&wrapped);
                line.spans.insert(0, Span::raw("    "));
                lines.push(line);
            }
            if !comment.replies.is_empty() {
                if self.panel.replies_expanded(comment.id) {
                    for reply in comment.visible_replies() {
                        lines.push(Line::from(Span::styled(
                            format!("      ↳ @{}", reply.user.username),
                            Style::default().fg(Color::DarkGray),
                        )));
                        for wrapped in textwrap::wrap(&reply.text, width.saturating_sub(8)) {
                            let mut line = richtext::render_line(&wrapped);
                            line.spans.insert(0, Span::raw("        "));
                            lines.push(line);
                        }
                    }
                } else {
                    lines.push(Line::from(Span::styled(
                        format!("      ↳ {} replies (r to expand)", comment.replies.len()),
                        Style::default().fg(Color::DarkGray),
                    )));
                }
            }
            lines.push(Line::default());
        }
        if self.panel.is_loading() {
            lines.push(Line::from(Span::styled(
                "Loading…",
                Style::default().fg(Color::Blue),
            )));
        } else if self.panel.comments().is_empty() {
            lines.push(Line::from("No comments yet. Press i to write one."));
        } else if self.panel.has_more() {
            lines.push(Line::from(Span::styled(
                "n: load more",
                Style::default().fg(Color::DarkGray),
            )));
        }

        let count = self.panel.comments().len();
        let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Comments ({count}) — i write · l like · Esc close ")),
        );
        frame.render_widget(paragraph, popup);
    }

    fn draw_input(&self, frame: &mut Frame, area: Rect) {
        let title = match &self.input {
            InputMode::Search => " Search ",
            InputMode::Comment => " Comment (Enter to post, Esc to cancel) ",
            InputMode::Upload => " Caption (Enter to upload, Esc to cancel) ",
            InputMode::LoginEmail => " Email ",
            InputMode::LoginPassword { .. } => " Password ",
            InputMode::Normal => "",
        };
        let display = if matches!(self.input, InputMode::LoginPassword { .. }) {
            "*".repeat(self.input_buffer.chars().count())
        } else {
            self.input_buffer.clone()
        };
        let popup = input_rect(area, display.width() as u16);
        frame.render_widget(Clear, popup);
        frame.render_widget(
            Paragraph::new(format!("{display}█"))
                .block(Block::default().borders(Borders::ALL).title(title)),
            popup,
        );
    }

    fn draw_status(&self, frame: &mut Frame, area: Rect) {
        let hints = match self.page {
            AppPage::Home => "j/k video · space play · m mute · l like · f follow · s save · S share · c comments · t feed · / search · q quit",
            AppPage::Discover => "/ search · r refresh · 1-5 pages · q quit",
            AppPage::Upload => "i caption · 1-5 pages · q quit",
            AppPage::Inbox => "j/k move · Enter read · r refresh · q quit",
            AppPage::Profile => "1-5 pages · L sign in · X sign out · q quit",
        };
        let line = Line::from(vec![
            Span::styled(
                self.status_message.clone(),
                Style::default().fg(Color::Cyan),
            ),
            Span::raw("  "),
            Span::styled(hints, Style::default().fg(Color::DarkGray)),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn draw_toasts(&self, frame: &mut Frame, area: Rect) {
        if self.toasts.is_empty() {
            return;
        }
        let width = self
            .toasts
            .iter()
            .map(|(text, _)| text.width() as u16 + 4)
            .max()
            .unwrap_or(20)
            .min(area.width.saturating_sub(2));
        let height = (self.toasts.len() as u16 + 2).min(area.height / 3);
        let popup = Rect {
            x: area.width.saturating_sub(width + 1),
            y: 1,
            width,
            height,
        };
        frame.render_widget(Clear, popup);
        let lines: Vec<Line> = self
            .toasts
            .iter()
            .map(|(text, _)| Line::from(text.clone()))
            .collect();
        frame.render_widget(
            Paragraph::new(lines).block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Yellow)),
            ),
            popup,
        );
    }

    #[cfg(test)]
    fn current_video_id(&self) -> Option<crate::model::VideoId> {
        self.engine.current_video().map(|video| video.id)
    }
}

fn truncate(text: &str, max: usize) -> String {
    let mut width = 0;
    let mut out = String::new();
    for ch in text.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + ch_width > max {
            out.push('…');
            return out;
        }
        width += ch_width;
        out.push(ch);
    }
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);
    horizontal[1]
}

fn input_rect(area: Rect, content_width: u16) -> Rect {
    let width = (content_width + 6).clamp(30, area.width.saturating_sub(4));
    let x = area.width.saturating_sub(width) / 2;
    let y = area.height.saturating_sub(4) / 2;
    Rect {
        x,
        y,
        width,
        height: 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, Options as CacheOptions};
    use crate::data::{Dataset, FaultPolicy, MockApi};
    use crate::feed::{FeedOptions, NullPreload};
    use crate::format::SystemClock;
    use crate::player::NullPlayer;
    use tempfile::tempdir;

    fn model(dir: &tempfile::TempDir) -> Model {
        let api = Arc::new(MockApi::new(
            Dataset::seeded(),
            FaultPolicy::None,
            Duration::from_secs(5),
        ));
        api.restore_token("test-token".into());
        let cache = Arc::new(
            Cache::open(CacheOptions {
                path: Some(dir.path().join("cache.db")),
                max_bytes: 1024 * 1024,
            })
            .unwrap(),
        );
        let session = Arc::new(Mutex::new(Session::new(cache.clone(), api.clone())));
        let engine = FeedEngine::new(
            Vec::new(),
            FeedOptions::default(),
            Arc::new(SystemClock),
            Box::new(NullPlayer),
            Box::new(NullPreload),
        );
        let videos = api.list_feed(FeedKind::ForYou, 1).unwrap().items;
        Model::new(Options {
            status_message: String::new(),
            videos,
            engine,
            feed_service: api.clone(),
            comment_service: api.clone(),
            interaction_service: api.clone(),
            profile_service: api.clone(),
            search_service: api,
            cache,
            session,
            config_path: String::new(),
        })
    }

    #[test]
    fn seeded_model_starts_on_first_video() {
        let dir = tempdir().unwrap();
        let model = model(&dir);
        assert_eq!(model.current_video_id(), Some(1));
        assert_eq!(model.engine.phase(0), Phase::VisiblePlaying);
    }

    #[test]
    fn navigation_keys_move_the_feed() {
        let dir = tempdir().unwrap();
        let mut model = model(&dir);
        model.handle_key(KeyCode::Char('j')).unwrap();
        assert_eq!(model.current_video_id(), Some(2));
        model.handle_key(KeyCode::Char('k')).unwrap();
        assert_eq!(model.current_video_id(), Some(1));
        model.handle_key(KeyCode::Char('k')).unwrap();
        assert_eq!(model.current_video_id(), Some(1), "clamped at start");
    }

    #[test]
    fn navigation_records_watch_history() {
        let dir = tempdir().unwrap();
        let mut model = model(&dir);
        model.handle_key(KeyCode::Char('j')).unwrap();
        let history = model.cache.watch_history().unwrap();
        assert!(history.iter().any(|entry| entry.video_id == 2));
    }

    #[test]
    fn like_key_is_optimistic_then_reconciles() {
        let dir = tempdir().unwrap();
        let mut model = model(&dir);
        let before = model.engine.video(0).unwrap().likes;
        model.handle_key(KeyCode::Char('l')).unwrap();
        assert_eq!(model.engine.video(0).unwrap().likes, before + 1);
        assert!(model.engine.video(0).unwrap().is_liked);
        // Worker settles; the server agrees.
        for _ in 0..50 {
            if model.poll_async() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(model.engine.video(0).unwrap().likes, before + 1);
    }

    #[test]
    fn page_keys_switch_pages_and_background_playback() {
        let dir = tempdir().unwrap();
        let mut model = model(&dir);
        assert_eq!(model.engine.phase(0), Phase::VisiblePlaying);
        model.handle_key(KeyCode::Char('2')).unwrap();
        assert_eq!(model.page, AppPage::Discover);
        assert_eq!(model.engine.phase(0), Phase::Hidden);
        model.handle_key(KeyCode::Char('1')).unwrap();
        assert_eq!(model.page, AppPage::Home);
        assert_eq!(model.engine.phase(0), Phase::VisiblePlaying);
    }

    #[test]
    fn mute_key_flips_playback_mute() {
        let dir = tempdir().unwrap();
        let mut model = model(&dir);
        assert!(model.engine.is_muted());
        model.handle_key(KeyCode::Char('m')).unwrap();
        assert!(!model.engine.is_muted());
        model.handle_key(KeyCode::Char('m')).unwrap();
        assert!(model.engine.is_muted());
    }

    #[test]
    fn comment_overlay_opens_and_closes() {
        let dir = tempdir().unwrap();
        let mut model = model(&dir);
        model.handle_key(KeyCode::Char('c')).unwrap();
        assert!(model.panel.is_open());
        model.handle_key(KeyCode::Esc).unwrap();
        assert!(!model.panel.is_open());
    }

    #[test]
    fn search_input_stores_recent_query() {
        let dir = tempdir().unwrap();
        let mut model = model(&dir);
        model.handle_key(KeyCode::Char('/')).unwrap();
        for ch in "dance".chars() {
            model.handle_key(KeyCode::Char(ch)).unwrap();
        }
        model.handle_key(KeyCode::Enter).unwrap();
        assert_eq!(model.page, AppPage::Discover);
        assert_eq!(
            model.cache.recent_searches().unwrap(),
            vec!["dance".to_string()]
        );
    }

    #[test]
    fn truncate_respects_width() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer caption", 8), "a longer…");
    }
}
