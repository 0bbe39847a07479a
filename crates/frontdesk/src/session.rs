//! Interactive desk session.
//!
//! Reads lines from stdin, applies remote change events as they arrive and
//! redraws the chosen view. Free text becomes a new memo; a handful of short
//! commands move or remove entries.

use std::io::{IsTerminal, Write};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::entry::Status;
use crate::error::Result;
use crate::parser::TextParser;
use crate::queue::QueueManager;
use crate::views::{self, Snapshot, ViewMode};

/// How often banners and idleness are checked.
const TICK: Duration = Duration::from_secs(1);

const HELP: &str = "\
  <이름> <내용>      add a memo (e.g. 김진표 충격파)
  start <id>         move to 확인 중
  wait <id>          move back to 대기
  done <id>          finish (removes the memo)
  del <id>           delete without finishing
  view [desk|board]  switch view (no argument toggles)
  history            recent notifications
  help               this list
  quit               leave";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Free text to parse into a memo.
    Add(String),
    /// Change an entry's status.
    Move {
        /// Id or id prefix.
        id: String,
        /// Target status.
        status: Status,
    },
    /// Remove an entry.
    Delete(String),
    /// Switch view; `None` toggles.
    View(Option<ViewMode>),
    /// Show recent notifications.
    History,
    /// Show the command list.
    Help,
    /// Leave the session.
    Quit,
    /// Blank line.
    Nothing,
}

/// Interpret one line of input.
///
/// Command words only count when followed by something that looks like an
/// id, so `start 물리치료` is still a memo.
#[must_use]
pub fn parse_command(line: &str) -> SessionCommand {
    let text = line.trim();
    if text.is_empty() {
        return SessionCommand::Nothing;
    }

    let mut words = text.split_whitespace();
    let head = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    match (head, args.as_slice()) {
        ("quit" | "exit" | "q", []) => SessionCommand::Quit,
        ("help" | "?", []) => SessionCommand::Help,
        ("history", []) => SessionCommand::History,
        ("view", []) => SessionCommand::View(None),
        ("view", ["desk"]) => SessionCommand::View(Some(ViewMode::Desk)),
        ("view", ["board"]) => SessionCommand::View(Some(ViewMode::Board)),
        ("start", [id]) if looks_like_id(id) => SessionCommand::Move {
            id: (*id).to_string(),
            status: Status::InProgress,
        },
        ("wait", [id]) if looks_like_id(id) => SessionCommand::Move {
            id: (*id).to_string(),
            status: Status::Waiting,
        },
        ("done", [id]) if looks_like_id(id) => SessionCommand::Move {
            id: (*id).to_string(),
            status: Status::Done,
        },
        ("del" | "delete", [id]) if looks_like_id(id) => SessionCommand::Delete((*id).to_string()),
        _ => SessionCommand::Add(text.to_string()),
    }
}

fn looks_like_id(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}

/// What the loop should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading.
    Continue,
    /// Stop the session.
    Quit,
}

/// The interactive loop and its state.
#[derive(Debug)]
pub struct Session {
    queue: QueueManager,
    parser: TextParser,
    api_key: String,
    view: ViewMode,
    idle_timeout: Duration,
    last_input: Instant,
    message: Option<String>,
}

impl Session {
    /// Create a session over an initialized queue.
    #[must_use]
    pub fn new(
        queue: QueueManager,
        parser: TextParser,
        api_key: impl Into<String>,
        view: ViewMode,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            parser,
            api_key: api_key.into(),
            view,
            idle_timeout,
            last_input: Instant::now(),
            message: None,
        }
    }

    /// The queue.
    #[must_use]
    pub fn queue(&self) -> &QueueManager {
        &self.queue
    }

    /// The current view.
    #[must_use]
    pub fn view(&self) -> ViewMode {
        self.view
    }

    /// The line shown under the view (errors, help, history).
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Run until `quit` or end of input, then release the feed.
    ///
    /// # Errors
    ///
    /// Returns an error if stdin cannot be read.
    pub async fn run(mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut tick = tokio::time::interval(TICK);
        info!("Session started in {} view", self.view);
        self.redraw();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        debug!("End of input");
                        break;
                    };
                    if self.handle_line(&line).await == Flow::Quit {
                        break;
                    }
                    self.redraw();
                }
                event = self.queue.next_event() => {
                    if event.is_none() {
                        self.message = Some("실시간 연결이 끊어졌습니다.".to_string());
                    }
                    self.redraw();
                }
                _ = tick.tick() => {
                    if self.on_tick(Instant::now()) {
                        self.redraw();
                    }
                }
            }
        }

        self.queue.dispose();
        info!("Session ended");
        Ok(())
    }

    /// Handle one input line.
    pub async fn handle_line(&mut self, line: &str) -> Flow {
        self.touch(Instant::now());
        self.message = None;

        match parse_command(line) {
            SessionCommand::Nothing => {}
            SessionCommand::Quit => return Flow::Quit,
            SessionCommand::Help => self.message = Some(HELP.to_string()),
            SessionCommand::History => self.message = Some(self.history()),
            SessionCommand::View(mode) => {
                self.view = mode.unwrap_or_else(|| self.view.toggled());
            }
            SessionCommand::Add(text) => {
                let Some(parsed) = self.parser.resolve(&text, &self.api_key).await else {
                    return Flow::Continue;
                };
                if let Err(e) = self.queue.add(&parsed.name, &parsed.memo).await {
                    self.message = Some(e.to_string());
                }
            }
            SessionCommand::Move { id, status } => {
                let result = match self.queue.resolve_id(&id) {
                    Ok(id) => self.queue.set_status(&id, status).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    self.message = Some(e.to_string());
                }
            }
            SessionCommand::Delete(id) => {
                let result = match self.queue.resolve_id(&id) {
                    Ok(id) => self.queue.delete(&id).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    self.message = Some(e.to_string());
                }
            }
        }
        Flow::Continue
    }

    /// Expire banners and track idleness. Returns `true` if a redraw is due.
    pub fn on_tick(&mut self, now: Instant) -> bool {
        let notifier = self.queue.notifier_mut();
        let mut dirty = notifier.expire(now);
        if notifier.is_focused() && now.duration_since(self.last_input) >= self.idle_timeout {
            debug!("Session idle, counting unread notifications");
            notifier.set_focused(false);
            dirty = true;
        }
        dirty
    }

    fn touch(&mut self, now: Instant) {
        self.last_input = now;
        self.queue.notifier_mut().set_focused(true);
    }

    fn history(&self) -> String {
        let lines: Vec<String> = self
            .queue
            .notifier()
            .history()
            .map(|n| format!("  [{}] {}", n.severity, n.message))
            .collect();
        if lines.is_empty() {
            "  (no notifications yet)".to_string()
        } else {
            lines.join("\n")
        }
    }

    /// The full screen as of `now`.
    #[must_use]
    pub fn render(&self, now: Instant) -> String {
        let snapshot = Snapshot::of(&self.queue, now);
        let mut screen = views::render(self.view, &snapshot);
        if let Some(message) = &self.message {
            screen.push('\n');
            screen.push_str(message);
            screen.push('\n');
        }
        screen
    }

    fn redraw(&self) {
        let screen = self.render(Instant::now());
        let mut out = std::io::stdout().lock();
        if out.is_terminal() {
            let _ = write!(out, "\x1b[2J\x1b[H");
        }
        let _ = write!(out, "{screen}\n> ");
        let _ = out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;
    use crate::notify::{NotificationDispatcher, Severity};
    use crate::remote::SupabaseConnector;
    use crate::storage::LocalStore;
    use std::sync::Arc;

    async fn session() -> Session {
        let local = Arc::new(LocalStore::open_in_memory().unwrap());
        let mut queue = QueueManager::new(
            local,
            Box::new(SupabaseConnector),
            NotificationDispatcher::default(),
        );
        let remote = RemoteConfig {
            enabled: false,
            ..RemoteConfig::default()
        };
        queue.initialize(&remote).await;
        Session::new(
            queue,
            TextParser::default(),
            "",
            ViewMode::Desk,
            Duration::from_secs(30),
        )
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("  "), SessionCommand::Nothing);
        assert_eq!(parse_command("quit"), SessionCommand::Quit);
        assert_eq!(parse_command("help"), SessionCommand::Help);
        assert_eq!(parse_command("view"), SessionCommand::View(None));
        assert_eq!(
            parse_command("view board"),
            SessionCommand::View(Some(ViewMode::Board))
        );
        assert_eq!(
            parse_command("start 1a2b"),
            SessionCommand::Move {
                id: "1a2b".to_string(),
                status: Status::InProgress
            }
        );
        assert_eq!(
            parse_command("done 1a2b-3c"),
            SessionCommand::Move {
                id: "1a2b-3c".to_string(),
                status: Status::Done
            }
        );
        assert_eq!(
            parse_command("del abc"),
            SessionCommand::Delete("abc".to_string())
        );
    }

    #[test]
    fn test_command_words_without_id_are_memos() {
        assert_eq!(
            parse_command("start 물리치료"),
            SessionCommand::Add("start 물리치료".to_string())
        );
        assert_eq!(
            parse_command("김진표 충격파"),
            SessionCommand::Add("김진표 충격파".to_string())
        );
        assert_eq!(
            parse_command("view everything"),
            SessionCommand::Add("view everything".to_string())
        );
    }

    #[tokio::test]
    async fn test_free_text_adds_memo() {
        let mut s = session().await;

        assert_eq!(s.handle_line("Kim ultrasound").await, Flow::Continue);
        assert_eq!(s.handle_line("Solo").await, Flow::Continue);

        let entries = s.queue().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "Kim");
        assert_eq!(entries[0].memo, "ultrasound");
        assert_eq!(entries[1].memo, crate::entry::DEFAULT_MEMO);

        let banner = s.queue().notifier().banner(Instant::now()).unwrap();
        assert_eq!(banner.message, "새 메모: Solo");
        assert_eq!(banner.severity, Severity::Alert);
    }

    #[tokio::test]
    async fn test_move_and_finish_by_prefix() {
        let mut s = session().await;
        s.handle_line("Kim ultrasound").await;
        let short = s.queue().entries()[0].id.short().to_string();

        s.handle_line(&format!("start {short}")).await;
        assert!(s.queue().entries()[0].is_in_progress());

        s.handle_line(&format!("done {short}")).await;
        assert!(s.queue().entries().is_empty());
        assert!(s.message().is_none());
    }

    #[tokio::test]
    async fn test_unknown_id_sets_message() {
        let mut s = session().await;
        s.handle_line("start abcdef").await;
        assert!(s.message().unwrap().contains("abcdef"));
    }

    #[tokio::test]
    async fn test_view_switching() {
        let mut s = session().await;
        s.handle_line("view").await;
        assert_eq!(s.view(), ViewMode::Board);
        s.handle_line("view desk").await;
        assert_eq!(s.view(), ViewMode::Desk);
        assert!(s.render(Instant::now()).contains("메모 입력"));
    }

    #[tokio::test]
    async fn test_quit() {
        let mut s = session().await;
        assert_eq!(s.handle_line("quit").await, Flow::Quit);
    }

    #[tokio::test]
    async fn test_idle_tick_unfocuses_and_input_refocuses() {
        let mut s = session().await;
        let start = Instant::now();
        s.touch(start);

        assert!(!s.on_tick(start + Duration::from_secs(5)));
        assert!(s.queue().notifier().is_focused());

        assert!(s.on_tick(start + Duration::from_secs(31)));
        assert!(!s.queue().notifier().is_focused());

        s.handle_line("Kim x").await;
        assert!(s.queue().notifier().is_focused());
        assert_eq!(s.queue().notifier().unread(), 0);
    }

    #[tokio::test]
    async fn test_history_lists_notifications() {
        let mut s = session().await;
        s.handle_line("Kim x").await;
        s.handle_line("history").await;
        assert!(s.message().unwrap().contains("[alert] 새 메모: Kim"));
    }
}
