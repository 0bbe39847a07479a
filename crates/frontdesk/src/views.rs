//! Read-only renderings of the queue.
//!
//! The desk view is a list form under the input prompt; the board view lays
//! the same two groups out as side-by-side columns for a wall display.

use std::fmt::{self, Write as _};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::entry::Entry;
use crate::notify::{Notification, Severity};
use crate::queue::QueueManager;

const WAITING_TITLE: &str = "대기 환자 / 메모";
const IN_PROGRESS_TITLE: &str = "메모 확인";
const INPUT_TITLE: &str = "메모 입력 (Desk)";
const INPUT_HINT: &str = "예: 김진표 충격파, 이지성 5시 변경 (이름과 내용을 띄어쓰기로 입력)";
const CONNECTED: &str = "● 연결됨";

/// Width of one board column, in terminal cells.
const BOARD_COLUMN_WIDTH: usize = 38;

/// Which rendering to use.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Input prompt plus two lists.
    #[default]
    Desk,
    /// Two side-by-side columns.
    Board,
}

impl ViewMode {
    /// The other mode.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Desk => Self::Board,
            Self::Board => Self::Desk,
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Desk => f.write_str("desk"),
            Self::Board => f.write_str("board"),
        }
    }
}

/// Everything a view needs, borrowed from the queue.
#[derive(Debug)]
pub struct Snapshot<'a> {
    /// Waiting entries in arrival order.
    pub waiting: Vec<&'a Entry>,
    /// In-progress entries in arrival order.
    pub in_progress: Vec<&'a Entry>,
    /// Remote mode is active.
    pub connected: bool,
    /// The banner visible right now.
    pub banner: Option<&'a Notification>,
}

impl<'a> Snapshot<'a> {
    /// Capture the queue as of `now`.
    #[must_use]
    pub fn of(queue: &'a QueueManager, now: Instant) -> Self {
        Self {
            waiting: queue.waiting().collect(),
            in_progress: queue.in_progress().collect(),
            connected: queue.is_connected(),
            banner: queue.notifier().banner(now),
        }
    }
}

/// Render `snapshot` in `mode`.
#[must_use]
pub fn render(mode: ViewMode, snapshot: &Snapshot<'_>) -> String {
    match mode {
        ViewMode::Desk => render_desk(snapshot),
        ViewMode::Board => render_board(snapshot),
    }
}

/// List form: input header, waiting list, in-progress list.
#[must_use]
pub fn render_desk(snapshot: &Snapshot<'_>) -> String {
    let mut out = String::new();
    header(&mut out, INPUT_TITLE, snapshot);
    let _ = writeln!(out, "  {INPUT_HINT}");
    out.push('\n');

    let _ = writeln!(out, "{WAITING_TITLE} ({})", snapshot.waiting.len());
    list(&mut out, &snapshot.waiting, "대기 중인 메모가 없습니다.");
    out.push('\n');

    let _ = writeln!(out, "{IN_PROGRESS_TITLE} ({})", snapshot.in_progress.len());
    list(&mut out, &snapshot.in_progress, "확인 중인 메모가 없습니다.");
    out
}

/// Column form: waiting on the left, in progress on the right.
#[must_use]
pub fn render_board(snapshot: &Snapshot<'_>) -> String {
    let mut out = String::new();
    header(&mut out, "Board", snapshot);
    out.push('\n');

    let left_title = format!("{WAITING_TITLE} ({})", snapshot.waiting.len());
    let right_title = format!("{IN_PROGRESS_TITLE} ({})", snapshot.in_progress.len());
    row(&mut out, &left_title, &right_title);
    let rule = "─".repeat(BOARD_COLUMN_WIDTH);
    let _ = writeln!(out, "{rule}─┼─{rule}");

    let left = column(&snapshot.waiting, "대기 중인 메모가 없습니다");
    let right = column(&snapshot.in_progress, "확인 중인 메모가 없습니다");
    let height = left.len().max(right.len());
    for i in 0..height {
        let l = left.get(i).map_or("", String::as_str);
        let r = right.get(i).map_or("", String::as_str);
        row(&mut out, l, r);
    }
    out
}

fn header(out: &mut String, title: &str, snapshot: &Snapshot<'_>) {
    if snapshot.connected {
        let _ = writeln!(out, "{title}  {CONNECTED}");
    } else {
        let _ = writeln!(out, "{title}");
    }
    if let Some(banner) = snapshot.banner {
        let _ = writeln!(out, "{} {}", marker(banner.severity), banner.message);
    }
}

fn marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "[i]",
        Severity::Success => "[✓]",
        Severity::Alert => "[!]",
    }
}

fn list(out: &mut String, entries: &[&Entry], empty: &str) {
    if entries.is_empty() {
        let _ = writeln!(out, "  {empty}");
        return;
    }
    for entry in entries {
        let _ = writeln!(out, "  {}  {}  {}", entry.id.short(), entry.name, entry.memo);
    }
}

fn column(entries: &[&Entry], empty: &str) -> Vec<String> {
    if entries.is_empty() {
        return vec![empty.to_string()];
    }
    entries
        .iter()
        .map(|e| format!("{} {} · {}", e.id.short(), e.name, e.memo))
        .collect()
}

fn row(out: &mut String, left: &str, right: &str) {
    let _ = writeln!(
        out,
        "{} │ {}",
        fit(left, BOARD_COLUMN_WIDTH),
        fit(right, BOARD_COLUMN_WIDTH)
    );
}

/// Pad or truncate to exactly `width` cells.
fn fit(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = char_width(ch);
        if used + w > width {
            // Leave room for the ellipsis.
            while used + 1 > width {
                match out.pop() {
                    Some(last) => used -= char_width(last),
                    None => break,
                }
            }
            out.push('…');
            used += 1;
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push_str(&" ".repeat(width.saturating_sub(used)));
    out
}

/// Terminal cells taken by `ch`. Control characters take none.
fn char_width(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(0)
}

/// Display width of `text` in terminal cells.
#[must_use]
pub fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Status;

    fn entry(name: &str, memo: &str, status: Status) -> Entry {
        let mut e = Entry::new(name, memo);
        e.status = status;
        e
    }

    fn snapshot<'a>(entries: &'a [Entry], connected: bool) -> Snapshot<'a> {
        Snapshot {
            waiting: entries.iter().filter(|e| e.is_waiting()).collect(),
            in_progress: entries.iter().filter(|e| e.is_in_progress()).collect(),
            connected,
            banner: None,
        }
    }

    #[test]
    fn test_desk_empty_lists() {
        let out = render_desk(&snapshot(&[], false));
        assert!(out.contains("대기 환자 / 메모 (0)"));
        assert!(out.contains("메모 확인 (0)"));
        assert!(out.contains("대기 중인 메모가 없습니다."));
        assert!(out.contains("확인 중인 메모가 없습니다."));
        assert!(!out.contains(CONNECTED));
    }

    #[test]
    fn test_desk_groups_entries() {
        let entries = vec![
            entry("Kim", "ultrasound", Status::Waiting),
            entry("Lee", "taping", Status::InProgress),
            entry("Park", "4시로 변경", Status::Waiting),
        ];
        let out = render_desk(&snapshot(&entries, true));

        assert!(out.contains("대기 환자 / 메모 (2)"));
        assert!(out.contains("메모 확인 (1)"));
        assert!(out.contains(&format!("{}  Kim  ultrasound", entries[0].id.short())));
        assert!(out.contains(CONNECTED));

        let waiting_at = out.find("대기 환자").unwrap();
        let kim_at = out.find("Kim").unwrap();
        let park_at = out.find("Park").unwrap();
        let progress_at = out.find("메모 확인").unwrap();
        let lee_at = out.find("Lee").unwrap();
        assert!(waiting_at < kim_at && kim_at < park_at && park_at < progress_at);
        assert!(progress_at < lee_at);
    }

    #[test]
    fn test_banner_is_shown() {
        let banner = Notification::new("새 메모: Kim", Severity::Alert);
        let snap = Snapshot {
            banner: Some(&banner),
            ..snapshot(&[], false)
        };
        assert!(render_desk(&snap).contains("[!] 새 메모: Kim"));
        assert!(render_board(&snap).contains("[!] 새 메모: Kim"));
    }

    #[test]
    fn test_board_columns_line_up() {
        let entries = vec![
            entry("김진표", "충격파", Status::Waiting),
            entry("Lee", "taping", Status::InProgress),
        ];
        let out = render_board(&snapshot(&entries, false));

        assert!(out.contains("대기 환자 / 메모 (1)"));
        assert!(out.contains("메모 확인 (1)"));

        let rows: Vec<&str> = out.lines().filter(|l| l.contains(" │ ")).collect();
        assert!(!rows.is_empty());
        for line in rows {
            let (left, _) = line.split_once(" │ ").unwrap();
            assert_eq!(display_width(left), BOARD_COLUMN_WIDTH, "row: {line}");
        }
    }

    #[test]
    fn test_board_empty_columns() {
        let out = render_board(&snapshot(&[], false));
        assert!(out.contains("대기 중인 메모가 없습니다"));
        assert!(out.contains("확인 중인 메모가 없습니다"));
    }

    #[test]
    fn test_fit_pads_and_truncates() {
        assert_eq!(fit("abc", 5), "abc  ");
        assert_eq!(fit("abcdef", 4), "abc…");
        assert_eq!(display_width(&fit("가나다라", 5)), 5);
        assert_eq!(fit("가나다라", 5), "가나…");
    }

    #[test]
    fn test_display_width() {
        assert_eq!(display_width("Kim"), 3);
        assert_eq!(display_width("김진표"), 6);
        assert_eq!(display_width("✅😀"), 4);
    }

    #[test]
    fn test_board_aligns_emoji_memos() {
        let entries = vec![
            entry("Kim", "✅ 확인 😀", Status::Waiting),
            entry("Lee", "taping", Status::InProgress),
        ];
        let out = render_board(&snapshot(&entries, false));

        for line in out.lines().filter(|l| l.contains(" │ ")) {
            let (left, _) = line.split_once(" │ ").unwrap();
            assert_eq!(display_width(left), BOARD_COLUMN_WIDTH, "row: {line}");
        }
    }

    #[test]
    fn test_view_mode_toggle_and_display() {
        assert_eq!(ViewMode::Desk.toggled(), ViewMode::Board);
        assert_eq!(ViewMode::Board.toggled(), ViewMode::Desk);
        assert_eq!(ViewMode::default().to_string(), "desk");
    }

    #[test]
    fn test_render_dispatches_on_mode() {
        let snap = snapshot(&[], false);
        assert!(render(ViewMode::Desk, &snap).contains(INPUT_TITLE));
        assert!(render(ViewMode::Board, &snap).contains("─┼─"));
    }
}
