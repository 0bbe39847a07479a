//! Notification dispatch.
//!
//! Every notification shows an in-app banner. Side channels (audible cue,
//! OS notification, unread badge) are optional capabilities; their failures
//! are logged and never reach the caller.

use std::collections::VecDeque;
use std::fmt;
use std::io::{IsTerminal, Write};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::NotificationConfig;
use crate::error::{Error, Result};

/// Title used for OS-level notifications.
pub const SYSTEM_TITLE: &str = "PhysioFlow 메모 알림";

/// Window title shown when there is nothing unread.
const BASE_TITLE: &str = "frontdesk";

/// How many past notifications are kept for `history`.
const HISTORY_LIMIT: usize = 20;

/// How loud a notification is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Something moved back to waiting.
    Info,
    /// Something is being handled.
    Success,
    /// A new memo arrived.
    Alert,
}

impl Severity {
    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Alert => "alert",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message plus its severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Text shown to the operator.
    pub message: String,
    /// Severity.
    pub severity: Severity,
}

impl Notification {
    /// Create a notification.
    #[must_use]
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

/// The visible banner and when it goes away.
#[derive(Debug, Clone)]
struct Toast {
    notification: Notification,
    expires_at: Instant,
}

/// OS notification permission, as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Never asked.
    Default,
    /// Notifications may be shown.
    Granted,
    /// The system refused.
    Denied,
}

/// Short audible cue.
pub trait SoundCue: Send + fmt::Debug {
    /// Play the cue once.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot play it.
    fn play(&mut self) -> Result<()>;
}

/// OS-level notification surface.
pub trait SystemNotifier: Send + fmt::Debug {
    /// Current permission, without asking.
    fn permission(&self) -> Permission;

    /// Ask for permission and remember the answer.
    fn request_permission(&mut self) -> Permission;

    /// Raise a silent notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification could not be raised.
    fn show(&mut self, title: &str, notification: &Notification) -> Result<()>;
}

/// Unread count surface.
pub trait BadgeSink: Send + fmt::Debug {
    /// Show `count` unread notifications.
    ///
    /// # Errors
    ///
    /// Returns an error if the badge cannot be updated.
    fn set(&mut self, count: u32) -> Result<()>;

    /// Remove the badge.
    ///
    /// # Errors
    ///
    /// Returns an error if the badge cannot be updated.
    fn clear(&mut self) -> Result<()>;
}

/// Fans a notification out to the banner and every available side channel.
#[derive(Debug)]
pub struct NotificationDispatcher {
    banner_lifetime: Duration,
    system_enabled: bool,
    permission_requested: bool,
    focused: bool,
    unread: u32,
    current: Option<Toast>,
    history: VecDeque<Notification>,
    sound: Option<Box<dyn SoundCue>>,
    system: Option<Box<dyn SystemNotifier>>,
    badge: Option<Box<dyn BadgeSink>>,
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(NotificationConfig::default().banner_secs))
    }
}

impl NotificationDispatcher {
    /// A dispatcher with only the in-app banner.
    #[must_use]
    pub fn new(banner_lifetime: Duration) -> Self {
        Self {
            banner_lifetime,
            system_enabled: false,
            permission_requested: false,
            focused: true,
            unread: 0,
            current: None,
            history: VecDeque::with_capacity(HISTORY_LIMIT),
            sound: None,
            system: None,
            badge: None,
        }
    }

    /// A dispatcher wired to the terminal and desktop, per `config`.
    ///
    /// Terminal capabilities are attached only when stderr is a terminal.
    /// OS notifications start off; see
    /// [`NotificationDispatcher::restore_system_toggle`].
    #[must_use]
    pub fn from_config(config: &NotificationConfig) -> Self {
        let mut dispatcher = Self::new(Duration::from_secs(config.banner_secs))
            .with_system(Box::new(DesktopNotifier::default()));

        if std::io::stderr().is_terminal() {
            if config.sound_enabled {
                dispatcher = dispatcher.with_sound(Box::new(TerminalBell));
            }
            dispatcher = dispatcher.with_badge(Box::new(TerminalTitle));
        }

        dispatcher
    }

    /// Attach an audible cue.
    #[must_use]
    pub fn with_sound(mut self, sound: Box<dyn SoundCue>) -> Self {
        self.sound = Some(sound);
        self
    }

    /// Attach an OS notifier.
    #[must_use]
    pub fn with_system(mut self, system: Box<dyn SystemNotifier>) -> Self {
        self.system = Some(system);
        self
    }

    /// Attach a badge surface.
    #[must_use]
    pub fn with_badge(mut self, badge: Box<dyn BadgeSink>) -> Self {
        self.badge = Some(badge);
        self
    }

    /// Notify now.
    pub fn notify(&mut self, message: impl Into<String>, severity: Severity) {
        self.notify_at(message, severity, Instant::now());
    }

    /// Notify as of `now`.
    pub fn notify_at(&mut self, message: impl Into<String>, severity: Severity, now: Instant) {
        let notification = Notification::new(message, severity);
        debug!("Notify [{}] {}", severity, notification.message);

        self.current = Some(Toast {
            notification: notification.clone(),
            expires_at: now + self.banner_lifetime,
        });

        if let Some(sound) = self.sound.as_mut() {
            if let Err(e) = sound.play() {
                debug!("Sound cue failed: {}", e);
            }
        }

        if self.system_enabled {
            if let Some(system) = self.system.as_mut() {
                if system.permission() == Permission::Granted {
                    if let Err(e) = system.show(SYSTEM_TITLE, &notification) {
                        warn!("System notification failed: {}", e);
                    }
                }
            }
        }

        if !self.focused {
            self.unread = self.unread.saturating_add(1);
            if let Some(badge) = self.badge.as_mut() {
                if let Err(e) = badge.set(self.unread) {
                    debug!("Badge update failed: {}", e);
                }
            }
        }

        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(notification);
    }

    /// The banner visible at `now`, if any.
    #[must_use]
    pub fn banner(&self, now: Instant) -> Option<&Notification> {
        self.current
            .as_ref()
            .filter(|toast| now < toast.expires_at)
            .map(|toast| &toast.notification)
    }

    /// Drop an expired banner. Returns `true` if one was removed.
    pub fn expire(&mut self, now: Instant) -> bool {
        match &self.current {
            Some(toast) if now >= toast.expires_at => {
                self.current = None;
                true
            }
            _ => false,
        }
    }

    /// Close the banner early.
    pub fn dismiss(&mut self) {
        self.current = None;
    }

    /// Past notifications, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Notification> {
        self.history.iter()
    }

    /// Track focus. Regaining focus clears the unread count and badge.
    pub fn set_focused(&mut self, focused: bool) {
        if focused && !self.focused {
            self.unread = 0;
            if let Some(badge) = self.badge.as_mut() {
                if let Err(e) = badge.clear() {
                    debug!("Badge clear failed: {}", e);
                }
            }
        }
        self.focused = focused;
    }

    /// Whether the session currently has focus.
    #[must_use]
    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Notifications received while unfocused.
    #[must_use]
    pub fn unread(&self) -> u32 {
        self.unread
    }

    /// Whether OS notifications are switched on.
    #[must_use]
    pub fn system_enabled(&self) -> bool {
        self.system_enabled
    }

    /// Switch OS notifications on, asking for permission the first time.
    ///
    /// Permission is requested at most once per dispatcher. On denial the
    /// toggle stays off.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if notifications cannot be shown.
    pub fn enable_system_notifications(&mut self) -> Result<()> {
        let Some(system) = self.system.as_mut() else {
            self.system_enabled = false;
            return Err(Error::PermissionDenied(
                "no system notifier available".to_string(),
            ));
        };

        let mut permission = system.permission();
        if permission == Permission::Default && !self.permission_requested {
            self.permission_requested = true;
            permission = system.request_permission();
            info!("System notification permission: {:?}", permission);
        }

        if permission == Permission::Granted {
            self.system_enabled = true;
            Ok(())
        } else {
            self.system_enabled = false;
            Err(Error::PermissionDenied(
                "system notifications are blocked; enable them in your desktop settings"
                    .to_string(),
            ))
        }
    }

    /// Apply a saved OS-notification toggle.
    ///
    /// When `config.system_enabled` is set, asks for permission. On denial
    /// the toggle in `config` is switched off so the caller can persist it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if the saved toggle could not be
    /// honoured.
    pub fn restore_system_toggle(&mut self, config: &mut NotificationConfig) -> Result<()> {
        if !config.system_enabled {
            return Ok(());
        }
        self.enable_system_notifications().map_err(|e| {
            config.system_enabled = false;
            e
        })
    }

    /// Switch OS notifications off.
    pub fn disable_system_notifications(&mut self) {
        self.system_enabled = false;
    }
}

/// Terminal bell on stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalBell;

impl SoundCue for TerminalBell {
    fn play(&mut self) -> Result<()> {
        let mut err = std::io::stderr();
        err.write_all(b"\x07")?;
        err.flush()?;
        Ok(())
    }
}

/// Unread count in the terminal window title.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalTitle;

impl TerminalTitle {
    fn write_title(title: &str) -> Result<()> {
        let mut err = std::io::stderr();
        write!(err, "\x1b]0;{title}\x07")?;
        err.flush()?;
        Ok(())
    }
}

impl BadgeSink for TerminalTitle {
    fn set(&mut self, count: u32) -> Result<()> {
        Self::write_title(&format!("({count}) {BASE_TITLE}"))
    }

    fn clear(&mut self) -> Result<()> {
        Self::write_title(BASE_TITLE)
    }
}

/// OS notifications through the platform notification service.
///
/// On Linux and the BSDs permission counts as granted when a notification
/// server answers on the session bus. Other platforms always grant it.
#[derive(Debug)]
pub struct DesktopNotifier {
    permission: Permission,
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self {
            permission: Permission::Default,
        }
    }
}

impl SystemNotifier for DesktopNotifier {
    fn permission(&self) -> Permission {
        self.permission
    }

    fn request_permission(&mut self) -> Permission {
        self.permission = if notification_server_available() {
            Permission::Granted
        } else {
            Permission::Denied
        };
        self.permission
    }

    fn show(&mut self, title: &str, notification: &Notification) -> Result<()> {
        let mut toast = notify_rust::Notification::new();
        toast
            .summary(title)
            .body(&notification.message)
            .appname(BASE_TITLE);
        #[cfg(all(unix, not(target_os = "macos")))]
        toast.hint(notify_rust::Hint::SuppressSound(true));

        toast
            .show()
            .map(|_| ())
            .map_err(|e| Error::internal(format!("desktop notification failed: {e}")))
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn notification_server_available() -> bool {
    match notify_rust::get_server_information() {
        Ok(info) => {
            debug!("Notification server: {} {}", info.name, info.version);
            true
        }
        Err(e) => {
            debug!("No notification server: {}", e);
            false
        }
    }
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn notification_server_available() -> bool {
    true
}
