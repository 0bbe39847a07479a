//! `frontdesk` - Patient and memo queue for a clinic front desk
//!
//! Entries move from waiting to in progress to done. The list lives in a
//! hosted database with push updates when one is configured and falls back
//! to a local `SQLite` file otherwise.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod entry;
pub mod error;
pub mod logging;
pub mod notify;
pub mod parser;
pub mod queue;
pub mod remote;
pub mod session;
pub mod storage;
pub mod store;
pub mod views;

pub use config::Config;
pub use entry::{Entry, EntryId, Status};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use notify::{Notification, NotificationDispatcher, Severity};
pub use parser::{ParsedMemo, TextParser};
pub use queue::QueueManager;
pub use remote::{RemoteStore, SupabaseConnector};
pub use storage::LocalStore;
pub use store::{ChangeEvent, ChangeFeed, Connector, EntryStore};
pub use views::ViewMode;
