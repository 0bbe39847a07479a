//! `frontdesk` - CLI for the front-desk memo queue
//!
//! One-shot commands change or print the queue and exit; `run` opens the
//! interactive desk.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::timeout_at;
use tracing::{debug, warn};

use frontdesk::cli::{AddCommand, Cli, Command, ConfigCommand, ListCommand};
use frontdesk::logging::Verbosity;
use frontdesk::session::Session;
use frontdesk::storage::schema::REMOTE_TABLE_SQL;
use frontdesk::views::{self, Snapshot};
use frontdesk::{
    init_logging, parser, ChangeEvent, Config, LocalStore, NotificationDispatcher, QueueManager,
    Status, SupabaseConnector, TextParser,
};

/// How long a one-shot command waits for the remote echo of its change.
const ECHO_WAIT: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbosity = match cli.command {
        Command::Run(_) => cli.verbosity().for_session(),
        _ => cli.verbosity(),
    };
    init_logging(verbosity);

    let config_path = cli.config.clone().unwrap_or_else(Config::default_config_path);

    // Config commands must work even when the file does not validate
    if let Command::Config(cmd) = cli.command {
        return handle_config(&config_path, cmd);
    }

    let config = Config::load_from(Some(config_path.clone()))
        .with_context(|| format!("loading {}", config_path.display()))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(run(cli.command, config, &config_path, verbosity))
}

async fn run(
    command: Command,
    mut config: Config,
    config_path: &Path,
    verbosity: Verbosity,
) -> Result<()> {
    let mut queue = open_queue(&mut config, config_path).await?;
    let quiet = verbosity == Verbosity::Quiet;

    match command {
        Command::Run(cmd) => {
            let parser = TextParser::new(&config.ai.model);
            let session = Session::new(
                queue,
                parser,
                config.ai.api_key.clone(),
                cmd.view,
                config.idle_timeout(),
            );
            return session.run().await.context("interactive session failed");
        }
        Command::Add(cmd) => handle_add(&mut queue, &config, &cmd).await?,
        Command::Start(args) => move_entry(&mut queue, &args.id, Status::InProgress).await?,
        Command::Wait(args) => move_entry(&mut queue, &args.id, Status::Waiting).await?,
        Command::Done(args) => move_entry(&mut queue, &args.id, Status::Done).await?,
        Command::Delete(args) => {
            let id = queue.resolve_id(&args.id)?;
            queue.delete(&id).await?;
            await_echo(&mut queue, |event| event.id() == &id).await;
        }
        Command::List(cmd) => handle_list(&queue, &cmd)?,
        Command::Status(cmd) => handle_status(&queue, &config, cmd.json)?,
        Command::Config(_) => {}
    }

    if !quiet {
        print_banner(&queue);
    }
    queue.dispose();
    Ok(())
}

/// Open the local store, restore the saved OS-notification toggle and
/// connect the queue.
///
/// A denied notification permission is reported on stderr and the toggle is
/// saved as off.
async fn open_queue(config: &mut Config, config_path: &Path) -> Result<QueueManager> {
    let db_path = config.database_path();
    let local = LocalStore::open(&db_path)
        .with_context(|| format!("opening local store at {}", db_path.display()))?;

    let mut notifier = NotificationDispatcher::from_config(&config.notifications);
    if let Err(e) = notifier.restore_system_toggle(&mut config.notifications) {
        eprintln!("{e}");
        if let Err(e) = config.save_to(config_path) {
            warn!("Could not save notifications.system_enabled = false: {}", e);
        }
    }
    let mut queue = QueueManager::new(Arc::new(local), Box::new(SupabaseConnector), notifier);
    queue.initialize(&config.remote).await;
    Ok(queue)
}

async fn handle_add(queue: &mut QueueManager, config: &Config, cmd: &AddCommand) -> Result<()> {
    let parsed = match &cmd.name {
        Some(name) => parser::manual(name, cmd.memo.as_deref().unwrap_or_default())?,
        None => {
            let text = cmd.joined_text();
            let parser = TextParser::new(&config.ai.model);
            parser
                .resolve(&text, &config.ai.api_key)
                .await
                .context("nothing to add")?
        }
    };

    queue.add(&parsed.name, &parsed.memo).await?;
    await_echo(queue, |event| event.is_insert_of(&parsed.name, &parsed.memo)).await;
    Ok(())
}

async fn move_entry(queue: &mut QueueManager, prefix: &str, status: Status) -> Result<()> {
    let id = queue.resolve_id(prefix)?;
    queue.set_status(&id, status).await?;
    await_echo(queue, |event| event.id() == &id).await;
    Ok(())
}

/// Wait for the push event that confirms our own change.
///
/// In remote mode the list only changes when the push event arrives. Other
/// desks' events that come first are applied and skipped.
async fn await_echo(queue: &mut QueueManager, confirms: impl Fn(&ChangeEvent) -> bool) {
    if !queue.has_feed() {
        return;
    }
    let deadline = tokio::time::Instant::now() + ECHO_WAIT;
    loop {
        match timeout_at(deadline, queue.next_event()).await {
            Ok(Some(event)) if confirms(&event) => {
                debug!("Change confirmed: {:?}", event);
                return;
            }
            Ok(Some(event)) => debug!("Skipping unrelated change: {:?}", event),
            Ok(None) => {
                debug!("Change feed closed before confirmation");
                return;
            }
            Err(_) => {
                debug!("No confirmation within {:?}", ECHO_WAIT);
                return;
            }
        }
    }
}

fn handle_list(queue: &QueueManager, cmd: &ListCommand) -> Result<()> {
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(queue.entries())?);
    } else {
        let snapshot = Snapshot {
            banner: None,
            ..Snapshot::of(queue, Instant::now())
        };
        print!("{}", views::render(cmd.view, &snapshot));
    }
    Ok(())
}

fn handle_status(queue: &QueueManager, config: &Config, json: bool) -> Result<()> {
    let waiting = queue.waiting().count();
    let in_progress = queue.in_progress().count();
    let mode = if queue.is_connected() { "remote" } else { "local" };

    if json {
        let status = serde_json::json!({
            "mode": mode,
            "store": queue.store_name(),
            "realtime": queue.has_feed(),
            "remote_url": config.remote.url,
            "remote_table": config.remote.table,
            "database_path": config.database_path(),
            "waiting": waiting,
            "in_progress": in_progress,
            "ai_parsing": !config.ai.api_key.trim().is_empty(),
            "system_notifications": queue.notifier().system_enabled(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("frontdesk status");
        println!("----------------");
        println!("Mode:          {mode}");
        if queue.is_connected() {
            println!("Remote:        {} ({})", config.remote.url, config.remote.table);
            println!(
                "Realtime:      {}",
                if queue.has_feed() { "subscribed" } else { "off" }
            );
        }
        println!("Database:      {}", config.database_path().display());
        println!("Waiting:       {waiting}");
        println!("In progress:   {in_progress}");
        println!(
            "AI parsing:    {}",
            if config.ai.api_key.trim().is_empty() { "off (split on first space)" } else { "on" }
        );
    }
    Ok(())
}

fn print_banner(queue: &QueueManager) {
    if let Some(banner) = queue.notifier().banner(Instant::now()) {
        eprintln!("[{}] {}", banner.severity, banner.message);
    }
}

fn handle_config(path: &Path, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(Some(path.to_path_buf()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", toml::to_string_pretty(&config)?);
            }
        }
        ConfigCommand::Path => {
            println!("{}", path.display());
        }
        ConfigCommand::Set { key, value } => {
            let mut config = Config::load_from(Some(path.to_path_buf()))?;
            config.set(&key, &value)?;
            config.validate()?;
            config.check_remote_url()?;

            if key == "notifications.system_enabled" {
                let mut notifier = NotificationDispatcher::from_config(&config.notifications);
                if let Err(e) = notifier.restore_system_toggle(&mut config.notifications) {
                    eprintln!("{e}");
                }
            }

            config.save_to(path)?;
            println!("{key} updated.");
        }
        ConfigCommand::Reset { yes } => {
            if yes {
                Config::default().save_to(path)?;
                println!("Configuration reset to defaults.");
            } else {
                println!("This will reset all configuration to defaults.");
                println!("Use --yes to confirm.");
            }
        }
        ConfigCommand::Validate { file } => {
            let target = file.unwrap_or_else(|| path.to_path_buf());
            println!("Validating configuration: {}", target.display());
            match Config::load_from(Some(target)).and_then(|c| c.check_remote_url()) {
                Ok(()) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
        ConfigCommand::Schema => {
            print!("{REMOTE_TABLE_SQL}");
        }
    }
    Ok(())
}
