mod accounts;
mod cli;
mod config;
mod contact;
mod journal;
mod session;
mod stopwatch;

use anyhow::{Context as _, Result};
use clap::Parser;
use std::cell::RefCell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "espaco", about = "Gym accounts and workout stopwatch")]
pub struct Args {
    #[arg(long, env = "ESPACO_STORE", help = "Account store file (default: users.json)")]
    pub store: Option<PathBuf>,

    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(
        long = "tick-ms",
        env = "ESPACO_TICK_MS",
        value_name = "N",
        help = "Stopwatch refresh interval in milliseconds"
    )]
    pub tick_ms: Option<u64>,

    #[arg(long, help = "Activity journal directory")]
    pub journal_dir: Option<PathBuf>,

    #[arg(long, help = "Do not write an activity journal")]
    pub no_journal: bool,

    #[arg(long, help = "Debug output (print resolved settings)")]
    pub debug: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut cfg = if let Some(config_path) = &args.config {
        config::Config::load_from(config_path)?
    } else {
        config::Config::load().unwrap_or_else(|e| {
            eprintln!("Warning: {:#}; using defaults", e);
            config::Config::default()
        })
    };

    // CLI and environment take priority over config files
    if let Some(store) = &args.store {
        cfg.store.path = store.clone();
    }
    if let Some(tick_ms) = args.tick_ms {
        cfg.stopwatch.tick_ms = tick_ms;
    }
    if let Some(dir) = &args.journal_dir {
        cfg.journal.dir = Some(dir.clone());
    }
    if args.no_journal {
        cfg.journal.enabled = false;
    }

    if let Err(errors) = cfg.validate() {
        for error in &errors {
            eprintln!("Config error {}", error);
        }
        return Err(anyhow::anyhow!(
            "Invalid configuration ({} error(s))",
            errors.len()
        ));
    }

    if args.debug {
        eprintln!("[DEBUG] Resolved config:");
        eprintln!("{}", toml::to_string_pretty(&cfg)?);
    }

    let root = std::env::current_dir()?;
    let store = accounts::AccountStore::open(&cfg.store.path)
        .with_context(|| format!("Cannot open account store {}", cfg.store.path.display()))?;

    let session_id = uuid::Uuid::new_v4().to_string();
    let journal = if cfg.journal.enabled {
        let dir = cfg.journal_dir(&root);
        match journal::Journal::in_dir(&dir, &session_id, &root) {
            Ok(mut journal) => {
                if let Err(e) = journal.session_start(store.path(), store.len()) {
                    eprintln!("Warning: failed to write journal: {}", e);
                }
                Some(journal)
            }
            Err(e) => {
                eprintln!("Warning: journal disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    if args.debug {
        eprintln!(
            "[DEBUG] Store: {} ({} account(s))",
            store.path().display(),
            store.len()
        );
        if store.is_empty() {
            eprintln!("[DEBUG] No accounts yet; use /register");
        }
        for account in store.accounts() {
            eprintln!("[DEBUG]   {} <{}>", account.name, account.email);
        }
    }

    let ctx = cli::Context {
        root,
        session_id,
        session: RefCell::new(session::Session::new(cfg.tick_interval())),
        config: cfg,
        store: RefCell::new(store),
        journal: RefCell::new(journal),
        launcher: Box::new(contact::SystemLauncher),
    };

    cli::run_repl(ctx)
}
