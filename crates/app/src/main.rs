use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{env, fmt};

use exam_core::format_remaining;
use exam_core::model::{BranchId, Category, SessionId, TestConfigDraft};
use services::{ApiConfig, AppServices};
use storage::repository::Storage;
use storage::snapshots::SnapshotRepository;
use tracing::debug;

mod console;
mod telemetry;

use console::Console;

const DEFAULT_DB_URL: &str = "sqlite://exam.sqlite3";
const MEMORY_DB_URL: &str = "sqlite::memory:";

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingSessionId,
    UnknownArg(String),
    UnknownCommand(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidSessionId { raw: String },
    InvalidCategory { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingSessionId => write!(f, "a session id is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidSessionId { raw } => write!(f, "invalid session id: {raw}"),
            ArgsError::InvalidCategory { raw } => write!(f, "unknown category: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_number(raw: String, flag: &'static str) -> Result<u32, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app generate [--questions <n>] [--minutes <n>] [--category <name>]...");
    eprintln!("               [--branch <id>] [--no-repeats] [--db <sqlite_url>]");
    eprintln!("  app attempt <session_id> [--yes] [--db <sqlite_url>]");
    eprintln!("  app list [--db <sqlite_url>]");
    eprintln!("  app result <session_id> [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db {DEFAULT_DB_URL}");
    eprintln!("  --questions 10 --minutes 15 (all categories, repeats allowed)");
    eprintln!();
    eprintln!("Categories:");
    for category in Category::ALL {
        eprintln!("  {category}");
    }
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_API_URL, EXAM_ACCESS_TOKEN, EXAM_API_TIMEOUT_SECS, EXAM_DB_URL,");
    eprintln!("  RUST_LOG, EXAM_LOG_JSON");
}

#[derive(Debug)]
enum Command {
    Generate(TestConfigDraft),
    Attempt { session: SessionId, accept: bool },
    List,
    Result { session: SessionId },
}

#[derive(Debug)]
struct Args {
    db_url: String,
    command: Command,
}

impl Args {
    /// Parse the command line. `Ok(None)` means help was requested.
    fn parse(argv: Vec<String>, env_db_url: Option<String>) -> Result<Option<Self>, ArgsError> {
        let mut args = argv.into_iter();
        let Some(subcommand) = args.next() else {
            return Ok(None);
        };

        let mut db_url =
            env_db_url.map_or_else(|| DEFAULT_DB_URL.to_string(), normalize_sqlite_url);
        let mut draft = TestConfigDraft::default();
        let mut session = None;
        let mut accept = false;

        match subcommand.as_str() {
            "--help" | "-h" | "help" => return Ok(None),
            "generate" | "attempt" | "list" | "result" => {}
            _ => return Err(ArgsError::UnknownCommand(subcommand)),
        }
        let takes_session = matches!(subcommand.as_str(), "attempt" | "result");
        let is_generate = subcommand == "generate";

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--help" | "-h" => return Ok(None),
                "--questions" if is_generate => {
                    draft.number_of_questions =
                        parse_number(require_value(&mut args, "--questions")?, "--questions")?;
                }
                "--minutes" if is_generate => {
                    draft.time_limit_minutes =
                        parse_number(require_value(&mut args, "--minutes")?, "--minutes")?;
                }
                "--category" if is_generate => {
                    let value = require_value(&mut args, "--category")?;
                    let category = value
                        .parse::<Category>()
                        .map_err(|_| ArgsError::InvalidCategory { raw: value.clone() })?;
                    draft.categories.push(category);
                }
                "--branch" if is_generate => {
                    let value = require_value(&mut args, "--branch")?;
                    let branch = value.parse::<BranchId>().map_err(|_| ArgsError::InvalidNumber {
                        flag: "--branch",
                        raw: value.clone(),
                    })?;
                    draft.branch_id = Some(branch);
                }
                "--no-repeats" if is_generate => draft.allow_repeats = false,
                "--yes" | "-y" if subcommand == "attempt" => accept = true,
                raw if takes_session && session.is_none() && !raw.starts_with('-') => {
                    let id = raw
                        .parse::<SessionId>()
                        .map_err(|_| ArgsError::InvalidSessionId { raw: arg.clone() })?;
                    session = Some(id);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let command = match subcommand.as_str() {
            "generate" => Command::Generate(draft),
            "list" => Command::List,
            "attempt" => Command::Attempt {
                session: session.ok_or(ArgsError::MissingSessionId)?,
                accept,
            },
            _ => Command::Result {
                session: session.ok_or(ArgsError::MissingSessionId)?,
            },
        };
        Ok(Some(Self { db_url, command }))
    }
}

/// Turn a `--db` / `EXAM_DB_URL` value into an absolute `sqlite://` URL.
///
/// Plain paths and `sqlite:<path>` are resolved against the working
/// directory; full `sqlite://` URLs and the in-memory URL pass through.
fn normalize_sqlite_url(raw: String) -> String {
    let value = raw.trim();
    if value == MEMORY_DB_URL || value.starts_with("sqlite://") {
        return value.to_string();
    }
    let file = PathBuf::from(value.strip_prefix("sqlite:").unwrap_or(value));
    let file = if file.is_absolute() {
        file
    } else {
        env::current_dir().map_or_else(|_| file.clone(), |cwd| cwd.join(&file))
    };
    format!("sqlite://{}", file.display())
}

/// Create the directory that will hold the attempt database.
///
/// The database file itself is created when the store connects.
fn ensure_db_dir(db_url: &str) -> Result<(), Box<dyn Error>> {
    if db_url == MEMORY_DB_URL {
        return Ok(());
    }
    let invalid = || ArgsError::InvalidDbUrl {
        raw: db_url.to_string(),
    };
    let rest = db_url.strip_prefix("sqlite://").ok_or_else(invalid)?;
    let file = rest.split_once('?').map_or(rest, |(file, _)| file);
    if file.is_empty() {
        return Err(invalid().into());
    }
    if let Some(dir) = Path::new(file).parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

async fn list_attempts(storage: &Storage) -> Result<(), Box<dyn Error>> {
    let snapshots = SnapshotRepository::new(Arc::clone(&storage.kv));
    let sessions = snapshots.list_sessions().await?;
    if sessions.is_empty() {
        println!("No saved attempts.");
        return Ok(());
    }
    for id in sessions {
        let Some(snapshot) = snapshots.load(id).await? else {
            continue;
        };
        if let Some(result) = snapshot.submitted {
            println!("{id}: submitted (result {result})");
            continue;
        }
        println!(
            "{id}: {} of {} answered, {} left",
            snapshot.answers.len(),
            snapshot.questions.len(),
            format_remaining(snapshot.remaining_seconds)
        );
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let argv: Vec<String> = env::args().skip(1).collect();
    let parsed = Args::parse(argv, env::var("EXAM_DB_URL").ok()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    let Some(parsed) = parsed else {
        print_usage();
        return Ok(());
    };

    telemetry::init_tracing()?;

    // Open + migrate SQLite at startup; the snapshot store lives there.
    ensure_db_dir(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url).await?;
    debug!(db_url = %parsed.db_url, "storage ready");

    if let Command::List = parsed.command {
        return list_attempts(&storage).await;
    }

    let services = AppServices::with_storage(storage, ApiConfig::from_env()?)?;
    let exam_loop = services.exam_loop();

    match parsed.command {
        Command::Generate(draft) => {
            let session = exam_loop.generate(draft).await?;
            let instructions = exam_loop.instructions(session.id()).await?;
            console::print_instructions(&instructions);
            println!();
            println!("Start it with: attempt {}", session.id());
        }
        Command::Attempt { session, accept } => {
            let mut console = Console::new();
            let instructions = exam_loop.instructions(session).await?;
            console::print_instructions(&instructions);
            let accepted = accept || console.confirm("Begin the test now? [y/N] ").await?;
            let controller = exam_loop.begin_attempt(session, accepted).await?;
            console.run_attempt(controller).await?;
        }
        Command::Result { session } => {
            let summary = exam_loop.fetch_result(session).await?;
            console::print_result(&summary);
        }
        Command::List => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
