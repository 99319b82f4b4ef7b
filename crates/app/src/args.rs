use std::fmt;
use std::path::{Path, PathBuf};

use quest_core::model::{BadgeId, Category, ExerciseId};

pub const DEFAULT_DATA_DIR: &str = "quest-data";
pub const DB_FILE_NAME: &str = "quest.sqlite3";

#[derive(Debug, PartialEq)]
pub enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArg { what: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidCategory { raw: String },
    InvalidId { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArg { what } => write!(f, "missing {what}"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidCategory { raw } => write!(f, "unknown category: {raw}"),
            ArgsError::InvalidId { raw } => write!(f, "invalid id: {raw:?}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_number<T: std::str::FromStr>(raw: String, flag: &'static str) -> Result<T, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn parse_category(raw: String) -> Result<Category, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidCategory { raw })
}

fn parse_exercise(raw: String) -> Result<ExerciseId, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidId { raw })
}

fn parse_badge(raw: String) -> Result<BadgeId, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidId { raw })
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  quest [show]                                  [options]");
    eprintln!("  quest catalog                                 [options]");
    eprintln!("  quest session  --category <cat> --correct <n> --incorrect <n>");
    eprintln!("                 [--questions <n>] [--minutes <m>] [--avg-secs <s>]");
    eprintln!("  quest ask      --category <cat> <exercise-id>...");
    eprintln!("  quest answer   --category <cat> <exercise-id> (--right | --wrong)");
    eprintln!("  quest equip    <badge-id>");
    eprintln!("  quest unequip  <badge-id>");
    eprintln!("  quest stats    (<exercise-id> | --category <cat>)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --data-dir <dir>   cache directory (default ./{DEFAULT_DATA_DIR})");
    eprintln!("  --db <sqlite_url>  durable store (default sqlite://<data-dir>/{DB_FILE_NAME})");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUEST_DATA_DIR, QUEST_DB_URL, QUEST_LOG");
}

/// Numbers describing a finished round, as typed on the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundArgs {
    pub category: Category,
    pub questions: Option<u32>,
    pub correct: u32,
    pub incorrect: u32,
    pub minutes: f64,
    pub avg_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Show,
    Catalog,
    Session(RoundArgs),
    Ask {
        category: Category,
        ids: Vec<ExerciseId>,
    },
    Answer {
        category: Category,
        id: ExerciseId,
        is_correct: bool,
    },
    Equip(BadgeId),
    Unequip(BadgeId),
    Stats(StatsTarget),
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatsTarget {
    Exercise(ExerciseId),
    Category(Category),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    pub data_dir: PathBuf,
    pub db_url: String,
    pub command: Command,
}

/// Flags shared by every subcommand.
struct Common {
    data_dir: Option<PathBuf>,
    db_url: Option<String>,
}

impl Common {
    fn try_take(
        &mut self,
        arg: &str,
        args: &mut impl Iterator<Item = String>,
    ) -> Result<bool, ArgsError> {
        match arg {
            "--data-dir" => {
                self.data_dir = Some(PathBuf::from(require_value(args, "--data-dir")?));
                Ok(true)
            }
            "--db" => {
                let value = require_value(args, "--db")?;
                if value.trim().is_empty() {
                    return Err(ArgsError::InvalidDbUrl { raw: value });
                }
                self.db_url = Some(value);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl Args {
    /// Parse `argv` (without the program name). `env` looks up environment
    /// variables so tests do not depend on the real process environment.
    pub fn parse(
        argv: impl IntoIterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut args = argv.into_iter().peekable();
        let name = match args.peek().map(String::as_str) {
            None => "show".to_owned(),
            Some(first) if first.starts_with('-') && first != "--help" && first != "-h" => {
                "show".to_owned()
            }
            Some(_) => args.next().unwrap_or_default(),
        };

        let mut common = Common {
            data_dir: None,
            db_url: None,
        };
        let command = match name.as_str() {
            "show" => parse_flags_only(&mut args, &mut common, Command::Show)?,
            "catalog" => parse_flags_only(&mut args, &mut common, Command::Catalog)?,
            "session" => parse_session(&mut args, &mut common)?,
            "ask" => parse_ask(&mut args, &mut common)?,
            "answer" => parse_answer(&mut args, &mut common)?,
            "equip" => Command::Equip(parse_badge_command(&mut args, &mut common)?),
            "unequip" => Command::Unequip(parse_badge_command(&mut args, &mut common)?),
            "stats" => parse_stats(&mut args, &mut common)?,
            "help" | "--help" | "-h" => Command::Help,
            other => return Err(ArgsError::UnknownCommand(other.to_owned())),
        };

        let data_dir = common
            .data_dir
            .or_else(|| env("QUEST_DATA_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let db_url = match common.db_url.or_else(|| env("QUEST_DB_URL")) {
            Some(raw) => normalize_sqlite_url(&raw),
            None => default_db_url(&data_dir),
        };

        Ok(Self {
            data_dir,
            db_url,
            command,
        })
    }
}

fn parse_flags_only(
    args: &mut impl Iterator<Item = String>,
    common: &mut Common,
    command: Command,
) -> Result<Command, ArgsError> {
    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Ok(Command::Help);
        }
        if !common.try_take(&arg, args)? {
            return Err(ArgsError::UnknownArg(arg));
        }
    }
    Ok(command)
}

fn parse_session(
    args: &mut impl Iterator<Item = String>,
    common: &mut Common,
) -> Result<Command, ArgsError> {
    let mut category = None;
    let mut questions = None;
    let mut correct = None;
    let mut incorrect = 0;
    let mut minutes = 1.0;
    let mut avg_secs = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--category" => category = Some(parse_category(require_value(args, "--category")?)?),
            "--questions" => {
                questions = Some(parse_number(require_value(args, "--questions")?, "--questions")?);
            }
            "--correct" => {
                correct = Some(parse_number(require_value(args, "--correct")?, "--correct")?);
            }
            "--incorrect" => {
                incorrect = parse_number(require_value(args, "--incorrect")?, "--incorrect")?;
            }
            "--minutes" => {
                let raw = require_value(args, "--minutes")?;
                let value: f64 = parse_number(raw.clone(), "--minutes")?;
                if !value.is_finite() || value < 0.0 {
                    return Err(ArgsError::InvalidNumber {
                        flag: "--minutes",
                        raw,
                    });
                }
                minutes = value;
            }
            "--avg-secs" => {
                avg_secs = Some(parse_number(require_value(args, "--avg-secs")?, "--avg-secs")?);
            }
            _ => {
                if !common.try_take(&arg, args)? {
                    return Err(ArgsError::UnknownArg(arg));
                }
            }
        }
    }

    Ok(Command::Session(RoundArgs {
        category: category.ok_or(ArgsError::MissingArg { what: "--category" })?,
        questions,
        correct: correct.ok_or(ArgsError::MissingArg { what: "--correct" })?,
        incorrect,
        minutes,
        avg_secs,
    }))
}

fn parse_ask(
    args: &mut impl Iterator<Item = String>,
    common: &mut Common,
) -> Result<Command, ArgsError> {
    let mut category = None;
    let mut ids = Vec::new();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--category" => category = Some(parse_category(require_value(args, "--category")?)?),
            _ if arg.starts_with("--") => {
                if !common.try_take(&arg, args)? {
                    return Err(ArgsError::UnknownArg(arg));
                }
            }
            _ => ids.push(parse_exercise(arg)?),
        }
    }
    if ids.is_empty() {
        return Err(ArgsError::MissingArg { what: "exercise id" });
    }
    Ok(Command::Ask {
        category: category.ok_or(ArgsError::MissingArg { what: "--category" })?,
        ids,
    })
}

fn parse_answer(
    args: &mut impl Iterator<Item = String>,
    common: &mut Common,
) -> Result<Command, ArgsError> {
    let mut category = None;
    let mut id = None;
    let mut is_correct = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--category" => category = Some(parse_category(require_value(args, "--category")?)?),
            "--right" => is_correct = Some(true),
            "--wrong" => is_correct = Some(false),
            _ if arg.starts_with("--") => {
                if !common.try_take(&arg, args)? {
                    return Err(ArgsError::UnknownArg(arg));
                }
            }
            _ if id.is_none() => id = Some(parse_exercise(arg)?),
            _ => return Err(ArgsError::UnknownArg(arg)),
        }
    }
    Ok(Command::Answer {
        category: category.ok_or(ArgsError::MissingArg { what: "--category" })?,
        id: id.ok_or(ArgsError::MissingArg { what: "exercise id" })?,
        is_correct: is_correct.ok_or(ArgsError::MissingArg {
            what: "--right or --wrong",
        })?,
    })
}

fn parse_badge_command(
    args: &mut impl Iterator<Item = String>,
    common: &mut Common,
) -> Result<BadgeId, ArgsError> {
    let mut badge = None;
    while let Some(arg) = args.next() {
        if arg.starts_with("--") {
            if !common.try_take(&arg, args)? {
                return Err(ArgsError::UnknownArg(arg));
            }
        } else if badge.is_none() {
            badge = Some(parse_badge(arg)?);
        } else {
            return Err(ArgsError::UnknownArg(arg));
        }
    }
    badge.ok_or(ArgsError::MissingArg { what: "badge id" })
}

fn parse_stats(
    args: &mut impl Iterator<Item = String>,
    common: &mut Common,
) -> Result<Command, ArgsError> {
    let mut target = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--category" => {
                target = Some(StatsTarget::Category(parse_category(require_value(
                    args,
                    "--category",
                )?)?));
            }
            _ if arg.starts_with("--") => {
                if !common.try_take(&arg, args)? {
                    return Err(ArgsError::UnknownArg(arg));
                }
            }
            _ => target = Some(StatsTarget::Exercise(parse_exercise(arg)?)),
        }
    }
    target
        .map(Command::Stats)
        .ok_or(ArgsError::MissingArg {
            what: "exercise id or --category",
        })
}

fn default_db_url(data_dir: &Path) -> String {
    normalize_sqlite_url(&data_dir.join(DB_FILE_NAME).display().to_string())
}

/// Accepts `sqlite://...`, `sqlite:...` or a bare path and returns an
/// absolute `sqlite://` url. In-memory urls pass through untouched.
pub fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") || trimmed.contains("mode=memory") {
        return trimmed.to_owned();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Filesystem path behind a `sqlite://` url, if it names a file.
pub fn sqlite_file_path(db_url: &str) -> Option<&Path> {
    let path = db_url.strip_prefix("sqlite://")?;
    let path = path.split('?').next().unwrap_or(path);
    (!path.is_empty()).then(|| Path::new(path))
}
