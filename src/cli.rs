//! Command-line parsing and `.env` loading.

use crate::classifier::{classify, range_category, RangeCategory, RangeTable, ValueBag};
use crate::models::site::{MeasurementKind, Status};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

pub const USAGE: &str = "usage: encinos-progress [--env-file PATH] [COMMAND]

commands:
  dashboard                   full dashboard payload (default)
  summary                     site-wide summary
  towers                      per-tower rollups
  breakdown                   measurement status counts
  classify <JSON>             classify {\"type\": ..., \"values\": {...}} without a database
  ranges [CATEGORY VALUE]     measurement ranges and kinds, or where VALUE falls in CATEGORY
  reclassify                  recompute stored measurement statuses
  sync <FILE>                 apply an offline sync batch
  seed                        generate demo data
  progress <ACTION>           progress entries
  measurements <ACTION>       measurements
  users <ACTION>              users (delete deactivates)
  help                        show this message

actions:
  list [FILTER_JSON] | get <ID> | add <JSON> | update <ID> <JSON> | delete <ID>";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Resource {
    Progress,
    Measurements,
    Users,
}

impl Display for Resource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::Progress => "progress",
            Resource::Measurements => "measurement",
            Resource::Users => "user",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordAction {
    List(Option<String>),
    Get(i64),
    Add(String),
    Update(i64, String),
    Delete(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Dashboard,
    Summary,
    Towers,
    Breakdown,
    Classify(String),
    Ranges,
    RangeCheck(String, f64),
    Reclassify,
    Sync(PathBuf),
    Seed,
    Records(Resource, RecordAction),
    Help,
}

impl Command {
    /// Whether the command talks to the database.
    pub fn needs_database(&self) -> bool {
        !matches!(
            self,
            Command::Classify(_) | Command::Ranges | Command::RangeCheck(..) | Command::Help
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cli {
    pub env_file: Option<PathBuf>,
    pub command: Command,
}

/// Parse arguments (without the program name).
pub fn parse_args(args: impl IntoIterator<Item = OsString>) -> Result<Cli, String> {
    let mut env_file: Option<PathBuf> = None;
    let mut words: Vec<String> = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let arg = arg
            .into_string()
            .map_err(|a| format!("argument is not valid UTF-8: {:?}", a))?;
        let path = if arg == "--env-file" {
            Some(
                args.next()
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?,
            )
        } else if let Some(rest) = arg.strip_prefix("--env-file=") {
            Some(OsString::from(rest))
        } else if arg.starts_with("--") && words.is_empty() {
            return Err(format!("unrecognised option: {}", arg));
        } else {
            words.push(arg);
            None
        };

        if let Some(path) = path {
            if env_file.is_some() {
                return Err("`--env-file` provided more than once".to_string());
            }
            if path.is_empty() {
                return Err("`--env-file` requires a path argument".to_string());
            }
            env_file = Some(PathBuf::from(path));
        }
    }

    let words: Vec<&str> = words.iter().map(String::as_str).collect();
    let command = match words.as_slice() {
        [] | ["dashboard"] => Command::Dashboard,
        ["summary"] => Command::Summary,
        ["towers"] => Command::Towers,
        ["breakdown"] => Command::Breakdown,
        ["classify", json] => Command::Classify(json.to_string()),
        ["ranges"] => Command::Ranges,
        ["ranges", category, value] => Command::RangeCheck(category.to_string(), parse_level(value)?),
        ["reclassify"] => Command::Reclassify,
        ["sync", file] => Command::Sync(PathBuf::from(file)),
        ["seed"] => Command::Seed,
        ["progress", rest @ ..] => Command::Records(Resource::Progress, parse_action(rest)?),
        ["measurements", rest @ ..] => Command::Records(Resource::Measurements, parse_action(rest)?),
        ["users", rest @ ..] => Command::Records(Resource::Users, parse_action(rest)?),
        ["help"] | ["-h"] => Command::Help,
        [cmd, ..] if COMMANDS.contains(cmd) => {
            return Err(format!("wrong arguments for `{}`\n\n{}", cmd, USAGE));
        }
        [other, ..] => return Err(format!("unknown command: {}\n\n{}", other, USAGE)),
    };

    Ok(Cli { env_file, command })
}

const COMMANDS: [&str; 10] = [
    "dashboard",
    "summary",
    "towers",
    "breakdown",
    "classify",
    "ranges",
    "reclassify",
    "sync",
    "seed",
    "help",
];

fn parse_level(raw: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("value must be a finite number, got {:?}", raw))
}

fn parse_action(words: &[&str]) -> Result<RecordAction, String> {
    let id = |raw: &str| {
        raw.parse::<i64>()
            .map_err(|_| format!("record id must be an integer, got {:?}", raw))
    };
    match words {
        [] | ["list"] => Ok(RecordAction::List(None)),
        ["list", filter] => Ok(RecordAction::List(Some(filter.to_string()))),
        ["get", raw] => Ok(RecordAction::Get(id(*raw)?)),
        ["add", json] => Ok(RecordAction::Add(json.to_string())),
        ["update", raw, json] => Ok(RecordAction::Update(id(*raw)?, json.to_string())),
        ["delete", raw] => Ok(RecordAction::Delete(id(*raw)?)),
        _ => Err(format!("unknown record action {:?}\n\n{}", words.join(" "), USAGE)),
    }
}

/// Decode a JSON command argument; errors name the offending path.
pub fn decode_arg<T: DeserializeOwned>(what: &str, raw: &str) -> Result<T, String> {
    let de = &mut serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize(de).map_err(|e| format!("invalid {} input: {}", what, e))
}

#[derive(Debug, Deserialize)]
struct ClassifyRequest {
    #[serde(rename = "type", alias = "tipo_medicion")]
    kind: String,
    #[serde(default, alias = "valores")]
    values: ValueBag,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifyResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: Status,
}

/// `classify` command body: decode `{"type", "values"}` and run the
/// classifier over it.
pub fn classify_json(table: &RangeTable, raw: &str) -> Result<ClassifyResponse, String> {
    let request: ClassifyRequest = decode_arg("classify", raw)?;
    let status = classify(table, &request.kind, &request.values).map_err(|e| e.to_string())?;
    Ok(ClassifyResponse {
        kind: request.kind,
        status,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindCatalogEntry {
    #[serde(rename = "type")]
    pub kind: MeasurementKind,
    pub label: &'static str,
    pub unit: &'static str,
    /// `None` for kinds that are not range-checked.
    pub category: Option<RangeCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangesResponse {
    pub ranges: RangeTable,
    pub kinds: Vec<KindCatalogEntry>,
}

/// `ranges` command body: the configured table plus one entry per kind.
pub fn ranges_catalog(table: &RangeTable) -> RangesResponse {
    let kinds = MeasurementKind::ALL
        .into_iter()
        .map(|kind| KindCatalogEntry {
            kind,
            label: kind.label(),
            unit: kind.unit(),
            category: range_category(kind),
        })
        .collect();
    RangesResponse {
        ranges: table.clone(),
        kinds,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeCheckResponse {
    pub category: String,
    pub value: f64,
    pub status: Status,
}

/// `ranges <category> <value>` command body.
pub fn range_check(table: &RangeTable, category: &str, value: f64) -> Result<RangeCheckResponse, String> {
    let status = table.evaluate_named(value, category).map_err(|e| e.to_string())?;
    Ok(RangeCheckResponse {
        category: category.trim().to_string(),
        value,
        status,
    })
}

// =====================
// .env files
// =====================

/// Where the environment file came from, for the startup log.
#[derive(Debug)]
pub struct LoadedEnvFile {
    pub path: PathBuf,
    pub explicit: bool,
}

/// Load `explicit`, or `./.env` when present. Variables already set in the
/// process environment win over the file.
pub fn load_env(explicit: Option<&Path>) -> Result<Option<LoadedEnvFile>, String> {
    let (path, is_explicit) = match explicit {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            (path.to_path_buf(), true)
        }
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let path = cwd.join(".env");
            if !path.is_file() {
                return Ok(None);
            }
            (path, false)
        }
    };

    let text = std::fs::read_to_string(&path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    for (key, value) in parse_env_file(&text).map_err(|e| format!("{}:{}", path.display(), e))? {
        if std::env::var_os(&key).is_none() {
            // SAFETY: called once at startup, before logging or any other thread exists.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(Some(LoadedEnvFile {
        path,
        explicit: is_explicit,
    }))
}

/// All assignments of a dotenv file, in order. Errors carry the 1-based line.
pub fn parse_env_file(text: &str) -> Result<Vec<(String, String)>, String> {
    let mut pairs = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if let Some(pair) = parse_env_line(line).map_err(|e| format!("{}: {}", index + 1, e))? {
            pairs.push(pair);
        }
    }
    Ok(pairs)
}

fn parse_env_line(line: &str) -> Result<Option<(String, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
    let (key, raw) = line
        .split_once('=')
        .ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.contains(char::is_whitespace) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }
    Ok(Some((key.to_string(), parse_env_value(raw.trim())?)))
}

fn parse_env_value(raw: &str) -> Result<String, String> {
    let mut chars = raw.chars();
    let quote = match chars.next() {
        None => return Ok(String::new()),
        Some(q @ ('"' | '\'')) => q,
        Some(_) => {
            // Unquoted: an inline comment ends the value.
            let value = raw.split('#').next().unwrap_or_default();
            return Ok(value.trim_end().to_string());
        }
    };

    let mut value = String::new();
    while let Some(ch) = chars.next() {
        match ch {
            c if c == quote => {
                let rest = chars.as_str().trim();
                if rest.is_empty() || rest.starts_with('#') {
                    return Ok(value);
                }
                return Err(format!("unexpected characters after closing {} quote", quote));
            }
            // Escapes only apply inside double quotes.
            '\\' if quote == '"' => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| "unterminated escape sequence in double-quoted value".to_string())?;
                value.push(match escaped {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    other => other,
                });
            }
            c => value.push(c),
        }
    }
    Err(format!("unterminated {}-quoted value", if quote == '"' { "double" } else { "single" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, String> {
        parse_args(args.iter().map(OsString::from))
    }

    #[test]
    fn defaults_to_dashboard() {
        let cli = parse(&[]).expect("no args parse");
        assert_eq!(cli.command, Command::Dashboard);
        assert_eq!(cli.env_file, None);
    }

    #[test]
    fn env_file_in_both_forms() {
        let cli = parse(&["--env-file", "prod.env", "summary"]).expect("parse");
        assert_eq!(cli.env_file, Some(PathBuf::from("prod.env")));
        assert_eq!(cli.command, Command::Summary);

        let cli = parse(&["--env-file=dev.env", "sync", "queue.json"]).expect("parse");
        assert_eq!(cli.env_file, Some(PathBuf::from("dev.env")));
        assert_eq!(cli.command, Command::Sync(PathBuf::from("queue.json")));
    }

    #[test]
    fn rejects_bad_invocations() {
        assert!(parse(&["--env-file"]).is_err());
        assert!(parse(&["--env-file="]).is_err());
        assert!(parse(&["--env-file", "a", "--env-file", "b"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
        assert!(parse(&["classify"]).is_err());
        assert!(parse(&["towers", "A"]).is_err());
        assert!(parse(&["export"]).is_err());
        assert!(parse(&["progress", "get", "seven"]).is_err());
        assert!(parse(&["users", "update", "3"]).is_err());
        assert!(parse(&["ranges", "wired"]).is_err());
        assert!(parse(&["ranges", "wired", "loud"]).is_err());
        assert!(parse(&["ranges", "wired", "NaN"]).is_err());
    }

    #[test]
    fn record_actions() {
        assert_eq!(
            parse(&["users"]).expect("parse").command,
            Command::Records(Resource::Users, RecordAction::List(None))
        );
        assert_eq!(
            parse(&["progress", "list", r#"{"tower": "C"}"#]).expect("parse").command,
            Command::Records(Resource::Progress, RecordAction::List(Some(r#"{"tower": "C"}"#.to_string())))
        );
        assert_eq!(
            parse(&["measurements", "update", "12", "{}"]).expect("parse").command,
            Command::Records(Resource::Measurements, RecordAction::Update(12, "{}".to_string()))
        );
        assert_eq!(
            parse(&["progress", "delete", "4"]).expect("parse").command,
            Command::Records(Resource::Progress, RecordAction::Delete(4))
        );
    }

    #[test]
    fn only_offline_commands_skip_the_database() {
        assert!(!Command::Classify("{}".to_string()).needs_database());
        assert!(!Command::Help.needs_database());
        assert!(!Command::Ranges.needs_database());
        assert!(!Command::RangeCheck("wifi".to_string(), -50.0).needs_database());
        assert!(Command::Dashboard.needs_database());
        assert!(Command::Seed.needs_database());
    }

    #[test]
    fn classify_json_accepts_legacy_names() {
        let table = RangeTable::default();
        let out = classify_json(&table, r#"{"tipo_medicion": "wifi", "valores": {"wifi": -90}}"#).expect("classifies");
        assert_eq!(out.status, Status::Failure);

        let out = classify_json(&table, r#"{"type": "certification", "values": {}}"#).expect("classifies");
        assert_eq!(out.status, Status::Ok);

        let err = classify_json(&table, r#"{"type": "wired-t1", "values": {"t1_level": "high"}}"#).unwrap_err();
        assert!(err.contains("t1_level"), "{}", err);

        let err = classify_json(&table, r#"{"values": {}}"#).unwrap_err();
        assert!(err.contains("type"), "{}", err);
    }

    #[test]
    fn ranges_commands() {
        assert_eq!(parse(&["ranges"]).expect("parse").command, Command::Ranges);
        assert_eq!(
            parse(&["ranges", "fiber-power", "-9.5"]).expect("parse").command,
            Command::RangeCheck("fiber-power".to_string(), -9.5)
        );
    }

    #[test]
    fn ranges_catalog_lists_table_and_kinds() {
        let out = serde_json::to_value(ranges_catalog(&RangeTable::default())).expect("serialize");
        assert_eq!(out["ranges"]["margin"], 5.0);
        assert_eq!(out["ranges"]["bounds"]["wired"]["min"], 45.0);
        assert_eq!(out["ranges"]["bounds"]["fiber-power"]["max"], -8.0);
        assert_eq!(out["ranges"]["bounds"]["wifi"]["min"], -80.0);

        let kinds = out["kinds"].as_array().expect("kinds array");
        assert_eq!(kinds.len(), 6);
        assert_eq!(kinds[0]["type"], "wired-t1");
        assert_eq!(kinds[0]["unit"], "dBμV");
        assert_eq!(kinds[0]["category"], "wired");
        assert_eq!(kinds[2]["type"], "coaxial");
        assert_eq!(kinds[2]["unit"], "dBμV");
        assert_eq!(kinds[3]["type"], "fiber");
        assert_eq!(kinds[3]["unit"], "dBm");
        assert_eq!(kinds[3]["category"], "fiber-power");
        assert_eq!(kinds[4]["unit"], "dBm");
        assert_eq!(kinds[5]["type"], "certification");
        assert_eq!(kinds[5]["unit"], "state");
        assert!(kinds[5]["category"].is_null());
    }

    #[test]
    fn range_check_uses_the_configured_table() {
        let table = RangeTable::default();
        let out = range_check(&table, "wired", 72.0).expect("known category");
        assert_eq!(out.status, Status::Warning);
        assert_eq!(range_check(&table, "wifi", -85.0).expect("known").status, Status::Failure);
        let err = range_check(&table, "sonar", 1.0).unwrap_err();
        assert!(err.contains("sonar"), "{}", err);
    }

    #[test]
    fn env_file_syntax() {
        let text = "\
# comment
DATABASE_URL=postgres://u:p@db/encinos # trailing
export SITE_ID = \"los-encinos-002\"
TOWERS='A,B,C'
NOTES=\"line\\nbreak\"
EMPTY=
";
        let pairs = parse_env_file(text).expect("parses");
        assert_eq!(
            pairs,
            vec![
                ("DATABASE_URL".to_string(), "postgres://u:p@db/encinos".to_string()),
                ("SITE_ID".to_string(), "los-encinos-002".to_string()),
                ("TOWERS".to_string(), "A,B,C".to_string()),
                ("NOTES".to_string(), "line\nbreak".to_string()),
                ("EMPTY".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn env_file_errors_carry_line_numbers() {
        let err = parse_env_file("A=1\nB\n").unwrap_err();
        assert!(err.starts_with("2:"), "{}", err);
        assert!(parse_env_file("A=\"open").is_err());
        assert!(parse_env_file("A='x' y").is_err());
        assert!(parse_env_file("BAD KEY=1").is_err());
        assert!(parse_env_file("=1").is_err());
    }
}
