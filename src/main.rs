//! Purpose: `aka` CLI entry point.
//! Role: Binary crate root; builds config, credentials, and the plugin registry, then dispatches.
//! Invariants: Fatal errors print as text on a TTY and as a JSON envelope otherwise.
//! Invariants: Process exit code is derived from `core::error::to_exit_code`.
//! Invariants: Plugin failures surface as notices and never abort startup.
#![allow(clippy::result_large_err)]
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{
    Arg, ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand,
    error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use aka::auth::{Credential, Netrc, default_netrc_path};
use aka::core::config::{Config, DEBUG_VAR};
use aka::core::context::Context;
use aka::core::error::{Error, ErrorKind, to_exit_code};
use aka::notice::{Notice, notice_json, notice_text};
use aka::plugins::{CommandAction, CommandSpec, PluginLoader, RegisteredPlugin, load_all};

/// Positional values forwarded to exec-backed plugin commands.
const PLUGIN_ARGS: &str = "args";
/// `--data` body for request-backed plugin commands.
const REQUEST_DATA: &str = "data";

const TIPS: &[&str] = &[
    "Run `aka update` to pull the latest plugins and client.",
    "Set AKKERIS_DEBUG=1 to log every request the client makes.",
    "Generate shell completions with `aka completion zsh`.",
    "API_TOKEN overrides the token stored in your .netrc for a single shell.",
    "Third-party plugins live in ~/.akkeris/plugins; each is a directory with an index.json.",
];

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

#[derive(Parser)]
#[command(
    name = "aka",
    about = "Akkeris command-line client",
    long_about = "Akkeris command-line client.\n\nCommands beyond update, version, and completion come from plugins found in the install directory and in ~/.akkeris/plugins.",
    arg_required_else_help = true
)]
struct Cli {
    /// App the command operates on
    #[arg(long, short = 'a', global = true, value_name = "APP")]
    app: Option<String>,

    /// Authorization token for this invocation (API_AUTH and API_TOKEN take precedence)
    #[arg(long, global = true, value_name = "TOKEN")]
    authtoken: Option<String>,

    #[command(subcommand)]
    command: Option<Builtin>,
}

#[derive(Subcommand)]
enum Builtin {
    /// Update third-party plugins and the client itself
    Update,
    /// Show the client version, platform, and installed plugins
    Version,
    /// Print a shell completion script covering built-in and plugin commands
    Completion {
        #[arg(value_enum, default_value = "bash")]
        shell: Shell,
    },
}

fn main() {
    let exit_code = match run(std::env::args_os().collect()) {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run(args: Vec<OsString>) -> Result<RunOutcome, Error> {
    let debug = std::env::var_os(DEBUG_VAR).is_some_and(|value| !value.is_empty());
    init_tracing(debug);

    let ctx = bootstrap()?;
    let mut cli = build_cli(&ctx);
    let matches = match cli.try_get_matches_from_mut(args) {
        Ok(matches) => matches,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint(clap_error_hint(&err)));
            }
        },
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to start async runtime")
                .with_source(err)
        })?;
    runtime
        .block_on(command_dispatch::dispatch_command(&ctx, &mut cli, &matches))
        .map_err(add_transport_hint)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

/// Config, credentials, and the plugin registry, in that order.
fn bootstrap() -> Result<Context, Error> {
    let config = Config::from_env(|name| std::env::var(name).ok(), install_dir()?)?;
    if let Some(err) = config.prepare_dirs()? {
        // The loader reports the unreadable directory as a scan notice.
        debug!(error = %err, "built-in plugin directory unavailable");
    }

    let credential = load_credential(&config);
    let mut ctx = Context::new(config, credential);
    for err in load_all(&mut ctx, &PluginLoader::new()) {
        emit_notice(&Notice::from_plugin_error("startup", &err));
    }
    Ok(ctx)
}

fn install_dir() -> Result<PathBuf, Error> {
    let exe = std::env::current_exe()
        .map_err(|err| Error::from_io(err, "cannot locate the running executable"))?;
    exe.parent().map(PathBuf::from).ok_or_else(|| {
        Error::new(ErrorKind::Internal)
            .with_message("executable has no parent directory")
            .with_path(&exe)
    })
}

fn load_credential(config: &Config) -> Option<Credential> {
    let path = default_netrc_path(|name| std::env::var(name).ok(), &config.home_dir);
    match Netrc::load(&path) {
        Ok(netrc) => netrc.and_then(|netrc| netrc.lookup(&config.api_hostname())),
        Err(err) => {
            let mut notice = Notice::new(
                "credentials",
                "startup",
                format!("ignoring credential file: {}", error_message(&err)),
            );
            notice
                .details
                .insert("path".to_string(), json!(path.display().to_string()));
            emit_notice(&notice);
            None
        }
    }
}

/// The derive surface plus one subcommand per effective plugin command.
fn build_cli(ctx: &Context) -> clap::Command {
    let mut cli = Cli::command().after_help(random_tip());
    for (owner, spec) in ctx.registry.commands() {
        cli = cli.subcommand(plugin_subcommand(owner, spec));
    }
    cli
}

fn plugin_subcommand(owner: &RegisteredPlugin, spec: &CommandSpec) -> clap::Command {
    let about = spec
        .about
        .clone()
        .unwrap_or_else(|| format!("{} ({})", owner.group(), owner.name));
    let command = clap::Command::new(spec.name.clone()).about(about);
    match &spec.action {
        CommandAction::Exec(_) => command.arg(
            Arg::new(PLUGIN_ARGS)
                .value_name("ARGS")
                .help("Arguments passed through to the plugin program")
                .num_args(0..)
                .trailing_var_arg(true)
                .allow_hyphen_values(true),
        ),
        CommandAction::Request { .. } => command.arg(
            Arg::new(REQUEST_DATA)
                .long("data")
                .value_name("JSON")
                .help("JSON request body"),
        ),
    }
}

fn random_tip() -> String {
    let idx = getrandom::u32()
        .map(|n| n as usize % TIPS.len())
        .unwrap_or(0);
    format!("Tip: {}", TIPS[idx])
}

fn add_transport_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Transport || err.hint().is_some() {
        return err;
    }
    err.with_hint("Could not reach the API. Check AKKERIS_API_HOST and your network connection.")
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Permission => {
            err.with_hint("Permission denied. Check ownership of ~/.akkeris and the plugin directories.")
        }
        ErrorKind::Io => err.with_hint("I/O error. Check the path and filesystem."),
        _ => err,
    }
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with AKKERIS_DEBUG=1 and share the output if it persists.",
    )
}

fn emit_error(err: &Error) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, true));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn emit_notice(notice: &Notice) {
    if io::stderr().is_terminal() {
        eprintln!(
            "{} {}",
            colorize_label("notice:", true, AnsiColor::Yellow),
            notice_text(notice)
        );
        return;
    }

    let json = serde_json::to_string(&notice_json(notice)).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "usage error",
        ErrorKind::Config => "configuration error",
        ErrorKind::NotFound => "not found",
        ErrorKind::Permission => "permission denied",
        ErrorKind::Plugin => "plugin error",
        ErrorKind::Transport => "request failed",
        ErrorKind::Http => "request was rejected",
        ErrorKind::Parse => "unreadable response",
        ErrorKind::Io => "i/o error",
    }
    .to_string()
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
    }
    if let Some(plugin) = err.plugin() {
        inner.insert("plugin".to_string(), json!(plugin));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }
    json!({ "error": Value::Object(inner) })
}

fn error_text(err: &Error, use_color: bool) -> String {
    let label = |text: &str| colorize_label(text, use_color, AnsiColor::Yellow);
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    )];
    if let Some(status) = err.status() {
        lines.push(format!("{} {status}", label("status:")));
    }
    if let Some(hint) = err.hint() {
        lines.push(format!("{} {hint}", label("hint:")));
    }
    if let Some(path) = err.path() {
        lines.push(format!("{} {}", label("path:"), path.display()));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("{} {cause}", label("caused by:")));
    }
    lines.join("\n")
}

#[derive(Clone, Copy)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn clap_error_summary(err: &clap::Error) -> String {
    err.to_string()
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.strip_prefix("error:").unwrap_or(line).trim().to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let subcommand = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .and_then(|usage| {
            let mut tokens = usage.split_whitespace().skip_while(|t| *t != "aka").skip(1);
            tokens
                .next()
                .filter(|t| !t.starts_with('-') && !t.starts_with('<') && !t.starts_with('['))
                .map(str::to_string)
        });
    match subcommand {
        Some(name) => format!("Try `aka {name} --help`."),
        None => "Try `aka --help`.".to_string(),
    }
}

fn parse_inline_json(data: &str) -> Result<Value, Error> {
    serde_json::from_str(data).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid json")
            .with_hint("Provide a single JSON value (e.g. '{\"size\":\"small\"}').")
            .with_source(err)
    })
}
