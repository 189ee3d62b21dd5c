//! Purpose: Run the command selected on the command line.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on bootstrap and parsing; built-ins and plugin commands run here.
//! Invariants: Plugin exec commands pass their exit status through unchanged.
//! Invariants: Request commands print JSON pretty on a TTY, plain pretty JSON otherwise.

use std::io::Write;

use aka::api::{ApiBody, ApiClient, Method};
use aka::auth::CredentialResolver;
use aka::core::config::{API_HOST_VAR, AUTH_HOST_VAR};
use aka::plugins::{self, GitMaintainer, UpdateStep, plugin_process};
use aka::render::{Style, render_json};
use aka::version::VersionReport;

use super::*;

pub(super) async fn dispatch_command(
    ctx: &Context,
    cli: &mut clap::Command,
    matches: &ArgMatches,
) -> Result<RunOutcome, Error> {
    let globals = Cli::from_arg_matches(matches).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(clap_error_summary(&err))
            .with_hint("Try `aka --help`.")
    })?;

    match &globals.command {
        Some(Builtin::Completion { shell }) => {
            clap_complete::aot::generate(*shell, cli, "aka", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Some(Builtin::Version) => {
            emit_version_output(&VersionReport::collect(ctx));
            Ok(RunOutcome::ok())
        }
        Some(Builtin::Update) => {
            run_update(ctx);
            Ok(RunOutcome::ok())
        }
        None => {
            let Some((name, sub)) = matches.subcommand() else {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("no command given")
                    .with_hint("Try `aka --help`."));
            };
            let Some((owner, spec)) = ctx.registry.find_command(name) else {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("unknown command `{name}`"))
                    .with_hint("Try `aka --help`."));
            };
            match &spec.action {
                CommandAction::Exec(argv) => run_exec(ctx, &globals, owner, argv, sub),
                CommandAction::Request { method, path } => {
                    let target = expand_app(path, globals.app.as_deref(), spec)?;
                    let body = match sub.get_one::<String>(REQUEST_DATA) {
                        Some(data) => Some(parse_inline_json(data)?.to_string().into_bytes()),
                        None => None,
                    };
                    run_request(ctx, &globals, *method, &target, body).await
                }
            }
        }
    }
}

fn resolver(ctx: &Context, globals: &Cli) -> CredentialResolver {
    CredentialResolver::new(ctx.credential.clone(), globals.authtoken.clone())
}

fn run_update(ctx: &Context) {
    let interactive = io::stderr().is_terminal();
    let report = plugins::update(ctx, &PluginLoader::new(), &GitMaintainer, |step| {
        if !interactive {
            return;
        }
        match step {
            UpdateStep::Plugin(name) => eprintln!("Updating plugin {name}..."),
            UpdateStep::Client => eprintln!("Updating aka..."),
        }
    });
    for err in &report.errors {
        emit_notice(&Notice::from_plugin_error("update", err));
    }

    if io::stdout().is_terminal() {
        println!(
            "Updated {} plugin(s); skipped {}; {} error(s).",
            report.updated.len(),
            report.skipped.len(),
            report.errors.len()
        );
        return;
    }
    let value = json!({
        "updated": report.updated,
        "skipped": report.skipped,
        "errors": report.errors.iter().map(|err| err.summary()).collect::<Vec<_>>(),
    });
    emit_json(&value);
}

fn emit_version_output(report: &VersionReport) {
    if io::stdout().is_terminal() {
        println!("{}", report.render_text());
        return;
    }
    emit_json(&report.to_json());
}

fn emit_json(value: &Value) {
    let style = Style::for_terminal(io::stdout().is_terminal());
    println!("{}", render_json(value, style));
}

fn run_exec(
    ctx: &Context,
    globals: &Cli,
    owner: &RegisteredPlugin,
    argv: &[String],
    sub: &ArgMatches,
) -> Result<RunOutcome, Error> {
    let mut command = plugin_process(owner.dir(), argv)?;
    if let Some(args) = sub.get_many::<String>(PLUGIN_ARGS) {
        command.args(args);
    }
    command
        .env(API_HOST_VAR, &ctx.config.api_host)
        .env(AUTH_HOST_VAR, &ctx.config.auth_host)
        .env("AKA_PLUGIN_NAME", &owner.name);
    if let Some(app) = &globals.app {
        command.env("AKA_APP", app);
    }
    if let Some(authorization) = resolver(ctx, globals).resolve() {
        command.env("AKA_AUTHORIZATION", authorization);
    }

    let program = command.get_program().to_string_lossy().to_string();
    debug!(plugin = %owner.name, program = %program, "running plugin command");
    let status = command.status().map_err(|err| {
        Error::new(ErrorKind::Plugin)
            .with_message(format!("failed to start `{program}`"))
            .with_plugin(&owner.name)
            .with_source(err)
    })?;
    Ok(RunOutcome::with_code(status.code().unwrap_or(1)))
}

async fn run_request(
    ctx: &Context,
    globals: &Cli,
    method: Method,
    target: &str,
    body: Option<Vec<u8>>,
) -> Result<RunOutcome, Error> {
    let client = ApiClient::new(&ctx.config, resolver(ctx, globals));
    match client.call(method, body, target).await? {
        ApiBody::Json(Value::Null) => {}
        ApiBody::Json(value) => emit_json(&value),
        ApiBody::Bytes(bytes) => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(&bytes)
                .and_then(|()| stdout.flush())
                .map_err(|err| Error::from_io(err, "failed to write response body"))?;
        }
    }
    Ok(RunOutcome::ok())
}

/// Substitutes `{app}` in a request path with the `--app` value.
fn expand_app(path: &str, app: Option<&str>, spec: &CommandSpec) -> Result<String, Error> {
    let needs_app = spec.requires_app || path.contains("{app}");
    match app {
        Some(app) if !is_path_segment(app) => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid app name `{app}`"))
            .with_hint("App names look like `name-space`, for example `api-default`.")),
        Some(app) => Ok(path.replace("{app}", app)),
        None if needs_app => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("`{}` needs an app", spec.name))
            .with_hint(format!("Pass one with `aka {} --app <APP>`.", spec.name))),
        None => Ok(path.to_string()),
    }
}

fn is_path_segment(value: &str) -> bool {
    !value.is_empty()
        && value != ".."
        && !value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '%'))
}

#[cfg(test)]
mod tests {
    use super::expand_app;
    use aka::api::Method;
    use aka::core::error::ErrorKind;
    use aka::plugins::{CommandAction, CommandSpec};

    fn spec(path: &str, requires_app: bool) -> CommandSpec {
        CommandSpec {
            name: "apps:info".to_string(),
            about: None,
            requires_app,
            action: CommandAction::Request {
                method: Method::Get,
                path: path.to_string(),
            },
        }
    }

    #[test]
    fn app_placeholder_is_filled() {
        let spec = spec("/apps/{app}/config-vars", true);
        let path = expand_app("/apps/{app}/config-vars", Some("api-default"), &spec).expect("path");
        assert_eq!(path, "/apps/api-default/config-vars");

        let err = expand_app("/apps/{app}", Some("../admin"), &spec).expect_err("traversal");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn missing_app_is_a_usage_error() {
        let err = expand_app("/apps/{app}", None, &spec("/apps/{app}", false)).expect_err("app");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(expand_app("/apps", None, &spec("/apps", false)).is_ok());
    }
}
