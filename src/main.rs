//! Manage GitHub Actions OIDC IAM roles, one CloudFormation stack per AWS account.
//!
//! Exit codes:
//! - 0: success, also when nothing was found to deploy or a prompt was declined
//! - 1: unexpected error
//! - 2: configuration error (bad account id, broken role files, missing stack)
//! - 3: lint findings with `validate --strict`
//! - 4: CloudFormation reported a failure
//! - 130: interrupted

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::FutureExt;
use log::{debug, warn, LevelFilter};
use serde_json::json;

mod commands;
mod config;
mod constants;
mod resources;
mod settings;
mod stack;
mod template;
mod types;
mod writer;

use settings::Settings;
use stack::{AwsOptions, CloudFormationStack};
use types::ExitCode;
use writer::{ErrorReport, Writer};

/// SDK crates only speak up when something is wrong.
const QUIET_MODULES: [&str; 4] = [
    "aws_config",
    "aws_sdk_cloudformation",
    "aws_smithy_runtime",
    "hyper",
];

#[derive(Parser, Debug)]
#[command(
    name = "oidc-role-manager",
    version,
    about = "Deploy GitHub Actions OIDC IAM roles per AWS account",
    long_about = "Reads role definitions from <roles-dir>/<account-id>/<role-dir>/ and manages them \
as one CloudFormation stack per account, named <stack-name>-<account-id>."
)]
struct Cli {
    /// Log verbosity (error, warn, info, debug, trace)
    #[arg(
        long,
        global = true,
        env = "OIDC_LOG_LEVEL",
        default_value = "info",
        value_parser = parse_log_level
    )]
    log_level: LevelFilter,

    /// Print one JSON object per command and log JSON lines to stderr
    #[arg(long, global = true, env = "OIDC_JSON_OUTPUT")]
    json_output: bool,

    /// YAML settings file with defaults for the flags below
    #[arg(long, global = true, env = "OIDC_CONFIG_FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct StackArgs {
    /// 12-digit AWS account id
    #[arg(long, env = "AWS_ACCOUNT_ID")]
    account_id: String,

    /// Base stack name, the account id is appended
    #[arg(long, env = "OIDC_STACK_NAME")]
    stack_name: Option<String>,

    #[arg(long, env = "AWS_REGION")]
    aws_region: Option<String>,

    #[arg(long, env = "AWS_PROFILE")]
    aws_profile: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or update the roles of one account
    Deploy {
        #[command(flatten)]
        target: StackArgs,

        /// Deploy only this role directory
        #[arg(long, env = "OIDC_ROLE_NAME")]
        role_name: Option<String>,

        #[arg(long, env = "OIDC_ROLES_DIR")]
        roles_dir: Option<PathBuf>,

        /// Preview the changes without applying them
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(long, env = "OIDC_AUTO_APPROVE")]
        auto_approve: bool,

        /// Also write the stack outputs to this JSON file
        #[arg(long)]
        outputs_file: Option<PathBuf>,
    },

    /// Delete every role of one account
    Destroy {
        #[command(flatten)]
        target: StackArgs,

        /// Skip the confirmation prompt
        #[arg(long, env = "OIDC_AUTO_APPROVE")]
        auto_approve: bool,
    },

    /// Check every role definition without contacting AWS
    Validate {
        #[arg(long, env = "OIDC_ROLES_DIR")]
        roles_dir: Option<PathBuf>,

        /// Treat lint warnings as failures
        #[arg(long)]
        strict: bool,
    },

    /// Show the stack and its outputs for one account
    Status {
        #[command(flatten)]
        target: StackArgs,

        /// Also write the stack outputs to this JSON file
        #[arg(long)]
        outputs_file: Option<PathBuf>,
    },

    /// List the accounts that have a deployed stack
    ListStacks {
        /// Base stack name
        #[arg(long, env = "OIDC_STACK_NAME")]
        stack_name: Option<String>,

        #[arg(long, env = "AWS_REGION")]
        aws_region: Option<String>,

        #[arg(long, env = "AWS_PROFILE")]
        aws_profile: Option<String>,
    },
}

fn parse_log_level(level: &str) -> Result<LevelFilter, String> {
    level
        .parse()
        .map_err(|_| format!("unknown log level '{}'", level))
}

fn init_logging(level: LevelFilter, json: bool) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    for module in QUIET_MODULES {
        builder.filter_module(module, level.min(LevelFilter::Warn));
    }
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    if json {
        builder.format(|buf, record| {
            let line = json!({
                "timestamp": buf.timestamp().to_string(),
                "level": record.level().as_str(),
                "module": record.module_path().unwrap_or_default(),
                "message": record.args().to_string(),
            });
            writeln!(buf, "{}", line)
        });
    } else {
        builder.format_target(false).format_timestamp_secs();
    }

    builder
        .target(env_logger::Target::Stderr)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

/// Flags win over the settings file, which wins over built-in defaults.
fn base_stack_name(flag: Option<String>, settings: &Settings) -> Result<String> {
    let name = flag.unwrap_or_else(|| settings.stack_name().to_string());
    settings::validate_base_stack_name(&name).map_err(|_| {
        config::Error::ValidationError(format!(
            "Stack name '{}' must start with a letter and contain only letters, digits and hyphens",
            name
        ))
    })?;

    Ok(name)
}

fn aws_options(region: Option<String>, profile: Option<String>, settings: &Settings) -> AwsOptions {
    AwsOptions {
        region: region.or_else(|| settings.region.clone()),
        profile: profile.or_else(|| settings.profile.clone()),
    }
}

async fn connect(aws: &AwsOptions, stack_name: String, settings: &Settings) -> CloudFormationStack {
    debug!("Connecting to CloudFormation for stack {}", stack_name);
    let client = stack::client(aws).await;

    CloudFormationStack::new(client, stack_name, settings.poll_interval(), settings.timeout())
}

/// Interactive yes/no prompt. Without a terminal there is nobody to ask.
async fn prompt(question: String, json: bool, action: &'static str) -> Result<bool> {
    if json || !io::stdin().is_terminal() {
        return Err(commands::Error::ConfirmationRequired(action).into());
    }

    print!("{} [y/N] ", question);
    io::stdout().flush()?;

    // The blocking read runs off the runtime so ctrl-c is still noticed.
    let answer = tokio::task::spawn_blocking(|| {
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer).map(|_| answer)
    })
    .await
    .context("Confirmation prompt was aborted")?
    .context("Unable to read confirmation")?;

    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

async fn run<W: Write>(cli: Cli, writer: &mut Writer<W>) -> Result<ExitCode> {
    let settings = settings::load(cli.config.as_deref()).context("Unable to load settings")?;
    let json = writer.is_json();

    let exit_code = match cli.command {
        Commands::Deploy {
            target,
            role_name,
            roles_dir,
            dry_run,
            auto_approve,
            outputs_file,
        } => {
            let base = base_stack_name(target.stack_name, &settings)?;
            let aws = aws_options(target.aws_region, target.aws_profile, &settings);
            let request = commands::DeployRequest {
                stack_name: stack::stack_name(&base, &target.account_id),
                account_id: target.account_id,
                role_name,
                roles_dir: roles_dir.unwrap_or_else(|| settings.roles_dir()),
                dry_run,
                auto_approve,
                outputs_file,
            };

            let mut confirm = |question: String| prompt(question, json, "deploy").boxed();
            let report = commands::deploy(
                &request,
                || connect(&aws, request.stack_name.clone(), &settings),
                &mut confirm,
            )
            .await?;
            writer.render(&report)?
        }

        Commands::Destroy {
            target,
            auto_approve,
        } => {
            let base = base_stack_name(target.stack_name, &settings)?;
            let aws = aws_options(target.aws_region, target.aws_profile, &settings);
            let backend = connect(&aws, stack::stack_name(&base, &target.account_id), &settings).await;

            let mut confirm = |question: String| prompt(question, json, "destroy").boxed();
            let report =
                commands::destroy(&target.account_id, &backend, auto_approve, &mut confirm).await?;
            writer.render(&report)?
        }

        Commands::Validate { roles_dir, strict } => {
            let roles_dir = roles_dir.unwrap_or_else(|| settings.roles_dir());
            let report = commands::validate(&roles_dir, strict)?;
            writer.render(&report)?
        }

        Commands::Status {
            target,
            outputs_file,
        } => {
            let base = base_stack_name(target.stack_name, &settings)?;
            let aws = aws_options(target.aws_region, target.aws_profile, &settings);
            let backend = connect(&aws, stack::stack_name(&base, &target.account_id), &settings).await;

            let report =
                commands::status(&target.account_id, &backend, outputs_file.as_deref()).await?;
            writer.render(&report)?
        }

        Commands::ListStacks {
            stack_name,
            aws_region,
            aws_profile,
        } => {
            let base = base_stack_name(stack_name, &settings)?;
            let client = stack::client(&aws_options(aws_region, aws_profile, &settings)).await;

            let report = commands::list_stacks(&client, &base).await?;
            writer.render(&report)?
        }
    };

    Ok(exit_code)
}

fn print_cli_command_error<W: Write>(writer: &mut Writer<W>, e: anyhow::Error, code: ExitCode, verbose: bool) {
    let report = ErrorReport::new(&e, code, verbose);
    if writer.is_json() {
        if let Err(err) = writer.render(&report) {
            eprintln!("oidc-role-manager: Failed to write error report: {err}");
        }
    } else {
        eprint!("{}", report);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_level, cli.json_output) {
        eprintln!("oidc-role-manager: {e}");
        process::exit(ExitCode::GeneralError.into());
    }

    let verbose = cli.log_level >= LevelFilter::Debug;
    let mut writer = Writer::new(io::stdout(), cli.json_output);

    // Dropping the running command is the only cancellation; CloudFormation
    // carries on with any operation it already accepted.
    let outcome = tokio::select! {
        result = run(cli, &mut writer) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let code = match outcome {
        Some(Ok(code)) => code,
        Some(Err(e)) => {
            let code = ExitCode::for_error(&e);
            print_cli_command_error(&mut writer, e, code, verbose);
            code
        }
        None => {
            warn!("Operation interrupted by user");
            let code = ExitCode::Interrupted;
            print_cli_command_error(&mut writer, anyhow!("Operation interrupted by user"), code, verbose);
            code
        }
    };

    process::exit(code.into());
}

#[cfg(test)]
mod tests {
    use super::{is_yes, prompt};
    use crate::commands;

    #[test]
    fn only_yes_confirms() {
        assert_eq!(true, is_yes("y\n"));
        assert_eq!(true, is_yes(" YES \n"));
        assert_eq!(false, is_yes("\n"));
        assert_eq!(false, is_yes("yep\n"));
    }

    #[tokio::test]
    async fn json_mode_never_prompts() {
        let error = prompt(String::from("Deploy?"), true, "deploy")
            .await
            .unwrap_err();

        assert_eq!(
            Some(&commands::Error::ConfirmationRequired("deploy")),
            error.downcast_ref::<commands::Error>()
        );
    }
}
