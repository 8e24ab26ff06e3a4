//! skillctl - browse and install skills from git repositories.

mod render;

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use clap::{Parser, Subcommand, ValueEnum};
use eyre::WrapErr;
use skill_core::{
    Config, ConflictDecision, ConflictPolicy, ErrorKind, Identity, InstallRequest,
    InstallSelection, ScanRequest,
};
use skill_engine::SkillService;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

/// Exit code when an install is blocked by unresolved conflicts.
const EXIT_CONFLICTS: i32 = 2;

#[derive(Parser)]
#[command(name = "skillctl", about = "Discover and install skills from git repositories", version)]
struct Cli {
    /// Config file path (overrides .skills/config)
    #[arg(long, global = true, env = "SKILLS_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the git executable
    #[arg(long, global = true)]
    git_bin: Option<PathBuf>,

    /// Directory for temporary clones
    #[arg(long, global = true)]
    temp_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the skills in a repository
    Scan {
        /// owner/repo[/subpath], git@host:owner/repo, or https://host/owner/repo
        source: String,

        /// Directory inside the repository to scan
        #[arg(long)]
        subpath: Option<String>,

        #[command(flatten)]
        auth: AuthArgs,

        /// Ignore cached results
        #[arg(long)]
        refresh: bool,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Install skills from a repository
    Install {
        source: String,

        /// Repository directory of a skill to install (repeatable)
        #[arg(long = "skill", required = true)]
        skills: Vec<String>,

        #[arg(long)]
        subpath: Option<String>,

        #[arg(long, value_enum, default_value_t = ScopeArg::User)]
        scope: ScopeArg,

        /// Project directory for project-scope installs (default: current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Install root for user scope (overrides config)
        #[arg(long)]
        user_skill_dir: Option<PathBuf>,

        /// Keep every existing skill
        #[arg(long, conflicts_with = "overwrite_all")]
        skip_all: bool,

        /// Replace every existing skill
        #[arg(long)]
        overwrite_all: bool,

        /// Per-skill decision, e.g. `--decide pdf=overwrite` (repeatable)
        #[arg(long = "decide", value_parser = parse_decision)]
        decisions: Vec<(String, ConflictDecision)>,

        #[command(flatten)]
        auth: AuthArgs,

        #[arg(long)]
        json: bool,
    },

    /// Show all catalog sources with install state
    Catalog {
        /// Project directory used for install badges (default: current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,

        #[arg(long)]
        refresh: bool,

        #[arg(long)]
        json: bool,
    },

    /// List configured catalog sources
    Sources {
        #[arg(long)]
        json: bool,
    },

    /// List skills installed locally
    Installed {
        #[arg(long)]
        cwd: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct AuthArgs {
    /// Git identity id from the identity store
    #[arg(long)]
    identity: Option<String>,

    /// SSH private key to use (takes precedence over --identity)
    #[arg(long)]
    ssh_key: Option<PathBuf>,
}

impl AuthArgs {
    fn inline_identity(&self) -> Option<Identity> {
        self.ssh_key.clone().map(Identity::with_key)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    User,
    Project,
}

fn parse_decision(s: &str) -> Result<(String, ConflictDecision), String> {
    let (name, decision) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=skip|overwrite, got: {s}"))?;
    let decision = ConflictDecision::parse(decision)
        .ok_or_else(|| format!("invalid decision '{decision}': use skip or overwrite"))?;
    Ok((name.trim().to_string(), decision))
}

fn current_dir() -> eyre::Result<PathBuf> {
    std::env::current_dir().wrap_err("failed to read current directory")
}

fn load_config(cli: &Cli) -> eyre::Result<Config> {
    let cwd = current_dir()?;
    let mut config = Config::discover(cli.config.as_deref(), &cwd)
        .wrap_err("failed to load config")?;
    if let Some(git_bin) = &cli.git_bin {
        config.git_bin.clone_from(git_bin);
    }
    if let Some(temp_dir) = &cli.temp_dir {
        config.temp_dir.clone_from(temp_dir);
    }
    debug!(
        git_bin = %config.git_bin.display(),
        temp_dir = %config.temp_dir.display(),
        user_skill_dir = %config.user_skill_dir.display(),
        "config loaded"
    );
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `--json` output stays clean.
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let service = SkillService::new(config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("failed to create tokio runtime")?;

    let code = runtime.block_on(run(cli.command, &service))?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn run(command: Command, service: &SkillService) -> eyre::Result<i32> {
    match command {
        Command::Scan {
            source,
            subpath,
            auth,
            refresh,
            json,
        } => {
            let request = ScanRequest {
                source,
                subpath,
                identity: auth.inline_identity(),
                git_identity_id: auth.identity,
                ..ScanRequest::default()
            };
            let response = service.scan(&request, refresh).await;
            if json {
                print_json(&response)?;
            } else {
                render::print_scan(&response);
            }
            Ok(if response.ok { 0 } else { 1 })
        }

        Command::Install {
            source,
            skills,
            subpath,
            scope,
            cwd,
            user_skill_dir,
            skip_all,
            overwrite_all,
            decisions,
            auth,
            json,
        } => {
            let working_directory = match (scope, cwd) {
                (_, Some(cwd)) => Some(cwd),
                (ScopeArg::Project, None) => Some(current_dir()?),
                (ScopeArg::User, None) => None,
            };
            let conflict_policy = if skip_all {
                Some(ConflictPolicy::SkipAll)
            } else if overwrite_all {
                Some(ConflictPolicy::OverwriteAll)
            } else {
                None
            };
            let request = InstallRequest {
                source,
                subpath,
                identity: auth.inline_identity(),
                git_identity_id: auth.identity,
                scope: match scope {
                    ScopeArg::User => "user",
                    ScopeArg::Project => "project",
                }
                .to_string(),
                working_directory,
                user_skill_dir,
                selections: skills.into_iter().map(InstallSelection::new).collect(),
                conflict_policy,
                conflict_decisions: decisions.into_iter().collect::<HashMap<_, _>>(),
                ..InstallRequest::default()
            };

            let response = service.install(&request).await;
            if json {
                print_json(&response)?;
            } else {
                render::print_install(&response);
            }
            Ok(match &response.error {
                None => 0,
                Some(error) if error.kind == ErrorKind::Conflicts => EXIT_CONFLICTS,
                Some(_) => 1,
            })
        }

        Command::Catalog { cwd, refresh, json } => {
            let cwd = match cwd {
                Some(cwd) => cwd,
                None => current_dir()?,
            };
            let catalog = service.catalog(Some(&cwd), refresh).await;
            if json {
                print_json(&catalog)?;
            } else {
                render::print_catalog(&catalog);
            }
            Ok(0)
        }

        Command::Sources { json } => {
            let sources = service.sources();
            if json {
                print_json(&sources)?;
            } else {
                render::print_sources(&sources);
            }
            Ok(0)
        }

        Command::Installed { cwd, json } => {
            let cwd = match cwd {
                Some(cwd) => cwd,
                None => current_dir()?,
            };
            let skills = service.installed(Some(&cwd));
            if json {
                print_json(&skills)?;
            } else {
                render::print_installed(&skills);
            }
            Ok(0)
        }
    }
}
