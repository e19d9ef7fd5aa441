//! The tundra command line.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tundra::goal::{GoalOptions, Intent};
use tundra::ops::check_local::check_local;
use tundra::ops::check_update::{check_update, UPDATES_AVAILABLE_EXIT_CODE};
use tundra::ops::clean::{clean, makecache, CleanType};
use tundra::ops::list::{info, list, ListScope};
use tundra::ops::provides::provides;
use tundra::ops::repolist_cmd::{repolist, RepolistFilter};
use tundra::ops::repoquery::{repoquery, QueryKind, ReverseQuery};
use tundra::ops::reposync::{reposync, ReposyncOptions};
use tundra::ops::search::search;
use tundra::ops::updateinfo_cmd::{updateinfo, UpdateinfoMode};
use tundra::ops::{alter, history_cmd, mark};
use tundra::output::{emit_error, OutputMode};
use tundra::repolist::RepoStateChange;
use tundra::rpm::SystemRpm;
use tundra::{Session, SessionOptions};

#[derive(Debug, Parser)]
#[command(
    name = "tundra",
    version,
    about = "A package manager for RPM systems",
    max_term_width = 100
)]
struct Cli {
    /// Main configuration file
    #[arg(long = "config", short = 'c', default_value = "/etc/tdnf/tdnf.conf")]
    config_file: PathBuf,

    /// Answer yes to all questions
    #[arg(long = "assumeyes", short = 'y')]
    assume_yes: bool,

    /// Answer no to all questions
    #[arg(long = "assumeno")]
    assume_no: bool,

    /// Output one JSON document instead of text
    #[arg(long, short = 'j')]
    json: bool,

    /// Work entirely from the cache, never touch the network
    #[arg(long = "cacheonly", short = 'C')]
    cache_only: bool,

    /// Treat metadata as expired regardless of age
    #[arg(long)]
    refresh: bool,

    /// Override $releasever
    #[arg(long)]
    releasever: Option<String>,

    /// Enable repos matching a glob (repeatable, order matters)
    #[arg(long = "enablerepo", value_name = "GLOB")]
    enable_repo: Vec<String>,

    /// Disable repos matching a glob (repeatable, order matters)
    #[arg(long = "disablerepo", value_name = "GLOB")]
    disable_repo: Vec<String>,

    /// Use only the named repo(s); disables everything else first
    #[arg(long = "repo", visible_alias = "repoid", value_name = "ID")]
    repo: Vec<String>,

    /// Load an additional repo file
    #[arg(long = "repofrompath", value_name = "FILE")]
    repo_from_path: Vec<PathBuf>,

    /// Exclude packages matching a glob from every operation
    #[arg(long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,

    /// Skip all digest and signature verification
    #[arg(long)]
    nogpgcheck: bool,

    /// Skip signature verification only
    #[arg(long)]
    skipsignature: bool,

    /// Skip digest verification only
    #[arg(long)]
    skipdigest: bool,

    /// Only resolve the best candidate versions
    #[arg(long)]
    best: bool,

    /// Allow erasing installed packages to satisfy the operation
    #[arg(long)]
    allowerasing: bool,

    /// Ignore conflict problems while resolving
    #[arg(long)]
    skipconflicts: bool,

    /// Ignore obsolete problems while resolving
    #[arg(long)]
    skipobsoletes: bool,

    /// Ignore broken-dependency problems while resolving
    #[arg(long)]
    skipbroken: bool,

    /// Require rpm file arguments to be source packages
    #[arg(long = "source")]
    source_only: bool,

    /// Download packages, do not install
    #[arg(long = "downloadonly")]
    download_only: bool,

    /// Download into this directory instead of the cache
    #[arg(long = "downloaddir", value_name = "DIR", requires = "download_only")]
    download_dir: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Install packages (names, globs or rpm files)
    Install {
        /// Packages to install
        packages: Vec<String>,
    },
    /// Remove installed packages
    #[command(visible_alias = "erase")]
    Remove {
        /// Packages to remove
        packages: Vec<String>,
    },
    /// Upgrade named packages, or everything
    #[command(visible_alias = "update")]
    Upgrade {
        /// Packages to upgrade; empty upgrades everything
        packages: Vec<String>,
    },
    /// Downgrade packages to the highest version below the installed one
    Downgrade {
        /// Packages to downgrade
        packages: Vec<String>,
    },
    /// Synchronize installed packages to the repos, both directions
    #[command(name = "distro-sync")]
    DistroSync,
    /// Reinstall packages at their installed version
    Reinstall {
        /// Packages to reinstall
        packages: Vec<String>,
    },
    /// Remove auto-installed packages nothing depends on anymore
    #[command(visible_alias = "autoerase")]
    Autoremove {
        /// Packages to remove together with their unused dependencies
        packages: Vec<String>,
    },
    /// Dependency-check every available package
    Check,
    /// Dependency-check rpm files in a directory
    #[command(name = "check-local")]
    CheckLocal {
        /// Directory of rpm files
        directory: PathBuf,
    },
    /// List pending upgrades
    #[command(name = "check-update")]
    CheckUpdate {
        /// Limit to these package specs
        packages: Vec<String>,
    },
    /// Remove cached data
    Clean {
        /// all, metadata, packages, dbcache, expire-cache or keys
        #[arg(default_value = "all")]
        what: String,
    },
    /// Download fresh metadata for every enabled repo
    Makecache,
    /// List packages
    List {
        /// Optional scope (all/installed/available/updates/downgrades/extras/obsoletes) and specs
        args: Vec<String>,
    },
    /// Show detailed package information
    Info {
        /// Optional scope and specs
        args: Vec<String>,
    },
    /// Search package names and summaries
    Search {
        /// Search terms
        terms: Vec<String>,
    },
    /// Find packages providing a capability or file
    Provides {
        /// Capability name, versioned capability or file path
        spec: String,
    },
    /// List configured repos
    Repolist {
        /// all, enabled or disabled
        #[arg(default_value = "enabled")]
        filter: String,
    },
    /// Query repo metadata
    Repoquery {
        /// Package spec (glob allowed)
        spec: Option<String>,
        /// List owned files
        #[arg(long)]
        list: bool,
        /// List required capabilities
        #[arg(long)]
        requires: bool,
        /// List provided capabilities
        #[arg(long)]
        provides: bool,
        /// List obsoleted capabilities
        #[arg(long)]
        obsoletes: bool,
        /// List conflicting capabilities
        #[arg(long)]
        conflicts: bool,
        /// Packages requiring this capability
        #[arg(long = "whatrequires", value_name = "CAP")]
        what_requires: Option<String>,
        /// Packages providing this capability
        #[arg(long = "whatprovides", value_name = "CAP")]
        what_provides: Option<String>,
    },
    /// Mirror enabled repos to a local directory
    Reposync {
        /// Also download the repodata tree
        #[arg(long = "download-metadata")]
        download_metadata: bool,
        /// Delete local files no longer in the repo
        #[arg(long)]
        delete: bool,
        /// Keep only these architectures (repeatable)
        #[arg(long = "arch", value_name = "ARCH")]
        archs: Vec<String>,
        /// Only source packages
        #[arg(long)]
        source: bool,
        /// Only the newest version per package
        #[arg(long = "newest-only")]
        newest_only: bool,
        /// Do not create per-repo subdirectories
        #[arg(long)]
        norepopath: bool,
        /// Print URLs instead of downloading
        #[arg(long)]
        urls: bool,
        /// Verify package signatures while syncing
        #[arg(long)]
        gpgcheck: bool,
        /// Target directory
        #[arg(long = "download-path", value_name = "DIR")]
        download_path: Option<PathBuf>,
    },
    /// Show advisories applicable to this system
    Updateinfo {
        /// Optional mode (summary/list/info) and package specs
        args: Vec<String>,
    },
    /// Inspect or replay the transaction history
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
    /// Change the auto-installed flag of packages
    Mark {
        /// install (user-installed) or remove (auto-installed)
        action: String,
        /// Package names
        packages: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
enum HistoryCommand {
    /// List recorded transactions
    List,
    /// Create the history baseline from the rpm database
    Init,
    /// Roll the system back to a transaction
    Rollback {
        /// Target transaction id
        id: i64,
    },
    /// Revert a transaction (range)
    Undo {
        /// First transaction to revert
        from: i64,
        /// Last transaction to revert; defaults to `from`
        to: Option<i64>,
    },
    /// Re-apply a reverted transaction (range)
    Redo {
        /// First transaction to re-apply
        from: i64,
        /// Last transaction to re-apply; defaults to `from`
        to: Option<i64>,
    },
}

fn main() -> ExitCode {
    // The derive API flattens repeated flags per kind; the raw matches
    // are kept so repo overrides can be replayed in argv order.
    let matches = Cli::command().get_matches();
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(err) => err.exit(),
    };
    init_tracing(cli.verbose);

    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    match run(cli, &matches) {
        Ok(code) => code,
        Err(err) => {
            emit_error(mode, &err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tundra={default}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Rebuild the enable/disable/only overrides in the order they appeared
/// on the command line; the per-flag `Cli` vectors have lost the
/// cross-flag interleaving, so positions come from the raw matches. All
/// `--repo` selectors collapse into one disable-all-then-enable-each
/// action at the first `--repo` position.
fn repo_state_changes(cli: &Cli, matches: &ArgMatches) -> Vec<RepoStateChange> {
    let mut indexed: Vec<(usize, RepoStateChange)> = Vec::new();
    if let Some(indices) = matches.indices_of("enable_repo") {
        for (pattern, index) in cli.enable_repo.iter().zip(indices) {
            indexed.push((index, RepoStateChange::Enable(pattern.clone())));
        }
    }
    if let Some(indices) = matches.indices_of("disable_repo") {
        for (pattern, index) in cli.disable_repo.iter().zip(indices) {
            indexed.push((index, RepoStateChange::Disable(pattern.clone())));
        }
    }
    if let Some(first) = matches.indices_of("repo").and_then(|mut i| i.next()) {
        indexed.push((first, RepoStateChange::Only(cli.repo.clone())));
    }
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, change)| change).collect()
}

fn session_options(cli: &Cli, matches: &ArgMatches) -> SessionOptions {
    SessionOptions {
        config_file: cli.config_file.clone(),
        releasever: cli.releasever.clone(),
        repo_state_changes: repo_state_changes(cli, matches),
        extra_repo_files: cli.repo_from_path.clone(),
        cache_only: cli.cache_only,
        refresh: cli.refresh,
        assume_yes: cli.assume_yes,
        assume_no: cli.assume_no,
        json: cli.json,
        nogpgcheck: cli.nogpgcheck,
        skipsignature: cli.skipsignature,
        skipdigest: cli.skipdigest,
        download_only: cli.download_only,
        download_dir: cli.download_dir.clone(),
        goal: GoalOptions {
            best: cli.best,
            allow_erasing: cli.allowerasing,
            skip_conflicts: cli.skipconflicts,
            skip_obsoletes: cli.skipobsoletes,
            skip_broken: cli.skipbroken,
            excludes: cli.exclude.clone(),
            source_only: cli.source_only,
        },
        cmdline: std::env::args().skip(1).collect::<Vec<_>>().join(" "),
    }
}

fn run(cli: Cli, matches: &ArgMatches) -> tundra::Result<ExitCode> {
    let options = session_options(&cli, matches);
    let mut session = Session::open(options, Box::new(SystemRpm::new(None)))?;

    match cli.command {
        Command::Install { packages } => {
            alter::alter(&mut session, Intent::Install { specs: packages })?
        }
        Command::Remove { packages } => {
            alter::alter(&mut session, Intent::Erase { specs: packages })?
        }
        Command::Upgrade { packages } => {
            alter::alter(&mut session, Intent::Upgrade { specs: packages })?
        }
        Command::Downgrade { packages } => {
            alter::alter(&mut session, Intent::Downgrade { specs: packages })?
        }
        Command::DistroSync => alter::alter(&mut session, Intent::DistroSync)?,
        Command::Reinstall { packages } => {
            alter::alter(&mut session, Intent::Reinstall { specs: packages })?
        }
        Command::Autoremove { packages } => {
            alter::alter(&mut session, Intent::AutoErase { specs: packages })?
        }
        Command::Check => alter::check(&mut session)?,
        Command::CheckLocal { directory } => check_local(&mut session, &directory)?,
        Command::CheckUpdate { packages } => {
            let pending = check_update(&mut session, &packages)?;
            if pending && session.config.dnf_check_update_compat {
                return Ok(ExitCode::from(UPDATES_AVAILABLE_EXIT_CODE as u8));
            }
        }
        Command::Clean { what } => {
            let clean_type = CleanType::parse(&what)
                .ok_or_else(|| tundra::Error::InvalidInput(format!("unknown clean type {what}")))?;
            clean(&session, clean_type)?;
        }
        Command::Makecache => makecache(&mut session)?,
        Command::List { args } => {
            let (scope, specs) = scope_and_specs(&args);
            list(&mut session, scope, &specs)?;
        }
        Command::Info { args } => {
            let (scope, specs) = scope_and_specs(&args);
            info(&mut session, scope, &specs)?;
        }
        Command::Search { terms } => search(&mut session, &terms)?,
        Command::Provides { spec } => provides(&mut session, &spec)?,
        Command::Repolist { filter } => {
            let filter = RepolistFilter::parse(&filter)
                .ok_or_else(|| tundra::Error::InvalidInput(format!("unknown filter {filter}")))?;
            repolist(&session, filter)?;
        }
        Command::Repoquery {
            spec,
            list,
            requires,
            provides,
            obsoletes,
            conflicts,
            what_requires,
            what_provides,
        } => {
            let kind = if list {
                QueryKind::Files
            } else if requires {
                QueryKind::Requires
            } else if provides {
                QueryKind::Provides
            } else if obsoletes {
                QueryKind::Obsoletes
            } else if conflicts {
                QueryKind::Conflicts
            } else {
                QueryKind::Nevra
            };
            let reverse = what_requires
                .map(ReverseQuery::WhatRequires)
                .or(what_provides.map(ReverseQuery::WhatProvides));
            repoquery(&mut session, spec.as_deref(), kind, reverse)?;
        }
        Command::Reposync {
            download_metadata,
            delete,
            archs,
            source,
            newest_only,
            norepopath,
            urls,
            gpgcheck,
            download_path,
        } => {
            reposync(
                &mut session,
                &ReposyncOptions {
                    download_metadata,
                    delete,
                    archs,
                    source,
                    newest_only,
                    norepopath,
                    urls,
                    gpgcheck,
                    download_path,
                },
            )?;
        }
        Command::Updateinfo { args } => {
            let (mode, specs) = updateinfo_args(&args);
            updateinfo(&mut session, mode, &specs)?;
        }
        Command::History { command } => match command {
            HistoryCommand::List => history_cmd::list(&session)?,
            HistoryCommand::Init => history_cmd::init(&mut session)?,
            HistoryCommand::Rollback { id } => history_cmd::rollback(&mut session, id)?,
            HistoryCommand::Undo { from, to } => {
                history_cmd::undo(&mut session, from, to.unwrap_or(from))?
            }
            HistoryCommand::Redo { from, to } => {
                history_cmd::redo(&mut session, from, to.unwrap_or(from))?
            }
        },
        Command::Mark { action, packages } => {
            let auto = match action.as_str() {
                "install" => false,
                "remove" => true,
                other => {
                    return Err(tundra::Error::InvalidInput(format!(
                        "unknown mark action {other}"
                    )))
                }
            };
            mark::mark(&mut session, auto, &packages)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// `list`/`info` accept an optional leading scope word.
fn scope_and_specs(args: &[String]) -> (ListScope, Vec<String>) {
    match args.first().map(|s| ListScope::parse(s)) {
        Some(Some(scope)) => (scope, args[1..].to_vec()),
        _ => (ListScope::default(), args.to_vec()),
    }
}

/// `updateinfo` accepts an optional leading mode word.
fn updateinfo_args(args: &[String]) -> (UpdateinfoMode, Vec<String>) {
    match args.first().map(|s| UpdateinfoMode::parse(s)) {
        Some(Some(mode)) => (mode, args[1..].to_vec()),
        _ => (UpdateinfoMode::default(), args.to_vec()),
    }
}
