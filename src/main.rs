use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};

use svnp::cache::{CachePaths, PathCache, RevisionStore};
use svnp::commit::CommitSession;
use svnp::config::Settings;
use svnp::tasks::{Progress, TICK_INTERVAL, TaskRunner};
use svnp::types::EntryKind;
use svnp::{Context, Repository, StatusFormat, SvnError, Target};

#[derive(Parser)]
#[command(
    name = "svnp",
    about = "Subversion working-copy helper with cached status and guarded commits"
)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show working copy status
    Status {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Only show locally modified items
        #[arg(short, long)]
        quiet: bool,
        /// Print svn's XML output
        #[arg(long)]
        xml: bool,
    },

    /// Show version control information
    Info {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Show revision history
    Log {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Number of entries to fetch (0 for all); defaults to svn_log_limit
        #[arg(short, long)]
        limit: Option<u32>,
        #[arg(short, long)]
        revision: Option<String>,
    },

    /// Show local changes, or changes against a revision
    Diff {
        #[arg(default_value = ".")]
        path: PathBuf,
        #[arg(short, long)]
        revision: Option<String>,
        /// External diff tool, overrides svn_diff_tool
        #[arg(long)]
        tool: Option<String>,
    },

    /// Update from the repository, postponing conflicts
    Update {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Show who changed each line of a file
    Annotate {
        path: PathBuf,
        #[arg(short, long)]
        revision: Option<String>,
    },

    /// Print a file as of a revision
    Cat {
        path: PathBuf,
        #[arg(short, long)]
        revision: Option<String>,
    },

    /// Put a file or directory under version control
    Add { path: PathBuf },

    /// Discard local changes
    Revert {
        path: PathBuf,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Commit local changes, editing the message in $VISUAL or $EDITOR
    Commit {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// List directory entries
    Ls {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Manage the revision cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Delete all cached revision history
    Clear,
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = run(cli);

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        match e.downcast_ref::<SvnError>() {
            Some(SvnError::NotTracked(path)) => {
                eprintln!();
                eprintln!("Hint: Add it with: svnp add {}", path.display());
            }
            Some(SvnError::Configuration(_)) | Some(SvnError::NotConfigured(_)) => {
                eprintln!();
                eprintln!(
                    "Hint: Set svn_binary and svn_directories in {}",
                    Settings::default_path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "settings.json".to_string())
                );
            }
            _ => {}
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult {
    let settings = Settings::load(cli.config.as_deref())?;

    if let Commands::Cache {
        command: CacheCommands::Clear,
    } = cli.command
    {
        return cmd_cache_clear(&settings);
    }

    let ctx = Arc::new(Context::new(settings)?);
    let runner = TaskRunner::new();

    match cli.command {
        Commands::Status { path, quiet, xml } => cmd_status(&ctx, &path, quiet, xml),
        Commands::Info { path } => cmd_info(&ctx, &path),
        Commands::Log {
            path,
            limit,
            revision,
        } => cmd_log(&ctx, &runner, &path, limit, revision),
        Commands::Diff {
            path,
            revision,
            tool,
        } => cmd_diff(&ctx, &runner, &path, revision, tool),
        Commands::Update { path } => cmd_update(&ctx, &runner, &path),
        Commands::Annotate { path, revision } => cmd_annotate(&ctx, &runner, &path, revision),
        Commands::Cat { path, revision } => cmd_cat(&ctx, &runner, &path, revision),
        Commands::Add { path } => cmd_add(&ctx, &path),
        Commands::Revert { path, yes } => cmd_revert(&ctx, &path, yes),
        Commands::Commit { path } => cmd_commit(&ctx, &path),
        Commands::Ls { path } => cmd_ls(&ctx, &path),
        Commands::Cache { .. } => Ok(()),
    }
}

fn open(ctx: &Arc<Context>, path: &Path) -> Result<Repository, SvnError> {
    let absolute = std::fs::canonicalize(path)?;
    let target = Target::detect(absolute)?;
    Repository::open(Arc::clone(ctx), target)
}

/// Run `work` on a task thread, animating `message` on stderr until it completes.
fn with_progress<T, F>(
    runner: &TaskRunner,
    label: &str,
    message: &str,
    success_message: &str,
    work: F,
) -> Result<T, SvnError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SvnError> + Send + 'static,
{
    let slot = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&slot);
    runner.spawn_with(label, work, move |result| {
        if let Ok(mut slot) = sink.lock() {
            *slot = Some(result);
        }
    })?;

    let animate = std::io::stderr().is_terminal();
    let mut progress = Progress::new(message, success_message);
    while runner.pending() > 0 {
        if runner.drain_timeout(TICK_INTERVAL) == 0 && animate {
            eprint!("\r{}", progress.tick());
        }
    }

    let result = slot
        .lock()
        .ok()
        .and_then(|mut slot| slot.take())
        .unwrap_or_else(|| Err(SvnError::TaskFailed(format!("{} produced no result", label))));

    if animate {
        eprint!("\r\x1b[2K");
        let done = progress.finish(result.is_ok());
        if !done.is_empty() {
            eprintln!("{}", done);
        }
    }
    result
}

fn cmd_status(ctx: &Arc<Context>, path: &Path, quiet: bool, xml: bool) -> CliResult {
    let repo = open(ctx, path)?;
    print!("{}", repo.status(StatusFormat { quiet, xml })?);
    Ok(())
}

fn cmd_info(ctx: &Arc<Context>, path: &Path) -> CliResult {
    let repo = open(ctx, path)?;
    repo.require_tracked()?;

    for entry in repo.info()? {
        println!("Path:              {}", entry.path);
        if let Some(kind) = entry.kind {
            let kind = match kind {
                EntryKind::Dir => "directory",
                EntryKind::File => "file",
            };
            println!("Node Kind:         {}", kind);
        }
        if let Some(revision) = &entry.revision {
            println!("Revision:          {}", revision);
        }
        if let Some(url) = &entry.url {
            println!("URL:               {}", url);
        }
        if let Some(root) = &entry.wc_root {
            println!("Working Copy Root: {}", root.display());
        }
        println!(
            "Modified:          {}",
            if repo.is_modified()? { "yes" } else { "no" }
        );
    }
    Ok(())
}

fn cmd_log(
    ctx: &Arc<Context>,
    runner: &TaskRunner,
    path: &Path,
    limit: Option<u32>,
    revision: Option<String>,
) -> CliResult {
    let repo = Arc::new(open(ctx, path)?);
    repo.require_tracked()?;
    let limit = limit.unwrap_or(ctx.settings().svn_log_limit);

    let worker = Arc::clone(&repo);
    let revisions = with_progress(runner, "log", "Fetching log", "", move || {
        worker.log(Some(limit), revision.as_deref())
    })?;

    if revisions.is_empty() {
        println!("No revisions");
        return Ok(());
    }
    for revision in revisions.iter() {
        println!("{}", "-".repeat(72));
        println!("{}", revision);
        if !revision.message.is_empty() {
            println!();
            println!("{}", revision.message);
        }
    }
    println!("{}", "-".repeat(72));
    Ok(())
}

fn cmd_diff(
    ctx: &Arc<Context>,
    runner: &TaskRunner,
    path: &Path,
    revision: Option<String>,
    tool: Option<String>,
) -> CliResult {
    let repo = Arc::new(open(ctx, path)?);
    repo.require_tracked()?;

    let tool = tool.or_else(|| ctx.settings().svn_diff_tool.clone());
    if let Some(tool) = tool {
        repo.diff(revision.as_deref(), Some(&tool))?;
        println!("Opened diff in {}", tool);
        return Ok(());
    }

    let worker = Arc::clone(&repo);
    let diff = with_progress(runner, "diff", "Diffing", "", move || {
        worker.diff(revision.as_deref(), None)
    })?;
    match diff {
        Some(text) if !text.is_empty() => print!("{}", text),
        _ => println!("No changes"),
    }
    Ok(())
}

fn cmd_update(ctx: &Arc<Context>, runner: &TaskRunner, path: &Path) -> CliResult {
    let repo = Arc::new(open(ctx, path)?);
    repo.require_tracked()?;

    let worker = Arc::clone(&repo);
    let output = with_progress(runner, "update", "Updating", "Updated", move || {
        worker.update()
    })?;
    print!("{}", output);
    Ok(())
}

fn cmd_annotate(
    ctx: &Arc<Context>,
    runner: &TaskRunner,
    path: &Path,
    revision: Option<String>,
) -> CliResult {
    let repo = Arc::new(open(ctx, path)?);
    repo.require_tracked()?;

    let worker = Arc::clone(&repo);
    let output = with_progress(runner, "annotate", "Annotating", "", move || {
        worker.annotate(revision.as_deref())
    })?;
    print!("{}", output);
    Ok(())
}

fn cmd_cat(
    ctx: &Arc<Context>,
    runner: &TaskRunner,
    path: &Path,
    revision: Option<String>,
) -> CliResult {
    let repo = Arc::new(open(ctx, path)?);
    repo.require_tracked()?;

    let worker = Arc::clone(&repo);
    let output = with_progress(runner, "cat", "Fetching revision", "", move || {
        worker.cat(revision.as_deref())
    })?;
    print!("{}", output);
    Ok(())
}

fn cmd_add(ctx: &Arc<Context>, path: &Path) -> CliResult {
    let repo = open(ctx, path)?;
    if repo.is_tracked()? {
        println!("{} is already under version control", repo.path().display());
        return Ok(());
    }
    print!("{}", repo.add()?);
    Ok(())
}

fn cmd_revert(ctx: &Arc<Context>, path: &Path, yes: bool) -> CliResult {
    let repo = open(ctx, path)?;
    repo.require_tracked()?;

    let confirm = |prompt: &str| yes || ask(prompt);
    if repo.revert(&confirm)? {
        println!("Reverted {}", repo.path().display());
    } else {
        println!("Not reverted");
    }
    Ok(())
}

/// Ask a yes/no question on the terminal. Anything but y/yes is a no.
fn ask(prompt: &str) -> bool {
    eprint!("{} [y/N] ", prompt);
    let _ = std::io::stderr().flush();
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn cmd_commit(ctx: &Arc<Context>, path: &Path) -> CliResult {
    let repo = open(ctx, path)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    let mut session = CommitSession::begin(&repo)?;

    if let Err(e) = edit(session.artifact()) {
        session.abandon();
        return Err(e);
    }
    if interrupted.load(Ordering::SeqCst) {
        session.abandon();
        return Err("commit interrupted".into());
    }

    let outcome = session.commit()?;
    print!("{}", outcome.output);
    if let Some(text) = outcome.clipboard {
        println!("Clipboard: {}", text);
    }
    Ok(())
}

/// Open `file` in the user's editor and wait for it to exit.
fn edit(file: &Path) -> CliResult {
    let editor = std::env::var("VISUAL")
        .or_else(|_| std::env::var("EDITOR"))
        .ok()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| "vi".to_string());
    let mut parts = editor.split_whitespace();
    let program = parts.next().unwrap_or("vi");

    let status = Command::new(program).args(parts).arg(file).status()?;
    if !status.success() {
        return Err(format!("editor {} exited with {}", program, status).into());
    }
    Ok(())
}

fn cmd_ls(ctx: &Arc<Context>, path: &Path) -> CliResult {
    let repo = open(ctx, path)?;
    repo.require_tracked()?;

    for entry in repo.ls()? {
        match entry.kind {
            EntryKind::Dir => println!("{}/", entry.name),
            EntryKind::File => println!("{}", entry.name),
        }
    }
    Ok(())
}

fn cmd_cache_clear(settings: &Settings) -> CliResult {
    let store = RevisionStore::new(CachePaths::new(&settings.cache_dir));
    PathCache::with_store(store).clear()?;
    println!("Cleared revision cache in {}", settings.cache_dir.display());
    Ok(())
}
