use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use uq_core::{fs::atomic_write_bytes, DataHandle, DataStore};
use uq_runner::{
    cleanup_runs, collect_status, create_runs, jobs_for_runs, status_from_artifacts, submit_runs,
    system_for, Job, OpQueue, RunStatus, SubmitMode,
};
use uq_schemas::{read_handles_from_file, Config, Runs};

#[derive(Parser)]
#[command(name = "uqsweep", version, about = "Uncertainty-quantification sweep driver")]
struct Cli {
    /// Sweep configuration file.
    #[arg(short, long, global = true, default_value = "uqsweep.yaml")]
    config: PathBuf,
    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example configuration file.
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Create run directories and perturbed input data from the
    /// configured dimensions.
    Create {
        #[arg(long)]
        force: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Submit every run that has not been submitted yet.
    Submit {
        /// Submit the whole batch as one scheduler array job.
        #[arg(long)]
        array: bool,
        /// Resubmit runs that already carry a lock file.
        #[arg(long)]
        force: bool,
    },
    /// Report the status of every run in the collection.
    Status {
        /// Print one line per run in addition to the tally.
        #[arg(long)]
        detailed: bool,
    },
    /// Merge completed run outputs into one mean document with error
    /// fields.
    Merge,
    /// Remove run directories and the generated data documents.
    Clean {
        #[arg(long)]
        force: bool,
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    match cli.command {
        Commands::Init { force } => cmd_init(&cli.config, force),
        Commands::Create { force, dry_run } => cmd_create(&cli.config, force, dry_run),
        Commands::Submit { array, force } => cmd_submit(&cli.config, array, force),
        Commands::Status { detailed } => cmd_status(&cli.config, detailed),
        Commands::Merge => cmd_merge(&cli.config),
        Commands::Clean { force, dry_run } => cmd_clean(&cli.config, force, dry_run),
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path)
        .with_context(|| format!("run `uqsweep init` to write an example at {}", path.display()))
}

fn load_runs(cfg: &Config) -> Result<Runs> {
    if !cfg.workspace.runs_file.is_file() {
        bail!(
            "no run collection at {}, run `uqsweep create` first",
            cfg.workspace.runs_file.display()
        );
    }
    Runs::load(&cfg.workspace.runs_file).map_err(anyhow::Error::from)
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} exists (use --force to overwrite)", path.display());
    }
    let text = serde_yaml::to_string(&Config::example())?;
    atomic_write_bytes(path, text.as_bytes())
        .with_context(|| format!("cannot write {}", path.display()))?;
    println!("config: {}", path.display());
    Ok(())
}

fn cmd_create(config: &Path, force: bool, dry_run: bool) -> Result<()> {
    let cfg = load_config(config)?;
    let system = system_for(cfg.system, &cfg.submit);
    let mut queue = OpQueue::new(dry_run);
    let runs = create_runs(&cfg, system.as_ref(), &mut queue, force)?;
    let planned = queue.len();
    let executed = queue.apply_all()?;
    println!("runs: {}", runs.len());
    if dry_run {
        println!("planned operations: {}", planned);
    } else {
        println!("operations: {}", executed);
    }
    Ok(())
}

fn cmd_submit(config: &Path, array: bool, force: bool) -> Result<()> {
    let cfg = load_config(config)?;
    let runs = load_runs(&cfg)?;
    let jobs = jobs_for_runs(&cfg, &runs);
    let system = system_for(cfg.system, &cfg.submit);
    let mode = if array {
        SubmitMode::Array
    } else {
        SubmitMode::Single
    };
    let summary = submit_runs(
        &jobs,
        system.as_ref(),
        mode,
        &cfg.workspace.runs_dir,
        force,
    )?;
    println!("submitted: {}", summary.submitted.len());
    println!("skipped: {}", summary.skipped.len());
    if !summary.is_clean() {
        for (name, err) in &summary.failed {
            warn!("{}: {}", name, err);
        }
        bail!("{} runs failed to submit", summary.failed.len());
    }
    Ok(())
}

fn cmd_status(config: &Path, detailed: bool) -> Result<()> {
    let cfg = load_config(config)?;
    let runs = load_runs(&cfg)?;
    let jobs = jobs_for_runs(&cfg, &runs);
    let (per_run, report) = collect_status(&jobs, &cfg.status);
    if detailed {
        for (name, status) in &per_run {
            println!("{}: {}", name, status);
        }
    }
    for (status, count) in report.counts() {
        println!("{}: {}", status, count);
    }
    println!("total: {}", report.total());
    println!("completed: {:.1}%", report.percent_completed());
    Ok(())
}

fn cmd_merge(config: &Path) -> Result<()> {
    let cfg = load_config(config)?;
    let merge_cfg = cfg
        .merge
        .as_ref()
        .ok_or_else(|| anyhow!("config has no merge section"))?;

    let handles = read_handles_from_file(&merge_cfg.data)?;
    if handles.is_empty() {
        bail!("no run handles in {}", merge_cfg.data.display());
    }
    if handles.values().any(|h| *h == merge_cfg.output) || merge_cfg.template == merge_cfg.output {
        bail!("merge output {} collides with an input handle", merge_cfg.output);
    }

    // Runs that live in this workspace are filtered on status; handles
    // from an external collection are taken as-is.
    let mut inputs: Vec<DataHandle> = Vec::new();
    for (name, handle) in &handles {
        let dir = cfg.workspace.runs_dir.join(name);
        if dir.is_dir() {
            let job = Job::new(&dir, &cfg.submit, &cfg.status);
            let status = status_from_artifacts(&job, &cfg.status);
            if status != RunStatus::Completed {
                warn!("{}: {}, excluded from merge", name, status);
                continue;
            }
        }
        inputs.push(handle.clone());
    }
    if inputs.is_empty() {
        bail!("no completed runs to merge");
    }

    let store = DataStore::new(&cfg.workspace.store_root);
    uq_analysis::merge(
        &store,
        &inputs,
        &merge_cfg.template,
        &merge_cfg.output,
        &merge_cfg.plan,
        merge_cfg.skip_empty,
    )?;
    println!("merged runs: {}", inputs.len());
    println!("output: {}", merge_cfg.output);
    Ok(())
}

fn cmd_clean(config: &Path, force: bool, dry_run: bool) -> Result<()> {
    let cfg = load_config(config)?;
    let mut queue = OpQueue::new(dry_run);
    let runs = cleanup_runs(&cfg, &mut queue, force)?;
    let planned = queue.len();
    let executed = queue.apply_all()?;
    println!("runs: {}", runs.len());
    if dry_run {
        println!("planned operations: {}", planned);
    } else {
        println!("operations: {}", executed);
    }
    Ok(())
}
