//! linode-lifecycle CLI - Run a Linode on a daily schedule with image backups

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use linode_lifecycle::{
    backup::PruneOrder,
    orchestrator::backup_and_shutdown,
    provider::{LinodeCliConfig, LinodeCliProvider},
    scheduler::CrontabStore,
    DailyWindow, InstanceId, Orchestrator, Readiness, ReadinessConfig, RegistrationPolicy, Result,
    Scheduler, SchedulerConfig,
};
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "linode-lifecycle")]
#[command(about = "Run a Linode on a daily schedule with image backups", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    options: GlobalOptions,
}

#[derive(Args)]
struct GlobalOptions {
    /// linode-cli program used for API calls
    #[arg(long, global = true, env = "LINODE_CLI", default_value = "linode-cli")]
    linode_cli: String,

    /// linode-cli path written into cron entries
    #[arg(long, global = true, default_value = "/usr/bin/linode-cli")]
    cron_linode_cli: String,

    /// Command run by the backup trigger; the Linode ID is appended
    /// [default: <this program> backup --shutdown with the linode-cli and prune flags above]
    #[arg(long, global = true, env = "LINODE_LIFECYCLE_BACKUP_COMMAND")]
    backup_command: Option<String>,

    /// Append triggers even if the instance already has them
    #[arg(long, global = true)]
    append_triggers: bool,

    /// Delete old backups before creating the new one (for accounts at their image quota)
    #[arg(long, global = true)]
    prune_first: bool,

    /// Seconds to wait for a booting Linode
    #[arg(long, global = true, default_value_t = 180)]
    ready_timeout: u64,

    /// Seconds between status checks while waiting
    #[arg(
        long,
        global = true,
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    poll_interval: u64,

    /// Log every linode-cli and crontab call
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot the Linode, schedule daily triggers and take a backup (default)
    Setup {
        /// Linode ID (prompted if omitted)
        #[arg(long)]
        instance: Option<String>,
        /// Working start time, HH:MM (prompted if omitted)
        #[arg(long)]
        start: Option<String>,
        /// Working end time, HH:MM (prompted if omitted)
        #[arg(long)]
        end: Option<String>,
    },

    /// Replace the Linode's image backup
    Backup {
        /// Linode ID
        instance: String,
        /// Shut the Linode down after the backup
        #[arg(long)]
        shutdown: bool,
    },

    /// List scheduled triggers
    Triggers {
        /// Only show triggers for this Linode ID
        instance: Option<String>,
    },

    /// Remove all scheduled triggers for a Linode
    ClearTriggers {
        /// Linode ID
        instance: String,
    },
}

fn info(msg: &str) {
    println!("{} {}", "[INFO]".blue(), msg);
}

fn success(msg: &str) {
    println!("{} {}", "[OK]".green(), msg);
}

fn warn(msg: &str) {
    println!("{} {}", "[WARN]".yellow(), msg);
}

fn error(msg: &str) {
    eprintln!("{} {}", "[ERROR]".red(), msg);
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "linode_lifecycle=debug"
    } else {
        "linode_lifecycle=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Read a line from stdin after printing `question`
fn prompt(question: &str) -> Result<String> {
    print!("{} ", question);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn value_or_prompt(value: Option<String>, question: &str) -> Result<String> {
    match value {
        Some(value) => Ok(value),
        None => prompt(question),
    }
}

fn prune_order(options: &GlobalOptions) -> PruneOrder {
    if options.prune_first {
        PruneOrder::BeforeCreate
    } else {
        PruneOrder::AfterCreate
    }
}

fn scheduler(options: &GlobalOptions) -> Scheduler<CrontabStore> {
    let program = std::env::current_exe()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|_| "linode-lifecycle".to_string());
    let mut config =
        SchedulerConfig::for_program(&program, &options.cron_linode_cli, prune_order(options));
    if let Some(command) = &options.backup_command {
        config.backup_command = command.clone();
    }
    if options.append_triggers {
        config.policy = RegistrationPolicy::Append;
    }
    Scheduler::with_config(CrontabStore::new(), config)
}

fn provider(options: &GlobalOptions) -> LinodeCliProvider {
    LinodeCliProvider::with_config(LinodeCliConfig {
        program: options.linode_cli.clone(),
    })
}

fn cmd_setup(
    options: &GlobalOptions,
    instance: Option<String>,
    start: Option<String>,
    end: Option<String>,
) -> Result<()> {
    let instance: InstanceId =
        value_or_prompt(instance, "Enter the Linode ID you want to work on:")?.parse()?;
    let start = value_or_prompt(start, "Enter working start time (HH:MM, 24-hour format):")?;
    let end = value_or_prompt(end, "Enter working end time (HH:MM, 24-hour format):")?;
    let window = DailyWindow::parse(&start, &end)?;

    let provider = provider(options);
    let scheduler = scheduler(options);
    let orchestrator = Orchestrator::new(&provider, &scheduler)
        .readiness(ReadinessConfig {
            poll_interval: Duration::from_secs(options.poll_interval),
            timeout: Duration::from_secs(options.ready_timeout),
        })
        .prune_order(prune_order(options));

    info(&format!(
        "Setting up Linode ID {} for daily window {}...",
        instance, window
    ));
    let report = orchestrator.run(&instance, &window)?;

    match report.readiness {
        Readiness::AlreadyRunning => info("The Linode is already running"),
        Readiness::Started { waited } => success(&format!(
            "The Linode was not running; booted it in {}s",
            waited.as_secs()
        )),
    }
    for trigger in &report.triggers {
        info(&format!(
            "{} {:<9} {}",
            trigger.time, trigger.key.action, trigger.command
        ));
    }
    success("Cron jobs set up successfully!");
    report_backup(&report.backup);

    Ok(())
}

fn report_backup(report: &linode_lifecycle::BackupReport) {
    for id in &report.deleted {
        info(&format!("Deleted old image {}", id));
    }
    success(&format!(
        "Backup created successfully with label: {} (image {}, disk {})",
        report.created.label, report.created.id, report.disk.id
    ));
}

fn cmd_backup(options: &GlobalOptions, instance: &str, shutdown: bool) -> Result<()> {
    let instance: InstanceId = instance.parse()?;
    let provider = provider(options);

    info(&format!("Creating image backup for Linode ID {}...", instance));
    let report = backup_and_shutdown(&provider, &instance, prune_order(options), shutdown)?;
    report_backup(&report);
    if shutdown {
        success(&format!("Linode ID {} is shutting down", instance));
    }

    Ok(())
}

fn cmd_triggers(options: &GlobalOptions, instance: Option<&str>) -> Result<()> {
    let instance = instance.map(str::parse::<InstanceId>).transpose()?;
    let triggers = scheduler(options).triggers(instance.as_ref())?;

    if triggers.is_empty() {
        println!("  (no triggers scheduled)");
        return Ok(());
    }

    println!("{:<12} {:<7} {:<10} {}", "LINODE", "TIME", "ACTION", "COMMAND");
    println!("{:<12} {:<7} {:<10} {}", "------", "----", "------", "-------");
    for trigger in triggers {
        println!(
            "{:<12} {:<7} {:<10} {}",
            trigger.key.instance, trigger.time, trigger.key.action, trigger.command
        );
    }

    Ok(())
}

fn cmd_clear_triggers(options: &GlobalOptions, instance: &str) -> Result<()> {
    let instance: InstanceId = instance.parse()?;

    let removed = scheduler(options).clear(&instance)?;
    if removed == 0 {
        warn(&format!("No triggers found for Linode ID {}", instance));
    } else {
        success(&format!(
            "Removed {} trigger(s) for Linode ID {}",
            removed, instance
        ));
    }

    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.options.verbose);
    let options = &cli.options;

    match cli.command {
        None => cmd_setup(options, None, None, None),
        Some(Commands::Setup {
            instance,
            start,
            end,
        }) => cmd_setup(options, instance, start, end),
        Some(Commands::Backup { instance, shutdown }) => cmd_backup(options, &instance, shutdown),
        Some(Commands::Triggers { instance }) => cmd_triggers(options, instance.as_deref()),
        Some(Commands::ClearTriggers { instance }) => cmd_clear_triggers(options, &instance),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
