//! orb-provider CLI

use clap::{Parser, Subcommand};
use orb_provider::{DestroyOutcome, Orchestrator, ProviderConfig, UpOutcome};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "orb-provider")]
#[command(about = "Manage a Vagrant machine backed by OrbStack", long_about = None)]
#[command(version)]
struct Cli {
    /// Logical machine name
    #[arg(short, long, global = true, default_value = "default")]
    name: String,

    /// Directory holding the machine's id and metadata files
    /// (default: .vagrant/machines/<name>/orbstack)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Provider configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or start the machine
    Up {
        /// Do not wait for the machine to accept SSH
        #[arg(long)]
        no_wait: bool,
    },
    /// Stop the machine
    Halt,
    /// Delete the machine and its local state
    Destroy,
    /// Halt then start the machine
    Reload {
        /// Ask the front-end to run provisioners afterwards
        #[arg(long)]
        provision: bool,
    },
    /// Show machine state
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print an OpenSSH config block for the running machine
    SshConfig {
        /// Host alias in the generated block (default: machine name)
        #[arg(long)]
        host: Option<String>,
        /// Forward the local SSH agent
        #[arg(long)]
        forward_agent: bool,
    },
    /// Wait until the machine accepts SSH
    Wait,
    /// Check that the engine CLI can be run
    Doctor,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ProviderConfig::from_file(path)?,
        None => ProviderConfig::default(),
    };
    let data_dir = cli.data_dir.clone().unwrap_or_else(|| {
        PathBuf::from(".vagrant")
            .join("machines")
            .join(&cli.name)
            .join("orbstack")
    });
    let machine = Orchestrator::new(cli.name.clone(), data_dir, config)?;

    match cli.command {
        Commands::Up { no_wait } => cmd_up(&machine, !no_wait)?,
        Commands::Halt => cmd_halt(&machine)?,
        Commands::Destroy => cmd_destroy(&machine)?,
        Commands::Reload { provision } => cmd_reload(&machine, provision)?,
        Commands::Status { json } => cmd_status(&machine, json)?,
        Commands::SshConfig { host, forward_agent } => {
            let alias = host.unwrap_or_else(|| cli.name.clone());
            let forward = forward_agent || machine.config().ssh.forward_agent;
            cmd_ssh_config(&machine, &alias, forward)?
        }
        Commands::Wait => cmd_wait(&machine)?,
        Commands::Doctor => cmd_doctor(&machine)?,
    }

    Ok(())
}

fn describe_up(outcome: &UpOutcome) -> String {
    match outcome {
        UpOutcome::AlreadyRunning { identifier } => format!("{} is already running", identifier),
        UpOutcome::Resumed { identifier } => format!("Started {}", identifier),
        UpOutcome::Created { identifier } => format!("Created {}", identifier),
    }
}

fn cmd_up(machine: &Orchestrator, wait: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Bringing machine '{}' up...", machine.logical_name());
    let outcome = machine.ensure_running()?;
    println!("{}", describe_up(&outcome));

    if wait && outcome.mutated() {
        println!("Waiting for the machine to accept SSH...");
        machine.wait_for_ready()?;
        println!("Machine is ready.");
    }
    Ok(())
}

fn cmd_halt(machine: &Orchestrator) -> Result<(), Box<dyn std::error::Error>> {
    println!("Stopping machine '{}'...", machine.logical_name());
    machine.ensure_stopped()?;
    println!("Machine stopped.");
    Ok(())
}

fn cmd_destroy(machine: &Orchestrator) -> Result<(), Box<dyn std::error::Error>> {
    match machine.destroy()? {
        DestroyOutcome::AlreadyDestroyed => {
            println!("Machine '{}' is not created.", machine.logical_name());
        }
        DestroyOutcome::Destroyed {
            identifier,
            remote_deleted,
        } => {
            println!("Destroyed {}", identifier);
            if !remote_deleted {
                println!("Warning: the engine did not confirm deletion; check `orbctl list`.");
            }
        }
    }
    Ok(())
}

fn cmd_reload(machine: &Orchestrator, provision: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Reloading machine '{}'...", machine.logical_name());
    let outcome = machine.reload(provision)?;
    println!("{}", describe_up(&outcome.up));
    machine.wait_for_ready()?;
    if outcome.provision {
        println!("Provisioning requested; run the front-end provisioners now.");
    }
    Ok(())
}

fn cmd_status(machine: &Orchestrator, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let report = machine.status_report()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{:<20} {:<15} {}", "NAME", "STATE", "IDENTIFIER");
    println!("{}", "-".repeat(60));
    println!(
        "{:<20} {:<15} {}",
        machine.logical_name(),
        report.short,
        report.identifier.as_deref().unwrap_or("-")
    );
    println!("\n{}", report.long);
    Ok(())
}

fn cmd_ssh_config(
    machine: &Orchestrator,
    alias: &str,
    forward_agent: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match machine.connection_info(forward_agent)? {
        Some(info) => print!("{}", info.to_ssh_config(alias)),
        None => {
            return Err(format!(
                "machine '{}' is not running; run `up` first",
                machine.logical_name()
            )
            .into())
        }
    }
    Ok(())
}

fn cmd_wait(machine: &Orchestrator) -> Result<(), Box<dyn std::error::Error>> {
    machine.wait_for_ready()?;
    println!("Machine '{}' is ready.", machine.logical_name());
    Ok(())
}

fn cmd_doctor(machine: &Orchestrator) -> Result<(), Box<dyn std::error::Error>> {
    let binary = &machine.config().engine_binary;
    println!("[*] Engine CLI: {}", binary);

    match machine.engine().version() {
        Ok(output) if output.success => {
            println!("    Status: Available");
            if let Some(line) = output.stdout.lines().next() {
                println!("    {}", line.trim());
            }
        }
        Ok(output) => println!("    Status: Installed but failing ({})", output.stderr.trim()),
        Err(e) => println!("    Error: {}", e),
    }

    println!("\n[*] Machine '{}':", machine.logical_name());
    match machine.metadata()? {
        Some(meta) => {
            println!("    Identifier:   {}", meta.machine_name);
            println!("    Distribution: {}", meta.distribution);
            println!("    Created:      {}", meta.created_at.to_rfc3339());
        }
        None => println!("    Not created"),
    }
    Ok(())
}
