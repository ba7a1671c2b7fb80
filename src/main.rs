use anyhow::Result;
use clap::{Parser, Subcommand};
use presenced::integrations::probe;
use presenced::{config, daemon::Daemon};

#[derive(Parser, Debug)]
#[command(name = "presenced")]
#[command(about = "Keep your working/in-meeting presence in sync with a remote server")]
#[command(version)]
struct Args {
    /// Initialize configuration
    #[arg(long)]
    init: bool,

    /// Path to config file
    #[arg(long, short)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print what the configured probe reports and exit
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("presenced=info".parse()?),
        )
        .init();

    if args.init {
        config::init_wizard().await?;
        return Ok(());
    }

    let config = config::load(args.config.as_deref())?;

    if let Some(Command::Probe) = args.command {
        let probe = probe::from_config(&config.probe);
        match probe.is_locked().await {
            Ok(locked) => println!("locked:  {}", locked),
            Err(e) => println!("locked:  error ({:#})", e),
        }
        match probe.is_in_meeting().await {
            Ok(meeting) => println!("meeting: {}", meeting),
            Err(e) => println!("meeting: error ({:#})", e),
        }
        return Ok(());
    }

    Daemon::new(config).run().await
}
