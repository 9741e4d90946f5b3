//! hookwork CLI: run a hook script as a tracked work item, or read back
//! a filtered view of a work log.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hookwork::config::Config;
use hookwork::logs::extract_log;
use hookwork::runner;
use hookwork::telemetry::init_telemetry;

#[derive(Parser)]
#[command(name = "hookwork", about = "Run hook scripts and inspect their logs")]
struct Cli {
    /// TOML config file (defaults to environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a script as a work item and stream its output
    Run {
        /// Script to execute
        script: PathBuf,
        /// Hook name (defaults to the script file name)
        #[arg(long)]
        name: Option<String>,
        /// Payload passed on stdin and in HOOK_PAYLOAD
        #[arg(long, default_value = "")]
        payload: String,
        /// Time budget in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Directory for the .arg and .txt files
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Arguments passed to the script
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Print the lines of a log file starting with a prefix
    Logs {
        /// Log file written by a previous run
        log_file: PathBuf,
        /// Line prefix to keep (empty keeps every line)
        #[arg(long, default_value = "")]
        prefix: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    let _guard = init_telemetry(&config)?;

    match cli.command {
        Command::Run {
            script,
            name,
            payload,
            timeout,
            output_dir,
            args,
        } => cmd_run(&config, script, name, payload, timeout, output_dir, args).await,
        Command::Logs { log_file, prefix } => cmd_logs(log_file, &prefix),
    }
}

async fn cmd_run(
    config: &Config,
    script: PathBuf,
    name: Option<String>,
    payload: String,
    timeout: Option<u64>,
    output_dir: Option<PathBuf>,
    args: Vec<String>,
) -> anyhow::Result<()> {
    let name = name.unwrap_or_else(|| {
        script
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "hook".to_string())
    });

    let mut new = config.new_work_item(name, script).payload(payload).args(args);
    if let Some(seconds) = timeout {
        new = new.timeout(seconds);
    }
    if let Some(dir) = output_dir {
        new = new.output_dir(dir);
    }
    let item = new.build();

    let stream = item.sink().subscribe();
    // A failed write (closed pipe) ends the echo; the run carries on.
    let echo = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        stream.forward_to(&mut stdout).await
    });

    let result = runner::run(&item).await;
    if let Err(e) = echo.await? {
        tracing::warn!("stopped echoing script output: {e}");
    }

    println!("{}", serde_json::to_string_pretty(&item.snapshot())?);
    result?;
    Ok(())
}

fn cmd_logs(log_file: PathBuf, prefix: &str) -> anyhow::Result<()> {
    let content = extract_log(&log_file, prefix)?;
    print!("{content}");
    Ok(())
}
