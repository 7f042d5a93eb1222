use std::env;

use color_eyre::eyre::{eyre, Result};
use timer_link::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Get the serial port from command line arguments.
    // If not provided, exit.
    let usage = "Usage: timerd <serial port>";
    let args: Vec<_> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{usage}");
        std::process::exit(1);
    }
    if args[1] == "-h" || args[1] == "--help" {
        eprintln!("{usage}");
        std::process::exit(0);
    }

    // Logs go to stderr so stdout only carries replies
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    color_eyre::install()?;

    let client = TimerClient::new();
    client.connect(&SerialConfig::new(&args[1])).await?;

    // Inform about successful initialization
    println!("OK");

    // Mainloop: wait for user input, line by line
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(input) = lines.next_line().await? {
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" {
            break;
        }

        match execute(&client, input).await {
            Ok(Some(reply)) => println!("OK {reply}"),
            Ok(None) => println!("OK"),
            Err(e) => println!("ERR {e}"),
        }
    }

    client.close().await?;
    Ok(())
}

/// Runs one command line and returns the reply payload, if any
async fn execute(client: &TimerClient, input: &str) -> Result<Option<String>> {
    let mut cmd = input.splitn(2, ':');
    match cmd.next().map(str::trim) {
        Some("start") => client.start().await?,
        Some("stop") => client.stop().await?,
        Some("sync_clock") => client.set_clock().await?,
        Some("clock") => return Ok(Some(client.get_clock().await?.to_string())),
        Some("info") => {
            let info = client.get_info().await?;
            return Ok(Some(format!(
                "hw={} sw={} memory={} actions={} slots={}",
                info.hw_version,
                info.sw_version,
                info.memory_size,
                info.action_count,
                info.capacity()
            )));
        }
        Some("switch") => {
            let args: Vec<&str> = cmd
                .next()
                .ok_or_else(|| eyre!("Use switch:<major>,<minor>,<on|off>"))?
                .split(',')
                .map(str::trim)
                .collect();
            let &[major, minor, command] = args.as_slice() else {
                return Err(eyre!("Use switch:<major>,<minor>,<on|off>"));
            };

            let mut row = ScheduleRow::default();
            row.set_field(Column::Major, major)?;
            row.set_field(Column::Minor, minor)?;
            row.set_field(Column::Command, command)?;
            let (Some(major), Some(minor), Some(command)) = (row.major, row.minor, row.command)
            else {
                return Err(eyre!("Use switch:<major>,<minor>,<on|off>"));
            };
            client.switch(major, minor, command.code()).await?;
        }
        Some(other) => return Err(eyre!("Unknown command: {other}")),
        None => return Err(eyre!("No command given")),
    }
    Ok(None)
}
