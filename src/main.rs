use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Result};
use timer_link::*;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Serial port the timer is attached to
    #[arg(short, long, env = "TIMER_PORT")]
    port: Option<String>,

    /// How long to wait for a complete response, in milliseconds
    #[arg(long, env = "TIMER_READ_TIMEOUT_MS", default_value_t = 2000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
enum OnOff {
    /// Switch the unit on
    On,
    /// Switch the unit off
    Off,
}

impl From<OnOff> for SwitchCommand {
    fn from(value: OnOff) -> Self {
        match value {
            OnOff::On => SwitchCommand::On,
            OnOff::Off => SwitchCommand::Off,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    Ports,
    /// Show appliance info and clock
    Info,
    /// Show the device clock
    Clock {
        /// Set the device clock to this computer's local time first
        #[arg(short, long)]
        set: bool,
    },
    /// Enable scheduled execution
    Start,
    /// Disable scheduled execution
    Stop,
    /// Switch a unit immediately
    Switch {
        /// Group identifier (one character)
        major: char,
        /// Unit within the group
        minor: u8,
        #[arg(value_enum)]
        command: OnOff,
    },
    /// Inspect or change single action slots
    Action {
        #[command(subcommand)]
        command: ActionCommands,
    },
    /// Read the schedule from the device
    Read {
        /// Save the schedule to this JSON file instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write a schedule file to the device, replacing its schedule
    Write {
        /// Schedule JSON file
        file: PathBuf,
    },
    /// Enable debug output on the device
    Verbose,
    /// Request a hardware reset
    Reset,
}

#[derive(Subcommand)]
enum ActionCommands {
    /// Show one slot
    Get {
        /// Slot index
        index: u16,
    },
    /// Store one action in a slot
    Set {
        /// Slot index
        index: u16,
        /// Group identifier (one character)
        major: char,
        /// Unit within the group
        minor: u8,
        /// Time as hh:mm
        time: String,
        #[arg(value_enum)]
        command: OnOff,
        /// Only on this date (dd-mm-yyyy)
        #[arg(short, long)]
        date: Option<String>,
        /// Only on this weekday (name or 1-7, Monday = 1)
        #[arg(short, long)]
        weekday: Option<String>,
    },
    /// Overwrite one slot with the empty action
    Clear {
        /// Slot index
        index: u16,
    },
}

#[tokio::main]
#[instrument]
async fn main() -> Result<()> {
    // Initialize tracing with pretty colors
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("timer_link=info,timerctl=info")),
        )
        .compact()
        .init();

    // Initialize color-eyre for pretty error reporting
    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    // Listing ports needs no connection
    if let Commands::Ports = cli.command {
        return print_ports();
    }

    let mut config = SerialConfig::default();
    if let Some(port) = cli.port {
        config.port = port;
    }
    config.read_timeout = Duration::from_millis(cli.timeout_ms);

    let client = TimerClient::new();
    if let Err(e) = client.connect(&config).await {
        error!("Failed to connect to {}: {}", config.port, e);
        return Err(e.into());
    }

    let result = run(&client, cli.command).await;
    client.close().await?;
    result
}

async fn run(client: &TimerClient, command: Commands) -> Result<()> {
    match command {
        Commands::Ports => print_ports()?,
        Commands::Info => {
            let info = client.get_info().await?;
            let clock = client.get_clock().await?;
            println!("Hardware version: {}", info.hw_version);
            println!("Software version: {}", info.sw_version);
            println!("Memory size:      {} bytes", info.memory_size);
            println!("Action count:     {}", info.action_count);
            println!("Action slots:     {}", info.capacity());
            println!("Clock:            {}", clock);
        }
        Commands::Clock { set } => {
            if set {
                client.set_clock().await?;
            }
            println!("{}", client.get_clock().await?);
        }
        Commands::Start => client.start().await?,
        Commands::Stop => client.stop().await?,
        Commands::Switch {
            major,
            minor,
            command,
        } => {
            client
                .switch(major, minor, SwitchCommand::from(command).code())
                .await?;
        }
        Commands::Action { command } => run_action(client, command).await?,
        Commands::Read { output } => {
            let cancel = cancel_on_ctrl_c();
            let schedule = client
                .read_schedule(&mut LogProgress::new("Read from device"), &cancel)
                .await?;

            match output {
                Some(path) => {
                    schedule.save(&path)?;
                    info!("Schedule saved to {}", path.display());
                }
                None => print_schedule(&schedule),
            }
        }
        Commands::Write { file } => {
            let schedule = Schedule::load(&file)?;
            let cancel = cancel_on_ctrl_c();
            let report = client
                .write_schedule(&schedule, &mut LogProgress::new("Write to device"), &cancel)
                .await?;

            if !report.dropped_rows.is_empty() {
                warn!(
                    "Skipped incomplete rows (major, minor, time and command are required): {:?}",
                    report.dropped_rows
                );
            }
            println!(
                "Wrote {} actions, cleared {} slots",
                report.written, report.cleared
            );
        }
        Commands::Verbose => client.set_verbose().await?,
        Commands::Reset => {
            client.reset().await?;
            println!("Reset requested; press the reset button if the device does not restart");
        }
    }

    Ok(())
}

async fn run_action(client: &TimerClient, command: ActionCommands) -> Result<()> {
    match command {
        ActionCommands::Get { index } => {
            let action = client.get_action(index).await?;
            println!("{:>4}  {}", index, ScheduleRow::from_action(&action));
        }
        ActionCommands::Set {
            index,
            major,
            minor,
            time,
            command,
            date,
            weekday,
        } => {
            let mut row = ScheduleRow {
                major: Some(major),
                minor: Some(minor),
                command: Some(command.into()),
                ..ScheduleRow::default()
            };
            row.set_field(Column::Time, &time)?;
            row.set_field(Column::Date, date.as_deref().unwrap_or(""))?;
            row.set_field(Column::Weekday, weekday.as_deref().unwrap_or(""))?;

            let action = row
                .to_action()?
                .ok_or_else(|| eyre!("action is missing a required field"))?;
            client.set_action(index, &action).await?;
            info!("Slot {} set to {}", index, row);
        }
        ActionCommands::Clear { index } => {
            client.set_action(index, &Action::EMPTY).await?;
            info!("Slot {} cleared", index);
        }
    }
    Ok(())
}

/// Raise the returned flag when Ctrl-C is pressed
fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current slot");
            flag.cancel();
        }
    });
    cancel
}

fn print_ports() -> Result<()> {
    for port in list_ports()? {
        println!("{:<20} {}", port.name, port.kind);
    }
    Ok(())
}

fn print_schedule(schedule: &Schedule) {
    println!(
        "{:>4}  {:<5} {:<5} {:<10} {:<9} {:<5} {}",
        "Slot", "Major", "Minor", "Date", "Weekday", "Time", "Command"
    );
    for (index, row) in schedule.rows().iter().enumerate() {
        if !row.is_empty() {
            println!("{:>4}  {}", index, row);
        }
    }
}
