use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use crossterm::style::Stylize;
use genclock::transport::serial::available_ports;
use genclock::{
    prepare, AlignmentMode, ControllerProfile, Executor, PreparedWrite, SerialModbus, Status,
    SystemClock, TransactionOutcome, Zone,
};

mod cli;

use cli::Cli;

// The main entry point for the command-line clock setter.
fn main() -> ExitCode {
    let cli = Cli::parse();

    let _logger = match genclock::logging::init_logging(&cli.log_level) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("[WARNING] Logging disabled: {}", e);
            None
        }
    };

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[ERROR] {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    if cli.list_ports {
        let ports = available_ports()?;
        if ports.is_empty() {
            eprintln!("[ERROR] No serial ports found.");
        }
        for port in &ports {
            println!("{}", port);
        }
        return Ok(ExitCode::from(list_ports_exit_code(&ports)));
    }

    println!("===============================");
    println!("  Generator Controller Clock   ");
    println!("===============================");

    let zone = match cli.zone {
        Some(zone) => zone,
        None => pick_zone()?,
    };
    let profile = cli.profile();

    let mut prepared = prepare_announced(cli, zone, profile)?;

    println!("\nUsing timezone: {}", zone);
    println!("Controller:     {}", profile);
    println!("Target time:    {}", prepared.target);
    println!("Registers:      {}", prepared.frame);

    if cli.dry_run {
        println!("Dry run, nothing written.");
        return Ok(ExitCode::SUCCESS);
    }
    if !cli.yes {
        if !confirm("Write this time to controller? (yes/no): ")? {
            println!("Cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
        // The answer may have taken a while; sample the clock again.
        if cli.alignment() == AlignmentMode::TopOfMinute {
            println!("Waiting for the top of the minute...");
        }
        prepared = prepared
            .refresh(&SystemClock, cli.alignment())
            .context("the current time cannot be encoded for this controller")?;
        println!("Target time:    {}", prepared.target);
        println!("Registers:      {}", prepared.frame);
    }

    let serial = cli.serial_config();
    let executor = Executor::new(cli.executor_config());
    println!(
        "Writing to unit {} on {} at {} baud, reading back after {}s...",
        executor.config().unit_id,
        serial.port,
        serial.baud_rate,
        executor.config().settle_delay.as_secs()
    );

    let port = serial.port.clone();
    let mut link = SerialModbus::new(serial);
    let outcome = prepared
        .apply(&executor, &mut link)
        .with_context(|| format!("cannot talk to the controller on {}", port))?;

    print_outcome(&outcome);
    Ok(ExitCode::from(status_exit_code(outcome.status)))
}

fn list_ports_exit_code(ports: &[String]) -> u8 {
    if ports.is_empty() {
        1
    } else {
        0
    }
}

fn status_exit_code(status: Status) -> u8 {
    match status {
        Status::Confirmed => 0,
        Status::Mismatch => 1,
        Status::Unverifiable => 3,
    }
}

fn prepare_announced(
    cli: &Cli,
    zone: Zone,
    profile: ControllerProfile,
) -> anyhow::Result<PreparedWrite> {
    if cli.alignment() == AlignmentMode::TopOfMinute {
        println!("Waiting for the top of the minute...");
    }
    prepare(&SystemClock, zone, profile, cli.alignment())
        .context("the current time cannot be encoded for this controller")
}

// Prompts for a timezone from the curated menu.
fn pick_zone() -> anyhow::Result<Zone> {
    println!("Select timezone:");
    for zone in Zone::ALL {
        println!("  {}) {}", zone.menu_key(), zone);
    }
    let default = Zone::default();
    let choice = prompt(&format!(
        "Choice [{}={}]: ",
        default.menu_key(),
        default.label()
    ))?;

    Ok(Zone::from_menu_choice(&choice).unwrap_or_else(|| {
        eprintln!("[WARNING] Invalid choice. Using {}.", default.label());
        default
    }))
}

fn confirm(question: &str) -> anyhow::Result<bool> {
    let answer = prompt(question)?.trim().to_ascii_lowercase();
    Ok(matches!(answer.as_str(), "y" | "yes"))
}

fn prompt(question: &str) -> anyhow::Result<String> {
    print!("{}", question);
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        bail!("standard input closed before an answer was given");
    }
    Ok(line)
}

fn print_outcome(outcome: &TransactionOutcome) {
    println!();
    println!("{}", outcome);
    let verdict = match outcome.status {
        Status::Confirmed => "Clock set and confirmed by read-back.".green().bold(),
        Status::Mismatch => "Write may not have taken effect.".red().bold(),
        Status::Unverifiable => "Write sent, but the controller could not be read back."
            .yellow()
            .bold(),
    };
    println!("{}", verdict);
}
