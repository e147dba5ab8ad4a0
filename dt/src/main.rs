//! Daytrip - one-day walking route planner
//!
//! CLI entry point: plan from flags, plan through a guided chat, list tags.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use daytrip::chat::{ChatPhase, ChatPrompt, Sender};
use daytrip::cli::{Cli, Command, OutputArgs, StartArgs};
use daytrip::config::{Config, DevicePosition};
use daytrip::domain::{DataSource, Itinerary, PreferenceSet, parse_trip_date};
use daytrip::service::InputKind;
use daytrip::session::{BuildOutcome, TripSession};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Logging is not up yet, so nothing in here can log
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("daytrip")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file = fs::File::create(log_dir.join("daytrip.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    info!(city = %config.geo.city, offline = cli.offline, "Daytrip loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Plan {
            date,
            tags,
            budget,
            pace,
            city,
            start,
            output,
        } => {
            debug!(%date, ?tags, "main: matched Plan command");
            let mut prefs = PreferenceSet::new();
            prefs.set("date", date);
            if let Some(city) = city {
                prefs.set("city", city);
            }
            if let Some(budget) = budget {
                prefs.set("budget", budget);
            }
            if let Some(pace) = pace {
                prefs.set("pace", pace);
            }
            cmd_plan(config, cli.offline, prefs, tags, start, output).await
        }
        Command::Chat {
            date,
            city,
            start,
            output,
        } => {
            debug!(?date, "main: matched Chat command");
            let mut known = PreferenceSet::new();
            if let Some(date) = date {
                if parse_trip_date(&date).is_none() {
                    return Err(eyre::eyre!("Invalid --date '{}', expected YYYY-MM-DD", date));
                }
                known.set("date", date);
            }
            if let Some(city) = city {
                known.set("city", city);
            }
            cmd_chat(config, cli.offline, known, start, output).await
        }
        Command::Tags { normalize } => {
            debug!(?normalize, "main: matched Tags command");
            cmd_tags(config, cli.offline, normalize).await
        }
    }
}

/// Session starting at the device position from flags or config, if any
async fn open_session(mut config: Config, offline: bool, start: &StartArgs) -> Result<TripSession> {
    debug!(?start, "open_session: called");
    if let (Some(lat), Some(lon)) = (start.lat, start.lon) {
        config.geo.device = Some(DevicePosition {
            lat,
            lon,
            accuracy_m: start.accuracy,
        });
    }
    if start.radius.is_some() {
        config.planning.radius_m = start.radius;
    }
    let has_start = config.geo.device.is_some();

    let session = TripSession::from_config(config, offline).context("Failed to start trip session")?;
    if has_start && session.use_device().await.is_none() {
        println!("{} Could not use the given start position, starting from the city center", "!".yellow());
    }
    Ok(session)
}

async fn cmd_plan(
    config: Config,
    offline: bool,
    mut prefs: PreferenceSet,
    tags: Vec<String>,
    start: StartArgs,
    output: OutputArgs,
) -> Result<()> {
    debug!(fields = prefs.len(), "cmd_plan: called");
    let session = open_session(config, offline, &start).await?;
    if !tags.is_empty() {
        prefs.set("tags", session.normalize_tags(&tags).await);
    }
    let result = build_and_report(&session, &prefs, &output).await;
    session.shutdown();
    result
}

async fn cmd_chat(
    config: Config,
    offline: bool,
    known: PreferenceSet,
    start: StartArgs,
    output: OutputArgs,
) -> Result<()> {
    debug!(fields = known.len(), "cmd_chat: called");
    let session = open_session(config, offline, &start).await?;
    if !known.is_empty() {
        session.chat().await.preload(known);
    }
    let result = run_chat(&session).await;
    let result = match result {
        Ok(Some(prefs)) => build_and_report(&session, &prefs, &output).await,
        Ok(None) => {
            println!("{}", "Chat ended before the preferences were complete.".dimmed());
            Ok(())
        }
        Err(e) => Err(e),
    };
    session.shutdown();
    result
}

/// Drive the chat from stdin until the assistant declares the preferences ready
async fn run_chat(session: &TripSession) -> Result<Option<PreferenceSet>> {
    debug!("run_chat: called");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown = 0;

    session.chat_open().await.context("Failed to start the chat")?;
    loop {
        let (phase, prompt, ready) = {
            let chat = session.chat().await;
            let state = chat.state();
            for turn in &state.turns()[shown..] {
                match turn.sender {
                    Sender::Assistant => println!("{} {}", "assistant>".cyan(), turn.text),
                    Sender::User => println!("{} {}", "you>".dimmed(), turn.text.dimmed()),
                }
            }
            shown = state.turns().len();
            (state.phase(), state.prompt().cloned(), state.ready_prefs().cloned())
        };

        if phase == ChatPhase::Ready {
            return Ok(ready);
        }
        if let Some(prompt) = &prompt {
            print_prompt(prompt);
        }

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            return Ok(None);
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            return Ok(None);
        }

        let result = match &prompt {
            Some(p) if p.input_kind == InputKind::Multiselect && !p.options.is_empty() => {
                let mut result = Ok(());
                for pick in line.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    result = session.chat_toggle(resolve_option(p, pick)).await;
                    if result.is_err() {
                        break;
                    }
                }
                match result {
                    Ok(()) => session.chat_confirm().await,
                    Err(e) => Err(e),
                }
            }
            Some(p) if p.input_kind == InputKind::Single && !p.options.is_empty() => {
                session.chat_choose(resolve_option(p, line)).await
            }
            _ => session.chat_send(line).await,
        };
        if let Err(e) = result {
            println!("{} {}", "!".yellow(), e);
        }
    }
}

fn print_prompt(prompt: &ChatPrompt) {
    if prompt.options.is_empty() {
        return;
    }
    for (idx, option) in prompt.options.iter().enumerate() {
        println!("  {} {}", format!("{}.", idx + 1).yellow(), option);
    }
    if prompt.input_kind == InputKind::Multiselect {
        println!("{}", "Pick one or more, separated by commas".dimmed());
    }
}

/// Accept an option by its number or its text
fn resolve_option(prompt: &ChatPrompt, input: &str) -> String {
    input
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|idx| prompt.options.get(idx))
        .cloned()
        .unwrap_or_else(|| input.to_string())
}

async fn build_and_report(session: &TripSession, prefs: &PreferenceSet, output: &OutputArgs) -> Result<()> {
    debug!(fields = prefs.len(), "build_and_report: called");
    let itinerary = match session.build(prefs).await.context("Could not build the itinerary")? {
        BuildOutcome::Updated(itinerary) => itinerary,
        BuildOutcome::Ignored => {
            println!("{}", "Build was cancelled.".dimmed());
            return Ok(());
        }
    };

    if output.json {
        println!("{}", serde_json::to_string_pretty(itinerary.as_ref())?);
    } else {
        print_itinerary(&itinerary);
    }

    if output.explain {
        println!();
        println!("{}", session.explain(prefs).await);
    }

    if let Some(path) = &output.ics {
        match session.export_calendar() {
            Some(ics) => {
                fs::write(path, ics).context(format!("Failed to write calendar to {}", path.display()))?;
                println!("{} Calendar written to {}", "✓".green(), path.display().to_string().cyan());
            }
            None => println!("{}", "Nothing to export: the itinerary is empty.".dimmed()),
        }
    }
    Ok(())
}

fn print_itinerary(itinerary: &Itinerary) {
    let source = match itinerary.data_source {
        DataSource::Provider => "live".green(),
        DataSource::Seed => "demo".yellow(),
    };
    println!(
        "{} {} ({}, {})",
        itinerary.city.bold(),
        itinerary.date.format("%Y-%m-%d"),
        source,
        itinerary.total_time_display()
    );
    for warning in &itinerary.warnings {
        println!("{} {}", "!".yellow(), warning);
    }
    if itinerary.is_empty() {
        println!("{}", "No stops found, try other interests.".dimmed());
        return;
    }
    for (idx, stop) in itinerary.stops.iter().enumerate() {
        let times = match (stop.arrive, stop.leave) {
            (Some(a), Some(l)) => format!("{}-{}", a.format("%H:%M"), l.format("%H:%M")),
            (Some(a), None) => a.format("%H:%M").to_string(),
            _ => String::new(),
        };
        println!(
            "{:>3}. {} {}",
            idx + 1,
            stop.name.cyan(),
            times.dimmed()
        );
        if let Some(description) = &stop.description {
            println!("     {}", description);
        }
    }
    println!(
        "{} {:.1} km walking{}",
        "route:".dimmed(),
        itinerary.route.total_distance_m() / 1000.0,
        if itinerary.route.used_fallback { " (straight-line estimate)" } else { "" }
    );
}

async fn cmd_tags(config: Config, offline: bool, normalize: Vec<String>) -> Result<()> {
    debug!(?normalize, "cmd_tags: called");
    let session = TripSession::from_config(config, offline).context("Failed to start trip session")?;
    let tags = if normalize.is_empty() {
        session.tags().await
    } else {
        session.normalize_tags(&normalize).await
    };
    for tag in tags {
        println!("{}", tag);
    }
    session.shutdown();
    Ok(())
}
