// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! Operator console - line commands on stdin

use std::sync::Arc;
use anyhow::Result;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::control::{ManualOutcome, ThresholdConfig, ValveMode};
use crate::core::Session;
use crate::db::StoreStats;
use crate::link;

pub const HELP: &str = "\
commands:
  mode auto|manual              switch valve control mode
  valve open|close              manual valve command (manual mode only)
  threshold                     show thresholds
  threshold <temp> <hum> <lux>  set all thresholds
  threshold temp|humidity|light <value>
  link open [port] | link close
  detect start|stop
  report                        record and publish the current readings now
  status
  ports                         list serial ports
  help
  quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdField {
    Temperature,
    Humidity,
    Light,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Mode(ValveMode),
    Valve(bool),
    ShowThresholds,
    SetThresholds(ThresholdConfig),
    SetThreshold(ThresholdField, f64),
    LinkOpen(Option<String>),
    LinkClose,
    DetectStart,
    DetectStop,
    Report,
    Status,
    Ports,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("unknown command {0:?}, try 'help'")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("not a number: {0:?}")]
    NotANumber(String),
}

fn number(s: &str) -> Result<f64, ParseError> {
    s.parse::<f64>().map_err(|_| ParseError::NotANumber(s.to_string()))
}

impl ConsoleCommand {
    /// Parse one input line. Blank lines give `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&head, args)) = words.split_first() else {
            return Ok(None);
        };

        let command = match (head.to_ascii_lowercase().as_str(), args) {
            ("mode", ["auto"]) => Self::Mode(ValveMode::Auto),
            ("mode", ["manual"]) => Self::Mode(ValveMode::Manual),
            ("mode", _) => return Err(ParseError::Usage("mode auto|manual")),

            ("valve", ["open"]) => Self::Valve(true),
            ("valve", ["close"]) => Self::Valve(false),
            ("valve", _) => return Err(ParseError::Usage("valve open|close")),

            ("threshold", []) => Self::ShowThresholds,
            ("threshold", [field, value]) => {
                let field = match *field {
                    "temp" | "temperature" => ThresholdField::Temperature,
                    "hum" | "humidity" => ThresholdField::Humidity,
                    "light" | "lux" => ThresholdField::Light,
                    _ => return Err(ParseError::Usage("threshold temp|humidity|light <value>")),
                };
                Self::SetThreshold(field, number(value)?)
            }
            ("threshold", [temp, humidity, light]) => Self::SetThresholds(ThresholdConfig {
                temp_max: number(temp)?,
                humidity_max: number(humidity)?,
                light_max: number(light)?,
            }),
            ("threshold", _) => return Err(ParseError::Usage("threshold [<temp> <hum> <lux>]")),

            ("link", ["open"]) => Self::LinkOpen(None),
            ("link", ["open", port]) => Self::LinkOpen(Some(port.to_string())),
            ("link", ["close"]) => Self::LinkClose,
            ("link", _) => return Err(ParseError::Usage("link open [port] | link close")),

            ("detect", ["start"]) => Self::DetectStart,
            ("detect", ["stop"]) => Self::DetectStop,
            ("detect", _) => return Err(ParseError::Usage("detect start|stop")),

            ("report", []) => Self::Report,
            ("status", []) => Self::Status,
            ("ports", []) => Self::Ports,
            ("help" | "?", _) => Self::Help,
            ("quit" | "exit", _) => Self::Quit,
            _ => return Err(ParseError::Unknown(line.trim().to_string())),
        };
        Ok(Some(command))
    }
}

/// Run one command against the session and describe the outcome
pub async fn execute(session: &Session, command: ConsoleCommand) -> Result<String> {
    let reply = match command {
        ConsoleCommand::Mode(mode) => {
            session.set_mode(mode).await;
            format!("mode: {}", mode)
        }
        ConsoleCommand::Valve(open) => match session.set_manual(open).await? {
            ManualOutcome::Applied => format!("valve {}", if open { "opened" } else { "closed" }),
            ManualOutcome::Unchanged => format!("valve already {}", if open { "open" } else { "closed" }),
        },
        ConsoleCommand::ShowThresholds => describe_thresholds(&session.engine().thresholds()),
        ConsoleCommand::SetThresholds(thresholds) => {
            session.set_thresholds(thresholds).await?;
            describe_thresholds(&thresholds)
        }
        ConsoleCommand::SetThreshold(field, value) => {
            let mut thresholds = session.engine().thresholds();
            match field {
                ThresholdField::Temperature => thresholds.temp_max = value,
                ThresholdField::Humidity => thresholds.humidity_max = value,
                ThresholdField::Light => thresholds.light_max = value,
            }
            session.set_thresholds(thresholds).await?;
            describe_thresholds(&thresholds)
        }
        ConsoleCommand::LinkOpen(port) => {
            session.open_link(port).await?;
            format!("link open: {}", session.link_name().await.unwrap_or_default())
        }
        ConsoleCommand::LinkClose => {
            if session.close_link().await { "link closed".to_string() } else { "link was not open".to_string() }
        }
        ConsoleCommand::DetectStart => {
            session.start_detection().await?;
            "detection started".to_string()
        }
        ConsoleCommand::DetectStop => {
            if session.stop_detection().await {
                "detection stopped".to_string()
            } else {
                "detection was not running".to_string()
            }
        }
        ConsoleCommand::Report => {
            session.report_now().await?;
            "report published".to_string()
        }
        ConsoleCommand::Status => {
            let status = session.status().await;
            let s = &status.sensors;
            format!(
                "link: {}\ndetection: {}\nvalve: {} ({} mode, changed {}s ago)\n{}\ntemperature {:?} humidity {:?} light {:?} pir {:?} gas {:?}\n{}",
                status.link.as_deref().unwrap_or("closed"),
                if status.detection_running { "running" } else { "stopped" },
                if status.valve.is_open { "open" } else { "closed" },
                status.valve.mode,
                session.engine().since_last_change().num_seconds(),
                describe_thresholds(&status.thresholds),
                s.temperature,
                s.humidity,
                s.light,
                s.pir,
                s.gas,
                describe_store(status.store.as_ref()),
            )
        }
        ConsoleCommand::Ports => {
            let ports = link::available_ports();
            if ports.is_empty() {
                "no serial ports found".to_string()
            } else {
                ports.iter().map(|p| format!("{}  {}", p.name, p.kind)).collect::<Vec<_>>().join("\n")
            }
        }
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit => "bye".to_string(),
    };
    Ok(reply)
}

fn describe_store(stats: Option<&StoreStats>) -> String {
    match stats {
        Some(s) => format!(
            "stored: {} reading(s), {} valve op(s), {} user op(s), {} people count(s)",
            s.sensor_rows, s.valve_rows, s.user_rows, s.people_rows
        ),
        None => "stored: unavailable".to_string(),
    }
}

fn describe_thresholds(t: &ThresholdConfig) -> String {
    format!(
        "thresholds: temperature > {} humidity > {} light > {}",
        t.temp_max, t.humidity_max, t.light_max
    )
}

/// Read commands from stdin until `quit` or end of input
pub async fn run_console(session: Arc<Session>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", HELP);

    while let Some(line) = lines.next_line().await? {
        let command = match ConsoleCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        debug!("Console command: {:?}", command);

        let quit = command == ConsoleCommand::Quit;
        match execute(&session, command).await {
            Ok(reply) => println!("{}", reply),
            Err(e) => println!("error: {:#}", e),
        }
        if quit {
            break;
        }
    }

    info!("Console closed");
    Ok(())
}
