//! `slothtop chat`: interactive mode.

use std::io::Write;

use chrono::Local;
use slothtop_agent::{Session, TraceKind};
use slothtop_config::SettingField;
use slothtop_core::message::Turn;
use slothtop_core::provider::Provider;
use tokio::io::{self, AsyncBufReadExt, BufReader};

use super::Runtime;

/// A parsed input line.
#[derive(Debug, PartialEq)]
enum Input<'a> {
    Message(&'a str),
    Model(&'a str),
    Models,
    Set(&'a str, &'a str),
    Settings,
    Tools,
    Reconnect,
    Trace,
    Help,
    Exit,
    Unknown(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    if matches!(line, "exit" | "quit") {
        return Input::Exit;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line);
    };
    let (head, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
    let rest = rest.trim();
    match head {
        "model" if !rest.is_empty() => Input::Model(rest),
        "models" => Input::Models,
        "set" => match rest.split_once(char::is_whitespace) {
            Some((field, value)) => Input::Set(field, value.trim()),
            None => Input::Unknown(line),
        },
        "settings" => Input::Settings,
        "tools" => Input::Tools,
        "reconnect" => Input::Reconnect,
        "trace" => Input::Trace,
        "help" => Input::Help,
        "exit" | "quit" => Input::Exit,
        _ => Input::Unknown(line),
    }
}

fn print_turn(turn: &Turn) {
    let time = turn.timestamp.with_timezone(&Local).format("%H:%M");
    for line in turn.text.lines() {
        println!("  [{time}] {} > {line}", turn.name);
    }
}

fn print_help() {
    println!("  /model <name>        switch model");
    println!("  /models              list installed models");
    println!("  /set <field> <value> change a setting");
    println!("  /settings            show settings");
    println!("  /tools               list tools");
    println!("  /reconnect           retry the backend");
    println!("  /trace               show the last tool trace");
    println!("  /exit                quit");
}

fn print_settings(session: &Session) {
    let settings = session.settings();
    for field in SettingField::ALL {
        println!("  {:<18} {}", field.as_str(), settings.get(field));
    }
}

fn print_trace(session: &Session) {
    let Some(result) = session.last_result() else {
        println!("  No messages yet.");
        return;
    };
    if result.trace.is_empty() {
        println!("  No tool calls (rounds: {}).", result.rounds);
        return;
    }
    for (i, entry) in result.trace.iter().enumerate() {
        let kind = match entry.kind {
            TraceKind::ToolCall => "call",
            TraceKind::UnknownTool => "unknown",
            TraceKind::ParseError => "parse error",
        };
        println!("  {}. [{kind}] {} {}", i + 1, entry.tool, entry.input);
        println!("     -> {}", entry.output);
    }
    println!("  Stopped: {:?} after {} round(s)", result.stop, result.rounds);
}

async fn print_models(provider: &dyn Provider, current: &str) {
    match provider.list_models().await {
        Ok(models) if models.is_empty() => println!("  The backend does not list its models."),
        Ok(models) => {
            for m in models {
                let marker = if slothtop_core::provider::model_matches(std::slice::from_ref(&m), current) {
                    "*"
                } else {
                    " "
                };
                println!("  {marker} {m}");
            }
        }
        Err(e) => eprintln!("  [Error] {e}"),
    }
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load()?;
    let provider = runtime.provider()?;
    let mut session = runtime.open_session(provider.clone()).await?;

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║          Slothtop — Interactive Mode          ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Backend:   {}", session.backend_name());
    println!("  Model:     {}", session.settings().model);
    println!("  Agent:     {}", session.settings().name);
    println!("  Tools:     {}", session.tools().names().join(", "));
    println!("  Settings:  {}", session.store().path().display());
    if let Some(e) = session.build_error() {
        println!();
        eprintln!("  [Offline] {e}");
        println!("  Start the backend and type /reconnect.");
    }
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type /help for commands, /exit or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_input(&line) {
            Input::Exit => break,
            Input::Message(text) => {
                eprint!("  Thinking...");
                let result = session.send(text).await;
                eprint!("\r              \r");
                match result {
                    Ok(_) => {
                        if let Some(turn) = session.conversation().turns().last() {
                            print_turn(turn);
                        }
                    }
                    Err(e) => eprintln!("  [Error] {e}"),
                }
            }
            Input::Model(model) => match session.switch_model(model).await {
                Ok(_) => println!("  Switched to {model}."),
                Err(e) => eprintln!("  [Error] {e}"),
            },
            Input::Models => print_models(provider.as_ref(), &session.settings().model).await,
            Input::Set(field, value) => match session.set_from_str(field, value).await {
                Ok(settings) => {
                    let shown = field
                        .parse::<SettingField>()
                        .map(|f| settings.get(f).to_string())
                        .unwrap_or_else(|_| value.to_string());
                    println!("  {field} = {shown}");
                }
                Err(e) => eprintln!("  [Error] {e}"),
            },
            Input::Settings => print_settings(&session),
            Input::Tools => println!("  {}", session.tools().names().join(", ")),
            Input::Reconnect => match session.reconnect().await {
                Ok(()) => println!("  Connected to {} ({}).", session.backend_name(), session.settings().model),
                Err(e) => eprintln!("  [Error] {e}"),
            },
            Input::Trace => print_trace(&session),
            Input::Help => print_help(),
            Input::Unknown(cmd) => eprintln!("  Unknown command: {cmd} (try /help)"),
        }
        println!();
    }

    runtime.monitors.stop_all().await;
    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
