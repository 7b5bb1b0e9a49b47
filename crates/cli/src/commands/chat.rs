//! `turnstone chat` — Interactive session or single-message mode.

use super::engine::build_runner;
use std::io::{BufRead, Write};
use std::sync::Arc;
use turnstone_agent::CancelHandle;
use turnstone_config::AppConfig;
use turnstone_core::{DomainEvent, EventBus, SessionId};

pub async fn run(
    message: Option<String>,
    session: Option<String>,
    trace_json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;

    let session_id = match session {
        Some(s) => SessionId::from(&s),
        None => SessionId::new(),
    };
    let event_bus = Arc::new(EventBus::default());
    let runner = build_runner(&config, &session_id, event_bus.clone())?;

    spawn_progress_listener(event_bus);

    if let Some(message) = message {
        let outcome = runner
            .run(session_id, &message, &CancelHandle::new())
            .await?;
        println!("{}", outcome.final_response);
        if trace_json {
            eprintln!("{}", serde_json::to_string_pretty(&outcome.trace)?);
        }
        return Ok(());
    }

    // Interactive mode: one session, many turns.
    println!("Turnstone — session {session_id}");
    println!("Type a message, or 'exit' to quit.\n");

    let stdin = std::io::stdin();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        match runner
            .run(session_id.clone(), input, &CancelHandle::new())
            .await
        {
            Ok(outcome) => {
                println!("\n{}\n", outcome.final_response);
                if trace_json {
                    eprintln!("{}", serde_json::to_string_pretty(&outcome.trace)?);
                }
            }
            Err(e) => eprintln!("\nTurn failed: {e}\n"),
        }
    }

    Ok(())
}

/// Render tool activity on stderr as a side channel; these lines never
/// enter the conversation.
fn spawn_progress_listener(event_bus: Arc<EventBus>) {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event.as_ref() {
                DomainEvent::ToolStarted { tool_name, .. } => {
                    eprintln!("  … running {tool_name}");
                }
                DomainEvent::ToolExecuted {
                    tool_name,
                    success,
                    duration_ms,
                    ..
                } => {
                    let mark = if *success { "✓" } else { "✗" };
                    eprintln!("  {mark} {tool_name} ({duration_ms}ms)");
                }
                DomainEvent::ContextCompressed {
                    messages_before,
                    messages_after,
                    ..
                } => {
                    eprintln!("  ⇣ context compressed {messages_before} → {messages_after} messages");
                }
                _ => {}
            }
        }
    });
}
