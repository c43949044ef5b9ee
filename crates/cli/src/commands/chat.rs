//! `lakeclaw chat`: interactive or single-message conversation.

use lakeclaw_agent::{ConversationState, OrchestrationOutcome, Orchestrator};
use lakeclaw_gateway::Runtime;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

pub async fn run(message: Option<String>, session: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let runtime = Runtime::from_config(config)?;

    let Some(orchestrator) = runtime.orchestrator.clone() else {
        eprintln!();
        eprintln!("  ERROR: No reasoning engine configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENAI_API_KEY     = 'sk-...'       (provider \"openai\")");
        eprintln!("    ANTHROPIC_API_KEY  = 'sk-ant-...'   (provider \"anthropic\")");
        eprintln!("    LAKECLAW_API_KEY   = '...'          (generic)");
        eprintln!();
        eprintln!("  Or set LAKECLAW_PROVIDER=databricks to use a serving endpoint");
        eprintln!("  with your workspace token.");
        eprintln!();
        return Err("No reasoning engine available. See above for setup instructions.".into());
    };

    if let Some(msg) = message {
        eprint!("  Thinking...");
        let outcome = run_turn(&orchestrator, ConversationState::new(msg), &session).await;
        eprint!("\r              \r");
        println!("{}", outcome.reply());
        return Ok(());
    }

    println!();
    println!("  LakeClaw: interactive mode");
    println!();
    println!("  Engine:   {} / {}", runtime.config.default_provider, runtime.config.default_model);
    println!("  Tools:    {} actions", runtime.catalog.len());
    println!("  Session:  {session}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Ctrl+C stops the current turn; 'exit' quits.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut state: Option<ConversationState> = None;

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        let next = match state.take() {
            Some(previous) => previous.continue_with(line),
            None => ConversationState::new(line),
        };

        eprint!("  ...");
        let outcome = run_turn(&orchestrator, next, &session).await;
        eprint!("\r     \r");
        println!();
        for reply_line in outcome.reply().lines() {
            println!("  Assistant > {reply_line}");
        }
        println!();
        state = Some(outcome.state);
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Run one user turn. Ctrl+C cancels the turn, not the process.
async fn run_turn(orchestrator: &Orchestrator, state: ConversationState, session: &str) -> OrchestrationOutcome {
    let cancel = CancellationToken::new();
    let turn = orchestrator.run(state, session, &cancel);
    tokio::pin!(turn);

    tokio::select! {
        outcome = &mut turn => outcome,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            turn.await
        }
    }
}
