//! Terminal conversation with the assistant. Sessions live in memory and
//! vanish with the process; orders and turns still reach the journals.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use pizzabot_agent::{build_controller, DialogueController, TurnContext};
use pizzabot_core::audit::NoopAuditSink;
use pizzabot_core::config::LoadOptions;
use pizzabot_core::domain::session::SessionId;
use pizzabot_db::{InMemorySessionStore, JsonlJournal, RepositoryError, SessionStore};
use uuid::Uuid;

use crate::commands::{init_logging, load_config, runtime, CommandResult};

/// Opening message, the same one the web page sends on load.
pub const WELCOME: &str = "!welcome";

pub fn run(options: &LoadOptions, session: &str) -> CommandResult {
    let config = match load_config("chat", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    init_logging(&config);
    let runtime = match runtime("chat") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let journal = Arc::new(JsonlJournal::from_config(&config.journal));
        let controller =
            build_controller(&config, journal.clone(), journal, Arc::new(NoopAuditSink)).await?;
        let store = InMemorySessionStore::new(config.dialogue.session_ttl());
        let session_id = SessionId(session.to_string());
        chat_loop(&controller, &store, &session_id, io::stdin().lock(), io::stdout().lock()).await
    });

    match result {
        Ok(_) => CommandResult::text(String::new()),
        Err(error) => CommandResult::failure("chat", "chat_failed", error.to_string(), 4),
    }
}

/// Greets, then answers one line at a time until EOF or `/quit`. Returns
/// the number of user turns handled.
pub async fn chat_loop<R: BufRead, W: Write>(
    controller: &DialogueController,
    store: &dyn SessionStore,
    session_id: &SessionId,
    mut input: R,
    mut output: W,
) -> anyhow::Result<usize> {
    let greeting = turn(controller, store, session_id, WELCOME).await?;
    writeln!(output, "Mario: {greeting}\n")?;

    let mut turns = 0;
    loop {
        write!(output, "> ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "/quit" | "/exit") {
            break;
        }

        let reply = turn(controller, store, session_id, text).await?;
        writeln!(output, "Mario: {reply}\n")?;
        turns += 1;
    }
    Ok(turns)
}

async fn turn(
    controller: &DialogueController,
    store: &dyn SessionStore,
    session_id: &SessionId,
    text: &str,
) -> Result<String, RepositoryError> {
    let mut state = store.load(session_id).await?;
    let context = TurnContext::new(session_id.clone(), Uuid::new_v4().to_string(), "cli");
    let reply = controller.handle_turn(&context, &mut state, text).await;
    store.save(session_id, &state).await?;
    Ok(reply)
}
