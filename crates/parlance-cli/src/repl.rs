//! Interactive chat loop and its slash commands.

use std::io::Write;

use anyhow::Result;
use parlance_config::ProviderKind;
use parlance_core::chat::connect_provider;
use parlance_core::{ChatEvent, ChatSession, Conversation};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::App;
use crate::output;

const HELP: &str = "\
/model <id>        switch model
/provider <name>   switch provider (openai, anthropic, gemini, mistral)
/clear             clear this conversation's messages
/budget            show what the next request would send
/help              show this help
/quit              leave";

/// A parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Model(String),
    Provider(ProviderKind),
    Clear,
    Budget,
    Help,
    Quit,
}

impl SlashCommand {
    /// Parse a line. `None` when the line is not a command.
    pub fn parse(line: &str) -> Option<Result<Self, String>> {
        let line = line.trim();
        let rest = line.strip_prefix('/')?;
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let parsed = match name {
            "model" if arg.is_empty() => Err("usage: /model <id>".to_string()),
            "model" => Ok(SlashCommand::Model(arg.to_string())),
            "provider" if arg.is_empty() => Err("usage: /provider <name>".to_string()),
            "provider" => arg
                .parse::<ProviderKind>()
                .map(SlashCommand::Provider)
                .map_err(|e| e.to_string()),
            "clear" => Ok(SlashCommand::Clear),
            "budget" => Ok(SlashCommand::Budget),
            "help" | "?" => Ok(SlashCommand::Help),
            "quit" | "exit" | "q" => Ok(SlashCommand::Quit),
            other => Err(format!("unknown command /{other}, try /help")),
        };
        Some(parsed)
    }
}

/// Run the interactive loop until `/quit` or end of input.
pub async fn run(
    app: &mut App,
    mut session: ChatSession,
    mut conversation: Conversation,
) -> Result<()> {
    println!(
        "{} / {}  ({})  type /help for commands",
        session.provider_name(),
        session.model(),
        conversation.display_title()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match SlashCommand::parse(&line) {
            Some(Ok(SlashCommand::Quit)) => break,
            Some(Ok(command)) => {
                handle_command(app, &mut session, &mut conversation, command).await?
            }
            Some(Err(message)) => eprintln!("{message}"),
            None if line.trim().is_empty() => continue,
            None => {
                conversation.model = session.model().to_string();
                conversation.provider = session.provider_kind();
                let reply = session.send(&mut conversation, &line).await?;
                app.conversations.save(&conversation).await?;
                app.remember_conversation(&conversation).await?;
                if reply.error {
                    eprintln!("error: {}", reply.content);
                } else {
                    println!("\n{}\n", reply.content);
                }
            }
        }
    }

    Ok(())
}

async fn handle_command(
    app: &mut App,
    session: &mut ChatSession,
    conversation: &mut Conversation,
    command: SlashCommand,
) -> Result<()> {
    match command {
        SlashCommand::Model(model) => {
            if !session.budgeter().models().contains(&model) {
                warn!(model = %model, "model not in catalog, default context window applies");
            }
            session.set_model(model.clone());
            app.preferences.model = model;
            app.conversations.save_preferences(&app.preferences).await?;
            println!("model: {}", session.model());
        }
        SlashCommand::Provider(kind) => match connect_provider(&app.config, kind) {
            Ok(provider) => {
                session.set_provider(provider);
                app.preferences.provider = kind;
                app.preferences.model.clear();
                app.conversations.save_preferences(&app.preferences).await?;
                println!("provider: {} / {}", session.provider_name(), session.model());
            }
            Err(e) => eprintln!("{e}"),
        },
        SlashCommand::Clear => {
            conversation.clear();
            app.conversations.save(conversation).await?;
            session.events().publish(ChatEvent::ContextCleared {
                conversation: conversation.id,
            });
            println!("context cleared");
        }
        SlashCommand::Budget => {
            print!("{}", output::budget_report(&session.preview(conversation), session.model()));
        }
        SlashCommand::Help => println!("{HELP}"),
        SlashCommand::Quit => {}
    }
    Ok(())
}
