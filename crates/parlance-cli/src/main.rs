#![deny(unsafe_code)]

//! Parlance CLI: chat with hosted LLMs from the terminal.

mod output;
mod repl;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use parlance_config::{AppConfig, ProviderKind};
use parlance_core::chat::budgeter_from_config;
use parlance_core::context::ModelTable;
use parlance_core::{
    ChatEvent, ChatSession, Conversation, ConversationStore, EventBus, FileStore, Preferences,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Parlance, a terminal chat client for OpenAI, Anthropic, Gemini and Mistral.
#[derive(Parser)]
#[command(name = "parlance", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "parlance.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat.
    Chat {
        /// Continue this conversation (id or unique prefix).
        #[arg(long)]
        conversation: Option<String>,

        /// Start a new conversation.
        #[arg(long, conflicts_with = "conversation")]
        new: bool,
    },

    /// Send one message and print the reply.
    Send {
        /// The message text.
        text: String,

        /// Conversation to append to (id or unique prefix).
        #[arg(long)]
        conversation: Option<String>,

        /// Start a new conversation.
        #[arg(long, conflicts_with = "conversation")]
        new: bool,
    },

    /// Show what would be sent for a conversation, without sending it.
    Budget {
        /// Conversation to budget (defaults to the active one).
        #[arg(long)]
        conversation: Option<String>,

        /// Budget against this model instead of the active one.
        #[arg(long)]
        model: Option<String>,
    },

    /// List known models and their context windows.
    Models {
        /// Only this provider.
        #[arg(long)]
        provider: Option<ProviderKind>,
    },

    /// Manage stored conversations.
    Conversations {
        #[command(subcommand)]
        action: ConversationAction,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[derive(Subcommand)]
enum ConversationAction {
    /// List conversations, newest first.
    List,
    /// Print a conversation.
    Show { id: String },
    /// Delete a conversation.
    Delete { id: String },
    /// Remove a conversation's messages but keep it.
    Clear { id: String },
}

/// Loaded configuration plus persisted state.
pub struct App {
    config: AppConfig,
    conversations: ConversationStore,
    preferences: Preferences,
    events: EventBus,
}

impl App {
    async fn open(config: AppConfig) -> Result<Self> {
        let conversations = ConversationStore::new(FileStore::new(&config.storage.data_dir));
        let preferences = conversations
            .load_preferences()
            .await
            .context("failed to read preferences")?
            .unwrap_or_else(|| Preferences {
                provider: config.llm.provider,
                model: config.llm.model.clone(),
                active_conversation: None,
            });
        Ok(Self {
            config,
            conversations,
            preferences,
            events: EventBus::new(),
        })
    }

    fn session(&self) -> Result<ChatSession> {
        let session = ChatSession::from_config(
            &self.config,
            self.preferences.provider,
            &self.preferences.model,
            self.events.clone(),
        )?;
        Ok(session)
    }

    /// Resolve `--conversation` / `--new`, falling back to the active one.
    async fn select_conversation(&self, id: Option<&str>, new: bool) -> Result<Conversation> {
        if !new {
            if let Some(id) = id {
                return self.find(id).await;
            }
            if let Some(active) = self.preferences.active_conversation
                && let Some(conversation) = self.conversations.load(active).await?
            {
                return Ok(conversation);
            }
        }
        Ok(Conversation::new(
            self.preferences.provider,
            self.preferences.effective_model(),
        ))
    }

    async fn find(&self, id: &str) -> Result<Conversation> {
        match self.conversations.find(id).await? {
            Some(conversation) => Ok(conversation),
            None => bail!("no conversation matches {id:?}"),
        }
    }

    async fn remember_conversation(&mut self, conversation: &Conversation) -> Result<()> {
        if self.preferences.active_conversation != Some(conversation.id) {
            self.preferences.active_conversation = Some(conversation.id);
            self.conversations.save_preferences(&self.preferences).await?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;
    init_tracing(cli.verbose, &config.logging.level);

    match cli.command {
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
        Commands::Models { provider } => cmd_models(&config, provider)?,
        command => {
            let mut app = App::open(config).await?;
            let event_log = log_events(&app.events);
            match command {
                Commands::Chat { conversation, new } => {
                    cmd_chat(&mut app, conversation.as_deref(), new).await?
                }
                Commands::Send {
                    text,
                    conversation,
                    new,
                } => cmd_send(&mut app, &text, conversation.as_deref(), new).await?,
                Commands::Budget {
                    conversation,
                    model,
                } => cmd_budget(&app, conversation.as_deref(), model.as_deref()).await?,
                Commands::Conversations { action } => cmd_conversations(&mut app, action).await?,
                Commands::Config { .. } | Commands::Models { .. } => {}
            }
            // Closing the last sender lets the logger drain and stop.
            drop(app);
            let _ = event_log.await;
        }
    }

    Ok(())
}

/// Log every event published on `events` until the bus closes.
fn log_events(events: &EventBus) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            debug!(?event, "chat event");
        }
    })
}

/// `RUST_LOG` wins, then `-v`, then `logging.level`. Logs go to stderr.
fn init_tracing(verbose: u8, configured: &str) {
    let level = match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_chat(app: &mut App, conversation: Option<&str>, new: bool) -> Result<()> {
    let session = app.session()?;
    let conversation = app.select_conversation(conversation, new).await?;
    info!(conversation = %conversation.id, provider = %session.provider_kind(), "starting chat");
    repl::run(app, session, conversation).await
}

async fn cmd_send(app: &mut App, text: &str, conversation: Option<&str>, new: bool) -> Result<()> {
    let session = app.session()?;
    let mut conversation = app.select_conversation(conversation, new).await?;
    conversation.provider = session.provider_kind();
    conversation.model = session.model().to_string();

    let reply = session.send(&mut conversation, text).await?;
    app.conversations.save(&conversation).await?;
    app.remember_conversation(&conversation).await?;

    if reply.error {
        bail!("{}", reply.content);
    }
    println!("{}", reply.content);
    Ok(())
}

async fn cmd_budget(app: &App, conversation: Option<&str>, model: Option<&str>) -> Result<()> {
    let budgeter = budgeter_from_config(&app.config)?;
    let conversation = app.select_conversation(conversation, false).await?;
    let model = model.unwrap_or_else(|| app.preferences.effective_model());
    let request = budgeter.budget(conversation.history(), model);
    print!("{}", output::budget_report(&request, model));
    Ok(())
}

fn cmd_models(config: &AppConfig, provider: Option<ProviderKind>) -> Result<()> {
    let table = ModelTable::builtin().with_overrides(&config.models)?;
    print!("{}", output::model_list(&table, provider, config.llm.effective_model()));
    Ok(())
}

async fn cmd_conversations(app: &mut App, action: ConversationAction) -> Result<()> {
    match action {
        ConversationAction::List => {
            let conversations = app.conversations.list().await?;
            let active = conversations
                .iter()
                .find(|c| Some(c.id) == app.preferences.active_conversation);
            print!("{}", output::conversation_list(&conversations, active));
        }
        ConversationAction::Show { id } => {
            let conversation = app.find(&id).await?;
            print!("{}", output::transcript(&conversation));
        }
        ConversationAction::Delete { id } => {
            let conversation = app.find(&id).await?;
            app.conversations.delete(conversation.id).await?;
            if app.preferences.active_conversation == Some(conversation.id) {
                app.preferences.active_conversation = None;
                app.conversations.save_preferences(&app.preferences).await?;
            }
            app.events.publish(ChatEvent::ConversationDeleted {
                conversation: conversation.id,
            });
            println!("deleted {}", output::short_id(&conversation));
        }
        ConversationAction::Clear { id } => {
            let conversation = app.find(&id).await?;
            app.conversations.clear_context(conversation.id).await?;
            app.events.publish(ChatEvent::ContextCleared {
                conversation: conversation.id,
            });
            println!("cleared {}", output::short_id(&conversation));
        }
    }
    Ok(())
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("failed to render configuration")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        AppConfig::load(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))
    } else {
        Ok(AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use parlance_test_utils::TestWorkspace;
    use parlance_test_utils::fixtures::conversation_with;
    use parlance_core::Message;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_send_and_budget() {
        let cli = Cli::try_parse_from(["parlance", "-vv", "send", "hello", "--new"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(
            matches!(cli.command, Commands::Send { ref text, new: true, .. } if text == "hello")
        );

        let cli = Cli::try_parse_from(["parlance", "budget", "--model", "gpt-4"]).unwrap();
        assert!(matches!(cli.command, Commands::Budget { model: Some(ref m), .. } if m == "gpt-4"));

        let cli = Cli::try_parse_from(["parlance", "models", "--provider", "gemini"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Models {
                provider: Some(ProviderKind::Gemini)
            }
        ));
    }

    #[test]
    fn test_new_conflicts_with_conversation() {
        assert!(
            Cli::try_parse_from(["parlance", "chat", "--new", "--conversation", "abc"]).is_err()
        );
    }

    #[tokio::test]
    async fn test_missing_config_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/parlance.toml")).await.unwrap();
        assert_eq!(config.llm.provider, ProviderKind::OpenAi);
    }

    #[tokio::test]
    async fn test_preferences_default_from_config() {
        let workspace = TestWorkspace::with_toml("[llm]\nprovider = \"anthropic\"\n").await;
        let app = App::open(workspace.load_config().await).await.unwrap();
        assert_eq!(app.preferences.provider, ProviderKind::Anthropic);
        assert_eq!(app.preferences.effective_model(), "claude-3-5-sonnet-20241022");
    }

    #[tokio::test]
    async fn test_select_active_conversation() {
        let workspace = TestWorkspace::empty().await;
        let mut app = App::open(workspace.load_config().await).await.unwrap();

        let fresh = app.select_conversation(None, false).await.unwrap();
        assert!(fresh.messages.is_empty());

        let stored = conversation_with(ProviderKind::OpenAi, vec![Message::user("remember me")]);
        app.conversations.save(&stored).await.unwrap();
        app.remember_conversation(&stored).await.unwrap();

        let reopened = App::open(workspace.load_config().await).await.unwrap();
        let selected = reopened.select_conversation(None, false).await.unwrap();
        assert_eq!(selected.id, stored.id);
        let new = reopened.select_conversation(None, true).await.unwrap();
        assert_ne!(new.id, stored.id);
        assert!(reopened.select_conversation(Some("zzzz"), false).await.is_err());
    }

    #[tokio::test]
    async fn test_conversation_commands_publish_events() {
        let workspace = TestWorkspace::empty().await;
        let mut app = App::open(workspace.load_config().await).await.unwrap();
        let stored = conversation_with(ProviderKind::OpenAi, vec![Message::user("tidy up")]);
        app.conversations.save(&stored).await.unwrap();
        let mut rx = app.events.subscribe();

        let id = stored.id.to_string();
        cmd_conversations(&mut app, ConversationAction::Clear { id: id.clone() })
            .await
            .unwrap();
        cmd_conversations(&mut app, ConversationAction::Delete { id })
            .await
            .unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            ChatEvent::ContextCleared {
                conversation: stored.id
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ChatEvent::ConversationDeleted {
                conversation: stored.id
            }
        );
        assert!(app.conversations.load(stored.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_event_log_stops_when_bus_closes() {
        let events = EventBus::new();
        let event_log = log_events(&events);
        assert_eq!(events.subscriber_count(), 1);
        events.publish(ChatEvent::ModelChanged {
            model: "gpt-4o".to_string(),
        });
        drop(events);
        event_log.await.unwrap();
    }
}
