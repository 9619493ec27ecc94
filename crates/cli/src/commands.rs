//! CLI commands

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use distributech_core::types::RegistrationRequest;
use distributech_core::{Capability, ClientConfig, Conversation, Message, UserProfile};
use distributech_http::{
    ApiClient, ChatService, FileTokenStore, MemoryTokenStore, SessionEvent, SessionManager,
    TokenStore,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

const LOGIN_HINT: &str = "Run `distributech login <username>` to sign in";

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and persist the session
    Login {
        username: String,

        #[arg(long, env = "DISTRIBUTECH_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and forget the persisted session
    Logout,

    /// Show the signed-in user and what their role allows
    Whoami {
        /// Print the raw profile as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a new account
    Register {
        username: String,

        #[arg(long)]
        email: String,

        #[arg(long, env = "DISTRIBUTECH_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        role_id: i64,

        #[arg(long)]
        department_id: i64,
    },

    /// Talk to other users
    Chat {
        #[command(subcommand)]
        command: ChatCommands,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
pub enum ChatCommands {
    /// List conversations
    List,

    /// Show a conversation and mark it read
    Open { id: i64 },

    /// Send a message to a conversation
    Send { id: i64, message: String },

    /// Find or create the conversation with a user
    Start { username: String },

    /// Follow a conversation until interrupted
    Watch {
        id: i64,

        /// Polling interval in seconds
        #[arg(long, default_value = "5")]
        interval: u64,
    },
}

impl Commands {
    pub fn is_long_running(&self) -> bool {
        matches!(
            self,
            Self::Chat {
                command: ChatCommands::Watch { .. }
            }
        )
    }

    pub async fn execute(self, config: ClientConfig) -> Result<()> {
        match self {
            Self::Login { username, password } => {
                let session = open_session(&config)?;
                let profile = session.login(&username, &password).await?;
                println!("Logged in as {}", describe(&profile));
                Ok(())
            }
            Self::Logout => {
                open_session(&config)?.logout();
                println!("Logged out");
                Ok(())
            }
            Self::Whoami { json } => {
                let session = restore_session(&config).await?;
                let profile = session.user().context(LOGIN_HINT)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&profile)?);
                } else {
                    print_profile(&profile);
                }
                Ok(())
            }
            Self::Register {
                username,
                email,
                password,
                role_id,
                department_id,
            } => {
                let registration = RegistrationRequest {
                    username,
                    email,
                    password,
                    role_id,
                    department_id,
                };
                open_session(&config)?.register(&registration).await?;
                println!("Registered {}. You can now log in.", registration.username);
                Ok(())
            }
            Self::Chat { command } => command.execute(&config).await,
            Self::Config => {
                println!("{}", serde_json::to_string_pretty(&config)?);
                Ok(())
            }
        }
    }
}

impl ChatCommands {
    async fn execute(self, config: &ClientConfig) -> Result<()> {
        let session = restore_session(config).await?;
        let me = session.user().map(|user| user.id).context(LOGIN_HINT)?;
        let chat = ChatService::new(session.client());

        match self {
            Self::List => {
                let conversations = chat.fetch_conversations().await?;
                if conversations.is_empty() {
                    println!("No conversations yet");
                }
                for conversation in &conversations {
                    print_conversation_line(conversation, me);
                }
                Ok(())
            }
            Self::Open { id } => {
                let conversation = chat.open_conversation(id).await?;
                print_conversation(&conversation, me);
                Ok(())
            }
            Self::Send { id, message } => {
                chat.open_conversation(id).await?;
                let sent = chat.send_message(&message).await?;
                print_message(&sent, me);
                Ok(())
            }
            Self::Start { username } => {
                let conversation = chat.start_conversation(&username).await?;
                print_conversation(&conversation, me);
                Ok(())
            }
            Self::Watch { id, interval } => watch(&session, &chat, id, me, interval).await,
        }
    }
}

/// Build a session over the configured token store without touching the network
fn open_session(config: &ClientConfig) -> Result<SessionManager> {
    let api = ApiClient::from_config(config).context("Failed to build API client")?;
    let store: Arc<dyn TokenStore> = match &config.token_file {
        Some(path) => {
            debug!(path = %path.display(), "Using file token store");
            Arc::new(FileTokenStore::new(path))
        }
        None => Arc::new(MemoryTokenStore::new()),
    };
    Ok(SessionManager::new(api, store))
}

/// Build a session and validate the persisted tokens against the API
async fn restore_session(config: &ClientConfig) -> Result<SessionManager> {
    let session = open_session(config)?;
    match session.restore().await {
        Ok(true) => Ok(session),
        Ok(false) => bail!("Not logged in. {LOGIN_HINT}"),
        Err(e) if e.requires_login() => {
            warn!(error = %e, "Persisted session rejected");
            bail!("Your session has expired. {LOGIN_HINT}")
        }
        Err(e) => Err(e.into()),
    }
}

async fn watch(
    session: &SessionManager,
    chat: &ChatService,
    id: i64,
    me: i64,
    interval: u64,
) -> Result<()> {
    let mut events = session.subscribe();
    let conversation = chat.open_conversation(id).await?;
    print_conversation(&conversation, me);

    let mut last_seen = conversation.messages.iter().map(|m| m.id).max().unwrap_or(0);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    // The first tick completes immediately
    ticker.tick().await;

    info!(conversation = id, interval, "Watching conversation");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping watch");
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(SessionEvent::LoginRequired { reason }) => bail!("{reason} {LOGIN_HINT}"),
                Ok(event) => debug!(?event, "Session event"),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Missed session events"),
                Err(RecvError::Closed) => return Ok(()),
            },
            _ = ticker.tick() => {
                let state = chat.sync().await?;
                let seen = last_seen;
                for message in state.messages.iter().filter(|m| m.id > seen) {
                    print_message(message, me);
                    last_seen = last_seen.max(message.id);
                }
            }
        }
    }
}

fn describe(profile: &UserProfile) -> String {
    match profile.role() {
        Some(role) => format!("{} ({role})", profile.username),
        None => profile.username.clone(),
    }
}

fn print_profile(profile: &UserProfile) {
    println!("User:        {}", describe(profile));
    if let Some(email) = &profile.email {
        println!("Email:       {email}");
    }
    if let Some(department) = &profile.department {
        println!("Department:  {}", department.name);
    }
    if let Some(info) = &profile.user_info {
        println!("Name:        {} {}", info.first_name, info.last_name);
    }

    let allowed: Vec<String> = Capability::ALL
        .iter()
        .filter(|capability| profile.can(**capability))
        .map(|capability| format!("{capability:?}"))
        .collect();
    println!("Allowed:     {}", allowed.join(", "));
}

fn print_conversation_line(conversation: &Conversation, me: i64) {
    let unread = conversation
        .messages
        .iter()
        .filter(|m| !m.is_read && m.sender.as_ref().is_some_and(|s| s.id() != me))
        .count();
    let with = conversation.other_participants(me).join(", ");
    if unread > 0 {
        println!("#{:<5} {with}  ({unread} unread)", conversation.id);
    } else {
        println!("#{:<5} {with}", conversation.id);
    }
}

fn print_conversation(conversation: &Conversation, me: i64) {
    println!(
        "Conversation #{} with {}",
        conversation.id,
        conversation.other_participants(me).join(", ")
    );
    for message in &conversation.messages {
        print_message(message, me);
    }
}

fn print_message(message: &Message, me: i64) {
    let sender = match &message.sender {
        Some(sender) if sender.id() == me => "you".to_string(),
        Some(sender) => sender
            .username()
            .map_or_else(|| format!("user #{}", sender.id()), str::to_string),
        None => "unknown".to_string(),
    };
    let time = message
        .created_at
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    println!("[{time}] {sender}: {}", message.content);
}
