//! Discord Rich Presence integration using discord-sdk.

use std::sync::Arc;
use std::time::Duration;

use discord_sdk::{
    activity::{ActivityBuilder, Assets},
    wheel::{UserState, Wheel},
    Discord, Subscriptions,
};
use tokio::sync::{mpsc, oneshot};

use crate::presence::{PresenceClient, PresenceUpdate, Slot};

/// Timeout for waiting for the Discord handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long shutdown waits for the final clear to go out.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
enum Command {
    Update(PresenceUpdate),
    Clear(Slot),
    Shutdown(oneshot::Sender<()>),
}

/// Manages the Discord connection and background task.
pub struct DiscordState {
    command_tx: mpsc::UnboundedSender<Command>,
}

impl DiscordState {
    /// Spawn the background task that owns the Discord connection and
    /// processes presence commands. Discord being unreachable is not an
    /// error here; the task logs and commands are dropped.
    pub fn init(app_id: i64) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::run_discord_task(app_id, command_rx));

        Self { command_tx }
    }

    /// Background task maintaining the Discord connection.
    ///
    /// Tracks which slot currently holds the displayed status so that a
    /// clear addressed to a superseded slot is ignored rather than
    /// wiping a freshly published status.
    async fn run_discord_task(app_id: i64, mut command_rx: mpsc::UnboundedReceiver<Command>) {
        let (wheel, handler) = Wheel::new(Box::new(|err| {
            tracing::warn!("Discord error: {:?}", err);
        }));

        let mut user_spoke = wheel.user();

        let discord = match Discord::new(app_id, Subscriptions::ACTIVITY, Box::new(handler)) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("Discord not available: {:?}", e);
                return;
            }
        };

        tracing::info!("Discord connecting...");

        let user = match tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            if user_spoke.0.changed().await.is_err() {
                Err("Discord connection closed".to_string())
            } else {
                match &*user_spoke.0.borrow() {
                    UserState::Connected(user) => Ok(user.clone()),
                    UserState::Disconnected(err) => Err(format!("Discord disconnected: {:?}", err)),
                }
            }
        })
        .await
        {
            Ok(Ok(user)) => user,
            Ok(Err(e)) => {
                tracing::warn!("{}", e);
                return;
            }
            Err(_) => {
                tracing::warn!("Discord handshake timed out");
                return;
            }
        };

        tracing::info!("Discord Rich Presence connected as {}", user.username);

        let mut shown: Option<Slot> = None;

        while let Some(command) = command_rx.recv().await {
            match command {
                Command::Update(update) => {
                    shown = Some(update.slot);

                    let mut assets = Assets::default()
                        .large(update.large_image.clone(), Some(update.large_text.clone()));
                    if let Some(small) = &update.small_image {
                        assets = assets.small(small.clone(), update.small_text.clone());
                    }

                    let activity = ActivityBuilder::new()
                        .details(update.details.clone())
                        .state(format!("by {}", update.state))
                        .assets(assets);

                    if let Err(e) = discord.update_activity(activity).await {
                        tracing::debug!("Failed to update Discord activity: {:?}", e);
                    }
                }
                Command::Clear(slot) => {
                    if shown != Some(slot) {
                        tracing::debug!(slot, "ignoring clear for a superseded slot");
                        continue;
                    }
                    shown = None;
                    if let Err(e) = discord.clear_activity().await {
                        tracing::debug!("Failed to clear Discord activity: {:?}", e);
                    }
                }
                Command::Shutdown(ack) => {
                    if shown.take().is_some() {
                        let _ = discord.clear_activity().await;
                    }
                    let _ = ack.send(());
                    break;
                }
            }
        }

        discord.disconnect().await;
        tracing::info!("Discord Rich Presence disconnected");
    }

    fn send(&self, command: Command) {
        if self.command_tx.send(command).is_err() {
            tracing::warn!("presence client unavailable, dropping command");
        }
    }

    /// Best-effort final clear, then disconnect.
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Shutdown(ack_tx));
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, ack_rx).await.is_err() {
            tracing::debug!("Discord shutdown timed out");
        }
    }
}

/// Discord presence client implementing the generic `PresenceClient`
/// boundary.
pub struct DiscordPresence {
    state: Arc<DiscordState>,
}

impl DiscordPresence {
    pub fn new(state: Arc<DiscordState>) -> Self {
        Self { state }
    }
}

impl PresenceClient for DiscordPresence {
    fn name(&self) -> &'static str {
        "Discord"
    }

    fn update(&self, update: &PresenceUpdate) {
        self.state.send(Command::Update(update.clone()));
    }

    fn clear(&self, slot: Slot) {
        self.state.send(Command::Clear(slot));
    }
}
