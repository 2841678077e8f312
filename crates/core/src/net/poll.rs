use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use super::client::{AdminAction, ClientError, Command, GameClient};
use crate::{
    identity::{Identity, IdentityStore},
    models::{AdminSnapshot, Snapshot},
};

/// Events delivered to the front-end loop.
#[derive(Debug)]
pub enum ClientEvent {
    /// A poll completed.
    Snapshot {
        /// The decoded state.
        snapshot: Box<Snapshot>,
        /// Player id the poll was issued for.
        player_id: Option<String>,
        /// When the response arrived.
        received_at: DateTime<Utc>,
    },
    /// An admin dashboard poll completed.
    AdminSnapshot {
        /// The decoded operator view.
        snapshot: Box<AdminSnapshot>,
        /// When the response arrived.
        received_at: DateTime<Utc>,
    },
    /// A poll failed; the cycle is skipped.
    PollFailed(ClientError),
    /// A command was accepted.
    Accepted {
        /// Command name.
        action: &'static str,
        /// Server confirmation, if any.
        message: Option<String>,
    },
    /// A command was refused or could not be delivered.
    Failed {
        /// Command name.
        action: &'static str,
        /// Cause.
        error: ClientError,
    },
    /// Registration succeeded and the identity was stored.
    Registered(Identity),
    /// Registration failed.
    RegistrationFailed(String),
}

/// What a poll fetches.
#[derive(Clone)]
enum Feed {
    /// `GET /api/state`, scoped to the held identity.
    Player(IdentityStore),
    /// `GET /admin/data`.
    Admin,
}

/// Fixed-rate state poller.
///
/// Every tick spawns its own request; responses are forwarded in the order
/// they complete.
#[derive(Clone)]
pub struct Poller {
    client: GameClient,
    feed: Feed,
    sender: mpsc::Sender<ClientEvent>,
    interval: Duration,
}

impl Poller {
    /// Create a player poller that forwards results to `sender`.
    pub fn new(
        client: GameClient,
        identity: IdentityStore,
        sender: mpsc::Sender<ClientEvent>,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            feed: Feed::Player(identity),
            sender,
            interval,
        }
    }

    /// Create a poller for the admin dashboard.
    pub fn admin(
        client: GameClient,
        sender: mpsc::Sender<ClientEvent>,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            feed: Feed::Admin,
            sender,
            interval,
        }
    }

    fn identity(&self) -> Option<&IdentityStore> {
        match &self.feed {
            Feed::Player(identity) => Some(identity),
            Feed::Admin => None,
        }
    }

    /// Tick until the receiving side goes away.
    pub async fn run(self) {
        info!(
            server = self.client.base_url(),
            interval_ms = self.interval.as_millis() as u64,
            "poll loop started"
        );
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if self.sender.is_closed() {
                break;
            }
            self.poll_now();
        }
        debug!("poll loop stopped");
    }

    /// Fetch immediately, outside the regular schedule.
    pub fn poll_now(&self) -> JoinHandle<()> {
        let client = self.client.clone();
        let sender = self.sender.clone();
        let player_id = self.identity().and_then(IdentityStore::player_id);
        let admin = matches!(self.feed, Feed::Admin);
        tokio::spawn(async move {
            let fetched = if admin {
                client.fetch_admin().await.map(|snapshot| ClientEvent::AdminSnapshot {
                    snapshot: Box::new(snapshot),
                    received_at: Utc::now(),
                })
            } else {
                client
                    .fetch_state(player_id.as_deref())
                    .await
                    .map(|snapshot| ClientEvent::Snapshot {
                        snapshot: Box::new(snapshot),
                        player_id,
                        received_at: Utc::now(),
                    })
            };
            let event = fetched.unwrap_or_else(|err| {
                warn!("poll failed: {err}");
                ClientEvent::PollFailed(err)
            });
            let _ = sender.send(event).await;
        })
    }
}

/// Sends mutating requests and triggers the follow-up poll.
#[derive(Clone)]
pub struct Dispatcher {
    poller: Poller,
}

impl Dispatcher {
    /// Share the poller's client, identity and channel.
    pub fn new(poller: Poller) -> Self {
        Self { poller }
    }

    /// Submit a command in the background.
    ///
    /// Local preconditions and a missing identity are reported synchronously
    /// so nothing is sent. The outcome arrives as [`ClientEvent::Accepted`] or
    /// [`ClientEvent::Failed`]; only an accepted command polls again.
    pub fn submit(&self, command: Command) -> Result<JoinHandle<()>, ClientError> {
        command.check()?;
        let player_id = self
            .poller
            .identity()
            .and_then(IdentityStore::player_id)
            .ok_or(ClientError::NotRegistered)?;

        let poller = self.poller.clone();
        Ok(tokio::spawn(async move {
            let action = command.label();
            let event = match poller.client.submit(&player_id, &command).await {
                Ok(ack) => {
                    info!(action, "command accepted");
                    // The refresh must go out before the UI hears about success.
                    poller.poll_now();
                    ClientEvent::Accepted {
                        action,
                        message: ack.message,
                    }
                }
                Err(error) => {
                    warn!(action, "command failed: {error}");
                    ClientEvent::Failed { action, error }
                }
            };
            let _ = poller.sender.send(event).await;
        }))
    }

    /// Register a company name and store the returned identity.
    pub fn register(&self, name: &str) -> Result<JoinHandle<()>, ClientError> {
        let Some(store) = self.poller.identity().cloned() else {
            return Err(ClientError::Precondition("the admin dashboard cannot register"));
        };
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ClientError::Precondition("enter a company name"));
        }

        let poller = self.poller.clone();
        Ok(tokio::spawn(async move {
            let event = match poller.client.register(&name).await {
                Ok(player_id) => {
                    let identity = Identity::new(player_id, name);
                    let record = identity.clone();
                    // File I/O stays off the runtime workers that serve polls.
                    match tokio::task::spawn_blocking(move || store.set(record)).await {
                        Ok(Ok(())) => {
                            poller.poll_now();
                            ClientEvent::Registered(identity)
                        }
                        Ok(Err(err)) => ClientEvent::RegistrationFailed(format!("{err:#}")),
                        Err(err) => ClientEvent::RegistrationFailed(err.to_string()),
                    }
                }
                Err(err) => {
                    warn!("registration failed: {err}");
                    ClientEvent::RegistrationFailed(err.user_message())
                }
            };
            let _ = poller.sender.send(event).await;
        }))
    }

    /// Send an operator action; an accepted one polls again.
    pub fn admin(&self, action: AdminAction) -> JoinHandle<()> {
        let poller = self.poller.clone();
        tokio::spawn(async move {
            let label = action.label();
            let event = match poller.client.admin(action).await {
                Ok(ack) => {
                    info!(action = label, "admin action accepted");
                    poller.poll_now();
                    ClientEvent::Accepted {
                        action: label,
                        message: ack.message,
                    }
                }
                Err(error) => {
                    warn!(action = label, "admin action failed: {error}");
                    ClientEvent::Failed {
                        action: label,
                        error,
                    }
                }
            };
            let _ = poller.sender.send(event).await;
        })
    }
}
