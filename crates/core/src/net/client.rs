use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::{
    config::AppConfig,
    models::{AdminSnapshot, FacilityId, ItemCode, Snapshot},
};

/// Failure talking to the game server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced an HTTP response.
    #[error("connection error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The server refused the request; `detail` is its explanation.
    #[error("{detail}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Server-supplied reason.
        detail: String,
    },
    /// A success response that could not be decoded.
    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
    /// A local check failed before anything was sent.
    #[error("{0}")]
    Precondition(&'static str),
    /// No player identity is held.
    #[error("not registered")]
    NotRegistered,
}

impl ClientError {
    /// Text suitable for the status line.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(_) => "Connection error, please try again".to_string(),
            other => other.to_string(),
        }
    }
}

/// Side of a market order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Buy order.
    Bid,
    /// Sell order.
    Ask,
    /// Sell to the active government acquisition.
    GovAsk,
}

impl OrderType {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bid => "BID",
            Self::Ask => "ASK",
            Self::GovAsk => "GOV_ASK",
        }
    }
}

/// A mutating request. The player id is attached at submission time.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Produce {
        factory_id: FacilityId,
        target_item: ItemCode,
        quantity: u32,
    },
    /// `target_tier` 0 builds a Miner, 1 a Processor.
    Build {
        target_tier: u8,
        payment_materials: Vec<ItemCode>,
    },
    BuildSpecial {
        building_type: String,
        payment_materials: Vec<ItemCode>,
    },
    Upgrade {
        factory_id: FacilityId,
        payment_materials: Vec<ItemCode>,
    },
    Demolish {
        factory_id: FacilityId,
    },
    BankSell {
        item_id: ItemCode,
        quantity: u32,
    },
    Trade {
        order_type: OrderType,
        item_id: ItemCode,
        price: i64,
        quantity: u32,
    },
}

impl Command {
    /// Endpoint path below the server root.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Produce { .. } => "/api/produce",
            Self::Build { .. } => "/api/build",
            Self::BuildSpecial { .. } => "/api/build_special",
            Self::Upgrade { .. } => "/api/upgrade",
            Self::Demolish { .. } => "/api/demolish",
            Self::BankSell { .. } => "/api/bank_sell",
            Self::Trade { .. } => "/api/trade",
        }
    }

    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Produce { .. } => "produce",
            Self::Build { .. } => "build",
            Self::BuildSpecial { .. } => "build special",
            Self::Upgrade { .. } => "upgrade",
            Self::Demolish { .. } => "demolish",
            Self::BankSell { .. } => "bank sell",
            Self::Trade { .. } => "trade",
        }
    }

    /// Local checks that never need the server.
    pub fn check(&self) -> Result<(), ClientError> {
        match self {
            Self::BankSell { quantity: 0, .. } | Self::Trade { quantity: 0, .. } => {
                Err(ClientError::Precondition("quantity must be positive"))
            }
            Self::Trade { price, .. } if *price <= 0 => {
                Err(ClientError::Precondition("price must be positive"))
            }
            Self::Produce { target_item, .. } if target_item.is_empty() => {
                Err(ClientError::Precondition("select a product first"))
            }
            _ => Ok(()),
        }
    }

    /// JSON body for the request.
    pub fn body(&self, player_id: &str) -> Value {
        match self {
            Self::Produce {
                factory_id,
                target_item,
                quantity,
            } => json!({
                "player_id": player_id,
                "factory_id": factory_id,
                "target_item": target_item,
                "quantity": quantity,
            }),
            Self::Build {
                target_tier,
                payment_materials,
            } => json!({
                "player_id": player_id,
                "target_tier": target_tier,
                "payment_materials": payment_materials,
            }),
            Self::BuildSpecial {
                building_type,
                payment_materials,
            } => json!({
                "player_id": player_id,
                "building_type": building_type,
                "payment_materials": payment_materials,
            }),
            Self::Upgrade {
                factory_id,
                payment_materials,
            } => json!({
                "player_id": player_id,
                "factory_id": factory_id,
                "payment_materials": payment_materials,
            }),
            Self::Demolish { factory_id } => json!({
                "player_id": player_id,
                "factory_id": factory_id,
            }),
            Self::BankSell { item_id, quantity } => json!({
                "player_id": player_id,
                "item_id": item_id,
                "quantity": quantity,
            }),
            Self::Trade {
                order_type,
                item_id,
                price,
                quantity,
            } => json!({
                "player_id": player_id,
                "type": order_type.as_str(),
                "item_id": item_id,
                "price": price,
                "quantity": quantity,
            }),
        }
    }
}

/// Operator request from the admin dashboard. Neither carries a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    /// Close the current phase and run its settlement.
    NextPhase,
    /// Wipe every player and restart at turn 1.
    Reset,
}

impl AdminAction {
    /// Endpoint path below the server root.
    pub fn path(self) -> &'static str {
        match self {
            Self::NextPhase => "/admin/next_phase",
            Self::Reset => "/admin/reset",
        }
    }

    /// Short name for logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::NextPhase => "next phase",
            Self::Reset => "reset",
        }
    }
}

/// Success body of a mutating request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Ack {
    /// Optional confirmation text.
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Registration {
    player_id: String,
}

/// Thin HTTP wrapper around the game API.
#[derive(Debug, Clone)]
pub struct GameClient {
    http: reqwest::Client,
    base_url: String,
}

impl GameClient {
    /// Build a client for `base_url`, optionally bounding every request.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Build a client from resolved settings.
    pub fn from_config(config: &AppConfig) -> Result<Self, ClientError> {
        Self::new(config.server_url.clone(), config.request_timeout())
    }

    /// Server root this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /api/state`, scoped to a player when an id is given.
    pub async fn fetch_state(&self, player_id: Option<&str>) -> Result<Snapshot, ClientError> {
        let mut request = self.http.get(self.url("/api/state"));
        if let Some(player_id) = player_id {
            request = request.query(&[("player_id", player_id)]);
        }
        let body = read_success(request.send().await?).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// `POST /api/register`; returns the issued player id.
    pub async fn register(&self, name: &str) -> Result<String, ClientError> {
        let response = self
            .http
            .post(self.url("/api/register"))
            .json(&json!({ "name": name }))
            .send()
            .await?;
        let body = read_success(response).await?;
        let registration: Registration = serde_json::from_str(&body)?;
        Ok(registration.player_id)
    }

    /// Send a mutating command on behalf of `player_id`.
    pub async fn submit(&self, player_id: &str, command: &Command) -> Result<Ack, ClientError> {
        command.check()?;
        debug!(command = command.label(), path = command.path(), "submitting");
        let response = self
            .http
            .post(self.url(command.path()))
            .json(&command.body(player_id))
            .send()
            .await?;
        let body = read_success(response).await?;
        Ok(serde_json::from_str(&body).unwrap_or_default())
    }

    /// `GET /admin/data`.
    pub async fn fetch_admin(&self) -> Result<AdminSnapshot, ClientError> {
        let response = self.http.get(self.url("/admin/data")).send().await?;
        let body = read_success(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// `POST /admin/next_phase`.
    pub async fn next_phase(&self) -> Result<Ack, ClientError> {
        self.admin(AdminAction::NextPhase).await
    }

    /// `POST /admin/reset`.
    pub async fn reset(&self) -> Result<Ack, ClientError> {
        self.admin(AdminAction::Reset).await
    }

    /// Send an operator action.
    pub async fn admin(&self, action: AdminAction) -> Result<Ack, ClientError> {
        debug!(action = action.label(), "admin request");
        let response = self.http.post(self.url(action.path())).send().await?;
        let body = read_success(response).await?;
        Ok(serde_json::from_str(&body).unwrap_or_default())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn read_success(response: reqwest::Response) -> Result<String, ClientError> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        return Ok(body);
    }
    Err(ClientError::Rejected {
        status: status.as_u16(),
        detail: rejection_detail(&body)
            .unwrap_or_else(|| format!("request failed with HTTP {}", status.as_u16())),
    })
}

/// Pull the human-readable reason out of an error body.
fn rejection_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(detail) => Some(detail.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
