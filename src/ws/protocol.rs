//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Client fields beyond the known ones that ride along with a relayed payload
pub type ExtraFields = Map<String, Value>;

/// Cap on unknown fields carried through the relay
pub const MAX_EXTRA_FIELDS: usize = 16;

fn check_extra(extra: &ExtraFields, event: &str) -> Result<(), ProtocolError> {
    if extra.len() > MAX_EXTRA_FIELDS {
        return Err(ProtocolError::InvalidPayload(format!(
            "{} carries more than {} extra fields",
            event, MAX_EXTRA_FIELDS
        )));
    }
    Ok(())
}

/// Public identity of a player, as shown to the opponent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    /// Wallet address (primary external identity)
    pub wallet_address: String,
    /// Optional application id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fid: Option<String>,
    pub username: String,
}

impl PlayerProfile {
    pub const MAX_WALLET_LEN: usize = 128;
    pub const MAX_USERNAME_LEN: usize = 32;
    pub const MAX_FID_LEN: usize = 64;

    /// Reject profiles that would put garbage into match records
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.wallet_address.trim().is_empty() {
            return Err(ProtocolError::invalid("walletAddress must not be empty"));
        }
        if self.wallet_address.len() > Self::MAX_WALLET_LEN {
            return Err(ProtocolError::invalid("walletAddress is too long"));
        }
        let username = self.username.trim();
        if username.is_empty() || username.chars().count() > Self::MAX_USERNAME_LEN {
            return Err(ProtocolError::invalid("username must be 1-32 characters"));
        }
        if self.fid.as_ref().is_some_and(|fid| fid.len() > Self::MAX_FID_LEN) {
            return Err(ProtocolError::invalid("fid is too long"));
        }
        Ok(())
    }
}

/// Movement sample, forwarded to the opponent as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePayload {
    pub x: f64,
    pub y: f64,
    pub velocity_x: f64,
    pub velocity_y: f64,
    pub flip_x: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl MovePayload {
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let finite = [self.x, self.y, self.velocity_x, self.velocity_y]
            .iter()
            .chain(self.timestamp.iter())
            .all(|v| v.is_finite());
        if !finite {
            return Err(ProtocolError::invalid("player-move contains a non-finite number"));
        }
        check_extra(&self.extra, "player-move")
    }
}

/// Weapon fire, forwarded to the opponent as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShootPayload {
    pub x: f64,
    pub y: f64,
    pub angle: f64,
    pub velocity_x: f64,
    pub velocity_y: f64,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl ShootPayload {
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if ![self.x, self.y, self.angle, self.velocity_x, self.velocity_y]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(ProtocolError::invalid("player-shoot contains a non-finite number"));
        }
        check_extra(&self.extra, "player-shoot")
    }
}

/// Self-reported hit point update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitPayload {
    pub new_hp: i64,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMsg {
    /// Join the matchmaking queue
    FindMatch(PlayerProfile),
    /// Movement update, relayed to the opponent
    PlayerMove(MovePayload),
    /// Weapon fire, relayed to the opponent
    PlayerShoot(ShootPayload),
    /// Sender's own remaining hit points
    PlayerHit(HitPayload),
}

impl ClientMsg {
    /// Parse and validate a text frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let msg: ClientMsg =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        msg.validate()?;
        Ok(msg)
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            ClientMsg::FindMatch(profile) => profile.validate(),
            ClientMsg::PlayerMove(payload) => payload.validate(),
            ClientMsg::PlayerShoot(payload) => payload.validate(),
            ClientMsg::PlayerHit(_) => Ok(()),
        }
    }

    /// Event name, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMsg::FindMatch(_) => "find-match",
            ClientMsg::PlayerMove(_) => "player-move",
            ClientMsg::PlayerShoot(_) => "player-shoot",
            ClientMsg::PlayerHit(_) => "player-hit",
        }
    }
}

/// Match rules announced to both players
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchConfigInfo {
    /// Match length in milliseconds
    pub duration: u64,
    pub entry_fee: String,
    pub max_kills: u32,
    pub initial_hp: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingInfo {
    /// 0 means next to be paired
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchFoundInfo {
    pub match_id: Uuid,
    pub opponent: PlayerProfile,
    /// 1 or 2
    pub player_number: u8,
    pub config: MatchConfigInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillInfo {
    pub killer: String,
    pub victim: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResult {
    pub wallet_address: String,
    pub kills: u32,
    pub deaths: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEndedInfo {
    pub match_id: Uuid,
    /// Winner's wallet address
    pub winner: String,
    pub player1: PlayerResult,
    pub player2: PlayerResult,
    /// Elapsed match time in milliseconds
    pub duration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMsg {
    WaitingForOpponent(WaitingInfo),
    MatchFound(MatchFoundInfo),
    OpponentMove(MovePayload),
    OpponentShoot(ShootPayload),
    KillEvent(KillInfo),
    MatchEnded(MatchEndedInfo),
    OpponentDisconnected,
    /// Rejected client frame
    Error(ErrorInfo),
}

impl ServerMsg {
    /// Messages a lagging client can miss without losing match state.
    /// Relay traffic is superseded by the next sample and rejections can be retried.
    pub fn is_droppable(&self) -> bool {
        matches!(
            self,
            ServerMsg::OpponentMove(_) | ServerMsg::OpponentShoot(_) | ServerMsg::Error(_)
        )
    }
}

impl From<ProtocolError> for ServerMsg {
    fn from(err: ProtocolError) -> Self {
        ServerMsg::Error(ErrorInfo {
            code: err.code().to_string(),
            message: err.to_string(),
        })
    }
}

/// Client-facing rejection of a frame
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Already in a match")]
    AlreadyInMatch,

    #[error("Matchmaking queue is full")]
    QueueFull,

    #[error("Too many active matches")]
    ServerFull,

    #[error("Too many requests")]
    RateLimited,
}

impl ProtocolError {
    fn invalid(message: &str) -> Self {
        ProtocolError::InvalidPayload(message.to_string())
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::Malformed(_) => "malformed",
            ProtocolError::InvalidPayload(_) => "invalid_payload",
            ProtocolError::AlreadyInMatch => "already_in_match",
            ProtocolError::QueueFull => "queue_full",
            ProtocolError::ServerFull => "server_full",
            ProtocolError::RateLimited => "rate_limited",
        }
    }
}
