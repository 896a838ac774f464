// Participant, winner and audit records shared by the draw engine and its stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type ParticipantId = Uuid;
pub type WinnerId = Uuid;
pub type AdminLogId = Uuid;
/// Operator identity as issued by the administrative layer.
pub type AdminId = i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Pending,
    Approved,
    Rejected,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Pending => "pending",
            ParticipantStatus::Approved => "approved",
            ParticipantStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ParticipantStatus::Pending),
            "approved" => Ok(ParticipantStatus::Approved),
            "rejected" => Ok(ParticipantStatus::Rejected),
            other => Err(format!("unknown participant status {:?}", other)),
        }
    }
}

/// Registration data is validated upstream; the engine only reads `status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub full_name: String,
    pub phone_number: String,
    pub loyalty_card: String,
    pub registration_date: DateTime<Utc>,
    pub status: ParticipantStatus,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

impl Participant {
    pub fn new(full_name: &str, phone_number: &str, loyalty_card: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            full_name: full_name.to_string(),
            phone_number: phone_number.to_string(),
            loyalty_card: loyalty_card.to_string(),
            registration_date: Utc::now(),
            status: ParticipantStatus::Pending,
            admin_notes: None,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == ParticipantStatus::Approved
    }
}

/// One drawn outcome. Immutable apart from `is_valid`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub id: WinnerId,
    pub participant_id: ParticipantId,
    pub draw_date: DateTime<Utc>,
    pub seed_hash: String,
    pub draw_number: u64,
    pub is_valid: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    StatusChange,
    InvalidateWinner,
    DeleteWinner,
    RerollWinner,
}

impl AdminAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminAction::StatusChange => "status_change",
            AdminAction::InvalidateWinner => "invalidate_winner",
            AdminAction::DeleteWinner => "delete_winner",
            AdminAction::RerollWinner => "reroll_winner",
        }
    }
}

impl fmt::Display for AdminAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdminLogEntry {
    pub id: AdminLogId,
    pub admin_id: AdminId,
    pub action: AdminAction,
    /// Winner or participant id the action applied to.
    pub target_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub details: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_only_known_values() {
        assert_eq!("approved".parse::<ParticipantStatus>(), Ok(ParticipantStatus::Approved));
        assert_eq!("pending".parse::<ParticipantStatus>(), Ok(ParticipantStatus::Pending));
        assert!("Approved".parse::<ParticipantStatus>().is_err());
        assert!("banned".parse::<ParticipantStatus>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ParticipantStatus::Rejected).unwrap();
        assert_eq!(json, "\"rejected\"");
    }

    #[test]
    fn new_participant_starts_pending() {
        let p = Participant::new("Ivan Petrov", "+79001234567", "12345678");
        assert_eq!(p.status, ParticipantStatus::Pending);
        assert!(!p.is_approved());
    }
}
