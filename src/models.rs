use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticipantStatus {
    Pending,
    Scheduled,
    Sent,
    Failed,
}

impl ParticipantStatus {
    pub const ALL: [ParticipantStatus; 4] = [
        ParticipantStatus::Pending,
        ParticipantStatus::Scheduled,
        ParticipantStatus::Sent,
        ParticipantStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Pending => "pending",
            ParticipantStatus::Scheduled => "scheduled",
            ParticipantStatus::Sent => "sent",
            ParticipantStatus::Failed => "failed",
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

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ParticipantStatus::Pending),
            "scheduled" => Ok(ParticipantStatus::Scheduled),
            "sent" => Ok(ParticipantStatus::Sent),
            "failed" => Ok(ParticipantStatus::Failed),
            other => Err(format!("unknown participant status '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub name: String,
    pub email: String,
    pub age: i64,
    pub status: ParticipantStatus,
    pub created_at: NaiveDateTime,
    /// Last time the participant was scheduled or successfully sent to.
    pub scheduled_at: Option<NaiveDateTime>,
}

/// A participant as entered by hand or read from an import file.
#[derive(Debug, Clone, Deserialize)]
pub struct NewParticipant {
    pub name: String,
    pub email: String,
    pub age: i64,
}

#[derive(Debug, Clone)]
pub struct StatusCount {
    pub status: ParticipantStatus,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_its_own_display() {
        for status in ParticipantStatus::ALL {
            assert_eq!(status.to_string().parse::<ParticipantStatus>(), Ok(status));
        }
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!("SENT".parse::<ParticipantStatus>(), Ok(ParticipantStatus::Sent));
        assert!("archived".parse::<ParticipantStatus>().is_err());
    }
}
