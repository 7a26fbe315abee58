use sqlx::SqlitePool;

use crate::compose::{ContentGenerator, OrgProfile};
use crate::db;
use crate::error::StoreError;
use crate::mailer::{Mailer, OutgoingEmail};
use crate::models::ParticipantStatus;

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub email: String,
    /// Status written back to the store; `None` when it was left as it was.
    pub status: Option<ParticipantStatus>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CampaignSummary {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    /// Participants whose invitation text could not be generated.
    pub skipped: usize,
    pub outcomes: Vec<SendOutcome>,
}

impl CampaignSummary {
    pub fn headline(&self) -> String {
        format!(
            "Campaign completed! {}/{} emails sent, {} failed, {} skipped.",
            self.sent, self.total, self.failed, self.skipped
        )
    }
}

/// Sends one invitation to every participant regardless of status.
///
/// Each participant is handled in turn: on success the status becomes
/// `sent` and `scheduled_at` is stamped, when the transport reports a
/// failure the status becomes `failed` and `scheduled_at` keeps its previous
/// value. If the body cannot be generated nothing is sent and the stored
/// record is left untouched. Errors, including failed status writes, are
/// recorded on the outcome and the loop moves on. Nothing is retried and
/// earlier sends are never rolled back.
pub async fn launch_campaign(
    pool: &SqlitePool,
    mailer: &dyn Mailer,
    generator: &dyn ContentGenerator,
    org: &OrgProfile,
) -> Result<CampaignSummary, StoreError> {
    let participants = db::list_participants(pool).await?;
    let mut summary = CampaignSummary {
        total: participants.len(),
        ..CampaignSummary::default()
    };

    if participants.is_empty() {
        tracing::warn!("no participants found, nothing to send");
        return Ok(summary);
    }

    for (index, participant) in participants.iter().enumerate() {
        tracing::info!(
            progress = %format!("{}/{}", index + 1, summary.total),
            email = %participant.email,
            "sending invitation"
        );

        let body = match generator.generate(&participant.name, org).await {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(email = %participant.email, error = %err, "invitation text unavailable, status left unchanged");
                summary.skipped += 1;
                summary.outcomes.push(SendOutcome {
                    email: participant.email.clone(),
                    status: None,
                    error: Some(err.to_string()),
                });
                continue;
            }
        };

        let email = OutgoingEmail {
            to: participant.email.clone(),
            subject: org.subject.clone(),
            body,
        };

        let (status, mut error, written) = match mailer.send(&email).await {
            Ok(()) => {
                summary.sent += 1;
                let written = db::mark_sent(pool, &participant.email, db::now()).await;
                (ParticipantStatus::Sent, None, written)
            }
            Err(err) => {
                tracing::error!(email = %participant.email, error = %err, "invitation failed");
                summary.failed += 1;
                let written = db::mark_failed(pool, &participant.email).await;
                (ParticipantStatus::Failed, Some(err.to_string()), written)
            }
        };

        let status = match written {
            Ok(()) => Some(status),
            Err(err) => {
                tracing::error!(email = %participant.email, %status, error = %err, "status update failed");
                let message = format!("status update to {status} failed: {err}");
                error = Some(match error {
                    Some(previous) => format!("{previous}; {message}"),
                    None => message,
                });
                None
            }
        };

        summary.outcomes.push(SendOutcome {
            email: participant.email.clone(),
            status,
            error,
        });
    }

    tracing::info!(
        sent = summary.sent,
        failed = summary.failed,
        skipped = summary.skipped,
        total = summary.total,
        "campaign completed"
    );
    Ok(summary)
}
