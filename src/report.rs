use std::fmt::Write;

use chrono::NaiveDateTime;

use crate::models::{Participant, ParticipantStatus, StatusCount};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

fn format_timestamp(value: Option<NaiveDateTime>) -> String {
    value
        .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn build_report(participants: &[Participant], counts: &[StatusCount]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Survey Campaign Report");
    let _ = writeln!(output, "{} participants on file", participants.len());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Mix");

    for status in ParticipantStatus::ALL {
        let count = counts
            .iter()
            .find(|c| c.status == status)
            .map(|c| c.count)
            .unwrap_or(0);
        let _ = writeln!(output, "- {status}: {count}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Participants");

    if participants.is_empty() {
        let _ = writeln!(output, "No participants added yet.");
    } else {
        let _ = writeln!(output, "| Name | Email | Age | Status | Added On |");
        let _ = writeln!(output, "|------|-------|-----|--------|----------|");
        for participant in participants {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} |",
                participant.name,
                participant.email,
                participant.age,
                participant.status,
                format_timestamp(Some(participant.created_at))
            );
        }
    }

    let mut contacted: Vec<&Participant> = participants
        .iter()
        .filter(|p| p.scheduled_at.is_some())
        .collect();
    contacted.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recently Contacted");

    if contacted.is_empty() {
        let _ = writeln!(output, "Nobody has been scheduled or sent to yet.");
    } else {
        for participant in contacted.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} ({}) {} at {}",
                participant.name,
                participant.email,
                participant.status,
                format_timestamp(participant.scheduled_at)
            );
        }
    }

    output
}

/// One line per participant for terminal output.
pub fn overview_line(participant: &Participant) -> String {
    format!(
        "- {} <{}> age {} [{}] added {}, last scheduled {}",
        participant.name,
        participant.email,
        participant.age,
        participant.status,
        format_timestamp(Some(participant.created_at)),
        format_timestamp(participant.scheduled_at)
    )
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn participant(email: &str, status: ParticipantStatus, scheduled_day: Option<u32>) -> Participant {
        let day = |d: u32| {
            NaiveDate::from_ymd_opt(2026, 3, d)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap()
        };
        Participant {
            name: email.split('@').next().unwrap().to_string(),
            email: email.to_string(),
            age: 30,
            status,
            created_at: day(1),
            scheduled_at: scheduled_day.map(day),
        }
    }

    #[test]
    fn empty_report_says_so() {
        let report = build_report(&[], &[]);
        assert!(report.contains("0 participants on file"));
        assert!(report.contains("- pending: 0"));
        assert!(report.contains("- failed: 0"));
        assert!(report.contains("No participants added yet."));
        assert!(report.contains("Nobody has been scheduled or sent to yet."));
    }

    #[test]
    fn recent_contacts_are_newest_first() {
        let participants = vec![
            participant("avery@example.org", ParticipantStatus::Sent, Some(2)),
            participant("jules@example.org", ParticipantStatus::Pending, None),
            participant("kiara@example.org", ParticipantStatus::Failed, Some(5)),
        ];
        let counts = vec![StatusCount {
            status: ParticipantStatus::Sent,
            count: 1,
        }];

        let report = build_report(&participants, &counts);
        assert!(report.contains("- sent: 1"));
        assert!(report.contains("- scheduled: 0"));
        assert!(report.contains("| jules | jules@example.org | 30 | pending | 2026-03-01 09:00 |"));

        let recent = report.split("## Recently Contacted").nth(1).unwrap();
        let kiara = recent.find("kiara@example.org").unwrap();
        let avery = recent.find("avery@example.org").unwrap();
        assert!(kiara < avery);
        assert!(!recent.contains("jules@example.org"));
    }

    #[test]
    fn overview_line_shows_missing_schedule_as_dash() {
        let line = overview_line(&participant("jules@example.org", ParticipantStatus::Pending, None));
        assert!(line.ends_with("last scheduled -"));
    }
}
