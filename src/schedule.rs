//! Delivery schedules and the polling loop that fires them.

use anyhow::{bail, Context};
use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use clap::{Args, ValueEnum};
use sqlx::SqlitePool;

use crate::campaign::launch_campaign;
use crate::compose::{ContentGenerator, OrgProfile};
use crate::db;
use crate::mailer::Mailer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScheduleKind {
    Immediate,
    Date,
    Weekly,
    Recurring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleMode {
    Immediate,
    Date { at: NaiveDateTime },
    Weekly { days: Vec<Weekday>, at: NaiveTime },
    Recurring { frequency: Frequency, anchor: NaiveDateTime },
}

impl ScheduleMode {
    pub fn is_one_shot(&self) -> bool {
        matches!(self, ScheduleMode::Immediate | ScheduleMode::Date { .. })
    }

    /// Earliest fire time at or after `from`, if the schedule has one.
    pub fn next_occurrence(&self, from: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            ScheduleMode::Immediate => Some(from),
            ScheduleMode::Date { at } => (*at >= from).then_some(*at),
            ScheduleMode::Weekly { days, at } => (0..=7)
                .filter_map(|offset| from.date().checked_add_signed(Duration::days(offset)))
                .filter(|date| days.contains(&date.weekday()))
                .map(|date| date.and_time(*at))
                .find(|candidate| *candidate >= from),
            ScheduleMode::Recurring { frequency, anchor } => {
                if *anchor >= from {
                    return Some(*anchor);
                }
                match frequency {
                    Frequency::Daily => step_days(*anchor, from, 1),
                    Frequency::Weekly => step_days(*anchor, from, 7),
                    Frequency::Monthly => step_months(*anchor, from),
                }
            }
        }
    }
}

fn step_days(anchor: NaiveDateTime, from: NaiveDateTime, period_days: i64) -> Option<NaiveDateTime> {
    let period = period_days * 86_400;
    let elapsed = (from - anchor).num_seconds();
    let steps = (elapsed + period - 1) / period;
    anchor.checked_add_signed(Duration::days(period_days * steps))
}

fn step_months(anchor: NaiveDateTime, from: NaiveDateTime) -> Option<NaiveDateTime> {
    let months_apart = (from.year() - anchor.year()) * 12 + from.month() as i32
        - anchor.month() as i32;
    let start = months_apart.max(1) as u32;
    // Short months clamp the day, so the first candidate may still fall short.
    (start..start + 2)
        .filter_map(|n| anchor.checked_add_months(Months::new(n)))
        .find(|candidate| *candidate >= from)
}

/// Tracks when a schedule is next due.
#[derive(Debug)]
pub struct Scheduler {
    mode: ScheduleMode,
    next_due: Option<NaiveDateTime>,
    runs: usize,
}

impl Scheduler {
    pub fn new(mode: ScheduleMode, now: NaiveDateTime) -> Self {
        let next_due = mode.next_occurrence(now);
        Self {
            mode,
            next_due,
            runs: 0,
        }
    }

    pub fn next_due(&self) -> Option<NaiveDateTime> {
        self.next_due
    }

    pub fn runs(&self) -> usize {
        self.runs
    }

    pub fn is_finished(&self) -> bool {
        self.next_due.is_none()
    }

    /// Returns true when a run is due at `now` and moves on to the next one.
    pub fn poll(&mut self, now: NaiveDateTime) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.runs += 1;
                self.next_due = if self.mode.is_one_shot() {
                    None
                } else {
                    self.mode
                        .next_occurrence(now.max(due) + Duration::seconds(1))
                };
                true
            }
            _ => false,
        }
    }
}

/// Checks that the schedule has an upcoming send time, then marks every
/// participant `scheduled`. Nobody is touched when there is nothing to run.
pub async fn register_schedule(
    pool: &SqlitePool,
    mode: ScheduleMode,
    now: NaiveDateTime,
) -> anyhow::Result<(Scheduler, u64)> {
    let scheduler = Scheduler::new(mode, now);
    let first = scheduler
        .next_due()
        .context("schedule has no upcoming send time")?;
    let marked = db::mark_all_scheduled(pool, now).await?;
    tracing::info!(next_due = %first, marked, "schedule registered");
    Ok((scheduler, marked))
}

/// Polls once per second and launches the campaign whenever the schedule is
/// due. Returns after a one-shot schedule fires or on Ctrl-C.
pub async fn run_scheduler(
    pool: &SqlitePool,
    mailer: &dyn Mailer,
    generator: &dyn ContentGenerator,
    org: &OrgProfile,
    mut scheduler: Scheduler,
) -> anyhow::Result<usize> {
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut shutdown => {
                tracing::info!(runs = scheduler.runs(), "scheduler stopped");
                break;
            }
        }

        if scheduler.poll(db::now()) {
            match launch_campaign(pool, mailer, generator, org).await {
                Ok(summary) => println!("{}", summary.headline()),
                Err(err) => tracing::error!(error = %err, "scheduled campaign failed"),
            }
            if scheduler.is_finished() {
                break;
            }
            if let Some(next) = scheduler.next_due() {
                tracing::info!(next_due = %next, "next campaign scheduled");
            }
        }
    }

    Ok(scheduler.runs())
}

#[derive(Debug, Clone, Args)]
pub struct ScheduleArgs {
    /// When the campaign is sent
    #[arg(long, value_enum, default_value_t = ScheduleKind::Immediate)]
    pub mode: ScheduleKind,
    /// Send date and time for `date` mode, first run for `recurring` ("YYYY-MM-DD HH:MM")
    #[arg(long, value_parser = parse_datetime)]
    pub at: Option<NaiveDateTime>,
    /// Weekdays for `weekly` mode, comma separated (mon,wed,fri)
    #[arg(long, value_delimiter = ',', value_parser = parse_weekday)]
    pub days: Vec<Weekday>,
    /// Send time of day for `weekly` and `recurring` modes
    #[arg(long, value_parser = parse_time, default_value = "09:00")]
    pub time: NaiveTime,
    /// Repeat interval for `recurring` mode
    #[arg(long, value_enum)]
    pub frequency: Option<Frequency>,
}

impl ScheduleArgs {
    pub fn into_mode(self, today: NaiveDate) -> anyhow::Result<ScheduleMode> {
        match self.mode {
            ScheduleKind::Immediate => Ok(ScheduleMode::Immediate),
            ScheduleKind::Date => {
                let at = self.at.context("--at is required for date mode")?;
                Ok(ScheduleMode::Date { at })
            }
            ScheduleKind::Weekly => {
                if self.days.is_empty() {
                    bail!("--days is required for weekly mode");
                }
                Ok(ScheduleMode::Weekly {
                    days: self.days,
                    at: self.time,
                })
            }
            ScheduleKind::Recurring => {
                let frequency = self
                    .frequency
                    .context("--frequency is required for recurring mode")?;
                let anchor = self.at.unwrap_or_else(|| today.and_time(self.time));
                Ok(ScheduleMode::Recurring { frequency, anchor })
            }
        }
    }
}

fn parse_datetime(value: &str) -> Result<NaiveDateTime, String> {
    ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value.trim(), format).ok())
        .ok_or_else(|| format!("expected \"YYYY-MM-DD HH:MM\", got '{value}'"))
}

fn parse_time(value: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| format!("expected \"HH:MM\", got '{value}'"))
}

fn parse_weekday(value: &str) -> Result<Weekday, String> {
    value
        .trim()
        .parse::<Weekday>()
        .map_err(|_| format!("unknown weekday '{value}'"))
}
