use std::io::Read;
use std::path::Path;

use chrono::{Local, NaiveDateTime};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use crate::error::{classify_insert, StoreError};
use crate::models::{NewParticipant, Participant, ParticipantStatus, StatusCount};

const REQUIRED_COLUMNS: [&str; 3] = ["name", "email", "age"];

/// Opens the pool and brings the schema up to date.
pub async fn connect(database_url: &str) -> Result<SqlitePool, StoreError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    init_db(&pool).await?;
    Ok(pool)
}

pub async fn init_db(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &SqlitePool) -> Result<usize, StoreError> {
    let participants = [
        ("Avery Lee", "avery.lee@example.org", 34),
        ("Jules Moreno", "jules.moreno@example.org", 27),
        ("Kiara Patel", "kiara.patel@example.org", 45),
    ];

    let now = now();
    for (name, email, age) in participants {
        sqlx::query(
            r#"
            INSERT INTO participants (id, name, email, age, status, created_at)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            ON CONFLICT (email) DO UPDATE
            SET name = excluded.name, age = excluded.age
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .bind(age)
        .bind(now)
        .execute(pool)
        .await?;
    }

    Ok(participants.len())
}

pub async fn add_participant(
    pool: &SqlitePool,
    new: &NewParticipant,
) -> Result<Participant, StoreError> {
    let participant = Participant {
        name: new.name.trim().to_string(),
        email: new.email.trim().to_string(),
        age: new.age,
        status: ParticipantStatus::Pending,
        created_at: now(),
        scheduled_at: None,
    };

    insert(pool, &participant)
        .await
        .map_err(|err| classify_insert(err, &participant.email))?;

    tracing::info!(email = %participant.email, "participant added");
    Ok(participant)
}

async fn insert<'e, E>(executor: E, participant: &Participant) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO participants (id, name, email, age, status, created_at, scheduled_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&participant.name)
    .bind(&participant.email)
    .bind(participant.age)
    .bind(participant.status.as_str())
    .bind(participant.created_at)
    .bind(participant.scheduled_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn import_csv(pool: &SqlitePool, csv_path: &Path) -> Result<usize, StoreError> {
    let file = std::fs::File::open(csv_path).map_err(csv::Error::from)?;
    import_csv_reader(pool, file).await
}

/// Appends every row of a `name,email,age` file. The whole import is rolled
/// back if any row fails, including on a duplicate email.
pub async fn import_csv_reader<R: Read>(pool: &SqlitePool, source: R) -> Result<usize, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader.headers()?.clone();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !headers.iter().any(|header| header == **column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(StoreError::MissingColumns(missing));
    }

    let created_at = now();
    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<NewParticipant>() {
        let row = result?;
        let participant = Participant {
            name: row.name,
            email: row.email,
            age: row.age,
            status: ParticipantStatus::Pending,
            created_at,
            scheduled_at: None,
        };
        insert(&mut *tx, &participant)
            .await
            .map_err(|err| classify_insert(err, &participant.email))?;
        inserted += 1;
    }

    tx.commit().await?;
    tracing::info!(inserted, "participants imported");
    Ok(inserted)
}

pub async fn list_participants(pool: &SqlitePool) -> Result<Vec<Participant>, StoreError> {
    let rows = sqlx::query(
        "SELECT name, email, age, status, created_at, scheduled_at \
         FROM participants ORDER BY created_at, email",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(participant_from_row).collect()
}

pub async fn find_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<Participant>, StoreError> {
    let row = sqlx::query(
        "SELECT name, email, age, status, created_at, scheduled_at \
         FROM participants WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(participant_from_row).transpose()
}

pub async fn reset_status(pool: &SqlitePool, email: &str) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE participants SET status = $1 WHERE email = $2")
        .bind(ParticipantStatus::Pending.as_str())
        .bind(email)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(email.to_string()));
    }
    Ok(())
}

pub async fn mark_sent(
    pool: &SqlitePool,
    email: &str,
    at: NaiveDateTime,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE participants SET status = $1, scheduled_at = $2 WHERE email = $3")
        .bind(ParticipantStatus::Sent.as_str())
        .bind(at)
        .bind(email)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_failed(pool: &SqlitePool, email: &str) -> Result<(), StoreError> {
    sqlx::query("UPDATE participants SET status = $1 WHERE email = $2")
        .bind(ParticipantStatus::Failed.as_str())
        .bind(email)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_all_scheduled(pool: &SqlitePool, at: NaiveDateTime) -> Result<u64, StoreError> {
    let result = sqlx::query("UPDATE participants SET status = $1, scheduled_at = $2")
        .bind(ParticipantStatus::Scheduled.as_str())
        .bind(at)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn status_counts(pool: &SqlitePool) -> Result<Vec<StatusCount>, StoreError> {
    let rows = sqlx::query(
        "SELECT status, COUNT(*) AS total FROM participants GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await?;

    let mut counts = Vec::new();
    for row in rows {
        let status: String = row.try_get("status")?;
        counts.push(StatusCount {
            status: status.parse().map_err(StoreError::Corrupt)?,
            count: row.try_get("total")?,
        });
    }
    Ok(counts)
}

fn participant_from_row(row: &SqliteRow) -> Result<Participant, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Participant {
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        age: row.try_get("age")?,
        status: status.parse().map_err(StoreError::Corrupt)?,
        created_at: row.try_get("created_at")?,
        scheduled_at: row.try_get("scheduled_at")?,
    })
}

pub(crate) fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        init_db(&pool).await.expect("migrations");
        pool
    }

    fn new_participant(name: &str, email: &str, age: i64) -> NewParticipant {
        NewParticipant {
            name: name.to_string(),
            email: email.to_string(),
            age,
        }
    }

    #[tokio::test]
    async fn connect_creates_schema_on_fresh_file() {
        let path = std::env::temp_dir().join(format!("survey-campaign-{}.db", Uuid::new_v4()));
        let url = format!("sqlite://{}?mode=rwc", path.display());

        let pool = connect(&url).await.unwrap();
        add_participant(&pool, &new_participant("Avery Lee", "avery@example.org", 30))
            .await
            .unwrap();
        assert_eq!(list_participants(&pool).await.unwrap().len(), 1);

        pool.close().await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn added_participant_starts_pending() {
        let pool = memory_pool().await;
        add_participant(&pool, &new_participant("Avery Lee", "avery@example.org", 30))
            .await
            .unwrap();

        let stored = find_by_email(&pool, "avery@example.org").await.unwrap().unwrap();
        assert_eq!(stored.name, "Avery Lee");
        assert_eq!(stored.age, 30);
        assert_eq!(stored.status, ParticipantStatus::Pending);
        assert!(stored.scheduled_at.is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let pool = memory_pool().await;
        add_participant(&pool, &new_participant("Avery Lee", "avery@example.org", 30))
            .await
            .unwrap();

        let err = add_participant(&pool, &new_participant("Other", "avery@example.org", 41))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail(ref email) if email == "avery@example.org"));
        assert_eq!(list_participants(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn import_appends_rows_and_ignores_extra_columns() {
        let pool = memory_pool().await;
        let data = "name,email,age,team\nJules Moreno,jules@example.org,27,north\nKiara Patel,kiara@example.org,45,south\n";

        let inserted = import_csv_reader(&pool, data.as_bytes()).await.unwrap();
        assert_eq!(inserted, 2);

        let participants = list_participants(&pool).await.unwrap();
        assert_eq!(participants.len(), 2);
        assert!(participants
            .iter()
            .all(|p| p.status == ParticipantStatus::Pending));
    }

    #[tokio::test]
    async fn import_rejects_missing_column() {
        let pool = memory_pool().await;
        let data = "name,email\nJules Moreno,jules@example.org\n";

        let err = import_csv_reader(&pool, data.as_bytes()).await.unwrap_err();
        match err {
            StoreError::MissingColumns(missing) => assert_eq!(missing, vec!["age".to_string()]),
            other => panic!("unexpected error: {other}"),
        }
        assert!(list_participants(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn import_with_duplicate_email_inserts_nothing() {
        let pool = memory_pool().await;
        add_participant(&pool, &new_participant("Avery Lee", "avery@example.org", 30))
            .await
            .unwrap();
        let data = "name,email,age\nJules Moreno,jules@example.org,27\nAvery Again,avery@example.org,31\n";

        let err = import_csv_reader(&pool, data.as_bytes()).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail(_)));
        assert!(find_by_email(&pool, "jules@example.org").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reset_sets_pending_from_any_status() {
        let pool = memory_pool().await;
        add_participant(&pool, &new_participant("Avery Lee", "avery@example.org", 30))
            .await
            .unwrap();

        mark_sent(&pool, "avery@example.org", now()).await.unwrap();
        reset_status(&pool, "avery@example.org").await.unwrap();
        let stored = find_by_email(&pool, "avery@example.org").await.unwrap().unwrap();
        assert_eq!(stored.status, ParticipantStatus::Pending);

        mark_failed(&pool, "avery@example.org").await.unwrap();
        reset_status(&pool, "avery@example.org").await.unwrap();
        let stored = find_by_email(&pool, "avery@example.org").await.unwrap().unwrap();
        assert_eq!(stored.status, ParticipantStatus::Pending);
    }

    #[tokio::test]
    async fn reset_unknown_email_is_not_found() {
        let pool = memory_pool().await;
        let err = reset_status(&pool, "ghost@example.org").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn seed_is_repeatable_and_counts_by_status() {
        let pool = memory_pool().await;
        seed(&pool).await.unwrap();
        seed(&pool).await.unwrap();
        mark_all_scheduled(&pool, now()).await.unwrap();
        mark_failed(&pool, "avery.lee@example.org").await.unwrap();

        let counts = status_counts(&pool).await.unwrap();
        let lookup = |status| {
            counts
                .iter()
                .find(|c| c.status == status)
                .map(|c| c.count)
                .unwrap_or(0)
        };
        assert_eq!(lookup(ParticipantStatus::Scheduled), 2);
        assert_eq!(lookup(ParticipantStatus::Failed), 1);
    }
}
