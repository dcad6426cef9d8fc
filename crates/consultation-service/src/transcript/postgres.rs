//! Postgres-backed transcript store.
//!
//! # Ordering
//!
//! Appends allocate their ordinal and timestamp with one conditional
//! `UPDATE consultations ... WHERE id = $1 AND ended_at IS NULL`. The row
//! lock taken by that update serializes appends per consultation. The
//! timestamp is `GREATEST(clock_timestamp(), last_message_at + 1us)` so
//! `created_at` strictly increases with the ordinal even if the database
//! clock steps backwards.
//!
//! # Retries
//!
//! Read paths retry once on transient errors (I/O, pool timeout). Writes
//! never retry.

use super::TranscriptStore;
use crate::errors::ConsultationError;
use crate::models::{
    Actor, ArtifactAttachment, ArtifactKind, AttachOutcome, Consultation, ConsultationId, Doctor,
    EndOutcome, EndedBy, ListFilter, Message, MessageKind, NewConsultation, Page, Patient,
    PrescriptionItem, Side, Transcript, SESSION_ENDED,
};
use crate::observability::metrics;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::future::Future;
use std::time::Instant;
use tracing::instrument;

#[derive(Debug, FromRow)]
struct ConsultationRow {
    id: i64,
    doctor_id: i64,
    user_id: i64,
    patient_name: String,
    patient_birth_date: NaiveDate,
    patient_gender_id: i16,
    created_at: DateTime<Utc>,
    activated_at: Option<DateTime<Utc>>,
    last_message_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    ended_by: Option<String>,
    certificate_url: Option<String>,
    prescription_url: Option<String>,
}

impl ConsultationRow {
    fn into_consultation(
        self,
        prescription_items: Vec<PrescriptionItem>,
    ) -> Result<Consultation, ConsultationError> {
        let ended_by = self
            .ended_by
            .as_deref()
            .map(str::parse::<EndedBy>)
            .transpose()?;

        Ok(Consultation {
            id: self.id,
            doctor_id: self.doctor_id,
            user_id: self.user_id,
            patient: Patient {
                name: self.patient_name,
                birth_date: self.patient_birth_date,
                gender_id: self.patient_gender_id,
            },
            created_at: self.created_at,
            activated_at: self.activated_at,
            last_message_at: self.last_message_at,
            ended_at: self.ended_at,
            ended_by,
            certificate_url: self.certificate_url,
            prescription_url: self.prescription_url,
            prescription_items,
        })
    }
}

#[derive(Debug, FromRow)]
struct ChatRow {
    id: i64,
    consultation_id: i64,
    ordinal: i64,
    sender_side: Option<String>,
    kind: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ChatRow> for Message {
    type Error = ConsultationError;

    fn try_from(row: ChatRow) -> Result<Self, Self::Error> {
        let sender_side = row
            .sender_side
            .as_deref()
            .map(str::parse::<Side>)
            .transpose()?;
        let kind = row
            .kind
            .parse::<MessageKind>()
            .map_err(|_| ConsultationError::Internal(format!("unknown chat kind '{}'", row.kind)))?;

        Ok(Message {
            id: row.id,
            consultation_id: row.consultation_id,
            ordinal: row.ordinal,
            sender_side,
            kind,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ItemRow {
    consultation_id: i64,
    product_id: i64,
    quantity: i32,
}

#[derive(Debug, FromRow)]
struct SlotRow {
    ordinal: i64,
    stamp: DateTime<Utc>,
}

/// Transcript store over a Postgres pool.
#[derive(Clone)]
pub struct PgTranscriptStore {
    pool: PgPool,
}

impl PgTranscriptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_row(&self, id: ConsultationId) -> Result<Option<ConsultationRow>, sqlx::Error> {
        sqlx::query_as::<_, ConsultationRow>(r#"SELECT * FROM consultations WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn fetch_items(&self, ids: &[i64]) -> Result<HashMap<i64, Vec<PrescriptionItem>>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT consultation_id, product_id, quantity
            FROM prescription_items
            WHERE consultation_id = ANY($1)
            ORDER BY consultation_id, product_id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_consultation: HashMap<i64, Vec<PrescriptionItem>> = HashMap::new();
        for row in rows {
            by_consultation
                .entry(row.consultation_id)
                .or_default()
                .push(PrescriptionItem {
                    product_id: row.product_id,
                    quantity: row.quantity,
                });
        }
        Ok(by_consultation)
    }

    async fn consultation_or_not_found(
        &self,
        id: ConsultationId,
    ) -> Result<Consultation, ConsultationError> {
        let row = retry_once("get_consultation", || self.fetch_row(id))
            .await?
            .ok_or_else(|| not_found(id))?;
        let ids = [id];
        let mut items = retry_once("get_prescription_items", || self.fetch_items(&ids)).await?;
        row.into_consultation(items.remove(&id).unwrap_or_default())
    }

    /// Explain why a conditional write on an unended row matched nothing.
    async fn diagnose_closed(&self, id: ConsultationId) -> ConsultationError {
        match self.fetch_row(id).await {
            Ok(None) => not_found(id),
            Ok(Some(row)) if row.ended_at.is_some() => ConsultationError::SessionEnded,
            Ok(Some(_)) => ConsultationError::Internal(format!(
                "conditional write on consultation {id} matched no row"
            )),
            Err(e) => ConsultationError::from(e),
        }
    }
}

fn not_found(id: ConsultationId) -> ConsultationError {
    ConsultationError::NotFound(format!("Consultation {id} not found"))
}

fn record<T>(operation: &str, start: Instant, result: &Result<T, sqlx::Error>) {
    let status = if result.is_ok() { "success" } else { "error" };
    metrics::record_db_query(operation, status, start.elapsed());
}

fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed
    )
}

/// Run an idempotent read, retrying once on a transient failure.
async fn retry_once<T, F, Fut>(operation: &str, mut f: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let start = Instant::now();
    let first = f().await;
    let result = match first {
        Err(e) if is_transient(&e) => {
            tracing::warn!(
                target: "cs.store",
                operation = operation,
                error = %e,
                "Transient database error, retrying once"
            );
            f().await
        }
        other => other,
    };
    record(operation, start, &result);
    result
}

async fn insert_system_message(
    tx: &mut Transaction<'_, Postgres>,
    id: ConsultationId,
    ordinal: i64,
    at: DateTime<Utc>,
) -> Result<ChatRow, sqlx::Error> {
    sqlx::query_as::<_, ChatRow>(
        r#"
        INSERT INTO chats (consultation_id, ordinal, sender_side, kind, content, created_at)
        VALUES ($1, $2, NULL, 'system', $3, $4)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(ordinal)
    .bind(SESSION_ENDED)
    .bind(at)
    .fetch_one(&mut **tx)
    .await
}

#[async_trait]
impl TranscriptStore for PgTranscriptStore {
    #[instrument(skip_all, name = "cs.store.get_doctor", fields(doctor_id = doctor_id))]
    async fn get_doctor(&self, doctor_id: i64) -> Result<Option<Doctor>, ConsultationError> {
        let row: Option<(i64, String, bool)> = retry_once("get_doctor", || {
            sqlx::query_as(r#"SELECT id, name, is_verified FROM doctors WHERE id = $1"#)
                .bind(doctor_id)
                .fetch_optional(&self.pool)
        })
        .await?;

        Ok(row.map(|(id, name, is_verified)| Doctor {
            id,
            name,
            is_verified,
        }))
    }

    #[instrument(skip_all, name = "cs.store.create_consultation", fields(doctor_id = input.doctor_id))]
    async fn create_consultation(
        &self,
        input: NewConsultation,
    ) -> Result<Consultation, ConsultationError> {
        let doctor = self
            .get_doctor(input.doctor_id)
            .await?
            .ok_or_else(|| ConsultationError::NotFound(format!("Doctor {} not found", input.doctor_id)))?;
        if !doctor.is_verified {
            return Err(ConsultationError::DoctorNotVerified);
        }

        let start = Instant::now();
        let result = sqlx::query_as::<_, ConsultationRow>(
            r#"
            INSERT INTO consultations (
                doctor_id, user_id, patient_name, patient_birth_date, patient_gender_id
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, doctor_id) WHERE ended_at IS NULL DO NOTHING
            RETURNING *
            "#,
        )
        .bind(input.doctor_id) // $1
        .bind(input.user_id) // $2
        .bind(&input.patient.name) // $3
        .bind(input.patient.birth_date) // $4
        .bind(input.patient.gender_id) // $5
        .fetch_optional(&self.pool)
        .await;
        record("create_consultation", start, &result);

        let row = result?.ok_or(ConsultationError::ActiveSessionExists)?;
        tracing::info!(
            target: "cs.store",
            consultation_id = row.id,
            doctor_id = row.doctor_id,
            "Consultation created"
        );
        row.into_consultation(Vec::new())
    }

    #[instrument(skip_all, name = "cs.store.get_consultation", fields(consultation_id = id))]
    async fn get_consultation(
        &self,
        id: ConsultationId,
    ) -> Result<Consultation, ConsultationError> {
        self.consultation_or_not_found(id).await
    }

    #[instrument(skip_all, name = "cs.store.activate", fields(consultation_id = id))]
    async fn activate(&self, id: ConsultationId) -> Result<Consultation, ConsultationError> {
        let start = Instant::now();
        let result = sqlx::query_as::<_, ConsultationRow>(
            r#"
            UPDATE consultations
            SET activated_at = COALESCE(activated_at, clock_timestamp())
            WHERE id = $1 AND ended_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        record("activate", start, &result);

        match result? {
            Some(_) => self.consultation_or_not_found(id).await,
            None => Err(self.diagnose_closed(id).await),
        }
    }

    #[instrument(
        skip_all,
        name = "cs.store.append_message",
        fields(consultation_id = id, side = %side, kind = kind.as_str())
    )]
    async fn append_message(
        &self,
        id: ConsultationId,
        side: Side,
        kind: MessageKind,
        content: &str,
    ) -> Result<Message, ConsultationError> {
        let start = Instant::now();
        let result = sqlx::query_as::<_, ChatRow>(
            r#"
            WITH slot AS (
                UPDATE consultations
                SET next_ordinal = next_ordinal + 1,
                    last_message_at = GREATEST(
                        clock_timestamp(),
                        last_message_at + INTERVAL '1 microsecond'
                    ),
                    activated_at = COALESCE(activated_at, clock_timestamp())
                WHERE id = $1 AND ended_at IS NULL
                RETURNING id, next_ordinal - 1 AS ordinal, last_message_at
            )
            INSERT INTO chats (consultation_id, ordinal, sender_side, kind, content, created_at)
            SELECT id, ordinal, $2, $3, $4, last_message_at FROM slot
            RETURNING *
            "#,
        )
        .bind(id) // $1
        .bind(side.as_str()) // $2
        .bind(kind.as_str()) // $3
        .bind(content) // $4
        .fetch_optional(&self.pool)
        .await;
        record("append_message", start, &result);

        match result? {
            Some(row) => {
                let message = Message::try_from(row)?;
                metrics::record_message_appended(kind.as_str());
                tracing::debug!(target: "cs.store", ordinal = message.ordinal, "Message appended");
                Ok(message)
            }
            None => Err(self.diagnose_closed(id).await),
        }
    }

    #[instrument(skip_all, name = "cs.store.end_session", fields(consultation_id = id))]
    async fn end_session(
        &self,
        id: ConsultationId,
        actor: Actor,
    ) -> Result<EndOutcome, ConsultationError> {
        let current = self.consultation_or_not_found(id).await?;
        if !current.admits(&actor) {
            return Err(ConsultationError::Forbidden(
                "Only participants can end a consultation".to_string(),
            ));
        }
        if let Some(ended_at) = current.ended_at {
            return Ok(EndOutcome {
                ended_at,
                closing_message: None,
            });
        }

        let ended_by = actor.ended_by();
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;

        let slot = sqlx::query_as::<_, SlotRow>(
            r#"
            UPDATE consultations
            SET ended_at = GREATEST(
                    clock_timestamp(),
                    last_message_at + INTERVAL '1 microsecond'
                ),
                ended_by = $2,
                next_ordinal = next_ordinal + 1
            WHERE id = $1 AND ended_at IS NULL
            RETURNING next_ordinal - 1 AS ordinal, ended_at AS stamp
            "#,
        )
        .bind(id)
        .bind(ended_by.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(slot) = slot else {
            // Another caller ended it between the read and the update.
            tx.rollback().await?;
            let ended = self.consultation_or_not_found(id).await?;
            let ended_at = ended.ended_at.ok_or_else(|| {
                ConsultationError::Internal(format!("consultation {id} lost its end marker"))
            })?;
            return Ok(EndOutcome {
                ended_at,
                closing_message: None,
            });
        };

        let chat = insert_system_message(&mut tx, id, slot.ordinal, slot.stamp).await;
        let chat = match chat {
            Ok(row) => row,
            Err(e) => {
                metrics::record_db_query("end_session", "error", start.elapsed());
                return Err(e.into());
            }
        };
        let commit = tx.commit().await;
        record("end_session", start, &commit);
        commit?;

        metrics::record_session_ended(ended_by.as_str());
        tracing::info!(
            target: "cs.store",
            ended_by = ended_by.as_str(),
            "Consultation ended"
        );

        Ok(EndOutcome {
            ended_at: slot.stamp,
            closing_message: Some(Message::try_from(chat)?),
        })
    }

    #[instrument(
        skip_all,
        name = "cs.store.attach_artifact",
        fields(consultation_id = id, kind = attachment.kind.as_str())
    )]
    async fn attach_artifact(
        &self,
        id: ConsultationId,
        attachment: ArtifactAttachment,
    ) -> Result<AttachOutcome, ConsultationError> {
        let update = match attachment.kind {
            ArtifactKind::Certificate => {
                r#"
                UPDATE consultations
                SET certificate_url = $2,
                    next_ordinal = next_ordinal + 1,
                    last_message_at = GREATEST(
                        clock_timestamp(),
                        last_message_at + INTERVAL '1 microsecond'
                    )
                WHERE id = $1 AND ended_at IS NULL AND certificate_url IS NULL
                RETURNING next_ordinal - 1 AS ordinal, last_message_at AS stamp
                "#
            }
            ArtifactKind::Prescription => {
                r#"
                UPDATE consultations
                SET prescription_url = $2,
                    next_ordinal = next_ordinal + 1,
                    last_message_at = GREATEST(
                        clock_timestamp(),
                        last_message_at + INTERVAL '1 microsecond'
                    )
                WHERE id = $1 AND ended_at IS NULL AND prescription_url IS NULL
                RETURNING next_ordinal - 1 AS ordinal, last_message_at AS stamp
                "#
            }
        };

        let start = Instant::now();
        let mut tx = self.pool.begin().await?;

        let slot = sqlx::query_as::<_, SlotRow>(update)
            .bind(id)
            .bind(&attachment.url)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(slot) = slot else {
            tx.rollback().await?;
            return Err(match self.diagnose_closed(id).await {
                ConsultationError::Internal(_) => {
                    ConsultationError::AlreadyAttached(format!(
                        "A {} is already attached to consultation {id}",
                        attachment.kind.as_str()
                    ))
                }
                other => other,
            });
        };

        if attachment.kind == ArtifactKind::Prescription && !attachment.items.is_empty() {
            let product_ids: Vec<i64> = attachment.items.iter().map(|i| i.product_id).collect();
            let quantities: Vec<i32> = attachment.items.iter().map(|i| i.quantity).collect();

            sqlx::query(
                r#"
                INSERT INTO prescription_items (consultation_id, product_id, quantity)
                SELECT $1, product_id, quantity
                FROM UNNEST($2::BIGINT[], $3::INTEGER[]) AS t(product_id, quantity)
                "#,
            )
            .bind(id)
            .bind(&product_ids)
            .bind(&quantities)
            .execute(&mut *tx)
            .await?;
        }

        let chat = sqlx::query_as::<_, ChatRow>(
            r#"
            INSERT INTO chats (consultation_id, ordinal, sender_side, kind, content, created_at)
            VALUES ($1, $2, 'doctor', 'file', $3, $4)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(slot.ordinal)
        .bind(&attachment.url)
        .bind(slot.stamp)
        .fetch_one(&mut *tx)
        .await?;

        let commit = tx.commit().await;
        record("attach_artifact", start, &commit);
        commit?;

        metrics::record_message_appended(MessageKind::File.as_str());
        tracing::info!(target: "cs.store", "Artifact attached");

        Ok(AttachOutcome {
            consultation: self.consultation_or_not_found(id).await?,
            message: Message::try_from(chat)?,
        })
    }

    #[instrument(skip_all, name = "cs.store.load_transcript", fields(consultation_id = id))]
    async fn load_transcript(&self, id: ConsultationId) -> Result<Transcript, ConsultationError> {
        let consultation = self.consultation_or_not_found(id).await?;

        let rows = retry_once("load_transcript", || {
            sqlx::query_as::<_, ChatRow>(
                r#"
                SELECT * FROM chats
                WHERE consultation_id = $1
                ORDER BY ordinal
                "#,
            )
            .bind(id)
            .fetch_all(&self.pool)
        })
        .await?;

        let messages = rows
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Transcript {
            consultation,
            messages,
        })
    }

    #[instrument(
        skip_all,
        name = "cs.store.list_for_actor",
        fields(side = %side, status = filter.status.as_str(), page = filter.page)
    )]
    async fn list_for_actor(
        &self,
        side: Side,
        actor_id: i64,
        filter: ListFilter,
    ) -> Result<Page<Consultation>, ConsultationError> {
        let (list_sql, count_sql) = match side {
            Side::User => (
                r#"
                SELECT * FROM consultations
                WHERE user_id = $1
                  AND ($2 = 'all'
                       OR ($2 = 'active' AND ended_at IS NULL)
                       OR ($2 = 'ended' AND ended_at IS NOT NULL))
                ORDER BY created_at DESC, id DESC
                LIMIT $3 OFFSET $4
                "#,
                r#"
                SELECT COUNT(*) FROM consultations
                WHERE user_id = $1
                  AND ($2 = 'all'
                       OR ($2 = 'active' AND ended_at IS NULL)
                       OR ($2 = 'ended' AND ended_at IS NOT NULL))
                "#,
            ),
            Side::Doctor => (
                r#"
                SELECT * FROM consultations
                WHERE doctor_id = $1
                  AND ($2 = 'all'
                       OR ($2 = 'active' AND ended_at IS NULL)
                       OR ($2 = 'ended' AND ended_at IS NOT NULL))
                ORDER BY created_at DESC, id DESC
                LIMIT $3 OFFSET $4
                "#,
                r#"
                SELECT COUNT(*) FROM consultations
                WHERE doctor_id = $1
                  AND ($2 = 'all'
                       OR ($2 = 'active' AND ended_at IS NULL)
                       OR ($2 = 'ended' AND ended_at IS NOT NULL))
                "#,
            ),
        };
        let status = filter.status.as_str();

        let rows = retry_once("list_for_actor", || {
            sqlx::query_as::<_, ConsultationRow>(list_sql)
                .bind(actor_id)
                .bind(status)
                .bind(i64::from(filter.limit))
                .bind(filter.offset())
                .fetch_all(&self.pool)
        })
        .await?;

        let (total,): (i64,) = retry_once("count_for_actor", || {
            sqlx::query_as(count_sql)
                .bind(actor_id)
                .bind(status)
                .fetch_one(&self.pool)
        })
        .await?;

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut items = retry_once("get_prescription_items", || self.fetch_items(&ids)).await?;

        let consultations = rows
            .into_iter()
            .map(|row| {
                let row_items = items.remove(&row.id).unwrap_or_default();
                row.into_consultation(row_items)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items: consultations,
            page: filter.page,
            limit: filter.limit,
            total,
        })
    }

    #[instrument(skip_all, name = "cs.store.list_open")]
    async fn list_open(&self) -> Result<Vec<Consultation>, ConsultationError> {
        let rows = retry_once("list_open", || {
            sqlx::query_as::<_, ConsultationRow>(
                r#"SELECT * FROM consultations WHERE ended_at IS NULL ORDER BY id"#,
            )
            .fetch_all(&self.pool)
        })
        .await?;

        rows.into_iter()
            .map(|row| row.into_consultation(Vec::new()))
            .collect()
    }

    async fn ping(&self) -> Result<(), ConsultationError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(is_transient(&sqlx::Error::PoolTimedOut));
        assert!(is_transient(&sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset"
        ))));
        assert!(!is_transient(&sqlx::Error::RowNotFound));
        assert!(!is_transient(&sqlx::Error::PoolClosed));
    }

    #[tokio::test]
    async fn test_retry_once_retries_transient_failure() {
        let mut calls = 0;
        let result: Result<u32, sqlx::Error> = retry_once("test", || {
            calls += 1;
            let attempt = calls;
            async move {
                if attempt == 1 {
                    Err(sqlx::Error::PoolTimedOut)
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_retry_once_does_not_retry_permanent_failure() {
        let mut calls = 0;
        let result: Result<u32, sqlx::Error> = retry_once("test", || {
            calls += 1;
            async { Err(sqlx::Error::RowNotFound) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_chat_row_conversion() {
        let row = ChatRow {
            id: 1,
            consultation_id: 101,
            ordinal: 4,
            sender_side: None,
            kind: "system".to_string(),
            content: SESSION_ENDED.to_string(),
            created_at: Utc::now(),
        };

        let message = Message::try_from(row).unwrap();
        assert_eq!(message.kind, MessageKind::System);
        assert_eq!(message.sender_side, None);
        assert_eq!(message.ordinal, 4);
    }

    #[test]
    fn test_consultation_row_rejects_unknown_ended_by() {
        let row = ConsultationRow {
            id: 1,
            doctor_id: 7,
            user_id: 3,
            patient_name: "Ana".to_string(),
            patient_birth_date: NaiveDate::from_ymd_opt(1990, 4, 2).unwrap(),
            patient_gender_id: 1,
            created_at: Utc::now(),
            activated_at: None,
            last_message_at: None,
            ended_at: Some(Utc::now()),
            ended_by: Some("robot".to_string()),
            certificate_url: None,
            prescription_url: None,
        };

        assert!(matches!(
            row.into_consultation(vec![]),
            Err(ConsultationError::Internal(_))
        ));
    }
}
