// SPDX-License-Identifier: MIT

//! Firestore-backed ledger store.
//!
//! Typed operations over the collections in [`crate::store::collections`].
//! The quota-guarded score append runs as a Firestore transaction on the
//! per-(player, day) attempt counter, so concurrent submissions cannot
//! exceed the daily quota. Every operation is bounded by the configured
//! store timeout; a timeout surfaces as `AppError::Storage` (retryable).

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{stream, FutureExt, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{
    MonthlyWinnersRecord, OutboxEvent, Payment, PaymentKind, PaymentStatus, Player, Score,
    Subscription, SubscriptionStatus,
};
use crate::store::{collections, LedgerStore, ScoreInsert};

const MAX_CONCURRENT_DB_OPS: usize = 50;
// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Attempt counter document, keyed by "{player_id}_{day_key}".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AttemptCounter {
    player_id: u64,
    day_key: String,
    used: u32,
}

/// Rollover marker document, keyed by month key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RolloverMarker {
    month_key: String,
    closed_at: DateTime<Utc>,
}

/// Firestore ledger client.
#[derive(Clone)]
pub struct FirestoreLedger {
    client: Option<firestore::FirestoreDb>,
    op_timeout: Duration,
}

impl FirestoreLedger {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str, op_timeout: Duration) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id, op_timeout).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
            op_timeout,
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(
        project_id: &str,
        op_timeout: Duration,
    ) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Storage(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        Ok(Self {
            client: Some(client),
            op_timeout,
        })
    }

    /// Create a mock client for testing (offline mode).
    ///
    /// All operations return an error if called.
    pub fn new_mock() -> Self {
        Self {
            client: None,
            op_timeout: Duration::from_secs(5),
        }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Storage("Database not connected (offline mode)".to_string()))
    }

    /// Bound a storage operation by the configured timeout.
    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Storage(format!("{op}: operation timed out"))),
        }
    }

    fn attempt_counter_id(player_id: u64, day_key: &str) -> String {
        format!("{player_id}_{day_key}")
    }

    /// Helper to batch delete documents using transactions.
    async fn batch_delete<T, F>(
        &self,
        items: &[T],
        collection: &str,
        id_extractor: F,
    ) -> Result<(), AppError>
    where
        F: Fn(&T) -> String,
    {
        let client = self.get_client()?;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Storage(format!("Failed to begin transaction: {}", e)))?;

            for item in chunk {
                let doc_id = id_extractor(item);
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(&doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Storage(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Storage(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }
}

#[async_trait]
impl LedgerStore for FirestoreLedger {
    // ─── Players ─────────────────────────────────────────────────

    async fn get_player(&self, player_id: u64) -> Result<Option<Player>, AppError> {
        self.bounded("get_player", async {
            self.get_client()?
                .fluent()
                .select()
                .by_id_in(collections::PLAYERS)
                .obj()
                .one(&player_id.to_string())
                .await
                .map_err(|e| AppError::Storage(e.to_string()))
        })
        .await
    }

    async fn upsert_player(&self, player: &Player) -> Result<(), AppError> {
        self.bounded("upsert_player", async {
            let _: () = self
                .get_client()?
                .fluent()
                .update()
                .in_col(collections::PLAYERS)
                .document_id(player.player_id.to_string())
                .object(player)
                .execute()
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn delete_player_data(&self, player_id: u64) -> Result<usize, AppError> {
        // Cascade over scores, payments and subscriptions, then the profile.
        // No single timeout here: the cascade may span many batches.
        let mut deleted = 0;

        let scores: Vec<Score> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::SCORES)
            .filter(|q| q.for_all([q.field("player_id").eq(player_id)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        deleted += scores.len();
        self.batch_delete(&scores, collections::SCORES, |s: &Score| s.score_id.clone())
            .await?;

        let payments: Vec<Payment> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::PAYMENTS)
            .filter(|q| q.for_all([q.field("player_id").eq(player_id)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        deleted += payments.len();
        self.batch_delete(&payments, collections::PAYMENTS, |p: &Payment| {
            p.external_ref.clone()
        })
        .await?;

        let subscriptions: Vec<Subscription> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::SUBSCRIPTIONS)
            .filter(|q| q.for_all([q.field("player_id").eq(player_id)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        deleted += subscriptions.len();
        self.batch_delete(
            &subscriptions,
            collections::SUBSCRIPTIONS,
            |s: &Subscription| s.external_ref.clone(),
        )
        .await?;

        self.get_client()?
            .fluent()
            .delete()
            .from(collections::PLAYERS)
            .document_id(player_id.to_string())
            .execute()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        deleted += 1;

        tracing::info!(player_id, deleted, "Player data erased");
        Ok(deleted)
    }

    // ─── Scores ──────────────────────────────────────────────────

    async fn record_score_atomic(
        &self,
        score: Score,
        quota: u32,
        event: OutboxEvent,
    ) -> Result<ScoreInsert, AppError> {
        self.bounded("record_score_atomic", async {
            let client = self.get_client()?;
            let counter_id = Self::attempt_counter_id(score.player_id, &score.day_key);

            // run_transaction hands the closure a client whose reads go
            // through the transaction's consistency selector, so the
            // counter lands in the read set: two concurrent submissions
            // reading the same attempt count cannot both commit. Aborted
            // transactions are retried with backoff.
            client
                .run_transaction(|db, transaction| {
                    let score = score.clone();
                    let event = event.clone();
                    let counter_id = counter_id.clone();
                    async move {
                        let counter: Option<AttemptCounter> = db
                            .fluent()
                            .select()
                            .by_id_in(collections::ATTEMPT_COUNTERS)
                            .obj()
                            .one(&counter_id)
                            .await?;

                        let mut counter = counter.unwrap_or(AttemptCounter {
                            player_id: score.player_id,
                            day_key: score.day_key.clone(),
                            used: 0,
                        });

                        if counter.used >= quota {
                            return Ok(ScoreInsert::QuotaExhausted {
                                games_today: counter.used,
                            });
                        }
                        counter.used += 1;

                        db.fluent()
                            .update()
                            .in_col(collections::SCORES)
                            .document_id(&score.score_id)
                            .object(&score)
                            .add_to_transaction(transaction)?;

                        db.fluent()
                            .update()
                            .in_col(collections::ATTEMPT_COUNTERS)
                            .document_id(&counter_id)
                            .object(&counter)
                            .add_to_transaction(transaction)?;

                        db.fluent()
                            .update()
                            .in_col(collections::OUTBOX)
                            .document_id(&event.id)
                            .object(&event)
                            .add_to_transaction(transaction)?;

                        let games_today = counter.used;
                        Ok(ScoreInsert::Recorded {
                            games_today,
                            remaining: quota.saturating_sub(games_today),
                        })
                    }
                    .boxed()
                })
                .await
                .map_err(|e| AppError::Storage(format!("Score transaction failed: {}", e)))
        })
        .await
    }

    async fn attempts_today(&self, player_id: u64, day_key: &str) -> Result<u32, AppError> {
        self.bounded("attempts_today", async {
            let counter: Option<AttemptCounter> = self
                .get_client()?
                .fluent()
                .select()
                .by_id_in(collections::ATTEMPT_COUNTERS)
                .obj()
                .one(&Self::attempt_counter_id(player_id, day_key))
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
            Ok(counter.map(|c| c.used).unwrap_or(0))
        })
        .await
    }

    async fn scores_for_month(&self, month_key: &str) -> Result<Vec<Score>, AppError> {
        let month_key = month_key.to_string();
        self.bounded("scores_for_month", async {
            self.get_client()?
                .fluent()
                .select()
                .from(collections::SCORES)
                .filter(move |q| q.for_all([q.field("month_key").eq(month_key.clone())]))
                .obj()
                .query()
                .await
                .map_err(|e| AppError::Storage(e.to_string()))
        })
        .await
    }

    async fn scores_for_player_month(
        &self,
        player_id: u64,
        month_key: &str,
    ) -> Result<Vec<Score>, AppError> {
        let month_key = month_key.to_string();
        self.bounded("scores_for_player_month", async {
            self.get_client()?
                .fluent()
                .select()
                .from(collections::SCORES)
                .filter(move |q| {
                    q.for_all([
                        q.field("player_id").eq(player_id),
                        q.field("month_key").eq(month_key.clone()),
                    ])
                })
                .obj()
                .query()
                .await
                .map_err(|e| AppError::Storage(e.to_string()))
        })
        .await
    }

    // ─── Payments ────────────────────────────────────────────────

    async fn record_payment(
        &self,
        payment: Payment,
        event: OutboxEvent,
    ) -> Result<bool, AppError> {
        self.bounded("record_payment", async {
            let client = self.get_client()?;

            // Webhooks are at-least-once; the gateway reference is the
            // dedupe key (and the document ID).
            let existing: Option<Payment> = client
                .fluent()
                .select()
                .by_id_in(collections::PAYMENTS)
                .obj()
                .one(&payment.external_ref)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
            if existing.is_some() {
                tracing::debug!(
                    external_ref = %payment.external_ref,
                    "Duplicate payment reference, skipping (webhook retry)"
                );
                return Ok(false);
            }

            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Storage(format!("Failed to begin transaction: {}", e)))?;

            client
                .fluent()
                .update()
                .in_col(collections::PAYMENTS)
                .document_id(&payment.external_ref)
                .object(&payment)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Storage(format!("Failed to add payment to transaction: {}", e))
                })?;

            client
                .fluent()
                .update()
                .in_col(collections::OUTBOX)
                .document_id(&event.id)
                .object(&event)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Storage(format!("Failed to add event to transaction: {}", e))
                })?;

            transaction
                .commit()
                .await
                .map_err(|e| AppError::Storage(format!("Transaction commit failed: {}", e)))?;

            Ok(true)
        })
        .await
    }

    async fn payments_for_month(&self, month_key: &str) -> Result<Vec<Payment>, AppError> {
        let month_key = month_key.to_string();
        self.bounded("payments_for_month", async {
            self.get_client()?
                .fluent()
                .select()
                .from(collections::PAYMENTS)
                .filter(move |q| q.for_all([q.field("month_key").eq(month_key.clone())]))
                .obj()
                .query()
                .await
                .map_err(|e| AppError::Storage(e.to_string()))
        })
        .await
    }

    async fn has_completed_payment(
        &self,
        player_id: u64,
        month_key: &str,
    ) -> Result<bool, AppError> {
        let month_key = month_key.to_string();
        self.bounded("has_completed_payment", async {
            let payments: Vec<Payment> = self
                .get_client()?
                .fluent()
                .select()
                .from(collections::PAYMENTS)
                .filter(move |q| {
                    q.for_all([
                        q.field("player_id").eq(player_id),
                        q.field("month_key").eq(month_key.clone()),
                    ])
                })
                .obj()
                .query()
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
            Ok(payments
                .iter()
                .any(|p| p.status == PaymentStatus::Completed))
        })
        .await
    }

    async fn expire_one_off_payments(
        &self,
        month_key: &str,
        exempt: &HashSet<u64>,
    ) -> Result<u32, AppError> {
        let to_expire: Vec<Payment> = self
            .payments_for_month(month_key)
            .await?
            .into_iter()
            .filter(|p| {
                p.kind == PaymentKind::OneOff
                    && p.status == PaymentStatus::Completed
                    && !exempt.contains(&p.player_id)
            })
            .collect();

        let client = self.get_client()?;
        stream::iter(to_expire.iter().cloned())
            .map(|mut payment| async move {
                payment.status = PaymentStatus::Expired;
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::PAYMENTS)
                    .document_id(&payment.external_ref)
                    .object(&payment)
                    .execute()
                    .await
                    .map_err(|e| AppError::Storage(e.to_string()))?;
                Ok::<_, AppError>(())
            })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<(), AppError>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>, AppError>>()?;

        Ok(to_expire.len() as u32)
    }

    // ─── Subscriptions ───────────────────────────────────────────

    async fn upsert_subscription(&self, sub: &Subscription) -> Result<(), AppError> {
        self.bounded("upsert_subscription", async {
            let _: () = self
                .get_client()?
                .fluent()
                .update()
                .in_col(collections::SUBSCRIPTIONS)
                .document_id(&sub.external_ref)
                .object(sub)
                .execute()
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn subscription_by_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<Subscription>, AppError> {
        self.bounded("subscription_by_ref", async {
            self.get_client()?
                .fluent()
                .select()
                .by_id_in(collections::SUBSCRIPTIONS)
                .obj()
                .one(external_ref)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))
        })
        .await
    }

    async fn active_subscription(&self, player_id: u64) -> Result<Option<Subscription>, AppError> {
        self.bounded("active_subscription", async {
            let subs: Vec<Subscription> = self
                .get_client()?
                .fluent()
                .select()
                .from(collections::SUBSCRIPTIONS)
                .filter(move |q| {
                    q.for_all([
                        q.field("player_id").eq(player_id),
                        q.field("status").eq("active"),
                    ])
                })
                .obj()
                .query()
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
            Ok(subs.into_iter().next())
        })
        .await
    }

    async fn cancel_subscription(
        &self,
        external_ref: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let Some(mut sub) = self.subscription_by_ref(external_ref).await? else {
            return Ok(false);
        };
        sub.status = SubscriptionStatus::Cancelled;
        sub.cancelled_at = Some(at);
        sub.next_billing = None;
        self.upsert_subscription(&sub).await?;
        Ok(true)
    }

    async fn players_with_active_subscription(&self) -> Result<HashSet<u64>, AppError> {
        self.bounded("players_with_active_subscription", async {
            let subs: Vec<Subscription> = self
                .get_client()?
                .fluent()
                .select()
                .from(collections::SUBSCRIPTIONS)
                .filter(|q| q.for_all([q.field("status").eq("active")]))
                .obj()
                .query()
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
            Ok(subs.into_iter().map(|s| s.player_id).collect())
        })
        .await
    }

    // ─── Monthly winners & rollover marker ───────────────────────

    async fn winners_record(
        &self,
        month_key: &str,
    ) -> Result<Option<MonthlyWinnersRecord>, AppError> {
        self.bounded("winners_record", async {
            self.get_client()?
                .fluent()
                .select()
                .by_id_in(collections::MONTHLY_WINNERS)
                .obj()
                .one(month_key)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))
        })
        .await
    }

    async fn put_winners_record(&self, record: &MonthlyWinnersRecord) -> Result<(), AppError> {
        // Insert-if-absent keeps the record immutable once written.
        if self.winners_record(&record.month_key).await?.is_some() {
            return Ok(());
        }
        self.bounded("put_winners_record", async {
            let _: () = self
                .get_client()?
                .fluent()
                .update()
                .in_col(collections::MONTHLY_WINNERS)
                .document_id(&record.month_key)
                .object(record)
                .execute()
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn rollover_marker(&self, month_key: &str) -> Result<bool, AppError> {
        self.bounded("rollover_marker", async {
            let marker: Option<RolloverMarker> = self
                .get_client()?
                .fluent()
                .select()
                .by_id_in(collections::ROLLOVER_MARKERS)
                .obj()
                .one(month_key)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
            Ok(marker.is_some())
        })
        .await
    }

    async fn put_rollover_marker(
        &self,
        month_key: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.bounded("put_rollover_marker", async {
            let marker = RolloverMarker {
                month_key: month_key.to_string(),
                closed_at: at,
            };
            let _: () = self
                .get_client()?
                .fluent()
                .update()
                .in_col(collections::ROLLOVER_MARKERS)
                .document_id(month_key)
                .object(&marker)
                .execute()
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
    }

    // ─── Outbox ──────────────────────────────────────────────────

    async fn append_events(&self, events: Vec<OutboxEvent>) -> Result<(), AppError> {
        let client = self.get_client()?;

        stream::iter(events)
            .map(|event| async move {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::OUTBOX)
                    .document_id(&event.id)
                    .object(&event)
                    .execute()
                    .await
                    .map_err(|e| AppError::Storage(e.to_string()))?;
                Ok::<_, AppError>(())
            })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<(), AppError>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>, AppError>>()?;

        Ok(())
    }

    async fn pending_events(&self, limit: usize) -> Result<Vec<OutboxEvent>, AppError> {
        self.bounded("pending_events", async {
            self.get_client()?
                .fluent()
                .select()
                .from(collections::OUTBOX)
                .filter(|q| q.for_all([q.field("delivered").eq(false)]))
                .order_by([(
                    "created_at",
                    firestore::FirestoreQueryDirection::Ascending,
                )])
                .limit(limit as u32)
                .obj()
                .query()
                .await
                .map_err(|e| AppError::Storage(e.to_string()))
        })
        .await
    }

    async fn mark_event_delivered(
        &self,
        event_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.bounded("mark_event_delivered", async {
            let event: Option<OutboxEvent> = self
                .get_client()?
                .fluent()
                .select()
                .by_id_in(collections::OUTBOX)
                .obj()
                .one(event_id)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;

            let Some(mut event) = event else {
                return Ok(());
            };
            event.delivered = true;
            event.delivered_at = Some(at);

            let _: () = self
                .get_client()?
                .fluent()
                .update()
                .in_col(collections::OUTBOX)
                .document_id(event_id)
                .object(&event)
                .execute()
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
    }
}
