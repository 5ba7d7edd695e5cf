use std::str::FromStr;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cron::Schedule;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::models::TransactionRow;
use crate::db::queries;
use crate::domain::TransactionStatus;
use crate::error::AppError;
use crate::gateway::{CinetPayClient, GatewayError, GatewayPaymentStatus};

const SWEEP_BATCH_SIZE: i64 = 25;

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepReport {
    pub examined: usize,
    pub reconciled: usize,
    pub expired: usize,
}

/// Periodically reconciles aged `PENDING` transactions against the
/// gateway and expires the ones nobody ever paid.
#[derive(Clone)]
pub struct ExpirySweeper {
    pool: PgPool,
    gateway: CinetPayClient,
    pending_ttl: ChronoDuration,
    expiry_cutoff: ChronoDuration,
}

impl ExpirySweeper {
    pub fn new(pool: PgPool, gateway: CinetPayClient, config: &Config) -> Self {
        Self {
            pool,
            gateway,
            pending_ttl: ChronoDuration::minutes(config.pending_ttl_minutes),
            expiry_cutoff: ChronoDuration::minutes(config.expiry_cutoff_minutes),
        }
    }

    /// Runs forever on the given cron schedule. Intended for
    /// `tokio::spawn`; an unparseable schedule disables the sweeper
    /// rather than taking the service down.
    pub async fn run(self, schedule_expr: String) {
        let schedule = match Schedule::from_str(&schedule_expr) {
            Ok(schedule) => schedule,
            Err(e) => {
                error!(schedule = %schedule_expr, error = %e, "invalid sweep schedule, sweeper disabled");
                return;
            }
        };

        info!(schedule = %schedule_expr, "expiry sweeper started");

        loop {
            let Some(next_run) = schedule.upcoming(Utc).next() else {
                warn!("sweep schedule has no upcoming runs, sweeper stopped");
                return;
            };

            let wait = (next_run - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            match self.sweep_once().await {
                Ok(report) if report.examined > 0 => info!(
                    examined = report.examined,
                    reconciled = report.reconciled,
                    expired = report.expired,
                    "sweep pass finished"
                ),
                Ok(_) => debug!("sweep pass found nothing to do"),
                Err(e) => error!(error = %e, "sweep pass failed"),
            }
        }
    }

    /// One reconciliation pass. Rows are locked with `SKIP LOCKED` so
    /// overlapping passes (or a second instance) never double-process.
    pub async fn sweep_once(&self) -> Result<SweepReport, AppError> {
        let mut db_tx = self.pool.begin().await?;
        let now = Utc::now();

        let stale =
            queries::get_stale_pending(&mut db_tx, now - self.pending_ttl, SWEEP_BATCH_SIZE)
                .await?;

        let mut report = SweepReport {
            examined: stale.len(),
            ..SweepReport::default()
        };

        for row in &stale {
            match self.gateway.check_payment(&row.transaction_ref).await {
                Ok(check) => match check.status {
                    GatewayPaymentStatus::Accepted => {
                        queries::mark_status(
                            &mut db_tx,
                            row.id,
                            TransactionStatus::Accepted,
                            check.operator_id.as_deref(),
                        )
                        .await?;
                        report.reconciled += 1;
                        info!(
                            transaction_ref = %row.transaction_ref,
                            "missed notification reconciled as ACCEPTED"
                        );
                    }
                    GatewayPaymentStatus::Refused => {
                        queries::mark_status(
                            &mut db_tx,
                            row.id,
                            TransactionStatus::Refused,
                            check.operator_id.as_deref(),
                        )
                        .await?;
                        report.reconciled += 1;
                        info!(
                            transaction_ref = %row.transaction_ref,
                            "missed notification reconciled as REFUSED"
                        );
                    }
                    GatewayPaymentStatus::Pending => {
                        if self.expire_if_past_cutoff(&mut db_tx, row, now).await? {
                            report.expired += 1;
                        }
                    }
                },
                // The gateway not knowing the reference means no payment
                // was ever opened for it; old enough rows can expire.
                Err(GatewayError::Declined { code, message }) => {
                    debug!(
                        transaction_ref = %row.transaction_ref,
                        code = %code,
                        message = %message,
                        "gateway does not recognize transaction"
                    );
                    if self.expire_if_past_cutoff(&mut db_tx, row, now).await? {
                        report.expired += 1;
                    }
                }
                // Transport trouble: leave the row alone and let the next
                // pass retry.
                Err(e) => {
                    warn!(
                        transaction_ref = %row.transaction_ref,
                        error = %e,
                        "gateway check failed during sweep"
                    );
                }
            }
        }

        db_tx.commit().await?;
        Ok(report)
    }

    async fn expire_if_past_cutoff(
        &self,
        db_tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        row: &TransactionRow,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        if row.created_at > now - self.expiry_cutoff {
            return Ok(false);
        }

        queries::mark_status(db_tx, row.id, TransactionStatus::Expired, None).await?;
        info!(transaction_ref = %row.transaction_ref, "stale transaction expired");
        Ok(true)
    }
}
