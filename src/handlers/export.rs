use axum::{
    BoxError,
    body::{Body, Bytes},
    extract::{Query, State},
    http::header,
    response::Response,
};
use chrono::{DateTime, Duration, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::AppState;
use crate::db::models::TransactionRow;
use crate::db::queries;
use crate::domain::TransactionStatus;
use crate::error::AppError;
use crate::validation::ValidationError;

/// Batch size for the paged export scan.
const BATCH_SIZE: i64 = 1000;

const CSV_HEADER: &str =
    "id,transaction_ref,agent_id,amount,currency,status,payment_method,operator_id,created_at,updated_at";

/// Query parameters for the export endpoint
#[derive(Debug, Deserialize, Clone)]
pub struct ExportQuery {
    /// Export format: "csv" or "json"
    #[serde(default = "default_format")]
    pub format: String,
    /// Start date filter (inclusive) - format: YYYY-MM-DD
    pub from: Option<String>,
    /// End date filter (inclusive) - format: YYYY-MM-DD
    pub to: Option<String>,
    /// Filter by transaction status
    pub status: Option<String>,
}

fn default_format() -> String {
    "csv".to_string()
}

impl Default for ExportQuery {
    fn default() -> Self {
        Self {
            format: default_format(),
            from: None,
            to: None,
            status: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportFormat {
    Csv,
    Json,
}

/// CSV row shape. Everything is a String so the writer never has to
/// guess at formatting; payment tokens stay out of exports.
#[derive(Serialize)]
struct TransactionCsvRow {
    id: String,
    transaction_ref: String,
    agent_id: String,
    amount: String,
    currency: String,
    status: String,
    payment_method: String,
    operator_id: String,
    created_at: String,
    updated_at: String,
}

impl From<&TransactionRow> for TransactionCsvRow {
    fn from(row: &TransactionRow) -> Self {
        TransactionCsvRow {
            id: row.id.to_string(),
            transaction_ref: row.transaction_ref.clone(),
            agent_id: row.agent_id.to_string(),
            amount: row.amount.to_string(),
            currency: row.currency.clone(),
            status: row.status.clone(),
            payment_method: row.payment_method.clone(),
            operator_id: row.operator_id.clone().unwrap_or_default(),
            created_at: row.created_at.to_rfc3339(),
            updated_at: row.updated_at.to_rfc3339(),
        }
    }
}

/// JSON export shape, same field set as the CSV.
#[derive(Serialize)]
struct TransactionJsonRow {
    id: String,
    transaction_ref: String,
    agent_id: String,
    amount: String,
    currency: String,
    status: String,
    payment_method: String,
    operator_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl From<&TransactionRow> for TransactionJsonRow {
    fn from(row: &TransactionRow) -> Self {
        TransactionJsonRow {
            id: row.id.to_string(),
            transaction_ref: row.transaction_ref.clone(),
            agent_id: row.agent_id.to_string(),
            amount: row.amount.to_string(),
            currency: row.currency.clone(),
            status: row.status.clone(),
            payment_method: row.payment_method.clone(),
            operator_id: row.operator_id.clone(),
            created_at: row.created_at.to_rfc3339(),
            updated_at: row.updated_at.to_rfc3339(),
        }
    }
}

/// Parses a filter date, accepting YYYY-MM-DD or a full RFC 3339 stamp.
fn parse_date(field: &'static str, raw: &str) -> Result<DateTime<Utc>, AppError> {
    let expanded = if raw.len() == 10 {
        format!("{raw}T00:00:00Z")
    } else {
        raw.to_string()
    };

    DateTime::parse_from_rfc3339(&expanded)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| ValidationError::new(field, format!("invalid date: {raw}")).into())
}

fn export_stream(
    pool: PgPool,
    format: ExportFormat,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    status: Option<TransactionStatus>,
) -> impl Stream<Item = Result<Bytes, BoxError>> {
    async_stream::try_stream! {
        match format {
            ExportFormat::Csv => yield Bytes::from(format!("{CSV_HEADER}\n")),
            ExportFormat::Json => yield Bytes::from_static(b"["),
        }

        let mut offset: i64 = 0;
        let mut first = true;

        loop {
            let rows = queries::export_page(
                &pool,
                from,
                to,
                status.map(|s| s.as_str()),
                BATCH_SIZE,
                offset,
            )
            .await?;

            for row in &rows {
                match format {
                    ExportFormat::Csv => {
                        // Writing into a Vec cannot fail.
                        let mut wtr = csv::WriterBuilder::new()
                            .has_headers(false)
                            .from_writer(Vec::new());
                        wtr.serialize(TransactionCsvRow::from(row)).unwrap();
                        yield Bytes::from(wtr.into_inner().unwrap());
                    }
                    ExportFormat::Json => {
                        let encoded = serde_json::to_string(&TransactionJsonRow::from(row))?;
                        let mut chunk = String::with_capacity(encoded.len() + 1);
                        if !first {
                            chunk.push(',');
                        }
                        chunk.push_str(&encoded);
                        first = false;
                        yield Bytes::from(chunk);
                    }
                }
            }

            if rows.len() < BATCH_SIZE as usize {
                break;
            }
            offset += BATCH_SIZE;
        }

        if format == ExportFormat::Json {
            yield Bytes::from_static(b"]");
        }
    }
}

#[utoipa::path(
    get,
    path = "/transactions/export",
    params(
        ("format" = Option<String>, Query, description = "csv (default) or json"),
        ("from" = Option<String>, Query, description = "Inclusive start date, YYYY-MM-DD"),
        ("to" = Option<String>, Query, description = "Inclusive end date, YYYY-MM-DD"),
        ("status" = Option<String>, Query, description = "PENDING, ACCEPTED, REFUSED or EXPIRED")
    ),
    responses(
        (status = 200, description = "Transaction export, streamed in batches"),
        (status = 400, description = "Invalid date or status filter"),
        (status = 401, description = "Missing or invalid admin key")
    ),
    tag = "Admin"
)]
pub async fn export_transactions(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let from = match &query.from {
        Some(raw) => Some(parse_date("from", raw)?),
        None => None,
    };
    // Push the bound past the requested day so the whole day is covered.
    let to = match &query.to {
        Some(raw) => Some(parse_date("to", raw)? + Duration::days(1)),
        None => None,
    };
    let status = match &query.status {
        Some(raw) => Some(TransactionStatus::parse(raw).ok_or_else(|| {
            ValidationError::new("status", format!("unknown status: {raw}"))
        })?),
        None => None,
    };

    let format = match query.format.to_lowercase().as_str() {
        "json" => ExportFormat::Json,
        _ => ExportFormat::Csv,
    };

    let (content_type, extension) = match format {
        ExportFormat::Csv => ("text/csv", "csv"),
        ExportFormat::Json => ("application/json", "json"),
    };
    let filename = format!("transactions_{}.{}", Utc::now().format("%Y-%m"), extension);

    let stream = export_stream(state.db.clone(), format, from, to, status);

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(Body::from_stream(stream))
        .map_err(|err| AppError::Internal(err.to_string()))
}
