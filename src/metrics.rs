//! Statement metrics and tracing spans.
//!
//! [`METRICS`] is only compiled with the `metrics` feature and reports through the
//! global OpenTelemetry meter; install a meter provider (Prometheus, OTLP, ...) in
//! the application to export it. [`tracing_helpers`] needs the `tracing` feature.

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
    KeyValue,
};

#[cfg(feature = "metrics")]
pub static METRICS: Lazy<QuarryMetrics> = Lazy::new(QuarryMetrics::init);

#[cfg(feature = "metrics")]
pub struct QuarryMetrics {
    pub statements_total: Counter<u64>,
    pub statement_errors_total: Counter<u64>,
    pub statement_duration: Histogram<f64>,
    pub batches_total: Counter<u64>,
    pub transactions_total: Counter<u64>,
}

#[cfg(feature = "metrics")]
impl QuarryMetrics {
    pub fn init() -> Self {
        let meter = global::meter("quarry");

        let statements_total = meter
            .u64_counter("quarry_statements_total")
            .with_description("Total statements executed")
            .build();

        let statement_errors_total = meter
            .u64_counter("quarry_statement_errors_total")
            .with_description("Statements that failed in the driver")
            .build();

        let statement_duration = meter
            .f64_histogram("quarry_statement_duration_seconds")
            .with_description("Duration of statements")
            .build();

        let batches_total = meter
            .u64_counter("quarry_batches_total")
            .with_description("Batched insert and delete chunks")
            .build();

        let transactions_total = meter
            .u64_counter("quarry_transactions_total")
            .with_description("Transactions finished, by outcome")
            .build();

        Self {
            statements_total,
            statement_errors_total,
            statement_duration,
            batches_total,
            transactions_total,
        }
    }

    pub fn record_statement(&self, elapsed: std::time::Duration) {
        self.statements_total.add(1, &[]);
        self.statement_duration.record(elapsed.as_secs_f64(), &[]);
    }

    pub fn record_statement_error(&self) {
        self.statement_errors_total.add(1, &[]);
    }

    pub fn record_batch(&self) {
        self.batches_total.add(1, &[]);
    }

    pub fn record_transaction(&self, outcome: &'static str) {
        self.transactions_total
            .add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

/// Span constructors entered around driver work
#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    /// Statement text is truncated so spans stay small
    const MAX_STATEMENT_LEN: usize = 256;

    fn truncate(sql: &str) -> &str {
        if sql.len() <= MAX_STATEMENT_LEN {
            return sql;
        }
        let mut end = MAX_STATEMENT_LEN;
        while !sql.is_char_boundary(end) {
            end -= 1;
        }
        &sql[..end]
    }

    pub fn execute_statement_span(sql: &str) -> Span {
        info_span!("quarry.statement", db.statement = truncate(sql))
    }

    pub fn begin_transaction_span() -> Span {
        info_span!("quarry.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        info_span!("quarry.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        info_span!("quarry.transaction.rollback")
    }

    pub fn acquire_connection_span() -> Span {
        info_span!("quarry.connection.acquire")
    }

    pub fn schema_update_span(operation: &'static str) -> Span {
        info_span!("quarry.schema", operation)
    }

}
