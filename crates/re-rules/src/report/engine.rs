//! Report configuration and the engine that renders and delivers due
//! reports (spec §4.H). Reuses [`Schedule`]/[`crate::scheduler::nextdue`]
//! for its own `next_due` arithmetic rather than inventing a second
//! scheduling grammar.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use re_core::error::RulesError;
use re_core::ports::{Aggregation, Emailer, ReadingsQuery, ReadingsReader};
use re_core::rule::Schedule;

use crate::scheduler::nextdue;
use crate::scheduler::ReportScheduler;

use super::render::{self, MetricSeries};
use super::timeexpr;

/// Where a rendered report goes once it is ready (spec §4.H "output
/// action").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportAction {
    View,
    Download,
    Email { recipients: Vec<String>, subject: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    Pdf,
    Csv,
    Both,
}

/// One metric to include in a report. `from`/`to` accept the `now()`
/// expression grammar, resolved against the tick's due time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricQuery {
    pub name: String,
    pub channel: String,
    pub client: String,
    pub subtopic: String,
    pub protocol: String,
    pub from: String,
    pub to: String,
    pub aggregation: Option<Aggregation>,
    pub interval_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub id: Uuid,
    pub domain_id: String,
    pub name: String,
    pub schedule: Schedule,
    pub metrics: Vec<MetricQuery>,
    pub format: ReportFormat,
    pub action: ReportAction,
    pub enabled: bool,
}

/// Persistence for report configurations, listed and advanced the same
/// way the scheduler lists and advances due rules.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn list_due(&self, due: DateTime<Utc>) -> Result<Vec<ReportConfig>, RulesError>;
    async fn advance_due(&self, id: Uuid, due: Option<DateTime<Utc>>) -> Result<(), RulesError>;
}

pub struct ReportEngine {
    repository: Arc<dyn ReportRepository>,
    reader: Arc<dyn ReadingsReader>,
    emailer: Arc<dyn Emailer>,
}

impl ReportEngine {
    pub fn new(repository: Arc<dyn ReportRepository>, reader: Arc<dyn ReadingsReader>, emailer: Arc<dyn Emailer>) -> Self {
        Self {
            repository,
            reader,
            emailer,
        }
    }

    async fn gather(&self, config: &ReportConfig, now: DateTime<Utc>) -> Result<Vec<MetricSeries>, RulesError> {
        let mut series = Vec::with_capacity(config.metrics.len());
        for metric in &config.metrics {
            let from = timeexpr::resolve(&metric.from, now)?;
            let to = timeexpr::resolve(&metric.to, now)?;
            let query = ReadingsQuery {
                channel: metric.channel.clone(),
                client: metric.client.clone(),
                subtopic: metric.subtopic.clone(),
                protocol: metric.protocol.clone(),
                from,
                to,
                aggregation: metric.aggregation,
                interval: metric.interval_seconds.map(Duration::seconds),
            };
            let records = self.reader.query(query).await?;
            series.push(MetricSeries {
                name: metric.name.clone(),
                records,
            });
        }
        Ok(series)
    }

    fn render(&self, config: &ReportConfig, series: &[MetricSeries]) -> Result<(Option<Vec<u8>>, Option<Vec<u8>>), RulesError> {
        let pdf = matches!(config.format, ReportFormat::Pdf | ReportFormat::Both)
            .then(|| render::render_pdf(&config.name, series))
            .transpose()?;
        let csv = matches!(config.format, ReportFormat::Csv | ReportFormat::Both)
            .then(|| render::render_csv(series))
            .transpose()?;
        Ok((pdf, csv))
    }

    /// Render a report on demand for a `View`/`Download` request, handing
    /// the caller the raw bytes instead of dispatching them (spec §4.H).
    pub async fn render_now(&self, config: &ReportConfig, now: DateTime<Utc>) -> Result<(Option<Vec<u8>>, Option<Vec<u8>>), RulesError> {
        let series = self.gather(config, now).await?;
        self.render(config, &series)
    }

    async fn run_one(&self, config: &ReportConfig, now: DateTime<Utc>) {
        let series = match self.gather(config, now).await {
            Ok(series) => series,
            Err(e) => {
                warn!(report_id = %config.id, error = %e, "failed to gather report metrics");
                return;
            }
        };
        let (pdf, csv) = match self.render(config, &series) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(report_id = %config.id, error = %e, "failed to render report");
                return;
            }
        };

        match &config.action {
            ReportAction::View | ReportAction::Download => {
                // A scheduler-triggered run has no request/response caller
                // to hand the bytes to; View/Download only resolve through
                // `render_now`, called directly from the request path.
                info!(report_id = %config.id, "scheduled report rendered");
            }
            ReportAction::Email { recipients, subject } => {
                let mut attachments = HashMap::new();
                if let Some(bytes) = pdf {
                    attachments.insert(format!("{}.pdf", config.name), bytes);
                }
                if let Some(bytes) = csv {
                    attachments.insert(format!("{}.csv", config.name), bytes);
                }
                if let Err(e) = self
                    .emailer
                    .send_email_notification(recipients, "re-reports", subject, "", "", "", "", &attachments)
                    .await
                {
                    warn!(report_id = %config.id, error = %e, "failed to email report");
                }
            }
        }
    }
}

#[async_trait]
impl ReportScheduler for ReportEngine {
    async fn run_due(&self, due: DateTime<Utc>) {
        let configs = match self.repository.list_due(due).await {
            Ok(configs) => configs,
            Err(e) => {
                warn!(error = %e, "failed to list due reports");
                return;
            }
        };

        for config in configs {
            if !config.enabled {
                continue;
            }
            let next = nextdue::advance(&config.schedule, due);
            if let Err(e) = self.repository.advance_due(config.id, next).await {
                warn!(report_id = %config.id, error = %e, "failed to advance report next_due");
            }
            self.run_one(&config, due).await;
        }
    }
}
