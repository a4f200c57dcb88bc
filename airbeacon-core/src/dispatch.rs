//! Notification dispatch: one broadcast report, or one template message per subscriber.

use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{
    PollutionReading, RecipientId, Report, RestrictionDescriptor, SubscriberList, TemplateField,
    TemplateMessage,
};
use crate::ports::{BroadcastChannel, PortError, TemplateChannel};
use crate::report::AqiTier;

/// Field color for readings above the alert threshold.
pub const ALERT_COLOR: &str = "#FF0000";
/// Field color for everything else.
pub const NORMAL_COLOR: &str = "#173177";

const ALERT_THRESHOLD: u32 = 100;

/// Binary color rule for template fields, independent of the warning levels.
#[must_use]
pub fn severity_color(index: u32) -> &'static str {
    if index > ALERT_THRESHOLD {
        ALERT_COLOR
    } else {
        NORMAL_COLOR
    }
}

impl TemplateMessage {
    /// Assemble the template payload for one reading.
    #[must_use]
    pub fn compose(
        reading: &PollutionReading,
        descriptor: &RestrictionDescriptor,
        evaluation_date: NaiveDate,
        remark: &str,
    ) -> Self {
        let alert = severity_color(reading.index);
        let plain = |value: String| TemplateField {
            value,
            color: NORMAL_COLOR.to_owned(),
        };
        let colored = |value: String| TemplateField {
            value,
            color: alert.to_owned(),
        };

        Self {
            city: plain(reading.city_name.clone()),
            index: colored(reading.index.to_string()),
            severity: colored(AqiTier::from_index(reading.index).to_string()),
            restriction: plain(descriptor.summary()),
            date: plain(evaluation_date.to_string()),
            remark: plain(remark.to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of a broadcast attempt.
pub enum Delivery {
    /// The channel acknowledged the report.
    Delivered,
    /// The channel failed; the reason was logged.
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Per-recipient outcome of a template push.
pub struct PushSummary {
    /// Recipients that accepted the message.
    pub delivered: Vec<RecipientId>,
    /// Recipients whose send failed, with the reason.
    pub failed: Vec<(RecipientId, String)>,
}

/// Errors that abort the whole template push step.
#[derive(Debug, Error)]
pub enum PushError {
    /// No template channel was configured.
    #[error("template channel not configured")]
    NotConfigured,
    /// The access token could not be obtained.
    #[error("could not obtain access token: {0}")]
    Auth(#[source] PortError),
}

/// Sends reports and template messages through the configured channels.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    broadcast: Option<Arc<dyn BroadcastChannel>>,
    template: Option<Arc<dyn TemplateChannel>>,
}

impl NotificationDispatcher {
    /// Dispatcher with no channels; add them with the builder methods.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `channel` for broadcast reports.
    #[must_use]
    pub fn with_broadcast(mut self, channel: Arc<dyn BroadcastChannel>) -> Self {
        self.broadcast = Some(channel);
        self
    }

    /// Use `channel` for per-recipient template pushes.
    #[must_use]
    pub fn with_template(mut self, channel: Arc<dyn TemplateChannel>) -> Self {
        self.template = Some(channel);
        self
    }

    /// Publish the report once. Failures are logged, never retried here.
    pub async fn broadcast(&self, report: &Report) -> Delivery {
        let Some(channel) = self.broadcast.as_ref() else {
            warn!("no broadcast channel configured, report not sent");
            return Delivery::Failed(String::from("broadcast channel not configured"));
        };

        match channel.publish(report).await {
            Ok(()) => {
                info!(title = %report.title, "report delivered");
                Delivery::Delivered
            }
            Err(err) => {
                warn!(title = %report.title, error = %err, "report delivery failed");
                Delivery::Failed(err.to_string())
            }
        }
    }

    /// Send `message` to every recipient in turn.
    ///
    /// A failed recipient is logged and skipped; the remaining sends still happen.
    ///
    /// # Errors
    ///
    /// Returns a [`PushError`] when no channel is configured or no token can be obtained.
    pub async fn push_each(
        &self,
        message: &TemplateMessage,
        recipients: &SubscriberList,
    ) -> Result<PushSummary, PushError> {
        let channel = self.template.as_ref().ok_or(PushError::NotConfigured)?;
        let token = channel.access_token().await.map_err(PushError::Auth)?;

        let mut summary = PushSummary::default();
        for recipient in recipients.iter() {
            match channel.send(&token, recipient, message).await {
                Ok(()) => summary.delivered.push(recipient.clone()),
                Err(err) => {
                    warn!(%recipient, error = %err, "template push failed");
                    summary.failed.push((recipient.clone(), err.to_string()));
                }
            }
        }

        info!(
            delivered = summary.delivered.len(),
            failed = summary.failed.len(),
            "template push finished"
        );
        Ok(summary)
    }
}
