//! High-level service facade running one fetch, evaluate, gate, and notify cycle.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{info, warn};

use crate::dispatch::{Delivery, NotificationDispatcher, PushSummary};
use crate::gate::IdempotencyGate;
use crate::model::{
    DayKind, ForecastEntry, PollutionReading, Report, RestrictionDescriptor, SubscriberList,
    TemplateMessage,
};
use crate::policy::{TailDigitTable, evaluate};
use crate::ports::{AirQualitySource, DayClassifier, PortError};
use crate::report::ReportFormatter;

/// Everything derived for one run before anything is sent.
#[derive(Debug, Clone)]
pub struct Briefing {
    /// Date the restriction applies to (today).
    pub evaluation_date: NaiveDate,
    /// Latest published reading.
    pub reading: PollutionReading,
    /// Forecast, empty when unavailable.
    pub forecast: Vec<ForecastEntry>,
    /// Calendar classification used for the evaluation.
    pub day: DayKind,
    /// Restriction in force.
    pub descriptor: RestrictionDescriptor,
    /// Rendered report.
    pub report: Report,
}

/// Switches for a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Send even when the reading is unchanged.
    pub force: bool,
    /// Render only; neither the gate nor any channel is touched.
    pub dry_run: bool,
}

/// How a run ended. Every variant is a clean exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The reading could not be fetched; nothing to report.
    SourceUnavailable(String),
    /// The reading has not changed since the last notification.
    Unchanged,
    /// The idempotency state could not be read or written; nothing was sent.
    StateError(String),
    /// Dry run; the report that would have been sent.
    DryRun(Report),
    /// The broadcast was acknowledged.
    Delivered,
    /// The broadcast failed.
    DeliveryFailed(String),
    /// There is nobody to push to.
    NoRecipients,
    /// Template push finished (possibly with per-recipient failures).
    Pushed(PushSummary),
    /// Template push aborted before any send.
    PushAborted(String),
}

/// Public entry point wiring source, calendar, policy, gate, and dispatcher.
pub struct AirBeaconService {
    source: Arc<dyn AirQualitySource>,
    classifier: Arc<dyn DayClassifier>,
    dispatcher: NotificationDispatcher,
    gate: IdempotencyGate,
    formatter: ReportFormatter,
    table: TailDigitTable,
    city: String,
}

impl AirBeaconService {
    /// Create a service for `city` with the default tail-digit table.
    #[must_use]
    pub fn new<S: Into<String>>(
        source: Arc<dyn AirQualitySource>,
        classifier: Arc<dyn DayClassifier>,
        dispatcher: NotificationDispatcher,
        gate: IdempotencyGate,
        formatter: ReportFormatter,
        city: S,
    ) -> Self {
        Self {
            source,
            classifier,
            dispatcher,
            gate,
            formatter,
            table: TailDigitTable::default(),
            city: city.into(),
        }
    }

    /// Replace the tail-digit table.
    #[must_use]
    pub fn with_tail_digits(mut self, table: TailDigitTable) -> Self {
        self.table = table;
        self
    }

    /// Classify `date`, falling back to the ISO weekday when the calendar fails.
    pub async fn day_kind(&self, date: NaiveDate) -> DayKind {
        match self.classifier.classify(date).await {
            Ok(day) => day,
            Err(err) => {
                let fallback = DayKind::from_weekday(date);
                warn!(%date, error = %err, ?fallback, "day classifier unavailable, using weekday");
                fallback
            }
        }
    }

    /// Fetch and evaluate everything for a run at local time `now`.
    ///
    /// The reading is the one published for the prior day at midnight. A failing
    /// forecast only drops the forecast section.
    ///
    /// # Errors
    ///
    /// Returns the [`PortError`] of the reading fetch when no reading is available.
    pub async fn prepare(&self, now: NaiveDateTime) -> Result<Briefing, PortError> {
        let evaluation_date = now.date();
        let time_point = evaluation_date
            .pred_opt()
            .unwrap_or(evaluation_date)
            .and_time(NaiveTime::MIN);

        let reading = self.source.reading(&self.city, time_point).await?;
        info!(
            city = %reading.city_name,
            index = reading.index,
            pollutant = %reading.dominant_pollutant,
            observed = %reading.observed_date,
            "reading fetched"
        );

        let forecast = match self.source.forecast(&self.city).await {
            Ok(forecast) => forecast,
            Err(err) => {
                warn!(error = %err, "forecast unavailable, omitting forecast section");
                Vec::new()
            }
        };

        let day = self.day_kind(evaluation_date).await;
        let descriptor = evaluate(reading.index, evaluation_date, day, &self.table);
        info!(
            %evaluation_date,
            level = ?descriptor.warning_level,
            window = %descriptor.time_window,
            "restriction evaluated"
        );
        let report = self
            .formatter
            .render(&reading, &descriptor, &forecast, evaluation_date);

        Ok(Briefing {
            evaluation_date,
            reading,
            forecast,
            day,
            descriptor,
            report,
        })
    }

    /// Broadcast the daily report.
    pub async fn run_broadcast(&self, now: NaiveDateTime, options: RunOptions) -> RunOutcome {
        let briefing = match self.prepare(now).await {
            Ok(briefing) => briefing,
            Err(err) => return source_unavailable(&err),
        };
        if options.dry_run {
            return RunOutcome::DryRun(briefing.report);
        }
        if let Some(outcome) = self.pass_gate(&briefing.reading, options.force) {
            return outcome;
        }

        match self.dispatcher.broadcast(&briefing.report).await {
            Delivery::Delivered => RunOutcome::Delivered,
            Delivery::Failed(reason) => RunOutcome::DeliveryFailed(reason),
        }
    }

    /// Push a template message to every subscriber.
    pub async fn run_push(
        &self,
        now: NaiveDateTime,
        recipients: &SubscriberList,
        options: RunOptions,
    ) -> RunOutcome {
        if recipients.is_empty() {
            info!("subscriber list is empty, nothing to push");
            return RunOutcome::NoRecipients;
        }

        let briefing = match self.prepare(now).await {
            Ok(briefing) => briefing,
            Err(err) => return source_unavailable(&err),
        };
        if options.dry_run {
            return RunOutcome::DryRun(briefing.report);
        }
        if let Some(outcome) = self.pass_gate(&briefing.reading, options.force) {
            return outcome;
        }

        let remark = format!("Data source: {}", self.formatter.source_label());
        let message = TemplateMessage::compose(
            &briefing.reading,
            &briefing.descriptor,
            briefing.evaluation_date,
            &remark,
        );
        match self.dispatcher.push_each(&message, recipients).await {
            Ok(summary) => RunOutcome::Pushed(summary),
            Err(err) => {
                warn!(error = %err, "template push aborted");
                RunOutcome::PushAborted(err.to_string())
            }
        }
    }

    // Returns the outcome to stop with, or None to go on sending.
    fn pass_gate(&self, reading: &PollutionReading, force: bool) -> Option<RunOutcome> {
        match self.gate.should_notify(reading) {
            Ok(true) => None,
            Ok(false) if force => {
                info!("reading unchanged, sending anyway (forced)");
                None
            }
            Ok(false) => {
                info!("reading unchanged, skipping notification");
                Some(RunOutcome::Unchanged)
            }
            Err(err) => {
                warn!(error = %err, path = %self.gate.path().display(), "idempotency state unusable");
                Some(RunOutcome::StateError(err.to_string()))
            }
        }
    }
}

fn source_unavailable(err: &PortError) -> RunOutcome {
    warn!(error = %err, "reading unavailable, nothing to report");
    RunOutcome::SourceUnavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeBroadcast, FakeClassifier, FakeSource, FakeTemplateChannel};
    use crate::config::{DEFAULT_PUSH_STATE_FILE, DEFAULT_STATE_FILE};
    use crate::model::WarningLevel;
    use tempfile::{TempDir, tempdir};

    struct Harness {
        _dir: TempDir,
        source: FakeSource,
        broadcast: FakeBroadcast,
        template: FakeTemplateChannel,
        service: AirBeaconService,
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    // Wednesday 2024-05-15, 08:00 local time.
    fn wednesday_morning() -> NaiveDateTime {
        date(2024, 5, 15).and_hms_opt(8, 0, 0).unwrap()
    }

    fn saturday_morning() -> NaiveDateTime {
        date(2024, 5, 18).and_hms_opt(8, 0, 0).unwrap()
    }

    fn reading(index: u32) -> PollutionReading {
        PollutionReading {
            city_name: "成都市".into(),
            index,
            dominant_pollutant: "PM2.5".into(),
            observed_date: date(2024, 5, 14),
        }
    }

    fn forecast() -> Vec<ForecastEntry> {
        vec![ForecastEntry {
            date: date(2024, 5, 16),
            index_min: 70,
            index_max: 95,
            level: "moderate".into(),
            dominant_pollutant: "O3".into(),
        }]
    }

    fn harness(source: FakeSource, classifier: FakeClassifier) -> Harness {
        harness_with(source, classifier, FakeTemplateChannel::new())
    }

    fn harness_with(
        source: FakeSource,
        classifier: FakeClassifier,
        template: FakeTemplateChannel,
    ) -> Harness {
        let dir = tempdir().unwrap();
        let broadcast = FakeBroadcast::new();
        let dispatcher = NotificationDispatcher::new()
            .with_broadcast(Arc::new(broadcast.clone()))
            .with_template(Arc::new(template.clone()));
        let service = AirBeaconService::new(
            Arc::new(source.clone()),
            Arc::new(classifier),
            dispatcher,
            IdempotencyGate::new(dir.path().join("status.json")),
            ReportFormatter::new("test source"),
            "成都市",
        );
        Harness {
            _dir: dir,
            source,
            broadcast,
            template,
            service,
        }
    }

    #[tokio::test]
    async fn requests_prior_day_midnight() {
        let h = harness(FakeSource::new(reading(80)), FakeClassifier::fixed(DayKind::WORKDAY));

        h.service.prepare(wednesday_morning()).await.unwrap();

        assert_eq!(
            h.source.reading_calls(),
            vec![(
                "成都市".to_owned(),
                date(2024, 5, 14).and_hms_opt(0, 0, 0).unwrap()
            )]
        );
    }

    #[tokio::test]
    async fn broadcast_once_then_suppress() {
        let h = harness(
            FakeSource::new(reading(180)).with_forecast(forecast()),
            FakeClassifier::fixed(DayKind::WORKDAY),
        );

        let first = h.service.run_broadcast(wednesday_morning(), RunOptions::default()).await;
        let second = h.service.run_broadcast(wednesday_morning(), RunOptions::default()).await;

        assert_eq!(first, RunOutcome::Delivered);
        assert_eq!(second, RunOutcome::Unchanged);
        let published = h.broadcast.published();
        assert_eq!(published.len(), 1);
        assert!(published[0].body.contains("Orange alert restriction"));
        assert!(published[0].body.contains("| 05-16 | Thursday | 70-95 |"));
    }

    #[tokio::test]
    async fn changed_reading_is_sent_again() {
        let h = harness(FakeSource::new(reading(80)), FakeClassifier::fixed(DayKind::WORKDAY));

        h.service.run_broadcast(wednesday_morning(), RunOptions::default()).await;
        h.source.set_reading(reading(81));
        let outcome = h.service.run_broadcast(wednesday_morning(), RunOptions::default()).await;

        assert_eq!(outcome, RunOutcome::Delivered);
        assert_eq!(h.broadcast.published().len(), 2);
    }

    #[tokio::test]
    async fn force_bypasses_the_gate() {
        let h = harness(FakeSource::new(reading(80)), FakeClassifier::fixed(DayKind::WORKDAY));
        let forced = RunOptions {
            force: true,
            dry_run: false,
        };

        h.service.run_broadcast(wednesday_morning(), RunOptions::default()).await;
        let outcome = h.service.run_broadcast(wednesday_morning(), forced).await;

        assert_eq!(outcome, RunOutcome::Delivered);
        assert_eq!(h.broadcast.published().len(), 2);
    }

    #[tokio::test]
    async fn forecast_failure_degrades_report() {
        let h = harness(
            FakeSource::new(reading(60)).failing_forecast(PortError::SourceUnavailable, "HTTP 503"),
            FakeClassifier::fixed(DayKind::WORKDAY),
        );

        let outcome = h.service.run_broadcast(wednesday_morning(), RunOptions::default()).await;

        assert_eq!(outcome, RunOutcome::Delivered);
        let body = &h.broadcast.published()[0].body;
        assert!(body.contains("Regular tail-digit restriction"));
        assert!(!body.contains("forecast"));
        assert_eq!(h.source.forecast_calls(), 1);
    }

    #[tokio::test]
    async fn missing_reading_aborts_quietly() {
        let h = harness(
            FakeSource::unavailable("city not listed"),
            FakeClassifier::fixed(DayKind::WORKDAY),
        );

        let outcome = h.service.run_broadcast(wednesday_morning(), RunOptions::default()).await;

        assert!(matches!(outcome, RunOutcome::SourceUnavailable(_)));
        assert!(h.broadcast.published().is_empty());
        assert_eq!(h.source.forecast_calls(), 0);
    }

    #[tokio::test]
    async fn classifier_outage_falls_back_to_weekday() {
        let weekend = harness(FakeSource::new(reading(220)), FakeClassifier::unreachable());
        let briefing = weekend.service.prepare(saturday_morning()).await.unwrap();
        assert_eq!(briefing.day, DayKind::WEEKEND);
        assert!(briefing.descriptor.rule_text.contains("no restriction"));

        let weekday = harness(FakeSource::new(reading(180)), FakeClassifier::unreachable());
        let briefing = weekday.service.prepare(wednesday_morning()).await.unwrap();
        assert_eq!(briefing.day, DayKind::WORKDAY);
        assert_eq!(briefing.descriptor.warning_level, WarningLevel::Orange);
    }

    #[tokio::test]
    async fn holiday_overrides_red_alert() {
        let h = harness(FakeSource::new(reading(260)), FakeClassifier::fixed(DayKind::HOLIDAY));

        let briefing = h.service.prepare(wednesday_morning()).await.unwrap();

        assert_eq!(briefing.descriptor.warning_level, WarningLevel::None);
        assert!(briefing.report.body.contains("no restriction (holiday/weekend)"));
    }

    #[tokio::test]
    async fn dry_run_touches_nothing() {
        let h = harness(FakeSource::new(reading(80)), FakeClassifier::fixed(DayKind::WORKDAY));
        let dry = RunOptions {
            force: false,
            dry_run: true,
        };

        let outcome = h.service.run_broadcast(wednesday_morning(), dry).await;

        assert!(matches!(outcome, RunOutcome::DryRun(_)));
        assert!(h.broadcast.published().is_empty());
        let next = h.service.run_broadcast(wednesday_morning(), RunOptions::default()).await;
        assert_eq!(next, RunOutcome::Delivered);
    }

    #[tokio::test]
    async fn push_reaches_remaining_recipients() {
        let h = harness_with(
            FakeSource::new(reading(130)),
            FakeClassifier::fixed(DayKind::WORKDAY),
            FakeTemplateChannel::new().fail_for("o-2"),
        );
        let recipients = SubscriberList::from_ids(["o-1", "o-2", "o-3"]);

        let outcome = h
            .service
            .run_push(wednesday_morning(), &recipients, RunOptions::default())
            .await;

        let RunOutcome::Pushed(summary) = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert_eq!(summary.delivered.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        let sent = h.template.sent();
        assert_eq!(sent[0].1.index.color, crate::dispatch::ALERT_COLOR);
        assert_eq!(sent[0].1.remark.value, "Data source: test source");
    }

    #[tokio::test]
    async fn push_token_failure_keeps_recorded_state() {
        let h = harness_with(
            FakeSource::new(reading(90)),
            FakeClassifier::fixed(DayKind::WORKDAY),
            FakeTemplateChannel::new().without_token(),
        );
        let recipients = SubscriberList::from_ids(["o-1"]);

        let first = h
            .service
            .run_push(wednesday_morning(), &recipients, RunOptions::default())
            .await;
        let second = h
            .service
            .run_push(wednesday_morning(), &recipients, RunOptions::default())
            .await;

        assert!(matches!(first, RunOutcome::PushAborted(_)));
        assert_eq!(second, RunOutcome::Unchanged);
    }

    #[tokio::test]
    async fn push_without_subscribers_skips_fetch() {
        let h = harness(FakeSource::new(reading(90)), FakeClassifier::fixed(DayKind::WORKDAY));

        let outcome = h
            .service
            .run_push(wednesday_morning(), &SubscriberList::default(), RunOptions::default())
            .await;

        assert_eq!(outcome, RunOutcome::NoRecipients);
        assert!(h.source.reading_calls().is_empty());
    }

    #[tokio::test]
    async fn broadcast_and_push_gate_independently() {
        let dir = tempdir().unwrap();
        let source = FakeSource::new(reading(120));
        let broadcast = FakeBroadcast::new();
        let template = FakeTemplateChannel::new();
        let build = |dispatcher: NotificationDispatcher, state_file: &str| {
            AirBeaconService::new(
                Arc::new(source.clone()),
                Arc::new(FakeClassifier::fixed(DayKind::WORKDAY)),
                dispatcher,
                IdempotencyGate::new(dir.path().join(state_file)),
                ReportFormatter::new("test source"),
                "成都市",
            )
        };
        let reporter = build(
            NotificationDispatcher::new().with_broadcast(Arc::new(broadcast.clone())),
            DEFAULT_STATE_FILE,
        );
        let pusher = build(
            NotificationDispatcher::new().with_template(Arc::new(template.clone())),
            DEFAULT_PUSH_STATE_FILE,
        );
        let recipients = SubscriberList::from_ids(["o-1"]);

        let reported = reporter.run_broadcast(wednesday_morning(), RunOptions::default()).await;
        let pushed = pusher
            .run_push(wednesday_morning(), &recipients, RunOptions::default())
            .await;

        assert_eq!(reported, RunOutcome::Delivered);
        assert!(matches!(pushed, RunOutcome::Pushed(_)), "{pushed:?}");
        assert_eq!(broadcast.published().len(), 1);
        assert_eq!(template.sent().len(), 1);

        let repeated = reporter.run_broadcast(wednesday_morning(), RunOptions::default()).await;
        assert_eq!(repeated, RunOutcome::Unchanged);
    }
}
