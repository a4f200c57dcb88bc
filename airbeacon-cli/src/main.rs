//! airbeacon - daily air quality and traffic restriction notifier.

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use clap::Parser;
use reqwest::Client;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use airbeacon_calendar_timor::TimorClassifier;
use airbeacon_channel_serverchan::ServerChanChannel;
use airbeacon_channel_wechat::{WeChatApi, WeChatFollowers, WeChatTemplateChannel};
use airbeacon_core::{
    config::{Config, Mode},
    dispatch::NotificationDispatcher,
    gate::IdempotencyGate,
    model::Report,
    report::ReportFormatter,
    service::{AirBeaconService, RunOptions, RunOutcome},
    subscribers::{SubscriberRegistry, load_subscribers},
    transport::build_client,
};
use airbeacon_provider_sichuan::SichuanAirSource;

use crate::cli::{Cli, Command};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();
    let config = cli.settings.to_config()?;

    if !ready_for(&config, cli.command.mode()) {
        return Ok(());
    }

    let client = build_client(&config.http).context("building HTTP client")?;

    match cli.command {
        Command::Report(args) => report(&config, &client, args.options()).await,
        Command::Push(args) => push(&config, &client, args.options()).await,
        Command::SyncSubscribers => sync_subscribers(&config, &client).await,
    }
}

// Missing credentials end the run cleanly after logging.
fn ready_for(config: &Config, mode: Mode) -> bool {
    match config.validate_for(mode) {
        Ok(()) => true,
        Err(err) => {
            error!(error = %err, ?mode, "run is not configured, nothing sent");
            false
        }
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn local_now(config: &Config) -> NaiveDateTime {
    Utc::now().with_timezone(&config.utc_offset).naive_local()
}

fn wechat_api(config: &Config, client: &Client) -> Arc<WeChatApi> {
    Arc::new(WeChatApi::new(
        client.clone(),
        config.wechat_base.as_str(),
        config.app_id.clone().unwrap_or_default(),
        config.app_secret.clone().unwrap_or_default(),
        config.http.retry,
    ))
}

fn service(
    config: &Config,
    client: &Client,
    mode: Mode,
    dispatcher: NotificationDispatcher,
) -> AirBeaconService {
    let retry = config.http.retry;

    let source = Arc::new(SichuanAirSource::new(
        client.clone(),
        config.source_api_base.as_str(),
        retry,
        config.utc_offset,
    ));
    let classifier = Arc::new(TimorClassifier::new(
        client.clone(),
        config.calendar_base.as_str(),
        retry,
    ));

    AirBeaconService::new(
        source,
        classifier,
        dispatcher,
        IdempotencyGate::new(config.state_file_for(mode)),
        ReportFormatter::new(config.data_source_label.as_str()),
        config.city_name.as_str(),
    )
}

async fn report(config: &Config, client: &Client, options: RunOptions) -> Result<()> {
    let channel = ServerChanChannel::new(
        client.clone(),
        config.push_base.as_str(),
        config.push_key.clone().unwrap_or_default(),
        config.http.retry,
    )?;
    let dispatcher = NotificationDispatcher::new().with_broadcast(Arc::new(channel));

    let outcome = service(config, client, Mode::Broadcast, dispatcher)
        .run_broadcast(local_now(config), options)
        .await;
    log_outcome(&outcome);
    Ok(())
}

async fn push(config: &Config, client: &Client, options: RunOptions) -> Result<()> {
    let api = wechat_api(config, client);
    let channel = WeChatTemplateChannel::new(api, config.template_id.clone().unwrap_or_default());
    let dispatcher = NotificationDispatcher::new().with_template(Arc::new(channel));

    let recipients = match load_subscribers(&config.subscribers_file) {
        Ok(recipients) => recipients,
        Err(err) => {
            error!(
                error = %err,
                path = %config.subscribers_file.display(),
                "subscriber list unreadable, run sync-subscribers"
            );
            return Ok(());
        }
    };

    let outcome = service(config, client, Mode::Template, dispatcher)
        .run_push(local_now(config), &recipients, options)
        .await;
    log_outcome(&outcome);
    Ok(())
}

async fn sync_subscribers(config: &Config, client: &Client) -> Result<()> {
    let registry = SubscriberRegistry::new(
        Arc::new(WeChatFollowers::new(wechat_api(config, client))),
        config.subscribers_file.clone(),
    );

    match registry.sync().await {
        Ok(list) => info!(count = list.len(), "subscribers refreshed"),
        Err(err) => warn!(error = %err, "previous subscriber list kept"),
    }
    Ok(())
}

fn log_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::DryRun(report) => print_report(report),
        RunOutcome::Delivered => info!("report delivered"),
        RunOutcome::Pushed(summary) => info!(
            delivered = summary.delivered.len(),
            failed = summary.failed.len(),
            "template push finished"
        ),
        RunOutcome::Unchanged => info!("nothing new to report"),
        RunOutcome::NoRecipients => info!("no subscribers to notify"),
        RunOutcome::SourceUnavailable(reason)
        | RunOutcome::StateError(reason)
        | RunOutcome::DeliveryFailed(reason)
        | RunOutcome::PushAborted(reason) => warn!(%reason, "run ended without notifying"),
    }
}

#[expect(clippy::print_stdout, reason = "dry runs write the report for the operator")]
fn print_report(report: &Report) {
    println!("{}\n\n{}", report.title, report.body);
}
