use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use airbeacon_core::{
    config::{
        Config, ConfigError, DEFAULT_CITY, DEFAULT_PUSH_STATE_FILE, DEFAULT_STATE_FILE, HttpSettings,
        Mode,
    },
    service::RunOptions,
    transport::RetryPolicy,
};
use airbeacon_calendar_timor as timor;
use airbeacon_channel_serverchan as serverchan;
use airbeacon_channel_wechat as wechat;
use airbeacon_provider_sichuan as sichuan;

#[derive(Debug, Parser)]
#[command(
    name = "airbeacon",
    version,
    about = "Daily air quality and traffic restriction notifier"
)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) settings: Settings,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Broadcast the daily report through the shared push key
    Report(RunArgs),
    /// Send a template message to every stored subscriber
    Push(RunArgs),
    /// Refresh the stored subscriber list from the account's followers
    SyncSubscribers,
}

impl Command {
    pub(crate) fn mode(&self) -> Mode {
        match self {
            Self::Report(_) => Mode::Broadcast,
            Self::Push(_) => Mode::Template,
            Self::SyncSubscribers => Mode::SubscriberSync,
        }
    }
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    /// Notify even when the reading has not changed
    #[arg(long)]
    force: bool,

    /// Print the report instead of sending it
    #[arg(long)]
    dry_run: bool,
}

impl RunArgs {
    pub(crate) fn options(&self) -> RunOptions {
        RunOptions {
            force: self.force,
            dry_run: self.dry_run,
        }
    }
}

#[derive(Debug, Args)]
pub(crate) struct Settings {
    /// ServerChan send key
    #[arg(long, env = "SEND_KEY", hide_env_values = true, global = true)]
    send_key: Option<String>,

    /// WeChat official account app id
    #[arg(long, env = "WX_APP_ID", global = true)]
    app_id: Option<String>,

    /// WeChat official account app secret
    #[arg(long, env = "WX_APP_SECRET", hide_env_values = true, global = true)]
    app_secret: Option<String>,

    /// WeChat template id for per-subscriber pushes
    #[arg(long, env = "WX_TEMPLATE_ID", global = true)]
    template_id: Option<String>,

    /// City to report on, as named by the provider
    #[arg(long, env = "AIRBEACON_CITY", default_value = DEFAULT_CITY, global = true)]
    city: String,

    /// Idempotency state file for `report`
    #[arg(
        long,
        env = "AIRBEACON_STATE_FILE",
        default_value = DEFAULT_STATE_FILE,
        global = true
    )]
    state_file: PathBuf,

    /// Idempotency state file for `push`
    #[arg(
        long,
        env = "AIRBEACON_PUSH_STATE_FILE",
        default_value = DEFAULT_PUSH_STATE_FILE,
        global = true
    )]
    push_state_file: PathBuf,

    /// Subscriber list file
    #[arg(
        long,
        env = "AIRBEACON_SUBSCRIBERS_FILE",
        default_value = "subscribers.json",
        global = true
    )]
    subscribers_file: PathBuf,

    /// Hours east of UTC used for "today" and forecast dates
    #[arg(
        long,
        env = "AIRBEACON_UTC_OFFSET_HOURS",
        default_value_t = 8,
        allow_hyphen_values = true,
        global = true
    )]
    utc_offset_hours: i32,

    /// Per-request timeout in seconds
    #[arg(long, env = "AIRBEACON_TIMEOUT_SECS", default_value_t = 10, global = true)]
    timeout_secs: u64,

    /// Retries after a transient failure
    #[arg(long, env = "AIRBEACON_RETRIES", default_value_t = 3, global = true)]
    retries: u32,

    #[arg(long, env = "AIRBEACON_SOURCE_BASE", default_value = sichuan::DEFAULT_BASE_URL, global = true, hide = true)]
    source_base: String,

    #[arg(long, env = "AIRBEACON_PUSH_BASE", default_value = serverchan::DEFAULT_BASE_URL, global = true, hide = true)]
    push_base: String,

    #[arg(long, env = "AIRBEACON_WECHAT_BASE", default_value = wechat::DEFAULT_BASE_URL, global = true, hide = true)]
    wechat_base: String,

    #[arg(long, env = "AIRBEACON_CALENDAR_BASE", default_value = timor::DEFAULT_BASE_URL, global = true, hide = true)]
    calendar_base: String,
}

impl Settings {
    pub(crate) fn to_config(&self) -> Result<Config, ConfigError> {
        let defaults = HttpSettings::default();
        Ok(Config {
            source_api_base: self.source_base.clone(),
            push_base: self.push_base.clone(),
            push_key: self.send_key.clone(),
            wechat_base: self.wechat_base.clone(),
            app_id: self.app_id.clone(),
            app_secret: self.app_secret.clone(),
            template_id: self.template_id.clone(),
            calendar_base: self.calendar_base.clone(),
            city_name: self.city.clone(),
            state_file: self.state_file.clone(),
            push_state_file: self.push_state_file.clone(),
            subscribers_file: self.subscribers_file.clone(),
            data_source_label: sichuan::SOURCE_LABEL.to_owned(),
            utc_offset: Config::offset_from_hours(self.utc_offset_hours)?,
            http: HttpSettings {
                timeout: Duration::from_secs(self.timeout_secs),
                retry: RetryPolicy {
                    max_retries: self.retries,
                    ..defaults.retry
                },
                ..defaults
            },
        })
    }
}
