//! WeChat official account integration: template message pushes and follower listing.
//!
//! Both flows authenticate with an access token obtained from the app id and secret.
//! Tokens are fetched once per run and never cached on disk.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use airbeacon_core::{
    model::{RecipientId, TemplateField, TemplateMessage},
    ports::{AccessToken, FollowerSource, PortError, TemplateChannel},
    transport::{RetryPolicy, fetch_json},
};

/// Public WeChat API host.
pub const DEFAULT_BASE_URL: &str = "https://api.weixin.qq.com";

// Invalid credential, invalid appid, invalid secret, expired token.
const AUTH_ERRCODES: [i64; 4] = [40001, 40013, 40125, 42001];

/// Response from /cgi-bin/token
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// Body-level status returned by most endpoints.
#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// One page from /cgi-bin/user/get
#[derive(Debug, Deserialize)]
struct FollowerPage {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    count: usize,
    data: Option<OpenIds>,
    #[serde(default)]
    next_openid: String,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

#[derive(Debug, Deserialize)]
struct OpenIds {
    #[serde(default)]
    openid: Vec<String>,
}

/// Body of /cgi-bin/message/template/send
#[derive(Debug, Serialize)]
struct TemplateRequest<'msg> {
    touser: &'msg str,
    template_id: &'msg str,
    data: TemplateData<'msg>,
}

#[derive(Debug, Serialize)]
struct TemplateData<'msg> {
    city: &'msg TemplateField,
    aqi: &'msg TemplateField,
    level: &'msg TemplateField,
    restriction: &'msg TemplateField,
    date: &'msg TemplateField,
    remark: &'msg TemplateField,
}

impl<'msg> TemplateRequest<'msg> {
    fn new(recipient: &'msg RecipientId, template_id: &'msg str, message: &'msg TemplateMessage) -> Self {
        Self {
            touser: &recipient.0,
            template_id,
            data: TemplateData {
                city: &message.city,
                aqi: &message.index,
                level: &message.severity,
                restriction: &message.restriction,
                date: &message.date,
                remark: &message.remark,
            },
        }
    }
}

/// Credentials and HTTP plumbing shared by both flows.
pub struct WeChatApi {
    client: Client,
    base_url: String,
    app_id: String,
    app_secret: String,
    retry: RetryPolicy,
}

impl WeChatApi {
    /// Create an API handle for one official account.
    #[must_use]
    pub fn new<B, I, S>(
        client: Client,
        base_url: B,
        app_id: I,
        app_secret: S,
        retry: RetryPolicy,
    ) -> Self
    where
        B: Into<String>,
        I: Into<String>,
        S: Into<String>,
    {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            retry,
        }
    }

    /// Exchange the app credentials for an access token.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::AuthFailure`] for blank credentials, rejected
    /// credentials, or an empty token.
    pub async fn access_token(&self) -> Result<AccessToken, PortError> {
        if self.app_id.trim().is_empty() || self.app_secret.trim().is_empty() {
            return Err(PortError::AuthFailure("app id or secret not configured".into()));
        }

        let req = self
            .client
            .get(format!("{}/cgi-bin/token", self.base_url))
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", self.app_id.as_str()),
                ("secret", self.app_secret.as_str()),
            ]);
        let resp = fetch_json::<TokenResponse>(req, &self.retry).await?;
        token_from(resp)
    }
}

fn token_from(resp: TokenResponse) -> Result<AccessToken, PortError> {
    if resp.errcode != 0 {
        return Err(PortError::AuthFailure(format!(
            "token endpoint returned {}: {}",
            resp.errcode, resp.errmsg
        )));
    }
    AccessToken::new(resp.access_token)
}

fn check_status(errcode: i64, errmsg: &str) -> Result<(), PortError> {
    match errcode {
        0 => Ok(()),
        code if AUTH_ERRCODES.contains(&code) => Err(PortError::AuthFailure(format!("{code}: {errmsg}"))),
        code => Err(PortError::Rejected {
            code,
            message: errmsg.to_owned(),
        }),
    }
}

/// Template message channel for a single template.
pub struct WeChatTemplateChannel {
    api: Arc<WeChatApi>,
    template_id: String,
}

impl WeChatTemplateChannel {
    /// Create a channel sending `template_id` messages.
    #[must_use]
    pub fn new<T: Into<String>>(api: Arc<WeChatApi>, template_id: T) -> Self {
        Self {
            api,
            template_id: template_id.into(),
        }
    }
}

#[async_trait]
impl TemplateChannel for WeChatTemplateChannel {
    async fn access_token(&self) -> Result<AccessToken, PortError> {
        self.api.access_token().await
    }

    async fn send(
        &self,
        token: &AccessToken,
        recipient: &RecipientId,
        message: &TemplateMessage,
    ) -> Result<(), PortError> {
        let req = self
            .api
            .client
            .post(format!("{}/cgi-bin/message/template/send", self.api.base_url))
            .query(&[("access_token", token.secret())])
            .json(&TemplateRequest::new(recipient, &self.template_id, message));

        let status = fetch_json::<Status>(req, &self.api.retry).await?;
        check_status(status.errcode, &status.errmsg)?;
        debug!(%recipient, "template message accepted");
        Ok(())
    }
}

/// Follower listing for the official account.
pub struct WeChatFollowers {
    api: Arc<WeChatApi>,
}

impl WeChatFollowers {
    /// Create a follower source.
    #[must_use]
    pub fn new(api: Arc<WeChatApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl FollowerSource for WeChatFollowers {
    async fn followers(&self) -> Result<Vec<String>, PortError> {
        let token = self.api.access_token().await?;

        let mut followers = Vec::new();
        let mut next_openid = String::new();
        loop {
            let req = self
                .api
                .client
                .get(format!("{}/cgi-bin/user/get", self.api.base_url))
                .query(&[
                    ("access_token", token.secret()),
                    ("next_openid", next_openid.as_str()),
                ]);
            let page = fetch_json::<FollowerPage>(req, &self.api.retry).await?;
            check_status(page.errcode, &page.errmsg)?;

            match absorb_page(&mut followers, page) {
                Some(next) => next_openid = next,
                None => break,
            }
        }

        info!(count = followers.len(), "followers listed");
        Ok(followers)
    }
}

// Adds the page's ids; returns the cursor for the next page, if any.
fn absorb_page(followers: &mut Vec<String>, page: FollowerPage) -> Option<String> {
    let ids = page.data.map(|data| data.openid).unwrap_or_default();
    if page.count == 0 || ids.is_empty() {
        return None;
    }
    followers.extend(ids);

    let done = page.next_openid.is_empty() || followers.len() >= page.total;
    (!done).then_some(page.next_openid)
}
