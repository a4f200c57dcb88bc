//! Broadcast channel for ServerChan, which forwards one message to everyone bound to a send key.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use airbeacon_core::{
    model::Report,
    ports::{AccessToken, BroadcastChannel, PortError},
    transport::{RetryPolicy, fetch_json},
};

/// Public ServerChan API host.
pub const DEFAULT_BASE_URL: &str = "https://sctapi.ftqq.com";

/// Response from /{key}.send
#[derive(Debug, Deserialize)]
struct SendResponse {
    code: i64,
    #[serde(default)]
    message: String,
}

/// Channel posting reports with a shared send key.
pub struct ServerChanChannel {
    client: Client,
    base_url: String,
    send_key: AccessToken,
    retry: RetryPolicy,
}

impl ServerChanChannel {
    /// Create a channel for `send_key`.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::AuthFailure`] when the key is empty.
    pub fn new<B, K>(
        client: Client,
        base_url: B,
        send_key: K,
        retry: RetryPolicy,
    ) -> Result<Self, PortError>
    where
        B: Into<String>,
        K: Into<String>,
    {
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            send_key: AccessToken::new(send_key)?,
            retry,
        })
    }
}

#[async_trait]
impl BroadcastChannel for ServerChanChannel {
    async fn publish(&self, report: &Report) -> Result<(), PortError> {
        let url = format!("{}/{}.send", self.base_url, self.send_key.secret());
        let req = self.client.post(url).form(&[
            ("title", report.title.as_str()),
            ("desp", report.body.as_str()),
        ]);

        let resp = fetch_json::<SendResponse>(req, &self.retry).await?;
        check(&resp)?;
        debug!(title = %report.title, "ServerChan accepted report");
        Ok(())
    }
}

fn check(resp: &SendResponse) -> Result<(), PortError> {
    match resp.code {
        0 => Ok(()),
        code => Err(PortError::Rejected {
            code,
            message: resp.message.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> SendResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn zero_code_is_success() {
        let resp = response(r#"{"code":0,"message":"","data":{"pushid":"1","readkey":"x"}}"#);
        assert!(check(&resp).is_ok());
    }

    #[test]
    fn non_zero_codes_are_rejections() {
        let resp = response(r#"{"code":20001,"message":"quota exceeded"}"#);
        assert!(matches!(
            check(&resp),
            Err(PortError::Rejected { code: 20001, .. })
        ));
    }

    #[test]
    fn empty_key_is_refused_up_front() {
        let result = ServerChanChannel::new(Client::new(), DEFAULT_BASE_URL, " ", RetryPolicy::none());
        assert!(matches!(result, Err(PortError::AuthFailure(_))));
    }
}
