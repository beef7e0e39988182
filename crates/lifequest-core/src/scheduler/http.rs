use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::CallbackScheduler;
use crate::config::{CallbackSettings, SchedulerSettings};
use crate::error::SchedulerError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    message_id: String,
}

/// Delayed-message relay client (QStash wire format).
///
/// Publishes a POST to `<callback_base>/todos/check_validity/<task_id>` that
/// the relay holds until the deadline, forwarding the shared callback
/// credential as the `Authorization` header.
#[derive(Debug, Clone)]
pub struct HttpCallbackScheduler {
    client: Client,
    endpoint: Url,
    token: String,
    callback_base: Url,
    callback_token: Option<String>,
}

impl HttpCallbackScheduler {
    pub fn new(
        endpoint: &str,
        token: impl Into<String>,
        callback_base: &str,
        callback_token: Option<String>,
    ) -> Result<Self, SchedulerError> {
        Ok(Self {
            client: Client::new(),
            endpoint: Url::parse(endpoint)?,
            token: token.into(),
            callback_base: Url::parse(callback_base)?,
            callback_token,
        })
    }

    /// Build from config. `NotConfigured` if the endpoint, token or callback
    /// base is missing.
    pub fn from_settings(
        scheduler: &SchedulerSettings,
        callback: &CallbackSettings,
    ) -> Result<Self, SchedulerError> {
        match (&scheduler.endpoint, &scheduler.token, &scheduler.callback_base_url) {
            (Some(endpoint), Some(token), Some(base)) => {
                Self::new(endpoint, token.clone(), base, callback.token.clone())
            }
            _ => Err(SchedulerError::NotConfigured),
        }
    }

    fn callback_url(&self, task_id: &str) -> Result<Url, SchedulerError> {
        let base = self.callback_base.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/todos/check_validity/{task_id}"))?)
    }

    fn relay_url(&self, path: &str) -> String {
        format!("{}/{path}", self.endpoint.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl CallbackScheduler for HttpCallbackScheduler {
    async fn schedule(
        &self,
        task_id: &str,
        fire_at: DateTime<Utc>,
    ) -> Result<String, SchedulerError> {
        let destination = self.callback_url(task_id)?;
        let mut request = self
            .client
            .post(self.relay_url(&format!("publish/{destination}")))
            .bearer_auth(&self.token)
            .header("Content-Type", "application/json")
            .header("Upstash-Method", "POST")
            .header("Upstash-Not-Before", fire_at.timestamp().to_string())
            .body("{}");
        if let Some(token) = &self.callback_token {
            request = request.header("Upstash-Forward-Authorization", format!("Bearer {token}"));
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SchedulerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: PublishResponse = resp
            .json()
            .await
            .map_err(|e| SchedulerError::MalformedResponse(e.to_string()))?;
        Ok(parsed.message_id)
    }

    async fn cancel(&self, message_id: &str) -> Result<(), SchedulerError> {
        let resp = self
            .client
            .delete(self.relay_url(&format!("messages/{message_id}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = resp.status();
        // Already delivered or unknown: nothing left to cancel.
        if status.is_success() || status.as_u16() == 404 {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(SchedulerError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;

    fn client_for(server: &mockito::Server) -> HttpCallbackScheduler {
        HttpCallbackScheduler::new(
            &server.url(),
            "relay-token",
            "https://api.example.com",
            Some("shared-secret".into()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn schedule_publishes_delayed_post() {
        let mut server = mockito::Server::new_async().await;
        let fire_at = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let mock = server
            .mock("POST", Matcher::Regex(r"^/publish/https:.*/todos/check_validity/todo-1$".into()))
            .match_header("authorization", "Bearer relay-token")
            .match_header("upstash-method", "POST")
            .match_header("upstash-not-before", fire_at.timestamp().to_string().as_str())
            .match_header("upstash-forward-authorization", "Bearer shared-secret")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"messageId":"msg_abc"}"#)
            .create_async()
            .await;

        let id = client_for(&server).schedule("todo-1", fire_at).await.unwrap();
        assert_eq!(id, "msg_abc");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn schedule_surfaces_relay_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", Matcher::Any)
            .with_status(401)
            .with_body("invalid token")
            .create_async()
            .await;

        let err = client_for(&server).schedule("todo-1", Utc::now()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Rejected { status: 401, .. }));
    }

    #[tokio::test]
    async fn schedule_rejects_body_without_message_id() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", Matcher::Any)
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let err = client_for(&server).schedule("todo-1", Utc::now()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn cancel_treats_missing_message_as_done() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/messages/msg_gone")
            .with_status(404)
            .create_async()
            .await;

        client_for(&server).cancel("msg_gone").await.unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn from_settings_requires_all_fields() {
        let settings = SchedulerSettings {
            endpoint: Some("https://relay.example.com/v2".into()),
            token: None,
            callback_base_url: Some("https://api.example.com".into()),
        };
        let err = HttpCallbackScheduler::from_settings(&settings, &CallbackSettings::default());
        assert!(matches!(err, Err(SchedulerError::NotConfigured)));
    }
}
