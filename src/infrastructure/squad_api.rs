//! HTTP destination for dispatched tasks.
//!
//! One concrete target implementation: forwards each delivered `SquadTask`
//! to a remote squad API with a POST, the way out-of-process squads receive
//! work.

use async_trait::async_trait;
use serde_json::json;

use crate::domain::models::{EventEnvelope, EventPayload};
use crate::services::event_bus::EventHandler;

/// Bus handler that POSTs tasks to `{base_url}/api/squad/tasks`.
pub struct HttpSquadTarget {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSquadTarget {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl EventHandler for HttpSquadTarget {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), String> {
        let EventPayload::Task(task) = &envelope.payload else {
            return Ok(());
        };

        let url = format!("{}/api/squad/tasks", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "task": task }))
            .send()
            .await
            .map_err(|e| format!("squad API unreachable: {}", e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(200).collect();
            Err(format!("HTTP {}: {}", status, truncated))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{SquadTask, TaskPriority};
    use serde_json::json;

    fn task_envelope() -> EventEnvelope {
        EventEnvelope::new(
            "squad.task.dispatch.dreamops",
            "dispatcher",
            EventPayload::Task(SquadTask::new(
                "agent.revive",
                json!({"agentId": "lucid"}),
                TaskPriority::Critical,
            )),
        )
    }

    #[tokio::test]
    async fn test_posts_task_to_squad_api() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/squad/tasks")
            .match_body(mockito::Matcher::PartialJson(
                json!({"task": {"task_type": "agent.revive"}}),
            ))
            .with_status(200)
            .with_body(r#"{"squadId":"squad-1"}"#)
            .create_async()
            .await;

        let target = HttpSquadTarget::new(server.url());
        target.handle(&task_envelope()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_surfaces_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/squad/tasks")
            .with_status(503)
            .with_body("squad offline")
            .create_async()
            .await;

        let target = HttpSquadTarget::new(server.url());
        let err = target.handle(&task_envelope()).await.unwrap_err();
        assert!(err.contains("503"));
        assert!(err.contains("squad offline"));
    }

    #[tokio::test]
    async fn test_non_task_payloads_are_ignored() {
        // No server: a request would fail, proving none is made.
        let target = HttpSquadTarget::new("http://127.0.0.1:1");
        let envelope = EventEnvelope::new(
            "halo.issue.detected",
            "test",
            EventPayload::Generic(json!({})),
        );
        target.handle(&envelope).await.unwrap();
    }
}
