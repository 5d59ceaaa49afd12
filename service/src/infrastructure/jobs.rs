use std::time::Duration;

use anyhow::Context;
use reqwest::Client;

use crate::domain::notifications::{JobInvoker, JobOutcome};
use crate::infrastructure::settings::JobsSettings;

/// Invokes background jobs as HTTP functions: `POST {functions_url}/{job_name}`
#[derive(Debug, Clone)]
pub struct HttpJobInvoker {
    client: Client,
    functions_url: String,
    api_key: String,
}

impl HttpJobInvoker {
    pub fn new(settings: &JobsSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .context("failed to build job client")?;

        Ok(Self {
            client,
            functions_url: settings.functions_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    fn url(&self, job_name: &str) -> String {
        format!("{}/{}", self.functions_url, job_name)
    }
}

impl JobInvoker for HttpJobInvoker {
    async fn invoke(&self, job_name: &str, payload: serde_json::Value) -> JobOutcome {
        let response = self
            .client
            .post(self.url(job_name))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(job = job_name, error = %e, "job request failed");
                return JobOutcome::failed(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return JobOutcome::failed(format!("{}: {}", status, body.trim()));
        }

        // functions may answer with their own outcome or with an arbitrary body
        match response.json::<JobOutcome>().await {
            Ok(outcome) => outcome,
            Err(_) => JobOutcome::succeeded(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_url_ignores_trailing_slash() {
        let invoker = HttpJobInvoker::new(&JobsSettings {
            functions_url: "https://functions.example.org/v1/".to_string(),
            api_key: "secret".to_string(),
            timeout_seconds: 5,
        })
        .unwrap();

        assert_eq!(
            invoker.url("notify-institution-link"),
            "https://functions.example.org/v1/notify-institution-link"
        );
    }
}
