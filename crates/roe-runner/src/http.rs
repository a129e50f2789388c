//! HTTP request runner

use crate::error::RunnerError;
use crate::runner::{ActionOutput, ActionRunner};
use reqwest::Method;
use roe_plan::Action;

/// Runs `Action::Http`; success means the expected status came back
#[derive(Debug, Clone, Default)]
pub struct HttpRunner {
    client: reqwest::Client,
}

impl HttpRunner {
    /// Runner with a default client
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner with a preconfigured client
    #[inline]
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ActionRunner for HttpRunner {
    async fn run(&self, action: &Action) -> Result<ActionOutput, RunnerError> {
        let Action::Http {
            method,
            url,
            expect_status,
        } = action
        else {
            return Err(RunnerError::Unsupported(action.kind()));
        };

        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|e| RunnerError::Http(e.to_string()))?;

        tracing::debug!(%method, %url, "sending http action");
        let response = self.client.request(method, url.as_str()).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        let output = ActionOutput {
            success: status == *expect_status,
            exit_code: Some(i32::from(status)),
            stdout: body,
            stderr: String::new(),
        };
        Ok(if output.success {
            output
        } else {
            output.with_stderr(format!("expected status {expect_status}, got {status}"))
        })
    }
}
