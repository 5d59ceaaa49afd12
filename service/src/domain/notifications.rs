use std::future::Future;

use carebridge_common::{InstitutionLink, LinkRequest, TenantId, UserCategory};
use serde::{Deserialize, Serialize};

/// Background job that emails the user when a link is created or reactivated
pub const NOTIFY_INSTITUTION_LINK_JOB: &str = "notify-institution-link";

/// Fires named background jobs (serverless functions) with a JSON payload.
pub trait JobInvoker: Clone + Send + Sync + 'static {
    fn invoke(
        &self,
        job_name: &str,
        payload: serde_json::Value,
    ) -> impl Future<Output = JobOutcome> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Payload of the `notify-institution-link` job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkNotification {
    pub email: String,
    pub name: String,
    pub institution_name: String,
    pub role: UserCategory,
    pub tenant_id: Option<TenantId>,
    pub is_new_user: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_password: Option<String>,
}

impl LinkNotification {
    /// Notification for an existing user whose request was approved
    pub fn approved(request: &LinkRequest, link: &InstitutionLink) -> Self {
        Self {
            email: request.requester.email.clone(),
            name: request.requester.name.clone(),
            institution_name: request.institution.name.clone(),
            role: link.role,
            tenant_id: link.tenant_id,
            is_new_user: false,
            temporary_password: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("job `{job}` failed: {reason}")]
    Delivery { job: &'static str, reason: String },
    #[error("failed to encode notification payload: {0}")]
    Payload(String),
}

/// Sends transactional notifications. Never fatal for the triggering operation.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher<J: JobInvoker> {
    invoker: J,
}

impl<J: JobInvoker> NotificationDispatcher<J> {
    pub fn new(invoker: J) -> Self {
        Self { invoker }
    }

    pub async fn notify_link(&self, notification: &LinkNotification) -> Result<(), NotificationError> {
        let payload = serde_json::to_value(notification)
            .map_err(|e| NotificationError::Payload(e.to_string()))?;

        let outcome = self
            .invoker
            .invoke(NOTIFY_INSTITUTION_LINK_JOB, payload)
            .await;

        if outcome.success {
            tracing::debug!(email = %notification.email, "link notification sent");
            Ok(())
        } else {
            Err(NotificationError::Delivery {
                job: NOTIFY_INSTITUTION_LINK_JOB,
                reason: outcome.error.unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }
}
