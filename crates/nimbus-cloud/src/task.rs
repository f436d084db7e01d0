//! Polling of provider-side long-running tasks

use crate::error::{CloudError, Result};
use crate::executor::RequestExecutor;
use crate::transport::{Headers, HttpResponse, Method};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};

pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Success,
    Error,
    Canceled,
    TimedOut,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Pending | TaskState::Running)
    }

    /// Map a provider status word onto a state
    pub fn from_status(status: &str) -> Option<Self> {
        let status = status.trim().to_ascii_lowercase();
        match status.as_str() {
            "queued" | "pending" | "prerunning" => Some(TaskState::Pending),
            "running" => Some(TaskState::Running),
            "success" => Some(TaskState::Success),
            "error" | "aborted" => Some(TaskState::Error),
            "canceled" | "cancelled" => Some(TaskState::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Success => "success",
            TaskState::Error => "error",
            TaskState::Canceled => "canceled",
            TaskState::TimedOut => "timed out",
        };
        f.write_str(s)
    }
}

/// How a task status document is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskFormat {
    /// `<Task status=".."><Error message=".."/></Task>`
    #[default]
    VCloud,
    /// `{"status": "..", "message": ".."}`, optionally wrapped in `{"task": ..}`
    Json,
}

impl std::str::FromStr for TaskFormat {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vcloud" | "xml" => Ok(TaskFormat::VCloud),
            "json" => Ok(TaskFormat::Json),
            other => Err(CloudError::Configuration(format!(
                "Unknown task format: {}",
                other
            ))),
        }
    }
}

/// Status decoded from one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatus {
    pub state: TaskState,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskXml {
    #[serde(rename = "@status")]
    status: String,
    #[serde(rename = "Error", default)]
    error: Option<TaskErrorXml>,
}

#[derive(Debug, Deserialize)]
struct TaskErrorXml {
    #[serde(rename = "@message", default)]
    message: Option<String>,
}

impl TaskFormat {
    pub fn parse_status(&self, response: &HttpResponse) -> Result<TaskStatus> {
        let (status, message) = match self {
            TaskFormat::VCloud => {
                let text = std::str::from_utf8(&response.body).map_err(|e| {
                    CloudError::MalformedResponse(format!("Failed to parse XML: {}", e))
                })?;
                let task: TaskXml = quick_xml::de::from_str(text).map_err(|e| {
                    CloudError::MalformedResponse(format!("Invalid task document: {}", e))
                })?;
                (task.status, task.error.and_then(|e| e.message))
            }
            TaskFormat::Json => {
                let value: Value = serde_json::from_slice(&response.body)?;
                let task = value.get("task").unwrap_or(&value);
                let status = task
                    .get("status")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        CloudError::MalformedResponse("task document has no status".to_string())
                    })?
                    .to_string();
                (status, json_task_message(task))
            }
        };

        let state = TaskState::from_status(&status).ok_or_else(|| {
            CloudError::MalformedResponse(format!("Unknown task status: {}", status))
        })?;
        Ok(TaskStatus { state, message })
    }
}

fn json_task_message(task: &Value) -> Option<String> {
    if let Some(message) = task.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    match task.get("error")? {
        Value::String(message) => Some(message.clone()),
        error => error.get("message").and_then(Value::as_str).map(str::to_string),
    }
}

/// A long-running provider operation being waited on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncTask {
    pub task_ref: String,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub polls: u32,
}

impl AsyncTask {
    fn new(task_ref: &str, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            task_ref: task_ref.to_string(),
            state: TaskState::Pending,
            created_at: Utc::now(),
            timeout,
            poll_interval,
            polls: 0,
        }
    }
}

/// Polls a task until it reaches a terminal state or the timeout elapses
pub struct TaskWaiter {
    executor: Arc<RequestExecutor>,
    format: TaskFormat,
}

impl TaskWaiter {
    pub fn new(executor: Arc<RequestExecutor>, format: TaskFormat) -> Self {
        Self { executor, format }
    }

    /// Fetch and decode the task's current status
    pub async fn poll(&self, task_ref: &str) -> Result<TaskStatus> {
        let response = self
            .executor
            .call(task_ref, Method::Get, Headers::new(), None)
            .await?;
        self.format.parse_status(&response)
    }

    /// Block until the task finishes
    ///
    /// Success returns the task. A provider error, a cancellation, and
    /// running out of time each surface as their own error.
    pub async fn wait(
        &self,
        task_ref: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<AsyncTask> {
        let started = Instant::now();
        let mut task = AsyncTask::new(task_ref, timeout, poll_interval);

        loop {
            let status = self.poll(task_ref).await?;
            task.polls += 1;
            task.state = status.state;
            tracing::debug!("Task {} is {} (poll {})", task_ref, task.state, task.polls);

            match status.state {
                TaskState::Success => {
                    tracing::info!("Task {} completed after {} polls", task_ref, task.polls);
                    return Ok(task);
                }
                TaskState::Error => {
                    return Err(CloudError::Task {
                        task: task_ref.to_string(),
                        message: status.message.unwrap_or_else(|| "Unknown error".to_string()),
                    });
                }
                TaskState::Canceled => {
                    return Err(CloudError::TaskCanceled {
                        task: task_ref.to_string(),
                    });
                }
                TaskState::Pending | TaskState::Running | TaskState::TimedOut => {}
            }

            if started.elapsed() >= timeout {
                task.state = TaskState::TimedOut;
                tracing::warn!(
                    "Gave up on task {} after {} polls",
                    task_ref,
                    task.polls
                );
                return Err(CloudError::TaskTimeout {
                    task: task_ref.to_string(),
                    timeout,
                });
            }

            sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn xml(body: &str) -> HttpResponse {
        HttpResponse::new(200)
            .with_header("Content-Type", "application/vnd.vmware.vcloud.task+xml")
            .with_body(body.to_string())
    }

    #[test]
    fn test_status_vocabulary() {
        assert_eq!(TaskState::from_status("queued"), Some(TaskState::Pending));
        assert_eq!(TaskState::from_status("preRunning"), Some(TaskState::Pending));
        assert_eq!(TaskState::from_status("RUNNING"), Some(TaskState::Running));
        assert_eq!(TaskState::from_status("aborted"), Some(TaskState::Error));
        assert_eq!(TaskState::from_status("cancelled"), Some(TaskState::Canceled));
        assert_eq!(TaskState::from_status("exploded"), None);
        assert!(TaskState::Success.is_terminal());
        assert!(!TaskState::Running.is_terminal());
    }

    #[test]
    fn test_vcloud_error_message() {
        let status = TaskFormat::VCloud
            .parse_status(&xml(
                r#"<Task status="error" operation="Deploying"><Error message="quota exceeded" majorErrorCode="500"/></Task>"#,
            ))
            .unwrap();
        assert_eq!(status.state, TaskState::Error);
        assert_eq!(status.message.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn test_vcloud_running_has_no_message() {
        let body = xml(r#"<Task status="running" href="https://vm.example.com/api/task/1"/>"#);
        let status = TaskFormat::VCloud.parse_status(&body).unwrap();
        assert_eq!(status, TaskStatus { state: TaskState::Running, message: None });
    }

    #[test]
    fn test_json_status_shapes() {
        let plain = HttpResponse::json(200, &json!({"status": "success"}));
        assert_eq!(TaskFormat::Json.parse_status(&plain).unwrap().state, TaskState::Success);

        let wrapped = HttpResponse::json(
            200,
            &json!({"task": {"status": "error", "error": {"message": "disk full"}}}),
        );
        let status = TaskFormat::Json.parse_status(&wrapped).unwrap();
        assert_eq!(status.message.as_deref(), Some("disk full"));
    }

    #[test]
    fn test_undecodable_status_is_malformed() {
        let err = TaskFormat::Json
            .parse_status(&HttpResponse::json(200, &json!({"state": "done"})))
            .unwrap_err();
        assert!(matches!(err, CloudError::MalformedResponse(_)));

        let err = TaskFormat::VCloud.parse_status(&xml("<Task/>")).unwrap_err();
        assert!(matches!(err, CloudError::MalformedResponse(_)));
    }

    #[test]
    fn test_task_format_from_str() {
        assert_eq!("json".parse::<TaskFormat>().unwrap(), TaskFormat::Json);
        assert_eq!("vcloud".parse::<TaskFormat>().unwrap(), TaskFormat::VCloud);
        assert!("yaml".parse::<TaskFormat>().is_err());
    }
}
