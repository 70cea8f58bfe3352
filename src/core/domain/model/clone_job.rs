use serde::Deserialize;

/// State of a Proxmox task as reported by `/nodes/{node}/tasks/{upid}/status`.
///
/// The API reports `running` while the worker is alive and `stopped` once
/// it has exited; the outcome is then in `exitstatus` (`OK` on success).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Stopped { exitstatus: String },
    /// Any status outside the enumerated set; treated as still in progress.
    Other(String),
}

/// Raw task status payload.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TaskStatusResponse {
    pub status: String,
    #[serde(default)]
    pub exitstatus: Option<String>,
}

impl From<TaskStatusResponse> for TaskStatus {
    fn from(raw: TaskStatusResponse) -> Self {
        match raw.status.as_str() {
            "running" => TaskStatus::Running,
            "stopped" => TaskStatus::Stopped {
                exitstatus: raw.exitstatus.unwrap_or_default(),
            },
            _ => TaskStatus::Other(raw.status),
        }
    }
}

impl TaskStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Stopped { .. })
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Stopped { exitstatus } if exitstatus == "OK")
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Running => f.write_str("running"),
            TaskStatus::Stopped { exitstatus } => write!(f, "stopped ({})", exitstatus),
            TaskStatus::Other(status) => f.write_str(status),
        }
    }
}

/// An in-flight or finished clone operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneJob {
    pub target_numeric_id: u32,
    /// Task id returned by the clone request.
    pub upid: String,
    pub status: TaskStatus,
}
