//! Individual occurrences as reported by clients.
//!
//! [`NewEvent`] is what ingestion accepts; [`Event`] is the persisted row.
//! `time` is the client-reported timestamp in unix **milliseconds** and is
//! what the stats windows count over. `created_at`/`updated_at` are storage
//! stamps in unix seconds.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{EventKind, LogLevel};
use crate::error::{Error, Result};

/// HTTP request metadata attached to error events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Value>,
}

/// Source location, stack trace and request data of an error event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    pub file: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Value>,
    #[serde(flatten)]
    pub request: RequestMeta,
}

/// Kind-specific part of an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventBody {
    Error(ErrorDetails),
    Log { level: LogLevel },
}

impl EventBody {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Error(_) => EventKind::Error,
            Self::Log { .. } => EventKind::Log,
        }
    }
}

/// A persisted event row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub project_id: String,
    pub fingerprint: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    pub time: i64,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(flatten)]
    pub body: EventBody,
}

impl Event {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.body.kind()
    }
}

/// An event as handed to the ingestion transaction.
///
/// `id` is generated when absent; `time` defaults to the ingestion instant.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub id: Option<String>,
    pub project_id: String,
    pub fingerprint: String,
    pub message: String,
    pub context: Option<Value>,
    pub time: Option<i64>,
    pub body: EventBody,
}

impl NewEvent {
    /// An error event reported at `file:line`.
    #[must_use]
    pub fn error(
        project_id: impl Into<String>,
        fingerprint: impl Into<String>,
        message: impl Into<String>,
        file: impl Into<String>,
        line: u32,
    ) -> Self {
        Self {
            id: None,
            project_id: project_id.into(),
            fingerprint: fingerprint.into(),
            message: message.into(),
            context: None,
            time: None,
            body: EventBody::Error(ErrorDetails {
                file: file.into(),
                line,
                ..ErrorDetails::default()
            }),
        }
    }

    /// A log line at `level`.
    #[must_use]
    pub fn log(
        project_id: impl Into<String>,
        fingerprint: impl Into<String>,
        message: impl Into<String>,
        level: LogLevel,
    ) -> Self {
        Self {
            id: None,
            project_id: project_id.into(),
            fingerprint: fingerprint.into(),
            message: message.into(),
            context: None,
            time: None,
            body: EventBody::Log { level },
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the client-reported timestamp (unix milliseconds).
    #[must_use]
    pub const fn with_time(mut self, time_ms: i64) -> Self {
        self.time = Some(time_ms);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.body.kind()
    }

    /// Reject payloads that cannot form a group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when `projectId`, `fingerprint`,
    /// `message`, or (for errors) `file` is blank, or a supplied id is blank.
    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(Error::missing("projectId"));
        }
        if self.fingerprint.trim().is_empty() {
            return Err(Error::missing("fingerprint"));
        }
        if self.message.trim().is_empty() {
            return Err(Error::missing("message"));
        }
        if let Some(id) = &self.id
            && id.trim().is_empty()
        {
            return Err(Error::missing("id"));
        }
        if let EventBody::Error(details) = &self.body
            && details.file.trim().is_empty()
        {
            return Err(Error::missing("file"));
        }
        Ok(())
    }
}

/// Wire shape of an incoming error event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEventInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub stacktrace: Option<Value>,
    #[serde(default)]
    pub context: Option<Value>,
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(flatten)]
    pub request: RequestMeta,
}

impl From<ErrorEventInput> for NewEvent {
    fn from(input: ErrorEventInput) -> Self {
        Self {
            id: input.id,
            project_id: input.project_id,
            fingerprint: input.fingerprint,
            message: input.message,
            context: input.context,
            time: input.time,
            body: EventBody::Error(ErrorDetails {
                file: input.file,
                line: input.line,
                stacktrace: input.stacktrace,
                request: input.request,
            }),
        }
    }
}

/// Wire shape of an incoming log event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEventInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub fingerprint: String,
    pub level: LogLevel,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub context: Option<Value>,
    #[serde(default)]
    pub time: Option<i64>,
}

impl From<LogEventInput> for NewEvent {
    fn from(input: LogEventInput) -> Self {
        Self {
            id: input.id,
            project_id: input.project_id,
            fingerprint: input.fingerprint,
            message: input.message,
            context: input.context,
            time: input.time,
            body: EventBody::Log { level: input.level },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn validate_rejects_blank_identity_fields() {
        let blank_project = NewEvent::error(" ", "f1", "boom", "a.php", 1);
        let err = blank_project.validate().expect_err("blank project rejected");
        assert_eq!(err.code(), ErrorCode::MissingField);
        assert!(err.to_string().contains("projectId"));

        let blank_fp = NewEvent::log("p1", "", "hello", LogLevel::Info);
        let err = blank_fp.validate().expect_err("blank fingerprint rejected");
        assert!(err.to_string().contains("fingerprint"));

        let blank_file = NewEvent::error("p1", "f1", "boom", "", 1);
        let err = blank_file.validate().expect_err("blank file rejected");
        assert!(err.to_string().contains("file"));

        let blank_id = NewEvent::error("p1", "f1", "boom", "a.php", 1).with_id("  ");
        assert!(blank_id.validate().is_err());
    }

    #[test]
    fn validate_accepts_complete_events() {
        NewEvent::error("p1", "f1", "boom", "a.php", 7)
            .validate()
            .expect("error event valid");
        NewEvent::log("p1", "f2", "hello", LogLevel::Debug)
            .validate()
            .expect("log event valid");
    }

    #[test]
    fn error_input_collects_request_metadata() {
        let input: ErrorEventInput = serde_json::from_value(json!({
            "projectId": "p1",
            "fingerprint": "f1",
            "message": "Division by zero",
            "file": "/app/Math.php",
            "line": 12,
            "stacktrace": [{"file": "/app/Math.php", "line": 12}],
            "ip": "10.0.0.1",
            "method": "POST",
            "headers": {"accept": "application/json"},
            "time": 1_700_000_000_000_i64
        }))
        .expect("parse error input");

        let event = NewEvent::from(input);
        assert_eq!(event.kind(), EventKind::Error);
        assert_eq!(event.time, Some(1_700_000_000_000));
        let EventBody::Error(details) = &event.body else {
            panic!("expected error body");
        };
        assert_eq!(details.line, 12);
        assert_eq!(details.request.ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(details.request.method.as_deref(), Some("POST"));
        assert!(details.request.headers.is_some());
        assert!(details.request.cookies.is_none());
    }

    #[test]
    fn log_input_rejects_unknown_level() {
        let bad = serde_json::from_value::<LogEventInput>(json!({
            "projectId": "p1",
            "fingerprint": "f1",
            "level": "TRACE",
            "message": "x"
        }));
        assert!(bad.is_err());

        let ok: LogEventInput = serde_json::from_value(json!({
            "projectId": "p1",
            "fingerprint": "f1",
            "level": "info",
            "message": "x"
        }))
        .expect("parse log input");
        assert_eq!(NewEvent::from(ok).kind(), EventKind::Log);
    }

    #[test]
    fn persisted_event_serializes_body_inline() {
        let event = Event {
            id: "e1".into(),
            project_id: "p1".into(),
            fingerprint: "f1".into(),
            message: "hello".into(),
            context: None,
            time: 5,
            created_at: 1,
            updated_at: 1,
            body: EventBody::Log {
                level: LogLevel::Error,
            },
        };
        let json = serde_json::to_value(&event).expect("serialize event");
        assert_eq!(json["level"], "ERROR");
        assert_eq!(json["projectId"], "p1");
        assert!(json.get("context").is_none());
    }
}
