use serde::{Deserialize, Serialize};

use crate::types::JobId;

/// Live event fanned out on a job's output channel. Transient: nothing
/// on the bus is replayed or persisted, the job store holds the durable
/// record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    pub job_id: JobId,
    #[serde(flatten)]
    pub body: EventBody,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum EventBody {
    Stdout(String),
    Stderr(String),
    #[serde(rename_all = "camelCase")]
    Completion { exit_code: Option<i64> },
}

/// One fragment of interactive input, published on a job's stdin
/// channel and forwarded verbatim to the sandboxed process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StdinFrame {
    pub data: String,
}

/// Channel carrying a job's live stdout/stderr/completion events.
pub fn output_channel(job_id: JobId) -> String {
    format!("job-updates:{job_id}")
}

/// Channel the engine listens on for stdin fragments while the job's
/// sandbox is running.
pub fn stdin_channel(job_id: JobId) -> String {
    format!("stdin:{job_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn channel_names_derive_from_job_id() {
        let id = Uuid::new_v4();
        assert_eq!(output_channel(id), format!("job-updates:{id}"));
        assert_eq!(stdin_channel(id), format!("stdin:{id}"));
    }

    #[test]
    fn stdout_event_wire_shape() {
        let event = StreamEvent {
            job_id: Uuid::nil(),
            body: EventBody::Stdout("hi\n".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stdout");
        assert_eq!(json["payload"], "hi\n");
        assert!(json["jobId"].is_string());
    }

    #[test]
    fn completion_event_wire_shape() {
        let event = StreamEvent {
            job_id: Uuid::nil(),
            body: EventBody::Completion { exit_code: Some(0) },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "completion");
        assert_eq!(json["payload"]["exitCode"], 0);
    }

    #[test]
    fn stdin_frame_parses() {
        let frame: StdinFrame = serde_json::from_str(r#"{"data":"42\n"}"#).unwrap();
        assert_eq!(frame.data, "42\n");
    }
}
