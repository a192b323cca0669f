use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type JobId = Uuid;

/// One unit of submitted code, as carried by the work queue.
///
/// The language stays a plain string on the wire; parsing it into the
/// closed [`crate::language::Language`] set is the engine's first
/// validation step.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub job_id: JobId,
    pub language: String,
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_queue_payload() {
        let raw = r#"{"jobId":"6f0cb1ea-3e1a-4c24-9bc6-96ad50f74f99","language":"python","code":"print(1+1)"}"#;
        let job: JobRequest = serde_json::from_str(raw).expect("payload should parse");
        assert_eq!(job.language, "python");
        assert_eq!(job.code, "print(1+1)");
    }

    #[test]
    fn rejects_payload_missing_code() {
        let raw = r#"{"jobId":"6f0cb1ea-3e1a-4c24-9bc6-96ad50f74f99","language":"python"}"#;
        assert!(serde_json::from_str::<JobRequest>(raw).is_err());
    }
}
