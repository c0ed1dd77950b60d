use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::JobId;
use crate::error::OpsError;
use crate::http::error_message_from_value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
    Unknown(String),
}

impl JobStatus {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "running" => JobStatus::Running,
            "succeeded" => JobStatus::Succeeded,
            "failed" => JobStatus::Failed,
            other => JobStatus::Unknown(other.to_string()),
        }
    }
}

/// TDR `JobModel` as returned by submit and `/jobs/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobModel {
    pub id: String,
    #[serde(default)]
    pub job_status: String,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub submitted: Option<String>,
    #[serde(default)]
    pub completed: Option<String>,
}

impl JobModel {
    pub fn status(&self) -> JobStatus {
        JobStatus::parse(&self.job_status)
    }

    pub fn job_id(&self) -> Result<JobId, OpsError> {
        self.id.parse()
    }
}

pub trait JobApi {
    /// HTTP status of the poll together with the job model.
    fn job_status(&self, job_id: &JobId) -> Result<(u16, JobModel), OpsError>;
    /// HTTP status of the result call together with its body.
    fn job_result(&self, job_id: &JobId) -> Result<(u16, Value), OpsError>;
}

/// Polls `job_id` every `interval` until it leaves the running state, then
/// fetches its result. Only an HTTP 200 result of a `succeeded` job is a
/// success; every other combination surfaces the remote body as
/// [`OpsError::JobFailed`].
pub fn wait_for_job<A: JobApi + ?Sized>(
    api: &A,
    job_id: &JobId,
    interval: Duration,
    sink: &dyn ProgressSink,
) -> Result<Value, OpsError> {
    let started = Instant::now();
    let mut polls = 0usize;
    let status = loop {
        let (http_status, model) = api.job_status(job_id)?;
        let status = model.status();
        polls += 1;
        if http_status == 202 || status == JobStatus::Running {
            sink.event(ProgressEvent {
                message: format!("job {job_id} running; poll {polls}"),
                elapsed: Some(started.elapsed()),
            });
            thread::sleep(interval);
            continue;
        }
        break status;
    };

    let (result_status, body) = api.job_result(job_id)?;
    sink.event(ProgressEvent {
        message: format!("job {job_id} finished; result status {result_status}"),
        elapsed: Some(started.elapsed()),
    });

    if result_status == 200 && status == JobStatus::Succeeded {
        return Ok(body);
    }

    let message = error_message_from_value(&body).unwrap_or_else(|| match &body {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    });
    Err(OpsError::JobFailed {
        job_id: job_id.to_string(),
        status: result_status,
        message,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::output::JsonOutput;

    struct Scripted {
        polls: RefCell<VecDeque<(u16, &'static str)>>,
        result: (u16, Value),
        result_calls: RefCell<usize>,
    }

    impl Scripted {
        fn new(polls: Vec<(u16, &'static str)>, result: (u16, Value)) -> Self {
            Self {
                polls: RefCell::new(polls.into()),
                result,
                result_calls: RefCell::new(0),
            }
        }
    }

    impl JobApi for Scripted {
        fn job_status(&self, job_id: &JobId) -> Result<(u16, JobModel), OpsError> {
            let (code, status) = self.polls.borrow_mut().pop_front().expect("poll script");
            Ok((
                code,
                JobModel {
                    id: job_id.to_string(),
                    job_status: status.to_string(),
                    status_code: Some(code),
                    description: None,
                    submitted: None,
                    completed: None,
                },
            ))
        }

        fn job_result(&self, _job_id: &JobId) -> Result<(u16, Value), OpsError> {
            *self.result_calls.borrow_mut() += 1;
            Ok(self.result.clone())
        }
    }

    #[test]
    fn polls_until_terminal_then_returns_result() {
        let api = Scripted::new(
            vec![(202, "running"), (202, "running"), (200, "succeeded")],
            (200, json!({"row_count": 4, "bad_row_count": 0})),
        );
        let job: JobId = "abc123".parse().unwrap();
        let result = wait_for_job(&api, &job, Duration::ZERO, &JsonOutput).unwrap();
        assert_eq!(result["row_count"], 4);
        assert!(api.polls.borrow().is_empty());
        assert_eq!(*api.result_calls.borrow(), 1);
    }

    #[test]
    fn failed_job_surfaces_remote_error() {
        let api = Scripted::new(
            vec![(202, "running"), (200, "failed")],
            (
                400,
                json!({"message": "Ingest failed", "errorDetail": ["bad row 2"]}),
            ),
        );
        let job: JobId = "abc123".parse().unwrap();
        let err = wait_for_job(&api, &job, Duration::ZERO, &JsonOutput).unwrap_err();
        assert_matches!(
            err,
            OpsError::JobFailed { status: 400, ref message, .. }
                if message == "Ingest failed (bad row 2)"
        );
    }

    #[test]
    fn succeeded_status_with_non_200_result_is_failure() {
        let api = Scripted::new(vec![(200, "succeeded")], (500, json!("boom")));
        let job: JobId = "j".parse().unwrap();
        let err = wait_for_job(&api, &job, Duration::ZERO, &JsonOutput).unwrap_err();
        assert_matches!(
            err,
            OpsError::JobFailed { status: 500, ref message, .. } if message == "boom"
        );
    }

    #[test]
    fn http_202_keeps_polling_even_if_status_is_stale() {
        let api = Scripted::new(
            vec![(202, "succeeded"), (200, "succeeded")],
            (200, json!({})),
        );
        let job: JobId = "j".parse().unwrap();
        wait_for_job(&api, &job, Duration::ZERO, &JsonOutput).unwrap();
        assert!(api.polls.borrow().is_empty());
    }
}
