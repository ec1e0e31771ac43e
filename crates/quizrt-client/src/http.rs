//! REST backend implementation.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use quizrt_core::error::BackendError;
use quizrt_core::model::{AnswerPaperId, EvaluationResult, QuestionId, SubmissionStatus};
use quizrt_core::traits::{
    AnswerPayload, AnswerStatus, QuizBackend, StartAttemptResponse, SubmitResponse,
};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Assessment backend reached over its JSON API.
pub struct HttpBackend {
    base_url: String,
    api_token: Option<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: &str, api_token: Option<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("failed to build HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.filter(|t| !t.is_empty()),
            timeout_secs,
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => req.header("Authorization", format!("Token {token}")),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, BackendError> {
        let response = self.authorized(req).send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(self.timeout_secs)
            } else {
                BackendError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Server {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let response = self.send(self.client.get(self.url(path))).await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| BackendError::Network(e.to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| BackendError::Decode(format!("failed to parse response: {e}")))
}

/// Start response: either the attempt, or a message saying why not.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawStart {
    Attempt(StartAttemptResponse),
    Refused { message: String },
}

/// Submit response: a pending evaluation id, or an immediate verdict.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSubmit {
    Pending { uid: RawUid },
    Immediate(EvaluationResult),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawUid {
    Number(u64),
    Text(String),
}

impl RawUid {
    fn into_string(self) -> String {
        match self {
            RawUid::Number(n) => n.to_string(),
            RawUid::Text(s) => s,
        }
    }
}

#[derive(Deserialize)]
struct RawStatus {
    status: String,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

impl From<RawStatus> for AnswerStatus {
    fn from(raw: RawStatus) -> Self {
        if raw.status != "done" {
            return AnswerStatus::Running;
        }
        let result = match raw.result {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        AnswerStatus::Done { result }
    }
}

#[async_trait]
impl QuizBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self))]
    async fn start_attempt(
        &self,
        course_id: u64,
        quiz_id: u64,
    ) -> Result<StartAttemptResponse, BackendError> {
        match self
            .get_json::<RawStart>(&format!("start_quiz/{course_id}/{quiz_id}/"))
            .await?
        {
            RawStart::Attempt(start) => {
                debug!(answerpaper = start.answerpaper.id, "attempt started");
                Ok(start)
            }
            RawStart::Refused { message } => Err(BackendError::QuizUnavailable(message)),
        }
    }

    #[instrument(skip(self, payload))]
    async fn submit_answer(
        &self,
        answerpaper_id: AnswerPaperId,
        question_id: QuestionId,
        payload: &AnswerPayload,
    ) -> Result<SubmitResponse, BackendError> {
        let req = self
            .client
            .post(self.url(&format!("validate/{answerpaper_id}/{question_id}/")))
            .json(payload);
        let response = self.send(req).await?;

        Ok(match decode::<RawSubmit>(response).await? {
            RawSubmit::Pending { uid } => SubmitResponse::Pending {
                uid: uid.into_string(),
            },
            RawSubmit::Immediate(result) => SubmitResponse::Immediate(result),
        })
    }

    #[instrument(skip(self))]
    async fn get_answer_result(&self, uid: &str) -> Result<AnswerStatus, BackendError> {
        let raw: RawStatus = self.get_json(&format!("validate/{uid}/")).await?;
        Ok(raw.into())
    }

    #[instrument(skip(self))]
    async fn quit_attempt(&self, answerpaper_id: AnswerPaperId) -> Result<(), BackendError> {
        self.send(self.client.get(self.url(&format!("quit/{answerpaper_id}/"))))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_submission_status(
        &self,
        answerpaper_id: AnswerPaperId,
    ) -> Result<SubmissionStatus, BackendError> {
        self.get_json(&format!("answerpapers/{answerpaper_id}/submission/"))
            .await
    }
}
