//! Client for the mobile webservice API.
//!
//! A [`WebserviceClient`] owns its [`Session`]: [`WebserviceClient::login`]
//! stores the token pair and every later call reads it. Remote failures are
//! decoded once here into [`AuthError`] / [`ApiError`] variants.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::ContentSource;
use super::error::{ApiError, AuthError, TransportError, body_excerpt};
use super::types::{
    BatchEnvelope, BatchRequest, BatchResponse, Course, CourseContents, ExceptionEnvelope,
    Session, SiteInfo, TokenResponse, redact,
};
use crate::download::{
    DEFAULT_REQUEST_TIMEOUT_SECS, FailureType, RetryPolicy, base_client_builder,
    classify_status, rate_limit_delay,
};

/// Service name the token endpoint issues mobile tokens for.
pub const MOBILE_SERVICE: &str = "moodle_mobile_app";

/// Function that runs several webservice functions in one request.
pub const BATCH_FUNCTION: &str = "tool_mobile_call_external_functions";

const FN_SITE_INFO: &str = "core_webservice_get_site_info";
const FN_USER_COURSES: &str = "core_enrol_get_users_courses";
const FN_COURSE_CONTENTS: &str = "core_course_get_contents";

/// Form settings sent with every function call.
const CALL_SETTINGS: [(&str, &str); 3] = [
    ("moodlewssettingfilter", "true"),
    ("moodlewssettingfileurl", "true"),
    ("moodlewssettinglang", "en"),
];

/// Webservice client bound to one site.
///
/// # Example
///
/// ```no_run
/// use moodle_dump_core::moodle::WebserviceClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut client = WebserviceClient::new("https://campus.example")?;
/// client.login("student", "secret").await?;
/// let info = client.site_info().await?;
/// println!("user id: {:?}", info.user_id);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct WebserviceClient {
    http: Client,
    site: String,
    retry_policy: RetryPolicy,
    session: Option<Session>,
}

impl WebserviceClient {
    /// Creates a client for `site` with the default request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] if the HTTP client cannot be built.
    pub fn new(site: &str) -> Result<Self, TransportError> {
        Self::with_timeout(site, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    /// Creates a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] if the HTTP client cannot be built.
    pub fn with_timeout(site: &str, timeout: Duration) -> Result<Self, TransportError> {
        let http = base_client_builder(timeout)
            .build()
            .map_err(|source| TransportError::Client { source })?;
        Ok(Self {
            http,
            site: normalize_site(site),
            retry_policy: RetryPolicy::default(),
            session: None,
        })
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Uses an already obtained session instead of logging in.
    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Site base URL without trailing slash.
    #[must_use]
    pub fn site(&self) -> &str {
        &self.site
    }

    /// Current session, if logged in.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Exchanges credentials for a token pair and stores it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] on transport failure, non-200 status, invalid
    /// JSON, a remote error object, or a response without token. The
    /// stored session is left untouched on failure.
    #[instrument(skip(self, password), fields(site = %self.site))]
    pub async fn login(&mut self, username: &str, password: &str) -> Result<Session, AuthError> {
        let url = format!("{}/login/token.php", self.site);
        let form = [
            ("username", username),
            ("password", password),
            ("service", MOBILE_SERVICE),
        ];

        let response = self
            .send_with_retry(&url, || {
                self.http.post(&url).query(&[("lang", "en")]).form(&form)
            })
            .await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(&url, e))?;
        if status != StatusCode::OK {
            return Err(AuthError::HttpStatus {
                status: status.as_u16(),
                body: body_excerpt(&body),
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|source| AuthError::InvalidJson { source })?;

        if parsed.error.is_some() || parsed.error_code.is_some() {
            let message = parsed
                .error
                .or_else(|| parsed.error_code.clone())
                .unwrap_or_default();
            return Err(AuthError::Rejected {
                message,
                error_code: parsed.error_code,
            });
        }

        let token = parsed
            .token
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;
        let session = Session {
            token,
            private_token: parsed.private_token.filter(|token| !token.is_empty()),
        };

        info!(token = %redact(&session.token), "logged in");
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Calls `function` and decodes the payload into `T`.
    ///
    /// # Errors
    ///
    /// See [`WebserviceClient::call_value`]; additionally returns
    /// [`ApiError::UnexpectedShape`] when the payload does not match `T`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        function: &str,
        arguments: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let value = self.call_value(function, arguments).await?;
        serde_json::from_value(value).map_err(|source| ApiError::UnexpectedShape {
            function: function.to_string(),
            source,
        })
    }

    /// Calls `function` and returns the raw JSON payload.
    ///
    /// `arguments` are sent as query parameters next to the function name
    /// and token.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when not logged in, on transport failure, non-200
    /// status, invalid JSON or a remote exception envelope.
    #[instrument(skip(self, arguments))]
    pub async fn call_value(
        &self,
        function: &str,
        arguments: &[(&str, String)],
    ) -> Result<Value, ApiError> {
        self.invoke(function, arguments, &[]).await
    }

    /// Runs several functions in one round trip.
    ///
    /// Responses come back in request order. A failed entry has `error`
    /// set; the batch itself only fails as a whole on transport or
    /// envelope errors.
    ///
    /// # Errors
    ///
    /// Same as [`WebserviceClient::call`].
    #[instrument(skip(self, requests), fields(count = requests.len()))]
    pub async fn call_batch(
        &self,
        requests: &[BatchRequest],
    ) -> Result<Vec<BatchResponse>, ApiError> {
        let mut form = Vec::with_capacity(requests.len() * 4);
        for (index, request) in requests.iter().enumerate() {
            form.push((
                format!("requests[{index}][function]"),
                request.function.clone(),
            ));
            form.push((
                format!("requests[{index}][arguments]"),
                request.arguments.to_string(),
            ));
            form.push((format!("requests[{index}][settingfilter]"), "1".to_string()));
            form.push((format!("requests[{index}][settingfileurl]"), "1".to_string()));
        }

        let value = self.invoke(BATCH_FUNCTION, &[], &form).await?;
        let envelope: BatchEnvelope =
            serde_json::from_value(value).map_err(|source| ApiError::UnexpectedShape {
                function: BATCH_FUNCTION.to_string(),
                source,
            })?;
        Ok(envelope.responses)
    }

    /// Identity of the logged-in user.
    ///
    /// # Errors
    ///
    /// Same as [`WebserviceClient::call`].
    pub async fn site_info(&self) -> Result<SiteInfo, ApiError> {
        self.call(FN_SITE_INFO, &[]).await
    }

    /// Courses `user_id` is enrolled in.
    ///
    /// # Errors
    ///
    /// Same as [`WebserviceClient::call`].
    pub async fn user_courses(&self, user_id: i64) -> Result<Vec<Course>, ApiError> {
        self.call(
            FN_USER_COURSES,
            &[
                ("userid", user_id.to_string()),
                ("returnusercount", "0".to_string()),
            ],
        )
        .await
    }

    /// Section/module/file tree of one course, with the payload kept as
    /// received.
    ///
    /// # Errors
    ///
    /// Same as [`WebserviceClient::call`].
    pub async fn course_contents(&self, course_id: i64) -> Result<CourseContents, ApiError> {
        let value = self
            .call_value(FN_COURSE_CONTENTS, &[("courseid", course_id.to_string())])
            .await?;
        CourseContents::from_value(value).map_err(|source| ApiError::UnexpectedShape {
            function: FN_COURSE_CONTENTS.to_string(),
            source,
        })
    }

    async fn invoke(
        &self,
        function: &str,
        arguments: &[(&str, String)],
        extra_form: &[(String, String)],
    ) -> Result<Value, ApiError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ApiError::NotAuthenticated {
                function: function.to_string(),
            })?;

        let url = format!("{}/webservice/rest/server.php", self.site);
        let mut query: Vec<(&str, &str)> = vec![
            ("wsfunction", function),
            ("wstoken", session.token.as_str()),
            ("moodlewsrestformat", "json"),
        ];
        query.extend(arguments.iter().map(|(key, value)| (*key, value.as_str())));

        let mut form: Vec<(&str, &str)> = CALL_SETTINGS.to_vec();
        form.extend(
            extra_form
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str())),
        );

        let response = self
            .send_with_retry(&url, || self.http.post(&url).query(&query).form(&form))
            .await
            .map_err(|source| ApiError::Transport {
                function: function.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport {
                function: function.to_string(),
                source: TransportError::from_reqwest(&url, e),
            })?;

        if status != StatusCode::OK {
            return Err(ApiError::HttpStatus {
                function: function.to_string(),
                status: status.as_u16(),
                body: body_excerpt(&body),
            });
        }

        let value: Value = serde_json::from_str(&body).map_err(|source| ApiError::InvalidJson {
            function: function.to_string(),
            source,
        })?;

        if let Some(error) = exception_from(function, &value) {
            return Err(error);
        }

        debug!(function, bytes = body.len(), "call succeeded");
        Ok(value)
    }

    /// Sends a request, retrying retryable statuses and transport errors.
    ///
    /// The final response is returned whatever its status; only transport
    /// failures surface as errors.
    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<Response, TransportError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 1;
        loop {
            let outcome = build()
                .send()
                .await
                .map_err(|e| TransportError::from_reqwest(url, e));

            let retryable = match &outcome {
                Ok(response) if response.status().is_success() => None,
                Ok(response) => Some((
                    classify_status(response.status().as_u16()),
                    rate_limit_delay(response),
                )),
                Err(error) if error.is_retryable() => Some((FailureType::Transient, None)),
                Err(_) => None,
            };
            let Some((failure, retry_after)) = retryable else {
                return outcome;
            };

            let Some(backoff) = self.retry_policy.next_delay(failure, attempt) else {
                return outcome;
            };
            let delay = retry_after.unwrap_or(backoff);
            warn!(
                url,
                status = outcome.as_ref().ok().map(|r| r.status().as_u16()),
                attempt = attempt + 1,
                delay_ms = delay.as_millis(),
                "retrying request"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl ContentSource for WebserviceClient {
    async fn course_contents(&self, course_id: i64) -> Result<CourseContents, ApiError> {
        WebserviceClient::course_contents(self, course_id).await
    }
}

fn normalize_site(site: &str) -> String {
    site.trim().trim_end_matches('/').to_string()
}

/// Decodes a remote exception envelope, if `value` is one.
fn exception_from(function: &str, value: &Value) -> Option<ApiError> {
    let raw = value.get("exception")?;
    let envelope = ExceptionEnvelope::deserialize(value).unwrap_or_else(|_| ExceptionEnvelope {
        exception: raw.to_string(),
        error_code: None,
        message: None,
    });
    Some(ApiError::Exception {
        function: function.to_string(),
        exception: envelope.exception,
        error_code: envelope.error_code,
        message: envelope.message.unwrap_or_default(),
    })
}
