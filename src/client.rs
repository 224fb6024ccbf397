use std::env;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::gateway::{ChatGateway, ChunkStream};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::sse::process_sse;
use crate::types::{ChatCompletion, ChatCompletionRequest};

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Environment variable holding the API credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Client for OpenAI-compatible chat completion APIs.
#[derive(Debug, Clone)]
pub struct OpenAi {
    api_key: String,
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
}

impl OpenAi {
    /// Create a new client.
    ///
    /// The API key can be provided directly or read from the OPENAI_API_KEY
    /// environment variable.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    ///
    /// `timeout` bounds connection setup and single-shot requests.  Streamed
    /// responses are read for as long as the provider keeps sending.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => env::var(API_KEY_ENV).map_err(|_| {
                Error::authentication(format!(
                    "API key not provided and {API_KEY_ENV} environment variable not set"
                ))
            })?,
        };
        if api_key.trim().is_empty() {
            return Err(Error::authentication("API key is empty"));
        }

        let base_url = parse_base_url(base_url.as_deref().unwrap_or(DEFAULT_API_URL))?;
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            client,
            base_url,
            timeout,
        })
    }

    /// The API key, masked for display.
    pub fn masked_api_key(&self) -> String {
        mask_api_key(&self.api_key)
    }

    fn endpoint(&self) -> Result<Url> {
        Ok(self.base_url.join("chat/completions")?)
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| Error::authentication("API key contains invalid header characters"))?;
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status = response.status();
        let status_code = status.as_u16();

        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|val| val.to_str().ok())
            .map(String::from);

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            #[serde(rename = "type")]
            error_type: Option<String>,
            message: Option<String>,
            param: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };

        let parsed_error = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error);
        let error_type = parsed_error.as_ref().and_then(|e| e.error_type.clone());
        let error_message = parsed_error
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| error_body.clone());
        let error_param = parsed_error.as_ref().and_then(|e| e.param.clone());

        match status_code {
            400 => Error::bad_request(error_message, error_param),
            401 => Error::authentication(error_message),
            403 => Error::permission(error_message),
            404 => Error::not_found(error_message, None, None),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message, request_id),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_type, error_message, request_id),
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {}", e),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
        }
    }

    /// Send a request to the API and get a non-streaming response.
    pub async fn send(&self, mut request: ChatCompletionRequest) -> Result<ChatCompletion> {
        request.stream = false;
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let result = self.send_inner(&request).await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        if result.is_err() {
            CLIENT_REQUEST_ERRORS.click();
        }
        result
    }

    async fn send_inner(&self, request: &ChatCompletionRequest) -> Result<ChatCompletion> {
        let response = self
            .client
            .post(self.endpoint()?)
            .headers(self.default_headers()?)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        response.json::<ChatCompletion>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })
    }

    /// Send a request to the API and get a streaming response.
    ///
    /// Returns a stream of chunks that ends at the provider's `[DONE]` marker.
    pub async fn stream(&self, mut request: ChatCompletionRequest) -> Result<ChunkStream> {
        request.stream = true;
        CLIENT_REQUESTS.click();

        let mut headers = self.default_headers()?;
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );

        let start = Instant::now();
        let response = self
            .client
            .post(self.endpoint()?)
            .headers(headers)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                self.map_send_error(e)
            })?;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }

        Ok(Box::pin(process_sse(response.bytes_stream())))
    }
}

#[async_trait::async_trait]
impl ChatGateway for OpenAi {
    async fn complete_once(&self, request: ChatCompletionRequest) -> Result<ChatCompletion> {
        self.send(request).await
    }

    async fn complete_stream(&self, request: ChatCompletionRequest) -> Result<ChunkStream> {
        self.stream(request).await
    }
}

/// Mask an API key for display, keeping only its first four characters.
///
/// Keys of four characters or fewer are masked entirely.
pub fn mask_api_key(api_key: &str) -> String {
    let len = api_key.chars().count();
    if len <= 4 {
        return "*".repeat(len);
    }
    let visible: String = api_key.chars().take(4).collect();
    format!("{visible}{}", "*".repeat(len - 4))
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    // Url::join drops the last path segment unless the base ends in a slash.
    let normalized = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    };
    Ok(Url::parse(&normalized)?)
}
