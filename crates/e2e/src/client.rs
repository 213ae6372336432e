//! HTTP client for the remote pipeline API
//!
//! Authenticates once at construction and then issues one request per
//! operation. A non-200 status is a transport-level failure; a stage that ran
//! and failed comes back as a normal `StageExecutionResult` with
//! `success = false`.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stagewise_common::{ApiConfig, DataPayload, Pipeline, Stage, StageType};
use tracing::{debug, error, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::orchestrator::StageExecutor;
use crate::result::StageExecutionResult;

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

#[derive(Deserialize)]
struct PipelineDto {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    project: Option<String>,
}

#[derive(Deserialize)]
struct StagesResponse {
    #[serde(default)]
    stages: Vec<StageDto>,
}

#[derive(Deserialize)]
struct StageDto {
    id: String,
    name: String,
    #[serde(rename = "type", default)]
    stage_type: Option<String>,
    #[serde(default)]
    config: Option<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteRequest<'a> {
    input_data: &'a DataPayload,
    execution_mode: &'static str,
    validate_only: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteResponse {
    success: bool,
    #[serde(default)]
    output_data: Option<DataPayload>,
    #[serde(default)]
    error: Option<String>,
}

/// Authenticated client for the pipeline API
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    /// Build the HTTP client and exchange credentials for a bearer token.
    ///
    /// Fails with `Authentication` whenever the login exchange does not
    /// produce a token, including when the endpoint is unreachable; no other
    /// request is attempted in that case.
    pub async fn connect(config: &ApiConfig) -> E2eResult<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();

        let login_http = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;

        let token = Self::login(&login_http, &base_url, config).await?;

        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| E2eError::Transport(format!("invalid token from login: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .default_headers(headers)
            .build()?;

        info!("Authenticated against {}", base_url);
        Ok(Self { http, base_url })
    }

    async fn login(http: &Client, base_url: &str, config: &ApiConfig) -> E2eResult<String> {
        let url = format!("{}/api/auth/login", base_url);
        debug!("POST {}", url);

        let response = http
            .post(&url)
            .json(&LoginRequest {
                username: &config.username,
                password: &config.password,
            })
            .send()
            .await
            .map_err(|e| {
                error!("Failed to reach login endpoint: {}", e);
                E2eError::authentication(None, format!("login request failed: {}", e))
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            error!("Authentication failed: HTTP {}", status);
            return Err(E2eError::authentication(
                Some(status.as_u16()),
                format!("login returned HTTP {}", status),
            ));
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| {
                E2eError::authentication(Some(status.as_u16()), format!("malformed login response: {}", e))
            })?;

        body.token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                E2eError::authentication(Some(status.as_u16()), "login response did not contain a token")
            })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the current pipeline definition
    pub async fn get_pipeline(&self, pipeline_id: &str) -> E2eResult<Pipeline> {
        let url = format!("{}/api/pipelines/{}", self.base_url, pipeline_id);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| E2eError::Transport(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!("Pipeline {} lookup returned HTTP {}", pipeline_id, status);
            return Err(E2eError::not_found("pipeline", pipeline_id));
        }

        let dto: PipelineDto = response
            .json()
            .await
            .map_err(|e| E2eError::Transport(format!("malformed pipeline response: {}", e)))?;

        let mut pipeline = Pipeline::new(dto.id, dto.name);
        pipeline.description = dto.description.unwrap_or_default();
        if let Some(project) = dto.project {
            pipeline.project = project;
        }
        Ok(pipeline)
    }

    /// Fetch the stages of a pipeline in the order the API returns them.
    ///
    /// That order is the execution order; stages are not re-sorted by
    /// their `order` field.
    pub async fn get_pipeline_stages(&self, pipeline_id: &str) -> E2eResult<Vec<Stage>> {
        let url = format!("{}/api/pipelines/{}/stages", self.base_url, pipeline_id);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| E2eError::Transport(format!("GET {} failed: {}", url, e)))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(E2eError::not_found("pipeline", pipeline_id)),
            status => {
                return Err(E2eError::Transport(format!("GET {} returned HTTP {}", url, status)));
            }
        }

        let body: StagesResponse = response
            .json()
            .await
            .map_err(|e| E2eError::Transport(format!("malformed stages response: {}", e)))?;

        Ok(body
            .stages
            .into_iter()
            .enumerate()
            .map(|(index, dto)| stage_from_dto(dto, index))
            .collect())
    }

    /// Execute one stage synchronously in test mode with `input_data`
    pub async fn execute_stage(
        &self,
        pipeline_id: &str,
        stage_id: &str,
        input_data: &DataPayload,
    ) -> E2eResult<StageExecutionResult> {
        let url = format!(
            "{}/api/pipelines/{}/stages/{}/execute",
            self.base_url, pipeline_id, stage_id
        );
        debug!("POST {}", url);

        let transport = |reason: String| E2eError::ExecutionTransport {
            stage_id: stage_id.to_string(),
            reason,
        };

        let response = self
            .http
            .post(&url)
            .json(&ExecuteRequest {
                input_data,
                execution_mode: "test",
                validate_only: false,
            })
            .send()
            .await
            .map_err(|e| transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(transport(format!("HTTP {}", status)));
        }

        let body: ExecuteResponse = response
            .json()
            .await
            .map_err(|e| transport(format!("malformed response: {}", e)))?;

        let output = body.output_data.unwrap_or_default();
        if body.success {
            if let Some(err) = body.error {
                debug!("Stage {} succeeded but reported error text: {}", stage_id, err);
            }
            Ok(StageExecutionResult::success(output))
        } else {
            let message = body
                .error
                .unwrap_or_else(|| "stage reported failure without an error message".to_string());
            Ok(StageExecutionResult::failure(message, output))
        }
    }
}

fn stage_from_dto(dto: StageDto, index: usize) -> Stage {
    let mut configuration = match dto.config {
        Some(Value::Object(map)) => map,
        _ => DataPayload::new(),
    };

    let type_tag = dto
        .stage_type
        .or_else(|| configuration.get("type").and_then(Value::as_str).map(str::to_string));

    let stage_type = type_tag
        .as_deref()
        .map(StageType::parse_lenient)
        .unwrap_or_default();

    if let Some(tag) = type_tag {
        configuration.insert("type".to_string(), Value::String(tag));
    }

    let mut stage = Stage::new(dto.id, dto.name, stage_type, index as u32);
    stage.configuration = configuration;
    stage
}

#[async_trait]
impl StageExecutor for ApiClient {
    async fn pipeline_stages(&self, pipeline_id: &str) -> E2eResult<Vec<Stage>> {
        self.get_pipeline_stages(pipeline_id).await
    }

    async fn run_stage(
        &self,
        pipeline_id: &str,
        stage: &Stage,
        input_data: &DataPayload,
    ) -> E2eResult<StageExecutionResult> {
        self.execute_stage(pipeline_id, &stage.id, input_data).await
    }
}
