use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::api::{ApiError, ForecastApi, HealthReport, PredictRequest, PredictionResult};
use crate::catalog::ModelCatalog;
use crate::logging::{log, obj, v_str, Domain, Level, ProfileScope};
use crate::state::Config;

/// reqwest transport for the forecast service.
pub struct HttpApi {
    client: Client,
    cfg: Config,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

impl HttpApi {
    pub fn new(cfg: Config) -> Self {
        let mut builder = Client::builder();
        if let Some(timeout) = cfg.http_timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            cfg,
        }
    }

    fn url(&self, path: &str) -> Result<String, ApiError> {
        self.cfg
            .endpoint(path)
            .map(|u| u.to_string())
            .map_err(|e| ApiError::Transport(e.to_string()))
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(Self::status_error(status.as_u16(), resp).await);
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// A JSON body with a string `detail` becomes the error message.
    async fn status_error(status: u16, resp: Response) -> ApiError {
        let detail = resp
            .bytes()
            .await
            .ok()
            .and_then(|bytes| serde_json::from_slice::<ErrorBody>(&bytes).ok())
            .and_then(|body| match body.detail {
                Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
                _ => None,
            });
        ApiError::Status { status, detail }
    }
}

#[async_trait::async_trait]
impl ForecastApi for HttpApi {
    async fn health(&self) -> Result<HealthReport, ApiError> {
        let url = self.url("/api/health")?;
        let resp = self.client.get(&url).send().await?;
        Self::decode(resp).await
    }

    async fn options(&self) -> Result<ModelCatalog, ApiError> {
        let url = self.url("/api/options")?;
        let _scope = ProfileScope::new("fetch_options");
        let resp = self.client.get(&url).send().await?;
        Self::decode(resp).await
    }

    async fn predict(&self, request: &PredictRequest) -> Result<PredictionResult, ApiError> {
        let url = self.url("/api/predict")?;
        let fingerprint = request.fingerprint();
        log(
            Level::Debug,
            Domain::Submit,
            "predict_request",
            obj(&[
                ("fingerprint", v_str(&fingerprint)),
                ("model_type", v_str(&request.model_type)),
                ("region", v_str(&request.region)),
            ]),
        );
        let _scope = ProfileScope::with_context("predict", &[("fingerprint", v_str(&fingerprint))]);
        let resp = self.client.post(&url).json(request).send().await?;
        Self::decode(resp).await
    }
}
