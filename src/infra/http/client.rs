//! Authenticated JSON transport for the dashboard REST API.
//!
//! Requests carry the current bearer token. A `401` triggers one token
//! refresh (when a refresh token is configured) and a single retry; every
//! other status is surfaced to the caller.

use std::sync::RwLock;

use reqwest::multipart::Form;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use syncdeck_api_types::{Envelope, RefreshTokenRequest, RefreshTokenResponse};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{QueryError, rw_read, rw_write};
use crate::config::ApiSettings;
use crate::infra::error::InfraError;

const SOURCE: &str = "infra::http::client";
const REFRESH_TOKEN_PATH: &str = "api/v1/auth/refresh-token";

struct Credentials {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

pub struct ApiClient {
    http: Client,
    base: Url,
    credentials: RwLock<Credentials>,
}

impl ApiClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, InfraError> {
        let http = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        Ok(Self {
            http,
            base: settings.base_url.clone(),
            credentials: RwLock::new(Credentials {
                access_token: settings.access_token.clone(),
                refresh_token: settings.refresh_token.clone(),
            }),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("syncdeck/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn url(&self, path: &str) -> Result<Url, QueryError> {
        self.base
            .join(path)
            .map_err(|err| QueryError::network(format!("invalid request URL `{path}`: {err}")))
    }

    /// Current bearer token, if any.
    pub fn access_token(&self) -> Option<String> {
        rw_read(&self.credentials, SOURCE, "access_token")
            .access_token
            .clone()
    }

    /// `GET path?query` decoded from the response envelope.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, QueryError> {
        let mut url = self.url(path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        let envelope: Envelope<T> = self
            .dispatch(|| Ok(self.http.get(url.clone())))
            .await?;
        Ok(envelope.into_data())
    }

    /// Send `body` as JSON and decode the response envelope.
    pub async fn send<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, QueryError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path)?;
        let envelope: Envelope<T> = self
            .dispatch(|| Ok(self.http.request(method.clone(), url.clone()).json(body)))
            .await?;
        Ok(envelope.into_data())
    }

    /// POST a multipart form. `form` is called again for the retry after a
    /// token refresh, since a form cannot be replayed.
    pub async fn send_multipart<T, F>(&self, path: &str, form: F) -> Result<T, QueryError>
    where
        T: DeserializeOwned,
        F: Fn() -> Result<Form, QueryError> + Sync,
    {
        let url = self.url(path)?;
        let envelope: Envelope<T> = self
            .dispatch(|| Ok(self.http.post(url.clone()).multipart(form()?)))
            .await?;
        Ok(envelope.into_data())
    }

    async fn dispatch<T, F>(&self, build: F) -> Result<T, QueryError>
    where
        T: DeserializeOwned,
        F: Fn() -> Result<RequestBuilder, QueryError> + Sync,
    {
        let mut response = self.send_authorized(build()?).await?;
        if response.status() == StatusCode::UNAUTHORIZED && self.refresh().await? {
            debug!("Retrying request with refreshed access token");
            response = self.send_authorized(build()?).await?;
        }
        decode_response(response).await
    }

    async fn send_authorized(&self, request: RequestBuilder) -> Result<Response, QueryError> {
        let request = match self.access_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        request.send().await.map_err(transport_error)
    }

    /// Exchange the refresh token for a new access token. Returns `false`
    /// when there is nothing to refresh with or the server refused.
    async fn refresh(&self) -> Result<bool, QueryError> {
        let refresh_token = rw_read(&self.credentials, SOURCE, "refresh")
            .refresh_token
            .clone();
        let Some(refresh_token) = refresh_token else {
            return Ok(false);
        };

        let url = self.url(REFRESH_TOKEN_PATH)?;
        let response = self
            .http
            .post(url)
            .json(&RefreshTokenRequest { refresh_token })
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            warn!(status = response.status().as_u16(), "Token refresh rejected");
            return Ok(false);
        }

        let envelope: Envelope<RefreshTokenResponse> = decode_response(response).await?;
        let fresh = envelope.into_data();
        let mut credentials = rw_write(&self.credentials, SOURCE, "refresh");
        credentials.access_token = Some(fresh.access_token);
        if let Some(rotated) = fresh.refresh_token {
            credentials.refresh_token = Some(rotated);
        }
        info!("Access token refreshed");
        Ok(true)
    }
}

fn transport_error(err: reqwest::Error) -> QueryError {
    if err.is_decode() {
        QueryError::decode(err.to_string())
    } else {
        QueryError::network(err.to_string())
    }
}

async fn decode_response<T: DeserializeOwned>(response: Response) -> Result<T, QueryError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(transport_error)?;
    if !status.is_success() {
        return Err(QueryError::server(
            status.as_u16(),
            String::from_utf8_lossy(&bytes),
        ));
    }
    serde_json::from_slice(&bytes)
        .map_err(|err| QueryError::decode(format!("failed to parse body: {err}")))
}
