//! HTTP implementations of the service contracts, built on `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::{AuthApi, RecordApi, RemoteError, RemoteResult};
use crate::config::ServiceConfig;
use crate::models::{Credential, LoginRequest, LoginResponse, PatientDraft, PatientId, RemotePatient};

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RemoteError::Decode(e.to_string())
        } else {
            RemoteError::Network(e.to_string())
        }
    }
}

/// Shared client plus base URL.
#[derive(Debug, Clone)]
struct Transport {
    client: Client,
    base_url: Url,
}

impl Transport {
    fn new(base_url: &str, timeout: Duration) -> RemoteResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RemoteError::Config(format!("invalid base URL {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Config(format!(
                "base URL cannot carry a path: {base_url}"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Config(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// Base URL with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RemoteError::Config(format!("base URL cannot carry a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(
        &self,
        method: Method,
        segments: &[&str],
        credential: Option<&Credential>,
    ) -> RemoteResult<RequestBuilder> {
        let url = self.endpoint(segments)?;
        debug!(%method, %url, "Sending request");

        let mut request = self.client.request(method, url);
        if let Some(credential) = credential {
            request = request.header(AUTHORIZATION, credential.bearer());
        }
        Ok(request)
    }
}

/// Turn a non-2xx response into an error, keeping the body as the message.
async fn check_status(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(RemoteError::from_status(status.as_u16(), message))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> RemoteResult<T> {
    let response = check_status(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

/// Auth service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAuthClient {
    transport: Transport,
}

impl HttpAuthClient {
    /// `base_url` includes the `/auth` prefix.
    pub fn new(base_url: &str, timeout: Duration) -> RemoteResult<Self> {
        Ok(Self {
            transport: Transport::new(base_url, timeout)?,
        })
    }

    pub fn from_config(config: &ServiceConfig) -> RemoteResult<Self> {
        Self::new(&config.auth_base_url, config.request_timeout())
    }
}

#[async_trait]
impl AuthApi for HttpAuthClient {
    async fn login(&self, request: &LoginRequest) -> RemoteResult<LoginResponse> {
        let response = self
            .transport
            .request(Method::POST, &["login"], None)?
            .json(request)
            .send()
            .await?;
        read_json(response).await
    }

    async fn validate_token(&self, credential: &Credential) -> RemoteResult<()> {
        let response = self
            .transport
            .request(Method::GET, &["validate"], Some(credential))?
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

/// Record service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRecordClient {
    transport: Transport,
}

impl HttpRecordClient {
    /// `base_url` is the API root; `/patients` is appended.
    pub fn new(base_url: &str, timeout: Duration) -> RemoteResult<Self> {
        Ok(Self {
            transport: Transport::new(base_url, timeout)?,
        })
    }

    pub fn from_config(config: &ServiceConfig) -> RemoteResult<Self> {
        Self::new(&config.record_base_url, config.request_timeout())
    }
}

#[async_trait]
impl RecordApi for HttpRecordClient {
    async fn list(&self, credential: &Credential) -> RemoteResult<Vec<RemotePatient>> {
        let response = self
            .transport
            .request(Method::GET, &["patients"], Some(credential))?
            .send()
            .await?;
        read_json(response).await
    }

    async fn create(
        &self,
        credential: &Credential,
        draft: &PatientDraft,
    ) -> RemoteResult<RemotePatient> {
        let response = self
            .transport
            .request(Method::POST, &["patients"], Some(credential))?
            .json(draft)
            .send()
            .await?;
        read_json(response).await
    }

    async fn update(
        &self,
        credential: &Credential,
        id: &PatientId,
        draft: &PatientDraft,
    ) -> RemoteResult<RemotePatient> {
        let response = self
            .transport
            .request(Method::PUT, &["patients", id.as_str()], Some(credential))?
            .json(draft)
            .send()
            .await?;
        read_json(response).await
    }

    async fn delete(&self, credential: &Credential, id: &PatientId) -> RemoteResult<()> {
        let response = self
            .transport
            .request(Method::DELETE, &["patients", id.as_str()], Some(credential))?
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base: &str) -> Transport {
        Transport::new(base, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let t = transport("http://localhost:4004/auth");
        assert_eq!(
            t.endpoint(&["login"]).unwrap().as_str(),
            "http://localhost:4004/auth/login"
        );

        let t = transport("http://localhost:4004/auth/");
        assert_eq!(
            t.endpoint(&["validate"]).unwrap().as_str(),
            "http://localhost:4004/auth/validate"
        );
    }

    #[test]
    fn test_endpoint_encodes_id() {
        let t = transport("http://localhost:4004/api");
        assert_eq!(
            t.endpoint(&["patients", "a/b c"]).unwrap().as_str(),
            "http://localhost:4004/api/patients/a%2Fb%20c"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpAuthClient::new("not a url", Duration::from_secs(1)),
            Err(RemoteError::Config(_))
        ));
        assert!(matches!(
            HttpRecordClient::new("mailto:someone@example.org", Duration::from_secs(1)),
            Err(RemoteError::Config(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = ServiceConfig::default();
        assert!(HttpAuthClient::from_config(&config).is_ok());
        assert!(HttpRecordClient::from_config(&config).is_ok());
    }
}
