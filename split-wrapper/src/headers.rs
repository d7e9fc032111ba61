use std::time::Duration;

use http::{Extensions, HeaderValue};
use reqwest::header::AUTHORIZATION;
use reqwest::{Request, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next, Result};

use crate::version::sdk_version_header;
use crate::Error;

const SDK_VERSION_HEADER: &str = "splitsdkversion";

/// Upper bound for a single request, so a hung connection cannot stall the
/// background task.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Adds the API key and SDK version to every request.
pub struct SdkHeadersMiddleware {
    authorization: HeaderValue,
    sdk_version: HeaderValue,
}

impl SdkHeadersMiddleware {
    pub fn new(api_key: &str) -> crate::Result<SdkHeadersMiddleware> {
        let mut authorization = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| Error::Configuration(format!("API key is not a valid header: {e}")))?;
        authorization.set_sensitive(true);
        let sdk_version = HeaderValue::from_str(&sdk_version_header())
            .map_err(|e| Error::Configuration(format!("invalid SDK version header: {e}")))?;
        Ok(SdkHeadersMiddleware {
            authorization,
            sdk_version,
        })
    }
}

#[async_trait::async_trait]
impl Middleware for SdkHeadersMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let headers = req.headers_mut();
        headers.insert(AUTHORIZATION, self.authorization.clone());
        headers.insert(SDK_VERSION_HEADER, self.sdk_version.clone());
        next.run(req, extensions).await
    }
}

/// HTTP client used for all traffic to the flag service.
pub fn build_client(api_key: &str) -> crate::Result<ClientWithMiddleware> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| Error::Configuration(e.to_string()))?;
    Ok(ClientBuilder::new(client)
        .with(SdkHeadersMiddleware::new(api_key)?)
        .build())
}
