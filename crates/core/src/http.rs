//! HTTP implementation of the upstream fetcher.

use std::time::Duration;

use metroscope_transit::{DataFetcher, FetchFuture, UpstreamError, UpstreamRequest};
use reqwest::Client;

use crate::config::ServiceSettings;

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(settings: &ServiceSettings) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| UpstreamError::Transport {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

fn transport(request: &UpstreamRequest, error: reqwest::Error) -> UpstreamError {
    UpstreamError::Transport {
        url: request.url().to_string(),
        message: error.to_string(),
    }
}

impl DataFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, request: &'a UpstreamRequest) -> FetchFuture<'a> {
        Box::pin(async move {
            tracing::debug!("{}", request);
            let builder = match request {
                UpstreamRequest::Get { url } => self.client.get(url),
                UpstreamRequest::Post { url, body } => self.client.post(url).body(body.clone()),
            };

            let response = builder.send().await.map_err(|e| transport(request, e))?;
            let status = response.status();
            if !status.is_success() {
                return Err(UpstreamError::Status {
                    url: request.url().to_string(),
                    status: status.as_u16(),
                });
            }

            let bytes = response.bytes().await.map_err(|e| transport(request, e))?;
            tracing::debug!("{}: {} bytes", request, bytes.len());
            Ok(bytes.to_vec())
        })
    }
}
