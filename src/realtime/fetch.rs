use crate::error::NetworkError;
use crate::realtime::types::RawPayload;
use reqwest::{Client, Url};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

const CACHE_BUSTER_PARAM: &str = "num";
const CONTINUITY_PARAM: &str = "dataStamp";

/// Issues one GET against a data endpoint.
pub trait Transport: Send + Sync + 'static {
    fn get(&self, url: &str) -> impl Future<Output = Result<RawPayload, NetworkError>> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<RawPayload, NetworkError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| NetworkError::from_reqwest(url, error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::status(url, status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| NetworkError::from_reqwest(url, error))?;
        Ok(RawPayload::new(body.to_vec()))
    }
}

pub fn request_url(endpoint: &str, continuity_token: Option<&str>, nonce: u32) -> String {
    match Url::parse(endpoint) {
        Ok(mut url) => {
            {
                let mut query = url.query_pairs_mut();
                query.append_pair(CACHE_BUSTER_PARAM, &nonce.to_string());
                if let Some(token) = continuity_token {
                    query.append_pair(CONTINUITY_PARAM, token);
                }
            }
            url.to_string()
        }
        Err(_) => {
            let separator = if endpoint.contains('?') { '&' } else { '?' };
            let mut url = format!("{endpoint}{separator}{CACHE_BUSTER_PARAM}={nonce}");
            if let Some(token) = continuity_token {
                url.push_str(&format!("&{CONTINUITY_PARAM}={token}"));
            }
            url
        }
    }
}

#[derive(Debug)]
struct ActiveRequest {
    generation: u64,
    cancel: CancellationToken,
}

/// Owns the single in-flight request of a session.
#[derive(Debug)]
pub struct FetchClient<T> {
    transport: Arc<T>,
    request_timeout: Option<Duration>,
    active: Option<ActiveRequest>,
}

impl<T: Transport> FetchClient<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            request_timeout: None,
            active: None,
        }
    }

    pub fn set_request_timeout(&mut self, request_timeout: Option<Duration>) {
        self.request_timeout = request_timeout;
    }

    /// Starts a request tagged with `generation`, aborting any request still active.
    ///
    /// The returned future owns everything it needs and can be spawned; it
    /// resolves with [`NetworkError::aborted`] once [`FetchClient::abort`] is called.
    pub fn fetch(
        &mut self,
        endpoint: &str,
        continuity_token: Option<&str>,
        generation: u64,
    ) -> impl Future<Output = Result<RawPayload, NetworkError>> + Send + 'static {
        self.abort();

        let cancel = CancellationToken::new();
        self.active = Some(ActiveRequest {
            generation,
            cancel: cancel.clone(),
        });

        let transport = Arc::clone(&self.transport);
        let request_timeout = self.request_timeout;
        let url = request_url(endpoint, continuity_token, rand::random::<u32>());
        trace!(%url, generation, "issuing realtime fetch");

        async move {
            let request = async {
                match request_timeout {
                    Some(limit) => match tokio::time::timeout(limit, transport.get(&url)).await {
                        Ok(result) => result,
                        Err(_) => Err(NetworkError::timeout(url.as_str())),
                    },
                    None => transport.get(&url).await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => Err(NetworkError::aborted(url.as_str())),
                result = request => result,
            }
        }
    }

    /// Asks the active request, if any, to stop. Returns whether one was active.
    pub fn abort(&mut self) -> bool {
        match self.active.take() {
            Some(active) => {
                trace!(generation = active.generation, "aborting realtime fetch");
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Releases the active handle once the completion for `generation` has been processed.
    pub fn finish(&mut self, generation: u64) {
        if self.active_generation() == Some(generation) {
            self.active = None;
        }
    }

    pub fn active_generation(&self) -> Option<u64> {
        self.active.as_ref().map(|active| active.generation)
    }

    pub fn has_active_request(&self) -> bool {
        self.active.is_some()
    }
}
