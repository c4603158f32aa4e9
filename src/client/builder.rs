use super::Client;
use crate::error::{ClientError, Result};
use reqwest::{redirect::Policy, Client as ReqwestClient, Proxy};
use std::time::Duration;

#[derive(Default)]
pub struct ClientBuilder {
    proxy: Option<String>,
    connect_timeout: Option<Duration>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route outbound traffic through an upstream proxy.
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Client> {
        // Redirects are followed by RedirectFetcher, never by the transport,
        // and bodies are relayed exactly as the mirror encoded them.
        let mut client_builder = ReqwestClient::builder()
            .redirect(Policy::none())
            .no_gzip()
            .no_brotli()
            .no_deflate();

        if let Some(proxy_url) = self.proxy {
            client_builder = client_builder.proxy(Proxy::all(&proxy_url).map_err(|e| {
                ClientError::BuildError(format!("Failed to configure proxy: {}", e))
            })?);
        }

        if let Some(timeout) = self.connect_timeout {
            client_builder = client_builder.connect_timeout(timeout);
        }

        let inner = client_builder
            .build()
            .map_err(|e| ClientError::BuildError(format!("Failed to build client: {}", e)))?;

        Ok(Client { inner })
    }
}
