//! Test server wrapper that starts Switchyard on a random port

use std::net::SocketAddr;

use switchyard_config::Config;
use switchyard_server::Server;
use tokio_util::sync::CancellationToken;

/// A running test server instance
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
}

impl TestServer {
    /// Start a test server with the given configuration
    ///
    /// Binds to port 0 for automatic port assignment. The health probe runs
    /// when the configuration enables it.
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let server = Server::new(&config).await?;
        let shutdown = CancellationToken::new();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let token = shutdown.clone();
        tokio::spawn(async move {
            server.serve_on(listener, token).await.ok();
        });

        let client = reqwest::Client::new();

        Ok(Self { addr, shutdown, client })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// `POST /v1/infer` with a bearer credential
    pub async fn infer(&self, credential: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url("/v1/infer"))
            .bearer_auth(credential)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn get_json(&self, path: &str) -> (u16, serde_json::Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or_default())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
