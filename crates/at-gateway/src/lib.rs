//! Router API client for the attendance monitor.
//!
//! Logs into the gateway with a derived challenge response, keeps the session
//! token, and lists connected devices. An unauthorized listing triggers
//! exactly one re-login and retry.

pub mod session;
pub mod transport;

use std::fmt;
use std::time::Duration;

use at_core::Device;
use thiserror::Error;
use tokio::time::Instant;

pub use session::{Session, derive_nonce, encrypt_password, fresh_nonce};
pub use transport::{
    DeviceListResponse, GatewayTransport, HttpTransport, LoginRequest, LoginResponse,
    UNAUTHORIZED_CODE,
};

/// Default timeout for every gateway request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Assumed session lifetime; the gateway does not report one.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_USERNAME: &str = "admin";
/// Shared key used by the router's web login.
pub const DEFAULT_KEY: &str = "a2ffa5c9be07488bbb04a3a47d3c5f6a";
pub const DEFAULT_LOGTYPE: u32 = 2;

/// Gateway client errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// Login failed or returned no token.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Transport failure or timeout.
    #[error("gateway request failed: {0}")]
    Network(String),
    /// The gateway answered with something unparseable.
    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

/// Login credentials and session policy.
#[derive(Clone)]
pub struct GatewayConfig {
    pub username: String,
    pub password: String,
    pub key: String,
    pub logtype: u32,
    pub session_ttl: Duration,
}

impl GatewayConfig {
    /// Creates a configuration with the router defaults and the given password.
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            username: DEFAULT_USERNAME.to_string(),
            password: password.into(),
            key: DEFAULT_KEY.to_string(),
            logtype: DEFAULT_LOGTYPE,
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("logtype", &self.logtype)
            .field("session_ttl", &self.session_ttl)
            .finish_non_exhaustive()
    }
}

/// Gateway client.
///
/// Owns at most one [`Session`]. All methods take `&mut self`; the monitor
/// drives the client from a single loop.
pub struct GatewayClient<T = HttpTransport> {
    transport: T,
    config: GatewayConfig,
    session: Option<Session>,
}

impl<T> fmt::Debug for GatewayClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClient")
            .field("config", &self.config)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl GatewayClient<HttpTransport> {
    /// Creates an HTTP client for the gateway at `host`.
    pub fn connect(
        host: &str,
        timeout: Duration,
        config: GatewayConfig,
    ) -> Result<Self, GatewayError> {
        Ok(Self::with_transport(HttpTransport::new(host, timeout)?, config))
    }
}

impl<T: GatewayTransport> GatewayClient<T> {
    pub const fn with_transport(transport: T, config: GatewayConfig) -> Self {
        Self {
            transport,
            config,
            session: None,
        }
    }

    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Drops the current session so the next listing logs in again.
    pub fn invalidate(&mut self) {
        self.session = None;
    }

    fn has_live_session(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.is_expired(Instant::now()))
    }

    /// Logs in and installs a fresh session.
    ///
    /// Any existing session is discarded first, so on failure no session is
    /// installed.
    pub async fn authenticate(&mut self) -> Result<&Session, GatewayError> {
        self.session = None;
        let nonce = fresh_nonce();
        let request = LoginRequest {
            username: self.config.username.clone(),
            password: encrypt_password(&self.config.password, &self.config.key, &nonce),
            logtype: self.config.logtype,
            nonce: nonce.clone(),
        };
        let response = self
            .transport
            .login(&request)
            .await
            .map_err(|err| match err {
                GatewayError::Auth(message) => GatewayError::Auth(message),
                other => GatewayError::Auth(other.to_string()),
            })?;
        let token = response
            .token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                GatewayError::Auth(format!("gateway returned no token (code {})", response.code))
            })?;

        let issued_at = Instant::now();
        tracing::info!(
            ttl_secs = self.config.session_ttl.as_secs(),
            "authenticated with gateway"
        );
        Ok(self.session.insert(Session {
            token,
            issued_at,
            assumed_expiry: issued_at + self.config.session_ttl,
            nonce,
        }))
    }

    /// Lists devices currently connected to the gateway.
    ///
    /// Logs in first when there is no session or its assumed lifetime has
    /// passed. A failed login yields an empty list. An unauthorized listing
    /// drops the session and retries once after a fresh login; a second
    /// unauthorized answer also yields an empty list. Transport failures are
    /// returned as errors.
    pub async fn list_online_devices(&mut self) -> Result<Vec<Device>, GatewayError> {
        if !self.has_live_session() {
            if let Err(err) = self.authenticate().await {
                tracing::warn!(error = %err, "gateway login failed; no devices observed");
                return Ok(Vec::new());
            }
        }

        let mut retried = false;
        loop {
            let Some(token) = self.session.as_ref().map(|session| session.token.clone()) else {
                return Ok(Vec::new());
            };
            let response = self.transport.device_list(&token).await?;
            if !response.is_unauthorized() {
                if response.code != 0 {
                    tracing::warn!(code = response.code, "gateway reported non-zero code");
                }
                tracing::debug!(devices = response.list.len(), "listed gateway devices");
                return Ok(response.list);
            }

            self.invalidate();
            if retried {
                tracing::warn!("gateway still unauthorized after re-login; no devices observed");
                return Ok(Vec::new());
            }
            retried = true;
            tracing::info!("gateway session rejected; logging in again");
            if let Err(err) = self.authenticate().await {
                tracing::warn!(error = %err, "gateway re-login failed; no devices observed");
                return Ok(Vec::new());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Transport that replays scripted answers and records the calls it saw.
    #[derive(Default)]
    struct ScriptedTransport {
        logins: Mutex<VecDeque<Result<LoginResponse, GatewayError>>>,
        listings: Mutex<VecDeque<Result<DeviceListResponse, GatewayError>>>,
        login_requests: Mutex<Vec<LoginRequest>>,
        listing_tokens: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn login_ok(self, token: &str) -> Self {
            self.logins.lock().unwrap().push_back(Ok(LoginResponse {
                code: 0,
                token: Some(token.to_string()),
            }));
            self
        }

        fn login_err(self) -> Self {
            self.logins
                .lock()
                .unwrap()
                .push_back(Err(GatewayError::Network("connection refused".to_string())));
            self
        }

        fn listing(self, code: i64, macs: &[&str]) -> Self {
            let list = macs
                .iter()
                .map(|mac| Device {
                    mac: (*mac).to_string(),
                    name: String::new(),
                })
                .collect();
            self.listings
                .lock()
                .unwrap()
                .push_back(Ok(DeviceListResponse { code, list }));
            self
        }

        fn listing_err(self) -> Self {
            self.listings
                .lock()
                .unwrap()
                .push_back(Err(GatewayError::Network("timed out".to_string())));
            self
        }

        fn login_count(&self) -> usize {
            self.login_requests.lock().unwrap().len()
        }

        fn listing_tokens(&self) -> Vec<String> {
            self.listing_tokens.lock().unwrap().clone()
        }
    }

    impl GatewayTransport for ScriptedTransport {
        async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, GatewayError> {
            self.login_requests.lock().unwrap().push(request.clone());
            self.logins
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GatewayError::Network("unscripted login".to_string())))
        }

        async fn device_list(&self, token: &str) -> Result<DeviceListResponse, GatewayError> {
            self.listing_tokens.lock().unwrap().push(token.to_string());
            self.listings
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GatewayError::Network("unscripted listing".to_string())))
        }
    }

    fn client(transport: ScriptedTransport) -> GatewayClient<ScriptedTransport> {
        GatewayClient::with_transport(transport, GatewayConfig::new("secret"))
    }

    fn macs(devices: &[Device]) -> Vec<&str> {
        devices.iter().map(|device| device.mac.as_str()).collect()
    }

    #[tokio::test]
    async fn authenticate_sends_derived_credentials() {
        let mut client = client(ScriptedTransport::default().login_ok("tok-1"));
        let session = client.authenticate().await.unwrap();
        assert_eq!(session.token, "tok-1");

        let request = client.transport.login_requests.lock().unwrap()[0].clone();
        assert_eq!(request.username, "admin");
        assert_eq!(request.logtype, 2);
        assert_eq!(
            request.password,
            encrypt_password("secret", DEFAULT_KEY, &request.nonce)
        );
        assert!(request.nonce.starts_with("0_11:22:33:44:55:66_"));
    }

    #[tokio::test]
    async fn authenticate_without_token_leaves_no_session() {
        let transport = ScriptedTransport::default();
        transport.logins.lock().unwrap().push_back(Ok(LoginResponse {
            code: 401,
            token: None,
        }));
        let mut client = client(transport);
        let err = client.authenticate().await.unwrap_err();
        assert!(matches!(err, GatewayError::Auth(_)));
        assert!(client.session().is_none());
    }

    #[tokio::test]
    async fn authenticate_transport_failure_is_auth_error() {
        let mut client = client(ScriptedTransport::default().login_err());
        let err = client.authenticate().await.unwrap_err();
        assert!(matches!(err, GatewayError::Auth(_)));
        assert!(client.session().is_none());
    }

    #[tokio::test]
    async fn listing_logs_in_once_and_reuses_session() {
        let transport = ScriptedTransport::default()
            .login_ok("tok-1")
            .listing(0, &["AA:BB:CC:DD:EE:01"])
            .listing(0, &["AA:BB:CC:DD:EE:02"]);
        let mut client = client(transport);

        let first = client.list_online_devices().await.unwrap();
        let second = client.list_online_devices().await.unwrap();
        assert_eq!(macs(&first), vec!["AA:BB:CC:DD:EE:01"]);
        assert_eq!(macs(&second), vec!["AA:BB:CC:DD:EE:02"]);
        assert_eq!(client.transport.login_count(), 1);
        assert_eq!(client.transport.listing_tokens(), vec!["tok-1", "tok-1"]);
    }

    #[tokio::test]
    async fn failed_login_yields_no_devices() {
        let mut client = client(ScriptedTransport::default().login_err());
        let devices = client.list_online_devices().await.unwrap();
        assert!(devices.is_empty());
        assert!(client.transport.listing_tokens().is_empty());
    }

    #[tokio::test]
    async fn unauthorized_listing_reauthenticates_once() {
        let transport = ScriptedTransport::default()
            .login_ok("tok-1")
            .listing(UNAUTHORIZED_CODE, &[])
            .login_ok("tok-2")
            .listing(0, &["AA:BB:CC:DD:EE:01"]);
        let mut client = client(transport);

        let devices = client.list_online_devices().await.unwrap();
        assert_eq!(macs(&devices), vec!["AA:BB:CC:DD:EE:01"]);
        assert_eq!(client.transport.login_count(), 2);
        assert_eq!(client.transport.listing_tokens(), vec!["tok-1", "tok-2"]);
        assert_eq!(client.session().unwrap().token, "tok-2");
    }

    #[tokio::test]
    async fn repeated_unauthorized_gives_up_after_one_retry() {
        let transport = ScriptedTransport::default()
            .login_ok("tok-1")
            .listing(UNAUTHORIZED_CODE, &[])
            .login_ok("tok-2")
            .listing(UNAUTHORIZED_CODE, &[])
            .login_ok("tok-3")
            .listing(0, &["AA:BB:CC:DD:EE:01"]);
        let mut client = client(transport);

        let devices = client.list_online_devices().await.unwrap();
        assert!(devices.is_empty());
        assert_eq!(client.transport.login_count(), 2);
        assert_eq!(client.transport.listing_tokens().len(), 2);
        assert!(client.session().is_none());
    }

    #[tokio::test]
    async fn failed_relogin_after_unauthorized_yields_no_devices() {
        let transport = ScriptedTransport::default()
            .login_ok("tok-1")
            .listing(UNAUTHORIZED_CODE, &[])
            .login_err();
        let mut client = client(transport);

        let devices = client.list_online_devices().await.unwrap();
        assert!(devices.is_empty());
        assert_eq!(client.transport.listing_tokens().len(), 1);
        assert!(client.session().is_none());
    }

    #[tokio::test]
    async fn listing_transport_failure_is_network_error() {
        let transport = ScriptedTransport::default().login_ok("tok-1").listing_err();
        let mut client = client(transport);
        let err = client.list_online_devices().await.unwrap_err();
        assert!(matches!(err, GatewayError::Network(_)));
        assert!(client.session().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_session_is_renewed_before_listing() {
        let transport = ScriptedTransport::default()
            .login_ok("tok-1")
            .listing(0, &[])
            .login_ok("tok-2")
            .listing(0, &[]);
        let mut client = client(transport);

        client.list_online_devices().await.unwrap();
        tokio::time::advance(DEFAULT_SESSION_TTL + Duration::from_secs(1)).await;
        client.list_online_devices().await.unwrap();

        assert_eq!(client.transport.login_count(), 2);
        assert_eq!(client.transport.listing_tokens(), vec!["tok-1", "tok-2"]);
    }

    #[test]
    fn config_debug_redacts_password() {
        let debug = format!("{:?}", GatewayConfig::new("hunter2"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }
}
