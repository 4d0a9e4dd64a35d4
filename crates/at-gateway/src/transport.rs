//! Wire layer for the router's LuCI JSON API.

use std::future::Future;
use std::time::Duration;

use at_core::Device;
use serde::{Deserialize, Deserializer};

use crate::GatewayError;

const LOGIN_PATH: &str = "/cgi-bin/luci/api/xqsystem/login";

/// Status code the router reports when the session token is not accepted.
pub const UNAUTHORIZED_CODE: i64 = 401;

/// Query parameters of a login request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub username: String,
    /// Challenge response derived by [`crate::session::encrypt_password`].
    pub password: String,
    pub logtype: u32,
    pub nonce: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceListResponse {
    #[serde(default)]
    pub code: i64,
    /// Entries without a MAC address are dropped.
    #[serde(default, deserialize_with = "usable_devices")]
    pub list: Vec<Device>,
}

/// A device-list entry as the router sends it; any field may be missing.
#[derive(Deserialize)]
struct RawDevice {
    #[serde(default)]
    mac: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

fn usable_devices<'de, D>(deserializer: D) -> Result<Vec<Device>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    let total = entries.len();
    let devices: Vec<Device> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<RawDevice>(entry).ok())
        .filter_map(|raw| {
            let mac = raw.mac.filter(|mac| !mac.trim().is_empty())?;
            Some(Device {
                mac,
                name: raw.name.unwrap_or_default(),
            })
        })
        .collect();
    if devices.len() < total {
        tracing::warn!(
            skipped = total - devices.len(),
            "ignored malformed device-list entries"
        );
    }
    Ok(devices)
}

impl DeviceListResponse {
    pub const fn is_unauthorized(&self) -> bool {
        self.code == UNAUTHORIZED_CODE
    }
}

/// The two gateway calls the client needs.
pub trait GatewayTransport {
    fn login(
        &self,
        request: &LoginRequest,
    ) -> impl Future<Output = Result<LoginResponse, GatewayError>> + Send;

    /// Lists connected devices. An HTTP 401 is reported as a response with
    /// [`UNAUTHORIZED_CODE`], not as an error.
    fn device_list(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<DeviceListResponse, GatewayError>> + Send;
}

/// HTTP transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport for `host`, which may be a bare address such as
    /// `192.168.31.1` or a full `http(s)://` URL.
    pub fn new(host: &str, timeout: Duration) -> Result<Self, GatewayError> {
        // The gateway is on the local network; proxy settings never apply.
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(GatewayError::ClientBuild)?;
        Ok(Self {
            http,
            base_url: base_url(host),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn device_list_url(&self, token: &str) -> String {
        format!(
            "{}/cgi-bin/luci/;stok={token}/api/misystem/devicelist",
            self.base_url
        )
    }
}

impl GatewayTransport for HttpTransport {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, GatewayError> {
        let logtype = request.logtype.to_string();
        let response = self
            .http
            .get(format!("{}{LOGIN_PATH}", self.base_url))
            .query(&[
                ("username", request.username.as_str()),
                ("password", request.password.as_str()),
                ("logtype", logtype.as_str()),
                ("nonce", request.nonce.as_str()),
            ])
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let body = response.text().await.map_err(network_error)?;
        if !status.is_success() {
            return Err(GatewayError::Auth(format!("status {status}: {body}")));
        }
        serde_json::from_str(&body).map_err(|err| GatewayError::InvalidResponse(err.to_string()))
    }

    async fn device_list(&self, token: &str) -> Result<DeviceListResponse, GatewayError> {
        let response = self
            .http
            .get(self.device_list_url(token))
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(DeviceListResponse {
                code: UNAUTHORIZED_CODE,
                list: Vec::new(),
            });
        }
        let body = response.text().await.map_err(network_error)?;
        if !status.is_success() {
            return Err(GatewayError::Network(format!("status {status}: {body}")));
        }
        serde_json::from_str(&body).map_err(|err| GatewayError::InvalidResponse(err.to_string()))
    }
}

fn network_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Network(format!("timed out: {err}"))
    } else {
        GatewayError::Network(err.to_string())
    }
}

fn base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}
