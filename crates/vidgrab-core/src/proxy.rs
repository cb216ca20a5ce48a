//! Proxy URL construction.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Proxy connection parameters as entered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Optional user name.
    pub user: Option<String>,
    /// Optional password, only used together with a user.
    pub password: Option<String>,
}

impl ProxySettings {
    /// Serialize these settings into a proxy URL.
    pub fn to_url(&self) -> Result<String> {
        build_proxy_url(
            &self.host,
            self.port,
            self.user.as_deref(),
            self.password.as_deref(),
        )
    }
}

/// Build an HTTP proxy URL, embedding percent-encoded credentials when a user
/// is given.
///
/// ```rust
/// use vidgrab_core::proxy::build_proxy_url;
///
/// let url = build_proxy_url("proxy.local", 8080, Some("bob"), Some("pw")).unwrap();
/// assert_eq!(url, "http://bob:pw@proxy.local:8080");
/// ```
pub fn build_proxy_url(
    host: &str,
    port: u16,
    user: Option<&str>,
    password: Option<&str>,
) -> Result<String> {
    let host = host.trim();
    if host.is_empty() || port == 0 {
        return Err(Error::Config(
            "Proxy host and port are required".to_string(),
        ));
    }

    let user = user.filter(|u| !u.is_empty());
    let Some(user) = user else {
        return Ok(format!("http://{host}:{port}"));
    };

    let credentials = match password.filter(|p| !p.is_empty()) {
        Some(password) => format!(
            "{}:{}",
            urlencoding::encode(user),
            urlencoding::encode(password)
        ),
        None => urlencoding::encode(user).into_owned(),
    };

    Ok(format!("http://{credentials}@{host}:{port}"))
}
