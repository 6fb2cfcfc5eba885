//! Proxy selection from the process environment.

use std::net::IpAddr;

use hyper::Uri;
use hyper_util::client::proxy::matcher::Matcher;

pub use hyper_util::client::proxy::matcher::Intercept;

/// Proxy rules taken from `HTTP_PROXY`, `HTTPS_PROXY` and `NO_PROXY`.
pub struct ProxySettings {
    matcher: Matcher,
}

impl Default for ProxySettings {
    /// Direct connections only.
    fn default() -> Self {
        Self {
            matcher: Matcher::builder().build(),
        }
    }
}

impl ProxySettings {
    /// Read proxy settings from environment variables.
    pub fn from_env() -> Self {
        Self {
            matcher: Matcher::from_env(),
        }
    }

    pub fn new(http: Option<&str>, https: Option<&str>, no_proxy: &str) -> Self {
        Self {
            matcher: Matcher::builder()
                .http(http.unwrap_or_default())
                .https(https.unwrap_or_default())
                .no(no_proxy)
                .build(),
        }
    }

    /// The proxy to use for `uri`, with any credentials from its URL.
    ///
    /// `localhost` and loopback addresses never go through a proxy.
    pub fn proxy_for(&self, uri: &Uri) -> Option<Intercept> {
        let host = uri.host()?.trim_start_matches('[').trim_end_matches(']');
        if host.eq_ignore_ascii_case("localhost") || host.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false) {
            return None;
        }

        self.matcher.intercept(uri)
    }
}
