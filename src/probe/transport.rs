//! Authenticating transport.
//!
//! A [`Transport`] is the base connection setup (TLS trust store, ambient
//! proxy) plus an ordered list of [`AuthLayer`] decorators. Layers are stored
//! innermost first and applied outermost first: with both credentials
//! configured the bearer layer wraps the basic layer, so a request carries
//! `Authorization: Bearer ..` followed by `Authorization: Basic ..`.

use std::sync::{Arc, OnceLock};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hyper::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use hyper::Uri;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use super::{Intercept, ProbeError, ProxySettings};
use crate::config::TargetConfig;

static TLS_CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();

/// One request decorator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthLayer {
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl AuthLayer {
    fn header_value(&self) -> Result<HeaderValue, ProbeError> {
        let value = match self {
            AuthLayer::Basic { username, password } => {
                format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
            }
            AuthLayer::Bearer { token } => format!("Bearer {}", token),
        };

        HeaderValue::try_from(value)
            .map_err(|e| ProbeError::InvalidRequest(format!("invalid credentials: {}", e)))
    }
}

/// Connection setup and request decoration for one target.
pub struct Transport {
    tls: TlsConnector,
    proxy: ProxySettings,
    layers: Vec<AuthLayer>,
    headers: Vec<HeaderValue>,
}

impl Transport {
    /// Build the transport for a target, honouring proxy environment variables.
    pub fn new(config: &TargetConfig) -> Result<Self, ProbeError> {
        Self::with_proxy(config, ProxySettings::from_env())
    }

    pub fn with_proxy(config: &TargetConfig, proxy: ProxySettings) -> Result<Self, ProbeError> {
        Self::with_tls(config, proxy, tls_config()?)
    }

    /// Build the transport with an explicit TLS client configuration.
    pub fn with_tls(
        config: &TargetConfig,
        proxy: ProxySettings,
        tls: Arc<ClientConfig>,
    ) -> Result<Self, ProbeError> {
        let layers = auth_layers(config);
        let headers = layers
            .iter()
            .map(AuthLayer::header_value)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            tls: TlsConnector::from(tls),
            proxy,
            layers,
            headers,
        })
    }

    /// Authentication layers, innermost first.
    pub fn layers(&self) -> &[AuthLayer] {
        &self.layers
    }

    pub fn tls(&self) -> &TlsConnector {
        &self.tls
    }

    pub fn proxy_for(&self, uri: &Uri) -> Option<Intercept> {
        self.proxy.proxy_for(uri)
    }

    /// Apply every layer to an outgoing request's headers, outermost first.
    pub fn decorate(&self, headers: &mut HeaderMap) {
        for value in self.headers.iter().rev() {
            headers.append(AUTHORIZATION, value.clone());
        }
    }
}

/// Basic auth needs both halves of the credential pair; the bearer layer
/// always goes outside it.
fn auth_layers(config: &TargetConfig) -> Vec<AuthLayer> {
    let mut layers = Vec::new();

    if let (Some(username), Some(password)) = (non_empty(&config.username), non_empty(&config.password)) {
        layers.push(AuthLayer::Basic {
            username: username.to_string(),
            password: password.to_string(),
        });
    }

    if let Some(token) = non_empty(&config.token) {
        layers.push(AuthLayer::Bearer {
            token: token.to_string(),
        });
    }

    layers
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Shared rustls client configuration with the bundled web PKI roots.
fn tls_config() -> Result<Arc<ClientConfig>, ProbeError> {
    if let Some(config) = TLS_CONFIG.get() {
        return Ok(config.clone());
    }

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = client_tls_config(roots)?;
    let _ = TLS_CONFIG.set(config.clone());
    Ok(config)
}

/// rustls client configuration trusting `roots`, speaking HTTP/1.1.
pub fn client_tls_config(roots: RootCertStore) -> Result<Arc<ClientConfig>, ProbeError> {
    let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}
