//! Instrumented HTTP probe.
//!
//! Each check opens its own connection: DNS, TCP and TLS are performed here
//! rather than inside a pooled client so that every phase can be timed.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Bytes;
use hyper::client::conn::http1;
use hyper::header::{HeaderValue, CONNECTION, HOST, LOCATION, PROXY_AUTHORIZATION, USER_AGENT};
use hyper::upgrade::Upgraded;
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;

use super::{CheckResult, PhaseRecorder, ProbeError, Transport};
use crate::config::TargetConfig;

/// Redirect hops followed before a check is declared failed.
pub const MAX_REDIRECTS: usize = 10;

const USER_AGENT_VALUE: &str = concat!("httpmonitor/", env!("CARGO_PKG_VERSION"));

/// Request parameters for a target, parsed once at client construction.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub uri: Uri,
    pub method: Method,
    pub body: Bytes,
    pub timeout: Duration,
}

impl ProbeRequest {
    pub fn from_config(config: &TargetConfig) -> Result<Self, ProbeError> {
        let uri: Uri = config
            .url
            .parse()
            .map_err(|e| ProbeError::InvalidRequest(format!("invalid url {}: {}", config.url, e)))?;
        Endpoint::from_uri(&uri)?;

        let method = Method::from_bytes(config.method.as_bytes())
            .map_err(|_| ProbeError::InvalidRequest(format!("invalid method {}", config.method)))?;

        Ok(Self {
            uri,
            method,
            body: Bytes::from(config.body.clone().unwrap_or_default()),
            timeout: config.timeout,
        })
    }
}

/// Run one traced request, writing phase durations into `result`.
///
/// Returns the final status code, or 0 when no complete response was
/// received before the deadline. Errors never escape: they are logged and
/// reported as status 0.
pub async fn run_traced_request(
    transport: &Transport,
    request: &ProbeRequest,
    result: &mut CheckResult,
) -> u16 {
    let mut recorder = PhaseRecorder::new();

    let outcome =
        tokio::time::timeout(request.timeout, follow_redirects(transport, request, &mut recorder)).await;
    recorder.apply(result);

    match outcome {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            tracing::debug!("Request to {} failed: {}", request.uri, e);
            0
        }
        Err(_) => {
            tracing::debug!("Request to {} failed: {}", request.uri, ProbeError::Timeout(request.timeout));
            0
        }
    }
}

async fn follow_redirects(
    transport: &Transport,
    request: &ProbeRequest,
    recorder: &mut PhaseRecorder,
) -> Result<u16, ProbeError> {
    let mut uri = request.uri.clone();
    let mut method = request.method.clone();
    let mut body = request.body.clone();

    for hop in 0..=MAX_REDIRECTS {
        if hop > 0 {
            recorder.reset();
        }

        let response = exchange(transport, &uri, &method, body.clone(), recorder).await?;

        let location = match response.location {
            Some(location) if is_redirect(response.status) => location,
            _ => return Ok(response.status.as_u16()),
        };

        uri = resolve_location(&uri, &location)?;

        // 301, 302 and 303 re-send anything but GET/HEAD as a bodyless GET;
        // 307 and 308 keep both.
        if matches!(response.status.as_u16(), 301 | 302 | 303) {
            if method != Method::GET && method != Method::HEAD {
                method = Method::GET;
            }
            body = Bytes::new();
        }

        tracing::debug!("Following redirect ({}) to {}", response.status, uri);
    }

    Err(ProbeError::TooManyRedirects(MAX_REDIRECTS))
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Resolve a `Location` header against the URL that returned it.
pub(crate) fn resolve_location(base: &Uri, location: &str) -> Result<Uri, ProbeError> {
    let invalid = || ProbeError::InvalidRequest(format!("invalid redirect location {:?}", location));

    let scheme = base.scheme_str().unwrap_or("http");
    let authority = base.authority().map(|a| a.as_str()).ok_or_else(invalid)?;

    let resolved = if location.starts_with("//") {
        format!("{}:{}", scheme, location)
    } else if location.starts_with('/') {
        format!("{}://{}{}", scheme, authority, location)
    } else if location.contains("://") {
        location.to_string()
    } else {
        let path = base.path();
        let dir = match path.rfind('/') {
            Some(i) => &path[..=i],
            None => "/",
        };
        format!("{}://{}{}{}", scheme, authority, dir, location)
    };

    resolved.parse().map_err(|_| invalid())
}

/// Where a URI points, split into what connection setup needs.
struct Endpoint {
    /// Host for DNS / TLS server name (IPv6 without brackets).
    host: String,
    port: u16,
    tls: bool,
    /// Value for the `Host` header.
    host_header: String,
    /// `host:port` for a CONNECT tunnel.
    authority: String,
}

impl Endpoint {
    fn from_uri(uri: &Uri) -> Result<Self, ProbeError> {
        let tls = match uri.scheme_str() {
            Some("https") => true,
            Some("http") => false,
            other => {
                return Err(ProbeError::InvalidRequest(format!(
                    "unsupported scheme {:?} in {}",
                    other, uri
                )))
            }
        };

        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ProbeError::InvalidRequest(format!("missing host in {}", uri)))?;
        let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });

        Ok(Self {
            host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port,
            tls,
            host_header: match uri.port() {
                Some(p) => format!("{}:{}", host, p),
                None => host.to_string(),
            },
            authority: format!("{}:{}", host, port),
        })
    }
}

/// Byte stream the HTTP codec runs over, whatever setup produced it.
trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// Aborts the connection driver when the exchange ends or is cancelled.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct Exchanged {
    status: StatusCode,
    location: Option<String>,
}

/// One request/response over a fresh connection, body drained.
async fn exchange(
    transport: &Transport,
    uri: &Uri,
    method: &Method,
    body: Bytes,
    recorder: &mut PhaseRecorder,
) -> Result<Exchanged, ProbeError> {
    let target = Endpoint::from_uri(uri)?;
    let proxy = transport.proxy_for(uri);

    let stream: Box<dyn Io> = match &proxy {
        None => {
            let tcp = connect(&target.host, target.port, recorder).await?;
            if target.tls {
                Box::new(handshake_tls(transport, &target.host, tcp, recorder).await?)
            } else {
                Box::new(tcp)
            }
        }
        Some(intercept) => {
            let endpoint = Endpoint::from_uri(intercept.uri())?;
            if endpoint.tls {
                return Err(ProbeError::Proxy("https proxies are not supported".to_string()));
            }

            let tcp = connect(&endpoint.host, endpoint.port, recorder).await?;
            if target.tls {
                let tunnel = open_tunnel(tcp, &target.authority, intercept.basic_auth()).await?;
                Box::new(handshake_tls(transport, &target.host, TokioIo::new(tunnel), recorder).await?)
            } else {
                Box::new(tcp)
            }
        }
    };

    // Plain http through a proxy uses the absolute-form request target.
    let request_target = if proxy.is_some() && !target.tls {
        uri.to_string()
    } else {
        uri.path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string())
    };

    let mut request = Request::builder()
        .method(method.clone())
        .uri(request_target)
        .header(HOST, target.host_header.as_str())
        .header(USER_AGENT, USER_AGENT_VALUE)
        .header(CONNECTION, "close")
        .body(Full::new(body))
        .map_err(|e| ProbeError::InvalidRequest(e.to_string()))?;
    transport.decorate(request.headers_mut());
    if !target.tls {
        if let Some(auth) = proxy.as_ref().and_then(|p| p.basic_auth()) {
            request.headers_mut().insert(PROXY_AUTHORIZATION, auth.clone());
        }
    }

    let (mut sender, conn) = http1::handshake(TokioIo::new(recorder.wrap(stream)))
        .await
        .map_err(|e| ProbeError::Http(e.to_string()))?;
    let _driver = AbortOnDrop(tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("Probe connection closed with error: {}", e);
        }
    }));

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| ProbeError::Http(e.to_string()))?;

    let status = response.status();
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    // Drain the body so content transfer covers the whole payload.
    let mut body = response.into_body();
    while let Some(frame) = body.frame().await {
        frame.map_err(|e| ProbeError::Http(e.to_string()))?;
    }
    recorder.body_done();

    Ok(Exchanged { status, location })
}

/// Resolve `host` (unless it is an IP literal) and connect to the first
/// address that accepts.
async fn connect(host: &str, port: u16, recorder: &mut PhaseRecorder) -> Result<TcpStream, ProbeError> {
    let addrs: Vec<SocketAddr> = match host.parse::<IpAddr>() {
        Ok(ip) => vec![SocketAddr::new(ip, port)],
        Err(_) => {
            recorder.dns_start();
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
                .await
                .map_err(|e| ProbeError::Dns(format!("{}: {}", host, e)))?
                .collect();
            recorder.dns_done();
            addrs
        }
    };

    if addrs.is_empty() {
        return Err(ProbeError::Dns(format!("no addresses found for {}", host)));
    }

    recorder.connect_start();
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                recorder.connect_done();
                let _ = stream.set_nodelay(true);
                return Ok(stream);
            }
            Err(e) => last_error = Some(format!("{}: {}", addr, e)),
        }
    }

    Err(ProbeError::Connect(last_error.unwrap_or_else(|| host.to_string())))
}

async fn handshake_tls<S>(
    transport: &Transport,
    host: &str,
    io: S,
    recorder: &mut PhaseRecorder,
) -> Result<TlsStream<S>, ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| ProbeError::Tls(format!("invalid server name {}: {}", host, e)))?;

    recorder.tls_start();
    let stream = transport
        .tls()
        .connect(server_name, io)
        .await
        .map_err(|e| ProbeError::Tls(e.to_string()))?;
    recorder.tls_done();

    Ok(stream)
}

/// Ask an http proxy for a tunnel to `authority`.
async fn open_tunnel(
    proxy: TcpStream,
    authority: &str,
    auth: Option<&HeaderValue>,
) -> Result<Upgraded, ProbeError> {
    let (mut sender, conn) = http1::handshake::<_, Empty<Bytes>>(TokioIo::new(proxy))
        .await
        .map_err(|e| ProbeError::Proxy(e.to_string()))?;
    let _driver = AbortOnDrop(tokio::spawn(async move {
        if let Err(e) = conn.with_upgrades().await {
            tracing::debug!("Proxy connection closed with error: {}", e);
        }
    }));

    let mut request = Request::builder()
        .method(Method::CONNECT)
        .uri(authority)
        .header(HOST, authority)
        .header(USER_AGENT, USER_AGENT_VALUE)
        .body(Empty::<Bytes>::new())
        .map_err(|e| ProbeError::Proxy(e.to_string()))?;
    if let Some(auth) = auth {
        request.headers_mut().insert(PROXY_AUTHORIZATION, auth.clone());
    }

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| ProbeError::Proxy(e.to_string()))?;
    if response.status() != StatusCode::OK {
        return Err(ProbeError::Proxy(format!(
            "CONNECT {} returned {}",
            authority,
            response.status()
        )));
    }

    hyper::upgrade::on(response)
        .await
        .map_err(|e| ProbeError::Proxy(e.to_string()))
}
