//! Demo HTTP server
//!
//! Plugs [`FsHandler`] into hyper's HTTP/1 connection handling on a tokio
//! listener. Resolution and body reads block, so each request is answered on
//! the blocking pool.

use std::convert::Infallible;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::fs::PooledReader;
use crate::handler::{FsHandler, RequestContext};

/// Time a client gets to send a complete request head
pub const DEFAULT_HEADER_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Most request headers accepted per request
const MAX_HEADERS: usize = 64;

/// HTTP server that answers every request from an [`FsHandler`]
pub struct HttpServer {
    /// Handler shared by all connections
    handler: Arc<FsHandler>,
    /// Bound listener, set by [`HttpServer::start`]
    listener: Option<TcpListener>,
    /// Connections that do not deliver a request head in time are closed
    header_read_timeout: Duration,
}

impl HttpServer {
    pub fn new(handler: Arc<FsHandler>) -> Self {
        Self {
            handler,
            listener: None,
            header_read_timeout: DEFAULT_HEADER_READ_TIMEOUT,
        }
    }

    pub fn with_header_read_timeout(mut self, timeout: Duration) -> Self {
        self.header_read_timeout = timeout;
        self
    }

    /// Bind the listener and return the bound address
    pub async fn start(&mut self, addr: &str) -> Result<SocketAddr> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        let local = listener.local_addr().context("Failed to read bound address")?;

        info!(addr = %local, "HTTP server started");
        self.listener = Some(listener);
        Ok(local)
    }

    /// Run the accept loop
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("Server not started")?;

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let handler = Arc::clone(&self.handler);
                    let builder = self.connection_builder();

                    tokio::spawn(async move {
                        let service = service_fn(move |req| respond(req, Arc::clone(&handler)));
                        if let Err(e) = builder.serve_connection(TokioIo::new(stream), service).await {
                            debug!(peer = %peer, error = %e, "Connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn connection_builder(&self) -> http1::Builder {
        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(self.header_read_timeout)
            .max_headers(MAX_HEADERS);
        builder
    }
}

/// Answer one request on the blocking pool
async fn respond(
    req: Request<Incoming>,
    handler: Arc<FsHandler>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let target = req.uri().clone();

    let answered = tokio::task::spawn_blocking(move || {
        let head_only = method == Method::HEAD;
        let mut exchange = Exchange::new(&target);
        if method != Method::GET && !head_only {
            exchange.error("Method not allowed", 405);
        } else if !exchange.path.starts_with(b"/") {
            exchange.error("Invalid request target", 400);
        } else {
            handler.handle(&mut exchange);
        }

        debug!(
            method = %method,
            target = %target,
            status = exchange.status,
            "Request served"
        );
        exchange.into_response(head_only)
    })
    .await;

    Ok(answered.unwrap_or_else(|e| {
        error!(error = %e, "Request task failed");
        text_response(500, "Internal server error", false)
    }))
}

/// Request state the handler reads from and writes into
struct Exchange {
    /// Percent-decoded request path
    path: Vec<u8>,
    /// Origin-form request target, used for listing links
    uri: String,
    status: u16,
    content_type: String,
    body: Option<(PooledReader, usize)>,
    message: Option<String>,
}

impl Exchange {
    fn new(target: &Uri) -> Self {
        let uri = target
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| target.path());
        Self {
            path: urlencoding::decode_binary(target.path().as_bytes()).into_owned(),
            uri: uri.to_string(),
            status: 200,
            content_type: String::new(),
            body: None,
            message: None,
        }
    }

    fn into_response(self, head_only: bool) -> Response<Full<Bytes>> {
        let Exchange {
            status,
            content_type,
            body,
            message,
            ..
        } = self;

        let Some((reader, length)) = body else {
            let message = message.unwrap_or_default();
            return text_response(status, &message, head_only);
        };

        let content_type = if content_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            content_type
        };
        if head_only {
            return build_response(status, &content_type, length, Bytes::new());
        }

        match read_body(reader, length) {
            Ok(data) => build_response(status, &content_type, data.len(), data),
            Err(e) => {
                error!(error = %e, "Failed to read response body");
                text_response(500, "Cannot read requested path", false)
            }
        }
    }
}

impl RequestContext for Exchange {
    fn path(&self) -> &[u8] {
        &self.path
    }

    fn request_uri(&self) -> &str {
        &self.uri
    }

    fn set_body_stream(&mut self, body: PooledReader, content_length: usize) {
        self.body = Some((body, content_length));
    }

    fn set_content_type(&mut self, content_type: &str) {
        self.content_type = content_type.to_string();
    }

    fn error(&mut self, message: &str, status: u16) {
        self.status = status;
        self.body = None;
        self.message = Some(message.to_string());
    }
}

fn read_body(mut reader: PooledReader, length: usize) -> io::Result<Bytes> {
    let mut data = Vec::with_capacity(length);
    reader.read_to_end(&mut data)?;
    Ok(Bytes::from(data))
}

fn text_response(status: u16, message: &str, head_only: bool) -> Response<Full<Bytes>> {
    let data = if head_only {
        Bytes::new()
    } else {
        Bytes::copy_from_slice(message.as_bytes())
    };
    build_response(status, "text/plain; charset=utf-8", message.len(), data)
}

fn build_response(
    status: u16,
    content_type: &str,
    length: usize,
    data: Bytes,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(data));
    *response.status_mut() =
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(CONTENT_TYPE, value);
    }
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    response
}
