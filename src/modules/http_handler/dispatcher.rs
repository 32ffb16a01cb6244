//! Responses for granted entries.
//!
//! A file entry streams the uploaded file, a redirect entry answers with a
//! 307, and a proxy entry forwards the caller's request to the target URL.
//! Every response carries a no-cache `Cache-Control` so a later denial is
//! never bypassed by a cache.

use super::ResponseBody;
use crate::modules::entry_store::{Entry, EntryTarget};
use bytes::Bytes;
use futures_util::TryStreamExt;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Body, Frame};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// `Cache-Control` value on every dispatched response.
pub const CACHE_CONTROL: &str = "no-cache, no-store, must-revalidate";

/// Headers that only apply to a single connection.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

type ProxyClient = Client<HttpsConnector<HttpConnector>, ResponseBody>;

/// Builds the response for a granted entry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    upload_dir: PathBuf,
    client: ProxyClient,
}

/// A plain-text response.
pub fn text_response(status: StatusCode, text: impl Into<Bytes>) -> Response<ResponseBody> {
    let mut response = Response::new(
        Full::new(text.into())
            .map_err(|never| match never {})
            .boxed_unsync(),
    );
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn no_cache(headers: &mut HeaderMap) {
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

impl Dispatcher {
    /// Create a dispatcher serving files from `upload_dir`.
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        let root_store =
            rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .build();

        Self {
            upload_dir: upload_dir.into(),
            client: Client::builder(TokioExecutor::new()).build(https),
        }
    }

    /// Upload directory.
    #[must_use]
    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Respond to `req` with the content of `entry`.
    pub async fn dispatch<B>(
        &self,
        entry: &Entry,
        req: Request<B>,
        client_ip: IpAddr,
    ) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let mut response = match &entry.target {
            EntryTarget::File { filename, .. } => {
                self.serve_file(filename, entry.target.content_type()).await
            },
            EntryTarget::Redirect { url } => redirect(url),
            EntryTarget::Proxy { url } => self.proxy(url, req, client_ip).await,
        };

        no_cache(response.headers_mut());
        response
    }

    async fn serve_file(&self, filename: &str, content_type: &str) -> Response<ResponseBody> {
        let path = self.upload_dir.join(filename);
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), "Failed to open upload: {e}");
                return text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            },
        };

        let content_type = HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("text/plain"));
        let body = StreamBody::new(ReaderStream::new(file).map_ok(Frame::data));

        let mut response = Response::new(body.boxed_unsync());
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
        response
    }

    async fn proxy<B>(&self, url: &str, req: Request<B>, client_ip: IpAddr) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let Some((target, host)) = parse_target(url) else {
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Could not parse URL");
        };

        let (mut parts, body) = req.into_parts();
        parts.uri = target;
        strip_hop_by_hop(&mut parts.headers);
        parts.headers.insert(header::HOST, host);
        // Never leak a client library default upstream.
        parts
            .headers
            .insert(header::USER_AGENT, HeaderValue::from_static(""));
        append_forwarded_for(&mut parts.headers, client_ip);

        let body = body
            .map_err(|e| io::Error::other(e.into()))
            .boxed_unsync();
        let upstream = Request::from_parts(parts, body);

        debug!(uri = %upstream.uri(), "Proxying request");
        match self.client.request(upstream).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, body.map_err(io::Error::other).boxed_unsync())
            },
            Err(e) => {
                warn!(url, "Upstream request failed: {e}");
                text_response(StatusCode::BAD_GATEWAY, "Bad Gateway")
            },
        }
    }
}

fn redirect(url: &str) -> Response<ResponseBody> {
    let Ok(location) = HeaderValue::from_str(url) else {
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Could not parse URL");
    };

    let mut response = text_response(StatusCode::TEMPORARY_REDIRECT, Bytes::new());
    response.headers_mut().insert(header::LOCATION, location);
    response
}

/// Absolute target URI and its `Host` header.
fn parse_target(url: &str) -> Option<(Uri, HeaderValue)> {
    let uri: Uri = url.parse().ok()?;
    uri.scheme()?;
    let host = HeaderValue::from_str(uri.authority()?.as_str()).ok()?;
    Some((uri, host))
}

fn append_forwarded_for(headers: &mut HeaderMap, client_ip: IpAddr) {
    let name = HeaderName::from_static("x-forwarded-for");
    let value = match headers.get(&name).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{prior}, {client_ip}"),
        None => client_ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(name, value);
    }
}
