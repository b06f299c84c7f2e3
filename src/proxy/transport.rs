//! Single HTTP/1.1 GET over an already tunnelled stream

use crate::proxy::error::ProbeError;
use bytes::Bytes;
use http_body_util::Empty;
use hyper::client::conn::http1;
use hyper::header::{CONNECTION, HOST, USER_AGENT};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;
use url::Url;

const PROBE_USER_AGENT: &str = concat!("proxy-harvest/", env!("CARGO_PKG_VERSION"));

/// Issue `GET target` over `stream`, wrapping it in TLS for `https` targets,
/// and return the response status. The body is never read.
pub async fn get_status<S>(stream: S, target: &Url) -> Result<StatusCode, ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    match target.scheme() {
        "http" => send_get(stream, target).await,
        "https" => {
            let domain = target
                .host_str()
                .ok_or_else(|| ProbeError::Request(format!("target {target} has no host")))?;
            let connector = native_tls::TlsConnector::new()
                .map_err(|e| ProbeError::Request(format!("tls setup: {e}")))?;
            let tls = tokio_native_tls::TlsConnector::from(connector)
                .connect(domain, stream)
                .await
                .map_err(|e| ProbeError::Request(format!("tls: {e}")))?;
            send_get(tls, target).await
        }
        other => Err(ProbeError::Request(format!(
            "unsupported target scheme: {other}"
        ))),
    }
}

async fn send_get<S>(stream: S, target: &Url) -> Result<StatusCode, ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let request = build_request(target)?;

    let (mut sender, conn) = http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| ProbeError::Request(e.to_string()))?;

    // driven in place: dropping this future tears the connection down
    let pending = sender.send_request(request);
    tokio::pin!(conn);
    tokio::pin!(pending);
    let response = tokio::select! {
        biased;
        response = &mut pending => response,
        closed = &mut conn => match closed {
            // a `Connection: close` exchange may finish the connection in the
            // same poll that hands over the response
            Ok(()) => pending.await,
            Err(e) => return Err(ProbeError::Request(e.to_string())),
        },
    };
    let response = response.map_err(|e| ProbeError::Request(e.to_string()))?;

    trace!(status = %response.status(), %target, "tunnelled response");
    Ok(response.status())
}

fn build_request(target: &Url) -> Result<Request<Empty<Bytes>>, ProbeError> {
    let host = target
        .host_str()
        .ok_or_else(|| ProbeError::Request(format!("target {target} has no host")))?;
    let authority = match target.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let path = match target.query() {
        Some(query) => format!("{}?{}", target.path(), query),
        None => target.path().to_string(),
    };

    Request::builder()
        .method(Method::GET)
        .uri(path)
        .header(HOST, authority)
        .header(USER_AGENT, PROBE_USER_AGENT)
        .header(CONNECTION, "close")
        .body(Empty::<Bytes>::new())
        .map_err(|e| ProbeError::Request(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    async fn read_head<S: AsyncRead + Unpin>(stream: &mut S) -> String {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            if stream.read(&mut byte).await.unwrap() == 0 {
                break;
            }
            head.push(byte[0]);
        }
        String::from_utf8(head).unwrap()
    }

    #[test]
    fn test_build_request_origin_form() {
        let url = Url::parse("http://example.com:8080/ip?format=json").unwrap();
        let request = build_request(&url).unwrap();
        assert_eq!(request.uri(), "/ip?format=json");
        assert_eq!(request.headers()[HOST], "example.com:8080");
        assert_eq!(request.headers()[CONNECTION], "close");
    }

    #[tokio::test]
    async fn test_get_status_over_plain_stream() {
        let (client, mut server) = duplex(4096);

        let server = tokio::spawn(async move {
            let head = read_head(&mut server).await;
            server
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
                .await
                .unwrap();
            head
        });

        let url = Url::parse("http://127.0.0.1/generate_204").unwrap();
        let status = get_status(client, &url).await.unwrap();
        assert_eq!(status, StatusCode::OK);

        let head = server.await.unwrap();
        assert!(head.starts_with("GET /generate_204 HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn test_get_status_reports_non_200() {
        let (client, mut server) = duplex(4096);

        tokio::spawn(async move {
            read_head(&mut server).await;
            server
                .write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\nContent-Length: 0\r\n\r\n")
                .await
                .unwrap();
        });

        let url = Url::parse("http://127.0.0.1/").unwrap();
        let status = get_status(client, &url).await.unwrap();
        assert_eq!(status, StatusCode::PROXY_AUTHENTICATION_REQUIRED);
    }

    #[tokio::test]
    async fn test_closed_stream_is_request_error() {
        let (client, server) = duplex(64);
        drop(server);

        let url = Url::parse("http://127.0.0.1/").unwrap();
        let err = get_status(client, &url).await.unwrap_err();
        assert!(matches!(err, ProbeError::Request(_)));
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let (client, _server) = duplex(64);
        let url = Url::parse("ftp://127.0.0.1/").unwrap();
        let err = get_status(client, &url).await.unwrap_err();
        assert!(matches!(err, ProbeError::Request(_)));
    }
}
