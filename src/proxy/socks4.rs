//! SOCKS4 CONNECT client
//!
//! SOCKS4 carries the destination as a raw IPv4 address, so the target host is
//! resolved locally before the request is sent.

use crate::proxy::error::ProbeError;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use url::{Host, Url};

pub const VERSION: u8 = 4;
pub const CMD_CONNECT: u8 = 1;
pub const REPLY_GRANTED: u8 = 0x5A;

pub const REQUEST_LEN: usize = 9;
pub const REPLY_LEN: usize = 8;

/// VN, CD, DSTPORT (big endian), DSTIP, empty USERID terminator
pub fn encode_request(ip: Ipv4Addr, port: u16) -> [u8; REQUEST_LEN] {
    let mut request = [0u8; REQUEST_LEN];
    request[0] = VERSION;
    request[1] = CMD_CONNECT;
    request[2..4].copy_from_slice(&port.to_be_bytes());
    request[4..8].copy_from_slice(&ip.octets());
    request[8] = 0x00;
    request
}

/// Checks the CD byte of an 8-byte reply
pub fn check_reply(reply: &[u8; REPLY_LEN]) -> Result<(), ProbeError> {
    match reply[1] {
        REPLY_GRANTED => Ok(()),
        code => Err(ProbeError::Handshake(code)),
    }
}

/// Sends the CONNECT request over an already open stream and waits for the
/// grant. A truncated reply or reset is a dial-level failure.
pub async fn handshake<S>(stream: &mut S, ip: Ipv4Addr, port: u16) -> Result<(), ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&encode_request(ip, port))
        .await
        .map_err(|e| ProbeError::Dial(e.to_string()))?;

    let mut reply = [0u8; REPLY_LEN];
    stream.read_exact(&mut reply).await.map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => ProbeError::Dial("short SOCKS4 reply".to_string()),
        _ => ProbeError::Dial(e.to_string()),
    })?;

    check_reply(&reply)
}

/// Resolve the destination of `target` to the IPv4 address and port SOCKS4
/// needs, giving the lookup at most `timeout`. IPv6-only destinations cannot
/// be expressed and fail the probe.
pub async fn resolve_destination(
    target: &Url,
    timeout: Duration,
) -> Result<(Ipv4Addr, u16), ProbeError> {
    let port = target
        .port_or_known_default()
        .ok_or_else(|| ProbeError::Request(format!("no port for target {target}")))?;

    match target.host() {
        Some(Host::Ipv4(ip)) => Ok((ip, port)),
        Some(Host::Ipv6(ip)) => Err(ProbeError::Ipv4Unsupported(ip.to_string())),
        Some(Host::Domain(domain)) => {
            let addrs = tokio::time::timeout(timeout, lookup_host((domain, port)))
                .await
                .map_err(|_| ProbeError::Dial(format!("resolving {domain} timed out")))?
                .map_err(|e| ProbeError::Dial(format!("failed to resolve IP for {domain}: {e}")))?;

            addrs
                .filter_map(|addr| match addr.ip() {
                    IpAddr::V4(ip) => Some(ip),
                    IpAddr::V6(_) => None,
                })
                .next()
                .map(|ip| (ip, port))
                .ok_or_else(|| ProbeError::Ipv4Unsupported(domain.to_string()))
        }
        None => Err(ProbeError::Request(format!("target {target} has no host"))),
    }
}

/// Open a tunnel to `target` through the SOCKS4 proxy at `proxy_addr`.
///
/// `timeout` bounds the TCP connect, the destination lookup and the
/// handshake, each on its own. The returned stream carries no deadline.
pub async fn connect(
    proxy_addr: &str,
    target: &Url,
    timeout: Duration,
) -> Result<TcpStream, ProbeError> {
    let mut stream = tokio::time::timeout(timeout, TcpStream::connect(proxy_addr))
        .await
        .map_err(|_| ProbeError::Dial(format!("connect to {proxy_addr} timed out")))?
        .map_err(|e| ProbeError::Dial(e.to_string()))?;

    let (ip, port) = resolve_destination(target, timeout).await?;

    tokio::time::timeout(timeout, handshake(&mut stream, ip, port))
        .await
        .map_err(|_| ProbeError::Dial("SOCKS4 handshake timed out".to_string()))??;

    Ok(stream)
}
