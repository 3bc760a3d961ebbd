use std::net::Ipv4Addr;

use byteorder::{BigEndian, WriteBytesExt};
use tokio::io::AsyncReadExt;

use crate::validator::netclient::ProxyConnection;

/// SOCKS4 handshake: ask the proxy to open a connection to `target_host:target_port`
/// on our behalf. SOCKS4 only understands IPv4 targets.
#[derive(Debug, Clone)]
pub struct Socks4Negotiator {
    pub name: String,
}

impl Socks4Negotiator {
    pub async fn negotiate(&self, conn: &mut ProxyConnection, target_host: &str, target_port: u16) -> bool {
        let target_ip: Ipv4Addr = match target_host.parse() {
            Ok(ip) => ip,
            Err(_) => {
                conn.log("SOCKS4 requires an IPv4 target", None, Some("unsupported_target".to_string()));
                return false;
            }
        };

        let mut buf = Vec::with_capacity(9);
        let _ = buf.write_u8(4); // SOCKS version
        let _ = buf.write_u8(1); // CONNECT command
        let _ = buf.write_u16::<BigEndian>(target_port);
        buf.extend_from_slice(&target_ip.octets());
        let _ = buf.write_u8(0); // user id terminator (anonymous)

        conn.send(&buf).await;

        if let Some(data) = conn.recv(8).await {
            let mut data = data.as_slice();

            let version = data.read_u8().await;
            if version.is_err() || version.unwrap() != 0 {
                conn.log("Invalid response version", None, Some("invalid_response_version".to_string()));
                return false;
            }

            let resp = data.read_u8().await;
            if resp.is_err() || resp.unwrap() != 90 {
                conn.log("Request rejected or failed", None, Some("request_failed".to_string()));
                return false;
            }

            conn.log("Request is granted", None, None);
            return true;
        }
        false
    }
}

impl Default for Socks4Negotiator {
    fn default() -> Self {
        Self {
            name: "SOCKS4".to_string(),
        }
    }
}
