use std::net::Ipv4Addr;

use byteorder::{BigEndian, WriteBytesExt};

use crate::validator::netclient::ProxyConnection;

/// SOCKS5 handshake: greet, pick no-auth, then CONNECT to
/// `target_host:target_port`. IPv4 targets only, the only address type the
/// validator's echo targets need.
#[derive(Debug, Clone)]
pub struct Socks5Negotiator {
    pub name: String,
}

impl Socks5Negotiator {
    pub async fn negotiate(&self, conn: &mut ProxyConnection, target_host: &str, target_port: u16) -> bool {
        let greeting = [5, 1, 0];
        conn.send(&greeting).await;
        let Some(data) = conn.recv(2).await else {
            return false;
        };
        if data[0] != 0x05 {
            conn.log("Invalid version", None, Some("invalid_version".to_string()));
            return false;
        }
        if data[1] == 0xff {
            conn.log("Failed (auth is required)", None, Some("auth_is_required".to_string()));
            return false;
        }
        if data[1] != 0x00 {
            conn.log("Failed (invalid data)", None, Some("invalid_data".to_string()));
            return false;
        }

        let target_ip: Ipv4Addr = match target_host.parse() {
            Ok(ip) => ip,
            Err(_) => {
                conn.log("SOCKS5 target resolution to IPv4 failed", None, Some("unsupported_target".to_string()));
                return false;
            }
        };

        let mut buf = Vec::with_capacity(10);
        let _ = buf.write_u8(5); // SOCKS version
        let _ = buf.write_u8(1); // CONNECT command
        let _ = buf.write_u8(0); // reserved
        let _ = buf.write_u8(1); // address type: IPv4
        buf.extend_from_slice(&target_ip.octets());
        let _ = buf.write_u16::<BigEndian>(target_port);

        conn.send(&buf).await;
        if let Some(data) = conn.recv(10).await {
            if data[0] != 0x05 || data[1] != 0x00 {
                conn.log("Failed (invalid data)", None, Some("invalid_data".to_string()));
                return false;
            }
            conn.log("Request is granted", None, None);
            return true;
        }
        false
    }
}

impl Default for Socks5Negotiator {
    fn default() -> Self {
        Self {
            name: "SOCKS5".to_string(),
        }
    }
}
