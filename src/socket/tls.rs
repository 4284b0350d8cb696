use crate::base::neterror::NetError;
use boring::ssl::{SslConnectorBuilder, SslVerifyMode, SslVersion};

/// TLS settings applied to every secure connection.
///
/// Certificate validation and record-layer cryptography are left to
/// BoringSSL; this only selects versions, ciphers and ALPN.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub min_version: Option<SslVersion>,
    pub max_version: Option<SslVersion>,
    pub cipher_list: Option<String>,
    pub alpn_protos: Vec<String>,
    /// Verify the server certificate chain and host name.
    pub verify_peer: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            min_version: Some(SslVersion::TLS1_2),
            max_version: Some(SslVersion::TLS1_3),
            cipher_list: None,
            alpn_protos: vec!["h2".to_string(), "http/1.1".to_string()],
            verify_peer: true,
        }
    }
}

impl TlsConfig {
    /// Offer only HTTP/1.1 during ALPN.
    pub fn http1_only() -> Self {
        Self { alpn_protos: vec!["http/1.1".to_string()], ..Self::default() }
    }

    /// ALPN protocol list in wire format (length-prefixed ids).
    pub fn alpn_wire(&self) -> Result<Vec<u8>, NetError> {
        let mut wire = Vec::new();
        for proto in &self.alpn_protos {
            if proto.is_empty() || proto.len() > 255 {
                return Err(NetError::InvalidArgument);
            }
            wire.push(proto.len() as u8);
            wire.extend_from_slice(proto.as_bytes());
        }
        Ok(wire)
    }

    /// Apply this configuration to an SSL connector builder.
    pub fn apply_to_builder(&self, builder: &mut SslConnectorBuilder) -> Result<(), NetError> {
        builder
            .set_min_proto_version(self.min_version)
            .map_err(|_| NetError::SslProtocolError)?;
        builder
            .set_max_proto_version(self.max_version)
            .map_err(|_| NetError::SslProtocolError)?;

        if let Some(ciphers) = &self.cipher_list {
            builder
                .set_cipher_list(ciphers)
                .map_err(|_| NetError::SslProtocolError)?;
        }

        if !self.alpn_protos.is_empty() {
            builder
                .set_alpn_protos(&self.alpn_wire()?)
                .map_err(|_| NetError::SslProtocolError)?;
        }

        builder.set_verify(if self.verify_peer { SslVerifyMode::PEER } else { SslVerifyMode::NONE });

        Ok(())
    }

    /// Check if SNI should be set for this host.
    /// Per RFC 6066, SNI MUST NOT be set for raw IP addresses.
    pub fn should_set_sni(host: &str) -> bool {
        host.trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<std::net::IpAddr>()
            .is_err()
    }
}
