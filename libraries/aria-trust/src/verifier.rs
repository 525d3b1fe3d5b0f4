//! rustls certificate verifier enforcing stored pins on every handshake.

use crate::pin;
use crate::store::{TrustDecision, TrustStore};
use rustls::client::{ServerCertVerified, ServerCertVerifier, WebPkiVerifier};
use rustls::{Certificate, Error as TlsError, OwnedTrustAnchor, RootCertStore, ServerName};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

/// Server certificate verifier with trust-on-first-use pinning.
///
/// Standard WebPKI chain validation runs first; the pin check is an
/// additional constraint on top of it, never a replacement. A pin
/// mismatch fails the handshake with no bypass path.
pub struct PinningVerifier {
    webpki: WebPkiVerifier,
    trust: Arc<TrustStore>,
}

impl PinningVerifier {
    pub fn new(trust: Arc<TrustStore>) -> Self {
        let mut roots = RootCertStore::empty();
        roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
            OwnedTrustAnchor::from_subject_spki_name_constraints(
                ta.subject,
                ta.spki,
                ta.name_constraints,
            )
        }));

        Self {
            webpki: WebPkiVerifier::new(roots, None),
            trust,
        }
    }

    /// A rustls client config with this verifier installed.
    ///
    /// Feed the result to `reqwest::ClientBuilder::use_preconfigured_tls`
    /// so every connection the client opens goes through the pin check.
    pub fn client_config(trust: Arc<TrustStore>) -> rustls::ClientConfig {
        rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_custom_certificate_verifier(Arc::new(Self::new(trust)))
            .with_no_client_auth()
    }
}

impl ServerCertVerifier for PinningVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        server_name: &ServerName,
        scts: &mut dyn Iterator<Item = &[u8]>,
        ocsp_response: &[u8],
        now: SystemTime,
    ) -> Result<ServerCertVerified, TlsError> {
        self.webpki.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            scts,
            ocsp_response,
            now,
        )?;

        let hostname = match server_name {
            ServerName::DnsName(dns) => dns.as_ref().to_string(),
            ServerName::IpAddress(ip) => ip.to_string(),
            _ => return Err(TlsError::General("unsupported server name type".into())),
        };

        let digest = pin::spki_sha256(&end_entity.0)
            .map_err(|e| TlsError::General(format!("leaf certificate unreadable: {e}")))?;

        match self.trust.evaluate(&hostname, &digest) {
            TrustDecision::PinnedMatch => {
                debug!(hostname = %hostname, "Presented key matches stored pin");
                Ok(ServerCertVerified::assertion())
            }
            TrustDecision::TrustOnFirstUse => Ok(ServerCertVerified::assertion()),
            TrustDecision::Mismatch => Err(TlsError::General(format!(
                "certificate pin mismatch for {hostname}"
            ))),
        }
    }
}
