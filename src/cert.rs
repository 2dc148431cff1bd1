// X509 certificate management and TLS setup
// (c) 2024 Ross Younger

use std::{path::Path, sync::Arc};

use anyhow::{Context as _, Result};
use quinn::rustls::{
    self,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider},
    DigitallySignedStruct, KeyLog, SignatureScheme,
};
use rustls_pki_types::{pem::PemObject as _, CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tracing::{info, trace};

use crate::protocol::ALPN;

/// In-memory representation of X509 credentials (for TLS)
#[derive(Debug)]
pub struct Credentials {
    /// X509 certificate chain, leaf first
    pub certificates: Vec<CertificateDer<'static>>,
    /// Keypair the certificate relates to
    pub keypair: PrivateKeyDer<'static>,
    /// Hostname the certificate relates to (convenience member; empty when loaded from file)
    pub hostname: String,
}

impl Credentials {
    /// Creates a self-signed certificate for this host
    pub fn generate() -> Result<Self> {
        let hostname = gethostname::gethostname()
            .into_string()
            .unwrap_or("unknown.host.invalid".to_string());
        trace!("Creating certificate with hostname {hostname}");
        let raw = rcgen::generate_simple_self_signed([hostname.clone()])?;
        Ok(Credentials {
            certificates: vec![raw.cert.der().clone()],
            keypair: PrivateKeyDer::Pkcs8(raw.key_pair.serialize_der().into()),
            hostname,
        })
    }

    /// Reads a PEM certificate chain and private key
    pub fn load(cert: &Path, key: &Path) -> Result<Self> {
        let certificates = CertificateDer::pem_file_iter(cert)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(|e| anyhow::anyhow!("{e:?}"))
            .with_context(|| format!("failed to read certificate {}", cert.display()))?;
        anyhow::ensure!(
            !certificates.is_empty(),
            "no certificates found in {}",
            cert.display()
        );
        let keypair = PrivateKeyDer::from_pem_file(key)
            .map_err(|e| anyhow::anyhow!("{e:?}"))
            .with_context(|| format!("failed to read private key {}", key.display()))?;
        Ok(Credentials {
            certificates,
            keypair,
            hostname: String::new(),
        })
    }

    /// Loads the server credentials if present, or generates a throwaway set if neither file exists
    pub fn for_server(cert: &Path, key: &Path) -> Result<Self> {
        match (cert.exists(), key.exists()) {
            (true, true) => Self::load(cert, key),
            (false, false) => {
                info!(
                    "{} and {} not found; using a self-signed certificate",
                    cert.display(),
                    key.display()
                );
                Self::generate()
            }
            (true, false) => anyhow::bail!("private key {} not found", key.display()),
            (false, true) => anyhow::bail!("certificate {} not found", cert.display()),
        }
    }

    /// Cloning accessor
    #[must_use]
    pub fn cert_chain(&self) -> Vec<CertificateDer<'static>> {
        self.certificates.clone()
    }
}

fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Builds the TLS configuration for the server endpoint
pub fn server_tls_config(
    credentials: &Credentials,
    keylog: Option<Arc<dyn KeyLog>>,
) -> Result<rustls::ServerConfig> {
    let mut tls = rustls::ServerConfig::builder_with_provider(crypto_provider())
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_no_client_auth()
        .with_single_cert(credentials.cert_chain(), credentials.keypair.clone_key())?;
    tls.alpn_protocols = vec![ALPN.to_vec()];
    if let Some(k) = keylog {
        tls.key_log = k;
    }
    Ok(tls)
}

/// Builds the TLS configuration for the client endpoint.
///
/// The server certificate is not checked: this is a measurement tool, not a secure channel.
pub fn client_tls_config(keylog: Option<Arc<dyn KeyLog>>) -> Result<rustls::ClientConfig> {
    let provider = crypto_provider();
    let mut tls = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
        .with_no_client_auth();
    tls.alpn_protocols = vec![ALPN.to_vec()];
    if let Some(k) = keylog {
        tls.key_log = k;
    }
    Ok(tls)
}

/// Accepts any server certificate, but still checks handshake signatures
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::{client_tls_config, server_tls_config, Credentials};
    use crate::protocol::ALPN;

    #[test]
    fn generate_works() {
        let c = Credentials::generate().unwrap();
        assert_eq!(c.cert_chain().len(), 1);
        assert!(!c.hostname.is_empty());
    }

    #[test]
    fn load_pem() {
        let raw = rcgen::generate_simple_self_signed(["test.invalid".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("server.crt");
        let key = dir.path().join("server.key");
        std::fs::File::create(&cert)
            .unwrap()
            .write_all(raw.cert.pem().as_bytes())
            .unwrap();
        std::fs::File::create(&key)
            .unwrap()
            .write_all(raw.key_pair.serialize_pem().as_bytes())
            .unwrap();
        let c = Credentials::for_server(&cert, &key).unwrap();
        assert_eq!(c.certificates[0], *raw.cert.der());
    }

    #[test]
    fn missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("server.crt");
        let key = dir.path().join("server.key");
        // neither: generated
        let _ = Credentials::for_server(&cert, &key).unwrap();
        // only one: error
        let _ = std::fs::File::create(&cert).unwrap();
        let _ = Credentials::for_server(&cert, &key).unwrap_err();
        // both present but empty: error
        let _ = std::fs::File::create(&key).unwrap();
        let _ = Credentials::for_server(&cert, &key).unwrap_err();
    }

    #[test]
    fn tls_configs_carry_alpn() {
        let creds = Credentials::generate().unwrap();
        let s = server_tls_config(&creds, None).unwrap();
        assert_eq!(s.alpn_protocols, vec![ALPN.to_vec()]);
        let c = client_tls_config(None).unwrap();
        assert_eq!(c.alpn_protocols, vec![ALPN.to_vec()]);
    }
}
