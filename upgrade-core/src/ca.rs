use crate::error::GuardError;
use crate::Result;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, PKCS_ECDSA_P256_SHA256,
};
use std::fs;
use std::path::Path;
use time::{Duration, OffsetDateTime};

const CA_COMMON_NAME: &str = "Upgrade Guard CA";
const CA_ORGANIZATION: &str = "Upgrade Guard Local Interception";

/// Root CA the proxy host signs per-host certificates with, so that secure
/// requests from controlled clients reach the interceptor too.
///
/// Persisted as `ca.pem` / `ca.key` (plus a `ca.crt` copy for installing into
/// trust stores) in a directory of the operator's choosing.
pub struct CertificateAuthority {
    ca_cert: Certificate,
}

impl CertificateAuthority {
    /// Load the CA found in `ca_dir`, or generate and save a new one.
    pub fn new(ca_dir: &Path) -> Result<Self> {
        let ca_cert_path = ca_dir.join("ca.pem");
        let ca_key_path = ca_dir.join("ca.key");

        if ca_cert_path.exists() && ca_key_path.exists() {
            let cert_pem = fs::read_to_string(&ca_cert_path)?;
            let key_pem = fs::read_to_string(&ca_key_path)?;
            Self::from_pem(&cert_pem, &key_pem)
        } else {
            fs::create_dir_all(ca_dir)?;
            Self::generate_and_save(&ca_cert_path, &ca_key_path)
        }
    }

    /// Rebuild the CA from its PEM key.
    ///
    /// rcgen cannot sign with a parsed certificate, so the CA certificate is
    /// recreated around the stored key pair with the same subject.
    pub fn from_pem(_cert_pem: &str, key_pem: &str) -> Result<Self> {
        let key_pair = KeyPair::from_pem(key_pem)
            .map_err(|e| GuardError::Certificate(format!("Failed to parse CA key: {}", e)))?;

        let mut params = ca_params();
        params.key_pair = Some(key_pair);

        let cert = Certificate::from_params(params)
            .map_err(|e| GuardError::Certificate(format!("Failed to recreate CA cert: {}", e)))?;

        Ok(Self { ca_cert: cert })
    }

    fn generate_and_save(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let mut params = ca_params();
        params.not_before = OffsetDateTime::now_utc();
        params.not_after = params.not_before + Duration::days(365 * 10);
        params.key_pair = Some(
            KeyPair::generate(&PKCS_ECDSA_P256_SHA256)
                .map_err(|e| GuardError::Certificate(format!("Failed to generate CA key: {}", e)))?,
        );

        let cert = Certificate::from_params(params)
            .map_err(|e| GuardError::Certificate(format!("Failed to generate CA cert: {}", e)))?;

        let cert_pem = cert
            .serialize_pem()
            .map_err(|e| GuardError::Certificate(format!("Failed to serialize CA cert: {}", e)))?;
        let key_pem = cert.serialize_private_key_pem();

        fs::write(cert_path, &cert_pem)?;
        fs::write(key_path, &key_pem)?;
        fs::write(cert_path.with_extension("crt"), &cert_pem)?;

        Ok(Self { ca_cert: cert })
    }

    /// Root CA certificate in PEM format.
    pub fn cert_pem(&self) -> Result<String> {
        self.ca_cert
            .serialize_pem()
            .map_err(|e| GuardError::Certificate(format!("Failed to serialize CA cert: {}", e)))
    }

    /// Root CA certificate in DER format (for rustls/hudsucker).
    pub fn cert_der(&self) -> Result<Vec<u8>> {
        self.ca_cert
            .serialize_der()
            .map_err(|e| GuardError::Certificate(format!("Failed to serialize CA cert DER: {}", e)))
    }

    /// Root CA private key in DER format (for rustls/hudsucker).
    pub fn key_der(&self) -> Vec<u8> {
        self.ca_cert.serialize_private_key_der()
    }
}

fn ca_params() -> CertificateParams {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, CA_COMMON_NAME);
    dn.push(DnType::OrganizationName, CA_ORGANIZATION);
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    params
}
