//! Certificate authority capability
//!
//! The generation engine never touches key material directly. It asks a
//! [`CertificateIssuer`] to mint self-signed roots and to generate and sign
//! leaf key pairs. [`RcgenIssuer`] is the production implementation.
//!
//! All material crosses this boundary as PEM bytes, the same form it is
//! stored in the secret store.

use std::net::IpAddr;

#[cfg(test)]
use mockall::automock;
use rcgen::{
    string::Ia5String, BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType,
};
use thiserror::Error;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::{FromDer, X509Certificate, X509Name};

/// Common name of every generated root authority
pub const AUTHORITY_COMMON_NAME: &str = "SCF CA";

/// Validity period for roots and leaves (30 years)
pub const CERT_VALIDITY_YEARS: i64 = 30;

/// Validity period for roots and leaves as a duration
pub fn default_validity() -> time::Duration {
    time::Duration::days(CERT_VALIDITY_YEARS * 365)
}

/// PKI errors
#[derive(Debug, Error)]
pub enum PkiError {
    /// Certificate generation or signing failed
    #[error("certificate generation failed: {0}")]
    CertificateGenerationFailed(String),

    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Certificate or key parsing error
    #[error("certificate parsing error: {0}")]
    ParseError(String),
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;

/// Extended key usage requested for a leaf certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    /// TLS server authentication
    ServerAuth,
    /// TLS client authentication
    ClientAuth,
}

impl KeyUsage {
    fn purpose(self) -> ExtendedKeyUsagePurpose {
        match self {
            Self::ServerAuth => ExtendedKeyUsagePurpose::ServerAuth,
            Self::ClientAuth => ExtendedKeyUsagePurpose::ClientAuth,
        }
    }
}

/// Everything needed to issue one leaf certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    /// Subject common name
    pub common_name: String,
    /// Hosts the certificate is valid for, in order
    pub hosts: Vec<String>,
    /// Extended key usages
    pub usages: Vec<KeyUsage>,
    /// Lifetime counted from issuance
    pub validity: time::Duration,
}

/// A certificate and its private key, both PEM encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedMaterial {
    /// PEM encoded certificate
    pub certificate: Vec<u8>,
    /// PEM encoded private key
    pub private_key: Vec<u8>,
}

/// Capability for minting authorities and signing leaf certificates
#[cfg_attr(test, automock)]
pub trait CertificateIssuer {
    /// Mint a new self-signed root authority
    fn mint_root(&self, common_name: &str, validity: time::Duration) -> Result<IssuedMaterial>;

    /// Generate a key pair and sign a certificate for it with the given authority
    fn sign(
        &self,
        ca_private_key: &[u8],
        ca_certificate: &[u8],
        request: &SigningRequest,
    ) -> Result<IssuedMaterial>;
}

/// Key algorithm used for newly generated key pairs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// 4096-bit RSA with SHA-256 signatures
    #[default]
    Rsa4096,
    /// NIST P-256 with SHA-256 signatures
    EcdsaP256,
}

/// [`CertificateIssuer`] backed by rcgen
#[derive(Debug, Clone, Copy, Default)]
pub struct RcgenIssuer {
    algorithm: KeyAlgorithm,
}

impl RcgenIssuer {
    /// Create an issuer generating keys with the given algorithm
    pub fn new(algorithm: KeyAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Key algorithm for new key pairs
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    fn generate_key_pair(&self) -> Result<KeyPair> {
        let generated = match self.algorithm {
            KeyAlgorithm::Rsa4096 => {
                KeyPair::generate_rsa_for(&rcgen::PKCS_RSA_SHA256, rcgen::RsaKeySize::_4096)
            }
            KeyAlgorithm::EcdsaP256 => KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256),
        };
        generated.map_err(|e| PkiError::KeyGenerationFailed(e.to_string()))
    }
}

/// Compute certificate validity period from now
fn compute_validity(validity: time::Duration) -> (time::OffsetDateTime, time::OffsetDateTime) {
    let now = time::OffsetDateTime::now_utc();
    (now, now + validity)
}

fn pem_str<'a>(bytes: &'a [u8], what: &str) -> Result<&'a str> {
    std::str::from_utf8(bytes)
        .map_err(|e| PkiError::ParseError(format!("{} is not valid UTF-8: {}", what, e)))
}

/// Turn a host into a SAN entry; IP literals become IP SANs
fn san_for_host(host: &str) -> Result<SanType> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SanType::IpAddress(ip));
    }
    Ia5String::try_from(host.to_string())
        .map(SanType::DnsName)
        .map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("invalid DNS name '{}': {}", host, e))
        })
}

impl CertificateIssuer for RcgenIssuer {
    fn mint_root(&self, common_name: &str, validity: time::Duration) -> Result<IssuedMaterial> {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(common_name.to_string()),
        );
        params.distinguished_name = dn;

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let (not_before, not_after) = compute_validity(validity);
        params.not_before = not_before;
        params.not_after = not_after;

        let key_pair = self.generate_key_pair()?;
        let cert = params.self_signed(&key_pair).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("failed to create CA cert: {}", e))
        })?;

        Ok(IssuedMaterial {
            certificate: cert.pem().into_bytes(),
            private_key: key_pair.serialize_pem().into_bytes(),
        })
    }

    fn sign(
        &self,
        ca_private_key: &[u8],
        ca_certificate: &[u8],
        request: &SigningRequest,
    ) -> Result<IssuedMaterial> {
        let ca_key = KeyPair::from_pem(pem_str(ca_private_key, "CA private key")?)
            .map_err(|e| PkiError::ParseError(format!("failed to parse CA key: {}", e)))?;
        let issuer = Issuer::from_ca_cert_pem(pem_str(ca_certificate, "CA certificate")?, &ca_key)
            .map_err(|e| PkiError::ParseError(format!("failed to parse CA cert: {}", e)))?;

        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(request.common_name.clone()),
        );
        params.distinguished_name = dn;

        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = request.usages.iter().map(|u| u.purpose()).collect();

        let (not_before, not_after) = compute_validity(request.validity);
        params.not_before = not_before;
        params.not_after = not_after;

        params.subject_alt_names = request
            .hosts
            .iter()
            .map(|host| san_for_host(host))
            .collect::<Result<Vec<_>>>()?;

        let key_pair = self.generate_key_pair()?;
        let cert = params.signed_by(&key_pair, &issuer).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("failed to sign cert: {}", e))
        })?;

        Ok(IssuedMaterial {
            certificate: cert.pem().into_bytes(),
            private_key: key_pair.serialize_pem().into_bytes(),
        })
    }
}

/// Parse PEM-encoded data and return the DER bytes
pub fn parse_pem(pem_data: &[u8]) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data)
        .map_err(|e| PkiError::ParseError(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.contents().to_vec())
}

/// Identity and validity details of an issued certificate
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// Subject common name
    pub common_name: String,
    /// Issuer common name
    pub issuer_common_name: String,
    /// DNS subject alternative names, in certificate order
    pub dns_names: Vec<String>,
    /// IP subject alternative names
    pub ip_addresses: Vec<IpAddr>,
    /// Whether basic constraints mark this as an authority
    pub is_ca: bool,
    /// When the certificate becomes valid (Unix timestamp)
    pub not_before: i64,
    /// When the certificate expires (Unix timestamp)
    pub not_after: i64,
}

impl CertificateInfo {
    /// Parse certificate info from PEM-encoded certificate
    pub fn from_pem(pem_data: &[u8]) -> Result<Self> {
        let der = parse_pem(pem_data)?;
        Self::from_der(&der)
    }

    /// Parse certificate info from DER-encoded certificate
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;

        let first_cn = |name: &X509Name<'_>| {
            name.iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .unwrap_or("")
                .to_string()
        };

        let mut dns_names = Vec::new();
        let mut ip_addresses = Vec::new();
        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => dns_names.push(dns.to_string()),
                    GeneralName::IPAddress(bytes) => {
                        if let Some(ip) = ip_from_octets(bytes) {
                            ip_addresses.push(ip);
                        }
                    }
                    _ => {}
                }
            }
        }

        Ok(Self {
            common_name: first_cn(cert.subject()),
            issuer_common_name: first_cn(cert.issuer()),
            dns_names,
            ip_addresses,
            is_ca: cert.is_ca(),
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
        })
    }

    /// Total lifetime of the certificate in seconds
    pub fn lifetime_secs(&self) -> i64 {
        self.not_after - self.not_before
    }
}

fn ip_from_octets(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}

/// Verify that `cert_pem` was signed by the authority in `ca_cert_pem`
pub fn verify_signed_by(cert_pem: &[u8], ca_cert_pem: &[u8]) -> Result<bool> {
    let cert_der = parse_pem(cert_pem)?;
    let (_, cert) = X509Certificate::from_der(&cert_der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse cert: {}", e)))?;

    let ca_der = parse_pem(ca_cert_pem)?;
    let (_, ca_cert) = X509Certificate::from_der(&ca_der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse CA cert: {}", e)))?;

    Ok(cert.verify_signature(Some(ca_cert.public_key())).is_ok())
}
