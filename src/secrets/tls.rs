// ABOUTME: Local certificate authority and leaf certificate issuance.
// ABOUTME: Leaves are reused until they enter the 30-day renewal window.

use super::SecretError;
use crate::files::{self, MODE_PRIVATE, MODE_PUBLIC};
use chrono::{DateTime, Duration, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, KeyPair, KeyUsagePurpose, PKCS_RSA_SHA256, RsaKeySize,
};
use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use time::OffsetDateTime;
use x509_parser::extensions::GeneralName;

pub const CA_VALIDITY_DAYS: i64 = 3650;
pub const LEAF_VALIDITY_DAYS: i64 = 365;
/// A leaf with this many days or fewer left is reissued.
pub const RENEWAL_WINDOW_DAYS: i64 = 30;

pub const CA_KEY_BITS: usize = 4096;
pub const LEAF_KEY_BITS: usize = 2048;

pub const CA_KEY: &str = "ca.key";
pub const CA_CERT: &str = "ca.crt";
pub const SERVER_KEY: &str = "server.key";
pub const SERVER_CERT: &str = "server.crt";
pub const FULLCHAIN: &str = "fullchain.pem";

/// The project's certificate authority.
#[derive(Clone)]
pub struct CertificateAuthority {
    key_pem: String,
    pub cert_pem: String,
    pub cert_path: PathBuf,
    pub not_after: DateTime<Utc>,
    /// True when the key was generated by this call.
    pub created: bool,
}

impl fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("cert_path", &self.cert_path)
            .field("not_after", &self.not_after)
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

/// The server certificate presented by the gateway.
#[derive(Debug, Clone)]
pub struct LeafCertificate {
    pub subject: String,
    pub sans: Vec<String>,
    pub not_after: DateTime<Utc>,
    pub key_path: PathBuf,
    pub cert_path: PathBuf,
    pub fullchain_path: PathBuf,
    /// True when the existing certificate was kept.
    pub reused: bool,
}

impl LeafCertificate {
    pub fn days_remaining(&self) -> i64 {
        (self.not_after - Utc::now()).num_days()
    }
}

struct CertInfo {
    not_after: DateTime<Utc>,
    names: Vec<String>,
}

pub(crate) fn issue_ca(dir: &Path, common_name: &str) -> Result<CertificateAuthority, SecretError> {
    fs::create_dir_all(dir).map_err(|e| SecretError::io(dir, e))?;
    let key_path = dir.join(CA_KEY);
    let cert_path = dir.join(CA_CERT);

    if key_path.exists() {
        let key_pem = fs::read_to_string(&key_path).map_err(|e| SecretError::io(&key_path, e))?;
        let key = load_key(&key_pem)?;

        if cert_path.exists() {
            let cert_pem =
                fs::read_to_string(&cert_path).map_err(|e| SecretError::io(&cert_path, e))?;
            let info = inspect(&cert_path, cert_pem.as_bytes())?;
            tracing::debug!("reusing CA at {}", cert_path.display());
            return Ok(CertificateAuthority {
                key_pem,
                cert_pem,
                cert_path,
                not_after: info.not_after,
                created: false,
            });
        }

        tracing::warn!(
            "CA key present without {}, re-issuing the certificate from the existing key",
            CA_CERT
        );
        let now = Utc::now();
        let not_after = now + Duration::days(CA_VALIDITY_DAYS);
        let cert = ca_params(common_name, now, not_after)?.self_signed(&key)?;
        let cert_pem = cert.pem();
        files::write_atomic(&cert_path, cert_pem.as_bytes(), MODE_PUBLIC)
            .map_err(|e| SecretError::io(&cert_path, e))?;
        return Ok(CertificateAuthority {
            key_pem,
            cert_pem,
            cert_path,
            not_after,
            created: false,
        });
    }

    let now = Utc::now();
    let not_after = now + Duration::days(CA_VALIDITY_DAYS);
    let key = KeyPair::generate_rsa_for(&PKCS_RSA_SHA256, RsaKeySize::_4096)?;
    let cert = ca_params(common_name, now, not_after)?.self_signed(&key)?;
    let key_pem = key.serialize_pem();
    let cert_pem = cert.pem();

    files::write_atomic(&key_path, key_pem.as_bytes(), MODE_PRIVATE)
        .map_err(|e| SecretError::io(&key_path, e))?;
    files::write_atomic(&cert_path, cert_pem.as_bytes(), MODE_PUBLIC)
        .map_err(|e| SecretError::io(&cert_path, e))?;
    tracing::info!("created certificate authority {}", common_name);

    Ok(CertificateAuthority {
        key_pem,
        cert_pem,
        cert_path,
        not_after,
        created: true,
    })
}

pub(crate) fn issue_leaf(
    dir: &Path,
    ca: &CertificateAuthority,
    subject: &str,
    sans: &[String],
    force: bool,
) -> Result<LeafCertificate, SecretError> {
    let key_path = dir.join(SERVER_KEY);
    let cert_path = dir.join(SERVER_CERT);
    let fullchain_path = dir.join(FULLCHAIN);

    let mut names = vec![subject.to_string()];
    for san in sans {
        if !names.contains(san) {
            names.push(san.clone());
        }
    }

    if !force && !ca.created && key_path.exists() && cert_path.exists() {
        match fs::read(&cert_path)
            .map_err(|e| SecretError::io(&cert_path, e))
            .and_then(|pem| inspect(&cert_path, &pem))
        {
            Ok(existing) => {
                let remaining = existing.not_after - Utc::now();
                let covered = names.iter().all(|n| existing.names.contains(n));
                if remaining > Duration::days(RENEWAL_WINDOW_DAYS) && covered {
                    tracing::debug!(
                        "reusing leaf certificate, {} days remaining",
                        remaining.num_days()
                    );
                    return Ok(LeafCertificate {
                        subject: subject.to_string(),
                        sans: existing.names,
                        not_after: existing.not_after,
                        key_path,
                        cert_path,
                        fullchain_path,
                        reused: true,
                    });
                }
                if !covered {
                    tracing::info!("leaf certificate does not cover {:?}, reissuing", names);
                } else {
                    tracing::info!(
                        "leaf certificate expires in {} days, reissuing",
                        remaining.num_days()
                    );
                }
            }
            Err(e) => tracing::warn!("existing leaf certificate unusable ({}), reissuing", e),
        }
    }

    let now = Utc::now();
    let not_after = now + Duration::days(LEAF_VALIDITY_DAYS);
    let (cert_pem, key_pem) = sign_leaf(ca, subject, &names, now, not_after)?;
    write_leaf(dir, ca, &cert_pem, &key_pem)?;
    tracing::info!("issued leaf certificate for {}", subject);

    Ok(LeafCertificate {
        subject: subject.to_string(),
        sans: names,
        not_after,
        key_path,
        cert_path,
        fullchain_path,
        reused: false,
    })
}

fn ca_params(
    common_name: &str,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> Result<CertificateParams, rcgen::Error> {
    let mut params = CertificateParams::new(Vec::<String>::new())?;
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    params
        .distinguished_name
        .push(DnType::OrganizationName, "deployctl");
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params.not_before = OffsetDateTime::from(SystemTime::from(not_before));
    params.not_after = OffsetDateTime::from(SystemTime::from(not_after));
    Ok(params)
}

/// Sign a server certificate for `names`; returns `(cert_pem, key_pem)`.
fn sign_leaf(
    ca: &CertificateAuthority,
    subject: &str,
    names: &[String],
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> Result<(String, String), SecretError> {
    let ca_key = load_key(&ca.key_pem)?;
    let issuer = CertificateParams::from_ca_cert_pem(&ca.cert_pem)?.self_signed(&ca_key)?;

    let mut params = CertificateParams::new(names.to_vec())?;
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, subject);
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    params.use_authority_key_identifier_extension = true;
    params.not_before = OffsetDateTime::from(SystemTime::from(not_before));
    params.not_after = OffsetDateTime::from(SystemTime::from(not_after));

    let key = KeyPair::generate_rsa_for(&PKCS_RSA_SHA256, RsaKeySize::_2048)?;
    let cert = params.signed_by(&key, &issuer, &ca_key)?;
    Ok((cert.pem(), key.serialize_pem()))
}

fn load_key(pem: &str) -> Result<KeyPair, rcgen::Error> {
    KeyPair::from_pem_and_sign_algo(pem, &PKCS_RSA_SHA256)
}

fn write_leaf(
    dir: &Path,
    ca: &CertificateAuthority,
    cert_pem: &str,
    key_pem: &str,
) -> Result<(), SecretError> {
    let key_path = dir.join(SERVER_KEY);
    let cert_path = dir.join(SERVER_CERT);
    let fullchain_path = dir.join(FULLCHAIN);
    let fullchain = format!("{}{}", cert_pem, ca.cert_pem);

    files::write_atomic(&key_path, key_pem.as_bytes(), MODE_PRIVATE)
        .map_err(|e| SecretError::io(&key_path, e))?;
    files::write_atomic(&cert_path, cert_pem.as_bytes(), MODE_PUBLIC)
        .map_err(|e| SecretError::io(&cert_path, e))?;
    files::write_atomic(&fullchain_path, fullchain.as_bytes(), MODE_PUBLIC)
        .map_err(|e| SecretError::io(&fullchain_path, e))?;
    Ok(())
}

fn inspect(path: &Path, pem: &[u8]) -> Result<CertInfo, SecretError> {
    let (_, pem) =
        x509_parser::pem::parse_x509_pem(pem).map_err(|e| SecretError::parse(path, e))?;
    let cert = pem.parse_x509().map_err(|e| SecretError::parse(path, e))?;

    let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| SecretError::parse(path, "not_after out of range"))?;

    let mut names = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => names.push(dns.to_string()),
                GeneralName::IPAddress(raw) => {
                    if let Some(ip) = ip_from_octets(raw) {
                        names.push(ip.to_string());
                    }
                }
                _ => {}
            }
        }
    }

    Ok(CertInfo { not_after, names })
}

fn ip_from_octets(raw: &[u8]) -> Option<IpAddr> {
    match raw.len() {
        4 => <[u8; 4]>::try_from(raw).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(raw).ok().map(IpAddr::from),
        _ => None,
    }
}
