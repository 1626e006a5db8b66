//! Per-host leaf certificate issuance

use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;

use chrono::Utc;
use log::debug;
use openssl::asn1::Asn1Time;
use openssl::nid::Nid;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, SubjectAlternativeName, SubjectKeyIdentifier,
};
use openssl::x509::{X509Builder, X509NameBuilder, X509Ref, X509};

use crate::ca::authority::Authority;
use crate::ca::serial::{leaf_validity, random_serial, signature_digest};
use crate::common::{ProxyError, Result};

/// RSA modulus size of leaf keys; short validity compensates for the size
pub const LEAF_KEY_BITS: u32 = 1024;

/// A subject alternative name observed on an origin certificate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubjectAltName {
    Dns(String),
    Ip(IpAddr),
    Email(String),
    Uri(String),
}

impl SubjectAltName {
    /// Collect the SAN entries of `cert`
    ///
    /// Unsupported general-name kinds are skipped.
    pub fn from_certificate(cert: &X509Ref) -> Vec<SubjectAltName> {
        let Some(names) = cert.subject_alt_names() else {
            return Vec::new();
        };

        names
            .iter()
            .filter_map(|name| {
                if let Some(dns) = name.dnsname() {
                    Some(SubjectAltName::Dns(dns.to_string()))
                } else if let Some(ip) = name.ipaddress() {
                    ip_from_octets(ip).map(SubjectAltName::Ip)
                } else if let Some(email) = name.email() {
                    Some(SubjectAltName::Email(email.to_string()))
                } else {
                    name.uri().map(|uri| SubjectAltName::Uri(uri.to_string()))
                }
            })
            .collect()
    }

    /// SAN that names `host` itself
    pub fn for_host(host: &str) -> SubjectAltName {
        match host.parse::<IpAddr>() {
            Ok(ip) => SubjectAltName::Ip(ip),
            Err(_) => SubjectAltName::Dns(host.to_string()),
        }
    }
}

impl fmt::Display for SubjectAltName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectAltName::Dns(v) => write!(f, "DNS:{}", v),
            SubjectAltName::Ip(v) => write!(f, "IP:{}", v),
            SubjectAltName::Email(v) => write!(f, "email:{}", v),
            SubjectAltName::Uri(v) => write!(f, "URI:{}", v),
        }
    }
}

fn ip_from_octets(octets: &[u8]) -> Option<IpAddr> {
    match octets.len() {
        4 => <[u8; 4]>::try_from(octets).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(octets).ok().map(IpAddr::from),
        _ => None,
    }
}

/// Mint a leaf certificate for `common_name`, signed by the CA
///
/// The subject carries the common name plus the authority's leaf
/// organization and unit. The SAN extension copies `subject_alt_names`; when
/// none were observed it names the common name so modern clients still match
/// the host.
///
/// The signed certificate is verified against the CA public key and checked
/// to be currently valid before it is returned.
///
/// # Errors
///
/// * [`ProxyError::LeafCertificate`] when key generation or signing fails
/// * [`ProxyError::IssuedCertificateInvalid`] when the self-check fails
pub fn create_leaf_certificate(
    common_name: &str,
    subject_alt_names: &[SubjectAltName],
    authority: &Authority,
    ca_cert: &X509Ref,
    ca_key: &PKeyRef<Private>,
) -> Result<(X509, PKey<Private>)> {
    let (cert, key) = sign_leaf(common_name, subject_alt_names, authority, ca_cert, ca_key)
        .map_err(|e| ProxyError::leaf(common_name, e))?;

    self_check(&cert, ca_cert)?;
    debug!("Issued leaf certificate for {}", common_name);

    Ok((cert, key))
}

fn sign_leaf(
    common_name: &str,
    subject_alt_names: &[SubjectAltName],
    authority: &Authority,
    ca_cert: &X509Ref,
    ca_key: &PKeyRef<Private>,
) -> Result<(X509, PKey<Private>)> {
    let key = PKey::from_rsa(Rsa::generate(LEAF_KEY_BITS)?)?;

    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, &authority.cert_organization)?;
    name.append_entry_by_nid(Nid::ORGANIZATIONALUNITNAME, &authority.cert_organizational_unit)?;
    let name = name.build();

    let (not_before, not_after) = leaf_validity(Utc::now())?;

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    let serial = random_serial()?;
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(ca_cert.subject_name())?;
    builder.set_pubkey(&key)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;

    let ski = SubjectKeyIdentifier::new().build(&builder.x509v3_context(Some(ca_cert), None))?;
    builder.append_extension(ski)?;
    let aki = AuthorityKeyIdentifier::new()
        .keyid(false)
        .build(&builder.x509v3_context(Some(ca_cert), None))?;
    builder.append_extension(aki)?;
    builder.append_extension(BasicConstraints::new().build()?)?;

    let fallback = [SubjectAltName::for_host(common_name)];
    let entries = if subject_alt_names.is_empty() {
        &fallback[..]
    } else {
        subject_alt_names
    };
    let mut san = SubjectAlternativeName::new();
    for entry in entries {
        match entry {
            SubjectAltName::Dns(v) => san.dns(v),
            SubjectAltName::Ip(v) => san.ip(&v.to_string()),
            SubjectAltName::Email(v) => san.email(v),
            SubjectAltName::Uri(v) => san.uri(v),
        };
    }
    let san = san.build(&builder.x509v3_context(Some(ca_cert), None))?;
    builder.append_extension(san)?;

    builder.sign(ca_key, signature_digest())?;
    Ok((builder.build(), key))
}

/// Verify the signature against the CA key and that now lies in the window
fn self_check(cert: &X509Ref, ca_cert: &X509Ref) -> Result<()> {
    let invalid = |reason: String| ProxyError::IssuedCertificateInvalid(reason);

    let ca_public = ca_cert.public_key().map_err(|e| invalid(e.to_string()))?;
    if !cert.verify(&ca_public).map_err(|e| invalid(e.to_string()))? {
        return Err(invalid("signature does not verify against the CA key".to_string()));
    }

    let now = Asn1Time::days_from_now(0).map_err(|e| invalid(e.to_string()))?;
    let started = cert.not_before().compare(&now).map_err(|e| invalid(e.to_string()))?;
    let expires = cert.not_after().compare(&now).map_err(|e| invalid(e.to_string()))?;
    if started == Ordering::Greater || expires == Ordering::Less {
        return Err(invalid(format!(
            "not valid now (notBefore {}, notAfter {})",
            cert.not_before(),
            cert.not_after()
        )));
    }

    Ok(())
}
