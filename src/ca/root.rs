//! Root certificate authority
//!
//! Creates the self-signed root that every impersonated leaf chains to, or
//! loads it back from the PKCS#12 key store written on first start.

use std::fs;
use std::path::Path;

use chrono::Utc;
use log::{debug, info};
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{X509Builder, X509Name, X509NameBuilder, X509NameRef, X509Ref, X509};

use crate::ca::authority::Authority;
use crate::ca::serial::{random_serial, root_validity, signature_digest};
use crate::common::fs::write_if_absent;
use crate::common::{ProxyError, Result};

/// RSA modulus size of the root key
pub const ROOT_KEY_BITS: u32 = 2048;

/// The long-lived signing authority
///
/// Shared read-only by every connection once created.
pub struct CertificateAuthority {
    authority: Authority,
    certificate: X509,
    private_key: PKey<Private>,
}

impl CertificateAuthority {
    /// Create a fresh root in memory
    ///
    /// Any failure is reported as [`ProxyError::RootCertificate`].
    pub fn create(authority: Authority) -> Result<Self> {
        let (certificate, private_key) = create_root_certificate(&authority)
            .map_err(|e| ProxyError::RootCertificate(e.to_string()))?;

        Ok(Self { authority, certificate, private_key })
    }

    /// Load the root from `dir`, creating and exporting it on first use
    ///
    /// The key store `<alias>.p12` is the source of truth. When it is missing
    /// a new root is created and both `<alias>.p12` and `<alias>.pem` are
    /// written; existing files are never overwritten.
    ///
    /// # Parameters
    ///
    /// * `authority` - CA identity and key store password
    /// * `dir` - Directory holding the exported artifacts
    ///
    /// # Errors
    ///
    /// Every failure maps to [`ProxyError::RootCertificate`]; the proxy must
    /// not start without a usable CA.
    pub fn load_or_create(authority: Authority, dir: &Path) -> Result<Self> {
        let keystore = authority.keystore_path(dir);

        let ca = if keystore.exists() {
            let ca = Self::load(authority, &keystore)?;
            info!("Loaded root certificate from {}", keystore.display());
            ca
        } else {
            let ca = Self::create(authority)?;
            info!("Created root certificate {}", ca.subject());
            ca
        };

        ca.export(dir)?;
        Ok(ca)
    }

    fn load(authority: Authority, keystore: &Path) -> Result<Self> {
        let root_err = |e: &dyn std::fmt::Display| {
            ProxyError::RootCertificate(format!("{}: {}", keystore.display(), e))
        };

        let der = fs::read(keystore).map_err(|e| root_err(&e))?;
        let parsed = Pkcs12::from_der(&der)
            .and_then(|p12| p12.parse2(&authority.password))
            .map_err(|e| root_err(&e))?;

        let certificate = parsed
            .cert
            .ok_or_else(|| root_err(&"key store holds no certificate"))?;
        let private_key = parsed
            .pkey
            .ok_or_else(|| root_err(&"key store holds no private key"))?;

        Ok(Self { authority, certificate, private_key })
    }

    /// Write `<alias>.p12` and `<alias>.pem` into `dir` if absent
    pub fn export(&self, dir: &Path) -> Result<()> {
        let root_err = |e: &dyn std::fmt::Display| ProxyError::RootCertificate(e.to_string());

        let keystore = Pkcs12::builder()
            .name(&self.authority.alias)
            .pkey(&self.private_key)
            .cert(&self.certificate)
            .build2(&self.authority.password)
            .and_then(|p12| p12.to_der())
            .map_err(|e| root_err(&e))?;

        let keystore_path = self.authority.keystore_path(dir);
        if write_if_absent(&keystore_path, &keystore).map_err(|e| root_err(&e))? {
            debug!("Wrote key store {}", keystore_path.display());
        }

        let pem_path = self.authority.pem_path(dir);
        if write_if_absent(&pem_path, &self.to_pem()?).map_err(|e| root_err(&e))? {
            debug!("Wrote certificate {}", pem_path.display());
        }

        Ok(())
    }

    /// CA identity
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Root certificate
    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    /// Root private key
    pub fn private_key(&self) -> &PKeyRef<Private> {
        &self.private_key
    }

    /// Root certificate subject name
    pub fn subject_name(&self) -> &X509NameRef {
        self.certificate.subject_name()
    }

    /// PEM encoding of the root certificate, as served for client installation
    pub fn to_pem(&self) -> Result<Vec<u8>> {
        self.certificate
            .to_pem()
            .map_err(|e| ProxyError::RootCertificate(e.to_string()))
    }

    fn subject(&self) -> String {
        self.subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|cn| cn.to_string())
            .unwrap_or_default()
    }
}

/// Create a self-signed root certificate and its key pair
///
/// RSA-2048, valid from one day in the past for one hundred years, marked as a
/// critical CA with certificate and CRL signing rights.
pub fn create_root_certificate(authority: &Authority) -> Result<(X509, PKey<Private>)> {
    let key = PKey::from_rsa(Rsa::generate(ROOT_KEY_BITS)?)?;
    let name = root_name(authority)?;
    let (not_before, not_after) = root_validity(Utc::now())?;

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    let serial = random_serial()?;
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_pubkey(&key)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;

    let ski = SubjectKeyIdentifier::new().build(&builder.x509v3_context(None, None))?;
    builder.append_extension(ski)?;
    builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
    builder.append_extension(
        KeyUsage::new()
            .key_cert_sign()
            .digital_signature()
            .key_encipherment()
            .data_encipherment()
            .crl_sign()
            .build()?,
    )?;
    builder.append_extension(
        ExtendedKeyUsage::new()
            .server_auth()
            .client_auth()
            .other("anyExtendedKeyUsage")
            .build()?,
    )?;

    builder.sign(&key, signature_digest())?;
    Ok((builder.build(), key))
}

fn root_name(authority: &Authority) -> Result<X509Name> {
    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COMMONNAME, &authority.common_name)?;
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, &authority.organization)?;
    name.append_entry_by_nid(Nid::ORGANIZATIONALUNITNAME, &authority.organizational_unit)?;
    Ok(name.build())
}
