//! Root CA artifacts on disk

use mitm_proxy::ca::Authority;
use mitm_proxy::{CertificateAuthority, ProxyError};
use openssl::x509::X509;
use tempfile::TempDir;

#[test]
fn test_root_is_created_once_and_reloaded() {
    let dir = TempDir::new().unwrap();
    let authority = Authority::default();

    let created = CertificateAuthority::load_or_create(authority.clone(), dir.path()).unwrap();
    assert!(authority.keystore_path(dir.path()).is_file());
    assert!(authority.pem_path(dir.path()).is_file());

    let reloaded = CertificateAuthority::load_or_create(authority.clone(), dir.path()).unwrap();
    assert_eq!(
        created.certificate().to_der().unwrap(),
        reloaded.certificate().to_der().unwrap()
    );

    // The exported PEM is what clients install
    let pem = std::fs::read(authority.pem_path(dir.path())).unwrap();
    let exported = X509::from_pem(&pem).unwrap();
    assert_eq!(exported.to_der().unwrap(), created.certificate().to_der().unwrap());
}

#[test]
fn test_wrong_password_is_a_root_certificate_error() {
    let dir = TempDir::new().unwrap();
    CertificateAuthority::load_or_create(Authority::default(), dir.path()).unwrap();

    let authority = Authority {
        password: "not the password".to_string(),
        ..Authority::default()
    };
    let result = CertificateAuthority::load_or_create(authority, dir.path());
    assert!(matches!(result, Err(ProxyError::RootCertificate(_))));
}
