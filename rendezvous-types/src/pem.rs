//! PEM certificate and key loading shared by the relay and its parties.

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A PEM file could not be read or held nothing usable.
#[derive(Debug, Error)]
#[error("failed to load {path}: {reason}")]
pub struct PemError {
    /// File that failed to load.
    pub path: PathBuf,
    /// What went wrong.
    pub reason: String,
}

impl PemError {
    fn new(path: &Path, reason: impl std::fmt::Display) -> Self {
        Self {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Load every certificate in a PEM file. An empty file is an error.
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, PemError> {
    let file = File::open(path).map_err(|e| PemError::new(path, e))?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| PemError::new(path, e))?;

    if certs.is_empty() {
        return Err(PemError::new(path, "no certificates found in file"));
    }
    Ok(certs)
}

/// Load the first private key (RSA, PKCS8 or EC) in a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, PemError> {
    let file = File::open(path).map_err(|e| PemError::new(path, e))?;

    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| PemError::new(path, e))?
        .ok_or_else(|| PemError::new(path, "no private key found in file"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed(dir: &Path) -> (PathBuf, PathBuf) {
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec!["alice".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();

        let cert_path = dir.join("cert.pem");
        let key_path = dir.join("key.pem");
        std::fs::write(&cert_path, cert.pem()).unwrap();
        std::fs::write(&key_path, key.serialize_pem()).unwrap();
        (cert_path, key_path)
    }

    #[test]
    fn loads_certificate_and_key() {
        let dir = tempfile::tempdir().unwrap();
        let (cert_path, key_path) = self_signed(dir.path());

        assert_eq!(load_certificates(&cert_path).unwrap().len(), 1);
        assert!(load_private_key(&key_path).is_ok());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_certificates(Path::new("/nonexistent/cert.pem")).unwrap_err();
        assert_eq!(err.path, Path::new("/nonexistent/cert.pem"));
    }

    #[test]
    fn empty_pem_has_no_certificates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pem");
        std::fs::write(&path, "").unwrap();

        let err = load_certificates(&path).unwrap_err();
        assert!(err.to_string().contains("no certificates"));
    }

    #[test]
    fn certificate_file_has_no_private_key() {
        let dir = tempfile::tempdir().unwrap();
        let (cert_path, _) = self_signed(dir.path());

        let err = load_private_key(&cert_path).unwrap_err();
        assert!(err.reason.contains("no private key"));
    }
}
