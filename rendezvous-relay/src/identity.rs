//! Party identity from the verified peer certificate.
//!
//! The party name is the Common Name of the leaf certificate. Certificates
//! without a CN fall back to their first DNS Subject Alternative Name.

use crate::error::TlsError;
use crate::tls::TlsSession;
use rendezvous_types::PartyId;
use x509_parser::prelude::*;

/// Extract the party name from a DER-encoded X.509 certificate.
pub fn party_from_certificate(der_cert: &[u8]) -> Result<PartyId, TlsError> {
    let (_, cert) = X509Certificate::from_der(der_cert)
        .map_err(|e| TlsError::Certificate(e.to_string()))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .filter(|cn| !cn.is_empty());

    if let Some(cn) = common_name {
        return Ok(PartyId::new(cn));
    }

    first_dns_name(&cert)
        .map(PartyId::new)
        .ok_or(TlsError::MissingIdentity)
}

fn first_dns_name(cert: &X509Certificate<'_>) -> Option<String> {
    let san = cert.subject_alternative_name().ok().flatten()?;
    san.value.general_names.iter().find_map(|name| match name {
        GeneralName::DNSName(dns) if !dns.is_empty() => Some(dns.to_string()),
        _ => None,
    })
}

/// Identity of the party on the other end of an authenticated session.
pub fn party_identity(session: &TlsSession) -> Result<PartyId, TlsError> {
    let leaf = session
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or(TlsError::MissingIdentity)?;
    party_from_certificate(leaf.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DnType, KeyPair};

    fn der_for(params: CertificateParams) -> Vec<u8> {
        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().der().to_vec()
    }

    #[test]
    fn common_name_is_party_name() {
        let mut params = CertificateParams::new(vec!["alice.example".to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, "alice");

        let party = party_from_certificate(&der_for(params)).unwrap();
        assert_eq!(party, PartyId::new("alice"));
    }

    #[test]
    fn dns_name_used_without_common_name() {
        let mut params = CertificateParams::new(vec!["bob".to_string()]).unwrap();
        params.distinguished_name = rcgen::DistinguishedName::new();

        let party = party_from_certificate(&der_for(params)).unwrap();
        assert_eq!(party, PartyId::new("bob"));
    }

    #[test]
    fn certificate_without_names_is_rejected() {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name = rcgen::DistinguishedName::new();

        let err = party_from_certificate(&der_for(params)).unwrap_err();
        assert!(matches!(err, TlsError::MissingIdentity));
    }

    #[test]
    fn garbage_der_is_rejected() {
        let err = party_from_certificate(&[0x30, 0x03, 0x01, 0x02]).unwrap_err();
        assert!(matches!(err, TlsError::Certificate(_)));
    }

    #[test]
    fn session_without_peer_certificate_has_no_identity() {
        let session = crate::tls::test_support::server_session();
        assert!(matches!(
            party_identity(&session),
            Err(TlsError::MissingIdentity)
        ));
    }
}
