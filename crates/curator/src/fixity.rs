//! Message digests for fixity information.

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use sha2::{Digest, Sha256, Sha512};

use crate::error::PremisError;
use crate::premis::Fixity;
use crate::services::Binary;

/// Algorithm that must be present in every fixity calculation.
pub const MANDATORY_ALGORITHM: DigestAlgorithm = DigestAlgorithm::Sha256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = PremisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('_', "-").as_str() {
            "SHA-256" | "SHA256" => Ok(DigestAlgorithm::Sha256),
            "SHA-512" | "SHA512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(PremisError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Parses a comma-separated algorithm list. The mandatory algorithm is
/// always included and comes first; duplicates are dropped.
pub fn parse_algorithms(list: &str) -> Result<Vec<DigestAlgorithm>, PremisError> {
    let mut algorithms = vec![MANDATORY_ALGORITHM];
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let algorithm = name.parse::<DigestAlgorithm>()?;
        if !algorithms.contains(&algorithm) {
            algorithms.push(algorithm);
        }
    }
    Ok(algorithms)
}

/// Computes a lowercase hex digest over any readable source.
pub fn compute_digest<R: Read>(
    reader: &mut R,
    algorithm: DigestAlgorithm,
) -> Result<String, PremisError> {
    match algorithm {
        DigestAlgorithm::Sha256 => digest_with(Sha256::new(), reader),
        DigestAlgorithm::Sha512 => digest_with(Sha512::new(), reader),
    }
}

fn digest_with<D: Digest, R: Read>(mut hasher: D, reader: &mut R) -> Result<String, PremisError> {
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer).map_err(PremisError::Digest)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Fixity of an already loaded binary. Digests the storage layer reports for
/// the same algorithm are reused instead of recomputed.
pub fn fixity_of_binary(
    binary: &Binary,
    algorithms: &[DigestAlgorithm],
    originator: &str,
) -> Result<Vec<Fixity>, PremisError> {
    let mut fixities = Vec::with_capacity(algorithms.len());
    for algorithm in algorithms {
        let digest = match binary.digests.get(algorithm.name()) {
            Some(known) => known.to_lowercase(),
            None => compute_digest(&mut binary.content.as_slice(), *algorithm)?,
        };
        fixities.push(Fixity {
            algorithm: algorithm.name().to_string(),
            digest,
            originator: originator.to_string(),
        });
    }
    Ok(fixities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_compute_digest_sha256() {
        let mut cursor = Cursor::new(b"hello world");
        let digest = compute_digest(&mut cursor, DigestAlgorithm::Sha256).unwrap();
        assert_eq!(digest, HELLO_SHA256);
    }

    #[test]
    fn test_compute_digest_sha512_length() {
        let mut cursor = Cursor::new(b"hello world");
        let digest = compute_digest(&mut cursor, DigestAlgorithm::Sha512).unwrap();
        assert_eq!(digest.len(), 128);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_parse_algorithms_always_includes_sha256() {
        assert_eq!(
            parse_algorithms("SHA-512").unwrap(),
            vec![DigestAlgorithm::Sha256, DigestAlgorithm::Sha512]
        );
        assert_eq!(
            parse_algorithms("sha256, SHA-256").unwrap(),
            vec![DigestAlgorithm::Sha256]
        );
        assert_eq!(parse_algorithms("").unwrap(), vec![DigestAlgorithm::Sha256]);
        assert!(matches!(
            parse_algorithms("MD5"),
            Err(PremisError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_known_digest_is_reused() {
        let mut binary = Binary::new(b"hello world".to_vec());
        binary
            .digests
            .insert("SHA-256".to_string(), "ABCDEF".to_string());

        let fixities =
            fixity_of_binary(&binary, &[DigestAlgorithm::Sha256], "curator").unwrap();
        assert_eq!(fixities.len(), 1);
        assert_eq!(fixities[0].digest, "abcdef");
        assert_eq!(fixities[0].originator, "curator");
    }

    #[test]
    fn test_missing_digest_is_computed() {
        let binary = Binary::new(b"hello world".to_vec());
        let fixities =
            fixity_of_binary(&binary, &[DigestAlgorithm::Sha256], "curator").unwrap();
        assert_eq!(fixities[0].algorithm, "SHA-256");
        assert_eq!(fixities[0].digest, HELLO_SHA256);
    }
}
