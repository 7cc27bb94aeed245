//! Long-term receiver keys as PEM files: PKCS#8 (unencrypted) private key and
//! SubjectPublicKeyInfo public key, both P-256.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use p256::{PublicKey, SecretKey};

use super::CryptoError;

/// Paths of a key pair written by [`write_keypair`].
#[derive(Debug, Clone)]
pub struct KeyPaths {
    pub private: PathBuf,
    pub public: PathBuf,
}

impl KeyPaths {
    /// `<dir>/<name>_private_key.pem` and `<dir>/<name>_public_key.pem`.
    pub fn for_name(dir: &Path, name: &str) -> Self {
        Self {
            private: dir.join(format!("{name}_private_key.pem")),
            public: dir.join(format!("{name}_public_key.pem")),
        }
    }
}

pub fn private_key_from_pem(pem: &str) -> Result<SecretKey, CryptoError> {
    SecretKey::from_pkcs8_pem(pem).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

pub fn public_key_from_pem(pem: &str) -> Result<PublicKey, CryptoError> {
    PublicKey::from_public_key_pem(pem).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

pub fn load_private_key(path: &Path) -> Result<SecretKey, CryptoError> {
    let pem = zeroize::Zeroizing::new(fs::read_to_string(path)?);
    private_key_from_pem(&pem)
}

pub fn load_public_key(path: &Path) -> Result<PublicKey, CryptoError> {
    public_key_from_pem(&fs::read_to_string(path)?)
}

/// Write `secret` and its public key as PEM files.
pub fn write_keypair(secret: &SecretKey, paths: &KeyPaths) -> Result<(), CryptoError> {
    let private_pem = secret
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let public_pem = secret
        .public_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    fs::write(&paths.private, private_pem.as_bytes())?;
    fs::write(&paths.public, public_pem.as_bytes())?;
    info!(
        "wrote key pair: {} / {}",
        paths.private.display(),
        paths.public.display()
    );
    Ok(())
}

/// Load the key pair at `paths`, generating and writing a new one if either file is missing.
pub fn load_or_generate(paths: &KeyPaths) -> Result<(SecretKey, PublicKey), CryptoError> {
    if !paths.private.exists() || !paths.public.exists() {
        info!("no existing key pair, generating a new one");
        let (secret, _) = super::generate_keypair();
        write_keypair(&secret, paths)?;
    }
    let secret = load_private_key(&paths.private)?;
    let public = load_public_key(&paths.public)?;
    Ok((secret, public))
}
