pub mod keys;

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use hkdf::Hkdf;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid compressed P-256 point")]
    InvalidPoint,
    #[error("authentication tag check failed")]
    AuthenticationFailed,
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("key file I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Output of [`aead_encrypt`]: ciphertext with the tag detached.
#[derive(Debug, Clone)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; config::NONCE_SIZE],
    pub tag: [u8; config::TAG_SIZE],
}

/// Everything the receiver needs, besides its private key, to recover a plaintext.
#[derive(Debug, Clone)]
pub struct CryptoEnvelope {
    pub ephemeral_pubkey: [u8; config::COMPRESSED_POINT_SIZE],
    pub salt: [u8; config::SALT_SIZE],
    pub sealed: Sealed,
}

/// Generate a long-term P-256 key pair.
pub fn generate_keypair() -> (SecretKey, PublicKey) {
    let secret = SecretKey::random(&mut OsRng);
    let public = secret.public_key();
    (secret, public)
}

/// Generate an ephemeral P-256 key pair. The secret cannot be serialized and is
/// consumed by a single key agreement.
pub fn generate_ephemeral() -> (EphemeralSecret, PublicKey) {
    let secret = EphemeralSecret::random(&mut OsRng);
    let public = secret.public_key();
    (secret, public)
}

/// Generate a random 16-byte HKDF salt.
pub fn generate_salt() -> [u8; config::SALT_SIZE] {
    let mut salt = [0u8; config::SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// X9.62 compressed encoding of a public key (33 bytes).
pub fn serialize_public_compressed(public: &PublicKey) -> [u8; config::COMPRESSED_POINT_SIZE] {
    let point = public.to_encoded_point(true);
    let mut out = [0u8; config::COMPRESSED_POINT_SIZE];
    out.copy_from_slice(point.as_bytes());
    out
}

/// Decode an X9.62 compressed point. Uncompressed encodings are rejected too.
pub fn deserialize_public_compressed(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    if bytes.len() != config::COMPRESSED_POINT_SIZE {
        return Err(CryptoError::InvalidPoint);
    }
    PublicKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidPoint)
}

/// ECDH between a long-term private key and a remote public key.
pub fn ecdh(private: &SecretKey, remote: &PublicKey) -> Zeroizing<[u8; 32]> {
    let shared = p256::ecdh::diffie_hellman(private.to_nonzero_scalar(), remote.as_affine());
    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(shared.raw_secret_bytes());
    out
}

/// ECDH between an ephemeral secret and a remote public key.
pub fn ecdh_ephemeral(private: &EphemeralSecret, remote: &PublicKey) -> Zeroizing<[u8; 32]> {
    let shared = private.diffie_hellman(remote);
    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(shared.raw_secret_bytes());
    out
}

/// Derive `out_len` bytes of key material with HKDF-SHA256 and the protocol info string.
pub fn derive_key(
    shared_secret: &[u8],
    salt: &[u8],
    out_len: usize,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), shared_secret);
    let mut okm = Zeroizing::new(vec![0u8; out_len]);
    hk.expand(config::HKDF_INFO, &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(okm)
}

/// AES-256-GCM with a fresh random nonce and no associated data.
pub fn aead_encrypt(plaintext: &[u8], key: &[u8]) -> Result<Sealed, CryptoError> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    let mut nonce = [0u8; config::NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let mut ciphertext = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut ciphertext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut tag_bytes = [0u8; config::TAG_SIZE];
    tag_bytes.copy_from_slice(&tag);

    Ok(Sealed {
        ciphertext,
        nonce,
        tag: tag_bytes,
    })
}

/// Decrypt and authenticate. A nonce or tag of the wrong length cannot be
/// authentic and is reported as `AuthenticationFailed`.
pub fn aead_decrypt(
    ciphertext: &[u8],
    key: &[u8],
    nonce: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if nonce.len() != config::NONCE_SIZE || tag.len() != config::TAG_SIZE {
        return Err(CryptoError::AuthenticationFailed);
    }
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    let mut plaintext = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            b"",
            &mut plaintext,
            Tag::from_slice(tag),
        )
        .map_err(|_| CryptoError::AuthenticationFailed)?;
    Ok(plaintext)
}

/// Encrypt `plaintext` for the holder of `receiver`'s private key.
///
/// A fresh ephemeral key pair and salt are generated per call; the shared
/// secret and AES key are zeroized when this function returns.
pub fn seal(plaintext: &[u8], receiver: &PublicKey) -> Result<CryptoEnvelope, CryptoError> {
    let (ephemeral, ephemeral_public) = generate_ephemeral();
    let shared = ecdh_ephemeral(&ephemeral, receiver);
    let salt = generate_salt();
    let key = derive_key(shared.as_slice(), &salt, config::AES_KEY_SIZE)?;
    let sealed = aead_encrypt(plaintext, &key)?;

    Ok(CryptoEnvelope {
        ephemeral_pubkey: serialize_public_compressed(&ephemeral_public),
        salt,
        sealed,
    })
}

/// Recover a plaintext sealed by [`seal`] from its raw wire fields.
pub fn open(
    private: &SecretKey,
    ephemeral_pubkey: &[u8],
    salt: &[u8],
    nonce: &[u8],
    tag: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let remote = deserialize_public_compressed(ephemeral_pubkey)?;
    let shared = ecdh(private, &remote);
    let key = derive_key(shared.as_slice(), salt, config::AES_KEY_SIZE)?;
    aead_decrypt(ciphertext, &key, nonce, tag)
}
