//! Passphrase sealing for exported documents.
//!
//! A sealed payload is self-describing:
//!
//! ```text
//! magic "TLSE" | version u8 | algorithm u8 | m_cost u32 | t_cost u32 |
//! p_cost u32 | salt [16] | nonce [12] | ciphertext || tag [16]
//! ```
//!
//! Integers are big-endian. The key is derived with Argon2id from the
//! passphrase and a fresh random salt, then the payload is encrypted with
//! AES-256-GCM under a fresh random nonce. The whole header is bound as
//! associated data, so tampering with the KDF parameters or the salt fails
//! authentication like any other corruption.
//!
//! Structural problems (truncated input, unknown magic or algorithm,
//! absurd KDF parameters) are reported as [`CoreError::MalformedDocument`].
//! Every authentication failure is [`CoreError::InvalidPassword`], whether
//! the passphrase is wrong or the ciphertext was damaged.

use crate::config::KdfParams;
use crate::error::{CoreError, CoreResult};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Leading bytes of every sealed payload.
pub const MAGIC: [u8; 4] = *b"TLSE";
/// Layout version of the sealed header.
pub const SEAL_VERSION: u8 = 1;
/// Algorithm identifier for Argon2id + AES-256-GCM.
pub const ALGORITHM_ARGON2ID_AES256GCM: u8 = 1;

/// Size of the derived key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the KDF salt in bytes.
pub const SALT_SIZE: usize = 16;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
/// Size of the sealed header in bytes.
pub const HEADER_SIZE: usize = 4 + 1 + 1 + 4 + 4 + 4 + SALT_SIZE + NONCE_SIZE;

/// A key derived from a passphrase. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct SealingKey {
    bytes: [u8; KEY_SIZE],
}

impl SealingKey {
    fn derive(passphrase: &[u8], salt: &[u8], kdf: &KdfParams) -> Result<Self, argon2::Error> {
        let params = Params::new(kdf.memory_kib, kdf.iterations, kdf.lanes, Some(KEY_SIZE))?;
        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut bytes = [0u8; KEY_SIZE];
        argon.hash_password_into(passphrase, salt, &mut bytes)?;
        Ok(Self { bytes })
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(GenericArray::from_slice(&self.bytes))
    }
}

impl std::fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealingKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The parsed header of a sealed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedHeader {
    /// KDF parameters the key was derived with.
    pub kdf: KdfParams,
    /// KDF salt.
    pub salt: [u8; SALT_SIZE],
    /// AEAD nonce.
    pub nonce: [u8; NONCE_SIZE],
}

impl SealedHeader {
    fn generate(kdf: KdfParams) -> Self {
        let mut salt = [0u8; SALT_SIZE];
        let mut nonce = [0u8; NONCE_SIZE];
        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce);
        Self { kdf, salt, nonce }
    }

    /// Serializes the header.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&MAGIC);
        out[4] = SEAL_VERSION;
        out[5] = ALGORITHM_ARGON2ID_AES256GCM;
        out[6..10].copy_from_slice(&self.kdf.memory_kib.to_be_bytes());
        out[10..14].copy_from_slice(&self.kdf.iterations.to_be_bytes());
        out[14..18].copy_from_slice(&self.kdf.lanes.to_be_bytes());
        out[18..18 + SALT_SIZE].copy_from_slice(&self.salt);
        out[18 + SALT_SIZE..].copy_from_slice(&self.nonce);
        out
    }

    /// Parses the header at the start of a sealed payload.
    ///
    /// # Errors
    ///
    /// Returns `MalformedDocument` if the input is too short, the magic,
    /// version or algorithm is unknown, or the KDF parameters are out of
    /// range.
    pub fn parse(sealed: &[u8]) -> CoreResult<Self> {
        if sealed.len() < HEADER_SIZE + TAG_SIZE {
            return Err(CoreError::malformed("sealed payload is truncated"));
        }
        if sealed[0..4] != MAGIC {
            return Err(CoreError::malformed("not a sealed payload"));
        }
        if sealed[4] != SEAL_VERSION {
            return Err(CoreError::malformed(format!(
                "unknown sealed layout version {}",
                sealed[4]
            )));
        }
        if sealed[5] != ALGORITHM_ARGON2ID_AES256GCM {
            return Err(CoreError::malformed(format!(
                "unknown sealing algorithm {}",
                sealed[5]
            )));
        }

        let be_u32 = |at: usize| {
            u32::from_be_bytes([sealed[at], sealed[at + 1], sealed[at + 2], sealed[at + 3]])
        };
        let kdf = KdfParams::new(be_u32(6), be_u32(10), be_u32(14));
        kdf.validate()
            .map_err(|e| CoreError::malformed(format!("sealed payload rejected: {e}")))?;

        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&sealed[18..18 + SALT_SIZE]);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&sealed[18 + SALT_SIZE..HEADER_SIZE]);
        Ok(Self { kdf, salt, nonce })
    }
}

/// Shortest passphrase accepted for sealing an export, in characters.
pub const MIN_PASSPHRASE_LEN: usize = 8;

/// Checks a passphrase chosen for a new export.
///
/// Only applied when sealing: [`open`] accepts any non-empty passphrase
/// so that payloads sealed by older releases stay readable.
///
/// # Errors
///
/// - `PassphraseRequired` if the passphrase is empty
/// - `WeakPassphrase` if it is shorter than [`MIN_PASSPHRASE_LEN`]
pub fn check_passphrase(passphrase: &str) -> CoreResult<()> {
    if passphrase.is_empty() {
        return Err(CoreError::PassphraseRequired);
    }
    if passphrase.chars().count() < MIN_PASSPHRASE_LEN {
        return Err(CoreError::WeakPassphrase {
            min_length: MIN_PASSPHRASE_LEN,
        });
    }
    Ok(())
}

/// Seals a payload under a passphrase.
///
/// Every call draws a fresh salt and nonce, so sealing the same payload
/// twice gives different outputs.
///
/// # Errors
///
/// - `PassphraseRequired` if the passphrase is empty
/// - `Config` if the KDF parameters are out of range
/// - `KeyDerivation` or `Encryption` if the primitives fail
pub fn seal(plaintext: &[u8], passphrase: &str, kdf: &KdfParams) -> CoreResult<Vec<u8>> {
    if passphrase.is_empty() {
        return Err(CoreError::PassphraseRequired);
    }
    kdf.validate()?;

    let header = SealedHeader::generate(*kdf);
    let header_bytes = header.to_bytes();
    let key = SealingKey::derive(passphrase.as_bytes(), &header.salt, kdf)
        .map_err(|e| CoreError::key_derivation(e.to_string()))?;

    let ciphertext = key
        .cipher()
        .encrypt(
            Nonce::from_slice(&header.nonce),
            Payload {
                msg: plaintext,
                aad: &header_bytes,
            },
        )
        .map_err(|_| CoreError::encryption("AES-GCM encryption failed"))?;

    let mut sealed = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    sealed.extend_from_slice(&header_bytes);
    sealed.extend(ciphertext);
    debug!(
        plaintext_len = plaintext.len(),
        sealed_len = sealed.len(),
        "sealed payload"
    );
    Ok(sealed)
}

/// Opens a payload produced by [`seal`].
///
/// # Errors
///
/// - `PassphraseRequired` if the passphrase is empty
/// - `MalformedDocument` if the header cannot be parsed
/// - `InvalidPassword` if authentication fails, for any reason
pub fn open(sealed: &[u8], passphrase: &str) -> CoreResult<Vec<u8>> {
    if passphrase.is_empty() {
        return Err(CoreError::PassphraseRequired);
    }
    let header = SealedHeader::parse(sealed)?;
    let key = SealingKey::derive(passphrase.as_bytes(), &header.salt, &header.kdf)
        .map_err(|e| CoreError::malformed(format!("sealed payload has bad kdf parameters: {e}")))?;

    key.cipher()
        .decrypt(
            Nonce::from_slice(&header.nonce),
            Payload {
                msg: &sealed[HEADER_SIZE..],
                aad: &sealed[..HEADER_SIZE],
            },
        )
        .map_err(|_| CoreError::InvalidPassword)
}

/// Returns whether `bytes` starts like a sealed payload.
#[must_use]
pub fn looks_sealed(bytes: &[u8]) -> bool {
    bytes.len() >= HEADER_SIZE + TAG_SIZE && bytes[0..4] == MAGIC
}
