//! Principal-scoped encryption of cache files
//!
//! Every persisted blob is sealed with XChaCha20-Poly1305 under a key derived
//! from a per-user secret and the identity of the current principal. A blob
//! sealed for one principal fails authentication for any other one, so the
//! cache is bound to the host's current-user boundary and is not portable.
//!
//! Envelope layout: `TCP1 || nonce (24 bytes) || ciphertext || tag (16 bytes)`.

use crate::error::{CacheError, CacheResult};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Magic prefix of a protected blob
pub const ENVELOPE_MAGIC: &[u8; 4] = b"TCP1";

const NONCE_SIZE: usize = 24;
const TAG_SIZE: usize = 16;
const KEY_SIZE: usize = 32;
const HKDF_SALT: &[u8] = b"tokencache/protect/v1";

/// Identity of the principal the cache is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(String);

impl Principal {
    /// The principal running this process
    #[cfg(unix)]
    pub fn current() -> Self {
        // SAFETY: geteuid has no preconditions and cannot fail.
        let uid = unsafe { libc::geteuid() };
        Self(format!("uid:{}", uid))
    }

    /// The principal running this process
    #[cfg(not(unix))]
    pub fn current() -> Self {
        let user = std::env::var("USERNAME").unwrap_or_else(|_| "unknown".to_string());
        match std::env::var("USERDOMAIN") {
            Ok(domain) => Self(format!("user:{}\\{}", domain, user)),
            Err(_) => Self(format!("user:{}", user)),
        }
    }

    /// An explicitly named principal
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct ProtectionKey([u8; KEY_SIZE]);

/// Seals and opens cache blobs for one principal
#[derive(Clone)]
pub struct DataProtector {
    key: ProtectionKey,
    principal: Principal,
}

impl fmt::Debug for DataProtector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataProtector")
            .field("key", &"[REDACTED]")
            .field("principal", &self.principal)
            .finish()
    }
}

impl DataProtector {
    /// Protector for the current principal, using the per-user secret stored
    /// at `key_file` (created with mode 0600 on first use)
    pub fn for_current_user(key_file: &Path) -> CacheResult<Self> {
        let mut secret = load_or_create_secret(key_file)?;
        let protector = Self::from_secret(&secret, Principal::current());
        secret.zeroize();
        protector
    }

    /// Derive the protection key for `principal` from a 32-byte user secret
    pub fn from_secret(secret: &[u8; KEY_SIZE], principal: Principal) -> CacheResult<Self> {
        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), secret);
        let mut okm = [0u8; KEY_SIZE];
        hk.expand(principal.as_str().as_bytes(), &mut okm)
            .map_err(|e| CacheError::Internal(format!("key derivation failed: {}", e)))?;

        let key = ProtectionKey(okm);
        okm.zeroize();

        Ok(Self { key, principal })
    }

    /// The principal this protector is bound to
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Short, non-reversible identifier of the derived key (first 12 hex chars
    /// of its SHA256), for status output
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.key.0);
        hex::encode(&digest[..6])
    }

    /// Seal plaintext into an envelope
    pub fn protect(&self, plaintext: &[u8]) -> CacheResult<Vec<u8>> {
        let cipher = self.cipher()?;

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: self.principal.as_str().as_bytes(),
                },
            )
            .map_err(|_| CacheError::Internal("XChaCha20-Poly1305 encryption failed".into()))?;

        let mut envelope = Vec::with_capacity(ENVELOPE_MAGIC.len() + NONCE_SIZE + ciphertext.len());
        envelope.extend_from_slice(ENVELOPE_MAGIC);
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&ciphertext);
        Ok(envelope)
    }

    /// Open an envelope read from `origin`.
    ///
    /// Anything that is not a valid envelope sealed for this principal is
    /// reported as `CorruptCache`.
    pub fn unprotect(&self, envelope: &[u8], origin: &Path) -> CacheResult<Vec<u8>> {
        let header = ENVELOPE_MAGIC.len() + NONCE_SIZE;
        if envelope.len() < header + TAG_SIZE {
            return Err(CacheError::corrupt(origin, "file too short to be a protected blob"));
        }
        if &envelope[..ENVELOPE_MAGIC.len()] != ENVELOPE_MAGIC {
            return Err(CacheError::corrupt(origin, "missing protection header"));
        }

        let nonce = XNonce::from_slice(&envelope[ENVELOPE_MAGIC.len()..header]);
        self.cipher()?
            .decrypt(
                nonce,
                Payload {
                    msg: &envelope[header..],
                    aad: self.principal.as_str().as_bytes(),
                },
            )
            .map_err(|_| {
                CacheError::corrupt(
                    origin,
                    format!(
                        "decryption failed (tampered, or sealed for a principal other than {})",
                        self.principal
                    ),
                )
            })
    }

    fn cipher(&self) -> CacheResult<XChaCha20Poly1305> {
        XChaCha20Poly1305::new_from_slice(&self.key.0)
            .map_err(|_| CacheError::Internal("invalid protection key length".into()))
    }
}

/// Read the per-user secret, generating it on first use
fn load_or_create_secret(path: &Path) -> CacheResult<[u8; KEY_SIZE]> {
    match fs::read(path) {
        Ok(bytes) => secret_from_bytes(path, bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => create_secret(path),
        Err(e) => Err(CacheError::KeyUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn secret_from_bytes(path: &Path, mut bytes: Vec<u8>) -> CacheResult<[u8; KEY_SIZE]> {
    let secret = <[u8; KEY_SIZE]>::try_from(bytes.as_slice()).map_err(|_| {
        CacheError::KeyUnavailable {
            path: path.to_path_buf(),
            reason: format!("expected {} bytes, found {}", KEY_SIZE, bytes.len()),
        }
    });
    bytes.zeroize();
    secret
}

fn create_secret(path: &Path) -> CacheResult<[u8; KEY_SIZE]> {
    if let Some(parent) = path.parent() {
        super::file::create_private_dir(parent)?;
    }

    let mut secret = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut secret);

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    match options.open(path) {
        Ok(mut file) => {
            file.write_all(&secret)
                .and_then(|()| file.sync_all())
                .map_err(|e| CacheError::io(format!("writing key file {}", path.display()), e))?;
            info!("Created protection key {}", path.display());
            Ok(secret)
        }
        // Another thread or process created it first; use theirs
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            secret.zeroize();
            debug!("Protection key {} appeared concurrently", path.display());
            let bytes = fs::read(path).map_err(|e| CacheError::KeyUnavailable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            secret_from_bytes(path, bytes)
        }
        Err(e) => Err(CacheError::KeyUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn protector(principal: &str) -> DataProtector {
        DataProtector::from_secret(&[0x42; KEY_SIZE], Principal::named(principal)).unwrap()
    }

    #[test]
    fn protect_unprotect_roundtrip() {
        let p = protector("uid:1000");
        let sealed = p.protect(b"refresh-token-material").unwrap();

        assert_eq!(&sealed[..4], ENVELOPE_MAGIC);
        assert_eq!(sealed.len(), 4 + NONCE_SIZE + 22 + TAG_SIZE);
        assert!(!sealed.windows(7).any(|w| w == b"refresh"));

        let opened = p.unprotect(&sealed, Path::new("cache.bin")).unwrap();
        assert_eq!(opened, b"refresh-token-material");
    }

    #[test]
    fn nonces_differ_between_writes() {
        let p = protector("uid:1000");
        assert_ne!(p.protect(b"same").unwrap(), p.protect(b"same").unwrap());
    }

    #[test]
    fn other_principal_cannot_open() {
        let sealed = protector("uid:1000").protect(b"secret").unwrap();
        let err = protector("uid:1001")
            .unprotect(&sealed, Path::new("cache.bin"))
            .unwrap_err();
        assert!(matches!(err, CacheError::CorruptCache { .. }));
    }

    #[test]
    fn tampered_envelope_is_corrupt() {
        let p = protector("uid:1000");
        let mut sealed = p.protect(b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;

        let err = p.unprotect(&sealed, Path::new("x.bin")).unwrap_err();
        assert!(matches!(err, CacheError::CorruptCache { path, .. } if path == PathBuf::from("x.bin")));
    }

    #[test]
    fn plaintext_file_is_corrupt() {
        let p = protector("uid:1000");
        let err = p
            .unprotect(b"{\"AccessToken\":{}} plus padding bytes", Path::new("x.bin"))
            .unwrap_err();
        assert!(err.to_string().contains("missing protection header"));
    }

    #[test]
    fn key_file_created_once_and_reused() {
        let dir = TempDir::new().unwrap();
        let key_file = dir.path().join("keys").join("protection.key");

        let first = DataProtector::for_current_user(&key_file).unwrap();
        assert_eq!(fs::read(&key_file).unwrap().len(), KEY_SIZE);

        let second = DataProtector::for_current_user(&key_file).unwrap();
        assert_eq!(first.fingerprint(), second.fingerprint());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&key_file).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn short_key_file_rejected() {
        let dir = TempDir::new().unwrap();
        let key_file = dir.path().join("protection.key");
        fs::write(&key_file, b"short").unwrap();

        let err = DataProtector::for_current_user(&key_file).unwrap_err();
        assert!(matches!(err, CacheError::KeyUnavailable { .. }));
    }

    #[test]
    fn debug_redacts_key() {
        let text = format!("{:?}", protector("uid:7"));
        assert!(text.contains("REDACTED"));
        assert!(text.contains("uid:7"));
    }
}
