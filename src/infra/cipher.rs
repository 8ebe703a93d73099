//! 密钥加密能力
//!
//! Secret 清单里的 DB_PASSWORD / APP_KEY / API_SECRET 在写入前经过加密。
//! 生成器要求同样的输入得到同样的输出，所以 nonce 由密钥和明文派生，
//! 而不是随机生成。

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

/// 密钥长度（256 bits）
pub const KEY_SIZE: usize = 32;
/// GCM nonce 长度（96 bits）
pub const NONCE_SIZE: usize = 12;

/// 加解密错误
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),
}

/// 字符串级别的对称加密
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;
    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
}

/// AES-256-GCM，输出 base64(nonce || ciphertext || tag)
pub struct AesGcmCipher {
    key: [u8; KEY_SIZE],
}

impl AesGcmCipher {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// 由口令派生密钥（SHA-256）
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest);
        Self::new(key)
    }

    fn derive_nonce(&self, plaintext: &[u8]) -> [u8; NONCE_SIZE] {
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(plaintext);
        let digest = hasher.finalize();
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&digest[..NONCE_SIZE]);
        nonce
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
    }
}

impl SecretCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let nonce_bytes = self.derive_nonce(plaintext.as_bytes());
        let sealed = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CipherError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let raw = STANDARD
            .decode(ciphertext)
            .map_err(|e| CipherError::InvalidCiphertext(e.to_string()))?;
        if raw.len() <= NONCE_SIZE {
            return Err(CipherError::InvalidCiphertext("too short".to_string()));
        }

        let (nonce, sealed) = raw.split_at(NONCE_SIZE);
        let plain = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CipherError::DecryptionFailed)?;
        String::from_utf8(plain).map_err(|e| CipherError::InvalidCiphertext(e.to_string()))
    }
}

/// 不加密，仅用于开发环境
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainCipher;

impl SecretCipher for PlainCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        Ok(plaintext.to_string())
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        Ok(ciphertext.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_is_deterministic() {
        let cipher = AesGcmCipher::from_passphrase("cluster-secret");
        let a = cipher.encrypt("s3cret").unwrap();
        let b = cipher.encrypt("s3cret").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, "s3cret");
        assert_eq!(cipher.decrypt(&a).unwrap(), "s3cret");
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = AesGcmCipher::from_passphrase("one").encrypt("value").unwrap();
        let result = AesGcmCipher::from_passphrase("two").decrypt(&sealed);

        assert!(matches!(result, Err(CipherError::DecryptionFailed)));
    }

    #[test]
    fn test_garbage_ciphertext() {
        let cipher = AesGcmCipher::from_passphrase("k");
        assert!(matches!(
            cipher.decrypt("not base64!"),
            Err(CipherError::InvalidCiphertext(_))
        ));
        assert!(matches!(
            cipher.decrypt("AAAA"),
            Err(CipherError::InvalidCiphertext(_))
        ));
    }
}
