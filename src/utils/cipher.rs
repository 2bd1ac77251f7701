use aes_gcm_siv::{
    Aes256GcmSiv, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};

/// AES-GCM-SIV nonce size in bytes.
const NONCE_LEN: usize = 12;

#[derive(thiserror::Error, Debug)]
pub enum CipherError {
    #[error("Base64 decoding error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
    #[error("Cipher secret must decode to 32 bytes")]
    KeyInvalidLength,
    #[error("ciphertext is shorter than its nonce")]
    Truncated,
    #[error("unable to encrypt value")]
    Encrypt,
    #[error("unable to decrypt value")]
    Decrypt,
    #[error("decrypted value is not a valid amount: {0}")]
    InvalidAmount(String),
}

/// Encrypts salary amounts for storage in the payroll tables.
///
/// Stored form: `base64(nonce || ciphertext)` of the amount rendered with two
/// decimals.
#[derive(Clone)]
pub struct SalaryCipher {
    cipher: Aes256GcmSiv,
}

impl SalaryCipher {
    pub fn from_secret(secret: &str) -> Result<Self, CipherError> {
        let key = STANDARD_NO_PAD.decode(secret.trim().as_bytes())?;
        let cipher =
            Aes256GcmSiv::new_from_slice(&key).map_err(|_| CipherError::KeyInvalidLength)?;
        Ok(Self { cipher })
    }

    pub fn encrypt_amount(&self, amount: f64) -> Result<String, CipherError> {
        let nonce = Aes256GcmSiv::generate_nonce(&mut OsRng);
        let plaintext = format!("{amount:.2}");
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD_NO_PAD.encode(out))
    }

    pub fn decrypt_amount(&self, stored: &str) -> Result<f64, CipherError> {
        let raw = STANDARD_NO_PAD.decode(stored.as_bytes())?;
        if raw.len() <= NONCE_LEN {
            return Err(CipherError::Truncated);
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::Decrypt)?;

        let text = String::from_utf8(plaintext)
            .map_err(|e| CipherError::InvalidAmount(e.to_string()))?;
        text.parse::<f64>()
            .map_err(|_| CipherError::InvalidAmount(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(byte: u8) -> String {
        STANDARD_NO_PAD.encode([byte; 32])
    }

    #[test]
    fn encrypts_and_decrypts_amounts() {
        let cipher = SalaryCipher::from_secret(&secret(7)).unwrap();
        let stored = cipher.encrypt_amount(12_345.678).unwrap();

        assert_ne!(stored, "12345.68");
        assert_eq!(cipher.decrypt_amount(&stored).unwrap(), 12_345.68);
    }

    #[test]
    fn same_amount_encrypts_differently_each_time() {
        let cipher = SalaryCipher::from_secret(&secret(7)).unwrap();
        let a = cipher.encrypt_amount(500.0).unwrap();
        let b = cipher.encrypt_amount(500.0).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let cipher = SalaryCipher::from_secret(&secret(7)).unwrap();
        let stored = cipher.encrypt_amount(900.0).unwrap();
        let mut raw = STANDARD_NO_PAD.decode(stored.as_bytes()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = STANDARD_NO_PAD.encode(raw);

        assert!(matches!(
            cipher.decrypt_amount(&tampered),
            Err(CipherError::Decrypt)
        ));
    }

    #[test]
    fn wrong_key_cannot_decrypt() {
        let stored = SalaryCipher::from_secret(&secret(1))
            .unwrap()
            .encrypt_amount(42.0)
            .unwrap();
        let other = SalaryCipher::from_secret(&secret(2)).unwrap();
        assert!(other.decrypt_amount(&stored).is_err());
    }

    #[test]
    fn short_keys_are_rejected() {
        let short = STANDARD_NO_PAD.encode([1u8; 16]);
        assert!(matches!(
            SalaryCipher::from_secret(&short),
            Err(CipherError::KeyInvalidLength)
        ));
    }

    #[test]
    fn truncated_values_are_rejected() {
        let cipher = SalaryCipher::from_secret(&secret(7)).unwrap();
        let short = STANDARD_NO_PAD.encode([0u8; 8]);
        assert!(matches!(
            cipher.decrypt_amount(&short),
            Err(CipherError::Truncated)
        ));
    }
}
