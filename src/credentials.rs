use anyhow::{bail, Result};
use std::fs;
use std::path::{Path, PathBuf};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;

const NONCE_LENGTH: usize = 12;

/// Account password kept AES-256-GCM encrypted on disk.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    key_path: PathBuf,
    password_path: PathBuf,
}

impl CredentialStore {
    pub fn new(key_path: &Path, password_path: &Path) -> Self {
        CredentialStore {
            key_path: key_path.to_path_buf(),
            password_path: password_path.to_path_buf(),
        }
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        let key = if self.key_path.exists() {
            // Read existing key
            let key_bytes = fs::read(&self.key_path)?;
            Aes256Gcm::new_from_slice(&key_bytes)
                .map_err(|e| anyhow::anyhow!("Failed to create cipher from key: {}", e))?
        } else {
            // Generate new key
            let mut key_bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut key_bytes);
            fs::write(&self.key_path, key_bytes)?;
            Aes256Gcm::new_from_slice(&key_bytes)
                .map_err(|e| anyhow::anyhow!("Failed to create cipher from new key: {}", e))?
        };
        Ok(key)
    }

    pub fn encrypt_password(&self, password: &str) -> Result<String> {
        let cipher = self.cipher()?;
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher.encrypt(nonce, password.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to encrypt password: {}", e))?;

        let mut combined = Vec::new();
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&combined))
    }

    pub fn decrypt_password(&self, encrypted: &str) -> Result<String> {
        let cipher = self.cipher()?;
        let combined = BASE64.decode(encrypted.trim())
            .map_err(|e| anyhow::anyhow!("Failed to decode base64: {}", e))?;
        if combined.len() <= NONCE_LENGTH {
            bail!("Stored password is truncated");
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LENGTH);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher.decrypt(nonce, ciphertext)
            .map_err(|e| anyhow::anyhow!("Failed to decrypt password: {}", e))?;

        String::from_utf8(plaintext)
            .map_err(|e| anyhow::anyhow!("Failed to convert decrypted bytes to string: {}", e))
    }

    pub fn store_password(&self, password: &str) -> Result<()> {
        let encrypted = self.encrypt_password(password)?;
        fs::write(&self.password_path, encrypted)?;
        Ok(())
    }

    /// The stored password, prompting for it (and storing it) on first use.
    pub fn password(&self) -> Result<String> {
        if self.password_path.exists() {
            // Read and decrypt stored password
            let encrypted = fs::read_to_string(&self.password_path)?;
            self.decrypt_password(&encrypted)
        } else {
            // Get new password and store it
            let password = rpassword::prompt_password("Enter your password: ")?;
            self.store_password(&password)?;
            Ok(password)
        }
    }
}
