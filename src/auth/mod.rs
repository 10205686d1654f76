//! Authentication module (encrypted file-based credential storage)
//!
//! App passwords and cached sessions are stored encrypted with AES-256-GCM in
//! `~/.config/skyloft/credentials.enc`. The encryption key is derived from
//! machine-specific identifiers, so the file is useless when copied elsewhere.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use anyhow::{Context, Result, anyhow};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::Session;
use crate::models::Account;
use crate::paths;

const NONCE_SIZE: usize = 12;

/// Get machine ID for key derivation (cross-platform)
fn get_machine_id() -> String {
    #[cfg(target_os = "linux")]
    {
        for path in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
            if let Ok(id) = fs::read_to_string(path) {
                return id.trim().to_string();
            }
        }
    }

    // macOS: IOPlatformUUID via ioreg
    #[cfg(target_os = "macos")]
    {
        if let Ok(output) = std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
        {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if let Some(uuid) = stdout
                .lines()
                .find(|line| line.contains("IOPlatformUUID"))
                .and_then(|line| line.split('"').nth(3))
            {
                return uuid.to_string();
            }
        }
    }

    // Windows: MachineGuid from registry
    #[cfg(target_os = "windows")]
    {
        if let Ok(output) = std::process::Command::new("reg")
            .args(["query", r"HKLM\SOFTWARE\Microsoft\Cryptography", "/v", "MachineGuid"])
            .output()
        {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if let Some(guid) = stdout
                .lines()
                .find(|line| line.contains("MachineGuid"))
                .and_then(|line| line.split_whitespace().last())
            {
                return guid.to_string();
            }
        }
    }

    dirs::home_dir().map_or_else(|| "skyloft-fallback-key".to_string(), |p| p.to_string_lossy().to_string())
}

/// Derive encryption key from machine-specific data
fn derive_key() -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(get_machine_id().as_bytes());
    if let Some(home) = dirs::home_dir() {
        hasher.update(home.to_string_lossy().as_bytes());
    }
    hasher.update(b"skyloft-credentials-v1");
    hasher.finalize().into()
}

/// Encrypted key-value file
pub struct CredentialStore {
    path: PathBuf,
    key: [u8; 32],
}

impl CredentialStore {
    /// Store at the default location with the machine key
    pub fn open() -> Result<Self> {
        Ok(Self::at(paths::credentials_path()?, derive_key()))
    }

    /// Store at `path` encrypted with `key`
    pub fn at(path: impl Into<PathBuf>, key: [u8; 32]) -> Self {
        Self { path: path.into(), key }
    }

    /// Location of the encrypted file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|_| anyhow!("Invalid key length"))
    }

    fn load(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let encrypted = fs::read(&self.path).context("Failed to read credentials file")?;
        if encrypted.len() < NONCE_SIZE {
            return Ok(HashMap::new());
        }

        let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| anyhow!("Failed to decrypt credentials"))?;

        serde_json::from_slice(&plaintext).context("Corrupt credentials file")
    }

    fn save(&self, creds: &HashMap<String, String>) -> Result<()> {
        let json = serde_json::to_vec(creds)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill(&mut nonce_bytes);

        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(&nonce_bytes), json.as_slice())
            .map_err(|_| anyhow!("Failed to encrypt credentials"))?;

        let mut output = nonce_bytes.to_vec();
        output.extend(ciphertext);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        fs::write(&self.path, output).context("Failed to write credentials file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Read one value
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    /// Write one value
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut creds = self.load().unwrap_or_default();
        creds.insert(key.to_string(), value.to_string());
        self.save(&creds)
    }

    /// Remove one value
    pub fn remove(&self, key: &str) -> Result<()> {
        let mut creds = self.load().unwrap_or_default();
        if creds.remove(key).is_some() {
            self.save(&creds)?;
        }
        Ok(())
    }

    /// Store the app password of an account
    pub fn store_password(&self, account: &Account, app_password: &str) -> Result<()> {
        self.set(&account.keyring_key(), app_password)
    }

    /// App password of an account
    pub fn password(&self, account: &Account) -> Result<Option<String>> {
        self.get(&account.keyring_key())
    }

    /// Cache a session so the next start can skip `createSession`
    pub fn store_session(&self, account: &Account, session: &Session) -> Result<()> {
        let json = serde_json::to_string(session)?;
        self.set(&session_key(account), &json)
    }

    /// Cached session of an account
    pub fn session(&self, account: &Account) -> Result<Option<Session>> {
        let Some(json) = self.get(&session_key(account))? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&json).ok())
    }

    /// Forget everything stored for an account
    pub fn forget(&self, account: &Account) -> Result<()> {
        let mut creds = self.load().unwrap_or_default();
        creds.remove(&account.keyring_key());
        creds.remove(&session_key(account));
        self.save(&creds)
    }
}

fn session_key(account: &Account) -> String {
    format!("{}:session", account.keyring_key())
}

/// Store the app password for an account
pub fn store_credentials(account: &Account, app_password: &str) -> Result<()> {
    CredentialStore::open()?.store_password(account, app_password)
}

/// App password for an account
pub fn get_credentials(account: &Account) -> Result<Option<String>> {
    CredentialStore::open()?.password(account)
}

/// Delete everything stored for an account
pub fn delete_credentials(account: &Account) -> Result<()> {
    CredentialStore::open()?.forget(account)
}

/// Check if credentials exist for an account
pub fn has_credentials(account: &Account) -> bool {
    get_credentials(account).is_ok_and(|c| c.is_some())
}
