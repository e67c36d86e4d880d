// Keystore module - keeps the ledger signing key encrypted with age

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use age::secrecy::SecretString;
use anyhow::{Context, Result};
use ed25519_dalek::SigningKey;

const SECRET_FILE: &str = "secret.age";
const ADDRESS_FILE: &str = "address.txt";

/// Encrypts private key bytes with a passphrase using age encryption.
pub fn encrypt_key(key_bytes: &[u8], passphrase: &str) -> Result<Vec<u8>> {
    let encryptor = age::Encryptor::with_user_passphrase(SecretString::from(passphrase.to_string()));

    let mut encrypted = vec![];
    let mut writer = encryptor
        .wrap_output(&mut encrypted)
        .context("Failed to create age encryptor")?;

    writer
        .write_all(key_bytes)
        .context("Failed to write key bytes to encryptor")?;

    writer
        .finish()
        .context("Failed to finalize encryption")?;

    Ok(encrypted)
}

/// Decrypts bytes produced by [`encrypt_key`].
pub fn decrypt_key(encrypted: &[u8], passphrase: &str) -> Result<Vec<u8>> {
    let decryptor = match age::Decryptor::new(encrypted).context("Failed to create age decryptor")? {
        age::Decryptor::Passphrase(d) => d,
        _ => anyhow::bail!("Wallet file is not passphrase-encrypted"),
    };

    let mut decrypted = vec![];
    let mut reader = decryptor
        .decrypt(&SecretString::from(passphrase.to_string()), None)
        .context("Wrong passphrase or corrupted wallet")?;
    reader
        .read_to_end(&mut decrypted)
        .context("Failed to read decrypted bytes")?;

    Ok(decrypted)
}

/// A wallet directory: the encrypted seed plus the plain address.
pub struct Keystore {
    dir: PathBuf,
}

impl Keystore {
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.certchain/wallet/`
    pub fn default_location() -> Result<Self> {
        #[cfg(unix)]
        let home = std::env::var("HOME").context("HOME environment variable not set")?;

        #[cfg(windows)]
        let home = std::env::var("USERPROFILE").context("USERPROFILE environment variable not set")?;

        Ok(Self::at(Path::new(&home).join(".certchain").join("wallet")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.join(SECRET_FILE).exists()
    }

    /// Writes a new wallet. Refuses to overwrite unless `force` is set.
    pub fn create(&self, passphrase: &str, force: bool) -> Result<String> {
        if self.exists() && !force {
            anyhow::bail!(
                "A wallet already exists in {}. Use --force to replace it.",
                self.dir.display()
            );
        }
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let (signing_key, verifying_key) = certchain_crypto::generate_keypair();
        let address = certchain_crypto::pubkey_to_address(&verifying_key);
        let encrypted = encrypt_key(&signing_key.to_bytes(), passphrase)?;

        let secret_path = self.dir.join(SECRET_FILE);
        std::fs::write(&secret_path, encrypted)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&secret_path, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::write(self.dir.join(ADDRESS_FILE), &address)?;

        Ok(address)
    }

    pub fn address(&self) -> Result<String> {
        let path = self.dir.join(ADDRESS_FILE);
        let address = std::fs::read_to_string(&path)
            .with_context(|| format!("No wallet found at {}. Run `certchain wallet new`.", self.dir.display()))?;
        Ok(address.trim().to_string())
    }

    pub fn signing_key(&self, passphrase: &str) -> Result<SigningKey> {
        let encrypted = std::fs::read(self.dir.join(SECRET_FILE))
            .with_context(|| format!("No wallet found at {}", self.dir.display()))?;
        let bytes = decrypt_key(&encrypted, passphrase)?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("Wallet seed has unexpected length {}", bytes.len()))?;
        Ok(SigningKey::from_bytes(&seed))
    }
}

/// Prompts twice and requires both entries to match.
pub fn prompt_new_passphrase() -> Result<String> {
    let first = rpassword::prompt_password("New wallet passphrase: ")?;
    if first.is_empty() {
        anyhow::bail!("Passphrase must not be empty");
    }
    let second = rpassword::prompt_password("Repeat passphrase: ")?;
    if first != second {
        anyhow::bail!("Passphrases do not match");
    }
    Ok(first)
}

pub fn prompt_passphrase() -> Result<String> {
    Ok(rpassword::prompt_password("Wallet passphrase: ")?)
}
