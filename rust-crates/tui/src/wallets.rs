use alloy::signers::local::{
    MnemonicBuilder,
    PrivateKeySigner,
    coins_bip39::English,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use eth_keystore::decrypt_key;
use rpassword::prompt_password;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

const KEYSTORE_EXTENSION: &str = "json";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_wallet_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".proof-of-tap").join("keystores"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => Ok(PathBuf::from(shellexpand::tilde(raw).into_owned())),
        None => default_wallet_dir(),
    }
}

/// Encrypted keystore files (`<name>.json`) in `dir`, sorted by name.
pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read keystore directory")? {
        let path = entry.wrap_err("Failed to read keystore entry")?.path();
        if !path.is_file()
            || path.extension().and_then(|ext| ext.to_str()) != Some(KEYSTORE_EXTENSION)
        {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| eyre!("Invalid keystore filename {:?}", path))?
            .to_owned();
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor> {
    list_wallets(dir)?
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| eyre!("Keystore '{name}' not found in {}", dir.to_string_lossy()))
}

pub fn unlock_wallet(descriptor: &WalletDescriptor) -> Result<PrivateKeySigner> {
    let prompt = format!("Enter password for keystore '{}': ", descriptor.name);
    let password = prompt_password(prompt).wrap_err("Failed to read keystore password")?;
    unlock_with_password(descriptor, &password)
}

pub fn unlock_with_password(
    descriptor: &WalletDescriptor,
    password: &str,
) -> Result<PrivateKeySigner> {
    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| eyre!("Invalid password for keystore '{}'", descriptor.name))?;
    signer_from_secret(&secret)
        .wrap_err_with(|| format!("Keystore '{}' holds unusable key material", descriptor.name))
}

/// A raw 32-byte key, or a BIP-39 phrase derived at index 0.
pub fn signer_from_secret(secret: &[u8]) -> Result<PrivateKeySigner> {
    if secret.len() == 32 {
        return PrivateKeySigner::from_slice(secret).wrap_err("Invalid secp256k1 key");
    }
    let phrase = std::str::from_utf8(secret).wrap_err("Key material is neither a key nor UTF-8")?;
    if phrase.split_whitespace().count() < 12 {
        return Err(eyre!("Key material is neither a 32-byte key nor a mnemonic"));
    }
    MnemonicBuilder::<English>::default()
        .phrase(phrase.trim())
        .index(0)
        .wrap_err("Invalid derivation index")?
        .build()
        .wrap_err("Failed to derive key from mnemonic")
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use alloy::primitives::address;

    const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

    #[test]
    fn list_wallets__only_json_sorted() {
        // given
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("zed.json"), "{}").unwrap();
        fs::write(dir.path().join("alice.json"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        // when
        let wallets = list_wallets(dir.path()).unwrap();

        // then
        let names: Vec<_> = wallets.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, ["alice", "zed"]);
    }

    #[test]
    fn list_wallets__missing_dir_is_empty() {
        let wallets = list_wallets(Path::new("/definitely/not/here")).unwrap();

        assert!(wallets.is_empty());
    }

    #[test]
    fn find_wallet__reports_missing_name() {
        let dir = tempfile::tempdir().unwrap();

        let err = find_wallet(dir.path(), "ghost").unwrap_err();

        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn signer_from_secret__raw_key() {
        let mut key = [0u8; 32];
        key[31] = 1;

        let signer = signer_from_secret(&key).unwrap();

        assert_eq!(
            signer.address(),
            address!("0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf")
        );
    }

    #[test]
    fn signer_from_secret__mnemonic() {
        let signer = signer_from_secret(TEST_MNEMONIC.as_bytes()).unwrap();

        assert_eq!(
            signer.address(),
            address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );
    }

    #[test]
    fn signer_from_secret__rejects_short_text() {
        assert!(signer_from_secret(b"hello world").is_err());
    }
}
