use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Somnia,
    Local,
}

impl DeploymentEnv {
    pub const ALL: [DeploymentEnv; 2] = [DeploymentEnv::Somnia, DeploymentEnv::Local];

    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Somnia => "somnia",
            DeploymentEnv::Local => "local",
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Somnia => "Somnia Testnet",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

/// Latest known TapGem deployment for one network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployed_at: String,
    pub network_url: String,
    pub chain_id: u64,
    pub tapgem_address: String,
    pub bytecode_hash: String,
    #[serde(default)]
    pub vault_address: Option<String>,
    #[serde(default)]
    pub vault_bytecode_hash: Option<String>,
    #[serde(default)]
    pub stt_token_address: Option<String>,
}

impl DeploymentRecord {
    pub fn new(
        network_url: impl Into<String>,
        chain_id: u64,
        tapgem_address: impl Into<String>,
        bytecode_hash: impl Into<String>,
    ) -> Self {
        Self {
            deployed_at: Utc::now().to_rfc3339(),
            network_url: network_url.into(),
            chain_id,
            tapgem_address: tapgem_address.into(),
            bytecode_hash: bytecode_hash.into(),
            vault_address: None,
            vault_bytecode_hash: None,
            stt_token_address: None,
        }
    }

    pub fn is_compatible_with_hash(&self, hash: &str) -> bool {
        self.bytecode_hash == hash
    }
}

#[derive(Debug)]
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        Self::in_root(Path::new(DEPLOYMENTS_ROOT), env)
    }

    /// Store rooted somewhere other than `./.deployments`.
    pub fn in_root(root: &Path, env: DeploymentEnv) -> Result<Self> {
        let path = ensure_store(root, env)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<DeploymentRecord>> {
        read_record(&self.path)
    }

    pub fn save(&self, record: &DeploymentRecord) -> Result<()> {
        write_record(&self.path, record)
    }

    pub fn latest(&self) -> Result<DeploymentRecord> {
        self.load()
            .context("loading deployment record")?
            .ok_or_else(|| anyhow!("no deployment recorded in {}", self.path.display()))
    }
}

pub fn compute_bytecode_hash(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| {
        format!(
            "Failed to read contract artifact for hashing: {}",
            path.display()
        )
    })?;
    Ok(hash_bytes(&bytes))
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn ensure_structure() -> Result<()> {
    for env in DeploymentEnv::ALL {
        let _ = ensure_store(Path::new(DEPLOYMENTS_ROOT), env)?;
    }
    Ok(())
}

fn ensure_store(root: &Path, env: DeploymentEnv) -> Result<PathBuf> {
    let env_dir = root.join(env.dir_name());
    fs::create_dir_all(&env_dir).with_context(|| {
        format!("Failed to create deployment directory {}", env_dir.display())
    })?;

    let file_path = env_dir.join(DEPLOYMENTS_FILE);
    if !file_path.exists() {
        fs::write(&file_path, b"").with_context(|| {
            format!(
                "Failed to create deployment record file for {} at {:?}",
                env, file_path
            )
        })?;
    }

    Ok(file_path)
}

fn read_record(path: impl AsRef<Path>) -> Result<Option<DeploymentRecord>> {
    let data = fs::read(path.as_ref()).context("Failed to read deployment records")?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    if let Ok(record) = serde_json::from_slice::<DeploymentRecord>(&data) {
        return Ok(Some(record));
    }
    if let Ok(mut records) = serde_json::from_slice::<Vec<DeploymentRecord>>(&data) {
        return Ok(records.pop());
    }
    Err(anyhow!(
        "Failed to parse deployment record JSON; expected a single deployment object"
    ))
}

fn write_record(path: impl AsRef<Path>, record: &DeploymentRecord) -> Result<()> {
    let json = serde_json::to_vec_pretty(record)
        .context("Failed to serialize deployment record")?;
    fs::write(path.as_ref(), json).context("Failed to write deployment record")?;
    Ok(())
}

/// Records a fresh TapGem deployment, replacing whatever was stored for `env`.
pub fn record_deployment(
    env: DeploymentEnv,
    network_url: impl AsRef<str>,
    chain_id: u64,
    tapgem_address: impl AsRef<str>,
    bytecode_hash: impl AsRef<str>,
) -> Result<DeploymentRecord> {
    let store = DeploymentStore::new(env)?;
    let record = DeploymentRecord::new(
        network_url.as_ref(),
        chain_id,
        tapgem_address.as_ref(),
        bytecode_hash.as_ref(),
    );
    store.save(&record)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn load__returns_none_for_fresh_store() {
        // given
        let root = tempfile::tempdir().unwrap();
        let store = DeploymentStore::in_root(root.path(), DeploymentEnv::Local).unwrap();

        // when
        let loaded = store.load().unwrap();

        // then
        assert!(loaded.is_none());
        assert!(store.path().ends_with("local/deployments.json"));
    }

    #[test]
    fn save__round_trips_optional_vault_fields() {
        // given
        let root = tempfile::tempdir().unwrap();
        let store = DeploymentStore::in_root(root.path(), DeploymentEnv::Somnia).unwrap();
        let mut record = DeploymentRecord::new(
            "https://dream-rpc.somnia.network",
            50312,
            "0x00000000000000000000000000000000000000c0",
            "abc",
        );
        record.vault_address = Some("0x00000000000000000000000000000000000000d0".into());

        // when
        store.save(&record).unwrap();
        let loaded = store.latest().unwrap();

        // then
        assert_eq!(loaded, record);
    }

    #[test]
    fn load__accepts_legacy_list_and_takes_last() {
        // given
        let root = tempfile::tempdir().unwrap();
        let store = DeploymentStore::in_root(root.path(), DeploymentEnv::Local).unwrap();
        let json = r#"[
            {"deployed_at":"a","network_url":"u","chain_id":1,"tapgem_address":"0x1","bytecode_hash":"h1"},
            {"deployed_at":"b","network_url":"u","chain_id":1,"tapgem_address":"0x2","bytecode_hash":"h2"}
        ]"#;
        fs::write(store.path(), json).unwrap();

        // when
        let loaded = store.latest().unwrap();

        // then
        assert_eq!(loaded.tapgem_address, "0x2");
        assert_eq!(loaded.vault_address, None);
    }

    #[test]
    fn latest__errors_when_nothing_recorded() {
        let root = tempfile::tempdir().unwrap();
        let store = DeploymentStore::in_root(root.path(), DeploymentEnv::Local).unwrap();

        assert!(store.latest().is_err());
    }

    #[test]
    fn hash_bytes__is_hex_sha256() {
        let hash = hash_bytes(b"");

        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
