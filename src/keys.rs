//! SSH public key sources and installation.
//!
//! Key specs come in four flavors: `github:NAME`, `gitlab:NAME`, `url:URL`
//! and `file:PATH`. The HTTP flavors resolve through the [`KeyFetcher`]
//! trait; the blocking reqwest implementation carries a hard 10 second
//! timeout and is the only place in the crate that touches the network.
//! Installation appends to `<home>/.ssh/authorized_keys`, skipping keys that
//! are already present.

use std::fmt;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{IniqError, Result};

/// Hard timeout for key fetches.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Key types accepted in authorized_keys lines.
const KEY_ALGORITHMS: &[&str] = &[
    "ssh-ed25519",
    "ssh-rsa",
    "ssh-dss",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
    "sk-ssh-ed25519@openssh.com",
    "sk-ecdsa-sha2-nistp256@openssh.com",
];

/// One parsed public key record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub algorithm: String,
    pub key: String,
    pub comment: Option<String>,
}

impl PublicKey {
    /// Parse a single authorized_keys-format line. Lines that are empty,
    /// comments, or not a recognized key format return `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let mut parts = line.split_whitespace();
        let algorithm = parts.next()?;
        if !KEY_ALGORITHMS.contains(&algorithm) {
            return None;
        }
        let key = parts.next()?;
        let comment: Vec<&str> = parts.collect();
        Some(Self {
            algorithm: algorithm.to_string(),
            key: key.to_string(),
            comment: if comment.is_empty() {
                None
            } else {
                Some(comment.join(" "))
            },
        })
    }

    /// Parse every key line in a blob (e.g., a `.keys` endpoint response).
    pub fn parse_many(text: &str) -> Vec<Self> {
        text.lines().filter_map(Self::parse).collect()
    }

    /// Identity for dedupe: algorithm + key material, ignoring comments.
    pub fn identity(&self) -> (&str, &str) {
        (&self.algorithm, &self.key)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.comment {
            Some(c) => write!(f, "{} {} {}", self.algorithm, self.key, c),
            None => write!(f, "{} {}", self.algorithm, self.key),
        }
    }
}

/// Where one `--key` argument gets its keys from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySpec {
    Github(String),
    Gitlab(String),
    Url(String),
    File(PathBuf),
}

impl KeySpec {
    /// Parse a prefixed spec string.
    pub fn parse(raw: &str) -> Result<Self> {
        if let Some(name) = raw.strip_prefix("github:") {
            if name.is_empty() {
                return Err(IniqError::validation("empty github username in key spec"));
            }
            Ok(Self::Github(name.to_string()))
        } else if let Some(name) = raw.strip_prefix("gitlab:") {
            if name.is_empty() {
                return Err(IniqError::validation("empty gitlab username in key spec"));
            }
            Ok(Self::Gitlab(name.to_string()))
        } else if let Some(url) = raw.strip_prefix("url:") {
            Ok(Self::Url(url.to_string()))
        } else if let Some(path) = raw.strip_prefix("file:") {
            Ok(Self::File(PathBuf::from(path)))
        } else {
            Err(IniqError::validation(format!(
                "invalid key spec {:?}: expected github:NAME, gitlab:NAME, url:URL or file:PATH",
                raw
            )))
        }
    }

    /// The HTTP endpoint for network-backed specs.
    pub fn fetch_url(&self) -> Option<String> {
        match self {
            Self::Github(name) => Some(format!("https://github.com/{}.keys", name)),
            Self::Gitlab(name) => Some(format!("https://gitlab.com/{}.keys", name)),
            Self::Url(url) => Some(url.clone()),
            Self::File(_) => None,
        }
    }

    /// Resolve this spec into key records.
    pub fn resolve(&self, fetcher: &dyn KeyFetcher) -> Result<Vec<PublicKey>> {
        let keys = match (self, self.fetch_url()) {
            (Self::File(path), _) => {
                let text = fs::read_to_string(path)?;
                PublicKey::parse_many(&text)
            }
            (_, Some(url)) => fetcher.fetch_keys(&url)?,
            (_, None) => Vec::new(),
        };
        if keys.is_empty() {
            return Err(IniqError::validation(format!(
                "key source {:?} yielded no usable keys",
                self
            )));
        }
        Ok(keys)
    }
}

/// Network seam for key fetching. Tests inject a canned implementation.
pub trait KeyFetcher {
    fn fetch_keys(&self, url: &str) -> Result<Vec<PublicKey>>;
}

/// Blocking HTTP fetcher with a hard 10s timeout.
pub struct HttpKeyFetcher {
    client: reqwest::blocking::Client,
}

impl HttpKeyFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("iniq/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IniqError::system(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl KeyFetcher for HttpKeyFetcher {
    fn fetch_keys(&self, url: &str) -> Result<Vec<PublicKey>> {
        debug!(url, "fetching keys");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| IniqError::transient(format!("fetching {}: {}", url, e)))?;

        let status = response.status();
        if status.is_client_error() {
            // A 404 means the account does not exist; retrying will not help.
            return Err(IniqError::validation(format!(
                "{} returned {}; check the account name",
                url, status
            )));
        }
        if !status.is_success() {
            return Err(IniqError::transient(format!(
                "{} returned {}",
                url, status
            )));
        }

        let body = response
            .text()
            .map_err(|e| IniqError::transient(format!("reading {}: {}", url, e)))?;
        Ok(PublicKey::parse_many(&body))
    }
}

/// Resolve all raw spec strings into a deduplicated key list.
pub fn resolve_key_specs(raw_specs: &[String], fetcher: &dyn KeyFetcher) -> Result<Vec<PublicKey>> {
    let mut keys: Vec<PublicKey> = Vec::new();
    for raw in raw_specs {
        let spec = KeySpec::parse(raw)?;
        for key in spec.resolve(fetcher)? {
            if !keys.iter().any(|k| k.identity() == key.identity()) {
                keys.push(key);
            }
        }
    }
    Ok(keys)
}

/// Path of the authorized_keys file inside a home directory.
pub fn authorized_keys_path(home: &Path) -> PathBuf {
    home.join(".ssh").join("authorized_keys")
}

/// Keys currently installed for a user. Missing file means none.
pub fn installed_keys(home: &Path) -> Vec<PublicKey> {
    fs::read_to_string(authorized_keys_path(home))
        .map(|text| PublicKey::parse_many(&text))
        .unwrap_or_default()
}

/// Append `keys` to the user's authorized_keys, creating `.ssh` (0700) and
/// the file (0600) as needed and chowning both when an owner is given.
/// Already-present keys are skipped. Returns how many keys were added.
pub fn install_keys(
    home: &Path,
    owner: Option<(nix::unistd::Uid, nix::unistd::Gid)>,
    keys: &[PublicKey],
) -> Result<usize> {
    let ssh_dir = home.join(".ssh");
    let path = authorized_keys_path(home);
    let existing = installed_keys(home);

    let fresh: Vec<&PublicKey> = keys
        .iter()
        .filter(|k| !existing.iter().any(|e| e.identity() == k.identity()))
        .collect();
    if fresh.is_empty() {
        info!(path = %path.display(), "all keys already installed");
        return Ok(0);
    }

    if !ssh_dir.exists() {
        fs::create_dir(&ssh_dir)?;
    }
    fs::set_permissions(&ssh_dir, fs::Permissions::from_mode(0o700))?;

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    for key in &fresh {
        writeln!(file, "{}", key)?;
    }
    drop(file);
    fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;

    if let Some((uid, gid)) = owner {
        nix::unistd::chown(&ssh_dir, Some(uid), Some(gid))
            .map_err(|e| IniqError::system(format!("chown {}: {}", ssh_dir.display(), e)))?;
        nix::unistd::chown(&path, Some(uid), Some(gid))
            .map_err(|e| IniqError::system(format!("chown {}: {}", path.display(), e)))?;
    }

    info!(path = %path.display(), added = fresh.len(), "installed authorized keys");
    Ok(fresh.len())
}
