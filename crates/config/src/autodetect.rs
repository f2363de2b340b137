//! Helpers to discover local Bitcoin Core RPC credentials

use crate::{CollectorConfig, ConfigError, ConfigResult};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// System-wide `bitcoin.conf` locations checked after the datadir
pub const BITCOIN_CONF_LOCATIONS: &[&str] = &["/etc/bitcoin/bitcoin.conf"];

/// Username/password pair for RPC basic auth
#[derive(Clone, PartialEq, Eq)]
pub struct RpcCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for RpcCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Returns `<datadir>/.cookie` when it exists.
pub fn find_cookie(datadir: Option<&Path>) -> Option<PathBuf> {
    let path = datadir?.join(".cookie");
    path.exists().then_some(path)
}

/// Reads a cookie file and splits it into credentials.
pub fn read_cookie(path: &Path) -> ConfigResult<RpcCredentials> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let (username, password) =
        raw.trim()
            .split_once(':')
            .ok_or_else(|| ConfigError::MalformedCookie {
                path: path.to_path_buf(),
            })?;
    Ok(RpcCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Parses the first `bitcoin.conf` found in the datadir or system locations.
pub fn read_bitcoin_conf(datadir: Option<&Path>) -> HashMap<String, String> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(dir) = datadir {
        candidates.push(dir.join("bitcoin.conf"));
    }
    candidates.extend(BITCOIN_CONF_LOCATIONS.iter().map(PathBuf::from));

    candidates
        .into_iter()
        .find(|candidate| candidate.exists())
        .and_then(|candidate| fs::read_to_string(candidate).ok())
        .map(|contents| parse_conf(&contents))
        .unwrap_or_default()
}

fn parse_conf(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Resolves RPC credentials in priority order.
///
/// Explicit user/password, then the explicit cookie file, then the datadir
/// cookie, then `rpcuser`/`rpcpassword` from `bitcoin.conf`. A malformed
/// cookie is an error because the node would reject every call.
pub fn detect_rpc_credentials(config: &CollectorConfig) -> ConfigResult<Option<RpcCredentials>> {
    let bitcoin = &config.bitcoin;
    if !bitcoin.rpc_user.is_empty() || !bitcoin.rpc_password.is_empty() {
        return Ok(Some(RpcCredentials {
            username: bitcoin.rpc_user.clone(),
            password: bitcoin.rpc_password.clone(),
        }));
    }

    if let Some(cookie) = config.cookie_path() {
        debug!(path = %cookie.display(), "using explicit rpc cookie");
        return read_cookie(&cookie).map(Some);
    }

    if let Some(cookie) = find_cookie(bitcoin.datadir.as_deref()) {
        debug!(path = %cookie.display(), "using datadir rpc cookie");
        return read_cookie(&cookie).map(Some);
    }

    let conf = read_bitcoin_conf(bitcoin.datadir.as_deref());
    match (conf.get("rpcuser"), conf.get("rpcpassword")) {
        (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
            debug!("using rpcuser from bitcoin.conf");
            Ok(Some(RpcCredentials {
                username: user.clone(),
                password: password.clone(),
            }))
        }
        _ => Ok(None),
    }
}
