use std::path::PathBuf;
use std::process::Command;

use crate::error::OpsError;

pub const TOKEN_ENV_VARS: &[&str] = &["TERRA_OPS_TOKEN", "GOOGLE_OAUTH_ACCESS_TOKEN"];

pub trait TokenSource {
    fn access_token(&self) -> Result<String, OpsError>;
}

#[derive(Debug, Clone, Default)]
pub struct EnvTokenSource;

impl TokenSource for EnvTokenSource {
    fn access_token(&self) -> Result<String, OpsError> {
        TOKEN_ENV_VARS
            .iter()
            .filter_map(|key| std::env::var(key).ok())
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
            .ok_or_else(|| OpsError::Auth(format!("none of {} is set", TOKEN_ENV_VARS.join(", "))))
    }
}

#[derive(Debug, Clone)]
pub struct GcloudTokenSource {
    gcloud: Option<PathBuf>,
}

impl GcloudTokenSource {
    pub fn new() -> Self {
        Self {
            gcloud: find_in_path("gcloud"),
        }
    }
}

impl Default for GcloudTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenSource for GcloudTokenSource {
    fn access_token(&self) -> Result<String, OpsError> {
        let gcloud = self
            .gcloud
            .as_ref()
            .ok_or_else(|| OpsError::MissingTool("gcloud".to_string()))?;
        let output = Command::new(gcloud)
            .args(["auth", "print-access-token"])
            .output()
            .map_err(|err| OpsError::Auth(err.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(OpsError::Auth(if stderr.is_empty() {
                "gcloud auth print-access-token failed".to_string()
            } else {
                stderr
            }));
        }
        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(OpsError::Auth("gcloud returned an empty token".to_string()));
        }
        Ok(token)
    }
}

/// Environment first, then gcloud.
pub fn default_token() -> Result<String, OpsError> {
    match EnvTokenSource.access_token() {
        Ok(token) => Ok(token),
        Err(_) => GcloudTokenSource::new().access_token(),
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let cmd = path.join(format!("{name}.cmd"));
        if cmd.exists() {
            return Some(cmd);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
