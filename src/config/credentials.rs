//! Project id discovery from ambient credentials.
//!
//! Only service-account key files carry a project id; user credentials
//! and other credential types are skipped.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Where the configured project id came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectSource {
    Environment,
    ServiceAccount(PathBuf),
    Default,
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(rename = "type")]
    kind: String,
    project_id: Option<String>,
}

/// Read the project id out of a service-account credentials file.
///
/// Returns `Ok(None)` for credentials that are not a service account or
/// that name no project.
pub fn service_account_project(path: &Path) -> Result<Option<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("cannot read credentials {}: {e}", path.display()))
    })?;
    let creds: CredentialsFile = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("bad credentials file {}: {e}", path.display()))
    })?;

    if creds.kind != "service_account" {
        return Ok(None);
    }
    Ok(creds.project_id.filter(|p| !p.is_empty()))
}
