//! External-sync provenance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Source systems that can create folders through an automated import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "external_system_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExternalSystemType {
    /// Google Drive.
    GoogleDrive,
    /// Notion.
    Notion,
    /// Atlassian Confluence.
    Confluence,
    /// Microsoft SharePoint.
    Sharepoint,
    /// Box.
    Box,
}

impl ExternalSystemType {
    /// Return the type as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GoogleDrive => "google_drive",
            Self::Notion => "notion",
            Self::Confluence => "confluence",
            Self::Sharepoint => "sharepoint",
            Self::Box => "box",
        }
    }
}

impl fmt::Display for ExternalSystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExternalSystemType {
    type Err = foldertree_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google_drive" => Ok(Self::GoogleDrive),
            "notion" => Ok(Self::Notion),
            "confluence" => Ok(Self::Confluence),
            "sharepoint" => Ok(Self::Sharepoint),
            "box" => Ok(Self::Box),
            _ => Err(foldertree_core::AppError::validation(format!(
                "Invalid external system type: '{s}'. Expected one of: \
                 google_drive, notion, confluence, sharepoint, box"
            ))),
        }
    }
}

/// Where an externally synced folder came from. All three parts are
/// always present together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalReference {
    /// Source system.
    pub system: ExternalSystemType,
    /// Identifier in the source system.
    pub external_id: String,
    /// Last-modified timestamp reported by the source system.
    pub updated_at: DateTime<Utc>,
}
