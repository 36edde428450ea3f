//! Watch-list sparse Merkle trees.
//!
//! Sanction-list entries are normalized into MRZ-shaped attributes, hashed
//! into 64-bit keys and inserted into a [`SparseMerkleTree`]. The roots end
//! up in the public signals of proofs that show the holder is *not* listed.
//!
//! [`SparseMerkleTree`]: crate::merkle::SparseMerkleTree

pub mod builder;
pub mod normalize;

pub use builder::{BuildReport, KeyScheme, SkipReason, WatchlistBuilder, WatchlistTree};

use serde::{Deserialize, Serialize};

use crate::merkle::TreeError;

/// One entry of a sanction list.
///
/// Field aliases accept the column names of the OFAC SDN export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistRecord {
    #[serde(default, alias = "First_Name", alias = "first_name")]
    pub first_name: Option<String>,
    #[serde(default, alias = "Last_Name", alias = "last_name")]
    pub last_name: Option<String>,
    /// Full date of birth, `YYYY-MM-DD` or `DD/MM/YYYY`.
    #[serde(default, alias = "dob", alias = "date_of_birth")]
    pub date_of_birth: Option<String>,
    #[serde(default, alias = "Day")]
    pub day: Option<String>,
    #[serde(default, alias = "Month")]
    pub month: Option<String>,
    #[serde(default, alias = "Year")]
    pub year: Option<String>,
    #[serde(default, alias = "Pass_No", alias = "passport_number")]
    pub passport_number: Option<String>,
    #[serde(default, alias = "Pass_Country")]
    pub nationality: Option<String>,
}

impl WatchlistRecord {
    pub fn new(first_name: &str, last_name: &str) -> Self {
        Self {
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
            ..Self::default()
        }
    }

    pub fn with_dob(mut self, date_of_birth: &str) -> Self {
        self.date_of_birth = Some(date_of_birth.to_string());
        self
    }

    pub fn with_year(mut self, year: &str) -> Self {
        self.year = Some(year.to_string());
        self
    }

    pub fn with_passport(mut self, number: &str, nationality: &str) -> Self {
        self.passport_number = Some(number.to_string());
        self.nationality = Some(nationality.to_string());
        self
    }
}

/// Tree building parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchlistConfig {
    /// Keys are reduced modulo `2^tree_levels`.
    pub tree_levels: u32,
    /// Log progress every this many records; 0 disables progress logs.
    pub progress_interval: usize,
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            tree_levels: 64,
            progress_interval: 10_000,
        }
    }
}

/// Errors that abort a watch-list build.
#[derive(Debug, thiserror::Error)]
pub enum WatchlistError {
    #[error("Build cancelled after {processed} records")]
    Cancelled { processed: usize },

    #[error("Tree levels must be between 1 and 253, got {0}")]
    InvalidTreeLevels(u32),

    #[error("Invalid watch-list records: {0}")]
    InvalidRecords(String),

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),
}

pub type WatchlistResult<T> = Result<T, WatchlistError>;

/// Parse a JSON array of records.
pub fn records_from_json(json: &str) -> WatchlistResult<Vec<WatchlistRecord>> {
    serde_json::from_str(json).map_err(|e| WatchlistError::InvalidRecords(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_from_ofac_json() {
        let json = r#"[
            {"First_Name": "Ali", "Last_Name": "Hassan", "Day": "05", "Month": "03", "Year": "1961"},
            {"firstName": "Jane", "lastName": "Roe", "dob": "1970-01-02"},
            {"Last_Name": "Kim", "Pass_No": "X1234567", "Pass_Country": "PRK"}
        ]"#;
        let records = records_from_json(json).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].first_name.as_deref(), Some("Ali"));
        assert_eq!(records[0].year.as_deref(), Some("1961"));
        assert_eq!(records[1].date_of_birth.as_deref(), Some("1970-01-02"));
        assert_eq!(records[2].nationality.as_deref(), Some("PRK"));
        assert_eq!(records[2].first_name, None);
    }

    #[test]
    fn test_records_from_bad_json() {
        assert!(matches!(
            records_from_json("{}"),
            Err(WatchlistError::InvalidRecords(_))
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config: WatchlistConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, WatchlistConfig::default());
        assert_eq!(config.tree_levels, 64);

        let config: WatchlistConfig = serde_json::from_str(r#"{"tree_levels": 32}"#).unwrap();
        assert_eq!(config.tree_levels, 32);
        assert_eq!(config.progress_interval, 10_000);
    }
}
