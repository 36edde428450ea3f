//! Batch construction of watch-list trees.

use ark_bn254::Fr;
use ark_ff::{BigInteger, One, PrimeField};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info};

use super::normalize::{
    mrz_dob, mrz_name, mrz_passport, mrz_year, parse_date, parse_date_str, NAME_CHUNK,
    NAME_LENGTH,
};
use super::{WatchlistConfig, WatchlistError, WatchlistRecord, WatchlistResult};
use crate::merkle::hash::{field_to_decimal, HashError};
use crate::merkle::{PoseidonHasher, SparseMerkleTree, TreeError};

/// Which attributes address a record in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScheme {
    /// Full name and full date of birth.
    NameAndDob,
    /// Full name and year of birth.
    NameAndYob,
    /// Passport number and issuing nationality.
    PassportNumberAndNationality,
}

impl fmt::Display for KeyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyScheme::NameAndDob => "name_and_dob",
            KeyScheme::NameAndYob => "name_and_yob",
            KeyScheme::PassportNumberAndNationality => "passport_number_and_nationality",
        };
        f.write_str(name)
    }
}

/// Why a record was left out of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingName,
    MissingDate,
    InvalidDate,
    MissingPassport,
}

/// Summary of one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub scheme: KeyScheme,
    /// Records read from the input.
    pub processed: usize,
    /// Distinct keys inserted.
    pub inserted: usize,
    /// Records whose key was already present.
    pub duplicates: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
    pub elapsed_ms: u128,
    /// Decimal root.
    pub root: String,
}

impl BuildReport {
    /// Total number of skipped records.
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

/// A built tree together with how it was built.
#[derive(Debug, Clone)]
pub struct WatchlistTree {
    pub tree: SparseMerkleTree,
    pub report: BuildReport,
}

impl WatchlistTree {
    pub fn root(&self) -> Fr {
        self.tree.root()
    }

    pub fn export_json(&self) -> Result<String, TreeError> {
        self.tree.export_json()
    }
}

/// Derives keys from records and fills sparse Merkle trees.
#[derive(Debug, Clone, Default)]
pub struct WatchlistBuilder {
    config: WatchlistConfig,
    hasher: PoseidonHasher,
}

impl WatchlistBuilder {
    pub fn new(config: WatchlistConfig) -> WatchlistResult<Self> {
        Self::with_hasher(config, PoseidonHasher::new())
    }

    pub fn with_hasher(config: WatchlistConfig, hasher: PoseidonHasher) -> WatchlistResult<Self> {
        if config.tree_levels == 0 || config.tree_levels >= Fr::MODULUS_BIT_SIZE {
            return Err(WatchlistError::InvalidTreeLevels(config.tree_levels));
        }
        Ok(Self { config, hasher })
    }

    pub fn config(&self) -> &WatchlistConfig {
        &self.config
    }

    /// Poseidon3 over Poseidon13 of each 13-character chunk.
    pub fn name_leaf(&self, name: &[u8; NAME_LENGTH]) -> Result<Fr, HashError> {
        let chunks = name
            .chunks(NAME_CHUNK)
            .map(|chunk| self.hash_ascii(chunk))
            .collect::<Result<Vec<_>, _>>()?;
        self.hasher.hash(&chunks)
    }

    fn hash_ascii(&self, codes: &[u8]) -> Result<Fr, HashError> {
        let values: Vec<u64> = codes.iter().map(|c| u64::from(*c)).collect();
        self.hasher.hash_u64s(&values)
    }

    /// Tree key for `record`, or why it cannot have one.
    pub fn leaf_key(&self, record: &WatchlistRecord, scheme: KeyScheme) -> Result<Fr, SkipReason> {
        let leaf = match scheme {
            KeyScheme::NameAndDob | KeyScheme::NameAndYob => {
                let name = mrz_name(
                    record.first_name.as_deref().unwrap_or_default(),
                    record.last_name.as_deref().unwrap_or_default(),
                )
                .ok_or(SkipReason::MissingName)?;
                let date_leaf = if scheme == KeyScheme::NameAndDob {
                    self.hash_ascii(&mrz_dob(record_dob(record)?))
                } else {
                    self.hash_ascii(&mrz_year(record_year(record)?))
                };
                let date_leaf = date_leaf.map_err(|_| SkipReason::InvalidDate)?;
                let name_leaf = self.name_leaf(&name).map_err(|_| SkipReason::MissingName)?;
                self.hasher.hash_two(&date_leaf, &name_leaf)
            }
            KeyScheme::PassportNumberAndNationality => {
                let passport = mrz_passport(
                    record.passport_number.as_deref().unwrap_or_default(),
                    record.nationality.as_deref().unwrap_or_default(),
                )
                .ok_or(SkipReason::MissingPassport)?;
                self.hash_ascii(&passport)
                    .map_err(|_| SkipReason::MissingPassport)?
            }
        };
        Ok(reduce_key(&leaf, self.config.tree_levels))
    }

    /// Build a tree, running to completion.
    pub fn build(
        &self,
        records: &[WatchlistRecord],
        scheme: KeyScheme,
    ) -> WatchlistResult<WatchlistTree> {
        self.build_cancellable(records, scheme, &AtomicBool::new(false))
    }

    /// Build a tree, stopping with [`WatchlistError::Cancelled`] once
    /// `cancel` is set. Partial trees are discarded.
    pub fn build_cancellable(
        &self,
        records: &[WatchlistRecord],
        scheme: KeyScheme,
        cancel: &AtomicBool,
    ) -> WatchlistResult<WatchlistTree> {
        let start = Instant::now();
        let mut tree = SparseMerkleTree::with_hasher(self.hasher.clone());
        let mut skipped: BTreeMap<SkipReason, usize> = BTreeMap::new();
        let mut duplicates = 0;

        info!(%scheme, records = records.len(), "building watch-list tree");

        for (processed, record) in records.iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                info!(%scheme, processed, "watch-list build cancelled");
                return Err(WatchlistError::Cancelled { processed });
            }

            match self.leaf_key(record, scheme) {
                Ok(key) => {
                    if !tree.add(key, Fr::one())? {
                        duplicates += 1;
                    }
                }
                Err(reason) => {
                    debug!(?reason, index = processed, "skipping watch-list record");
                    *skipped.entry(reason).or_default() += 1;
                }
            }

            let done = processed + 1;
            if self.config.progress_interval > 0 && done % self.config.progress_interval == 0 {
                info!(
                    %scheme,
                    processed = done,
                    total = records.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "watch-list build progress"
                );
            }
        }

        let report = BuildReport {
            scheme,
            processed: records.len(),
            inserted: tree.len(),
            duplicates,
            skipped,
            elapsed_ms: start.elapsed().as_millis(),
            root: field_to_decimal(&tree.root()),
        };
        info!(
            %scheme,
            inserted = report.inserted,
            duplicates = report.duplicates,
            skipped = report.skipped_total(),
            elapsed_ms = report.elapsed_ms as u64,
            root = %report.root,
            "watch-list tree built"
        );
        Ok(WatchlistTree { tree, report })
    }
}

fn record_dob(record: &WatchlistRecord) -> Result<NaiveDate, SkipReason> {
    if let Some(date) = record.date_of_birth.as_deref().filter(|d| !d.trim().is_empty()) {
        return parse_date_str(date).ok_or(SkipReason::InvalidDate);
    }
    match (&record.day, &record.month, &record.year) {
        (Some(day), Some(month), Some(year)) => {
            parse_date(day, month, year).ok_or(SkipReason::InvalidDate)
        }
        _ => Err(SkipReason::MissingDate),
    }
}

fn record_year(record: &WatchlistRecord) -> Result<i32, SkipReason> {
    if let Some(year) = record.year.as_deref().filter(|y| !y.trim().is_empty()) {
        return year.trim().parse().map_err(|_| SkipReason::InvalidDate);
    }
    record_dob(record).map(|date| date.year())
}

/// Keep the low `levels` bits of a field element.
fn reduce_key(value: &Fr, levels: u32) -> Fr {
    let bits = value.into_bigint().to_bits_le();
    let kept: Vec<bool> = bits.into_iter().take(levels as usize).collect();
    Fr::from_bigint(<Fr as PrimeField>::BigInt::from_bits_le(&kept)).unwrap_or_default()
}
