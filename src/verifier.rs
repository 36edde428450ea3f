//! Policy verification of disclosure proofs.
//!
//! [`DisclosureVerifier`] checks that a proof's public signals belong to this
//! deployment (scope, user context, document type) and satisfy the policy the
//! [`ConfigStore`] resolves for the request. Every failed check is collected
//! before returning, so callers see all problems at once.
//!
//! Groth16 validity of the proof itself is checked elsewhere.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{ConfigStore, VerificationConfig, VerifierSettings};
use crate::disclosure::{unpack, DisclosureError, DisclosureRecord, PublicSignals, SignalIndices};
use crate::identifier::{user_context_hash_hex, IdentifierError, UserContextData};
use crate::scope::{EncodingError, ScopeHash, ScopeHasher};
use crate::AttestationType;

/// Result type for verifier operations.
pub type VerifierResult<T> = Result<T, VerifierError>;

/// Kinds of policy mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConfigMismatch {
    InvalidId,
    InvalidUserContextHash,
    InvalidScope,
    InvalidAttestationId,
    InvalidForbiddenCountriesList,
    InvalidMinimumAge,
    InvalidTimestamp,
    InvalidWatchlistRoot,
    ConfigNotFound,
}

impl fmt::Display for ConfigMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigIssue {
    #[serde(rename = "type")]
    pub kind: ConfigMismatch,
    pub message: String,
}

impl ConfigIssue {
    fn new(kind: ConfigMismatch, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

fn format_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("[{}]: {}", issue.kind, issue.message))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors that can occur during verification.
#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    #[error("{}", format_issues(.0))]
    ConfigMismatch(Vec<ConfigIssue>),

    #[error("Invalid public signals: {0}")]
    InvalidSignals(#[from] DisclosureError),

    #[error("Invalid scope configuration: {0}")]
    Scope(#[from] EncodingError),
}

impl VerifierError {
    /// Issues of a [`VerifierError::ConfigMismatch`], empty otherwise.
    pub fn issues(&self) -> &[ConfigIssue] {
        match self {
            VerifierError::ConfigMismatch(issues) => issues,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IsValidDetails {
    /// Every policy check passed.
    pub is_valid: bool,
    pub is_minimum_age_valid: bool,
    /// OFAC was required and the holder passed at least one list check.
    pub is_ofac_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub user_identifier: String,
    pub user_defined_data: String,
}

/// Verification result with the disclosed data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub attestation_id: AttestationType,
    pub is_valid_details: IsValidDetails,
    pub forbidden_countries_list: Vec<String>,
    pub disclose_output: DisclosureRecord,
    pub user_data: UserData,
}

/// Checks disclosure proofs against one deployment's settings.
pub struct DisclosureVerifier {
    settings: VerifierSettings,
    scope_hash: ScopeHash,
    store: Arc<dyn ConfigStore>,
}

impl fmt::Debug for DisclosureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisclosureVerifier")
            .field("settings", &self.settings)
            .field("scope_hash", &self.scope_hash)
            .finish_non_exhaustive()
    }
}

/// State accumulated over one verification.
struct Checks {
    issues: Vec<ConfigIssue>,
}

impl Checks {
    fn fail(&mut self, kind: ConfigMismatch, message: impl Into<String>) {
        let issue = ConfigIssue::new(kind, message);
        debug!(kind = %issue.kind, message = %issue.message, "verification check failed");
        self.issues.push(issue);
    }
}

impl DisclosureVerifier {
    /// Create a verifier; the scope hash is derived once here.
    pub fn new(settings: VerifierSettings, store: Arc<dyn ConfigStore>) -> VerifierResult<Self> {
        let scope_hash =
            ScopeHasher::new().hash_endpoint_with_scope(&settings.endpoint, &settings.scope)?;
        info!(scope = %settings.scope, scope_hash = %scope_hash, "disclosure verifier ready");
        Ok(Self {
            settings,
            scope_hash,
            store,
        })
    }

    pub fn settings(&self) -> &VerifierSettings {
        &self.settings
    }

    pub fn scope_hash(&self) -> &ScopeHash {
        &self.scope_hash
    }

    /// Verify against the current time.
    pub fn verify<S: AsRef<str>>(
        &self,
        attestation_id: u64,
        public_signals: &[S],
        user_context_data: &str,
    ) -> VerifierResult<VerificationReport> {
        self.verify_at(attestation_id, public_signals, user_context_data, Utc::now())
    }

    /// Verify as of `now`.
    pub fn verify_at<S: AsRef<str>>(
        &self,
        attestation_id: u64,
        public_signals: &[S],
        user_context_data: &str,
        now: DateTime<Utc>,
    ) -> VerifierResult<VerificationReport> {
        let mut checks = Checks { issues: Vec::new() };
        let signals = PublicSignals::parse(public_signals)?;

        let attestation = AttestationType::try_from(attestation_id).ok();
        if !attestation.is_some_and(|a| self.settings.is_allowed(a)) {
            checks.fail(
                ConfigMismatch::InvalidId,
                format!("Attestation ID is not allowed, received: {attestation_id}"),
            );
        }

        let disclosure = match attestation {
            Some(attestation) => {
                let indices = attestation.indices();
                if signals.len() < indices.signal_count {
                    return Err(DisclosureError::MissingSignal {
                        index: indices.signal_count - 1,
                        len: signals.len(),
                    }
                    .into());
                }
                self.check_signals(&mut checks, attestation, indices, &signals, user_context_data)?;
                Some(unpack(attestation, &signals)?)
            }
            None => {
                checks.fail(
                    ConfigMismatch::InvalidAttestationId,
                    format!("Unknown attestation ID: {attestation_id}"),
                );
                None
            }
        };

        let user_data = self.resolve_user(&mut checks, user_context_data);
        let config = user_data
            .as_ref()
            .and_then(|user| self.resolve_config(&mut checks, user));

        let mut forbidden_countries_list = Vec::new();
        if let (Some(attestation), Some(disclosure), Some(config)) =
            (attestation, disclosure.as_ref(), config.as_ref())
        {
            forbidden_countries_list = disclosure.forbidden_countries_list();
            check_policy(
                &mut checks,
                config,
                disclosure,
                &forbidden_countries_list,
                &signals,
                attestation,
                now,
            );
        }

        let (Some(attestation), Some(disclosure), Some(user_data), Some(config)) =
            (attestation, disclosure, user_data, config)
        else {
            info!(
                attestation_id,
                issues = checks.issues.len(),
                "disclosure rejected"
            );
            return Err(VerifierError::ConfigMismatch(checks.issues));
        };
        if !checks.issues.is_empty() {
            info!(
                attestation_id,
                issues = checks.issues.len(),
                "disclosure rejected"
            );
            return Err(VerifierError::ConfigMismatch(checks.issues));
        }

        let cumulative_ofac = disclosure.ofac.iter().any(|flag| *flag);
        let report = VerificationReport {
            attestation_id: attestation,
            is_valid_details: IsValidDetails {
                is_valid: true,
                is_minimum_age_valid: true,
                is_ofac_valid: config.ofac && cumulative_ofac,
            },
            forbidden_countries_list,
            disclose_output: disclosure,
            user_data: UserData {
                user_identifier: user_data.user_identifier,
                user_defined_data: user_data.user_defined_data,
            },
        };
        info!(
            attestation_id,
            user_identifier = %report.user_data.user_identifier,
            is_ofac_valid = report.is_valid_details.is_ofac_valid,
            "disclosure verified"
        );
        Ok(report)
    }

    /// Checks that only need the signals and the raw user context.
    fn check_signals(
        &self,
        checks: &mut Checks,
        attestation: AttestationType,
        indices: &SignalIndices,
        signals: &PublicSignals,
        user_context_data: &str,
    ) -> VerifierResult<()> {
        let circuit_hash = signals.get(indices.user_identifier)?;
        match user_context_hash_hex(user_context_data) {
            Ok(expected) if &expected == circuit_hash => {}
            Ok(expected) => checks.fail(
                ConfigMismatch::InvalidUserContextHash,
                format!(
                    "User context hash does not match with the one in the circuit\nCircuit: {circuit_hash}\nUser context hash: {expected}"
                ),
            ),
            Err(e) => checks.fail(ConfigMismatch::InvalidUserContextHash, e.to_string()),
        }

        let circuit_scope = signals.decimal(indices.scope)?;
        if circuit_scope != self.scope_hash.to_decimal() {
            checks.fail(
                ConfigMismatch::InvalidScope,
                format!(
                    "Scope does not match with the one in the circuit\nCircuit: {circuit_scope}\nScope: {}",
                    self.scope_hash
                ),
            );
        }

        if signals.decimal(indices.attestation_id)? != attestation.to_string() {
            checks.fail(
                ConfigMismatch::InvalidAttestationId,
                "Attestation ID does not match with the one in the circuit",
            );
        }

        let expected_roots = [
            ("name and date of birth", &self.settings.name_dob_root, indices.name_dob_smt_root),
            ("name and year of birth", &self.settings.name_yob_root, indices.name_yob_smt_root),
        ];
        for (label, expected, index) in expected_roots {
            let Some(expected) = expected else { continue };
            let circuit_root = signals.decimal(index)?;
            if &circuit_root != expected {
                checks.fail(
                    ConfigMismatch::InvalidWatchlistRoot,
                    format!(
                        "Watch-list root for {label} does not match\nCircuit: {circuit_root}\nExpected: {expected}"
                    ),
                );
            }
        }
        Ok(())
    }

    fn resolve_user(&self, checks: &mut Checks, user_context_data: &str) -> Option<UserContextData> {
        match UserContextData::parse(user_context_data, self.settings.user_identifier_type) {
            Ok(user) => Some(user),
            Err(IdentifierError::TooShort(_)) => {
                checks.fail(ConfigMismatch::ConfigNotFound, "userContextData too short");
                None
            }
            Err(e) => {
                checks.fail(ConfigMismatch::ConfigNotFound, e.to_string());
                None
            }
        }
    }

    fn resolve_config(
        &self,
        checks: &mut Checks,
        user: &UserContextData,
    ) -> Option<VerificationConfig> {
        let action_id = match self
            .store
            .get_action_id(&user.user_identifier, &user.user_defined_data)
        {
            Ok(id) if !id.is_empty() => id,
            _ => {
                checks.fail(ConfigMismatch::ConfigNotFound, "Config Id not found");
                return None;
            }
        };

        match self.store.get_config(&action_id) {
            Ok(config) if !config.is_empty() => Some(config),
            _ => {
                checks.fail(
                    ConfigMismatch::ConfigNotFound,
                    format!("Config not found for {action_id}"),
                );
                None
            }
        }
    }
}

fn check_policy(
    checks: &mut Checks,
    config: &VerificationConfig,
    disclosure: &DisclosureRecord,
    forbidden_countries_list: &[String],
    signals: &PublicSignals,
    attestation: AttestationType,
    now: DateTime<Utc>,
) {
    let all_excluded = config
        .excluded_countries
        .iter()
        .all(|country| forbidden_countries_list.contains(country));
    if !all_excluded {
        checks.fail(
            ConfigMismatch::InvalidForbiddenCountriesList,
            format!(
                "Forbidden countries list in config does not match with the one in the circuit\nCircuit: {}\nConfig: {:?}",
                forbidden_countries_list.join(", "),
                config.excluded_countries
            ),
        );
    }

    if config.minimum_age != 0 && !minimum_age_matches(config.minimum_age, &disclosure.minimum_age) {
        checks.fail(
            ConfigMismatch::InvalidMinimumAge,
            format!(
                "Minimum age in config does not match with the one in the circuit\nCircuit: {}\nConfig: {}",
                disclosure.minimum_age, config.minimum_age
            ),
        );
    }

    match signals.current_date(attestation) {
        Ok(date) => {
            if let Some(problem) = timestamp_problem(date, now) {
                checks.fail(ConfigMismatch::InvalidTimestamp, problem);
            }
        }
        Err(e) => checks.fail(ConfigMismatch::InvalidTimestamp, e.to_string()),
    }
}

/// `"00"` or an empty value means the circuit did not enforce an age.
fn minimum_age_matches(required: u32, circuit: &str) -> bool {
    let circuit = circuit.trim();
    circuit.is_empty() || circuit == "00" || circuit.parse::<u32>() == Ok(required)
}

/// The proof date may be at most one day ahead of `now`, and its end of day
/// at most one day behind.
fn timestamp_problem(date: NaiveDate, now: DateTime<Utc>) -> Option<&'static str> {
    let start_of_day = date.and_hms_opt(0, 0, 0)?.and_utc();
    if start_of_day > now + Duration::hours(24) {
        return Some("Circuit timestamp is in the future");
    }
    let end_of_day = start_of_day + Duration::seconds(23 * 3600 + 59 * 60 + 59);
    if end_of_day < now - Duration::hours(24) {
        return Some("Circuit timestamp is too old");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InMemoryConfigStore, StaticConfigStore};
    use chrono::TimeZone;

    const ENDPOINT: &str = "https://playground.self.xyz/api/verify";
    const SCOPE: &str = "self-playground";
    const USER_CONTEXT: &str = "000000000000000000000000000000000000000000000000000000000000a4ec0000000000000000000000000000000057843deaacba4fe9bdcccc6e3c356d0168656c6c6f2066726f6d2074686520706c617967726f756e64";

    const PASSPORT_SIGNALS: [&str; 21] = [
        "0",
        "88695642300982331844063832786964092168707990538423248083901435067469135872",
        "5917645764266387229099807922771871753544163856784761583567435202615",
        "4936272",
        "0",
        "0",
        "0",
        "13444167391765850209653844241387268774183214285042803350347364004811481522835",
        "1",
        "3128220823265944096261447595696332812503333375431456287926106302900687520341",
        "2",
        "5",
        "0",
        "8",
        "1",
        "2",
        "17359956125106148146828355805271472653597249114301196742546733002427978706344",
        "7420120618403967585712321281997181302561301414016003514649937965499789236588",
        "16836358042995742879630198413873414945978677264752036026400967422611478610995",
        "13934606664243914063643606771911468856671016933765586820821710153612586828695",
        "333950092602874832043713879344132078365835356296",
    ];

    fn proof_day() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 12, 15, 0, 0).unwrap()
    }

    fn policy() -> VerificationConfig {
        VerificationConfig {
            minimum_age: 18,
            excluded_countries: vec!["PRK".to_string()],
            ofac: true,
        }
    }

    fn verifier_with(config: VerificationConfig) -> DisclosureVerifier {
        let store = Arc::new(StaticConfigStore::new(config));
        DisclosureVerifier::new(VerifierSettings::new(SCOPE, ENDPOINT), store).unwrap()
    }

    fn kinds(err: &VerifierError) -> Vec<ConfigMismatch> {
        err.issues().iter().map(|issue| issue.kind).collect()
    }

    #[test]
    fn test_playground_proof_verifies() {
        let report = verifier_with(policy())
            .verify_at(1, &PASSPORT_SIGNALS, USER_CONTEXT, proof_day())
            .unwrap();

        assert_eq!(report.attestation_id, AttestationType::Passport);
        assert!(report.is_valid_details.is_valid);
        assert!(report.is_valid_details.is_ofac_valid);
        assert_eq!(report.forbidden_countries_list, vec!["PRK"]);
        assert_eq!(report.disclose_output.minimum_age, "18");
        assert_eq!(
            report.user_data.user_identifier,
            "0x0000000057843deaacba4fe9bdcccc6e3c356d01"
        );
    }

    #[test]
    fn test_wrong_scope() {
        let store = Arc::new(StaticConfigStore::new(policy()));
        let verifier =
            DisclosureVerifier::new(VerifierSettings::new("other-scope", ENDPOINT), store).unwrap();
        let err = verifier
            .verify_at(1, &PASSPORT_SIGNALS, USER_CONTEXT, proof_day())
            .unwrap_err();
        assert_eq!(kinds(&err), vec![ConfigMismatch::InvalidScope]);
    }

    #[test]
    fn test_issues_are_aggregated() {
        let config = VerificationConfig {
            minimum_age: 21,
            excluded_countries: vec!["PRK".to_string(), "IRN".to_string()],
            ofac: false,
        };
        let err = verifier_with(config)
            .verify_at(1, &PASSPORT_SIGNALS, USER_CONTEXT, proof_day())
            .unwrap_err();

        assert_eq!(
            kinds(&err),
            vec![
                ConfigMismatch::InvalidForbiddenCountriesList,
                ConfigMismatch::InvalidMinimumAge,
            ]
        );
        let message = err.to_string();
        assert!(message.starts_with("[InvalidForbiddenCountriesList]: "));
        assert!(message.contains("\n[InvalidMinimumAge]: "));
    }

    #[test]
    fn test_user_context_mismatch() {
        let mut context = USER_CONTEXT.to_string();
        context.push_str("00");
        let err = verifier_with(policy())
            .verify_at(1, &PASSPORT_SIGNALS, &context, proof_day())
            .unwrap_err();
        assert_eq!(kinds(&err), vec![ConfigMismatch::InvalidUserContextHash]);
    }

    #[test]
    fn test_short_user_context() {
        let err = verifier_with(policy())
            .verify_at(1, &PASSPORT_SIGNALS, "abcd", proof_day())
            .unwrap_err();
        assert_eq!(
            kinds(&err),
            vec![
                ConfigMismatch::InvalidUserContextHash,
                ConfigMismatch::ConfigNotFound,
            ]
        );
    }

    #[test]
    fn test_timestamp_window() {
        let verifier = verifier_with(policy());

        let too_old = Utc.with_ymd_and_hms(2025, 8, 14, 0, 0, 0).unwrap();
        let err = verifier
            .verify_at(1, &PASSPORT_SIGNALS, USER_CONTEXT, too_old)
            .unwrap_err();
        assert_eq!(kinds(&err), vec![ConfigMismatch::InvalidTimestamp]);
        assert!(err.to_string().contains("too old"));

        let too_early = Utc.with_ymd_and_hms(2025, 8, 10, 23, 0, 0).unwrap();
        let err = verifier
            .verify_at(1, &PASSPORT_SIGNALS, USER_CONTEXT, too_early)
            .unwrap_err();
        assert!(err.to_string().contains("in the future"));

        let next_evening = Utc.with_ymd_and_hms(2025, 8, 13, 20, 0, 0).unwrap();
        assert!(verifier
            .verify_at(1, &PASSPORT_SIGNALS, USER_CONTEXT, next_evening)
            .is_ok());
    }

    #[test]
    fn test_attestation_id_checks() {
        let verifier = verifier_with(policy());

        let err = verifier
            .verify_at(2, &PASSPORT_SIGNALS, USER_CONTEXT, proof_day())
            .unwrap_err();
        assert!(kinds(&err).contains(&ConfigMismatch::InvalidAttestationId));

        let err = verifier
            .verify_at(9, &PASSPORT_SIGNALS, USER_CONTEXT, proof_day())
            .unwrap_err();
        assert_eq!(
            kinds(&err)[..2],
            [ConfigMismatch::InvalidId, ConfigMismatch::InvalidAttestationId]
        );

        let mut settings = VerifierSettings::new(SCOPE, ENDPOINT);
        settings.allowed_ids = vec![AttestationType::Aadhaar];
        let restricted =
            DisclosureVerifier::new(settings, Arc::new(StaticConfigStore::new(policy()))).unwrap();
        let err = restricted
            .verify_at(1, &PASSPORT_SIGNALS, USER_CONTEXT, proof_day())
            .unwrap_err();
        assert_eq!(kinds(&err), vec![ConfigMismatch::InvalidId]);
    }

    #[test]
    fn test_missing_config() {
        let store = Arc::new(InMemoryConfigStore::new(|_, _| Ok("unknown".to_string())));
        let verifier =
            DisclosureVerifier::new(VerifierSettings::new(SCOPE, ENDPOINT), store).unwrap();
        let err = verifier
            .verify_at(1, &PASSPORT_SIGNALS, USER_CONTEXT, proof_day())
            .unwrap_err();
        assert_eq!(kinds(&err), vec![ConfigMismatch::ConfigNotFound]);
        assert!(err.to_string().contains("Config not found for unknown"));
    }

    #[test]
    fn test_config_resolved_per_user() {
        let store = Arc::new(InMemoryConfigStore::new(|user, _| Ok(user.to_string())));
        store
            .set_config("0x0000000057843deaacba4fe9bdcccc6e3c356d01", policy())
            .unwrap();
        let verifier =
            DisclosureVerifier::new(VerifierSettings::new(SCOPE, ENDPOINT), store).unwrap();
        assert!(verifier
            .verify_at(1, &PASSPORT_SIGNALS, USER_CONTEXT, proof_day())
            .is_ok());
    }

    #[test]
    fn test_watchlist_root_check() {
        let mut settings = VerifierSettings::new(SCOPE, ENDPOINT);
        settings.name_dob_root = Some(PASSPORT_SIGNALS[17].to_string());
        let store: Arc<dyn ConfigStore> = Arc::new(StaticConfigStore::new(policy()));
        let verifier = DisclosureVerifier::new(settings.clone(), store.clone()).unwrap();
        assert!(verifier
            .verify_at(1, &PASSPORT_SIGNALS, USER_CONTEXT, proof_day())
            .is_ok());

        settings.name_yob_root = Some("1".to_string());
        let verifier = DisclosureVerifier::new(settings, store).unwrap();
        let err = verifier
            .verify_at(1, &PASSPORT_SIGNALS, USER_CONTEXT, proof_day())
            .unwrap_err();
        assert_eq!(kinds(&err), vec![ConfigMismatch::InvalidWatchlistRoot]);
    }

    #[test]
    fn test_short_signal_vector() {
        let err = verifier_with(policy())
            .verify_at(1, &PASSPORT_SIGNALS[..20], USER_CONTEXT, proof_day())
            .unwrap_err();
        assert!(matches!(
            err,
            VerifierError::InvalidSignals(DisclosureError::MissingSignal { len: 20, .. })
        ));
    }

    #[test]
    fn test_minimum_age_rules() {
        assert!(minimum_age_matches(18, "18"));
        assert!(minimum_age_matches(18, "00"));
        assert!(minimum_age_matches(18, ""));
        assert!(!minimum_age_matches(18, "21"));
    }

    #[test]
    fn test_issue_serialization() {
        let issue = ConfigIssue::new(ConfigMismatch::InvalidScope, "nope");
        assert_eq!(
            serde_json::to_string(&issue).unwrap(),
            r#"{"type":"InvalidScope","message":"nope"}"#
        );
    }
}
