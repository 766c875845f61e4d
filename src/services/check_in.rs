use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::db::{Store, StoreError};
use crate::models::check_in::{CheckInOutcome, CreateCheckInData};
use crate::services::qr_payload::{self, CheckInPayload, PayloadError};

#[derive(thiserror::Error, Debug)]
pub enum CheckInError {
    #[error("Malformed check-in code: {0}")]
    MalformedCode(#[from] PayloadError),

    #[error("Unknown or inactive check-in code for program {program_id}")]
    UnknownCode { program_id: i64 },

    #[error("Check-in code issued at {issued_at} has expired")]
    ExpiredCode { issued_at: DateTime<Utc> },

    #[error("Already checked in to program {program_id} at {previous_at}")]
    DuplicateCheckIn {
        program_id: i64,
        previous_at: DateTime<Utc>,
        retry_after: Duration,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CheckInError {
    /// Stable identifier a client can localize
    pub fn code(&self) -> &'static str {
        match self {
            CheckInError::MalformedCode(_) => "malformed_code",
            CheckInError::UnknownCode { .. } => "unknown_code",
            CheckInError::ExpiredCode { .. } => "expired_code",
            CheckInError::DuplicateCheckIn { .. } => "duplicate_check_in",
            CheckInError::Store(_) => "internal_error",
        }
    }
}

/// Rules applied to every scan
#[derive(Debug, Clone)]
pub struct CheckInRules {
    pub scheme: String,
    pub duplicate_window: Duration,
    /// When set, codes whose `t` is older than this are rejected
    pub max_code_age: Option<Duration>,
}

impl CheckInRules {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scheme: config.qr_scheme.clone(),
            duplicate_window: Duration::seconds(config.duplicate_window_secs),
            max_code_age: config.qr_max_age_secs.map(Duration::seconds),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInConfirmation {
    pub check_in_id: i64,
    pub program_id: i64,
    pub program_name: String,
    pub location: String,
    pub checked_in_at: DateTime<Utc>,
}

/// Compares the parsed scan with the payload stored on the QR code record.
///
/// Both sides go through the parser, so scheme case and percent-encoding
/// differences do not matter.
fn matches_issued_code(scanned: &CheckInPayload, issued: &str, scheme: &str) -> bool {
    match qr_payload::parse_payload(issued, scheme) {
        Ok(issued) => issued == *scanned,
        Err(e) => {
            tracing::error!(error = %e, "Stored QR payload does not parse");
            false
        }
    }
}

/// Validates a scanned code for `student_id` and records the check-in.
///
/// 1. Parses the payload
/// 2. Requires an active program with an active QR code
/// 3. Requires the scan to match the payload issued for that code
/// 4. Applies the optional code age limit
/// 5. Rejects a repeat scan for the same program inside the duplicate window,
///    measured from `now`, not from the code's issue time
/// 6. Records the check-in stamped with `now` at the issued location
#[tracing::instrument(skip(store, rules, raw_code), fields(program_id))]
pub async fn check_in(
    store: &dyn Store,
    rules: &CheckInRules,
    student_id: i64,
    raw_code: &str,
    now: DateTime<Utc>,
) -> Result<CheckInConfirmation, CheckInError> {
    let payload = qr_payload::parse_payload(raw_code, &rules.scheme).map_err(|e| {
        tracing::warn!(error = %e, "Rejected malformed check-in code");
        CheckInError::MalformedCode(e)
    })?;
    tracing::Span::current().record("program_id", payload.program_id);

    let program = store
        .find_program(payload.program_id)
        .await?
        .filter(|p| p.is_active);
    let qr_code = store.find_active_qr_code(payload.program_id).await?;
    let (program, qr_code) = match (program, qr_code) {
        (Some(program), Some(qr_code)) => (program, qr_code),
        _ => {
            tracing::warn!("No active program/QR code pairing");
            return Err(CheckInError::UnknownCode {
                program_id: payload.program_id,
            });
        }
    };

    if rules.max_code_age.is_some() && payload.issued_at.is_none() {
        return Err(CheckInError::MalformedCode(PayloadError::MissingParameter("t")));
    }

    // Only the code currently on record is valid: regenerated codes and
    // edited locations are rejected.
    if !matches_issued_code(&payload, &qr_code.payload, &rules.scheme) {
        tracing::warn!(qr_code_id = qr_code.id, "Scanned code differs from the issued code");
        return Err(CheckInError::UnknownCode {
            program_id: payload.program_id,
        });
    }

    if let (Some(max_age), Some(issued_at)) = (rules.max_code_age, payload.issued_at) {
        if now - issued_at > max_age {
            tracing::info!(issued_at = %issued_at, "Rejected expired check-in code");
            return Err(CheckInError::ExpiredCode { issued_at });
        }
    }

    let outcome = store
        .create_check_in_unless_recent(
            CreateCheckInData {
                student_id,
                program_id: program.id,
                qr_code_id: qr_code.id,
                location: qr_code.location.clone(),
            },
            now,
            rules.duplicate_window,
        )
        .await?;

    match outcome {
        CheckInOutcome::Recorded(check_in) => {
            tracing::info!(check_in_id = check_in.id, "Check-in recorded");
            Ok(CheckInConfirmation {
                check_in_id: check_in.id,
                program_id: program.id,
                program_name: program.name,
                location: check_in.location,
                checked_in_at: check_in.checked_in_at,
            })
        }
        CheckInOutcome::Duplicate { previous } => {
            let retry_after = previous.checked_in_at + rules.duplicate_window - now;
            tracing::info!(
                previous_at = %previous.checked_in_at,
                "Rejected duplicate check-in"
            );
            Err(CheckInError::DuplicateCheckIn {
                program_id: program.id,
                previous_at: previous.checked_in_at,
                retry_after,
            })
        }
    }
}
