//! One-time email verification challenge

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::enums::text_enum;
use crate::error::AppError;

text_enum! {
    /// Flow a challenge guards; each flow has its own window.
    ///
    /// `Registration` codes are issued and verified here but redeemed by the
    /// external account service through `OtpService::verified_challenge` and
    /// `OtpService::redeem`; no borrowing operation accepts them.
    OtpPurpose {
        GuestRequest => "guest_request",
        Registration => "registration",
    }
}

/// Live challenge, keyed by email. At most one exists per email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpChallenge {
    /// Identifies one issued challenge; a resend produces a new id
    pub id: Uuid,
    /// Bumped on every stored change, used for compare-and-swap
    pub revision: u32,
    pub email: String,
    pub purpose: OtpPurpose,
    /// SHA-256 of the code, hex encoded
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
    pub verified: bool,
    /// Pending data of the flow being verified, handed back on redeem.
    /// Guest requests carry their data in the request itself and leave it empty.
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationFailure {
    #[error("No verification code is pending for this email")]
    NoChallenge,
    #[error("The verification code has expired, request a new one")]
    Expired,
    #[error("Too many attempts, request a new code")]
    AttemptsExhausted,
    #[error("Invalid verification code ({remaining} attempts left)")]
    Mismatch { remaining: u32 },
    #[error("Email has not been verified")]
    NotVerified,
}

impl From<VerificationFailure> for AppError {
    fn from(failure: VerificationFailure) -> Self {
        AppError::Verification(failure.to_string())
    }
}

/// What to store after a verification attempt, and its result
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    /// `None` deletes the challenge
    pub next: Option<OtpChallenge>,
    pub result: Result<(), VerificationFailure>,
}

pub fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.trim().as_bytes()))
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl OtpChallenge {
    pub fn issue(
        email: &str,
        code: &str,
        purpose: OtpPurpose,
        payload: Option<serde_json::Value>,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            revision: 0,
            email: normalize_email(email),
            purpose,
            code_hash: hash_code(code),
            expires_at: now + window,
            attempts: 0,
            verified: false,
            payload,
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    fn revised(mut self) -> Self {
        self.revision += 1;
        self
    }

    /// Check `code` against this challenge.
    ///
    /// Expired and exhausted challenges are deleted; a mismatch is counted
    /// and the challenge kept; a match marks it verified but leaves it live
    /// until the guarded operation consumes it.
    pub fn attempt(&self, code: &str, now: DateTime<Utc>, max_attempts: u32) -> Attempt {
        if self.is_expired(now) {
            return Attempt {
                next: None,
                result: Err(VerificationFailure::Expired),
            };
        }
        if self.attempts >= max_attempts {
            return Attempt {
                next: None,
                result: Err(VerificationFailure::AttemptsExhausted),
            };
        }
        if hash_code(code) != self.code_hash {
            let mut next = self.clone().revised();
            next.attempts += 1;
            let remaining = max_attempts.saturating_sub(next.attempts);
            return Attempt {
                next: Some(next),
                result: Err(VerificationFailure::Mismatch { remaining }),
            };
        }
        if self.verified {
            return Attempt {
                next: Some(self.clone()),
                result: Ok(()),
            };
        }
        let mut next = self.clone().revised();
        next.verified = true;
        Attempt {
            next: Some(next),
            result: Ok(()),
        }
    }

    /// Whether the guarded operation may consume this challenge at `now`
    pub fn check_consumable(&self, now: DateTime<Utc>) -> Result<(), VerificationFailure> {
        if self.is_expired(now) {
            return Err(VerificationFailure::Expired);
        }
        if !self.verified {
            return Err(VerificationFailure::NotVerified);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SendOtpRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    /// Defaults to `guest_request`
    pub purpose: Option<OtpPurpose>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct VerifyOtpRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(equal = 6, message = "The code has 6 digits"))]
    pub code: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OtpSent {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VerificationResult {
    pub email: String,
    pub verified: bool,
    /// The verification lapses at this time if not used
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(now: DateTime<Utc>) -> OtpChallenge {
        OtpChallenge::issue(
            "Guest@Lab.test",
            "123456",
            OtpPurpose::GuestRequest,
            None,
            now,
            Duration::minutes(5),
        )
    }

    #[test]
    fn test_issue_normalizes_and_hashes() {
        let now = Utc::now();
        let c = challenge(now);
        assert_eq!(c.email, "guest@lab.test");
        assert_ne!(c.code_hash, "123456");
        assert_eq!(c.expires_at, now + Duration::minutes(5));
    }

    #[test]
    fn test_match_within_window_verifies() {
        let now = Utc::now();
        let c = challenge(now);
        let attempt = c.attempt("123456", now + Duration::seconds(299), 5);
        assert_eq!(attempt.result, Ok(()));
        let next = attempt.next.unwrap();
        assert!(next.verified);
        assert_eq!(next.revision, 1);
    }

    #[test]
    fn test_expired_challenge_is_deleted() {
        let now = Utc::now();
        let c = challenge(now);
        let attempt = c.attempt("123456", now + Duration::seconds(301), 5);
        assert_eq!(attempt.result, Err(VerificationFailure::Expired));
        assert!(attempt.next.is_none());
    }

    #[test]
    fn test_mismatch_counts_and_exhaustion_deletes() {
        let now = Utc::now();
        let mut c = challenge(now);
        for expected_remaining in (0..5).rev() {
            let attempt = c.attempt("000000", now, 5);
            assert_eq!(
                attempt.result,
                Err(VerificationFailure::Mismatch { remaining: expected_remaining })
            );
            c = attempt.next.unwrap();
        }
        assert_eq!(c.attempts, 5);
        let attempt = c.attempt("123456", now, 5);
        assert_eq!(attempt.result, Err(VerificationFailure::AttemptsExhausted));
        assert!(attempt.next.is_none());
    }

    #[test]
    fn test_verification_has_a_shelf_life() {
        let now = Utc::now();
        let verified = challenge(now).attempt("123456", now, 5).next.unwrap();
        assert!(verified.check_consumable(now + Duration::minutes(4)).is_ok());
        assert_eq!(
            verified.check_consumable(now + Duration::minutes(6)),
            Err(VerificationFailure::Expired)
        );
        assert_eq!(
            challenge(now).check_consumable(now),
            Err(VerificationFailure::NotVerified)
        );
    }
}
