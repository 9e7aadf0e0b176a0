//! Email verification gate
//!
//! A challenge is issued by `send`, marked verified by `verify`, and deleted
//! by the operation it guards (`consume`). Every stored change goes through
//! compare-and-swap, so concurrent verifications of the same email cannot
//! both count, and a consumed challenge cannot be consumed twice.

use chrono::Duration;
use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{
    notifier::{Dispatcher, TemplateKind},
    Committed,
};
use crate::{
    circulation::Clock,
    config::OtpConfig,
    error::{AppError, AppResult},
    models::otp::{normalize_email, OtpChallenge, OtpPurpose, OtpSent, VerificationFailure, VerificationResult},
    repository::ChallengeStore,
};

/// Lost compare-and-swap races tolerated before giving up
const CAS_RETRIES: usize = 3;

#[derive(Clone)]
pub struct OtpService {
    store: Arc<dyn ChallengeStore>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    config: OtpConfig,
}

impl OtpService {
    pub fn new(
        store: Arc<dyn ChallengeStore>,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
        config: OtpConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            config,
        }
    }

    fn window(&self, purpose: OtpPurpose) -> Duration {
        match purpose {
            OtpPurpose::GuestRequest => Duration::minutes(self.config.guest_window_minutes),
            OtpPurpose::Registration => Duration::minutes(self.config.registration_window_minutes),
        }
    }

    fn generate_code() -> String {
        format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
    }

    fn contention() -> AppError {
        AppError::Conflict("The verification code is being used concurrently, try again".to_string())
    }

    /// Issue a new code for `email`, replacing any live challenge
    pub async fn send(
        &self,
        email: &str,
        purpose: OtpPurpose,
        payload: Option<Value>,
    ) -> AppResult<Committed<OtpSent>> {
        let email = normalize_email(email);
        let now = self.clock.now();
        let code = Self::generate_code();
        let challenge = OtpChallenge::issue(&email, &code, purpose, payload, now, self.window(purpose));
        self.store.replace(&challenge).await?;

        tracing::info!(
            email = %email,
            purpose = %purpose,
            expires_at = %challenge.expires_at,
            "Verification code issued"
        );

        let mut warnings = Vec::new();
        self.dispatcher
            .dispatch_into(
                &mut warnings,
                &email,
                TemplateKind::OtpCode,
                json!({
                    "code": code,
                    "purpose": purpose,
                    "expires_at": challenge.expires_at.to_rfc3339(),
                }),
            )
            .await;

        Ok(Committed::new(
            OtpSent {
                email,
                expires_at: challenge.expires_at,
            },
            warnings,
        ))
    }

    /// Check `code` for `email`; a match leaves the challenge verified but live
    pub async fn verify(&self, email: &str, code: &str) -> AppResult<VerificationResult> {
        let email = normalize_email(email);
        for _ in 0..CAS_RETRIES {
            let now = self.clock.now();
            let current = self
                .store
                .load(&email)
                .await?
                .ok_or(VerificationFailure::NoChallenge)?;

            let attempt = current.attempt(code, now, self.config.max_attempts);
            let stored = match attempt.next {
                Some(ref next) if *next == current => true,
                ref next => self.store.compare_and_swap(&current, next.as_ref()).await?,
            };
            if !stored {
                continue;
            }

            if let Err(failure) = attempt.result {
                tracing::debug!(email = %email, reason = %failure, "Verification failed");
                return Err(failure.into());
            }
            tracing::info!(email = %email, "Email verified");
            return Ok(VerificationResult {
                email,
                verified: true,
                expires_at: current.expires_at,
            });
        }
        Err(Self::contention())
    }

    /// Verified challenge for `email`, left in place until `redeem`
    pub async fn verified_challenge(&self, email: &str, purpose: OtpPurpose) -> AppResult<OtpChallenge> {
        let email = normalize_email(email);
        let current = self
            .store
            .load(&email)
            .await?
            .filter(|c| c.purpose == purpose)
            .ok_or(VerificationFailure::NoChallenge)?;

        if let Err(failure) = current.check_consumable(self.clock.now()) {
            if failure == VerificationFailure::Expired {
                self.store.compare_and_swap(&current, None).await?;
            }
            return Err(failure.into());
        }
        Ok(current)
    }

    /// Delete `challenge` on behalf of the operation it guards.
    ///
    /// Fails when the challenge was replaced or used up since it was loaded;
    /// a revision bump that keeps it consumable is retried.
    pub async fn redeem(&self, challenge: &OtpChallenge) -> AppResult<()> {
        let mut current = challenge.clone();
        for _ in 0..CAS_RETRIES {
            if self.store.compare_and_swap(&current, None).await? {
                tracing::debug!(email = %current.email, purpose = %current.purpose, "Verification consumed");
                return Ok(());
            }
            let reloaded = self.verified_challenge(&current.email, current.purpose).await?;
            if reloaded.id != challenge.id {
                return Err(VerificationFailure::NoChallenge.into());
            }
            current = reloaded;
        }
        Err(Self::contention())
    }

    /// Delete every challenge expired at the current time
    pub async fn purge_expired(&self) -> AppResult<u64> {
        self.store.purge_expired(self.clock.now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_have_six_digits() {
        for _ in 0..100 {
            let code = OtpService::generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
