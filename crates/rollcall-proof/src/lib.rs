//! Rollcall proof checks
//!
//! Decides whether a submitted proof of presence satisfies an activity's
//! verification settings. Knows nothing about activity status or the ledger;
//! callers run this inside the participation transaction.

pub mod geo;
pub mod qr;
pub mod token;

use thiserror::Error;
use uuid::Uuid;

use rollcall_types::models::{Proof, Verification};

use crate::token::CheckinTokens;

#[derive(Debug, Error, PartialEq)]
pub enum ProofError {
    #[error("{submitted} proof does not match the activity's {expected} verification")]
    WrongMethod {
        expected: &'static str,
        submitted: &'static str,
    },

    #[error("wrong check-in password")]
    WrongPassword,

    #[error("check-in token is invalid or expired")]
    InvalidToken,

    #[error("check-in token belongs to another activity")]
    TokenMismatch,

    #[error("{distance_m:.0} m from the check-in point, allowed {radius_m:.0} m")]
    OutOfRange { distance_m: f64, radius_m: f64 },

    #[error("could not issue check-in token: {0}")]
    Issue(String),
}

/// Verifies participation proofs. One instance is shared by the whole server.
pub struct ProofVerifier {
    tokens: CheckinTokens,
}

impl ProofVerifier {
    pub fn new(tokens: CheckinTokens) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &CheckinTokens {
        &self.tokens
    }

    pub fn verify(
        &self,
        activity_id: Uuid,
        verification: &Verification,
        proof: &Proof,
    ) -> Result<(), ProofError> {
        match (verification, proof) {
            (Verification::Password { password }, Proof::Password { password: submitted }) => {
                if password == submitted {
                    Ok(())
                } else {
                    Err(ProofError::WrongPassword)
                }
            }
            (Verification::QrToken, Proof::QrToken { token }) => {
                self.tokens.verify(token, activity_id)
            }
            (
                Verification::Geofence {
                    latitude,
                    longitude,
                    radius_m,
                },
                Proof::Geofence {
                    latitude: lat,
                    longitude: lng,
                },
            ) => {
                let distance_m = geo::distance_m(*latitude, *longitude, *lat, *lng);
                if distance_m <= *radius_m {
                    Ok(())
                } else {
                    Err(ProofError::OutOfRange {
                        distance_m,
                        radius_m: *radius_m,
                    })
                }
            }
            (expected, submitted) => Err(ProofError::WrongMethod {
                expected: expected.mode().as_str(),
                submitted: match submitted {
                    Proof::Password { .. } => "password",
                    Proof::QrToken { .. } => "qr_token",
                    Proof::Geofence { .. } => "geofence",
                },
            }),
        }
    }
}
