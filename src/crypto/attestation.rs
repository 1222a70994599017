// ABOUTME: Remote attestation payload for the crypto core
// ABOUTME: Stable contract across simulation and (future) hardware-backed modes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use serde::Serialize;

/// Attestation mode the crypto core is currently running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationMode {
    /// No trusted-execution hardware backs key storage; this crate's
    /// default and only implemented mode.
    Simulation,
    /// Reserved for a future hardware-backed implementation.
    Hardware,
}

/// Attestation response. `quote` is only populated in hardware mode.
#[derive(Debug, Serialize)]
pub struct Attestation {
    /// Current attestation mode.
    pub mode: AttestationMode,
    /// Wall-clock timestamp of the attestation, RFC3339.
    pub timestamp: String,
    /// Hardware quote, absent in simulation mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    /// Present only in simulation mode, explaining that no real enclave
    /// backs this response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation_notice: Option<String>,
}

/// Build the current attestation payload. This crate only ever runs in
/// simulation mode.
#[must_use]
pub fn attest() -> Attestation {
    Attestation {
        mode: AttestationMode::Simulation,
        timestamp: chrono::Utc::now().to_rfc3339(),
        quote: None,
        simulation_notice: Some(
            "no trusted-execution hardware is present; this attestation is simulated".to_owned(),
        ),
    }
}
