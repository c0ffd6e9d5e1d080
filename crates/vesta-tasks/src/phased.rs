//! Phase selection convention shared by multi-phase services

use vesta_core::Params;

/// Phase selected by `params.phase`; absent means phase 1.
#[must_use]
pub fn phase_from_params(params: &Params) -> u32 {
    params
        .get("phase")
        .and_then(serde_json::Value::as_u64)
        .and_then(|p| u32::try_from(p).ok())
        .unwrap_or(1)
}

/// The externally supplied operation id carrying state between phases.
#[must_use]
pub fn operation_id_from_params(params: &Params) -> Option<&str> {
    params.get("operation_id").and_then(serde_json::Value::as_str)
}
