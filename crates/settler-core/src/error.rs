//! Tagged error kinds for the settlement pipeline and the RPC-error
//! classifier that routes them to a retry or a dead-letter outcome.

use thiserror::Error;

/// The decision primitive every settlement failure collapses into.
///
/// Classification is by kind, never by message — callers must not
/// pattern-match on the formatted string.
#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("nonce too low: chain has {current_nonce}, tx used {tx_nonce} (address {address})")]
    NonceTooLow {
        current_nonce: i64,
        tx_nonce: i64,
        address: String,
    },

    #[error("replacement fee too low for {tx_hash:?}: chain gas price {current_gas_price}, tx gas price {tx_gas_price}")]
    ReplacementFeeTooLow {
        tx_hash: Option<String>,
        current_gas_price: u128,
        tx_gas_price: u128,
    },

    #[error("network error: {message}")]
    NetworkError {
        message: String,
        code: Option<String>,
    },

    #[error("execution reverted: {reason}")]
    ExecutionReverted {
        reason: String,
        data: Option<String>,
    },

    #[error("insufficient funds for {address}: required {required}, have {actual}")]
    InsufficientFunds {
        address: String,
        required: String,
        actual: String,
    },

    #[error("validation error on field {field}: {message}")]
    ValidationError { message: String, field: String },

    #[error("store error during {operation}: {message}")]
    StoreError { message: String, operation: String },

    #[error("unknown error: {cause}")]
    Unknown { cause: String },
}

impl SettlementError {
    /// Kind-only classification used by the worker's retry schedule.
    ///
    /// `Unknown` is deliberately permanent: a classifier that cannot
    /// recognize an error should not guess that retrying will help.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SettlementError::NonceTooLow { .. }
                | SettlementError::ReplacementFeeTooLow { .. }
                | SettlementError::NetworkError { .. }
        )
    }

    /// Render a single-line, human-readable form for `Store::record_error`
    /// and DLQ `error_details`.
    pub fn formatted(&self) -> String {
        self.to_string()
    }
}

/// Standalone classifier, kept separate from the method so call sites
/// that only hold a `&SettlementError` behind a trait object still read
/// naturally as `is_transient(&err)`, matching spec §4.8's naming.
pub fn is_transient(err: &SettlementError) -> bool {
    err.is_transient()
}

/// Parse a raw RPC error (message + optional normalized code) into a
/// `SettlementError`. Case-insensitive substring match per spec §4.8.
pub fn parse_rpc_error(message: &str, code: Option<&str>) -> SettlementError {
    let lower = message.to_lowercase();
    let code_lower = code.map(str::to_lowercase).unwrap_or_default();

    if lower.contains("nonce too low") || code_lower == "nonce_too_low" {
        let (current_nonce, tx_nonce) = parse_two_integers(&lower).unwrap_or((-1, -1));
        return SettlementError::NonceTooLow {
            current_nonce,
            tx_nonce,
            address: extract_address(&lower).unwrap_or_default(),
        };
    }

    if lower.contains("replacement fee too low")
        || lower.contains("replacement transaction underpriced")
        || lower.contains("gas price too low")
    {
        let (current, tx) = parse_two_integers(&lower).unwrap_or((0, 0));
        return SettlementError::ReplacementFeeTooLow {
            tx_hash: extract_tx_hash(&lower),
            current_gas_price: current.max(0) as u128,
            tx_gas_price: tx.max(0) as u128,
        };
    }

    if lower.contains("insufficient funds") || lower.contains("insufficient balance") {
        return SettlementError::InsufficientFunds {
            address: extract_address(&lower).unwrap_or_default(),
            required: "unknown".to_string(),
            actual: "unknown".to_string(),
        };
    }

    if lower.contains("execution reverted") || lower.contains("reverted") {
        return SettlementError::ExecutionReverted {
            reason: message.to_string(),
            data: None,
        };
    }

    if lower.contains("network")
        || lower.contains("enotfound")
        || lower.contains("econnrefused")
        || lower.contains("timed out")
    {
        return SettlementError::NetworkError {
            message: message.to_string(),
            code: code.map(str::to_string),
        };
    }

    SettlementError::Unknown {
        cause: message.to_string(),
    }
}

/// Best-effort extraction of two integers from an error message, used
/// for `NonceTooLow`/`ReplacementFeeTooLow` message parsing. Returns
/// `None` (caller substitutes the sentinel `-1`) when fewer than two
/// integers are found.
fn parse_two_integers(message: &str) -> Option<(i64, i64)> {
    let mut found = message
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok());
    let first = found.next()?;
    let second = found.next()?;
    Some((first, second))
}

fn extract_tx_hash(message: &str) -> Option<String> {
    message
        .split_whitespace()
        .find(|tok| tok.starts_with("0x") && tok.len() >= 10)
        .map(str::to_string)
}

fn extract_address(message: &str) -> Option<String> {
    message
        .split_whitespace()
        .find(|tok| tok.starts_with("0x") && tok.len() == 42)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_kinds() {
        assert!(is_transient(&SettlementError::NonceTooLow {
            current_nonce: 1,
            tx_nonce: 0,
            address: String::new()
        }));
        assert!(is_transient(&SettlementError::NetworkError {
            message: String::new(),
            code: None
        }));
        assert!(!is_transient(&SettlementError::ExecutionReverted {
            reason: String::new(),
            data: None
        }));
        assert!(!is_transient(&SettlementError::Unknown {
            cause: String::new()
        }));
    }

    #[test]
    fn parses_nonce_too_low_with_integers() {
        let err = parse_rpc_error("nonce too low: expected 7, got 5", None);
        match err {
            SettlementError::NonceTooLow {
                current_nonce,
                tx_nonce,
                ..
            } => {
                assert_eq!(current_nonce, 7);
                assert_eq!(tx_nonce, 5);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn nonce_too_low_falls_back_to_sentinel() {
        let err = parse_rpc_error("Nonce too low", None);
        match err {
            SettlementError::NonceTooLow {
                current_nonce,
                tx_nonce,
                ..
            } => {
                assert_eq!(current_nonce, -1);
                assert_eq!(tx_nonce, -1);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn parses_execution_reverted() {
        let err = parse_rpc_error("Execution reverted: insufficient allowance", None);
        assert!(matches!(err, SettlementError::ExecutionReverted { .. }));
        assert!(!is_transient(&err));
    }

    #[test]
    fn parses_network_error_by_code() {
        let err = parse_rpc_error("connect failed", Some("ECONNREFUSED"));
        assert!(matches!(err, SettlementError::NetworkError { .. }));
    }

    #[test]
    fn unrecognized_message_is_unknown_and_permanent() {
        let err = parse_rpc_error("some never-seen-before failure", None);
        assert!(matches!(err, SettlementError::Unknown { .. }));
        assert!(!is_transient(&err));
    }
}
