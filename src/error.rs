//! Application-level error carrying a process exit code.
//!
//! Library modules return their own `thiserror` enums so callers can match on the
//! failure kind (e.g. a missing inventory year). At the application boundary those are
//! folded into an `AppError` with one of the exit codes below:
//!
//! - `2`: configuration or input problems (bad flags, unreadable files, conflicting selections)
//! - `3`: not enough data to produce a result
//! - `4`: numerical failure during fitting or estimation

use crate::emission::EmissionError;
use crate::fit::FitError;
use crate::io::IngestError;
use crate::select::SelectError;
use crate::store::StoreError;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<SelectError> for AppError {
    fn from(err: SelectError) -> Self {
        AppError::new(2, err.to_string())
    }
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        let code = match err {
            FitError::TooFewPoints { .. } => 3,
            _ => 4,
        };
        AppError::new(code, err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::new(2, err.to_string())
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let code = match err {
            IngestError::Empty { .. } => 3,
            _ => 2,
        };
        AppError::new(code, err.to_string())
    }
}

impl From<EmissionError> for AppError {
    fn from(err: EmissionError) -> Self {
        let code = match err {
            EmissionError::NoValidSlopes { .. } => 3,
            _ => 2,
        };
        AppError::new(code, err.to_string())
    }
}
