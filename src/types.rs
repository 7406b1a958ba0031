//! Process exit codes.

use crate::{commands, config, stack};

/// Exit codes for the CLI application.
///
/// - 0 successful completion, including a declined confirmation
/// - 1 unexpected failure
/// - 2 missing, malformed or incomplete configuration
/// - 3 lint findings from `validate --strict`
/// - 4 CloudFormation reported a failure
/// - 130 interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    GeneralError,
    ConfigError,
    ValidationError,
    ProviderError,
    Interrupted,
}

impl ExitCode {
    /// Convert to the integer exit code for process::exit()
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::GeneralError => 1,
            Self::ConfigError => 2,
            Self::ValidationError => 3,
            Self::ProviderError => 4,
            Self::Interrupted => 130,
        }
    }

    /// Classifies a failed command by the first domain error in its chain.
    pub fn for_error(error: &anyhow::Error) -> Self {
        for cause in error.chain() {
            if cause.downcast_ref::<config::Error>().is_some()
                || cause.downcast_ref::<commands::Error>().is_some()
            {
                return Self::ConfigError;
            }
            if cause.downcast_ref::<stack::Error>().is_some() {
                return Self::ProviderError;
            }
        }

        Self::GeneralError
    }
}

impl From<ExitCode> for i32 {
    fn from(exit_code: ExitCode) -> Self {
        exit_code.code()
    }
}
