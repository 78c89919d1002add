//! Status enumerations persisted as small integers.

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Lifecycle of a review row. Hidden is only reached through an approved appeal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    Hidden,
}

impl ReviewStatus {
    pub const fn code(self) -> i16 {
        match self {
            ReviewStatus::Pending => 0,
            ReviewStatus::Approved => 20,
            ReviewStatus::Rejected => 30,
            ReviewStatus::Hidden => 40,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
            ReviewStatus::Hidden => "hidden",
        }
    }
}

impl From<ReviewStatus> for i16 {
    fn from(value: ReviewStatus) -> Self {
        value.code()
    }
}

impl TryFrom<i16> for ReviewStatus {
    type Error = DomainError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ReviewStatus::Pending),
            20 => Ok(ReviewStatus::Approved),
            30 => Ok(ReviewStatus::Rejected),
            40 => Ok(ReviewStatus::Hidden),
            other => Err(DomainError::unknown_status("review", other)),
        }
    }
}

/// Lifecycle of a store appeal. Anything past `Pending` is audited and frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
pub enum AppealStatus {
    Pending,
    Approved,
    Rejected,
}

impl AppealStatus {
    pub const fn code(self) -> i16 {
        match self {
            AppealStatus::Pending => 10,
            AppealStatus::Approved => 20,
            AppealStatus::Rejected => 30,
        }
    }

    /// Audited appeals accept no resubmission.
    pub const fn is_audited(self) -> bool {
        self.code() > AppealStatus::Pending.code()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppealStatus::Pending => "pending",
            AppealStatus::Approved => "approved",
            AppealStatus::Rejected => "rejected",
        }
    }
}

impl From<AppealStatus> for i16 {
    fn from(value: AppealStatus) -> Self {
        value.code()
    }
}

impl TryFrom<i16> for AppealStatus {
    type Error = DomainError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        match code {
            10 => Ok(AppealStatus::Pending),
            20 => Ok(AppealStatus::Approved),
            30 => Ok(AppealStatus::Rejected),
            other => Err(DomainError::unknown_status("appeal", other)),
        }
    }
}
