//! Protocol error definitions.

use odra::prelude::*;

/// Liquidation engine errors
#[repr(u16)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CdpError {
    // Trove errors (1xx)
    TroveNotActive = 100,
    TroveAlreadyActive = 101,
    ZeroCollateral = 102,
    ZeroDebt = 103,
    BelowMcr = 104,
    BelowCcrInRecoveryMode = 105,
    NewTcrBelowCcr = 106,

    // Oracle errors (2xx)
    PrimaryOracleUnavailable = 200,

    // Access control errors (4xx)
    Unauthorized = 400,
    UnauthorizedProtocol = 401,
    AddressesAlreadySet = 402,
    AddressesNotSet = 403,

    // Token errors (5xx)
    TokenTransferFailed = 500,
    InsufficientTokenBalance = 501,
    InsufficientAllowance = 502,

    // Stability pool errors (6xx)
    SpZeroAmount = 600,
    SpNoDeposit = 601,
    SpOffsetExceedsDeposits = 602,

    // Liquidation errors (7xx)
    NothingToLiquidate = 700,

    // Surplus errors (8xx)
    NoCollateralAvailable = 800,

    // Sorted list errors (85x)
    ListFull = 850,
    ListContainsNode = 851,
    ListMissingNode = 852,
    ZeroNicr = 853,

    // Configuration errors (9xx)
    InvalidConfig = 900,
}

impl CdpError {
    pub const fn message(&self) -> &'static str {
        match self {
            // Trove
            CdpError::TroveNotActive => "Trove does not exist or is closed",
            CdpError::TroveAlreadyActive => "Trove already active for this owner",
            CdpError::ZeroCollateral => "Collateral must be non-zero",
            CdpError::ZeroDebt => "Debt must be non-zero",
            CdpError::BelowMcr => "Below minimum collateralization ratio",
            CdpError::BelowCcrInRecoveryMode => "Recovery mode: ICR below critical ratio",
            CdpError::NewTcrBelowCcr => "Operation would push TCR below critical ratio",

            // Oracle
            CdpError::PrimaryOracleUnavailable => "Primary oracle has no usable price",

            // Access control
            CdpError::Unauthorized => "Unauthorized: caller is not admin",
            CdpError::UnauthorizedProtocol => "Unauthorized: caller is not protocol contract",
            CdpError::AddressesAlreadySet => "Contract addresses already set",
            CdpError::AddressesNotSet => "Contract addresses not set",

            // Token
            CdpError::TokenTransferFailed => "Token transfer failed",
            CdpError::InsufficientTokenBalance => "Insufficient token balance",
            CdpError::InsufficientAllowance => "Insufficient allowance",

            // Stability pool
            CdpError::SpZeroAmount => "Stability pool: amount must be non-zero",
            CdpError::SpNoDeposit => "Stability pool: caller has no deposit",
            CdpError::SpOffsetExceedsDeposits => "Stability pool: offset exceeds deposits",

            // Liquidation
            CdpError::NothingToLiquidate => "Nothing to liquidate",

            // Surplus
            CdpError::NoCollateralAvailable => "No collateral available to claim",

            // Sorted list
            CdpError::ListFull => "Sorted list is full",
            CdpError::ListContainsNode => "Sorted list already contains node",
            CdpError::ListMissingNode => "Sorted list does not contain node",
            CdpError::ZeroNicr => "Nominal ICR must be positive",

            // Config
            CdpError::InvalidConfig => "Invalid configuration parameter",
        }
    }
}

impl core::fmt::Display for CdpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.message())
    }
}

impl From<CdpError> for OdraError {
    fn from(error: CdpError) -> Self {
        #[cfg(target_arch = "wasm32")]
        {
            OdraError::user(error as u16)
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            OdraError::user(error as u16, error.message())
        }
    }
}
