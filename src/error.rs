pub type LedgerResult<T> = Result<T, LedgerError>;

/// Coarse classification used by the api layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Integrity,
    Internal,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    #[error("quantity {0} is negative")]
    NegativeQuantity(i64),
    #[error("quantity must be greater than zero")]
    ZeroQuantity,
    #[error("unit price {0} is negative")]
    NegativeUnitPrice(rust_decimal::Decimal),
    #[error("line total overflowed")]
    Overflow,
}

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("integrity violation: {0}")]
    Integrity(String),
    #[error("inquiry '{inquiry_id}' is {status} and no longer accepts changes")]
    InvalidState { inquiry_id: String, status: String },
    #[error("pricing rejected the line: {0}")]
    Pricing(#[from] PricingError),
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encoding(String),
    #[error("failed to decode record: {0}")]
    Decoding(#[from] minicbor::decode::Error),
    #[error("failed to generate identifier: {0}")]
    Identifier(String),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation(_) | LedgerError::Pricing(_) => ErrorKind::Validation,
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::Conflict(_) | LedgerError::InvalidState { .. } => ErrorKind::Conflict,
            LedgerError::Integrity(_) => ErrorKind::Integrity,
            LedgerError::Storage(_)
            | LedgerError::Encoding(_)
            | LedgerError::Decoding(_)
            | LedgerError::Identifier(_) => ErrorKind::Internal,
        }
    }

    /// HTTP-style status code for the request/response boundary.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::Integrity => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }
}

impl<E: std::fmt::Debug> From<minicbor::encode::Error<E>> for LedgerError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        LedgerError::Encoding(format!("{value:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_kind() {
        assert_eq!(LedgerError::Validation("x".into()).status_code(), 400);
        assert_eq!(LedgerError::not_found("inquiry", "rfq1").status_code(), 404);
        assert_eq!(LedgerError::Conflict("dup".into()).status_code(), 409);
        assert_eq!(LedgerError::Integrity("orphan".into()).status_code(), 400);
        assert_eq!(
            LedgerError::Pricing(PricingError::ZeroQuantity).kind(),
            ErrorKind::Validation
        );
    }
}
