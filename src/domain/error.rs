use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain entity `{entity}` not found")]
    NotFound { entity: &'static str },
    #[error("domain validation failed: {}", details.join("; "))]
    Validation { details: Vec<String> },
}

impl DomainError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn validation(details: Vec<String>) -> Self {
        Self::Validation { details }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::Validation {
            details: vec![detail.into()],
        }
    }
}
