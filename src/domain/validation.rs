//! Field rules for users and catalogue entries.
//!
//! Checks accumulate into [`Violations`] so a single response can report every problem.

use itsm_api_types::{ServiceCategory, ServiceStatus};

use super::error::DomainError;

pub const SERVICE_NAME_MIN_CHARS: usize = 3;
pub const SERVICE_NAME_MAX_CHARS: usize = 100;

#[derive(Debug, Default)]
pub struct Violations {
    details: Vec<String>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, detail: impl Into<String>) {
        self.details.push(detail.into());
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }

    pub fn into_result(self) -> Result<(), DomainError> {
        if self.details.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation(self.details))
        }
    }
}

pub fn check_service_name(name: &str, violations: &mut Violations) {
    if name.trim().is_empty() {
        violations.push("Service name is required.");
        return;
    }
    let length = name.chars().count();
    if !(SERVICE_NAME_MIN_CHARS..=SERVICE_NAME_MAX_CHARS).contains(&length) {
        violations.push(format!(
            "Name must be between {SERVICE_NAME_MIN_CHARS} and {SERVICE_NAME_MAX_CHARS} characters."
        ));
    }
}

pub fn check_owner(owner: &str, violations: &mut Violations) {
    if owner.trim().is_empty() {
        violations.push("Service owner is required.");
    }
}

pub fn parse_category(value: &str, violations: &mut Violations) -> Option<ServiceCategory> {
    match value.parse() {
        Ok(category) => Some(category),
        Err(_) => {
            let allowed: Vec<&str> = ServiceCategory::ALL.iter().map(|c| c.as_str()).collect();
            violations.push(format!("Category must be one of: {}.", allowed.join(", ")));
            None
        }
    }
}

pub fn parse_status(value: &str, violations: &mut Violations) -> Option<ServiceStatus> {
    match value.parse() {
        Ok(status) => Some(status),
        Err(_) => {
            let allowed: Vec<&str> = ServiceStatus::ALL.iter().map(|s| s.as_str()).collect();
            violations.push(format!("Status must be one of: {}.", allowed.join(", ")));
            None
        }
    }
}

pub fn check_user_name(name: &str, violations: &mut Violations) {
    if name.trim().is_empty() {
        violations.push("Name is required.");
    }
}

pub fn check_email(email: &str, violations: &mut Violations) {
    if email.trim().is_empty() {
        violations.push("Email is required.");
    } else if !is_email(email) {
        violations.push("Email must be a valid address.");
    }
}

pub fn check_password(password: &str, violations: &mut Violations) {
    if password.is_empty() {
        violations.push("Password is required.");
    }
}

/// Structural address check: one `@`, a non-empty local part and a dotted domain.
pub fn is_email(candidate: &str) -> bool {
    if candidate.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_length_counts_characters() {
        let mut violations = Violations::new();
        check_service_name("Suporte Técnico", &mut violations);
        check_service_name("ção", &mut violations);
        assert!(violations.is_empty());

        check_service_name("ab", &mut violations);
        check_service_name(&"x".repeat(101), &mut violations);
        check_service_name("   ", &mut violations);
        match violations.into_result() {
            Err(DomainError::Validation { details }) => {
                assert_eq!(details.len(), 3);
                assert_eq!(details[2], "Service name is required.");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unknown_category_lists_allowed_values() {
        let mut violations = Violations::new();
        assert_eq!(
            parse_category("Infraestrutura", &mut violations),
            Some(ServiceCategory::Infrastructure)
        );
        assert_eq!(parse_category("Network", &mut violations), None);
        let err = violations.into_result().expect_err("invalid category");
        assert!(err.to_string().contains("Infraestrutura, Software"));
    }

    #[test]
    fn email_shapes() {
        assert!(is_email("ana@example.com"));
        assert!(is_email("ops+alerts@corp.example.org"));
        assert!(!is_email("ana@example"));
        assert!(!is_email("@example.com"));
        assert!(!is_email("ana@@example.com"));
        assert!(!is_email("ana smith@example.com"));
        assert!(!is_email("ana@example..com"));
    }
}
