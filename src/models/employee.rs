use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Maximum accepted length of an employee identifier
pub const MAX_EMPLOYEE_ID_LENGTH: usize = 64;

/// Unique external identifier of an employee record (national ID number / DPI).
///
/// Identifiers are embedded in storage keys as `<id>_<timestamp>.jpg`, so they are
/// restricted to ASCII alphanumerics and `-`. The `_` separator never appears inside
/// an identifier, which keeps `<id>_` an unambiguous prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
pub struct EmployeeId(String);

impl EmployeeId {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err("Employee identifier cannot be empty".to_string());
        }

        if trimmed.len() > MAX_EMPLOYEE_ID_LENGTH {
            return Err(format!(
                "Employee identifier too long (max {} characters)",
                MAX_EMPLOYEE_ID_LENGTH
            ));
        }

        if let Some(bad) = trimmed.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '-')) {
            return Err(format!("Employee identifier contains invalid character {:?}", bad));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix shared by every storage key derived for this employee
    pub fn key_prefix(&self) -> String {
        format!("{}_", self.0)
    }
}

impl std::fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EmployeeId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EmployeeId> for String {
    fn from(value: EmployeeId) -> Self {
        value.0
    }
}

impl std::str::FromStr for EmployeeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
