//! Field scoped validation errors, shaped like the Kubernetes API server reports them.

use std::fmt::{self, Display};

/// Dotted path to a field, e.g. `spec.machineImages[0].versions[1].cri`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(root: &str) -> Self {
        Self(root.to_owned())
    }

    pub fn child(&self, name: &str) -> Self {
        Self(format!("{}.{name}", self.0))
    }

    pub fn index(&self, index: usize) -> Self {
        Self(format!("{}[{index}]", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorType {
    Required,
    Invalid,
    Duplicate,
    NotSupported,
    Forbidden,
}

impl Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorType::Required => "Required value",
            ErrorType::Invalid => "Invalid value",
            ErrorType::Duplicate => "Duplicate value",
            ErrorType::NotSupported => "Unsupported value",
            ErrorType::Forbidden => "Forbidden",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    pub error_type: ErrorType,
    pub field: String,
    pub bad_value: Option<String>,
    pub detail: String,
}

impl FieldError {
    pub fn required(field: &FieldPath, detail: impl Into<String>) -> Self {
        Self::new(ErrorType::Required, field, None, detail.into())
    }

    pub fn invalid(field: &FieldPath, value: impl Display, detail: impl Into<String>) -> Self {
        Self::new(
            ErrorType::Invalid,
            field,
            Some(value.to_string()),
            detail.into(),
        )
    }

    pub fn duplicate(field: &FieldPath, value: impl Display) -> Self {
        Self::new(
            ErrorType::Duplicate,
            field,
            Some(value.to_string()),
            String::new(),
        )
    }

    pub fn not_supported(field: &FieldPath, value: impl Display, supported: &[&str]) -> Self {
        let quoted: Vec<String> = supported.iter().map(|value| format!("{value:?}")).collect();
        Self::new(
            ErrorType::NotSupported,
            field,
            Some(value.to_string()),
            format!("supported values: {}", quoted.join(", ")),
        )
    }

    pub fn forbidden(field: &FieldPath, detail: impl Into<String>) -> Self {
        Self::new(ErrorType::Forbidden, field, None, detail.into())
    }

    fn new(
        error_type: ErrorType,
        field: &FieldPath,
        bad_value: Option<String>,
        detail: String,
    ) -> Self {
        Self {
            error_type,
            field: field.to_string(),
            bad_value,
            detail,
        }
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.error_type)?;
        if let Some(value) = &self.bad_value {
            write!(f, ": {value:?}")?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for FieldError {}

pub type ErrorList = Vec<FieldError>;

/// Renders a list the way aggregated API errors read: `[first, second]`.
pub fn aggregate(errors: &[FieldError]) -> String {
    match errors {
        [single] => single.to_string(),
        _ => {
            let rendered: Vec<String> = errors.iter().map(ToString::to_string).collect();
            format!("[{}]", rendered.join(", "))
        }
    }
}
