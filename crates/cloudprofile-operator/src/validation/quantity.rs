use std::sync::LazyLock;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use regex::Regex;

use super::field::{ErrorList, FieldError, FieldPath};

// <signedNumber><suffix>, see k8s.io/apimachinery/pkg/api/resource/quantity.go
static QUANTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+))(Ki|Mi|Gi|Ti|Pi|Ei|n|u|m|k|M|G|T|P|E|[eE][+-]?[0-9]+)?$")
        .expect("failed to compile quantity regex")
});

/// Numeric part of a quantity, ignoring the suffix. `None` if it does not parse.
pub fn signed_value(quantity: &Quantity) -> Option<f64> {
    let captures = QUANTITY_REGEX.captures(quantity.0.trim())?;
    captures.get(1)?.as_str().parse().ok()
}

pub fn validate_non_negative(quantity: &Quantity, path: &FieldPath) -> ErrorList {
    match signed_value(quantity) {
        None => vec![FieldError::invalid(
            path,
            &quantity.0,
            format!(
                "quantities must match the regular expression '{}'",
                QUANTITY_REGEX.as_str()
            ),
        )],
        Some(value) if value < 0.0 => vec![FieldError::invalid(
            path,
            &quantity.0,
            "must be greater than or equal to 0",
        )],
        Some(_) => ErrorList::new(),
    }
}
