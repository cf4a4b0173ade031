// Adapted from Kubernetes apimachinery/pkg/util/validation/validation.go and
// apimachinery/pkg/apis/meta/v1/validation/validation.go

use std::{collections::BTreeMap, sync::LazyLock};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use regex::Regex;

use super::field::{ErrorList, FieldError, FieldPath};

const DNS1123_LABEL_FMT: &str = "[a-z0-9]([-a-z0-9]*[a-z0-9])?";
const DNS1123_LABEL_MAX_LENGTH: usize = 63;
const DNS1123_LABEL_ERROR_MSG: &str = "a lowercase RFC 1123 label must consist of lower case alphanumeric characters or '-', and must start and end with an alphanumeric character";

const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;
const DNS1123_SUBDOMAIN_ERROR_MSG: &str = "a lowercase RFC 1123 subdomain must consist of lower case alphanumeric characters, '-' or '.', and must start and end with an alphanumeric character";

const QUALIFIED_NAME_FMT: &str = "([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]";
const QUALIFIED_NAME_MAX_LENGTH: usize = 63;
const QUALIFIED_NAME_ERROR_MSG: &str = "must consist of alphanumeric characters, '-', '_' or '.', and must start and end with an alphanumeric character";

const LABEL_VALUE_MAX_LENGTH: usize = 63;
const LABEL_VALUE_ERROR_MSG: &str = "a valid label must be an empty string or consist of alphanumeric characters, '-', '_' or '.', and must start and end with an alphanumeric character";

static DNS1123_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{DNS1123_LABEL_FMT}$")).expect("failed to compile RFC 1123 label regex")
});

static DNS1123_SUBDOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{DNS1123_LABEL_FMT}(\\.{DNS1123_LABEL_FMT})*$"))
        .expect("failed to compile RFC 1123 subdomain regex")
});

static QUALIFIED_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{QUALIFIED_NAME_FMT}$")).expect("failed to compile qualified name regex")
});

static LABEL_VALUE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^({QUALIFIED_NAME_FMT})?$")).expect("failed to compile label value regex")
});

fn max_len_error(length: usize) -> String {
    format!("must be no more than {length} characters")
}

fn regex_error(msg: &str, regex: &Regex, example: &str) -> String {
    format!(
        "{msg} (e.g. '{example}', regex used for validation is '{}')",
        regex.as_str()
    )
}

/// Messages describing why `value` is not a lowercase RFC 1123 label. Empty if valid.
pub fn is_dns1123_label(value: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if value.len() > DNS1123_LABEL_MAX_LENGTH {
        errors.push(max_len_error(DNS1123_LABEL_MAX_LENGTH));
    }
    if !DNS1123_LABEL_REGEX.is_match(value) {
        errors.push(regex_error(DNS1123_LABEL_ERROR_MSG, &DNS1123_LABEL_REGEX, "my-name"));
    }
    errors
}

/// Messages describing why `value` is not a lowercase RFC 1123 subdomain. Empty if valid.
pub fn is_dns1123_subdomain(value: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if value.len() > DNS1123_SUBDOMAIN_MAX_LENGTH {
        errors.push(max_len_error(DNS1123_SUBDOMAIN_MAX_LENGTH));
    }
    if !DNS1123_SUBDOMAIN_REGEX.is_match(value) {
        errors.push(regex_error(
            DNS1123_SUBDOMAIN_ERROR_MSG,
            &DNS1123_SUBDOMAIN_REGEX,
            "example.com",
        ));
    }
    errors
}

/// Label keys and annotation keys: `[prefix/]name`.
pub fn is_qualified_name(value: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let name = match value.split('/').collect::<Vec<_>>()[..] {
        [name] => name,
        [prefix, name] => {
            if prefix.is_empty() {
                errors.push("prefix part must be non-empty".to_owned());
            } else {
                errors.extend(
                    is_dns1123_subdomain(prefix)
                        .into_iter()
                        .map(|msg| format!("prefix part {msg}")),
                );
            }
            name
        }
        _ => {
            return vec![format!(
                "a qualified name {}",
                regex_error(QUALIFIED_NAME_ERROR_MSG, &QUALIFIED_NAME_REGEX, "MyName")
            )];
        }
    };

    if name.is_empty() {
        errors.push("name part must be non-empty".to_owned());
    } else if name.len() > QUALIFIED_NAME_MAX_LENGTH {
        errors.push(format!("name part {}", max_len_error(QUALIFIED_NAME_MAX_LENGTH)));
    }
    if !QUALIFIED_NAME_REGEX.is_match(name) {
        errors.push(format!(
            "name part {}",
            regex_error(QUALIFIED_NAME_ERROR_MSG, &QUALIFIED_NAME_REGEX, "my.name")
        ));
    }
    errors
}

pub fn is_valid_label_value(value: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if value.len() > LABEL_VALUE_MAX_LENGTH {
        errors.push(max_len_error(LABEL_VALUE_MAX_LENGTH));
    }
    if !LABEL_VALUE_REGEX.is_match(value) {
        errors.push(regex_error(LABEL_VALUE_ERROR_MSG, &LABEL_VALUE_REGEX, "MyValue"));
    }
    errors
}

/// One Invalid error per violated rule, all reported at `path`.
pub fn validate_labels(labels: &BTreeMap<String, String>, path: &FieldPath) -> ErrorList {
    let mut errors = ErrorList::new();
    for (key, value) in labels {
        errors.extend(
            is_qualified_name(key)
                .into_iter()
                .map(|msg| FieldError::invalid(path, key, msg)),
        );
        errors.extend(
            is_valid_label_value(value)
                .into_iter()
                .map(|msg| FieldError::invalid(path, value, msg)),
        );
    }
    errors
}

/// Validates the selector structure. Values of match expressions may be any string.
pub fn validate_label_selector(selector: &LabelSelector, path: &FieldPath) -> ErrorList {
    let mut errors = ErrorList::new();
    for (i, requirement) in selector.match_expressions.iter().flatten().enumerate() {
        errors.extend(validate_selector_requirement(
            requirement,
            &path.child("matchExpressions").index(i),
        ));
    }
    if let Some(labels) = &selector.match_labels {
        errors.extend(validate_labels(labels, &path.child("matchLabels")));
    }
    errors
}

fn validate_selector_requirement(
    requirement: &LabelSelectorRequirement,
    path: &FieldPath,
) -> ErrorList {
    let mut errors = ErrorList::new();
    let has_values = requirement
        .values
        .as_ref()
        .is_some_and(|values| !values.is_empty());
    match requirement.operator.as_str() {
        "In" | "NotIn" if !has_values => errors.push(FieldError::required(
            &path.child("values"),
            "must be specified when `operator` is 'In' or 'NotIn'",
        )),
        "Exists" | "DoesNotExist" if has_values => errors.push(FieldError::forbidden(
            &path.child("values"),
            "may not be specified when `operator` is 'Exists' or 'DoesNotExist'",
        )),
        "In" | "NotIn" | "Exists" | "DoesNotExist" => {}
        other => errors.push(FieldError::invalid(
            &path.child("operator"),
            other,
            "not a valid selector operator",
        )),
    }
    let key_path = path.child("key");
    errors.extend(
        is_qualified_name(&requirement.key)
            .into_iter()
            .map(|msg| FieldError::invalid(&key_path, &requirement.key, msg)),
    );
    errors
}
