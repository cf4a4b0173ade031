//! Pure validation of child profiles. Every violation is reported, nothing short-circuits.

use kube::ResourceExt;

pub mod catalog;
pub mod field;
pub mod names;
pub mod quantity;

pub use self::field::{ErrorList, ErrorType, FieldError, FieldPath, aggregate};

use self::{
    catalog::validate_catalog,
    names::{is_dns1123_label, is_dns1123_subdomain},
};
use crate::crds::{ChildProfile, PARENT_KIND, ParentRef};

const FIELD_IMMUTABLE: &str = "field is immutable";

/// Validates a child profile as it would be persisted on create.
pub fn validate_child_profile<K: ChildProfile>(profile: &K) -> ErrorList {
    let mut errors = validate_object_meta(profile);
    let spec_path = FieldPath::new("spec");
    errors.extend(validate_parent(profile.parent_ref(), &spec_path.child("parent")));
    errors.extend(validate_catalog(profile.catalog(), &spec_path));
    errors
}

/// Validates an update. Entries missing from `new` compared to `old` are never an
/// error, so expired versions can be pruned on every write.
pub fn validate_child_profile_update<K: ChildProfile>(new: &K, old: &K) -> ErrorList {
    let mut errors = ErrorList::new();
    let metadata = FieldPath::new("metadata");
    if new.meta().name != old.meta().name {
        errors.push(FieldError::invalid(
            &metadata.child("name"),
            new.name_any(),
            FIELD_IMMUTABLE,
        ));
    }
    if new.meta().namespace != old.meta().namespace {
        errors.push(FieldError::invalid(
            &metadata.child("namespace"),
            new.namespace().unwrap_or_default(),
            FIELD_IMMUTABLE,
        ));
    }
    errors.extend(validate_child_profile(new));
    errors
}

fn validate_object_meta<K: ChildProfile>(profile: &K) -> ErrorList {
    let mut errors = ErrorList::new();
    let metadata = FieldPath::new("metadata");

    let name_path = metadata.child("name");
    match profile.meta().name.as_deref() {
        None | Some("") => errors.push(FieldError::required(&name_path, "name is required")),
        Some(name) => errors.extend(
            is_dns1123_subdomain(name)
                .into_iter()
                .map(|msg| FieldError::invalid(&name_path, name, msg)),
        ),
    }

    let namespace_path = metadata.child("namespace");
    match profile.meta().namespace.as_deref() {
        None | Some("") => errors.push(FieldError::required(
            &namespace_path,
            "namespace is required",
        )),
        Some(namespace) => errors.extend(
            is_dns1123_label(namespace)
                .into_iter()
                .map(|msg| FieldError::invalid(&namespace_path, namespace, msg)),
        ),
    }

    errors
}

fn validate_parent(parent: ParentRef<'_>, path: &FieldPath) -> ErrorList {
    let mut errors = ErrorList::new();
    match parent {
        ParentRef::Structured(reference) => {
            if reference.kind != PARENT_KIND {
                errors.push(FieldError::invalid(
                    &path.child("kind"),
                    &reference.kind,
                    format!("must be {PARENT_KIND:?}"),
                ));
            }
            if reference.name.is_empty() {
                errors.push(FieldError::required(
                    &path.child("name"),
                    "must provide a parent name",
                ));
            }
        }
        ParentRef::Named(name) => {
            if name.is_empty() {
                errors.push(FieldError::required(path, "must provide a parent name"));
            }
        }
    }
    errors
}
