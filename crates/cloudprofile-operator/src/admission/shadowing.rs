use std::collections::HashSet;

use strum::{Display, EnumString, VariantNames};
use thiserror::Error;

use crate::crds::{catalog::CatalogSpec, cloud_profile::CloudProfileSpec};

/// Catalog sections in which a child may not redefine names owned by its parent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString, VariantNames)]
#[strum(serialize_all = "kebab-case")]
pub enum ShadowingScope {
    /// Machine types only.
    #[default]
    MachineTypes,
    /// Machine types, machine images, volume types and regions.
    All,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{kind} attempts to rewrite {section} of parent CloudProfile with {field}: {name}")]
pub struct ShadowingError {
    pub kind: String,
    pub section: &'static str,
    pub field: &'static str,
    pub name: String,
}

struct Section<'a> {
    section: &'static str,
    field: &'static str,
    parent: Vec<&'a str>,
    new: Vec<&'a str>,
    old: Vec<&'a str>,
}

/// Rejects names in `new` that the parent already owns, unless `old` already
/// declared them before the parent did. `old` is `None` on create.
pub fn check_no_shadowing(
    kind: &str,
    parent: &CloudProfileSpec,
    new: &CatalogSpec,
    old: Option<&CatalogSpec>,
    scope: ShadowingScope,
) -> Result<(), ShadowingError> {
    fn names<'a, T>(items: Option<&'a Vec<T>>, name: fn(&'a T) -> &'a str) -> Vec<&'a str> {
        items.into_iter().flatten().map(name).collect()
    }

    let mut sections = vec![Section {
        section: "MachineType",
        field: "machineType",
        parent: parent.machine_types.iter().map(|t| t.name.as_str()).collect(),
        new: names(new.machine_types.as_ref(), |t| t.name.as_str()),
        old: names(old.and_then(|o| o.machine_types.as_ref()), |t| t.name.as_str()),
    }];
    if scope == ShadowingScope::All {
        sections.extend([
            Section {
                section: "MachineImage",
                field: "machineImage",
                parent: parent.machine_images.iter().map(|i| i.name.as_str()).collect(),
                new: names(new.machine_images.as_ref(), |i| i.name.as_str()),
                old: names(old.and_then(|o| o.machine_images.as_ref()), |i| i.name.as_str()),
            },
            Section {
                section: "VolumeType",
                field: "volumeType",
                parent: parent.volume_types.iter().map(|v| v.name.as_str()).collect(),
                new: names(new.volume_types.as_ref(), |v| v.name.as_str()),
                old: names(old.and_then(|o| o.volume_types.as_ref()), |v| v.name.as_str()),
            },
            Section {
                section: "Region",
                field: "region",
                parent: parent.regions.iter().map(|r| r.name.as_str()).collect(),
                new: names(new.regions.as_ref(), |r| r.name.as_str()),
                old: names(old.and_then(|o| o.regions.as_ref()), |r| r.name.as_str()),
            },
        ]);
    }

    for section in sections {
        let owned_by_parent: HashSet<&str> = section.parent.into_iter().collect();
        let owned_before: HashSet<&str> = section.old.into_iter().collect();
        if let Some(name) = section
            .new
            .into_iter()
            .find(|name| owned_by_parent.contains(name) && !owned_before.contains(name))
        {
            return Err(ShadowingError {
                kind: kind.to_owned(),
                section: section.section,
                field: section.field,
                name: name.to_owned(),
            });
        }
    }
    Ok(())
}
