use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;
use semver::{Version, VersionReq};
use strum::VariantNames;
use time::format_description::well_known::Rfc3339;
use x509_cert::Certificate;

use super::{
    field::{ErrorList, FieldError, FieldPath},
    names::{validate_label_selector, validate_labels},
    quantity::validate_non_negative,
};
use crate::crds::catalog::{
    Architecture, CatalogSpec, ContainerRuntime, Cri, CriName, ExpirableVersion,
    KubernetesSettings, MachineImage, MachineImageUpdateStrategy, MachineType, Region,
    VersionClassification, VolumeType,
};

const KUBERNETES_VERSION_FMT: &str = r"^([0-9]+\.){2}[0-9]+$";

static KUBERNETES_VERSION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(KUBERNETES_VERSION_FMT).expect("failed to compile kubernetes version regex")
});

/// Validates every catalog section that is present. Absent sections are not checked.
pub fn validate_catalog(catalog: &CatalogSpec, path: &FieldPath) -> ErrorList {
    let mut errors = ErrorList::new();

    if let Some(kubernetes) = &catalog.kubernetes {
        errors.extend(validate_kubernetes_settings(kubernetes, &path.child("kubernetes")));
    }
    if let Some(images) = &catalog.machine_images {
        errors.extend(validate_machine_images(images, &path.child("machineImages")));
    }
    if let Some(machine_types) = &catalog.machine_types {
        errors.extend(validate_machine_types(machine_types, &path.child("machineTypes")));
    }
    if let Some(volume_types) = &catalog.volume_types {
        errors.extend(validate_volume_types(volume_types, &path.child("volumeTypes")));
    }
    if let Some(regions) = &catalog.regions {
        errors.extend(validate_regions(regions, &path.child("regions")));
    }
    if let Some(selector) = &catalog.seed_selector {
        errors.extend(validate_label_selector(
            &selector.label_selector,
            &path.child("seedSelector"),
        ));
    }
    if let Some(bundle) = &catalog.ca_bundle {
        errors.extend(validate_ca_bundle(bundle, &path.child("caBundle")));
    }

    errors
}

pub fn validate_ca_bundle(bundle: &str, path: &FieldPath) -> ErrorList {
    match Certificate::load_pem_chain(bundle.as_bytes()) {
        Ok(certificates) if !certificates.is_empty() => ErrorList::new(),
        _ => vec![FieldError::invalid(
            path,
            bundle,
            "caBundle is not a valid PEM-encoded certificate",
        )],
    }
}

/// Parses versions the way release tooling writes them: an optional `v`, one to
/// three numeric components, optional pre-release and build metadata.
pub(crate) fn parse_version(version: &str) -> Option<Version> {
    let version = version.strip_prefix('v').unwrap_or(version);
    let (core, rest) = match version.find(['-', '+']) {
        Some(at) => version.split_at(at),
        None => (version, ""),
    };
    let mut components = core.split('.');
    let mut numbers = [0u64; 3];
    for (i, slot) in numbers.iter_mut().enumerate() {
        match components.next() {
            Some(component) => *slot = component.parse().ok()?,
            None if i > 0 => break,
            None => return None,
        }
    }
    if components.next().is_some() {
        return None;
    }
    let [major, minor, patch] = numbers;
    Version::parse(&format!("{major}.{minor}.{patch}{rest}")).ok()
}

fn latest_version<'a>(
    versions: impl IntoIterator<Item = &'a ExpirableVersion>,
) -> Result<Option<&'a ExpirableVersion>, String> {
    let mut latest: Option<(Version, &ExpirableVersion)> = None;
    for candidate in versions {
        let parsed = parse_version(&candidate.version)
            .ok_or_else(|| format!("error while parsing version {:?}", candidate.version))?;
        if latest.as_ref().is_none_or(|(current, _)| parsed > *current) {
            latest = Some((parsed, candidate));
        }
    }
    Ok(latest.map(|(_, version)| version))
}

fn format_date(version: &ExpirableVersion) -> String {
    version
        .expiration_date
        .and_then(|date| date.format(&Rfc3339).ok())
        .unwrap_or_default()
}

pub fn validate_kubernetes_settings(settings: &KubernetesSettings, path: &FieldPath) -> ErrorList {
    let mut errors = ErrorList::new();
    let versions_path = path.child("versions");

    if settings.versions.is_empty() {
        errors.push(FieldError::required(
            &versions_path,
            "must provide at least one Kubernetes version",
        ));
    }

    match latest_version(&settings.versions) {
        Ok(Some(latest)) => {
            if latest.expiration_date.is_some() {
                errors.push(FieldError::invalid(
                    &path.child("versions[]").child("expirationDate"),
                    format_date(latest),
                    format!(
                        "expiration date of latest kubernetes version ('{}') must not be set",
                        latest.version
                    ),
                ));
            }
        }
        Ok(None) | Err(_) => errors.push(FieldError::invalid(
            &versions_path,
            "",
            "failed to determine the latest kubernetes version from the cloud profile",
        )),
    }

    let all: Vec<&ExpirableVersion> = settings.versions.iter().collect();
    let mut found = HashSet::new();
    for (i, version) in settings.versions.iter().enumerate() {
        let version_path = versions_path.index(i);
        if !KUBERNETES_VERSION_REGEX.is_match(&version.version) {
            errors.push(FieldError::invalid(
                &version_path,
                &version.version,
                format!("all Kubernetes versions must match the regex {KUBERNETES_VERSION_FMT}"),
            ));
        } else if !found.insert(version.version.as_str()) {
            errors.push(FieldError::duplicate(
                &version_path.child("version"),
                &version.version,
            ));
        }
        errors.extend(validate_expirable_version(version, i, &all, &version_path));
    }

    errors
}

/// Classification rules shared by Kubernetes and machine image versions.
///
/// `siblings` holds every version of the same list, `index` the position of `version` in it.
fn validate_expirable_version(
    version: &ExpirableVersion,
    index: usize,
    siblings: &[&ExpirableVersion],
    path: &FieldPath,
) -> ErrorList {
    let Some(classification) = &version.classification else {
        return ErrorList::new();
    };
    match classification.parse::<VersionClassification>() {
        Err(_) => vec![FieldError::not_supported(
            &path.child("classification"),
            classification,
            VersionClassification::VARIANTS,
        )],
        Ok(VersionClassification::Supported) => {
            // unparsable versions are reported by the caller
            let Some(current) = parse_version(&version.version) else {
                return ErrorList::new();
            };
            let conflict = siblings.iter().enumerate().any(|(i, other)| {
                i != index
                    && other.is_classified_as(VersionClassification::Supported)
                    && parse_version(&other.version)
                        .is_some_and(|v| v.major == current.major && v.minor == current.minor)
            });
            if conflict {
                vec![FieldError::forbidden(
                    path,
                    format!(
                        "unable to add version {:?} with classification {:?}, only one {:?} version is allowed per minor version",
                        version.version, classification, classification
                    ),
                )]
            } else {
                ErrorList::new()
            }
        }
        Ok(_) => ErrorList::new(),
    }
}

pub fn validate_machine_images(images: &[MachineImage], path: &FieldPath) -> ErrorList {
    let mut errors = ErrorList::new();
    if images.is_empty() {
        errors.push(FieldError::required(path, "must provide at least one machine image"));
        return errors;
    }

    let undeterminable = images.iter().find_map(|image| {
        match latest_version(image.versions.iter().map(|v| &v.expirable)) {
            Ok(Some(_)) => None,
            Ok(None) => Some(format!(
                "could not determine latest version of machine image {:?}: the version list is empty",
                image.name
            )),
            Err(err) => Some(format!(
                "could not determine latest version of machine image {:?}: {err}",
                image.name
            )),
        }
    });
    if let Some(detail) = undeterminable {
        errors.push(FieldError::invalid(path, "", detail));
    }

    let mut names = HashSet::new();
    let mut name_versions = HashSet::new();
    for (i, image) in images.iter().enumerate() {
        let image_path = path.index(i);
        if !names.insert(image.name.as_str()) {
            errors.push(FieldError::duplicate(&image_path, &image.name));
        }
        if image.name.is_empty() {
            errors.push(FieldError::required(
                &image_path.child("name"),
                "machine image name must not be empty",
            ));
        }
        if image.versions.is_empty() {
            errors.push(FieldError::required(
                &image_path.child("versions"),
                format!(
                    "must provide at least one version for the machine image '{}'",
                    image.name
                ),
            ));
        }
        if let Some(strategy) = &image.update_strategy
            && strategy.parse::<MachineImageUpdateStrategy>().is_err()
        {
            errors.push(FieldError::not_supported(
                &image_path.child("updateStrategy"),
                strategy,
                MachineImageUpdateStrategy::VARIANTS,
            ));
        }

        let siblings: Vec<&ExpirableVersion> = image.versions.iter().map(|v| &v.expirable).collect();
        for (j, version) in image.versions.iter().enumerate() {
            let version_path = image_path.child("versions").index(j);
            let key = format!("{}-{}", image.name, version.version());
            if name_versions.contains(&key) {
                errors.push(FieldError::duplicate(&version_path, &key));
            }
            name_versions.insert(key);

            if version.version().is_empty() {
                errors.push(FieldError::required(
                    &version_path.child("version"),
                    "must provide a version",
                ));
            } else if parse_version(version.version()).is_none() {
                errors.push(FieldError::invalid(
                    &version_path.child("version"),
                    version.version(),
                    "could not parse version, use a semantic version",
                ));
            }

            errors.extend(validate_expirable_version(
                &version.expirable,
                j,
                &siblings,
                &version_path,
            ));
            errors.extend(validate_cris(version.cri.as_deref(), &version_path.child("cri")));
            errors.extend(validate_architectures(
                &version.architectures,
                &version_path.child("architecture"),
            ));
            if let Some(constraint) = &version.kubelet_version_constraint {
                errors.extend(validate_version_constraint(
                    constraint,
                    &version_path.child("kubeletVersionConstraint"),
                ));
            }
        }
    }

    errors
}

fn validate_version_constraint(constraint: &str, path: &FieldPath) -> ErrorList {
    if constraint.trim().is_empty() {
        return vec![FieldError::invalid(
            path,
            constraint,
            "cannot parse the kubeletVersionConstraint: constraint must not be empty",
        )];
    }
    match VersionReq::parse(constraint) {
        Ok(_) => ErrorList::new(),
        Err(err) => vec![FieldError::invalid(
            path,
            constraint,
            format!("cannot parse the kubeletVersionConstraint: {err}"),
        )],
    }
}

fn validate_cris(cris: Option<&[Cri]>, path: &FieldPath) -> ErrorList {
    let mut errors = ErrorList::new();
    let cris = cris.unwrap_or_default();
    if cris.is_empty() {
        errors.push(FieldError::required(
            path,
            "must provide at least one supported container runtime",
        ));
        return errors;
    }

    let mut seen = HashSet::new();
    for (i, cri) in cris.iter().enumerate() {
        let cri_path = path.index(i);
        if !seen.insert(cri.name.as_str()) {
            errors.push(FieldError::duplicate(&cri_path, &cri.name));
        }
        if cri.name.parse::<CriName>().is_err() {
            errors.push(FieldError::not_supported(
                &cri_path.child("name"),
                &cri.name,
                CriName::VARIANTS,
            ));
        }
        if let Some(runtimes) = &cri.container_runtimes {
            errors.extend(validate_container_runtimes(
                runtimes,
                &cri_path.child("containerRuntimes"),
            ));
        }
    }
    errors
}

fn validate_container_runtimes(runtimes: &[ContainerRuntime], path: &FieldPath) -> ErrorList {
    let mut seen = HashSet::new();
    runtimes
        .iter()
        .enumerate()
        .filter(|(_, runtime)| !seen.insert(runtime.type_.as_str()))
        .map(|(i, runtime)| FieldError::duplicate(&path.index(i).child("type"), &runtime.type_))
        .collect()
}

fn validate_architectures(architectures: &[String], path: &FieldPath) -> ErrorList {
    architectures
        .iter()
        .filter(|arch| arch.parse::<Architecture>().is_err())
        .map(|arch| FieldError::not_supported(path, arch, Architecture::VARIANTS))
        .collect()
}

pub fn validate_machine_types(machine_types: &[MachineType], path: &FieldPath) -> ErrorList {
    let mut errors = ErrorList::new();
    if machine_types.is_empty() {
        errors.push(FieldError::required(path, "must provide at least one machine type"));
    }

    let mut names = HashSet::new();
    for (i, machine_type) in machine_types.iter().enumerate() {
        let type_path = path.index(i);
        let name_path = type_path.child("name");
        if machine_type.name.is_empty() {
            errors.push(FieldError::required(&name_path, "must provide a name"));
        }
        if !names.insert(machine_type.name.as_str()) {
            errors.push(FieldError::duplicate(&name_path, &machine_type.name));
            continue;
        }

        errors.extend(validate_non_negative(&machine_type.cpu, &type_path.child("cpu")));
        errors.extend(validate_non_negative(&machine_type.gpu, &type_path.child("gpu")));
        errors.extend(validate_non_negative(
            &machine_type.memory,
            &type_path.child("memory"),
        ));
        if let Some(arch) = &machine_type.architecture
            && arch.parse::<Architecture>().is_err()
        {
            errors.push(FieldError::not_supported(
                &type_path.child("architecture"),
                arch,
                Architecture::VARIANTS,
            ));
        }

        let Some(storage) = &machine_type.storage else {
            continue;
        };
        let storage_path = type_path.child("storage");
        match (&storage.storage_size, &storage.min_size) {
            (None, None) => errors.push(FieldError::invalid(
                &storage_path,
                &storage.class,
                r#"must either configure "size" or "minSize""#,
            )),
            (Some(_), Some(_)) => errors.push(FieldError::invalid(
                &storage_path,
                &storage.class,
                r#"not allowed to configure both "size" and "minSize""#,
            )),
            (Some(size), None) => {
                errors.extend(validate_non_negative(size, &storage_path.child("size")))
            }
            (None, Some(min_size)) => {
                errors.extend(validate_non_negative(min_size, &storage_path.child("minSize")))
            }
        }
    }

    errors
}

pub fn validate_volume_types(volume_types: &[VolumeType], path: &FieldPath) -> ErrorList {
    let mut errors = ErrorList::new();
    let mut names = HashSet::new();
    for (i, volume_type) in volume_types.iter().enumerate() {
        let type_path = path.index(i);
        let name_path = type_path.child("name");
        if volume_type.name.is_empty() {
            errors.push(FieldError::required(&name_path, "must provide a name"));
        }
        if !names.insert(volume_type.name.as_str()) {
            errors.push(FieldError::duplicate(&name_path, &volume_type.name));
            continue;
        }
        if volume_type.class.is_empty() {
            errors.push(FieldError::required(&type_path.child("class"), "must provide a class"));
        }
        if let Some(min_size) = &volume_type.min_size {
            errors.extend(validate_non_negative(min_size, &type_path.child("minSize")));
        }
    }
    errors
}

pub fn validate_regions(regions: &[Region], path: &FieldPath) -> ErrorList {
    let mut errors = ErrorList::new();
    if regions.is_empty() {
        errors.push(FieldError::required(path, "must provide at least one region"));
        return errors;
    }

    let mut region_names = HashSet::new();
    for (i, region) in regions.iter().enumerate() {
        let region_path = path.index(i);
        let name_path = region_path.child("name");
        if region.name.is_empty() {
            errors.push(FieldError::required(&name_path, "must provide a region name"));
        } else if !region_names.insert(region.name.as_str()) {
            errors.push(FieldError::duplicate(&name_path, &region.name));
        }

        let zones_path = region_path.child("zones");
        if region.zones.is_empty() {
            errors.push(FieldError::required(&zones_path, "must provide at least one zone"));
        }
        let mut zone_names = HashSet::new();
        for (j, zone) in region.zones.iter().enumerate() {
            let zone_name_path = zones_path.index(j).child("name");
            if zone.name.is_empty() {
                errors.push(FieldError::required(&zone_name_path, "zone name cannot be empty"));
            } else if !zone_names.insert(zone.name.as_str()) {
                errors.push(FieldError::duplicate(&zone_name_path, &zone.name));
            }
        }

        if let Some(labels) = &region.labels {
            errors.extend(validate_labels(labels, &region_path.child("labels")));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1.30.1", Some("1.30.1"))]
    #[case("v1.30.1", Some("1.30.1"))]
    #[case("1.11", Some("1.11.0"))]
    #[case("2", Some("2.0.0"))]
    #[case("1.2.3-rc.1", Some("1.2.3-rc.1"))]
    #[case("a.b.c", None)]
    #[case("1.2.3.4", None)]
    #[case("", None)]
    fn parses_lenient_versions(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(
            parse_version(input),
            expected.map(|v| Version::parse(v).unwrap()),
            "{input}"
        );
    }

    #[test]
    fn latest_version_compares_semantically() {
        let versions = [
            ExpirableVersion::new("1.9.0"),
            ExpirableVersion::new("1.10.0"),
            ExpirableVersion::new("1.2.9"),
        ];
        assert_eq!(latest_version(&versions).unwrap().unwrap().version, "1.10.0");
        assert!(latest_version(&[]).unwrap().is_none());
        assert!(latest_version(&[ExpirableVersion::new("x")]).is_err());
    }

    #[rstest]
    #[case("< 1.26", true)]
    #[case(">= 1.26", true)]
    #[case(">=1.26, <1.30", true)]
    #[case("", false)]
    #[case("invalid-version", false)]
    fn parses_kubelet_constraints(#[case] constraint: &str, #[case] valid: bool) {
        let errors = validate_version_constraint(constraint, &FieldPath::new("c"));
        assert_eq!(errors.is_empty(), valid, "{constraint}");
    }

    #[test]
    fn rejects_garbage_ca_bundle() {
        let errors = validate_ca_bundle("not a certificate", &FieldPath::new("spec").child("caBundle"));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "spec.caBundle");
    }
}
