use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{
    ChildProfile, CloudProfileReference, ParentRef, ProfileStatus, catalog::CatalogSpec,
};

/// Extends a CloudProfile within a single project namespace.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "core.gardener.cloud",
    version = "v1beta1",
    kind = "NamespacedCloudProfile",
    plural = "namespacedcloudprofiles",
    namespaced,
    status = "ProfileStatus",
    shortname = "nscpfl",
    shortname = "nsprofile",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct NamespacedCloudProfileSpec {
    #[serde(flatten)]
    pub catalog: CatalogSpec,
    pub parent: CloudProfileReference,
}

impl ChildProfile for NamespacedCloudProfile {
    fn catalog(&self) -> &CatalogSpec {
        &self.spec.catalog
    }

    fn catalog_mut(&mut self) -> &mut CatalogSpec {
        &mut self.spec.catalog
    }

    fn parent_ref(&self) -> ParentRef<'_> {
        ParentRef::Structured(&self.spec.parent)
    }

    fn profile_status(&self) -> Option<&ProfileStatus> {
        self.status.as_ref()
    }

    fn set_status(&mut self, status: ProfileStatus) {
        self.status = Some(status);
    }

    fn clear_status(&mut self) {
        self.status = None;
    }

    fn same_spec(&self, other: &Self) -> bool {
        self.spec == other.spec
    }
}
