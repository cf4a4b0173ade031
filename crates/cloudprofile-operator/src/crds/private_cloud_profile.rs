use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ChildProfile, ParentRef, ProfileStatus, catalog::CatalogSpec};

/// Tenant private extension of a CloudProfile, referencing the parent by name only.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "core.gardener.cloud",
    version = "v1beta1",
    kind = "PrivateCloudProfile",
    plural = "privatecloudprofiles",
    namespaced,
    status = "ProfileStatus",
    shortname = "pcpfl",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct PrivateCloudProfileSpec {
    #[serde(flatten)]
    pub catalog: CatalogSpec,
    /// Name of the parent CloudProfile
    #[serde(default)]
    pub parent: String,
}

impl ChildProfile for PrivateCloudProfile {
    fn catalog(&self) -> &CatalogSpec {
        &self.spec.catalog
    }

    fn catalog_mut(&mut self) -> &mut CatalogSpec {
        &mut self.spec.catalog
    }

    fn parent_ref(&self) -> ParentRef<'_> {
        ParentRef::Named(&self.spec.parent)
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
