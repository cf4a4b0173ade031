use cloudprofile_operator::crds::{
    cloud_profile::CloudProfile, namespaced_cloud_profile::NamespacedCloudProfile,
    private_cloud_profile::PrivateCloudProfile,
};
use kube::core::CustomResourceExt;

fn main() {
    let crds = vec![
        CloudProfile::crd(),
        NamespacedCloudProfile::crd(),
        PrivateCloudProfile::crd(),
    ];
    for (i, crd) in crds.into_iter().enumerate() {
        if i > 0 {
            println!("---");
        }
        println!("{}", serde_yaml::to_string(&crd).expect("serialize crd"));
    }
}
