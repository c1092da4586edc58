//! Prints the Dummy CRD as YAML
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/dummy.yaml`

use crds::Dummy;
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&Dummy::crd())?);
    Ok(())
}
