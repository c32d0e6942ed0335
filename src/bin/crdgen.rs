use hub_transport_operator::crd::MulticlusterGlobalHub;
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&MulticlusterGlobalHub::crd())?);
    Ok(())
}
