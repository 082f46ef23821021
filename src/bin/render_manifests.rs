//! Print the manifests one instance would create, without touching a cluster.
//!
//! Usage: `render-manifests [challenge|test] [container|vm] [challenge-id]`

use challenge_deployer::{
    config::DeployerConfig,
    naming::{self, InstanceMode},
    resources::{BuildParams, ResourceSet, WorkloadVariant},
    token,
};
use uuid::Uuid;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mode = match args.first().map(String::as_str) {
        None | Some("challenge") => InstanceMode::Challenge,
        Some("test") => InstanceMode::Test,
        Some(other) => anyhow::bail!("unknown mode {:?}, expected challenge or test", other),
    };
    let variant = match args.get(1).map(String::as_str) {
        None | Some("container") => WorkloadVariant::Container,
        Some("vm") => WorkloadVariant::VirtualMachine,
        Some(other) => anyhow::bail!("unknown variant {:?}, expected container or vm", other),
    };
    let challenge_id = args.get(2).map(String::as_str).unwrap_or("example-challenge");

    let config = DeployerConfig::load()?;
    let instance_id = Uuid::new_v4().to_string();
    let domain = naming::public_domain(&instance_id, &config.challenge_domain)?;
    let token = token::mint_token();

    let set = ResourceSet::build(
        &BuildParams {
            challenge_id,
            player_id: "render-manifests",
            instance_id: &instance_id,
            token: &token,
            domain: &domain,
            mode,
            variant,
        },
        &config,
    )?;

    for manifest in set.manifests()? {
        println!("---");
        print!("{}", serde_yaml::to_string(&manifest)?);
    }
    Ok(())
}
