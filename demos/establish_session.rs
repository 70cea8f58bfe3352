//! Opening a SPICE session on a Proxmox VE virtual machine.
//!
//! This program builds a `VdiClient`, lists the VMs visible to the user,
//! runs the session establishment for one of them, and writes the
//! resulting connection file for `remote-viewer`.

use pve_vdi::{ClusterCredentials, FileSink, PollPolicy, Stage, VdiClient, VdiResult, VmSelection};
use std::time::Duration;

#[tokio::main]
async fn main() -> VdiResult<()> {
    // Build the client; every node of the cluster shares the port and TLS setup.
    let client = VdiClient::builder()
        .port(8006)
        .accept_invalid_certs(true) // Self signed node certificates
        .request_timeout(Duration::from_secs(15))
        // Give slow guests a little longer than the default to boot.
        .health_policy(PollPolicy {
            deadline: Duration::from_secs(600),
            ..PollPolicy::guest_agent()
        })
        .build()?;

    let credentials = ClusterCredentials::new("student@pve", "password", "pve1", "192.168.1.182")?;

    println!("\nVirtual machines");
    println!("------------------------");
    let vms = client.list_vms(&credentials).await?;
    for vm in &vms {
        println!("{:>6}  {:<24} on {}", vm.numeric_id, vm.name, vm.node);
    }

    let Some(first) = vms.first() else {
        println!("\nNo virtual machines visible to this user.\n");
        return Ok(());
    };

    println!("\nConnecting to {}", first.name);
    println!("------------------------");
    let status = |stage: Stage| println!("{}...", stage);
    let sink = FileSink::new(std::env::temp_dir().join("pve-vdi-demo.vv"));
    let outcome = client
        .establish_session(
            &credentials,
            VmSelection::Existing(first.numeric_id),
            &status,
            &sink,
        )
        .await?;

    println!("\nConnection file: {}", sink.path().display());
    println!("Proxy node:      {}", outcome.node_address);
    println!("Started by us:   {}\n", outcome.started);

    Ok(())
}
