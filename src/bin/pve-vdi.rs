//! pve-vdi
//!
//! Thin client launcher: logs in with a credentials file, lets the user pick
//! a VM (or clone a template), establishes the session and hands the SPICE
//! connection file to `remote-viewer`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pve_vdi::{
    CloneConfig, ClusterCredentials, DEFAULT_PORT, FileSink, Stage, VdiClient, VmHandle,
    VmSelection,
};

#[derive(Parser)]
#[command(name = "pve-vdi")]
#[command(about = "Open a SPICE session on a Proxmox VE virtual machine")]
#[command(version)]
struct Args {
    /// Credentials file: {"username", "password", "node", "proxy"}
    #[arg(short, long, env = "PVE_VDI_CREDENTIALS", default_value = "credentials.json")]
    credentials: PathBuf,

    /// VM to connect to; prompts with the VM list when omitted
    #[arg(long)]
    vm: Option<u32>,

    /// Clone this template and connect to the clone
    #[arg(long, conflicts_with = "vm")]
    clone_template: Option<u32>,

    /// Storage for full clones
    #[arg(long, env = "PVE_CLONE_STORAGE")]
    clone_storage: Option<String>,

    /// Resource pool for clones
    #[arg(long, env = "PVE_CLONE_POOL")]
    clone_pool: Option<String>,

    /// Where the connection file is written before the viewer starts
    #[arg(long, env = "VDI_TEMPFILE_FILENAME")]
    connection_file: PathBuf,

    /// API port of every node
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Verify node TLS certificates
    #[arg(long)]
    verify_tls: bool,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Run the viewer in kiosk mode, quitting on disconnect
    #[arg(short, long)]
    kiosk: bool,

    /// Viewer executable
    #[arg(long, default_value = "remote-viewer")]
    viewer: String,

    /// Write the connection file and exit without starting the viewer
    #[arg(long)]
    no_viewer: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let credentials = ClusterCredentials::from_json_file(&args.credentials)
        .await
        .with_context(|| format!("Failed to load credentials from {:?}", args.credentials))?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling");
                cancel.cancel();
            }
        }
    });

    let mut builder = VdiClient::builder()
        .port(args.port)
        .accept_invalid_certs(!args.verify_tls)
        .request_timeout(Duration::from_secs(args.timeout))
        .cancellation(cancel);
    if let (Some(storage), Some(pool)) = (&args.clone_storage, &args.clone_pool) {
        builder = builder.clone_config(CloneConfig::new(storage.clone(), pool.clone())?);
    }
    let client = builder.build()?;

    let selection = match (args.clone_template, args.vm) {
        (Some(template), _) => {
            if args.clone_storage.is_none() || args.clone_pool.is_none() {
                anyhow::bail!("--clone-template requires PVE_CLONE_STORAGE and PVE_CLONE_POOL");
            }
            VmSelection::CloneTemplate(template)
        }
        (None, Some(vmid)) => VmSelection::Existing(vmid),
        (None, None) => {
            let vms = client
                .list_vms(&credentials)
                .await
                .context("Failed to list VMs")?;
            VmSelection::Existing(prompt_for_vm(&vms).await?)
        }
    };

    let sink = FileSink::new(&args.connection_file);
    let status = |stage: Stage| tracing::info!(stage = ?stage, "{}", stage);
    let outcome = client
        .establish_session(&credentials, selection, &status, &sink)
        .await
        .map_err(|e| anyhow::anyhow!("{} stage failed: {}", e.stage(), e))?;

    tracing::info!(
        vmid = outcome.vm.numeric_id,
        node = %outcome.vm.node,
        address = %outcome.node_address,
        "Session established"
    );

    if args.no_viewer {
        println!("{}", sink.path().display());
        return Ok(());
    }

    let mut viewer = tokio::process::Command::new(&args.viewer);
    if args.kiosk {
        viewer.args(["-k", "--kiosk-quit", "on-disconnect"]);
    }
    let exit = viewer
        .arg(sink.path())
        .status()
        .await
        .with_context(|| format!("Failed to run {}", args.viewer))?;
    if !exit.success() {
        anyhow::bail!("{} exited with {}", args.viewer, exit);
    }
    Ok(())
}

/// Prints the VM list and reads a VM id from stdin.
async fn prompt_for_vm(vms: &[VmHandle]) -> Result<u32> {
    println!("Enter the number of the VM you'd like to connect to:");
    for vm in vms {
        println!("{}: {}", vm.numeric_id, vm.name);
    }

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read VM selection")?;
    let vmid: u32 = line
        .trim()
        .parse()
        .with_context(|| format!("Invalid VM id {:?}", line.trim()))?;

    if !vms.iter().any(|vm| vm.numeric_id == vmid) {
        anyhow::bail!("VM {} is not in the list", vmid);
    }
    Ok(vmid)
}
