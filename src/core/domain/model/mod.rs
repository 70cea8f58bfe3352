pub mod clone_job;
pub mod cluster_credentials;
pub mod cluster_resource;
pub mod connection_blob;
pub mod network_interface;
pub mod proxmox_auth;
pub mod vm_handle;
