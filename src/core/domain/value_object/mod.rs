mod proxmox_csrf_token;
mod proxmox_host;
mod proxmox_password;
mod proxmox_ticket;
mod proxmox_uri;
mod proxmox_username;
mod vm_id;

pub use proxmox_csrf_token::ProxmoxCSRFToken;
pub use proxmox_host::ProxmoxHost;
pub use proxmox_password::ProxmoxPassword;
pub use proxmox_ticket::ProxmoxTicket;
pub use proxmox_uri::{ApiFormat, ProxmoxUrl};
pub use proxmox_username::ProxmoxUsername;
pub use vm_id::{VM_ID_MAX, parse_vm_id};

// Re-export validation functions for internal use
pub(crate) use proxmox_csrf_token::validate_csrf_token;
pub(crate) use proxmox_host::validate_host;
pub(crate) use proxmox_password::validate_password;
pub(crate) use proxmox_ticket::validate_ticket;
pub(crate) use proxmox_username::validate_username;
