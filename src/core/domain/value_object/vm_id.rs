//! Numeric VM identifiers and their composite resource-id form.

use crate::core::domain::error::MalformedIdError;

/// Largest VM id the Proxmox API accepts.
pub const VM_ID_MAX: u32 = 999_999_999;

/// Parses the numeric VM id out of a composite resource id such as
/// `"qemu/4201"`.
///
/// The id must have exactly two `/`-separated segments, the second of which
/// is a decimal number.
pub fn parse_vm_id(id: &str) -> Result<u32, MalformedIdError> {
    let malformed = |reason: &str| MalformedIdError {
        id: id.to_string(),
        reason: reason.to_string(),
    };

    let (kind, number) = id
        .split_once('/')
        .ok_or_else(|| malformed("missing '/' separator"))?;
    if kind.is_empty() {
        return Err(malformed("missing resource type"));
    }
    if number.contains('/') {
        return Err(malformed("too many path segments"));
    }
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(malformed("suffix is not a number"));
    }
    number
        .parse::<u32>()
        .map_err(|_| malformed("number out of range"))
}
