use crate::core::domain::value_object::{ProxmoxCSRFToken, ProxmoxHost, ProxmoxTicket};

/// An authenticated session against one node address.
///
/// Never mutated and never renewed: talking to a different address requires
/// a fresh login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxmoxAuth {
    ticket: ProxmoxTicket,
    csrf_token: ProxmoxCSRFToken,
    node_address: ProxmoxHost,
}

impl ProxmoxAuth {
    pub fn new(
        ticket: ProxmoxTicket,
        csrf_token: ProxmoxCSRFToken,
        node_address: ProxmoxHost,
    ) -> Self {
        Self {
            ticket,
            csrf_token,
            node_address,
        }
    }

    pub fn ticket(&self) -> &ProxmoxTicket {
        &self.ticket
    }

    pub fn csrf_token(&self) -> &ProxmoxCSRFToken {
        &self.csrf_token
    }

    /// The address that issued this session.
    pub fn node_address(&self) -> &ProxmoxHost {
        &self.node_address
    }
}
