/// The SPICE connection descriptor returned by the proxy-ticket endpoint.
///
/// Kept as raw bytes: the contents are never interpreted, only handed to the
/// viewer collaborator exactly as the server sent them.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionBlob(Vec<u8>);

impl ConnectionBlob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// The blob carries a one-time password; never print it.
impl std::fmt::Debug for ConnectionBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnectionBlob({} bytes)", self.0.len())
    }
}
