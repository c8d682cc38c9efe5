use serde::{Serialize, Deserialize};
use uuid::Uuid;

/// Who is issuing a query. Row-level policies are evaluated against this.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    /// No session; only world-readable rows are visible.
    Anonymous,
    /// A signed-in identity, as issued by the identity provider.
    Authenticated(Uuid),
    /// The privileged backend path. Bypasses row-level security.
    Service,
}

impl Caller {
    pub fn identity(&self) -> Option<Uuid> {
        match self {
            Caller::Authenticated(id) => Some(*id),
            Caller::Anonymous | Caller::Service => None,
        }
    }

    pub fn bypasses_policies(&self) -> bool {
        matches!(self, Caller::Service)
    }
}
