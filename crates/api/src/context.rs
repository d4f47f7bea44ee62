use edutrack_auth::CallerIdentity;

/// Caller context for a request.
///
/// Always present on RPC routes; `identity` is `None` when the request carried
/// no bearer token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    identity: Option<CallerIdentity>,
}

impl CallerContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(identity: CallerIdentity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    pub fn identity(&self) -> Option<&CallerIdentity> {
        self.identity.as_ref()
    }
}
