use parley_backend::AuthStatus;

/// What the protected route renders for a given authentication status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateOutcome {
    /// Status is not known yet; show a wait indicator.
    Wait,
    RedirectToCredentials,
    RenderProtected,
}

impl GateOutcome {
    /// Pure projection; callers re-evaluate it on every render.
    pub fn for_status(status: AuthStatus) -> Self {
        match status {
            AuthStatus::Loading => Self::Wait,
            AuthStatus::Unauthenticated => Self::RedirectToCredentials,
            AuthStatus::Authenticated => Self::RenderProtected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_status_maps_to_exactly_one_outcome() {
        let table = [
            (AuthStatus::Loading, GateOutcome::Wait),
            (AuthStatus::Unauthenticated, GateOutcome::RedirectToCredentials),
            (AuthStatus::Authenticated, GateOutcome::RenderProtected),
        ];

        for (status, expected) in table {
            assert_eq!(GateOutcome::for_status(status), expected, "{status:?}");
        }
    }
}
