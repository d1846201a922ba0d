use crate::dto::HealthRes;

/// Simple health service shared by the REST API and CLI.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Check health without creating an instance.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "hemogram is alive".into(),
        }
    }
}
