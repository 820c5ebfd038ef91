/// Identity of the service emitting events.
///
/// Events carry `event_source = <domain>.<service_group>.<name>.v<major>` so
/// consumers can tell which deployment (and which major API version) produced
/// a record without caring about patch releases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub domain: String,
    pub service_group: String,
    pub name: String,
    pub version: String,
}

impl ServiceIdentity {
    pub fn new(
        domain: impl Into<String>,
        service_group: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            service_group: service_group.into(),
            name: name.into(),
            version: version.into(),
        }
    }

    /// Stable service-principal identifier used as the event source.
    pub fn principal_id(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.domain,
            self.service_group,
            self.name,
            major_version(&self.version)
        )
    }
}

/// `"v2.3.1"`/`"2.3.1"` → `"v2"`; anything without a leading component → `"v1"`.
pub fn major_version(version: &str) -> String {
    let trimmed = version.trim().trim_start_matches('v');
    match trimmed.split('.').next() {
        Some(major) if !major.is_empty() => format!("v{major}"),
        _ => "v1".to_string(),
    }
}
