use serde::{Deserialize, Serialize};

/// Default namespace when none is given
pub const DEFAULT_NAMESPACE: &str = "public";
/// Default group when none is given
pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";
const SERVICE_INFO_SPLITER: &str = "@@";

/// Addressable service identity: (namespace, group, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Service {
    namespace: String,
    group: String,
    name: String,
}

impl Service {
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        group: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            group: group.into(),
            name: name.into(),
        }
    }

    /// Service in the default namespace and group
    #[must_use]
    pub fn with_name(name: impl Into<String>) -> Self {
        Self::new(DEFAULT_NAMESPACE, DEFAULT_GROUP, name)
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `group@@name`
    #[must_use]
    pub fn grouped_name(&self) -> String {
        format!("{}{SERVICE_INFO_SPLITER}{}", self.group, self.name)
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{SERVICE_INFO_SPLITER}{}{SERVICE_INFO_SPLITER}{}",
            self.namespace, self.group, self.name
        )
    }
}
