//! Service and resource selection

use serde::{Deserialize, Serialize};

/// Keyword that enables every service
pub const ALL_SERVICES: &str = "all";

/// Include/exclude lists of resource identifier substrings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFilter {
    /// Substrings a resource must match; empty means every resource
    pub include: Vec<String>,
    /// Substrings that always exclude a resource
    pub exclude: Vec<String>,
}

impl ResourceFilter {
    /// Filter from include and exclude substrings
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    /// Whether a resource should be monitored. Exclusion wins over inclusion.
    pub fn should_monitor(&self, resource: &str) -> bool {
        if self.exclude.iter().any(|p| resource.contains(p.as_str())) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| resource.contains(p.as_str()))
    }
}

/// Enabled/disabled service lists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSelection {
    /// Enabled services, or `["all"]`
    pub enabled: Vec<String>,
    /// Services that are never monitored
    pub disabled: Vec<String>,
}

impl Default for ServiceSelection {
    fn default() -> Self {
        Self {
            enabled: vec![ALL_SERVICES.to_string()],
            disabled: Vec::new(),
        }
    }
}

impl ServiceSelection {
    /// Whether every service not disabled is enabled. An empty enabled list
    /// counts as "all".
    pub fn all_enabled(&self) -> bool {
        self.enabled.is_empty()
            || self
                .enabled
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ALL_SERVICES))
    }

    /// Whether a service is monitored. A disabled entry always wins.
    pub fn is_enabled(&self, service: &str) -> bool {
        if self.disabled.iter().any(|s| s == service) {
            return false;
        }
        self.all_enabled() || self.enabled.iter().any(|s| s == service)
    }

    /// Explicit allow-list, `None` when every service is enabled
    pub fn explicit(&self) -> Option<Vec<String>> {
        if self.all_enabled() {
            None
        } else {
            Some(self.enabled.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn filter(include: &[&str], exclude: &[&str]) -> ResourceFilter {
        ResourceFilter::new(
            include.iter().map(|s| s.to_string()).collect(),
            exclude.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[rstest]
    #[case(&[], &[], "arn:x", true)]
    #[case(&[], &["arn:x"], "arn:x", false)]
    #[case(&["arn:x"], &["arn:x"], "arn:x", false)]
    #[case(&["instance/i-prod"], &[], "arn:aws:ec2:us-east-1:1:instance/i-prod-42", true)]
    #[case(&["instance/i-prod"], &[], "arn:aws:ec2:us-east-1:1:instance/i-dev-1", false)]
    #[case(&["instance/"], &["i-dev"], "arn:aws:ec2:us-east-1:1:instance/i-dev-1", false)]
    fn test_should_monitor(
        #[case] include: &[&str],
        #[case] exclude: &[&str],
        #[case] resource: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(filter(include, exclude).should_monitor(resource), expected);
    }

    #[test]
    fn test_all_enables_everything_not_disabled() {
        let selection = ServiceSelection {
            enabled: vec!["all".to_string()],
            disabled: vec!["Tax".to_string()],
        };
        assert!(selection.is_enabled("Amazon EC2"));
        assert!(selection.is_enabled("Anything"));
        assert!(!selection.is_enabled("Tax"));
        assert_eq!(selection.explicit(), None);
    }

    #[test]
    fn test_disabled_overrides_enabled() {
        let selection = ServiceSelection {
            enabled: vec!["Amazon EC2".to_string(), "Amazon RDS".to_string()],
            disabled: vec!["Amazon RDS".to_string()],
        };
        assert!(selection.is_enabled("Amazon EC2"));
        assert!(!selection.is_enabled("Amazon RDS"));
        assert!(!selection.is_enabled("Amazon S3"));
        assert_eq!(
            selection.explicit(),
            Some(vec!["Amazon EC2".to_string(), "Amazon RDS".to_string()])
        );
    }

    #[test]
    fn test_empty_enabled_list_means_all() {
        let selection = ServiceSelection {
            enabled: Vec::new(),
            disabled: vec!["Tax".to_string()],
        };
        assert!(selection.all_enabled());
        assert!(selection.is_enabled("Amazon EC2"));
        assert!(!selection.is_enabled("Tax"));
        assert_eq!(selection.explicit(), None);
    }
}
