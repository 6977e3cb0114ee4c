use crate::session::SettlePolicy;
use crate::vsphere::Endpoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use vmtemplate_shared::Trilean;
use vmtemplate_shared::errors::{VmTemplateError, VmTemplateResult};

/// Static stage configuration (set once, never changes).
///
/// Decoding is left to the caller; this type only derives `Deserialize` so
/// the surrounding harness can feed it any serde format.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    // === Connection ===
    /// vCenter or ESXi host name, optionally with port.
    pub host: String,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    pub username: String,
    pub password: String,

    // === Placement ===
    /// Datacenter name. Empty means "the only datacenter".
    pub datacenter: Option<String>,
    /// Folder path below the datacenter's VM root. Empty leaves the VM where it is.
    pub folder: Option<String>,

    // === Snapshot ===
    pub snapshot_enable: bool,
    pub snapshot_name: String,
    pub snapshot_description: String,

    // === Conversion ===
    /// `true` forces unregister + register-as-template instead of the in-place conversion.
    #[serde(alias = "reregister_vm")]
    pub reregister: Trilean,

    /// How long to wait for the VM to settle before the first step.
    pub settle: SettlePolicy,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
}

impl TemplateConfig {
    pub fn datacenter(&self) -> Option<&str> {
        non_empty(&self.datacenter)
    }

    pub fn folder(&self) -> Option<&str> {
        non_empty(&self.folder)
    }

    /// Check required fields and build the endpoint.
    ///
    /// Every problem is collected before returning, so the caller sees all of
    /// them at once.
    pub fn validate(&self) -> VmTemplateResult<Endpoint> {
        let mut errors = Vec::new();

        for (key, value) in [
            ("host", &self.host),
            ("username", &self.username),
            ("password", &self.password),
        ] {
            if value.is_empty() {
                errors.push(format!("{} must be set", key));
            }
        }

        if self.snapshot_enable && self.snapshot_name.is_empty() {
            errors.push("snapshot_name must be set when snapshot_enable is true".to_string());
        }

        errors.extend(self.settle.problems());

        let endpoint = if self.host.is_empty() {
            None
        } else {
            match self.build_endpoint() {
                Ok(endpoint) => Some(endpoint),
                Err(e) => {
                    errors.push(e);
                    None
                }
            }
        };

        match endpoint {
            Some(endpoint) if errors.is_empty() => Ok(endpoint),
            _ => Err(VmTemplateError::Config(errors)),
        }
    }

    fn build_endpoint(&self) -> Result<Endpoint, String> {
        let invalid = |e: &dyn fmt::Display| format!("invalid vSphere sdk endpoint: {}", e);

        let mut url = Url::parse(&format!("https://{}/sdk", self.host)).map_err(|e| invalid(&e))?;
        if url.path() != "/sdk" || url.query().is_some() || url.fragment().is_some() {
            return Err(invalid(&format!("host '{}' is not a plain host name", self.host)));
        }
        url.set_username(&self.username)
            .map_err(|_| invalid(&"cannot embed username"))?;
        url.set_password(Some(&self.password))
            .map_err(|_| invalid(&"cannot embed password"))?;

        Ok(Endpoint {
            url,
            insecure: self.insecure,
        })
    }
}

impl fmt::Debug for TemplateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateConfig")
            .field("host", &self.host)
            .field("insecure", &self.insecure)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("datacenter", &self.datacenter)
            .field("folder", &self.folder)
            .field("snapshot_enable", &self.snapshot_enable)
            .field("snapshot_name", &self.snapshot_name)
            .field("snapshot_description", &self.snapshot_description)
            .field("reregister", &self.reregister)
            .field("settle", &self.settle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> TemplateConfig {
        TemplateConfig {
            host: "vcenter.local".into(),
            username: "administrator@vsphere.local".into(),
            password: "p@ss/word".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config_builds_endpoint() {
        let endpoint = valid().validate().unwrap();
        assert_eq!(endpoint.url.scheme(), "https");
        assert_eq!(endpoint.url.host_str(), Some("vcenter.local"));
        assert_eq!(endpoint.url.path(), "/sdk");
        assert_eq!(endpoint.url.username(), "administrator%40vsphere.local");
        assert!(endpoint.url.password().is_some());
        assert!(!endpoint.insecure);
    }

    #[test]
    fn test_insecure_flag_carried() {
        let config = TemplateConfig {
            insecure: true,
            ..valid()
        };
        assert!(config.validate().unwrap().insecure);
    }

    #[test]
    fn test_missing_fields_reported_together() {
        let err = TemplateConfig::default().validate().unwrap_err();
        assert_eq!(
            err,
            VmTemplateError::Config(vec![
                "host must be set".into(),
                "username must be set".into(),
                "password must be set".into(),
            ])
        );
    }

    #[test]
    fn test_malformed_host_rejected() {
        let config = TemplateConfig {
            host: "vcenter local".into(),
            ..valid()
        };
        match config.validate().unwrap_err() {
            VmTemplateError::Config(errors) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].starts_with("invalid vSphere sdk endpoint"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_host_with_path_rejected() {
        let config = TemplateConfig {
            host: "vcenter.local/other".into(),
            ..valid()
        };
        assert!(matches!(config.validate(), Err(VmTemplateError::Config(_))));
    }

    #[test]
    fn test_snapshot_requires_name() {
        let config = TemplateConfig {
            snapshot_enable: true,
            password: String::new(),
            ..valid()
        };
        let VmTemplateError::Config(errors) = config.validate().unwrap_err() else {
            panic!("expected config error");
        };
        assert_eq!(errors.len(), 2);
        assert!(errors[1].contains("snapshot_name"));
    }

    fn settle_errors(settle: SettlePolicy) -> Vec<String> {
        let config = TemplateConfig { settle, ..valid() };
        match config.validate() {
            Err(VmTemplateError::Config(errors)) => errors,
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let errors = settle_errors(SettlePolicy {
            poll_interval_ms: 0,
            ..SettlePolicy::default()
        });
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("poll_interval_ms"));
    }

    #[test]
    fn test_max_interval_below_poll_rejected() {
        let errors = settle_errors(SettlePolicy {
            max_interval_ms: 0,
            ..SettlePolicy::default()
        });
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("max_interval_ms"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let errors = settle_errors(SettlePolicy {
            timeout_ms: 0,
            ..SettlePolicy::default()
        });
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("timeout_ms"));
    }

    #[test]
    fn test_settle_problems_join_missing_fields() {
        let config = TemplateConfig {
            settle: SettlePolicy {
                poll_interval_ms: 0,
                max_interval_ms: 0,
                timeout_ms: 200,
            },
            ..TemplateConfig::default()
        };
        let VmTemplateError::Config(errors) = config.validate().unwrap_err() else {
            panic!("expected config error");
        };
        assert_eq!(errors.len(), 4);
        assert!(errors[3].contains("poll_interval_ms"));
    }

    #[test]
    fn test_empty_placement_is_none() {
        let config = TemplateConfig {
            datacenter: Some(String::new()),
            folder: Some("/".into()),
            ..valid()
        };
        assert_eq!(config.datacenter(), None);
        assert_eq!(config.folder(), None);

        let config = TemplateConfig {
            folder: Some("/templates/linux/".into()),
            ..valid()
        };
        assert_eq!(config.folder(), Some("templates/linux"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: TemplateConfig = serde_json::from_str(
            r#"{
                "host": "vcenter.local",
                "username": "admin",
                "password": "secret",
                "reregister_vm": true,
                "settle": { "timeout_ms": 5000 }
            }"#,
        )
        .unwrap();

        assert!(config.reregister.is_true());
        assert!(!config.snapshot_enable);
        assert_eq!(config.settle.timeout_ms, 5000);
        assert_eq!(config.settle.poll_interval_ms, 1000);
    }

    #[test]
    fn test_debug_hides_password() {
        assert!(!format!("{:?}", valid()).contains("p@ss/word"));
    }
}
