use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::errors::StartError;

/// Static configuration for one capability: how to launch its tool server and
/// which credentials to forward. Parsed from the service TOML at boot, immutable
/// afterwards, owned by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    /// Shown to the routing model when this capability is offered as a delegate.
    pub description: String,
    pub command: String,
    /// Arguments may reference the parent environment as `${VAR}`.
    #[serde(default)]
    pub args: Vec<String>,
    /// Child-process variable name -> parent environment variable to read.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl CapabilityDescriptor {
    /// Resolves forwarded credentials from the parent environment. A missing
    /// variable degrades this capability only; the caller records the failure
    /// and moves on.
    pub fn resolve_env(&self) -> Result<Vec<(String, String)>, StartError> {
        let mut resolved: Vec<(String, String)> = Vec::with_capacity(self.env.len());
        for (child_var, parent_var) in &self.env {
            let value = std::env::var(parent_var)
                .map_err(|_| StartError::MissingCredential(parent_var.clone()))?;
            resolved.push((child_var.clone(), value));
        }
        resolved.sort();
        Ok(resolved)
    }

    /// Expands `${VAR}` placeholders in the argument list.
    pub fn resolve_args(&self) -> Result<Vec<String>, StartError> {
        self.args
            .iter()
            .map(|arg| {
                shellexpand::env(arg)
                    .map(|expanded| expanded.into_owned())
                    .map_err(|error| StartError::MissingCredential(error.var_name))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(env: &[(&str, &str)], args: &[&str]) -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "filesystem".to_string(),
            description: "Read and write local files".to_string(),
            command: "npx".to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn parses_from_toml() {
        let parsed: CapabilityDescriptor = toml::from_str(
            r#"
            name = "github"
            description = "Interact with repositories"
            command = "npx"
            args = ["-y", "@modelcontextprotocol/server-github"]

            [env]
            GITHUB_PERSONAL_ACCESS_TOKEN = "GITHUB_TOKEN"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.name, "github");
        assert_eq!(parsed.args.len(), 2);
        assert_eq!(
            parsed.env["GITHUB_PERSONAL_ACCESS_TOKEN"],
            "GITHUB_TOKEN"
        );
    }

    #[test]
    fn missing_credential_names_the_variable() {
        let descriptor = descriptor(&[("API_KEY", "SWITCHBOARD_TEST_UNSET_VAR")], &[]);
        match descriptor.resolve_env() {
            Err(StartError::MissingCredential(var)) => {
                assert_eq!(var, "SWITCHBOARD_TEST_UNSET_VAR")
            }
            other => panic!("expected MissingCredential, got {other:?}"),
        }
    }

    #[test]
    fn resolves_env_and_arg_placeholders() {
        std::env::set_var("SWITCHBOARD_TEST_TOKEN", "tok-123");
        std::env::set_var("SWITCHBOARD_TEST_DIR", "/tmp/files");

        let descriptor = descriptor(
            &[("CHILD_TOKEN", "SWITCHBOARD_TEST_TOKEN")],
            &["--root", "${SWITCHBOARD_TEST_DIR}"],
        );

        let env = descriptor.resolve_env().unwrap();
        assert_eq!(env, vec![("CHILD_TOKEN".to_string(), "tok-123".to_string())]);

        let args = descriptor.resolve_args().unwrap();
        assert_eq!(args, vec!["--root".to_string(), "/tmp/files".to_string()]);
    }
}
