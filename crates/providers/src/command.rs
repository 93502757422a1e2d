//! External command provider.
//!
//! Runs a configured program to create or destroy each resource. The argv
//! template may reference `{id}`, `{name}`, `{type}`, `{provider}`,
//! `{region}` and `{config.<key>}`. The resource is also written to the
//! child's stdin as JSON.

use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::OnceLock;

use async_trait::async_trait;
use inframan_core::{ProviderConfig, Resource};
use regex::{Captures, Regex};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{Provider, ProviderError, ProviderOutput};

/// Provider backed by external commands.
pub struct CommandProvider {
    name: String,
    description: String,
    apply: Vec<String>,
    destroy: Vec<String>,
    env: HashMap<String, String>,
}

impl CommandProvider {
    /// Create a provider with explicit argv templates.
    pub fn new(name: impl Into<String>, apply: Vec<String>, destroy: Vec<String>) -> Self {
        let name = name.into();
        Self {
            description: format!("external commands for {}", name),
            name,
            apply,
            destroy,
            env: HashMap::new(),
        }
    }

    /// Build from provider configuration.
    pub fn from_config(name: impl Into<String>, config: &ProviderConfig) -> Self {
        let mut provider = Self::new(name, config.apply.clone(), config.destroy.clone());
        // Layered config lowercases keys; environment names are conventionally upper case.
        for (k, v) in &config.env {
            provider.env.insert(k.to_uppercase(), v.clone());
        }
        provider
    }

    /// Add an environment variable for every command.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Substitute resource variables into an argv template.
    ///
    /// Each argument is scanned once, so substituted values are never
    /// expanded again. Unknown placeholders are left as written.
    fn substitute_variables(&self, template: &[String], resource: &Resource) -> Vec<String> {
        let mut variables: HashMap<String, String> = HashMap::from([
            ("id".to_string(), resource.id.clone()),
            ("name".to_string(), resource.name.clone()),
            ("type".to_string(), resource.resource_type.to_string()),
            ("provider".to_string(), resource.provider.clone()),
            ("region".to_string(), resource.region.clone()),
        ]);
        for (key, value) in &resource.config {
            variables.insert(format!("config.{}", key), render_value(value));
        }

        template
            .iter()
            .map(|arg| {
                placeholder_pattern()
                    .replace_all(arg, |caps: &Captures| match variables.get(&caps[1]) {
                        Some(value) => value.clone(),
                        None => caps[0].to_string(),
                    })
                    .into_owned()
            })
            .collect()
    }

    /// Run a template for `resource`, returning captured stdout.
    async fn run(&self, template: &[String], resource: &Resource) -> Result<String, ProviderError> {
        let argv = self.substitute_variables(template, resource);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ProviderError::InvalidCommand("empty command".to_string()))?;

        debug!("{}: running {:?} for {}", self.name, argv, resource.id);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&self.env)
            .env("INFRAMAN_RESOURCE_ID", &resource.id)
            .env("INFRAMAN_RESOURCE_TYPE", resource.resource_type.as_str())
            .env("INFRAMAN_REGION", &resource.region)
            .env("INFRAMAN_PROVIDER", &resource.provider)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(resource)
                .map_err(|e| ProviderError::InvalidCommand(e.to_string()))?;
            // The command may exit without reading its input.
            if let Err(e) = stdin.write_all(&payload).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            return Err(ProviderError::CommandFailed {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn parse_output(&self, resource: &Resource, stdout: &str) -> ProviderOutput {
        let trimmed = stdout.trim();
        let mut attributes = BTreeMap::new();

        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(map)) => {
                for (k, v) in map {
                    attributes.insert(k, render_value(&v));
                }
            }
            _ if !trimmed.is_empty() => {
                attributes.insert("stdout".to_string(), trimmed.to_string());
            }
            _ => {}
        }

        let provider_id = attributes
            .remove("id")
            .unwrap_or_else(|| format!("{}-{}", self.name, resource.id));

        ProviderOutput { provider_id, attributes }
    }
}

#[async_trait]
impl Provider for CommandProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn deploy(&self, resource: &Resource) -> Result<ProviderOutput, ProviderError> {
        if self.apply.is_empty() {
            return Err(ProviderError::InvalidCommand(format!(
                "provider {} has no apply command",
                self.name
            )));
        }
        let stdout = self.run(&self.apply, resource).await?;
        Ok(self.parse_output(resource, &stdout))
    }

    async fn destroy(&self, resource: &Resource) -> Result<(), ProviderError> {
        if self.destroy.is_empty() {
            warn!("{}: no destroy command, forgetting {}", self.name, resource.id);
            return Ok(());
        }
        self.run(&self.destroy, resource).await?;
        Ok(())
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_.-]+)\}").expect("valid placeholder pattern"))
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inframan_core::{ResourceSpec, ResourceType};

    fn resource() -> Resource {
        let spec = ResourceSpec::new("web-1", ResourceType::Compute, "local")
            .config("instance_type", "m5.large")
            .config("replicas", 3);
        Resource::from_spec(spec, "lab".into())
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_substitute_variables() {
        let provider = CommandProvider::new("local", vec![], vec![]);
        let template = vec![
            "create".to_string(),
            "{type}/{id}".to_string(),
            "--region={region}".to_string(),
            "--size={config.instance_type}".to_string(),
            "--replicas={config.replicas}".to_string(),
            "{unknown}".to_string(),
        ];

        let argv = provider.substitute_variables(&template, &resource());
        assert_eq!(
            argv,
            vec![
                "create",
                "compute/web-1",
                "--region=lab",
                "--size=m5.large",
                "--replicas=3",
                "{unknown}"
            ]
        );
    }

    #[test]
    fn test_substituted_values_are_not_expanded_again() {
        let provider = CommandProvider::new("local", vec![], vec![]);
        let mut spec = ResourceSpec::new("web-1", ResourceType::Compute, "local")
            .config("a_note", "literal {config.token}")
            .config("token", "s3cr3t");
        spec.name = Some("{region}".into());
        let resource = Resource::from_spec(spec, "lab".into());

        let template = vec![
            "name={name}".to_string(),
            "note={config.a_note}".to_string(),
            "{region}{id}".to_string(),
        ];
        let argv = provider.substitute_variables(&template, &resource);
        assert_eq!(argv, vec!["name={region}", "note=literal {config.token}", "labweb-1"]);
    }

    #[test]
    fn test_parse_output_json_object() {
        let provider = CommandProvider::new("local", vec![], vec![]);
        let out = provider.parse_output(&resource(), r#"{"id": "i-123", "port": 8080}"#);
        assert_eq!(out.provider_id, "i-123");
        assert_eq!(out.attributes.get("port"), Some(&"8080".to_string()));
        assert!(!out.attributes.contains_key("id"));
    }

    #[test]
    fn test_parse_output_plain_text() {
        let provider = CommandProvider::new("local", vec![], vec![]);
        let out = provider.parse_output(&resource(), "created\n");
        assert_eq!(out.provider_id, "local-web-1");
        assert_eq!(out.attributes.get("stdout"), Some(&"created".to_string()));

        let empty = provider.parse_output(&resource(), "");
        assert!(empty.attributes.is_empty());
    }

    #[test]
    fn test_from_config_uppercases_env() {
        let mut config = ProviderConfig::command(vec!["true".into()], vec![]);
        config.env.insert("aws_profile".into(), "lab".into());
        let provider = CommandProvider::from_config("aws", &config);
        assert_eq!(provider.env.get("AWS_PROFILE"), Some(&"lab".to_string()));
    }

    #[tokio::test]
    async fn test_empty_apply_is_invalid() {
        let provider = CommandProvider::new("local", vec![], vec![]);
        let err = provider.deploy(&resource()).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidCommand(_)));
        assert!(provider.destroy(&resource()).await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_deploy_runs_command() {
        let provider = CommandProvider::new(
            "local",
            sh(r#"printf '{"id":"%s-%s","seen":"%s"}' "$INFRAMAN_PROVIDER" "{id}" "$(cat | head -c 1)""#),
            vec![],
        );
        let out = provider.deploy(&resource()).await.unwrap();
        assert_eq!(out.provider_id, "local-web-1");
        assert_eq!(out.attributes.get("seen"), Some(&"{".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_command_reports_stderr() {
        let provider = CommandProvider::new("local", sh("echo quota exceeded >&2; exit 3"), vec![])
            .env("IGNORED", "1");
        match provider.deploy(&resource()).await.unwrap_err() {
            ProviderError::CommandFailed { exit_code, stderr } => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "quota exceeded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_destroy_runs_command() {
        let provider = CommandProvider::new("local", sh("true"), vec!["false".to_string()]);
        assert!(provider.destroy(&resource()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let provider = CommandProvider::new(
            "local",
            vec!["inframan-test-no-such-program".to_string()],
            vec![],
        );
        assert!(matches!(provider.deploy(&resource()).await, Err(ProviderError::Io(_))));
    }
}
