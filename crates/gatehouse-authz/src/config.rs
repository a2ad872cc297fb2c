//! Authorization configuration
//!
//! Every knob can come from a host binary's CLI (flatten [`AuthzConfig`] into
//! a `clap::Parser`) or straight from the environment via
//! [`AuthzConfig::from_env`].

use std::time::Duration;

use gatehouse_common::{env_duration_secs, env_flag, parse_flag};

/// Env var toggling deny-by-default for methods without an RBAC mapping
pub const DENY_UNMAPPED_ENV: &str = "GLOBULAR_DENY_UNMAPPED";
/// Env var overriding the policy version recorded in audit records
pub const POLICY_VERSION_ENV: &str = "GATEHOUSE_POLICY_VERSION";
/// Env var overriding the superuser subject
pub const SUPERUSER_ENV: &str = "GATEHOUSE_SUPERUSER";
/// Env var overriding the decision cache lifetime (seconds)
pub const DECISION_TTL_ENV: &str = "GATEHOUSE_DECISION_TTL_SECS";
/// Env var overriding the collaborator call deadline (seconds)
pub const COLLABORATOR_TIMEOUT_ENV: &str = "GATEHOUSE_COLLABORATOR_TIMEOUT_SECS";
/// Env var naming this node's own token issuer
pub const LOCAL_NODE_ID_ENV: &str = "GATEHOUSE_LOCAL_NODE_ID";

/// Policy version baked in at build time, if any
pub const DEFAULT_POLICY_VERSION: &str = match option_env!("GATEHOUSE_POLICY_VERSION") {
    Some(v) => v,
    None => "unknown",
};

/// Default superuser subject
pub const DEFAULT_SUPERUSER: &str = "sa";

/// Decision cache lifetime (15 minutes)
pub const DEFAULT_DECISION_TTL: Duration = Duration::from_secs(15 * 60);

/// Deadline for identity, RBAC and role-binding calls
pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(3);

/// Authorization settings injected into the engine at server startup
#[derive(Debug, Clone, clap::Args)]
pub struct AuthzConfig {
    /// Deny methods that have no RBAC resource mapping instead of allowing
    /// them with a warning
    #[arg(
        long = "deny-unmapped-methods",
        env = DENY_UNMAPPED_ENV,
        default_value = "false",
        value_parser = parse_flag_arg,
        action = clap::ArgAction::Set
    )]
    pub deny_unmapped_methods: bool,

    /// Policy version recorded on every audit record
    #[arg(long, env = POLICY_VERSION_ENV, default_value = DEFAULT_POLICY_VERSION)]
    pub policy_version: String,

    /// Subject that bypasses every check after authentication
    #[arg(long, env = SUPERUSER_ENV, default_value = DEFAULT_SUPERUSER)]
    pub superuser: String,

    /// Lifetime of a cached RBAC decision, in seconds
    #[arg(
        long = "decision-ttl-secs",
        env = DECISION_TTL_ENV,
        default_value = "900",
        value_parser = parse_secs
    )]
    pub decision_ttl: Duration,

    /// Deadline for each identity/RBAC call, in seconds
    #[arg(
        long = "collaborator-timeout-secs",
        env = COLLABORATOR_TIMEOUT_ENV,
        default_value = "3",
        value_parser = parse_secs
    )]
    pub collaborator_timeout: Duration,

    /// This node's own issuer id; peer attribution is skipped for it
    #[arg(long, env = LOCAL_NODE_ID_ENV)]
    pub local_node_id: Option<String>,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            deny_unmapped_methods: false,
            policy_version: DEFAULT_POLICY_VERSION.to_string(),
            superuser: DEFAULT_SUPERUSER.to_string(),
            decision_ttl: DEFAULT_DECISION_TTL,
            collaborator_timeout: DEFAULT_COLLABORATOR_TIMEOUT,
            local_node_id: None,
        }
    }
}

impl AuthzConfig {
    /// Build a configuration from environment variables, using defaults for
    /// anything unset
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            deny_unmapped_methods: env_flag(DENY_UNMAPPED_ENV),
            policy_version: non_empty_env(POLICY_VERSION_ENV).unwrap_or(defaults.policy_version),
            superuser: non_empty_env(SUPERUSER_ENV).unwrap_or(defaults.superuser),
            decision_ttl: env_duration_secs(DECISION_TTL_ENV, defaults.decision_ttl),
            collaborator_timeout: env_duration_secs(
                COLLABORATOR_TIMEOUT_ENV,
                defaults.collaborator_timeout,
            ),
            local_node_id: non_empty_env(LOCAL_NODE_ID_ENV),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_flag_arg(value: &str) -> Result<bool, String> {
    Ok(parse_flag(value))
}

fn parse_secs(value: &str) -> Result<Duration, String> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| format!("expected whole seconds: {e}"))
}
