//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! permctl main binary
//!
//! Loads the permission tables described by the resolver configuration and
//! answers permission queries against them.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use permission_resolver::{
    catalog, init_permission_resolver, OrganizationId, PermissionResolver, Plan,
    ResolutionContext, ResolverConfig, Role, StorageBackend, RESOLVER_VERSION,
};

/// Exit code reported when a checked permission is denied
const EXIT_DENIED: u8 = 2;

#[derive(Parser)]
#[command(name = "permctl")]
#[command(about = "Inspect and edit Ledgerdesk permission tables")]
#[command(version = RESOLVER_VERSION)]
struct Cli {
    /// Resolver configuration file
    #[arg(short, long, global = true, default_value = "config/permctl.toml")]
    config: PathBuf,

    /// Seed document (JSON or TOML) loaded into memory instead of the stock tables
    #[arg(long, global = true)]
    seed: Option<PathBuf>,

    /// Use a JSON permission document as read-write storage
    #[arg(long, global = true)]
    permissions_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ContextArgs {
    /// Organization ID
    #[arg(long)]
    org: OrganizationId,

    /// Member role (owner, manager, accounts, staff, or a custom role)
    #[arg(long)]
    role: Role,

    /// Subscription plan of the organization
    #[arg(long)]
    plan: Option<Plan>,
}

impl ContextArgs {
    fn to_context(&self) -> ResolutionContext {
        ResolutionContext {
            organization_id: self.org,
            role: self.role.clone(),
            plan: self.plan.clone(),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SeedFormat {
    Json,
    Toml,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a permission; exits with status 2 when denied
    Check {
        #[command(flatten)]
        context: ContextArgs,

        /// Permission key (module.action)
        permission: String,
    },

    /// Show which source decides a permission
    Explain {
        #[command(flatten)]
        context: ContextArgs,

        /// Permission key (module.action)
        permission: String,
    },

    /// Show the merged permissions of a role in an organization
    Effective {
        #[command(flatten)]
        context: ContextArgs,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Set an organization-specific override
    Grant {
        #[command(flatten)]
        context: ContextArgs,

        /// Permission key (module.action or module.*)
        permission: String,

        /// Store the override as disabled
        #[arg(long)]
        deny: bool,
    },

    /// Remove an organization-specific override
    Revoke {
        #[command(flatten)]
        context: ContextArgs,

        /// Permission key (module.action or module.*)
        permission: String,
    },

    /// Remove every override of an organization
    Reset {
        /// Organization ID
        #[arg(long)]
        org: OrganizationId,
    },

    /// List the built-in permission catalog
    Catalog,

    /// Seed document management
    Seed {
        #[command(subcommand)]
        command: SeedCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum SeedCommands {
    /// Write the current permission tables as a seed document
    Export {
        /// Output file path; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seed format
        #[arg(long, value_enum, default_value = "json")]
        format: SeedFormat,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write the default configuration as JSON
    Generate {
        /// Output file path; `.toml` writes TOML, anything else JSON
        #[arg(short, long, default_value = "permctl.toml")]
        output: PathBuf,
    },

    /// Validate the configuration file
    Validate,

    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();
    run(cli, &mut stdout).await
}

async fn run(cli: Cli, out: &mut impl Write) -> Result<ExitCode> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Check {
            context,
            permission,
        } => {
            let resolver = init_permission_resolver(config).await?;
            let allowed = resolver
                .is_allowed(&context.to_context(), &permission)
                .await?;
            writeln!(out, "{}", if allowed { "allowed" } else { "denied" })?;
            if !allowed {
                return Ok(ExitCode::from(EXIT_DENIED));
            }
        }

        Commands::Explain {
            context,
            permission,
        } => {
            let resolver = init_permission_resolver(config).await?;
            let resolution = resolver
                .explain(&context.to_context(), &permission)
                .await?;
            writeln!(
                out,
                "{} {} (source: {})",
                resolution.permission_key,
                if resolution.allowed { "allowed" } else { "denied" },
                resolution.source
            )?;
        }

        Commands::Effective { context, format } => {
            let resolver = init_permission_resolver(config).await?;
            print_effective(&resolver, &context.to_context(), format, out).await?;
        }

        Commands::Grant {
            context,
            permission,
            deny,
        } => {
            let resolver = init_permission_resolver(config).await?;
            warn_if_ephemeral(&resolver);
            resolver
                .set_organization_permission(context.org, context.role, &permission, !deny)
                .await?;
            writeln!(out, "{} set to {}", permission, !deny)?;
        }

        Commands::Revoke {
            context,
            permission,
        } => {
            let resolver = init_permission_resolver(config).await?;
            warn_if_ephemeral(&resolver);
            resolver
                .remove_organization_permission(context.org, context.role, &permission)
                .await?;
            writeln!(out, "{} override removed", permission)?;
        }

        Commands::Reset { org } => {
            let resolver = init_permission_resolver(config).await?;
            warn_if_ephemeral(&resolver);
            let removed = resolver.reset_organization(org).await?;
            writeln!(out, "removed {} overrides", removed)?;
        }

        Commands::Catalog => {
            for module in catalog::MODULES {
                writeln!(out, "{:<14} {}", module.name, module.label)?;
                for key in module.keys() {
                    writeln!(out, "  {}", key)?;
                }
            }
        }

        Commands::Seed { command } => match command {
            SeedCommands::Export { output, format } => {
                let resolver = init_permission_resolver(config).await?;
                let seed = resolver.storage().export_seed().await?;
                let content = match format {
                    SeedFormat::Json => seed.to_json_pretty()?,
                    SeedFormat::Toml => seed.to_toml()?,
                };
                match output {
                    Some(path) => {
                        std::fs::write(&path, content)
                            .with_context(|| format!("Failed to write {}", path.display()))?;
                        info!("Exported {} rows to {}", seed.len(), path.display());
                    }
                    None => writeln!(out, "{}", content)?,
                }
            }
        },

        Commands::Config { command } => match command {
            ConfigCommands::Generate { output } => {
                ResolverConfig::default().save_to_file(&output)?;
                writeln!(out, "Configuration written to {}", output.display())?;
            }
            ConfigCommands::Validate => {
                config.validate_config()?;
                writeln!(out, "Configuration is valid")?;
            }
            ConfigCommands::Show => {
                writeln!(out, "{}", serde_json::to_string_pretty(&config)?)?;
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}

/// Load configuration from file, falling back to defaults, then apply CLI overrides
fn load_config(cli: &Cli) -> Result<ResolverConfig> {
    let mut config = if cli.config.exists() {
        let config = ResolverConfig::from_file(&cli.config)
            .with_context(|| format!("Failed to load {}", cli.config.display()))?;
        info!("Configuration loaded from: {}", cli.config.display());
        config
    } else {
        ResolverConfig::default()
    };

    if let Some(seed) = &cli.seed {
        config.storage.backend = StorageBackend::Memory;
        config.storage.seed_path = Some(seed.clone());
    }

    if let Some(path) = &cli.permissions_file {
        config.storage.backend = StorageBackend::File;
        config.storage.file_path = Some(path.clone());
    }

    config.validate_config()?;
    Ok(config)
}

fn warn_if_ephemeral(resolver: &PermissionResolver) {
    if resolver.config().storage.backend == StorageBackend::Memory {
        warn!("Memory storage in use; this change is discarded on exit");
    }
}

async fn print_effective(
    resolver: &PermissionResolver,
    ctx: &ResolutionContext,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<()> {
    let effective = resolver.resolve(ctx).await?;

    match format {
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(effective.as_ref())?)?;
        }
        OutputFormat::Table => {
            writeln!(out, "{:<28} {:<8} SOURCE", "PERMISSION", "ALLOWED")?;
            for (key, entry) in &effective.entries {
                writeln!(out, "{:<28} {:<8} {}", key, entry.allowed, entry.source)?;
            }
            if resolver.config().is_superuser(&ctx.role) {
                writeln!(out, "(role {} is a superuser; all checks pass)", ctx.role)?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run_args(args: &[&str]) -> (ExitCode, String) {
        let cli = Cli::try_parse_from(args).unwrap();
        let mut out = Vec::new();
        let code = run(cli, &mut out).await.unwrap();
        (code, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_check_allowed_and_denied() {
        let org = OrganizationId::new().to_string();

        let (code, out) = run_args(&[
            "permctl", "check", "--org", &org, "--role", "staff", "attendance.create",
        ])
        .await;
        assert_eq!(code, ExitCode::SUCCESS);
        assert_eq!(out.trim(), "allowed");

        let (code, out) = run_args(&[
            "permctl", "check", "--org", &org, "--role", "staff", "invoices.delete",
        ])
        .await;
        assert_eq!(code, ExitCode::from(EXIT_DENIED));
        assert_eq!(out.trim(), "denied");
    }

    #[tokio::test]
    async fn test_explain_reports_source() {
        let org = OrganizationId::new().to_string();
        let (_, out) = run_args(&[
            "permctl", "explain", "--org", &org, "--role", "owner", "--plan", "free",
            "reports.export",
        ])
        .await;
        assert_eq!(out.trim(), "reports.export denied (source: plan)");
    }

    #[tokio::test]
    async fn test_effective_json() {
        let org = OrganizationId::new().to_string();
        let (_, out) = run_args(&[
            "permctl", "effective", "--org", &org, "--role", "staff", "--format", "json",
        ])
        .await;
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["role"], "staff");
        assert_eq!(value["entries"]["attendance.create"]["allowed"], true);
        assert_eq!(value["entries"]["attendance.create"]["source"], "global");
    }

    #[tokio::test]
    async fn test_grant_persists_with_permissions_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("permissions.json");
        let file = file.to_str().unwrap();
        let org = OrganizationId::new().to_string();

        run_args(&[
            "permctl", "--permissions-file", file, "grant", "--org", &org, "--role", "staff",
            "reports.view",
        ])
        .await;

        let (code, _) = run_args(&[
            "permctl", "--permissions-file", file, "check", "--org", &org, "--role", "staff",
            "reports.view",
        ])
        .await;
        assert_eq!(code, ExitCode::SUCCESS);

        let (_, out) = run_args(&["permctl", "--permissions-file", file, "reset", "--org", &org])
            .await;
        assert_eq!(out.trim(), "removed 1 overrides");
    }

    #[tokio::test]
    async fn test_seed_file_replaces_stock_tables() {
        let dir = tempfile::tempdir().unwrap();
        let seed_path = dir.path().join("seed.toml");
        std::fs::write(
            &seed_path,
            "[[global]]\nrole = \"staff\"\npermission_key = \"invoices.view\"\nenabled = true\n",
        )
        .unwrap();
        let seed = seed_path.to_str().unwrap();
        let org = OrganizationId::new().to_string();

        let (code, _) = run_args(&[
            "permctl", "--seed", seed, "check", "--org", &org, "--role", "staff", "invoices.view",
        ])
        .await;
        assert_eq!(code, ExitCode::SUCCESS);

        let (code, _) = run_args(&[
            "permctl", "--seed", seed, "check", "--org", &org, "--role", "staff",
            "attendance.create",
        ])
        .await;
        assert_eq!(code, ExitCode::from(EXIT_DENIED));
    }

    #[tokio::test]
    async fn test_config_generate_and_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("permctl.json");
        let path = path.to_str().unwrap();

        let (_, out) = run_args(&["permctl", "config", "generate", "--output", path]).await;
        assert!(out.contains("Configuration written"));

        let (_, out) = run_args(&["permctl", "--config", path, "config", "validate"]).await;
        assert_eq!(out.trim(), "Configuration is valid");
    }

    #[tokio::test]
    async fn test_catalog_lists_modules() {
        let (_, out) = run_args(&["permctl", "catalog"]).await;
        assert!(out.contains("invoices.send"));
        assert!(out.contains("vendor_bills.approve"));
    }

    #[test]
    fn test_rejects_malformed_org() {
        let result = Cli::try_parse_from([
            "permctl", "check", "--org", "acme", "--role", "staff", "invoices.view",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_generated_toml_config_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("permctl.toml");
        let path = path.to_str().unwrap();

        let (code, _) = run_args(&["permctl", "config", "generate", "--output", path]).await;
        assert_eq!(code, ExitCode::SUCCESS);

        let (code, out) = run_args(&["permctl", "--config", path, "config", "validate"]).await;
        assert_eq!(code, ExitCode::SUCCESS);
        assert_eq!(out.trim(), "Configuration is valid");
    }
}
