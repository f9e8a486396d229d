//! Install command

use std::io::BufReader;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use clap::Args;
use console::style;

use apiop_core::{
    BatchFlags, FileModeStore, FlagInput, FlagName, OperatingMode, PasswordSource, ToolConfig,
};
use apiop_kube::{KubeSecretStore, ResourceManager};
use apiop_repo::{HttpBundleFetcher, HttpClient, HttpVersionSource, env_override};

use crate::error::{CliError, Result};
use crate::orchestrator::{
    Cluster, Connect, InstallError, InstallOutcome, Installer, Interaction, PreparedInstall,
};
use crate::prompt::TerminalPrompter;

/// Registry and source flags of `install api-operator`
///
/// Without `--registry-type` every registry setting is asked for
/// interactively and the other registry flags are ignored.
#[derive(Args, Debug, Default)]
pub struct ApiOperatorArgs {
    /// Controller configuration: a YAML file, a directory or a .tar.gz bundle
    #[arg(short = 'f', long = "from-file")]
    pub from_file: Option<PathBuf>,

    /// Registry type: DOCKER_HUB, AMAZON_ECR, GCR or HTTP
    #[arg(short = 'R', long = "registry-type")]
    pub registry_type: Option<String>,

    /// Repository to push built images to
    #[arg(short = 'r', long)]
    pub repository: Option<String>,

    /// Registry username
    #[arg(short = 'u', long)]
    pub username: Option<String>,

    /// Registry password
    #[arg(short = 'p', long)]
    pub password: Option<String>,

    /// Read the registry password from stdin
    #[arg(long = "password-stdin")]
    pub password_stdin: bool,

    /// Password, token or cloud credentials file
    #[arg(short = 'c', long = "key-file")]
    pub key_file: Option<String>,

    /// Namespace of the operator (defaults to the configured one)
    #[arg(long)]
    pub namespace: Option<String>,

    /// Apply attempts before giving up (defaults to the configured budget)
    #[arg(long)]
    pub retries: Option<u32>,
}

impl ApiOperatorArgs {
    /// Registry flags with provenance
    pub fn batch_flags(&self) -> BatchFlags {
        BatchFlags::new()
            .with(FlagName::Repository, FlagInput::from_option(self.repository.clone()))
            .with(FlagName::Username, FlagInput::from_option(self.username.clone()))
            .with(FlagName::Password, FlagInput::from_option(self.password.clone()))
            .with(FlagName::PasswordStdin, FlagInput::switch(self.password_stdin))
            .with(FlagName::KeyFile, FlagInput::from_option(self.key_file.clone()))
    }
}

pub async fn run(args: ApiOperatorArgs, config_path: Option<&Path>) -> Result<()> {
    let config_path = match config_path {
        Some(path) => path.to_path_buf(),
        None => ToolConfig::default_path()?,
    };
    let mut settings = ToolConfig::load(Some(&config_path))?.operator;
    if let Some(namespace) = &args.namespace {
        settings.namespace = namespace.clone();
    }
    if let Some(retries) = args.retries {
        settings.retry_budget = retries;
    }

    let http = HttpClient::new().map_err(|e| CliError::internal(e.to_string()))?;
    let versions = HttpVersionSource::new(http.clone());
    let bundles = HttpBundleFetcher::new(http);
    let installer = Installer::new(&settings, &versions, &bundles)
        .with_version_override(env_override(&settings.version_env));

    println!(
        "{} Installing API Operator into namespace {}",
        style("→").blue().bold(),
        style(&settings.namespace).yellow()
    );

    let flags = args.batch_flags();
    let mut prompter = TerminalPrompter::new();
    let mut stdin = BufReader::new(std::io::stdin());
    let mut connector = KubeConnector::new(&config_path);
    let outcome = installer
        .install(
            args.from_file.as_deref(),
            args.registry_type.as_deref(),
            &flags,
            &mut Interaction {
                prompter: &mut prompter,
                stdin: &mut stdin,
            },
            &mut connector,
        )
        .await?;

    print_outcome(&outcome, &settings.namespace);
    Ok(())
}

/// Cluster from the ambient kubeconfig, with the mode kept in the config file
struct KubeConnector {
    applier: Option<ResourceManager>,
    secrets: Option<KubeSecretStore>,
    modes: FileModeStore,
}

impl KubeConnector {
    fn new(config_path: &Path) -> Self {
        Self {
            applier: None,
            secrets: None,
            modes: FileModeStore::new(config_path),
        }
    }
}

#[async_trait(?Send)]
impl Connect for KubeConnector {
    async fn connect<'s>(&'s mut self, prepared: &PreparedInstall) -> std::result::Result<Cluster<'s>, InstallError> {
        print_plan(prepared);

        let client = kube::Client::try_default()
            .await
            .map_err(|e| InstallError::Connection(e.into()))?;
        let applier = ResourceManager::new(client.clone())
            .await
            .map_err(InstallError::Connection)?;

        Ok(Cluster {
            applier: self.applier.insert(applier),
            secrets: &*self.secrets.insert(KubeSecretStore::new(client)),
            modes: &mut self.modes,
        })
    }
}

fn print_plan(prepared: &PreparedInstall) {
    match &prepared.request.version {
        Some(version) => println!(
            "{} Operator version {} ({})",
            style("→").blue().bold(),
            style(version).cyan(),
            version.origin()
        ),
        None => println!(
            "{} Controller configuration from {}",
            style("→").blue().bold(),
            style(&prepared.request.config_source).cyan()
        ),
    }
    println!(
        "{} Applying {} manifest(s) from {}",
        style("→").blue().bold(),
        prepared.bundle.len(),
        prepared.bundle.origin()
    );
}

fn print_outcome(outcome: &InstallOutcome, namespace: &str) {
    println!();
    match &outcome.request.version {
        Some(version) => println!(
            "{} API Operator {} installed",
            style("✓").green().bold(),
            style(version).cyan()
        ),
        None => println!("{} API Operator configuration installed", style("✓").green().bold()),
    }

    println!("  {}", outcome.applied.summary());
    if outcome.applied.attempts > 1 {
        println!("  Took {} attempts", outcome.applied.attempts);
    }
    println!(
        "  Bundle digest: {}",
        style(&outcome.applied.bundle_digest[..12.min(outcome.applied.bundle_digest.len())]).dim()
    );

    for secret in &outcome.persisted.secrets {
        println!("  Secret {}/{}", namespace, style(secret).cyan());
    }
    let credentials = match outcome.password_source {
        Some(PasswordSource::Literal) => "password",
        Some(PasswordSource::Stdin) => "password from stdin",
        Some(PasswordSource::File) => "key file",
        None => "anonymous access",
    };
    println!(
        "  Registry {} ({}) recorded in {}/{}",
        style(outcome.registry).yellow(),
        credentials,
        namespace,
        outcome.persisted.config_map
    );

    if outcome.previous_mode != Some(OperatingMode::Kubernetes) {
        println!(
            "{} Switched to {} mode",
            style("→").blue().bold(),
            style(OperatingMode::Kubernetes).cyan()
        );
    }
}
