//! Installation flow
//!
//! An installation runs in two halves. [`Installer::prepare`] needs no
//! cluster: it validates batch flags (or prompts), resolves the operator
//! version and loads the manifest bundle. [`Installer::execute`] applies the
//! bundle, persists the registry credentials and switches the tool to k8s
//! mode. [`Installer::install`] runs both, connecting to the cluster only
//! once the first half has succeeded.
//!
//! The first failing stage aborts the rest; nothing is rolled back, and
//! re-running converges on the same state.

use std::io::BufRead;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use apiop_core::{
    BatchFlags, ConfigSource, CoreError, CredentialError, CredentialSet, InstallationRequest,
    ManifestBundle, ModeStore, OperatingMode, OperatorSettings, OperatorVersion, PasswordSource,
    Prompter, RegistryType, ValidationError, choose_registry, resolve_batch, resolve_interactive,
    validate,
};
use apiop_kube::{
    ApplyError, ApplySummary, ConfigMaterializer, KubeError, ManifestApplier, PersistError,
    PersistReport, SecretPersister, SecretStore,
};
use apiop_repo::{BundleFetcher, VersionError, VersionQuery, VersionResolver, VersionSource, load_bundle};

/// Component name used in version messages
const COMPONENT: &str = "API Operator";

/// Installation failure, tagged with the stage it happened in
#[derive(Debug, Error)]
pub enum InstallError {
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("cluster unreachable: {0}")]
    Connection(#[source] KubeError),

    #[error("operating mode could not be saved: {0}")]
    Mode(#[source] CoreError),
}

impl InstallError {
    pub fn stage(&self) -> &'static str {
        match self {
            InstallError::Version(_) => "version",
            InstallError::Validation(_) => "validation",
            InstallError::Credentials(_) => "credentials",
            InstallError::Apply(ApplyError::Bundle { .. } | ApplyError::InvalidManifest { .. }) => {
                "bundle"
            }
            InstallError::Apply(_) => "apply",
            InstallError::Connection(_) => "connect",
            InstallError::Persist(_) => "persist",
            InstallError::Mode(_) => "mode",
        }
    }

    /// Whether the cluster may hold part of the installation
    pub fn is_incomplete(&self) -> bool {
        matches!(self.stage(), "apply" | "persist" | "mode")
    }
}

/// Where answers come from: prompts in interactive mode, stdin for
/// `--password-stdin`
pub struct Interaction<'a> {
    pub prompter: &'a mut dyn Prompter,
    pub stdin: &'a mut dyn BufRead,
}

/// Cluster-side effects of an installation
pub struct Cluster<'a> {
    pub applier: &'a mut dyn ManifestApplier,
    pub secrets: &'a dyn SecretStore,
    pub modes: &'a mut dyn ModeStore,
}

/// Opens the cluster side of an installation
#[async_trait(?Send)]
pub trait Connect {
    /// Called once, after `prepared` is complete
    async fn connect<'s>(&'s mut self, prepared: &PreparedInstall) -> Result<Cluster<'s>, InstallError>;
}

/// Everything resolved before touching the cluster
#[derive(Debug)]
pub struct PreparedInstall {
    pub request: InstallationRequest,
    pub credentials: CredentialSet,
    pub bundle: ManifestBundle,
}

/// A finished installation
#[derive(Debug)]
pub struct InstallOutcome {
    pub request: InstallationRequest,
    pub registry: RegistryType,
    pub password_source: Option<PasswordSource>,
    pub applied: ApplySummary,
    pub persisted: PersistReport,
    /// Mode before the switch, if it could be read
    pub previous_mode: Option<OperatingMode>,
}

/// Runs installations against injected endpoints
pub struct Installer<'a> {
    settings: &'a OperatorSettings,
    versions: &'a dyn VersionSource,
    bundles: &'a dyn BundleFetcher,
    version_override: Option<String>,
}

impl<'a> Installer<'a> {
    pub fn new(
        settings: &'a OperatorSettings,
        versions: &'a dyn VersionSource,
        bundles: &'a dyn BundleFetcher,
    ) -> Self {
        Self {
            settings,
            versions,
            bundles,
            version_override: None,
        }
    }

    /// Pin the version (value of the override environment variable)
    pub fn with_version_override(mut self, version: Option<String>) -> Self {
        self.version_override = version;
        self
    }

    /// Validate, resolve the version and credentials, and load the bundle
    ///
    /// In batch mode the flags are validated before any network call. In
    /// interactive mode the version is resolved before the first prompt.
    pub async fn prepare(
        &self,
        local_file: Option<&Path>,
        registry_type: Option<&str>,
        flags: &BatchFlags,
        interaction: &mut Interaction<'_>,
    ) -> Result<PreparedInstall, InstallError> {
        let local_file = local_file.filter(|p| !p.as_os_str().is_empty());
        let batch = match registry_type.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => {
                let registry: RegistryType = name.parse()?;
                validate(registry, flags)?;
                Some(registry)
            }
            None => None,
        };

        let (config_source, version) = match local_file {
            Some(path) => {
                tracing::info!(path = %path.display(), "using local controller configuration");
                (ConfigSource::Local(path.to_path_buf()), None)
            }
            None => {
                let version = self.resolve_version().await?;
                (ConfigSource::remote(&self.settings.bundle_url, &version), Some(version))
            }
        };

        let credentials = match batch {
            Some(registry) => resolve_batch(registry, flags, &mut interaction.stdin)?,
            None => {
                let registry = choose_registry(&mut *interaction.prompter)?;
                resolve_interactive(registry, &mut *interaction.prompter)?
            }
        };

        let bundle = load_bundle(&config_source, self.bundles)
            .await
            .map_err(|e| ApplyError::Bundle {
                origin: config_source.to_string(),
                source: Box::new(e),
            })?;

        Ok(PreparedInstall {
            request: InstallationRequest {
                config_source,
                retry_budget: self.settings.retry_budget,
                security_profile: self.settings.security_crd.clone(),
                version,
            },
            credentials,
            bundle,
        })
    }

    /// Apply the configuration, persist credentials and switch to k8s mode
    pub async fn execute(
        &self,
        prepared: PreparedInstall,
        cluster: &mut Cluster<'_>,
    ) -> Result<InstallOutcome, InstallError> {
        let PreparedInstall {
            request,
            credentials,
            bundle,
        } = prepared;

        let applied = ConfigMaterializer::new(&self.settings.namespace, self.settings.retry_interval)
            .apply(
                &mut *cluster.applier,
                &bundle,
                request.retry_budget,
                &request.security_profile,
            )
            .await?;

        let persisted = SecretPersister::new(&self.settings.namespace, &self.settings.controller_config)
            .persist(cluster.secrets, &credentials)
            .await?;

        let previous_mode = cluster.modes.current().ok();
        cluster
            .modes
            .set(OperatingMode::Kubernetes)
            .map_err(InstallError::Mode)?;
        tracing::info!(previous = ?previous_mode, "switched to k8s mode");

        Ok(InstallOutcome {
            request,
            registry: credentials.registry,
            password_source: credentials.source,
            applied,
            persisted,
            previous_mode,
        })
    }

    /// Prepare, connect, then execute
    pub async fn install(
        &self,
        local_file: Option<&Path>,
        registry_type: Option<&str>,
        flags: &BatchFlags,
        interaction: &mut Interaction<'_>,
        connector: &mut dyn Connect,
    ) -> Result<InstallOutcome, InstallError> {
        let prepared = self
            .prepare(local_file, registry_type, flags, interaction)
            .await?;
        let mut cluster = connector.connect(&prepared).await?;
        self.execute(prepared, &mut cluster).await
    }

    async fn resolve_version(&self) -> Result<OperatorVersion, VersionError> {
        let query = VersionQuery {
            component: COMPONENT.to_string(),
            env_var: self.settings.version_env.clone(),
            default_version: self.settings.default_version.clone(),
            validation_url_template: self.settings.validation_url.clone(),
            discovery_url: self.settings.discovery_url.clone(),
        };
        VersionResolver::new(self.versions)
            .resolve(&query, self.version_override.as_deref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiop_core::{Answer, FlagInput, FlagName, MemoryModeStore, ScriptedPrompter};
    use apiop_kube::error::api_error;
    use apiop_kube::{MockApplier, MockSecretStore, ScriptedFailure};
    use apiop_repo::{MockBundleFetcher, MockVersionSource};
    use std::io::{Cursor, Write};
    use std::time::Duration;

    const BUNDLE: &str = "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: wso2-system\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: controller-config\n";
    const BUNDLE_URL: &str = "https://bundles.test/v1.2.0/configs.yaml";

    fn settings() -> OperatorSettings {
        OperatorSettings {
            bundle_url: "https://bundles.test/{version}/configs.yaml".to_string(),
            retry_interval: Duration::ZERO,
            retry_budget: 3,
            ..Default::default()
        }
    }

    fn versions() -> MockVersionSource {
        MockVersionSource::new()
            .with_latest("v1.2.0")
            .with_existing(["v1.2.0"])
    }

    fn bundles() -> MockBundleFetcher {
        MockBundleFetcher::new().with_bundle(BUNDLE_URL, BUNDLE)
    }

    /// Mocks for one test, shared between runs
    struct Fixture {
        settings: OperatorSettings,
        versions: MockVersionSource,
        bundles: MockBundleFetcher,
        applier: MockApplier,
        secrets: MockSecretStore,
        modes: MemoryModeStore,
        /// Cluster connections opened so far
        connections: usize,
        unreachable: bool,
    }

    /// Hands out the fixture's mocks as the cluster
    struct MockConnector<'c> {
        applier: &'c mut MockApplier,
        secrets: &'c MockSecretStore,
        modes: &'c mut MemoryModeStore,
        connections: &'c mut usize,
        unreachable: bool,
    }

    #[async_trait(?Send)]
    impl<'c> Connect for MockConnector<'c> {
        async fn connect<'s>(&'s mut self, prepared: &PreparedInstall) -> Result<Cluster<'s>, InstallError> {
            assert!(!prepared.bundle.is_empty());
            *self.connections += 1;
            if self.unreachable {
                return Err(InstallError::Connection(KubeError::Api(api_error(
                    503,
                    "ServiceUnavailable",
                    "apiserver down",
                ))));
            }
            Ok(Cluster {
                applier: &mut *self.applier,
                secrets: &*self.secrets,
                modes: &mut *self.modes,
            })
        }
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                settings: settings(),
                versions: versions(),
                bundles: bundles(),
                applier: MockApplier::new(),
                secrets: MockSecretStore::new(),
                modes: MemoryModeStore::new(),
                connections: 0,
                unreachable: false,
            }
        }

        async fn run(
            &mut self,
            registry_type: Option<&str>,
            flags: &BatchFlags,
            prompter: &mut ScriptedPrompter,
            stdin: &mut dyn BufRead,
        ) -> Result<InstallOutcome, InstallError> {
            let installer = Installer::new(&self.settings, &self.versions, &self.bundles);
            let mut interaction = Interaction { prompter, stdin };
            let mut connector = MockConnector {
                applier: &mut self.applier,
                secrets: &self.secrets,
                modes: &mut self.modes,
                connections: &mut self.connections,
                unreachable: self.unreachable,
            };
            installer
                .install(None, registry_type, flags, &mut interaction, &mut connector)
                .await
        }

        async fn batch(&mut self, registry_type: &str, flags: &BatchFlags) -> Result<InstallOutcome, InstallError> {
            self.run(
                Some(registry_type),
                flags,
                &mut ScriptedPrompter::default(),
                &mut std::io::empty(),
            )
            .await
        }
    }

    fn docker_hub_flags() -> BatchFlags {
        BatchFlags::new()
            .with(FlagName::Repository, FlagInput::given("myorg"))
            .with(FlagName::Username, FlagInput::given("alice"))
            .with(FlagName::Password, FlagInput::given("s3cret"))
    }

    #[tokio::test]
    async fn test_batch_docker_hub_install() {
        let mut fx = Fixture::new();
        let outcome = fx.batch("DOCKER_HUB", &docker_hub_flags()).await.unwrap();

        assert_eq!(outcome.registry, RegistryType::DockerHub);
        assert_eq!(outcome.password_source, Some(PasswordSource::Literal));
        assert_eq!(outcome.request.version.as_ref().map(|v| v.as_str()), Some("v1.2.0"));
        assert_eq!(
            outcome.request.config_source,
            ConfigSource::Remote(BUNDLE_URL.to_string())
        );
        assert_eq!(outcome.persisted.secrets, vec!["registry-credentials"]);
        assert_eq!(fx.modes.current().unwrap(), OperatingMode::Kubernetes);
        assert_eq!(outcome.previous_mode, Some(OperatingMode::Local));
    }

    #[tokio::test]
    async fn test_install_twice_converges() {
        let mut fx = Fixture::new();
        let first = fx.batch("DOCKER_HUB", &docker_hub_flags()).await.unwrap();
        let secret = fx.secrets.secret("wso2-system", "registry-credentials");
        let config = fx.secrets.config_map("wso2-system", "controller-config");

        let second = fx.batch("DOCKER_HUB", &docker_hub_flags()).await.unwrap();

        assert_eq!(first.applied.created(), 2);
        assert_eq!(second.applied.created(), 0);
        assert_eq!(fx.applier.resources().len(), 2);
        assert_eq!(fx.secrets.secret_count(), 1);
        assert_eq!(fx.secrets.secret("wso2-system", "registry-credentials"), secret);
        assert_eq!(fx.secrets.config_map("wso2-system", "controller-config"), config);
        assert_eq!(fx.modes.current().unwrap(), OperatingMode::Kubernetes);
    }

    #[tokio::test]
    async fn test_amazon_ecr_end_to_end() {
        let mut key = tempfile::NamedTempFile::new().unwrap();
        writeln!(key, "[default]\naws_access_key_id = AKIA\naws_secret_access_key = xyz").unwrap();

        let flags = BatchFlags::new()
            .with(
                FlagName::Repository,
                FlagInput::given("123.dkr.ecr.us-east-1.amazonaws.com/apis"),
            )
            .with(FlagName::KeyFile, FlagInput::given(key.path().to_string_lossy()));

        let mut fx = Fixture::new();
        let outcome = fx.batch("AMAZON_ECR", &flags).await.unwrap();

        assert_eq!(outcome.password_source, Some(PasswordSource::File));
        assert_eq!(fx.secrets.secret_count(), 1);
        assert_eq!(fx.secrets.counts().secret_writes, 1);
        assert!(fx.secrets.secret("wso2-system", "aws-credentials").is_some());
    }

    #[tokio::test]
    async fn test_conflict_rejected_before_any_call() {
        let flags = docker_hub_flags().with(FlagName::PasswordStdin, FlagInput::switch(true));

        let mut fx = Fixture::new();
        let err = fx.batch("DOCKER_HUB", &flags).await.unwrap_err();

        assert!(matches!(
            err,
            InstallError::Validation(ValidationError::ConflictingFlags { .. })
        ));
        assert_eq!(err.stage(), "validation");
        assert_eq!(fx.versions.counts().latest, 0);
        assert_eq!(fx.versions.counts().exists, 0);
        assert!(fx.bundles.fetched().is_empty());
        assert_eq!(fx.connections, 0);
        assert_eq!(fx.applier.counts().attempts, 0);
        assert_eq!(fx.secrets.counts().secret_writes, 0);
        assert_eq!(fx.modes.writes, 0);
    }

    #[tokio::test]
    async fn test_unknown_registry_type() {
        let mut fx = Fixture::new();
        let err = fx.batch("DOKER_HUB", &docker_hub_flags()).await.unwrap_err();

        assert_eq!(err.stage(), "validation");
        insta::assert_snapshot!(err.to_string(), @"unknown registry type 'DOKER_HUB', did you mean 'DOCKER_HUB'?");
        assert_eq!(fx.versions.counts().latest, 0);
    }

    #[tokio::test]
    async fn test_password_from_stdin() {
        let flags = BatchFlags::new()
            .with(FlagName::Repository, FlagInput::given("myorg"))
            .with(FlagName::Username, FlagInput::given("alice"))
            .with(FlagName::PasswordStdin, FlagInput::switch(true));

        let mut fx = Fixture::new();
        let outcome = fx
            .run(
                Some("DOCKER_HUB"),
                &flags,
                &mut ScriptedPrompter::default(),
                &mut Cursor::new(b"from-stdin\n".to_vec()),
            )
            .await
            .unwrap();

        assert_eq!(outcome.password_source, Some(PasswordSource::Stdin));
    }

    #[tokio::test]
    async fn test_interactive_resolves_version_before_prompting() {
        let mut fx = Fixture::new();
        let mut prompter = ScriptedPrompter::new([
            Answer::Select(3),
            Answer::Text("registry.local/team".into()),
            Answer::Text(String::new()),
        ]);

        let outcome = fx
            .run(None, &BatchFlags::new(), &mut prompter, &mut std::io::empty())
            .await
            .unwrap();

        assert_eq!(outcome.registry, RegistryType::Http);
        assert_eq!(outcome.password_source, None);
        assert!(outcome.persisted.secrets.is_empty());
        assert_eq!(prompter.remaining(), 0);
        assert_eq!(
            fx.secrets
                .config_map("wso2-system", "controller-config")
                .and_then(|c| c.get("registryType").cloned()),
            Some("HTTP".to_string())
        );
    }

    #[tokio::test]
    async fn test_interactive_version_failure_skips_prompts() {
        let mut fx = Fixture::new();
        fx.versions = MockVersionSource::new().failing_validation();
        let mut prompter = ScriptedPrompter::new([Answer::Select(0)]);

        let err = fx
            .run(None, &BatchFlags::new(), &mut prompter, &mut std::io::empty())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), "version");
        assert!(prompter.asked.is_empty());
    }

    #[tokio::test]
    async fn test_prompt_cancelled() {
        let mut fx = Fixture::new();
        let mut prompter = ScriptedPrompter::new([Answer::Cancel]);

        let err = fx
            .run(None, &BatchFlags::new(), &mut prompter, &mut std::io::empty())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            InstallError::Credentials(CredentialError::PromptCancelled)
        ));
        assert_eq!(fx.applier.counts().attempts, 0);
    }

    #[tokio::test]
    async fn test_override_is_used() {
        let mut fx = Fixture::new();
        fx.versions = versions().with_existing(["v1.1.0"]);
        fx.bundles = MockBundleFetcher::new()
            .with_bundle("https://bundles.test/v1.1.0/configs.yaml", BUNDLE);

        let installer = Installer::new(&fx.settings, &fx.versions, &fx.bundles)
            .with_version_override(Some("v1.1.0".to_string()));
        let prepared = installer
            .prepare(
                None,
                Some("DOCKER_HUB"),
                &docker_hub_flags(),
                &mut Interaction {
                    prompter: &mut ScriptedPrompter::default(),
                    stdin: &mut std::io::empty(),
                },
            )
            .await
            .unwrap();

        assert_eq!(prepared.request.version.map(|v| v.to_string()), Some("v1.1.0".to_string()));
        assert_eq!(fx.versions.counts().latest, 0);
    }

    #[tokio::test]
    async fn test_local_file_skips_version_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("configs.yaml");
        std::fs::write(&file, BUNDLE).unwrap();

        let fx = Fixture::new();
        let installer = Installer::new(&fx.settings, &fx.versions, &fx.bundles);
        let prepared = installer
            .prepare(
                Some(&file),
                Some("DOCKER_HUB"),
                &docker_hub_flags(),
                &mut Interaction {
                    prompter: &mut ScriptedPrompter::default(),
                    stdin: &mut std::io::empty(),
                },
            )
            .await
            .unwrap();

        assert!(prepared.request.is_local_install());
        assert!(prepared.request.version.is_none());
        assert_eq!(fx.versions.counts().latest, 0);
        assert_eq!(fx.versions.counts().exists, 0);
    }

    #[tokio::test]
    async fn test_missing_bundle_is_bundle_stage() {
        let mut fx = Fixture::new();
        fx.bundles = MockBundleFetcher::new();

        let err = fx.batch("DOCKER_HUB", &docker_hub_flags()).await.unwrap_err();

        assert_eq!(err.stage(), "bundle");
        assert!(!err.is_incomplete());
        assert_eq!(fx.connections, 0);
        assert_eq!(fx.applier.counts().attempts, 0);
    }

    #[tokio::test]
    async fn test_connects_once_after_prepare() {
        let mut fx = Fixture::new();
        fx.batch("DOCKER_HUB", &docker_hub_flags()).await.unwrap();

        assert_eq!(fx.connections, 1);
        assert_eq!(fx.bundles.fetched(), vec![BUNDLE_URL.to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_cluster_changes_nothing() {
        let mut fx = Fixture::new();
        fx.unreachable = true;

        let err = fx.batch("DOCKER_HUB", &docker_hub_flags()).await.unwrap_err();

        assert_eq!(err.stage(), "connect");
        assert!(!err.is_incomplete());
        assert_eq!(fx.connections, 1);
        assert_eq!(fx.applier.counts().attempts, 0);
        assert_eq!(fx.secrets.counts().secret_writes, 0);
        assert_eq!(fx.modes.writes, 0);
    }

    #[tokio::test]
    async fn test_apply_failure_leaves_mode_alone() {
        let mut fx = Fixture::new();
        fx.applier = MockApplier::new().always(ScriptedFailure::Status(503));

        let err = fx.batch("DOCKER_HUB", &docker_hub_flags()).await.unwrap_err();

        assert_eq!(err.stage(), "apply");
        assert!(err.is_incomplete());
        assert_eq!(fx.applier.counts().attempts, 3);
        assert_eq!(fx.secrets.counts().secret_writes, 0);
        assert_eq!(fx.modes.writes, 0);
        assert_eq!(fx.modes.current().unwrap(), OperatingMode::Local);
    }

    #[tokio::test]
    async fn test_persist_failure_is_incomplete() {
        let mut fx = Fixture::new();
        fx.secrets = MockSecretStore::new().failing(403);

        let err = fx.batch("DOCKER_HUB", &docker_hub_flags()).await.unwrap_err();

        assert_eq!(err.stage(), "persist");
        assert!(err.is_incomplete());
        assert_eq!(fx.applier.counts().attempts, 1);
        assert_eq!(fx.modes.writes, 0);
    }
}
