// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{JunitImpl, LoadConfigImpl, PositiveCount, RaceConfigImpl};
use crate::errors::{ConfigParseError, ConfigParseErrorKind, ProfileNotFound};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use itertools::Itertools;
use serde::Deserialize;
use std::{
    collections::{BTreeSet, HashMap},
    time::Duration,
};
use tracing::warn;

/// Overall configuration for dedup-probe.
///
/// This is the root data structure for dedup-probe configuration. Most runs will use this struct
/// through [`ProbeConfig::profile`], which resolves a [`ProbeProfile`].
#[derive(Clone, Debug)]
pub struct ProbeConfig {
    root: Utf8PathBuf,
    inner: ProbeConfigImpl,
}

impl ProbeConfig {
    /// The default location of the config within the working directory: `.config/dedup-probe.toml`.
    pub const CONFIG_PATH: &'static str = ".config/dedup-probe.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the config from the given file, or if not specified from `.config/dedup-probe.toml`
    /// under `root`.
    ///
    /// If no config file is specified and `root` doesn't have `.config/dedup-probe.toml`, uses the
    /// default config options. Unknown keys are reported as warnings.
    pub fn from_sources(
        root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_impl(root, config_file, |config_file, unknown| {
            warn!(
                "ignoring unknown configuration keys in config file {config_file}: {}",
                unknown.iter().join(", ")
            );
        })
    }

    // A custom unknown_callback can be passed in while testing.
    fn from_sources_impl(
        root: impl Into<Utf8PathBuf>,
        file: Option<&Utf8Path>,
        mut unknown_callback: impl FnMut(&Utf8Path, &BTreeSet<String>),
    ) -> Result<Self, ConfigParseError> {
        let root = root.into();
        let (config_file, source) = match file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (config, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;

        if !unknown.is_empty() {
            unknown_callback(&config_file, &unknown);
        }

        Ok(Self {
            root,
            inner: config.into_config_impl(),
        })
    }

    /// Returns the default config.
    #[cfg(test)]
    pub(crate) fn default_config(root: impl Into<Utf8PathBuf>) -> Self {
        let config = Self::make_default_config()
            .build()
            .expect("default config is always valid");

        let mut unknown = BTreeSet::new();
        let deserialized: ProbeConfigDeserialize =
            serde_ignored::deserialize(config, |path: serde_ignored::Path| {
                unknown.insert(path.to_string());
            })
            .expect("default config is always valid");

        // The default config is embedded in the binary, so it must not have unknown keys.
        if !unknown.is_empty() {
            panic!(
                "found unknown keys in default config: {}",
                unknown.iter().join(", ")
            );
        }

        Self {
            root: root.into(),
            inner: deserialized.into_config_impl(),
        }
    }

    /// Returns the profile with the given name, or an error if a profile was specified but not
    /// found.
    pub fn profile(&self, name: impl AsRef<str>) -> Result<ProbeProfile<'_>, ProfileNotFound> {
        let name = name.as_ref();
        let custom_profile = self.inner.get_profile(name)?;
        Ok(ProbeProfile {
            name: name.to_owned(),
            report_dir: self.root.join(&self.inner.report.dir),
            default_profile: &self.inner.default_profile,
            custom_profile,
        })
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(ProbeConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: ProbeConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // serde_path_to_error already reports the key, so drop it from the config error.
                let path = error.path().clone();
                let config_error = error.into_inner();
                let error = match config_error {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

/// A dedup-probe profile, with the default profile filled in for any keys it doesn't set.
///
/// Returned by [`ProbeConfig::profile`].
#[derive(Clone, Debug)]
pub struct ProbeProfile<'cfg> {
    name: String,
    report_dir: Utf8PathBuf,
    default_profile: &'cfg DefaultProfileImpl,
    custom_profile: Option<&'cfg CustomProfileImpl>,
}

impl<'cfg> ProbeProfile<'cfg> {
    /// Returns the name of the profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the directory reports are written to.
    pub fn report_dir(&self) -> &Utf8Path {
        &self.report_dir
    }

    /// Returns the base URL of the notification API, if the profile sets one.
    pub fn base_url(&self) -> Option<&'cfg str> {
        self.custom_profile
            .and_then(|profile| profile.base_url.as_deref())
            .or(self.default_profile.base_url.as_deref())
    }

    /// Returns the path submissions are sent to.
    pub fn send_path(&self) -> &'cfg str {
        self.custom_profile
            .and_then(|profile| profile.send_path.as_deref())
            .unwrap_or(&self.default_profile.send_path)
    }

    /// Returns the environment variable the API key is read from.
    pub fn api_key_env(&self) -> &'cfg str {
        self.custom_profile
            .and_then(|profile| profile.api_key_env.as_deref())
            .unwrap_or(&self.default_profile.api_key_env)
    }

    /// Returns the connect timeout for a single submission.
    pub fn connect_timeout(&self) -> Duration {
        self.custom_profile
            .and_then(|profile| profile.connect_timeout)
            .unwrap_or(self.default_profile.connect_timeout)
    }

    /// Returns the overall timeout for a single submission.
    pub fn request_timeout(&self) -> Duration {
        self.custom_profile
            .and_then(|profile| profile.request_timeout)
            .unwrap_or(self.default_profile.request_timeout)
    }

    /// Returns the number of duplicate submissions fired per case in race mode.
    pub fn race_width(&self) -> PositiveCount {
        self.custom_profile
            .and_then(|profile| profile.race.width)
            .unwrap_or(self.default_profile.race_width)
    }

    /// Returns the global timeout of a race mode run.
    pub fn race_global_timeout(&self) -> Duration {
        self.custom_profile
            .and_then(|profile| profile.race.global_timeout)
            .unwrap_or(self.default_profile.race_global_timeout)
    }

    /// Returns the number of cases per batch in load mode.
    pub fn batch_size(&self) -> PositiveCount {
        self.custom_profile
            .and_then(|profile| profile.load.batch_size)
            .unwrap_or(self.default_profile.batch_size)
    }

    /// Returns the global timeout of a load mode run.
    pub fn load_global_timeout(&self) -> Duration {
        self.custom_profile
            .and_then(|profile| profile.load.global_timeout)
            .unwrap_or(self.default_profile.load_global_timeout)
    }

    /// Returns true if a JUnit report should be written alongside the tabular report.
    pub fn junit_enabled(&self) -> bool {
        self.custom_profile
            .and_then(|profile| profile.junit.enabled)
            .unwrap_or(self.default_profile.junit_enabled)
    }
}

#[derive(Clone, Debug)]
struct ProbeConfigImpl {
    report: ReportConfigImpl,
    default_profile: DefaultProfileImpl,
    other_profiles: HashMap<String, CustomProfileImpl>,
}

impl ProbeConfigImpl {
    fn get_profile(&self, profile: &str) -> Result<Option<&CustomProfileImpl>, ProfileNotFound> {
        let custom_profile = match profile {
            ProbeConfig::DEFAULT_PROFILE => None,
            other => Some(
                self.other_profiles
                    .get(other)
                    .ok_or_else(|| ProfileNotFound::new(profile, self.all_profiles()))?,
            ),
        };
        Ok(custom_profile)
    }

    fn all_profiles(&self) -> impl Iterator<Item = &str> {
        self.other_profiles
            .keys()
            .map(|key| key.as_str())
            .chain(std::iter::once(ProbeConfig::DEFAULT_PROFILE))
    }
}

// This is the form of `ProbeConfig` that gets deserialized.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ProbeConfigDeserialize {
    report: ReportConfigImpl,
    #[serde(rename = "profile")]
    profiles: HashMap<String, CustomProfileImpl>,
}

impl ProbeConfigDeserialize {
    fn into_config_impl(mut self) -> ProbeConfigImpl {
        let p = self
            .profiles
            .remove(ProbeConfig::DEFAULT_PROFILE)
            .unwrap_or_default();
        ProbeConfigImpl {
            report: self.report,
            default_profile: DefaultProfileImpl::new(p),
            other_profiles: self.profiles,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ReportConfigImpl {
    dir: Utf8PathBuf,
}

#[derive(Clone, Debug)]
struct DefaultProfileImpl {
    base_url: Option<String>,
    send_path: String,
    api_key_env: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    race_width: PositiveCount,
    race_global_timeout: Duration,
    batch_size: PositiveCount,
    load_global_timeout: Duration,
    junit_enabled: bool,
}

impl DefaultProfileImpl {
    // The embedded default config sets every key, so the `expect`s here can only fire if
    // default-config.toml itself is broken.
    fn new(p: CustomProfileImpl) -> Self {
        Self {
            base_url: p.base_url,
            send_path: p.send_path.expect("send-path present in default profile"),
            api_key_env: p
                .api_key_env
                .expect("api-key-env present in default profile"),
            connect_timeout: p
                .connect_timeout
                .expect("connect-timeout present in default profile"),
            request_timeout: p
                .request_timeout
                .expect("request-timeout present in default profile"),
            race_width: p.race.width.expect("race.width present in default profile"),
            race_global_timeout: p
                .race
                .global_timeout
                .expect("race.global-timeout present in default profile"),
            batch_size: p
                .load
                .batch_size
                .expect("load.batch-size present in default profile"),
            load_global_timeout: p
                .load
                .global_timeout
                .expect("load.global-timeout present in default profile"),
            junit_enabled: p
                .junit
                .enabled
                .expect("junit.enabled present in default profile"),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomProfileImpl {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    send_path: Option<String>,
    #[serde(default)]
    api_key_env: Option<String>,
    #[serde(default, with = "humantime_serde::option")]
    connect_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    request_timeout: Option<Duration>,
    #[serde(default)]
    race: RaceConfigImpl,
    #[serde(default)]
    load: LoadConfigImpl,
    #[serde(default)]
    junit: JunitImpl,
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::tempdir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn write_config(root: &Utf8Path, contents: &str) {
        let config_dir = root.join(".config");
        std::fs::create_dir_all(&config_dir).expect("created .config");
        std::fs::write(config_dir.join("dedup-probe.toml"), contents).expect("wrote config");
    }

    #[test]
    fn default_config_is_valid() {
        let config = ProbeConfig::default_config("/probe");
        let profile = config
            .profile(ProbeConfig::DEFAULT_PROFILE)
            .expect("default profile exists");

        assert_eq!(profile.name(), "default");
        assert_eq!(profile.base_url(), None);
        assert_eq!(profile.send_path(), "/mobile/whatsapp/send");
        assert_eq!(profile.api_key_env(), "X_API_KEY");
        assert_eq!(profile.connect_timeout(), Duration::from_secs(10));
        assert_eq!(profile.request_timeout(), Duration::from_secs(30));
        assert_eq!(profile.race_width().get(), 3);
        assert_eq!(profile.race_global_timeout(), Duration::from_secs(120));
        assert_eq!(profile.batch_size().get(), 40);
        assert_eq!(profile.load_global_timeout(), Duration::from_secs(80));
        assert!(!profile.junit_enabled());
        assert_eq!(
            profile.report_dir(),
            Utf8Path::new("/probe/resultados-exportados")
        );
    }

    #[test]
    fn custom_profile_falls_back_to_default() {
        let dir = tempdir().expect("created temp dir");
        write_config(
            dir.path(),
            indoc! {r#"
                [report]
                dir = "out"

                [profile.default]
                base-url = "http://localhost:9000"
                load = { batch-size = 10 }

                [profile.ci]
                base-url = "https://api.example.com"
                race = { width = 5 }
                junit = { enabled = true }
            "#},
        );

        let config = ProbeConfig::from_sources(dir.path(), None).expect("config is valid");

        let default = config.profile("default").expect("default profile exists");
        assert_eq!(default.base_url(), Some("http://localhost:9000"));
        assert_eq!(default.batch_size().get(), 10);
        assert_eq!(default.race_width().get(), 3);
        assert_eq!(default.report_dir(), &dir.path().join("out"));

        let ci = config.profile("ci").expect("ci profile exists");
        assert_eq!(ci.base_url(), Some("https://api.example.com"));
        assert_eq!(ci.race_width().get(), 5);
        assert_eq!(ci.batch_size().get(), 10, "falls back to the default profile");
        assert_eq!(ci.load_global_timeout(), Duration::from_secs(80));
        assert!(ci.junit_enabled());
    }

    #[test]
    fn unknown_profile() {
        let dir = tempdir().expect("created temp dir");
        write_config(
            dir.path(),
            indoc! {r#"
                [profile.ci]
                race = { width = 2 }
            "#},
        );

        let config = ProbeConfig::from_sources(dir.path(), None).expect("config is valid");
        let error = config.profile("nightly").expect_err("nightly is unknown");
        assert_eq!(error.profile(), "nightly");
        assert_eq!(
            error.to_string(),
            "profile `nightly` not found (known profiles: ci, default)"
        );
    }

    #[test]
    fn unknown_keys_are_reported() {
        let dir = tempdir().expect("created temp dir");
        write_config(
            dir.path(),
            indoc! {r#"
                [profile.default]
                retries = 3

                [profile.ci.race]
                widht = 4
            "#},
        );

        let mut reported = Vec::new();
        ProbeConfig::from_sources_impl(dir.path(), None, |_, unknown| {
            reported.extend(unknown.iter().cloned());
        })
        .expect("unknown keys are not fatal");

        assert_eq!(
            reported,
            vec![
                "profile.ci.race.widht".to_owned(),
                "profile.default.retries".to_owned(),
            ]
        );
    }

    #[test_case(
        indoc! {r#"
            [profile.default]
            race = { width = 0 }
        "#},
        "profile.default.race.width"
        ; "zero race width"
    )]
    #[test_case(
        indoc! {r#"
            [profile.ci]
            load = { batch-size = 0 }
        "#},
        "profile.ci.load.batch-size"
        ; "zero batch size"
    )]
    #[test_case(
        indoc! {r#"
            [profile.default]
            request-timeout = "soon"
        "#},
        "profile.default.request-timeout"
        ; "invalid duration"
    )]
    fn invalid_config(contents: &str, expected_path: &str) {
        let dir = tempdir().expect("created temp dir");
        write_config(dir.path(), contents);

        let error = ProbeConfig::from_sources(dir.path(), None).expect_err("config is invalid");
        match error.kind() {
            ConfigParseErrorKind::DeserializeError(error) => {
                assert_eq!(error.path().to_string(), expected_path);
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
    }

    #[test]
    fn explicit_config_file_is_required() {
        let dir = tempdir().expect("created temp dir");
        let missing = dir.path().join("missing.toml");

        let error = ProbeConfig::from_sources(dir.path(), Some(&missing))
            .expect_err("missing explicit config file is an error");
        assert_eq!(error.config_file(), &missing);
        assert!(
            matches!(error.kind(), ConfigParseErrorKind::BuildError(_)),
            "missing file fails at build time"
        );
    }
}
