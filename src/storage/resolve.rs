use super::types::{CloudProfile, CloudsFile};
use crate::error::{Error, Result};

pub const ENV_PREFIX: &str = "SSOKEY_";

/// Cloud entry used when neither flag, environment nor store name one.
pub const DEFAULT_CLOUD_NAME: &str = "otc";

/// The global selectors every command accepts.
#[derive(Debug, Clone, Default)]
pub struct CommonFlags {
    pub cloud: Option<String>,
    pub region: Option<String>,
    pub project: Option<String>,
}

/// Per-invocation resolved view. Built once by `resolve`, immutable
/// afterwards; never written back to the store.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub cloud_name: String,
    pub region: Option<String>,
    pub project_name: Option<String>,
    pub profile: Option<CloudProfile>,
}

impl EffectiveConfig {
    /// For operations that need an existing profile (service listings).
    /// Login never calls this; it creates the profile instead.
    pub fn require_profile(&self) -> Result<&CloudProfile> {
        self.profile
            .as_ref()
            .ok_or_else(|| Error::ProfileNotFound(self.cloud_name.clone()))
    }
}

/// Field-by-field precedence: explicit flag, then `SSOKEY_*` environment
/// variable, then the selected stored profile, then the built-in default.
/// The cloud name resolves first, since region and project depend on
/// which profile is read.
pub fn resolve<E>(flags: &CommonFlags, env: E, clouds: &CloudsFile) -> EffectiveConfig
where
    E: Fn(&str) -> Option<String>,
{
    let env = |key: &str| env(&format!("{ENV_PREFIX}{key}"));

    let cloud_name = first_non_empty([
        flags.cloud.clone(),
        env("CLOUD"),
        clouds.selected_cloud.clone(),
    ])
    .unwrap_or_else(|| DEFAULT_CLOUD_NAME.to_string());

    let profile = clouds.clouds.get(&cloud_name).cloned();

    let region = first_non_empty([
        flags.region.clone(),
        env("REGION"),
        profile.as_ref().and_then(|p| p.region_name.clone()),
    ]);

    let project_name = first_non_empty([
        flags.project.clone(),
        env("PROJECT"),
        profile.as_ref().and_then(|p| p.auth.project_name.clone()),
    ]);

    EffectiveConfig {
        cloud_name,
        region,
        project_name,
        profile,
    }
}

/// Resolves against the real process environment.
pub fn resolve_from_env(flags: &CommonFlags, clouds: &CloudsFile) -> EffectiveConfig {
    resolve(flags, |key| std::env::var(key).ok(), clouds)
}

/// Empty strings count as absent, so an `SSOKEY_REGION=""` in the
/// environment does not shadow a stored value.
fn first_non_empty<I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    candidates
        .into_iter()
        .flatten()
        .find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn store_with_profile() -> CloudsFile {
        let mut clouds = CloudsFile::default();
        let mut profile = CloudProfile {
            region_name: Some("z".into()),
            ..Default::default()
        };
        profile.auth.project_name = Some("stored-project".into());
        clouds.clouds.insert("prod".into(), profile);
        clouds.selected_cloud = Some("prod".into());
        clouds
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn flag_beats_env_beats_store_beats_default() {
        let clouds = store_with_profile();
        let env = env_of(&[("SSOKEY_REGION", "y")]);

        let flags = CommonFlags {
            cloud: Some("prod".into()),
            region: Some("x".into()),
            ..Default::default()
        };
        assert_eq!(resolve(&flags, &env, &clouds).region.as_deref(), Some("x"));

        let flags = CommonFlags {
            cloud: Some("prod".into()),
            ..Default::default()
        };
        assert_eq!(resolve(&flags, &env, &clouds).region.as_deref(), Some("y"));

        let no_env = env_of(&[]);
        assert_eq!(
            resolve(&flags, &no_env, &clouds).region.as_deref(),
            Some("z")
        );

        // Region has no built-in default; the cloud name does.
        let resolved = resolve(&CommonFlags::default(), &no_env, &CloudsFile::default());
        assert_eq!(resolved.region, None);
        assert_eq!(resolved.cloud_name, DEFAULT_CLOUD_NAME);
    }

    #[test]
    fn cloud_name_resolves_before_dependent_fields() {
        let mut clouds = store_with_profile();
        let mut other = CloudProfile {
            region_name: Some("other-region".into()),
            ..Default::default()
        };
        other.auth.project_name = Some("other-project".into());
        clouds.clouds.insert("other".into(), other);

        // Env selects the profile, and dependent fields come from it.
        let env = env_of(&[("SSOKEY_CLOUD", "other")]);
        let resolved = resolve(&CommonFlags::default(), &env, &clouds);
        assert_eq!(resolved.cloud_name, "other");
        assert_eq!(resolved.region.as_deref(), Some("other-region"));
        assert_eq!(resolved.project_name.as_deref(), Some("other-project"));

        // Without the env override the store marker picks "prod".
        let resolved = resolve(&CommonFlags::default(), &env_of(&[]), &clouds);
        assert_eq!(resolved.cloud_name, "prod");
        assert_eq!(resolved.project_name.as_deref(), Some("stored-project"));
    }

    #[test]
    fn empty_env_value_does_not_shadow_stored_value() {
        let clouds = store_with_profile();
        let env = env_of(&[("SSOKEY_REGION", "")]);
        let resolved = resolve(&CommonFlags::default(), &env, &clouds);
        assert_eq!(resolved.region.as_deref(), Some("z"));
    }

    #[test]
    fn require_profile_fails_only_when_profile_is_absent() {
        let clouds = store_with_profile();
        let resolved = resolve(&CommonFlags::default(), &env_of(&[]), &clouds);
        assert!(resolved.require_profile().is_ok());

        let flags = CommonFlags {
            cloud: Some("nonexistent".into()),
            ..Default::default()
        };
        let resolved = resolve(&flags, &env_of(&[]), &clouds);
        match resolved.require_profile() {
            Err(Error::ProfileNotFound(name)) => assert_eq!(name, "nonexistent"),
            other => panic!("expected ProfileNotFound, got {:?}", other.map(|_| ())),
        }
    }
}
