use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

use super::types::{CloudProfile, CloudsFile};
use crate::error::{Error, Result};

const CLOUDS_FILE: &str = "clouds.yaml";
const BROWSER_PROFILE_DIR: &str = "browser-profile";

/// Owns the clouds.yaml file for the duration of one command invocation.
/// Every mutation goes through `upsert_profile`, which re-reads the file,
/// mutates one whole profile in memory and writes the full document back.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn from_default_location() -> anyhow::Result<Self> {
        if let Ok(path) = std::env::var("SSOKEY_CLOUDS_FILE") {
            if !path.is_empty() {
                return Ok(Self::at(path));
            }
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("ssokey");
        Ok(Self {
            path: config_dir.join(CLOUDS_FILE),
        })
    }

    /// Store backed by an explicit file path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Per-user Chrome profile directory, next to the clouds file, so
    /// repeated logins reuse saved cookies where the IdP allows it.
    pub fn browser_profile_dir(&self) -> PathBuf {
        self.path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(BROWSER_PROFILE_DIR)
    }

    /// A missing file is an empty store, never an error; first run must
    /// work without prior setup.
    pub fn load(&self) -> Result<CloudsFile> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CloudsFile::default());
            }
            Err(e) => {
                return Err(Error::StoreUnreadable {
                    path: self.path.clone(),
                    reason: e.into(),
                });
            }
        };

        serde_yaml_ng::from_str(&contents).map_err(|e| Error::StoreUnreadable {
            path: self.path.clone(),
            reason: e.into(),
        })
    }

    /// Writes the whole document through a temp file in the same
    /// directory and renames it into place, so a crash mid-write never
    /// leaves a truncated clouds.yaml behind.
    pub fn save(&self, clouds: &CloudsFile) -> Result<()> {
        self.save_inner(clouds).map_err(|e| Error::StoreUnwritable {
            path: self.path.clone(),
            reason: e,
        })
    }

    fn save_inner(&self, clouds: &CloudsFile) -> anyhow::Result<()> {
        let dir = self.path.parent().context("clouds file path has no parent")?;
        fs::create_dir_all(dir)?;

        let contents = serde_yaml_ng::to_string(clouds)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;

        // The file holds secrets; restrict before it lands at the final
        // path.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))?;
        }

        tmp.persist(&self.path)?;
        Ok(())
    }

    pub fn profile(&self, name: &str) -> Result<Option<CloudProfile>> {
        Ok(self.load()?.clouds.get(name).cloned())
    }

    /// Sole mutation path: load, create-or-fetch the named profile, let
    /// `mutate` touch only the fields it knows about, write the full
    /// document back. Unrelated profiles and unknown keys pass through
    /// untouched.
    pub fn upsert_profile<F>(&self, name: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut CloudProfile),
    {
        let mut clouds = self.load()?;
        let profile = clouds.clouds.entry(name.to_string()).or_default();
        mutate(profile);
        self.save(&clouds)
    }

    /// Records which cloud the next invocation should resolve to when
    /// neither flag nor environment names one.
    pub fn select_cloud(&self, name: &str) -> Result<()> {
        let mut clouds = self.load()?;
        clouds.selected_cloud = Some(name.to_string());
        self.save(&clouds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::SsoSection;

    fn temp_store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path().join("clouds.yaml"));
        (dir, store)
    }

    #[test]
    fn missing_file_is_an_empty_store() {
        let (_dir, store) = temp_store();
        let clouds = store.load().unwrap();
        assert!(clouds.clouds.is_empty());
        assert_eq!(clouds.selected_cloud, None);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let (dir, store) = temp_store();
        fs::write(dir.path().join("clouds.yaml"), "clouds: [not, a, map]").unwrap();
        match store.load() {
            Err(Error::StoreUnreadable { .. }) => {}
            other => panic!("expected StoreUnreadable, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn save_then_load_round_trips_profiles() {
        let (_dir, store) = temp_store();

        let mut clouds = CloudsFile::default();
        let mut profile = CloudProfile {
            region_name: Some("eu-de".into()),
            auth_type: Some("aksk".into()),
            sso: Some(SsoSection {
                protocol: Some("saml".into()),
                expiration: Some(3600),
                ..Default::default()
            }),
            ..Default::default()
        };
        profile.auth.access_key = Some("AK".into());
        profile.auth.secret_key = Some("SK".into());
        clouds.clouds.insert("prod".into(), profile);
        clouds.selected_cloud = Some("prod".into());

        store.save(&clouds).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, clouds);
    }

    #[test]
    fn unknown_fields_round_trip_unchanged() {
        let (dir, store) = temp_store();
        let original = "\
clouds:
  staging:
    auth:
      auth_url: https://iam.example.test/v3
      custom_auth_key: opaque
    region_name: eu-nl
    verify: false
operator_note: hands off
";
        fs::write(dir.path().join("clouds.yaml"), original).unwrap();

        let clouds = store.load().unwrap();
        assert_eq!(
            clouds.extra.get("operator_note"),
            Some(&serde_yaml_ng::Value::String("hands off".into()))
        );
        let staging = &clouds.clouds["staging"];
        assert!(staging.extra.contains_key("verify"));
        assert!(staging.auth.extra.contains_key("custom_auth_key"));

        store.save(&clouds).unwrap();
        assert_eq!(store.load().unwrap(), clouds);
    }

    #[test]
    fn upsert_leaves_other_profiles_untouched() {
        let (dir, store) = temp_store();
        let original = "\
clouds:
  a:
    auth:
      project_name: alpha
  b:
    auth:
      project_name: beta
      ak: BK
    region_name: eu-nl
    extra_setting: kept
";
        fs::write(dir.path().join("clouds.yaml"), original).unwrap();
        let before_b = store.profile("b").unwrap().unwrap();

        store
            .upsert_profile("a", |p| {
                p.auth.access_key = Some("AK".into());
                p.auth_type = Some("aksk".into());
            })
            .unwrap();

        let after = store.load().unwrap();
        assert_eq!(after.clouds["b"], before_b);
        assert_eq!(after.clouds["a"].auth.access_key.as_deref(), Some("AK"));
        assert_eq!(
            after.clouds["a"].auth.project_name.as_deref(),
            Some("alpha")
        );
    }

    #[test]
    fn upsert_creates_missing_profile() {
        let (_dir, store) = temp_store();
        store
            .upsert_profile("fresh", |p| {
                p.region_name = Some("eu-de".into());
            })
            .unwrap();
        let clouds = store.load().unwrap();
        assert_eq!(clouds.clouds["fresh"].region_name.as_deref(), Some("eu-de"));
    }
}
