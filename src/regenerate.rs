use std::io::Write;
use std::path::Path;
use log::{debug, info, warn};
use regex::Regex;
use thiserror::Error;
use crate::config::file::Files;
use crate::version::ReleaseVersions;

#[derive(Error, Debug)]
pub enum Error {
    #[error("read {path}: {err}")]
    ReadFile {
        err: std::io::Error,
        path: String,
    },

    #[error("write {path}: {err}")]
    WriteFile {
        err: std::io::Error,
        path: String,
    },

    #[error("{path} is not valid YAML: {err}")]
    Yaml {
        err: serde_yaml::Error,
        path: String,
    },

    #[error("invalid compose image name: {0}")]
    ImagePattern(#[from] regex::Error),
}

/// Set `key=value` in a dotenv-style file.
///
/// Existing assignments of `key` get the new value; otherwise a line is appended.
/// All other lines, including comments and line endings, are kept as they are.
pub fn set_env_value(contents: &str, key: &str, value: &str) -> String {
    let assignment = format!("{key}={value}");
    let prefix = format!("{key}=");
    let mut found = false;
    let mut out = String::with_capacity(contents.len() + assignment.len() + 1);

    for line in contents.split_inclusive('\n') {
        let body = line.trim_end_matches(['\n', '\r']);
        if body.trim_start().starts_with(&prefix) {
            found = true;
            out.push_str(&assignment);
            out.push_str(&line[body.len()..]);
        } else {
            out.push_str(line);
        }
    }

    if !found {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&assignment);
        out.push('\n');
    }
    out
}

/// Point every `image: <image>:<tag>` reference in a compose file at `tag`.
///
/// Returns the new contents and the number of references found.
pub fn set_compose_image_tag(contents: &str, image: &str, tag: &str) -> Result<(String, usize), Error> {
    let pattern = Regex::new(&format!(
        r#"(?m)^(?P<lead>[ \t]*-?[ \t]*image:[ \t]*["']?){}:[^\s"'#]+"#,
        regex::escape(image)
    ))?;
    let count = pattern.find_iter(contents).count();
    let replaced = pattern.replace_all(contents, format!("${{lead}}{image}:{tag}").as_str());
    Ok((replaced.into_owned(), count))
}

/// Which tracked files were rewritten.
#[derive(Debug, Default, PartialEq)]
pub struct Changes {
    pub paths: Vec<String>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Regenerate the environment defaults file and the compose file for `versions`.
/// Files are only written when their content changes, and never when `dry_run` is set.
pub fn regenerate(files: &Files, versions: &ReleaseVersions, dry_run: bool) -> Result<Changes, Error> {
    let mut changes = Changes::default();

    let env = read(&files.env_file)?;
    let compose = read(&files.compose_file)?;
    serde_yaml::from_str::<serde_yaml::Value>(&compose).map_err(|err| Error::Yaml {
        err,
        path: files.compose_file.clone(),
    })?;

    let new_env = set_env_value(&env, &files.env_key, &versions.image_version);
    let (new_compose, references) =
        set_compose_image_tag(&compose, &files.compose_image, &versions.image_version)?;
    if references == 0 {
        warn!("{} has no image references to {}", files.compose_file, files.compose_image);
    } else {
        debug!("{} image references to {} in {}", references, files.compose_image, files.compose_file);
    }

    let mut updates = Vec::new();
    for (path, old, new) in [
        (&files.env_file, &env, &new_env),
        (&files.compose_file, &compose, &new_compose),
    ] {
        if old == new {
            continue;
        }
        updates.push((path.as_str(), new.as_str()));
        changes.paths.push(path.clone());
    }
    if !dry_run {
        replace_files(&updates)?;
    }

    match (changes.is_empty(), dry_run) {
        (true, _) => info!("Tracked files already reference {}", versions.image_version),
        (false, true) => info!("dry-run: would update {}", changes.paths.join(", ")),
        (false, false) => info!("Updated {}", changes.paths.join(", ")),
    }
    Ok(changes)
}

fn read(path: &str) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|err| Error::ReadFile {
        err,
        path: path.to_string(),
    })
}

/// Replace the contents of every `(path, contents)` pair.
///
/// All new contents are written to temporary files next to their targets
/// before any target is replaced, so a failure while writing leaves every
/// tracked file untouched. Each replacement keeps the permissions of the file it replaces.
fn replace_files(updates: &[(&str, &str)]) -> Result<(), Error> {
    let staged = updates
        .iter()
        .map(|(path, new)| stage(path, new).map(|file| (*path, file)))
        .collect::<Result<Vec<_>, Error>>()?;

    for (path, file) in staged {
        file.persist(path).map_err(|err| Error::WriteFile {
            err: err.error,
            path: path.to_string(),
        })?;
    }
    Ok(())
}

fn stage(path: &str, new: &str) -> Result<tempfile::NamedTempFile, Error> {
    let write_err = |err| Error::WriteFile { err, path: path.to_string() };

    let dir = match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    file.write_all(new.as_bytes()).map_err(write_err)?;
    match std::fs::metadata(path) {
        Ok(metadata) => file
            .as_file()
            .set_permissions(metadata.permissions())
            .map_err(write_err)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(write_err(err)),
    }
    Ok(file)
}

#[cfg(test)]
mod tests {
    use crate::version::{derive, Derivation};
    use super::*;

    const ENV: &str = "# Defaults\nERPNEXT_VERSION=v15.1.0\r\nDB_PASSWORD=123\n";

    const COMPOSE: &str = r#"services:
  backend:
    image: frappe/erpnext-custom:15.1.0
  frontend:
    image: "frappe/erpnext-custom:15.1.0"
    command: nginx-entrypoint.sh
  db:
    image: mariadb:10.6
  other:
    image: frappe/erpnext-custom-extra:1.0
"#;

    fn fixture(compose: &str) -> (tempfile::TempDir, Files) {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join("example.env");
        let compose_file = dir.path().join("pwd.yml");
        std::fs::write(&env_file, ENV).unwrap();
        std::fs::write(&compose_file, compose).unwrap();

        let files = Files {
            env_file: env_file.to_str().unwrap().to_string(),
            env_key: "ERPNEXT_VERSION".into(),
            compose_file: compose_file.to_str().unwrap().to_string(),
            compose_image: "frappe/erpnext-custom".into(),
        };
        (dir, files)
    }

    fn v15_2_3() -> ReleaseVersions {
        match derive("v15.2.3", 15).unwrap() {
            Derivation::Supported(versions) => versions,
            Derivation::Unsupported { .. } => unreachable!(),
        }
    }

    #[test]
    fn env_value_replaced_in_place() {
        let updated = set_env_value(ENV, "ERPNEXT_VERSION", "15.2.3");
        assert_eq!(updated, "# Defaults\nERPNEXT_VERSION=15.2.3\r\nDB_PASSWORD=123\n");
    }

    #[test]
    fn env_value_appended() {
        assert_eq!(set_env_value("A=1", "B", "2"), "A=1\nB=2\n");
        assert_eq!(set_env_value("", "B", "2"), "B=2\n");
    }

    #[test]
    fn env_key_prefix_is_not_confused() {
        let updated = set_env_value("ERPNEXT_VERSION_OLD=1\n", "ERPNEXT_VERSION", "15.2.3");
        assert_eq!(updated, "ERPNEXT_VERSION_OLD=1\nERPNEXT_VERSION=15.2.3\n");
    }

    #[test]
    fn compose_references_rewritten() {
        let (updated, count) = set_compose_image_tag(COMPOSE, "frappe/erpnext-custom", "15.2.3").unwrap();
        assert_eq!(count, 2);
        assert!(updated.contains("    image: frappe/erpnext-custom:15.2.3\n"));
        assert!(updated.contains("    image: \"frappe/erpnext-custom:15.2.3\"\n"));
        assert!(updated.contains("image: mariadb:10.6"));
        assert!(updated.contains("image: frappe/erpnext-custom-extra:1.0"));
    }

    #[test]
    fn regenerate_is_idempotent() {
        let (_dir, files) = fixture(COMPOSE);
        let (env_file, compose_file) = (files.env_file.clone(), files.compose_file.clone());
        let versions = v15_2_3();

        let first = regenerate(&files, &versions, false).unwrap();
        assert_eq!(first.paths, vec![files.env_file.clone(), files.compose_file.clone()]);
        let env_after = std::fs::read_to_string(&env_file).unwrap();
        assert!(env_after.contains("ERPNEXT_VERSION=15.2.3"));
        assert!(std::fs::read_to_string(&compose_file).unwrap().contains("erpnext-custom:15.2.3"));

        let second = regenerate(&files, &versions, false).unwrap();
        assert!(second.is_empty());
        assert_eq!(std::fs::read_to_string(&env_file).unwrap(), env_after);
    }

    #[test]
    fn dry_run_reports_without_writing() {
        let (_dir, files) = fixture(COMPOSE);
        let (env_file, compose_file) = (files.env_file.clone(), files.compose_file.clone());
        let versions = v15_2_3();

        let changes = regenerate(&files, &versions, true).unwrap();
        assert_eq!(changes.paths.len(), 2);
        assert_eq!(std::fs::read_to_string(&env_file).unwrap(), ENV);
        assert_eq!(std::fs::read_to_string(&compose_file).unwrap(), COMPOSE);
    }

    #[test]
    fn blank_lines_before_image_are_kept() {
        let compose = "services:\n  backend:\n\n    image: frappe/erpnext-custom:15.1.0\n  queue:\n    \n    - image: frappe/erpnext-custom:15.1.0\n";
        let (updated, count) = set_compose_image_tag(compose, "frappe/erpnext-custom", "15.2.3").unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            updated,
            "services:\n  backend:\n\n    image: frappe/erpnext-custom:15.2.3\n  queue:\n    \n    - image: frappe/erpnext-custom:15.2.3\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn permissions_survive_regeneration() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, files) = fixture(COMPOSE);
        std::fs::set_permissions(&files.env_file, std::fs::Permissions::from_mode(0o644)).unwrap();
        std::fs::set_permissions(&files.compose_file, std::fs::Permissions::from_mode(0o640)).unwrap();

        let changes = regenerate(&files, &v15_2_3(), false).unwrap();
        assert_eq!(changes.paths.len(), 2);

        let mode = |path: &str| std::fs::metadata(path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&files.env_file), 0o644);
        assert_eq!(mode(&files.compose_file), 0o640);
    }

    #[test]
    fn failed_write_leaves_every_file_untouched() {
        let (dir, files) = fixture(COMPOSE);
        let unwritable = dir.path().join("missing").join("pwd.yml");
        let unwritable = unwritable.to_str().unwrap();

        let err = replace_files(&[(files.env_file.as_str(), "ERPNEXT_VERSION=15.2.3\n"), (unwritable, COMPOSE)])
            .unwrap_err();
        assert!(matches!(err, Error::WriteFile { ref path, .. } if path == unwritable));
        assert_eq!(std::fs::read_to_string(&files.env_file).unwrap(), ENV);
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 2, "temporary files are removed on failure");
    }

    #[test]
    fn invalid_compose_file() {
        let (_dir, files) = fixture("services: [unterminated\n");
        assert!(matches!(regenerate(&files, &v15_2_3(), false), Err(Error::Yaml { .. })));
        assert_eq!(std::fs::read_to_string(&files.env_file).unwrap(), ENV);
    }
}
