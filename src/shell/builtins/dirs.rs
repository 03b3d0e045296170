use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::errors::{self, Result};
use crate::util;

/// Prints the shell's current working directory.
pub fn pwd(stdout: &mut dyn Write) -> Result<()> {
    let cwd = env::current_dir()
        .map_err(|e| errors::builtin_command(format!("pwd: {}", util::describe_io_error(&e)), 1))?;
    writeln!(stdout, "{}", cwd.display())?;
    stdout.flush()?;
    Ok(())
}

/// Changes the working directory to the canonical form of `path` and keeps
/// `PWD` in sync with it. Nothing changes when any step fails.
pub fn cd(path: Option<&str>) -> Result<PathBuf> {
    let path = path.ok_or_else(|| errors::builtin_command("cd: HOME not set", 1))?;
    let fail = |e: std::io::Error| {
        errors::builtin_command(format!("cd: {}: {}", path, util::describe_io_error(&e)), 1)
    };

    let resolved = fs::canonicalize(path).map_err(fail)?;
    let previous = env::current_dir().ok();
    env::set_current_dir(&resolved).map_err(fail)?;

    env::set_var("PWD", &resolved);
    if let Some(previous) = previous {
        env::set_var("OLDPWD", previous);
    }
    debug!("changed directory to {}", resolved.display());
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempdir::TempDir;

    use crate::util::cwd_lock;

    #[test]
    fn test_cd_updates_cwd_and_pwd() {
        let _guard = cwd_lock();
        let original = env::current_dir().unwrap();
        let dir = TempDir::new("quash-cd").unwrap();
        let expected = fs::canonicalize(dir.path()).unwrap();

        let resolved = cd(dir.path().to_str()).unwrap();
        assert_eq!(resolved, expected);
        assert_eq!(env::current_dir().unwrap(), expected);
        assert_eq!(PathBuf::from(env::var("PWD").unwrap()), expected);

        cd(original.to_str()).unwrap();
    }

    #[test]
    fn test_cd_invalid_path_changes_nothing() {
        let _guard = cwd_lock();
        let before = env::current_dir().unwrap();
        let pwd_before = env::var_os("PWD");

        let e = cd(Some("/quash/does/not/exist")).unwrap_err();
        assert_eq!(
            e.to_string(),
            "cd: /quash/does/not/exist: No such file or directory"
        );
        assert_eq!(env::current_dir().unwrap(), before);
        assert_eq!(env::var_os("PWD"), pwd_before);
    }

    #[test]
    fn test_cd_without_target() {
        assert!(cd(None).is_err());
    }

    #[test]
    fn test_pwd() {
        let _guard = cwd_lock();
        let mut out = Vec::new();
        pwd(&mut out).unwrap();
        let expected = format!("{}\n", env::current_dir().unwrap().display());
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }
}
