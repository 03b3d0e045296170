use std::env;

use crate::errors::{self, Result};

/// Sets `name` to `value` in the shell's environment; children inherit it.
pub fn export(name: &str, value: &str) -> Result<()> {
    if name.is_empty() || name.contains('=') || name.contains('\0') {
        return Err(errors::builtin_command(
            format!("export: `{}': not a valid identifier", name),
            1,
        ));
    }
    if value.contains('\0') {
        return Err(errors::builtin_command(
            format!("export: {}: value contains a NUL byte", name),
            1,
        ));
    }

    debug!("export {}={}", name, value);
    env::set_var(name, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! generate_unique_env_key {
        () => {
            format!("KEY_LINE{}_COLUMN{}", line!(), column!())
        };
    }

    #[test]
    fn export_invalid_identifier() {
        assert!(export("", "bar").is_err());
        assert!(export("A=B", "bar").is_err());
    }

    #[test]
    fn export_assignment() {
        let key = generate_unique_env_key!();
        export(&key, "bar").unwrap();
        assert_eq!(env::var(&key).unwrap(), "bar");

        export(&key, "").unwrap();
        assert_eq!(env::var(&key).unwrap(), "");
    }
}
