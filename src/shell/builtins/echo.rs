use crate::errors::Result;
use std::io::Write;

/// Writes the arguments separated by single spaces, then a newline.
pub fn run(args: &[String], stdout: &mut dyn Write) -> Result<()> {
    writeln!(stdout, "{}", args.join(" "))?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_joins_with_single_spaces() {
        let mut out = Vec::new();
        run(&["hello".to_string(), "world".to_string()], &mut out).unwrap();
        assert_eq!(out, b"hello world\n");
    }

    #[test]
    fn test_echo_without_arguments_prints_newline() {
        let mut out = Vec::new();
        run(&[], &mut out).unwrap();
        assert_eq!(out, b"\n");
    }
}
