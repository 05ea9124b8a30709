//! Redact command implementation.

use std::io::{BufRead, Write};
use tally_core::Redactor;

/// Copies `reader` to `writer` line by line, masking secrets and keywords.
pub fn run<R: BufRead, W: Write>(
    secrets: &[String],
    keywords: &[String],
    reader: R,
    mut writer: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let redactor = Redactor::new(secrets, keywords)?;
    for line in reader.lines() {
        writeln!(writer, "{}", redactor.redact(&line?))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_every_line() {
        let input = "login alice with hunter2\nsecond hunter2 line\n";
        let mut output = Vec::new();
        run(
            &["hunter2".to_string()],
            &["alice".to_string()],
            input.as_bytes(),
            &mut output,
        )
        .unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(!output.contains("hunter2"));
        assert!(output.contains("**ice"));
        assert_eq!(output.lines().count(), 2);
    }

    #[test]
    fn no_needles_copies_input() {
        let mut output = Vec::new();
        run(&[], &[], "unchanged\n".as_bytes(), &mut output).unwrap();
        assert_eq!(output, b"unchanged\n");
    }
}
