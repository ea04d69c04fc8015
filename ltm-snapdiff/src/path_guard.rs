use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Refuse to write a report over a configuration file or the snapshot
/// database that fed it.
pub fn ensure_output_not_input(output: &Path, inputs: &[&Path]) -> Result<()> {
    let output_abs = absolute(output)
        .with_context(|| format!("failed to resolve report path {}", output.display()))?;

    for input in inputs {
        let input_abs = absolute(input)
            .with_context(|| format!("failed to resolve input path {}", input.display()))?;
        if output_abs == input_abs {
            bail!(
                "refusing to overwrite input: report {} is the same file as {}",
                output.display(),
                input.display()
            );
        }
    }
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return path
            .canonicalize()
            .with_context(|| format!("canonicalize {}", path.display()));
    }
    // `..` segments stay unresolved for paths that do not exist yet.
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir().context("current_dir")?.join(path))
}

#[cfg(test)]
mod tests {
    use super::ensure_output_not_input;

    #[test]
    fn rejects_report_over_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("edge-a.conf");
        std::fs::write(&input, "ltm node /Common/n1 { }\n").unwrap();

        assert!(ensure_output_not_input(&input, &[&input]).is_err());
        let report = dir.path().join("report.html");
        assert!(ensure_output_not_input(&report, &[&input]).is_ok());
    }
}
