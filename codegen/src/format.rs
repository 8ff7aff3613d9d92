//! Post-processing of generated python: formatter and type checker.
//!
//! Both are external programs named in settings. If python or a tool is
//! missing the step is skipped with a warning; a tool that runs and fails is an error.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::{
    config::PythonSettings,
    error::{Error, Result},
};

/// minimum python version the generated code targets
pub const MIN_PYTHON: (u32, u32) = (3, 12);

/// Runs an external program over the generated package
pub trait SourceFormatter {
    /// program and leading arguments
    fn command(&self) -> &[String] {
        &[]
    }

    fn run(&self, package_dir: &Path) -> Result<()> {
        let (program, args) = match self.command().split_first() {
            Some(split) => split,
            None => return Ok(()),
        };
        let mut args = args.iter().map(|s| s.as_str()).collect::<Vec<_>>();
        let dir = package_dir.to_string_lossy();
        args.push(&dir);
        run_command(program, &args)
    }
}

/// Command line from codegen.toml, e.g. `["ruff", "format"]`
pub struct CommandFormatter {
    command: Vec<String>,
}

impl CommandFormatter {
    pub fn new(command: &[String]) -> Self {
        CommandFormatter { command: command.to_vec() }
    }
}

impl SourceFormatter for CommandFormatter {
    fn command(&self) -> &[String] {
        &self.command
    }
}

/// Parses `Python 3.12.1` into (3, 12)
pub(crate) fn parse_python_version(output: &str) -> Option<(u32, u32)> {
    let version = output.trim().strip_prefix("Python ")?;
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.trim_end_matches(|c: char| !c.is_ascii_digit()).parse().ok()?;
    Some((major, minor))
}

/// Version of `python3` on the path, or None if it can't be run
fn python_version() -> Option<(u32, u32)> {
    let output = std::process::Command::new("python3").arg("--version").output().ok()?;
    let bytes = if output.stdout.is_empty() { &output.stderr } else { &output.stdout };
    parse_python_version(&String::from_utf8_lossy(bytes))
}

/// Formats then type-checks the generated package. Does nothing without a
/// suitable python, since both tools are python tools.
pub fn post_process(settings: &PythonSettings, package_dir: &Path) -> Result<()> {
    if settings.formatter.is_empty() && settings.type_checker.is_empty() {
        return Ok(());
    }
    match python_version() {
        Some(version) if version >= MIN_PYTHON => debug!(?version, "found python"),
        Some(version) => {
            warn!(
                ?version,
                "python {}.{} or later is required to post-process generated code; skipping",
                MIN_PYTHON.0,
                MIN_PYTHON.1
            );
            return Ok(());
        }
        None => {
            warn!("python3 was not found; skipping formatting and type checking");
            return Ok(());
        }
    }
    let steps = [("formatter", &settings.formatter), ("type checker", &settings.type_checker)];
    for (step, command) in steps {
        if command.is_empty() {
            continue;
        }
        info!(step, command = %command.join(" "), "post-processing");
        match CommandFormatter::new(command).run(package_dir) {
            Err(Error::MissingFile(program)) => warn!(step, %program, "program not found; skipping"),
            other => other?,
        }
    }
    Ok(())
}

/// execute the program with args
pub(crate) fn run_command(program: &str, args: &[&str]) -> Result<()> {
    let mut child = match std::process::Command::new(program).args(args.iter()).spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::MissingFile(program.to_string()))
        }
        Err(e) => return Err(Error::Formatter(format!("failed to start {}: {}", program, e))),
    };

    let code = child
        .wait()
        .map_err(|e| Error::Formatter(format!("failed waiting for {}: {}", program, e)))?;
    if !code.success() {
        return Err(Error::Formatter(format!("{} exited with {}", program, code)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Python 3.12.1\n" => Some((3, 12)); "patch release")]
    #[test_case("Python 3.13.0rc1" => Some((3, 13)); "release candidate")]
    #[test_case("Python 3.9" => Some((3, 9)); "no patch")]
    #[test_case("python" => None; "garbage")]
    fn python_versions(output: &str) -> Option<(u32, u32)> {
        parse_python_version(output)
    }

    #[test]
    fn missing_program_is_reported() {
        let result = run_command("shapegen-no-such-program", &[]);
        assert!(matches!(result, Err(Error::MissingFile(_))));
    }

    #[test]
    fn empty_command_does_nothing() {
        assert!(CommandFormatter::new(&[]).run(Path::new(".")).is_ok());
    }
}
