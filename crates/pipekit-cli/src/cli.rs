//! Command-line parsing for the `pipekit` binary.
//!
//! Options come first; everything after the first non-option word (or after
//! `--`) is the pipeline. Commands are separated by standalone `|` words, or
//! the whole pipeline may be given as one quoted string.

use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Environment variable overriding the default connector capacity.
pub const CAPACITY_ENV: &str = "PIPEKIT_PIPE_CAPACITY";

/// What the binary was asked to do.
#[derive(Debug, PartialEq)]
pub enum Action {
    Help,
    Version,
    List { json: bool },
    Run(RunOptions),
}

/// Settings for one pipeline run.
#[derive(Debug, Default, PartialEq)]
pub struct RunOptions {
    pub timeout: Option<Duration>,
    pub capacity: Option<usize>,
    pub grace: Option<Duration>,
    pub commands: Vec<Vec<String>>,
}

/// Parse the arguments after the program name.
pub fn parse_args(args: &[String]) -> Result<Action> {
    let mut options = RunOptions::default();
    let mut list = false;
    let mut json = false;
    let mut rest = args.iter();

    let mut pipeline: Vec<String> = Vec::new();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Action::Help),
            "-V" | "--version" => return Ok(Action::Version),
            "--list" => list = true,
            "--json" => json = true,
            "--timeout" => {
                let value = rest.next().context("--timeout requires a value in seconds")?;
                options.timeout = Some(parse_seconds(value)?);
            }
            "--capacity" => {
                let value = rest.next().context("--capacity requires a value in bytes")?;
                options.capacity = Some(parse_capacity(value)?);
            }
            "--grace" => {
                let value = rest.next().context("--grace requires a value in milliseconds")?;
                let ms: u64 = value
                    .parse()
                    .with_context(|| format!("invalid --grace value: {value}"))?;
                options.grace = Some(Duration::from_millis(ms));
            }
            "--" => {
                pipeline.extend(rest.by_ref().cloned());
            }
            opt if opt.starts_with("--") && opt.len() > 2 => bail!("unknown option: {opt}"),
            _ => {
                pipeline.push(arg.clone());
                pipeline.extend(rest.by_ref().cloned());
            }
        }
    }

    if list {
        return Ok(Action::List { json });
    }
    if pipeline.is_empty() {
        bail!("no pipeline given (try 'pipekit --help')");
    }
    options.commands = split_pipeline(&pipeline);
    Ok(Action::Run(options))
}

/// Split words into commands at `|`. A single word is read as a whole
/// pipeline string.
pub fn split_pipeline(words: &[String]) -> Vec<Vec<String>> {
    if let [line] = words {
        return line
            .split('|')
            .map(|cmd| cmd.split_whitespace().map(str::to_string).collect())
            .collect();
    }
    words
        .split(|word| word == "|")
        .map(<[String]>::to_vec)
        .collect()
}

/// Connector capacity from `PIPEKIT_PIPE_CAPACITY`, if set.
pub fn capacity_from_env() -> Result<Option<usize>> {
    match std::env::var(CAPACITY_ENV) {
        Ok(value) => parse_capacity(&value)
            .with_context(|| format!("{CAPACITY_ENV}={value}"))
            .map(Some),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).context(CAPACITY_ENV),
    }
}

impl RunOptions {
    /// Connector capacity: the flag wins, and `from_env` is only consulted
    /// when the flag is absent.
    pub fn pipe_capacity(
        &self,
        from_env: impl FnOnce() -> Result<Option<usize>>,
    ) -> Result<Option<usize>> {
        match self.capacity {
            Some(capacity) => Ok(Some(capacity)),
            None => from_env(),
        }
    }
}

fn parse_capacity(value: &str) -> Result<usize> {
    let bytes: usize = value
        .parse()
        .with_context(|| format!("invalid capacity: {value}"))?;
    if bytes == 0 {
        bail!("capacity must be at least one byte");
    }
    Ok(bytes)
}

fn parse_seconds(value: &str) -> Result<Duration> {
    let secs: f64 = value
        .parse()
        .with_context(|| format!("invalid --timeout value: {value}"))?;
    Duration::try_from_secs_f64(secs).with_context(|| format!("invalid --timeout value: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn commands(action: Action) -> Vec<Vec<String>> {
        match action {
            Action::Run(options) => options.commands,
            other => panic!("expected a run, got {other:?}"),
        }
    }

    #[rstest]
    #[case("-h", Action::Help)]
    #[case("--version", Action::Version)]
    #[case("--list", Action::List { json: false })]
    #[case("--list --json", Action::List { json: true })]
    fn test_info_actions(#[case] args: &str, #[case] expected: Action) {
        assert_eq!(parse_args(&words(args)).unwrap(), expected);
    }

    #[test]
    fn test_separate_words() {
        let parsed = commands(parse_args(&words("seq 10 | grep -v 3 | sort -r")).unwrap());
        assert_eq!(
            parsed,
            vec![words("seq 10"), words("grep -v 3"), words("sort -r")]
        );
    }

    #[test]
    fn test_single_string() {
        let parsed = commands(parse_args(&["seq 5|tail -n 2".to_string()]).unwrap());
        assert_eq!(parsed, vec![words("seq 5"), words("tail -n 2")]);
    }

    #[test]
    fn test_options_before_pipeline() {
        let action = parse_args(&words("--timeout 1.5 --capacity 4096 --grace 100 cat")).unwrap();
        assert_eq!(
            action,
            Action::Run(RunOptions {
                timeout: Some(Duration::from_millis(1500)),
                capacity: Some(4096),
                grace: Some(Duration::from_millis(100)),
                commands: vec![words("cat")],
            })
        );
    }

    #[test]
    fn test_options_after_pipeline_belong_to_commands() {
        let parsed = commands(parse_args(&words("head --help")).unwrap());
        assert_eq!(parsed, vec![words("head --help")]);

        let parsed = commands(parse_args(&words("-- --odd | cat")).unwrap());
        assert_eq!(parsed, vec![words("--odd"), words("cat")]);
    }

    #[test]
    fn test_empty_segment_is_kept() {
        let parsed = commands(parse_args(&words("cat | | cat")).unwrap());
        assert_eq!(parsed, vec![words("cat"), vec![], words("cat")]);
    }

    #[test]
    fn test_capacity_flag_skips_environment() {
        let options = RunOptions { capacity: Some(64), ..Default::default() };
        let capacity = options.pipe_capacity(|| bail!("environment was read"));
        assert_eq!(capacity.unwrap(), Some(64));
    }

    #[test]
    fn test_capacity_falls_back_to_environment() {
        let options = RunOptions::default();
        assert_eq!(options.pipe_capacity(|| Ok(Some(512))).unwrap(), Some(512));
        assert!(options.pipe_capacity(|| bail!("bad value")).is_err());
    }

    #[rstest]
    #[case("")]
    #[case("--capacity 0 cat")]
    #[case("--capacity lots cat")]
    #[case("--timeout -1 cat")]
    #[case("--grace")]
    #[case("--frobnicate cat")]
    fn test_bad_arguments(#[case] args: &str) {
        assert!(parse_args(&words(args)).is_err(), "{args:?} should be rejected");
    }
}
