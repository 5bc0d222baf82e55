//! `parmap run`: execute a program once per input line on the worker pool.
//!
//! Each input line becomes one item. The program's stdout is the item's
//! result and is written to our stdout, in input order unless `--unordered`
//! is given. The program's stderr goes to the worker log when output is
//! redirected. A non-zero exit status fails the item and ends the run.

use crate::cli::Output;
use crate::config::ParmapConfig;
use crate::parallel::{MapOptions, WorkerContext, try_map};
use anyhow::{Context, Result};
use clap::Args;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Placeholder replaced by the input line in command arguments.
const PLACEHOLDER: &str = "{}";

/// Lines of stderr quoted in the error of a failed command.
const STDERR_TAIL_LINES: usize = 5;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Read items from FILE instead of stdin
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Number of worker threads (overrides engine.workers)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Split the input into this many chunks before distributing it
    #[arg(long)]
    pub chunks: Option<usize>,

    /// Print results as they complete instead of in input order
    #[arg(long)]
    pub unordered: bool,

    /// Keep worker logs after a successful run
    #[arg(long)]
    pub retain_logs: bool,

    /// Do not create per-worker log files
    #[arg(long)]
    pub no_redirect: bool,

    /// Directory for worker logs
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Show a progress counter on stderr
    #[arg(long)]
    pub progress: bool,

    /// Program and arguments; `{}` is replaced by the input line, otherwise
    /// the line is appended as the last argument
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    fn options(&self, config: &ParmapConfig) -> Result<MapOptions> {
        let mut options = MapOptions::from_config(&config.engine()?);
        if let Some(workers) = self.workers {
            options = options.workers(workers);
        }
        if self.chunks.is_some() {
            options = options.chunks(self.chunks);
        }
        if self.unordered {
            options = options.ordered(false);
        }
        if self.retain_logs {
            options = options.retain_logs(true);
        }
        if self.no_redirect {
            options = options.redirect_output(false);
        }
        if let Some(dir) = &self.log_dir {
            options = options.log_dir(dir);
        }
        Ok(options)
    }

    fn input(&self) -> Result<Box<dyn Read + Send>> {
        match &self.input {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("failed to open input {}", path.display()))?;
                Ok(Box::new(file))
            }
            None => Ok(Box::new(io::stdin())),
        }
    }
}

/// A resolved program plus its argument template.
#[derive(Debug, Clone)]
struct CommandTemplate {
    program: PathBuf,
    args: Vec<String>,
    has_placeholder: bool,
}

impl CommandTemplate {
    fn parse(command: &[String]) -> Result<Self> {
        let (program, args) = command.split_first().context("no command given")?;
        let program =
            which::which(program).with_context(|| format!("command not found: {program}"))?;
        Ok(Self {
            program,
            args: args.to_vec(),
            has_placeholder: args.iter().any(|arg| arg.contains(PLACEHOLDER)),
        })
    }

    fn render(&self, item: &str) -> Vec<String> {
        if self.has_placeholder {
            self.args
                .iter()
                .map(|arg| arg.replace(PLACEHOLDER, item))
                .collect()
        } else {
            let mut args = self.args.clone();
            args.push(item.to_string());
            args
        }
    }

    fn execute(&self, item: &str, ctx: &WorkerContext) -> Result<String> {
        let args = self.render(item);
        tracing::info!(worker = ctx.worker_id(), "running {} {}", self.program.display(), args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to execute {}", self.program.display()))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            if ctx.log_path().is_some() {
                ctx.log(line)?;
            } else {
                eprintln!("{line}");
            }
        }

        if !output.status.success() {
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            anyhow::bail!(
                "{} {} exited with {}{}",
                self.program.display(),
                args.join(" "),
                output.status,
                if tail.is_empty() { String::new() } else { format!(": {tail}") }
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Execute the run command
pub fn execute(args: RunArgs, config: &ParmapConfig, output: &Output) -> Result<()> {
    let options = args.options(config)?;
    let template = CommandTemplate::parse(&args.command)?;
    output.verbose(&format!(
        "running {} with {} workers ({})",
        template.program.display(),
        options.workers,
        if options.order { "ordered" } else { "unordered" }
    ));

    let lines = BufReader::new(args.input()?)
        .lines()
        .filter(|line| !matches!(line, Ok(text) if text.trim().is_empty()))
        .map(|line| line.map_err(anyhow::Error::from));

    let mut results = try_map(
        move |item: String, ctx: &WorkerContext| template.execute(&item, ctx),
        lines,
        &options,
    )?;

    let progress = args.progress.then(|| output.progress_bar("items"));
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut completed = 0usize;

    while let Some(result) = results.next() {
        match result {
            Ok(text) => {
                out.write_all(text.as_bytes())?;
                completed += 1;
                if let Some(progress) = &progress {
                    progress.inc(1);
                }
            }
            Err(error) => {
                if let Some(progress) = &progress {
                    progress.abandon();
                }
                out.flush()?;
                if let Some(logs) = results.logs() {
                    output.warning(&format!("worker logs kept in {}", logs.dir().display()));
                }
                return Err(anyhow::Error::from(error)
                    .context(format!("run failed after {completed} results")));
            }
        }
    }

    out.flush()?;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }
    output.verbose(&format!("{completed} items processed"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(args: &[&str]) -> CommandTemplate {
        CommandTemplate {
            program: PathBuf::from("echo"),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            has_placeholder: args.iter().any(|arg| arg.contains(PLACEHOLDER)),
        }
    }

    #[test]
    fn test_render_replaces_placeholder() {
        let rendered = template(&["--name={}", "-x", "{}"]).render("a b");
        assert_eq!(rendered, vec!["--name=a b", "-x", "a b"]);
    }

    #[test]
    fn test_render_appends_without_placeholder() {
        let rendered = template(&["-n"]).render("item");
        assert_eq!(rendered, vec!["-n", "item"]);
    }

    #[test]
    fn test_unknown_program_is_rejected() {
        let command = vec!["parmap-no-such-program-xyz".to_string()];
        assert!(CommandTemplate::parse(&command).is_err());
    }
}
