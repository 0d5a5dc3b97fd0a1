use std::io::{self, Write};

use serde::Serialize;

use crate::runner::{BatchReport, ProcessResult, ProgressEvent, ProgressSink};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

/// Machine-readable summaries on stdout; progress events are dropped.
pub struct JsonOutput;

impl JsonOutput {
    pub fn print_process(result: &ProcessResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_batch(report: &BatchReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress lines on stderr and a coloured summary on stdout.
pub struct TextOutput;

impl TextOutput {
    pub fn print_process(result: &ProcessResult) {
        println!(
            "{CYAN}{} ({}, {} residues){RESET}",
            result.output_basename, result.kind, result.residues
        );
        for file in &result.artifacts {
            println!("{GREEN}   wrote {}{RESET}", file.path);
        }
    }

    pub fn print_batch(report: &BatchReport) {
        println!("{CYAN}alphapickle batch: {}{RESET}", report.directory.display());
        println!("{GREEN}processed: {}{RESET}", report.succeeded);
        if report.failed > 0 {
            println!("{RED}failed: {}{RESET}", report.failed);
        }
        for rank in &report.ranks {
            let score = rank
                .score
                .map(|score| format!(" score={score:.2}"))
                .unwrap_or_default();
            match (&rank.result, &rank.error) {
                (Some(result), _) => println!(
                    "{GREEN}#{} {}{score} -> {} ({} artifacts){RESET}",
                    rank.rank,
                    rank.model_id,
                    result.output_basename,
                    result.artifacts.len()
                ),
                (None, Some(error)) => {
                    println!("{RED}#{} {}{score} failed: {error}{RESET}", rank.rank, rank.model_id)
                }
                (None, None) => {}
            }
        }
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} [{} ms]", event.message, elapsed.as_millis()),
            None => eprintln!("{}", event.message),
        }
    }
}
