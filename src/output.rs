use std::io::{self, Write};

use serde::Serialize;

use crate::app::{CheckResult, ProgressEvent, ProgressSink, ResolveResult, RunReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(result: &RunReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_resolve(result: &ResolveResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_check(result: &CheckResult) -> io::Result<()> {
        Self::print_json(result)
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

pub struct TextOutput;

impl TextOutput {
    pub fn print_run(result: &RunReport) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        for section in &result.sections {
            writeln!(
                stdout,
                "{} ({}): {} records, {} batches, {} skipped lines -> {}",
                section.section,
                section.action,
                section.records,
                section.batches,
                section.skipped_lines,
                section.output
            )?;
            let counts = &section.resolution;
            if counts.resolved + counts.unresolved + counts.conflicts + counts.discontinued > 0 {
                writeln!(
                    stdout,
                    "  resolved {} (replaced {}), unresolved {}, conflicts {}, discontinued {}",
                    counts.resolved,
                    counts.replaced,
                    counts.unresolved,
                    counts.conflicts,
                    counts.discontinued
                )?;
            }
            if section.unmapped_pairs > 0 || section.self_pairs > 0 {
                writeln!(
                    stdout,
                    "  dropped pairs: {} unmapped, {} self",
                    section.unmapped_pairs, section.self_pairs
                )?;
            }
            if let Some(tally) = &section.conversions {
                writeln!(
                    stdout,
                    "  gene sets: {} equal, {} more, {} less",
                    tally.equal, tally.more, tally.less
                )?;
            }
        }
        Ok(())
    }

    pub fn print_resolve(result: &ResolveResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        for item in &result.items {
            write!(
                stdout,
                "{}\t{}\t{}",
                item.input,
                item.status.as_str(),
                item.stable_ids.join(",")
            )?;
            if let Some(replacement) = &item.replacement {
                write!(stdout, "\tvia {replacement}")?;
            }
            writeln!(stdout)?;
        }
        Ok(())
    }

    pub fn print_check(result: &CheckResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(
            stdout,
            "base dir {} | chunk size {} | history hops {} | lookups {}",
            result.base_dir,
            result.chunk_size,
            result.history_hops,
            result.lookups.as_deref().unwrap_or("none")
        )?;
        for section in &result.sections {
            writeln!(stdout, "{} ({}) -> {}", section.name, section.action, section.index)?;
            for file in &section.files {
                let marker = if file.exists { "ok" } else { "missing" };
                writeln!(stdout, "  [{marker}] {}", file.path)?;
            }
        }
        Ok(())
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}
