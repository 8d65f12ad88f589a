//! Run the rewrite pipeline over a serialized program

use super::utils;
use crate::translator::{TranslateOptions, Translator};
use anyhow::{Context, Result};
use std::path::PathBuf;

pub struct OptimizeArgs {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub policies: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub sequential: bool,
    pub threads: Option<usize>,
    pub no_hoist: bool,
    pub no_dead_finally: bool,
    pub no_escape_heuristic: bool,
}

impl OptimizeArgs {
    /// Options from the config file with command-line overrides applied
    fn options(&self) -> Result<TranslateOptions> {
        let mut options = match &self.config {
            Some(path) => TranslateOptions::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => TranslateOptions::default(),
        };
        if self.sequential {
            options.parallel = false;
        }
        if self.threads.is_some() {
            options.threads = self.threads;
        }
        if self.no_hoist {
            options.passes.hoist_allocations = false;
        }
        if self.no_dead_finally {
            options.passes.eliminate_dead_finally = false;
        }
        if self.no_escape_heuristic {
            options.passes.unresolved_escape_heuristic = false;
        }
        Ok(options)
    }
}

/// Run the optimize subcommand
pub fn optimize(args: &OptimizeArgs) -> Result<()> {
    let options = args.options()?;
    let table = utils::read_policies(args.policies.as_deref())
        .with_context(|| "Failed to load redirection policies")?;
    let program = utils::read_program(&args.input)
        .with_context(|| format!("Failed to read program {}", args.input.display()))?;

    let count = program.len();
    eprintln!("Optimizing {} functions...", count);
    let total_start = std::time::Instant::now();
    let progress_bar = indicatif::ProgressBar::new(count as u64);
    progress_bar.set_style(
        indicatif::ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} functions")
            .unwrap()
            .progress_chars("##-"),
    );

    let translator = Translator::new(options, table);
    let report = translator.translate_with(&program, |_| progress_bar.inc(1))?;
    progress_bar.finish_with_message("Optimization completed");
    eprintln!(
        "Optimized {} functions in {:.2}ms ({} analysis computations)",
        report.succeeded(),
        total_start.elapsed().as_secs_f64() * 1000.0,
        report.analysis_computations
    );

    let failures: Vec<String> = report
        .failed()
        .map(|(function, err)| format!("{}: {}", function, err))
        .collect();
    for failure in &failures {
        eprintln!("error: {}", failure);
    }

    let file = program.into_file()?;
    let output = serde_json::to_string_pretty(&file)?;
    utils::write_output(&output, args.output.as_ref())?;

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report.to_json())?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
    }

    if !failures.is_empty() {
        anyhow::bail!("{} of {} functions failed to translate", failures.len(), count);
    }
    Ok(())
}
