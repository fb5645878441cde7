use anyhow::{Context, Result};
use clap::Parser;
use class_token_replacer::classfile::decode;
use class_token_replacer::cli::{Cli, Commands, OutputFormat};
use class_token_replacer::config::resolve_run_config;
use class_token_replacer::process::{RunReport, run};
use class_token_replacer::visit::{SiteRecord, list_sites};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Replace(args) => {
            let config = resolve_run_config(&args)?;
            let report = run(&config)?;
            if !args.quiet {
                log_report(&report);
            }
            write_report(&report, args.format)?;
        }
        Commands::Sites { class_file, format } => {
            let sites = read_sites(&class_file)?;
            write_sites(&sites, format)?;
        }
    }

    Ok(())
}

fn log_report(report: &RunReport) {
    for file in report.skipped_files() {
        eprintln!(
            "[class-token-replacer] skipped {}: {}",
            file.source,
            file.reason.as_deref().unwrap_or("unknown error")
        );
    }
    let verb = if report.dry_run { "would rewrite" } else { "rewrote" };
    eprintln!(
        "[class-token-replacer] {verb} {} of {} classes ({} unchanged, {} skipped) in {} ms",
        report.rewritten, report.scanned, report.unchanged, report.skipped, report.duration_ms
    );
}

fn write_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            let mut out = String::new();
            out.push_str(&format!("mode: {}\n", report.mode));
            if let Some(root) = &report.output_root {
                out.push_str(&format!("output_root: {root}\n"));
            }
            out.push_str(&format!("scanned: {}\n", report.scanned));
            out.push_str(&format!("rewritten: {}\n", report.rewritten));
            out.push_str(&format!("unchanged: {}\n", report.unchanged));
            out.push_str(&format!("skipped: {}\n", report.skipped));
            out.push_str(&format!("duration_ms: {}\n", report.duration_ms));
            for file in &report.files {
                match (&file.destination, &file.reason) {
                    (Some(dest), _) => out.push_str(&format!(
                        "- rewritten {} -> {} ({} of {} sites)\n",
                        file.source, dest, file.rewritten_sites, file.sites
                    )),
                    (None, reason) => out.push_str(&format!(
                        "- skipped {}: {}\n",
                        file.source,
                        reason.as_deref().unwrap_or("unknown error")
                    )),
                }
            }
            print!("{out}");
        }
    }
    Ok(())
}

fn read_sites(path: &Path) -> Result<Vec<SiteRecord>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read class file: {}", path.display()))?;
    let mut tree =
        decode(&bytes).with_context(|| format!("Failed to decode {}", path.display()))?;
    Ok(list_sites(&mut tree))
}

fn write_sites(sites: &[SiteRecord], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(sites)?),
        OutputFormat::Text => {
            for site in sites {
                println!("{}\t{:?}", site.location, site.value);
            }
        }
    }
    Ok(())
}
