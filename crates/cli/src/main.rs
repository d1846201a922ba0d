use clap::{Parser, Subcommand};
use hemogram_core::taxonomy::{self, CellClass};
use hemogram_core::{
    compute_differential, constants::DEFAULT_LAB_DATA_DIR, environment_from_env_value,
    requires_review, CompleteBloodCount, CoreConfig, InstrumentType, NewSample, RawCount,
    SampleFilter, SampleService, WbcConcentration,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "hemogram")]
#[command(about = "Manual WBC differential CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the cell categories in canonical order
    Taxonomy,
    /// Compute a differential from raw counts and print the JSON report
    Diff {
        /// Analyser WBC concentration
        #[arg(long)]
        wbc: f64,
        /// Raw counts as <category>=<count>; category by name or index
        #[arg(value_parser = parse_count, required = true)]
        counts: Vec<RawCount>,
    },
    /// Check whether a set of findings requires pathologist review
    Review {
        /// Finding names
        findings: Vec<String>,
    },
    /// List samples
    Samples {
        /// Only samples that are not finalized
        #[arg(long)]
        pending: bool,
    },
    /// Register a sample
    Register {
        /// Order accession reference
        accession: String,
        /// Analyser WBC concentration
        #[arg(long)]
        wbc: f64,
        /// Number of captured cell images
        #[arg(long)]
        cells: usize,
        /// Registering user
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// Reclassify a captured cell
    Classify {
        /// Sample id
        sample_id: String,
        /// Captured cell id
        cell: usize,
        /// Category name
        category: String,
    },
    /// Finalize a sample's differential
    Finalize {
        /// Sample id
        sample_id: String,
        /// Finalizing user
        #[arg(long)]
        user: String,
    },
    /// Complete a pending pathologist review
    CompleteReview {
        /// Sample id
        sample_id: String,
        /// Pathologist's comment
        review: String,
        /// Reviewing user
        #[arg(long, default_value = "cli")]
        user: String,
    },
}

/// Parses `<category>=<count>` where category is a taxonomy name or index.
fn parse_count(input: &str) -> Result<RawCount, String> {
    let (category, count) = input
        .split_once('=')
        .ok_or_else(|| format!("expected <category>=<count>, got '{input}'"))?;
    let category = category.trim();
    let index = match category.parse::<usize>() {
        Ok(index) => index,
        Err(_) => taxonomy::index_of(category)
            .ok_or_else(|| format!("unknown category '{category}'"))?,
    };
    let count = count
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid count '{}': {e}", count.trim()))?;
    Ok(RawCount::new(index, count))
}

fn failed(context: &str, err: impl std::fmt::Display) -> Box<dyn std::error::Error> {
    format!("{context}: {err}").into()
}

fn sample_service() -> Result<SampleService, Box<dyn std::error::Error>> {
    let lab_data_dir = std::env::var("LAB_DATA_DIR").unwrap_or_else(|_| DEFAULT_LAB_DATA_DIR.into());
    let environment = environment_from_env_value(std::env::var("LAB_CONFIG").ok())?;
    let cfg = CoreConfig::new(PathBuf::from(lab_data_dir), environment)?;
    Ok(SampleService::new(Arc::new(cfg)))
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Some(Commands::Taxonomy) => {
            for class in taxonomy::ALL {
                println!(
                    "{:>2}  {:<22} always_report={:<5} excluded={}",
                    class.index(),
                    class.name(),
                    class.always_report(),
                    class.excluded_from_total()
                );
            }
        }
        Some(Commands::Diff { wbc, counts }) => match compute_differential(wbc, &counts) {
            Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
            Err(e) => return Err(failed("Error computing differential", e)),
        },
        Some(Commands::Review { findings }) => {
            if requires_review(&findings) {
                println!("Pathologist review required");
            } else {
                println!("No review required");
            }
        }
        Some(Commands::Samples { pending }) => {
            let filter = if pending {
                SampleFilter::Pending
            } else {
                SampleFilter::All
            };
            let samples = sample_service()?.list(filter);
            if samples.is_empty() {
                println!("No samples found.");
            } else {
                for sample in samples {
                    println!(
                        "ID: {}, Accession: {}, Cells: {}, Finalized: {}, Review: {}",
                        sample.id,
                        sample.accession,
                        sample.cells.len(),
                        sample.finalized,
                        sample.pathrv
                    );
                }
            }
        }
        Some(Commands::Register {
            accession,
            wbc,
            cells,
            user,
        }) => {
            let new = NewSample {
                accession,
                cbc: CompleteBloodCount::with_wbc(WbcConcentration::new(wbc)?),
                instrument: InstrumentType::Cellavision,
                cell_count: cells,
            };
            match sample_service()?.register(new, &user) {
                Ok(sample) => println!("Registered sample with ID: {}", sample.id),
                Err(e) => return Err(failed("Error registering sample", e)),
            }
        }
        Some(Commands::Classify {
            sample_id,
            cell,
            category,
        }) => match sample_service()?.classify_cell(&sample_id, cell, &category) {
            Ok(updated) => println!(
                "Cell {} is now {}",
                updated.id,
                taxonomy::category(updated.category)
                    .map(CellClass::name)
                    .unwrap_or("unknown")
            ),
            Err(e) => return Err(failed("Error classifying cell", e)),
        },
        Some(Commands::Finalize { sample_id, user }) => {
            match sample_service()?.finalize(&sample_id, &user) {
                Ok(outcome) => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&outcome.differential.report)?
                    );
                    if outcome.review.is_some() {
                        println!("Pathologist review requested for sample {}", sample_id);
                    }
                }
                Err(e) => return Err(failed("Error finalizing sample", e)),
            }
        }
        Some(Commands::CompleteReview {
            sample_id,
            review,
            user,
        }) => match sample_service()?
            .reviews()
            .complete(&sample_id, &review, &user)
        {
            Ok(_) => println!("Completed review for sample: {}", sample_id),
            Err(e) => return Err(failed("Error completing review", e)),
        },
        None => {
            println!("Use 'hemogram --help' for commands");
        }
    }

    Ok(())
}
