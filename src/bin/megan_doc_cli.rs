use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use megan_doc::{load_document, save_document, DataTable, Result};

/// Inspect and edit classification summary documents.
#[derive(Parser, Debug)]
#[command(name = "megan-doc", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints the samples and classifications of a document.
    Info {
        input: PathBuf,
    },
    /// Merges samples into one new sample appended at the end.
    Merge {
        input: PathBuf,
        output: PathBuf,
        /// Name of the merged sample.
        #[arg(short, long)]
        name: String,
        #[arg(required = true)]
        samples: Vec<String>,
    },
    /// Writes a document holding only the given samples.
    Extract {
        input: PathBuf,
        output: PathBuf,
        #[arg(required = true)]
        samples: Vec<String>,
    },
    /// Reorders samples; samples not listed are dropped.
    Reorder {
        input: PathBuf,
        output: PathBuf,
        #[arg(required = true)]
        samples: Vec<String>,
    },
    /// Hides samples. The full data stays in the written file.
    Disable {
        input: PathBuf,
        output: PathBuf,
        #[arg(required = true)]
        samples: Vec<String>,
    },
    /// Shows previously disabled samples again.
    Enable {
        input: PathBuf,
        output: PathBuf,
        #[arg(required = true)]
        samples: Vec<String>,
    },
}

fn spinner(color: &str, message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = format!("{{spinner:.{color}}} {{msg}}");
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template(&template)
    {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner
}

/// Loads `input`, applies `edit` and writes the result to `output`.
fn edit_document(
    input: &Path,
    output: &Path,
    edit: impl FnOnce(&mut DataTable) -> Result<()>,
) -> Result<()> {
    let progress = spinner("blue", format!("Reading {}...", input.display()));
    let mut table = load_document(input)?;
    progress.finish_with_message(format!(
        "Read {} samples from {}.",
        table.number_of_samples(),
        input.display()
    ));

    edit(&mut table)?;

    let progress = spinner("yellow", format!("Writing {}...", output.display()));
    save_document(&table, output)?;
    progress.finish_with_message(format!(
        "Wrote {} samples to {}.",
        table.number_of_samples(),
        output.display()
    ));
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Info { input } => {
            let table = load_document(&input)?;
            print!("{table}");
            let disabled = table.disabled_samples();
            if !disabled.is_empty() {
                let names: Vec<&str> = disabled.iter().map(String::as_str).collect();
                println!("Disabled: {}", names.join(", "));
            }
            Ok(())
        }
        Command::Merge {
            input,
            output,
            name,
            samples,
        } => edit_document(&input, &output, |table| table.merge_samples(&samples, &name)),
        Command::Extract {
            input,
            output,
            samples,
        } => edit_document(&input, &output, |table| {
            let mut target = DataTable::new();
            table.extract_samples(&samples, &mut target)?;
            *table = target;
            Ok(())
        }),
        Command::Reorder {
            input,
            output,
            samples,
        } => edit_document(&input, &output, |table| table.reorder_samples(&samples)),
        Command::Disable {
            input,
            output,
            samples,
        } => edit_document(&input, &output, |table| {
            if !table.disable_samples(&samples)? {
                log::warn!("No sample was disabled");
            }
            Ok(())
        }),
        Command::Enable {
            input,
            output,
            samples,
        } => edit_document(&input, &output, |table| {
            if !table.enable_samples(&samples) {
                log::warn!("No sample was enabled");
            }
            Ok(())
        }),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
