use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use kestrel::config::{CodegenConfig, TargetArch};
use kestrel::trampoline::StubSet;

#[derive(Parser)]
#[command(name = "kestrel")]
#[command(about = "Trampoline and stub generation", long_about = None)]
struct Cli {
    /// Codegen configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Target instruction set (overrides the config file)
    #[arg(long, value_enum)]
    arch: Option<TargetArch>,

    /// Log each generated stub to stderr
    #[arg(long)]
    trace_stubs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the generated stubs of the selected target
    List {
        /// Emit the list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate the stub set and write its code bytes to a file
    Emit {
        /// Output file for the raw code bytes
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
}

#[derive(serde::Serialize)]
struct StubRecord<'a> {
    name: &'a str,
    offset: usize,
    size: usize,
}

fn effective_config(cli: &Cli) -> Result<CodegenConfig, String> {
    let mut config = match &cli.config {
        Some(path) => CodegenConfig::load(path)?,
        None => CodegenConfig::default(),
    };
    if let Some(arch) = cli.arch {
        config.arch = arch;
    }
    if cli.trace_stubs {
        config.trace_stubs = true;
    }
    Ok(config)
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = effective_config(cli)?;
    let set = StubSet::generate(config.arch, &config);

    match &cli.command {
        Commands::List { json } => {
            let records: Vec<StubRecord> = set
                .entries()
                .iter()
                .map(|e| StubRecord {
                    name: e.id.name(),
                    offset: e.offset,
                    size: e.size,
                })
                .collect();
            if *json {
                let out = serde_json::to_string_pretty(&records)
                    .map_err(|e| format!("failed to serialize stub list: {}", e))?;
                println!("{}", out);
            } else {
                println!("{} stubs for {}:", records.len(), config.arch);
                for r in &records {
                    println!("  {:<32} offset={:#06x} size={}", r.name, r.offset, r.size);
                }
            }
        }
        Commands::Emit { output } => {
            std::fs::write(output, set.code())
                .map_err(|e| format!("failed to write {}: {}", output.display(), e))?;
            eprintln!(
                "wrote {} bytes ({} stubs) to {}",
                set.code().len(),
                set.entries().len(),
                output.display()
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
