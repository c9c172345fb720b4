//! Command-line driver for the rule compiler.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser as ClapParser;
use tracing_subscriber::EnvFilter;

use xfer_compiler::{AssemblyCodeGenerator, Parser};

#[derive(ClapParser)]
#[command(name = "xferc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile transfer rule markup to VM assembly", long_about = None)]
struct Cli {
    /// Input rules file (stdin by default)
    #[arg(short = 'i', long = "inputfile")]
    input_file: Option<PathBuf>,

    /// Output assembly file (stdout by default)
    #[arg(short = 'o', long = "outputfile")]
    output_file: Option<PathBuf>,

    /// Write a compilation listing to this file
    #[arg(short = 'd', long = "debug")]
    debug_file: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let source = match &cli.input_file {
        Some(path) => match fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("Error: can't open input file '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None => {
            let mut source = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut source) {
                eprintln!("Error reading stdin: {}", e);
                process::exit(1);
            }
            source
        }
    };

    let rule_file = match Parser::new(source.as_bytes()).parse() {
        Ok(rule_file) => rule_file,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if let Some(path) = &cli.debug_file {
        let listing = format!(
            "stage: {:?}\ncategories: {}\nattributes: {}\nvariables: {}\nlists: {}\nmacros: {}\nrules: {}\n",
            rule_file.stage,
            rule_file.cats.len(),
            rule_file.attrs.len(),
            rule_file.vars.len(),
            rule_file.lists.len(),
            rule_file.macros.len(),
            rule_file.rules.len(),
        );
        if let Err(e) = fs::write(path, listing) {
            eprintln!("Error: can't open debug file '{}': {}", path.display(), e);
            process::exit(1);
        }
    }

    let assembly = AssemblyCodeGenerator::new(&rule_file).generate();

    match &cli.output_file {
        Some(path) => {
            if let Err(e) = fs::write(path, assembly) {
                eprintln!("Error: can't open output file '{}': {}", path.display(), e);
                process::exit(1);
            }
        }
        None => {
            if let Err(e) = io::stdout().write_all(assembly.as_bytes()) {
                eprintln!("Error writing output: {}", e);
                process::exit(1);
            }
        }
    }
}
