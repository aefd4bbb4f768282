use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use clap::Subcommand;
use miette::IntoDiagnostic;
use miette::WrapErr;
use notation::Computer;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Parse and evaluate notation files")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the file with comments blanked out
    Strip { filename: PathBuf },
    /// Print the parsed tree
    Parse {
        filename: PathBuf,
        /// Operator to recognize; replaces the default set when given
        #[arg(long = "operator", value_name = "OP")]
        operators: Vec<String>,
    },
    /// Evaluate the expression at a dotted member path
    Eval { filename: PathBuf, path: String },
}

fn read(filename: &Path) -> miette::Result<String> {
    fs::read_to_string(filename)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading `{}` failed", filename.display()))
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Strip { filename } => {
            let file_contents = read(&filename)?;
            print!("{}", notation::strip_comments(&file_contents));
        }
        Commands::Parse {
            filename,
            operators,
        } => {
            let file_contents = read(&filename)?;
            let parser = if operators.is_empty() {
                notation::Parser::new(filename.to_str(), &file_contents)
            } else {
                notation::Parser::with_operators(filename.to_str(), &file_contents, operators)
            };
            match parser.parse() {
                Ok(tree) => print!("{tree}"),
                Err(e) => {
                    eprintln!("{:?}", miette::Report::new(e));
                    std::process::exit(65);
                }
            }
        }
        Commands::Eval { filename, path } => {
            let file_contents = read(&filename)?;
            let tree = match notation::Parser::new(filename.to_str(), &file_contents).parse() {
                Ok(tree) => tree,
                Err(e) => {
                    eprintln!("{:?}", miette::Report::new(e));
                    std::process::exit(65);
                }
            };
            match Computer::new().compute_path(&tree, &path) {
                Ok(value) => println!("{value}"),
                Err(e) => {
                    eprintln!("{:?}", miette::Report::new(e));
                    std::process::exit(70);
                }
            }
        }
    }
    Ok(())
}
