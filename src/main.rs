extern crate ecm_compete;

use clap::Parser;
use ecm_compete::{run_analysis, write_results};
use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct CompeteArgs {
    /// JSON analysis input: run parameters, measure records and overlap
    /// totals.
    input_file: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = CompeteArgs::parse();

    let input_file = args.input_file.as_str();
    let input_file_ext = Path::new(input_file).extension().and_then(OsStr::to_str);
    let input_file_stem = match input_file_ext {
        Some(ext) => &input_file[..(input_file.len() - ext.len() - 1)],
        None => input_file,
    };
    let output_file = format!("{input_file_stem}_results.json");

    let results = run_analysis(BufReader::new(File::open(Path::new(input_file))?))?;
    write_results(&results, BufWriter::new(File::create(Path::new(&output_file))?))?;

    println!("results written to {output_file}");

    Ok(())
}
