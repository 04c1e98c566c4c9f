use std::env;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::process::ExitCode;

use anyhow::Context;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let [input_path, output_path] = args.as_slice() else {
        eprintln!("Usage: mython <input_file> <output_file>");
        return ExitCode::from(1);
    };

    let source = match fs::read_to_string(input_path)
        .with_context(|| format!("Failed to open input file {input_path}"))
    {
        Ok(source) => source,
        Err(error) => {
            eprintln!("{error:#}");
            return ExitCode::from(2);
        }
    };
    let output_file = match File::create(output_path)
        .with_context(|| format!("Failed to open output file {output_path}"))
    {
        Ok(file) => file,
        Err(error) => {
            eprintln!("{error:#}");
            return ExitCode::from(2);
        }
    };

    let mut output = BufWriter::new(output_file);
    let run_result = mython::run(&source, &mut output);
    // Flush regardless of the run outcome so output printed before a
    // runtime error reaches the file.
    let flush_result = output.flush().context("Failed to write output file");
    if let Err(error) = run_result {
        eprintln!("{error}");
        return ExitCode::from(1);
    }
    if let Err(error) = flush_result {
        eprintln!("{error:#}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}
