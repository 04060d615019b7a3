mod args;

use osmpoly::{ConvertOptions, Format};

use clap::Parser;
use colored::*;
use log::{info, warn};
use pbr::{ProgressBar, Units};

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Stderr};

type Error = Box<dyn std::error::Error>;

const INPUT_BUFFER_SIZE: usize = 1 << 20;

/// Advances a progress bar by the number of bytes read
struct Progress<R> {
    inner: R,
    pb: ProgressBar<Stderr>,
}

impl<R: Read> Read for Progress<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pb.add(n as u64);
        Ok(n)
    }
}

fn run(args: args::Args) -> Result<(), Error> {
    let input_file = File::open(&args.input)?;
    let hint = args.format.or_else(|| Format::from_path(&args.input));
    let options = ConvertOptions {
        threads: args.threads,
        include_tags: args.tags,
    };

    let result = if args.progress {
        let mut pb = ProgressBar::on(io::stderr(), input_file.metadata()?.len());
        pb.set_units(Units::Bytes);
        pb.message("Reading OSM data... ");
        let input = Progress {
            inner: input_file,
            pb,
        };
        osmpoly::convert(
            BufReader::with_capacity(INPUT_BUFFER_SIZE, input),
            hint,
            &options,
        )
    } else {
        osmpoly::convert(
            BufReader::with_capacity(INPUT_BUFFER_SIZE, input_file),
            hint,
            &options,
        )
    };
    let (features, stats) = result?;

    // the output is only created once the input converted successfully
    let output_file = File::create(&args.output)?;
    if let Err(e) = osmpoly::geojson::write(&features, output_file, args.pretty) {
        if let Err(remove_error) = fs::remove_file(&args.output) {
            warn!(
                "Failed to remove incomplete output {}: {}",
                args.output.display(),
                remove_error
            );
        }
        return Err(e.into());
    }
    info!(
        "Wrote {} polygons to {}",
        features.len(),
        args.output.display()
    );

    println!("{stats}");
    Ok(())
}

fn main() {
    let args = args::Args::parse();
    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_module_path(false)
        .format_timestamp_nanos()
        .init();

    if let Err(e) = run(args) {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }
}
