use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use kava::errors::Flow;
use kava::source::DirectoryClassSource;
use kava::vm::Vm;

/// A small host shell around the embeddable machine: mount exploded
/// class directories, bind properties, run an entry point.
#[derive(Parser)]
#[command(name = "kava", about = "Run a class file's main method")]
struct Args {
    /// Directories holding exploded .class files.
    #[arg(short = 'c', long = "classpath")]
    classpath: Vec<PathBuf>,

    /// System properties, as key=value pairs.
    #[arg(short = 'D', long = "define", value_parser = parse_property)]
    properties: Vec<(String, String)>,

    /// Entry class, in dotted or slash form. Defaults to the entry
    /// point a source nominates.
    entry: Option<String>,

    /// Arguments handed to main().
    args: Vec<String>,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected key=value, got {raw}")),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let vm = Vm::new();
    for root in &args.classpath {
        vm.add_source(Box::new(DirectoryClassSource::new(root)));
    }
    let properties: HashMap<String, String> = args.properties.iter().cloned().collect();
    if let Err(fault) = vm.bootstrap(properties) {
        eprintln!("bootstrap failed: {fault:?}");
        return ExitCode::FAILURE;
    }

    let Some(entry) = args.entry.clone().or_else(|| vm.entry_point()) else {
        eprintln!("no entry class given and no source nominates one");
        return ExitCode::FAILURE;
    };
    let entry = entry.replace('.', "/");

    match vm.run_main(&entry, &args.args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Flow::Thrown(throwable)) => {
            // Surface the uncaught throwable the way a console host
            // does, then acknowledge the record.
            eprint!("Exception in thread \"main\" ");
            let _ = throwable.call_virtual(&vm, "printStackTrace", "()V", Vec::new());
            vm.take_thrown();
            ExitCode::FAILURE
        }
        Err(Flow::Fault(fault)) => {
            eprintln!("fatal: {fault}");
            ExitCode::FAILURE
        }
    }
}
