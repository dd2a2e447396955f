use std::{env, fs, path::Path, process::ExitCode, thread, time::Instant};

use evochora::{
    compile_file, CompileOptions, QueueSink, Simulation, SimulationConfig, StderrDiagnostics, Vector,
};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: evochora <program.s> [ticks] [--config <path>] [--origin a|b|c] [--snapshots]";

struct Args {
    program: String,
    ticks: u64,
    config_path: Option<String>,
    origin: Option<String>,
    stream_snapshots: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    let config = match load_config(args.config_path.as_deref()) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };

    let start = Instant::now();
    let options = CompileOptions::new(config.dimensions());
    let mut diagnostics = StderrDiagnostics;
    let output = match compile_file(Path::new(&args.program), &options, &mut diagnostics) {
        Ok(output) => output,
        Err(failure) => {
            eprintln!("{failure}");
            return ExitCode::FAILURE;
        }
    };
    eprintln!(
        "compiled {} ({} cells) in {:?}",
        args.program,
        output.artifact.cells.len(),
        start.elapsed()
    );

    let origin = match parse_origin(args.origin.as_deref(), config.dimensions()) {
        Ok(origin) => origin,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };

    let mut sim = Simulation::new(config.clone());
    if let Err(err) = sim.place_program(&output.artifact, &origin) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }

    // Snapshots flow through a bounded queue to a consumer thread; the
    // scheduler never writes to stdout itself.
    let (mut sink, receiver) = QueueSink::bounded(64, config.scheduler.backpressure);
    let stream = args.stream_snapshots;
    let consumer = thread::spawn(move || {
        let mut last = None;
        for message in receiver {
            if stream {
                match serde_json::to_string(&message) {
                    Ok(line) => println!("{line}"),
                    Err(err) => eprintln!("error: cannot serialize snapshot: {err}"),
                }
            }
            last = Some(message);
        }
        last
    });

    let start = Instant::now();
    sim.run(args.ticks, &mut sink);
    let elapsed = start.elapsed();
    let ticks_run = sim.tick_number();
    let alive = sim.organisms().len();
    drop(sink);

    let last = consumer.join().expect("snapshot consumer panicked");
    if !stream {
        if let Some(message) = last {
            match serde_json::to_string_pretty(&message) {
                Ok(text) => println!("{text}"),
                Err(err) => eprintln!("error: cannot serialize snapshot: {err}"),
            }
        }
    }
    eprintln!("ran {ticks_run} tick(s) in {elapsed:?}, {alive} organism(s) alive");
    ExitCode::SUCCESS
}

fn parse_args() -> Result<Args, String> {
    let mut args = env::args().skip(1);
    let mut parsed = Args {
        program: String::new(),
        ticks: 100,
        config_path: None,
        origin: None,
        stream_snapshots: false,
    };
    let mut positional = 0usize;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                parsed.config_path = Some(args.next().ok_or("--config expects a path")?);
            }
            "--origin" => {
                parsed.origin = Some(args.next().ok_or("--origin expects a vector like 4|4")?);
            }
            "--snapshots" => parsed.stream_snapshots = true,
            "--help" | "-h" => return Err(String::new()),
            _ => {
                match positional {
                    0 => parsed.program = arg,
                    1 => {
                        parsed.ticks = arg.parse().map_err(|_| format!("invalid tick count `{arg}`"))?;
                    }
                    _ => return Err(format!("unexpected argument `{arg}`")),
                }
                positional += 1;
            }
        }
    }
    if parsed.program.is_empty() {
        return Err("missing program file".to_owned());
    }
    Ok(parsed)
}

fn load_config(path: Option<&str>) -> Result<SimulationConfig, String> {
    match path {
        None => Ok(SimulationConfig::default()),
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|err| format!("cannot read {path}: {err}"))?;
            SimulationConfig::from_toml_str(&text).map_err(|err| err.to_string())
        }
    }
}

fn parse_origin(origin: Option<&str>, dims: usize) -> Result<Vector, String> {
    let Some(text) = origin else {
        return Ok(Vector::zero(dims));
    };
    let components: Result<Vec<i64>, _> = text.split('|').map(str::parse).collect();
    let components = components.map_err(|_| format!("invalid origin `{text}`"))?;
    if components.len() != dims {
        return Err(format!(
            "origin has {} component(s), world dimensionality is {dims}",
            components.len()
        ));
    }
    Ok(Vector::new(components))
}
