use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use sprocket::{Shape, Tensor};

pub fn start_logger(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let logger = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply();
    match logger {
        Ok(_) => log::info!("Logging initialized."),
        Err(error) => eprintln!("Error initializing logging: {:?}", error),
    }
}

fn parse_dims(s: &str) -> Result<Vec<usize>, String> {
    s.split(',')
        .map(|d| {
            d.trim()
                .parse::<usize>()
                .map_err(|e| format!("invalid dimension {:?}: {}", d, e))
        })
        .collect()
}

fn parse_indices(s: &str) -> Result<Vec<isize>, String> {
    s.split(',')
        .map(|d| {
            d.trim()
                .parse::<isize>()
                .map_err(|e| format!("invalid index {:?}: {}", d, e))
        })
        .collect()
}

fn shape_arg(required: bool) -> Arg {
    Arg::new("shape")
        .short('s')
        .long("shape")
        .required(required)
        .value_parser(parse_dims)
        .help("Comma separated dimensions, e.g. 3,4")
}

fn view_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("reshape")
            .short('r')
            .long("reshape")
            .value_parser(parse_dims)
            .help("View the result with this shape before printing."),
    )
    .arg(
        Arg::new("get")
            .short('g')
            .long("get")
            .allow_hyphen_values(true)
            .value_parser(parse_indices)
            .help("Print the element at these comma separated indices."),
    )
}

/// Prints `tensor` (or its requested reshape) and the optional element lookup.
fn show(tensor: Tensor, matches: &ArgMatches) -> anyhow::Result<()> {
    let tensor = match matches.get_one::<Vec<usize>>("reshape") {
        Some(dims) => tensor
            .reshape(dims.clone())
            .with_context(|| format!("Failed to reshape {}", tensor.shape()))?,
        None => tensor,
    };
    println!("Tensor:");
    tensor.print()?;

    if let Some(indices) = matches.get_one::<Vec<isize>>("get") {
        let value = tensor
            .get(indices)
            .with_context(|| format!("Failed to read {:?}", indices))?;
        println!("Value at index {:?}: {:.2}", indices, value);
    }
    Ok(())
}

fn requested_shape(matches: &ArgMatches) -> Shape {
    matches
        .get_one::<Vec<usize>>("shape")
        .cloned()
        .unwrap_or_default()
        .into()
}

fn handle_demo() -> anyhow::Result<()> {
    let t = Tensor::arange(0.0, 1.0, [3, 4])?;
    println!("Tensor:");
    t.print()?;
    let indices: [isize; 2] = [1, 2];
    let value = t.get(&indices)?;
    println!(
        "Value at index ({}, {}): {:.2}",
        indices[0], indices[1], value
    );
    Ok(())
}

fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("demo", _)) => handle_demo(),
        Some(("arange", sub)) => {
            let start = *sub.get_one::<f32>("start").unwrap_or(&0.0);
            let step = *sub.get_one::<f32>("step").unwrap_or(&1.0);
            show(Tensor::arange(start, step, requested_shape(sub))?, sub)
        }
        Some(("zeros", sub)) => show(Tensor::zeros(requested_shape(sub))?, sub),
        Some(("ones", sub)) => show(Tensor::ones(requested_shape(sub))?, sub),
        Some(("empty", sub)) => show(Tensor::empty(requested_shape(sub))?, sub),
        _ => anyhow::bail!("Unknown command"),
    }
}

fn command() -> Command {
    Command::new("sprocket")
        .about("Strided tensor views over shared storage")
        .version("0.1.0")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("Increase log verbosity (-v info, -vv debug, -vvv trace)."),
        )
        .subcommand(Command::new("demo").about("Build a 3x4 arange, print it and read (1, 2)."))
        .subcommand(view_args(
            Command::new("arange")
                .about("Fill with start + k * step in buffer order.")
                .arg(
                    Arg::new("start")
                        .long("start")
                        .default_value("0")
                        .allow_hyphen_values(true)
                        .value_parser(value_parser!(f32)),
                )
                .arg(
                    Arg::new("step")
                        .long("step")
                        .default_value("1")
                        .allow_hyphen_values(true)
                        .value_parser(value_parser!(f32)),
                )
                .arg(shape_arg(true)),
        ))
        .subcommand(view_args(
            Command::new("zeros").about("All zeros.").arg(shape_arg(true)),
        ))
        .subcommand(view_args(
            Command::new("ones").about("All ones.").arg(shape_arg(true)),
        ))
        .subcommand(view_args(
            Command::new("empty")
                .about("Uninitialized contents.")
                .arg(shape_arg(true)),
        ))
}

fn main() {
    let matches = command().get_matches();
    start_logger(matches.get_count("verbose"));

    if let Err(error) = run(&matches) {
        eprintln!("Error: {:#}", error);
        std::process::exit(1);
    }
}
