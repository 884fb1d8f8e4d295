use std::env;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use log::debug;

use kettle::{VirtualMachine, VmConfig};

#[derive(Parser)]
#[command(name = "kettle")]
#[command(about = "Run a class's static main method")]
#[command(version)]
struct Cli {
    /// Directories to search for classes, separated like PATH. Overrides KETTLE_CLASSPATH and
    /// CLASSPATH.
    #[arg(long, visible_alias = "cp", value_name = "DIR[:DIR...]")]
    classpath: Option<String>,

    /// Log every instruction at trace level (RUST_LOG=trace to see it)
    #[arg(long)]
    trace: bool,

    /// Most frames a call stack may hold
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,

    /// Longest array the program may allocate
    #[arg(long, value_name = "N")]
    max_array_length: Option<usize>,

    /// Class to run, as a/b/C or a.b.C
    #[arg(value_name = "MAIN_CLASS")]
    main_class: String,

    /// Arguments passed to main
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn config_for(cli: &Cli) -> VmConfig {
    let mut config = VmConfig::from_env();
    if let Some(classpath) = &cli.classpath {
        let dirs: Vec<PathBuf> = env::split_paths(classpath)
            .filter(|path| !path.as_os_str().is_empty())
            .collect();
        config = config.with_classpath(dirs);
    }
    if let Some(depth) = cli.max_depth {
        config = config.with_max_call_depth(depth);
    }
    if let Some(length) = cli.max_array_length {
        config = config.with_max_array_length(length);
    }
    if cli.trace {
        config = config.with_tracing(true);
    }
    config
}

fn run(cli: Cli) -> Result<()> {
    let config = config_for(&cli);
    debug!("configuration: {:?}", config);
    let class_name = cli.main_class.replace('.', "/");
    let vm = VirtualMachine::new(config);
    vm.run_main(&class_name, &cli.args)
        .with_context(|| format!("running {}", cli.main_class))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {:#}", e);
        process::exit(1);
    }
}
