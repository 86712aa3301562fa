use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use lopper_core::ir::Module;
use lopper_core::pipeline::PassConfig;
use lopper_core::transforms::default_pipeline;

#[derive(Parser)]
#[command(name = "lopper", version, about = "CFG simplification for serialized IR modules")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a module in readable form.
    PrintIr {
        /// Module file (JSON).
        file: PathBuf,
    },
    /// Simplify a module's control flow and write it back out.
    Simplify {
        /// Module file (JSON).
        file: PathBuf,
        /// Where to write the result; defaults to rewriting in place.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Passes to skip, by name (repeatable).
        #[arg(long = "skip-pass", value_name = "NAME")]
        skip_pass: Vec<String>,
        /// Rerun the pipeline until nothing changes.
        #[arg(long)]
        fixpoint: bool,
        /// Allow switches to become lookup tables.
        #[arg(long)]
        lookup_tables: bool,
        /// Forward switch scrutinees into case-destination phis.
        #[arg(long)]
        forward_switch_cond: bool,
        /// Instructions a branch fold may duplicate into a predecessor.
        #[arg(long, default_value_t = 1)]
        bonus_inst_threshold: u32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::PrintIr { file } => {
            let module = Module::load(&file)
                .with_context(|| format!("loading {}", file.display()))?;
            print!("{module}");
        }
        Command::Simplify {
            file,
            output,
            skip_pass,
            fixpoint,
            lookup_tables,
            forward_switch_cond,
            bonus_inst_threshold,
        } => {
            let module = Module::load(&file)
                .with_context(|| format!("loading {}", file.display()))?;
            let mut config = PassConfig::from_skip_list(&skip_pass);
            config.fixpoint = fixpoint;
            config.simplify.convert_switch_to_lookup_table = lookup_tables;
            config.simplify.forward_switch_cond = forward_switch_cond;
            config.simplify.bonus_inst_threshold = bonus_inst_threshold;

            let result = default_pipeline(&config).run(module)?;
            let out = output.unwrap_or(file);
            result
                .module
                .save(&out)
                .with_context(|| format!("writing {}", out.display()))?;
            if !result.changed {
                eprintln!("nothing to simplify");
            }
        }
    }
    Ok(())
}
