use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rescomp_cli::{
    compile_dirs, compile_xml, dump_xml, load_included, load_options, DEFAULT_ARSC_PATH,
};

#[derive(Parser)]
#[command(version, long_about = None)]
#[command(arg_required_else_help = true)]
#[command(about = "Compiles Android resources into resources.arsc and binary XML")]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compiles resource directories into a resource table and binary XML files.
    Compile {
        /// A `res` directory. Later directories may not redefine resources of earlier ones.
        #[arg(short, long = "res", required = true)]
        res_dirs: Vec<PathBuf>,
        /// A directory whose resources override the ones before it.
        #[arg(long = "overlay")]
        overlays: Vec<PathBuf>,
        #[arg(short, long, default_value = DEFAULT_ARSC_PATH)]
        out: PathBuf,
        /// Directory to write the compiled XML files into
        #[arg(long)]
        xml_out: Option<PathBuf>,
        #[arg(long)]
        options: Option<PathBuf>,
        /// Symbol file of the framework resources
        #[arg(long)]
        include: Option<PathBuf>,
        #[arg(short, long)]
        package: Option<String>,
    },
    /// Compiles a single XML file, such as AndroidManifest.xml, to binary XML.
    Xml {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
        #[arg(long)]
        options: Option<PathBuf>,
        #[arg(long)]
        include: Option<PathBuf>,
        #[arg(short, long)]
        package: Option<String>,
    },
    /// Prints a binary XML file as XML.
    Dump {
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::builder()
        .filter_level(level)
        .format_target(false)
        .format_timestamp(None)
        .init();

    match cli.command {
        Commands::Compile {
            res_dirs,
            overlays,
            out,
            xml_out,
            options,
            include,
            package,
        } => {
            let options = load_options(options.as_deref(), package.as_deref())?;
            let included = load_included(include.as_deref())?;
            compile_dirs(&res_dirs, &overlays, &out, xml_out.as_deref(), &options, included)?;
        }
        Commands::Xml {
            input,
            out,
            options,
            include,
            package,
        } => {
            let options = load_options(options.as_deref(), package.as_deref())?;
            let included = load_included(include.as_deref())?;
            compile_xml(&input, &out, &options, included)?;
        }
        Commands::Dump { input } => {
            let data = std::fs::read(&input)
                .with_context(|| format!("Reading {}", input.display()))?;
            println!("{}", dump_xml(&data)?);
        }
    }

    Ok(())
}
