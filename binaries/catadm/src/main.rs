mod cmd;

use {
    catalog::{config::DATADIR_VAR, CatalogConfig},
    clap::{arg, value_parser, ArgMatches, Command},
    def::ObjectId,
    snafu::prelude::*,
    std::{env, io, process},
    tracing_subscriber::EnvFilter,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("the `CATALOG_DATADIR` environment variable is unset, you can pass a argument with `-d` to config"))]
    NoDataDirectory,

    #[snafu(display("Invalid configuration, source: {}", source))]
    Config { source: catalog::Error },

    ExecuteCommand {
        #[snafu(backtrace)]
        source: cmd::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

const INIT_DATABASE: &str = "initdb";
const VERIFY: &str = "verify";
const SHOW: &str = "show";

fn database_args(command: Command) -> Command {
    command
        .arg(arg!(-d --data_dir <PATH> "data directory"))
        .arg(arg!(--name <NAME> "database name").default_value("main"))
        .arg(
            arg!(--id <ID> "database identifier")
                .value_parser(value_parser!(u32))
                .default_value("1"),
        )
}

fn cli() -> Command {
    let pkg_name = env!("CARGO_PKG_NAME");

    Command::new(pkg_name)
        .bin_name(pkg_name)
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand_required(true)
        .subcommand(database_args(
            Command::new(INIT_DATABASE).about("create an empty database"),
        ))
        .subcommand(database_args(
            Command::new(VERIFY)
                .about("check the catalog against the files on disk")
                .arg(arg!(--correct "repair what can be repaired")),
        ))
        .subcommand(database_args(
            Command::new(SHOW).about("print every object in the catalog"),
        ))
}

fn target(matches: &ArgMatches) -> Result<cmd::Target> {
    let mut config = CatalogConfig::from_env().context(ConfigSnafu)?;
    match matches.get_one::<String>("data_dir") {
        Some(dir) => config.data_dir = dir.into(),
        None => ensure!(env::var_os(DATADIR_VAR).is_some(), NoDataDirectorySnafu),
    }

    let name = matches
        .get_one::<String>("name")
        .cloned()
        .unwrap_or_else(|| "main".to_string());
    let id = matches.get_one::<u32>("id").copied().unwrap_or(1);

    Ok(cmd::Target {
        config,
        name,
        id: ObjectId(id),
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    match try_main() {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            eprintln!("{}", err);
            process::exit(2);
        }
    }
}

/// Returns false when `verify` found problems it left in place.
fn try_main() -> Result<bool> {
    let matches = cli().get_matches();
    let mut out = io::stdout().lock();

    match matches.subcommand() {
        Some((INIT_DATABASE, sub_matches)) => {
            cmd::init(&target(sub_matches)?).context(ExecuteCommandSnafu)?;
            Ok(true)
        }
        Some((VERIFY, sub_matches)) => {
            let correct = sub_matches.get_flag("correct");
            cmd::verify(&target(sub_matches)?, correct, &mut out).context(ExecuteCommandSnafu)
        }
        Some((SHOW, sub_matches)) => {
            cmd::show(&target(sub_matches)?, &mut out).context(ExecuteCommandSnafu)?;
            Ok(true)
        }
        _ => unreachable!(),
    }
}
