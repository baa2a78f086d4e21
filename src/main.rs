#[macro_use]
extern crate clap;
extern crate gffkit;
#[macro_use]
extern crate log;
extern crate pretty_env_logger;
#[macro_use]
extern crate quick_error;

use std::env;
use std::io::{self, Write};
use std::process;

use log::LevelFilter;

mod cli;
mod tools;


quick_error! {
    /// Errors reported by the command line tools.
    #[derive(Debug)]
    pub enum Error {
        /// Errors from the reconciliation library.
        Lib(err: gffkit::Error) {
            display("{}", err)
            from()
            source(err)
        }
        /// Argument values that parse but do not make sense.
        InvalidArgument(msg: String) {
            display("{}", msg)
        }
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;

/// Sets up logging to stderr; `RUST_LOG` overrides the default `info` level.
fn init_logger() {
    let mut builder = pretty_env_logger::formatted_builder();
    match env::var("RUST_LOG") {
        Ok(filters) => builder.parse_filters(&filters),
        Err(_) => builder.filter_level(LevelFilter::Info),
    };
    let _ = builder.try_init();
}

fn main() {
    init_logger();
    let matches = cli::build_cli().get_matches();
    if let Err(err) = cli::run(&matches) {
        debug!("run failed: {:?}", err);
        let _ = writeln!(io::stderr(), "error: {}", err);
        process::exit(1);
    }
    process::exit(0);
}
