use clap::{App, AppSettings, ArgMatches};

use crate::tools;

const TEMPLATE: &str = "
{bin} {version}
{about}


USAGE:
    {usage}

SUBCOMMANDS:
{subcommands}

OPTIONS:
{unified}";

const ABOUT: &str = "
gfftools reconciles loosely structured GFF3 gene annotations into clean,
canonically ordered gene models. Submit bug reports, feature requests, or view
the source code at https://github.com/bow/gtetools.";

/// Constructs a new `clap::App` for argument parsing.
pub fn build_cli() -> App<'static, 'static> {
    App::new("gfftools")
        .version(crate_version!())
        .author(crate_authors!())
        .about(ABOUT)
        .template(TEMPLATE)
        .max_term_width(100)
        .settings(&[AppSettings::GlobalVersion,
                    AppSettings::SubcommandRequiredElseHelp,
                    AppSettings::DisableHelpSubcommand,
                    AppSettings::VersionlessSubcommands])
        .subcommand(tools::reformat::build_cli())
}

/// Runs the appropriate tool given the subcommand argument matches.
pub fn run(matches: &ArgMatches) -> crate::Result<()> {
    match matches.subcommand() {
        (tools::reformat::NAME, Some(m)) => tools::reformat::run(m),
        // We should not reach this point since we already require
        // that subcommands must be present in the app settings.
        (other, _) => Err(crate::Error::InvalidArgument(
            format!("unexpected subcommand '{}'", other))),
    }
}
