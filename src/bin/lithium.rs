//! The `lithium` executable.

#![deny(missing_docs)]

use clap::{App, AppSettings, Arg, ArgGroup};
use lithium::error::{Error, Result};
use lithium::interesting;
use lithium::reducer::Lithium;
use lithium::strategies;
use lithium::test_case::{SplitMode, Testcase, DEFAULT_CUT_AFTER, DEFAULT_CUT_BEFORE};
use lithium::traits::Strategy;
use lithium::util::summary_header;
use log::error;
use std::env;
use std::ffi::OsString;
use std::io::Write;
use std::process;

fn main() {
    let (strategy_name, verbose) = pre_scan(env::args().skip(1));
    init_logger(verbose);

    let code = match try_main(&strategy_name) {
        Ok(code) => code,
        Err(Error::Load(ref message)) => {
            summary_header();
            error!("{}", message);
            1
        }
        Err(Error::Config(ref message)) => {
            error!("{}", message);
            2
        }
        Err(ref e) => {
            error!("{}", e);
            1
        }
    };
    process::exit(code);
}

// The strategy decides which extra options exist, so its name (and the
// verbosity, which affects logging from here on) must be known before the
// real argument parser can be built.
fn pre_scan<I: Iterator<Item = String>>(args: I) -> (String, bool) {
    let mut strategy = strategies::DEFAULT.to_string();
    let mut verbose = false;
    let mut args = args.peekable();
    while let Some(arg) = args.next() {
        if arg == "-v" || arg == "--verbose" {
            verbose = true;
        } else if arg == "--strategy" {
            if let Some(name) = args.peek() {
                strategy = name.clone();
            }
        } else if let Some(name) = arg.strip_prefix("--strategy=") {
            strategy = name.to_string();
        }
    }
    (strategy, verbose)
}

fn init_logger(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .filter_level(level)
        .init();
}

fn build_app<'a, 'b>(strategy: &dyn Strategy) -> App<'a, 'b> {
    let app = App::new("lithium")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Lithium, an automated testcase reduction tool")
        .usage("lithium [options] condition [condition-args...] file-to-reduce")
        .setting(AppSettings::TrailingVarArg)
        .setting(AppSettings::AllowLeadingHyphen)
        .arg(
            Arg::with_name("testcase")
                .long("testcase")
                .takes_value(true)
                .value_name("PATH")
                .help("testcase file. default: last argument is used."),
        )
        .arg(
            Arg::with_name("tempdir")
                .long("tempdir")
                .takes_value(true)
                .value_name("PATH")
                .help("specify the directory to use as temporary directory."),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("enable verbose debug logging"),
        )
        .arg(
            Arg::with_name("lines")
                .short("l")
                .long("lines")
                .help("Treat the file as a sequence of lines. This is the default."),
        )
        .arg(Arg::with_name("char").short("c").long("char").help(
            "Don't treat lines as atomic units; treat the file as a sequence \
             of bytes rather than a sequence of lines.",
        ))
        .arg(Arg::with_name("js").short("j").long("js").help(
            "Same as --char but only operate within JS strings, keeping \
             escapes intact.",
        ))
        .arg(Arg::with_name("symbol").short("s").long("symbol").help(
            "Treat the file as a sequence of strings separated by tokens. \
             The characters by which the strings are delimited are defined \
             by the --cut-before, and --cut-after options.",
        ))
        .group(ArgGroup::with_name("atom").args(&["lines", "char", "js", "symbol"]))
        .arg(
            Arg::with_name("cut-before")
                .long("cut-before")
                .takes_value(true)
                .value_name("BYTES")
                .help("See --symbol. default: ]}:"),
        )
        .arg(
            Arg::with_name("cut-after")
                .long("cut-after")
                .takes_value(true)
                .value_name("BYTES")
                .help("See --symbol. default: ?=;{["),
        )
        .arg(
            Arg::with_name("strategy")
                .long("strategy")
                .takes_value(true)
                .possible_values(strategies::NAMES)
                .help("reduction strategy to use. default: minimize"),
        )
        .arg(
            Arg::with_name("extra_args")
                .value_name("CONDITION")
                .multiple(true)
                .required(true)
                .help("condition [condition options] file-to-reduce"),
        );
    strategy.add_args(app)
}

fn try_main(strategy_name: &str) -> Result<i32> {
    let mut strategy = strategies::by_name(strategy_name)?;

    let matches = match build_app(strategy.as_ref()).get_matches_from_safe(env::args()) {
        Ok(matches) => matches,
        Err(e) => {
            if e.kind == clap::ErrorKind::HelpDisplayed
                || e.kind == clap::ErrorKind::VersionDisplayed
            {
                println!("{}", e.message);
                process::exit(0);
            }
            return Err(Error::Config(e.message));
        }
    };

    strategy.process_args(&matches)?;

    let extra: Vec<&str> = matches
        .values_of("extra_args")
        .map(|values| values.collect())
        .unwrap_or_default();
    if extra.is_empty() {
        return Err(Error::Config("No condition script specified".into()));
    }

    // The condition script sees its own arguments followed by the path of
    // the candidate under judgement, so the trailing file-to-reduce argument
    // is not forwarded verbatim.
    let (testcase_path, condition_args): (&str, Vec<OsString>) =
        if let Some(path) = matches.value_of("testcase") {
            (path, extra[1..].iter().map(|s| OsString::from(*s)).collect())
        } else if extra.len() >= 2 {
            (
                extra[extra.len() - 1],
                extra[1..extra.len() - 1]
                    .iter()
                    .map(|s| OsString::from(*s))
                    .collect(),
            )
        } else {
            return Err(Error::Config(
                "No testcase specified (use --testcase or last condition arg)".into(),
            ));
        };

    let mode = if matches.is_present("char") {
        SplitMode::Char
    } else if matches.is_present("js") {
        SplitMode::JsStr
    } else if matches.is_present("symbol") {
        SplitMode::Symbol {
            cut_before: matches
                .value_of("cut-before")
                .map_or_else(|| DEFAULT_CUT_BEFORE.to_vec(), |s| s.as_bytes().to_vec()),
            cut_after: matches
                .value_of("cut-after")
                .map_or_else(|| DEFAULT_CUT_AFTER.to_vec(), |s| s.as_bytes().to_vec()),
        }
    } else {
        SplitMode::Line
    };

    let testcase = Testcase::load(testcase_path, mode)?;
    let condition = interesting::Script::new(extra[0], condition_args)?;

    let mut lithium = Lithium::new();
    lithium.set_strategy(strategy);
    lithium.set_condition(Box::new(condition));
    lithium.set_testcase(testcase);
    if let Some(dir) = matches.value_of("tempdir") {
        lithium.set_temp_dir(dir);
    }

    lithium.run()
}
