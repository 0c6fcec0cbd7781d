// src/cli.rs
use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::{env, path::PathBuf};

use crate::{infra::t, resolve_locale};

pub mod commands;

/// Pre-parses the command line arguments to find the language setting.
/// This allows i18n to be initialized before the full CLI is built.
/// It looks for a `--lang <VALUE>` argument.
fn pre_parse_language() -> String {
    let args: Vec<String> = env::args().collect();
    if let Some(pos) = args.iter().position(|arg| arg == "--lang") {
        if let Some(lang) = args.get(pos + 1) {
            return resolve_locale(lang);
        }
    }
    // Fallback to system language detection
    resolve_locale(&sys_locale::get_locale().unwrap_or_else(|| "en".to_string()))
}

fn dir_arg(locale: &str) -> Arg {
    Arg::new("dir")
        .long("dir")
        .help(t!("arg_dir", locale = locale).to_string())
        .value_name("DIR")
        .default_value(".")
        .value_parser(clap::value_parser!(PathBuf))
        .action(ArgAction::Set)
}

pub fn build_cli(locale: &str) -> Command {
    Command::new("sub-test")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli_about", locale = locale).to_string())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("cli_lang", locale = locale).to_string())
                .value_name("LANGUAGE")
                .global(true)
                .action(ArgAction::Set),
        )
        .subcommand(
            Command::new("run")
                .about(t!("cmd_run_about", locale = locale).to_string())
                .arg(
                    Arg::new("compiler")
                        .help(t!("arg_compiler", locale = locale).to_string())
                        .value_name("COMPILER")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(dir_arg(locale))
                .arg(
                    Arg::new("html")
                        .long("html")
                        .help(t!("arg_html", locale = locale).to_string())
                        .value_name("HTML")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help(t!("arg_json", locale = locale).to_string())
                        .value_name("JSON")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("good-file")
                .about(t!("cmd_good_file_about", locale = locale).to_string())
                .arg(
                    Arg::new("base")
                        .help(t!("arg_base", locale = locale).to_string())
                        .value_name("BASE")
                        .required(true)
                        .action(ArgAction::Set),
                )
                .arg(dir_arg(locale))
                .arg(
                    Arg::new("compopts")
                        .long("compopts")
                        .help(t!("arg_compopts", locale = locale).to_string())
                        .value_name("OPTS")
                        .allow_hyphen_values(true)
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("suffix")
                        .long("suffix")
                        .help(t!("arg_suffix", locale = locale).to_string())
                        .value_name("SUFFIX")
                        .allow_hyphen_values(true)
                        .action(ArgAction::Append),
                ),
        )
}

fn path_arg(matches: &ArgMatches, id: &str) -> PathBuf {
    matches.get_one::<PathBuf>(id).cloned().unwrap_or_else(|| PathBuf::from("."))
}

pub async fn run() -> Result<()> {
    // Pre-parse language and initialize i18n first.
    let language = pre_parse_language();
    rust_i18n::set_locale(&language);

    let matches = build_cli(&language).get_matches();

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let compiler = path_arg(run_matches, "compiler");
            let dir = path_arg(run_matches, "dir");
            let html = run_matches.get_one::<PathBuf>("html").cloned();
            let json = run_matches.get_one::<PathBuf>("json").cloned();
            commands::run::execute(&language, compiler, dir, html, json).await?;
        }
        Some(("good-file", good_matches)) => {
            let base = good_matches.get_one::<String>("base").cloned().unwrap_or_default();
            let dir = path_arg(good_matches, "dir");
            let compopts = good_matches.get_one::<String>("compopts").cloned();
            let suffixes: Vec<String> = good_matches
                .get_many::<String>("suffix")
                .map(|values| values.cloned().collect())
                .unwrap_or_default();
            commands::good_file::execute(&language, &base, dir, compopts, suffixes)?;
        }
        _ => {
            // Clap prints help when no subcommand is given.
        }
    }
    Ok(())
}
