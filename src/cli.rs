use clap::{value_parser, Arg, ArgAction, ArgGroup, Command};

/// Full command tree, shared by `main` and shell completion generation
pub fn build_cli() -> Command {
    Command::new("ufora")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Log in to Ufora and download course materials")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Show debug logging")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("login")
                .about("Log in and cache the session (always asks for credentials)")
                .arg(
                    Arg::new("show-browser")
                        .long("show-browser")
                        .help("Show the browser window while logging in")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("courses")
                .about("List your courses that started this year")
                .arg(
                    Arg::new("all")
                        .short('a')
                        .long("all")
                        .help("List every active course, regardless of start year")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("materials")
                .about("Show the folders and files of a course")
                .arg(course_arg()),
        )
        .subcommand(
            Command::new("download")
                .about("Download the materials of a course")
                .long_about(
                    "Download the materials of a course.\n\n\
                     Files that already exist with a non-zero size are skipped, so the \
                     command can be re-run safely after an interruption or partial failure.\n\n\
                     By default files go to <base directory>/<course name>.",
                )
                .arg(course_arg())
                .arg(
                    Arg::new("dir")
                        .short('d')
                        .long("dir")
                        .value_name("PATH")
                        .help("Download into this directory"),
                )
                .arg(
                    Arg::new("here")
                        .long("here")
                        .help("Download into the current directory")
                        .action(ArgAction::SetTrue),
                )
                .group(ArgGroup::new("destination").args(["dir", "here"]))
                .arg(
                    Arg::new("select")
                        .short('s')
                        .long("select")
                        .value_name("IDS")
                        .help("Only these top-level entries, e.g. 1,3")
                        .value_delimiter(',')
                        .value_parser(value_parser!(usize))
                        .num_args(1..),
                )
                .arg(
                    Arg::new("pick")
                        .short('p')
                        .long("pick")
                        .help("Choose top-level entries interactively")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("select"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Show or change settings")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(
                    Command::new("set")
                        .about("Set a value: email, dir or twofa")
                        .arg(
                            Arg::new("key")
                                .help("Setting to change")
                                .required(true)
                                .value_parser(["email", "dir", "twofa"]),
                        )
                        .arg(Arg::new("value").help("New value").required(true)),
                )
                .subcommand(Command::new("show").about("Print the current settings")),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .help("Shell to generate completions for")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell", "elvish"]),
                ),
        )
}

fn course_arg() -> Arg {
    Arg::new("course")
        .help("Course id as shown by 'ufora courses'")
        .required(true)
        .value_parser(value_parser!(usize))
}
