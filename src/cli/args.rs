use clap::{Arg, Command};

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub debug: bool,
    pub command: AppCommand,
}

#[derive(Debug, Clone)]
pub enum AppCommand {
    Profile(ProfileCommand),
    Vault(VaultCommand),
    /// Open a session from a saved profile and attach the terminal to it
    Connect { profile: String },
    /// Open a plain local shell session
    Shell,
}

#[derive(Debug, Clone)]
pub enum ProfileCommand {
    Add {
        label: String,
        host: String,
        port: u16,
        group: Option<String>,
        with_password: bool,
    },
    List,
    Edit {
        id: String,
        label: Option<String>,
        host: Option<String>,
        port: Option<u16>,
        group: Option<String>,
        with_password: bool,
    },
    Delete { id: String },
}

#[derive(Debug, Clone)]
pub enum VaultCommand {
    Init,
    Status,
}

/// Parses command-line arguments using clap.
pub fn main_args() -> CliArgs {
    let matches = Command::new("smux")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Terminal session manager with saved profiles and an encrypted credential vault.")
        .arg_required_else_help(true)
        .propagate_version(true)
        .subcommand(profile_args())
        .subcommand(vault_args())
        .subcommand(connect_args())
        .subcommand(Command::new("shell").about("Open a local shell session"))
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Enable debug mode")
                .action(clap::ArgAction::SetTrue)
                .global(true),
        )
        .get_matches();

    let command = match matches.subcommand() {
        Some(("profile", sub_matches)) => AppCommand::Profile(parse_profile_subcommand(sub_matches)),
        Some(("vault", sub_matches)) => AppCommand::Vault(parse_vault_subcommand(sub_matches)),
        Some(("connect", sub_matches)) => AppCommand::Connect {
            profile: sub_matches
                .get_one::<String>("profile")
                .expect("profile is required")
                .clone(),
        },
        _ => AppCommand::Shell,
    };

    CliArgs {
        debug: matches.get_flag("debug"),
        command,
    }
}

pub fn profile_args() -> Command {
    Command::new("profile")
        .about("Manage saved connection profiles")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("add")
                .about("Add a new connection profile")
                .arg(
                    Arg::new("label")
                        .help("Display label for the profile")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("host")
                        .short('H')
                        .long("host")
                        .help("Host to connect to")
                        .required(true)
                        .num_args(1),
                )
                .arg(
                    Arg::new("port")
                        .short('P')
                        .long("port")
                        .help("Port to connect to")
                        .value_parser(clap::value_parser!(u16))
                        .default_value("22")
                        .num_args(1),
                )
                .arg(
                    Arg::new("group")
                        .short('g')
                        .long("group")
                        .help("Group the profile belongs to")
                        .num_args(1),
                )
                .arg(
                    Arg::new("password_flag")
                        .short('p')
                        .help("Prompt for a password to seal into the vault")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("list").about("List saved profiles"))
        .subcommand(
            Command::new("edit")
                .about("Edit an existing profile")
                .arg(
                    Arg::new("id")
                        .help("Id of the profile to edit")
                        .required(true)
                        .index(1),
                )
                .arg(Arg::new("label").long("label").num_args(1).help("New label"))
                .arg(Arg::new("host").short('H').long("host").num_args(1).help("New host"))
                .arg(
                    Arg::new("port")
                        .short('P')
                        .long("port")
                        .value_parser(clap::value_parser!(u16))
                        .num_args(1)
                        .help("New port"),
                )
                .arg(Arg::new("group").short('g').long("group").num_args(1).help("New group"))
                .arg(
                    Arg::new("password_flag")
                        .short('p')
                        .help("Prompt for a new password to seal into the vault")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("del").about("Delete a profile").arg(
                Arg::new("id")
                    .help("Id of the profile to delete")
                    .required(true)
                    .index(1),
            ),
        )
}

pub fn vault_args() -> Command {
    Command::new("vault")
        .about("Interact with the credential vault")
        .arg_required_else_help(true)
        .subcommand(Command::new("init").about("Initialize the credential vault"))
        .subcommand(Command::new("status").about("Check vault state and verify the passphrase"))
}

pub fn connect_args() -> Command {
    Command::new("connect").about("Open a session from a saved profile").arg(
        Arg::new("profile")
            .help("Profile id or label to connect with")
            .required(true)
            .index(1),
    )
}

fn parse_profile_subcommand(matches: &clap::ArgMatches) -> ProfileCommand {
    match matches.subcommand() {
        Some(("add", sub_matches)) => ProfileCommand::Add {
            label: sub_matches
                .get_one::<String>("label")
                .expect("label is required")
                .clone(),
            host: sub_matches
                .get_one::<String>("host")
                .expect("host is required")
                .clone(),
            port: *sub_matches.get_one::<u16>("port").expect("port has a default"),
            group: sub_matches.get_one::<String>("group").cloned(),
            with_password: sub_matches.get_flag("password_flag"),
        },
        Some(("edit", sub_matches)) => ProfileCommand::Edit {
            id: sub_matches.get_one::<String>("id").expect("id is required").clone(),
            label: sub_matches.get_one::<String>("label").cloned(),
            host: sub_matches.get_one::<String>("host").cloned(),
            port: sub_matches.get_one::<u16>("port").copied(),
            group: sub_matches.get_one::<String>("group").cloned(),
            with_password: sub_matches.get_flag("password_flag"),
        },
        Some(("del", sub_matches)) => ProfileCommand::Delete {
            id: sub_matches.get_one::<String>("id").expect("id is required").clone(),
        },
        _ => ProfileCommand::List,
    }
}

fn parse_vault_subcommand(matches: &clap::ArgMatches) -> VaultCommand {
    match matches.subcommand() {
        Some(("init", _)) => VaultCommand::Init,
        _ => VaultCommand::Status,
    }
}
