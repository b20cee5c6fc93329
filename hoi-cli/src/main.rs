//! hoictl is the command line interface to hoid.
//!
//! # Usage
//!
//! ```text
//! hoictl [--project <path>] status [--all]
//! hoictl [--project <path>] load
//! hoictl [--project <path>] reload [--all]
//! hoictl [--project <path>] unload [--all]
//! hoictl [--project <path>] domain <fqdn> [--www keep|drop|add] [--alias <fqdn>]...
//! hoictl [--project <path>] dump <target>
//! ```

mod print;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use hoi_core::domain::{DomainDirective, Www};
use hoi_daemon::protocol::{send_request, Request};
use hoi_daemon::DEFAULT_SOCKET_PATH;
use hoi_store::Entity;

#[derive(Parser, Debug)]
#[command(
    name = "hoictl",
    version,
    about = "hoictl is the command line interface to hoid",
    long_about = None,
)]
struct Cli {
    /// Path to the project root; searched upwards for a Hoifile when not
    /// itself containing one.
    #[arg(long, default_value = ".", global = true)]
    project: String,

    /// Path to the daemon socket.
    #[arg(long, default_value = DEFAULT_SOCKET_PATH, global = true)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show status of the project, or of all projects.
    Status {
        #[arg(long)]
        all: bool,
    },

    /// Initialize or update a project's configuration using its Hoifile.
    Load,

    /// Rebuild a project's configuration, or every project's.
    Reload {
        #[arg(long)]
        all: bool,
    },

    /// Remove a project's configuration, or every project's.
    Unload {
        #[arg(long)]
        all: bool,
    },

    /// Add or modify a domain configuration.
    Domain {
        /// The naked fully qualified domain name.
        fqdn: String,

        /// Either drop, add or keep the www prefix untouched.
        #[arg(long, default_value = "keep")]
        www: String,

        /// Alias for the domain (repeat for multiple).
        #[arg(long = "alias")]
        aliases: Vec<String>,
    },

    /// Archive the project's databases and persistent volumes.
    Dump {
        /// Path to the target archive file.
        target: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let socket = cli.socket.clone();

    match cli.command {
        Commands::Status { all: true } => {
            let data = call(&socket, Request::new("status-all"))?;
            let entities: Vec<Entity> = serde_json::from_value(data)?;
            print::status_all(&entities);
        }
        Commands::Status { all: false } => {
            let path = project_directory(&cli.project)?;
            let data = call(&socket, Request::with_path("status", path))?;
            let entity: Entity = serde_json::from_value(data)?;
            print::status(&entity);
        }
        Commands::Load => {
            let path = project_directory(&cli.project)?;
            call(&socket, Request::with_path("load", path))?;
            println!("project successfully loaded :)");
        }
        Commands::Reload { all: true } => {
            call(&socket, Request::new("reload-all"))?;
            println!("all projects successfully reloaded :)");
        }
        Commands::Reload { all: false } => {
            let path = project_directory(&cli.project)?;
            call(&socket, Request::with_path("reload", path))?;
            println!("project successfully reloaded :)");
        }
        Commands::Unload { all: true } => {
            call(&socket, Request::new("unload-all"))?;
            println!("all projects successfully unloaded :(");
        }
        Commands::Unload { all: false } => {
            let path = project_directory(&cli.project)?;
            call(&socket, Request::with_path("unload", path))?;
            println!("project successfully unloaded :(");
        }
        Commands::Domain { fqdn, www, aliases } => {
            let path = project_directory(&cli.project)?;
            let mut request = Request::with_path("domain", path);
            request.domain = Some(DomainDirective {
                fqdn,
                www: parse_www(&www)?,
                aliases,
                ..DomainDirective::default()
            });
            call(&socket, request)?;
            println!("domain added/modified in project");
        }
        Commands::Dump { target } => {
            let path = project_directory(&cli.project)?;
            let mut request = Request::with_path("dump", path);
            request.target = Some(target.to_string_lossy().into_owned());
            call(&socket, request)?;
            println!("project successfully dumped into {}", target.display());
        }
    }
    Ok(())
}

fn call(socket: &Path, request: Request) -> Result<serde_json::Value> {
    let response = send_request(socket, &request)?;
    Ok(response.into_data()?)
}

fn parse_www(s: &str) -> Result<Www> {
    match s {
        "keep" => Ok(Www::Keep),
        "drop" => Ok(Www::Drop),
        "add" => Ok(Www::Add),
        other => bail!("unknown www policy '{other}'; expected: keep, drop, add"),
    }
}

/// Resolves the project root: the given path made absolute, then searched
/// upwards until a directory containing a Hoifile is found.
fn project_directory(path: &str) -> Result<String> {
    let start = if path == "." {
        std::env::current_dir().context("cannot determine working directory")?
    } else {
        let p = PathBuf::from(path);
        if p.is_absolute() {
            p
        } else {
            std::env::current_dir()
                .context("cannot determine working directory")?
                .join(p)
        }
    };

    let mut current = start.as_path();
    loop {
        if current.join("Hoifile").is_file() {
            return Ok(current.to_string_lossy().into_owned());
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => bail!(
                "not able to detect project directory from: {}",
                start.display()
            ),
        }
    }
}
