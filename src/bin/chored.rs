// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use chored::{
    chore::{options::parse_args, InvocationMode, Resolver},
    config::Config,
    path::{config_file, project_root},
};

use anyhow::Result;
use clap::Parser;
use std::{io::IsTerminal, path::PathBuf, process::exit};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "chored [options] [MODULE] CHORE [CHORE_OPTIONS]...\n       chored [options] --list [MODULE]\n       chored [options] --help [MODULE] [CHORE]",
    disable_help_flag = true,
    version
)]
struct Cli {
    /// Directory holding task files, instead of the configured one.
    #[arg(long, env = "CHORED_TASK_ROOT", value_name = "path")]
    pub task_root: Option<PathBuf>,

    /// Configuration file to use, instead of the project's one.
    #[arg(long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Chore to run, followed by its options.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "args")]
    pub args: Vec<String>,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let invocation = parse_args(self.args)?;
        debug!("invocation: {invocation:?}");

        let cwd = std::env::current_dir()?;
        let root = project_root(&cwd);
        let config_path = match self.config {
            Some(path) => cwd.join(path),
            None => config_file(&root)?,
        };
        let config = Config::load(&config_path).await?;

        let mut resolver = Resolver::new(&root, config);
        if let Some(task_root) = self.task_root {
            resolver = resolver.with_task_root(cwd.join(task_root));
        }

        match invocation.mode {
            InvocationMode::List => {
                let scope = invocation.path.first().map(String::as_str);
                println!("{}", resolver.list_entrypoints(scope).await?);
            }
            InvocationMode::Help => println!("{}", resolver.help(&invocation.path).await?),
            InvocationMode::Run => {
                let result = resolver.run(&invocation.path, invocation.options).await?;
                debug!("chore returned {result}");
            }
        }

        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = Cli::parse().run().await {
        report(&error);
        exit(1);
    }

    exit(0)
}

// INVARIANT: Only decorate output meant for a human.
fn report(error: &anyhow::Error) {
    let interactive = std::io::stderr().is_terminal();
    if interactive {
        eprintln!("\x1b[1;31mERROR:\x1b[0m \x1b[31m{error}\x1b[0m");
    } else {
        eprintln!("ERROR: {error}");
    }

    for cause in error.chain().skip(1) {
        if interactive {
            eprintln!("\x1b[2m  caused by: {cause}\x1b[0m");
        } else {
            eprintln!("  caused by: {cause}");
        }
    }
}
