use std::path::Path;

use {
    anyhow::Result,
    clap::{Subcommand, ValueEnum},
};

use chainscope_config::validate::{self, Severity};

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print the effective configuration (file, env overrides and defaults merged).
    Show {
        #[arg(long, value_enum, default_value = "toml")]
        format: ShowFormat,
    },
    /// Print the path of the config file that would be loaded.
    Path,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ShowFormat {
    Toml,
    Yaml,
    Json,
}

pub fn handle_config(action: ConfigAction, path: Option<&Path>) -> Result<std::process::ExitCode> {
    match action {
        ConfigAction::Check { verbose } => check(path, verbose),
        ConfigAction::Show { format } => {
            let config = crate::load_config(path)?;
            let text = match format {
                ShowFormat::Toml => toml::to_string_pretty(&config)?,
                ShowFormat::Yaml => serde_yaml::to_string(&config)?,
                ShowFormat::Json => serde_json::to_string_pretty(&config)?,
            };
            println!("{}", text.trim_end());
            Ok(std::process::ExitCode::SUCCESS)
        },
        ConfigAction::Path => {
            match path
                .map(Path::to_path_buf)
                .or_else(chainscope_config::find_config_file)
            {
                Some(found) => println!("{}", found.display()),
                None => eprintln!("No config file found; defaults are in effect."),
            }
            Ok(std::process::ExitCode::SUCCESS)
        },
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(path: Option<&Path>, verbose: bool) -> Result<std::process::ExitCode> {
    let result = validate::validate(path);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    Ok(if errors > 0 {
        std::process::ExitCode::FAILURE
    } else {
        std::process::ExitCode::SUCCESS
    })
}
