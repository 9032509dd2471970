mod cli;
mod commands;
mod error_fmt;
mod logging;
mod sim;

use clap::Parser;
use cli::{Cli, Commands, JSON_MODE};
use error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = real_main(cli) {
        tracing::error!(error = %e, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    color_eyre::install()?;

    let cfg = if cli.cmd.needs_config() {
        Some(commands::load_config(&cli.config)?)
    } else {
        None
    };
    logging::init(
        cli.json,
        cli.log_level.as_deref(),
        cfg.as_ref().map(|c| &c.logging),
    )?;
    let loaded = |cfg: Option<bms_config::Config>| {
        cfg.ok_or_else(|| eyre::eyre!("config was not loaded for {:?}", cli.config))
    };

    match cli.cmd {
        Commands::Run {
            cycles,
            calibrate,
            auto_track,
        } => commands::run(loaded(cfg)?, cycles, calibrate, auto_track, cli.json),
        Commands::Calibrate => commands::calibrate(&loaded(cfg)?, cli.json),
        Commands::Soc {
            voltage,
            temperature,
            chemistry,
        } => commands::soc(voltage, temperature, chemistry, cli.json),
        Commands::SelfCheck => commands::self_check(&loaded(cfg)?, cli.json),
    }
}
