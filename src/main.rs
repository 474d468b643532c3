use clap::Parser;
use screen_healing::cli::commands::{
    CorrelateArgs, HealArgs, cmd_correlate, cmd_heal, cmd_rollback, cmd_summary,
};
use screen_healing::cli::config::{Cli, Commands, load_config, verbosity_level};
use screen_healing::logging::{LogFormat, init_logging};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref());

    // Resolve logging settings: CLI > config > defaults
    if let Some(level) = verbosity_level(cli.verbose) {
        config.logging.level = level.to_string();
    }
    match cli.log_format.as_deref() {
        Some("json") => config.logging.format = LogFormat::Json,
        Some("pretty") => config.logging.format = LogFormat::Pretty,
        Some(other) => return Err(format!("unknown log format '{}' (expected pretty or json)", other).into()),
        None => {}
    }
    config.validate()?;
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Correlate {
            events,
            hints,
            model,
            output,
            strategy,
            window_ms,
            format,
        } => {
            cmd_correlate(
                CorrelateArgs {
                    events: &events,
                    hints: hints.as_deref(),
                    model: model.as_deref(),
                    output: output.as_deref(),
                    strategy: strategy.as_deref(),
                    window_ms,
                    format: &format,
                },
                &config,
            )
            .await?;
        }
        Commands::Heal {
            report,
            snapshots,
            repo,
            min_confidence,
            classifier,
            workers,
            dry_run,
            no_commit,
        } => {
            let all_healed = cmd_heal(
                HealArgs {
                    report: &report,
                    snapshots: &snapshots,
                    repo: &repo,
                    min_confidence,
                    classifier: classifier.as_deref(),
                    workers,
                    dry_run,
                    no_commit,
                },
                &config,
            )
            .await?;
            if !all_healed {
                std::process::exit(1);
            }
        }
        Commands::Rollback { repo, commit } => {
            cmd_rollback(&repo, &commit, &config).await?;
        }
        Commands::Summary { log, json } => {
            cmd_summary(log.as_deref(), json, &config)?;
        }
    }

    Ok(())
}
