use clap::{CommandFactory, Parser};
use vmctl::{Application, Config, commands, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let cli = commands::Cli::parse();

    // Load configuration
    let config = Config::load(&cli.args)?;

    // If --validate flag is set, exit successfully after config validation
    if cli.args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    let Some(command) = cli.command else {
        commands::Cli::command().print_help()?;
        return Ok(());
    };

    telemetry::init_telemetry()?;
    tracing::debug!("{:?}", command);

    let app = Application::new(config).await?;
    let outcome = commands::execute(&app, cli.user.as_deref(), command).await;
    app.close().await;

    match outcome {
        Ok(reply) => {
            println!("{reply}");
            Ok(())
        }
        Err(e) => {
            e.log();
            eprintln!("{}", e.user_message());
            std::process::exit(1);
        }
    }
}
