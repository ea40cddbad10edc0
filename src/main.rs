use clap::Parser;
use confluence::cli::{Cli, Commands};
use confluence::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Validate must see the real load error
    if let Commands::Validate = cli.command {
        let config = Config::load(&cli.config)?;
        config.validate()?;
        println!("{}: OK", cli.config);
        return Ok(());
    }

    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });
    config.validate()?;

    let _telemetry = confluence::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Validate => {}
        Commands::Levels(args) => args.execute(&config)?,
        Commands::Journal(args) => args.execute(&config)?,
    }

    Ok(())
}
