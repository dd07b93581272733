use std::env;
use std::io;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use tracing_subscriber::EnvFilter;

use chesslike::{Config, Console, EngineClient, Game, VariantFile};

/// Filter comes from `CHESSLIKE_LOG` (e.g. `debug` or `chesslike::engine=trace`),
/// default `info`. Records from the `log` macros are bridged into the subscriber.
fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_env("CHESSLIKE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install logger: {}", e))
}

fn attach_engine(config: &Config, game: &mut Game) -> Result<()> {
    let (Some(engine), Some(launch)) = (&config.engine, config.engine_launch()) else {
        info!("No engine configured, positions will not be classified");
        return Ok(());
    };

    if let Some(path) = &engine.variant_file {
        VariantFile::from_catalog(&engine.variant, game.catalog())
            .write_to(path)
            .with_context(|| format!("writing variant file {}", path.display()))?;
    }

    let mut client = EngineClient::new(config.board_size()?);
    if let Err(e) = client.start(&launch) {
        warn!("Engine unavailable, positions will not be classified: {}", e);
        return Ok(());
    }
    client
        .register_custom_pieces(game.catalog())
        .context("registering custom pieces")?;
    game.set_engine(Box::new(client));
    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;

    let config = match env::args_os().nth(1) {
        Some(path) => {
            let path = PathBuf::from(path);
            Config::load(&path).with_context(|| format!("loading {}", path.display()))?
        }
        None => {
            info!("No config file given, using an empty 8x8 board");
            Config::default()
        }
    };

    let mut game = Game::from_config(&config).context("building the game")?;
    attach_engine(&config, &mut game)?;

    info!("Type `help` for commands, `start` to begin");
    let mut console = Console::new(game);
    console.run(io::stdin().lock(), io::stdout())?;
    Ok(())
}
