#![doc = include_str!("../README.md")]
use ::lib::config::{self, Args};
use ::lib::{collect_posture, setup_tracing};
use anyhow::Result;
use tracing::debug;

#[paw::main]
fn main(args: Args) -> Result<()> {
    // Merge config Default → Config File → Environment and command line args
    let args = config::load(args)?;
    setup_tracing(&args.verbose)?;
    debug!("Configuration file: {:?}", config::config_file(&args));
    let config = args.validate()?;
    debug!("Configuration: {:#?}", config);

    let posture = collect_posture(&config)?;
    if config.json {
        println!("{}", posture.to_json()?);
    } else {
        for line in posture.lines(config.reveal) {
            println!("{line}");
        }
    }
    Ok(())
}
