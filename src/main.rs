use std::io::{BufRead, BufReader};

use clap::Parser;
use drivenet_scdb::{Config, Output, Scdb};
use miette::{miette, IntoDiagnostic};
use serde::Deserialize;
use tracing_subscriber::{filter as tracing_filter, layer::SubscriberExt};

/// Configure the global `tracing` subscriber.
fn set_tracing_subscriber(log_level: tracing::Level) -> miette::Result<()> {
    let targets_filter = tracing_filter::Targets::new().with_default(log_level);
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_line_number(true);
    let tracing_subscriber = tracing_subscriber::registry()
        .with(targets_filter)
        .with(stdout_layer);
    tracing::subscriber::set_global_default(tracing_subscriber)
        .into_diagnostic()
        .map_err(|err| miette::miette!("setting default subscriber failed: {err:#}"))
}

#[derive(Deserialize)]
struct OutputRecord {
    value: i64,
    script: String,
}

#[derive(Deserialize)]
struct BlockRecord {
    height: u32,
    hash: String,
    prev_hash: Option<String>,
    #[serde(default)]
    outputs: Vec<OutputRecord>,
}

fn decode_hash(hex_str: &str, field: &str) -> miette::Result<[u8; 32]> {
    let bytes = hex::decode(hex_str)
        .map_err(|err| miette!("decoding `{field}` as hex: {err}"))?;
    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| miette!("`{field}` must be 32 bytes"))
}

fn replay_line(scdb: &mut Scdb, line: &str) -> miette::Result<()> {
    let record: BlockRecord = serde_json::from_str(line)
        .map_err(|err| miette!("parsing block record: {err}"))?;
    let hash = decode_hash(&record.hash, "hash")?;
    let prev_hash = record
        .prev_hash
        .as_deref()
        .map(|h| decode_hash(h, "prev_hash"))
        .transpose()?;
    let outputs: Vec<Output> = record
        .outputs
        .into_iter()
        .map(|o| {
            Ok(Output {
                value: o.value,
                script: hex::decode(&o.script)
                    .map_err(|err| miette!("decoding output script as hex: {err}"))?,
            })
        })
        .collect::<miette::Result<_>>()?;

    scdb.apply(record.height, hash, prev_hash, &outputs)
        .map_err(|err| miette!("block {}: {err}", record.height))?;
    tracing::info!(
        height = record.height,
        active_sidechains = scdb.active_sidechain_count(),
        "applied block"
    );
    Ok(())
}

fn main() -> miette::Result<()> {
    let config = Config::parse();
    set_tracing_subscriber(config.log_level)?;
    let blocks_path = config.blocks.clone();

    let mut scdb = Scdb::new(config);

    let reader: Box<dyn BufRead> = if blocks_path.as_os_str() == "-" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let file = std::fs::File::open(&blocks_path)
            .map_err(|err| miette!("opening {}: {err}", blocks_path.display()))?;
        Box::new(BufReader::new(file))
    };

    for line in reader.lines() {
        let line = line.into_diagnostic()?;
        if line.trim().is_empty() {
            continue;
        }
        replay_line(&mut scdb, &line)?;
    }

    println!("height: {}", scdb.height());
    println!("active sidechains: {}", scdb.active_sidechain_count());
    println!("next state script: {}", hex::encode(scdb.next_state_script()));
    Ok(())
}
