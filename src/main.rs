use std::fs::{self, File};
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use chunkxfer::{
    Chunk, ChunkOutcome, ChunkRequest, ContentId, Info, InfoRequest, Message, NoInfo, PackageConfig,
    Transfer, Transmissible,
};

mod cli;
use crate::cli::CliError;
use crate::cli::Cli;
use crate::cli::Commands;
use crate::cli::Config;

const INFO_FILE: &str = "info.msg";

fn chunk_file(offset: u64) -> String {
    format!("chunk-{:016x}.msg", offset)
}

fn read_message(path: &Path) -> Result<Message, CliError> {
    Ok(Message::from_bytes(fs::read(path)?)?)
}

fn split(config: &Config, input: &Path, outdir: &Path) -> Result<(), CliError> {
    let mut source = File::open(input)?;
    let dataset_id = ContentId::new();
    let package_config = PackageConfig::new(config.compression, config.checksum);

    let info = Info::describe(&mut source, dataset_id, config.chunk_size, config.hash_codes)?;
    fs::create_dir_all(outdir)?;
    fs::write(outdir.join(INFO_FILE), info.to_message().as_bytes())?;

    for index in 0..info.chunk_count() {
        let Some((offset, size)) = info.chunk_range(index) else {
            continue;
        };
        let chunk = Chunk::from_source(&mut source, dataset_id, offset, size, package_config)?;
        fs::write(outdir.join(chunk_file(offset)), chunk.to_message().as_bytes())?;
    }

    println!("{} {} bytes in {} chunks", dataset_id, info.data_length, info.chunk_count());
    Ok(())
}

fn join(indir: &Path, output: &Path) -> Result<(), CliError> {
    let info = Info::from_message(&read_message(&indir.join(INFO_FILE))?)?;

    let mut transfer = Transfer::new(info.dataset_id, File::create(output)?);
    transfer.request_info()?;
    transfer.on_info(info)?;

    // The directory holds a single answer per chunk, one pass is all we get
    let requests = transfer.next_requests(usize::MAX)?;
    for request in requests.iter() {
        let path = indir.join(chunk_file(request.offset));
        let chunk = match read_message(&path) {
            Ok(message) => Chunk::from_message(&message)?,
            Err(CliError::IO(e)) => {
                warn!("{}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(e),
        };

        if transfer.on_chunk(&chunk)? != ChunkOutcome::Written {
            warn!("{}: not accepted", path.display());
        }
    }

    if !transfer.is_complete() {
        return Err(CliError::Incomplete(format!(
            "missing chunks {:?}",
            transfer.missing_chunks()
        )));
    }

    info!("joined {} into {}", transfer.dataset_id(), output.display());
    Ok(())
}

fn inspect(file: &Path) -> Result<(), CliError> {
    let message = read_message(file)?;

    match &message.identifier() {
        id if *id == Chunk::MESSAGE_ID => {
            let chunk = Chunk::from_message(&message)?;
            println!("{:#?}", chunk);
            println!("valid checksum: {}", chunk.is_valid());
        }
        id if *id == ChunkRequest::MESSAGE_ID => println!("{:#?}", ChunkRequest::from_message(&message)?),
        id if *id == Info::MESSAGE_ID => println!("{:#?}", Info::from_message(&message)?),
        id if *id == InfoRequest::MESSAGE_ID => println!("{:#?}", InfoRequest::from_message(&message)?),
        id if *id == NoInfo::MESSAGE_ID => println!("{:#?}", NoInfo::from_message(&message)?),
        _ => println!("{:?}", message),
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    // Fresh dataset ids come out of libsodium
    if !chunkxfer::content_id::init() {
        error!("failed to initialize libsodium");
        return ExitCode::FAILURE;
    }

    // Parse the cli
    let cli = Cli::parse();

    let config: Result<Config, CliError> = match &cli.config {
        None => toml::from_str(
            r#"
            chunk_size = 65536
            compression = true
            checksum = true
            hash_codes = true
        "#,
        )
        .map_err(CliError::from),
        Some(path) => fs::read_to_string(path)
            .map_err(CliError::from)
            .and_then(|s| toml::from_str(&s).map_err(CliError::from)),
    };

    let result = config.and_then(|config| {
        info!("config: {:?}", config);

        match &cli.command {
            Commands::Split { input, outdir } => split(&config, input, outdir),
            Commands::Join { indir, output } => join(indir, output),
            Commands::Inspect { file } => inspect(file),
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
