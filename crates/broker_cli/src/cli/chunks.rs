use anyhow::{bail, Result};
use broker_core::{build_chunks, build_chunks_with_count};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

pub fn cli() -> Command {
    Command::new("chunks")
        .about("Print the chunk hashes and ledger addresses derived from a genesis hash")
        .args([
            Arg::new("genesis_hash")
                .long("genesis-hash")
                .value_name("hash")
                .help("Genesis hash of the file")
                .required(true)
                .action(ArgAction::Set),
            Arg::new("size")
                .long("size")
                .value_name("bytes")
                .value_parser(value_parser!(u64))
                .help("File size in bytes; one treasure chunk is added per sector")
                .conflicts_with("count")
                .action(ArgAction::Set),
            Arg::new("count")
                .long("count")
                .value_name("chunks")
                .value_parser(value_parser!(u64))
                .help("Exact number of chunks to derive")
                .action(ArgAction::Set),
        ])
}

pub fn exec(args: &ArgMatches) -> Result<()> {
    let Some(genesis_hash) = args.get_one::<String>("genesis_hash") else {
        bail!("--genesis-hash is required");
    };
    let chunks = match (args.get_one::<u64>("size"), args.get_one::<u64>("count")) {
        (Some(size), _) => build_chunks(genesis_hash, *size)?,
        (None, Some(count)) => build_chunks_with_count(genesis_hash, *count)?,
        (None, None) => bail!("one of --size or --count is required"),
    };

    for chunk in chunks {
        println!("{}\t{}\t{}", chunk.chunk_idx, chunk.address, chunk.hash);
    }
    Ok(())
}
