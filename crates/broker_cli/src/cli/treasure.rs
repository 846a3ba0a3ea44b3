use anyhow::{bail, Result};
use broker_core::constants::{MAX_SIDE_CHAIN_LENGTH, MAX_TREASURE_DEPTH};
use broker_core::create_treasure_payload;
use broker_core::treasure::verify_treasure_claim;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

pub fn cli() -> Command {
    Command::new("treasure")
        .about("Create a treasure payload, or find the depth of an existing one")
        .args([
            Arg::new("seed")
                .long("seed")
                .value_name("seed")
                .help("Treasure key the payload is encrypted with")
                .required(true)
                .action(ArgAction::Set),
            Arg::new("hash")
                .long("hash")
                .value_name("hash")
                .help("Hash of the chunk the payload is buried in")
                .required(true)
                .action(ArgAction::Set),
            Arg::new("max_depth")
                .long("max-depth")
                .value_name("depth")
                .value_parser(value_parser!(u64).range(..=MAX_TREASURE_DEPTH))
                .help("Upper bound of the side-chain depth")
                .action(ArgAction::Set),
            Arg::new("claim")
                .long("claim")
                .value_name("payload")
                .help("Payload to check instead of creating a new one")
                .action(ArgAction::Set),
        ])
}

pub fn exec(args: &ArgMatches) -> Result<()> {
    let (Some(seed), Some(hash)) = (
        args.get_one::<String>("seed"),
        args.get_one::<String>("hash"),
    ) else {
        bail!("--seed and --hash are required");
    };
    let max_depth = args
        .get_one::<u64>("max_depth")
        .copied()
        .unwrap_or(MAX_SIDE_CHAIN_LENGTH);

    match args.get_one::<String>("claim") {
        Some(payload) => {
            let depth = verify_treasure_claim(seed, hash, payload, max_depth)?;
            println!("{depth}");
        }
        None => println!("{}", create_treasure_payload(seed, hash, max_depth)?),
    }
    Ok(())
}
