use std::time::Duration;

use anyhow::Result;
use broker_node::{BrokerConfig, IriConfig, JobsConfig, NodeConfig, PoolConfig};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use expanduser::expanduser;

use crate::config::Settings;
use crate::get_config_value;

pub fn cli() -> Command {
    Command::new("run")
        .about("Run the broker node")
        .args([
            // IRI settings
            Arg::new("iri.host")
                .long("iri.host")
                .value_name("url")
                .help("IRI node host, including the scheme")
                .action(ArgAction::Set),
            Arg::new("iri.port")
                .long("iri.port")
                .value_name("port")
                .value_parser(value_parser!(u16))
                .help("IRI node API port")
                .action(ArgAction::Set),
            Arg::new("iri.timeout_secs")
                .long("iri.timeout-secs")
                .value_name("seconds")
                .value_parser(value_parser!(u64))
                .help("Request timeout for IRI calls")
                .action(ArgAction::Set),
            // PoW settings
            Arg::new("pow.procs")
                .long("pow.procs")
                .value_name("count")
                .value_parser(value_parser!(usize))
                .help("Number of PoW worker channels")
                .action(ArgAction::Set),
            Arg::new("pow.min_weight_magnitude")
                .long("pow.min-weight-magnitude")
                .value_name("trits")
                .value_parser(value_parser!(usize))
                .help("Trailing zero trits required of each transaction hash")
                .action(ArgAction::Set),
            // Broker settings
            Arg::new("broker.db_file")
                .long("broker.db-file")
                .value_name("path")
                .help("Path to the broker database")
                .action(ArgAction::Set),
            Arg::new("broker.batch_size")
                .long("broker.batch-size")
                .value_name("size")
                .value_parser(value_parser!(usize))
                .help("Chunks per PoW job")
                .action(ArgAction::Set),
            Arg::new("broker.max_retries")
                .long("broker.max-retries")
                .value_name("count")
                .value_parser(value_parser!(u32))
                .help("Failed attachments after which a chunk is abandoned")
                .action(ArgAction::Set),
        ])
}

pub fn get_node_config(args: &ArgMatches, settings: &Settings) -> Result<NodeConfig> {
    let db_file = expanduser(get_config_value!(
        args,
        "broker.db_file",
        String,
        settings.broker.db_file
    ))?;

    let iri = IriConfig {
        host: get_config_value!(args, "iri.host", String, settings.iri.host).clone(),
        port: *get_config_value!(args, "iri.port", u16, settings.iri.port),
        timeout: Duration::from_secs(*get_config_value!(
            args,
            "iri.timeout_secs",
            u64,
            settings.iri.timeout_secs
        )),
    };

    let procs = match args.try_get_one::<usize>("pow.procs") {
        Ok(Some(procs)) => Some(*procs),
        _ => settings.pow.procs,
    };
    let pool = PoolConfig {
        procs,
        min_weight_magnitude: *get_config_value!(
            args,
            "pow.min_weight_magnitude",
            usize,
            settings.pow.min_weight_magnitude
        ),
        min_depth: settings.pow.min_depth,
        seed: settings.broker.seed.clone(),
        tag: settings.broker.tag.clone(),
    };

    let broker = BrokerConfig {
        batch_size: *get_config_value!(
            args,
            "broker.batch_size",
            usize,
            settings.broker.batch_size
        ),
        max_side_chain_length: settings.broker.max_side_chain_length,
        max_retries: *get_config_value!(
            args,
            "broker.max_retries",
            u32,
            settings.broker.max_retries
        ),
        unverified_grace: Duration::from_secs(settings.broker.unverified_grace_secs),
    };

    let jobs = JobsConfig {
        process_paid_sessions: Duration::from_secs(settings.jobs.process_paid_sessions_secs),
        process_unassigned_chunks: Duration::from_secs(
            settings.jobs.process_unassigned_chunks_secs,
        ),
        verify_unverified_chunks: Duration::from_secs(settings.jobs.verify_unverified_chunks_secs),
        confirm_complete_chunks: Duration::from_secs(settings.jobs.confirm_complete_chunks_secs),
    };

    Ok(NodeConfig {
        db_file,
        iri,
        pool,
        broker,
        jobs,
    })
}

pub fn exec(args: &ArgMatches, settings: &Settings) -> Result<()> {
    let node_config = get_node_config(args, settings)?;
    broker_node::run(node_config)
}
