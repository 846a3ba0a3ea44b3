use clap::Command;

pub mod args;
pub mod chunks;
pub mod run;
pub mod treasure;

pub fn builtin() -> Vec<Command> {
    vec![run::cli(), chunks::cli(), treasure::cli()]
}
