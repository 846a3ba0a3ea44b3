pub const NAME: &str = "Broker Node";
pub const BIN_NAME: &str = "brokernode";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Attaches uploaded file chunks to the tangle and keeps them reconciled";
