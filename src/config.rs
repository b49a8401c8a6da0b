pub use config::Config;
pub use once_cell::sync::OnceCell;
use std::error::Error;

static GLOBAL_CONFIG: OnceCell<Config> = OnceCell::new();

pub fn init_global_config(path: &str) -> Result<(), Box<dyn Error>> {
    let config = Config::builder()
        .add_source(config::File::with_name(path))
        .build()?;
    GLOBAL_CONFIG
        .set(config)
        .map_err(|_| "Config already set")?;
    Ok(())
}

pub fn get_global_config() -> &'static Config {
    GLOBAL_CONFIG.get().unwrap_or_else(|| {
        eprintln!("FATAL: Config not initialized - call init_global_config() first");
        std::process::exit(1);
    })
}

/// Get db_path from config
pub fn get_db_path(config: &Config) -> Result<String, Box<dyn Error>> {
    config
        .get_string("paths.db_path")
        .map(|p| shellexpand::tilde(&p).to_string())
        .map_err(|e| format!("Missing paths.db_path in config: {}", e).into())
}

/// Get the node's block-file directory from config
pub fn get_blk_dir(config: &Config) -> Result<String, Box<dyn Error>> {
    config
        .get_string("paths.blk_dir")
        .map(|p| shellexpand::tilde(&p).to_string())
        .map_err(|e| format!("Missing paths.blk_dir in config: {}", e).into())
}

/// Network magic of the chain's block files, e.g. "fabfb5da"
pub fn get_network_magic(config: &Config) -> Result<[u8; 4], Box<dyn Error>> {
    let hex_magic = config
        .get_string("chain.magic")
        .map_err(|e| format!("Missing chain.magic in config: {}", e))?;
    let bytes = hex::decode(&hex_magic).map_err(|e| format!("Bad chain.magic: {}", e))?;
    bytes
        .try_into()
        .map_err(|_| "chain.magic must be 4 bytes of hex".into())
}

/// Base58 version bytes for address derivation
pub fn get_address_prefixes(config: &Config) -> (u8, u8) {
    let pubkey = config.get_int("chain.pubkey_prefix").unwrap_or(71) as u8;
    let script = config.get_int("chain.script_prefix").unwrap_or(5) as u8;
    (pubkey, script)
}
