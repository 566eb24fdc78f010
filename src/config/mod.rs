//! Configuration: TOML schema with embedded defaults plus loading helpers

pub mod macros;
mod schemas;
mod utils;

pub use schemas::*;
pub use utils::{
    get_config_clone, init_config, install_config, load_config_from_path, save_config,
    validate_config, with_config, CONFIG, CONFIG_FILE_PATH,
};
